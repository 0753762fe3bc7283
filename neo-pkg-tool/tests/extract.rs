//! End-to-end extraction tests over synthesized PKG files.
//!
//! These cover the metadata half of the pipeline: header validation, entry
//! naming, NPDRM fallback, and the no-PFS boundary. Real PFS images require
//! retail key material, so the PFS path is exercised by the unit tests of
//! the lower layers instead.

use neo_pkg::Pkg;
use neo_pkg_tool::{PfsLayout, PkgExtractor, SilentProgress};
use std::path::Path;
use tempfile::TempDir;

fn put_be32(raw: &mut [u8], at: usize, v: u32) {
    raw[at..at + 4].copy_from_slice(&v.to_be_bytes());
}

fn put_be64(raw: &mut [u8], at: usize, v: u64) {
    raw[at..at + 8].copy_from_slice(&v.to_be_bytes());
}

/// Builds a license-only PKG (no PFS image): header, entry table, payloads.
fn build_pkg(entries: &[(u32, &[u8])]) -> Vec<u8> {
    let table_offset = 0x1000usize;
    let data_start = (table_offset + entries.len() * 32 + 15) & !15;

    let mut placed = Vec::new();
    let mut total = data_start;
    for (id, data) in entries {
        placed.push((*id, total, data.len()));
        total += data.len();
    }

    let mut raw = vec![0u8; total.max(0x1000)];
    put_be32(&mut raw, 0x0, 0x7F434E54);
    put_be32(&mut raw, 0x10, entries.len() as u32);
    put_be32(&mut raw, 0x18, table_offset as u32);
    put_be64(&mut raw, 0x30, 0x1000);
    put_be64(&mut raw, 0x38, 0);
    raw[0x40..0x64].copy_from_slice(b"UP0001-TEST00000_00-TESTPKG000000000");
    let raw_len = raw.len() as u64;
    put_be64(&mut raw, 0x430, raw_len);

    for (i, (id, offset, len)) in placed.iter().enumerate() {
        let at = table_offset + i * 32;
        put_be32(&mut raw, at, *id);
        put_be32(&mut raw, at + 16, *offset as u32);
        put_be32(&mut raw, at + 20, *len as u32);
    }

    for ((_, offset, _), (_, data)) in placed.iter().zip(entries) {
        raw[*offset..*offset + data.len()].copy_from_slice(data);
    }

    raw
}

fn extract_to(pkg: &Pkg<Vec<u8>>, out: &Path) -> Result<neo_pkg_tool::ExtractSummary, neo_pkg_tool::ExtractError> {
    PkgExtractor::new(pkg, SilentProgress, false, PfsLayout::Auto).extract(out)
}

#[test]
fn zeroed_file_fails_with_bad_magic() {
    let err = Pkg::new(vec![0u8; 0x1000]).unwrap_err();
    assert!(matches!(
        err,
        neo_pkg::OpenError::ReadHeaderFailed {
            source: neo_pkg::header::ReadError::InvalidMagic
        }
    ));
}

#[test]
fn oversized_pkg_size_aborts_extraction() {
    let mut raw = build_pkg(&[]);
    let claimed = raw.len() as u64 + 1;
    put_be64(&mut raw, 0x430, claimed);

    let pkg = Pkg::new(raw).unwrap();
    let out = TempDir::new().unwrap();

    let err = extract_to(&pkg, out.path()).unwrap_err();
    assert_eq!(err.to_string(), "PKG file size is different");
}

#[test]
fn oversized_content_aborts_extraction() {
    let mut raw = build_pkg(&[]);
    let pkg_size = raw.len() as u64;
    put_be64(&mut raw, 0x30, pkg_size - 0x100);
    put_be64(&mut raw, 0x38, 0x200);

    let pkg = Pkg::new(raw).unwrap();
    let out = TempDir::new().unwrap();

    let err = extract_to(&pkg, out.path()).unwrap_err();
    assert_eq!(err.to_string(), "Content size is bigger than pkg size");
}

#[test]
fn param_sfo_round_trips_to_sce_sys() {
    let payload: Vec<u8> = (0..297u32).map(|i| (i * 7 % 256) as u8).collect();
    let raw = build_pkg(&[(0x1000, &payload)]);

    let pkg = Pkg::new(raw).unwrap();
    assert_eq!(pkg.sfo(), Some(payload.as_slice()));

    let out = TempDir::new().unwrap();
    let summary = extract_to(&pkg, out.path()).unwrap();

    assert_eq!(summary.entries, 1);
    assert_eq!(summary.pfs_files, 0);

    let written = std::fs::read(out.path().join("sce_sys/param.sfo")).unwrap();
    assert_eq!(written, payload);
}

#[test]
fn unknown_entry_is_dumped_at_the_output_root() {
    let payload = [0x5Au8; 17];
    let raw = build_pkg(&[(0xDEADBEEF, &payload)]);

    let pkg = Pkg::new(raw).unwrap();
    let out = TempDir::new().unwrap();
    extract_to(&pkg, out.path()).unwrap();

    let written = std::fs::read(out.path().join("entry_0xdeadbeef.bin")).unwrap();
    assert_eq!(written, payload);
}

#[test]
fn npdrm_entry_without_dk3_is_written_as_stored() {
    // Without an ENTRY_KEYS entry there is no dk3; the license payload must
    // fall back to a verbatim copy rather than failing the run.
    let payload = [0xC3u8; 48];
    let raw = build_pkg(&[(0x400, &payload)]);

    let pkg = Pkg::new(raw).unwrap();
    let out = TempDir::new().unwrap();
    extract_to(&pkg, out.path()).unwrap();

    let written = std::fs::read(out.path().join("sce_sys/license.dat")).unwrap();
    assert_eq!(written, payload);
}

#[test]
fn empty_pfs_produces_only_sce_sys() {
    let raw = build_pkg(&[(0x1000, b"sfo")]);

    let pkg = Pkg::new(raw).unwrap();
    let out = TempDir::new().unwrap();
    let summary = extract_to(&pkg, out.path()).unwrap();

    assert_eq!(summary.pfs_files, 0);
    assert_eq!(summary.pfs_skipped, 0);

    let children: Vec<_> = std::fs::read_dir(out.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(children, ["sce_sys"]);
}

#[test]
fn extraction_is_idempotent_across_fresh_directories() {
    let payload: Vec<u8> = (0..1024u32).map(|i| (i % 256) as u8).collect();
    let raw = build_pkg(&[(0x1000, &payload), (0x1200, b"png")]);
    let pkg = Pkg::new(raw).unwrap();

    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    extract_to(&pkg, first.path()).unwrap();
    extract_to(&pkg, second.path()).unwrap();

    for name in ["sce_sys/param.sfo", "sce_sys/icon0.png"] {
        let a = std::fs::read(first.path().join(name)).unwrap();
        let b = std::fs::read(second.path().join(name)).unwrap();
        assert_eq!(a, b, "{name} differs between runs");
    }
}

#[test]
fn open_pkg_maps_a_file_from_disk() {
    let raw = build_pkg(&[(0x1000, b"mapped")]);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.pkg");
    std::fs::write(&path, &raw).unwrap();

    let pkg = unsafe { neo_pkg_tool::open_pkg(&path) }.unwrap();
    assert_eq!(pkg.header().content_id().title_id(), "TEST00000");
    assert_eq!(pkg.sfo(), Some(b"mapped".as_slice()));
}
