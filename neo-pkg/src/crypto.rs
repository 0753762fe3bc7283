//! The PKG key-derivation chain.
//!
//! Walking the entry table in file order drives a fixed sequence:
//! entry 0x10 yields `dk3` (RSA), entry 0x20 yields the EKPFS
//! (SHA-256 -> AES-CBC -> RSA), and the EKPFS plus the seed stored in the
//! PFS header yields the XTS data/tweak keys (HMAC-SHA-256). NPDRM license
//! entries reuse the per-entry AES-CBC scheme of step 0x20.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use snafu::{OptionExt, ResultExt, Snafu, ensure};
use zeroize::Zeroize;

use crate::entry::{EntryId, PkgEntry};
use crate::keys::{fake_pfs_key, pkg_key3};
use crate::{EntryReadError, Pkg};

/// Layout of an ENTRY_KEYS (0x10) payload: a 32-byte seed digest, seven
/// 32-byte digests, then seven 256-byte RSA-encrypted key slots.
const ENTRY_KEYS_LEN: usize = 32 + 7 * 32 + 7 * 256;
const KEY_SLOT_3: usize = 32 + 7 * 32 + 3 * 256;

/// Errors of [`KeyChain::derive()`].
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DeriveError {
    #[snafu(display("failed to read entry"))]
    ReadEntryFailed { source: EntryReadError },

    #[snafu(display("entry #{num} has invalid data offset"))]
    InvalidEntryOffset { num: usize },

    #[snafu(display("image key entry (0x20) precedes entry keys (0x10)"))]
    ImageKeyBeforeEntryKeys,

    #[snafu(display("cannot decrypt derived key 3"))]
    DecryptDk3Failed { source: rsa::errors::Error },

    #[snafu(display("cannot decrypt EKPFS"))]
    DecryptEkpfsFailed { source: rsa::errors::Error },

    #[snafu(display("RSA plaintext is too short ({len} bytes)"))]
    PlaintextTooShort { len: usize },
}

type Result<T, E = DeriveError> = std::result::Result<T, E>;

/// Keys recovered from one PKG. Both slots stay `None` when the PKG does
/// not carry the corresponding entry.
pub struct KeyChain {
    dk3: Option<[u8; 32]>,
    ekpfs: Option<[u8; 32]>,
}

impl std::fmt::Debug for KeyChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.debug_struct("KeyChain")
            .field("dk3", &self.dk3.is_some())
            .field("ekpfs", &self.ekpfs.is_some())
            .finish()
    }
}

impl Drop for KeyChain {
    fn drop(&mut self) {
        self.dk3.zeroize();
        self.ekpfs.zeroize();
    }
}

impl KeyChain {
    /// Walks the entry table once and derives every key the PKG provides.
    ///
    /// The walk preserves file order: slot 3 of entry 0x10 is RSA-decrypted
    /// into `dk3`, and entry 0x20 is unwrapped into the EKPFS using a key
    /// derived from `dk3`. A PKG that stores 0x20 before 0x10 is malformed.
    pub fn derive<R: AsRef<[u8]>>(pkg: &Pkg<R>) -> Result<Self> {
        let mut dk3: Option<[u8; 32]> = None;
        let mut ekpfs: Option<[u8; 32]> = None;

        for result in pkg.entries() {
            let (num, entry) = result.context(ReadEntryFailedSnafu)?;

            match entry.entry_id() {
                EntryId::EntryKeys => {
                    let data = pkg
                        .bytes_at(entry.data_offset(), ENTRY_KEYS_LEN)
                        .context(InvalidEntryOffsetSnafu { num })?;

                    let mut plain = pkg_key3()
                        .decrypt(rsa::Pkcs1v15Encrypt, &data[KEY_SLOT_3..KEY_SLOT_3 + 256])
                        .context(DecryptDk3FailedSnafu)?;

                    dk3 = Some(take_key32(&plain)?);
                    plain.zeroize();
                    log::debug!("derived dk3 from entry #{num}");
                }

                EntryId::PfsImageKey => {
                    let dk3 = dk3.as_ref().context(ImageKeyBeforeEntryKeysSnafu)?;

                    let data = pkg
                        .bytes_at(entry.data_offset(), 256)
                        .context(InvalidEntryOffsetSnafu { num })?;

                    let mut img_key = [0u8; 256];
                    img_key.copy_from_slice(data);

                    let iv_key = entry_iv_key(&entry, dk3);
                    aes_cbc_decrypt(&iv_key, &mut img_key);

                    let mut plain = fake_pfs_key()
                        .decrypt(rsa::Pkcs1v15Encrypt, &img_key)
                        .context(DecryptEkpfsFailedSnafu)?;

                    ekpfs = Some(take_key32(&plain)?);
                    plain.zeroize();
                    img_key.zeroize();
                    log::debug!("derived EKPFS from entry #{num}");
                }

                _ => {}
            }
        }

        Ok(Self { dk3, ekpfs })
    }

    /// Returns `true` when both chain stages completed.
    #[must_use]
    pub fn has_pfs_keys(&self) -> bool {
        self.ekpfs.is_some()
    }

    /// Decrypts an NPDRM license entry in place using the per-entry AES-CBC
    /// key derived from `dk3`. Only whole 16-byte blocks are transformed; a
    /// short tail stays as stored.
    ///
    /// Returns `false` (leaving `data` untouched) when `dk3` is unavailable.
    pub fn decrypt_npdrm(&self, entry: &PkgEntry, data: &mut [u8]) -> bool {
        let Some(dk3) = self.dk3.as_ref() else {
            return false;
        };

        let iv_key = entry_iv_key(entry, dk3);
        aes_cbc_decrypt(&iv_key, data);
        true
    }

    /// Derives the XTS sector keys for the PFS image from the 16-byte seed
    /// stored at offset 0x370 of the image.
    ///
    /// Returns `None` when the EKPFS was not recovered.
    #[must_use]
    pub fn pfs_keys(&self, seed: &[u8; 16]) -> Option<XtsKeys> {
        let ekpfs = self.ekpfs.as_ref()?;

        let mut hmac =
            Hmac::<Sha256>::new_from_slice(ekpfs).expect("HMAC accepts any key length");
        hmac.update(&1u32.to_le_bytes());
        hmac.update(seed);

        let secret = hmac.finalize().into_bytes();
        let mut keys = XtsKeys {
            data: Default::default(),
            tweak: Default::default(),
        };

        keys.tweak.copy_from_slice(&secret[..16]);
        keys.data.copy_from_slice(&secret[16..]);

        Some(keys)
    }
}

/// The AES-128-XTS sub-keys protecting the PFS image.
pub struct XtsKeys {
    pub data: [u8; 16],
    pub tweak: [u8; 16],
}

impl Drop for XtsKeys {
    fn drop(&mut self) {
        self.data.zeroize();
        self.tweak.zeroize();
    }
}

/// `SHA-256(entry_bytes(32) || dk3(32))`, split later as iv || key.
fn entry_iv_key(entry: &PkgEntry, dk3: &[u8; 32]) -> [u8; 32] {
    let mut sha256 = Sha256::new();
    sha256.update(entry.key_digest_bytes());
    sha256.update(dk3);
    sha256.finalize().into()
}

/// AES-128-CBC decrypt in place; `iv_key[..16]` is the IV, `iv_key[16..]`
/// the key. Bytes past the last whole block are left as-is.
fn aes_cbc_decrypt(iv_key: &[u8; 32], data: &mut [u8]) {
    let (iv, key) = iv_key.split_at(16);
    let iv: [u8; 16] = iv.try_into().unwrap();
    let key: [u8; 16] = key.try_into().unwrap();

    let mut decryptor = cbc::Decryptor::<aes::Aes128>::new(&key.into(), &iv.into());

    for block in data.chunks_exact_mut(16) {
        decryptor.decrypt_block_mut(GenericArray::from_mut_slice(block));
    }
}

fn take_key32(plain: &[u8]) -> Result<[u8; 32]> {
    ensure!(plain.len() >= 32, PlaintextTooShortSnafu { len: plain.len() });

    let mut out = [0u8; 32];
    out.copy_from_slice(&plain[..32]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::cipher::BlockEncryptMut;

    fn entry_from_fields(fields: [u32; 6]) -> PkgEntry {
        let mut raw = Vec::with_capacity(PkgEntry::RAW_SIZE);
        for v in fields {
            raw.extend_from_slice(&v.to_be_bytes());
        }
        raw.extend_from_slice(&[0u8; 8]);
        PkgEntry::read(&raw).unwrap()
    }

    /// Minimal PKG: header plus an entry table at 0x1000.
    fn pkg_with_entries(entries: &[[u32; 6]]) -> Vec<u8> {
        let mut raw = vec![0u8; 0x1000 + entries.len() * 32 + 0x2000];
        raw[..4].copy_from_slice(&0x7F434E54u32.to_be_bytes());
        raw[0x10..0x14].copy_from_slice(&(entries.len() as u32).to_be_bytes());
        raw[0x18..0x1C].copy_from_slice(&0x1000u32.to_be_bytes());

        for (i, fields) in entries.iter().enumerate() {
            let at = 0x1000 + i * 32;
            for (j, v) in fields.iter().enumerate() {
                raw[at + j * 4..at + j * 4 + 4].copy_from_slice(&v.to_be_bytes());
            }
        }

        raw
    }

    #[test]
    fn entry_iv_key_hashes_raw_entry_then_dk3() {
        let mut raw = Vec::with_capacity(PkgEntry::RAW_SIZE);
        for v in [0x20u32, 0, 0, 0, 0x2000, 0x100] {
            raw.extend_from_slice(&v.to_be_bytes());
        }
        raw.extend_from_slice(&[0u8; 8]);
        let entry = PkgEntry::read(&raw).unwrap();
        let dk3 = [0x42u8; 32];

        // The digest covers the stored big-endian record, untransformed.
        let mut reference = Sha256::new();
        reference.update(&raw);
        reference.update(dk3);
        let expected: [u8; 32] = reference.finalize().into();

        assert_eq!(entry_iv_key(&entry, &dk3), expected);
    }

    #[test]
    fn cbc_roundtrip_and_short_tail() {
        let iv_key = [0x17u8; 32];
        let plain = *b"0123456789abcdef0123456789abcdef";

        let (iv, key) = iv_key.split_at(16);
        let mut encryptor = cbc::Encryptor::<aes::Aes128>::new(
            GenericArray::from_slice(&key[..16]),
            GenericArray::from_slice(&iv[..16]),
        );

        let mut data = plain;
        for block in data.chunks_exact_mut(16) {
            encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
        }

        // Append a 5-byte tail that decryption must leave untouched.
        let mut padded: Vec<u8> = data.to_vec();
        padded.extend_from_slice(&[0xAA; 5]);

        aes_cbc_decrypt(&iv_key, &mut padded);
        assert_eq!(&padded[..32], &plain);
        assert_eq!(&padded[32..], &[0xAA; 5]);
    }

    #[test]
    fn pfs_keys_split_tweak_then_data() {
        let chain = KeyChain {
            dk3: None,
            ekpfs: Some([0x11u8; 32]),
        };
        let seed = [0x22u8; 16];

        let mut hmac = Hmac::<Sha256>::new_from_slice(&[0x11u8; 32]).unwrap();
        hmac.update(&[0x01, 0x00, 0x00, 0x00]);
        hmac.update(&seed);
        let secret = hmac.finalize().into_bytes();

        let keys = chain.pfs_keys(&seed).unwrap();
        assert_eq!(&keys.tweak, &secret[..16]);
        assert_eq!(&keys.data, &secret[16..]);
    }

    #[test]
    fn pfs_keys_require_ekpfs() {
        let chain = KeyChain {
            dk3: None,
            ekpfs: None,
        };
        assert!(chain.pfs_keys(&[0u8; 16]).is_none());
        assert!(!chain.has_pfs_keys());
    }

    #[test]
    fn npdrm_without_dk3_is_a_no_op() {
        let chain = KeyChain {
            dk3: None,
            ekpfs: None,
        };
        let entry = entry_from_fields([0x400, 0, 0, 0, 0, 0]);
        let mut data = [0x5Au8; 32];

        assert!(!chain.decrypt_npdrm(&entry, &mut data));
        assert_eq!(data, [0x5Au8; 32]);
    }

    #[test]
    fn image_key_before_entry_keys_is_rejected() {
        let raw = pkg_with_entries(&[[0x20, 0, 0, 0, 0x2000, 0x100]]);
        let pkg = Pkg::new(raw).unwrap();

        assert!(matches!(
            KeyChain::derive(&pkg),
            Err(DeriveError::ImageKeyBeforeEntryKeys)
        ));
    }

    #[test]
    fn garbage_key_slot_fails_rsa_unwrap() {
        // A zeroed 256-byte slot can never carry valid PKCS#1 v1.5 padding.
        let raw = pkg_with_entries(&[[0x10, 0, 0, 0, 0x2000, 0x800]]);
        let pkg = Pkg::new(raw).unwrap();

        assert!(matches!(
            KeyChain::derive(&pkg),
            Err(DeriveError::DecryptDk3Failed { .. })
        ));
    }

    #[test]
    fn missing_key_entries_leave_empty_chain() {
        let raw = pkg_with_entries(&[[0x1000, 0, 0, 0, 0x2000, 0x10]]);
        let pkg = Pkg::new(raw).unwrap();

        let chain = KeyChain::derive(&pkg).unwrap();
        assert!(!chain.has_pfs_keys());
    }
}
