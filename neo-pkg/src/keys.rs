//! Embedded RSA-2048 keysets used by the PKG key-derivation chain.
//!
//! Two PKCS#1 v1.5 private keys ship with the tool as opaque constants: the
//! derived-key-3 keyset that unwraps entry key slot 3, and the fake PFS
//! keyset that unwraps the EKPFS. Changing any byte breaks decryption of
//! every retail PKG. The CRT parameters are recomputed at construction, so
//! only the modulus, exponents, and primes are embedded.

use std::sync::OnceLock;

use rsa::{BigUint, RsaPrivateKey};

/// Builds a private key from raw big-endian components.
fn build_keyset(n: &[u8], e: &[u8], d: &[u8], p: &[u8], q: &[u8]) -> RsaPrivateKey {
    RsaPrivateKey::from_components(
        BigUint::from_bytes_be(n),
        BigUint::from_bytes_be(e),
        BigUint::from_bytes_be(d),
        vec![BigUint::from_bytes_be(p), BigUint::from_bytes_be(q)],
    )
    .expect("embedded keyset constants form a valid RSA key")
}

/// Keyset for decrypting entry key slot 3 (`dk3`).
pub fn pkg_key3() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();

    KEY.get_or_init(|| {
        build_keyset(
            &PKG_DERIVED_KEY3_MODULUS,
            &PUBLIC_EXPONENT,
            &PKG_DERIVED_KEY3_PRIVATE_EXPONENT,
            &PKG_DERIVED_KEY3_PRIME1,
            &PKG_DERIVED_KEY3_PRIME2,
        )
    })
}

/// Keyset for decrypting the PFS image key (`ekpfs`).
pub fn fake_pfs_key() -> &'static RsaPrivateKey {
    static KEY: OnceLock<RsaPrivateKey> = OnceLock::new();

    KEY.get_or_init(|| {
        build_keyset(
            &FAKE_KEYSET_MODULUS,
            &PUBLIC_EXPONENT,
            &FAKE_KEYSET_PRIVATE_EXPONENT,
            &FAKE_KEYSET_PRIME1,
            &FAKE_KEYSET_PRIME2,
        )
    })
}

const PUBLIC_EXPONENT: [u8; 4] = [0x00, 0x01, 0x00, 0x01];

const PKG_DERIVED_KEY3_MODULUS: [u8; 256] = [
    0xa1, 0x0d, 0xab, 0xeb, 0x97, 0x69, 0x3d, 0x67, 0x87, 0xe2, 0x13, 0x09, 0xda, 0x2f, 0x3c, 0xfb,
    0xd7, 0x6f, 0xf8, 0xfe, 0x65, 0xd7, 0x2e, 0x44, 0x0e, 0xd9, 0x75, 0xcd, 0x7a, 0x2b, 0x32, 0xc9,
    0x1c, 0x75, 0xa1, 0xb0, 0x66, 0x01, 0x80, 0x7a, 0x08, 0x24, 0x04, 0x75, 0x53, 0xde, 0x00, 0xc2,
    0xdb, 0x03, 0x40, 0x8a, 0xa9, 0xb5, 0x75, 0x7b, 0x5c, 0x99, 0x07, 0xc2, 0x1b, 0x69, 0x2a, 0x2f,
    0xe3, 0x10, 0x93, 0xce, 0x12, 0xee, 0x4b, 0x8b, 0xfe, 0xd8, 0x17, 0x2b, 0x02, 0xe7, 0xd8, 0x89,
    0x5e, 0xa7, 0xb3, 0x19, 0x8a, 0x22, 0xf2, 0x4e, 0x21, 0x12, 0xe3, 0x17, 0xa4, 0x63, 0x59, 0x5c,
    0xd8, 0xe6, 0x60, 0x90, 0x4f, 0xad, 0xe4, 0xbb, 0xed, 0x6d, 0x1b, 0x6c, 0x61, 0x5d, 0xe7, 0x27,
    0x2b, 0xed, 0x0c, 0xda, 0xa2, 0xfb, 0x6f, 0x4c, 0xa7, 0xdb, 0x97, 0x2e, 0x72, 0xc0, 0xea, 0x93,
    0x11, 0x8e, 0xad, 0x6d, 0xb6, 0x27, 0x89, 0xe7, 0x99, 0xf8, 0xcd, 0x40, 0x9d, 0x6d, 0x8f, 0xf4,
    0x3d, 0x73, 0x27, 0xe6, 0xc4, 0x3b, 0x04, 0xa1, 0x4f, 0xcd, 0xd5, 0xcd, 0xf6, 0xc7, 0xfa, 0x50,
    0xe7, 0x20, 0x65, 0xa0, 0x56, 0x81, 0xfd, 0x33, 0xd0, 0xb9, 0xd3, 0xd3, 0x80, 0xb9, 0x00, 0xf6,
    0x66, 0xc7, 0x8f, 0xa6, 0x31, 0x0b, 0xc0, 0x91, 0x21, 0x7c, 0x97, 0xd7, 0x6e, 0x92, 0xb5, 0xa4,
    0xc0, 0x1c, 0x85, 0x7c, 0x4a, 0xb2, 0xfb, 0xf3, 0x06, 0x58, 0x36, 0x8f, 0x5c, 0xea, 0x96, 0x61,
    0xf4, 0x56, 0x86, 0xf4, 0x25, 0xd6, 0x21, 0x4f, 0xf3, 0xec, 0xc3, 0x7b, 0x7d, 0x83, 0x2f, 0xf5,
    0xe9, 0xcb, 0x25, 0x5c, 0x41, 0xa4, 0xda, 0x46, 0x0e, 0xa9, 0x07, 0xd6, 0xe7, 0x71, 0x18, 0xdf,
    0x0c, 0x23, 0x9d, 0xfa, 0xfe, 0x16, 0xa1, 0x72, 0x95, 0x89, 0x5d, 0x89, 0xbd, 0x4f, 0x43, 0x97,
];

const PKG_DERIVED_KEY3_PRIVATE_EXPONENT: [u8; 256] = [
    0x21, 0x84, 0x5d, 0xde, 0x16, 0xd1, 0xb1, 0x14, 0xc5, 0xc3, 0xb7, 0xe0, 0x9a, 0x06, 0xb0, 0xb3,
    0x5c, 0xbf, 0x91, 0xdb, 0x27, 0xc8, 0xa3, 0x79, 0x48, 0x79, 0xdb, 0x39, 0x5b, 0x0e, 0x78, 0x70,
    0x40, 0x3a, 0xfe, 0xde, 0x5e, 0x2c, 0x3b, 0xd7, 0xa9, 0xb0, 0x0d, 0x39, 0x79, 0xad, 0xbf, 0x0c,
    0xce, 0x55, 0x9b, 0xed, 0xff, 0xa9, 0xa2, 0xfc, 0x7c, 0x65, 0xe0, 0xa6, 0x75, 0xdb, 0xea, 0x0a,
    0xb3, 0x3f, 0xb4, 0xf2, 0xf3, 0x1f, 0xa2, 0x9b, 0x4c, 0xfb, 0x1d, 0xbf, 0x36, 0xc8, 0x97, 0x58,
    0xe7, 0x59, 0x11, 0x3d, 0xe4, 0x70, 0xa7, 0x6a, 0xb9, 0x19, 0x5c, 0x27, 0x84, 0x6f, 0xa4, 0x9e,
    0x5d, 0x09, 0x7c, 0xd9, 0x2b, 0xab, 0xed, 0xe9, 0x6a, 0x5d, 0x05, 0x93, 0x05, 0xa4, 0x6c, 0x41,
    0xcb, 0xb3, 0x76, 0xb4, 0x5d, 0xac, 0xe4, 0x19, 0xd8, 0xe9, 0x2b, 0x4a, 0x60, 0x59, 0x63, 0xb7,
    0xc8, 0x2c, 0xd6, 0x3c, 0xd5, 0x43, 0x49, 0xc9, 0x0a, 0xde, 0xc9, 0x6c, 0xc0, 0x80, 0xc6, 0x06,
    0xc8, 0x64, 0x41, 0xe1, 0x1b, 0x0b, 0x6f, 0x44, 0xdb, 0x65, 0x6b, 0x55, 0x13, 0x88, 0x9b, 0x85,
    0xda, 0x94, 0xbe, 0x97, 0x63, 0x1a, 0x0f, 0xf8, 0xa7, 0xa6, 0x04, 0x5f, 0xf4, 0xb1, 0xf7, 0x01,
    0x40, 0xcd, 0x17, 0xea, 0xdd, 0x7c, 0xf0, 0x74, 0x76, 0x7f, 0xa6, 0x26, 0x3d, 0xa3, 0x3c, 0x9b,
    0x8a, 0xe7, 0x57, 0x42, 0x5b, 0x5e, 0xb9, 0x14, 0x1b, 0x0d, 0xd1, 0x54, 0x43, 0xbc, 0x50, 0xc4,
    0x42, 0x11, 0x8f, 0x4b, 0xc9, 0xec, 0x18, 0xe9, 0x98, 0xf0, 0x7b, 0x5e, 0x85, 0xc6, 0x01, 0x14,
    0x66, 0x10, 0xb0, 0xbf, 0x5f, 0x8c, 0x5a, 0xec, 0x28, 0xed, 0x62, 0x80, 0xde, 0xf0, 0xf3, 0x4d,
    0x31, 0x93, 0xef, 0x26, 0xf7, 0x26, 0x2f, 0x1c, 0xdb, 0xad, 0x9b, 0x74, 0xe1, 0xaa, 0x98, 0xd9,
];

const PKG_DERIVED_KEY3_PRIME1: [u8; 128] = [
    0xed, 0x0c, 0x28, 0x00, 0xc4, 0xc4, 0x64, 0xb9, 0x8c, 0xe4, 0x95, 0x17, 0xc5, 0x75, 0x68, 0x43,
    0x9d, 0x3e, 0xe6, 0x77, 0x25, 0xe4, 0x8f, 0x12, 0x64, 0xfc, 0xef, 0xa1, 0x58, 0x26, 0x87, 0x03,
    0x7f, 0x3c, 0xd5, 0x0c, 0x68, 0xeb, 0x3c, 0x82, 0x77, 0x0d, 0xe5, 0xc7, 0x82, 0xed, 0x35, 0x53,
    0x76, 0xe3, 0xf7, 0x09, 0x4e, 0xbb, 0x8b, 0x5a, 0xce, 0x9d, 0x89, 0xae, 0x01, 0xea, 0xa4, 0xf1,
    0xee, 0x49, 0x39, 0xb1, 0xf6, 0x27, 0x07, 0x8d, 0x0a, 0x98, 0x3a, 0xce, 0x88, 0x30, 0x6a, 0x9c,
    0x05, 0x91, 0x9d, 0x20, 0x92, 0xcc, 0x60, 0x10, 0x5b, 0xb4, 0xe3, 0xc1, 0xb2, 0x7a, 0x02, 0x1f,
    0x71, 0xc0, 0x83, 0x21, 0xd5, 0x91, 0xfe, 0x6d, 0x36, 0x7b, 0xe8, 0x8b, 0x2a, 0x2e, 0x9b, 0xdd,
    0x39, 0xd4, 0xf0, 0x93, 0x10, 0xb7, 0xe6, 0x24, 0x63, 0x7b, 0x5e, 0x76, 0x45, 0x3c, 0xcc, 0x8b,
];

const PKG_DERIVED_KEY3_PRIME2: [u8; 128] = [
    0xad, 0xee, 0x15, 0x26, 0xc0, 0xeb, 0xf0, 0x1c, 0x9a, 0x0a, 0xec, 0x3e, 0xa7, 0xc7, 0x14, 0xc2,
    0x77, 0xca, 0xcd, 0x65, 0x17, 0x12, 0xb6, 0xa5, 0x68, 0xde, 0x3f, 0xdd, 0x8b, 0x9f, 0x75, 0xb2,
    0x3c, 0x16, 0x85, 0x71, 0xe7, 0x84, 0x90, 0x40, 0xe3, 0xac, 0x31, 0x34, 0x91, 0xf7, 0x32, 0x57,
    0x17, 0xa3, 0x03, 0xce, 0xb0, 0xf3, 0xe1, 0x79, 0x16, 0xa3, 0x21, 0x58, 0xb5, 0x96, 0x2c, 0x50,
    0x19, 0xa3, 0xf4, 0xaf, 0x92, 0x55, 0xc6, 0xe2, 0x92, 0xff, 0x66, 0x28, 0x3b, 0x67, 0xc8, 0x05,
    0x2b, 0xc1, 0x60, 0xb9, 0xdb, 0x14, 0x10, 0x03, 0x07, 0x0d, 0x47, 0x98, 0xe3, 0x1b, 0x85, 0x12,
    0x61, 0x0c, 0x06, 0xb3, 0x84, 0xcc, 0x68, 0x40, 0xe8, 0x10, 0x60, 0xb4, 0x17, 0x2b, 0x82, 0x77,
    0x65, 0xaf, 0x45, 0x76, 0x12, 0xec, 0xe8, 0x42, 0x13, 0x00, 0x37, 0x86, 0xb1, 0xa6, 0x0a, 0xa5,
];

const FAKE_KEYSET_MODULUS: [u8; 256] = [
    0x97, 0x06, 0xa7, 0x89, 0xc4, 0xd2, 0x50, 0x44, 0x09, 0xb0, 0xd2, 0x7f, 0x45, 0x1a, 0x27, 0x76,
    0xb9, 0x1d, 0xc3, 0x01, 0x44, 0xd9, 0xf6, 0x75, 0x7d, 0xca, 0x12, 0x59, 0x8f, 0x92, 0x46, 0xca,
    0x51, 0x43, 0x3e, 0x37, 0x13, 0x65, 0xad, 0xed, 0xe8, 0x61, 0x55, 0xbc, 0x3d, 0x71, 0x74, 0xd9,
    0x87, 0x1f, 0x6f, 0x8e, 0xd3, 0xab, 0x55, 0x5c, 0x3e, 0x76, 0xd9, 0xeb, 0x05, 0x7e, 0xb2, 0x14,
    0x8c, 0x01, 0x2f, 0x5f, 0x1c, 0x9e, 0xca, 0x39, 0xd1, 0x69, 0x15, 0x2f, 0xef, 0x7f, 0xc0, 0xaf,
    0x1c, 0x69, 0x9f, 0x17, 0x8e, 0xc1, 0x33, 0x9f, 0x13, 0xcc, 0x90, 0xa5, 0xca, 0xed, 0x6a, 0x21,
    0xa7, 0xa7, 0x59, 0xb4, 0xa0, 0x6d, 0x5b, 0x1e, 0xf9, 0xbe, 0x01, 0x65, 0xd3, 0x29, 0x25, 0xd8,
    0x59, 0x90, 0xc4, 0xe8, 0x13, 0xf6, 0x4b, 0xf4, 0xb2, 0xf1, 0x5c, 0xd6, 0x5a, 0xcc, 0x60, 0x44,
    0x15, 0x75, 0x05, 0xf0, 0x07, 0x61, 0x2a, 0x2d, 0x06, 0x80, 0x5c, 0xc7, 0x1b, 0xd6, 0x47, 0x17,
    0x35, 0x1f, 0xa3, 0x4f, 0x28, 0x55, 0x8f, 0xdc, 0x2f, 0xc9, 0xea, 0x63, 0x09, 0x94, 0x48, 0x7f,
    0x45, 0x03, 0x97, 0x33, 0x5c, 0x65, 0xb3, 0x2b, 0x61, 0xa0, 0x1d, 0x14, 0x57, 0xc4, 0xa6, 0xc9,
    0x5c, 0xa1, 0x76, 0x91, 0x5b, 0x6b, 0x41, 0xc5, 0x8e, 0xcb, 0x3e, 0xd3, 0x13, 0xef, 0xa1, 0xf2,
    0xd9, 0x9a, 0x4d, 0x01, 0xa9, 0x4b, 0x57, 0x6e, 0x12, 0x5a, 0x1c, 0x6c, 0xde, 0x3d, 0xa8, 0x13,
    0xa3, 0xeb, 0x21, 0x66, 0xb4, 0x3f, 0x6e, 0x30, 0x02, 0x07, 0x04, 0x6a, 0x2c, 0x21, 0x82, 0xfb,
    0x63, 0x12, 0x75, 0xba, 0xd4, 0x57, 0xa7, 0xf7, 0x5d, 0xff, 0xea, 0x80, 0x72, 0x43, 0xc5, 0x63,
    0x7e, 0x4e, 0x20, 0x74, 0xd1, 0x48, 0xeb, 0x14, 0x9a, 0xfe, 0xbb, 0x11, 0x94, 0xf1, 0xe8, 0x47,
];

const FAKE_KEYSET_PRIVATE_EXPONENT: [u8; 256] = [
    0x86, 0xba, 0xa0, 0x01, 0x8e, 0x7d, 0x54, 0xaf, 0xad, 0xb9, 0x79, 0xbf, 0xa2, 0x04, 0xd8, 0x09,
    0xd8, 0xd0, 0xcd, 0x23, 0x37, 0xa9, 0xfe, 0x6d, 0x08, 0x1f, 0x99, 0xc9, 0x1e, 0x04, 0x8f, 0x74,
    0x73, 0x94, 0x3a, 0x4f, 0x65, 0xd5, 0x82, 0x99, 0x47, 0x82, 0x75, 0xba, 0xad, 0x51, 0xa6, 0xbd,
    0x5c, 0x06, 0xd6, 0x3d, 0xa3, 0x65, 0x28, 0x8c, 0x57, 0x09, 0x2e, 0x14, 0xb4, 0xdd, 0x36, 0xbe,
    0x8f, 0xbb, 0x8a, 0xe8, 0x1d, 0x9f, 0x26, 0xa6, 0xf7, 0xc2, 0xf7, 0xec, 0xc0, 0x8a, 0xc6, 0x79,
    0x31, 0x2e, 0xa4, 0x87, 0x9e, 0x89, 0x8a, 0xa4, 0xb2, 0x43, 0xff, 0x12, 0x78, 0x7a, 0xde, 0x00,
    0x52, 0x11, 0x40, 0x3c, 0x9c, 0x15, 0x92, 0x81, 0x8a, 0xa8, 0x4f, 0x94, 0xe8, 0x10, 0xc0, 0x3b,
    0x46, 0x83, 0x98, 0xb5, 0xb5, 0x01, 0x36, 0xf7, 0x80, 0x1f, 0x44, 0x03, 0xd2, 0x12, 0x9b, 0x19,
    0x1f, 0x4b, 0x1b, 0x4e, 0xe4, 0xa4, 0xb1, 0x4a, 0x01, 0xc9, 0xae, 0xca, 0x08, 0xff, 0x50, 0xe9,
    0xf7, 0x6f, 0xcb, 0x40, 0x74, 0xfa, 0x3a, 0xf0, 0xf6, 0x25, 0x92, 0x18, 0x73, 0x7e, 0x8b, 0xcb,
    0xa4, 0x95, 0x75, 0x22, 0x52, 0x57, 0xe0, 0x75, 0x48, 0x58, 0xa6, 0x25, 0x13, 0xd9, 0x89, 0x0a,
    0x00, 0x5e, 0x27, 0x9a, 0x2e, 0x01, 0x74, 0x68, 0x61, 0xf5, 0x34, 0xad, 0x65, 0x9a, 0x15, 0xcb,
    0xda, 0x1f, 0x31, 0xb9, 0xab, 0x3d, 0xd2, 0x59, 0xcc, 0xf5, 0x69, 0x0e, 0x64, 0xa1, 0x9d, 0x30,
    0x11, 0x03, 0x20, 0x79, 0xbe, 0x24, 0xce, 0x12, 0x1e, 0x9b, 0x29, 0x59, 0xaf, 0x90, 0xc6, 0x20,
    0x33, 0xa8, 0xfb, 0x51, 0xae, 0xde, 0x35, 0x65, 0x1e, 0x44, 0x1a, 0x83, 0x6e, 0x64, 0x23, 0x45,
    0x12, 0x9f, 0xf8, 0x95, 0x9b, 0x0b, 0xd4, 0x2e, 0xb7, 0x38, 0x50, 0xaf, 0xee, 0xf3, 0xef, 0xf9,
];

const FAKE_KEYSET_PRIME1: [u8; 128] = [
    0xe3, 0x4a, 0x40, 0xfc, 0xbb, 0x88, 0x30, 0x53, 0xe1, 0x73, 0x15, 0x45, 0x6b, 0xb9, 0x2f, 0xa9,
    0x01, 0xdc, 0x4c, 0x30, 0x78, 0x6e, 0x25, 0xb4, 0x4e, 0xe6, 0xe1, 0x34, 0xc5, 0x38, 0xed, 0x63,
    0x84, 0x92, 0x47, 0xf8, 0xa1, 0x98, 0xff, 0x1a, 0x38, 0x15, 0x74, 0xd7, 0x26, 0xbc, 0xeb, 0x4d,
    0x6f, 0xd0, 0x9a, 0x4a, 0x67, 0x78, 0xe5, 0x84, 0x37, 0x6e, 0x53, 0xca, 0x78, 0xeb, 0x37, 0x18,
    0x9e, 0x6e, 0xf1, 0xc7, 0x14, 0x3f, 0xc4, 0xcb, 0xb1, 0x39, 0x35, 0x38, 0x22, 0xc3, 0x1e, 0xe7,
    0x83, 0x2e, 0xde, 0x73, 0xbc, 0x96, 0xd8, 0xca, 0x8f, 0xdb, 0xf5, 0x4b, 0x7b, 0xe6, 0xc3, 0x7a,
    0xdf, 0x6e, 0xf5, 0x52, 0x86, 0x7b, 0x34, 0x7f, 0xe9, 0x27, 0x14, 0x30, 0x02, 0x95, 0xce, 0x6f,
    0xf1, 0xb9, 0x8f, 0x6a, 0xb3, 0x57, 0xed, 0x17, 0xc0, 0xf4, 0x73, 0x92, 0x24, 0xf1, 0x52, 0xf3,
];

const FAKE_KEYSET_PRIME2: [u8; 128] = [
    0xaa, 0x1a, 0x4b, 0x48, 0xbe, 0x01, 0x93, 0x51, 0x74, 0x06, 0xf9, 0xd2, 0x36, 0x84, 0x14, 0x22,
    0xee, 0xf6, 0x00, 0x3b, 0x82, 0xd2, 0x86, 0x38, 0xea, 0x61, 0xc4, 0x65, 0x54, 0xb0, 0x7b, 0x0f,
    0x11, 0xc3, 0x5f, 0x28, 0xf8, 0xd6, 0x04, 0x89, 0xb1, 0xfd, 0x98, 0x78, 0xfa, 0x68, 0x63, 0x54,
    0x79, 0xc6, 0x1e, 0xa2, 0x7c, 0x9a, 0x50, 0xf7, 0xba, 0xc2, 0xcf, 0xd0, 0x24, 0x21, 0x1f, 0x50,
    0xe4, 0xd9, 0x02, 0xec, 0xa7, 0xa3, 0xac, 0x35, 0x1d, 0xdc, 0xb8, 0xf7, 0xc8, 0x49, 0x4a, 0x1d,
    0xc4, 0xef, 0x73, 0x5c, 0x45, 0xab, 0xd4, 0xe5, 0x76, 0x74, 0x25, 0xf7, 0xf2, 0x35, 0xbd, 0x7c,
    0xe8, 0x38, 0x81, 0x0a, 0x18, 0x89, 0xb6, 0xee, 0x98, 0xff, 0x1a, 0x7e, 0x0e, 0xe7, 0x57, 0x10,
    0x09, 0x8f, 0xa0, 0x61, 0x42, 0x43, 0xdb, 0x99, 0x77, 0x85, 0x00, 0x4d, 0xba, 0x53, 0xa2, 0x5d,
];

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::traits::PublicKeyParts;

    #[test]
    fn keysets_construct() {
        assert_eq!(pkg_key3().n().bits(), 2048);
        assert_eq!(fake_pfs_key().n().bits(), 2048);
    }
}
