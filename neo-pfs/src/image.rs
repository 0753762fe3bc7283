use aes::Aes128;
use aes::cipher::KeyInit;
use std::cmp::min;
use std::io;
use xts_mode::{Xts128, get_tweak_default};

/// XTS operates on 0x1000-byte sectors; every read is widened to whole
/// sectors before decryption.
pub const XTS_SECTOR_SIZE: usize = 0x1000;

/// Positional read access to a PFS image.
///
/// Each call carries its own offset, so there is no shared cursor and no
/// locking: readers on multiple threads can pull blocks concurrently.
pub trait Image: Send + Sync {
    /// Reads bytes from the image at the given offset into `buf`.
    ///
    /// Returns the number of bytes actually read. A short read indicates
    /// the end of the image was reached.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Reads exactly `buf.len()` bytes from the image at `offset`.
    ///
    /// Returns [`io::ErrorKind::UnexpectedEof`] if the image ends before the
    /// buffer is filled.
    fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut total = 0;

        while total < buf.len() {
            let n = self.read_at(offset + total as u64, &mut buf[total..])?;

            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "unexpected EOF in image",
                ));
            }

            total += n;
        }

        Ok(())
    }

    /// Returns the total length of the image in bytes.
    fn len(&self) -> u64;

    /// Returns `true` if the image is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Plain byte-slice image. Reads are pure slice indexing.
pub struct SliceImage<'a> {
    data: &'a [u8],
}

impl<'a> SliceImage<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl Image for SliceImage<'_> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = offset as usize;

        if start >= self.data.len() {
            return Ok(0);
        }

        let available = self.data.len() - start;
        let n = min(buf.len(), available);

        buf[..n].copy_from_slice(&self.data[start..start + n]);

        Ok(n)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

/// AES-128-XTS-encrypted image backed by a byte slice.
///
/// The whole image is ciphered per 0x1000-byte sector starting at sector 0,
/// with the little-endian sector index as the tweak. A read at any offset
/// decrypts the covering sectors into a scratch buffer and copies out the
/// requested span, which keeps arbitrary offsets usable even though the
/// cipher only works on whole sectors.
pub struct EncryptedImage<'a> {
    data: &'a [u8],
    xts: Xts128<Aes128>,
}

impl<'a> EncryptedImage<'a> {
    /// Wraps `data` with the XTS sub-keys derived from the EKPFS.
    pub fn new(data: &'a [u8], data_key: &[u8; 16], tweak_key: &[u8; 16]) -> Self {
        let cipher_1 = Aes128::new(data_key.into());
        let cipher_2 = Aes128::new(tweak_key.into());

        Self {
            data,
            xts: Xts128::new(cipher_1, cipher_2),
        }
    }
}

impl Image for EncryptedImage<'_> {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let len = self.data.len() as u64;

        if buf.is_empty() || offset >= len {
            return Ok(0);
        }

        let mut copied = 0;
        let mut pos = offset;
        let mut scratch = vec![0u8; XTS_SECTOR_SIZE];

        while copied < buf.len() && pos < len {
            let sector = (pos as usize) / XTS_SECTOR_SIZE;
            let offset_in_sector = (pos as usize) % XTS_SECTOR_SIZE;
            let sector_start = sector * XTS_SECTOR_SIZE;

            // A partial trailing sector cannot be decrypted.
            let src = self
                .data
                .get(sector_start..sector_start + XTS_SECTOR_SIZE)
                .ok_or_else(|| {
                    io::Error::other(format!("XTS sector #{} out of bounds", sector))
                })?;

            scratch.copy_from_slice(src);
            self.xts
                .decrypt_sector(&mut scratch, get_tweak_default(sector as u128));

            let available = XTS_SECTOR_SIZE - offset_in_sector;
            let remaining_image = (len - pos) as usize;
            let n = min(min(available, remaining_image), buf.len() - copied);

            buf[copied..copied + n]
                .copy_from_slice(&scratch[offset_in_sector..offset_in_sector + n]);

            copied += n;
            pos += n as u64;
        }

        Ok(copied)
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_image_bounds() {
        let img = SliceImage::new(&[1, 2, 3, 4]);
        let mut buf = [0u8; 8];

        assert_eq!(img.read_at(2, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], &[3, 4]);
        assert_eq!(img.read_at(4, &mut buf).unwrap(), 0);
        assert!(img.read_exact_at(1, &mut buf).is_err());
    }

    #[test]
    fn encrypted_image_inverts_sector_encryption() {
        let data_key = [0x01u8; 16];
        let tweak_key = [0x02u8; 16];

        // Three sectors of recognizable plaintext, encrypted the same way
        // the console writes them.
        let mut data = vec![0u8; 3 * XTS_SECTOR_SIZE];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let plain = data.clone();

        let cipher_1 = Aes128::new((&data_key).into());
        let cipher_2 = Aes128::new((&tweak_key).into());
        let xts = Xts128::new(cipher_1, cipher_2);
        xts.encrypt_area(&mut data, XTS_SECTOR_SIZE, 0, get_tweak_default);

        let img = EncryptedImage::new(&data, &data_key, &tweak_key);

        // Aligned read.
        let mut out = vec![0u8; XTS_SECTOR_SIZE];
        img.read_exact_at(0, &mut out).unwrap();
        assert_eq!(out, plain[..XTS_SECTOR_SIZE]);

        // Unaligned read straddling a sector boundary.
        let mut out = vec![0u8; 0x1800];
        img.read_exact_at(0x800, &mut out).unwrap();
        assert_eq!(out, plain[0x800..0x2000]);
    }

    #[test]
    fn zero_key_vector_decrypts_to_zeros() {
        // XTS-AES-128 test vector 1: both keys zero, data unit 0. The
        // published ciphertext of 32 zero bytes must invert to zeros.
        let ciphertext: [u8; 32] = [
            0x91, 0x7c, 0xf6, 0x9e, 0xbd, 0x68, 0xb2, 0xec, 0x9b, 0x9f, 0xe9, 0xa3, 0xea, 0xdd,
            0xa6, 0x92, 0xcd, 0x43, 0xd2, 0xf5, 0x95, 0x98, 0xed, 0x85, 0x8c, 0x02, 0xc2, 0x65,
            0x2f, 0xbf, 0x92, 0x2e,
        ];

        let cipher_1 = Aes128::new((&[0u8; 16]).into());
        let cipher_2 = Aes128::new((&[0u8; 16]).into());
        let xts = Xts128::new(cipher_1, cipher_2);

        let mut buf = ciphertext;
        xts.decrypt_sector(&mut buf, get_tweak_default(0));
        assert_eq!(buf, [0u8; 32]);
    }
}
