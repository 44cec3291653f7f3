//! Entry decryption for the game archive
//!
//! Encrypted entries use AES-128-CBC with a zero IV and the public CryEngine
//! key. The key is a constant of the format, not a secret.

use aes::cipher::{block_padding::NoPadding, BlockDecryptMut, KeyIvInit};

use crate::error::{Error, Result};

type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// The CryEngine archive key
pub const P4K_KEY: [u8; 16] = [
    0x5E, 0x7A, 0x20, 0x02, 0x30, 0x2E, 0xEB, 0x1A,
    0x3B, 0xB6, 0x17, 0xC3, 0x0F, 0xDE, 0x1E, 0x47,
];

const BLOCK: usize = 16;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// Decrypt a block-aligned payload. Zero padding is left in place; only the
/// caller knows the declared entry size.
pub fn decrypt_aes_cbc(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }

    if data.len() % BLOCK != 0 {
        return Err(Error::Decryption(format!(
            "payload length {} is not a multiple of {}",
            data.len(),
            BLOCK
        )));
    }

    let iv = [0u8; BLOCK];
    let cipher = Aes128CbcDec::new(&P4K_KEY.into(), &iv.into());

    let mut buffer = data.to_vec();
    let len = cipher
        .decrypt_padded_mut::<NoPadding>(&mut buffer)
        .map_err(|e| Error::Decryption(format!("AES decryption failed: {:?}", e)))?
        .len();
    buffer.truncate(len);

    Ok(buffer)
}

/// Check if data starts a ZStd frame
pub fn is_zstd_stream(data: &[u8]) -> bool {
    data.len() >= 4 && data[..4] == ZSTD_MAGIC
}

/// Encrypt with zero padding the way the game packer does
#[cfg(test)]
pub(crate) fn encrypt_aes_cbc(data: &[u8]) -> Result<Vec<u8>> {
    use aes::cipher::{block_padding::ZeroPadding, BlockEncryptMut};

    type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;

    if data.is_empty() {
        return Ok(Vec::new());
    }

    let iv = [0u8; BLOCK];
    let cipher = Aes128CbcEnc::new(&P4K_KEY.into(), &iv.into());

    let padded_len = data.len().div_ceil(BLOCK) * BLOCK;
    let mut buffer = vec![0u8; padded_len];
    buffer[..data.len()].copy_from_slice(data);

    let encrypted = cipher
        .encrypt_padded_mut::<ZeroPadding>(&mut buffer, data.len())
        .map_err(|e| Error::Decryption(format!("AES encryption failed: {:?}", e)))?;

    Ok(encrypted.to_vec())
}
