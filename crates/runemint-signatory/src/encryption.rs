//! At-rest encryption for keyset private scalars.
//!
//! AES-256-CBC with PKCS7 padding and a fresh 16-byte IV per row, stored as
//! `iv_hex:ciphertext_hex`.

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes256;
use rand::RngCore;
use thiserror::Error;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Encryption error
#[derive(Debug, Error)]
pub enum Error {
    /// Stored value is not `iv_hex:ciphertext_hex`
    #[error("malformed encrypted value")]
    MalformedCiphertext,
    /// Invalid hex
    #[error(transparent)]
    Hex(#[from] hex::FromHexError),
    /// Padding check failed; wrong key or corrupted row
    #[error("decryption failed")]
    DecryptionFailed,
}

/// Encrypt a private scalar for storage.
pub fn encrypt(key: &[u8; 32], plaintext: &[u8]) -> String {
    let mut iv = [0u8; 16];
    rand::rng().fill_bytes(&mut iv);

    let ciphertext =
        Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
}

/// Decrypt a stored `iv_hex:ciphertext_hex` value.
pub fn decrypt(key: &[u8; 32], stored: &str) -> Result<Vec<u8>, Error> {
    let (iv_hex, ciphertext_hex) = stored.split_once(':').ok_or(Error::MalformedCiphertext)?;

    let iv_bytes = hex::decode(iv_hex)?;
    let iv: [u8; 16] = iv_bytes
        .try_into()
        .map_err(|_| Error::MalformedCiphertext)?;
    let ciphertext = hex::decode(ciphertext_hex)?;

    Aes256CbcDec::new(key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| Error::DecryptionFailed)
}
