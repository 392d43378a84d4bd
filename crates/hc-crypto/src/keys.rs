use crate::CryptoError;
use digest::Digest;
use md5::Md5;
use rand::{rngs::OsRng, TryRngCore};
use zeroize::Zeroize;

/// Length of the lowercase hex rendering of an MD5 digest
pub const HASH_HEX_SIZE: usize = 32;

impl From<rand::rand_core::OsError> for CryptoError {
    fn from(_: rand::rand_core::OsError) -> Self {
        CryptoError::OsRngError
    }
}

impl From<hex::FromHexError> for CryptoError {
    fn from(_: hex::FromHexError) -> Self {
        CryptoError::HexError
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

pub fn from_hex(str: impl AsRef<[u8]>) -> Result<Vec<u8>, CryptoError> {
    Ok(hex::decode(str)?)
}

pub fn from_hex_to_slice(str: &[u8], bytes: &mut [u8]) -> Result<(), CryptoError> {
    Ok(hex::decode_to_slice(str, bytes)?)
}

/// Uppercase, space separated rendering used by the audit log, eg. `01 02 0A`
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn fill_random(dest: &mut [u8]) -> Result<(), CryptoError> {
    Ok(OsRng.try_fill_bytes(dest)?)
}

/// MD5 of `bytes` rendered as 32 lowercase hex characters.
/// The session key is the bytes of this string, not the raw digest.
pub fn hash_hex(bytes: &[u8]) -> String {
    let mut digest = Md5::digest(bytes);
    let hex = hex::encode(&digest);
    digest[..].zeroize();
    hex
}

/// Repeating-key XOR. Output has the same length as `plaintext`.
/// There is no integrity check: a flipped ciphertext bit flips the same plaintext bit.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    xor_with_key(plaintext, key)
}

/// Inverse of [`encrypt`], which for XOR is the same transform.
pub fn decrypt(ciphertext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    xor_with_key(ciphertext, key)
}

fn xor_with_key(data: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::EmptyKey);
    }
    Ok(data
        .iter()
        .zip(key.iter().cycle())
        .map(|(byte, k)| byte ^ k)
        .collect())
}
