use crate::{fill_random, from_hex_to_slice, hex_dump, to_hex};
use zeroize::Zeroize;

pub const NONCE_SIZE: usize = 8;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum NonceError {
    FillRandomError,
    InvalidLength(usize),
    /// Hex input with the wrong number of characters, holds the character count
    InvalidHexLength(usize),
    HexError,
}

/// Single-use random challenge, zeroized when dropped
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Nonce {
    bytes: [u8; NONCE_SIZE],
}

impl Drop for Nonce {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl Nonce {
    /// Returns a new `Ok(Nonce)` filled from the OS rng, or `Err` if the random byte generation fails
    pub fn generate() -> Result<Self, NonceError> {
        let mut bytes = [0u8; NONCE_SIZE];
        fill_random(&mut bytes).map_err(|_| NonceError::FillRandomError)?;
        Ok(Self { bytes })
    }

    pub fn from_bytes(bytes: [u8; NONCE_SIZE]) -> Self {
        Self { bytes }
    }

    /// Copies exactly `NONCE_SIZE` bytes, anything else is an `InvalidLength`
    pub fn from_slice(slice: &[u8]) -> Result<Self, NonceError> {
        let bytes: [u8; NONCE_SIZE] = slice
            .try_into()
            .map_err(|_| NonceError::InvalidLength(slice.len()))?;
        Ok(Self { bytes })
    }

    /// Accepts upper or lower case hex of exactly `NONCE_SIZE` bytes
    pub fn from_hex(hex: impl AsRef<[u8]>) -> Result<Self, NonceError> {
        let hex = hex.as_ref();
        if hex.len() != 2 * NONCE_SIZE {
            Err(NonceError::InvalidHexLength(hex.len()))?
        }
        let mut bytes = [0u8; NONCE_SIZE];
        from_hex_to_slice(hex, &mut bytes).map_err(|_| NonceError::HexError)?;
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.bytes
    }

    /// Lowercase hex, the form carried inside handshake messages
    pub fn to_hex(&self) -> String {
        to_hex(&self.bytes)
    }

    /// Uppercase spaced hex, the form written to the audit log
    pub fn display_hex(&self) -> String {
        hex_dump(&self.bytes)
    }

    /// Byte-wise comparison against a received value
    pub fn matches(&self, other: &[u8]) -> bool {
        self.bytes.as_slice() == other
    }
}
