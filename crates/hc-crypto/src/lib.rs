mod dh;
mod keys;
mod nonce;

pub use dh::{
    mod_pow, public_value, random_exponent, shared_secret, ExponentSource, FixedExponent,
    OsExponents, DH_EXP_RANGE, DH_G, DH_P,
};
pub use keys::{
    decrypt, encrypt, fill_random, from_hex, from_hex_to_slice, hash_hex, hex_dump, to_hex,
    HASH_HEX_SIZE,
};
pub use nonce::{Nonce, NonceError, NONCE_SIZE};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CryptoError {
    HexError,
    EmptyKey,
    OsRngError,
}
