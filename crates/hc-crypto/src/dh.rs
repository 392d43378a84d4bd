use rand::Rng;

/// Generator. These parameters are deliberately tiny, interoperating peers use the same values.
pub const DH_G: u64 = 5;
/// Prime modulus
pub const DH_P: u64 = 23;
/// Secret exponents are sampled from `1..=DH_EXP_RANGE`
pub const DH_EXP_RANGE: u32 = 10;

/// Supplies Diffie-Hellman secret exponents to a handshake
pub trait ExponentSource: Send {
    fn next_exponent(&mut self) -> u32;
}

/// Uniformly random exponents in `1..=DH_EXP_RANGE`
#[derive(Copy, Clone, Debug, Default)]
pub struct OsExponents;

impl ExponentSource for OsExponents {
    fn next_exponent(&mut self) -> u32 {
        random_exponent()
    }
}

/// Always returns the same exponent, for reproducible handshakes
#[derive(Copy, Clone, Debug)]
pub struct FixedExponent(pub u32);

impl ExponentSource for FixedExponent {
    fn next_exponent(&mut self) -> u32 {
        self.0
    }
}

pub fn random_exponent() -> u32 {
    rand::rng().random_range(1..=DH_EXP_RANGE)
}

/// Square-and-multiply `base^exp mod modulus`
pub fn mod_pow(base: u64, exp: u32, modulus: u64) -> u64 {
    if modulus == 1 {
        return 0;
    }
    let modulus = modulus as u128;
    let mut base = base as u128 % modulus;
    let mut exp = exp;
    let mut result = 1u128;
    while exp > 0 {
        if exp & 1 == 1 {
            result = result * base % modulus;
        }
        base = base * base % modulus;
        exp >>= 1;
    }
    result as u64
}

/// `g^secret mod p`, the value sent to the peer
pub fn public_value(secret: u32) -> u64 {
    mod_pow(DH_G, secret, DH_P)
}

/// `peer^secret mod p`, identical on both sides when each uses its own secret
pub fn shared_secret(peer_value: u64, secret: u32) -> u64 {
    mod_pow(peer_value, secret, DH_P)
}
