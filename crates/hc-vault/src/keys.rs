use hc_crypto::{decrypt, encrypt, CryptoError};
use secrets::SecretVec;
use std::sync::Mutex;
use zeroize::Zeroize;

/// Key material held in a `secrets::SecretVec`, so it is mlocked, guarded, and zeroed when freed.
/// The stored length is authoritative.
pub struct Key {
    inner: Option<Mutex<SecretVec<u8>>>,
    len: usize,
    tag: String,
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("tag", &self.tag)
            .field("len", &self.len)
            .finish()
    }
}

/// Byte-wise comparison of the key material, tags are ignored
impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.with(|ours| other.with(|theirs| ours == theirs))
    }
}

impl Eq for Key {}

impl Key {
    /// Takes the bytes of `text` as the key, eg. a pre-shared passphrase
    pub fn from_text(text: &str, tag: impl Into<String>) -> Self {
        Self::from_vec(text.as_bytes().to_vec(), tag)
    }

    /// Moves `data` into protected memory, zeroing the vec before it is dropped
    pub fn from_vec(mut data: Vec<u8>, tag: impl Into<String>) -> Self {
        Self::from_slice(data.as_mut_slice(), tag)
    }

    /// Copies the slice into protected memory, then zeroizes the source
    pub fn from_slice(slice: &mut [u8], tag: impl Into<String>) -> Self {
        let len = slice.len();
        let inner = match len {
            0 => None,
            _ => Some(Mutex::new(SecretVec::from(&mut *slice))),
        };
        slice.zeroize();
        Self {
            inner,
            len,
            tag: tag.into(),
        }
    }

    /// Copy of the key material under a new tag
    pub fn duplicate(&self, tag: impl Into<String>) -> Self {
        let mut bytes = self.with(|bytes| bytes.to_vec());
        let key = Self::from_slice(&mut bytes, tag);
        bytes.zeroize();
        key
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Runs `f` with the unlocked key bytes. The borrow ends when `f` returns.
    pub fn with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        match &self.inner {
            Some(inner) => {
                let guard = match inner.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let bytes = guard.borrow();
                f(&bytes)
            }
            None => f(&[]),
        }
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.with(|key| encrypt(plaintext, key))
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.with(|key| decrypt(ciphertext, key))
    }
}
