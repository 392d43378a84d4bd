use hc_vault::{Key, LogChannel, LogSink};

use crate::{encode_line, frame_ciphertext, ConnectionError, Role};

/// Encrypts and decrypts application records once a session key exists
pub struct SessionCipher {
    key: Option<Key>,
    role: Role,
}

impl SessionCipher {
    pub fn new(role: Role) -> Self {
        Self { key: None, role }
    }

    /// The key is set once, a second call is ignored
    pub fn initialize_key(&mut self, key: Key) {
        if self.key.is_none() {
            self.key = Some(key);
        }
    }

    pub fn has_key(&self) -> bool {
        self.key.is_some()
    }

    pub fn key(&self) -> Option<&Key> {
        self.key.as_ref()
    }

    /// Returns the framed record for `message`.
    /// Without a key the message goes out as a plaintext line and nothing is logged.
    pub fn seal<L: LogSink + ?Sized>(
        &self,
        message: &str,
        log: &mut L,
    ) -> Result<Vec<u8>, ConnectionError> {
        match &self.key {
            Some(key) => {
                let label = self.role.label();
                log.write_line(LogChannel::Plaintext, &format!("{}: {}", label, message));
                let ciphertext = key.encrypt(message.as_bytes())?;
                log.write_hex(LogChannel::Ciphertext, &format!("{}: ", label), &ciphertext);
                frame_ciphertext(&ciphertext)
            }
            None => Ok(encode_line(message.as_bytes())),
        }
    }

    /// Decrypts one record from the peer. Without a key the record is returned as is.
    pub fn open<L: LogSink + ?Sized>(
        &self,
        record: &[u8],
        log: &mut L,
    ) -> Result<String, ConnectionError> {
        match &self.key {
            Some(key) => {
                let label = self.role.peer_label();
                let plaintext = key.decrypt(record)?;
                log.write_hex(LogChannel::Ciphertext, &format!("{}: ", label), record);
                let text = String::from_utf8_lossy(&plaintext).into_owned();
                log.write_line(LogChannel::Plaintext, &format!("{}: {}", label, text));
                Ok(text)
            }
            None => Ok(String::from_utf8_lossy(record).into_owned()),
        }
    }
}
