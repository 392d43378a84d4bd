use hc_crypto::hex_dump;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard},
    time::{SystemTime, UNIX_EPOCH},
};

pub const DEFAULT_AUDIT_CAPACITY: usize = 4096;

/// The three views a connection reports into: handshake steps, readable messages, and wire bytes
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LogChannel {
    Authentication,
    Plaintext,
    Ciphertext,
}

/// Receives every protocol value a connection handles
pub trait LogSink {
    fn write_line(&mut self, channel: LogChannel, text: &str);

    /// Writes `prefix` followed by the bytes as uppercase spaced hex
    fn write_hex(&mut self, channel: LogChannel, prefix: &str, bytes: &[u8]) {
        self.write_line(channel, &format!("{}{}", prefix, hex_dump(bytes)));
    }
}

impl<T: LogSink + ?Sized> LogSink for Box<T> {
    fn write_line(&mut self, channel: LogChannel, text: &str) {
        (**self).write_line(channel, text)
    }

    fn write_hex(&mut self, channel: LogChannel, prefix: &str, bytes: &[u8]) {
        (**self).write_hex(channel, prefix, bytes)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct AuditEntry {
    pub timestamp: u128, // milliseconds since epoch
    pub channel: LogChannel,
    pub text: String,
}

/// Bounded in-memory log. Clones share the same entries, so a handle kept
/// outside a connection observes everything the connection writes.
#[derive(Clone, Debug)]
pub struct AuditLog {
    entries: Arc<Mutex<VecDeque<AuditEntry>>>,
    capacity: usize,
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

impl AuditLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<AuditEntry>> {
        match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Appends an entry, dropping the oldest once `capacity` is reached
    pub fn add_entry(&self, entry: AuditEntry) {
        let mut entries = self.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().iter().cloned().collect()
    }

    /// Returns the text of every entry written to `channel`, oldest first
    pub fn lines(&self, channel: LogChannel) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|entry| entry.channel == channel)
            .map(|entry| entry.text.clone())
            .collect()
    }

    pub fn contains(&self, channel: LogChannel, text: &str) -> bool {
        self.lock()
            .iter()
            .any(|entry| entry.channel == channel && entry.text == text)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl LogSink for AuditLog {
    fn write_line(&mut self, channel: LogChannel, text: &str) {
        self.add_entry(AuditEntry {
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            channel,
            text: text.to_string(),
        });
    }
}

/// Forwards every line to `tracing` under the `hc_audit` target
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn write_line(&mut self, channel: LogChannel, text: &str) {
        tracing::info!(target: "hc_audit", channel = ?channel, "{}", text);
    }
}

#[cfg(test)]
mod tests {
    use crate::{AuditLog, LogChannel, LogSink, TracingSink};

    #[test]
    fn lines_by_channel() {
        let mut log = AuditLog::default();
        log.write_line(LogChannel::Authentication, "Client: My nonce is 01 02");
        log.write_line(LogChannel::Plaintext, "Client: hi");
        log.write_hex(LogChannel::Ciphertext, "Client: ", &[0x1b, 0x01]);

        assert_eq!(log.len(), 3);
        assert_eq!(
            log.lines(LogChannel::Authentication),
            vec!["Client: My nonce is 01 02"]
        );
        assert_eq!(log.lines(LogChannel::Plaintext), vec!["Client: hi"]);
        assert!(log.contains(LogChannel::Ciphertext, "Client: 1B 01"));
        assert!(!log.contains(LogChannel::Plaintext, "Client: 1B 01"));
    }

    #[test]
    fn clones_share_entries() {
        let log = AuditLog::default();
        let mut writer = log.clone();
        writer.write_line(LogChannel::Plaintext, "shared");
        assert!(log.contains(LogChannel::Plaintext, "shared"));
        log.clear();
        assert!(writer.is_empty());
    }

    #[test]
    fn capacity_drops_oldest() {
        let mut log = AuditLog::new(2);
        log.write_line(LogChannel::Plaintext, "one");
        log.write_line(LogChannel::Plaintext, "two");
        log.write_line(LogChannel::Plaintext, "three");
        assert_eq!(log.lines(LogChannel::Plaintext), vec!["two", "three"]);
    }

    #[test]
    fn boxed_sink() {
        let log = AuditLog::default();
        let mut boxed: Box<dyn LogSink> = Box::new(log.clone());
        boxed.write_hex(LogChannel::Authentication, "Key ", &[0xff]);
        assert!(log.contains(LogChannel::Authentication, "Key FF"));

        let mut tracing_sink: Box<dyn LogSink> = Box::new(TracingSink);
        tracing_sink.write_line(LogChannel::Authentication, "does not panic");
    }
}
