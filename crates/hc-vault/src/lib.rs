mod audit;
mod keys;

pub use audit::{AuditEntry, AuditLog, LogChannel, LogSink, TracingSink, DEFAULT_AUDIT_CAPACITY};
pub use keys::Key;
