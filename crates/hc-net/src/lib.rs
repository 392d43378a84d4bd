// Handshake and session layer for the chat protocol:
// raw nonce exchange, pre-shared key challenge, Diffie-Hellman session key, then encrypted lines.

/// Upper bound for one framed record, delimiter excluded
pub const MAX_RECORD_LEN: usize = 16384;
/// Upper bound for a decrypted handshake message
pub const MAX_HANDSHAKE_LEN: usize = 1024;
/// Upper bound for each handshake message field
pub const MAX_FIELD_LEN: usize = 64;
/// Separates records on the wire and fields inside handshake messages
pub const RECORD_DELIMITER: &[u8] = b"\r\n";

pub const CLIENT_IDENTITY: &str = "Client";
pub const SERVER_IDENTITY: &str = "Server";

mod config;
mod protocol;
mod transport;

pub use config::{Config, ValidatedConfig};
pub use protocol::{
    context::{ConnectionContext, RecordOutcome},
    error::{ConnectionError, MalformedMessage},
    framing::{encode_line, frame_ciphertext, RecordFramer, RecordKind},
    handshake::{AuthState, Handshake, HandshakeOutput, HandshakeStep, Role},
    message::HandshakeMessage,
    session::SessionCipher,
};
pub use transport::{Connection, ConnectionStatus, Listener, ShutdownHandle};
