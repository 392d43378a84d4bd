use hc_crypto::{CryptoError, NonceError};

/// A handshake record that could not be parsed. The handshake does not advance.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MalformedMessage {
    MissingField(&'static str),
    FieldTooLong(&'static str),
    InvalidIdentity,
    InvalidNonce(NonceError),
    InvalidDhValue(String),
    NonceRecordLength(usize),
    MissingDelimiter,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConnectionError {
    /// Configuration or socket creation failed before any connect attempt
    TransportInit(String),
    /// Connect, read, or write failed on an established transport
    Transport(String),
    /// Identity or nonce verification failed and no timeout was configured to end the wait
    AuthenticationStalled,
    HandshakeTimeout,
    MalformedMessage(MalformedMessage),
    MessageTooLong { len: usize, max: usize },
    /// The ciphertext contains the record delimiter and cannot be framed
    UnframeableCiphertext,
    Crypto(CryptoError),
    Nonce(NonceError),
    Closed,
}

impl From<MalformedMessage> for ConnectionError {
    fn from(value: MalformedMessage) -> Self {
        ConnectionError::MalformedMessage(value)
    }
}

impl From<CryptoError> for ConnectionError {
    fn from(value: CryptoError) -> Self {
        ConnectionError::Crypto(value)
    }
}

impl From<NonceError> for ConnectionError {
    fn from(value: NonceError) -> Self {
        ConnectionError::Nonce(value)
    }
}

impl From<std::io::Error> for ConnectionError {
    fn from(value: std::io::Error) -> Self {
        ConnectionError::Transport(value.to_string())
    }
}

impl std::fmt::Display for MalformedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "missing {} field", field),
            Self::FieldTooLong(field) => write!(f, "{} field too long", field),
            Self::InvalidIdentity => write!(f, "identity is not valid UTF-8"),
            Self::InvalidNonce(e) => write!(f, "invalid nonce: {:?}", e),
            Self::InvalidDhValue(value) => write!(f, "invalid Diffie-Hellman value {:?}", value),
            Self::NonceRecordLength(len) => write!(f, "nonce record has {} bytes", len),
            Self::MissingDelimiter => write!(f, "record delimiter missing"),
        }
    }
}

impl std::fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportInit(reason) => write!(f, "transport init failed: {}", reason),
            Self::Transport(reason) => write!(f, "transport error: {}", reason),
            Self::AuthenticationStalled => write!(f, "authentication stalled"),
            Self::HandshakeTimeout => write!(f, "handshake timed out"),
            Self::MalformedMessage(e) => write!(f, "malformed message: {}", e),
            Self::MessageTooLong { len, max } => {
                write!(f, "message of {} bytes exceeds {} bytes", len, max)
            }
            Self::UnframeableCiphertext => write!(f, "ciphertext contains the record delimiter"),
            Self::Crypto(e) => write!(f, "crypto error: {:?}", e),
            Self::Nonce(e) => write!(f, "nonce error: {:?}", e),
            Self::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for MalformedMessage {}
impl std::error::Error for ConnectionError {}
