use hc_vault::{Key, LogSink};

use crate::{
    AuthState, ConnectionError, Handshake, HandshakeStep, RecordKind, Role, SessionCipher,
};

/// Result of feeding one record to a context
#[derive(Debug, Default, Eq, PartialEq)]
pub struct RecordOutcome {
    /// Framed records to write back to the peer
    pub replies: Vec<Vec<u8>>,
    /// Decrypted application message
    pub message: Option<String>,
    pub authenticated_now: bool,
}

/// All protocol state of one connection. The session key exists exactly when the state is `Authenticated`.
pub struct ConnectionContext<L: LogSink> {
    role: Role,
    state: AuthState,
    psk: Key,
    handshake: Handshake,
    cipher: SessionCipher,
    log: L,
}

impl<L: LogSink> ConnectionContext<L> {
    pub fn new(role: Role, psk: Key, log: L) -> Self {
        Self::with_handshake(Handshake::new(role), psk, log)
    }

    /// Takes a preconfigured handshake, eg. with a fixed nonce or exponent
    pub fn with_handshake(handshake: Handshake, psk: Key, log: L) -> Self {
        let role = handshake.role();
        Self {
            role,
            state: AuthState::Unauthenticated,
            psk,
            handshake,
            cipher: SessionCipher::new(role),
            log,
        }
    }

    /// Records to send as soon as the transport is up
    pub fn on_connected(&mut self) -> Result<Vec<Vec<u8>>, ConnectionError> {
        self.handshake.start(&mut self.log)
    }

    pub fn expected_record(&self) -> RecordKind {
        match self.state {
            AuthState::Authenticated => RecordKind::Line,
            AuthState::Unauthenticated => self.handshake.expected_record(),
        }
    }

    /// Routes the record to the handshake while unauthenticated, to the session cipher afterwards
    pub fn handle_record(&mut self, record: &[u8]) -> Result<RecordOutcome, ConnectionError> {
        match self.state {
            AuthState::Authenticated => {
                let message = self.cipher.open(record, &mut self.log)?;
                Ok(RecordOutcome {
                    message: Some(message),
                    ..Default::default()
                })
            }
            AuthState::Unauthenticated => {
                let output = self
                    .handshake
                    .read_record(record, &self.psk, &mut self.log)?;
                let mut outcome = RecordOutcome {
                    replies: output.records,
                    ..Default::default()
                };
                if let Some(session_key) = output.session_key {
                    self.cipher.initialize_key(session_key);
                    self.state = AuthState::Authenticated;
                    outcome.authenticated_now = true;
                }
                Ok(outcome)
            }
        }
    }

    /// Frames a user message, encrypted under the session key when one exists
    pub fn send_message(&mut self, message: &str) -> Result<Vec<u8>, ConnectionError> {
        self.cipher.seal(message, &mut self.log)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == AuthState::Authenticated
    }

    pub fn is_stalled(&self) -> bool {
        self.handshake.is_stalled()
    }

    pub fn handshake_step(&self) -> HandshakeStep {
        self.handshake.step()
    }

    pub fn session_key(&self) -> Option<&Key> {
        self.cipher.key()
    }

    pub fn log(&self) -> &L {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut L {
        &mut self.log
    }
}
