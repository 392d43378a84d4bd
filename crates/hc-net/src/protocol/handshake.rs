use hc_crypto::{
    hash_hex, public_value, shared_secret, ExponentSource, Nonce, OsExponents, NONCE_SIZE,
};
use hc_vault::{Key, LogChannel, LogSink};
use zeroize::Zeroize;

use crate::{
    encode_line, frame_ciphertext, ConnectionError, HandshakeMessage, MalformedMessage, RecordKind,
    CLIENT_IDENTITY, SERVER_IDENTITY,
};

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum AuthState {
    #[default]
    Unauthenticated,
    Authenticated,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Role {
    /// Connects, sends the first nonce, and checks the server's challenge
    Initiator,
    /// Accepts, answers the first nonce with its own nonce and challenge
    Responder,
}

impl Role {
    /// Identity this side claims and prefixes its log lines with
    pub fn label(&self) -> &'static str {
        match self {
            Role::Initiator => CLIENT_IDENTITY,
            Role::Responder => SERVER_IDENTITY,
        }
    }

    pub fn peer_label(&self) -> &'static str {
        match self {
            Role::Initiator => SERVER_IDENTITY,
            Role::Responder => CLIENT_IDENTITY,
        }
    }

    fn secret_name(&self) -> &'static str {
        match self {
            Role::Initiator => "a",
            Role::Responder => "b",
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum HandshakeStep {
    /// Initiator before its nonce went out
    NotStarted,
    AwaitingPeerNonce,
    /// Initiator waiting for the server's encrypted challenge
    AwaitingChallenge,
    /// Responder waiting for the client's encrypted answer
    AwaitingResponse,
    Complete,
    /// Identity or nonce verification failed. Later records are dropped.
    Stalled,
}

/// Records to send, and the session key once the handshake completes
#[derive(Debug, Default)]
pub struct HandshakeOutput {
    pub records: Vec<Vec<u8>>,
    pub session_key: Option<Key>,
}

pub struct Handshake {
    role: Role,
    step: HandshakeStep,
    nonce: Option<Nonce>,
    peer_nonce: Option<Nonce>,
    secret: u32,
    exponents: Box<dyn ExponentSource>,
}

impl Drop for Handshake {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl Handshake {
    pub fn new(role: Role) -> Self {
        let step = match role {
            Role::Initiator => HandshakeStep::NotStarted,
            Role::Responder => HandshakeStep::AwaitingPeerNonce,
        };
        Self {
            role,
            step,
            nonce: None,
            peer_nonce: None,
            secret: 0,
            exponents: Box::new(OsExponents),
        }
    }

    /// Uses `nonce` instead of a freshly generated one
    pub fn with_nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }

    pub fn with_exponents(mut self, exponents: impl ExponentSource + 'static) -> Self {
        self.exponents = Box::new(exponents);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn step(&self) -> HandshakeStep {
        self.step
    }

    pub fn is_complete(&self) -> bool {
        self.step == HandshakeStep::Complete
    }

    pub fn is_stalled(&self) -> bool {
        self.step == HandshakeStep::Stalled
    }

    /// Shape of the record the current step consumes
    pub fn expected_record(&self) -> RecordKind {
        match (self.role, self.step) {
            (Role::Initiator, HandshakeStep::AwaitingPeerNonce) => RecordKind::Fixed {
                len: NONCE_SIZE,
                terminated: true,
            },
            (Role::Responder, HandshakeStep::AwaitingPeerNonce) => RecordKind::Fixed {
                len: NONCE_SIZE,
                terminated: false,
            },
            _ => RecordKind::Line,
        }
    }

    /// Called once the transport is connected. The initiator returns its raw nonce, unterminated.
    pub fn start<L: LogSink + ?Sized>(
        &mut self,
        log: &mut L,
    ) -> Result<Vec<Vec<u8>>, ConnectionError> {
        if self.role != Role::Initiator || self.step != HandshakeStep::NotStarted {
            return Ok(Vec::new());
        }
        let nonce = self.own_nonce()?;
        log.write_line(
            LogChannel::Authentication,
            &format!("{}: My nonce is {}", self.role.label(), nonce.display_hex()),
        );
        let record = nonce.as_bytes().to_vec();
        self.nonce = Some(nonce);
        self.step = HandshakeStep::AwaitingPeerNonce;
        tracing::debug!(role = ?self.role, "nonce sent");
        Ok(vec![record])
    }

    /// Consumes one record framed as `expected_record` describes.
    /// A malformed record is returned as an error and leaves the step unchanged.
    pub fn read_record<L: LogSink + ?Sized>(
        &mut self,
        record: &[u8],
        psk: &Key,
        log: &mut L,
    ) -> Result<HandshakeOutput, ConnectionError> {
        match (self.role, self.step) {
            (Role::Initiator, HandshakeStep::AwaitingPeerNonce) => {
                self.read_peer_nonce(record, log)?;
                self.step = HandshakeStep::AwaitingChallenge;
                Ok(HandshakeOutput::default())
            }
            (Role::Initiator, HandshakeStep::AwaitingChallenge) => {
                let message = self.open_message(record, psk, log)?;
                if !self.verify(&message) {
                    return Ok(HandshakeOutput::default());
                }
                let reply = self.seal_message(psk, log)?;
                let session_key = self.derive_session_key(message.dh_value, log);
                Ok(HandshakeOutput {
                    records: vec![reply],
                    session_key: Some(session_key),
                })
            }
            (Role::Responder, HandshakeStep::AwaitingPeerNonce) => {
                let peer_nonce = Nonce::from_slice(record)
                    .map_err(|_| MalformedMessage::NonceRecordLength(record.len()))?;
                let nonce = self.own_nonce()?;
                self.log_nonce(self.role.peer_label(), &peer_nonce, log);
                self.log_nonce(self.role.label(), &nonce, log);
                let nonce_record = encode_line(nonce.as_bytes());
                self.peer_nonce = Some(peer_nonce);
                self.nonce = Some(nonce);

                let challenge = self.seal_message(psk, log)?;
                self.step = HandshakeStep::AwaitingResponse;
                Ok(HandshakeOutput {
                    records: vec![nonce_record, challenge],
                    session_key: None,
                })
            }
            (Role::Responder, HandshakeStep::AwaitingResponse) => {
                let message = self.open_message(record, psk, log)?;
                if !self.verify(&message) {
                    return Ok(HandshakeOutput::default());
                }
                let session_key = self.derive_session_key(message.dh_value, log);
                Ok(HandshakeOutput {
                    records: Vec::new(),
                    session_key: Some(session_key),
                })
            }
            (_, step) => {
                tracing::debug!(role = ?self.role, ?step, len = record.len(), "handshake record dropped");
                Ok(HandshakeOutput::default())
            }
        }
    }

    fn own_nonce(&mut self) -> Result<Nonce, ConnectionError> {
        match self.nonce.take() {
            Some(nonce) => Ok(nonce),
            None => Ok(Nonce::generate()?),
        }
    }

    fn log_nonce<L: LogSink + ?Sized>(&self, label: &str, nonce: &Nonce, log: &mut L) {
        log.write_line(
            LogChannel::Authentication,
            &format!("{}: My nonce is {}", label, nonce.display_hex()),
        );
    }

    fn read_peer_nonce<L: LogSink + ?Sized>(
        &mut self,
        record: &[u8],
        log: &mut L,
    ) -> Result<(), ConnectionError> {
        let peer_nonce = Nonce::from_slice(record)
            .map_err(|_| MalformedMessage::NonceRecordLength(record.len()))?;
        self.log_nonce(self.role.peer_label(), &peer_nonce, log);
        self.peer_nonce = Some(peer_nonce);
        Ok(())
    }

    /// Decrypts a handshake record with the pre-shared key and logs each field
    fn open_message<L: LogSink + ?Sized>(
        &self,
        record: &[u8],
        psk: &Key,
        log: &mut L,
    ) -> Result<HandshakeMessage, ConnectionError> {
        let peer = self.role.peer_label();
        log.write_hex(
            LogChannel::Authentication,
            &format!("{}: My encrypted message is ", peer),
            record,
        );

        let mut plaintext = psk.decrypt(record)?;
        let message = HandshakeMessage::parse(&plaintext);
        plaintext.zeroize();
        let message = message?;

        log.write_line(
            LogChannel::Authentication,
            &format!("{}: I am {}.", peer, message.sender),
        );
        log.write_line(
            LogChannel::Authentication,
            &format!("{}: Diffie-Hellman Value is {}.", peer, message.dh_value),
        );
        log.write_hex(
            LogChannel::Authentication,
            &format!("{}: Your nonce was ", peer),
            message.nonce.as_bytes(),
        );
        Ok(message)
    }

    /// Identity must be the peer's and the echoed nonce must be ours, otherwise the handshake stalls
    fn verify(&mut self, message: &HandshakeMessage) -> bool {
        let identity_ok = message.sender == self.role.peer_label();
        let nonce_ok = match &self.nonce {
            Some(nonce) => nonce.matches(message.nonce.as_bytes()),
            None => false,
        };
        if !(identity_ok && nonce_ok) {
            tracing::warn!(
                role = ?self.role,
                identity_ok,
                nonce_ok,
                "handshake verification failed, waiting without authenticating"
            );
            self.step = HandshakeStep::Stalled;
            return false;
        }
        true
    }

    /// Samples the secret exponent and returns `E(<own identity>, peer nonce, g^x mod p)` framed
    fn seal_message<L: LogSink + ?Sized>(
        &mut self,
        psk: &Key,
        log: &mut L,
    ) -> Result<Vec<u8>, ConnectionError> {
        let peer_nonce = match &self.peer_nonce {
            Some(nonce) => nonce.clone(),
            None => Err(MalformedMessage::MissingField("nonce"))?,
        };
        let label = self.role.label();

        self.secret = self.exponents.next_exponent();
        let dh_value = public_value(self.secret);
        log.write_line(
            LogChannel::Authentication,
            &format!(
                "{}: g^{name} mod p: {} with {name}: {}",
                label,
                dh_value,
                self.secret,
                name = self.role.secret_name()
            ),
        );

        let mut plaintext = HandshakeMessage::new(label, peer_nonce, dh_value).encode();
        log.write_hex(LogChannel::Authentication, &format!("{}: ", label), &plaintext);
        let ciphertext = psk.encrypt(&plaintext);
        plaintext.zeroize();
        let ciphertext = ciphertext?;
        log.write_hex(LogChannel::Authentication, &format!("{}: ", label), &ciphertext);

        frame_ciphertext(&ciphertext)
    }

    /// `MD5(decimal(peer^x mod p))` as lowercase hex. Zeroes the exponent and both nonces.
    fn derive_session_key<L: LogSink + ?Sized>(&mut self, peer_value: u64, log: &mut L) -> Key {
        let mut shared = shared_secret(peer_value, self.secret).to_string();
        let session_key = Key::from_text(&hash_hex(shared.as_bytes()), "session key");
        shared.zeroize();
        self.secret.zeroize();
        self.nonce = None;
        self.peer_nonce = None;

        session_key.with(|bytes| {
            log.write_hex(
                LogChannel::Authentication,
                &format!("{}: Calculated session key is ", self.role.label()),
                bytes,
            )
        });
        self.step = HandshakeStep::Complete;
        tracing::info!(role = ?self.role, "handshake complete");
        session_key
    }
}
