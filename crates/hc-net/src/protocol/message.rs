use crate::{ConnectionError, MalformedMessage, MAX_FIELD_LEN, MAX_HANDSHAKE_LEN, RECORD_DELIMITER};
use hc_crypto::Nonce;

/// Decrypted handshake payload: `<identity>\r\n<echoed nonce hex>\r\n<DH public value>`
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandshakeMessage {
    pub sender: String,
    pub nonce: Nonce,
    pub dh_value: u64,
}

impl HandshakeMessage {
    pub fn new(sender: impl Into<String>, nonce: Nonce, dh_value: u64) -> Self {
        Self {
            sender: sender.into(),
            nonce,
            dh_value,
        }
    }

    /// Fields are split on CR or LF with empty tokens skipped, so both `\r\n` and bare `\n`
    /// separators are accepted. Tokens after the third are ignored.
    pub fn parse(plaintext: &[u8]) -> Result<Self, ConnectionError> {
        if plaintext.len() > MAX_HANDSHAKE_LEN {
            Err(ConnectionError::MessageTooLong {
                len: plaintext.len(),
                max: MAX_HANDSHAKE_LEN,
            })?
        }

        let mut fields = plaintext
            .split(|byte| *byte == b'\r' || *byte == b'\n')
            .filter(|field| !field.is_empty());

        let sender = next_field(&mut fields, "sender")?;
        let nonce = next_field(&mut fields, "nonce")?;
        let dh_value = next_field(&mut fields, "dh value")?;

        let sender = std::str::from_utf8(sender)
            .map_err(|_| MalformedMessage::InvalidIdentity)?
            .to_string();
        let nonce = Nonce::from_hex(nonce).map_err(MalformedMessage::InvalidNonce)?;
        let dh_value = parse_decimal(dh_value)?;

        Ok(Self {
            sender,
            nonce,
            dh_value,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut plaintext = Vec::with_capacity(MAX_FIELD_LEN);
        plaintext.extend_from_slice(self.sender.as_bytes());
        plaintext.extend_from_slice(RECORD_DELIMITER);
        plaintext.extend_from_slice(self.nonce.to_hex().as_bytes());
        plaintext.extend_from_slice(RECORD_DELIMITER);
        plaintext.extend_from_slice(self.dh_value.to_string().as_bytes());
        plaintext
    }
}

fn next_field<'a>(
    fields: &mut impl Iterator<Item = &'a [u8]>,
    name: &'static str,
) -> Result<&'a [u8], MalformedMessage> {
    match fields.next() {
        Some(field) if field.len() > MAX_FIELD_LEN => Err(MalformedMessage::FieldTooLong(name)),
        Some(field) => Ok(field),
        None => Err(MalformedMessage::MissingField(name)),
    }
}

fn parse_decimal(field: &[u8]) -> Result<u64, MalformedMessage> {
    let invalid = || MalformedMessage::InvalidDhValue(String::from_utf8_lossy(field).into_owned());
    if !field.iter().all(u8::is_ascii_digit) {
        return Err(invalid());
    }
    std::str::from_utf8(field)
        .map_err(|_| invalid())?
        .parse::<u64>()
        .map_err(|_| invalid())
}
