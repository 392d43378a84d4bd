use crate::{ConnectionError, MalformedMessage, MAX_RECORD_LEN, RECORD_DELIMITER};

/// What the next record on the wire looks like
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RecordKind {
    /// Exactly `len` raw bytes, optionally followed by the delimiter
    Fixed { len: usize, terminated: bool },
    /// Bytes up to a strict CRLF, which is consumed but not returned
    Line,
}

/// Accumulates a byte stream and hands out complete records
#[derive(Debug, Default)]
pub struct RecordFramer {
    buffer: Vec<u8>,
}

impl RecordFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Number of bytes waiting for a complete record
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns `Ok(None)` until a full record of `kind` is buffered
    pub fn next_record(&mut self, kind: RecordKind) -> Result<Option<Vec<u8>>, ConnectionError> {
        match kind {
            RecordKind::Fixed { len, terminated } => self.next_fixed(len, terminated),
            RecordKind::Line => self.next_line(),
        }
    }

    fn next_fixed(
        &mut self,
        len: usize,
        terminated: bool,
    ) -> Result<Option<Vec<u8>>, ConnectionError> {
        let total = len + if terminated { RECORD_DELIMITER.len() } else { 0 };
        if self.buffer.len() < total {
            return Ok(None);
        }
        if terminated && &self.buffer[len..total] != RECORD_DELIMITER {
            Err(MalformedMessage::MissingDelimiter)?
        }
        let record = self.buffer[..len].to_vec();
        self.buffer.drain(..total);
        Ok(Some(record))
    }

    fn next_line(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        match find_delimiter(&self.buffer) {
            Some(end) if end > MAX_RECORD_LEN => Err(ConnectionError::MessageTooLong {
                len: end,
                max: MAX_RECORD_LEN,
            }),
            Some(end) => {
                let record = self.buffer[..end].to_vec();
                self.buffer.drain(..end + RECORD_DELIMITER.len());
                Ok(Some(record))
            }
            None if self.buffer.len() > MAX_RECORD_LEN => Err(ConnectionError::MessageTooLong {
                len: self.buffer.len(),
                max: MAX_RECORD_LEN,
            }),
            None => Ok(None),
        }
    }
}

fn find_delimiter(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(RECORD_DELIMITER.len())
        .position(|window| window == RECORD_DELIMITER)
}

/// Appends the record delimiter
pub fn encode_line(payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(payload.len() + RECORD_DELIMITER.len());
    record.extend_from_slice(payload);
    record.extend_from_slice(RECORD_DELIMITER);
    record
}

/// Frames a ciphertext as a line, refusing bytes that would split the record
pub fn frame_ciphertext(ciphertext: &[u8]) -> Result<Vec<u8>, ConnectionError> {
    if find_delimiter(ciphertext).is_some() {
        Err(ConnectionError::UnframeableCiphertext)?
    }
    if ciphertext.len() > MAX_RECORD_LEN {
        Err(ConnectionError::MessageTooLong {
            len: ciphertext.len(),
            max: MAX_RECORD_LEN,
        })?
    }
    Ok(encode_line(ciphertext))
}
