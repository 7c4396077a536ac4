//! Incremental RecordIO framing.
//!
//! Event streams arrive RecordIO-framed: each record is preceded by its
//! byte length in decimal followed by a newline. HTTP chunk boundaries
//! are arbitrary: a chunk may contain many records, a fraction of one,
//! or even a fraction of a length prefix. [`RecordIoDecoder`] buffers
//! input across [`RecordIoDecoder::feed`] calls and yields only complete
//! records.

use crate::error::{Result, SchedulerError};
use bytes::{Bytes, BytesMut};

/// Upper bound on a single record, guarding against corrupt prefixes.
const MAX_RECORD_LEN: usize = 16 * 1024 * 1024;

/// Longest plausible length prefix; more buffered bytes without a
/// newline means the stream is not RecordIO.
const MAX_PREFIX_DIGITS: usize = 20;

/// Frame a record for the wire.
#[must_use]
pub fn encode_frame(record: &[u8]) -> Bytes {
    let mut framed = BytesMut::with_capacity(record.len() + 12);
    framed.extend_from_slice(record.len().to_string().as_bytes());
    framed.extend_from_slice(b"\n");
    framed.extend_from_slice(record);
    framed.freeze()
}

/// Stateful RecordIO frame decoder.
#[derive(Debug, Default)]
pub struct RecordIoDecoder {
    buffer: BytesMut,
    pending: Option<usize>,
}

impl RecordIoDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        RecordIoDecoder::default()
    }

    /// Discard buffered state, e.g. when a new stream replaces the
    /// current one.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.pending = None;
    }

    /// Append a body chunk and return every record completed by it.
    ///
    /// A malformed length prefix poisons the stream and is reported as
    /// [`SchedulerError::Recordio`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<Bytes>> {
        self.buffer.extend_from_slice(chunk);

        let mut records = Vec::new();
        loop {
            match self.pending {
                None => {
                    let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') else {
                        if self.buffer.len() > MAX_PREFIX_DIGITS {
                            return Err(SchedulerError::Recordio(
                                "length prefix not terminated".to_string(),
                            ));
                        }
                        break;
                    };
                    let prefix = self.buffer.split_to(newline + 1);
                    let digits = &prefix[..newline];
                    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
                        return Err(SchedulerError::Recordio(format!(
                            "invalid length prefix {:?}",
                            String::from_utf8_lossy(digits)
                        )));
                    }
                    let len: usize = String::from_utf8_lossy(digits).parse().map_err(|_| {
                        SchedulerError::Recordio(format!(
                            "length prefix out of range {:?}",
                            String::from_utf8_lossy(digits)
                        ))
                    })?;
                    if len > MAX_RECORD_LEN {
                        return Err(SchedulerError::Recordio(format!(
                            "record of {} bytes exceeds limit",
                            len
                        )));
                    }
                    self.pending = Some(len);
                }
                Some(len) => {
                    if self.buffer.len() < len {
                        break;
                    }
                    records.push(self.buffer.split_to(len).freeze());
                    self.pending = None;
                }
            }
        }
        Ok(records)
    }
}
