//! Bounded response body reader
//!
//! Handles fixed-length, chunked and read-until-close bodies. A body that
//! would not fit `capacity` is drained and rejected, never truncated.

use super::{BodyStream, Framing, TransportError};
use bytes::{Buf, BytesMut};
use thiserror::Error;
use tracing::debug;

const MAX_SIZE_LINE: usize = 256;

#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("body of {declared} bytes does not fit buffer of {capacity}")]
    Overflow { declared: usize, capacity: usize },

    #[error("body ended after {read} of {expected} bytes")]
    Truncated { read: usize, expected: usize },

    #[error("malformed chunk size line '{0}'")]
    ChunkSize(String),

    #[error("empty body")]
    Empty,

    #[error("body not read")]
    NotRead,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

struct BodyReader<'a> {
    body: &'a mut dyn BodyStream,
    buf: BytesMut,
    eof: bool,
}

impl<'a> BodyReader<'a> {
    fn new(body: &'a mut dyn BodyStream) -> Self {
        Self {
            body,
            buf: BytesMut::new(),
            eof: false,
        }
    }

    /// Pull one more piece into the buffer, false at end of stream
    async fn fill(&mut self) -> Result<bool, TransportError> {
        if self.eof {
            return Ok(false);
        }
        match self.body.next_chunk().await? {
            Some(chunk) => {
                self.buf.extend_from_slice(&chunk);
                Ok(true)
            }
            None => {
                self.eof = true;
                Ok(false)
            }
        }
    }

    /// Bytes up to (not including) the next `\n`; `None` at a clean end of stream
    async fn read_line(&mut self) -> Result<Option<Vec<u8>>, PayloadError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                let line = self.buf.split_to(pos + 1);
                return Ok(Some(line[..pos].to_vec()));
            }
            if self.buf.len() > MAX_SIZE_LINE {
                let line = String::from_utf8_lossy(&self.buf[..MAX_SIZE_LINE]).into_owned();
                return Err(PayloadError::ChunkSize(line));
            }
            if !self.fill().await? {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.buf.split().to_vec()));
            }
        }
    }

    /// Append up to `n` bytes to `out`, fewer only if the stream ends
    async fn read_into(&mut self, out: &mut Vec<u8>, n: usize) -> Result<usize, TransportError> {
        let mut remaining = n;
        while remaining > 0 {
            if self.buf.is_empty() && !self.fill().await? {
                break;
            }
            let take = remaining.min(self.buf.len());
            out.extend_from_slice(&self.buf[..take]);
            self.buf.advance(take);
            remaining -= take;
        }
        Ok(n - remaining)
    }

    async fn skip(&mut self, n: usize) -> Result<(), TransportError> {
        let mut remaining = n;
        while remaining > 0 {
            if self.buf.is_empty() && !self.fill().await? {
                break;
            }
            let take = remaining.min(self.buf.len());
            self.buf.advance(take);
            remaining -= take;
        }
        Ok(())
    }

    /// Discard the rest of the body so the connection is left clean
    async fn drain(&mut self) -> usize {
        let mut discarded = self.buf.len();
        self.buf.clear();
        loop {
            match self.fill().await {
                Ok(true) => {
                    discarded += self.buf.len();
                    self.buf.clear();
                }
                Ok(false) => break,
                Err(e) => {
                    debug!(error = %e, "Body drain stopped early");
                    break;
                }
            }
        }
        discarded
    }
}

/// Read a whole body according to `framing`
///
/// `capacity` bounds the decoded size: anything that would reach it is
/// rejected with [`PayloadError::Overflow`] after the stream is drained.
pub async fn read_payload(
    framing: Framing,
    body: &mut dyn BodyStream,
    capacity: usize,
) -> Result<Vec<u8>, PayloadError> {
    let mut reader = BodyReader::new(body);
    let data = match framing {
        Framing::Length(len) => read_fixed(&mut reader, len, capacity).await?,
        Framing::Chunked => read_chunked(&mut reader, capacity).await?,
        Framing::UntilClose => read_to_close(&mut reader, capacity).await?,
    };
    if data.is_empty() {
        return Err(PayloadError::Empty);
    }
    Ok(data)
}

async fn read_fixed(
    reader: &mut BodyReader<'_>,
    len: usize,
    capacity: usize,
) -> Result<Vec<u8>, PayloadError> {
    if len >= capacity {
        let discarded = reader.drain().await;
        debug!(declared = len, capacity, discarded, "Fixed-length body rejected");
        return Err(PayloadError::Overflow {
            declared: len,
            capacity,
        });
    }

    let mut out = Vec::with_capacity(len);
    let read = reader.read_into(&mut out, len).await?;
    if read < len {
        return Err(PayloadError::Truncated {
            read,
            expected: len,
        });
    }
    Ok(out)
}

async fn read_chunked(reader: &mut BodyReader<'_>, capacity: usize) -> Result<Vec<u8>, PayloadError> {
    let mut out = Vec::new();
    loop {
        // A stream that closes before the zero-size chunk yields what was read
        let Some(line) = reader.read_line().await? else {
            break;
        };
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches('\r');
        let size_text = line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| PayloadError::ChunkSize(line.to_string()))?;

        if size == 0 {
            reader.drain().await;
            break;
        }

        let declared = out.len().saturating_add(size);
        if declared >= capacity {
            let discarded = reader.drain().await;
            debug!(declared, capacity, discarded, "Chunked body rejected");
            return Err(PayloadError::Overflow { declared, capacity });
        }

        if reader.read_into(&mut out, size).await? < size {
            break;
        }
        reader.skip(2).await?;
    }
    Ok(out)
}

async fn read_to_close(reader: &mut BodyReader<'_>, capacity: usize) -> Result<Vec<u8>, PayloadError> {
    let mut out = Vec::new();
    loop {
        if reader.buf.is_empty() && !reader.fill().await? {
            break;
        }
        let declared = out.len() + reader.buf.len();
        if declared >= capacity {
            let discarded = reader.drain().await;
            debug!(declared, capacity, discarded, "Unframed body rejected");
            return Err(PayloadError::Overflow { declared, capacity });
        }
        out.extend_from_slice(&reader.buf);
        reader.buf.clear();
    }
    Ok(out)
}
