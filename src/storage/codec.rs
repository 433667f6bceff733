//! Record framing: a versioned header carrying the payload size and a CRC-32
//!
//! Layout, little endian: `version: u8 | size: u32 | checksum: u32`, then
//! exactly `size` payload bytes.

use bytes::{Buf, BufMut};

pub const FORMAT_VERSION: u8 = 1;
pub const HEADER_LEN: usize = 9;

pub fn checksum(bytes: &[u8]) -> u32 {
    crc32fast::hash(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub version: u8,
    pub size: u32,
    pub checksum: u32,
}

impl RecordHeader {
    /// Header for `payload` at the current format version, `None` if the
    /// payload length does not fit the size field
    pub fn for_payload(payload: &[u8]) -> Option<Self> {
        let size = u32::try_from(payload.len()).ok()?;
        Some(Self {
            version: FORMAT_VERSION,
            size,
            checksum: checksum(payload),
        })
    }

    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut buf = &mut out[..];
        buf.put_u8(self.version);
        buf.put_u32_le(self.size);
        buf.put_u32_le(self.checksum);
        out
    }

    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Self {
        let mut buf = &bytes[..];
        Self {
            version: buf.get_u8(),
            size: buf.get_u32_le(),
            checksum: buf.get_u32_le(),
        }
    }

    pub fn verify(&self, payload: &[u8]) -> bool {
        checksum(payload) == self.checksum
    }
}
