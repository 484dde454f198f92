//! Binary record format shared by the append and read paths.
//!
//! A record is stored as a packed little-endian tuple with no framing beyond
//! the declared lengths:
//!
//! ```text
//! u64 ts_ms | u32 key_len | u32 value_len | key bytes | value bytes
//! ```

use std::io::{self, Read};

pub const RECORD_HEADER_LEN: usize = 16;

/// Declared lengths above these bounds are treated as corruption: they end an
/// index rebuild and truncate a fetch batch.
pub const MAX_KEY_BYTES: u32 = 10 * 1024 * 1024;
pub const MAX_VALUE_BYTES: u32 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub ts_ms: u64,
    pub key_len: u32,
    pub value_len: u32,
}

impl RecordHeader {
    pub fn body_len(&self) -> u64 {
        u64::from(self.key_len) + u64::from(self.value_len)
    }

    pub fn total_len(&self) -> u64 {
        RECORD_HEADER_LEN as u64 + self.body_len()
    }

    pub fn exceeds_limits(&self) -> bool {
        self.key_len > MAX_KEY_BYTES || self.value_len > MAX_VALUE_BYTES
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub ts_ms: u64,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

pub fn encode_record(ts_ms: u64, key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER_LEN + key.len() + value.len());
    buf.extend_from_slice(&ts_ms.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);
    buf
}

pub fn decode_header(buf: &[u8; RECORD_HEADER_LEN]) -> RecordHeader {
    let mut ts_ms = [0u8; 8];
    ts_ms.copy_from_slice(&buf[0..8]);
    let mut key_len = [0u8; 4];
    key_len.copy_from_slice(&buf[8..12]);
    let mut value_len = [0u8; 4];
    value_len.copy_from_slice(&buf[12..16]);

    RecordHeader {
        ts_ms: u64::from_le_bytes(ts_ms),
        key_len: u32::from_le_bytes(key_len),
        value_len: u32::from_le_bytes(value_len),
    }
}

pub fn read_header<R: Read>(reader: &mut R) -> io::Result<RecordHeader> {
    let mut buf = [0u8; RECORD_HEADER_LEN];
    reader.read_exact(&mut buf)?;
    Ok(decode_header(&buf))
}

/// Read one full record from the current position.
///
/// Oversize declared lengths surface as `InvalidData`; a short body as
/// `UnexpectedEof`. Callers treat both as end-of-valid-data.
pub fn read_record<R: Read>(reader: &mut R) -> io::Result<DecodedRecord> {
    let header = read_header(reader)?;
    if header.exceeds_limits() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "declared record lengths exceed limits (key {} bytes, value {} bytes)",
                header.key_len, header.value_len
            ),
        ));
    }

    let mut key = vec![0u8; header.key_len as usize];
    reader.read_exact(&mut key)?;
    let mut value = vec![0u8; header.value_len as usize];
    reader.read_exact(&mut value)?;

    Ok(DecodedRecord {
        ts_ms: header.ts_ms,
        key,
        value,
    })
}
