//! Record framing for the log engine

use crate::{Error, Result, MAGIC, VERSION};

/// Size of the file header in bytes
pub(crate) const HEADER_SIZE: u64 = 16;

/// kind (1) + key_len (4) + value_len (4)
pub(crate) const RECORD_PREFIX: usize = 9;

pub(crate) const CHECKSUM_LEN: usize = 8;

/// Type tag for records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RecordKind {
    Put,
    Delete,
}

impl RecordKind {
    pub(crate) fn as_byte(&self) -> u8 {
        match self {
            RecordKind::Put => 1,
            RecordKind::Delete => 2,
        }
    }

    pub(crate) fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(RecordKind::Put),
            2 => Some(RecordKind::Delete),
            _ => None,
        }
    }
}

/// A decoded log record
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Record {
    pub kind: RecordKind,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// Lengths read from a record prefix
#[derive(Clone, Copy, Debug)]
pub(crate) struct Prefix {
    pub kind: RecordKind,
    pub key_len: u32,
    pub value_len: u32,
}

impl Prefix {
    /// Total encoded size of the record this prefix starts
    pub(crate) fn record_len(&self) -> u64 {
        record_len(self.key_len as usize, self.value_len as usize)
    }
}

/// Encoded size of a record with the given key and value lengths
pub(crate) fn record_len(key_len: usize, value_len: usize) -> u64 {
    (RECORD_PREFIX + key_len + value_len + CHECKSUM_LEN) as u64
}

/// Build the file header
pub(crate) fn encode_header() -> [u8; HEADER_SIZE as usize] {
    let mut header = [0u8; HEADER_SIZE as usize];
    header[0..8].copy_from_slice(MAGIC);
    header[8..12].copy_from_slice(&VERSION.to_le_bytes());
    header
}

/// Validate a file header
pub(crate) fn check_header(header: &[u8; HEADER_SIZE as usize]) -> Result<()> {
    if &header[0..8] != MAGIC {
        return Err(Error::InvalidFile("Invalid magic bytes".into()));
    }
    let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
    if version != VERSION {
        return Err(Error::VersionMismatch {
            expected: VERSION,
            found: version,
        });
    }
    Ok(())
}

/// Encode a record, including its trailing checksum
pub(crate) fn encode(kind: RecordKind, key: &[u8], value: &[u8]) -> Result<Vec<u8>> {
    let key_len = u32::try_from(key.len()).map_err(|_| Error::ValueTooLarge {
        what: "key",
        len: key.len(),
    })?;
    let value_len = u32::try_from(value.len()).map_err(|_| Error::ValueTooLarge {
        what: "value",
        len: value.len(),
    })?;

    let mut output = Vec::with_capacity(record_len(key.len(), value.len()) as usize);
    output.push(kind.as_byte());
    output.extend_from_slice(&key_len.to_le_bytes());
    output.extend_from_slice(&value_len.to_le_bytes());
    output.extend_from_slice(key);
    output.extend_from_slice(value);
    let sum = checksum(&output);
    output.extend_from_slice(&sum);
    Ok(output)
}

/// Parse a record prefix. Returns `None` for an unknown kind byte.
pub(crate) fn decode_prefix(buf: &[u8; RECORD_PREFIX]) -> Option<Prefix> {
    let kind = RecordKind::from_byte(buf[0])?;
    let key_len = u32::from_le_bytes([buf[1], buf[2], buf[3], buf[4]]);
    let value_len = u32::from_le_bytes([buf[5], buf[6], buf[7], buf[8]]);
    Some(Prefix {
        kind,
        key_len,
        value_len,
    })
}

/// Decode a complete record and verify its checksum
pub(crate) fn decode(data: &[u8]) -> Result<Record> {
    if data.len() < RECORD_PREFIX + CHECKSUM_LEN {
        return Err(Error::Corruption(format!(
            "Short record: {} bytes",
            data.len()
        )));
    }

    let mut prefix_buf = [0u8; RECORD_PREFIX];
    prefix_buf.copy_from_slice(&data[..RECORD_PREFIX]);
    let prefix = decode_prefix(&prefix_buf)
        .ok_or_else(|| Error::Corruption(format!("Invalid record kind: {}", data[0])))?;

    if prefix.record_len() != data.len() as u64 {
        return Err(Error::Corruption(format!(
            "Record length mismatch: header says {}, have {}",
            prefix.record_len(),
            data.len()
        )));
    }

    let body_end = data.len() - CHECKSUM_LEN;
    if checksum(&data[..body_end]) != data[body_end..] {
        return Err(Error::Corruption("Record checksum mismatch".into()));
    }

    let key_end = RECORD_PREFIX + prefix.key_len as usize;
    Ok(Record {
        kind: prefix.kind,
        key: data[RECORD_PREFIX..key_end].to_vec(),
        value: data[key_end..body_end].to_vec(),
    })
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let hash = blake3::hash(body);
    let mut sum = [0u8; CHECKSUM_LEN];
    sum.copy_from_slice(&hash.as_bytes()[..CHECKSUM_LEN]);
    sum
}
