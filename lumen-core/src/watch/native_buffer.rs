//! Codec for native change-notification buffers.
//!
//! A buffer is a chain of little-endian records, each aligned to 4 bytes:
//!
//! ```text
//! next_offset: u32 | action: u32 | flags: u32 | name_len: u32 | name: UTF-16LE
//! ```
//!
//! `next_offset` is the distance from the start of this record to the next
//! one, or 0 for the last record. Flag bit 0 marks a directory. A buffer of
//! zero bytes reports that the producer overflowed and events were lost.

use std::path::PathBuf;

use thiserror::Error;

use crate::watch::source::ChangeAction;

const HEADER_LEN: usize = 16;
const FLAG_DIRECTORY: u32 = 1;

/// One decoded record. `name` is relative to the watched root and may use
/// either `\` or `/` as separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRecord {
    pub name: String,
    pub action: ChangeAction,
    pub is_directory: bool,
}

impl BufferRecord {
    pub fn file(name: impl Into<String>, action: ChangeAction) -> Self {
        Self {
            name: name.into(),
            action,
            is_directory: false,
        }
    }

    pub fn directory(name: impl Into<String>, action: ChangeAction) -> Self {
        Self {
            name: name.into(),
            action,
            is_directory: true,
        }
    }

    /// The name as a relative path, with both separator styles honored and
    /// empty segments dropped.
    pub fn relative_path(&self) -> PathBuf {
        self.name
            .split(['\\', '/'])
            .filter(|segment| !segment.is_empty())
            .collect()
    }
}

/// Decoded content of one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedBuffer {
    /// The producer lost events.
    Overflow,
    Records(Vec<BufferRecord>),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("record at offset {offset} is truncated")]
    Truncated { offset: usize },

    #[error("record at offset {offset} does not advance, next at {next}")]
    NonAdvancingOffset { offset: usize, next: usize },

    #[error("record at offset {offset} has unknown action {code}")]
    UnknownAction { offset: usize, code: u32 },

    #[error("record at offset {offset} has odd name length {len}")]
    OddNameLength { offset: usize, len: usize },

    #[error("record at offset {offset} has a name that is not valid UTF-16")]
    InvalidName { offset: usize },
}

fn read_u32(buffer: &[u8], at: usize) -> Option<u32> {
    let bytes = buffer.get(at..at.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn decode(buffer: &[u8]) -> Result<DecodedBuffer, BufferError> {
    if buffer.is_empty() {
        return Ok(DecodedBuffer::Overflow);
    }

    let mut records = Vec::new();
    let mut offset = 0usize;
    loop {
        let truncated = BufferError::Truncated { offset };
        let field = |index: usize| read_u32(buffer, offset + index * 4);
        let (Some(next), Some(code), Some(flags), Some(name_len)) =
            (field(0), field(1), field(2), field(3))
        else {
            return Err(truncated);
        };

        let name_len = name_len as usize;
        if name_len % 2 != 0 {
            return Err(BufferError::OddNameLength {
                offset,
                len: name_len,
            });
        }
        let action = ChangeAction::from_code(code)
            .ok_or(BufferError::UnknownAction { offset, code })?;

        let name_start = offset + HEADER_LEN;
        let name_bytes = name_start
            .checked_add(name_len)
            .and_then(|end| buffer.get(name_start..end))
            .ok_or(truncated)?;
        let units: Vec<u16> = name_bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let name = String::from_utf16(&units)
            .map_err(|_| BufferError::InvalidName { offset })?;

        records.push(BufferRecord {
            name,
            action,
            is_directory: flags & FLAG_DIRECTORY != 0,
        });

        if next == 0 {
            break;
        }
        let next = next as usize;
        if next < HEADER_LEN + name_len {
            return Err(BufferError::NonAdvancingOffset {
                offset,
                next: offset.saturating_add(next),
            });
        }
        offset = offset
            .checked_add(next)
            .ok_or(BufferError::Truncated { offset })?;
    }

    Ok(DecodedBuffer::Records(records))
}

/// Encode `records` in the layout [`decode`] reads. No records encodes the
/// overflow marker.
pub fn encode(records: &[BufferRecord]) -> Vec<u8> {
    let mut buffer = Vec::new();
    for (index, record) in records.iter().enumerate() {
        let name: Vec<u8> = record
            .name
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        let padded = (HEADER_LEN + name.len()).next_multiple_of(4);
        let next = if index + 1 == records.len() { 0 } else { padded as u32 };
        let flags = if record.is_directory { FLAG_DIRECTORY } else { 0 };

        buffer.extend_from_slice(&next.to_le_bytes());
        buffer.extend_from_slice(&record.action.code().to_le_bytes());
        buffer.extend_from_slice(&flags.to_le_bytes());
        buffer.extend_from_slice(&(name.len() as u32).to_le_bytes());
        buffer.extend_from_slice(&name);
        buffer.resize(buffer.len() + padded - HEADER_LEN - name.len(), 0);
    }
    buffer
}
