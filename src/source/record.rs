// src/source/record.rs

//! Wire format of a notification batch.
//!
//! A batch is a sequence of variable-length little-endian records:
//!
//! ```text
//! offset  size  field
//! 0       4     next_entry_offset   bytes from this record to the next; 0 = last
//! 4       4     action              1 added, 2 removed, 3 modified,
//!                                   4 renamed (old name), 5 renamed (new name)
//! 8       4     name_length         length of `name` in bytes
//! 12      n     name                UTF-8 path relative to the watched root
//! ```
//!
//! Records are padded to 4-byte alignment. [`RecordBatch`] writes batches and
//! [`ChangeRecords`] reads them back without ever looking past the slice.

use std::path::{Path, PathBuf};

/// Size of the fixed record header.
pub const HEADER_LEN: usize = 12;

const ALIGN: usize = 4;

/// Kind of a single raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawChangeKind {
    Added,
    Removed,
    Modified,
    /// First half of a rename: the name the entry had before.
    RenamedOld,
    /// Second half of a rename: the name the entry has now.
    RenamedNew,
    /// An action code this build does not understand.
    Unknown(u32),
}

impl RawChangeKind {
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => RawChangeKind::Added,
            2 => RawChangeKind::Removed,
            3 => RawChangeKind::Modified,
            4 => RawChangeKind::RenamedOld,
            5 => RawChangeKind::RenamedNew,
            other => RawChangeKind::Unknown(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            RawChangeKind::Added => 1,
            RawChangeKind::Removed => 2,
            RawChangeKind::Modified => 3,
            RawChangeKind::RenamedOld => 4,
            RawChangeKind::RenamedNew => 5,
            RawChangeKind::Unknown(code) => code,
        }
    }
}

/// One decoded record, with its name resolved against the watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChangeEvent {
    pub kind: RawChangeKind,
    pub path: PathBuf,
}

/// Bytes one record with a name of `name_len` bytes occupies, padding included.
pub fn encoded_len(name_len: usize) -> usize {
    (HEADER_LEN + name_len).div_ceil(ALIGN) * ALIGN
}

/// Builder for a single batch with a fixed byte capacity.
#[derive(Debug, Clone)]
pub struct RecordBatch {
    buf: Vec<u8>,
    capacity: usize,
    last: Option<usize>,
    records: usize,
}

impl RecordBatch {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::new(),
            capacity,
            last: None,
            records: 0,
        }
    }

    /// Bytes still available.
    pub fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.buf.len())
    }

    /// Append a record. Returns `false` (and leaves the batch untouched) if
    /// it does not fit.
    pub fn push(&mut self, kind: RawChangeKind, name: &str) -> bool {
        let name = name.as_bytes();
        let len = encoded_len(name.len());
        if len > self.remaining() {
            return false;
        }
        let Ok(name_len) = u32::try_from(name.len()) else {
            return false;
        };

        let start = self.buf.len();
        if let Some(prev) = self.last {
            // Both offsets are bounded by `capacity`, which already fit in memory.
            let delta = (start - prev) as u32;
            self.buf[prev..prev + 4].copy_from_slice(&delta.to_le_bytes());
        }

        self.buf.extend_from_slice(&0u32.to_le_bytes());
        self.buf.extend_from_slice(&kind.code().to_le_bytes());
        self.buf.extend_from_slice(&name_len.to_le_bytes());
        self.buf.extend_from_slice(name);
        self.buf.resize(start + len, 0);

        self.last = Some(start);
        self.records += 1;
        true
    }

    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Single-pass iterator over the records of one batch.
///
/// Iteration stops early, and [`is_truncated`](Self::is_truncated) reports
/// `true`, when a record header, a name, or a `next_entry_offset` would point
/// outside the buffer. Such a batch is corrupt; nothing past the last valid
/// record is read.
#[derive(Debug)]
pub struct ChangeRecords<'a> {
    buf: &'a [u8],
    root: &'a Path,
    cursor: Option<usize>,
    truncated: bool,
}

impl<'a> ChangeRecords<'a> {
    pub fn new(buf: &'a [u8], root: &'a Path) -> Self {
        Self {
            buf,
            root,
            cursor: if buf.is_empty() { None } else { Some(0) },
            truncated: false,
        }
    }

    /// Whether parsing stopped on a malformed record chain.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    fn stop(&mut self) -> Option<RawChangeEvent> {
        self.cursor = None;
        self.truncated = true;
        None
    }
}

impl Iterator for ChangeRecords<'_> {
    type Item = RawChangeEvent;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.cursor.take()?;

        let Some(header) = offset
            .checked_add(HEADER_LEN)
            .and_then(|end| self.buf.get(offset..end))
        else {
            return self.stop();
        };
        let next = read_u32(header, 0) as usize;
        let action = read_u32(header, 4);
        let name_len = read_u32(header, 8) as usize;

        let name_start = offset + HEADER_LEN;
        let Some(name) = name_start
            .checked_add(name_len)
            .and_then(|end| self.buf.get(name_start..end))
        else {
            return self.stop();
        };

        if next != 0 {
            match offset.checked_add(next) {
                Some(at) if next >= HEADER_LEN + name_len && at < self.buf.len() => {
                    self.cursor = Some(at);
                }
                _ => self.truncated = true,
            }
        }

        let name = String::from_utf8_lossy(name);
        Some(RawChangeEvent {
            kind: RawChangeKind::from_code(action),
            path: self.root.join(name.as_ref()),
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(records: &[(RawChangeKind, &str)]) -> Vec<u8> {
        let mut batch = RecordBatch::with_capacity(64 * 1024);
        for (kind, name) in records {
            assert!(batch.push(*kind, name));
        }
        batch.into_bytes()
    }

    #[test]
    fn decodes_every_record_in_order() {
        let bytes = batch(&[
            (RawChangeKind::Added, "a.txt"),
            (RawChangeKind::RenamedOld, "old/b.bin"),
            (RawChangeKind::RenamedNew, "new/b.bin"),
        ]);
        let root = Path::new("/root");
        let mut records = ChangeRecords::new(&bytes, root);

        let events: Vec<_> = records.by_ref().collect();
        assert_eq!(
            events,
            vec![
                RawChangeEvent { kind: RawChangeKind::Added, path: root.join("a.txt") },
                RawChangeEvent { kind: RawChangeKind::RenamedOld, path: root.join("old/b.bin") },
                RawChangeEvent { kind: RawChangeKind::RenamedNew, path: root.join("new/b.bin") },
            ]
        );
        assert!(!records.is_truncated());
    }

    #[test]
    fn empty_buffer_yields_nothing() {
        let mut records = ChangeRecords::new(&[], Path::new("/"));
        assert!(records.next().is_none());
        assert!(!records.is_truncated());
    }

    #[test]
    fn records_are_aligned() {
        let bytes = batch(&[(RawChangeKind::Modified, "abc"), (RawChangeKind::Removed, "d")]);
        assert_eq!(bytes.len(), encoded_len(3) + encoded_len(1));
        assert_eq!(read_u32(&bytes, 0) as usize, encoded_len(3));
        assert_eq!(encoded_len(3) % 4, 0);
    }

    #[test]
    fn next_offset_past_end_stops_after_current_record() {
        let mut bytes = batch(&[(RawChangeKind::Added, "one"), (RawChangeKind::Added, "two")]);
        bytes[0..4].copy_from_slice(&10_000u32.to_le_bytes());

        let mut records = ChangeRecords::new(&bytes, Path::new("/w"));
        let events: Vec<_> = records.by_ref().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].path, Path::new("/w/one"));
        assert!(records.is_truncated());
    }

    #[test]
    fn name_length_past_end_is_rejected() {
        let mut bytes = batch(&[(RawChangeKind::Added, "one")]);
        bytes[8..12].copy_from_slice(&u32::MAX.to_le_bytes());

        let mut records = ChangeRecords::new(&bytes, Path::new("/w"));
        assert!(records.next().is_none());
        assert!(records.is_truncated());
    }

    #[test]
    fn backwards_or_overlapping_offset_is_corrupt() {
        let mut bytes = batch(&[(RawChangeKind::Added, "first"), (RawChangeKind::Added, "second")]);
        bytes[0..4].copy_from_slice(&4u32.to_le_bytes());

        let mut records = ChangeRecords::new(&bytes, Path::new("/w"));
        assert_eq!(records.by_ref().count(), 1);
        assert!(records.is_truncated());
    }

    #[test]
    fn header_cut_short_is_rejected() {
        let bytes = batch(&[(RawChangeKind::Added, "x")]);
        let mut records = ChangeRecords::new(&bytes[..HEADER_LEN - 1], Path::new("/w"));
        assert!(records.next().is_none());
        assert!(records.is_truncated());
    }

    #[test]
    fn unknown_action_codes_are_preserved() {
        let mut bytes = batch(&[(RawChangeKind::Added, "x")]);
        bytes[4..8].copy_from_slice(&42u32.to_le_bytes());
        let event = ChangeRecords::new(&bytes, Path::new("/w")).next().unwrap();
        assert_eq!(event.kind, RawChangeKind::Unknown(42));
    }

    #[test]
    fn push_refuses_records_that_do_not_fit() {
        let mut batch = RecordBatch::with_capacity(encoded_len(4));
        assert!(batch.push(RawChangeKind::Added, "abcd"));
        assert!(!batch.push(RawChangeKind::Added, "e"));
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.remaining(), 0);
    }
}
