//! On-disk formats for the file-backed state storage.
//!
//! # Edit log (`edits.log`)
//!
//! ```text
//! ┌──────────────┬──────────────────┐
//! │ Magic "TXCL" │ Format ver (u32) │   header, 8 bytes
//! └──────────────┴──────────────────┘
//! ┌─────────────────┬──────────┬───────────────────────┬──────────┐
//! │ Length (u32)    │ Seq (u64)│ Payload (msgpack)     │ CRC32    │   per record
//! └─────────────────┴──────────┴───────────────────────┴──────────┘
//! ```
//!
//! Length counts payload bytes only. The CRC covers seq and payload.
//!
//! # Snapshot (`state.snap`)
//!
//! ```text
//! ┌──────────────┬─────────┬────────────────┬──────────────┬─────────┬───────┐
//! │ Magic "TXCS" │ Ver u32 │ Watermark u64  │ Length u64   │ Payload │ CRC32 │
//! └──────────────┴─────────┴────────────────┴──────────────┴─────────┴───────┘
//! ```
//!
//! The watermark is the sequence number of the last edit covered by the
//! snapshot. The CRC covers every preceding byte. All integers are
//! little-endian.

use crate::edit::TransactionEdit;
use txcoord_core::{CoordinatorSnapshot, Error, Result};

/// Magic bytes identifying an edit log: "TXCL"
pub const LOG_MAGIC: [u8; 4] = *b"TXCL";

/// Magic bytes identifying a snapshot file: "TXCS"
pub const SNAPSHOT_MAGIC: [u8; 4] = *b"TXCS";

/// Current format version for both files
pub const FORMAT_VERSION: u32 = 1;

/// Size of the edit log header in bytes
pub const LOG_HEADER_SIZE: usize = 8;

const RECORD_PREFIX_SIZE: usize = 4 + 8;
const CRC_SIZE: usize = 4;
const SNAPSHOT_PREFIX_SIZE: usize = 4 + 4 + 8 + 8;

/// Upper bound on a single record payload; anything larger is garbage
pub const MAX_RECORD_SIZE: usize = 64 * 1024 * 1024;

/// A decoded edit log record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Position in the log; strictly increasing, never reused
    pub seq: u64,
    /// The persisted edit
    pub edit: TransactionEdit,
}

/// Result of decoding one record from the front of a buffer
#[derive(Debug)]
pub enum RecordRead {
    /// A whole record and the number of bytes it occupied
    Complete(LogRecord, usize),
    /// The buffer ends before the record does
    Incomplete,
    /// The record is whole but its checksum is wrong; carries its size
    ChecksumMismatch(usize),
}

/// Encode the edit log header
pub fn encode_log_header() -> [u8; LOG_HEADER_SIZE] {
    let mut bytes = [0u8; LOG_HEADER_SIZE];
    bytes[0..4].copy_from_slice(&LOG_MAGIC);
    bytes[4..8].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes
}

/// Validate the edit log header
pub fn check_log_header(bytes: &[u8]) -> Result<()> {
    if bytes.len() < LOG_HEADER_SIZE || bytes[0..4] != LOG_MAGIC {
        return Err(Error::Corruption("edit log has no valid header".into()));
    }
    let version = read_u32(&bytes[4..8]);
    if version != FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported edit log format version {}",
            version
        )));
    }
    Ok(())
}

/// Encode one edit as a framed log record
pub fn encode_record(seq: u64, edit: &TransactionEdit) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec(edit)?;
    if payload.len() > MAX_RECORD_SIZE {
        return Err(Error::InvalidOperation(format!(
            "edit of {} bytes exceeds the record size limit",
            payload.len()
        )));
    }

    let mut buf = Vec::with_capacity(RECORD_PREFIX_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&seq.to_le_bytes());
    buf.extend_from_slice(&payload);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&buf[4..]);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());
    Ok(buf)
}

/// Decode the record at the front of `buf`
pub fn decode_record(buf: &[u8]) -> Result<RecordRead> {
    if buf.len() < RECORD_PREFIX_SIZE {
        return Ok(RecordRead::Incomplete);
    }
    let len = read_u32(&buf[0..4]) as usize;
    if len > MAX_RECORD_SIZE {
        return Err(Error::Corruption(format!(
            "record length {} exceeds limit",
            len
        )));
    }
    let total = RECORD_PREFIX_SIZE + len + CRC_SIZE;
    if buf.len() < total {
        return Ok(RecordRead::Incomplete);
    }

    let body = &buf[4..RECORD_PREFIX_SIZE + len];
    let stored_crc = read_u32(&buf[RECORD_PREFIX_SIZE + len..total]);
    if crc32fast::hash(body) != stored_crc {
        return Ok(RecordRead::ChecksumMismatch(total));
    }

    let seq = read_u64(&buf[4..12]);
    let edit: TransactionEdit = rmp_serde::from_slice(&buf[RECORD_PREFIX_SIZE..RECORD_PREFIX_SIZE + len])?;
    Ok(RecordRead::Complete(LogRecord { seq, edit }, total))
}

/// Encode a snapshot file body
pub fn encode_snapshot(watermark: u64, snapshot: &CoordinatorSnapshot) -> Result<Vec<u8>> {
    let payload = rmp_serde::to_vec(snapshot)?;

    let mut buf = Vec::with_capacity(SNAPSHOT_PREFIX_SIZE + payload.len() + CRC_SIZE);
    buf.extend_from_slice(&SNAPSHOT_MAGIC);
    buf.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    buf.extend_from_slice(&watermark.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    buf.extend_from_slice(&payload);

    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    Ok(buf)
}

/// Decode a snapshot file body into its watermark and contents
pub fn decode_snapshot(bytes: &[u8]) -> Result<(u64, CoordinatorSnapshot)> {
    if bytes.len() < SNAPSHOT_PREFIX_SIZE + CRC_SIZE {
        return Err(Error::Corruption("snapshot file too short".into()));
    }
    if bytes[0..4] != SNAPSHOT_MAGIC {
        return Err(Error::Corruption("snapshot file has bad magic".into()));
    }
    let version = read_u32(&bytes[4..8]);
    if version != FORMAT_VERSION {
        return Err(Error::Corruption(format!(
            "unsupported snapshot format version {}",
            version
        )));
    }
    let watermark = read_u64(&bytes[8..16]);
    let len = usize::try_from(read_u64(&bytes[16..24]))
        .map_err(|_| Error::Corruption("snapshot length overflows".into()))?;
    let end = SNAPSHOT_PREFIX_SIZE
        .checked_add(len)
        .filter(|end| end.saturating_add(CRC_SIZE) == bytes.len())
        .ok_or_else(|| Error::Corruption("snapshot length does not match file size".into()))?;

    let stored_crc = read_u32(&bytes[end..end + CRC_SIZE]);
    if crc32fast::hash(&bytes[..end]) != stored_crc {
        return Err(Error::Corruption("snapshot checksum mismatch".into()));
    }

    let snapshot = rmp_serde::from_slice(&bytes[SNAPSHOT_PREFIX_SIZE..end])?;
    Ok((watermark, snapshot))
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(arr)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(arr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use txcoord_core::ChangeSet;

    fn sample_edit() -> TransactionEdit {
        TransactionEdit::ChangesRegistered {
            write_pointer: 3,
            commit_pointer: 8,
            changes: ChangeSet::from_iter([b"row-a".to_vec(), b"row-b".to_vec()]),
        }
    }

    #[test]
    fn test_record_decodes_what_was_encoded() {
        let bytes = encode_record(42, &sample_edit()).unwrap();
        match decode_record(&bytes).unwrap() {
            RecordRead::Complete(record, consumed) => {
                assert_eq!(record.seq, 42);
                assert_eq!(record.edit, sample_edit());
                assert_eq!(consumed, bytes.len());
            }
            other => panic!("expected complete record, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_record_is_incomplete() {
        let bytes = encode_record(1, &sample_edit()).unwrap();
        for cut in [0, 5, bytes.len() - 1] {
            assert!(matches!(
                decode_record(&bytes[..cut]).unwrap(),
                RecordRead::Incomplete
            ));
        }
    }

    #[test]
    fn test_flipped_byte_fails_checksum() {
        let mut bytes = encode_record(1, &sample_edit()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        assert!(matches!(
            decode_record(&bytes).unwrap(),
            RecordRead::ChecksumMismatch(n) if n == bytes.len()
        ));
    }

    #[test]
    fn test_absurd_length_is_corruption() {
        let mut bytes = vec![0xFF, 0xFF, 0xFF, 0xFF];
        bytes.extend_from_slice(&[0u8; 16]);
        assert!(matches!(decode_record(&bytes), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_log_header_validation() {
        assert!(check_log_header(&encode_log_header()).is_ok());
        assert!(check_log_header(b"NOPE\x01\x00\x00\x00").is_err());
        assert!(check_log_header(b"TXC").is_err());
    }

    #[test]
    fn test_snapshot_checksum_detects_damage() {
        let mut snapshot = CoordinatorSnapshot::default();
        snapshot.last_pointer = 12;
        snapshot.invalid.insert(4);

        let mut bytes = encode_snapshot(7, &snapshot).unwrap();
        let (watermark, decoded) = decode_snapshot(&bytes).unwrap();
        assert_eq!(watermark, 7);
        assert_eq!(decoded, snapshot);

        let last = bytes.len() - 5;
        bytes[last] ^= 0x01;
        assert!(matches!(decode_snapshot(&bytes), Err(Error::Corruption(_))));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn truncated_record_is_incomplete(
                keys in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..16), 0..6),
                cut in any::<prop::sample::Index>(),
            ) {
                let edit = TransactionEdit::ChangesRegistered {
                    write_pointer: 1,
                    commit_pointer: 2,
                    changes: keys.into_iter().collect(),
                };
                let bytes = encode_record(9, &edit).unwrap();
                let cut = cut.index(bytes.len());
                prop_assert!(matches!(decode_record(&bytes[..cut]), Ok(RecordRead::Incomplete)));
            }

            #[test]
            fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
                let _ = decode_record(&bytes);
            }
        }
    }
}
