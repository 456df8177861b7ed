//! File-backed state storage
//!
//! A storage directory holds two files:
//!
//! - `edits.log`: append-only edit records, fsynced on every append
//! - `state.snap`: the latest checkpoint
//!
//! # Crash Safety
//!
//! Snapshots follow the write-fsync-rename pattern:
//! 1. Write to `.state.snap.tmp`
//! 2. fsync the temporary file
//! 3. Atomic rename to `state.snap`
//! 4. fsync the directory
//! 5. Truncate the edit log back to its header
//!
//! Sequence numbers are never reused, and the snapshot records the last
//! sequence it covers, so a crash between steps 4 and 5 only leaves edits
//! that recovery skips.
//!
//! A torn record at the end of the log (crash mid-append) is dropped and the
//! log is truncated to the last whole record. A damaged record followed by
//! more data is reported as corruption.
//!
//! An append that fails in-process (short write, failed fsync) truncates the
//! log back to where the record started before returning the error. If that
//! rollback fails too the storage is poisoned: further appends are refused
//! until a snapshot rewrites the log.

use crate::edit::TransactionEdit;
use crate::record::{
    check_log_header, decode_record, decode_snapshot, encode_log_header, encode_record,
    encode_snapshot, RecordRead, LOG_HEADER_SIZE,
};
use crate::storage::{RecoveredState, TransactionStateStorage};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use txcoord_core::{CoordinatorSnapshot, Error, Result};

/// Edit log file name inside the storage directory
pub const LOG_FILE_NAME: &str = "edits.log";

/// Snapshot file name inside the storage directory
pub const SNAPSHOT_FILE_NAME: &str = "state.snap";

const SNAPSHOT_TEMP_NAME: &str = ".state.snap.tmp";

struct LogScan {
    snapshot: Option<CoordinatorSnapshot>,
    watermark: u64,
    edits: Vec<TransactionEdit>,
    last_seq: u64,
    valid_end: u64,
    file_len: u64,
}

/// Durable storage in a local directory
pub struct FileStateStorage {
    dir: PathBuf,
    log: File,
    next_seq: u64,
    poisoned: bool,
}

impl FileStateStorage {
    /// Open (or create) storage in `dir`
    ///
    /// Scans the existing log so new edits continue the sequence, and drops
    /// a torn tail left by a crash.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let log_path = dir.join(LOG_FILE_NAME);
        let mut log = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&log_path)?;

        if log.metadata()?.len() == 0 {
            log.write_all(&encode_log_header())?;
            log.sync_all()?;
            debug!(target: "txcoord::durability", path = %log_path.display(), "Created edit log");
        }

        let mut storage = FileStateStorage {
            dir,
            log,
            next_seq: 1,
            poisoned: false,
        };
        let scan = storage.scan()?;
        if scan.valid_end < scan.file_len {
            warn!(
                target: "txcoord::durability",
                dropped_bytes = scan.file_len - scan.valid_end,
                "Truncating torn tail of edit log"
            );
            storage.log.set_len(scan.valid_end)?;
            storage.log.sync_all()?;
        }
        storage.next_seq = scan.last_seq.max(scan.watermark) + 1;
        storage.log.seek(SeekFrom::End(0))?;
        Ok(storage)
    }

    /// Storage directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Sequence number the next appended edit will get
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }

    fn scan(&mut self) -> Result<LogScan> {
        let (snapshot, watermark) = match self.read_snapshot()? {
            Some((watermark, snapshot)) => (Some(snapshot), watermark),
            None => (None, 0),
        };

        let mut bytes = Vec::new();
        self.log.seek(SeekFrom::Start(0))?;
        self.log.read_to_end(&mut bytes)?;
        check_log_header(&bytes)?;

        let mut edits = Vec::new();
        let mut last_seq = 0;
        let mut offset = LOG_HEADER_SIZE;
        while offset < bytes.len() {
            match decode_record(&bytes[offset..])? {
                RecordRead::Complete(record, consumed) => {
                    if record.seq <= last_seq {
                        return Err(Error::Corruption(format!(
                            "edit log sequence went backwards at {}",
                            record.seq
                        )));
                    }
                    last_seq = record.seq;
                    if record.seq > watermark {
                        edits.push(record.edit);
                    }
                    offset += consumed;
                }
                RecordRead::Incomplete => break,
                RecordRead::ChecksumMismatch(consumed) => {
                    if offset + consumed < bytes.len() {
                        return Err(Error::Corruption(format!(
                            "edit log record at offset {} failed checksum",
                            offset
                        )));
                    }
                    break;
                }
            }
        }

        Ok(LogScan {
            snapshot,
            watermark,
            edits,
            last_seq,
            valid_end: offset as u64,
            file_len: bytes.len() as u64,
        })
    }

    /// Append one record using `write` for the I/O, rolling the log back
    /// to the record's start offset if it fails
    fn append_with<F>(&mut self, edit: &TransactionEdit, write: F) -> Result<()>
    where
        F: FnOnce(&mut File, &[u8]) -> io::Result<()>,
    {
        if self.poisoned {
            return Err(Error::InvalidOperation(
                "edit log is poisoned by a failed rollback".to_string(),
            ));
        }
        let seq = self.next_seq;
        let record = encode_record(seq, edit)?;
        self.next_seq += 1;

        let start = self.log.seek(SeekFrom::End(0))?;
        let Err(e) = write(&mut self.log, &record) else {
            return Ok(());
        };
        match self.rollback(start) {
            Ok(()) => warn!(
                target: "txcoord::durability",
                seq,
                offset = start,
                error = %e,
                "Rolled back failed edit append"
            ),
            Err(rollback) => {
                self.poisoned = true;
                error!(
                    target: "txcoord::durability",
                    seq,
                    offset = start,
                    error = %e,
                    rollback_error = %rollback,
                    "Edit log rollback failed, refusing further appends"
                );
            }
        }
        Err(e.into())
    }

    fn rollback(&mut self, len: u64) -> io::Result<()> {
        self.log.set_len(len)?;
        self.log.sync_all()?;
        self.log.seek(SeekFrom::End(0))?;
        Ok(())
    }

    fn read_snapshot(&self) -> Result<Option<(u64, CoordinatorSnapshot)>> {
        let path = self.dir.join(SNAPSHOT_FILE_NAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        decode_snapshot(&bytes).map(Some)
    }
}

impl TransactionStateStorage for FileStateStorage {
    fn append(&mut self, edit: &TransactionEdit) -> Result<()> {
        self.append_with(edit, |log, record| {
            log.write_all(record)?;
            log.sync_data()
        })
    }

    fn write_snapshot(&mut self, snapshot: &CoordinatorSnapshot) -> Result<()> {
        let watermark = self.next_seq - 1;
        let bytes = encode_snapshot(watermark, snapshot)?;

        let temp_path = self.dir.join(SNAPSHOT_TEMP_NAME);
        let final_path = self.dir.join(SNAPSHOT_FILE_NAME);
        {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&temp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &final_path)?;
        File::open(&self.dir)?.sync_all()?;

        self.rollback(LOG_HEADER_SIZE as u64)?;
        self.poisoned = false;

        info!(
            target: "txcoord::durability",
            watermark,
            last_pointer = snapshot.last_pointer,
            bytes = bytes.len(),
            "Wrote state snapshot"
        );
        Ok(())
    }

    fn recover(&mut self) -> Result<RecoveredState> {
        let scan = self.scan()?;
        self.log.seek(SeekFrom::End(0))?;
        debug!(
            target: "txcoord::durability",
            has_snapshot = scan.snapshot.is_some(),
            edits = scan.edits.len(),
            "Loaded persisted state"
        );
        Ok(RecoveredState {
            snapshot: scan.snapshot,
            edits: scan.edits,
        })
    }

    fn name(&self) -> &'static str {
        "file"
    }
}
