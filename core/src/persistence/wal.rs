use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::collection::Collections;

use super::fsync::{ensure_parent_dir, sync_parent_dir, truncate_file_fully_synced};
use super::{replay_wal_record, PersistenceError, WalRecord};

/// On-disk line: the record plus a CRC32 of its exact serialized bytes.
#[derive(Serialize)]
struct WalLineOut<'a> {
    crc32: u32,
    record: &'a RawValue,
}

#[derive(Deserialize)]
struct WalLineIn<'a> {
    crc32: u32,
    #[serde(borrow)]
    record: &'a RawValue,
}

pub fn append_wal_batch(
    path: &Path,
    records: &[WalRecord],
    sync_on_write: bool,
) -> Result<(), PersistenceError> {
    if records.is_empty() {
        return Ok(());
    }
    ensure_parent_dir(path)?;

    let mut buffer = Vec::new();
    for record in records {
        encode_line(record, &mut buffer)?;
    }

    let existed = path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(&buffer)?;
    if sync_on_write {
        file.flush()?;
        file.sync_data()?;
    }
    if !existed {
        sync_parent_dir(path)?;
    }
    Ok(())
}

pub fn truncate_wal(path: &Path) -> Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    truncate_file_fully_synced(path)?;
    Ok(())
}

pub fn replay_wal(path: &Path, collections: &mut Collections) -> Result<(), PersistenceError> {
    if !path.exists() {
        return Ok(());
    }

    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let mut line = String::new();
    let mut line_number = 0usize;
    let mut applied = 0usize;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            break;
        }
        line_number += 1;

        let has_trailing_newline = line.ends_with('\n');
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let envelope: WalLineIn<'_> = match serde_json::from_str(trimmed) {
            Ok(envelope) => envelope,
            Err(error) => {
                let tolerate_tail = !has_trailing_newline
                    && matches!(error.classify(), serde_json::error::Category::Eof)
                    && reader
                        .fill_buf()
                        .map(|remaining| remaining.is_empty())
                        .unwrap_or(false);
                if tolerate_tail {
                    tracing::warn!(line = line_number, "ignoring torn wal tail");
                    break;
                }
                return Err(PersistenceError::InvalidData(format!(
                    "invalid wal line {line_number}: {error}"
                )));
            }
        };

        let actual = crc32fast::hash(envelope.record.get().as_bytes());
        if actual != envelope.crc32 {
            return Err(PersistenceError::Checksum {
                line: line_number,
                expected: envelope.crc32,
                actual,
            });
        }

        let record: WalRecord = serde_json::from_str(envelope.record.get()).map_err(|error| {
            PersistenceError::InvalidData(format!("invalid wal record on line {line_number}: {error}"))
        })?;

        replay_wal_record(collections, &record).map_err(|error| {
            PersistenceError::InvalidData(format!(
                "failed to apply wal line {line_number}: {error}"
            ))
        })?;
        applied += 1;
    }

    if applied > 0 {
        tracing::debug!(records = applied, "replayed wal records");
    }
    Ok(())
}

fn encode_line(record: &WalRecord, buffer: &mut Vec<u8>) -> Result<(), PersistenceError> {
    let raw = serde_json::value::to_raw_value(record)?;
    let line = WalLineOut {
        crc32: crc32fast::hash(raw.get().as_bytes()),
        record: &raw,
    };
    serde_json::to_writer(&mut *buffer, &line)?;
    buffer.push(b'\n');
    Ok(())
}
