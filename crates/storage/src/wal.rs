// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Write-ahead log for durable storage

use rgate_core::{Operation, OperationLog, StoreError};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error at entry {line}: {source}")]
    Json {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("JSON error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Write-ahead log for durable operation storage
pub struct Wal {
    file: File,
    sequence: u64,
    /// Length of the file up to the last complete entry
    len: u64,
}

impl Wal {
    /// Open or create a WAL at the given path
    pub fn open(path: &Path) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let content = std::fs::read_to_string(path)?;
        repair_tail(&mut file, &content)?;

        // Count existing entries to set sequence number
        let reader = BufReader::new(File::open(path)?);
        let sequence = reader.lines().count() as u64;
        let len = file.metadata()?.len();

        Ok(Self {
            file,
            sequence,
            len,
        })
    }

    /// Append an operation to the log
    ///
    /// The entry is either fully written and synced or not in the file at
    /// all; a failed write or sync is cut back off before returning.
    pub fn append(&mut self, op: &Operation) -> Result<u64, WalError> {
        let entry = WalEntry {
            seq: self.sequence + 1,
            op: op.clone(),
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        // A fragment survives only if an earlier rollback failed too
        if self.file.metadata()?.len() != self.len {
            tracing::warn!(len = self.len, "truncating partial WAL append");
            self.file.set_len(self.len)?;
        }

        let written = self
            .file
            .write_all(&line)
            .and_then(|()| self.file.sync_all());
        if let Err(e) = written {
            if let Err(rollback) = self.file.set_len(self.len) {
                tracing::warn!(seq = entry.seq, error = %rollback, "WAL rollback failed");
            }
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.sequence = entry.seq;
        Ok(self.sequence)
    }

    /// Get the current sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Replay all operations from the log
    ///
    /// A final entry cut short by a crash mid-append is skipped; a corrupt
    /// entry anywhere else is an error.
    pub fn replay(path: &Path) -> Result<Vec<Operation>, WalError> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let lines = BufReader::new(file)
            .lines()
            .collect::<Result<Vec<_>, _>>()?;
        let last = lines.len();
        let mut ops = Vec::with_capacity(last);

        for (index, line) in lines.iter().enumerate() {
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry>(line) {
                Ok(entry) => ops.push(entry.op),
                Err(e) if index + 1 == last => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "skipping torn final WAL entry"
                    );
                }
                Err(source) => {
                    return Err(WalError::Json {
                        line: index + 1,
                        source,
                    })
                }
            }
        }

        Ok(ops)
    }
}

impl OperationLog for Wal {
    fn append(&mut self, op: &Operation) -> Result<(), StoreError> {
        Wal::append(self, op)
            .map(|_| ())
            .map_err(|e| StoreError::Journal(e.to_string()))
    }
}

/// Make sure the next append starts on a fresh line
///
/// An unterminated final entry is kept if it parses and cut off otherwise.
fn repair_tail(file: &mut File, content: &str) -> Result<(), WalError> {
    if content.is_empty() || content.ends_with('\n') {
        return Ok(());
    }

    let start = content.rfind('\n').map_or(0, |i| i + 1);
    if serde_json::from_str::<WalEntry>(&content[start..]).is_ok() {
        writeln!(file)?;
    } else {
        tracing::warn!(offset = start, "truncating torn WAL entry");
        file.set_len(start as u64)?;
    }
    Ok(())
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct WalEntry {
    seq: u64,
    op: Operation,
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
