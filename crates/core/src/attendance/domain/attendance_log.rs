use std::collections::HashSet;
use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use super::attendance_record::AttendanceRecord;

#[derive(Error, Debug)]
pub enum LogError {
    #[error("attendance log {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("attendance log {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("attendance log {path} is corrupt at line {line}: {reason}")]
    Corrupt {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("attendance log {path} has header {found:?}, expected Label, Date, Timestamp")]
    HeaderMismatch { path: PathBuf, found: Vec<String> },
}

/// Append-only, durable store of attendance records.
///
/// A store that does not exist yet reads as empty.
pub trait AttendanceLog: Send {
    /// Creates the backing store with its header if it is missing.
    /// Never rewrites or truncates an existing store.
    fn ensure_initialized(&mut self) -> Result<(), LogError>;

    /// Appends one record. The row is durable when this returns `Ok`.
    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LogError>;

    /// Every record, in the order it was appended.
    fn read_all(&self) -> Result<Vec<AttendanceRecord>, LogError>;

    /// Whether the backing store exists at all.
    fn exists(&self) -> bool;

    /// Labels with at least one record on `date`.
    fn labels_logged_on(&self, date: NaiveDate) -> Result<HashSet<String>, LogError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.date() == date)
            .map(|r| r.label().to_string())
            .collect())
    }

    /// Durable "already logged today" check, independent of any session.
    fn was_logged_today(&self, label: &str, today: NaiveDate) -> Result<bool, LogError> {
        Ok(self
            .read_all()?
            .iter()
            .any(|r| r.date() == today && r.label() == label))
    }
}
