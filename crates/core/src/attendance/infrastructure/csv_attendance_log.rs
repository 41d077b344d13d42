use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::attendance::domain::attendance_log::{AttendanceLog, LogError};
use crate::attendance::domain::attendance_record::AttendanceRecord;
use crate::shared::constants::{DATE_FORMAT, LOG_HEADER, TIME_FORMAT};

/// Attendance log kept as a comma-separated file with a
/// `Label,Date,Timestamp` header.
///
/// Every append opens the file, writes one complete row with a single
/// `write_all`, and syncs it to disk before returning; the handle is closed
/// when the call ends, so an interrupted session leaves only whole rows.
pub struct CsvAttendanceLog {
    path: PathBuf,
}

#[derive(Serialize)]
struct LogRow<'a> {
    #[serde(rename = "Label")]
    label: &'a str,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

#[derive(Deserialize)]
struct StoredRow {
    #[serde(rename = "Label")]
    label: String,
    #[serde(rename = "Date")]
    date: String,
    #[serde(rename = "Timestamp")]
    timestamp: String,
}

impl<'a> From<&'a AttendanceRecord> for LogRow<'a> {
    fn from(record: &'a AttendanceRecord) -> Self {
        Self {
            label: record.label(),
            date: record.date_string(),
            timestamp: record.time_string(),
        }
    }
}

impl CsvAttendanceLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn csv_err(&self, source: csv::Error) -> LogError {
        LogError::Csv {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, line: u64, reason: impl Into<String>) -> LogError {
        LogError::Corrupt {
            path: self.path.clone(),
            line,
            reason: reason.into(),
        }
    }

    fn write_header(&self, file: &mut File) -> Result<(), LogError> {
        let mut buf = csv_writer(Vec::new());
        buf.write_record(LOG_HEADER)
            .map_err(|e| self.csv_err(e))?;
        let bytes = buf.into_inner().map_err(|e| self.io_err(e.into_error()))?;
        file.write_all(&bytes).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))
    }

    fn parse_row(&self, line: u64, row: StoredRow) -> Result<AttendanceRecord, LogError> {
        let date = NaiveDate::parse_from_str(row.date.trim(), DATE_FORMAT)
            .map_err(|e| self.corrupt(line, format!("bad date {:?}: {e}", row.date)))?;
        let time = NaiveTime::parse_from_str(row.timestamp.trim(), TIME_FORMAT)
            .map_err(|e| self.corrupt(line, format!("bad timestamp {:?}: {e}", row.timestamp)))?;
        AttendanceRecord::new(row.label, date, time).map_err(|e| self.corrupt(line, e.to_string()))
    }
}

fn csv_writer<W: Write>(inner: W) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(inner)
}

/// True when a non-empty file does not end in a newline, e.g. after a
/// hand edit; the next row must start on a fresh line.
fn missing_trailing_newline(file: &mut File) -> std::io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

impl AttendanceLog for CsvAttendanceLog {
    fn ensure_initialized(&mut self) -> Result<(), LogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                self.write_header(&mut file)?;
                log::info!("Created attendance log {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                // A crash between create and header write leaves an empty file.
                let mut file = OpenOptions::new()
                    .append(true)
                    .open(&self.path)
                    .map_err(|e| self.io_err(e))?;
                if file.metadata().map_err(|e| self.io_err(e))?.len() == 0 {
                    self.write_header(&mut file)?;
                    log::warn!("Restored missing header in {}", self.path.display());
                }
                Ok(())
            }
            Err(e) => Err(self.io_err(e)),
        }
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LogError> {
        self.ensure_initialized()?;

        let mut file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;

        let mut bytes = Vec::new();
        if missing_trailing_newline(&mut file).map_err(|e| self.io_err(e))? {
            bytes.push(b'\n');
        }
        let mut writer = csv_writer(bytes);
        writer
            .serialize(LogRow::from(record))
            .map_err(|e| self.csv_err(e))?;
        let bytes = writer.into_inner().map_err(|e| self.io_err(e.into_error()))?;

        file.write_all(&bytes).map_err(|e| self.io_err(e))?;
        file.sync_data().map_err(|e| self.io_err(e))?;
        log::debug!(
            "Appended {},{},{} to {}",
            record.label(),
            record.date_string(),
            record.time_string(),
            self.path.display()
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Vec<AttendanceRecord>, LogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::Headers)
            .from_path(&self.path)
            .map_err(|e| self.csv_err(e))?;

        let headers = reader
            .headers()
            .map_err(|e| self.corrupt(1, e.to_string()))?
            .clone();
        if headers.is_empty() {
            return Ok(Vec::new());
        }
        if headers.iter().ne(LOG_HEADER.iter().copied()) {
            return Err(LogError::HeaderMismatch {
                path: self.path.clone(),
                found: headers.iter().map(str::to_string).collect(),
            });
        }

        let mut records = Vec::new();
        for result in reader.records() {
            let row = result.map_err(|e| {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                self.corrupt(line, e.to_string())
            })?;
            let line = row.position().map(|p| p.line()).unwrap_or(0);
            let stored: StoredRow = row
                .deserialize(Some(&headers))
                .map_err(|e| self.corrupt(line, e.to_string()))?;
            records.push(self.parse_row(line, stored)?);
        }
        Ok(records)
    }

    fn exists(&self) -> bool {
        self.path.is_file()
    }
}

/// Writes `records` in the log's own format, header included.
pub fn export_csv<W: Write>(records: &[AttendanceRecord], writer: W) -> Result<(), csv::Error> {
    let mut out = csv_writer(writer);
    out.write_record(LOG_HEADER)?;
    for record in records {
        out.serialize(LogRow::from(record))?;
    }
    out.flush()?;
    Ok(())
}
