use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use thiserror::Error;

use crate::shared::constants::{DATE_FORMAT, TIME_FORMAT};

#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("attendance label must not be empty")]
    EmptyLabel,
}

/// One persisted attendance event. Immutable once written.
///
/// `time` has whole-second precision, matching the `HH:MM:SS` column.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AttendanceRecord {
    label: String,
    date: NaiveDate,
    time: NaiveTime,
}

impl AttendanceRecord {
    pub fn new(
        label: impl Into<String>,
        date: NaiveDate,
        time: NaiveTime,
    ) -> Result<Self, RecordError> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(RecordError::EmptyLabel);
        }
        Ok(Self {
            label,
            date,
            time: truncate_to_seconds(time),
        })
    }

    /// Record for `label` observed at `moment` (local wall-clock time).
    pub fn observed_at(label: impl Into<String>, moment: NaiveDateTime) -> Result<Self, RecordError> {
        Self::new(label, moment.date(), moment.time())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn key(&self) -> DedupKey {
        DedupKey::new(self.label.clone(), self.date)
    }

    /// `YYYY-MM-DD`
    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    /// `HH:MM:SS`, 24-hour.
    pub fn time_string(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }
}

fn truncate_to_seconds(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// At most one record per key is written in a session.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub label: String,
    pub date: NaiveDate,
}

impl DedupKey {
    pub fn new(label: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            label: label.into(),
            date,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_rejects_empty_label() {
        let t = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(
            AttendanceRecord::new("", date(2024, 3, 1), t),
            Err(RecordError::EmptyLabel)
        );
        assert_eq!(
            AttendanceRecord::new("   ", date(2024, 3, 1), t),
            Err(RecordError::EmptyLabel)
        );
    }

    #[test]
    fn test_observed_at_truncates_sub_seconds() {
        let moment = date(2024, 3, 1).and_hms_milli_opt(9, 5, 7, 999).unwrap();
        let record = AttendanceRecord::observed_at("alice", moment).unwrap();
        assert_eq!(record.date(), date(2024, 3, 1));
        assert_eq!(record.time(), NaiveTime::from_hms_opt(9, 5, 7).unwrap());
    }

    #[test]
    fn test_string_formats() {
        let moment = date(2024, 3, 1).and_hms_opt(14, 5, 7).unwrap();
        let record = AttendanceRecord::observed_at("alice", moment).unwrap();
        assert_eq!(record.date_string(), "2024-03-01");
        assert_eq!(record.time_string(), "14:05:07");
    }

    #[test]
    fn test_key_combines_label_and_date() {
        let moment = date(2024, 3, 1).and_hms_opt(14, 5, 7).unwrap();
        let record = AttendanceRecord::observed_at("alice", moment).unwrap();
        assert_eq!(record.key(), DedupKey::new("alice", date(2024, 3, 1)));
    }
}
