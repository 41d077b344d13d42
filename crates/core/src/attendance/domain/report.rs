//! Read-only queries over the attendance log for a report view.

use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveDateTime};

use super::attendance_log::AttendanceLog;
use super::attendance_record::AttendanceRecord;

/// Conjunctive filter; `None` means "All".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReportFilter {
    pub date: Option<NaiveDate>,
    pub label: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.date.map_or(true, |d| record.date() == d)
            && self.label.as_deref().map_or(true, |l| record.label() == l)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReportStats {
    pub total_entries: usize,
    pub unique_labels: usize,
    pub last_update: Option<NaiveDateTime>,
}

/// Snapshot of the log taken when the report was loaded.
#[derive(Clone, Debug, Default)]
pub struct AttendanceReport {
    records: Vec<AttendanceRecord>,
}

impl AttendanceReport {
    pub fn new(records: Vec<AttendanceRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records matching `filter`, in log order.
    pub fn filtered(&self, filter: &ReportFilter) -> Vec<AttendanceRecord> {
        self.records
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    /// Distinct dates, newest first.
    pub fn available_dates(&self) -> Vec<NaiveDate> {
        let dates: BTreeSet<NaiveDate> = self.records.iter().map(|r| r.date()).collect();
        dates.into_iter().rev().collect()
    }

    /// Distinct labels, ascending.
    pub fn available_labels(&self) -> Vec<String> {
        let labels: BTreeSet<&str> = self.records.iter().map(|r| r.label()).collect();
        labels.into_iter().map(str::to_string).collect()
    }

    /// Statistics over the whole log, independent of any filter.
    pub fn stats(&self) -> ReportStats {
        let unique: BTreeSet<&str> = self.records.iter().map(|r| r.label()).collect();
        ReportStats {
            total_entries: self.records.len(),
            unique_labels: unique.len(),
            last_update: self
                .records
                .iter()
                .map(|r| r.date().and_time(r.time()))
                .max(),
        }
    }
}

/// What a report view shows after trying to load the log.
#[derive(Debug)]
pub enum ReportOutcome {
    NoDataFile,
    NoRecords,
    Loaded(AttendanceReport),
    Failed(String),
}

impl ReportOutcome {
    pub fn load(store: &dyn AttendanceLog) -> Self {
        if !store.exists() {
            return Self::NoDataFile;
        }
        match store.read_all() {
            Ok(records) if records.is_empty() => Self::NoRecords,
            Ok(records) => Self::Loaded(AttendanceReport::new(records)),
            Err(e) => {
                log::error!("Failed to load attendance log: {e}");
                Self::Failed(format!("Error loading records: {e}"))
            }
        }
    }

    /// User-facing text for the outcomes that carry no table.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::NoDataFile => Some("No data file".to_string()),
            Self::NoRecords => Some("No records".to_string()),
            Self::Failed(msg) => Some(msg.clone()),
            Self::Loaded(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::domain::attendance_log::LogError;
    use chrono::NaiveTime;
    use rstest::rstest;
    use std::path::PathBuf;

    fn record(label: &str, day: u32, h: u32, m: u32) -> AttendanceRecord {
        AttendanceRecord::new(
            label,
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            NaiveTime::from_hms_opt(h, m, 0).unwrap(),
        )
        .unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn sample() -> AttendanceReport {
        AttendanceReport::new(vec![
            record("bob", 1, 9, 0),
            record("alice", 1, 9, 5),
            record("alice", 2, 8, 30),
            record("carol", 3, 7, 45),
            record("bob", 2, 17, 10),
        ])
    }

    #[rstest]
    #[case(None, None, 5)]
    #[case(Some(1), None, 2)]
    #[case(None, Some("alice"), 2)]
    #[case(Some(2), Some("bob"), 1)]
    #[case(Some(3), Some("alice"), 0)]
    #[case(None, Some("dave"), 0)]
    fn test_filter_is_conjunctive(
        #[case] date: Option<u32>,
        #[case] label: Option<&str>,
        #[case] expected: usize,
    ) {
        let filter = ReportFilter {
            date: date.map(day),
            label: label.map(str::to_string),
        };
        assert_eq!(sample().filtered(&filter).len(), expected);
    }

    #[test]
    fn test_filtered_preserves_log_order() {
        let filter = ReportFilter {
            date: None,
            label: Some("bob".into()),
        };
        let rows = sample().filtered(&filter);
        assert_eq!(rows[0].date(), day(1));
        assert_eq!(rows[1].date(), day(2));
    }

    #[test]
    fn test_available_dates_newest_first() {
        assert_eq!(sample().available_dates(), vec![day(3), day(2), day(1)]);
    }

    #[test]
    fn test_available_labels_sorted() {
        assert_eq!(sample().available_labels(), vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_stats() {
        let stats = sample().stats();
        assert_eq!(stats.total_entries, 5);
        assert_eq!(stats.unique_labels, 3);
        assert_eq!(
            stats.last_update,
            Some(day(3).and_hms_opt(7, 45, 0).unwrap())
        );
    }

    #[test]
    fn test_stats_last_update_compares_time_within_latest_date() {
        let report = AttendanceReport::new(vec![
            record("alice", 2, 17, 0),
            record("bob", 2, 9, 0),
        ]);
        assert_eq!(
            report.stats().last_update,
            Some(day(2).and_hms_opt(17, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_stats_of_empty_report() {
        let stats = AttendanceReport::default().stats();
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.unique_labels, 0);
        assert_eq!(stats.last_update, None);
    }

    struct StubLog {
        exists: bool,
        rows: Result<Vec<AttendanceRecord>, ()>,
    }

    impl AttendanceLog for StubLog {
        fn ensure_initialized(&mut self) -> Result<(), LogError> {
            Ok(())
        }
        fn append(&mut self, _record: &AttendanceRecord) -> Result<(), LogError> {
            Ok(())
        }
        fn read_all(&self) -> Result<Vec<AttendanceRecord>, LogError> {
            self.rows.clone().map_err(|_| LogError::Corrupt {
                path: PathBuf::from("log.csv"),
                line: 2,
                reason: "bad date".into(),
            })
        }
        fn exists(&self) -> bool {
            self.exists
        }
    }

    #[test]
    fn test_load_missing_file() {
        let log = StubLog {
            exists: false,
            rows: Ok(vec![]),
        };
        let outcome = ReportOutcome::load(&log);
        assert!(matches!(outcome, ReportOutcome::NoDataFile));
        assert_eq!(outcome.message().as_deref(), Some("No data file"));
    }

    #[test]
    fn test_load_header_only_file() {
        let log = StubLog {
            exists: true,
            rows: Ok(vec![]),
        };
        let outcome = ReportOutcome::load(&log);
        assert_eq!(outcome.message().as_deref(), Some("No records"));
    }

    #[test]
    fn test_load_unreadable_file() {
        let log = StubLog {
            exists: true,
            rows: Err(()),
        };
        let message = ReportOutcome::load(&log).message().unwrap();
        assert!(message.starts_with("Error loading records: "));
        assert!(message.contains("bad date"));
    }

    #[test]
    fn test_load_records() {
        let log = StubLog {
            exists: true,
            rows: Ok(vec![record("alice", 1, 9, 0)]),
        };
        match ReportOutcome::load(&log) {
            ReportOutcome::Loaded(report) => assert_eq!(report.records().len(), 1),
            other => panic!("expected records, got {other:?}"),
        }
    }
}
