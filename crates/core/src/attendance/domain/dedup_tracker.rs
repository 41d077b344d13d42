use std::collections::HashSet;

use chrono::NaiveDate;

use super::attendance_record::DedupKey;

/// Session-scoped memory of which `(label, date)` pairs were already logged.
///
/// Created empty for every session and dropped with it. Restarting a session
/// forgets everything unless it is [`seed`](Self::seed)ed from the log.
#[derive(Debug, Default)]
pub struct DedupTracker {
    seen: HashSet<DedupKey>,
}

impl DedupTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_novel(&self, label: &str, date: NaiveDate) -> bool {
        !self.seen.contains(&DedupKey::new(label, date))
    }

    pub fn mark(&mut self, label: &str, date: NaiveDate) {
        self.seen.insert(DedupKey::new(label, date));
    }

    /// Pre-marks labels already present in the log for `date`.
    pub fn seed<I>(&mut self, labels: I, date: NaiveDate)
    where
        I: IntoIterator<Item = String>,
    {
        self.seen
            .extend(labels.into_iter().map(|label| DedupKey::new(label, date)));
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn test_new_tracker_treats_everything_as_novel() {
        let tracker = DedupTracker::new();
        assert!(tracker.is_novel("alice", date(1)));
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_mark_makes_key_stale() {
        let mut tracker = DedupTracker::new();
        tracker.mark("alice", date(1));
        assert!(!tracker.is_novel("alice", date(1)));
        assert!(tracker.is_novel("bob", date(1)));
    }

    #[test]
    fn test_same_label_on_another_date_is_novel() {
        let mut tracker = DedupTracker::new();
        tracker.mark("alice", date(1));
        assert!(tracker.is_novel("alice", date(2)));
    }

    #[test]
    fn test_mark_is_idempotent() {
        let mut tracker = DedupTracker::new();
        tracker.mark("alice", date(1));
        tracker.mark("alice", date(1));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_seed_marks_labels_for_date() {
        let mut tracker = DedupTracker::new();
        tracker.seed(vec!["alice".to_string(), "bob".to_string()], date(1));
        assert!(!tracker.is_novel("alice", date(1)));
        assert!(!tracker.is_novel("bob", date(1)));
        assert!(tracker.is_novel("alice", date(2)));
    }

    #[test]
    fn test_labels_are_case_sensitive() {
        let mut tracker = DedupTracker::new();
        tracker.mark("alice", date(1));
        assert!(tracker.is_novel("Alice", date(1)));
    }
}
