use std::collections::HashMap;
use std::time::Instant;

/// Observer for detection-session events: per-frame timings, counters and
/// status lines.
///
/// The loop reports to this trait only, so an embedder can route session
/// telemetry anywhere without touching the loop itself.
pub trait SessionLogger: Send {
    /// Called when a session starts running; aggregates restart here.
    fn session_started(&mut self) {}

    /// Called once per frame read from the source.
    fn frame(&mut self, index: usize);

    /// How long a named stage (`capture`, `detect`, `log`) took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    fn metric(&mut self, name: &str, value: f64);

    fn info(&mut self, message: &str);

    /// End-of-session report. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn frame(&mut self, _index: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
    fn info(&mut self, _message: &str) {}
}

/// Running count, sum and maximum of one stage or metric.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub count: usize,
    pub total: f64,
    pub max: f64,
}

impl Aggregate {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.total += value;
        self.max = if self.count == 1 {
            value
        } else {
            self.max.max(value)
        };
    }

    pub fn mean(&self) -> f64 {
        self.total / self.count.max(1) as f64
    }
}

/// Aggregates stage timings and metrics for the current session, forwarding
/// status lines and the final summary to the `log` facade.
///
/// Memory is one [`Aggregate`] per stage or metric name, however long the
/// session runs. A heartbeat line is logged every `heartbeat_frames` frames.
pub struct LogSessionLogger {
    heartbeat_frames: usize,
    timings: HashMap<String, Aggregate>,
    metrics: HashMap<String, Aggregate>,
    start_time: Instant,
    frames: usize,
}

impl LogSessionLogger {
    pub fn new(heartbeat_frames: usize) -> Self {
        Self {
            heartbeat_frames: heartbeat_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// `None` until at least one timing or metric is recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_s = self.start_time.elapsed().as_secs_f64();
        let mut lines = vec![format!(
            "Session summary ({} frames, {elapsed_s:.1}s):",
            self.frames
        )];

        let mut stages: Vec<_> = self.timings.iter().collect();
        stages.sort_by(|a, b| a.0.cmp(b.0));
        for (stage, agg) in stages {
            lines.push(format!(
                "  {stage:8}: avg {:6.1}ms  max {:6.1}ms  total {:7.0}ms",
                agg.mean(),
                agg.max,
                agg.total
            ));
        }

        let mut names: Vec<_> = self.metrics.iter().collect();
        names.sort_by(|a, b| a.0.cmp(b.0));
        for (name, agg) in names {
            lines.push(format!("  {name}: total {:.0}", agg.total));
        }

        if self.frames > 0 && elapsed_s > 0.0 {
            lines.push(format!(
                "  Throughput: {:.1} fps",
                self.frames as f64 / elapsed_s
            ));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<Aggregate> {
        self.timings.get(stage).copied()
    }

    pub fn metrics_for(&self, name: &str) -> Option<Aggregate> {
        self.metrics.get(name).copied()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }
}

impl Default for LogSessionLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SessionLogger for LogSessionLogger {
    fn session_started(&mut self) {
        self.timings.clear();
        self.metrics.clear();
        self.start_time = Instant::now();
        self.frames = 0;
    }

    fn frame(&mut self, index: usize) {
        self.frames += 1;
        if (index + 1) % self.heartbeat_frames == 0 {
            log::debug!("Processed {} frames", index + 1);
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .add(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .add(value);
    }

    fn info(&mut self, message: &str) {
        log::info!("{message}");
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_null_logger_accepts_everything() {
        let mut logger = NullSessionLogger;
        logger.frame(0);
        logger.timing("detect", 5.0);
        logger.metric("detections", 2.0);
        logger.info("hello");
        logger.session_started();
        logger.summary();
    }

    #[test]
    fn test_timing_records_values_per_stage() {
        let mut logger = LogSessionLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("capture", 5.0);

        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.count, 2);
        assert_relative_eq!(detect.total, 50.0);
        assert_relative_eq!(detect.max, 30.0);
        assert_relative_eq!(detect.mean(), 25.0);
        assert_eq!(logger.timings_for("capture").unwrap().count, 1);
        assert!(logger.timings_for("log").is_none());
    }

    #[test]
    fn test_frame_counts_frames() {
        let mut logger = LogSessionLogger::new(2);
        for i in 0..5 {
            logger.frame(i);
        }
        assert_eq!(logger.frames(), 5);
    }

    #[test]
    fn test_summary_lists_stages_and_metrics() {
        let mut logger = LogSessionLogger::new(10);
        logger.frame(0);
        logger.timing("detect", 12.0);
        logger.timing("log", 1.0);
        logger.metric("records_written", 1.0);
        logger.metric("records_written", 1.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.starts_with("Session summary (1 frames"));
        assert!(summary.contains("detect"));
        assert!(summary.contains("log"));
        assert!(summary.contains("records_written: total 2"));
    }

    #[test]
    fn test_long_session_keeps_one_aggregate_per_name() {
        let mut logger = LogSessionLogger::new(1000);
        for i in 0..10_000 {
            logger.frame(i);
            logger.timing("capture", 1.0);
            logger.timing("detect", (i % 7) as f64);
            logger.metric("detections", 1.0);
        }
        assert_eq!(logger.timings.len(), 2);
        assert_eq!(logger.metrics.len(), 1);
        let detect = logger.timings_for("detect").unwrap();
        assert_eq!(detect.count, 10_000);
        assert_relative_eq!(detect.max, 6.0);
        assert_relative_eq!(logger.metrics_for("detections").unwrap().total, 10_000.0);
    }

    #[test]
    fn test_session_start_resets_previous_session() {
        let mut logger = LogSessionLogger::new(10);
        logger.session_started();
        logger.frame(0);
        logger.timing("detect", 40.0);
        logger.metric("records_written", 1.0);

        logger.session_started();
        assert_eq!(logger.frames(), 0);
        assert!(logger.timings_for("detect").is_none());
        assert!(logger.metrics_for("records_written").is_none());
        assert!(logger.summary_string().is_none());

        logger.timing("detect", 10.0);
        assert_relative_eq!(logger.timings_for("detect").unwrap().max, 10.0);
    }

    #[test]
    fn test_max_tracks_negative_first_value() {
        let mut agg = Aggregate::default();
        agg.add(-3.0);
        agg.add(-5.0);
        assert_relative_eq!(agg.max, -3.0);
    }

    #[test]
    fn test_empty_summary_is_none() {
        assert!(LogSessionLogger::default().summary_string().is_none());
    }

    #[test]
    fn test_heartbeat_is_at_least_one() {
        let mut logger = LogSessionLogger::new(0);
        logger.frame(0);
        assert_eq!(logger.heartbeat_frames, 1);
    }
}
