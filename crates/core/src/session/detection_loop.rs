use std::time::Instant;

use crate::attendance::domain::attendance_log::{AttendanceLog, LogError};
use crate::attendance::domain::attendance_record::AttendanceRecord;
use crate::attendance::domain::dedup_tracker::DedupTracker;
use crate::capture::domain::frame_source::{CaptureError, FrameSource};
use crate::detection::domain::label_policy::is_loggable;
use crate::detection::domain::object_detector::ObjectDetector;
use crate::shared::detection::Detection;
use crate::shared::frame::Frame;

use super::annotator::annotate;
use super::clock::{Clock, SystemClock};
use super::session_config::{ConfigError, SessionConfig};
use super::session_logger::{NullSessionLogger, SessionLogger};
use super::sinks::{FrameSink, NotificationSink, SessionEvent};
use super::stop_signal::StopSignal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
}

/// Why a session returned to `Idle`.
#[derive(Debug)]
pub enum SessionEnd {
    Stopped,
    EndOfStream,
    InvalidConfig(ConfigError),
    LogUnavailable(LogError),
    OpenFailed(CaptureError),
    CaptureFailed(CaptureError),
}

#[derive(Debug)]
pub struct SessionOutcome {
    pub end: SessionEnd,
    pub frames: usize,
    pub records_written: usize,
}

/// Drives capture, detection, deduplication and logging for one session at
/// a time.
///
/// Each frame is handled to completion before the next is read: detect,
/// append every novel confident label, then publish the annotated frame.
/// The stop signal is checked after every read and during the pause
/// between frames.
pub struct DetectionLoop {
    detector: Box<dyn ObjectDetector>,
    log: Box<dyn AttendanceLog>,
    clock: Box<dyn Clock>,
    logger: Box<dyn SessionLogger>,
    state: LoopState,
}

/// Mutable state owned by one session and dropped with it.
#[derive(Default)]
struct SessionState {
    tracker: DedupTracker,
    frames: usize,
    records_written: usize,
    detector_failing: bool,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl DetectionLoop {
    pub fn new(detector: Box<dyn ObjectDetector>, log: Box<dyn AttendanceLog>) -> Self {
        Self {
            detector,
            log,
            clock: Box::new(SystemClock),
            logger: Box::new(NullSessionLogger),
            state: LoopState::Idle,
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn SessionLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs one `Idle -> Running -> Idle` cycle and reports how it ended.
    ///
    /// Never panics on collaborator failure: every failure is turned into a
    /// [`SessionEvent::Error`] and, if it ends the session, a [`SessionEnd`].
    /// The source is released on every path after `open` was attempted.
    pub fn run_session(
        &mut self,
        source: &mut dyn FrameSource,
        config: &SessionConfig,
        stop: &StopSignal,
        frames: &mut dyn FrameSink,
        events: &mut dyn NotificationSink,
    ) -> SessionOutcome {
        let mut session = SessionState::default();

        if let Err(e) = config.validate() {
            log::error!("Invalid session configuration: {e}");
            events.notify(SessionEvent::Error(format!("Invalid configuration: {e}")));
            return session.finish(SessionEnd::InvalidConfig(e));
        }

        if let Err(e) = self.log.ensure_initialized() {
            log::error!("Attendance log unavailable: {e}");
            events.notify(SessionEvent::Error(format!("Cannot open attendance log: {e}")));
            return session.finish(SessionEnd::LogUnavailable(e));
        }

        let info = match source.open(config.device_index) {
            Ok(info) => info,
            Err(e) => {
                source.release();
                log::error!("Failed to open camera {}: {e}", config.device_index);
                events.notify(SessionEvent::Error(format!("Cannot open camera: {e}")));
                return session.finish(SessionEnd::OpenFailed(e));
            }
        };

        self.state = LoopState::Running;
        self.logger.session_started();
        if config.cross_session_dedup {
            self.seed_from_log(&mut session.tracker, events);
        }
        self.logger.info(&format!(
            "Session started on {} ({}x{})",
            info.device, info.width, info.height
        ));
        events.notify(SessionEvent::Started {
            device: info.device,
        });

        let end = self.run_frames(source, config, stop, &mut session, frames, events);

        source.release();
        self.state = LoopState::Idle;

        match &end {
            SessionEnd::CaptureFailed(e) => {
                log::error!("Camera read failed: {e}");
                events.notify(SessionEvent::Error(format!("Camera read failed: {e}")));
            }
            _ => events.notify(SessionEvent::Stopped),
        }
        self.logger.info(&format!(
            "Session ended after {} frames, {} new records",
            session.frames, session.records_written
        ));
        self.logger.summary();

        session.finish(end)
    }

    fn seed_from_log(&self, tracker: &mut DedupTracker, events: &mut dyn NotificationSink) {
        let today = self.clock.now().date();
        match self.log.labels_logged_on(today) {
            Ok(labels) => {
                log::info!("{} labels already logged today", labels.len());
                tracker.seed(labels, today);
            }
            Err(e) => {
                log::warn!("Could not read today's records, duplicates are possible: {e}");
                events.notify(SessionEvent::Error(format!(
                    "Could not read today's records: {e}"
                )));
            }
        }
    }

    fn run_frames(
        &mut self,
        source: &mut dyn FrameSource,
        config: &SessionConfig,
        stop: &StopSignal,
        session: &mut SessionState,
        frames: &mut dyn FrameSink,
        events: &mut dyn NotificationSink,
    ) -> SessionEnd {
        loop {
            if stop.is_requested() {
                return SessionEnd::Stopped;
            }

            let start = Instant::now();
            let frame = match source.read() {
                Ok(Some(frame)) => frame,
                Ok(None) => return SessionEnd::EndOfStream,
                Err(e) => return SessionEnd::CaptureFailed(e),
            };
            self.logger.timing("capture", elapsed_ms(start));

            // A stop that arrived during a blocking read abandons this frame.
            if stop.is_requested() {
                return SessionEnd::Stopped;
            }

            self.logger.frame(frame.index());
            session.frames += 1;
            self.process_frame(frame, config, session, frames, events);

            if stop.wait(config.frame_delay) {
                return SessionEnd::Stopped;
            }
        }
    }

    fn process_frame(
        &mut self,
        frame: Frame,
        config: &SessionConfig,
        session: &mut SessionState,
        frames: &mut dyn FrameSink,
        events: &mut dyn NotificationSink,
    ) {
        let start = Instant::now();
        let detections = match self.detector.detect(&frame, &config.thresholds()) {
            Ok(detections) => {
                session.detector_failing = false;
                detections
            }
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                if !session.detector_failing {
                    events.notify(SessionEvent::Error(format!("Detection failed: {e}")));
                }
                session.detector_failing = true;
                Vec::new()
            }
        };
        self.logger.timing("detect", elapsed_ms(start));

        let (valid, malformed): (Vec<Detection>, Vec<Detection>) =
            detections.into_iter().partition(Detection::is_valid);
        if !malformed.is_empty() {
            log::debug!(
                "Dropped {} malformed detections on frame {}",
                malformed.len(),
                frame.index()
            );
        }
        self.logger.metric("detections", valid.len() as f64);

        let start = Instant::now();
        for detection in valid
            .iter()
            .filter(|d| is_loggable(d, config.confidence_threshold))
        {
            if self.log_if_novel(&detection.label, session, events) {
                session.records_written += 1;
                self.logger.metric("records_written", 1.0);
            }
        }
        self.logger.timing("log", elapsed_ms(start));

        frames.publish(annotate(frame, &valid));
    }

    /// Appends a record for `label` unless one was already written today.
    /// The key is marked only after a successful append, so a failed write
    /// is retried on the next sighting.
    fn log_if_novel(
        &mut self,
        label: &str,
        session: &mut SessionState,
        events: &mut dyn NotificationSink,
    ) -> bool {
        let now = self.clock.now();
        let date = now.date();
        if !session.tracker.is_novel(label, date) {
            return false;
        }

        let record = match AttendanceRecord::observed_at(label, now) {
            Ok(record) => record,
            Err(e) => {
                log::debug!("Skipping detection {label:?}: {e}");
                return false;
            }
        };

        match self.log.append(&record) {
            Ok(()) => {
                session.tracker.mark(label, date);
                log::info!(
                    "Attendance: {} on {} at {}",
                    record.label(),
                    record.date_string(),
                    record.time_string()
                );
                events.notify(SessionEvent::NewAttendance(record));
                true
            }
            Err(e) => {
                log::error!("Failed to record attendance for {label}: {e}");
                events.notify(SessionEvent::Error(format!(
                    "Could not save attendance for {label}: {e}"
                )));
                false
            }
        }
    }
}

impl SessionState {
    fn finish(self, end: SessionEnd) -> SessionOutcome {
        SessionOutcome {
            end,
            frames: self.frames,
            records_written: self.records_written,
        }
    }
}
