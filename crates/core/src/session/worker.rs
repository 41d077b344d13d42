use std::thread::{self, JoinHandle};

use crossbeam_channel::Receiver;
use thiserror::Error;

use crate::capture::domain::frame_source::FrameSource;

use super::detection_loop::{DetectionLoop, SessionOutcome};
use super::session_config::SessionConfig;
use super::sinks::{AnnotatedFrame, SessionEvent};
use super::stop_signal::StopSignal;

/// Frames buffered for a slow viewer before new ones are dropped.
pub const FRAME_BUFFER: usize = 2;

#[derive(Error, Debug)]
#[error("session worker panicked")]
pub struct WorkerPanicked;

/// Control surface for a session running on a background thread.
pub struct SessionHandle {
    pub events: Receiver<SessionEvent>,
    pub frames: Receiver<AnnotatedFrame>,
    stop: StopSignal,
    thread: JoinHandle<(DetectionLoop, SessionOutcome)>,
}

impl SessionHandle {
    /// Requests a stop; the session ends within one frame. Idempotent.
    pub fn stop(&self) {
        self.stop.request();
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Waits for the session to end and hands the loop back so another
    /// session can be started with the same detector and log.
    pub fn join(self) -> Result<(DetectionLoop, SessionOutcome), WorkerPanicked> {
        self.thread.join().map_err(|_| WorkerPanicked)
    }
}

pub fn spawn(
    mut detection_loop: DetectionLoop,
    mut source: Box<dyn FrameSource>,
    config: SessionConfig,
) -> SessionHandle {
    let (mut events_tx, events) = crossbeam_channel::unbounded::<SessionEvent>();
    let (mut frames_tx, frames) = crossbeam_channel::bounded::<AnnotatedFrame>(FRAME_BUFFER);
    let stop = StopSignal::new();
    let stop_clone = stop.clone();

    let thread = thread::spawn(move || {
        let outcome = detection_loop.run_session(
            source.as_mut(),
            &config,
            &stop_clone,
            &mut frames_tx,
            &mut events_tx,
        );
        log::debug!("Session worker finished: {:?}", outcome.end);
        (detection_loop, outcome)
    });

    SessionHandle {
        events,
        frames,
        stop,
        thread,
    }
}
