//! Outputs of a running session, consumed by whatever presents it.

use crossbeam_channel::{Sender, TrySendError};

use crate::attendance::domain::attendance_record::AttendanceRecord;
use crate::shared::detection::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Started { device: String },
    NewAttendance(AttendanceRecord),
    Stopped,
    Error(String),
}

/// A box drawn onto an [`AnnotatedFrame`], with the caption a renderer
/// should place beside it.
#[derive(Clone, Debug, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub caption: String,
    pub color: [u8; 3],
}

#[derive(Clone, Debug)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub overlays: Vec<Overlay>,
}

/// Receives every annotated frame. Must not block the session.
pub trait FrameSink: Send {
    fn publish(&mut self, frame: AnnotatedFrame);
}

/// Receives status events in the order they happen.
pub trait NotificationSink: Send {
    fn notify(&mut self, event: SessionEvent);
}

/// Discards frames, for headless sessions.
pub struct NullFrameSink;

impl FrameSink for NullFrameSink {
    fn publish(&mut self, _frame: AnnotatedFrame) {}
}

/// Drops the frame when the receiver is behind or gone; only the latest
/// frames matter to a live view.
impl FrameSink for Sender<AnnotatedFrame> {
    fn publish(&mut self, frame: AnnotatedFrame) {
        match self.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::trace!("Frame sink full, dropping frame"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl NotificationSink for Sender<SessionEvent> {
    fn notify(&mut self, event: SessionEvent) {
        if self.send(event).is_err() {
            log::debug!("Notification receiver gone");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotated(index: usize) -> AnnotatedFrame {
        AnnotatedFrame {
            frame: Frame::new(vec![0; 3], 1, 1, index),
            overlays: Vec::new(),
        }
    }

    #[test]
    fn test_full_frame_channel_drops_instead_of_blocking() {
        let (mut tx, rx) = crossbeam_channel::bounded::<AnnotatedFrame>(1);
        tx.publish(annotated(0));
        tx.publish(annotated(1));
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.recv().unwrap().frame.index(), 0);
    }

    #[test]
    fn test_disconnected_sinks_do_not_panic() {
        let (mut frames, frames_rx) = crossbeam_channel::bounded::<AnnotatedFrame>(1);
        let (mut events, events_rx) = crossbeam_channel::unbounded::<SessionEvent>();
        drop(frames_rx);
        drop(events_rx);
        frames.publish(annotated(0));
        events.notify(SessionEvent::Stopped);
    }

    #[test]
    fn test_events_arrive_in_order() {
        let (mut tx, rx) = crossbeam_channel::unbounded();
        tx.notify(SessionEvent::Started {
            device: "cam".into(),
        });
        tx.notify(SessionEvent::Stopped);
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                SessionEvent::Started {
                    device: "cam".into()
                },
                SessionEvent::Stopped
            ]
        );
    }
}
