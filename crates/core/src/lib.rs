//! Webcam attendance logging.
//!
//! A [`session::detection_loop::DetectionLoop`] pulls frames from a
//! [`capture::domain::frame_source::FrameSource`], runs an
//! [`detection::domain::object_detector::ObjectDetector`] over each one and
//! appends an [`attendance::domain::attendance_record::AttendanceRecord`] the
//! first time a label is seen on a given day.

pub mod shared {
    pub mod constants;
    pub mod detection;
    pub mod frame;
}

pub mod detection {
    pub mod domain {
        pub mod label_policy;
        pub mod object_detector;
    }
    pub mod infrastructure;
}

pub mod capture {
    pub mod domain {
        pub mod frame_source;
    }
    pub mod infrastructure;
}

pub mod attendance {
    pub mod domain {
        pub mod attendance_log;
        pub mod attendance_record;
        pub mod dedup_tracker;
        pub mod report;
    }
    pub mod infrastructure;
}

pub mod session {
    pub mod annotator;
    pub mod clock;
    pub mod detection_loop;
    pub mod session_config;
    pub mod session_logger;
    pub mod sinks;
    pub mod stop_signal;
    pub mod worker;
}
