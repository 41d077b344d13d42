mod settings;

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use crossbeam_channel::select;

use attendance_core::attendance::domain::attendance_record::AttendanceRecord;
use attendance_core::attendance::domain::report::{
    AttendanceReport, ReportFilter, ReportOutcome, ReportStats,
};
use attendance_core::attendance::infrastructure::csv_attendance_log::{
    export_csv, CsvAttendanceLog,
};
use attendance_core::capture::domain::frame_source::FrameSource;
use attendance_core::capture::infrastructure::ffmpeg_camera_source::FfmpegCameraSource;
use attendance_core::capture::infrastructure::image_directory_source::ImageDirectorySource;
use attendance_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use attendance_core::session::detection_loop::{DetectionLoop, SessionEnd};
use attendance_core::session::session_config::SessionConfig;
use attendance_core::session::session_logger::LogSessionLogger;
use attendance_core::session::sinks::{AnnotatedFrame, SessionEvent};
use attendance_core::session::worker;
use attendance_core::shared::constants::DATE_FORMAT;

use settings::{to_percent, Settings};

/// Logs attendance from a webcam by recognizing faces.
#[derive(Parser)]
#[command(name = "attendance")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start a detection session; press Enter to stop.
    Run(RunArgs),
    /// Show, filter and export logged attendance.
    Report(ReportArgs),
}

#[derive(Args)]
struct RunArgs {
    /// ONNX detection model.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Class names, one per line (defaults to the model's metadata).
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Attendance log file.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Camera index.
    #[arg(long)]
    device: Option<u32>,

    /// Explicit capture device name, e.g. `video=Integrated Camera`.
    #[arg(long, conflicts_with = "replay")]
    device_name: Option<String>,

    /// Confidence threshold (0.0-1.0]; lower scores show as Unknown.
    #[arg(long, value_parser = parse_threshold)]
    confidence: Option<f64>,

    /// IoU threshold for overlapping boxes (0.0-1.0].
    #[arg(long, value_parser = parse_threshold)]
    iou: Option<f64>,

    /// Pause between frames in milliseconds.
    #[arg(long)]
    frame_delay_ms: Option<u64>,

    /// Skip labels already in the log for today.
    #[arg(long)]
    cross_session_dedup: bool,

    /// Replay the images in a directory instead of opening a camera.
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Overwrite this image with each annotated frame.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Persist the effective settings as new defaults.
    #[arg(long)]
    save: bool,
}

#[derive(Args)]
struct ReportArgs {
    /// Attendance log file.
    #[arg(long)]
    log: Option<PathBuf>,

    /// Only this date (YYYY-MM-DD).
    #[arg(long, value_parser = parse_date)]
    date: Option<NaiveDate>,

    /// Only this label.
    #[arg(long)]
    label: Option<String>,

    /// Write the filtered records to this CSV file.
    #[arg(long)]
    export: Option<PathBuf>,
}

fn parse_threshold(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e| format!("{e}"))?;
    if value > 0.0 && value <= 1.0 {
        Ok(value)
    } else {
        Err(format!("{value} is not in (0, 1]"))
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| format!("{s}: {e}"))
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run_session(args),
        Command::Report(args) => run_report(args),
    }
}

fn apply_overrides(settings: &mut Settings, args: &RunArgs) {
    if let Some(model) = &args.model {
        settings.model_path = model.clone();
    }
    if let Some(labels) = &args.labels {
        settings.labels_path = Some(labels.clone());
    }
    if let Some(log) = &args.log {
        settings.log_path = log.clone();
    }
    if let Some(device) = args.device {
        settings.device_index = device;
    }
    if let Some(confidence) = args.confidence {
        settings.confidence = to_percent(confidence);
    }
    if let Some(iou) = args.iou {
        settings.iou = to_percent(iou);
    }
    if let Some(delay) = args.frame_delay_ms {
        settings.frame_delay_ms = delay;
    }
    if args.cross_session_dedup {
        settings.cross_session_dedup = true;
    }
}

/// Effective config for this run; thresholds given on the command line are
/// used as parsed rather than at the saved percent precision.
fn session_config(settings: &Settings, args: &RunArgs) -> SessionConfig {
    let mut config = settings.session_config();
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(iou) = args.iou {
        config.iou_threshold = iou;
    }
    config
}

fn run_session(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = Settings::load();
    apply_overrides(&mut settings, &args);
    if args.save {
        settings.save();
    }

    let config = session_config(&settings, &args);
    config.validate()?;

    log::info!("Loading model: {}", settings.model_path.display());
    let detector = OnnxYoloDetector::new(&settings.model_path, settings.labels_path.as_deref())?;
    let store = CsvAttendanceLog::new(&settings.log_path);
    let detection_loop = DetectionLoop::new(Box::new(detector), Box::new(store))
        .with_logger(Box::new(LogSessionLogger::default()));

    let source: Box<dyn FrameSource> = match (&args.replay, &args.device_name) {
        (Some(dir), _) => Box::new(ImageDirectorySource::new(dir)),
        (None, Some(name)) => Box::new(FfmpegCameraSource::with_device(name.clone())),
        (None, None) => Box::new(FfmpegCameraSource::new()),
    };

    let handle = worker::spawn(detection_loop, source, config);

    let stop = handle.stop_signal();
    thread::spawn(move || {
        let mut line = String::new();
        let _ = io::stdin().read_line(&mut line);
        stop.request();
    });
    eprintln!("Press Enter to stop.");

    loop {
        select! {
            recv(handle.events) -> event => match event {
                Ok(event) => report_event(&event),
                Err(_) => break,
            },
            recv(handle.frames) -> frame => {
                if let (Ok(frame), Some(path)) = (frame, &args.preview) {
                    if let Err(e) = write_preview(&frame, path) {
                        log::warn!("Could not write preview {}: {e}", path.display());
                    }
                }
            },
        }
    }

    let (_, outcome) = handle.join()?;
    log::info!(
        "Session ended: {} frames, {} new records",
        outcome.frames,
        outcome.records_written
    );
    match outcome.end {
        SessionEnd::Stopped | SessionEnd::EndOfStream => Ok(()),
        SessionEnd::InvalidConfig(e) => Err(e.into()),
        SessionEnd::LogUnavailable(e) => Err(e.into()),
        SessionEnd::OpenFailed(e) | SessionEnd::CaptureFailed(e) => Err(e.into()),
    }
}

fn report_event(event: &SessionEvent) {
    match event {
        SessionEvent::Started { device } => eprintln!("Detection started on {device}"),
        SessionEvent::NewAttendance(record) => eprintln!(
            "New detection: {} on {} at {}",
            record.label(),
            record.date_string(),
            record.time_string()
        ),
        SessionEvent::Stopped => eprintln!("Detection stopped"),
        SessionEvent::Error(message) => eprintln!("Error: {message}"),
    }
}

/// Writes next to `path` and renames, so a viewer never sees a half-written
/// image.
fn write_preview(frame: &AnnotatedFrame, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let image = frame
        .frame
        .to_rgb_image()
        .ok_or("frame buffer does not match its dimensions")?;
    let format = image::ImageFormat::from_path(path)?;
    let tmp = path.with_extension("partial");
    image.save_with_format(&tmp, format)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn run_report(args: ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::load();
    let path = args.log.clone().unwrap_or(settings.log_path);
    let store = CsvAttendanceLog::new(&path);

    let report = match ReportOutcome::load(&store) {
        ReportOutcome::Loaded(report) => report,
        other => {
            if let Some(message) = other.message() {
                println!("{message}");
            }
            return Ok(());
        }
    };

    let filter = ReportFilter {
        date: args.date,
        label: args.label.clone(),
    };
    let rows = report.filtered(&filter);

    print!("{}", format_overview(&report, &report.stats()));
    println!();
    if rows.is_empty() {
        println!("No records");
    } else {
        print!("{}", format_table(&rows));
    }

    if let Some(export_path) = &args.export {
        let file = File::create(export_path)?;
        export_csv(&rows, BufWriter::new(file))?;
        println!("Exported {} records to {}", rows.len(), export_path.display());
    }
    Ok(())
}

fn format_overview(report: &AttendanceReport, stats: &ReportStats) -> String {
    let last_update = stats
        .last_update
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let dates: Vec<String> = report
        .available_dates()
        .iter()
        .map(|d| d.format(DATE_FORMAT).to_string())
        .collect();

    format!(
        "Total entries: {}\nUnique labels: {}\nLast update:   {last_update}\nDates:  {}\nLabels: {}\n",
        stats.total_entries,
        stats.unique_labels,
        dates.join(", "),
        report.available_labels().join(", "),
    )
}

fn format_table(rows: &[AttendanceRecord]) -> String {
    let width = rows
        .iter()
        .map(|r| r.label().chars().count())
        .chain(std::iter::once("Label".len()))
        .max()
        .unwrap_or(0);

    let mut out = format!("{:width$}  {:10}  {}\n", "Label", "Date", "Timestamp");
    for r in rows {
        out.push_str(&format!(
            "{:width$}  {:10}  {}\n",
            r.label(),
            r.date_string(),
            r.time_string()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn record(label: &str, day: u32) -> AttendanceRecord {
        AttendanceRecord::new(
            label,
            NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_threshold_bounds() {
        assert_eq!(parse_threshold("0.5"), Ok(0.5));
        assert_eq!(parse_threshold("1"), Ok(1.0));
        assert!(parse_threshold("0").is_err());
        assert!(parse_threshold("1.5").is_err());
        assert!(parse_threshold("high").is_err());
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(
            parse_date("2024-03-01"),
            Ok(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert!(parse_date("01/03/2024").is_err());
    }

    #[test]
    fn test_cli_parses_run_and_report() {
        let cli = Cli::try_parse_from([
            "attendance",
            "run",
            "--confidence",
            "0.7",
            "--replay",
            "frames",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Run(ref a) if a.confidence == Some(0.7)));

        let cli = Cli::try_parse_from(["attendance", "report", "--date", "2024-03-01"]).unwrap();
        assert!(matches!(cli.command, Command::Report(ref a) if a.date.is_some()));

        assert!(Cli::try_parse_from(["attendance", "run", "--iou", "0"]).is_err());
    }

    #[test]
    fn test_overrides_replace_only_given_values() {
        let cli = Cli::try_parse_from([
            "attendance",
            "run",
            "--device",
            "3",
            "--confidence",
            "0.8",
            "--cross-session-dedup",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut settings = Settings::default();
        apply_overrides(&mut settings, &args);
        assert_eq!(settings.device_index, 3);
        assert_eq!(settings.confidence, 80);
        assert!(settings.cross_session_dedup);
        assert_eq!(settings.iou, Settings::default().iou);
    }

    #[test]
    fn test_command_line_thresholds_keep_full_precision() {
        let cli = Cli::try_parse_from([
            "attendance",
            "run",
            "--confidence",
            "0.004",
            "--iou",
            "0.555",
        ])
        .unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let mut settings = Settings::default();
        apply_overrides(&mut settings, &args);
        let config = session_config(&settings, &args);

        assert!(config.validate().is_ok());
        assert_eq!(config.confidence_threshold, 0.004);
        assert_eq!(config.iou_threshold, 0.555);
        assert_eq!(settings.confidence, 1);
        assert_eq!(settings.iou, 56);
    }

    #[test]
    fn test_saved_thresholds_apply_without_flags() {
        let cli = Cli::try_parse_from(["attendance", "run"]).unwrap();
        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        let settings = Settings {
            confidence: 70,
            ..Settings::default()
        };
        assert_eq!(session_config(&settings, &args).confidence_threshold, 0.7);
    }

    #[test]
    fn test_format_table_aligns_columns() {
        let table = format_table(&[record("alice", 1), record("bartholomew", 2)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "Label        Date        Timestamp");
        assert_eq!(lines[1], "alice        2024-03-01  09:00:00");
        assert_eq!(lines[2], "bartholomew  2024-03-02  09:00:00");
    }

    #[test]
    fn test_format_overview() {
        let report = AttendanceReport::new(vec![record("bob", 1), record("alice", 2)]);
        let text = format_overview(&report, &report.stats());
        assert!(text.contains("Total entries: 2"));
        assert!(text.contains("Unique labels: 2"));
        assert!(text.contains("Last update:   2024-03-02 09:00:00"));
        assert!(text.contains("Dates:  2024-03-02, 2024-03-01"));
        assert!(text.contains("Labels: alice, bob"));
    }

    #[test]
    fn test_write_preview_replaces_file() {
        use attendance_core::shared::frame::Frame;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let frame = AnnotatedFrame {
            frame: Frame::new(vec![255; 2 * 2 * 3], 2, 2, 0),
            overlays: Vec::new(),
        };
        write_preview(&frame, &path).unwrap();
        write_preview(&frame, &path).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (2, 2));
        assert!(!path.with_extension("partial").exists());
    }
}
