//! Video container metadata via an external probe.
//!
//! `ffprobe` is optional. When it is missing, exits non-zero, prints
//! something unparseable, or runs past its deadline, the probe answers
//! `None` and the caller carries on without video metadata.

use chrono::{DateTime, NaiveDateTime};
use crossbeam_channel::{bounded, RecvTimeoutError};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default wall-clock budget for one probe invocation
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

const EXIT_POLL: Duration = Duration::from_millis(10);

const VIDEO_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%d %H:%M:%S",
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%a %b %e %H:%M:%S %Y",
];

/// Tags read from a video container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoMetadata {
    pub make: Option<String>,
    pub model: Option<String>,
    pub creation_time: Option<NaiveDateTime>,
    pub duration_seconds: Option<f64>,
}

/// Source of video durations and container tags
pub trait VideoProbe: Send + Sync {
    /// Duration in seconds, if it can be determined
    fn duration(&self, path: &Path) -> Option<f64>;

    /// Container tags, if the probe is available.
    ///
    /// Library entry point only; ingest routes videos by duration and mtime.
    fn metadata(&self, path: &Path) -> Option<VideoMetadata>;
}

/// A probe that never knows anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProbe;

impl VideoProbe for NoProbe {
    fn duration(&self, _path: &Path) -> Option<f64> {
        None
    }

    fn metadata(&self, _path: &Path) -> Option<VideoMetadata> {
        None
    }
}

/// Probe backed by the `ffprobe` executable
#[derive(Debug)]
pub struct FfprobeProbe {
    program: PathBuf,
    timeout: Duration,
    missing_reported: AtomicBool,
}

impl FfprobeProbe {
    /// Use `ffprobe` from `PATH`
    pub fn new() -> Self {
        Self::with_program("ffprobe")
    }

    /// Use a specific executable
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: PROBE_TIMEOUT,
            missing_reported: AtomicBool::new(false),
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the probe, returning stdout on a clean exit within the deadline
    fn run<I, S>(&self, args: I) -> Option<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let started = Instant::now();
        let mut child = match Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                if !self.missing_reported.swap(true, Ordering::Relaxed) {
                    warn!(
                        program = %self.program.display(),
                        error = %e,
                        "Video probe unavailable; short-video detection disabled"
                    );
                }
                return None;
            }
        };

        let mut stdout = child.stdout.take()?;
        let (tx, rx) = bounded(1);
        thread::spawn(move || {
            let mut buf = Vec::new();
            let result = stdout.read_to_end(&mut buf).map(|_| buf);
            let _ = tx.send(result);
        });

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(output)) => {
                let remaining = self.timeout.saturating_sub(started.elapsed());
                let status = self.wait_within(&mut child, remaining)?;
                status.success().then_some(output)
            }
            Ok(Err(_)) => {
                abandon(&mut child);
                None
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                self.report_timeout();
                abandon(&mut child);
                None
            }
        }
    }

    /// Reap a child that already closed stdout, killing it once `budget` runs out
    fn wait_within(&self, child: &mut Child, budget: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + budget;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Some(status),
                Ok(None) if Instant::now() < deadline => thread::sleep(EXIT_POLL),
                Ok(None) => {
                    self.report_timeout();
                    abandon(child);
                    return None;
                }
                Err(_) => {
                    abandon(child);
                    return None;
                }
            }
        }
    }

    fn report_timeout(&self) {
        warn!(
            timeout_secs = self.timeout.as_secs(),
            "Video probe timed out; killing it"
        );
    }
}

fn abandon(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

impl Default for FfprobeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoProbe for FfprobeProbe {
    fn duration(&self, path: &Path) -> Option<f64> {
        let output = self.run([
            OsStr::new("-v"),
            OsStr::new("quiet"),
            OsStr::new("-show_entries"),
            OsStr::new("format=duration"),
            OsStr::new("-of"),
            OsStr::new("csv=p=0"),
            path.as_os_str(),
        ])?;
        let duration = parse_duration(&String::from_utf8_lossy(&output));
        debug!(path = %path.display(), ?duration, "Probed video duration");
        duration
    }

    fn metadata(&self, path: &Path) -> Option<VideoMetadata> {
        let output = self.run([
            OsStr::new("-v"),
            OsStr::new("quiet"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_streams"),
            path.as_os_str(),
        ])?;
        parse_probe_json(&output)
    }
}

/// Parse a decimal duration in seconds
pub fn parse_duration(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d >= 0.0)
}

#[derive(Deserialize, Default)]
struct ProbeOutput {
    #[serde(default)]
    format: ProbeFormat,
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize, Default)]
struct ProbeFormat {
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Deserialize, Default)]
struct ProbeStream {
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Parse `ffprobe -print_format json` output.
///
/// Tag keys from the format section and every stream are folded to
/// lowercase. Format tags win over stream tags with the same key.
pub fn parse_probe_json(raw: &[u8]) -> Option<VideoMetadata> {
    let probe: ProbeOutput = serde_json::from_slice(raw).ok()?;

    let mut tags: BTreeMap<String, String> = BTreeMap::new();
    for (key, value) in probe.format.tags {
        tags.entry(key.to_lowercase()).or_insert(value);
    }
    for stream in probe.streams {
        for (key, value) in stream.tags {
            tags.entry(key.to_lowercase()).or_insert(value);
        }
    }

    let mut metadata = VideoMetadata {
        duration_seconds: probe.format.duration.as_deref().and_then(parse_duration),
        ..Default::default()
    };

    for (key, value) in &tags {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        if metadata.make.is_none() && (key.contains("make") || key.contains("manufacturer")) {
            metadata.make = Some(value.to_string());
        }
        if metadata.model.is_none() && key.contains("model") {
            metadata.model = Some(value.to_string());
        }
        if metadata.creation_time.is_none()
            && (key.contains("creation") || key.contains("date") || key.contains("datetime"))
        {
            metadata.creation_time = parse_video_datetime(value);
        }
    }

    Some(metadata)
}

/// Parse a container timestamp in any accepted layout
pub fn parse_video_datetime(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    VIDEO_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}
