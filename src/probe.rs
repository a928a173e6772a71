//! Clip inspection via ffprobe.
//!
//! A [`ClipDescriptor`] is derived fresh on every probe and never cached; the
//! underlying file may be an intermediate that changes between chain steps.

use serde::Deserialize;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::process::{ProcessError, ToolProcess};

/// Read-only facts about a media file.
#[derive(Debug, Clone, PartialEq)]
pub struct ClipDescriptor {
    pub path: PathBuf,
    /// Frames per second.
    pub frame_rate: f64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// `floor(duration_secs * frame_rate)`.
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
    /// Whether the container carries at least one audio stream.
    pub has_audio: bool,
}

impl ClipDescriptor {
    /// Build a descriptor, deriving `total_frames` from duration and rate.
    pub fn new(
        path: impl Into<PathBuf>,
        frame_rate: f64,
        duration_secs: f64,
        width: u32,
        height: u32,
        has_audio: bool,
    ) -> Self {
        Self {
            path: path.into(),
            frame_rate,
            duration_secs,
            total_frames: total_frames(duration_secs, frame_rate),
            width,
            height,
            has_audio,
        }
    }
}

/// Whole frames contained in `duration_secs` at `frame_rate`.
pub fn total_frames(duration_secs: f64, frame_rate: f64) -> u64 {
    if duration_secs <= 0.0 || frame_rate <= 0.0 {
        return 0;
    }
    (duration_secs * frame_rate).floor() as u64
}

/// Media read failures.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to run ffprobe: {0}")]
    Tool(#[from] ProcessError),

    #[error("ffprobe could not read '{}': {stderr}", path.display())]
    Unreadable { path: PathBuf, stderr: String },

    #[error("Unexpected ffprobe output: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("No video stream in '{}'", .0.display())]
    NoVideoStream(PathBuf),

    #[error("Missing or invalid {field} in '{}'", path.display())]
    InvalidField { path: PathBuf, field: &'static str },
}

/// Source of clip descriptors.
pub trait ClipProber {
    fn probe(&self, path: &Path) -> Result<ClipDescriptor, ProbeError>;
}

/// [`ClipProber`] backed by the `ffprobe` executable.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    program: String,
}

impl FfprobeProber {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for FfprobeProber {
    fn default() -> Self {
        Self::new("ffprobe")
    }
}

impl ClipProber for FfprobeProber {
    fn probe(&self, path: &Path) -> Result<ClipDescriptor, ProbeError> {
        if !path.is_file() {
            return Err(ProbeError::NotFound(path.to_path_buf()));
        }

        let args = [
            OsStr::new("-v"),
            OsStr::new("error"),
            OsStr::new("-print_format"),
            OsStr::new("json"),
            OsStr::new("-show_format"),
            OsStr::new("-show_streams"),
            path.as_os_str(),
        ];
        let output = ToolProcess::run(&self.program, args, None)?;
        if !output.success() {
            return Err(ProbeError::Unreadable {
                path: path.to_path_buf(),
                stderr: output.stderr_tail(),
            });
        }

        parse_ffprobe_json(path, &output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Turn `ffprobe -print_format json -show_format -show_streams` output into a descriptor.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<ClipDescriptor, ProbeError> {
    let parsed: FfprobeOutput = serde_json::from_str(json)?;

    let video = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProbeError::NoVideoStream(path.to_path_buf()))?;
    let has_audio = parsed
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let invalid = |field| ProbeError::InvalidField {
        path: path.to_path_buf(),
        field,
    };

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rational))
        .ok_or_else(|| invalid("frame rate"))?;

    let duration_secs = parsed
        .format
        .as_ref()
        .and_then(|f| f.duration.as_deref())
        .or(video.duration.as_deref())
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .ok_or_else(|| invalid("duration"))?;

    let width = video.width.ok_or_else(|| invalid("width"))?;
    let height = video.height.ok_or_else(|| invalid("height"))?;

    Ok(ClipDescriptor::new(
        path,
        frame_rate,
        duration_secs,
        width,
        height,
        has_audio,
    ))
}

/// Parse an ffprobe rational like `30000/1001`. Zero or malformed rates yield `None`.
pub fn parse_rational(s: &str) -> Option<f64> {
    let value = match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => s.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "streams": [
            {
                "index": 0,
                "codec_name": "h264",
                "codec_type": "video",
                "width": 1920,
                "height": 1080,
                "r_frame_rate": "30/1",
                "avg_frame_rate": "30/1",
                "duration": "10.000000"
            },
            {
                "index": 1,
                "codec_name": "aac",
                "codec_type": "audio",
                "sample_rate": "44100"
            }
        ],
        "format": {
            "filename": "clip.mp4",
            "duration": "10.010000"
        }
    }"#;

    #[test]
    fn test_parse_rational() {
        assert_eq!(parse_rational("30/1"), Some(30.0));
        assert_eq!(parse_rational("25"), Some(25.0));
        let ntsc = parse_rational("30000/1001").unwrap();
        assert!((ntsc - 29.97).abs() < 0.01);
        assert_eq!(parse_rational("0/0"), None);
        assert_eq!(parse_rational("0/1"), None);
        assert_eq!(parse_rational("abc"), None);
    }

    #[test]
    fn test_total_frames_floors() {
        assert_eq!(total_frames(10.0, 30.0), 300);
        assert_eq!(total_frames(1.99, 10.0), 19);
        assert_eq!(total_frames(0.0, 30.0), 0);
        assert_eq!(total_frames(5.0, 0.0), 0);
    }

    #[test]
    fn test_parse_sample_output() {
        let clip = parse_ffprobe_json(Path::new("clip.mp4"), SAMPLE).unwrap();
        assert_eq!(clip.path, PathBuf::from("clip.mp4"));
        assert_eq!(clip.frame_rate, 30.0);
        // Container duration wins over the stream's
        assert!((clip.duration_secs - 10.01).abs() < 1e-9);
        assert_eq!(clip.total_frames, 300);
        assert_eq!((clip.width, clip.height), (1920, 1080));
        assert!(clip.has_audio);
    }

    #[test]
    fn test_avg_frame_rate_falls_back_to_r_frame_rate() {
        let json = r#"{
            "streams": [{
                "codec_type": "video", "width": 640, "height": 360,
                "avg_frame_rate": "0/0", "r_frame_rate": "24/1", "duration": "2.5"
            }]
        }"#;
        let clip = parse_ffprobe_json(Path::new("a.mp4"), json).unwrap();
        assert_eq!(clip.frame_rate, 24.0);
        assert_eq!(clip.duration_secs, 2.5);
        assert_eq!(clip.total_frames, 60);
        assert!(!clip.has_audio);
    }

    #[test]
    fn test_audio_only_file_is_rejected() {
        let json = r#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3.0"}}"#;
        let err = parse_ffprobe_json(Path::new("song.m4a"), json).unwrap_err();
        assert!(matches!(err, ProbeError::NoVideoStream(_)));
    }

    #[test]
    fn test_missing_duration_is_rejected() {
        let json = r#"{"streams": [{"codec_type": "video", "width": 2, "height": 2, "r_frame_rate": "30/1"}]}"#;
        let err = parse_ffprobe_json(Path::new("x.mp4"), json).unwrap_err();
        assert!(err.to_string().contains("duration"));
    }

    #[test]
    fn test_garbage_output_is_parse_error() {
        let err = parse_ffprobe_json(Path::new("x.mp4"), "not json").unwrap_err();
        assert!(matches!(err, ProbeError::Parse(_)));
    }

    #[test]
    fn test_missing_file_fails_before_spawning() {
        let prober = FfprobeProber::new("definitely-not-ffprobe");
        let err = prober.probe(Path::new("/nonexistent/clip.mp4")).unwrap_err();
        assert!(matches!(err, ProbeError::NotFound(_)));
    }
}
