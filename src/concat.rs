//! Pairwise trim-and-concatenate around a transition clip.
//!
//! Clip A loses its last `frame_count / fps` seconds, clip B its first, and
//! the transition is spliced between them. Trimming is time based so clips
//! whose rate differs from the transition's still line up.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::EncoderConfig;
use crate::error::ChainError;
use crate::probe::{ClipDescriptor, ClipProber, FfprobeProber};
use crate::process::ToolProcess;

/// Segments shorter than this are dropped from the concat graph.
const MIN_SEGMENT_SECS: f64 = 1e-6;

/// Trim boundaries for one pairwise merge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimPlan {
    /// `frame_count / fps`.
    pub transition_secs: f64,
    /// Clip A is kept over `[0, head_end]`.
    pub head_end: f64,
    /// Clip B is kept over `[tail_start, tail_end]`.
    pub tail_start: f64,
    pub tail_end: f64,
}

impl TrimPlan {
    /// Compute trim points. `fps` must be positive.
    pub fn new(frame_count: u32, fps: f64, duration_a: f64, duration_b: f64) -> Self {
        let transition_secs = f64::from(frame_count) / fps;
        Self {
            transition_secs,
            head_end: (duration_a - transition_secs).max(0.0),
            tail_start: transition_secs.min(duration_b),
            tail_end: duration_b,
        }
    }

    pub fn head_secs(&self) -> f64 {
        self.head_end
    }

    pub fn tail_secs(&self) -> f64 {
        (self.tail_end - self.tail_start).max(0.0)
    }

    /// Length of the merged clip given the transition clip's real duration.
    pub fn output_secs(&self, transition_clip_secs: f64) -> f64 {
        self.head_secs() + transition_clip_secs + self.tail_secs()
    }
}

/// Inputs of one pairwise merge.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeRequest {
    pub clip_a: PathBuf,
    pub clip_b: PathBuf,
    pub transition: PathBuf,
    pub frame_count: u32,
    pub fps: f64,
    pub output: PathBuf,
}

/// Produces `{head of A, transition, tail of B}` at `request.output`.
pub trait ClipMerger {
    fn merge(&self, request: &MergeRequest) -> Result<PathBuf, ChainError>;
}

/// One piece of the concatenation.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// ffmpeg input index.
    pub input: usize,
    /// `(start, duration)` to trim; `None` takes the whole input.
    pub window: Option<(f64, f64)>,
    /// Seconds this segment contributes.
    pub duration: f64,
    pub has_audio: bool,
}

/// Segments for head, transition, and tail, with empty ones removed.
///
/// Input indices: 0 = clip A, 1 = transition, 2 = clip B.
pub fn plan_segments(
    plan: &TrimPlan,
    clip_a: &ClipDescriptor,
    transition: &ClipDescriptor,
    clip_b: &ClipDescriptor,
) -> Vec<Segment> {
    let candidates = [
        Segment {
            input: 0,
            window: Some((0.0, plan.head_secs())),
            duration: plan.head_secs(),
            has_audio: clip_a.has_audio,
        },
        Segment {
            input: 1,
            window: None,
            duration: transition.duration_secs,
            has_audio: transition.has_audio,
        },
        Segment {
            input: 2,
            window: Some((plan.tail_start, plan.tail_secs())),
            duration: plan.tail_secs(),
            has_audio: clip_b.has_audio,
        },
    ];
    candidates
        .into_iter()
        .filter(|s| s.duration > MIN_SEGMENT_SECS)
        .collect()
}

/// Build the `-filter_complex` graph that normalizes and concatenates `segments`.
///
/// Every segment is scaled and padded to `width`x`height` (rounded down to even
/// values for yuv420p), resampled to `fps`, and paired with an audio stream
/// (generated silence when the input has none) of the same length.
pub fn build_concat_filter(
    segments: &[Segment],
    width: u32,
    height: u32,
    fps: f64,
    sample_rate: u32,
) -> String {
    let (width, height) = (even(width), even(height));
    let mut graph = String::new();
    let mut pads = String::new();

    for (i, segment) in segments.iter().enumerate() {
        let trim = segment
            .window
            .map(|(start, duration)| {
                format!(
                    "trim=start={}:duration={},",
                    secs(start),
                    secs(duration)
                )
            })
            .unwrap_or_default();
        let _ = write!(
            graph,
            "[{input}:v]{trim}setpts=PTS-STARTPTS,\
             scale={w}:{h}:force_original_aspect_ratio=decrease,\
             pad={w}:{h}:(ow-iw)/2:(oh-ih)/2,setsar=1,fps={fps},format=yuv420p[v{i}];",
            input = segment.input,
            trim = trim,
            w = width,
            h = height,
            fps = secs(fps),
            i = i,
        );

        if segment.has_audio {
            let atrim = segment
                .window
                .map(|(start, duration)| {
                    format!(
                        "atrim=start={}:duration={},",
                        secs(start),
                        secs(duration)
                    )
                })
                .unwrap_or_default();
            let _ = write!(
                graph,
                "[{input}:a]{atrim}asetpts=PTS-STARTPTS,aresample={rate},\
                 aformat=sample_fmts=fltp:channel_layouts=stereo,\
                 apad,atrim=duration={dur}[a{i}];",
                input = segment.input,
                atrim = atrim,
                rate = sample_rate,
                dur = secs(segment.duration),
                i = i,
            );
        } else {
            let _ = write!(
                graph,
                "anullsrc=r={rate}:cl=stereo,atrim=duration={dur},\
                 aformat=sample_fmts=fltp:channel_layouts=stereo[a{i}];",
                rate = sample_rate,
                dur = secs(segment.duration),
                i = i,
            );
        }

        let _ = write!(pads, "[v{i}][a{i}]");
    }

    let _ = write!(
        graph,
        "{pads}concat=n={n}:v=1:a=1[outv][outa]",
        pads = pads,
        n = segments.len()
    );
    graph
}

/// Largest even value not above `value`, at least 2.
fn even(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Seconds with microsecond precision.
fn secs(value: f64) -> String {
    format!("{:.6}", value)
}

/// [`ClipMerger`] that re-encodes with ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegMerger {
    encoder: EncoderConfig,
    prober: FfprobeProber,
}

impl FfmpegMerger {
    pub fn new(encoder: EncoderConfig) -> Self {
        let prober = FfprobeProber::new(encoder.ffprobe.clone());
        Self { encoder, prober }
    }

    fn probe(&self, path: &Path) -> Result<ClipDescriptor, ChainError> {
        self.prober
            .probe(path)
            .map_err(|e| ChainError::invalid_media(path, &e))
    }

    /// Full ffmpeg argument list for a merge.
    pub fn build_args(&self, request: &MergeRequest, filter: &str) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-hide_banner".into(),
            "-nostdin".into(),
            "-y".into(),
            "-i".into(),
            request.clip_a.to_string_lossy().into_owned(),
            "-i".into(),
            request.transition.to_string_lossy().into_owned(),
            "-i".into(),
            request.clip_b.to_string_lossy().into_owned(),
            "-filter_complex".into(),
            filter.to_string(),
            "-map".into(),
            "[outv]".into(),
            "-map".into(),
            "[outa]".into(),
            "-c:v".into(),
            self.encoder.video_codec.clone(),
            "-c:a".into(),
            self.encoder.audio_codec.clone(),
            "-ar".into(),
            self.encoder.audio_sample_rate.to_string(),
        ];
        args.extend(self.encoder.extra_args.iter().cloned());
        args.push(request.output.to_string_lossy().into_owned());
        args
    }
}

impl ClipMerger for FfmpegMerger {
    fn merge(&self, request: &MergeRequest) -> Result<PathBuf, ChainError> {
        let clip_a = self.probe(&request.clip_a)?;
        let clip_b = self.probe(&request.clip_b)?;
        let transition = self.probe(&request.transition)?;

        let plan = TrimPlan::new(
            request.frame_count,
            request.fps,
            clip_a.duration_secs,
            clip_b.duration_secs,
        );
        log::info!(
            "Trimming around {:.3}s transition: head [0, {:.3}] of {}, tail [{:.3}, {:.3}] of {}",
            plan.transition_secs,
            plan.head_end,
            request.clip_a.display(),
            plan.tail_start,
            plan.tail_end,
            request.clip_b.display()
        );

        let segments = plan_segments(&plan, &clip_a, &transition, &clip_b);
        let filter = build_concat_filter(
            &segments,
            clip_a.width,
            clip_a.height,
            request.fps,
            self.encoder.audio_sample_rate,
        );
        let args = self.build_args(request, &filter);

        let encode_error = |reason: String| ChainError::EncodeError {
            output: request.output.clone(),
            reason,
        };

        let output = ToolProcess::run(&self.encoder.ffmpeg, &args, None)
            .map_err(|e| encode_error(e.to_string()))?;
        if !output.success() {
            return Err(encode_error(format!(
                "ffmpeg exited with {}\n{}",
                output.status,
                output.stderr_tail()
            )));
        }

        let written = std::fs::metadata(&request.output)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(encode_error("ffmpeg reported success but wrote nothing".to_string()));
        }

        log::info!(
            "Merged {} ({:.2}s expected)",
            request.output.display(),
            plan.output_secs(transition.duration_secs)
        );
        Ok(request.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip(duration: f64, has_audio: bool) -> ClipDescriptor {
        ClipDescriptor::new("clip.mp4", 30.0, duration, 1280, 720, has_audio)
    }

    #[test]
    fn test_plan_for_ten_second_clips() {
        let plan = TrimPlan::new(30, 30.0, 10.0, 10.0);
        assert_eq!(plan.transition_secs, 1.0);
        assert_eq!(plan.head_end, 9.0);
        assert_eq!(plan.tail_start, 1.0);
        assert_eq!(plan.tail_end, 10.0);
        assert_eq!(plan.head_secs(), 9.0);
        assert_eq!(plan.tail_secs(), 9.0);
        assert_eq!(plan.output_secs(1.0), 19.0);
    }

    #[test]
    fn test_head_never_negative() {
        for frames in [1u32, 30, 90, 300, 1000] {
            for fps in [12.0, 24.0, 29.97, 60.0] {
                for duration in [0.0, 0.5, 2.0, 10.0] {
                    let plan = TrimPlan::new(frames, fps, duration, duration);
                    assert!(plan.head_secs() >= 0.0);
                    assert!(plan.tail_secs() >= 0.0);
                    assert!(plan.tail_start <= plan.tail_end);
                    let expected = (duration - f64::from(frames) / fps).max(0.0);
                    assert!((plan.head_secs() - expected).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn test_transition_longer_than_clips_clamps() {
        let plan = TrimPlan::new(90, 30.0, 2.0, 2.5);
        assert_eq!(plan.transition_secs, 3.0);
        assert_eq!(plan.head_secs(), 0.0);
        assert_eq!(plan.tail_start, 2.5);
        assert_eq!(plan.tail_secs(), 0.0);
    }

    #[test]
    fn test_segments_in_order() {
        let plan = TrimPlan::new(30, 30.0, 10.0, 8.0);
        let segments = plan_segments(&plan, &clip(10.0, true), &clip(1.0, false), &clip(8.0, true));
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].input, 0);
        assert_eq!(segments[0].window, Some((0.0, 9.0)));
        assert_eq!(segments[1].input, 1);
        assert_eq!(segments[1].window, None);
        assert!(!segments[1].has_audio);
        assert_eq!(segments[2].input, 2);
        assert_eq!(segments[2].window, Some((1.0, 7.0)));
    }

    #[test]
    fn test_empty_head_is_dropped() {
        let plan = TrimPlan::new(60, 30.0, 2.0, 10.0);
        let segments = plan_segments(&plan, &clip(2.0, true), &clip(2.0, true), &clip(10.0, true));
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].input, 1);
        assert_eq!(segments[1].input, 2);
    }

    #[test]
    fn test_filter_concats_all_segments() {
        let plan = TrimPlan::new(30, 30.0, 10.0, 10.0);
        let segments = plan_segments(&plan, &clip(10.0, true), &clip(1.0, true), &clip(10.0, true));
        let filter = build_concat_filter(&segments, 1280, 720, 30.0, 44100);
        assert!(filter.contains("[0:v]trim=start=0.000000:duration=9.000000,setpts=PTS-STARTPTS"));
        assert!(filter.contains("[1:v]setpts=PTS-STARTPTS"));
        assert!(filter.contains("[2:v]trim=start=1.000000:duration=9.000000"));
        assert!(filter.contains("[2:a]atrim=start=1.000000:duration=9.000000"));
        assert!(filter.contains("scale=1280:720"));
        assert!(filter.contains("fps=30.000000"));
        assert!(filter.ends_with("[v0][a0][v1][a1][v2][a2]concat=n=3:v=1:a=1[outv][outa]"));
    }

    #[test]
    fn test_filter_generates_silence_for_mute_segments() {
        let plan = TrimPlan::new(30, 30.0, 10.0, 10.0);
        let segments = plan_segments(&plan, &clip(10.0, true), &clip(1.5, false), &clip(10.0, true));
        let filter = build_concat_filter(&segments, 640, 360, 30.0, 48000);
        assert!(filter.contains("anullsrc=r=48000:cl=stereo,atrim=duration=1.500000"));
        assert!(!filter.contains("[1:a]"));
    }

    #[test]
    fn test_filter_rounds_odd_size_to_even() {
        let plan = TrimPlan::new(30, 30.0, 10.0, 10.0);
        let segments = plan_segments(&plan, &clip(10.0, true), &clip(1.0, true), &clip(10.0, true));
        let filter = build_concat_filter(&segments, 853, 481, 30.0, 44100);
        assert!(filter.contains("scale=852:480:"));
        assert!(filter.contains("pad=852:480:"));
        assert!(!filter.contains("853"));
        assert_eq!(even(1), 2);
        assert_eq!(even(1920), 1920);
    }

    /// Test helper: an executable standing in for ffprobe that reports a
    /// 2 s, 25 fps, 64x64 clip for any input.
    #[cfg(unix)]
    fn fake_ffprobe(dir: &Path) -> String {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-ffprobe");
        std::fs::write(
            &script,
            "#!/bin/sh\n\
             echo '{\"streams\":[{\"codec_type\":\"video\",\"width\":64,\"height\":64,\
             \"avg_frame_rate\":\"25/1\",\"duration\":\"2.0\"}],\"format\":{\"duration\":\"2.0\"}}'\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    fn merge_with_ffmpeg(ffmpeg: &str) -> (tempfile::TempDir, Result<PathBuf, ChainError>) {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["a.mp4", "b.mp4", "t.mp4"] {
            std::fs::write(dir.path().join(name), b"clip").unwrap();
        }
        let merger = FfmpegMerger::new(EncoderConfig {
            ffmpeg: ffmpeg.to_string(),
            ffprobe: fake_ffprobe(dir.path()),
            ..EncoderConfig::default()
        });
        let request = MergeRequest {
            clip_a: dir.path().join("a.mp4"),
            clip_b: dir.path().join("b.mp4"),
            transition: dir.path().join("t.mp4"),
            frame_count: 10,
            fps: 25.0,
            output: dir.path().join("merged.mp4"),
        };
        let result = merger.merge(&request);
        (dir, result)
    }

    #[cfg(unix)]
    #[test]
    fn test_merge_fails_on_encoder_exit_status() {
        let (dir, result) = merge_with_ffmpeg("false");
        match result {
            Err(ChainError::EncodeError { output, reason }) => {
                assert_eq!(output, dir.path().join("merged.mp4"));
                assert!(reason.contains("exited with"), "{}", reason);
            }
            other => panic!("expected EncodeError, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_merge_fails_when_encoder_writes_nothing() {
        let (_dir, result) = merge_with_ffmpeg("true");
        match result {
            Err(ChainError::EncodeError { reason, .. }) => {
                assert!(reason.contains("wrote nothing"), "{}", reason)
            }
            other => panic!("expected EncodeError, got {:?}", other),
        }
    }

    #[test]
    fn test_build_args_maps_outputs() {
        let merger = FfmpegMerger::new(EncoderConfig::default());
        let request = MergeRequest {
            clip_a: PathBuf::from("a.mp4"),
            clip_b: PathBuf::from("b.mp4"),
            transition: PathBuf::from("t.mp4"),
            frame_count: 30,
            fps: 30.0,
            output: PathBuf::from("out.mp4"),
        };
        let args = merger.build_args(&request, "GRAPH");
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-filter_complex") + 1], "GRAPH");
        assert_eq!(args[pos("-c:v") + 1], "libx264");
        assert_eq!(args[pos("-c:a") + 1], "aac");
        let inputs: Vec<_> = args
            .iter()
            .enumerate()
            .filter(|(_, a)| *a == "-i")
            .map(|(i, _)| args[i + 1].as_str())
            .collect();
        assert_eq!(inputs, vec!["a.mp4", "t.mp4", "b.mp4"]);
        assert_eq!(args.last().unwrap(), "out.mp4");
    }
}
