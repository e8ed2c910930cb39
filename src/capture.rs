use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::attempt::first_success;
use crate::error::{BeatreelError, BeatreelResult};
use crate::scene::{FrameRGBA, SceneAnimator};
use crate::status::StatusChannel;

/// Output frame rate of the captured stream.
pub const CAPTURE_FPS: u32 = 30;

/// Wall-clock margin past the track duration before recording is forced to
/// stop, bounding worst-case run time.
pub const RECORD_TIMEOUT_MARGIN: f64 = 5.0;

/// Cap on waiting for the encoder to flush after the last frame.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(30);

/// One entry of the ordered codec/container preference list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodecCandidate {
    /// MediaRecorder-style type tag, also the negotiated session type.
    pub mime: &'static str,
    /// Output container format.
    pub container: &'static str,
    /// ffmpeg video encoder; `None` leaves the choice to the platform.
    pub video_encoder: Option<&'static str>,
    /// ffmpeg audio encoder; `None` leaves the choice to the platform.
    pub audio_encoder: Option<&'static str>,
}

impl CodecCandidate {
    pub fn is_unqualified(&self) -> bool {
        self.video_encoder.is_none() && self.audio_encoder.is_none()
    }

    fn unqualified() -> Self {
        Self {
            mime: "video/webm",
            container: "webm",
            video_encoder: None,
            audio_encoder: None,
        }
    }
}

/// Candidate codecs in preference order: a widely compatible mp4 first, two
/// progressively less specific webm pairs, then an unqualified fallback.
pub fn codec_candidates() -> Vec<CodecCandidate> {
    vec![
        CodecCandidate {
            mime: "video/mp4;codecs=avc1,mp4a",
            container: "mp4",
            video_encoder: Some("libx264"),
            audio_encoder: Some("aac"),
        },
        CodecCandidate {
            mime: "video/webm;codecs=vp9,opus",
            container: "webm",
            video_encoder: Some("libvpx-vp9"),
            audio_encoder: Some("libopus"),
        },
        CodecCandidate {
            mime: "video/webm;codecs=vp8,vorbis",
            container: "webm",
            video_encoder: Some("libvpx"),
            audio_encoder: Some("libvorbis"),
        },
        CodecCandidate::unqualified(),
    ]
}

/// Keep only candidates whose encoders the platform reports as available,
/// judged against an `ffmpeg -encoders` listing. When nothing survives the
/// filter, a single unqualified attempt is still made.
pub fn filter_supported(candidates: Vec<CodecCandidate>, listing: &str) -> Vec<CodecCandidate> {
    let available: Vec<&str> = listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .collect();
    let has = |name: Option<&str>| name.is_none_or(|n| available.contains(&n));

    let supported: Vec<CodecCandidate> = candidates
        .into_iter()
        .filter(|c| {
            if c.is_unqualified() {
                !listing.trim().is_empty()
            } else {
                has(c.video_encoder) && has(c.audio_encoder)
            }
        })
        .collect();

    if supported.is_empty() {
        vec![CodecCandidate::unqualified()]
    } else {
        supported
    }
}

/// Resolved session type for a finalized recording: `video/mp4` when the
/// chosen candidate indicates MPEG-4, otherwise the literal chosen type.
pub fn resolve_output_mime(chosen: &str) -> String {
    if chosen.contains("mp4") {
        "video/mp4".to_string()
    } else {
        chosen.to_string()
    }
}

pub fn extension_for_mime(mime: &str) -> &'static str {
    if mime.contains("mp4") { "mp4" } else { "webm" }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Stopped,
    Failed,
}

/// Bookkeeping for one recording attempt chain; owned exclusively by the
/// capture pipeline and discarded when the run finishes.
#[derive(Debug)]
pub struct CaptureSession {
    pub candidates: Vec<CodecCandidate>,
    pub chosen_mime: Option<String>,
    pub chunks: Vec<Vec<u8>>,
    pub state: CaptureState,
}

impl CaptureSession {
    pub fn new(candidates: Vec<CodecCandidate>) -> Self {
        Self {
            candidates,
            chosen_mime: None,
            chunks: Vec::new(),
            state: CaptureState::Idle,
        }
    }
}

/// The finalized output artifact.
#[derive(Clone, Debug)]
pub struct VideoBlob {
    pub data: Vec<u8>,
    pub mime: String,
}

impl VideoBlob {
    pub fn extension(&self) -> &'static str {
        extension_for_mime(&self.mime)
    }

    /// Write the artifact as `<title>.<ext>` under `dir`.
    pub fn write_to_dir(&self, dir: &Path, title: &str) -> BeatreelResult<PathBuf> {
        use anyhow::Context as _;
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory '{}'", dir.display()))?;
        let path = dir.join(format!("{}.{}", sanitize_title(title), self.extension()));
        std::fs::write(&path, &self.data)
            .with_context(|| format!("failed to write '{}'", path.display()))?;
        Ok(path)
    }
}

/// Filesystem-safe output name derived from the user title; `"amv"` when the
/// title is empty or degenerate.
pub fn sanitize_title(title: &str) -> String {
    let cleaned: String = title
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        "amv".to_string()
    } else {
        cleaned
    }
}

#[derive(Clone, Debug)]
pub struct RecordConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio_path: PathBuf,
}

impl RecordConfig {
    pub fn validate(&self) -> BeatreelResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BeatreelError::validation(
                "capture width/height must be non-zero",
            ));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(BeatreelError::validation(
                "capture width/height must be even (required for yuv420p output)",
            ));
        }
        if self.fps == 0 {
            return Err(BeatreelError::validation("capture fps must be non-zero"));
        }
        Ok(())
    }
}

/// Encoder seam for one recording attempt: frames in, encoded bytes out.
///
/// `finish` returning an empty vec means the candidate produced no data, so
/// negotiation moves on to the next candidate.
pub trait Recorder {
    fn begin(&mut self, candidate: &CodecCandidate, cfg: &RecordConfig) -> BeatreelResult<()>;
    fn push_frame(&mut self, frame: &FrameRGBA) -> BeatreelResult<()>;
    fn finish(&mut self) -> BeatreelResult<Vec<u8>>;
}

/// Records the rendered frames mixed with the source audio into an encoded
/// video, racing natural completion against the forced-stop timeout.
pub struct CapturePipeline {
    cfg: RecordConfig,
    status: StatusChannel,
    stop: Arc<AtomicBool>,
}

impl CapturePipeline {
    pub fn new(
        cfg: RecordConfig,
        status: StatusChannel,
        stop: Arc<AtomicBool>,
    ) -> BeatreelResult<Self> {
        cfg.validate()?;
        Ok(Self { cfg, status, stop })
    }

    /// Try each codec candidate in order; the first that produces data wins.
    ///
    /// Fails with [`BeatreelError::RecordingUnsupported`] when every
    /// candidate comes back empty, or [`BeatreelError::Stopped`] on an
    /// explicit stop (partial data is discarded).
    pub async fn record(
        &self,
        animator: &mut SceneAnimator,
        recorder: &mut dyn Recorder,
        candidates: Vec<CodecCandidate>,
    ) -> BeatreelResult<VideoBlob> {
        let mut session = CaptureSession::new(candidates);
        session.state = CaptureState::Recording;
        let duration = animator.duration_seconds();

        let candidate_list = session.candidates.clone();
        let won = first_success(&candidate_list, async |candidate| {
            if self.stop.load(Ordering::SeqCst) {
                return None;
            }
            tracing::info!(mime = candidate.mime, "starting recording attempt");
            match self
                .record_attempt(&candidate, animator, recorder, duration)
                .await
            {
                Ok(data) if !data.is_empty() => Some(data),
                Ok(_) => {
                    self.status
                        .note(format!("{}: recorder produced no data", candidate.mime));
                    None
                }
                Err(err) => {
                    tracing::warn!(mime = candidate.mime, error = %err, "recording attempt failed");
                    self.status
                        .note(format!("{}: {err}", candidate.mime));
                    None
                }
            }
        })
        .await;

        if self.stop.load(Ordering::SeqCst) {
            session.state = CaptureState::Stopped;
            return Err(BeatreelError::Stopped);
        }

        match won {
            Some((candidate, data)) => {
                session.chosen_mime = Some(candidate.mime.to_string());
                session.chunks.push(data);
                session.state = CaptureState::Stopped;
                Ok(VideoBlob {
                    data: session.chunks.concat(),
                    mime: resolve_output_mime(candidate.mime),
                })
            }
            None => {
                session.state = CaptureState::Failed;
                Err(BeatreelError::recording_unsupported(
                    "no codec candidate produced data",
                ))
            }
        }
    }

    async fn record_attempt(
        &self,
        candidate: &CodecCandidate,
        animator: &mut SceneAnimator,
        recorder: &mut dyn Recorder,
        duration: f64,
    ) -> BeatreelResult<Vec<u8>> {
        recorder.begin(candidate, &self.cfg)?;

        let total_frames = ((duration * f64::from(self.cfg.fps)).ceil() as u64).max(1);
        let wall_start = Instant::now();
        let wall_limit = Duration::from_secs_f64(duration + RECORD_TIMEOUT_MARGIN);
        let mut ticker = ProgressTicker::new(self.status.clone(), duration);
        let mut write_err = None;

        for frame_idx in 0..total_frames {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            if wall_start.elapsed() >= wall_limit {
                self.status
                    .note("recording exceeded the time budget; forcing stop");
                break;
            }

            let t = frame_idx as f64 / f64::from(self.cfg.fps);
            animator.tick(t);
            let frame = animator.render(self.cfg.width, self.cfg.height);
            if let Err(err) = recorder.push_frame(&frame) {
                write_err = Some(err);
                break;
            }
            ticker.update(t);

            // Yield so stop requests and timers interleave with rendering.
            if frame_idx.is_multiple_of(8) {
                tokio::task::yield_now().await;
            }
        }
        drop(ticker);

        // Finalize even after a write error so the encoder is reaped on
        // every exit path.
        let data = recorder.finish()?;
        match write_err {
            Some(err) => Err(err),
            None => Ok(data),
        }
    }
}

/// Once-per-second elapsed/total progress reporter for the recording phase.
/// Dropping it is the release; both success and failure paths run it.
struct ProgressTicker {
    status: StatusChannel,
    total: f64,
    last_emit: Option<Instant>,
}

impl ProgressTicker {
    fn new(status: StatusChannel, total: f64) -> Self {
        Self {
            status,
            total,
            last_emit: None,
        }
    }

    fn update(&mut self, media_t: f64) {
        let due = self
            .last_emit
            .is_none_or(|at| at.elapsed() >= Duration::from_secs(1));
        if due {
            self.status.set(format!(
                "Rendering to video... {:.0}/{:.0}s",
                media_t, self.total
            ));
            self.last_emit = Some(Instant::now());
        }
    }
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        tracing::debug!("recording progress ticker released");
    }
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// [`Recorder`] backed by a system `ffmpeg` subprocess: raw RGBA frames go
/// in on stdin, the source audio file is muxed in as a second input, and the
/// encoded container comes back from a scratch file.
#[derive(Default)]
pub struct FfmpegRecorder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<std::thread::JoinHandle<std::io::Result<Vec<u8>>>>,
    out_path: Option<tempfile::TempPath>,
    frame_len: usize,
}

impl FfmpegRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The platform's supported-encoder listing; empty when ffmpeg is
    /// unavailable.
    pub fn probe_encoders() -> String {
        Command::new("ffmpeg")
            .args(["-hide_banner", "-encoders"])
            .stderr(Stdio::null())
            .output()
            .ok()
            .filter(|out| out.status.success())
            .map(|out| String::from_utf8_lossy(&out.stdout).into_owned())
            .unwrap_or_default()
    }
}

impl Recorder for FfmpegRecorder {
    fn begin(&mut self, candidate: &CodecCandidate, cfg: &RecordConfig) -> BeatreelResult<()> {
        cfg.validate()?;
        if !is_ffmpeg_on_path() {
            return Err(BeatreelError::recording_unsupported(
                "ffmpeg was not found on PATH",
            ));
        }

        let out_path = tempfile::Builder::new()
            .prefix("beatreel-")
            .suffix(&format!(".{}", candidate.container))
            .tempfile()
            .map_err(|e| {
                BeatreelError::Other(anyhow::anyhow!("failed to create scratch file: {e}"))
            })?
            .into_temp_path();

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-i",
        ])
        .arg(&cfg.audio_path);

        if let Some(encoder) = candidate.video_encoder {
            cmd.args(["-c:v", encoder]);
            if encoder.starts_with("libvpx") {
                cmd.args(["-b:v", "2M"]);
            }
        }
        if let Some(encoder) = candidate.audio_encoder {
            cmd.args(["-c:a", encoder]);
        }
        if candidate.container == "mp4" {
            cmd.args(["-pix_fmt", "yuv420p", "-movflags", "+faststart"]);
        }
        cmd.arg("-shortest").arg(&out_path);

        let mut child = cmd.spawn().map_err(|e| {
            BeatreelError::recording_unsupported(format!("failed to spawn ffmpeg: {e}"))
        })?;
        let stdin = child.stdin.take().ok_or_else(|| {
            BeatreelError::Other(anyhow::anyhow!("failed to open ffmpeg stdin (unexpected)"))
        })?;
        let mut stderr = child.stderr.take().ok_or_else(|| {
            BeatreelError::Other(anyhow::anyhow!("failed to open ffmpeg stderr (unexpected)"))
        })?;
        let stderr_drain = std::thread::spawn(move || {
            use std::io::Read as _;
            let mut bytes = Vec::new();
            stderr.read_to_end(&mut bytes)?;
            Ok(bytes)
        });

        self.frame_len = (cfg.width * cfg.height * 4) as usize;
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.stderr_drain = Some(stderr_drain);
        self.out_path = Some(out_path);
        Ok(())
    }

    fn push_frame(&mut self, frame: &FrameRGBA) -> BeatreelResult<()> {
        if frame.data.len() != self.frame_len {
            return Err(BeatreelError::validation(
                "frame.data size mismatch with width*height*4",
            ));
        }
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(BeatreelError::Other(anyhow::anyhow!(
                "ffmpeg recorder is not started"
            )));
        };

        use std::io::Write as _;
        stdin.write_all(&frame.data).map_err(|e| {
            BeatreelError::Other(anyhow::anyhow!("failed to write frame to ffmpeg: {e}"))
        })
    }

    fn finish(&mut self) -> BeatreelResult<Vec<u8>> {
        drop(self.stdin.take());
        let Some(mut child) = self.child.take() else {
            return Err(BeatreelError::Other(anyhow::anyhow!(
                "ffmpeg recorder is not started"
            )));
        };

        let deadline = Instant::now() + FINALIZE_TIMEOUT;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(BeatreelError::Other(anyhow::anyhow!(
                        "ffmpeg did not finish within the finalize timeout"
                    )));
                }
                Ok(None) => std::thread::sleep(Duration::from_millis(50)),
                Err(e) => {
                    return Err(BeatreelError::Other(anyhow::anyhow!(
                        "failed to wait for ffmpeg: {e}"
                    )));
                }
            }
        };

        let stderr_bytes = match self.stderr_drain.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| {
                    BeatreelError::Other(anyhow::anyhow!("ffmpeg stderr drain thread panicked"))
                })?
                .unwrap_or_default(),
            None => Vec::new(),
        };
        if !status.success() {
            return Err(BeatreelError::Other(anyhow::anyhow!(
                "ffmpeg exited with status {status}: {}",
                String::from_utf8_lossy(&stderr_bytes).trim()
            )));
        }

        match self.out_path.take() {
            Some(path) => Ok(std::fs::read(&path).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_order_prefers_mp4_then_narrowing_webm() {
        let candidates = codec_candidates();
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].container, "mp4");
        assert_eq!(candidates[1].mime, "video/webm;codecs=vp9,opus");
        assert_eq!(candidates[2].mime, "video/webm;codecs=vp8,vorbis");
        assert!(candidates[3].is_unqualified());
    }

    #[test]
    fn filter_keeps_only_listed_encoders() {
        let listing = "Encoders:\n ------\n V..... libx264  H.264\n A....D aac  AAC\n";
        let supported = filter_supported(codec_candidates(), listing);
        // mp4 pair is fully listed; webm pairs are not; the unqualified
        // candidate rides along because the platform itself is present.
        assert_eq!(supported.len(), 2);
        assert_eq!(supported[0].container, "mp4");
        assert!(supported[1].is_unqualified());
    }

    #[test]
    fn empty_listing_still_yields_one_unqualified_attempt() {
        let supported = filter_supported(codec_candidates(), "");
        assert_eq!(supported.len(), 1);
        assert!(supported[0].is_unqualified());
    }

    #[test]
    fn mp4_mime_resolves_to_video_mp4() {
        assert_eq!(resolve_output_mime("video/mp4;codecs=avc1,mp4a"), "video/mp4");
        assert_eq!(
            resolve_output_mime("video/webm;codecs=vp9,opus"),
            "video/webm;codecs=vp9,opus"
        );
    }

    #[test]
    fn extensions_follow_the_mime() {
        assert_eq!(extension_for_mime("video/mp4"), "mp4");
        assert_eq!(extension_for_mime("video/webm;codecs=vp9,opus"), "webm");
    }

    #[test]
    fn titles_sanitize_to_safe_filenames() {
        assert_eq!(sanitize_title("My Song!"), "My_Song_");
        assert_eq!(sanitize_title(""), "amv");
        assert_eq!(sanitize_title("   "), "amv");
        assert_eq!(sanitize_title("???"), "amv");
        assert_eq!(sanitize_title("take-2"), "take-2");
    }

    #[test]
    fn record_config_rejects_odd_dimensions() {
        let cfg = RecordConfig {
            width: 641,
            height: 360,
            fps: 30,
            audio_path: PathBuf::from("a.wav"),
        };
        assert!(cfg.validate().is_err());
    }
}
