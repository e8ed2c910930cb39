//! Beatreel generates a short music video from an audio track.
//!
//! The pipeline decodes the track, detects beats, cuts the duration into a
//! twelve-shot storyboard driven by the lyric text, resolves a backdrop per
//! shot from an external image-generation endpoint (with a deterministic
//! palette fallback), renders a procedurally animated 3D scene on the CPU,
//! and records frames plus audio into an encoded video using a negotiated
//! codec. The [`Orchestrator`] sequences all of it and reports progress over
//! a [`StatusChannel`].
#![forbid(unsafe_code)]

pub mod attempt;
pub mod audio;
pub mod background;
pub mod beats;
pub mod capture;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod scene;
pub mod status;
pub mod storyboard;

pub use audio::{DecodedAudio, decode_audio};
pub use background::{Backdrop, BackgroundProvider, fallback_color, normalize_space_url};
pub use beats::{AudioAnalysis, detect_beats};
pub use capture::{
    CAPTURE_FPS, CapturePipeline, CaptureSession, CaptureState, CodecCandidate, FfmpegRecorder,
    RecordConfig, Recorder, VideoBlob, codec_candidates, filter_supported, is_ffmpeg_on_path,
    resolve_output_mime, sanitize_title,
};
pub use config::GenerateRequest;
pub use error::{BeatreelError, BeatreelResult};
pub use orchestrator::{Orchestrator, RunState};
pub use scene::{FrameRGBA, SceneAnimator, SceneState};
pub use status::StatusChannel;
pub use storyboard::{CameraMode, SHOT_COUNT, Shot, build_storyboard};
