use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::audio::decode_audio;
use crate::background::BackgroundProvider;
use crate::beats::AudioAnalysis;
use crate::capture::{
    CapturePipeline, FfmpegRecorder, RecordConfig, VideoBlob, codec_candidates, filter_supported,
};
use crate::config::GenerateRequest;
use crate::error::{BeatreelError, BeatreelResult};
use crate::scene::SceneAnimator;
use crate::status::StatusChannel;
use crate::storyboard::build_storyboard;

/// Lifecycle of one generation run. Exactly one run is active at a time;
/// `Idle`, `Done`, `Error` and `Stopped` all permit starting a fresh run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Decoding,
    Analyzing,
    SettingUpScene,
    ResolvingBackgrounds,
    Recording,
    Done,
    Error,
    Stopped,
}

impl RunState {
    fn accepts_new_run(self) -> bool {
        matches!(
            self,
            RunState::Idle | RunState::Done | RunState::Error | RunState::Stopped
        )
    }
}

/// Sequences the full pipeline: decode, analyze, storyboard, backgrounds,
/// record, finalize. All failures funnel through `generate`'s boundary so
/// the orchestrator always lands in a state a new run can start from.
pub struct Orchestrator {
    status: StatusChannel,
    state: Arc<Mutex<RunState>>,
    stop_flag: Arc<AtomicBool>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

impl Orchestrator {
    pub fn new() -> Self {
        Self {
            status: StatusChannel::new(),
            state: Arc::new(Mutex::new(RunState::Idle)),
            stop_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle to the status channel this orchestrator reports through.
    pub fn status(&self) -> StatusChannel {
        self.status.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Request a cooperative stop of the active run. Idempotent: calling it
    /// twice has the same effect as calling it once.
    pub fn stop(&self) {
        if !self.stop_flag.swap(true, Ordering::SeqCst) {
            self.status.set("Stopped");
        }
    }

    /// Run the whole pipeline and return the encoded artifact.
    pub async fn generate(&self, request: &GenerateRequest) -> BeatreelResult<VideoBlob> {
        self.try_begin()?;

        let result = self.run(request).await;
        match &result {
            Ok(_) => {
                self.set_state(RunState::Done);
                self.status.set("Done");
            }
            Err(BeatreelError::Stopped) => {
                self.set_state(RunState::Stopped);
                self.status.set("Stopped");
            }
            Err(err) => {
                self.set_state(RunState::Error);
                self.status.set(format!("Error: {err}"));
            }
        }
        result
    }

    /// Like [`generate`](Self::generate), then write the artifact as
    /// `<title>.<ext>` under the request's output directory.
    pub async fn generate_to_file(&self, request: &GenerateRequest) -> BeatreelResult<PathBuf> {
        let blob = self.generate(request).await?;
        let path = blob.write_to_dir(&request.out_dir, &request.title)?;
        self.status.note(format!("wrote {}", path.display()));
        Ok(path)
    }

    async fn run(&self, request: &GenerateRequest) -> BeatreelResult<VideoBlob> {
        request.validate()?;

        self.status.set("Loading audio...");
        let audio = decode_audio(&request.audio_path)?;
        self.check_stop()?;

        self.set_state(RunState::Analyzing);
        self.status.set("Analyzing beats...");
        let analysis = AudioAnalysis::from_audio(&audio);
        tracing::info!(
            duration = analysis.duration_seconds,
            beats = analysis.beat_timestamps.len(),
            "audio analyzed"
        );
        self.check_stop()?;

        self.set_state(RunState::SettingUpScene);
        self.status.set("Building 3D scene...");
        let shots = build_storyboard(analysis.duration_seconds, &request.lyrics);

        self.set_state(RunState::ResolvingBackgrounds);
        self.status.set("Generating backgrounds...");
        let provider =
            BackgroundProvider::new(request.space_url.as_deref(), request.style.as_str())?;
        let backdrops = provider
            .resolve_all(&shots, &self.status, &self.stop_flag)
            .await;
        self.check_stop()?;

        let mut animator = SceneAnimator::new(
            analysis.duration_seconds,
            analysis.beat_timestamps.clone(),
            shots,
            backdrops,
        )?;

        self.set_state(RunState::Recording);
        self.status.set("Rendering to video...");
        let pipeline = CapturePipeline::new(
            RecordConfig {
                width: request.width,
                height: request.height,
                fps: request.fps,
                audio_path: request.audio_path.clone(),
            },
            self.status.clone(),
            self.stop_flag.clone(),
        )?;
        let candidates = filter_supported(codec_candidates(), &FfmpegRecorder::probe_encoders());
        let mut recorder = FfmpegRecorder::new();
        pipeline.record(&mut animator, &mut recorder, candidates).await
    }

    /// Claim the orchestrator for a new run; re-entrant starts are rejected.
    fn try_begin(&self) -> BeatreelResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.accepts_new_run() {
            return Err(BeatreelError::validation(
                "a generation run is already active",
            ));
        }
        *state = RunState::Decoding;
        self.stop_flag.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn set_state(&self, next: RunState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
        tracing::debug!(state = ?next, "run state");
    }

    fn check_stop(&self) -> BeatreelResult<()> {
        if self.stop_flag.load(Ordering::SeqCst) {
            Err(BeatreelError::Stopped)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_start_is_rejected_while_active() {
        let orchestrator = Orchestrator::new();
        orchestrator.try_begin().unwrap();
        let err = orchestrator.try_begin().unwrap_err();
        assert!(err.to_string().contains("already active"));

        // Terminal states accept a fresh run.
        orchestrator.set_state(RunState::Error);
        assert!(orchestrator.try_begin().is_ok());
    }

    #[test]
    fn stop_twice_equals_stop_once() {
        let orchestrator = Orchestrator::new();
        orchestrator.stop();
        orchestrator.stop();
        let stops = orchestrator
            .status()
            .log()
            .iter()
            .filter(|m| *m == "Stopped")
            .count();
        assert_eq!(stops, 1);
    }

    #[tokio::test]
    async fn missing_input_lands_in_error_state() {
        let orchestrator = Orchestrator::new();
        let request = GenerateRequest::new("");
        let err = orchestrator.generate(&request).await.unwrap_err();
        assert!(matches!(err, BeatreelError::Validation(_)));
        assert_eq!(orchestrator.state(), RunState::Error);
        assert!(orchestrator.status().current().starts_with("Error:"));

        // The boundary leaves the orchestrator restartable.
        assert!(orchestrator.try_begin().is_ok());
    }

    #[tokio::test]
    async fn stop_before_decode_lands_in_stopped_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let orchestrator = Orchestrator::new();
        orchestrator.try_begin().unwrap();
        // A stale stop request from a previous run is cleared by try_begin,
        // so re-request it mid-run.
        orchestrator.stop_flag.store(true, Ordering::SeqCst);
        let request = GenerateRequest::new(&path);
        let result = orchestrator.run(&request).await;
        assert!(matches!(result, Err(BeatreelError::Stopped)));
    }
}
