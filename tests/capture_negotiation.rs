use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use beatreel::{
    Backdrop, BeatreelError, CapturePipeline, CodecCandidate, FrameRGBA, RecordConfig, Recorder,
    SceneAnimator, StatusChannel, build_storyboard, codec_candidates, fallback_color,
};

/// Scripted recorder: refuses some mimes at `begin`, returns no bytes for
/// others, and logs every attempt so tests can assert the probe order.
struct FakeRecorder {
    attempts: Vec<String>,
    fail_begin: HashSet<&'static str>,
    empty: HashSet<&'static str>,
    current: Option<String>,
    frames: usize,
}

impl FakeRecorder {
    fn new() -> Self {
        Self {
            attempts: Vec::new(),
            fail_begin: HashSet::new(),
            empty: HashSet::new(),
            current: None,
            frames: 0,
        }
    }
}

impl Recorder for FakeRecorder {
    fn begin(&mut self, candidate: &CodecCandidate, _cfg: &RecordConfig) -> beatreel::BeatreelResult<()> {
        self.attempts.push(candidate.mime.to_string());
        self.frames = 0;
        if self.fail_begin.contains(candidate.mime) {
            self.current = None;
            return Err(BeatreelError::recording_unsupported(candidate.mime));
        }
        self.current = Some(candidate.mime.to_string());
        Ok(())
    }

    fn push_frame(&mut self, _frame: &FrameRGBA) -> beatreel::BeatreelResult<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(&mut self) -> beatreel::BeatreelResult<Vec<u8>> {
        let Some(mime) = self.current.take() else {
            return Ok(Vec::new());
        };
        if self.empty.contains(mime.as_str()) {
            return Ok(Vec::new());
        }
        Ok(vec![0u8; self.frames.max(1)])
    }
}

fn test_animator(duration: f64) -> SceneAnimator {
    let shots = build_storyboard(duration, "");
    let backdrops = (0..shots.len())
        .map(|i| Backdrop::Color(fallback_color(i)))
        .collect();
    SceneAnimator::new(duration, Vec::new(), shots, backdrops).unwrap()
}

fn test_pipeline(stop: Arc<AtomicBool>) -> CapturePipeline {
    pipeline_with_status(StatusChannel::new(), stop)
}

fn pipeline_with_status(status: StatusChannel, stop: Arc<AtomicBool>) -> CapturePipeline {
    let cfg = RecordConfig {
        width: 32,
        height: 18,
        fps: 30,
        audio_path: PathBuf::from("unused.wav"),
    };
    CapturePipeline::new(cfg, status, stop).unwrap()
}

/// Encoder that stalls on every frame, as a hung platform encoder would.
struct StallingRecorder {
    frames: usize,
    frame_delay: std::time::Duration,
}

impl Recorder for StallingRecorder {
    fn begin(&mut self, _candidate: &CodecCandidate, _cfg: &RecordConfig) -> beatreel::BeatreelResult<()> {
        self.frames = 0;
        Ok(())
    }

    fn push_frame(&mut self, _frame: &FrameRGBA) -> beatreel::BeatreelResult<()> {
        self.frames += 1;
        std::thread::sleep(self.frame_delay);
        Ok(())
    }

    fn finish(&mut self) -> beatreel::BeatreelResult<Vec<u8>> {
        Ok(vec![0u8; self.frames.max(1)])
    }
}

#[tokio::test]
async fn first_working_candidate_wins() {
    let mut animator = test_animator(0.2);
    let mut recorder = FakeRecorder::new();
    let pipeline = test_pipeline(Arc::new(AtomicBool::new(false)));

    let blob = pipeline
        .record(&mut animator, &mut recorder, codec_candidates())
        .await
        .unwrap();

    assert_eq!(recorder.attempts, vec!["video/mp4;codecs=avc1,mp4a"]);
    assert_eq!(blob.mime, "video/mp4");
    assert!(!blob.data.is_empty());
}

#[tokio::test]
async fn falls_through_failed_and_empty_candidates() {
    let mut animator = test_animator(0.2);
    let mut recorder = FakeRecorder::new();
    recorder.fail_begin.insert("video/mp4;codecs=avc1,mp4a");
    recorder.empty.insert("video/webm;codecs=vp9,opus");
    let pipeline = test_pipeline(Arc::new(AtomicBool::new(false)));

    let blob = pipeline
        .record(&mut animator, &mut recorder, codec_candidates())
        .await
        .unwrap();

    assert_eq!(
        recorder.attempts,
        vec![
            "video/mp4;codecs=avc1,mp4a",
            "video/webm;codecs=vp9,opus",
            "video/webm;codecs=vp8,vorbis",
        ]
    );
    assert_eq!(blob.mime, "video/webm;codecs=vp8,vorbis");
}

#[tokio::test]
async fn exhausting_all_candidates_is_unsupported() {
    let mut animator = test_animator(0.2);
    let mut recorder = FakeRecorder::new();
    for candidate in codec_candidates() {
        recorder.empty.insert(candidate.mime);
    }
    let pipeline = test_pipeline(Arc::new(AtomicBool::new(false)));

    let err = pipeline
        .record(&mut animator, &mut recorder, codec_candidates())
        .await
        .unwrap_err();

    assert!(matches!(err, BeatreelError::RecordingUnsupported(_)));
    assert_eq!(recorder.attempts.len(), 4);
}

// Bounds the whole recording at `duration + 5 s` of wall time even when the
// encoder swallows frames far slower than the media clock advances.
#[tokio::test]
async fn wall_clock_overrun_forces_stop_and_still_finalizes() {
    let duration = 0.2;
    let mut animator = test_animator(duration);
    let mut recorder = StallingRecorder {
        frames: 0,
        frame_delay: std::time::Duration::from_secs(2),
    };
    let status = StatusChannel::new();
    let pipeline = pipeline_with_status(status.clone(), Arc::new(AtomicBool::new(false)));

    let started = std::time::Instant::now();
    let blob = pipeline
        .record(&mut animator, &mut recorder, codec_candidates())
        .await
        .unwrap();
    let elapsed = started.elapsed().as_secs_f64();

    // 6 frames at 2 s each would run 12 s unbounded; the forced stop caps it.
    assert!(elapsed < duration + beatreel::capture::RECORD_TIMEOUT_MARGIN + 4.0);
    assert!(recorder.frames < 6);
    assert!(!blob.data.is_empty());
    assert!(
        status
            .log()
            .iter()
            .any(|l| l.contains("exceeded the time budget")),
        "expected a forced-stop note in the status log"
    );
}

#[tokio::test]
async fn stop_before_recording_discards_everything() {
    let mut animator = test_animator(0.2);
    let mut recorder = FakeRecorder::new();
    let stop = Arc::new(AtomicBool::new(false));
    stop.store(true, Ordering::SeqCst);
    let pipeline = test_pipeline(stop);

    let err = pipeline
        .record(&mut animator, &mut recorder, codec_candidates())
        .await
        .unwrap_err();

    assert!(matches!(err, BeatreelError::Stopped));
    assert!(recorder.attempts.is_empty());
}
