use crate::audio::DecodedAudio;

/// Hop length for short-time energy, in seconds.
pub const HOP_SECONDS: f64 = 0.05;
/// Moving-average window, in hops, on each side of the candidate hop.
const WINDOW_HOPS: usize = 20;
/// A hop is a beat when its energy exceeds the window average by this factor.
const ENERGY_THRESHOLD: f32 = 1.35;
/// Hops skipped after an accepted beat so one transient fires only once.
pub const SUPPRESS_HOPS: usize = 6;

/// Immutable per-run analysis result, owned by the orchestrator.
#[derive(Clone, Debug)]
pub struct AudioAnalysis {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    /// Ascending beat timestamps in seconds.
    pub beat_timestamps: Vec<f64>,
}

impl AudioAnalysis {
    pub fn from_audio(audio: &DecodedAudio) -> Self {
        Self {
            duration_seconds: audio.duration_seconds,
            sample_rate: audio.sample_rate,
            beat_timestamps: detect_beats(audio.primary_channel(), audio.sample_rate),
        }
    }
}

/// Offline beat detection over a single channel.
///
/// Short-time RMS energy is computed over fixed 50 ms non-overlapping hops.
/// A hop is a beat when its energy exceeds 1.35x the centered moving average
/// of the surrounding 20 hops on each side; after accepting a beat the
/// detector skips ahead to avoid re-triggering on the same transient.
/// Deterministic for identical input; empty input yields an empty sequence.
pub fn detect_beats(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let hop = (f64::from(sample_rate) * HOP_SECONDS) as usize;
    if hop == 0 || samples.is_empty() {
        return Vec::new();
    }
    let hop_seconds = hop as f64 / f64::from(sample_rate);

    let energies: Vec<f32> = samples
        .chunks(hop)
        .map(|chunk| {
            let sum: f32 = chunk.iter().map(|v| v * v).sum();
            (sum / chunk.len() as f32).sqrt()
        })
        .collect();

    let mut beats = Vec::new();
    let mut i = WINDOW_HOPS;
    while i + WINDOW_HOPS < energies.len() {
        let window = &energies[i - WINDOW_HOPS..i + WINDOW_HOPS];
        let average = window.iter().sum::<f32>() / window.len() as f32;
        if energies[i] > average * ENERGY_THRESHOLD {
            beats.push(i as f64 * hop_seconds);
            i += SUPPRESS_HOPS;
        }
        i += 1;
    }
    beats
}
