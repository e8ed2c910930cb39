use std::path::Path;

use crate::error::{BeatreelError, BeatreelResult};

/// Sample rate used when a compressed source is decoded through ffmpeg.
pub const DECODE_SAMPLE_RATE: u32 = 48_000;

/// Fully decoded audio track: planar f32 samples with known duration.
///
/// Created once per generation run and immutable afterward.
#[derive(Clone, Debug)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub duration_seconds: f64,
    /// One sample vec per channel, all the same length.
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Channel 0, the only channel beat detection looks at.
    pub fn primary_channel(&self) -> &[f32] {
        self.channels.first().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Decode an audio file into a planar f32 buffer.
///
/// WAV files are decoded in-process. Anything else (MP3, M4A, ...) goes
/// through a system `ffmpeg` subprocess decoding to raw `f32le` PCM on
/// stdout. Unsupported or corrupt input is a fatal [`BeatreelError::Decode`];
/// it is propagated, never retried.
pub fn decode_audio(path: &Path) -> BeatreelResult<DecodedAudio> {
    let is_wav = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wav"));
    if is_wav {
        decode_wav(path)
    } else {
        decode_via_ffmpeg(path)
    }
}

fn decode_wav(path: &Path) -> BeatreelResult<DecodedAudio> {
    let mut reader = hound::WavReader::open(path)
        .map_err(|e| BeatreelError::decode(format!("failed to open wav '{}': {e}", path.display())))?;
    let spec = reader.spec();
    let channel_count = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| BeatreelError::decode(format!("wav read failed: {e}")))?,
        (hound::SampleFormat::Int, bits @ (8 | 16 | 24 | 32)) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| BeatreelError::decode(format!("wav read failed: {e}")))?
        }
        (fmt, bits) => {
            return Err(BeatreelError::decode(format!(
                "unsupported wav sample format {fmt:?}/{bits}-bit in '{}'",
                path.display()
            )));
        }
    };

    Ok(planar_from_interleaved(
        interleaved,
        channel_count,
        spec.sample_rate,
    ))
}

/// Decode a compressed source with the system `ffmpeg`, resampled to
/// [`DECODE_SAMPLE_RATE`] stereo.
fn decode_via_ffmpeg(path: &Path) -> BeatreelResult<DecodedAudio> {
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            "2",
            "-ar",
            &DECODE_SAMPLE_RATE.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| {
            BeatreelError::decode(format!("failed to run ffmpeg for audio decode: {e}"))
        })?;

    if !out.status.success() {
        return Err(BeatreelError::decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    if !out.stdout.len().is_multiple_of(4) {
        return Err(BeatreelError::decode(
            "decoded audio byte length is not aligned to f32 samples",
        ));
    }

    let mut interleaved = Vec::<f32>::with_capacity(out.stdout.len() / 4);
    for chunk in out.stdout.chunks_exact(4) {
        interleaved.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    if interleaved.is_empty() {
        return Err(BeatreelError::decode(format!(
            "'{}' contains no decodable audio",
            path.display()
        )));
    }

    Ok(planar_from_interleaved(interleaved, 2, DECODE_SAMPLE_RATE))
}

fn planar_from_interleaved(
    interleaved: Vec<f32>,
    channel_count: usize,
    sample_rate: u32,
) -> DecodedAudio {
    let frames = interleaved.len() / channel_count;
    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in interleaved.chunks_exact(channel_count) {
        for (channel, &sample) in channels.iter_mut().zip(frame) {
            channel.push(sample);
        }
    }

    DecodedAudio {
        sample_rate,
        duration_seconds: frames as f64 / f64::from(sample_rate.max(1)),
        channels,
    }
}
