use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use base64::Engine as _;
use image::RgbaImage;

use crate::attempt::first_success;
use crate::error::{BeatreelError, BeatreelResult};
use crate::status::StatusChannel;
use crate::storyboard::Shot;

/// Space tried when the caller configures no generation endpoint.
pub const DEFAULT_SPACE: &str = "stabilityai/stable-diffusion";

/// Known Gradio prediction paths, in preference order.
pub const REQUEST_PATHS: [&str; 2] = ["/api/predict", "/run/predict"];

/// Prompts are truncated to this many characters before being sent.
pub const PROMPT_MAX_CHARS: usize = 500;

/// Pacing delay between per-shot generation requests.
const SHOT_PACING: Duration = Duration::from_millis(200);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Fixed hue palette (degrees) for per-shot fallback colors.
const HUE_PALETTE: [f32; 12] = [
    200.0, 160.0, 260.0, 300.0, 120.0, 210.0, 180.0, 30.0, 340.0, 80.0, 20.0, 240.0,
];

/// Visual source for one shot's backdrop: an externally generated image when
/// resolution succeeded, or the shot's deterministic palette color.
#[derive(Clone, Debug)]
pub enum Backdrop {
    Image(RgbaImage),
    Color([u8; 3]),
}

impl Backdrop {
    pub fn is_image(&self) -> bool {
        matches!(self, Backdrop::Image(_))
    }
}

/// Deterministic fallback color for a shot, from the fixed hue palette.
pub fn fallback_color(shot_index: usize) -> [u8; 3] {
    let hue = HUE_PALETTE[shot_index % HUE_PALETTE.len()];
    hsl_to_rgb(hue / 360.0, 0.55, 0.32)
}

/// Normalize a configured endpoint. A Hugging-Face-style `owner/space` id is
/// rewritten to its canonical `https://owner-space.hf.space` subdomain;
/// anything else is kept as-is with trailing slashes stripped.
pub fn normalize_space_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    let parts: Vec<&str> = trimmed.split('/').collect();
    let looks_like_space_id = !trimmed.contains("://")
        && parts.len() == 2
        && parts.iter().all(|p| !p.is_empty() && !p.contains('.'));

    if looks_like_space_id {
        let subdomain = trimmed.to_lowercase().replace(['/', '_'], "-");
        format!("https://{subdomain}.hf.space")
    } else {
        trimmed.to_string()
    }
}

/// Bounded prompt string for a shot: style plus theme.
pub fn build_prompt(style: &str, theme: &str) -> String {
    format!("{style}; {theme}")
        .chars()
        .take(PROMPT_MAX_CHARS)
        .collect()
}

/// Pull a `data:image/...` payload out of a Gradio prediction response.
///
/// `data[0]` may be the data-URL string itself or an object exposing it under
/// a `data` field. Any other shape is a non-match, not an error.
pub fn extract_data_url(response: &serde_json::Value) -> Option<&str> {
    let first = response.get("data")?.as_array()?.first()?;
    let url = match first {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(_) => first.get("data")?.as_str()?,
        _ => return None,
    };
    url.starts_with("data:image/").then_some(url)
}

/// Decode a base64 data URL into display-ready (sRGB) RGBA pixels.
pub fn decode_data_url(url: &str) -> Option<RgbaImage> {
    let (_, payload) = url.split_once(',')?;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .ok()?;
    let img = image::load_from_memory(&bytes).ok()?;
    Some(img.to_rgba8())
}

/// Resolves a background image (or palette fallback) per shot by calling an
/// external Gradio-style generation endpoint.
///
/// Every failure in here is recoverable: HTTP errors, unexpected response
/// shapes and undecodable payloads are logged and collapse into the shot's
/// fallback color. Background resolution never aborts a run.
pub struct BackgroundProvider {
    client: reqwest::Client,
    base_url: String,
    style: String,
}

impl BackgroundProvider {
    pub fn new(space_url: Option<&str>, style: impl Into<String>) -> BeatreelResult<Self> {
        use anyhow::Context as _;
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build the background http client")?;
        Ok(Self {
            client,
            base_url: normalize_space_url(space_url.unwrap_or(DEFAULT_SPACE)),
            style: style.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve backdrops for all shots, sequentially and in order, so that
    /// the backdrop is a fixed function of elapsed time before recording
    /// starts.
    ///
    /// A raised stop flag skips the remaining network calls; the affected
    /// shots get their palette colors so the result always covers every
    /// shot.
    pub async fn resolve_all(
        &self,
        shots: &[Shot],
        status: &StatusChannel,
        stop: &AtomicBool,
    ) -> Vec<Backdrop> {
        let mut backdrops = Vec::with_capacity(shots.len());
        for (index, shot) in shots.iter().enumerate() {
            if stop.load(Ordering::SeqCst) {
                backdrops.extend((index..shots.len()).map(|i| Backdrop::Color(fallback_color(i))));
                break;
            }
            let backdrop = match self.fetch_shot_image(shot).await {
                Some(image) => Backdrop::Image(image),
                None => {
                    status.note(format!("{}: using fallback color", shot.id));
                    Backdrop::Color(fallback_color(index))
                }
            };
            backdrops.push(backdrop);
            tokio::time::sleep(SHOT_PACING).await;
        }
        backdrops
    }

    /// One network round per known request path; first valid payload wins.
    pub async fn fetch_shot_image(&self, shot: &Shot) -> Option<RgbaImage> {
        let prompt = build_prompt(&self.style, &shot.theme);
        let won = first_success(&REQUEST_PATHS, async |path| {
            match self.try_path(path, &prompt).await {
                Ok(image) => Some(image),
                Err(err) => {
                    tracing::debug!(shot = %shot.id, path, error = %err, "background attempt failed");
                    None
                }
            }
        })
        .await;
        won.map(|(_, image)| image)
    }

    async fn try_path(&self, path: &str, prompt: &str) -> BeatreelResult<RgbaImage> {
        let url = format!("{}{path}", self.base_url);
        let body = serde_json::json!({ "data": [prompt] });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| BeatreelError::background(e.to_string()))?;
        if !response.status().is_success() {
            return Err(BeatreelError::background(format!(
                "status {}",
                response.status()
            )));
        }

        let payload: serde_json::Value = response
            .json()
            .await
            .map_err(|e| BeatreelError::background(e.to_string()))?;
        let data_url = extract_data_url(&payload)
            .ok_or_else(|| BeatreelError::background("no image payload in response"))?;
        decode_data_url(data_url)
            .ok_or_else(|| BeatreelError::background("undecodable image payload"))
    }
}

fn hsl_to_rgb(h: f32, s: f32, l: f32) -> [u8; 3] {
    let hue = |p: f32, q: f32, mut t: f32| {
        if t < 0.0 {
            t += 1.0;
        }
        if t > 1.0 {
            t -= 1.0;
        }
        if t < 1.0 / 6.0 {
            p + (q - p) * 6.0 * t
        } else if t < 0.5 {
            q
        } else if t < 2.0 / 3.0 {
            p + (q - p) * (2.0 / 3.0 - t) * 6.0
        } else {
            p
        }
    };

    let q = if l < 0.5 { l * (1.0 + s) } else { l + s - l * s };
    let p = 2.0 * l - q;
    let r = hue(p, q, h + 1.0 / 3.0);
    let g = hue(p, q, h);
    let b = hue(p, q, h - 1.0 / 3.0);
    [
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    ]
}
