use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::capture::CAPTURE_FPS;
use crate::error::{BeatreelError, BeatreelResult};

/// Everything one generation run needs, JSON-loadable for scripted use.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Title used for the output filename.
    #[serde(default = "default_title")]
    pub title: String,
    /// Visual style prefix for background prompts.
    #[serde(default)]
    pub style: String,
    /// Raw lyric text, possibly empty.
    #[serde(default)]
    pub lyrics: String,
    /// Audio track to generate against.
    pub audio_path: PathBuf,
    /// Background generation endpoint; the default space is used when unset.
    #[serde(default)]
    pub space_url: Option<String>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// Directory the output artifact is written into.
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
}

fn default_title() -> String {
    "amv".to_string()
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    360
}

fn default_fps() -> u32 {
    CAPTURE_FPS
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

impl GenerateRequest {
    pub fn new(audio_path: impl Into<PathBuf>) -> Self {
        Self {
            title: default_title(),
            style: String::new(),
            lyrics: String::new(),
            audio_path: audio_path.into(),
            space_url: None,
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            out_dir: default_out_dir(),
        }
    }

    pub fn validate(&self) -> BeatreelResult<()> {
        if self.audio_path.as_os_str().is_empty() {
            return Err(BeatreelError::validation("no audio file chosen"));
        }
        if self.width == 0 || self.height == 0 {
            return Err(BeatreelError::validation("canvas width/height must be non-zero"));
        }
        if !self.width.is_multiple_of(2) || !self.height.is_multiple_of(2) {
            return Err(BeatreelError::validation(
                "canvas width/height must be even (required for yuv420p output)",
            ));
        }
        if self.fps == 0 {
            return Err(BeatreelError::validation("fps must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_from_json() {
        let request: GenerateRequest =
            serde_json::from_str(r#"{ "audio_path": "track.wav" }"#).unwrap();
        assert_eq!(request.title, "amv");
        assert_eq!(request.width, 640);
        assert_eq!(request.height, 360);
        assert_eq!(request.fps, 30);
        assert!(request.space_url.is_none());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn missing_audio_is_rejected() {
        let request = GenerateRequest::new("");
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("no audio file chosen"));
    }

    #[test]
    fn odd_canvas_is_rejected() {
        let mut request = GenerateRequest::new("track.wav");
        request.height = 361;
        assert!(request.validate().is_err());
    }
}
