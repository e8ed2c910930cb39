pub type BeatreelResult<T> = Result<T, BeatreelError>;

#[derive(thiserror::Error, Debug)]
pub enum BeatreelError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("recording unsupported: {0}")]
    RecordingUnsupported(String),

    /// Per-shot background resolution failure. Always recovered by the
    /// caller with a palette fallback; never surfaced as a run failure.
    #[error("background error: {0}")]
    Background(String),

    /// Explicit user stop. Not a failure; the run terminates in the
    /// `Stopped` state with no output.
    #[error("run stopped")]
    Stopped,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BeatreelError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn recording_unsupported(msg: impl Into<String>) -> Self {
        Self::RecordingUnsupported(msg.into())
    }

    pub fn background(msg: impl Into<String>) -> Self {
        Self::Background(msg.into())
    }
}
