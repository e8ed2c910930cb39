use std::sync::{Arc, Mutex, PoisonError};

/// The single progress interface the pipeline exposes to its host: a
/// current-status string plus an append-only log. Every phase transition and
/// every recoverable or fatal error is reported here.
///
/// Cloning is cheap; all clones observe the same channel.
#[derive(Clone, Debug, Default)]
pub struct StatusChannel {
    inner: Arc<Mutex<StatusInner>>,
}

#[derive(Debug, Default)]
struct StatusInner {
    current: String,
    log: Vec<String>,
}

impl StatusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current status and append it to the log.
    pub fn set(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(status = %msg);
        let mut inner = self.lock();
        inner.current = msg.clone();
        inner.log.push(msg);
    }

    /// Append to the log without replacing the current status.
    pub fn note(&self, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::debug!(note = %msg);
        self.lock().log.push(msg);
    }

    pub fn current(&self) -> String {
        self.lock().current.clone()
    }

    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StatusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_updates_current_and_appends() {
        let status = StatusChannel::new();
        status.set("Loading audio...");
        status.set("Analyzing beats...");

        assert_eq!(status.current(), "Analyzing beats...");
        assert_eq!(
            status.log(),
            vec!["Loading audio...".to_string(), "Analyzing beats...".to_string()]
        );
    }

    #[test]
    fn clones_share_the_channel() {
        let status = StatusChannel::new();
        let observer = status.clone();
        status.set("Recording");
        assert_eq!(observer.current(), "Recording");
    }

    #[test]
    fn note_does_not_replace_current() {
        let status = StatusChannel::new();
        status.set("Recording");
        status.note("background fallback for shot 3");
        assert_eq!(status.current(), "Recording");
        assert_eq!(status.log().len(), 2);
    }
}
