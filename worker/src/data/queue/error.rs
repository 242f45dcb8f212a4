use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    /// The request never got a definitive answer (network, timeout, throttling)
    #[error("Queue transport error ({backend}): {message}")]
    Transport {
        backend: &'static str,
        message: String,
    },

    /// The service answered and refused the request
    #[error("Queue request rejected ({backend}): {message}")]
    Rejected {
        backend: &'static str,
        message: String,
    },

    #[error("Queue not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid queue event: {0}")]
    InvalidEvent(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl QueueError {
    pub fn transport(backend: &'static str, msg: impl Into<String>) -> Self {
        Self::Transport {
            backend,
            message: msg.into(),
        }
    }

    pub fn rejected(backend: &'static str, msg: impl Into<String>) -> Self {
        Self::Rejected {
            backend,
            message: msg.into(),
        }
    }

    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }
}
