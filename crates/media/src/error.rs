use std::{error::Error as StdError, fmt};

/// Longest slice of raw error detail shown to a requester.
const USER_DETAIL_LIMIT: usize = 100;

/// Errors raised while assembling the pipeline (not per-request failures).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    #[error("{message}")]
    InvalidInput { message: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn external<E>(context: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reason a retrieval or delivery did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    SizeExceeded,
    NotFound,
    ConnectionFailed,
    ExtractionFailed,
    Unsupported,
    DeliveryFailed,
    StorageFailed,
}

impl ErrorKind {
    /// Whether the orchestrator may try the next strategy after this failure.
    #[must_use]
    pub fn allows_fallback(self) -> bool {
        !matches!(
            self,
            Self::SizeExceeded | Self::DeliveryFailed | Self::StorageFailed
        )
    }

    fn headline(self) -> &'static str {
        match self {
            Self::Timeout => "Timed out",
            Self::SizeExceeded => "File too large",
            Self::NotFound => "Not found",
            Self::ConnectionFailed => "Could not connect to the file server",
            Self::ExtractionFailed => "Video download failed",
            Self::Unsupported => "Not supported",
            Self::DeliveryFailed => "Upload failed",
            Self::StorageFailed => "Storage error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Timeout => "timeout",
            Self::SizeExceeded => "size_exceeded",
            Self::NotFound => "not_found",
            Self::ConnectionFailed => "connection_failed",
            Self::ExtractionFailed => "extraction_failed",
            Self::Unsupported => "unsupported",
            Self::DeliveryFailed => "delivery_failed",
            Self::StorageFailed => "storage_failed",
        };
        f.write_str(name)
    }
}

/// A typed, requester-presentable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub message: String,
    /// Optional remediation shown below the message.
    pub hint: Option<String>,
}

impl Failure {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Replace every occurrence of the given secrets in message and hint.
    #[must_use]
    pub fn redacted(mut self, secrets: &[&str]) -> Self {
        for secret in secrets.iter().filter(|s| !s.is_empty()) {
            self.message = self.message.replace(secret, "[REDACTED]");
            if let Some(hint) = self.hint.as_mut() {
                *hint = hint.replace(secret, "[REDACTED]");
            }
        }
        self
    }

    /// Short text for the requester. Raw detail is truncated.
    #[must_use]
    pub fn user_message(&self) -> String {
        let mut detail: String = self.message.chars().take(USER_DETAIL_LIMIT).collect();
        if self.message.chars().count() > USER_DETAIL_LIMIT {
            detail.push('…');
        }
        let mut out = format!("❌ {}: {detail}", self.kind.headline());
        if let Some(hint) = &self.hint {
            out.push_str("\nℹ️ ");
            out.push_str(hint);
        }
        out
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
