use std::path::PathBuf;

use {
    chrono::{DateTime, Local},
    linkfetch_common::PresentationKind,
    url::Url,
    uuid::Uuid,
};

use crate::error::{ErrorKind, Failure};

/// One inbound URL to retrieve. Immutable for the request's lifetime.
#[derive(Debug, Clone)]
pub struct RetrievalRequest {
    pub id: Uuid,
    pub url: Url,
    pub requested_at: DateTime<Local>,
    pub size_limit_bytes: u64,
}

impl RetrievalRequest {
    pub fn new(url: Url, size_limit_bytes: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            requested_at: Local::now(),
            size_limit_bytes,
        }
    }

    /// Prefix of every file this request writes.
    pub fn file_stem(&self) -> String {
        self.id.simple().to_string()
    }

    pub fn size_limit_mb(&self) -> u64 {
        self.size_limit_bytes / (1024 * 1024)
    }

    pub fn size_exceeded(&self, size_bytes: u64) -> Failure {
        Failure::new(
            ErrorKind::SizeExceeded,
            format!(
                "{} MB is over the {} MB limit",
                size_bytes / (1024 * 1024),
                self.size_limit_mb()
            ),
        )
    }
}

/// A retrieved file, owned by the pipeline until delivered or removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub content_type: String,
    pub size_bytes: u64,
}

impl Artifact {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalOutcome {
    /// A local artifact ready for delivery.
    Success(Artifact),
    /// The messaging service fetched the URL itself; nothing to deliver.
    Forwarded { kind: PresentationKind },
    Failure(Failure),
}

impl RetrievalOutcome {
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Failure(Failure::new(kind, message))
    }

    pub fn as_failure(&self) -> Option<&Failure> {
        match self {
            Self::Failure(f) => Some(f),
            _ => None,
        }
    }
}
