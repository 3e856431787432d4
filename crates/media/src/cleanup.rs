//! Reclaims the shared downloads directory.
//!
//! Sweeps are best-effort: a file that cannot be removed is logged and
//! counted, and the sweep moves on.

use std::{
    path::Path,
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};

use crate::store::{ArtifactStore, is_partial};

/// Outcome of a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub failed: usize,
}

impl SweepReport {
    fn record(&mut self, removed: bool) {
        if removed {
            self.removed += 1;
        } else {
            self.failed += 1;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Janitor {
    store: ArtifactStore,
}

impl Janitor {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Remove regular files last modified more than `max_age` ago.
    pub async fn purge_stale(&self, max_age: Duration) -> SweepReport {
        let now = SystemTime::now();
        let report = self
            .sweep("stale", |_, modified| {
                modified
                    .and_then(|m| now.duration_since(m).ok())
                    .is_some_and(|age| age > max_age)
            })
            .await;
        if report.removed > 0 {
            info!(removed = report.removed, failed = report.failed, "purged stale files");
        }
        report
    }

    /// Remove every incomplete-transfer file.
    pub async fn purge_partial(&self) -> SweepReport {
        let report = self.sweep("partial", |name, _| is_partial(name)).await;
        if report.removed > 0 {
            info!(removed = report.removed, failed = report.failed, "purged partial files");
        }
        report
    }

    /// Remove every file (complete or partial) belonging to one request.
    pub async fn purge_request(&self, prefix: &str) -> SweepReport {
        if prefix.is_empty() {
            return SweepReport::default();
        }
        let report = self.sweep("request", |name, _| name.starts_with(prefix)).await;
        debug!(prefix, removed = report.removed, "purged request files");
        report
    }

    /// Remove one artifact. A file that is already gone counts as removed.
    pub async fn remove_artifact(&self, path: &Path) -> bool {
        remove(path).await
    }

    async fn sweep<F>(&self, label: &'static str, matches: F) -> SweepReport
    where
        F: Fn(&str, Option<SystemTime>) -> bool,
    {
        let mut report = SweepReport::default();
        let mut entries = match tokio::fs::read_dir(self.store.dir()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return report,
            Err(e) => {
                warn!(sweep = label, error = %e, "failed to list downloads directory");
                return report;
            },
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(sweep = label, error = %e, "failed to read directory entry");
                    break;
                },
            };
            let Ok(metadata) = entry.metadata().await else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if matches(name, metadata.modified().ok()) {
                report.record(remove(&entry.path()).await);
            }
        }
        report
    }
}

async fn remove(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "removed file");
            true
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to remove file");
            false
        },
    }
}
