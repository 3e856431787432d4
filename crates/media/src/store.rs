use std::path::{Path, PathBuf};

use crate::request::RetrievalRequest;

/// Name suffixes of incomplete transfers (ours and the extractor's).
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

/// Whether a file name denotes an incomplete transfer.
pub fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) || name.contains(".part-Frag")
}

/// Shared directory for transient artifacts.
///
/// Every file a request writes starts with the request's identifier, so
/// concurrent requests never collide and a request's files can be found
/// (and reclaimed) by prefix.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    /// Final path for a request's artifact. `extension` includes the dot or
    /// is empty.
    pub fn artifact_path(&self, request: &RetrievalRequest, extension: &str) -> PathBuf {
        self.dir.join(format!("{}{extension}", request.file_stem()))
    }

    /// In-progress path for an artifact.
    pub fn partial_path(final_path: &Path) -> PathBuf {
        let mut name = final_path.as_os_str().to_os_string();
        name.push(".part");
        PathBuf::from(name)
    }

    /// Extractor output template rooted at this directory.
    pub fn output_template(&self, request: &RetrievalRequest) -> String {
        self.dir
            .join(format!("{}.%(ext)s", request.file_stem()))
            .display()
            .to_string()
    }

    /// Complete files whose name starts with `prefix`.
    pub async fn find_by_prefix(&self, prefix: &str) -> std::io::Result<Vec<PathBuf>> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if name.starts_with(prefix) && !is_partial(name) && entry.file_type().await?.is_file()
            {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }
}
