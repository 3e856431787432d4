//! Media extractor collaborator (yt-dlp).
//!
//! Each call runs the extractor as a child process that is killed as soon as
//! the call's cancellation token fires or its future is dropped. The
//! extractor's diagnostics are classified into [`ExtractError`] here, once,
//! so nothing downstream has to look at its output text.

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    serde::Deserialize,
    tokio::process::Command,
    tokio_util::sync::CancellationToken,
    tracing::{debug, warn},
};

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("extractor binary not available: {binary}")]
    Unavailable { binary: String },
    #[error("unsupported URL: {detail}")]
    Unsupported { detail: String },
    #[error("media not found: {detail}")]
    NotFound { detail: String },
    #[error("{detail}")]
    Failed { detail: String },
    #[error("extraction cancelled")]
    Cancelled,
    #[error("unreadable extractor output: {0}")]
    Output(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Metadata reported by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaMetadata {
    pub id: Option<String>,
    pub title: Option<String>,
    pub ext: Option<String>,
    pub filesize: Option<f64>,
    pub filesize_approx: Option<f64>,
    /// Set after a transfer.
    pub filepath: Option<PathBuf>,
    #[serde(default)]
    pub requested_downloads: Vec<RequestedDownload>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RequestedDownload {
    pub filepath: Option<PathBuf>,
}

impl MediaMetadata {
    /// Exact size when known, else the extractor's estimate.
    pub fn estimated_size(&self) -> Option<u64> {
        [self.filesize, self.filesize_approx]
            .into_iter()
            .flatten()
            .find(|size| *size > 0.0)
            .map(|size| size as u64)
    }

    /// Where the transfer wrote the artifact, if reported.
    pub fn output_path(&self) -> Option<&Path> {
        self.requested_downloads
            .iter()
            .find_map(|d| d.filepath.as_deref())
            .or(self.filepath.as_deref())
    }
}

/// Every option the extractor is driven with.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub format: Option<String>,
    pub output_template: Option<String>,
    pub user_agent: String,
    pub headers: Vec<(String, String)>,
    pub cookie_header: Option<Secret<String>>,
    pub cookie_file: Option<PathBuf>,
    pub proxy: Option<Secret<String>>,
    pub source_address: Option<IpAddr>,
    pub socket_timeout: Duration,
    pub retries: Option<u32>,
    pub fragment_retries: Option<u32>,
    pub extractor_retries: u32,
    pub concurrent_fragments: Option<u32>,
    pub merge_output_format: Option<String>,
    pub extractor_args: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            format: None,
            output_template: None,
            user_agent: String::new(),
            headers: Vec::new(),
            cookie_header: None,
            cookie_file: None,
            proxy: None,
            source_address: None,
            socket_timeout: Duration::from_secs(30),
            retries: None,
            fragment_retries: None,
            extractor_retries: 3,
            concurrent_fragments: None,
            merge_output_format: None,
            extractor_args: Vec::new(),
        }
    }
}

impl ExtractOptions {
    /// Command-line arguments for one invocation. `download` selects a
    /// transfer; otherwise only metadata is resolved.
    pub fn to_args(&self, url: &str, download: bool) -> Vec<String> {
        let mut args: Vec<String> = [
            "--dump-single-json",
            "--quiet",
            "--no-warnings",
            "--no-progress",
            "--no-playlist",
            "--no-check-certificates",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let mut opt = |flag: &str, value: String| {
            args.push(flag.to_string());
            args.push(value);
        };

        opt("--socket-timeout", self.socket_timeout.as_secs().to_string());
        opt("--extractor-retries", self.extractor_retries.to_string());
        if !self.user_agent.is_empty() {
            opt("--user-agent", self.user_agent.clone());
        }
        for (name, value) in &self.headers {
            opt("--add-header", format!("{name}:{value}"));
        }
        if let Some(cookie) = &self.cookie_header {
            opt("--add-header", format!("Cookie:{}", cookie.expose_secret()));
        }
        if let Some(path) = &self.cookie_file {
            opt("--cookies", path.display().to_string());
        }
        if let Some(proxy) = &self.proxy {
            opt("--proxy", proxy.expose_secret().clone());
        }
        if let Some(addr) = self.source_address {
            opt("--source-address", addr.to_string());
        }
        for extractor_arg in &self.extractor_args {
            opt("--extractor-args", extractor_arg.clone());
        }

        if download {
            if let Some(format) = &self.format {
                opt("--format", format.clone());
            }
            if let Some(template) = &self.output_template {
                opt("--output", template.clone());
            }
            if let Some(retries) = self.retries {
                opt("--retries", retries.to_string());
            }
            if let Some(retries) = self.fragment_retries {
                opt("--fragment-retries", retries.to_string());
            }
            if let Some(n) = self.concurrent_fragments {
                opt("--concurrent-fragments", n.to_string());
            }
            if let Some(container) = &self.merge_output_format {
                opt("--merge-output-format", container.clone());
            }
            args.push("--no-simulate".into());
        }

        args.push("--".into());
        args.push(url.to_string());
        args
    }
}

/// The extraction collaborator.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Resolve metadata without transferring media.
    async fn probe(
        &self,
        url: &str,
        options: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<MediaMetadata, ExtractError>;

    /// Transfer the media to `options.output_template`.
    async fn fetch(
        &self,
        url: &str,
        options: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<MediaMetadata, ExtractError>;
}

/// Runs the `yt-dlp` executable.
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
}

impl YtDlp {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn invoke(
        &self,
        url: &str,
        options: &ExtractOptions,
        download: bool,
        cancel: &CancellationToken,
    ) -> Result<MediaMetadata, ExtractError> {
        debug!(binary = %self.binary, url, download, "invoking extractor");
        let mut cmd = Command::new(&self.binary);
        cmd.args(options.to_args(url, download))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ExtractError::Unavailable {
                binary: self.binary.clone(),
            },
            _ => ExtractError::Io(e),
        })?;

        // Dropping the pending wait drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => output?,
            () = cancel.cancelled() => {
                warn!(url, "extractor cancelled, killing process");
                return Err(ExtractError::Cancelled);
            },
        };

        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let json = stdout
            .lines()
            .rev()
            .find(|line| line.trim_start().starts_with('{'))
            .ok_or_else(|| ExtractError::Failed {
                detail: "extractor returned no metadata".into(),
            })?;
        Ok(serde_json::from_str(json)?)
    }
}

#[async_trait]
impl Extractor for YtDlp {
    async fn probe(
        &self,
        url: &str,
        options: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<MediaMetadata, ExtractError> {
        self.invoke(url, options, false, cancel).await
    }

    async fn fetch(
        &self,
        url: &str,
        options: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<MediaMetadata, ExtractError> {
        self.invoke(url, options, true, cancel).await
    }
}

/// Map the extractor's stderr to a typed error.
fn classify_failure(stderr: &str) -> ExtractError {
    let detail = stderr
        .lines()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr.lines().rev().find(|line| !line.trim().is_empty()))
        .unwrap_or("extractor exited with an error")
        .trim_start_matches("ERROR:")
        .trim()
        .to_string();

    if detail.contains("HTTP Error 404") || detail.contains("404: Not Found") {
        ExtractError::NotFound { detail }
    } else if detail.starts_with("Unsupported URL") {
        ExtractError::Unsupported { detail }
    } else {
        ExtractError::Failed { detail }
    }
}

/// Content type of an extractor artifact, from its extension.
pub fn content_type_for_extension(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("gif") => "image/gif",
        Some("webm") => "video/webm",
        _ => "video/mp4",
    }
}
