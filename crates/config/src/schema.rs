/// Config schema types (downloads, network, extractor, telegram, delivery).
use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
};

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

const MB: u64 = 1024 * 1024;

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkfetchConfig {
    pub downloads: DownloadsConfig,
    pub network: NetworkConfig,
    pub extractor: ExtractorConfig,
    pub telegram: TelegramConfig,
    pub delivery: DeliveryConfig,
}

/// Local storage and raw-HTTP retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadsConfig {
    /// Shared directory for transient artifacts.
    pub dir: PathBuf,
    /// Per-request ceiling in MB (1 MB = 1024 * 1024 bytes).
    pub max_file_size_mb: u64,
    /// Forbid every strategy that writes a local file. Remote passthrough
    /// still works.
    pub direct_send_only: bool,
    /// Size of the blocking worker pool.
    pub workers: usize,
    /// Deadline for the metadata-only size check.
    pub head_timeout_secs: u64,
    /// Connect/read timeout of a single raw-HTTP request.
    pub request_timeout_secs: u64,
    /// Deadline for a whole raw-HTTP transfer.
    pub transfer_timeout_secs: u64,
    /// Deadline for asking the messaging service to fetch a URL itself.
    pub passthrough_timeout_secs: u64,
    /// Files older than this are reclaimed by the janitor.
    pub stale_after_secs: u64,
    /// Interval of the periodic janitor sweep. Zero disables the timer.
    pub sweep_interval_secs: u64,
    pub user_agent: String,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("downloads"),
            max_file_size_mb: 2000,
            direct_send_only: false,
            workers: 2,
            head_timeout_secs: 20,
            request_timeout_secs: 60,
            transfer_timeout_secs: 300,
            passthrough_timeout_secs: 120,
            stale_after_secs: 3600,
            sweep_interval_secs: 3600,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".into(),
        }
    }
}

impl DownloadsConfig {
    /// The ceiling in bytes.
    #[must_use]
    pub fn max_file_size_bytes(&self) -> u64 {
        self.max_file_size_mb.saturating_mul(MB)
    }
}

/// Outbound network settings shared by the Bot API client and downloads.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Proxy endpoint. Always used for the Bot API, for downloads only when
    /// `allow_download_via_proxy` is set.
    #[serde(serialize_with = "serialize_option_secret")]
    pub proxy_url: Option<Secret<String>>,
    pub allow_download_via_proxy: bool,
    /// Local address outbound download sockets bind to.
    pub source_address: Option<IpAddr>,
}

impl std::fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("proxy_url", &self.proxy_url.as_ref().map(|_| "[REDACTED]"))
            .field("allow_download_via_proxy", &self.allow_download_via_proxy)
            .field("source_address", &self.source_address)
            .finish()
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            proxy_url: None,
            allow_download_via_proxy: false,
            source_address: Some(IpAddr::V4(Ipv4Addr::UNSPECIFIED)),
        }
    }
}

impl NetworkConfig {
    /// Proxy for Bot API traffic, if one is configured.
    #[must_use]
    pub fn bot_api_proxy(&self) -> Option<&str> {
        self.proxy_url
            .as_ref()
            .map(|p| p.expose_secret().as_str())
            .filter(|p| !p.is_empty())
    }

    /// Proxy to use for downloads, if any.
    #[must_use]
    pub fn download_proxy(&self) -> Option<&str> {
        if !self.allow_download_via_proxy {
            return None;
        }
        self.bot_api_proxy()
    }
}

/// Media extractor (yt-dlp) settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Extractor executable, resolved through `PATH` when not absolute.
    pub binary: String,
    pub probe_timeout_secs: u64,
    pub transfer_timeout_secs: u64,
    pub socket_timeout_secs: u64,
    /// Ready-made `Cookie` header value.
    #[serde(serialize_with = "serialize_option_secret")]
    pub cookie_header: Option<Secret<String>>,
    /// Netscape-format cookie file.
    pub cookie_file: Option<PathBuf>,
}

impl std::fmt::Debug for ExtractorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractorConfig")
            .field("binary", &self.binary)
            .field("probe_timeout_secs", &self.probe_timeout_secs)
            .field("transfer_timeout_secs", &self.transfer_timeout_secs)
            .field(
                "cookie_header",
                &self.cookie_header.as_ref().map(|_| "[REDACTED]"),
            )
            .field("cookie_file", &self.cookie_file)
            .finish_non_exhaustive()
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".into(),
            probe_timeout_secs: 60,
            transfer_timeout_secs: 600,
            socket_timeout_secs: 30,
            cookie_header: None,
            cookie_file: None,
        }
    }
}

/// Telegram bot credentials and upload settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,
    /// Base URL of a self-hosted Bot API server used for uploads above the
    /// inline limit (e.g. "http://127.0.0.1:8081").
    pub large_file_api_url: Option<String>,
    /// Client timeout for uploads.
    pub upload_timeout_secs: u64,
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("large_file_api_url", &self.large_file_api_url)
            .field("upload_timeout_secs", &self.upload_timeout_secs)
            .finish()
    }
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            large_file_api_url: None,
            upload_timeout_secs: 300,
        }
    }
}

/// Delivery channel thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Artifacts above this size use the large-file channel.
    pub inline_limit_mb: u64,
    /// Transport ceiling; nothing above it can be delivered.
    pub absolute_limit_mb: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            inline_limit_mb: 50,
            absolute_limit_mb: 2000,
        }
    }
}

impl DeliveryConfig {
    #[must_use]
    pub fn inline_limit_bytes(&self) -> u64 {
        self.inline_limit_mb.saturating_mul(MB)
    }

    #[must_use]
    pub fn absolute_limit_bytes(&self) -> u64 {
        self.absolute_limit_mb.saturating_mul(MB)
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
