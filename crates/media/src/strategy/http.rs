use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration,
};

use {
    async_trait::async_trait,
    futures::StreamExt,
    linkfetch_config::LinkfetchConfig,
    reqwest::{
        Client, Response, StatusCode,
        header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, HeaderValue},
    },
    secrecy::{ExposeSecret, Secret},
    tokio::io::AsyncWriteExt,
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    bridge::ExecutionBridge,
    error::{Error, ErrorKind, Failure, Result},
    mime::infer_extension,
    request::{Artifact, RetrievalOutcome, RetrievalRequest},
    store::ArtifactStore,
    strategy::{Requester, Strategy, bridge_failure},
};

#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub head_timeout: Duration,
    pub request_timeout: Duration,
    pub transfer_timeout: Duration,
    pub proxy: Option<Secret<String>>,
    pub source_address: Option<IpAddr>,
}

impl HttpSettings {
    pub fn from_config(config: &LinkfetchConfig) -> Self {
        let downloads = &config.downloads;
        Self {
            user_agent: downloads.user_agent.clone(),
            head_timeout: Duration::from_secs(downloads.head_timeout_secs),
            request_timeout: Duration::from_secs(downloads.request_timeout_secs),
            transfer_timeout: Duration::from_secs(downloads.transfer_timeout_secs),
            proxy: config
                .network
                .download_proxy()
                .map(|p| Secret::new(p.to_string())),
            source_address: config.network.source_address,
        }
    }
}

/// Streams the URL body straight into the downloads directory.
pub struct HttpStrategy {
    bridge: ExecutionBridge,
    store: ArtifactStore,
    direct: Client,
    /// Only present when downloads may go through the proxy.
    proxied: Option<Client>,
    settings: HttpSettings,
}

/// Why a transfer stopped.
#[derive(Debug, thiserror::Error)]
enum TransferError {
    #[error("declared size {0} bytes is over the limit")]
    Declared(u64),
    #[error("received more than {0} bytes")]
    Overflow(u64),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

struct Transferred {
    content_type: Option<String>,
    bytes: u64,
}

impl HttpStrategy {
    pub fn new(bridge: ExecutionBridge, store: ArtifactStore, settings: HttpSettings) -> Result<Self> {
        let direct = build_client(&settings, None)?;
        let proxied = settings
            .proxy
            .as_ref()
            .map(|proxy| build_client(&settings, Some(proxy.expose_secret().as_str())))
            .transpose()?;
        Ok(Self {
            bridge,
            store,
            direct,
            proxied,
            settings,
        })
    }

    /// Declared size and content type from a metadata-only request. Errors
    /// and non-success responses yield nothing.
    async fn preflight(&self, url: &Url) -> (Option<u64>, Option<String>) {
        let head = self
            .direct
            .head(url.clone())
            .timeout(self.settings.head_timeout)
            .send();
        match self
            .bridge
            .run("http-head", self.settings.head_timeout, head)
            .await
        {
            Ok(Ok(response)) if response.status().is_success() => (
                declared_length(response.headers()),
                header_str(response.headers(), CONTENT_TYPE),
            ),
            Ok(Ok(response)) => {
                debug!(status = %response.status(), "HEAD not usable, skipping pre-check");
                (None, None)
            },
            Ok(Err(e)) => {
                debug!(error = %e, "HEAD failed, skipping pre-check");
                (None, None)
            },
            Err(_) => (None, None),
        }
    }

    /// GET with a single fallback on a connection failure: through the proxy
    /// when one is enabled, else over plain http for an https URL.
    async fn open(&self, url: &Url) -> std::result::Result<Response, reqwest::Error> {
        let first = self.direct.get(url.clone()).send().await;
        let err = match first {
            Ok(response) => return response.error_for_status(),
            Err(e) if e.is_connect() => e,
            Err(e) => return Err(e),
        };

        if let Some(proxied) = &self.proxied {
            warn!(error = %err, "connection failed, retrying through proxy");
            return match proxied.get(url.clone()).send().await {
                Ok(response) => response.error_for_status(),
                Err(_) => Err(err),
            };
        }

        if url.scheme() == "https" {
            let mut insecure = url.clone();
            if insecure.set_scheme("http").is_ok() {
                warn!(error = %err, "connection failed, retrying over http");
                return match self.direct.get(insecure).send().await {
                    Ok(response) => response.error_for_status(),
                    Err(_) => Err(err),
                };
            }
        }
        Err(err)
    }

    async fn transfer(
        &self,
        url: &Url,
        partial: &Path,
        limit: u64,
    ) -> std::result::Result<Transferred, TransferError> {
        let response = self.open(url).await?;
        if let Some(declared) = declared_length(response.headers())
            && declared > limit
        {
            return Err(TransferError::Declared(declared));
        }
        let content_type = header_str(response.headers(), CONTENT_TYPE);

        let mut file = tokio::fs::File::create(partial).await?;
        let mut stream = response.bytes_stream();
        let mut bytes: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            bytes += chunk.len() as u64;
            if bytes > limit {
                return Err(TransferError::Overflow(limit));
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        Ok(Transferred {
            content_type,
            bytes,
        })
    }

    fn failure(&self, request: &RetrievalRequest, error: TransferError) -> Failure {
        match error {
            TransferError::Declared(size) => request.size_exceeded(size),
            TransferError::Overflow(_) => Failure::new(
                ErrorKind::SizeExceeded,
                format!(
                    "transfer passed the {} MB limit",
                    request.size_limit_mb()
                ),
            ),
            TransferError::Http(e) => http_failure(&e),
            TransferError::Io(e) => Failure::new(ErrorKind::StorageFailed, e.to_string()),
        }
    }
}

fn build_client(settings: &HttpSettings, proxy: Option<&str>) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));

    let mut builder = Client::builder()
        .user_agent(settings.user_agent.as_str())
        .default_headers(headers)
        .connect_timeout(settings.request_timeout)
        .read_timeout(settings.request_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .local_address(settings.source_address);
    builder = match proxy {
        Some(proxy) => builder.proxy(
            reqwest::Proxy::all(proxy).map_err(|e| Error::external("invalid download proxy", e))?,
        ),
        None => builder.no_proxy(),
    };
    builder
        .build()
        .map_err(|e| Error::external("building http client", e))
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
        .filter(|len| *len > 0)
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn http_failure(error: &reqwest::Error) -> Failure {
    if error.is_timeout() {
        return Failure::new(ErrorKind::Timeout, "the file server stopped responding");
    }
    if error.is_connect() {
        return Failure::new(ErrorKind::ConnectionFailed, "could not reach the file server");
    }
    match error.status() {
        Some(status @ (StatusCode::NOT_FOUND | StatusCode::GONE)) => {
            Failure::new(ErrorKind::NotFound, format!("server answered {status}"))
        },
        Some(status) => Failure::new(
            ErrorKind::ConnectionFailed,
            format!("server answered {status}"),
        ),
        None => Failure::new(ErrorKind::ConnectionFailed, error_text(error)),
    }
}

/// Error text without the request URL, which may embed credentials.
fn error_text(error: &reqwest::Error) -> String {
    let text = error.to_string();
    match error.url() {
        Some(url) => text.replace(url.as_str(), "<url>"),
        None => text,
    }
}

async fn discard(paths: &[&Path]) {
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed incomplete download"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %path.display(), error = %e, "failed to remove incomplete download"),
        }
    }
}

#[async_trait]
impl Strategy for HttpStrategy {
    fn name(&self) -> &'static str {
        "http"
    }

    fn performs_download(&self) -> bool {
        true
    }

    async fn attempt(
        &self,
        request: &RetrievalRequest,
        requester: Requester<'_>,
    ) -> RetrievalOutcome {
        let limit = request.size_limit_bytes;
        let (declared, head_type) = self.preflight(&request.url).await;
        if let Some(size) = declared
            && size > limit
        {
            info!(request_id = %request.id, size, limit, "declared size over limit");
            return RetrievalOutcome::Failure(request.size_exceeded(size));
        }

        if let Err(e) = self.store.ensure_dir().await {
            return RetrievalOutcome::failure(ErrorKind::StorageFailed, e.to_string());
        }
        requester.status("⏬ Downloading...").await;

        let extension = infer_extension(&request.url, head_type.as_deref());
        let final_path: PathBuf = self.store.artifact_path(request, &extension);
        let partial = ArtifactStore::partial_path(&final_path);

        let transfer = self.transfer(&request.url, &partial, limit);
        let outcome = self
            .bridge
            .run("http-transfer", self.settings.transfer_timeout, transfer)
            .await;

        let transferred = match outcome {
            Ok(Ok(transferred)) => transferred,
            Ok(Err(e)) => {
                warn!(request_id = %request.id, error = %e, "http transfer failed");
                discard(&[&partial, &final_path]).await;
                return RetrievalOutcome::Failure(self.failure(request, e));
            },
            Err(e) => {
                discard(&[&partial, &final_path]).await;
                return RetrievalOutcome::Failure(bridge_failure("file download", &e));
            },
        };

        if let Err(e) = tokio::fs::rename(&partial, &final_path).await {
            discard(&[&partial]).await;
            return RetrievalOutcome::failure(ErrorKind::StorageFailed, e.to_string());
        }

        let content_type = head_type
            .or(transferred.content_type)
            .unwrap_or_else(|| "application/octet-stream".to_string());
        info!(
            request_id = %request.id,
            size_bytes = transferred.bytes,
            content_type = %content_type,
            "http transfer complete"
        );
        RetrievalOutcome::Success(Artifact {
            path: final_path,
            content_type,
            size_bytes: transferred.bytes,
        })
    }
}
