use std::{net::IpAddr, path::PathBuf, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    linkfetch_config::LinkfetchConfig,
    secrecy::Secret,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
    url::Url,
};

use crate::{
    bridge::{ExecutionBridge, WorkItem},
    cleanup::Janitor,
    error::{ErrorKind, Failure},
    extract::{ExtractError, ExtractOptions, Extractor, MediaMetadata, content_type_for_extension},
    quirks::{SiteQuirk, quirk_for},
    request::{Artifact, RetrievalOutcome, RetrievalRequest},
    store::ArtifactStore,
    strategy::{Requester, Strategy, bridge_failure},
};

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                                  (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const GIF_FORMAT: &str = "best[ext=gif]/best[ext=mp4]/best";

/// Format expression matched to the size budget.
pub fn format_for_budget(limit_mb: u64) -> &'static str {
    if limit_mb <= 300 {
        "best[height<=480][filesize<300M]/best[height<=480]/worst"
    } else if limit_mb <= 500 {
        "best[height<=720][filesize<500M]/best[height<=720]/best[height<=480]"
    } else {
        "best[height<=720]/best"
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub probe_timeout: Duration,
    pub transfer_timeout: Duration,
    pub socket_timeout: Duration,
    pub cookie_header: Option<Secret<String>>,
    pub cookie_file: Option<PathBuf>,
    pub proxy: Option<Secret<String>>,
    pub source_address: Option<IpAddr>,
}

impl ExtractorSettings {
    pub fn from_config(config: &LinkfetchConfig) -> Self {
        let extractor = &config.extractor;
        Self {
            probe_timeout: Duration::from_secs(extractor.probe_timeout_secs),
            transfer_timeout: Duration::from_secs(extractor.transfer_timeout_secs),
            socket_timeout: Duration::from_secs(extractor.socket_timeout_secs),
            cookie_header: extractor.cookie_header.clone(),
            cookie_file: extractor.cookie_file.clone(),
            proxy: config
                .network
                .download_proxy()
                .map(|p| Secret::new(p.to_string())),
            source_address: config.network.source_address,
        }
    }
}

/// Two-phase retrieval through the media extractor: probe, then transfer.
pub struct ExtractorStrategy {
    bridge: ExecutionBridge,
    extractor: Arc<dyn Extractor>,
    store: ArtifactStore,
    settings: ExtractorSettings,
}

impl ExtractorStrategy {
    pub fn new(
        bridge: ExecutionBridge,
        extractor: Arc<dyn Extractor>,
        store: ArtifactStore,
        settings: ExtractorSettings,
    ) -> Self {
        Self {
            bridge,
            extractor,
            store,
            settings,
        }
    }

    fn base_options(&self, url: &Url, quirk: Option<&SiteQuirk>) -> ExtractOptions {
        let origin = url.origin().ascii_serialization();
        let mut headers: Vec<(String, String)> = [
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
            ("Accept-Language", "en-US,en;q=0.5"),
            ("Accept-Encoding", "gzip, deflate"),
            ("DNT", "1"),
            ("Connection", "keep-alive"),
            ("Upgrade-Insecure-Requests", "1"),
            ("Referer", url.as_str()),
            ("Origin", origin.as_str()),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let mut user_agent = DEFAULT_USER_AGENT;
        let mut extractor_args = Vec::new();
        if let Some(quirk) = quirk {
            for (name, value) in quirk.headers {
                match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                    Some(existing) => existing.1 = (*value).to_string(),
                    None => headers.push(((*name).to_string(), (*value).to_string())),
                }
            }
            if let Some(ua) = quirk.user_agent {
                user_agent = ua;
            }
            extractor_args = quirk.extractor_args.iter().map(|a| a.to_string()).collect();
        }

        ExtractOptions {
            user_agent: user_agent.to_string(),
            headers,
            cookie_header: self.settings.cookie_header.clone(),
            cookie_file: self
                .settings
                .cookie_file
                .clone()
                .filter(|path| path.exists()),
            proxy: self.settings.proxy.clone(),
            source_address: self.settings.source_address,
            socket_timeout: self.settings.socket_timeout,
            extractor_args,
            ..Default::default()
        }
    }

    fn transfer_options(
        &self,
        request: &RetrievalRequest,
        base: &ExtractOptions,
        quirk: Option<&SiteQuirk>,
    ) -> ExtractOptions {
        let gif_priority = quirk.is_some_and(|q| q.gif_priority);
        let budget = if gif_priority {
            GIF_FORMAT
        } else {
            format_for_budget(request.size_limit_mb())
        };
        ExtractOptions {
            format: Some(format!(
                "best[ext=mp4][height<=720]/best[ext=mp4]/{budget}"
            )),
            output_template: Some(self.store.output_template(request)),
            retries: Some(5),
            fragment_retries: Some(10),
            extractor_retries: 3,
            concurrent_fragments: Some(1),
            merge_output_format: (!gif_priority).then(|| "mp4".to_string()),
            ..base.clone()
        }
    }

    async fn probe(
        &self,
        request: &RetrievalRequest,
        options: ExtractOptions,
    ) -> Result<MediaMetadata, Failure> {
        let extractor = Arc::clone(&self.extractor);
        let url = request.url.to_string();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let item = WorkItem::task("extractor-probe", self.settings.probe_timeout, async move {
            extractor.probe(&url, &options, &cancel).await
        })
        .cancel_on_timeout(token);

        match self.bridge.submit(item).await {
            Ok(result) => result.map_err(|e| extract_failure(&e)),
            Err(e) => Err(bridge_failure("metadata probe", &e)),
        }
    }

    async fn fetch(
        &self,
        request: &RetrievalRequest,
        options: ExtractOptions,
    ) -> Result<MediaMetadata, TransferError> {
        let extractor = Arc::clone(&self.extractor);
        let url = request.url.to_string();
        let token = CancellationToken::new();
        let cancel = token.clone();
        let item = WorkItem::task("extractor-fetch", self.settings.transfer_timeout, async move {
            extractor.fetch(&url, &options, &cancel).await
        })
        .cancel_on_timeout(token)
        .on_late(discard_late_transfer(
            Janitor::new(self.store.clone()),
            request.file_stem(),
        ));

        match self.bridge.submit(item).await {
            Ok(result) => result.map_err(TransferError::Extract),
            Err(e) => Err(TransferError::Bridge(bridge_failure("video download", &e))),
        }
    }

    async fn locate(
        &self,
        request: &RetrievalRequest,
        metadata: &MediaMetadata,
    ) -> Result<Artifact, Failure> {
        let reported = metadata
            .output_path()
            .filter(|p| p.exists())
            .map(PathBuf::from);
        let path = match reported {
            Some(path) => path,
            None => self
                .store
                .find_by_prefix(&request.file_stem())
                .await
                .ok()
                .and_then(|found| found.into_iter().next())
                .ok_or_else(|| {
                    Failure::new(ErrorKind::StorageFailed, "downloaded file not found")
                })?,
        };

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map_err(|e| Failure::new(ErrorKind::StorageFailed, e.to_string()))?
            .len();
        Ok(Artifact {
            content_type: content_type_for_extension(&path).to_string(),
            path,
            size_bytes,
        })
    }
}

enum TransferError {
    Extract(ExtractError),
    Bridge(Failure),
}

fn extract_failure(error: &ExtractError) -> Failure {
    let kind = match error {
        ExtractError::NotFound { .. } => ErrorKind::NotFound,
        ExtractError::Unsupported { .. } | ExtractError::Unavailable { .. } => {
            ErrorKind::Unsupported
        },
        ExtractError::Cancelled => ErrorKind::Timeout,
        ExtractError::Io(_) => ErrorKind::StorageFailed,
        ExtractError::Failed { .. } | ExtractError::Output(_) => ErrorKind::ExtractionFailed,
    };
    Failure::new(kind, error.to_string())
}

/// An abandoned transfer may still write files before it stops, whatever
/// it finally reports. Once it returns, everything under the request's
/// prefix goes.
fn discard_late_transfer(
    janitor: Janitor,
    stem: String,
) -> impl FnOnce(Result<MediaMetadata, ExtractError>) + Send + 'static {
    move |result| {
        if let Err(e) = &result {
            debug!(prefix = %stem, error = %e, "abandoned transfer finished");
        }
        tokio::spawn(async move {
            let report = janitor.purge_request(&stem).await;
            if report.removed > 0 {
                info!(prefix = %stem, removed = report.removed, "removed late extractor files");
            }
        });
    }
}

#[async_trait]
impl Strategy for ExtractorStrategy {
    fn name(&self) -> &'static str {
        "extractor"
    }

    fn performs_download(&self) -> bool {
        true
    }

    async fn attempt(
        &self,
        request: &RetrievalRequest,
        requester: Requester<'_>,
    ) -> RetrievalOutcome {
        let quirk = request.url.host_str().and_then(quirk_for);
        let base = self.base_options(&request.url, quirk);

        requester.status("🔍 Fetching video info...").await;
        let mut probe_options = base.clone();
        probe_options.extractor_retries = 5;
        let metadata = match self.probe(request, probe_options).await {
            Ok(metadata) => metadata,
            Err(failure) => return RetrievalOutcome::Failure(failure),
        };
        if let Some(estimate) = metadata.estimated_size()
            && estimate > request.size_limit_bytes
        {
            info!(
                request_id = %request.id,
                estimate,
                limit = request.size_limit_bytes,
                "probe estimate over limit"
            );
            return RetrievalOutcome::Failure(request.size_exceeded(estimate));
        }

        requester.status("⏬ Downloading video...").await;
        let options = self.transfer_options(request, &base, quirk);
        let retry = quirk.and_then(|q| q.not_found_retry_format.map(|format| (q, format)));
        let fetched = match (self.fetch(request, options.clone()).await, retry) {
            (Ok(metadata), _) => Ok(metadata),
            (
                Err(TransferError::Extract(ExtractError::NotFound { .. })),
                Some((quirk, retry_format)),
            ) => {
                warn!(
                    request_id = %request.id,
                    format = retry_format,
                    "not found, retrying with conservative format"
                );
                let retry = ExtractOptions {
                    format: Some(retry_format.to_string()),
                    ..options
                };
                match self.fetch(request, retry).await {
                    Ok(metadata) => Ok(metadata),
                    Err(TransferError::Extract(e)) => {
                        let failure = extract_failure(&e);
                        Err(match quirk.not_found_hint {
                            Some(hint) => failure.with_hint(hint),
                            None => failure,
                        })
                    },
                    Err(TransferError::Bridge(failure)) => Err(failure),
                }
            },
            (Err(TransferError::Extract(e)), _) => Err(extract_failure(&e)),
            (Err(TransferError::Bridge(failure)), _) => Err(failure),
        };

        let metadata = match fetched {
            Ok(metadata) => metadata,
            Err(failure) => return RetrievalOutcome::Failure(failure),
        };
        match self.locate(request, &metadata).await {
            Ok(artifact) => {
                info!(
                    request_id = %request.id,
                    path = %artifact.path.display(),
                    size_bytes = artifact.size_bytes,
                    "extractor transfer complete"
                );
                RetrievalOutcome::Success(artifact)
            },
            Err(failure) => RetrievalOutcome::Failure(failure),
        }
    }
}
