//! The retrieval orchestrator.
//!
//! Per request: classify the source, walk that source's strategy chain in
//! order until one succeeds, re-check the artifact on disk, and make sure a
//! failed request leaves nothing behind in the downloads directory.

use std::{sync::Arc, time::Instant};

use {
    linkfetch_config::LinkfetchConfig,
    secrecy::{ExposeSecret, Secret},
    tracing::{info, warn},
    url::Url,
};

use crate::{
    bridge::ExecutionBridge,
    cleanup::Janitor,
    error::{ErrorKind, Failure, Result},
    extract::Extractor,
    mime::{SourceKind, classify_source},
    request::{Artifact, RetrievalOutcome, RetrievalRequest},
    store::ArtifactStore,
    strategy::{
        ExtractorSettings, ExtractorStrategy, HttpSettings, HttpStrategy, Passthrough, Requester,
        Strategy,
    },
};

/// The three strategies the orchestrator chains.
pub struct Strategies {
    pub passthrough: Arc<dyn Strategy>,
    pub http: Arc<dyn Strategy>,
    pub extractor: Arc<dyn Strategy>,
}

pub struct Orchestrator {
    strategies: Strategies,
    janitor: Janitor,
    /// Forbid every strategy that writes a local file.
    direct_send_only: bool,
    size_limit_bytes: u64,
    secrets: Vec<Secret<String>>,
}

impl Orchestrator {
    pub fn new(
        strategies: Strategies,
        janitor: Janitor,
        direct_send_only: bool,
        size_limit_bytes: u64,
    ) -> Self {
        Self {
            strategies,
            janitor,
            direct_send_only,
            size_limit_bytes,
            secrets: Vec::new(),
        }
    }

    /// Wire the production strategies from configuration.
    pub fn from_config(
        config: &LinkfetchConfig,
        bridge: ExecutionBridge,
        extractor: Arc<dyn Extractor>,
    ) -> Result<Self> {
        let downloads = &config.downloads;
        let store = ArtifactStore::new(&downloads.dir);
        let strategies = Strategies {
            passthrough: Arc::new(Passthrough::new(
                bridge.clone(),
                std::time::Duration::from_secs(downloads.passthrough_timeout_secs),
            )),
            http: Arc::new(HttpStrategy::new(
                bridge.clone(),
                store.clone(),
                HttpSettings::from_config(config),
            )?),
            extractor: Arc::new(ExtractorStrategy::new(
                bridge,
                extractor,
                store.clone(),
                ExtractorSettings::from_config(config),
            )),
        };

        let secrets = [
            Some(config.telegram.token.clone()),
            config.network.proxy_url.clone(),
            config.extractor.cookie_header.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();

        Ok(Self {
            secrets,
            ..Self::new(
                strategies,
                Janitor::new(store),
                downloads.direct_send_only,
                downloads.max_file_size_bytes(),
            )
        })
    }

    pub fn janitor(&self) -> &Janitor {
        &self.janitor
    }

    /// A new request for `url` under the configured ceiling.
    pub fn request(&self, url: Url) -> RetrievalRequest {
        RetrievalRequest::new(url, self.size_limit_bytes)
    }

    /// Strategies to try for a source, in order.
    pub fn chain(&self, source: SourceKind) -> std::result::Result<Vec<&dyn Strategy>, Failure> {
        match source {
            SourceKind::DirectLink => Ok(vec![
                self.strategies.passthrough.as_ref(),
                self.strategies.http.as_ref(),
            ]),
            SourceKind::VideoSite if self.direct_send_only => Err(Failure::new(
                ErrorKind::Unsupported,
                "downloading from video sites is disabled in this environment",
            )),
            SourceKind::VideoSite => Ok(vec![self.strategies.extractor.as_ref()]),
        }
    }

    pub async fn retrieve(
        &self,
        request: &RetrievalRequest,
        requester: Requester<'_>,
    ) -> RetrievalOutcome {
        let started = Instant::now();
        let source = classify_source(&request.url);
        info!(
            request_id = %request.id,
            url = %request.url,
            ?source,
            limit = request.size_limit_bytes,
            "retrieval started"
        );

        let outcome = match self.run_chain(request, source, requester).await {
            RetrievalOutcome::Success(artifact) => self.gate(request, artifact).await,
            other => other,
        };

        match &outcome {
            RetrievalOutcome::Success(artifact) => info!(
                request_id = %request.id,
                size_bytes = artifact.size_bytes,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "retrieval succeeded"
            ),
            RetrievalOutcome::Forwarded { kind } => info!(
                request_id = %request.id,
                %kind,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "retrieval forwarded"
            ),
            RetrievalOutcome::Failure(failure) => {
                warn!(
                    request_id = %request.id,
                    kind = %failure.kind,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "retrieval failed"
                );
                self.janitor.purge_request(&request.file_stem()).await;
            },
        }

        match outcome {
            RetrievalOutcome::Failure(failure) => RetrievalOutcome::Failure(self.redact(failure)),
            other => other,
        }
    }

    /// Scrub configured secrets from a failure before it is shown.
    pub fn redact(&self, failure: Failure) -> Failure {
        let secrets: Vec<&str> = self
            .secrets
            .iter()
            .map(|s| s.expose_secret().as_str())
            .collect();
        failure.redacted(&secrets)
    }

    async fn run_chain(
        &self,
        request: &RetrievalRequest,
        source: SourceKind,
        requester: Requester<'_>,
    ) -> RetrievalOutcome {
        let chain = match self.chain(source) {
            Ok(chain) => chain,
            Err(failure) => return RetrievalOutcome::Failure(failure),
        };
        if source == SourceKind::VideoSite {
            requester
                .status("🎬 Video site detected, using the extractor...")
                .await;
        }

        let mut last: Option<Failure> = None;
        for strategy in chain {
            if strategy.performs_download() && self.direct_send_only {
                let detail = last
                    .as_ref()
                    .map(|f| format!(": {}", f.message))
                    .unwrap_or_default();
                return RetrievalOutcome::failure(
                    ErrorKind::Unsupported,
                    format!("direct send failed and local downloads are disabled{detail}"),
                );
            }

            info!(request_id = %request.id, strategy = strategy.name(), "trying strategy");
            match strategy.attempt(request, requester).await {
                RetrievalOutcome::Failure(failure) if failure.kind.allows_fallback() => {
                    warn!(
                        request_id = %request.id,
                        strategy = strategy.name(),
                        kind = %failure.kind,
                        message = %failure.message,
                        "strategy failed, falling through"
                    );
                    last = Some(failure);
                },
                outcome => return outcome,
            }
        }

        RetrievalOutcome::Failure(last.unwrap_or_else(|| {
            Failure::new(ErrorKind::Unsupported, "no retrieval strategy applies")
        }))
    }

    /// Re-measure the artifact; strategies may under-report.
    async fn gate(&self, request: &RetrievalRequest, artifact: Artifact) -> RetrievalOutcome {
        let size_bytes = match tokio::fs::metadata(&artifact.path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => {
                return RetrievalOutcome::failure(ErrorKind::StorageFailed, "artifact is not a file");
            },
            Err(e) => {
                return RetrievalOutcome::failure(
                    ErrorKind::StorageFailed,
                    format!("artifact missing: {e}"),
                );
            },
        };

        if size_bytes > request.size_limit_bytes {
            warn!(
                request_id = %request.id,
                size_bytes,
                reported = artifact.size_bytes,
                "artifact over limit after transfer"
            );
            self.janitor.remove_artifact(&artifact.path).await;
            return RetrievalOutcome::Failure(request.size_exceeded(size_bytes));
        }

        RetrievalOutcome::Success(Artifact {
            size_bytes,
            ..artifact
        })
    }
}
