//! Cross-module behaviour of the orchestrator, strategies and janitor
//! against a real downloads directory.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    io::Write,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    linkfetch_common::DeliveryTarget,
    linkfetch_media::{
        ArtifactStore, ErrorKind, ExecutionBridge, ExtractError, ExtractOptions, Extractor,
        Janitor, MediaMetadata, Orchestrator, Requester, RetrievalOutcome, Strategies,
        strategy::{ExtractorSettings, ExtractorStrategy, HttpSettings, HttpStrategy, Passthrough},
    },
    tokio_util::sync::CancellationToken,
    url::Url,
};

const MIB: u64 = 1024 * 1024;

/// Probes fine, then writes a partial file and stalls until cancelled.
#[derive(Default)]
struct StallingExtractor {
    fetches: AtomicUsize,
}

#[async_trait]
impl Extractor for StallingExtractor {
    async fn probe(
        &self,
        _url: &str,
        _options: &ExtractOptions,
        _cancel: &CancellationToken,
    ) -> Result<MediaMetadata, ExtractError> {
        Ok(MediaMetadata {
            filesize_approx: Some(10.0 * MIB as f64),
            ..Default::default()
        })
    }

    async fn fetch(
        &self,
        _url: &str,
        options: &ExtractOptions,
        cancel: &CancellationToken,
    ) -> Result<MediaMetadata, ExtractError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let template = options.output_template.clone().unwrap();
        let partial = template.replace("%(ext)s", "mp4.part");
        let mut file = std::fs::File::create(&partial)?;
        loop {
            tokio::select! {
                () = cancel.cancelled() => return Err(ExtractError::Cancelled),
                () = tokio::time::sleep(Duration::from_millis(10)) => file.write_all(&[0u8; 512])?,
            }
        }
    }
}

fn settings_for_http() -> HttpSettings {
    HttpSettings {
        user_agent: "linkfetch-test".into(),
        head_timeout: Duration::from_secs(5),
        request_timeout: Duration::from_secs(5),
        transfer_timeout: Duration::from_secs(30),
        proxy: None,
        source_address: None,
    }
}

fn settings_for_extractor(transfer_timeout: Duration) -> ExtractorSettings {
    ExtractorSettings {
        probe_timeout: Duration::from_secs(5),
        transfer_timeout,
        socket_timeout: Duration::from_secs(30),
        cookie_header: None,
        cookie_file: None,
        proxy: None,
        source_address: None,
    }
}

fn orchestrator(dir: &Path, extractor: Arc<dyn Extractor>, limit: u64) -> Orchestrator {
    let bridge = ExecutionBridge::new(2);
    let store = ArtifactStore::new(dir);
    Orchestrator::new(
        Strategies {
            passthrough: Arc::new(Passthrough::new(bridge.clone(), Duration::from_secs(5))),
            http: Arc::new(
                HttpStrategy::new(bridge.clone(), store.clone(), settings_for_http()).unwrap(),
            ),
            extractor: Arc::new(ExtractorStrategy::new(
                bridge,
                extractor,
                store.clone(),
                settings_for_extractor(Duration::from_millis(300)),
            )),
        },
        Janitor::new(store),
        false,
        limit,
    )
}

fn entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn failed_requests_leave_no_files() {
    let mut server = mockito::Server::new_async().await;
    let _missing = server
        .mock("GET", "/gone.mp4")
        .with_status(404)
        .create_async()
        .await;
    let _big = server
        .mock("GET", "/big.mp4")
        .with_status(200)
        .with_body(vec![0u8; 8192])
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), Arc::new(StallingExtractor::default()), 4096);
    let target = DeliveryTarget::new(1);

    for path in ["/gone.mp4", "/big.mp4"] {
        let url = Url::parse(&format!("{}{path}", server.url())).unwrap();
        let request = orch.request(url);
        let outcome = orch.retrieve(&request, Requester::detached(&target)).await;
        assert!(outcome.as_failure().is_some(), "{path}: {outcome:?}");
    }

    assert!(entries(dir.path()).is_empty());
}

#[tokio::test]
async fn streamed_overflow_is_never_a_success() {
    let mut server = mockito::Server::new_async().await;
    let _stream = server
        .mock("GET", "/live.bin")
        .with_status(200)
        .with_chunked_body(|w| {
            for _ in 0..32 {
                w.write_all(&[9u8; 1024])?;
            }
            Ok(())
        })
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let target = DeliveryTarget::new(1);

    for limit in [1024, 16 * 1024, 32 * 1024 - 1] {
        let orch = orchestrator(dir.path(), Arc::new(StallingExtractor::default()), limit);
        let url = Url::parse(&format!("{}/live.bin", server.url())).unwrap();
        let request = orch.request(url);
        let outcome = orch.retrieve(&request, Requester::detached(&target)).await;

        assert_eq!(
            outcome.as_failure().map(|f| f.kind),
            Some(ErrorKind::SizeExceeded),
            "limit {limit}"
        );
    }
    assert!(entries(dir.path()).is_empty());
}

#[tokio::test]
async fn streamed_body_within_limit_succeeds() {
    let mut server = mockito::Server::new_async().await;
    let _stream = server
        .mock("GET", "/live.bin")
        .with_status(200)
        .with_chunked_body(|w| w.write_all(&[9u8; 2048]))
        .create_async()
        .await;

    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(dir.path(), Arc::new(StallingExtractor::default()), 2048);
    let target = DeliveryTarget::new(1);
    let url = Url::parse(&format!("{}/live.bin", server.url())).unwrap();
    let request = orch.request(url);

    let outcome = orch.retrieve(&request, Requester::detached(&target)).await;

    let RetrievalOutcome::Success(artifact) = outcome else {
        panic!("expected success, got {outcome:?}");
    };
    assert_eq!(artifact.size_bytes, 2048);
}

#[tokio::test]
async fn extractor_timeout_is_terminal_and_purges_partials() {
    let dir = tempfile::tempdir().unwrap();
    let extractor = Arc::new(StallingExtractor::default());
    let orch = orchestrator(dir.path(), extractor.clone(), 2000 * MIB);
    let target = DeliveryTarget::new(1);
    let request = orch.request(Url::parse("https://vimeo.com/123456").unwrap());

    let outcome = orch.retrieve(&request, Requester::detached(&target)).await;

    assert_eq!(
        outcome.as_failure().map(|f| f.kind),
        Some(ErrorKind::Timeout)
    );
    assert_eq!(extractor.fetches.load(Ordering::SeqCst), 1);
    let stem = request.file_stem();
    assert!(
        entries(dir.path()).iter().all(|name| !name.starts_with(&stem)),
        "leftovers: {:?}",
        entries(dir.path())
    );
}

#[tokio::test]
async fn repeated_sweeps_are_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    for name in ["keep.mp4", "a.mp4.part", "b.f137.mp4.part-Frag3", "c.ytdl", "d.tmp"] {
        std::fs::write(dir.path().join(name), b"x").unwrap();
    }
    let janitor = Janitor::new(ArtifactStore::new(dir.path()));

    janitor.purge_partial().await;
    janitor.purge_stale(Duration::from_secs(3600)).await;
    let once = entries(dir.path());

    let second_partial = janitor.purge_partial().await;
    let second_stale = janitor.purge_stale(Duration::from_secs(3600)).await;

    assert_eq!(entries(dir.path()), once);
    assert_eq!(once, vec!["keep.mp4".to_string()]);
    assert_eq!(second_partial.removed, 0);
    assert_eq!(second_stale.removed, 0);
}
