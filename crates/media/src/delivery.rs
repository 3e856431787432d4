//! Hand a retrieved artifact to the messaging collaborator that can carry it.

use std::{path::Path, sync::Arc};

use {
    chrono::{DateTime, Local},
    linkfetch_channels::{LargeFileOutbound, LargeFileSession, MediaOutbound},
    linkfetch_common::{DeliveryTarget, PresentationKind},
    linkfetch_config::LinkfetchConfig,
    tracing::{info, warn},
};

use crate::{
    cleanup::Janitor,
    error::{ErrorKind, Failure},
    mime::classify_content_kind,
    request::{Artifact, RetrievalRequest},
};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// The regular, size-limited upload path.
    Inline,
    /// The secondary large-file protocol.
    LargeFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPlan {
    pub channel: Channel,
    pub kind: PresentationKind,
}

/// Pick channel and presentation for an artifact. Pure.
pub fn plan(
    artifact: &Artifact,
    inline_limit_bytes: u64,
    absolute_limit_bytes: u64,
) -> Result<DeliveryPlan, Failure> {
    if artifact.size_bytes > absolute_limit_bytes {
        return Err(Failure::new(
            ErrorKind::SizeExceeded,
            format!(
                "{:.2} MB is over the {:.0} MB upload ceiling",
                artifact.size_bytes as f64 / MB,
                absolute_limit_bytes as f64 / MB
            ),
        ));
    }

    let kind =
        classify_content_kind(&artifact.file_name(), Some(artifact.content_type.as_str())).into();
    let channel = if artifact.size_bytes > inline_limit_bytes {
        Channel::LargeFile
    } else {
        Channel::Inline
    };
    Ok(DeliveryPlan { channel, kind })
}

pub fn caption(kind: PresentationKind, size_bytes: u64, requested_at: DateTime<Local>) -> String {
    format!(
        "{}\n📦 Size: {:.2} MB\n🕐 {}",
        kind.caption_label(),
        size_bytes as f64 / MB,
        requested_at.format("%Y-%m-%d %H:%M:%S")
    )
}

pub struct DeliveryRouter {
    media: Arc<dyn MediaOutbound>,
    large_file: Option<Arc<dyn LargeFileOutbound>>,
    inline_limit_bytes: u64,
    absolute_limit_bytes: u64,
    janitor: Janitor,
}

impl DeliveryRouter {
    pub fn new(
        media: Arc<dyn MediaOutbound>,
        large_file: Option<Arc<dyn LargeFileOutbound>>,
        janitor: Janitor,
        inline_limit_bytes: u64,
        absolute_limit_bytes: u64,
    ) -> Self {
        Self {
            media,
            large_file,
            inline_limit_bytes,
            absolute_limit_bytes,
            janitor,
        }
    }

    pub fn from_config(
        config: &LinkfetchConfig,
        media: Arc<dyn MediaOutbound>,
        large_file: Option<Arc<dyn LargeFileOutbound>>,
        janitor: Janitor,
    ) -> Self {
        Self::new(
            media,
            large_file,
            janitor,
            config.delivery.inline_limit_bytes(),
            config.delivery.absolute_limit_bytes(),
        )
    }

    pub fn plan(&self, artifact: &Artifact) -> Result<DeliveryPlan, Failure> {
        plan(artifact, self.inline_limit_bytes, self.absolute_limit_bytes)
    }

    /// Transmit the artifact and delete it on success.
    ///
    /// On a transmission failure the file is left in place for the caller,
    /// which owns cleanup of failed requests. A ceiling rejection removes
    /// the file here since nothing was attempted.
    pub async fn deliver(
        &self,
        artifact: &Artifact,
        request: &RetrievalRequest,
        target: &DeliveryTarget,
    ) -> Result<DeliveryPlan, Failure> {
        let plan = match self.plan(artifact) {
            Ok(plan) => plan,
            Err(failure) => {
                self.janitor.remove_artifact(&artifact.path).await;
                return Err(failure);
            },
        };

        let size_mb = artifact.size_bytes as f64 / MB;
        let status = format!("✅ Download complete!\n📦 Size: {size_mb:.2} MB\n⏫ Uploading...");
        if let Err(e) = self.media.edit_status(target, &status).await {
            warn!(request_id = %request.id, error = %e, "status update failed");
        }

        let caption = caption(plan.kind, artifact.size_bytes, request.requested_at);
        self.transmit(plan, &artifact.path, target, &caption)
            .await
            .map_err(|e| Failure::new(ErrorKind::DeliveryFailed, e))?;

        info!(
            request_id = %request.id,
            channel = ?plan.channel,
            kind = %plan.kind,
            size_bytes = artifact.size_bytes,
            "artifact delivered"
        );
        self.janitor.remove_artifact(&artifact.path).await;
        Ok(plan)
    }

    async fn transmit(
        &self,
        plan: DeliveryPlan,
        path: &Path,
        target: &DeliveryTarget,
        caption: &str,
    ) -> Result<(), String> {
        match plan.channel {
            Channel::Inline => self
                .media
                .send_inline(target, path, plan.kind, caption)
                .await
                .map_err(|e| e.to_string()),
            Channel::LargeFile => {
                let Some(large_file) = self.large_file.as_deref() else {
                    return Err("no large-file upload server is configured".into());
                };
                let session = LargeFileSession::open(large_file)
                    .await
                    .map_err(|e| format!("large-file connect: {e}"))?;
                let sent = session.send(target, path, plan.kind, caption).await;
                if let Err(e) = session.close().await {
                    warn!(error = %e, "large-file disconnect failed");
                }
                sent.map_err(|e| e.to_string())
            },
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::store::ArtifactStore,
        async_trait::async_trait,
        linkfetch_channels::Result as ChannelResult,
        rstest::rstest,
        std::{
            path::PathBuf,
            sync::{
                Mutex,
                atomic::{AtomicBool, Ordering},
            },
        },
    };

    const MIB: u64 = 1024 * 1024;

    #[derive(Default)]
    struct Recorder {
        fail: bool,
        sent: Mutex<Vec<(&'static str, PresentationKind, String)>>,
        statuses: Mutex<Vec<String>>,
        connected: AtomicBool,
        disconnected: AtomicBool,
    }

    impl Recorder {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        fn record(&self, via: &'static str, kind: PresentationKind, caption: &str) -> ChannelResult<()> {
            if self.fail {
                return Err(linkfetch_channels::Error::rejected("file is too big"));
            }
            self.sent.lock().unwrap().push((via, kind, caption.to_string()));
            Ok(())
        }
    }

    #[async_trait]
    impl MediaOutbound for Recorder {
        async fn send_remote(
            &self,
            _target: &DeliveryTarget,
            _url: &str,
            kind: PresentationKind,
            caption: &str,
        ) -> ChannelResult<()> {
            self.record("remote", kind, caption)
        }

        async fn send_inline(
            &self,
            _target: &DeliveryTarget,
            _path: &Path,
            kind: PresentationKind,
            caption: &str,
        ) -> ChannelResult<()> {
            self.record("inline", kind, caption)
        }

        async fn edit_status(&self, _target: &DeliveryTarget, text: &str) -> ChannelResult<()> {
            self.statuses.lock().unwrap().push(text.to_string());
            Ok(())
        }

        async fn delete_status(&self, _target: &DeliveryTarget) -> ChannelResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl LargeFileOutbound for Recorder {
        async fn connect(&self) -> ChannelResult<bool> {
            self.connected.store(true, Ordering::SeqCst);
            Ok(true)
        }

        async fn disconnect(&self) -> ChannelResult<()> {
            self.disconnected.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn send_large_file(
            &self,
            _target: &DeliveryTarget,
            _path: &Path,
            kind: PresentationKind,
            caption: &str,
        ) -> ChannelResult<()> {
            self.record("large", kind, caption)
        }
    }

    fn artifact(path: PathBuf, content_type: &str, size_bytes: u64) -> Artifact {
        Artifact {
            path,
            content_type: content_type.into(),
            size_bytes,
        }
    }

    fn request() -> RetrievalRequest {
        RetrievalRequest::new(
            url::Url::parse("https://example.com/clip.mp4").unwrap(),
            2000 * MIB,
        )
    }

    #[rstest]
    #[case("clip.mp4", "video/mp4", MIB, Channel::Inline, PresentationKind::Video)]
    #[case("clip.mp4", "video/mp4", 120 * MIB, Channel::LargeFile, PresentationKind::Video)]
    #[case("a.gif", "image/gif", 3 * MIB, Channel::Inline, PresentationKind::Animation)]
    #[case("doc.pdf", "application/pdf", 50 * MIB, Channel::Inline, PresentationKind::Document)]
    #[case("doc.pdf", "application/pdf", 50 * MIB + 1, Channel::LargeFile, PresentationKind::Document)]
    fn plans_channel_and_kind(
        #[case] name: &str,
        #[case] content_type: &str,
        #[case] size: u64,
        #[case] channel: Channel,
        #[case] kind: PresentationKind,
    ) {
        let plan = plan(
            &artifact(PathBuf::from(name), content_type, size),
            50 * MIB,
            2000 * MIB,
        )
        .unwrap();
        assert_eq!(plan, DeliveryPlan { channel, kind });
    }

    #[test]
    fn absolute_ceiling_is_size_exceeded() {
        let failure = plan(
            &artifact(PathBuf::from("big.mp4"), "video/mp4", 2001 * MIB),
            50 * MIB,
            2000 * MIB,
        )
        .unwrap_err();
        assert_eq!(failure.kind, ErrorKind::SizeExceeded);
    }

    #[test]
    fn caption_has_label_size_and_timestamp() {
        let at = chrono::TimeZone::with_ymd_and_hms(&Local, 2024, 5, 1, 12, 30, 0).unwrap();
        let text = caption(PresentationKind::Video, 3 * MIB / 2, at);
        assert_eq!(
            text,
            "📹 Downloaded video\n📦 Size: 1.50 MB\n🕐 2024-05-01 12:30:00"
        );
    }

    fn router(
        dir: &Path,
        media: Arc<Recorder>,
        large_file: Option<Arc<Recorder>>,
    ) -> DeliveryRouter {
        DeliveryRouter::new(
            media,
            large_file.map(|l| l as Arc<dyn LargeFileOutbound>),
            Janitor::new(ArtifactStore::new(dir)),
            50 * MIB,
            2000 * MIB,
        )
    }

    #[tokio::test]
    async fn large_artifact_goes_through_session_and_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let file = std::fs::File::create(&path).unwrap();
        file.set_len(120 * MIB).unwrap();
        drop(file);

        let media = Arc::new(Recorder::default());
        let large = Arc::new(Recorder::default());
        let router = router(dir.path(), Arc::clone(&media), Some(Arc::clone(&large)));
        let target = DeliveryTarget::new(1);

        let plan = router
            .deliver(
                &artifact(path.clone(), "video/mp4", 120 * MIB),
                &request(),
                &target,
            )
            .await
            .unwrap();

        assert_eq!(plan.channel, Channel::LargeFile);
        assert_eq!(plan.kind, PresentationKind::Video);
        assert!(!path.exists());
        assert!(large.connected.load(Ordering::SeqCst));
        assert!(large.disconnected.load(Ordering::SeqCst));
        let sent = large.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].2.starts_with("📹 Downloaded video\n📦 Size: 120.00 MB"));
        assert!(media.sent.lock().unwrap().is_empty());
        assert!(media.statuses.lock().unwrap()[0].contains("⏫ Uploading"));
    }

    #[tokio::test]
    async fn failed_send_keeps_file_for_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        let router = router(dir.path(), Arc::new(Recorder::failing()), None);
        let failure = router
            .deliver(
                &artifact(path.clone(), "video/mp4", 4),
                &request(),
                &DeliveryTarget::new(1),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::DeliveryFailed);
        assert!(failure.message.contains("too big"));
        assert!(path.exists());
    }

    #[tokio::test]
    async fn large_artifact_without_server_is_delivery_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        std::fs::write(&path, b"data").unwrap();

        let router = router(dir.path(), Arc::new(Recorder::default()), None);
        let failure = router
            .deliver(
                &artifact(path, "video/mp4", 60 * MIB),
                &request(),
                &DeliveryTarget::new(1),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::DeliveryFailed);
    }

    #[tokio::test]
    async fn ceiling_rejection_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.mp4");
        std::fs::write(&path, b"data").unwrap();

        let router = router(dir.path(), Arc::new(Recorder::default()), None);
        let failure = router
            .deliver(
                &artifact(path.clone(), "video/mp4", 2100 * MIB),
                &request(),
                &DeliveryTarget::new(1),
            )
            .await
            .unwrap_err();

        assert_eq!(failure.kind, ErrorKind::SizeExceeded);
        assert!(!path.exists());
    }
}
