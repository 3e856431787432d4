use std::time::Duration;

use {
    async_trait::async_trait,
    linkfetch_common::PresentationKind,
    tracing::{info, warn},
};

use crate::{
    bridge::ExecutionBridge,
    error::ErrorKind,
    mime::classify_content_kind,
    request::{RetrievalOutcome, RetrievalRequest},
    strategy::{Requester, Strategy, bridge_failure},
};

/// Asks the messaging service to fetch the URL itself.
pub struct Passthrough {
    bridge: ExecutionBridge,
    deadline: Duration,
}

impl Passthrough {
    pub fn new(bridge: ExecutionBridge, deadline: Duration) -> Self {
        Self { bridge, deadline }
    }
}

#[async_trait]
impl Strategy for Passthrough {
    fn name(&self) -> &'static str {
        "passthrough"
    }

    fn performs_download(&self) -> bool {
        false
    }

    async fn attempt(
        &self,
        request: &RetrievalRequest,
        requester: Requester<'_>,
    ) -> RetrievalOutcome {
        let Some(outbound) = requester.outbound() else {
            return RetrievalOutcome::failure(
                ErrorKind::Unsupported,
                "direct send needs a messaging collaborator",
            );
        };

        requester.status("⏳ Trying direct send via Telegram...").await;
        let kind = PresentationKind::from(classify_content_kind(request.url.path(), None));
        let send = outbound.send_remote(
            requester.target(),
            request.url.as_str(),
            kind,
            kind.passthrough_caption(),
        );

        match self.bridge.run("passthrough", self.deadline, send).await {
            Ok(Ok(())) => {
                info!(request_id = %request.id, %kind, "delivered by direct send");
                RetrievalOutcome::Forwarded { kind }
            },
            Ok(Err(e)) => {
                warn!(request_id = %request.id, error = %e, "direct send rejected");
                RetrievalOutcome::failure(
                    ErrorKind::Unsupported,
                    format!("direct send rejected: {e}"),
                )
            },
            Err(e) => RetrievalOutcome::Failure(bridge_failure("direct send", &e)),
        }
    }
}
