//! Retrieval strategies.
//!
//! Each strategy turns a [`RetrievalRequest`] into a [`RetrievalOutcome`] and
//! never returns an error: every local failure is converted to a typed
//! [`Failure`](crate::Failure) before it leaves the strategy.

pub mod extractor;
pub mod http;
pub mod passthrough;

pub use {
    extractor::{ExtractorSettings, ExtractorStrategy, format_for_budget},
    http::{HttpSettings, HttpStrategy},
    passthrough::Passthrough,
};

use {
    async_trait::async_trait,
    linkfetch_channels::MediaOutbound,
    linkfetch_common::DeliveryTarget,
    tracing::debug,
};

use crate::{
    bridge::BridgeError,
    error::{ErrorKind, Failure},
    request::{RetrievalOutcome, RetrievalRequest},
};

/// Who asked for the request, and how to reach them while it runs.
#[derive(Clone, Copy)]
pub struct Requester<'a> {
    outbound: Option<&'a dyn MediaOutbound>,
    target: &'a DeliveryTarget,
}

impl<'a> Requester<'a> {
    pub fn new(outbound: &'a dyn MediaOutbound, target: &'a DeliveryTarget) -> Self {
        Self {
            outbound: Some(outbound),
            target,
        }
    }

    /// A requester with no messaging collaborator (command-line use).
    pub fn detached(target: &'a DeliveryTarget) -> Self {
        Self {
            outbound: None,
            target,
        }
    }

    pub fn outbound(&self) -> Option<&'a dyn MediaOutbound> {
        self.outbound
    }

    pub fn target(&self) -> &'a DeliveryTarget {
        self.target
    }

    /// Best-effort progress update.
    pub async fn status(&self, text: &str) {
        let Some(outbound) = self.outbound else {
            return;
        };
        if let Err(e) = outbound.edit_status(self.target, text).await {
            debug!(error = %e, "status update failed");
        }
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this strategy writes a local file.
    fn performs_download(&self) -> bool;

    async fn attempt(&self, request: &RetrievalRequest, requester: Requester<'_>)
    -> RetrievalOutcome;
}

/// Convert a bridge error into a failure for the step named `what`.
pub(crate) fn bridge_failure(what: &str, error: &BridgeError) -> Failure {
    match error {
        BridgeError::Timeout { deadline, .. } => Failure::new(
            ErrorKind::Timeout,
            format!("{what} took longer than {}s", deadline.as_secs()),
        ),
        BridgeError::Closed | BridgeError::Panicked { .. } => {
            Failure::new(ErrorKind::StorageFailed, format!("{what} aborted: {error}"))
        },
    }
}
