use std::path::Path;

use {
    async_trait::async_trait,
    linkfetch_common::{DeliveryTarget, PresentationKind},
};

use crate::Result;

/// Primary messaging collaborator.
///
/// Implementations must render the three presentation kinds distinctly
/// (video player, looping animation, plain document).
#[async_trait]
pub trait MediaOutbound: Send + Sync {
    /// Ask the platform to fetch `url` itself; nothing is downloaded locally.
    async fn send_remote(
        &self,
        target: &DeliveryTarget,
        url: &str,
        kind: PresentationKind,
        caption: &str,
    ) -> Result<()>;

    /// Upload a local file through the regular (size-limited) channel.
    async fn send_inline(
        &self,
        target: &DeliveryTarget,
        path: &Path,
        kind: PresentationKind,
        caption: &str,
    ) -> Result<()>;

    /// Replace the text of the request's status message.
    async fn edit_status(&self, target: &DeliveryTarget, text: &str) -> Result<()>;

    /// Remove the request's status message.
    async fn delete_status(&self, target: &DeliveryTarget) -> Result<()>;
}

/// Secondary protocol for uploads above the inline limit.
///
/// Calls must be bracketed by [`connect`](Self::connect) and
/// [`disconnect`](Self::disconnect); [`LargeFileSession`] does this for a
/// single burst.
#[async_trait]
pub trait LargeFileOutbound: Send + Sync {
    /// Open the connection. Returns `true` when this call opened it and
    /// `false` when an existing connection was reused.
    async fn connect(&self) -> Result<bool>;

    /// Close the connection.
    async fn disconnect(&self) -> Result<()>;

    async fn send_large_file(
        &self,
        target: &DeliveryTarget,
        path: &Path,
        kind: PresentationKind,
        caption: &str,
    ) -> Result<()>;
}

/// Scoped acquisition of a [`LargeFileOutbound`] connection.
///
/// Only a session that opened the connection closes it again, so a burst
/// running inside an already-open connection leaves it open.
pub struct LargeFileSession<'a> {
    outbound: &'a dyn LargeFileOutbound,
    opened: bool,
}

impl<'a> LargeFileSession<'a> {
    pub async fn open(outbound: &'a dyn LargeFileOutbound) -> Result<Self> {
        let opened = outbound.connect().await?;
        Ok(Self { outbound, opened })
    }

    pub async fn send(
        &self,
        target: &DeliveryTarget,
        path: &Path,
        kind: PresentationKind,
        caption: &str,
    ) -> Result<()> {
        self.outbound
            .send_large_file(target, path, kind, caption)
            .await
    }

    /// End the burst. Must be awaited; there is no async drop.
    pub async fn close(self) -> Result<()> {
        if self.opened {
            self.outbound.disconnect().await?;
        }
        Ok(())
    }
}
