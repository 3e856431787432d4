use std::sync::Arc;

use {
    teloxide::prelude::*,
    tracing::{debug, info, warn},
    url::Url,
};

use {
    linkfetch_channels::MediaOutbound,
    linkfetch_common::{DeliveryTarget, parse_request_url},
    linkfetch_media::{Failure, Requester, RetrievalOutcome},
};

use crate::{outbound::reply_text, state::BotState};

pub const USAGE_HINT: &str = "🔗 Send me a link starting with http:// or https:// and I will \
                              fetch the video, GIF or file behind it.";

const PROCESSING: &str = "🔄 Processing your link...";

/// The URL a message asks for, if it is one.
pub fn candidate_url(text: &str) -> Option<Url> {
    parse_request_url(text).ok()
}

/// Run one inbound message through retrieval and delivery.
pub async fn handle_message(msg: Message, state: Arc<BotState>) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        debug!(chat_id = msg.chat.id.0, "ignoring non-text message");
        return Ok(());
    };
    let target = DeliveryTarget::new(msg.chat.id.0).with_reply_to(msg.id.0);

    let Some(url) = candidate_url(text) else {
        debug!(chat_id = target.chat_id, "message is not a link");
        reply_text(&state.bot, &target, USAGE_HINT).await?;
        return Ok(());
    };

    state
        .orchestrator
        .janitor()
        .purge_stale(state.stale_after)
        .await;

    let status = reply_text(&state.bot, &target, PROCESSING).await?;
    let target = target.with_status_message(status.id.0);
    let request = state.orchestrator.request(url);
    info!(
        chat_id = target.chat_id,
        request_id = %request.id,
        url = %request.url,
        "link received"
    );

    let outbound: &dyn MediaOutbound = state.outbound.as_ref();
    let outcome = state
        .orchestrator
        .retrieve(&request, Requester::new(outbound, &target))
        .await;

    let failure: Option<Failure> = match outcome {
        RetrievalOutcome::Success(artifact) => {
            match state.router.deliver(&artifact, &request, &target).await {
                Ok(_) => None,
                Err(failure) => {
                    state
                        .orchestrator
                        .janitor()
                        .remove_artifact(&artifact.path)
                        .await;
                    Some(failure)
                },
            }
        },
        RetrievalOutcome::Forwarded { .. } => None,
        RetrievalOutcome::Failure(failure) => Some(failure),
    };

    match failure {
        None => {
            if let Err(e) = state.outbound.delete_status(&target).await {
                warn!(request_id = %request.id, error = %e, "failed to remove status message");
            }
        },
        Some(failure) => {
            let failure = state.orchestrator.redact(failure);
            info!(
                request_id = %request.id,
                kind = %failure.kind,
                "request failed"
            );
            if let Err(e) = state
                .outbound
                .edit_status(&target, &failure.user_message())
                .await
            {
                warn!(request_id = %request.id, error = %e, "failed to report failure");
            }
        },
    }
    Ok(())
}
