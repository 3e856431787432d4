use std::{sync::Arc, time::Duration};

use {
    linkfetch_config::LinkfetchConfig,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{error::Result, handlers, state::BotState};

/// Long-polling timeout passed to `getUpdates`, in seconds.
const POLL_TIMEOUT_SECS: u32 = 30;

/// HTTP client for Bot API calls, routed through `proxy` when one is set.
pub(crate) fn api_client(timeout: Duration, proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = teloxide::net::default_reqwest_settings().timeout(timeout);
    if let Some(proxy) = proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}

/// Build the public Bot API client and verify the token.
///
/// Any webhook is removed so long polling receives updates.
pub async fn connect(config: &LinkfetchConfig) -> anyhow::Result<Bot> {
    let proxy = config.network.bot_api_proxy();
    // Client timeout must outlast the long-poll timeout.
    let client = api_client(
        Duration::from_secs(u64::from(POLL_TIMEOUT_SECS) + 15),
        proxy,
    )?;
    let bot = Bot::with_client(config.telegram.token.expose_secret(), client);

    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;
    info!(
        username = ?me.username,
        proxied = proxy.is_some(),
        "telegram bot connected (webhook cleared)"
    );
    Ok(bot)
}

/// Start the polling loop.
///
/// Each message is handled on its own task so a slow download does not hold
/// up the next update. The loop stops when the returned token is cancelled,
/// or on its own when another instance polls with the same token.
pub fn start_polling(state: Arc<BotState>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let loop_cancel = cancel.clone();

    tokio::spawn(async move {
        info!("starting telegram polling loop");
        let bot = state.bot.clone();
        let mut offset: i32 = 0;

        loop {
            let result = tokio::select! {
                () = loop_cancel.cancelled() => {
                    info!("telegram polling stopped");
                    break;
                },
                result = bot
                    .get_updates()
                    .offset(offset)
                    .timeout(POLL_TIMEOUT_SECS)
                    .allowed_updates(vec![AllowedUpdate::Message])
                    .send() => result,
            };

            match result {
                Ok(updates) => {
                    debug!(count = updates.len(), "got telegram updates");
                    for update in updates {
                        offset = update.id.as_offset();
                        match update.kind {
                            UpdateKind::Message(msg) => {
                                debug!(chat_id = msg.chat.id.0, "received telegram message");
                                let state = Arc::clone(&state);
                                tokio::spawn(async move {
                                    if let Err(e) = handlers::handle_message(msg, state).await {
                                        error!(error = %e, "error handling telegram message");
                                    }
                                });
                            },
                            other => {
                                debug!("ignoring non-message update: {other:?}");
                            },
                        }
                    }
                },
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    warn!("telegram polling disabled: another instance is running with this token");
                    loop_cancel.cancel();
                    break;
                },
                Err(e) => {
                    warn!(error = %e, "telegram getUpdates failed");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                },
            }
        }
    });

    cancel
}
