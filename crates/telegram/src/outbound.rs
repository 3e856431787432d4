use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    teloxide::{
        ApiError, RequestError,
        payloads::{
            SendAnimationSetters, SendDocumentSetters, SendMessageSetters, SendVideoSetters,
        },
        prelude::*,
        types::{ChatId, InputFile, MessageId, ReplyParameters},
    },
    tracing::{debug, info, warn},
    url::Url,
};

use {
    linkfetch_channels::{Error as ChannelError, MediaOutbound, Result as ChannelResult},
    linkfetch_common::{DeliveryTarget, PresentationKind},
};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Primary messaging collaborator backed by the public Bot API.
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MediaOutbound for TelegramOutbound {
    async fn send_remote(
        &self,
        target: &DeliveryTarget,
        url: &str,
        kind: PresentationKind,
        caption: &str,
    ) -> ChannelResult<()> {
        let url = Url::parse(url).map_err(ChannelError::invalid_input)?;
        send_media(&self.bot, target, InputFile::url(url), kind, caption)
            .await
            .map_err(|e| channel_error("send remote media", e))?;
        info!(chat_id = target.chat_id, %kind, "remote media sent");
        Ok(())
    }

    async fn send_inline(
        &self,
        target: &DeliveryTarget,
        path: &Path,
        kind: PresentationKind,
        caption: &str,
    ) -> ChannelResult<()> {
        send_media(&self.bot, target, InputFile::file(path), kind, caption)
            .await
            .map_err(|e| channel_error("upload media", e))?;
        info!(
            chat_id = target.chat_id,
            %kind,
            path = %path.display(),
            "media uploaded"
        );
        Ok(())
    }

    async fn edit_status(&self, target: &DeliveryTarget, text: &str) -> ChannelResult<()> {
        let Some(message_id) = target.status_message_id else {
            return Ok(());
        };
        let chat_id = ChatId(target.chat_id);
        let edited = with_retry("edit status", chat_id, || {
            let req = self
                .bot
                .edit_message_text(chat_id, MessageId(message_id), text);
            async move { req.await }
        })
        .await;

        match edited {
            Ok(_) => Ok(()),
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(channel_error("edit status", e)),
        }
    }

    async fn delete_status(&self, target: &DeliveryTarget) -> ChannelResult<()> {
        let Some(message_id) = target.status_message_id else {
            return Ok(());
        };
        let chat_id = ChatId(target.chat_id);
        with_retry("delete status", chat_id, || {
            let req = self.bot.delete_message(chat_id, MessageId(message_id));
            async move { req.await }
        })
        .await
        .map_err(|e| channel_error("delete status", e))?;
        Ok(())
    }
}

/// Post a plain text reply to the requester's message.
pub(crate) async fn reply_text(
    bot: &Bot,
    target: &DeliveryTarget,
    text: &str,
) -> Result<Message, RequestError> {
    let chat_id = ChatId(target.chat_id);
    let reply = reply_params(target);
    with_retry("send message", chat_id, || {
        let mut req = bot.send_message(chat_id, text);
        if let Some(rp) = &reply {
            req = req.reply_parameters(rp.clone());
        }
        async move { req.await }
    })
    .await
}

/// Send one file with the call matching its presentation kind.
pub(crate) async fn send_media(
    bot: &Bot,
    target: &DeliveryTarget,
    input: InputFile,
    kind: PresentationKind,
    caption: &str,
) -> Result<(), RequestError> {
    let chat_id = ChatId(target.chat_id);
    let reply = reply_params(target);
    match kind {
        PresentationKind::Video => with_retry("send video", chat_id, || {
            let mut req = bot
                .send_video(chat_id, input.clone())
                .caption(caption)
                .supports_streaming(true);
            if let Some(rp) = &reply {
                req = req.reply_parameters(rp.clone());
            }
            async move { req.await }
        })
        .await
        .map(drop),
        PresentationKind::Animation => with_retry("send animation", chat_id, || {
            let mut req = bot.send_animation(chat_id, input.clone()).caption(caption);
            if let Some(rp) = &reply {
                req = req.reply_parameters(rp.clone());
            }
            async move { req.await }
        })
        .await
        .map(drop),
        PresentationKind::Document => with_retry("send document", chat_id, || {
            let mut req = bot.send_document(chat_id, input.clone()).caption(caption);
            if let Some(rp) = &reply {
                req = req.reply_parameters(rp.clone());
            }
            async move { req.await }
        })
        .await
        .map(drop),
    }
}

/// Retry a request while Telegram answers with `RetryAfter`.
pub(crate) async fn with_retry<T, F, Fut>(
    operation: &'static str,
    chat_id: ChatId,
    mut request: F,
) -> Result<T, RequestError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    let mut retries = 0usize;

    loop {
        match request().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                let Some(wait) = retry_after_duration(&err) else {
                    return Err(err);
                };

                if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                    warn!(
                        chat_id = chat_id.0,
                        operation,
                        retries,
                        max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limit persisted after retries"
                    );
                    return Err(err);
                }

                retries += 1;
                warn!(
                    chat_id = chat_id.0,
                    operation,
                    retries,
                    max_retries = TELEGRAM_RETRY_AFTER_MAX_RETRIES,
                    retry_after_secs = wait.as_secs(),
                    "telegram rate limited, waiting before retry"
                );
                tokio::time::sleep(wait).await;
            },
        }
    }
}

/// Replies thread onto the message that carried the URL.
fn reply_params(target: &DeliveryTarget) -> Option<ReplyParameters> {
    target
        .reply_to
        .map(|id| ReplyParameters::new(MessageId(id)).allow_sending_without_reply())
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Map a Bot API error onto the collaborator error taxonomy.
pub(crate) fn channel_error(operation: &'static str, error: RequestError) -> ChannelError {
    debug!(operation, error = %error, "telegram request failed");
    match error {
        RequestError::Api(api) => ChannelError::rejected(format!("{operation}: {api}")),
        RequestError::Network(e) => ChannelError::unavailable(format!("{operation}: {e}")),
        RequestError::Io(e) => ChannelError::Io(e),
        other => ChannelError::external(operation, other),
    }
}
