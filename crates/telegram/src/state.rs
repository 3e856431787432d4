use std::{sync::Arc, time::Duration};

use {linkfetch_config::LinkfetchConfig, teloxide::Bot};

use linkfetch_media::{DeliveryRouter, Orchestrator};

use crate::{error::Result, large_file::LargeFileBot, outbound::TelegramOutbound};

/// Everything the update handler needs, shared across in-flight requests.
pub struct BotState {
    pub bot: Bot,
    pub outbound: Arc<TelegramOutbound>,
    pub orchestrator: Arc<Orchestrator>,
    pub router: DeliveryRouter,
    /// Files older than this are swept before each request.
    pub stale_after: Duration,
}

impl BotState {
    pub fn new(
        bot: Bot,
        config: &LinkfetchConfig,
        orchestrator: Arc<Orchestrator>,
    ) -> Result<Self> {
        let outbound = Arc::new(TelegramOutbound::new(bot.clone()));
        let large_file = config
            .telegram
            .large_file_api_url
            .as_deref()
            .map(|url| {
                LargeFileBot::new(
                    url,
                    config.telegram.token.clone(),
                    Duration::from_secs(config.telegram.upload_timeout_secs),
                    config.network.bot_api_proxy(),
                )
            })
            .transpose()?
            .map(|bot| Arc::new(bot) as Arc<dyn linkfetch_channels::LargeFileOutbound>);

        let router = DeliveryRouter::from_config(
            config,
            Arc::clone(&outbound) as Arc<dyn linkfetch_channels::MediaOutbound>,
            large_file,
            orchestrator.janitor().clone(),
        );

        Ok(Self {
            bot,
            outbound,
            orchestrator,
            router,
            stale_after: Duration::from_secs(config.downloads.stale_after_secs),
        })
    }
}
