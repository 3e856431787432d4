//! Uploads above the public Bot API limit go through a self-hosted Bot API
//! server, which accepts files up to 2 GB.

use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    teloxide::{prelude::*, types::InputFile},
    tokio::sync::Mutex,
    tracing::{info, warn},
    url::Url,
};

use {
    linkfetch_channels::{Error as ChannelError, LargeFileOutbound, Result as ChannelResult},
    linkfetch_common::{DeliveryTarget, PresentationKind},
};

use crate::{
    bot::api_client,
    error::{Error, Result},
    outbound::{channel_error, send_media},
};

pub struct LargeFileBot {
    api_url: Url,
    token: Secret<String>,
    upload_timeout: Duration,
    proxy: Option<Secret<String>>,
    connection: Mutex<Option<Bot>>,
}

impl LargeFileBot {
    pub fn new(
        api_url: &str,
        token: Secret<String>,
        upload_timeout: Duration,
        proxy: Option<&str>,
    ) -> Result<Self> {
        let api_url = Url::parse(api_url).map_err(|source| Error::ApiUrl {
            url: api_url.to_string(),
            source,
        })?;
        Ok(Self {
            api_url,
            token,
            upload_timeout,
            proxy: proxy.map(|p| Secret::new(p.to_string())),
            connection: Mutex::new(None),
        })
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    fn build_bot(&self) -> Result<Bot> {
        let proxy = self.proxy.as_ref().map(|p| p.expose_secret().as_str());
        let client = api_client(self.upload_timeout, proxy)?;
        Ok(Bot::with_client(self.token.expose_secret(), client).set_api_url(self.api_url.clone()))
    }
}

#[async_trait]
impl LargeFileOutbound for LargeFileBot {
    async fn connect(&self) -> ChannelResult<bool> {
        let mut connection = self.connection.lock().await;
        if connection.is_some() {
            return Ok(false);
        }

        let bot = self
            .build_bot()
            .map_err(|e| ChannelError::external("large-file client", e))?;
        let me = bot.get_me().await.map_err(|e| {
            warn!(api_url = %self.api_url, error = %e, "large-file server unreachable");
            ChannelError::unavailable(format!("large-file server: {e}"))
        })?;
        info!(
            api_url = %self.api_url,
            username = ?me.username,
            "large-file server connected"
        );
        *connection = Some(bot);
        Ok(true)
    }

    async fn disconnect(&self) -> ChannelResult<()> {
        if self.connection.lock().await.take().is_some() {
            info!(api_url = %self.api_url, "large-file server disconnected");
        }
        Ok(())
    }

    async fn send_large_file(
        &self,
        target: &DeliveryTarget,
        path: &Path,
        kind: PresentationKind,
        caption: &str,
    ) -> ChannelResult<()> {
        let Some(bot) = self.connection.lock().await.clone() else {
            return Err(ChannelError::unavailable("large-file server is not connected"));
        };
        send_media(&bot, target, InputFile::file(path), kind, caption)
            .await
            .map_err(|e| channel_error("large-file upload", e))?;
        info!(
            chat_id = target.chat_id,
            %kind,
            path = %path.display(),
            "large file uploaded"
        );
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, linkfetch_channels::LargeFileSession, mockito::Matcher};

    const GET_ME: &str = r#"{"ok":true,"result":{"id":7,"is_bot":true,"first_name":"fetch","username":"fetch_bot","can_join_groups":false,"can_read_all_group_messages":false,"supports_inline_queries":false,"can_connect_to_business":false,"has_main_web_app":false}}"#;

    fn get_me_path() -> Matcher {
        Matcher::Regex(r"(?i)^/bot[^/]+/getme$".into())
    }

    fn large_file(url: &str) -> LargeFileBot {
        LargeFileBot::new(url, Secret::new("1:test".into()), Duration::from_secs(5), None).unwrap()
    }

    #[test]
    fn rejects_malformed_api_url() {
        let err = LargeFileBot::new(
            "not a url",
            Secret::new("1:t".into()),
            Duration::from_secs(1),
            None,
        )
        .err()
        .unwrap();
        assert!(matches!(err, Error::ApiUrl { .. }));
    }

    #[tokio::test]
    async fn connect_goes_through_configured_proxy() {
        let mut proxy = mockito::Server::new_async().await;
        let get_me = proxy
            .mock("POST", get_me_path())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(GET_ME)
            .expect(1)
            .create_async()
            .await;

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let unreachable = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let proxy_url = proxy.url();
        let outbound = LargeFileBot::new(
            &unreachable,
            Secret::new("1:test".into()),
            Duration::from_secs(5),
            Some(&proxy_url),
        )
        .unwrap();
        assert!(outbound.connect().await.unwrap());
        get_me.assert_async().await;
    }

    #[tokio::test]
    async fn connect_reuses_open_connection() {
        let mut server = mockito::Server::new_async().await;
        let get_me = server
            .mock("POST", get_me_path())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(GET_ME)
            .expect(1)
            .create_async()
            .await;

        let outbound = large_file(&server.url());
        assert!(outbound.connect().await.unwrap());
        assert!(!outbound.connect().await.unwrap());
        assert!(outbound.is_connected().await);
        get_me.assert_async().await;
    }

    #[tokio::test]
    async fn session_disconnects_what_it_opened() {
        let mut server = mockito::Server::new_async().await;
        let _get_me = server
            .mock("POST", get_me_path())
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(GET_ME)
            .create_async()
            .await;

        let outbound = large_file(&server.url());
        let session = LargeFileSession::open(&outbound).await.unwrap();
        session.close().await.unwrap();
        assert!(!outbound.is_connected().await);
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        let mut server = mockito::Server::new_async().await;
        let _get_me = server
            .mock("POST", get_me_path())
            .with_status(401)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
            .create_async()
            .await;

        let outbound = large_file(&server.url());
        let err = outbound.connect().await.unwrap_err();
        assert!(matches!(err, ChannelError::Unavailable { .. }));
        assert!(!outbound.is_connected().await);
    }

    #[tokio::test]
    async fn upload_requires_connection() {
        let outbound = large_file("http://127.0.0.1:9");
        let err = outbound
            .send_large_file(
                &DeliveryTarget::new(1),
                Path::new("clip.mp4"),
                PresentationKind::Video,
                "",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Unavailable { .. }));
    }
}
