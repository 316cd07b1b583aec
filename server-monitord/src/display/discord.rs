use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use shared::protocol::BLANK;
use shared::types::{Embed, WatchKey};
use crate::config::DiscordConfig;
use super::{DisplayError, DisplayService};

/// A message as returned by the REST API. Snowflakes arrive as strings.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscordMessage {
    pub id: String,
    pub channel_id: String,
}

impl DiscordMessage {
    fn key(&self) -> Result<WatchKey, DisplayError> {
        let parse = |raw: &str| {
            raw.parse::<u64>()
                .map_err(|_| DisplayError::Other(format!("bad snowflake in response: {}", raw)))
        };
        Ok(WatchKey::new(parse(&self.channel_id)?, parse(&self.id)?))
    }
}

#[derive(Serialize)]
struct MessageBody<'a> {
    content: &'a str,
    embeds: [&'a Embed; 1],
}

/// Status displays as Discord messages, over the bot REST API.
pub struct DiscordDisplay {
    http: Client,
    api_base: String,
    token: String,
}

impl DiscordDisplay {
    pub fn new(config: &DiscordConfig) -> Self {
        Self {
            http: Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bot {}", self.token))
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, DisplayError> {
        let response = builder
            .send()
            .await
            .map_err(|e| DisplayError::Other(e.to_string()))?;

        match response.status() {
            status if status.is_success() => Ok(response),
            StatusCode::NOT_FOUND => Err(DisplayError::NotFound),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(DisplayError::Other(format!("HTTP {}: {}", status, body)))
            }
        }
    }

    async fn message(response: Response) -> Result<DiscordMessage, DisplayError> {
        response
            .json::<DiscordMessage>()
            .await
            .map_err(|e| DisplayError::Other(format!("unreadable message: {}", e)))
    }
}

#[async_trait]
impl DisplayService for DiscordDisplay {
    type Handle = DiscordMessage;

    async fn fetch_display(&self, key: WatchKey) -> Result<DiscordMessage, DisplayError> {
        let path = format!("/channels/{}/messages/{}", key.channel_id, key.message_id);
        let response = self.send(self.request(Method::GET, &path)).await?;
        Self::message(response).await
    }

    async fn edit_display(&self, handle: &DiscordMessage, content: &Embed) -> Result<(), DisplayError> {
        let path = format!("/channels/{}/messages/{}", handle.channel_id, handle.id);
        let body = MessageBody { content: BLANK, embeds: [content] };
        self.send(self.request(Method::PATCH, &path).json(&body)).await?;
        Ok(())
    }

    async fn create_display(
        &self,
        channel_id: u64,
        content: &Embed,
    ) -> Result<(WatchKey, DiscordMessage), DisplayError> {
        let path = format!("/channels/{}/messages", channel_id);
        let body = MessageBody { content: BLANK, embeds: [content] };
        let response = self.send(self.request(Method::POST, &path).json(&body)).await?;
        let message = Self::message(response).await?;
        Ok((message.key()?, message))
    }
}
