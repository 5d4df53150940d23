//! Outgoing Slack Web API calls.

use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("slack request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack API {method} returned error: {error}")]
    Api { method: &'static str, error: String },
    #[error("no bot token configured")]
    MissingToken,
}

/// The chat operations the bot performs.
#[async_trait::async_trait]
pub trait ChatClient: Send + Sync {
    async fn open_view(&self, trigger_id: &str, view: Value) -> Result<(), ChatError>;

    /// Replace an open view. `hash` guards against racing updates.
    async fn update_view(&self, view_id: &str, hash: Option<&str>, view: Value)
        -> Result<(), ChatError>;

    /// Open (or reuse) the DM channel with a user and return its id.
    async fn open_dm(&self, user_id: &str) -> Result<String, ChatError>;

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError>;

    /// Post Block Kit blocks; `text` is the notification fallback.
    async fn post_blocks(&self, channel: &str, text: &str, blocks: Value) -> Result<(), ChatError>;
}

#[derive(Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
    #[serde(default)]
    channel: Option<ApiChannel>,
}

#[derive(Deserialize)]
struct ApiChannel {
    id: String,
}

pub struct SlackWebClient {
    client: reqwest::Client,
    api_base: String,
    token: Option<String>,
}

impl SlackWebClient {
    pub fn new(api_base: &str, token: Option<String>) -> Self {
        if token.is_none() {
            tracing::warn!("SLACK_BOT_TOKEN is not set; chat calls will fail");
        }
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn call(&self, method: &'static str, body: Value) -> Result<ApiResponse, ChatError> {
        let token = self.token.as_deref().ok_or(ChatError::MissingToken)?;
        let url = format!("{}/{}", self.api_base, method);
        let response: ApiResponse = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        if !response.ok {
            return Err(ChatError::Api {
                method,
                error: response.error.unwrap_or_else(|| "unknown_error".into()),
            });
        }
        Ok(response)
    }
}

#[async_trait::async_trait]
impl ChatClient for SlackWebClient {
    async fn open_view(&self, trigger_id: &str, view: Value) -> Result<(), ChatError> {
        self.call("views.open", json!({ "trigger_id": trigger_id, "view": view }))
            .await?;
        Ok(())
    }

    async fn update_view(
        &self,
        view_id: &str,
        hash: Option<&str>,
        view: Value,
    ) -> Result<(), ChatError> {
        let mut body = json!({ "view_id": view_id, "view": view });
        if let Some(hash) = hash {
            body["hash"] = json!(hash);
        }
        self.call("views.update", body).await?;
        Ok(())
    }

    async fn open_dm(&self, user_id: &str) -> Result<String, ChatError> {
        let response = self
            .call("conversations.open", json!({ "users": user_id }))
            .await?;
        response.channel.map(|c| c.id).ok_or(ChatError::Api {
            method: "conversations.open",
            error: "missing channel".into(),
        })
    }

    async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        self.call("chat.postMessage", json!({ "channel": channel, "text": text }))
            .await?;
        Ok(())
    }

    async fn post_blocks(&self, channel: &str, text: &str, blocks: Value) -> Result<(), ChatError> {
        self.call(
            "chat.postMessage",
            json!({ "channel": channel, "text": text, "blocks": blocks }),
        )
        .await?;
        Ok(())
    }
}
