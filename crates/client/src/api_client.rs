//! HTTP API client with bearer-token authentication.

use async_trait::async_trait;
use chatsync_shared::{
    Conversation, FetchError, Message, NewConversation, SendMessageRequest, User,
};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::gateway::RequestGateway;

/// HTTP client for the chat REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credential: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            credential: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Attach `Authorization: Bearer <credential>` to every request
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential.filter(|c| !c.is_empty());
        self
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.credential {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn read_json<TRes: DeserializeOwned>(rb: RequestBuilder) -> Result<TRes, FetchError> {
        let resp = rb.send().await.map_err(|e| FetchError::Network(e.to_string()))?;

        let status = resp.status().as_u16();
        let is_success = resp.status().is_success();

        let text = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("failed to read body: {e}")))?;

        if !is_success {
            crate::log_warn!("API request failed with HTTP {}", status);
            return Err(FetchError::Http { status, body: text });
        }

        if text.is_empty() {
            serde_json::from_str("null").map_err(|e| FetchError::Deserialize(e.to_string()))
        } else {
            serde_json::from_str(&text).map_err(|e| FetchError::Deserialize(e.to_string()))
        }
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, FetchError> {
        let url = self.url(path);
        crate::log_debug!("GET {}", url);
        Self::read_json(self.authorize(self.client.get(&url))).await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, FetchError> {
        let url = self.url(path);
        crate::log_debug!("POST {}", url);
        let rb = self.authorize(self.client.post(&url)).json(body);
        Self::read_json(rb).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

fn chat_path(chat_id: &str, suffix: &str) -> String {
    format!("/chats/{}{}", urlencoding::encode(chat_id), suffix)
}

#[async_trait]
impl RequestGateway for ApiClient {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, FetchError> {
        self.get_json("/chats").await
    }

    async fn list_messages(&self, chat_id: &str) -> Result<Vec<Message>, FetchError> {
        self.get_json(&chat_path(chat_id, "/messages")).await
    }

    async fn post_message(&self, chat_id: &str, text: &str) -> Result<Message, FetchError> {
        let body = SendMessageRequest {
            text: text.to_string(),
        };
        self.post_json(&chat_path(chat_id, "/messages"), &body).await
    }

    async fn create_direct_conversation(
        &self,
        request: &NewConversation,
    ) -> Result<Conversation, FetchError> {
        self.post_json("/chats", request).await
    }

    async fn list_other_users(&self) -> Result<Vec<User>, FetchError> {
        self.get_json("/users/other-users").await
    }
}
