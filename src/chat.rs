use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::auth::{AuthError, TokenCache};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("failed to obtain access token: {0}")]
    Auth(#[from] AuthError),
    #[error("send request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("chat API returned {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
}

/// A chat message addressed to a user on behalf of a robot.
/// Serializes to the exact body the Zoom chat API expects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to_jid: String,
    pub message: String,
    pub robot_jid: String,
}

/// Anything that can deliver an [`OutboundMessage`].
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Deliver once. Returns the remote receipt.
    async fn send(&self, message: &OutboundMessage) -> Result<serde_json::Value, DeliveryError>;
}

/// Zoom chatbot message client, authenticated through the shared [`TokenCache`].
pub struct ChatClient {
    client: reqwest::Client,
    tokens: Arc<TokenCache>,
    api_base_url: String,
}

impl ChatClient {
    pub fn new(client: reqwest::Client, tokens: Arc<TokenCache>, api_base_url: String) -> Self {
        Self {
            client,
            tokens,
            api_base_url,
        }
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<serde_json::Value, DeliveryError> {
        let token = self.tokens.get_token().await?;
        let url = format!("{}/im/chat/messages", self.api_base_url);

        debug!("Sending chat message to {} via {}", message.to_jid, url);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", token))
            .header("Content-Type", "application/json")
            .json(message)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(DeliveryError::Status { status, body });
        }

        if body.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(serde_json::Value::String(body)))
    }
}

#[async_trait]
impl MessageSender for ChatClient {
    async fn send(&self, message: &OutboundMessage) -> Result<serde_json::Value, DeliveryError> {
        match self.deliver(message).await {
            Ok(receipt) => {
                info!("Message sent to {}: {}", message.to_jid, message.message);
                Ok(receipt)
            }
            Err(e) => {
                error!("Failed to send message: {}", e);
                if let DeliveryError::Status { body, .. } = &e {
                    error!("Error details: {}", body);
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records every message instead of sending it.
    #[derive(Default)]
    pub struct RecordingSender {
        sent: Mutex<Vec<OutboundMessage>>,
        fail: bool,
    }

    impl RecordingSender {
        pub fn failing() -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn sent(&self) -> Vec<OutboundMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MessageSender for RecordingSender {
        async fn send(
            &self,
            message: &OutboundMessage,
        ) -> Result<serde_json::Value, DeliveryError> {
            self.sent.lock().unwrap().push(message.clone());
            if self.fail {
                return Err(DeliveryError::Status {
                    status: reqwest::StatusCode::BAD_REQUEST,
                    body: r#"{"code":124,"message":"Invalid access token."}"#.to_string(),
                });
            }
            Ok(serde_json::json!({ "message_id": "msg-1" }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZoomConfig;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, account_id: Option<&str>) -> ChatClient {
        let config = ZoomConfig {
            client_id: Some("cid".to_string()),
            client_secret: Some("secret".to_string()),
            account_id: account_id.map(str::to_string),
            oauth_url: format!("{}/oauth/token", server.uri()),
            api_base_url: format!("{}/v2", server.uri()),
            ..ZoomConfig::default()
        };
        let http = reqwest::Client::new();
        let tokens = Arc::new(TokenCache::new(http.clone(), config.clone()));
        ChatClient::new(http, tokens, config.api_base_url)
    }

    async fn mount_token(server: &MockServer, expected: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "tok-1",
                "expires_in": 3600
            })))
            .expect(expected)
            .mount(server)
            .await;
    }

    fn message() -> OutboundMessage {
        OutboundMessage {
            to_jid: "user@xmpp.zoom.us".to_string(),
            message: "hello".to_string(),
            robot_jid: "bot@xmpp.zoom.us".to_string(),
        }
    }

    #[tokio::test]
    async fn test_send_posts_bearer_and_body() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/im/chat/messages"))
            .and(header("Authorization", "Bearer tok-1"))
            .and(body_json(serde_json::json!({
                "to_jid": "user@xmpp.zoom.us",
                "message": "hello",
                "robot_jid": "bot@xmpp.zoom.us"
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "m-42" })),
            )
            .expect(2)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("acct"));
        let receipt = client.send(&message()).await.unwrap();
        assert_eq!(receipt["id"], "m-42");

        // Second send reuses the cached token.
        client.send(&message()).await.unwrap();
    }

    #[tokio::test]
    async fn test_remote_error_carries_body() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/im/chat/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "code": 7001,
                "message": "Invalid robot_jid"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server, Some("acct"));
        match client.send(&message()).await.unwrap_err() {
            DeliveryError::Status { status, body } => {
                assert_eq!(status, reqwest::StatusCode::BAD_REQUEST);
                assert!(body.contains("Invalid robot_jid"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_token_failure_is_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/im/chat/messages"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(&server, None);
        let err = client.send(&message()).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::Auth(AuthError::MissingCredential("account_id"))
        ));
        assert!(err.to_string().contains("account_id"));
    }

    #[tokio::test]
    async fn test_empty_receipt_is_null() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/v2/im/chat/messages"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server, Some("acct"));
        assert_eq!(client.send(&message()).await.unwrap(), serde_json::Value::Null);
    }
}
