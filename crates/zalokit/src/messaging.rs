//! Messaging operations
//!
//! Sending text, media references, templates, and broadcasts. Media is
//! sent by URL or by a previously uploaded attachment id / file token;
//! the upload endpoints themselves are not part of this SDK.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::api::{ApiRequest, BatchDispatcher, BatchResult, RequestExecutor};
use crate::error::{Error, Result};
use crate::utils::{sanitize_message, MAX_MESSAGE_LENGTH};

const SEND_TEXT: &str = "/v3.0/oa/message/text";
const SEND_ATTACHMENT: &str = "/v3.0/oa/message/attachment";
const MESSAGE_STATUS: &str = "/v3.0/oa/message/status";

/// Acknowledgement for a sent message
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageReceipt {
    /// Platform-assigned message id, when reported
    #[serde(default)]
    pub message_id: Option<String>,
}

/// Image message source
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Publicly reachable image URL
    Url(String),
    /// Attachment id from a previous upload
    AttachmentId(String),
}

/// Link preview payload for [`MessagingApi::send_link`]
#[derive(Debug, Clone)]
pub struct LinkPreview {
    /// Target URL
    pub url: String,
    /// Optional thumbnail image URL
    pub thumbnail_url: Option<String>,
}

impl LinkPreview {
    /// Create a preview for a URL
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), thumbnail_url: None }
    }

    /// Attach a thumbnail
    #[must_use]
    pub fn with_thumbnail(mut self, thumbnail_url: impl Into<String>) -> Self {
        self.thumbnail_url = Some(thumbnail_url.into());
        self
    }
}

/// Messaging endpoints
pub struct MessagingApi {
    executor: Arc<RequestExecutor>,
    dispatcher: BatchDispatcher,
}

impl MessagingApi {
    /// Create the messaging API surface
    #[must_use]
    pub fn new(executor: Arc<RequestExecutor>, dispatcher: BatchDispatcher) -> Self {
        Self { executor, dispatcher }
    }

    /// Send a text message
    ///
    /// # Errors
    /// [`Error::Validation`] for empty recipient or text; otherwise the
    /// executor's classification
    pub async fn send_text(
        &self,
        recipient_id: &str,
        text: &str,
        quote_message_id: Option<&str>,
    ) -> Result<MessageReceipt> {
        require_non_empty(recipient_id, "recipient_id")?;
        require_non_empty(text, "text")?;

        let text = sanitize_message(text, MAX_MESSAGE_LENGTH);

        let mut message = json!({ "text": text });
        if let Some(quoted) = quote_message_id {
            message["quote_message_id"] = json!(quoted);
        }

        let payload = json!({
            "recipient": { "user_id": recipient_id },
            "message": message,
        });

        let response =
            self.executor.execute(ApiRequest::post(SEND_TEXT).with_body(payload)).await?;
        response.data_as()
    }

    /// Send an image by URL or previously uploaded attachment id
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn send_image(
        &self,
        recipient_id: &str,
        source: ImageSource,
    ) -> Result<MessageReceipt> {
        require_non_empty(recipient_id, "recipient_id")?;

        let attachment = match source {
            ImageSource::Url(url) => {
                require_non_empty(&url, "image url")?;
                json!({ "type": "image", "payload": { "url": url } })
            }
            ImageSource::AttachmentId(attachment_id) => {
                require_non_empty(&attachment_id, "attachment_id")?;
                json!({
                    "type": "template",
                    "payload": {
                        "template_type": "media",
                        "elements": [
                            { "media_type": "image", "attachment_id": attachment_id },
                        ],
                    },
                })
            }
        };

        self.send_attachment(recipient_id, attachment).await
    }

    /// Send a file by its upload token
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn send_file(&self, recipient_id: &str, file_token: &str) -> Result<MessageReceipt> {
        require_non_empty(recipient_id, "recipient_id")?;
        require_non_empty(file_token, "file_token")?;

        let attachment = json!({ "type": "file", "payload": { "token": file_token } });
        self.send_attachment(recipient_id, attachment).await
    }

    /// Send a sticker by id
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn send_sticker(
        &self,
        recipient_id: &str,
        sticker_id: &str,
    ) -> Result<MessageReceipt> {
        require_non_empty(recipient_id, "recipient_id")?;
        require_non_empty(sticker_id, "sticker_id")?;

        let attachment = json!({
            "type": "template",
            "payload": {
                "template_type": "media",
                "elements": [
                    { "media_type": "sticker", "attachment_id": sticker_id },
                ],
            },
        });
        self.send_attachment(recipient_id, attachment).await
    }

    /// Send a link with preview
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn send_link(&self, recipient_id: &str, link: LinkPreview) -> Result<MessageReceipt> {
        require_non_empty(recipient_id, "recipient_id")?;
        require_non_empty(&link.url, "url")?;

        let mut element = json!({
            "type": "banner",
            "default_action": { "type": "oa.open.url", "url": link.url },
        });
        if let Some(thumbnail) = link.thumbnail_url {
            element["image_url"] = json!(thumbnail);
        }

        let attachment = json!({
            "type": "template",
            "payload": { "template_type": "list", "elements": [element] },
        });
        self.send_attachment(recipient_id, attachment).await
    }

    /// Send a custom template payload
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty recipient; otherwise the
    /// executor's classification
    pub async fn send_template(
        &self,
        recipient_id: &str,
        template: serde_json::Value,
    ) -> Result<MessageReceipt> {
        require_non_empty(recipient_id, "recipient_id")?;

        let attachment = json!({ "type": "template", "payload": template });
        self.send_attachment(recipient_id, attachment).await
    }

    /// Send a message with interactive buttons
    ///
    /// # Errors
    /// [`Error::Validation`] for empty inputs; otherwise the executor's
    /// classification
    pub async fn send_buttons(
        &self,
        recipient_id: &str,
        text: &str,
        buttons: Vec<serde_json::Value>,
    ) -> Result<MessageReceipt> {
        require_non_empty(text, "text")?;

        let template = json!({
            "template_type": "button",
            "text": sanitize_message(text, MAX_MESSAGE_LENGTH),
            "buttons": buttons,
        });
        self.send_template(recipient_id, template).await
    }

    /// Get the delivery status of a message
    ///
    /// # Errors
    /// [`Error::Validation`] for an empty id; otherwise the executor's
    /// classification
    pub async fn message_status(&self, message_id: &str) -> Result<serde_json::Value> {
        require_non_empty(message_id, "message_id")?;

        let response = self
            .executor
            .execute(ApiRequest::get(MESSAGE_STATUS).with_query("message_id", message_id))
            .await?;
        Ok(response.data)
    }

    /// Broadcast a text message to many recipients
    ///
    /// Per-recipient failures are captured in the returned [`BatchResult`]
    /// instead of aborting the batch; outcome order matches `recipient_ids`.
    ///
    /// # Errors
    /// [`Error::Validation`] when the text is empty (nothing is sent)
    pub async fn broadcast_text(
        &self,
        recipient_ids: &[String],
        text: &str,
    ) -> Result<BatchResult> {
        require_non_empty(text, "text")?;
        let text = sanitize_message(text, MAX_MESSAGE_LENGTH);
        let text = text.as_str();

        Ok(self
            .dispatcher
            .dispatch(recipient_ids, |recipient_id| async move {
                let receipt = self.send_text(&recipient_id, text, None).await?;
                Ok(receipt.message_id)
            })
            .await)
    }

    async fn send_attachment(
        &self,
        recipient_id: &str,
        attachment: serde_json::Value,
    ) -> Result<MessageReceipt> {
        let payload = json!({
            "recipient": { "user_id": recipient_id },
            "message": { "attachment": attachment },
        });

        let response =
            self.executor.execute(ApiRequest::post(SEND_ATTACHMENT).with_body(payload)).await?;
        response.data_as()
    }
}

fn require_non_empty(value: &str, field: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::Validation(format!("{field} is required")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::api::BatchDispatcher;
    use crate::auth::TokenManager;
    use crate::config::AppConfig;
    use crate::testing::MockOAuthApi;

    async fn messaging_for(server: &MockServer) -> MessagingApi {
        let config = AppConfig::new("test-app", "test-secret")
            .unwrap()
            .with_api_base_url(server.uri());

        let tokens = Arc::new(TokenManager::new(Arc::new(MockOAuthApi::new()), None, 60));
        tokens.set_access_token("valid-token", None).await.unwrap();

        let executor = Arc::new(RequestExecutor::new(&config, tokens).unwrap());
        MessagingApi::new(executor, BatchDispatcher::new(4))
    }

    fn send_ok(message_id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": 0,
            "message": "Success",
            "data": { "message_id": message_id },
        }))
    }

    #[tokio::test]
    async fn send_text_posts_expected_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_TEXT))
            .and(body_partial_json(serde_json::json!({
                "recipient": { "user_id": "user-1" },
                "message": { "text": "hello there" },
            })))
            .respond_with(send_ok("m-1"))
            .expect(1)
            .mount(&server)
            .await;

        let messaging = messaging_for(&server).await;
        let receipt = messaging.send_text("user-1", "hello   there", None).await.unwrap();

        assert_eq!(receipt.message_id.as_deref(), Some("m-1"));
    }

    #[tokio::test]
    async fn send_text_validates_inputs_before_any_network_call() {
        let server = MockServer::start().await;
        let messaging = messaging_for(&server).await;

        assert!(matches!(
            messaging.send_text("", "hi", None).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            messaging.send_text("user-1", "  ", None).await,
            Err(Error::Validation(_))
        ));

        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quoted_reply_carries_quote_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_TEXT))
            .and(body_partial_json(serde_json::json!({
                "message": { "quote_message_id": "m-0" },
            })))
            .respond_with(send_ok("m-2"))
            .expect(1)
            .mount(&server)
            .await;

        let messaging = messaging_for(&server).await;
        messaging.send_text("user-1", "reply", Some("m-0")).await.unwrap();
    }

    #[tokio::test]
    async fn send_image_by_url_uses_image_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_ATTACHMENT))
            .and(body_partial_json(serde_json::json!({
                "message": { "attachment": {
                    "type": "image",
                    "payload": { "url": "https://example.com/cat.jpg" },
                }},
            })))
            .respond_with(send_ok("m-3"))
            .expect(1)
            .mount(&server)
            .await;

        let messaging = messaging_for(&server).await;
        messaging
            .send_image("user-1", ImageSource::Url("https://example.com/cat.jpg".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn send_image_by_attachment_id_uses_media_template() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(SEND_ATTACHMENT))
            .and(body_partial_json(serde_json::json!({
                "message": { "attachment": {
                    "type": "template",
                    "payload": { "template_type": "media" },
                }},
            })))
            .respond_with(send_ok("m-4"))
            .expect(1)
            .mount(&server)
            .await;

        let messaging = messaging_for(&server).await;
        messaging
            .send_image("user-1", ImageSource::AttachmentId("att-1".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn broadcast_isolates_per_recipient_failures() {
        let server = MockServer::start().await;

        // user-b is rejected by the platform; everyone else succeeds.
        Mock::given(method("POST"))
            .and(path(SEND_TEXT))
            .and(body_partial_json(serde_json::json!({
                "recipient": { "user_id": "user-b" },
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "error": -240,
                "message": "user has not followed the OA",
            })))
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path(SEND_TEXT))
            .respond_with(send_ok("m-bulk"))
            .mount(&server)
            .await;

        let messaging = messaging_for(&server).await;
        let ids: Vec<String> = ["user-a", "user-b", "user-c"].map(String::from).into();
        let result = messaging.broadcast_text(&ids, "promo").await.unwrap();

        assert_eq!(result.len(), 3);
        let outcomes = result.outcomes();
        assert_eq!(outcomes[0].recipient_id, "user-a");
        assert!(outcomes[0].success);
        assert_eq!(outcomes[1].recipient_id, "user-b");
        assert!(!outcomes[1].success);
        assert!(outcomes[2].success);
    }

    #[tokio::test]
    async fn broadcast_rejects_empty_text_before_dispatch() {
        let server = MockServer::start().await;
        let messaging = messaging_for(&server).await;

        let ids = vec!["user-a".to_string()];
        let result = messaging.broadcast_text(&ids, " ").await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
