use std::time::Duration;

use futures_util::future::BoxFuture;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{error::Error, message::Message};

use super::MessageSender;

pub const AUTH_KEY_HEADER: &str = "x-ins-auth-key";

#[derive(Debug, Serialize)]
struct WebhookRequest<'a> {
    to: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookResponse {
    #[serde(default)]
    message_id: Option<String>,
}

/// Posts messages as JSON to a webhook and expects `202 Accepted`.
pub struct WebhookSender {
    client: Client,
    url: Url,
    auth_key: Option<SecretString>,
}

impl WebhookSender {
    pub fn new(url: Url, auth_key: Option<SecretString>, timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            url,
            auth_key,
        })
    }

    async fn send_inner(&self, message: &Message) -> Result<String, Error> {
        let payload = WebhookRequest {
            to: &message.recipient,
            content: &message.content,
        };

        tracing::debug!(message_id = message.id, url = %self.url, "Posting message to webhook");

        let mut request = self.client.post(self.url.clone()).json(&payload);
        if let Some(key) = &self.auth_key {
            request = request.header(AUTH_KEY_HEADER, key.expose_secret());
        }

        let response = request.send().await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED {
            return Err(Error::transport(format!("unexpected status code: {status}")));
        }

        let body = response.bytes().await?;

        parse_delivery_id(&body)
    }
}

/// Extracts `messageId` from a webhook acknowledgement body.
fn parse_delivery_id(body: &[u8]) -> Result<String, Error> {
    let response: WebhookResponse = serde_json::from_slice(body)
        .map_err(|e| Error::transport(format!("failed to decode response: {e}")))?;

    response
        .message_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::transport("messageId not found in response"))
}

impl MessageSender for WebhookSender {
    fn send<'a>(&'a self, message: &'a Message) -> BoxFuture<'a, Result<String, Error>> {
        Box::pin(self.send_inner(message))
    }
}
