//! Gmail API client
//!
//! Thin facade over the four Gmail API calls the tools need. Every operation
//! takes the caller's [`Session`]; nothing is cached and nothing is retried.

use crate::config::gmail::{API_BASE_URL, USER_ID};
use crate::error::{GmailApiError, GmailMcpError, Result};
use crate::gmail::credentials::Session;
use crate::gmail::types::*;
use crate::gmail::utils::{create_text_message, encode_raw_message, extract_plain_body, header_value};

/// Gmail API client
pub struct GmailClient {
    /// HTTP client
    http_client: reqwest::Client,

    /// API base URL, without trailing slash
    base_url: String,
}

impl GmailClient {
    /// Create a client for the public Gmail API
    pub fn new() -> Self {
        Self::with_base_url(API_BASE_URL)
    }

    /// Create a client against a different API root
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Base URL for messages
    fn messages_url(&self) -> String {
        format!("{}/users/{}/messages", self.base_url, USER_ID)
    }

    /// Base URL for labels
    fn labels_url(&self) -> String {
        format!("{}/users/{}/labels", self.base_url, USER_ID)
    }

    /// Search messages, fetching From/Subject/Date for each hit on the first page
    pub async fn search(
        &self,
        session: &Session,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<MessageSummary>> {
        let url = format!(
            "{}?q={}&maxResults={}",
            self.messages_url(),
            urlencoding::encode(query),
            max_results
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(session.access_token())
            .send()
            .await?;

        let message_list: MessageList = ok_json(response, "search messages").await?;
        tracing::debug!(
            "Search '{}' returned {} message(s)",
            query,
            message_list.messages.len()
        );

        let mut results = Vec::new();
        for msg_ref in message_list.messages.into_iter().take(max_results as usize) {
            let url = format!(
                "{}/{}?format=metadata&metadataHeaders=From&metadataHeaders=Subject&metadataHeaders=Date",
                self.messages_url(),
                urlencoding::encode(&msg_ref.id)
            );

            let response = self
                .http_client
                .get(&url)
                .bearer_auth(session.access_token())
                .send()
                .await?;

            let message: Message = ok_json(response, "get message metadata").await?;
            let payload = message.payload.as_ref();

            results.push(MessageSummary {
                id: msg_ref.id,
                from: header_value(payload, "from"),
                subject: header_value(payload, "subject"),
                date: header_value(payload, "date"),
            });
        }

        Ok(results)
    }

    /// Fetch a full message and extract its plaintext body
    pub async fn read(&self, session: &Session, message_id: &str) -> Result<MessageDetail> {
        let url = format!("{}/{}?format=full", self.messages_url(), urlencoding::encode(message_id));

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(session.access_token())
            .send()
            .await?;

        if response.status().as_u16() == 404 {
            return Err(GmailMcpError::Gmail(GmailApiError::MessageNotFound {
                message_id: message_id.to_string(),
            }));
        }

        let message: Message = ok_json(response, "get message").await?;
        let payload = message.payload.as_ref();

        let body = match payload {
            Some(p) => extract_plain_body(p)?,
            None => String::new(),
        };

        Ok(MessageDetail {
            id: message.id.clone(),
            from: header_value(payload, "from"),
            to: header_value(payload, "to"),
            subject: header_value(payload, "subject"),
            date: header_value(payload, "date"),
            body,
        })
    }

    /// Send a plain text email, returning the id Gmail assigned to it
    pub async fn send(&self, session: &Session, to: &str, subject: &str, body: &str) -> Result<String> {
        let raw_message = create_text_message(to, subject, body)?;
        let request = SendMessageRequest {
            raw: encode_raw_message(&raw_message),
        };

        let url = format!("{}/send", self.messages_url());

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(session.access_token())
            .json(&request)
            .send()
            .await?;

        let sent: Message = ok_json(response, "send email").await?;
        tracing::info!("Sent message {}", sent.id);

        Ok(sent.id)
    }

    /// List every label in the mailbox, in API order
    pub async fn list_labels(&self, session: &Session) -> Result<Vec<Label>> {
        let response = self
            .http_client
            .get(self.labels_url())
            .bearer_auth(session.access_token())
            .send()
            .await?;

        let label_list: LabelList = ok_json(response, "list labels").await?;
        Ok(label_list.labels)
    }
}

impl Default for GmailClient {
    fn default() -> Self {
        Self::new()
    }
}

/// Decode a successful JSON response or turn the status into an API error
async fn ok_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    action: &str,
) -> Result<T> {
    if response.status().is_success() {
        Ok(response.json().await?)
    } else {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        Err(GmailMcpError::Gmail(GmailApiError::RequestFailed {
            status: status.as_u16(),
            message: format!("Failed to {}: {}", action, text),
        }))
    }
}
