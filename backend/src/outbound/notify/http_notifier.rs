//! Reqwest-backed invitation relay.
//!
//! This adapter owns transport details only: payload serialisation, the
//! request timeout and mapping HTTP failures to `NotifierError`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::dto::InvitationNoticeDto;
use crate::domain::ports::{InvitationNotice, InvitationNotifier, NotifierError};

const DEFAULT_USER_AGENT: &str = "tandem-invitation-relay/0.1";
const PREVIEW_CHAR_LIMIT: usize = 160;

/// Notifier that POSTs each notice as JSON to one relay endpoint.
pub struct HttpInvitationNotifier {
    client: Client,
    endpoint: Url,
}

impl HttpInvitationNotifier {
    /// Build a notifier with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(DEFAULT_USER_AGENT)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl InvitationNotifier for HttpInvitationNotifier {
    async fn invitation_created(&self, notice: &InvitationNotice) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&InvitationNoticeDto::from(notice))
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_success() {
            debug!(invitation_id = %notice.invitation_id, "invitation notice relayed");
            return Ok(());
        }
        let body = response.bytes().await.map_err(map_transport_error)?;
        Err(map_status_error(status, body.as_ref()))
    }
}

fn map_transport_error(error: reqwest::Error) -> NotifierError {
    // reqwest errors may echo the URL; never the body, so the token stays out.
    if error.is_timeout() {
        NotifierError::delivery(format!("relay timed out: {error}"))
    } else {
        NotifierError::delivery(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &[u8]) -> NotifierError {
    let preview = body_preview(body);
    if preview.is_empty() {
        NotifierError::delivery(format!("status {}", status.as_u16()))
    } else {
        NotifierError::delivery(format!("status {}: {preview}", status.as_u16()))
    }
}

fn body_preview(body: &[u8]) -> String {
    let compact = String::from_utf8_lossy(body)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let preview: String = compact.chars().take(PREVIEW_CHAR_LIMIT).collect();
    if compact.chars().count() > PREVIEW_CHAR_LIMIT {
        format!("{preview}...")
    } else {
        preview
    }
}
