//! HTTP fallback client
//!
//! Used to reconcile after a reconnect, on first load, and whenever a live
//! send fails with [`Error::NotConnected`].

use crate::api::{
    ApiError, CreateInquiryRequest, InquiryThread, ListAs, PostMessageRequest, ReadReceipt,
    StatusChangeRequest, UnreadCount,
};
use crate::storage::{ClientSettings, Inquiry, InquiryId, Message};
use crate::{Error, Result};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Authenticated REST client for `/api/inquiries`
#[derive(Debug, Clone)]
pub struct FallbackClient {
    http: Client,
    base_url: String,
    token: String,
}

impl FallbackClient {
    /// Create a client
    ///
    /// # Arguments
    /// * `base_url` - Server base URL, e.g. `http://127.0.0.1:8888`
    /// * `token` - Bearer token
    /// * `timeout` - Per-request timeout
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    /// Client configured like the live channel
    pub fn from_settings(settings: &ClientSettings, token: impl Into<String>) -> Result<Self> {
        Self::new(
            settings.server_url.clone(),
            token,
            Duration::from_millis(settings.connect_timeout_ms),
        )
    }

    /// One inquiry with its full ordered history
    pub async fn thread(&self, inquiry_id: InquiryId) -> Result<InquiryThread> {
        let request = self.http.get(self.url(&format!("/api/inquiries/{}", inquiry_id)));
        self.send(request).await
    }

    /// The caller's inquiries, optionally filtered by role
    pub async fn list(&self, filter: Option<ListAs>) -> Result<Vec<Inquiry>> {
        let mut request = self.http.get(self.url("/api/inquiries"));
        if let Some(filter) = filter {
            request = request.query(&[("as", filter.as_str())]);
        }
        self.send(request).await
    }

    /// Append a message without the live channel
    pub async fn post_message(
        &self,
        inquiry_id: InquiryId,
        body: &PostMessageRequest,
    ) -> Result<Message> {
        let request = self
            .http
            .post(self.url(&format!("/api/inquiries/{}/messages", inquiry_id)))
            .json(body);
        self.send(request).await
    }

    /// Mark the counterpart's messages as read
    pub async fn mark_read(&self, inquiry_id: InquiryId) -> Result<ReadReceipt> {
        let request = self
            .http
            .post(self.url(&format!("/api/inquiries/{}/read", inquiry_id)));
        self.send(request).await
    }

    /// Open a new inquiry
    pub async fn create_inquiry(&self, body: &CreateInquiryRequest) -> Result<Inquiry> {
        let request = self.http.post(self.url("/api/inquiries")).json(body);
        self.send(request).await
    }

    /// Cancel or close an inquiry
    pub async fn update_status(
        &self,
        inquiry_id: InquiryId,
        body: &StatusChangeRequest,
    ) -> Result<Inquiry> {
        let request = self
            .http
            .patch(self.url(&format!("/api/inquiries/{}/status", inquiry_id)))
            .json(body);
        self.send(request).await
    }

    /// Unread messages across the caller's inquiries
    pub async fn unread_count(&self) -> Result<i64> {
        let request = self.http.get(self.url("/api/inquiries/unread-count"));
        let body: UnreadCount = self.send(request).await?;
        Ok(body.unread_count)
    }

    /// Whether the server answers its health check
    pub async fn health(&self) -> bool {
        match self.http.get(self.url("/health")).send().await {
            Ok(response) if response.status().is_success() => response
                .text()
                .await
                .map(|body| body.trim() == "ok")
                .unwrap_or(false),
            Ok(response) => {
                warn!("Health endpoint returned {}", response.status());
                false
            }
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let response = request.bearer_auth(&self.token).send().await?;
        let response = check_status(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Turn a non-2xx response into [`Error::Api`]
async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let (code, message) = match serde_json::from_str::<ApiError>(&text) {
        Ok(body) => (body.code.as_str().to_string(), body.message),
        Err(_) => ("HTTP".to_string(), text),
    };

    debug!("API request failed with {}: {} {}", status, code, message);
    Err(Error::Api {
        status: status.as_u16(),
        code,
        message,
    })
}
