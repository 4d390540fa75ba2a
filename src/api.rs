//! HTTP fallback request and response bodies
//!
//! Shared by the server routes in [`crate::transport`] and the
//! [`FallbackClient`](crate::client::FallbackClient).

use crate::protocol::{ErrorCode, StatusChange};
use crate::storage::{Inquiry, InquiryId, Message, MessageType, Price, PropertyId};
use serde::{Deserialize, Serialize};

/// One inquiry with its full, ordered message history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryThread {
    /// The inquiry
    pub inquiry: Inquiry,
    /// Messages ordered by `(sentAt, id)`
    pub messages: Vec<Message>,
}

/// `POST /api/inquiries`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInquiryRequest {
    /// Property to inquire about
    pub property_id: PropertyId,
    /// Optional first text message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Optional opening offer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offered_price: Option<Price>,
}

/// `POST /api/inquiries/{id}/messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostMessageRequest {
    /// Display text
    #[serde(default)]
    pub content: String,
    /// Message kind
    pub message_type: MessageType,
    /// Amount for price kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_amount: Option<Price>,
}

/// `PATCH /api/inquiries/{id}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChangeRequest {
    /// Requested terminal status
    pub status: StatusChange,
    /// Optional note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// `POST /api/inquiries/{id}/read`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadReceipt {
    /// Inquiry marked read
    pub inquiry_id: InquiryId,
    /// Messages newly marked read
    pub count: usize,
}

/// `GET /api/inquiries/unread-count`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    /// Unread messages across the caller's inquiries
    pub unread_count: i64,
}

/// Error body of every non-2xx response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Machine-readable code
    pub code: ErrorCode,
    /// Human-readable message
    pub message: String,
}

/// `?as=` filter of the inquiry listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListAs {
    /// Inquiries where the caller is the buyer
    Client,
    /// Inquiries where the caller is the owner
    Owner,
    /// Every inquiry (admins only)
    All,
}

impl ListAs {
    /// Query-string value
    pub fn as_str(self) -> &'static str {
        match self {
            ListAs::Client => "client",
            ListAs::Owner => "owner",
            ListAs::All => "all",
        }
    }

    /// Parse a query-string value
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(ListAs::Client),
            "owner" => Some(ListAs::Owner),
            "all" => Some(ListAs::All),
            _ => None,
        }
    }
}
