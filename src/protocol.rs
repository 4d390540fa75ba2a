//! Protocol module
//!
//! This module defines the envelopes exchanged over the live channel:
//! - Client → server envelopes and their validation into typed [`Command`]s
//! - Server → client envelopes ([`ServerEnvelope`])
//! - Error codes reported to the sender of a failed action
//! - Serialization (JSON text frames and CBOR binary frames)
//!
//! Validation happens here, before anything reaches the negotiation engine.
//! A rejected envelope never mutates state and is reported to its sender only.

use crate::api::CreateInquiryRequest;
use crate::outbox::Notification;
use crate::storage::{InquiryId, InquiryStatus, Message, MessageType, Price, PropertyId, UserId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reasons an inbound envelope is rejected by the codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Frame is not a well-formed JSON/CBOR object
    #[error("malformed envelope: {0}")]
    Malformed(String),

    /// `type` names no known envelope
    #[error("unknown envelope type: {0}")]
    UnknownType(String),

    /// A required field is absent
    #[error("missing field: {0}")]
    Missing(&'static str),

    /// A field is present but unacceptable
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field (wire name)
        field: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

impl ValidationError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ValidationError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Machine-readable error code carried by `ERROR` envelopes and HTTP error bodies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed or incomplete envelope
    Validation,
    /// Referenced inquiry or property does not exist
    NotFound,
    /// Missing, unknown or expired credentials
    Unauthorized,
    /// Caller may not act on this inquiry
    Forbidden,
    /// Action is not legal from the current state
    InvalidTransition,
    /// Caller tried to answer their own offer
    NotYourTurn,
    /// Inquiry is in a terminal state
    ThreadClosed,
    /// Concurrent modification or duplicate open inquiry
    Conflict,
    /// Inquiry lock could not be acquired in time
    Busy,
    /// Anything else
    Internal,
}

impl ErrorCode {
    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Unauthorized => "UNAUTHORIZED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::NotYourTurn => "NOT_YOUR_TURN",
            ErrorCode::ThreadClosed => "THREAD_CLOSED",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::Busy => "BUSY",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    /// HTTP status used by the fallback endpoints
    pub fn http_status(self) -> u16 {
        match self {
            ErrorCode::Validation => 400,
            ErrorCode::NotFound => 404,
            ErrorCode::Unauthorized => 401,
            ErrorCode::Forbidden => 403,
            ErrorCode::InvalidTransition | ErrorCode::NotYourTurn => 422,
            ErrorCode::ThreadClosed | ErrorCode::Conflict => 409,
            ErrorCode::Busy => 503,
            ErrorCode::Internal => 500,
        }
    }
}

/// Terminal status reachable through `UPDATE_STATUS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusChange {
    /// Withdraw the inquiry
    Cancelled,
    /// Close without a sale
    Closed,
}

impl StatusChange {
    /// Resulting inquiry status
    pub fn status(self) -> InquiryStatus {
        match self {
            StatusChange::Cancelled => InquiryStatus::Cancelled,
            StatusChange::Closed => InquiryStatus::Closed,
        }
    }
}

/// Purchase stage announced by `PURCHASE_UPDATE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseKind {
    /// Client asked to buy
    PurchaseRequest,
    /// Owner confirmed the sale
    PurchaseConfirmed,
}

/// A chat or price message after validation
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCommand {
    /// Target inquiry
    pub inquiry_id: InquiryId,
    /// Text or price kind (never purchase or system)
    pub message_type: MessageType,
    /// Trimmed content; may be empty for price kinds
    pub content: String,
    /// Amount, present for offers and optional for answers
    pub price_amount: Option<Price>,
    /// Opaque client correlation tag
    pub client_ref: Option<String>,
}

/// A validated client intent
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Text, offer, counter, accept or reject
    Chat(ChatCommand),
    /// Typing indicator
    Typing {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Started or stopped typing
        is_typing: bool,
    },
    /// Client asks to buy at the agreed price
    PurchaseRequest {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Price the client expects to pay
        final_price: Price,
        /// Optional note
        message: Option<String>,
        /// Opaque client correlation tag
        client_ref: Option<String>,
    },
    /// Owner confirms the sale
    PurchaseConfirm {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Optional note
        message: Option<String>,
        /// Opaque client correlation tag
        client_ref: Option<String>,
    },
    /// Mark the counterpart's messages as read
    MarkRead {
        /// Target inquiry
        inquiry_id: InquiryId,
    },
    /// Cancel or close the inquiry
    UpdateStatus {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Requested terminal status
        status: StatusChange,
        /// Optional note
        message: Option<String>,
        /// Opaque client correlation tag
        client_ref: Option<String>,
    },
    /// Application keep-alive
    Ping,
}

impl Command {
    /// Inquiry the command targets
    pub fn inquiry_id(&self) -> Option<InquiryId> {
        match self {
            Command::Chat(chat) => Some(chat.inquiry_id),
            Command::Typing { inquiry_id, .. }
            | Command::PurchaseRequest { inquiry_id, .. }
            | Command::PurchaseConfirm { inquiry_id, .. }
            | Command::MarkRead { inquiry_id }
            | Command::UpdateStatus { inquiry_id, .. } => Some(*inquiry_id),
            Command::Ping => None,
        }
    }

    /// Correlation tag to echo back
    pub fn client_ref(&self) -> Option<&str> {
        match self {
            Command::Chat(chat) => chat.client_ref.as_deref(),
            Command::PurchaseRequest { client_ref, .. }
            | Command::PurchaseConfirm { client_ref, .. }
            | Command::UpdateStatus { client_ref, .. } => client_ref.as_deref(),
            _ => None,
        }
    }

    /// Whether the command goes through the negotiation engine
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Command::Chat(_)
                | Command::PurchaseRequest { .. }
                | Command::PurchaseConfirm { .. }
                | Command::UpdateStatus { .. }
        )
    }
}

/// A rejected envelope plus whatever context could be salvaged for the reply
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Inquiry id, if it parsed
    pub inquiry_id: Option<InquiryId>,
    /// Correlation tag, if present
    pub client_ref: Option<String>,
    /// What was wrong
    pub error: ValidationError,
}

impl Rejection {
    fn bare(error: ValidationError) -> Self {
        Self {
            inquiry_id: None,
            client_ref: None,
            error,
        }
    }
}

/// Decode and validate a JSON text frame
pub fn decode_text(text: &str, max_content_len: usize) -> std::result::Result<Command, Rejection> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Rejection::bare(ValidationError::Malformed(e.to_string())))?;
    parse_command(&value, max_content_len)
}

/// Decode and validate a CBOR binary frame
pub fn decode_binary(
    data: &[u8],
    max_content_len: usize,
) -> std::result::Result<Command, Rejection> {
    let value: Value = serde_cbor::from_slice(data)
        .map_err(|e| Rejection::bare(ValidationError::Malformed(e.to_string())))?;
    parse_command(&value, max_content_len)
}

/// Validate a decoded envelope into a [`Command`]
///
/// # Arguments
/// * `value` - Decoded frame
/// * `max_content_len` - Longest accepted `content`/`message`, in characters
///
/// # Returns
/// The typed command, or a [`Rejection`] carrying the inquiry id and
/// `clientRef` when those could still be read.
pub fn parse_command(value: &Value, max_content_len: usize) -> std::result::Result<Command, Rejection> {
    let fields = value.as_object().ok_or_else(|| {
        Rejection::bare(ValidationError::Malformed(
            "envelope must be an object".to_string(),
        ))
    })?;

    let client_ref = fields
        .get("clientRef")
        .and_then(Value::as_str)
        .map(str::to_string);
    let context_id = positive_id(fields.get("inquiryId"), "inquiryId")
        .ok()
        .map(InquiryId);

    parse_fields(fields, client_ref.clone(), max_content_len).map_err(|error| Rejection {
        inquiry_id: context_id,
        client_ref,
        error,
    })
}

/// Decode a `POST /api/inquiries` body
///
/// `propertyId` and `offeredPrice` accept numeric strings like their
/// envelope counterparts; `message` is held to `max_content_len`.
pub fn parse_create_inquiry(
    value: &Value,
    max_content_len: usize,
) -> std::result::Result<CreateInquiryRequest, ValidationError> {
    let fields = value
        .as_object()
        .ok_or_else(|| ValidationError::Malformed("body must be an object".to_string()))?;

    Ok(CreateInquiryRequest {
        property_id: PropertyId(positive_id(fields.get("propertyId"), "propertyId")?),
        message: note_field(fields.get("message"), max_content_len)?,
        offered_price: price_field(fields.get("offeredPrice"), "offeredPrice")?,
    })
}

fn parse_fields(
    fields: &Map<String, Value>,
    client_ref: Option<String>,
    max_content_len: usize,
) -> std::result::Result<Command, ValidationError> {
    let kind = match fields.get("type") {
        None | Some(Value::Null) => return Err(ValidationError::Missing("type")),
        Some(Value::String(kind)) => kind.as_str(),
        Some(_) => return Err(ValidationError::invalid("type", "must be a string")),
    };

    if kind == "PING" {
        return Ok(Command::Ping);
    }

    let command = match kind {
        "CHAT_MESSAGE" => {
            let inquiry_id = InquiryId(positive_id(fields.get("inquiryId"), "inquiryId")?);
            parse_chat(fields, inquiry_id, client_ref, max_content_len)?
        }
        "TYPING" => Command::Typing {
            inquiry_id: InquiryId(positive_id(fields.get("inquiryId"), "inquiryId")?),
            is_typing: match fields.get("isTyping") {
                Some(Value::Bool(flag)) => *flag,
                None | Some(Value::Null) => return Err(ValidationError::Missing("isTyping")),
                Some(_) => return Err(ValidationError::invalid("isTyping", "must be a boolean")),
            },
        },
        "PURCHASE_REQUEST" => Command::PurchaseRequest {
            inquiry_id: InquiryId(positive_id(fields.get("inquiryId"), "inquiryId")?),
            final_price: price_field(fields.get("finalPrice"), "finalPrice")?
                .ok_or(ValidationError::Missing("finalPrice"))?,
            message: note_field(fields.get("message"), max_content_len)?,
            client_ref,
        },
        "PURCHASE_CONFIRM" => Command::PurchaseConfirm {
            inquiry_id: InquiryId(positive_id(fields.get("inquiryId"), "inquiryId")?),
            message: note_field(fields.get("message"), max_content_len)?,
            client_ref,
        },
        "MARK_READ" => Command::MarkRead {
            inquiry_id: InquiryId(positive_id(fields.get("inquiryId"), "inquiryId")?),
        },
        "UPDATE_STATUS" => Command::UpdateStatus {
            inquiry_id: InquiryId(positive_id(fields.get("inquiryId"), "inquiryId")?),
            status: match fields.get("status").and_then(Value::as_str) {
                Some("CANCELLED") => StatusChange::Cancelled,
                Some("CLOSED") => StatusChange::Closed,
                Some(other) => {
                    return Err(ValidationError::invalid(
                        "status",
                        format!("{} is not CANCELLED or CLOSED", other),
                    ))
                }
                None => return Err(ValidationError::Missing("status")),
            },
            message: note_field(fields.get("message"), max_content_len)?,
            client_ref,
        },
        other => return Err(ValidationError::UnknownType(other.to_string())),
    };

    Ok(command)
}

fn parse_chat(
    fields: &Map<String, Value>,
    inquiry_id: InquiryId,
    client_ref: Option<String>,
    max_content_len: usize,
) -> std::result::Result<Command, ValidationError> {
    let message_type: MessageType = match fields.get("messageType") {
        None | Some(Value::Null) => return Err(ValidationError::Missing("messageType")),
        Some(Value::String(raw)) => raw
            .parse()
            .map_err(|_| ValidationError::invalid("messageType", format!("unknown kind {}", raw)))?,
        Some(_) => return Err(ValidationError::invalid("messageType", "must be a string")),
    };

    let content = match fields.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.trim().to_string(),
        Some(_) => return Err(ValidationError::invalid("content", "must be a string")),
    };
    check_length("content", &content, max_content_len)?;

    let price_amount = price_field(fields.get("priceAmount"), "priceAmount")?;

    let command = match message_type {
        MessageType::Text => {
            if content.is_empty() {
                return Err(ValidationError::invalid("content", "must not be empty"));
            }
            Command::Chat(ChatCommand {
                inquiry_id,
                message_type,
                content,
                price_amount: None,
                client_ref,
            })
        }
        MessageType::PriceOffer | MessageType::PriceCounter => {
            let amount = price_amount.ok_or(ValidationError::Missing("priceAmount"))?;
            Command::Chat(ChatCommand {
                inquiry_id,
                message_type,
                content,
                price_amount: Some(amount),
                client_ref,
            })
        }
        MessageType::PriceAccept | MessageType::PriceReject => Command::Chat(ChatCommand {
            inquiry_id,
            message_type,
            content,
            price_amount,
            client_ref,
        }),
        MessageType::PurchaseRequest => Command::PurchaseRequest {
            inquiry_id,
            final_price: price_amount.ok_or(ValidationError::Missing("priceAmount"))?,
            message: non_empty(content),
            client_ref,
        },
        MessageType::PurchaseConfirm => Command::PurchaseConfirm {
            inquiry_id,
            message: non_empty(content),
            client_ref,
        },
        MessageType::System => {
            return Err(ValidationError::invalid(
                "messageType",
                "SYSTEM messages are server-generated",
            ))
        }
    };

    Ok(command)
}

fn positive_id(value: Option<&Value>, field: &'static str) -> std::result::Result<i64, ValidationError> {
    let parsed = match value {
        None | Some(Value::Null) => return Err(ValidationError::Missing(field)),
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(_) => None,
    };
    parsed
        .filter(|id| *id > 0)
        .ok_or_else(|| ValidationError::invalid(field, "must be a positive integer"))
}

fn price_field(
    value: Option<&Value>,
    field: &'static str,
) -> std::result::Result<Option<Price>, ValidationError> {
    let amount = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    amount
        .and_then(Price::from_major)
        .map(Some)
        .ok_or_else(|| ValidationError::invalid(field, "must be a positive number"))
}

fn note_field(
    value: Option<&Value>,
    max_content_len: usize,
) -> std::result::Result<Option<String>, ValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => {
            let text = text.trim().to_string();
            check_length("message", &text, max_content_len)?;
            Ok(non_empty(text))
        }
        Some(_) => Err(ValidationError::invalid("message", "must be a string")),
    }
}

pub(crate) fn check_length(
    field: &'static str,
    text: &str,
    max_len: usize,
) -> std::result::Result<(), ValidationError> {
    if text.chars().count() > max_len {
        return Err(ValidationError::invalid(
            field,
            format!("longer than {} characters", max_len),
        ));
    }
    Ok(())
}

fn non_empty(text: String) -> Option<String> {
    (!text.is_empty()).then_some(text)
}

/// Display text for a structured message sent without content
pub fn fallback_content(message_type: MessageType, price: Option<Price>) -> String {
    let amount = price.map(|p| p.to_string()).unwrap_or_default();
    match message_type {
        MessageType::PriceOffer => format!("Offered {}", amount),
        MessageType::PriceCounter => format!("Countered with {}", amount),
        MessageType::PriceAccept => format!("Accepted {}", amount),
        MessageType::PriceReject if price.is_some() => format!("Rejected the offer of {}", amount),
        MessageType::PriceReject => "Rejected the offer".to_string(),
        MessageType::PurchaseRequest => format!("Requested to purchase at {}", amount),
        MessageType::PurchaseConfirm => format!("Confirmed the purchase at {}", amount),
        MessageType::Text | MessageType::System => String::new(),
    }
}

/// Client → server envelope, as produced by [`crate::client`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientEnvelope {
    /// Chat or price message
    #[serde(rename_all = "camelCase")]
    ChatMessage {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Display text
        content: String,
        /// Message kind
        message_type: MessageType,
        /// Amount for price kinds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        price_amount: Option<Price>,
        /// Correlation tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    /// Typing indicator
    #[serde(rename_all = "camelCase")]
    Typing {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Started or stopped typing
        is_typing: bool,
    },
    /// Purchase request
    #[serde(rename_all = "camelCase")]
    PurchaseRequest {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Agreed price
        final_price: Price,
        /// Optional note
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Correlation tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    /// Purchase confirmation
    #[serde(rename_all = "camelCase")]
    PurchaseConfirm {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Optional note
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Correlation tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    /// Read receipt
    #[serde(rename_all = "camelCase")]
    MarkRead {
        /// Target inquiry
        inquiry_id: InquiryId,
    },
    /// Cancel or close
    #[serde(rename_all = "camelCase")]
    UpdateStatus {
        /// Target inquiry
        inquiry_id: InquiryId,
        /// Requested terminal status
        status: StatusChange,
        /// Optional note
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        /// Correlation tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    /// Keep-alive
    Ping,
}

impl ClientEnvelope {
    /// Encode to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::JsonSerialization)
    }

    /// Encode to a CBOR binary frame
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        serde_cbor::to_vec(self).map_err(|e| Error::CborSerialization(e.to_string()))
    }
}

/// Server → client envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerEnvelope {
    /// A persisted message
    #[serde(rename_all = "camelCase")]
    NewMessage {
        /// Owning inquiry
        inquiry_id: InquiryId,
        /// The message as stored
        message: Message,
        /// Echoed on the sender's copy only
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    /// Counterpart started or stopped typing
    #[serde(rename_all = "camelCase")]
    TypingIndicator {
        /// Owning inquiry
        inquiry_id: InquiryId,
        /// Who is typing
        user_id: UserId,
        /// Started or stopped
        is_typing: bool,
        /// Display name, when known
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender_name: Option<String>,
    },
    /// Inquiry status changed
    #[serde(rename_all = "camelCase")]
    StatusUpdate {
        /// Owning inquiry
        inquiry_id: InquiryId,
        /// New status
        status: InquiryStatus,
    },
    /// Purchase stage reached; clients should refetch
    #[serde(rename_all = "camelCase")]
    PurchaseUpdate {
        /// Owning inquiry
        inquiry_id: InquiryId,
        /// Stage
        kind: PurchaseKind,
    },
    /// Out-of-thread signal addressed to a user
    #[serde(rename_all = "camelCase")]
    Notification {
        /// Payload
        notification: Notification,
    },
    /// Read receipt
    #[serde(rename_all = "camelCase")]
    MessagesRead {
        /// Owning inquiry
        inquiry_id: InquiryId,
        /// Who read
        reader_id: UserId,
        /// Messages newly marked read
        count: usize,
        /// When
        read_at: i64,
    },
    /// Failure of the recipient's own action
    #[serde(rename_all = "camelCase")]
    Error {
        /// Inquiry the action targeted
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inquiry_id: Option<InquiryId>,
        /// Machine-readable code
        code: ErrorCode,
        /// Human-readable explanation
        message: String,
        /// Echoed correlation tag
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_ref: Option<String>,
    },
    /// Keep-alive reply
    Pong,
}

impl ServerEnvelope {
    /// Error reply for a failed action
    ///
    /// Internal failures are reported without their details.
    pub fn error(inquiry_id: Option<InquiryId>, client_ref: Option<String>, err: &Error) -> Self {
        let code = err.code();
        let message = if code == ErrorCode::Internal {
            "Internal server error".to_string()
        } else {
            err.to_string()
        };
        ServerEnvelope::Error {
            inquiry_id,
            code,
            message,
            client_ref,
        }
    }

    /// Error reply for a rejected envelope
    pub fn rejection(rejection: Rejection) -> Self {
        ServerEnvelope::Error {
            inquiry_id: rejection.inquiry_id,
            code: ErrorCode::Validation,
            message: rejection.error.to_string(),
            client_ref: rejection.client_ref,
        }
    }

    /// Inquiry the envelope is routed to, if any
    pub fn inquiry_id(&self) -> Option<InquiryId> {
        match self {
            ServerEnvelope::NewMessage { inquiry_id, .. }
            | ServerEnvelope::TypingIndicator { inquiry_id, .. }
            | ServerEnvelope::StatusUpdate { inquiry_id, .. }
            | ServerEnvelope::PurchaseUpdate { inquiry_id, .. }
            | ServerEnvelope::MessagesRead { inquiry_id, .. } => Some(*inquiry_id),
            ServerEnvelope::Notification { notification } => notification.inquiry_id,
            ServerEnvelope::Error { inquiry_id, .. } => *inquiry_id,
            ServerEnvelope::Pong => None,
        }
    }

    /// Encode to a JSON text frame
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::JsonSerialization)
    }

    /// Decode from a JSON text frame
    pub fn from_json(data: &str) -> Result<Self> {
        serde_json::from_str(data).map_err(Error::JsonSerialization)
    }

    /// Encode to a CBOR binary frame
    pub fn to_cbor(&self) -> Result<Vec<u8>> {
        serde_cbor::to_vec(self).map_err(|e| Error::CborSerialization(e.to_string()))
    }

    /// Decode from a CBOR binary frame
    pub fn from_cbor(data: &[u8]) -> Result<Self> {
        serde_cbor::from_slice(data).map_err(|e| Error::CborSerialization(e.to_string()))
    }
}
