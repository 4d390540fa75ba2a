//! Message structures exchanged within an inquiry

use crate::storage::{InquiryId, MessageId, Price, UnknownVariant, UserId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of an inquiry message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Free text
    Text,
    /// New offer, usually from the client
    PriceOffer,
    /// New offer, usually from the owner
    PriceCounter,
    /// Accept the outstanding offer
    PriceAccept,
    /// Reject the outstanding offer
    PriceReject,
    /// Client asks to buy at the agreed price
    PurchaseRequest,
    /// Owner confirms the sale
    PurchaseConfirm,
    /// Server-generated lifecycle note (cancel/close)
    System,
}

impl MessageType {
    /// Name as stored and sent on the wire
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "TEXT",
            MessageType::PriceOffer => "PRICE_OFFER",
            MessageType::PriceCounter => "PRICE_COUNTER",
            MessageType::PriceAccept => "PRICE_ACCEPT",
            MessageType::PriceReject => "PRICE_REJECT",
            MessageType::PurchaseRequest => "PURCHASE_REQUEST",
            MessageType::PurchaseConfirm => "PURCHASE_CONFIRM",
            MessageType::System => "SYSTEM",
        }
    }

    /// Offer or counter-offer
    pub fn is_offer(self) -> bool {
        matches!(self, MessageType::PriceOffer | MessageType::PriceCounter)
    }

    /// Answer to an outstanding offer
    pub fn is_answer(self) -> bool {
        matches!(self, MessageType::PriceAccept | MessageType::PriceReject)
    }

    /// Purchase handshake kinds
    pub fn is_purchase(self) -> bool {
        matches!(self, MessageType::PurchaseRequest | MessageType::PurchaseConfirm)
    }

    /// Kinds whose persisted record always carries a price
    pub fn carries_price(self) -> bool {
        self.is_offer() || self.is_answer() || self.is_purchase()
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "TEXT" => Ok(MessageType::Text),
            "PRICE_OFFER" => Ok(MessageType::PriceOffer),
            "PRICE_COUNTER" => Ok(MessageType::PriceCounter),
            "PRICE_ACCEPT" => Ok(MessageType::PriceAccept),
            "PRICE_REJECT" => Ok(MessageType::PriceReject),
            "PURCHASE_REQUEST" => Ok(MessageType::PurchaseRequest),
            "PURCHASE_CONFIRM" => Ok(MessageType::PurchaseConfirm),
            "SYSTEM" => Ok(MessageType::System),
            other => Err(UnknownVariant {
                kind: "message type",
                value: other.to_string(),
            }),
        }
    }
}

/// A persisted, immutable message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message ID
    pub id: MessageId,
    /// Owning inquiry
    pub inquiry_id: InquiryId,
    /// Sender, always one of the inquiry participants
    pub sender_id: UserId,
    /// Message kind
    pub message_type: MessageType,
    /// Display text; present even for structured kinds
    pub content: String,
    /// Amount for price and purchase kinds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_amount: Option<Price>,
    /// Server-assigned send time (Unix milliseconds)
    pub sent_at: i64,
    /// Whether the counterpart has read it
    #[serde(default)]
    pub is_read: bool,
    /// When the counterpart read it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<i64>,
}

impl Message {
    /// Thread ordering key: `sent_at`, ties broken by id
    pub fn order_key(&self) -> (i64, MessageId) {
        (self.sent_at, self.id)
    }
}

/// A message decided by the negotiation engine but not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    /// Owning inquiry
    pub inquiry_id: InquiryId,
    /// Sender
    pub sender_id: UserId,
    /// Message kind
    pub message_type: MessageType,
    /// Display text
    pub content: String,
    /// Amount for price and purchase kinds
    pub price_amount: Option<Price>,
    /// Server-assigned send time
    pub sent_at: i64,
}

impl NewMessage {
    /// Attach the id assigned by the store
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            inquiry_id: self.inquiry_id,
            sender_id: self.sender_id,
            message_type: self.message_type,
            content: self.content,
            price_amount: self.price_amount,
            sent_at: self.sent_at,
            is_read: false,
            read_at: None,
        }
    }
}
