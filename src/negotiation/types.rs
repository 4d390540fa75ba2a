//! Common types for the negotiation module

use crate::protocol::{Command, ErrorCode, StatusChange};
use crate::storage::{Inquiry, InquiryId, InquiryStatus, MessageType, NewMessage, Price, UserId};
use thiserror::Error;

/// Guard-rule failures, reported to the sender only
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// Inquiry does not exist
    #[error("Inquiry {0} not found")]
    NotFound(InquiryId),

    /// Sender is not a participant
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Action is not legal from the current state
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    /// Sender tried to answer their own offer
    #[error("Not your turn: {0}")]
    NotYourTurn(String),

    /// Inquiry is purchased, cancelled or closed
    #[error("Inquiry {0} is closed")]
    ThreadClosed(InquiryId),
}

impl NegotiationError {
    /// Wire error code
    pub fn code(&self) -> ErrorCode {
        match self {
            NegotiationError::NotFound(_) => ErrorCode::NotFound,
            NegotiationError::Forbidden(_) => ErrorCode::Forbidden,
            NegotiationError::InvalidTransition(_) => ErrorCode::InvalidTransition,
            NegotiationError::NotYourTurn(_) => ErrorCode::NotYourTurn,
            NegotiationError::ThreadClosed(_) => ErrorCode::ThreadClosed,
        }
    }

    /// `NotYourTurn` is a specific kind of invalid transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(
            self,
            NegotiationError::InvalidTransition(_) | NegotiationError::NotYourTurn(_)
        )
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        NegotiationError::InvalidTransition(reason.into())
    }
}

/// A state-changing intent, stripped of transport concerns
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Text, offer, counter, accept or reject
    Say {
        /// Message kind
        message_type: MessageType,
        /// Trimmed content, possibly empty for price kinds
        content: String,
        /// Amount carried by the envelope
        price_amount: Option<Price>,
    },
    /// Client asks to buy at the agreed price
    RequestPurchase {
        /// Price the client expects to pay
        final_price: Price,
        /// Optional note
        note: Option<String>,
    },
    /// Owner confirms the sale
    ConfirmPurchase {
        /// Optional note
        note: Option<String>,
    },
    /// Cancel or close
    ChangeStatus {
        /// Requested terminal status
        status: StatusChange,
        /// Optional note
        note: Option<String>,
    },
}

impl Action {
    /// Extract the engine action from a mutating command
    ///
    /// Returns `None` for typing, read receipts and pings.
    pub fn from_command(command: &Command) -> Option<Self> {
        match command {
            Command::Chat(chat) => Some(Action::Say {
                message_type: chat.message_type,
                content: chat.content.clone(),
                price_amount: chat.price_amount,
            }),
            Command::PurchaseRequest {
                final_price,
                message,
                ..
            } => Some(Action::RequestPurchase {
                final_price: *final_price,
                note: message.clone(),
            }),
            Command::PurchaseConfirm { message, .. } => Some(Action::ConfirmPurchase {
                note: message.clone(),
            }),
            Command::UpdateStatus {
                status, message, ..
            } => Some(Action::ChangeStatus {
                status: *status,
                note: message.clone(),
            }),
            Command::Typing { .. } | Command::MarkRead { .. } | Command::Ping => None,
        }
    }

    /// Shorthand for a text message
    pub fn text(content: impl Into<String>) -> Self {
        Action::Say {
            message_type: MessageType::Text,
            content: content.into(),
            price_amount: None,
        }
    }

    /// Shorthand for a price message without content
    pub fn price(message_type: MessageType, price_amount: Option<Price>) -> Self {
        Action::Say {
            message_type,
            content: String::new(),
            price_amount,
        }
    }
}

/// Outcome of a successful engine step, not yet persisted
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// The one message this step persists
    pub message: NewMessage,
    /// Inquiry after the step (version still the loaded one)
    pub inquiry: Inquiry,
    /// Status before the step
    pub previous_status: InquiryStatus,
    /// Version the commit must find in the store
    pub expected_version: i64,
    /// Users that must be told about the step
    pub notify: Vec<UserId>,
}

impl Decision {
    /// Whether the step moved the inquiry to a new status
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.inquiry.status
    }
}

/// Request to open a new inquiry
#[derive(Debug, Clone, PartialEq)]
pub struct OpenInquiry {
    /// Property to negotiate over
    pub property_id: crate::storage::PropertyId,
    /// Buyer
    pub client_id: UserId,
    /// Optional first text message
    pub message: Option<String>,
    /// Optional opening offer
    pub offered_price: Option<Price>,
}
