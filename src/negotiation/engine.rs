//! Negotiation engine
//!
//! [`decide`] is the pure core: `(inquiry, sender, action, now) → Decision`.
//! [`NegotiationEngine`] wraps it with the store lookups it needs. Neither
//! touches connections; fan-out belongs to the dispatcher.

use super::types::{Action, Decision, NegotiationError, OpenInquiry};
use crate::protocol::{fallback_content, StatusChange};
use crate::storage::{
    Inquiry, InquiryId, InquiryStatus, Message, MessageType, NewMessage, PropertyCatalog,
    PropertyStatus, Store, UserId,
};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Decide the outcome of `action` by `sender` against `current`
///
/// Checks, in order: participation (`Forbidden`), terminal state
/// (`ThreadClosed`), then the transition's own guard rules. On success the
/// returned [`Decision`] carries exactly one message and the new inquiry
/// snapshot; nothing is written.
///
/// # Arguments
/// * `current` - Inquiry as loaded from the store
/// * `sender` - Authenticated user performing the action
/// * `action` - What they want to do
/// * `now` - Current time (Unix milliseconds)
pub fn decide(
    current: &Inquiry,
    sender: UserId,
    action: &Action,
    now: i64,
) -> std::result::Result<Decision, NegotiationError> {
    if !current.is_participant(sender) {
        return Err(NegotiationError::Forbidden(
            "not a participant of this inquiry".to_string(),
        ));
    }
    current.ensure_open()?;

    // Thread order never goes backwards, even if the clock does
    let sent_at = now.max(current.updated_at);
    let mut next = current.clone();

    let (message_type, content, price_amount) = match action {
        Action::Say {
            message_type,
            content,
            price_amount,
        } => {
            let price = match message_type {
                MessageType::Text => None,
                MessageType::PriceOffer | MessageType::PriceCounter => {
                    let amount = price_amount.ok_or_else(|| {
                        NegotiationError::invalid("an offer needs a price amount")
                    })?;
                    next.place_offer(sender, amount)?;
                    Some(amount)
                }
                MessageType::PriceAccept => Some(next.accept_offer(sender, *price_amount)?),
                MessageType::PriceReject => Some(next.reject_offer(sender)?),
                MessageType::PurchaseRequest
                | MessageType::PurchaseConfirm
                | MessageType::System => {
                    return Err(NegotiationError::invalid(format!(
                        "{} cannot be sent as a chat message",
                        message_type
                    )))
                }
            };
            (*message_type, content.clone(), price)
        }
        Action::RequestPurchase { final_price, note } => {
            let agreed = next.request_purchase(sender, *final_price)?;
            (
                MessageType::PurchaseRequest,
                note.clone().unwrap_or_default(),
                Some(agreed),
            )
        }
        Action::ConfirmPurchase { note } => {
            let agreed = next.confirm_purchase(sender)?;
            (
                MessageType::PurchaseConfirm,
                note.clone().unwrap_or_default(),
                Some(agreed),
            )
        }
        Action::ChangeStatus { status, note } => {
            next.finish(*status, sent_at)?;
            let content = note.clone().unwrap_or_else(|| match status {
                StatusChange::Cancelled => "Inquiry cancelled".to_string(),
                StatusChange::Closed => "Inquiry closed".to_string(),
            });
            (MessageType::System, content, None)
        }
    };

    let content = if content.is_empty() {
        fallback_content(message_type, price_amount)
    } else {
        content
    };

    next.updated_at = sent_at;
    if next.status.is_terminal() && next.closed_at.is_none() {
        next.closed_at = Some(sent_at);
    }

    Ok(Decision {
        message: NewMessage {
            inquiry_id: current.id,
            sender_id: sender,
            message_type,
            content,
            price_amount,
            sent_at,
        },
        previous_status: current.status,
        expected_version: current.version,
        notify: current.participants().to_vec(),
        inquiry: next,
    })
}

/// Store-backed negotiation engine
pub struct NegotiationEngine {
    store: Arc<Store>,
    catalog: Arc<dyn PropertyCatalog>,
}

impl NegotiationEngine {
    /// Create an engine over a store and a property catalog
    pub fn new(store: Arc<Store>, catalog: Arc<dyn PropertyCatalog>) -> Self {
        Self { store, catalog }
    }

    /// Load the inquiry and decide the outcome of `action`
    ///
    /// The caller must hold the inquiry's lock until the decision is
    /// persisted.
    pub fn apply(&self, inquiry_id: InquiryId, sender: UserId, action: &Action) -> Result<Decision> {
        let current = self
            .store
            .load_inquiry(inquiry_id)?
            .ok_or(NegotiationError::NotFound(inquiry_id))?;

        let decision = decide(&current, sender, action, crate::storage::now_millis())?;
        debug!(
            "Inquiry {}: {} by {} ({} -> {})",
            inquiry_id,
            decision.message.message_type,
            sender,
            decision.previous_status,
            decision.inquiry.status
        );
        Ok(decision)
    }

    /// Open a new inquiry with its optional first messages
    ///
    /// Snapshots the property's owner and listed price. An opening offer is
    /// recorded as a `PRICE_OFFER` and moves the inquiry to `NEGOTIATING`.
    pub fn open(&self, request: &OpenInquiry) -> Result<(Inquiry, Vec<Message>)> {
        let property = self
            .catalog
            .property(request.property_id)?
            .ok_or(Error::PropertyNotFound(request.property_id))?;

        if property.status != PropertyStatus::Available {
            return Err(Error::PropertyUnavailable(
                property.id,
                "already sold".to_string(),
            ));
        }
        if property.owner_id == request.client_id {
            return Err(Error::Forbidden(
                "cannot open an inquiry on your own property".to_string(),
            ));
        }

        let now = crate::storage::now_millis();
        let mut draft = Inquiry {
            id: InquiryId(0),
            property_id: property.id,
            client_id: request.client_id,
            owner_id: property.owner_id,
            listed_price: property.listed_price,
            status: InquiryStatus::Active,
            offered_price: None,
            offered_by: None,
            agreed_price: None,
            version: 0,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };

        let mut messages = Vec::new();
        if let Some(text) = request.message.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            messages.push(NewMessage {
                inquiry_id: draft.id,
                sender_id: request.client_id,
                message_type: MessageType::Text,
                content: text.to_string(),
                price_amount: None,
                sent_at: now,
            });
        }
        if let Some(amount) = request.offered_price {
            draft.place_offer(request.client_id, amount)?;
            messages.push(NewMessage {
                inquiry_id: draft.id,
                sender_id: request.client_id,
                message_type: MessageType::PriceOffer,
                content: fallback_content(MessageType::PriceOffer, Some(amount)),
                price_amount: Some(amount),
                sent_at: now,
            });
        }

        self.store.insert_inquiry(&draft, &messages)
    }
}
