//! Delivery and fan-out module
//!
//! This module handles everything that happens after the engine decided:
//! - Persisting a decision (message + inquiry) as one transaction
//! - Fan-out to every live connection of every notified user, plus admins
//! - Out-of-band notifications for recipients with no live connection
//! - Catalog side effects of a confirmed purchase
//! - Delivery state logging
//!
//! Publishing happens strictly after persistence. Send failures are logged
//! and never surfaced to the sender; the recipient reconciles through the
//! HTTP fallback.

use crate::negotiation::Decision;
use crate::outbox::{Notification, Outbox, Priority};
use crate::protocol::{PurchaseKind, ServerEnvelope};
use crate::registry::{ConnectionHandle, ConnectionRegistry};
use crate::storage::{
    Inquiry, InquiryStatus, Message, MessageType, PropertyCatalog, Store, UserId,
};
use crate::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Delivery state for logging
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryState {
    /// Pushed to this many live connections
    Delivered {
        /// Connections that accepted the envelope
        connections: usize,
    },
    /// No live connection; stored in the outbox
    Queued,
    /// No live connection and nothing queued (best-effort signal)
    Skipped,
    /// Could neither push nor queue
    Failed,
}

/// A decision after it has been committed
#[derive(Debug, Clone, PartialEq)]
pub struct Committed {
    /// Message as stored
    pub message: Message,
    /// Inquiry as stored, with its new version
    pub inquiry: Inquiry,
    /// Status before the step
    pub previous_status: InquiryStatus,
    /// Users to tell
    pub notify: Vec<UserId>,
    /// Sender's correlation tag, echoed on their copy only
    pub client_ref: Option<String>,
}

impl Committed {
    /// Whether the step moved the inquiry to a new status
    pub fn status_changed(&self) -> bool {
        self.previous_status != self.inquiry.status
    }

    /// Purchase stage reached by this step, if any
    pub fn purchase_kind(&self) -> Option<PurchaseKind> {
        match self.message.message_type {
            MessageType::PurchaseRequest => Some(PurchaseKind::PurchaseRequest),
            MessageType::PurchaseConfirm => Some(PurchaseKind::PurchaseConfirmed),
            _ => None,
        }
    }
}

/// Persist-then-publish dispatcher
pub struct Dispatcher {
    store: Arc<Store>,
    catalog: Arc<dyn PropertyCatalog>,
    registry: Arc<ConnectionRegistry>,
    outbox: Arc<Outbox>,
}

impl Dispatcher {
    /// Create a dispatcher
    pub fn new(
        store: Arc<Store>,
        catalog: Arc<dyn PropertyCatalog>,
        registry: Arc<ConnectionRegistry>,
        outbox: Arc<Outbox>,
    ) -> Self {
        Self {
            store,
            catalog,
            registry,
            outbox,
        }
    }

    /// Durably store a decision
    ///
    /// Fails with [`crate::Error::Conflict`] if the inquiry moved on since
    /// the decision was made; nothing is written in that case.
    pub fn persist(&self, decision: Decision, client_ref: Option<String>) -> Result<Committed> {
        let (message, inquiry) = self.store.commit(
            &decision.message,
            &decision.inquiry,
            decision.expected_version,
        )?;

        debug!(
            "Committed message {} on inquiry {} (version {})",
            message.id, inquiry.id, inquiry.version
        );

        Ok(Committed {
            message,
            inquiry,
            previous_status: decision.previous_status,
            notify: decision.notify,
            client_ref,
        })
    }

    /// Fan a committed step out to participants and admins
    pub async fn publish(&self, committed: &Committed) {
        let inquiry_id = committed.inquiry.id;
        let sender = committed.message.sender_id;

        let mut trailing = Vec::new();
        if committed.status_changed() {
            trailing.push(ServerEnvelope::StatusUpdate {
                inquiry_id,
                status: committed.inquiry.status,
            });
        }
        if let Some(kind) = committed.purchase_kind() {
            trailing.push(ServerEnvelope::PurchaseUpdate { inquiry_id, kind });
        }

        for user in &committed.notify {
            let client_ref = if *user == sender {
                committed.client_ref.clone()
            } else {
                None
            };
            let mut envelopes = vec![ServerEnvelope::NewMessage {
                inquiry_id,
                message: committed.message.clone(),
                client_ref,
            }];
            envelopes.extend(trailing.iter().cloned());

            let mut state = self.deliver(*user, &envelopes).await;
            if *user != sender && !matches!(state, DeliveryState::Delivered { .. }) {
                let (notification, priority) = offline_notice(committed);
                state = self.enqueue(*user, &notification, priority);
            }
            log_delivery_state(*user, &state);
        }

        let mut observers = 0;
        for handle in self.registry.admin_connections().await {
            if committed.notify.contains(&handle.user_id()) {
                continue;
            }
            let envelope = ServerEnvelope::NewMessage {
                inquiry_id,
                message: committed.message.clone(),
                client_ref: None,
            };
            if handle.send(envelope) && trailing.iter().all(|e| handle.send(e.clone())) {
                observers += 1;
            }
        }
        if observers > 0 {
            debug!("Inquiry {} update mirrored to {} admin connections", inquiry_id, observers);
        }

        if committed.purchase_kind() == Some(PurchaseKind::PurchaseConfirmed) {
            self.complete_sale(committed).await;
        }
    }

    async fn complete_sale(&self, committed: &Committed) {
        let property_id = committed.inquiry.property_id;
        match self.catalog.mark_sold(property_id) {
            Ok(()) => info!(
                "Inquiry {} purchased; property {} sold",
                committed.inquiry.id, property_id
            ),
            Err(e) => error!("Failed to mark property {} as sold: {}", property_id, e),
        }

        let price = committed
            .inquiry
            .agreed_price
            .map(|p| p.to_string())
            .unwrap_or_default();
        let notification = Notification::for_inquiry(
            committed.inquiry.id,
            "Sale completed",
            format!("Property {} sold for {}", property_id, price),
        );
        for handle in self.registry.admin_connections().await {
            handle.send(ServerEnvelope::Notification {
                notification: notification.clone(),
            });
        }
    }

    /// Push envelopes, in order, to every live connection of a user
    pub async fn deliver(&self, user: UserId, envelopes: &[ServerEnvelope]) -> DeliveryState {
        let connections = self.registry.connections_for(user).await;
        if connections.is_empty() {
            return DeliveryState::Skipped;
        }

        let delivered = connections
            .iter()
            .filter(|handle| envelopes.iter().all(|e| handle.send(e.clone())))
            .count();

        if delivered == 0 {
            DeliveryState::Failed
        } else {
            DeliveryState::Delivered {
                connections: delivered,
            }
        }
    }

    /// Push one envelope to several users; best-effort
    pub async fn deliver_to(&self, users: &[UserId], envelope: &ServerEnvelope) {
        for user in users {
            self.deliver(*user, std::slice::from_ref(envelope)).await;
        }
    }

    /// Notify a user live if connected, otherwise through the outbox
    pub async fn notify(
        &self,
        user: UserId,
        notification: Notification,
        priority: Priority,
    ) -> DeliveryState {
        let envelope = ServerEnvelope::Notification {
            notification: notification.clone(),
        };
        let state = match self.deliver(user, &[envelope]).await {
            delivered @ DeliveryState::Delivered { .. } => delivered,
            _ => self.enqueue(user, &notification, priority),
        };
        log_delivery_state(user, &state);
        state
    }

    fn enqueue(&self, user: UserId, notification: &Notification, priority: Priority) -> DeliveryState {
        match self.outbox.enqueue(user, notification, priority) {
            Ok(()) => DeliveryState::Queued,
            Err(e) => {
                error!("Failed to queue notification for user {}: {}", user, e);
                DeliveryState::Failed
            }
        }
    }

    /// Push a newly registered connection everything queued for its user
    ///
    /// Returns how many notifications were delivered.
    pub fn drain_outbox(&self, handle: &ConnectionHandle) -> Result<usize> {
        let pending = self.outbox.fetch_pending_for(handle.user_id())?;
        let mut delivered = 0;

        for queued in pending {
            let id = queued.notification.id;
            if handle.send(ServerEnvelope::Notification {
                notification: queued.notification,
            }) {
                self.outbox.mark_delivered(id)?;
                delivered += 1;
            } else {
                self.outbox.mark_failed(id)?;
            }
        }

        if delivered > 0 {
            info!(
                "Delivered {} queued notifications to user {}",
                delivered,
                handle.user_id()
            );
        }
        Ok(delivered)
    }
}

/// Notification text for a recipient who missed a step
fn offline_notice(committed: &Committed) -> (Notification, Priority) {
    let message = &committed.message;
    let (title, priority) = match message.message_type {
        MessageType::Text => ("New message", Priority::Normal),
        MessageType::PriceOffer => ("New offer", Priority::Normal),
        MessageType::PriceCounter => ("Counter-offer received", Priority::Normal),
        MessageType::PriceAccept => ("Offer accepted", Priority::Normal),
        MessageType::PriceReject => ("Offer rejected", Priority::Normal),
        MessageType::PurchaseRequest => ("Purchase requested", Priority::High),
        MessageType::PurchaseConfirm => ("Purchase confirmed", Priority::High),
        MessageType::System => match committed.inquiry.status {
            InquiryStatus::Cancelled => ("Inquiry cancelled", Priority::Low),
            _ => ("Inquiry closed", Priority::Low),
        },
    };
    (
        Notification::for_inquiry(committed.inquiry.id, title, message.content.clone()),
        priority,
    )
}

/// Log delivery state
pub fn log_delivery_state(user: UserId, state: &DeliveryState) {
    match state {
        DeliveryState::Delivered { connections } => {
            debug!("Delivered to user {} on {} connections", user, connections);
        }
        DeliveryState::Queued => {
            info!("User {} offline, notification queued", user);
        }
        DeliveryState::Skipped => {
            debug!("User {} offline, nothing to deliver", user);
        }
        DeliveryState::Failed => {
            warn!("Delivery to user {} failed", user);
        }
    }
}
