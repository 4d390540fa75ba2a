//! Server core
//!
//! The [`Hub`] ties the pieces together. Every mutating action goes through
//! the same path, whether it arrived over the live channel or the HTTP
//! fallback:
//!
//! 1. acquire the inquiry's lock (bounded wait)
//! 2. [`NegotiationEngine::apply`]
//! 3. [`Dispatcher::persist`] (one SQLite transaction)
//! 4. release the lock
//! 5. [`Dispatcher::publish`]
//!
//! Failures are returned to the caller, which reports them to the sender's
//! own connection only.

use crate::api::{ListAs, ReadReceipt};
use crate::auth::{Identity, IdentityProvider};
use crate::dispatch::{Committed, Dispatcher};
use crate::negotiation::{Action, InquiryLocks, NegotiationEngine, NegotiationError, OpenInquiry};
use crate::outbox::{Notification, Outbox, Priority};
use crate::protocol::{check_length, Command, ServerEnvelope};
use crate::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use crate::storage::{
    now_millis, Inquiry, InquiryId, InquiryScope, Message, Price, PropertyCatalog, PropertyId,
    Role, ServerSettings, Store,
};
use crate::typing::TypingTracker;
use crate::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Composition of store, engine, locks, registry and dispatcher
pub struct Hub {
    settings: ServerSettings,
    store: Arc<Store>,
    engine: NegotiationEngine,
    locks: InquiryLocks,
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    typing: Arc<TypingTracker>,
    identities: Arc<dyn IdentityProvider>,
}

impl Hub {
    /// Assemble a hub
    ///
    /// # Arguments
    /// * `settings` - Server tunables (lock timeout, typing expiry, ...)
    /// * `store` - Inquiry and message store
    /// * `catalog` - Property catalog collaborator
    /// * `outbox` - Out-of-band notification queue
    /// * `identities` - Bearer token resolver
    pub fn new(
        settings: ServerSettings,
        store: Arc<Store>,
        catalog: Arc<dyn PropertyCatalog>,
        outbox: Arc<Outbox>,
        identities: Arc<dyn IdentityProvider>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            engine: NegotiationEngine::new(store.clone(), catalog.clone()),
            locks: InquiryLocks::new(Duration::from_millis(settings.lock_timeout_ms)),
            dispatcher: Dispatcher::new(store.clone(), catalog, registry.clone(), outbox),
            typing: Arc::new(TypingTracker::new(Duration::from_millis(
                settings.typing_expiry_ms,
            ))),
            registry,
            store,
            identities,
            settings,
        }
    }

    /// Server tunables
    pub fn settings(&self) -> &ServerSettings {
        &self.settings
    }

    /// Live connection index
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Resolve a bearer token
    pub fn authenticate(&self, token: &str) -> Result<Identity> {
        self.identities.authenticate(token)
    }

    // ========== Connections ==========

    /// Register a new live connection and push its queued notifications
    pub async fn connect(
        &self,
        identity: Identity,
    ) -> (ConnectionHandle, mpsc::UnboundedReceiver<ServerEnvelope>) {
        let (handle, receiver) = ConnectionHandle::new(identity);
        self.registry.register(handle.clone()).await;
        info!(
            "User {} connected ({:?}, connection {}); {} connections from {} users",
            handle.user_id(),
            handle.identity.role,
            handle.id,
            self.registry.connection_count().await,
            self.registry.user_count().await
        );

        if let Err(e) = self.dispatcher.drain_outbox(&handle) {
            warn!("Failed to drain outbox for user {}: {}", handle.user_id(), e);
        }

        (handle, receiver)
    }

    /// Forget a connection; in-flight transitions are unaffected
    pub async fn disconnect(&self, id: ConnectionId) {
        if let Some(handle) = self.registry.unregister(id).await {
            info!("User {} disconnected (connection {})", handle.user_id(), id);
            if !self.registry.is_online(handle.user_id()).await {
                debug!("User {} has no live connections left", handle.user_id());
            }
        }
    }

    /// Handle one validated command from a live connection
    ///
    /// Failures are answered with an `ERROR` envelope on this connection only.
    pub async fn handle_command(&self, handle: &ConnectionHandle, command: Command) {
        let inquiry_id = command.inquiry_id();
        let client_ref = command.client_ref().map(str::to_string);
        let identity = &handle.identity;

        let outcome = match command {
            Command::Ping => {
                handle.send(ServerEnvelope::Pong);
                Ok(())
            }
            Command::Typing {
                inquiry_id,
                is_typing,
            } => self.typing(identity, inquiry_id, is_typing).await,
            Command::MarkRead { inquiry_id } => {
                self.mark_read(identity, inquiry_id).await.map(|_| ())
            }
            ref mutating => match (Action::from_command(mutating), inquiry_id) {
                (Some(action), Some(id)) => self
                    .submit(identity, id, action, client_ref.clone())
                    .await
                    .map(|_| ()),
                _ => Ok(()),
            },
        };

        if let Err(e) = outcome {
            debug!("Rejected command from user {}: {}", identity.user_id, e);
            handle.send(ServerEnvelope::error(inquiry_id, client_ref, &e));
        }
    }

    // ========== Negotiation ==========

    /// Run one mutating action through lock → engine → persist → publish
    pub async fn submit(
        &self,
        identity: &Identity,
        inquiry_id: InquiryId,
        action: Action,
        client_ref: Option<String>,
    ) -> Result<Committed> {
        let committed = {
            let _guard = self.locks.acquire(inquiry_id).await?;
            let decision = self.engine.apply(inquiry_id, identity.user_id, &action)?;
            self.dispatcher.persist(decision, client_ref)?
        };

        self.dispatcher.publish(&committed).await;
        Ok(committed)
    }

    /// Open a new inquiry and notify the owner
    pub async fn open_inquiry(
        &self,
        identity: &Identity,
        property_id: PropertyId,
        message: Option<String>,
        offered_price: Option<Price>,
    ) -> Result<(Inquiry, Vec<Message>)> {
        if identity.is_admin() {
            return Err(Error::Forbidden(
                "admins cannot open inquiries".to_string(),
            ));
        }

        if let Some(text) = message.as_deref() {
            check_length("message", text.trim(), self.settings.max_content_len)
                .map_err(Error::Validation)?;
        }

        let (inquiry, messages) = self.engine.open(&OpenInquiry {
            property_id,
            client_id: identity.user_id,
            message,
            offered_price,
        })?;

        info!(
            "Inquiry {} opened by user {} on property {}",
            inquiry.id, inquiry.client_id, inquiry.property_id
        );

        let body = match inquiry.offered_price {
            Some(offer) => format!("New inquiry on property {} with an offer of {}", property_id, offer),
            None => format!("New inquiry on property {}", property_id),
        };
        self.dispatcher
            .notify(
                inquiry.owner_id,
                Notification::for_inquiry(inquiry.id, "New inquiry", body),
                Priority::Normal,
            )
            .await;

        Ok((inquiry, messages))
    }

    // ========== Best-effort signals ==========

    /// Mark the counterpart's messages as read and send a receipt
    ///
    /// Allowed on terminal inquiries. Repeating it is a no-op.
    pub async fn mark_read(&self, identity: &Identity, inquiry_id: InquiryId) -> Result<ReadReceipt> {
        let inquiry = self.participant_inquiry(identity, inquiry_id)?;
        let read_at = now_millis();
        let count = self.store.mark_read(inquiry_id, identity.user_id, read_at)?;

        if count > 0 {
            let receipt = ServerEnvelope::MessagesRead {
                inquiry_id,
                reader_id: identity.user_id,
                count,
                read_at,
            };
            self.dispatcher
                .deliver_to(&inquiry.participants(), &receipt)
                .await;
        }

        Ok(ReadReceipt { inquiry_id, count })
    }

    /// Forward a typing signal to the counterpart
    ///
    /// Dropped silently on terminal inquiries. A started indicator clears
    /// itself after the configured expiry unless renewed.
    pub async fn typing(&self, identity: &Identity, inquiry_id: InquiryId, is_typing: bool) -> Result<()> {
        let inquiry = self.participant_inquiry(identity, inquiry_id)?;
        if inquiry.status.is_terminal() {
            return Ok(());
        }
        let Some(counterpart) = inquiry.counterpart(identity.user_id) else {
            return Ok(());
        };

        let indicator = |is_typing| ServerEnvelope::TypingIndicator {
            inquiry_id,
            user_id: identity.user_id,
            is_typing,
            sender_name: identity.display_name.clone(),
        };

        if !is_typing {
            self.typing.stop(inquiry_id, identity.user_id);
            self.dispatcher.deliver(counterpart, &[indicator(false)]).await;
            return Ok(());
        }

        let generation = self.typing.start(inquiry_id, identity.user_id);
        self.dispatcher.deliver(counterpart, &[indicator(true)]).await;

        let tracker = self.typing.clone();
        let registry = self.registry.clone();
        let expired = indicator(false);
        let user = identity.user_id;
        tokio::spawn(async move {
            tokio::time::sleep(tracker.expiry()).await;
            if tracker.expire(inquiry_id, user, generation) {
                for handle in registry.connections_for(counterpart).await {
                    handle.send(expired.clone());
                }
            }
        });

        Ok(())
    }

    // ========== Reads ==========

    /// One inquiry with its full history; participants and admins only
    pub fn thread(&self, identity: &Identity, inquiry_id: InquiryId) -> Result<(Inquiry, Vec<Message>)> {
        let inquiry = self.load(inquiry_id)?;
        if !identity.is_admin() && !inquiry.is_participant(identity.user_id) {
            return Err(forbidden());
        }
        let messages = self.store.load_messages(inquiry_id)?;
        Ok((inquiry, messages))
    }

    /// The caller's inquiries, most recently updated first
    ///
    /// Without an explicit filter, clients see their purchases, agents their
    /// listings and admins everything.
    pub fn list(&self, identity: &Identity, filter: Option<ListAs>) -> Result<Vec<Inquiry>> {
        let filter = filter.unwrap_or(match identity.role {
            Role::Client => ListAs::Client,
            Role::Agent => ListAs::Owner,
            Role::Admin => ListAs::All,
        });

        let scope = match filter {
            ListAs::Client => InquiryScope::AsClient(identity.user_id),
            ListAs::Owner => InquiryScope::AsOwner(identity.user_id),
            ListAs::All if identity.is_admin() => InquiryScope::All,
            ListAs::All => {
                return Err(Error::Forbidden(
                    "only admins can list every inquiry".to_string(),
                ))
            }
        };

        self.store.list_inquiries(scope)
    }

    /// Unread messages addressed to the caller
    pub fn unread_count(&self, identity: &Identity) -> Result<i64> {
        self.store.unread_count(identity.user_id)
    }

    fn load(&self, inquiry_id: InquiryId) -> Result<Inquiry> {
        self.store
            .load_inquiry(inquiry_id)?
            .ok_or_else(|| NegotiationError::NotFound(inquiry_id).into())
    }

    fn participant_inquiry(&self, identity: &Identity, inquiry_id: InquiryId) -> Result<Inquiry> {
        let inquiry = self.load(inquiry_id)?;
        if !inquiry.is_participant(identity.user_id) {
            return Err(forbidden());
        }
        Ok(inquiry)
    }
}

fn forbidden() -> Error {
    NegotiationError::Forbidden("not a participant of this inquiry".to_string()).into()
}
