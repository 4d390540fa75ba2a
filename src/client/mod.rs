//! Client-side connection controller
//!
//! This module provides:
//! - [`ChatClient`]: an explicitly opened and closed live-channel connection
//! - [`Backoff`]: the reconnect delay schedule
//! - [`LocalThread`]: pending/confirmed reconciliation of one thread
//! - [`FallbackClient`]: the HTTP endpoints used to recover after drops
//!
//! Connection states move `Disconnected → Connecting → Connected` and back to
//! `Disconnected` on any transport failure. Reconnects wait
//! `base × attempt` (capped); after the configured number of consecutive
//! failures the controller stops and emits [`ClientEvent::Offline`].

mod backoff;
mod fallback;
mod thread;

pub use backoff::Backoff;
pub use fallback::FallbackClient;
pub use thread::{Entry, LocalThread};

use crate::protocol::{ClientEnvelope, ServerEnvelope, StatusChange};
use crate::storage::{ClientSettings, InquiryId, MessageType, Price};
use crate::{Error, Result};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Live-channel connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel; a reconnect may be scheduled
    Disconnected,
    /// Attempt in progress
    Connecting,
    /// Channel open and authenticated
    Connected,
}

/// Everything a [`ChatClient`] reports to its subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connection state changed
    State(ConnectionState),
    /// A connection was re-established after a drop; refetch over HTTP
    Reconnected,
    /// Reconnection gave up; stays offline until reopened
    Offline {
        /// Consecutive failed attempts
        attempts: u32,
    },
    /// Envelope pushed by the server
    Envelope(ServerEnvelope),
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ClientEvent>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<ClientEnvelope>>>,
}

impl Shared {
    fn set_state(&self, state: ConnectionState) {
        let changed = self.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
        if changed {
            self.emit(ClientEvent::State(state));
        }
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_outgoing(&self, sender: Option<mpsc::UnboundedSender<ClientEnvelope>>) {
        *self.outgoing.lock().unwrap_or_else(|e| e.into_inner()) = sender;
    }

    fn send(&self, envelope: ClientEnvelope) -> bool {
        self.outgoing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|sender| sender.send(envelope).is_ok())
            .unwrap_or(false)
    }
}

/// Reconnecting live-channel client
///
/// Owned by the application's composition root; nothing is global. Each
/// call to [`ChatClient::subscribe`] yields an independent event receiver.
pub struct ChatClient {
    settings: ClientSettings,
    token: String,
    shared: Arc<Shared>,
    task: Option<JoinHandle<()>>,
}

impl ChatClient {
    /// Create a closed client
    pub fn new(settings: ClientSettings, token: impl Into<String>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(settings.event_buffer.max(1));
        Self {
            settings,
            token: token.into(),
            shared: Arc::new(Shared {
                state,
                events,
                outgoing: Mutex::new(None),
            }),
            task: None,
        }
    }

    /// Start connecting in the background; no-op when already open
    pub fn open(&mut self) {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return;
        }
        let shared = self.shared.clone();
        let settings = self.settings.clone();
        let token = self.token.clone();
        self.task = Some(tokio::spawn(run(shared, settings, token)));
    }

    /// Stop the connection task and drop the channel
    pub fn close(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.shared.set_outgoing(None);
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Independent event receiver; drop it to unsubscribe
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Wait until the client reaches `state`
    pub async fn wait_for(&self, state: ConnectionState, timeout: Duration) -> Result<()> {
        let mut watcher = self.shared.state.subscribe();
        tokio::time::timeout(timeout, watcher.wait_for(|current| *current == state))
            .await
            .map_err(|_| Error::ConnectionTimeout)?
            .map_err(|_| Error::NotConnected)?;
        Ok(())
    }

    /// Send a text or price message; returns its `clientRef`
    pub fn send_chat(
        &self,
        inquiry_id: InquiryId,
        message_type: MessageType,
        content: impl Into<String>,
        price_amount: Option<Price>,
    ) -> Result<String> {
        let client_ref = new_client_ref();
        self.send_required(ClientEnvelope::ChatMessage {
            inquiry_id,
            content: content.into(),
            message_type,
            price_amount,
            client_ref: Some(client_ref.clone()),
        })?;
        Ok(client_ref)
    }

    /// Ask to buy at the agreed price; returns the `clientRef`
    pub fn request_purchase(
        &self,
        inquiry_id: InquiryId,
        final_price: Price,
        message: Option<String>,
    ) -> Result<String> {
        let client_ref = new_client_ref();
        self.send_required(ClientEnvelope::PurchaseRequest {
            inquiry_id,
            final_price,
            message,
            client_ref: Some(client_ref.clone()),
        })?;
        Ok(client_ref)
    }

    /// Confirm the sale (owner); returns the `clientRef`
    pub fn confirm_purchase(&self, inquiry_id: InquiryId, message: Option<String>) -> Result<String> {
        let client_ref = new_client_ref();
        self.send_required(ClientEnvelope::PurchaseConfirm {
            inquiry_id,
            message,
            client_ref: Some(client_ref.clone()),
        })?;
        Ok(client_ref)
    }

    /// Cancel or close the inquiry; returns the `clientRef`
    pub fn update_status(
        &self,
        inquiry_id: InquiryId,
        status: StatusChange,
        message: Option<String>,
    ) -> Result<String> {
        let client_ref = new_client_ref();
        self.send_required(ClientEnvelope::UpdateStatus {
            inquiry_id,
            status,
            message,
            client_ref: Some(client_ref.clone()),
        })?;
        Ok(client_ref)
    }

    /// Send a read receipt; `Ok(false)` if dropped while disconnected
    pub fn mark_read(&self, inquiry_id: InquiryId) -> Result<bool> {
        Ok(self.shared.send(ClientEnvelope::MarkRead { inquiry_id }))
    }

    /// Send a typing signal; `Ok(false)` if dropped while disconnected
    pub fn typing(&self, inquiry_id: InquiryId, is_typing: bool) -> Result<bool> {
        Ok(self.shared.send(ClientEnvelope::Typing {
            inquiry_id,
            is_typing,
        }))
    }

    fn send_required(&self, envelope: ClientEnvelope) -> Result<()> {
        if self.state() != ConnectionState::Connected || !self.shared.send(envelope) {
            return Err(Error::NotConnected);
        }
        Ok(())
    }
}

impl Drop for ChatClient {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn new_client_ref() -> String {
    Uuid::new_v4().to_string()
}

/// Live-channel URL for a server base URL
pub fn websocket_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}/ws", base)
}

/// Connect, serve and reconnect until closed or out of attempts
async fn run(shared: Arc<Shared>, settings: ClientSettings, token: String) {
    let mut backoff = Backoff::from_settings(&settings);
    let mut connected_before = false;

    loop {
        shared.set_state(ConnectionState::Connecting);

        match connect(&settings, &token).await {
            Ok(socket) => {
                backoff.reset();
                // Sends are accepted as soon as the state reads Connected
                let (sender, outgoing) = mpsc::unbounded_channel();
                shared.set_outgoing(Some(sender));
                shared.set_state(ConnectionState::Connected);
                if connected_before {
                    info!("Reconnected to {}", settings.server_url);
                    shared.emit(ClientEvent::Reconnected);
                } else {
                    info!("Connected to {}", settings.server_url);
                }
                connected_before = true;

                if let Err(e) = serve(socket, outgoing, &shared, &settings).await {
                    warn!("Connection lost: {}", e);
                }
                shared.set_outgoing(None);
                shared.set_state(ConnectionState::Disconnected);
            }
            Err(e) => {
                warn!("Connection attempt failed: {}", e);
                shared.set_state(ConnectionState::Disconnected);
            }
        }

        if backoff.is_exhausted() {
            warn!("Giving up after {} reconnect attempts", backoff.attempt());
            shared.emit(ClientEvent::Offline {
                attempts: backoff.attempt(),
            });
            return;
        }
        if let Some(delay) = backoff.next_delay() {
            debug!("Reconnect attempt {} in {:?}", backoff.attempt(), delay);
            tokio::time::sleep(delay).await;
        }
    }
}

async fn connect(settings: &ClientSettings, token: &str) -> Result<Socket> {
    let mut request = websocket_url(&settings.server_url).into_client_request()?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| Error::Transport(format!("Invalid token: {}", e)))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    let timeout = Duration::from_millis(settings.connect_timeout_ms);
    let (socket, _response) = tokio::time::timeout(timeout, connect_async(request))
        .await
        .map_err(|_| Error::ConnectionTimeout)??;
    Ok(socket)
}

/// Pump one connection until it fails or the server closes it
async fn serve(
    socket: Socket,
    mut outgoing: mpsc::UnboundedReceiver<ClientEnvelope>,
    shared: &Shared,
    settings: &ClientSettings,
) -> Result<()> {
    let (mut sink, mut stream) = socket.split();

    let idle_timeout = Duration::from_millis(settings.idle_timeout_ms);
    let mut heartbeat = tokio::time::interval(Duration::from_millis(settings.heartbeat_interval_ms));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                let frame = match inbound {
                    Some(frame) => frame?,
                    None => return Ok(()),
                };
                last_seen = Instant::now();

                let decoded = match frame {
                    Frame::Text(text) => ServerEnvelope::from_json(text.as_str()),
                    Frame::Binary(data) => ServerEnvelope::from_cbor(&data),
                    Frame::Close(_) => return Ok(()),
                    Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_) => continue,
                };
                match decoded {
                    Ok(ServerEnvelope::Pong) => {}
                    Ok(envelope) => shared.emit(ClientEvent::Envelope(envelope)),
                    Err(e) => warn!("Ignoring undecodable server frame: {}", e),
                }
            }
            envelope = outgoing.recv() => {
                let Some(envelope) = envelope else { return Ok(()) };
                sink.send(Frame::text(envelope.to_json()?)).await?;
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > idle_timeout {
                    return Err(Error::ConnectionTimeout);
                }
                sink.send(Frame::text(ClientEnvelope::Ping.to_json()?)).await?;
            }
        }
    }
}
