//! Network transport module
//!
//! This module handles the server side of the network:
//! - HTTP/1 listener (hyper) with the REST fallback endpoints
//! - WebSocket upgrade at `GET /ws` for the live channel
//! - Per-socket loop: inbound decode, outbound encode, heartbeat, idle drop
//! - JSON text frames and CBOR binary frames
//!
//! Authentication happens once per request or socket, before anything is
//! registered or read.

use crate::api::{ApiError, InquiryThread, ListAs, UnreadCount};
use crate::auth::{bearer_token, query_param, query_token, Identity};
use crate::hub::Hub;
use crate::negotiation::Action;
use crate::protocol::{
    decode_binary, decode_text, parse_command, parse_create_inquiry, ErrorCode, ServerEnvelope, ValidationError,
};
use crate::storage::InquiryId;
use crate::{Error, Result};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::{
    HeaderValue, CONNECTION, CONTENT_TYPE, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role as SocketRole;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

/// Frame encoding of a live connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wire {
    /// JSON text frames
    Json,
    /// CBOR binary frames
    Cbor,
}

impl Wire {
    /// Encode an envelope as a frame of this kind
    pub fn encode(self, envelope: &ServerEnvelope) -> Result<Frame> {
        match self {
            Wire::Json => Ok(Frame::text(envelope.to_json()?)),
            Wire::Cbor => Ok(Frame::binary(envelope.to_cbor()?)),
        }
    }
}

/// HTTP + WebSocket server
pub struct Server {
    hub: Arc<Hub>,
    local_addr: Option<SocketAddr>,
    accept_task: Option<JoinHandle<()>>,
    // Dropped on shutdown; live sockets close when it goes away
    stop: Option<watch::Sender<()>>,
}

impl Server {
    /// Create a server over a hub
    pub fn new(hub: Arc<Hub>) -> Self {
        Self {
            hub,
            local_addr: None,
            accept_task: None,
            stop: None,
        }
    }

    /// Bind and start accepting connections in the background
    ///
    /// Returns the bound address, which differs from `addr` when port 0 is
    /// requested.
    pub async fn start(&mut self, addr: SocketAddr) -> Result<SocketAddr> {
        info!("Starting server on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        let actual_addr = listener
            .local_addr()
            .map_err(|e| Error::Transport(format!("Failed to get local address: {}", e)))?;
        self.local_addr = Some(actual_addr);

        let (stop, stopped) = watch::channel(());
        self.stop = Some(stop);

        let hub = self.hub.clone();
        self.accept_task = Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote_addr)) => {
                        debug!("Accepted connection from {}", remote_addr);

                        let io = TokioIo::new(stream);
                        let hub = hub.clone();
                        let stopped = stopped.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                handle_request(req, hub.clone(), stopped.clone())
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .with_upgrades()
                                .await
                            {
                                debug!("Error serving connection from {}: {}", remote_addr, e);
                            }
                        });
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
        }));

        info!("Server listening on {}", actual_addr);
        Ok(actual_addr)
    }

    /// Get the local listening address
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop accepting new connections and close live sockets
    pub fn shutdown(&mut self) {
        self.stop = None;
        if let Some(task) = self.accept_task.take() {
            task.abort();
            info!("Server stopped accepting connections");
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}

type HttpResponse = Response<Full<Bytes>>;

/// Handle incoming HTTP requests
async fn handle_request(
    req: Request<Incoming>,
    hub: Arc<Hub>,
    stopped: watch::Receiver<()>,
) -> std::result::Result<HttpResponse, hyper::Error> {
    let path = req.uri().path().to_string();

    if req.method() == Method::GET && path == "/health" {
        return Ok(text_response(StatusCode::OK, "ok"));
    }
    if req.method() == Method::GET && path == "/ws" {
        return Ok(upgrade_websocket(req, hub, stopped));
    }
    if !path.starts_with("/api/") {
        debug!("Received unsupported request: {} {}", req.method(), path);
        return Ok(error_body(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Not Found"));
    }

    let identity = match bearer_token(req.headers()).map(|token| hub.authenticate(token)) {
        Some(Ok(identity)) => identity,
        _ => return Ok(error_response(&Error::Unauthorized)),
    };

    let method = req.method().clone();
    let query = req.uri().query().map(str::to_string);
    let body = req.collect().await?.to_bytes();
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    debug!("{} {} by user {}", method, path, identity.user_id);

    let response = match (method, segments.as_slice()) {
        (Method::GET, ["api", "inquiries"]) => list_inquiries(&hub, &identity, query.as_deref()),
        (Method::POST, ["api", "inquiries"]) => create_inquiry(&hub, &identity, &body).await,
        (Method::GET, ["api", "inquiries", "unread-count"]) => hub
            .unread_count(&identity)
            .map(|unread_count| json_response(StatusCode::OK, &UnreadCount { unread_count })),
        (Method::GET, ["api", "inquiries", id]) => match parse_id(id) {
            Ok(id) => hub.thread(&identity, id).map(|(inquiry, messages)| {
                json_response(StatusCode::OK, &InquiryThread { inquiry, messages })
            }),
            Err(e) => Err(e),
        },
        (Method::POST, ["api", "inquiries", id, "messages"]) => match parse_id(id) {
            Ok(id) => post_message(&hub, &identity, id, &body).await,
            Err(e) => Err(e),
        },
        (Method::POST, ["api", "inquiries", id, "read"]) => match parse_id(id) {
            Ok(id) => hub
                .mark_read(&identity, id)
                .await
                .map(|receipt| json_response(StatusCode::OK, &receipt)),
            Err(e) => Err(e),
        },
        (Method::PATCH, ["api", "inquiries", id, "status"]) => match parse_id(id) {
            Ok(id) => change_status(&hub, &identity, id, &body).await,
            Err(e) => Err(e),
        },
        _ => Ok(error_body(StatusCode::NOT_FOUND, ErrorCode::NotFound, "Not Found")),
    };

    Ok(response.unwrap_or_else(|e| error_response(&e)))
}

fn list_inquiries(hub: &Hub, identity: &Identity, query: Option<&str>) -> Result<HttpResponse> {
    let filter = match query_param(query, "as") {
        Some(raw) => Some(ListAs::parse(&raw).ok_or_else(|| {
            Error::Validation(ValidationError::Invalid {
                field: "as",
                reason: format!("{} is not client, owner or all", raw),
            })
        })?),
        None => None,
    };
    let inquiries = hub.list(identity, filter)?;
    Ok(json_response(StatusCode::OK, &inquiries))
}

async fn create_inquiry(hub: &Hub, identity: &Identity, body: &[u8]) -> Result<HttpResponse> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::Validation(ValidationError::Malformed(e.to_string())))?;
    let request = parse_create_inquiry(&value, hub.settings().max_content_len)
        .map_err(Error::Validation)?;

    let (inquiry, _messages) = hub
        .open_inquiry(
            identity,
            request.property_id,
            request.message,
            request.offered_price,
        )
        .await?;
    Ok(json_response(StatusCode::CREATED, &inquiry))
}

async fn post_message(
    hub: &Hub,
    identity: &Identity,
    inquiry_id: InquiryId,
    body: &[u8],
) -> Result<HttpResponse> {
    let action = action_from_body(hub, inquiry_id, "CHAT_MESSAGE", body)?;
    let committed = hub.submit(identity, inquiry_id, action, None).await?;
    Ok(json_response(StatusCode::CREATED, &committed.message))
}

async fn change_status(
    hub: &Hub,
    identity: &Identity,
    inquiry_id: InquiryId,
    body: &[u8],
) -> Result<HttpResponse> {
    let action = action_from_body(hub, inquiry_id, "UPDATE_STATUS", body)?;
    let committed = hub.submit(identity, inquiry_id, action, None).await?;
    Ok(json_response(StatusCode::OK, &committed.inquiry))
}

/// Run an HTTP body through the same validation as a live-channel envelope
fn action_from_body(hub: &Hub, inquiry_id: InquiryId, kind: &str, body: &[u8]) -> Result<Action> {
    let mut value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::Validation(ValidationError::Malformed(e.to_string())))?;
    let fields = value.as_object_mut().ok_or_else(|| {
        Error::Validation(ValidationError::Malformed(
            "body must be an object".to_string(),
        ))
    })?;
    fields.insert("type".to_string(), Value::from(kind));
    fields.insert("inquiryId".to_string(), Value::from(inquiry_id.0));

    let command = parse_command(&value, hub.settings().max_content_len)
        .map_err(|rejection| Error::Validation(rejection.error))?;
    Action::from_command(&command).ok_or_else(|| {
        Error::Validation(ValidationError::UnknownType(kind.to_string()))
    })
}

fn parse_id(raw: &str) -> Result<InquiryId> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .map(InquiryId)
        .ok_or_else(|| {
            Error::Validation(ValidationError::Invalid {
                field: "inquiryId",
                reason: "must be a positive integer".to_string(),
            })
        })
}

/// Validate a WebSocket upgrade and hand the socket to [`serve_socket`]
fn upgrade_websocket(
    mut req: Request<Incoming>,
    hub: Arc<Hub>,
    stopped: watch::Receiver<()>,
) -> HttpResponse {
    let token = bearer_token(req.headers())
        .map(Cow::Borrowed)
        .or_else(|| query_token(req.uri().query()));
    let identity = match token.map(|token| hub.authenticate(&token)) {
        Some(Ok(identity)) => identity,
        _ => {
            warn!("Rejected unauthenticated WebSocket upgrade");
            return error_response(&Error::Unauthorized);
        }
    };

    let headers = req.headers();
    let wants_upgrade = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
        .unwrap_or(false)
        && headers
            .get(UPGRADE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false)
        && headers
            .get(SEC_WEBSOCKET_VERSION)
            .map(|v| v.as_bytes() == b"13")
            .unwrap_or(false);

    let accept = match headers.get(SEC_WEBSOCKET_KEY) {
        Some(key) if wants_upgrade => derive_accept_key(key.as_bytes()),
        _ => {
            return error_body(
                StatusCode::BAD_REQUEST,
                ErrorCode::Validation,
                "Expected a WebSocket upgrade",
            )
        }
    };

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let socket =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), SocketRole::Server, None)
                        .await;
                serve_socket(socket, hub, identity, stopped).await;
            }
            Err(e) => warn!("WebSocket upgrade failed: {}", e),
        }
    });

    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = response.headers_mut();
    headers.insert(UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(CONNECTION, HeaderValue::from_static("Upgrade"));
    if let Ok(value) = HeaderValue::from_str(&accept) {
        headers.insert(SEC_WEBSOCKET_ACCEPT, value);
    }
    response
}

/// Drive one live connection until it closes, errors or goes idle
async fn serve_socket<S>(
    socket: WebSocketStream<S>,
    hub: Arc<Hub>,
    identity: Identity,
    mut stopped: watch::Receiver<()>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (handle, mut outbound) = hub.connect(identity).await;
    let (mut sink, mut stream) = socket.split();

    let settings = hub.settings().clone();
    let idle_timeout = Duration::from_millis(settings.idle_timeout_ms);
    let mut heartbeat = tokio::time::interval(Duration::from_millis(settings.heartbeat_interval_ms));
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    heartbeat.tick().await;

    let mut wire = Wire::Json;
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            inbound = stream.next() => {
                let frame = match inbound {
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        debug!("Connection {} read error: {}", handle.id, e);
                        break;
                    }
                    None => break,
                };
                last_seen = Instant::now();

                let decoded = match frame {
                    Frame::Text(text) => {
                        wire = Wire::Json;
                        decode_text(text.as_str(), settings.max_content_len)
                    }
                    Frame::Binary(data) => {
                        wire = Wire::Cbor;
                        decode_binary(&data, settings.max_content_len)
                    }
                    Frame::Close(_) => break,
                    Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_) => continue,
                };

                match decoded {
                    Ok(command) => hub.handle_command(&handle, command).await,
                    Err(rejection) => {
                        debug!("Rejected envelope on connection {}: {}", handle.id, rejection.error);
                        handle.send(ServerEnvelope::rejection(rejection));
                    }
                }
            }
            envelope = outbound.recv() => {
                let Some(envelope) = envelope else { break };
                let frame = match wire.encode(&envelope) {
                    Ok(frame) => frame,
                    Err(e) => {
                        error!("Failed to encode envelope for connection {}: {}", handle.id, e);
                        continue;
                    }
                };
                if let Err(e) = sink.send(frame).await {
                    debug!("Connection {} write error: {}", handle.id, e);
                    break;
                }
            }
            _ = stopped.changed() => {
                debug!("Closing connection {}: server shutting down", handle.id);
                break;
            }
            _ = heartbeat.tick() => {
                if last_seen.elapsed() > idle_timeout {
                    info!("Dropping idle connection {} (user {})", handle.id, handle.user_id());
                    break;
                }
                if sink.send(Frame::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    hub.disconnect(handle.id).await;
    let _ = sink.close().await;
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_body(status, "application/json", bytes),
        Err(e) => {
            error!("Failed to serialize response: {}", e);
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Internal,
                "Internal server error",
            )
        }
    }
}

fn text_response(status: StatusCode, body: &'static str) -> HttpResponse {
    with_body(status, "text/plain", body)
}

fn with_body(status: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn error_body(status: StatusCode, code: ErrorCode, message: &str) -> HttpResponse {
    let body = ApiError {
        code,
        message: message.to_string(),
    };
    match serde_json::to_vec(&body) {
        Ok(bytes) => with_body(status, "application/json", bytes),
        Err(_) => text_response(status, "error"),
    }
}

/// Map a crate error to its HTTP status and `{code, message}` body
fn error_response(err: &Error) -> HttpResponse {
    let code = err.code();
    let status = StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if code == ErrorCode::Internal {
        error!("Request failed: {}", err);
        return error_body(status, code, "Internal server error");
    }
    error_body(status, code, &err.to_string())
}
