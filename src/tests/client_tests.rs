use super::support::*;
use crate::client::*;
use crate::protocol::{ErrorCode, ServerEnvelope};
use crate::storage::{ClientSettings, InquiryId, Message, MessageId, MessageType, UserId};
use crate::Error;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

const THREAD: InquiryId = InquiryId(7);

// Helper function to create a stored message
fn message(id: i64, sender: UserId, sent_at: i64, content: &str) -> Message {
    Message {
        id: MessageId(id),
        inquiry_id: THREAD,
        sender_id: sender,
        message_type: MessageType::Text,
        content: content.to_string(),
        price_amount: None,
        sent_at,
        is_read: false,
        read_at: None,
    }
}

// Backoff

#[test]
fn test_backoff_is_linear_and_capped() {
    let mut backoff = Backoff::new(Duration::from_secs(3), Duration::from_secs(10), 5);

    assert_eq!(backoff.next_delay(), Some(Duration::from_secs(3)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_secs(6)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_secs(9)));
    assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
    assert_eq!(backoff.attempt(), 4);
    assert!(!backoff.is_exhausted());

    assert_eq!(backoff.next_delay(), Some(Duration::from_secs(10)));
    assert!(backoff.is_exhausted());
    assert_eq!(backoff.next_delay(), None);
    assert_eq!(backoff.attempt(), 5);
}

#[test]
fn test_backoff_reset() {
    let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(1), 2);
    backoff.next_delay();
    backoff.next_delay();
    assert!(backoff.is_exhausted());

    backoff.reset();
    assert_eq!(backoff.attempt(), 0);
    assert_eq!(backoff.next_delay(), Some(Duration::from_millis(100)));
}

#[test]
fn test_backoff_from_default_settings() {
    let backoff = Backoff::from_settings(&ClientSettings::default());
    assert_eq!(backoff.delay_for(1), Duration::from_secs(3));
    assert_eq!(backoff.delay_for(5), Duration::from_secs(15));
    assert_eq!(backoff.delay_for(20), Duration::from_secs(30));
}

// Local thread reconciliation

#[test]
fn test_pending_then_confirmed() {
    let mut thread = LocalThread::from_history(THREAD, vec![message(1, OWNER, 1_000, "Hi")]);
    thread.push_pending("ref-1", MessageType::Text, "Hello back", None);
    assert_eq!(thread.len(), 2);
    assert_eq!(thread.pending_count(), 1);
    assert_eq!(thread.entries()[1].client_ref(), Some("ref-1"));

    let echo = ServerEnvelope::NewMessage {
        inquiry_id: THREAD,
        message: message(2, CLIENT, 2_000, "Hello back"),
        client_ref: Some("ref-1".to_string()),
    };
    assert!(thread.apply(&echo));

    assert_eq!(thread.pending_count(), 0);
    assert_eq!(thread.len(), 2);
    let ids: Vec<_> = thread.messages().map(|m| m.id).collect();
    assert_eq!(ids, vec![MessageId(1), MessageId(2)]);
}

#[test]
fn test_pending_then_failed() {
    let mut thread = LocalThread::new(THREAD);
    thread.push_pending("ref-2", MessageType::PriceAccept, "", None);

    let error = ServerEnvelope::Error {
        inquiry_id: Some(THREAD),
        code: ErrorCode::NotYourTurn,
        message: "Not your turn: cannot accept your own offer".to_string(),
        client_ref: Some("ref-2".to_string()),
    };
    assert!(thread.apply(&error));

    match &thread.entries()[0] {
        Entry::Failed { client_ref, reason, .. } => {
            assert_eq!(client_ref, "ref-2");
            assert!(reason.contains("own offer"));
        }
        other => panic!("Expected failed entry, got {:?}", other),
    }
    assert_eq!(thread.pending_count(), 0);

    // Unknown tags change nothing
    assert!(!thread.fail("ref-unknown", "whatever"));
}

#[test]
fn test_merge_never_duplicates() {
    let history = vec![message(1, CLIENT, 1_000, "a"), message(2, OWNER, 1_500, "b")];
    let mut thread = LocalThread::from_history(THREAD, history.clone());

    // Refetch after a reconnect returns the same rows plus a new one
    let mut refetched = history;
    refetched.push(message(3, OWNER, 1_800, "c"));
    thread.merge(refetched.clone());
    thread.merge(refetched);

    assert_eq!(thread.len(), 3);
    assert_eq!(thread.messages().last().map(|m| m.content.as_str()), Some("c"));
}

#[test]
fn test_echo_after_refetch_does_not_duplicate() {
    let mut thread = LocalThread::new(THREAD);
    thread.push_pending("ref-3", MessageType::Text, "Still there?", None);

    // The HTTP refetch saw the message before the live echo arrived
    let stored = message(5, CLIENT, 3_000, "Still there?");
    thread.merge(vec![stored.clone()]);
    thread.confirm("ref-3", stored);

    assert_eq!(thread.len(), 1);
    assert_eq!(thread.pending_count(), 0);
}

#[test]
fn test_thread_ordering() {
    let mut thread = LocalThread::new(THREAD);
    thread.push_pending("ref-4", MessageType::Text, "draft", None);
    thread.merge(vec![
        message(9, OWNER, 2_000, "later"),
        message(4, CLIENT, 1_000, "earlier"),
        message(3, OWNER, 2_000, "tie"),
    ]);

    let contents: Vec<_> = thread.messages().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["earlier", "tie", "later"]);

    // Unconfirmed entries trail the history
    assert!(thread.entries().last().and_then(Entry::client_ref).is_some());
}

#[test]
fn test_apply_ignores_other_threads() {
    let mut thread = LocalThread::new(THREAD);
    let mut foreign = message(1, OWNER, 1_000, "elsewhere");
    foreign.inquiry_id = InquiryId(8);

    let envelope = ServerEnvelope::NewMessage {
        inquiry_id: InquiryId(8),
        message: foreign.clone(),
        client_ref: None,
    };
    assert!(!thread.apply(&envelope));
    thread.merge(vec![foreign]);
    assert!(thread.is_empty());
}

#[test]
fn test_read_receipt_marks_counterpart_messages() {
    let mut thread = LocalThread::from_history(
        THREAD,
        vec![message(1, CLIENT, 1_000, "mine"), message(2, OWNER, 1_100, "theirs")],
    );

    let receipt = ServerEnvelope::MessagesRead {
        inquiry_id: THREAD,
        reader_id: OWNER,
        count: 1,
        read_at: 5_000,
    };
    assert!(thread.apply(&receipt));

    let read: Vec<_> = thread.messages().map(|m| (m.id, m.is_read)).collect();
    assert_eq!(read, vec![(MessageId(1), true), (MessageId(2), false)]);

    // Second receipt finds nothing new
    assert!(!thread.apply(&receipt));
}

// Connection controller

#[test]
fn test_websocket_url() {
    assert_eq!(websocket_url("http://127.0.0.1:8888"), "ws://127.0.0.1:8888/ws");
    assert_eq!(websocket_url("https://chat.example.com/"), "wss://chat.example.com/ws");
    assert_eq!(websocket_url("ws://localhost:1"), "ws://localhost:1/ws");
}

#[tokio::test]
async fn test_closed_client_refuses_sends() {
    let client = ChatClient::new(ClientSettings::default(), CLIENT_TOKEN);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let sent = client.send_chat(THREAD, MessageType::Text, "hello", None);
    assert!(matches!(sent, Err(Error::NotConnected)));
    assert!(matches!(
        client.request_purchase(THREAD, price(500_000), None),
        Err(Error::NotConnected)
    ));
    assert!(matches!(client.confirm_purchase(THREAD, None), Err(Error::NotConnected)));

    // Best-effort signals are dropped quietly
    assert!(!client.mark_read(THREAD).expect("Mark read must not fail"));
    assert!(!client.typing(THREAD, true).expect("Typing must not fail"));

    let waited = client
        .wait_for(ConnectionState::Connected, Duration::from_millis(50))
        .await;
    assert!(matches!(waited, Err(Error::ConnectionTimeout)));
}

#[tokio::test]
async fn test_unreachable_server_goes_offline() {
    // Nothing listens on port 9 of localhost
    let settings = ClientSettings {
        server_url: "http://127.0.0.1:9".to_string(),
        connect_timeout_ms: 500,
        reconnect_base_delay_ms: 10,
        reconnect_max_delay_ms: 20,
        max_reconnect_attempts: 3,
        ..ClientSettings::default()
    };
    let mut client = ChatClient::new(settings, CLIENT_TOKEN);
    let mut events = client.subscribe();
    client.open();

    let offline = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::Offline { attempts }) => return attempts,
                Ok(_) => continue,
                Err(e) => panic!("Event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("Client never went offline");

    assert_eq!(offline, 3);
    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.close();
}

// Helper: wait for the first event matching `pick`
async fn next_event<F>(events: &mut broadcast::Receiver<ClientEvent>, mut pick: F) -> ClientEvent
where
    F: FnMut(&ClientEvent) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pick(&event) => return event,
                Ok(_) => continue,
                Err(e) => panic!("Event stream failed: {}", e),
            }
        }
    })
    .await
    .expect("Timed out waiting for client event")
}

#[tokio::test]
async fn test_silent_server_is_detected_and_reconnected() {
    // Completes the handshake, then never sends a frame
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind");
    let addr = listener.local_addr().expect("No local address");
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    let peer = tokio::spawn(async move {
        let mut sockets = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(socket) = tokio_tungstenite::accept_async(stream).await {
                sockets.push(socket);
                let _ = accepted_tx.send(());
            }
        }
    });

    let settings = ClientSettings {
        server_url: format!("http://{}", addr),
        connect_timeout_ms: 1_000,
        reconnect_base_delay_ms: 20,
        reconnect_max_delay_ms: 50,
        max_reconnect_attempts: 3,
        heartbeat_interval_ms: 50,
        idle_timeout_ms: 300,
        ..ClientSettings::default()
    };
    let mut client = ChatClient::new(settings, CLIENT_TOKEN);
    let mut events = client.subscribe();
    client.open();

    next_event(&mut events, |e| *e == ClientEvent::State(ConnectionState::Connected)).await;
    accepted.recv().await.expect("First connection never accepted");

    next_event(&mut events, |e| *e == ClientEvent::State(ConnectionState::Disconnected)).await;

    next_event(&mut events, |e| *e == ClientEvent::Reconnected).await;
    tokio::time::timeout(Duration::from_secs(5), accepted.recv())
        .await
        .expect("No reconnect attempt reached the server")
        .expect("Peer stopped accepting");

    client.close();
    peer.abort();
}
