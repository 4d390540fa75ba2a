use super::support::*;
use crate::auth::{bearer_token, query_param, query_token, IdentityProvider};
use crate::protocol::ServerEnvelope;
use crate::registry::*;
use crate::storage::InquiryId;
use crate::typing::TypingTracker;
use crate::Error;
use hyper::header::AUTHORIZATION;
use hyper::HeaderMap;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

#[tokio::test]
async fn test_register_and_lookup() {
    let registry = ConnectionRegistry::new();
    let (phone, _phone_rx) = ConnectionHandle::new(client());
    let (laptop, _laptop_rx) = ConnectionHandle::new(client());
    let (agent, _agent_rx) = ConnectionHandle::new(owner());

    registry.register(phone.clone()).await;
    registry.register(laptop.clone()).await;
    registry.register(agent).await;

    assert_eq!(registry.connection_count().await, 3);
    assert_eq!(registry.user_count().await, 2);
    assert_eq!(registry.connections_for(CLIENT).await.len(), 2);
    assert!(registry.is_online(OWNER).await);
    assert!(!registry.is_online(STRANGER).await);
    assert!(registry.connections_for(STRANGER).await.is_empty());
}

#[tokio::test]
async fn test_unregister() {
    let registry = ConnectionRegistry::new();
    let (phone, _phone_rx) = ConnectionHandle::new(client());
    let (laptop, _laptop_rx) = ConnectionHandle::new(client());
    registry.register(phone.clone()).await;
    registry.register(laptop.clone()).await;

    let removed = registry.unregister(phone.id).await.expect("Handle missing");
    assert_eq!(removed.id, phone.id);
    assert!(registry.is_online(CLIENT).await);

    registry.unregister(laptop.id).await;
    assert!(!registry.is_online(CLIENT).await);
    assert_eq!(registry.user_count().await, 0);

    // Unknown ids are ignored
    assert!(registry.unregister(phone.id).await.is_none());
}

#[tokio::test]
async fn test_admin_audience() {
    let registry = ConnectionRegistry::new();
    let (observer, _rx) = ConnectionHandle::new(admin());
    let (buyer, _buyer_rx) = ConnectionHandle::new(client());
    registry.register(observer.clone()).await;
    registry.register(buyer).await;

    let admins = registry.admin_connections().await;
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].user_id(), ADMIN);

    registry.unregister(observer.id).await;
    assert!(registry.admin_connections().await.is_empty());
}

#[tokio::test]
async fn test_send_to_closed_connection_is_silent() {
    let (handle, receiver) = ConnectionHandle::new(client());
    assert!(handle.send(ServerEnvelope::Pong));
    assert!(!handle.is_closed());

    drop(receiver);
    assert!(handle.is_closed());
    assert!(!handle.send(ServerEnvelope::Pong));
}

#[tokio::test]
async fn test_handle_delivers_in_order() {
    let (handle, mut receiver) = ConnectionHandle::new(owner());
    for id in 1..=3 {
        handle.send(ServerEnvelope::StatusUpdate {
            inquiry_id: InquiryId(id),
            status: crate::storage::InquiryStatus::Negotiating,
        });
    }
    for id in 1..=3 {
        let envelope = receiver.recv().await.expect("Envelope missing");
        assert_eq!(envelope.inquiry_id(), Some(InquiryId(id)));
    }
}

// Typing tracker

#[test]
fn test_typing_generation_guards_expiry() {
    let tracker = TypingTracker::new(Duration::from_millis(100));
    let inquiry = InquiryId(1);

    let first = tracker.start(inquiry, CLIENT);
    let second = tracker.start(inquiry, CLIENT);
    assert!(second > first);
    assert!(tracker.is_typing(inquiry, CLIENT));

    // A stale timer does not clear a renewed indicator
    assert!(!tracker.expire(inquiry, CLIENT, first));
    assert!(tracker.is_typing(inquiry, CLIENT));

    assert!(tracker.expire(inquiry, CLIENT, second));
    assert!(!tracker.is_typing(inquiry, CLIENT));
}

#[test]
fn test_typing_stop() {
    let tracker = TypingTracker::new(Duration::from_millis(100));
    let generation = tracker.start(InquiryId(1), OWNER);

    assert!(tracker.stop(InquiryId(1), OWNER));
    assert!(!tracker.stop(InquiryId(1), OWNER));
    assert!(!tracker.expire(InquiryId(1), OWNER, generation));
    assert!(!tracker.is_typing(InquiryId(2), OWNER));
    assert_eq!(tracker.expiry(), Duration::from_millis(100));
}

// Identity

#[test]
fn test_static_identity_provider() {
    let provider = identities();
    let identity = assert_ok!(provider.authenticate(CLIENT_TOKEN));
    assert_eq!(identity.user_id, CLIENT);
    assert_eq!(identity.display_name.as_deref(), Some("Carla"));
    assert!(assert_ok!(provider.authenticate(ADMIN_TOKEN)).is_admin());
    assert_err!(provider.authenticate(OWNER_TOKEN.to_uppercase().as_str()));

    assert!(matches!(provider.authenticate("nope"), Err(Error::Unauthorized)));
    assert!(matches!(provider.authenticate(""), Err(Error::Unauthorized)));
}

#[test]
fn test_bearer_token_parsing() {
    let mut headers = HeaderMap::new();
    assert_eq!(bearer_token(&headers), None);

    headers.insert(AUTHORIZATION, "Bearer abc123".parse().expect("header"));
    assert_eq!(bearer_token(&headers), Some("abc123"));

    headers.insert(AUTHORIZATION, "bearer   xyz ".parse().expect("header"));
    assert_eq!(bearer_token(&headers), Some("xyz"));

    headers.insert(AUTHORIZATION, "Basic dXNlcjpwYXNz".parse().expect("header"));
    assert_eq!(bearer_token(&headers), None);

    headers.insert(AUTHORIZATION, "Bearer".parse().expect("header"));
    assert_eq!(bearer_token(&headers), None);
}

#[test]
fn test_query_parameters() {
    assert_eq!(query_token(Some("token=abc&as=owner")).as_deref(), Some("abc"));
    assert_eq!(query_token(Some("token=")), None);
    assert_eq!(query_token(None), None);
    assert_eq!(
        query_param(Some("token=abc&as=owner"), "as").as_deref(),
        Some("owner")
    );
    assert_eq!(query_param(Some("flag&as=all"), "as").as_deref(), Some("all"));
    assert_eq!(query_param(Some("as=all"), "role"), None);
}

#[test]
fn test_query_token_is_percent_decoded() {
    assert_eq!(
        query_token(Some("token=a%2Bb%2Fc%3D")).as_deref(),
        Some("a+b/c=")
    );
    assert_eq!(
        query_token(Some("as=all&token=tok%20en")).as_deref(),
        Some("tok en")
    );
    // Invalid UTF-8 after decoding
    assert_eq!(query_token(Some("token=%FF")), None);
}
