// Store Tests - SQLite persistence of inquiries, messages and properties

use crate::storage::{
    Inquiry, InquiryId, InquiryScope, InquiryStatus, MessageType, NewMessage, Property,
    PropertyCatalog, PropertyId, PropertyStatus, Store, UserId,
};
use crate::tests::support::*;
use crate::Error;
use tempfile::TempDir;

fn draft(client: UserId, property: PropertyId, at: i64) -> Inquiry {
    let mut draft = inquiry(InquiryStatus::Active);
    draft.id = InquiryId(0);
    draft.client_id = client;
    draft.property_id = property;
    draft.created_at = at;
    draft.updated_at = at;
    draft
}

fn text(inquiry: &Inquiry, sender: UserId, content: &str, sent_at: i64) -> NewMessage {
    NewMessage {
        inquiry_id: inquiry.id,
        sender_id: sender,
        message_type: MessageType::Text,
        content: content.to_string(),
        price_amount: None,
        sent_at,
    }
}

/// Commit a text message without changing the inquiry's state
fn say(store: &Store, inquiry: &Inquiry, sender: UserId, content: &str, sent_at: i64) -> Inquiry {
    let mut next = inquiry.clone();
    next.updated_at = sent_at;
    store
        .commit(&text(inquiry, sender, content, sent_at), &next, inquiry.version)
        .expect("Failed to commit")
        .1
}

#[test]
fn test_property_roundtrip() {
    let store = Store::new_in_memory().expect("Failed to create store");
    let property = Property::available(PROPERTY, OWNER, price(520_000));
    store.save_property(&property).expect("Failed to save property");

    let loaded = store
        .load_property(PROPERTY)
        .expect("Failed to load property")
        .expect("Property missing");
    assert_eq!(loaded, property);
    assert!(store.load_property(PropertyId(1)).expect("Failed to load").is_none());
}

#[test]
fn test_mark_sold() {
    let store = store_with_property();
    store.mark_sold(PROPERTY).expect("Failed to mark sold");

    let property = store
        .property(PROPERTY)
        .expect("Failed to load property")
        .expect("Property missing");
    assert_eq!(property.status, PropertyStatus::Sold);

    let missing = store.mark_sold(PropertyId(404));
    assert!(matches!(missing, Err(Error::PropertyNotFound(PropertyId(404)))));
}

#[test]
fn test_insert_inquiry_with_messages() {
    let store = store_with_property();
    let draft = draft(CLIENT, PROPERTY, 1_000);
    let opening = text(&draft, CLIENT, "Hello", 1_000);

    let (inquiry, messages) = store
        .insert_inquiry(&draft, &[opening])
        .expect("Failed to insert inquiry");

    assert!(inquiry.id.0 > 0);
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].inquiry_id, inquiry.id);
    assert!(!messages[0].is_read);

    let loaded = store
        .load_inquiry(inquiry.id)
        .expect("Failed to load")
        .expect("Inquiry missing");
    assert_eq!(loaded, inquiry);
    assert_eq!(
        store.find_open_inquiry(CLIENT, PROPERTY).expect("Failed to find"),
        Some(inquiry)
    );
}

#[test]
fn test_one_open_inquiry_per_client_and_property() {
    let store = store_with_property();
    let (first, _) = store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
        .expect("Failed to insert inquiry");

    let duplicate = store.insert_inquiry(&draft(CLIENT, PROPERTY, 2_000), &[]);
    assert!(matches!(duplicate, Err(Error::DuplicateInquiry(PROPERTY))));

    // Another buyer on the same property is fine
    store
        .insert_inquiry(&draft(STRANGER, PROPERTY, 2_000), &[])
        .expect("Other client should be allowed");

    // Once the first is closed, the same buyer may open again
    let mut closed = first.clone();
    closed.status = InquiryStatus::Closed;
    closed.closed_at = Some(3_000);
    closed.updated_at = 3_000;
    let note = NewMessage {
        message_type: MessageType::System,
        ..text(&first, CLIENT, "Inquiry closed", 3_000)
    };
    store.commit(&note, &closed, first.version).expect("Failed to close");

    assert_eq!(store.find_open_inquiry(CLIENT, PROPERTY).expect("Failed to find"), None);
    store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 4_000), &[])
        .expect("Reopening after close should be allowed");
}

#[test]
fn test_commit_bumps_version() {
    let store = store_with_property();
    let (inquiry, _) = store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
        .expect("Failed to insert inquiry");
    assert_eq!(inquiry.version, 0);

    let mut next = inquiry.clone();
    next.status = InquiryStatus::Negotiating;
    next.offered_price = Some(price(500_000));
    next.offered_by = Some(CLIENT);
    next.updated_at = 2_000;
    let offer = NewMessage {
        message_type: MessageType::PriceOffer,
        price_amount: Some(price(500_000)),
        ..text(&inquiry, CLIENT, "Offered 500000.00", 2_000)
    };

    let (message, committed) = store.commit(&offer, &next, 0).expect("Failed to commit");
    assert_eq!(committed.version, 1);
    assert_eq!(message.price_amount, Some(price(500_000)));

    let loaded = store
        .load_inquiry(inquiry.id)
        .expect("Failed to load")
        .expect("Inquiry missing");
    assert_eq!(loaded, committed);
}

#[test]
fn test_stale_commit_conflicts_and_writes_nothing() {
    let store = store_with_property();
    let (inquiry, _) = store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
        .expect("Failed to insert inquiry");
    let current = say(&store, &inquiry, CLIENT, "first", 2_000);
    assert_eq!(current.version, 1);

    // Decided against version 0, which is gone
    let mut stale = inquiry.clone();
    stale.status = InquiryStatus::Cancelled;
    let result = store.commit(&text(&inquiry, OWNER, "late", 3_000), &stale, 0);
    assert!(matches!(result, Err(Error::Conflict(id)) if id == inquiry.id));

    let loaded = store
        .load_inquiry(inquiry.id)
        .expect("Failed to load")
        .expect("Inquiry missing");
    assert_eq!(loaded, current);
    assert_eq!(store.load_messages(inquiry.id).expect("Failed to load").len(), 1);
}

#[test]
fn test_messages_ordered_by_sent_at_then_id() {
    let store = store_with_property();
    let (mut inquiry, _) = store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
        .expect("Failed to insert inquiry");

    inquiry = say(&store, &inquiry, CLIENT, "one", 2_000);
    inquiry = say(&store, &inquiry, OWNER, "two", 2_000);
    say(&store, &inquiry, CLIENT, "three", 2_500);

    let messages = store.load_messages(inquiry.id).expect("Failed to load messages");
    let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
    assert!(messages.windows(2).all(|w| w[0].order_key() < w[1].order_key()));
}

#[test]
fn test_mark_read_is_idempotent() {
    let store = store_with_property();
    let (mut inquiry, _) = store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
        .expect("Failed to insert inquiry");
    inquiry = say(&store, &inquiry, CLIENT, "hi", 2_000);
    inquiry = say(&store, &inquiry, CLIENT, "anyone?", 2_100);
    say(&store, &inquiry, OWNER, "yes", 2_200);

    assert_eq!(store.unread_count(OWNER).expect("Failed to count"), 2);
    assert_eq!(store.unread_count(CLIENT).expect("Failed to count"), 1);

    assert_eq!(store.mark_read(inquiry.id, OWNER, 3_000).expect("Failed to mark"), 2);
    let after_first = store.load_messages(inquiry.id).expect("Failed to load");

    assert_eq!(store.mark_read(inquiry.id, OWNER, 4_000).expect("Failed to mark"), 0);
    let after_second = store.load_messages(inquiry.id).expect("Failed to load");

    assert_eq!(after_first, after_second);
    assert_eq!(store.unread_count(OWNER).expect("Failed to count"), 0);
    assert_eq!(store.unread_count(CLIENT).expect("Failed to count"), 1);

    let read: Vec<_> = after_second.iter().filter(|m| m.sender_id == CLIENT).collect();
    assert!(read.iter().all(|m| m.is_read && m.read_at == Some(3_000)));
}

#[test]
fn test_list_scopes_and_order() {
    let store = store_with_property();
    store
        .save_property(&Property::available(PropertyId(200), OWNER, price(300_000)))
        .expect("Failed to save property");
    store
        .save_property(&Property::available(PropertyId(300), CLIENT, price(100_000)))
        .expect("Failed to save property");

    let (older, _) = store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
        .expect("Failed to insert");
    let (newer, _) = store
        .insert_inquiry(&draft(CLIENT, PropertyId(200), 2_000), &[])
        .expect("Failed to insert");
    let mut selling = draft(STRANGER, PropertyId(300), 1_500);
    selling.owner_id = CLIENT;
    let (selling, _) = store.insert_inquiry(&selling, &[]).expect("Failed to insert");

    let as_client = store
        .list_inquiries(InquiryScope::AsClient(CLIENT))
        .expect("Failed to list");
    assert_eq!(
        as_client.iter().map(|i| i.id).collect::<Vec<_>>(),
        vec![newer.id, older.id]
    );

    // Activity moves the older inquiry to the top
    say(&store, &older, OWNER, "bump", 5_000);
    let as_client = store
        .list_inquiries(InquiryScope::AsClient(CLIENT))
        .expect("Failed to list");
    assert_eq!(as_client[0].id, older.id);

    let as_owner = store
        .list_inquiries(InquiryScope::AsOwner(CLIENT))
        .expect("Failed to list");
    assert_eq!(as_owner.iter().map(|i| i.id).collect::<Vec<_>>(), vec![selling.id]);

    let all = store.list_inquiries(InquiryScope::All).expect("Failed to list");
    assert_eq!(all.len(), 3);
}

#[test]
fn test_file_store_persists() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("nested").join("haggle.db");

    let id = {
        let store = Store::new(&path).expect("Failed to open store");
        store
            .save_property(&Property::available(PROPERTY, OWNER, price(520_000)))
            .expect("Failed to save property");
        store
            .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
            .expect("Failed to insert")
            .0
            .id
    };

    let reopened = Store::new(&path).expect("Failed to reopen store");
    assert!(reopened.load_inquiry(id).expect("Failed to load").is_some());
    assert!(reopened.load_property(PROPERTY).expect("Failed to load").is_some());
}

#[test]
fn test_clear_all() {
    let store = store_with_property();
    store
        .insert_inquiry(&draft(CLIENT, PROPERTY, 1_000), &[])
        .expect("Failed to insert");
    store.clear_all().expect("Failed to clear");

    assert!(store.list_inquiries(InquiryScope::All).expect("Failed to list").is_empty());
    assert!(store.load_property(PROPERTY).expect("Failed to load").is_none());
}
