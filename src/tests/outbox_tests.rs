use crate::outbox::*;
use crate::storage::{InquiryId, OutboxSettings, UserId};
use crate::Error;
use tempfile::TempDir;
use uuid::Uuid;

const ALICE: UserId = UserId(1);
const BOB: UserId = UserId(2);

fn notice(inquiry: i64, title: &str) -> Notification {
    Notification::for_inquiry(InquiryId(inquiry), title, "body")
}

/// Outbox whose retries are due immediately
fn instant_outbox(max_retries: u32) -> Outbox {
    Outbox::new()
        .expect("Failed to create outbox")
        .with_settings(&OutboxSettings {
            max_retries,
            retry_base_delay_ms: 0,
        })
}

#[test]
fn test_outbox_creation() {
    let outbox = Outbox::new().expect("Failed to create outbox");
    assert_eq!(outbox.size().expect("Failed to get size"), 0);
}

#[test]
fn test_priority_ordering() {
    assert!(Priority::High > Priority::Normal);
    assert!(Priority::Normal > Priority::Low);
}

#[test]
fn test_priority_from_i64() {
    assert_eq!(Priority::from_i64(0), Some(Priority::Low));
    assert_eq!(Priority::from_i64(1), Some(Priority::Normal));
    assert_eq!(Priority::from_i64(2), Some(Priority::High));
    assert_eq!(Priority::from_i64(99), None);
}

#[test]
fn test_notification_links_to_inquiry() {
    let n = notice(12, "New offer");
    assert_eq!(n.link.as_deref(), Some("/inquiries/12"));
    assert_eq!(n.inquiry_id, Some(InquiryId(12)));

    let value = serde_json::to_value(&n).expect("Failed to serialize");
    assert_eq!(value["inquiryId"], 12);
    assert_eq!(value["title"], "New offer");
}

#[test]
fn test_enqueue_and_fetch_per_user() {
    let outbox = Outbox::new().expect("Failed to create outbox");
    outbox
        .enqueue(ALICE, &notice(1, "low"), Priority::Low)
        .expect("Failed to enqueue");
    outbox
        .enqueue(ALICE, &notice(3, "high"), Priority::High)
        .expect("Failed to enqueue");
    outbox
        .enqueue(BOB, &notice(2, "bob"), Priority::Normal)
        .expect("Failed to enqueue");

    assert_eq!(outbox.size().expect("Failed to get size"), 3);

    let alice = outbox.fetch_pending_for(ALICE).expect("Failed to fetch");
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].notification.title, "high");
    assert_eq!(alice[1].notification.title, "low");
    assert!(alice.iter().all(|q| q.recipient == ALICE && q.attempts == 0));

    assert_eq!(outbox.fetch_pending().expect("Failed to fetch").len(), 3);
}

#[test]
fn test_newer_notice_replaces_queued_one_for_same_inquiry() {
    let outbox = Outbox::new().expect("Failed to create outbox");
    outbox
        .enqueue(ALICE, &notice(1, "New inquiry"), Priority::High)
        .expect("Failed to enqueue");
    for round in 0..20 {
        outbox
            .enqueue(ALICE, &notice(1, &format!("Counter {}", round)), Priority::Normal)
            .expect("Failed to enqueue");
    }
    // Other recipients and other inquiries are untouched
    outbox
        .enqueue(ALICE, &notice(2, "other inquiry"), Priority::Low)
        .expect("Failed to enqueue");
    outbox
        .enqueue(BOB, &notice(1, "bob"), Priority::Normal)
        .expect("Failed to enqueue");

    assert_eq!(outbox.size().expect("Failed to get size"), 3);

    let alice = outbox.fetch_pending_for(ALICE).expect("Failed to fetch");
    assert_eq!(alice.len(), 2);
    assert_eq!(alice[0].notification.title, "Counter 19");
    assert_eq!(alice[0].priority, Priority::High);
    assert_eq!(alice[1].notification.title, "other inquiry");
}

#[test]
fn test_mark_delivered() {
    let outbox = Outbox::new().expect("Failed to create outbox");
    let n = notice(1, "hello");
    outbox.enqueue(ALICE, &n, Priority::Normal).expect("Failed to enqueue");

    outbox.mark_delivered(n.id).expect("Failed to mark delivered");
    assert_eq!(outbox.size().expect("Failed to get size"), 0);

    let missing = outbox.mark_delivered(Uuid::new_v4());
    assert!(matches!(missing, Err(Error::Outbox(_))));
}

#[test]
fn test_mark_failed_backs_off() {
    let outbox = Outbox::new().expect("Failed to create outbox");
    let n = notice(1, "retry me");
    outbox.enqueue(ALICE, &n, Priority::Normal).expect("Failed to enqueue");

    outbox.mark_failed(n.id).expect("Failed to mark failed");

    let queued = outbox.list().expect("Failed to list");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].attempts, 1);

    // 1000ms * 2^1 in the future, so nothing is due yet
    assert!(outbox.fetch_pending_for(ALICE).expect("Failed to fetch").is_empty());
    assert!(queued[0].next_retry > chrono::Utc::now().timestamp_millis());
}

#[test]
fn test_dropped_after_max_retries() {
    let outbox = instant_outbox(3);
    let n = notice(1, "doomed");
    outbox.enqueue(ALICE, &n, Priority::High).expect("Failed to enqueue");

    outbox.mark_failed(n.id).expect("attempt 1");
    outbox.mark_failed(n.id).expect("attempt 2");
    assert_eq!(outbox.size().expect("Failed to get size"), 1);
    assert_eq!(outbox.list().expect("Failed to list")[0].attempts, 2);

    outbox.mark_failed(n.id).expect("attempt 3");
    assert_eq!(outbox.size().expect("Failed to get size"), 0);
}

#[test]
fn test_outbox_persists_on_disk() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("outbox.db");
    let n = notice(4, "persisted");

    {
        let outbox = Outbox::new_with_path(&path).expect("Failed to open outbox");
        outbox.enqueue(BOB, &n, Priority::Normal).expect("Failed to enqueue");
    }

    let outbox = Outbox::new_with_path(&path).expect("Failed to reopen outbox");
    let pending = outbox.fetch_pending_for(BOB).expect("Failed to fetch");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].notification, n);
}

#[test]
fn test_clear() {
    let outbox = Outbox::new().expect("Failed to create outbox");
    outbox
        .enqueue(ALICE, &notice(1, "a"), Priority::Low)
        .expect("Failed to enqueue");
    outbox.clear().expect("Failed to clear");
    assert_eq!(outbox.size().expect("Failed to get size"), 0);
}
