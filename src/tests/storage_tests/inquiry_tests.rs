// Inquiry Tests - ids, money and status predicates

use crate::storage::{InquiryStatus, MessageType, Price, UserId};
use crate::tests::support::*;
use std::str::FromStr;

#[test]
fn test_price_units() {
    let p = Price::from_major(480_000.5).expect("Valid price");
    assert_eq!(p.minor_units(), 48_000_050);
    assert_eq!(p.as_major(), 480_000.5);
    assert_eq!(p.to_string(), "480000.50");

    assert_eq!(Price::from_minor(0), None);
    assert_eq!(Price::from_minor(-1), None);
    assert_eq!(Price::from_major(0.0), None);
    assert_eq!(Price::from_major(-3.0), None);
    assert_eq!(Price::from_major(f64::NAN), None);
    assert_eq!(Price::from_major(f64::INFINITY), None);
    assert_eq!(Price::from_major(0.001), None);
}

#[test]
fn test_price_serialization() {
    assert_eq!(serde_json::to_string(&price(480_000)).expect("serialize"), "480000");
    let half = Price::from_minor(150).expect("Valid price");
    assert_eq!(serde_json::to_string(&half).expect("serialize"), "1.5");

    let parsed: Price = serde_json::from_str("1.5").expect("deserialize");
    assert_eq!(parsed, half);
    assert!(serde_json::from_str::<Price>("0").is_err());
    assert!(serde_json::from_str::<Price>("-10").is_err());
}

#[test]
fn test_status_predicates() {
    for status in [
        InquiryStatus::Active,
        InquiryStatus::Negotiating,
        InquiryStatus::Agreed,
    ] {
        assert!(status.is_open());
        assert!(!status.is_terminal());
    }
    for status in [
        InquiryStatus::Purchased,
        InquiryStatus::Cancelled,
        InquiryStatus::Closed,
    ] {
        assert!(status.is_terminal());
        assert!(!status.is_open());
    }
}

#[test]
fn test_status_names_roundtrip() {
    for status in [
        InquiryStatus::Active,
        InquiryStatus::Negotiating,
        InquiryStatus::Agreed,
        InquiryStatus::Purchased,
        InquiryStatus::Cancelled,
        InquiryStatus::Closed,
    ] {
        assert_eq!(InquiryStatus::from_str(status.as_str()), Ok(status));
    }
    assert!(InquiryStatus::from_str("PENDING").is_err());
    assert_eq!(MessageType::from_str("PRICE_COUNTER"), Ok(MessageType::PriceCounter));
}

#[test]
fn test_participants() {
    let inquiry = inquiry(InquiryStatus::Active);
    assert_eq!(inquiry.participants(), [CLIENT, OWNER]);
    assert!(inquiry.is_participant(CLIENT));
    assert!(inquiry.is_participant(OWNER));
    assert!(!inquiry.is_participant(STRANGER));
    assert_eq!(inquiry.counterpart(CLIENT), Some(OWNER));
    assert_eq!(inquiry.counterpart(OWNER), Some(CLIENT));
    assert_eq!(inquiry.counterpart(UserId(42)), None);
}

#[test]
fn test_message_type_groups() {
    assert!(MessageType::PriceOffer.is_offer());
    assert!(MessageType::PriceCounter.is_offer());
    assert!(MessageType::PriceReject.is_answer());
    assert!(MessageType::PurchaseConfirm.is_purchase());
    assert!(MessageType::PriceAccept.carries_price());
    assert!(!MessageType::Text.carries_price());
    assert!(!MessageType::System.carries_price());
}

#[test]
fn test_inquiry_wire_fields() {
    let value = serde_json::to_value(inquiry(InquiryStatus::Agreed)).expect("serialize");
    assert_eq!(value["status"], "AGREED");
    assert_eq!(value["clientId"], 1);
    assert_eq!(value["ownerId"], 2);
    assert_eq!(value["listedPrice"], 520000);
}
