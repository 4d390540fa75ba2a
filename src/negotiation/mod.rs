//! Negotiation module
//!
//! This module owns the inquiry rules:
//! - `types` - Errors, actions and decisions
//! - `state` - Guard rules and transitions on an [`Inquiry`](crate::storage::Inquiry)
//! - `engine` - Pure [`decide`] plus the store-backed [`NegotiationEngine`]
//! - `locks` - Per-inquiry locks with bounded acquisition
//!
//! Transitions:
//!
//! | From | Trigger | To |
//! |---|---|---|
//! | ACTIVE | offer/counter | NEGOTIATING |
//! | NEGOTIATING | offer/counter | NEGOTIATING |
//! | NEGOTIATING | accept (by the non-offering party) | AGREED |
//! | NEGOTIATING | reject (by the non-offering party) | NEGOTIATING |
//! | AGREED | purchase request (client) | AGREED |
//! | AGREED | purchase confirm (owner) | PURCHASED |
//! | any open | cancel / close | CANCELLED / CLOSED |

pub mod engine;
pub mod locks;
pub mod state;
pub mod types;

pub use engine::{decide, NegotiationEngine};
pub use locks::{InquiryGuard, InquiryLocks};
pub use types::{Action, Decision, NegotiationError, OpenInquiry};
