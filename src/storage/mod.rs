//! Local storage module
//!
//! This module handles persistent storage including:
//! - Inquiry threads and their versioned negotiation state
//! - Message history
//! - The local property catalog mirror
//! - Configuration
//!
//! The module is organized into submodules for better maintainability:
//! - `inquiry` - Identifiers, money, roles and the inquiry record
//! - `message` - Message structures
//! - `property` - Catalog listing and the catalog collaborator trait
//! - `settings` - Application settings and configuration
//! - `storage_db` - SQLite database

// Submodules
pub mod inquiry;
pub mod message;
pub mod property;
pub mod settings;
pub mod storage_db;

// Re-export commonly used types
pub use inquiry::{
    Inquiry, InquiryId, InquiryStatus, MessageId, Price, PropertyId, Role, UnknownVariant, UserId,
};
pub use message::{Message, MessageType, NewMessage};
pub use property::{Property, PropertyCatalog, PropertyStatus};
pub use settings::{
    ClientSettings, IdentityGrant, OutboxSettings, SeedProperty, ServerSettings, Settings,
};
pub use storage_db::{InquiryScope, Store};

/// Current time as Unix milliseconds
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
