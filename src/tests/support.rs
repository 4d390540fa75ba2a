// Shared fixtures: one listing, its owner, a buyer, an outsider and an admin

use crate::auth::{Identity, StaticIdentityProvider};
use crate::hub::Hub;
use crate::outbox::Outbox;
use crate::storage::{
    Inquiry, InquiryId, InquiryStatus, Price, Property, PropertyId, Role, ServerSettings, Store,
    UserId,
};
use std::sync::Arc;

pub const CLIENT: UserId = UserId(1);
pub const OWNER: UserId = UserId(2);
pub const STRANGER: UserId = UserId(3);
pub const ADMIN: UserId = UserId(9);
pub const PROPERTY: PropertyId = PropertyId(100);

pub const CLIENT_TOKEN: &str = "client-token";
pub const OWNER_TOKEN: &str = "owner-token";
pub const STRANGER_TOKEN: &str = "stranger-token";
pub const ADMIN_TOKEN: &str = "admin-token";
/// Needs percent-encoding in a query string
pub const RESERVED_CHARS_TOKEN: &str = "client+tok/en=";

/// Price from a whole major-unit amount
pub fn price(amount: i64) -> Price {
    Price::from_minor(amount * 100).expect("Price must be positive")
}

pub fn client() -> Identity {
    Identity::new(CLIENT, Role::Client).with_display_name("Carla")
}

pub fn owner() -> Identity {
    Identity::new(OWNER, Role::Agent).with_display_name("Omar")
}

pub fn stranger() -> Identity {
    Identity::new(STRANGER, Role::Client)
}

pub fn admin() -> Identity {
    Identity::new(ADMIN, Role::Admin)
}

/// In-memory store with one available listing owned by `OWNER`
pub fn store_with_property() -> Arc<Store> {
    let store = Store::new_in_memory().expect("Failed to create store");
    store
        .save_property(&Property::available(PROPERTY, OWNER, price(520_000)))
        .expect("Failed to save property");
    Arc::new(store)
}

pub fn identities() -> StaticIdentityProvider {
    let mut provider = StaticIdentityProvider::default();
    provider.insert(CLIENT_TOKEN, client());
    provider.insert(OWNER_TOKEN, owner());
    provider.insert(STRANGER_TOKEN, stranger());
    provider.insert(ADMIN_TOKEN, admin());
    provider.insert(RESERVED_CHARS_TOKEN, client());
    provider
}

/// Fast timers so expiry and heartbeat tests stay quick
pub fn fast_settings() -> ServerSettings {
    ServerSettings {
        bind_addr: "127.0.0.1:0".to_string(),
        database_path: ":memory:".to_string(),
        heartbeat_interval_ms: 200,
        idle_timeout_ms: 2_000,
        typing_expiry_ms: 100,
        lock_timeout_ms: 1_000,
        max_content_len: 4_000,
    }
}

pub struct TestHub {
    pub hub: Arc<Hub>,
    pub store: Arc<Store>,
    pub outbox: Arc<Outbox>,
}

pub fn test_hub() -> TestHub {
    let store = store_with_property();
    let outbox = Arc::new(Outbox::new().expect("Failed to create outbox"));
    let hub = Arc::new(Hub::new(
        fast_settings(),
        store.clone(),
        store.clone(),
        outbox.clone(),
        Arc::new(identities()),
    ));
    TestHub { hub, store, outbox }
}

/// Detached inquiry value for pure state-machine tests
pub fn inquiry(status: InquiryStatus) -> Inquiry {
    Inquiry {
        id: InquiryId(7),
        property_id: PROPERTY,
        client_id: CLIENT,
        owner_id: OWNER,
        listed_price: price(520_000),
        status,
        offered_price: None,
        offered_by: None,
        agreed_price: None,
        version: 0,
        created_at: 1_000,
        updated_at: 1_000,
        closed_at: None,
    }
}
