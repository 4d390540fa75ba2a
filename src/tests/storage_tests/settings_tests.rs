// Settings Tests - defaults, persistence and partial files

use crate::storage::{IdentityGrant, Role, SeedProperty, Settings, UserId};
use crate::tests::support::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_settings_default() {
    let settings = Settings::default();

    assert_eq!(settings.server.bind_addr, "127.0.0.1:8888");
    assert_eq!(settings.server.heartbeat_interval_ms, 4_000);
    assert_eq!(settings.server.idle_timeout_ms, 12_000);
    assert_eq!(settings.server.typing_expiry_ms, 3_000);
    assert_eq!(settings.server.lock_timeout_ms, 5_000);
    assert_eq!(settings.server.max_content_len, 4_000);

    assert_eq!(settings.client.connect_timeout_ms, 10_000);
    assert_eq!(settings.client.reconnect_base_delay_ms, 3_000);
    assert_eq!(settings.client.reconnect_max_delay_ms, 30_000);
    assert_eq!(settings.client.max_reconnect_attempts, 5);

    assert_eq!(settings.outbox.max_retries, 5);
    assert_eq!(settings.outbox.retry_base_delay_ms, 1_000);
    assert!(settings.identities.is_empty());
    assert!(settings.properties.is_empty());
}

#[test]
fn test_settings_missing_file_uses_defaults() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let settings = Settings::load(dir.path().join("absent.json")).expect("Failed to load");
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_settings_empty_file_uses_defaults() {
    let file = NamedTempFile::new().expect("Failed to create temp file");
    let settings = Settings::load(file.path()).expect("Failed to load");
    assert_eq!(settings, Settings::default());
}

#[test]
fn test_settings_partial_file_fills_defaults() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    write!(
        file,
        r#"{{
            "server": {{ "typing_expiry_ms": 5000 }},
            "identities": [
                {{ "token": "abc", "user_id": 1, "role": "CLIENT" }}
            ]
        }}"#
    )
    .expect("Failed to write settings");

    let settings = Settings::load(file.path()).expect("Failed to load");
    assert_eq!(settings.server.typing_expiry_ms, 5_000);
    assert_eq!(settings.server.lock_timeout_ms, 5_000);
    assert_eq!(settings.identities.len(), 1);
    assert_eq!(settings.identities[0].role, Role::Client);
    assert_eq!(settings.identities[0].display_name, None);
}

#[test]
fn test_settings_invalid_file_is_an_error() {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    write!(file, "{{ not json").expect("Failed to write settings");
    assert!(Settings::load(file.path()).is_err());
}

#[test]
fn test_settings_save_and_load() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("config").join("haggle.json");

    let mut settings = Settings::default();
    settings.server.bind_addr = "0.0.0.0:9000".to_string();
    settings.client.max_reconnect_attempts = 8;
    settings.identities.push(IdentityGrant {
        token: "secret".to_string(),
        user_id: UserId(7),
        role: Role::Agent,
        display_name: Some("Agent Smith".to_string()),
    });
    settings.properties.push(SeedProperty {
        id: PROPERTY,
        owner_id: UserId(7),
        listed_price: price(250_000),
    });

    settings.save(&path).expect("Failed to save settings");
    let loaded = Settings::load(&path).expect("Failed to load settings");
    assert_eq!(loaded, settings);
}
