//! Application settings and configuration

use crate::storage::{Price, PropertyId, Role, UserId};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Server-side tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Listen address, e.g. "127.0.0.1:8888"
    pub bind_addr: String,
    /// SQLite database file
    pub database_path: String,
    /// Interval between server pings on each live connection
    pub heartbeat_interval_ms: u64,
    /// A connection with no inbound traffic for this long is dropped
    pub idle_timeout_ms: u64,
    /// Typing indicators clear after this much silence
    pub typing_expiry_ms: u64,
    /// Upper bound on waiting for a per-inquiry lock
    pub lock_timeout_ms: u64,
    /// Longest accepted message content, in characters
    pub max_content_len: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8888".to_string(),
            database_path: "./data/haggle.db".to_string(),
            heartbeat_interval_ms: 4_000,
            idle_timeout_ms: 12_000,
            typing_expiry_ms: 3_000,
            lock_timeout_ms: 5_000,
            max_content_len: 4_000,
        }
    }
}

/// Client-side reconnection and liveness tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// Server base URL, e.g. "http://127.0.0.1:8888"
    pub server_url: String,
    /// Bound on a single connection attempt
    pub connect_timeout_ms: u64,
    /// Reconnect delay is this times the attempt number
    pub reconnect_base_delay_ms: u64,
    /// Ceiling for a single reconnect delay
    pub reconnect_max_delay_ms: u64,
    /// Consecutive failures before going offline for good
    pub max_reconnect_attempts: u32,
    /// Interval between client pings
    pub heartbeat_interval_ms: u64,
    /// No inbound traffic for this long counts as a dead link
    pub idle_timeout_ms: u64,
    /// Capacity of the event broadcast buffer
    pub event_buffer: usize,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:8888".to_string(),
            connect_timeout_ms: 10_000,
            reconnect_base_delay_ms: 3_000,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            heartbeat_interval_ms: 4_000,
            idle_timeout_ms: 12_000,
            event_buffer: 256,
        }
    }
}

/// Out-of-band notification retry policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutboxSettings {
    /// Attempts before a notification is discarded
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay_ms: u64,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_base_delay_ms: 1_000,
        }
    }
}

/// A bearer token accepted by the built-in identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityGrant {
    /// Opaque bearer token
    pub token: String,
    /// User the token authenticates as
    pub user_id: UserId,
    /// Role of that user
    pub role: Role,
    /// Name shown on typing indicators
    #[serde(default)]
    pub display_name: Option<String>,
}

/// A listing loaded into the local catalog mirror at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedProperty {
    /// Property identifier
    pub id: PropertyId,
    /// Owner or listing agent
    pub owner_id: UserId,
    /// Listed price
    pub listed_price: Price,
}

/// Application settings
///
/// Stored as JSON. Missing files, empty files and missing keys all fall back
/// to defaults.
///
/// # Example
/// ```rust,no_run
/// use haggle::storage::Settings;
///
/// let mut settings = Settings::load("haggle.json").expect("Failed to load");
/// settings.server.typing_expiry_ms = 5_000;
/// settings.save("haggle.json").expect("Failed to save");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server tunables
    pub server: ServerSettings,
    /// Client tunables
    pub client: ClientSettings,
    /// Notification outbox policy
    pub outbox: OutboxSettings,
    /// Static bearer-token grants
    pub identities: Vec<IdentityGrant>,
    /// Listings to mirror into the local catalog
    pub properties: Vec<SeedProperty>,
}

impl Settings {
    /// Load settings from a JSON file
    ///
    /// Returns defaults when the file does not exist or is empty.
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Self::default());
        }

        let data = std::fs::read_to_string(path)
            .map_err(|e| Error::Storage(format!("Failed to read settings: {}", e)))?;

        if data.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&data)
            .map_err(|e| Error::Storage(format!("Failed to parse settings: {}", e)))
    }

    /// Save settings to a JSON file, creating parent directories
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Storage(format!("Failed to create settings directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Storage(format!("Failed to serialize settings: {}", e)))?;

        std::fs::write(path, json)
            .map_err(|e| Error::Storage(format!("Failed to write settings: {}", e)))?;

        Ok(())
    }
}
