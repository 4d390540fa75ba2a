//! Notification outbox module
//!
//! This module handles out-of-band notifications for users who are not
//! connected when something happens to one of their inquiries:
//! - Persistent per-user notification queue
//! - Retry logic with exponential backoff for failed pushes
//! - Priority handling
//! - One pending notice per (recipient, inquiry); a newer one replaces it
//!
//! Queued notifications are pushed as `NOTIFICATION` envelopes the next time
//! the recipient connects.

use crate::storage::{InquiryId, OutboxSettings, UserId};
use crate::{Error, Result};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

/// An out-of-thread signal addressed to one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    /// Notification identifier
    pub id: Uuid,
    /// Short headline
    pub title: String,
    /// Body text
    pub body: String,
    /// Where the UI should navigate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Related inquiry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inquiry_id: Option<InquiryId>,
}

impl Notification {
    /// Create a notification about an inquiry, linking to its thread
    pub fn for_inquiry(inquiry_id: InquiryId, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            body: body.into(),
            link: Some(format!("/inquiries/{}", inquiry_id)),
            inquiry_id: Some(inquiry_id),
        }
    }
}

/// Notification priority levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    /// Lifecycle notes (cancel/close)
    Low = 0,
    /// New messages and inquiries
    Normal = 1,
    /// Purchase handshake and sales
    High = 2,
}

impl Priority {
    /// Convert from integer
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            0 => Some(Priority::Low),
            1 => Some(Priority::Normal),
            2 => Some(Priority::High),
            _ => None,
        }
    }
}

/// Queued notification with delivery metadata
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedNotification {
    /// Who it is for
    pub recipient: UserId,
    /// The notification itself
    pub notification: Notification,
    /// Priority level
    pub priority: Priority,
    /// Number of failed push attempts
    pub attempts: u32,
    /// Earliest next push (Unix milliseconds)
    pub next_retry: i64,
}

/// Notification outbox with SQLite persistence
pub struct Outbox {
    conn: Mutex<Connection>,
    /// Maximum push attempts before a notification is dropped
    max_retries: u32,
    /// Base delay for exponential backoff (milliseconds)
    base_delay_ms: i64,
}

impl Outbox {
    /// Create a new outbox with an in-memory database
    pub fn new() -> Result<Self> {
        Self::new_with_connection(Connection::open_in_memory()?)
    }

    /// Create a new outbox with a file-based database
    pub fn new_with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        Self::new_with_connection(conn)
    }

    fn new_with_connection(conn: Connection) -> Result<Self> {
        let defaults = OutboxSettings::default();
        let outbox = Self {
            conn: Mutex::new(conn),
            max_retries: defaults.max_retries,
            base_delay_ms: defaults.retry_base_delay_ms as i64,
        };
        outbox.init_schema()?;
        Ok(outbox)
    }

    /// Apply retry policy from settings
    pub fn with_settings(mut self, settings: &OutboxSettings) -> Self {
        self.max_retries = settings.max_retries;
        self.base_delay_ms = settings.retry_base_delay_ms as i64;
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Outbox("Outbox connection lock poisoned".to_string()))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS notification_outbox (
                notification_id TEXT PRIMARY KEY,
                recipient INTEGER NOT NULL,
                inquiry_id INTEGER,
                payload TEXT NOT NULL,
                priority INTEGER NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                next_retry INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_outbox_recipient
             ON notification_outbox(recipient, priority DESC, next_retry ASC)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_outbox_thread
             ON notification_outbox(recipient, inquiry_id)",
            [],
        )?;

        Ok(())
    }

    /// Queue a notification for a user
    ///
    /// A notice about an inquiry supersedes any still-queued notice for the
    /// same recipient and inquiry, keeping the higher of their priorities.
    pub fn enqueue(
        &self,
        recipient: UserId,
        notification: &Notification,
        priority: Priority,
    ) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let payload = serde_json::to_string(notification)?;
        let inquiry_id = notification.inquiry_id.map(|id| id.0);

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let mut priority = priority;
        if let Some(inquiry_id) = inquiry_id {
            let queued: Option<i64> = tx.query_row(
                "SELECT MAX(priority) FROM notification_outbox
                 WHERE recipient = ?1 AND inquiry_id = ?2",
                params![recipient.0, inquiry_id],
                |row| row.get(0),
            )?;
            if let Some(queued) = queued.and_then(Priority::from_i64) {
                priority = priority.max(queued);
            }

            let superseded = tx.execute(
                "DELETE FROM notification_outbox WHERE recipient = ?1 AND inquiry_id = ?2",
                params![recipient.0, inquiry_id],
            )?;
            if superseded > 0 {
                debug!(
                    "Replaced {} queued notification(s) for user {} on inquiry {}",
                    superseded, recipient, inquiry_id
                );
            }
        }

        tx.execute(
            "INSERT INTO notification_outbox
             (notification_id, recipient, inquiry_id, payload, priority, attempts, next_retry, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            params![
                notification.id.to_string(),
                recipient.0,
                inquiry_id,
                payload,
                priority as i64,
                now,
            ],
        )?;
        tx.commit()?;

        debug!("Queued notification {} for user {}", notification.id, recipient);
        Ok(())
    }

    /// Notifications for one user that are due now, highest priority first
    pub fn fetch_pending_for(&self, recipient: UserId) -> Result<Vec<QueuedNotification>> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT recipient, payload, priority, attempts, next_retry
             FROM notification_outbox
             WHERE recipient = ?1 AND next_retry <= ?2
             ORDER BY priority DESC, created_at ASC",
        )?;

        let pending = stmt
            .query_map(params![recipient.0, now], row_to_queued)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pending)
    }

    /// Every notification that is due now, highest priority first
    #[cfg(test)]
    pub fn fetch_pending(&self) -> Result<Vec<QueuedNotification>> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT recipient, payload, priority, attempts, next_retry
             FROM notification_outbox
             WHERE next_retry <= ?1
             ORDER BY priority DESC, next_retry ASC",
        )?;

        let pending = stmt
            .query_map(params![now], row_to_queued)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(pending)
    }

    /// Remove a notification that reached its recipient
    pub fn mark_delivered(&self, notification_id: Uuid) -> Result<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM notification_outbox WHERE notification_id = ?1",
            params![notification_id.to_string()],
        )?;

        if deleted == 0 {
            return Err(Error::Outbox(format!(
                "Notification not found in outbox: {}",
                notification_id
            )));
        }

        Ok(())
    }

    /// Record a failed push and schedule a retry with exponential backoff
    ///
    /// The notification is dropped once it has failed `max_retries` times.
    pub fn mark_failed(&self, notification_id: Uuid) -> Result<()> {
        let conn = self.lock()?;
        let id = notification_id.to_string();

        let attempts: u32 = conn.query_row(
            "SELECT attempts FROM notification_outbox WHERE notification_id = ?1",
            params![id],
            |row| row.get(0),
        )?;

        let new_attempts = attempts + 1;

        if new_attempts >= self.max_retries {
            conn.execute(
                "DELETE FROM notification_outbox WHERE notification_id = ?1",
                params![id],
            )?;
            warn!(
                "Dropping notification {} after {} failed attempts",
                notification_id, new_attempts
            );
            return Ok(());
        }

        let delay = self.base_delay_ms * 2_i64.pow(new_attempts);
        let next_retry = Utc::now().timestamp_millis() + delay;

        conn.execute(
            "UPDATE notification_outbox
             SET attempts = ?1, next_retry = ?2
             WHERE notification_id = ?3",
            params![new_attempts, next_retry, id],
        )?;

        Ok(())
    }

    /// Get the current outbox size
    pub fn size(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: usize = conn.query_row("SELECT COUNT(*) FROM notification_outbox", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    /// Get all queued notifications (for inspection/debugging)
    pub fn list(&self) -> Result<Vec<QueuedNotification>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT recipient, payload, priority, attempts, next_retry
             FROM notification_outbox
             ORDER BY priority DESC, next_retry ASC",
        )?;

        let all = stmt
            .query_map([], row_to_queued)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(all)
    }

    /// Clear all notifications
    pub fn clear(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM notification_outbox", [])?;
        Ok(())
    }
}

fn row_to_queued(row: &Row<'_>) -> rusqlite::Result<QueuedNotification> {
    let payload: String = row.get(1)?;
    let notification: Notification = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let priority_val: i64 = row.get(2)?;

    Ok(QueuedNotification {
        recipient: UserId(row.get(0)?),
        notification,
        priority: Priority::from_i64(priority_val).unwrap_or(Priority::Normal),
        attempts: row.get(3)?,
        next_retry: row.get(4)?,
    })
}
