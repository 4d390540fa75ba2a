//! SQLite-based storage backend
//!
//! Persists inquiries, their messages, and the local property catalog mirror.
//! Every negotiation step is committed as one transaction: the message insert
//! and the versioned inquiry update either both land or neither does.

use crate::{
    storage::{
        inquiry::{
            Inquiry, InquiryId, InquiryStatus, MessageId, Price, PropertyId, UnknownVariant, UserId,
        },
        message::{Message, NewMessage},
        property::{Property, PropertyCatalog, PropertyStatus},
    },
    Error, Result,
};
use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

const INQUIRY_COLUMNS: &str = "id, property_id, client_id, owner_id, listed_price, status, \
     offered_price, offered_by, agreed_price, version, created_at, updated_at, closed_at";

const MESSAGE_COLUMNS: &str =
    "id, inquiry_id, sender_id, message_type, content, price_amount, sent_at, is_read, read_at";

/// Which inquiries a listing request covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InquiryScope {
    /// Inquiries where the user is the buyer
    AsClient(UserId),
    /// Inquiries where the user is the owner
    AsOwner(UserId),
    /// Every inquiry (admin observers)
    All,
}

/// SQLite-based storage manager
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Create a new storage instance with a database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    Error::Storage(format!("Failed to create database directory: {}", e))
                })?;
            }
        }

        let conn = Connection::open(path)
            .map_err(|e| Error::Storage(format!("Failed to open database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("Opened inquiry store at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory storage instance (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Storage(format!("Failed to create in-memory database: {}", e)))?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Storage("Database connection lock poisoned".to_string()))
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS properties (
                id INTEGER PRIMARY KEY,
                owner_id INTEGER NOT NULL,
                listed_price INTEGER NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS inquiries (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                property_id INTEGER NOT NULL,
                client_id INTEGER NOT NULL,
                owner_id INTEGER NOT NULL,
                listed_price INTEGER NOT NULL,
                status TEXT NOT NULL,
                offered_price INTEGER,
                offered_by INTEGER,
                agreed_price INTEGER,
                version INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                closed_at INTEGER
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                inquiry_id INTEGER NOT NULL REFERENCES inquiries(id) ON DELETE CASCADE,
                sender_id INTEGER NOT NULL,
                message_type TEXT NOT NULL,
                content TEXT NOT NULL,
                price_amount INTEGER,
                sent_at INTEGER NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                read_at INTEGER
            );",
        )?;

        // One open negotiation per buyer and property
        conn.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_inquiries_open_pair
             ON inquiries(client_id, property_id)
             WHERE status IN ('ACTIVE', 'NEGOTIATING', 'AGREED')",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_inquiries_client ON inquiries(client_id, updated_at)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_inquiries_owner ON inquiries(owner_id, updated_at)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_messages_thread ON messages(inquiry_id, sent_at, id)",
            [],
        )?;

        Ok(())
    }

    // ========== Properties ==========

    /// Save or update a property listing
    pub fn save_property(&self, property: &Property) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO properties (id, owner_id, listed_price, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                property.id.0,
                property.owner_id.0,
                property.listed_price.minor_units(),
                property.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Load a property listing
    pub fn load_property(&self, id: PropertyId) -> Result<Option<Property>> {
        let conn = self.lock()?;
        let property = conn
            .query_row(
                "SELECT id, owner_id, listed_price, status FROM properties WHERE id = ?1",
                params![id.0],
                |row| {
                    Ok(Property {
                        id: PropertyId(row.get(0)?),
                        owner_id: UserId(row.get(1)?),
                        listed_price: price_column(row, 2)?,
                        status: parse_column(row, 3)?,
                    })
                },
            )
            .optional()?;
        Ok(property)
    }

    // ========== Inquiries ==========

    /// Insert a freshly opened inquiry together with its opening messages
    ///
    /// The `id` of `draft` and the `inquiry_id` of each message are ignored
    /// and replaced by the assigned inquiry id. Fails with
    /// [`Error::DuplicateInquiry`] when the buyer already has an open inquiry
    /// on the same property.
    pub fn insert_inquiry(
        &self,
        draft: &Inquiry,
        messages: &[NewMessage],
    ) -> Result<(Inquiry, Vec<Message>)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT INTO inquiries (property_id, client_id, owner_id, listed_price, status,
                offered_price, offered_by, agreed_price, version, created_at, updated_at, closed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                draft.property_id.0,
                draft.client_id.0,
                draft.owner_id.0,
                draft.listed_price.minor_units(),
                draft.status.as_str(),
                draft.offered_price.map(Price::minor_units),
                draft.offered_by.map(|u| u.0),
                draft.agreed_price.map(Price::minor_units),
                draft.version,
                draft.created_at,
                draft.updated_at,
                draft.closed_at,
            ],
        );

        if let Err(e) = inserted {
            return Err(match e.sqlite_error_code() {
                Some(rusqlite::ErrorCode::ConstraintViolation) => {
                    Error::DuplicateInquiry(draft.property_id)
                }
                _ => Error::Database(e),
            });
        }

        let inquiry_id = InquiryId(tx.last_insert_rowid());
        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            let mut message = message.clone();
            message.inquiry_id = inquiry_id;
            let id = insert_message(&tx, &message)?;
            stored.push(message.into_message(id));
        }

        tx.commit()?;

        let mut inquiry = draft.clone();
        inquiry.id = inquiry_id;
        debug!(
            "Opened inquiry {} on property {} for client {}",
            inquiry.id, inquiry.property_id, inquiry.client_id
        );
        Ok((inquiry, stored))
    }

    /// Load one inquiry
    pub fn load_inquiry(&self, id: InquiryId) -> Result<Option<Inquiry>> {
        let conn = self.lock()?;
        let inquiry = conn
            .query_row(
                &format!("SELECT {} FROM inquiries WHERE id = ?1", INQUIRY_COLUMNS),
                params![id.0],
                row_to_inquiry,
            )
            .optional()?;
        Ok(inquiry)
    }

    /// The buyer's open inquiry on a property, if any
    #[cfg(test)]
    pub fn find_open_inquiry(
        &self,
        client_id: UserId,
        property_id: PropertyId,
    ) -> Result<Option<Inquiry>> {
        let conn = self.lock()?;
        let inquiry = conn
            .query_row(
                &format!(
                    "SELECT {} FROM inquiries
                     WHERE client_id = ?1 AND property_id = ?2
                       AND status IN ('ACTIVE', 'NEGOTIATING', 'AGREED')",
                    INQUIRY_COLUMNS
                ),
                params![client_id.0, property_id.0],
                row_to_inquiry,
            )
            .optional()?;
        Ok(inquiry)
    }

    /// List inquiries, most recently updated first
    pub fn list_inquiries(&self, scope: InquiryScope) -> Result<Vec<Inquiry>> {
        let conn = self.lock()?;
        let (filter, user) = match scope {
            InquiryScope::AsClient(user) => ("WHERE client_id = ?1", Some(user.0)),
            InquiryScope::AsOwner(user) => ("WHERE owner_id = ?1", Some(user.0)),
            InquiryScope::All => ("", None),
        };

        let sql = format!(
            "SELECT {} FROM inquiries {} ORDER BY updated_at DESC, id DESC",
            INQUIRY_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;

        let inquiries = match user {
            Some(user) => stmt
                .query_map(params![user], row_to_inquiry)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
            None => stmt
                .query_map([], row_to_inquiry)?
                .collect::<std::result::Result<Vec<_>, _>>()?,
        };

        Ok(inquiries)
    }

    /// Atomically append a message and write the new inquiry state
    ///
    /// The update only applies while the stored version still equals
    /// `expected_version`; otherwise nothing is written and
    /// [`Error::Conflict`] is returned. The returned inquiry carries the
    /// bumped version.
    pub fn commit(
        &self,
        message: &NewMessage,
        inquiry: &Inquiry,
        expected_version: i64,
    ) -> Result<(Message, Inquiry)> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let next_version = expected_version + 1;

        let updated = tx.execute(
            "UPDATE inquiries
             SET status = ?1, offered_price = ?2, offered_by = ?3, agreed_price = ?4,
                 version = ?5, updated_at = ?6, closed_at = ?7
             WHERE id = ?8 AND version = ?9",
            params![
                inquiry.status.as_str(),
                inquiry.offered_price.map(Price::minor_units),
                inquiry.offered_by.map(|u| u.0),
                inquiry.agreed_price.map(Price::minor_units),
                next_version,
                inquiry.updated_at,
                inquiry.closed_at,
                inquiry.id.0,
                expected_version,
            ],
        )?;

        if updated == 0 {
            // Dropping the transaction rolls it back
            return Err(Error::Conflict(inquiry.id));
        }

        let id = insert_message(&tx, message)?;
        tx.commit()?;

        let mut committed = inquiry.clone();
        committed.version = next_version;
        Ok((message.clone().into_message(id), committed))
    }

    // ========== Messages ==========

    /// Full thread history in send order
    pub fn load_messages(&self, inquiry_id: InquiryId) -> Result<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM messages WHERE inquiry_id = ?1 ORDER BY sent_at ASC, id ASC",
            MESSAGE_COLUMNS
        ))?;

        let messages = stmt
            .query_map(params![inquiry_id.0], row_to_message)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    /// Mark every message not sent by `reader` as read; returns how many changed
    ///
    /// Already-read messages are untouched, so repeating the call is a no-op.
    pub fn mark_read(&self, inquiry_id: InquiryId, reader: UserId, now: i64) -> Result<usize> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE messages SET is_read = 1, read_at = ?3
             WHERE inquiry_id = ?1 AND sender_id != ?2 AND is_read = 0",
            params![inquiry_id.0, reader.0, now],
        )?;
        Ok(changed)
    }

    /// Unread messages addressed to `user` across all their inquiries
    pub fn unread_count(&self, user: UserId) -> Result<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM messages m
             JOIN inquiries i ON i.id = m.inquiry_id
             WHERE m.sender_id != ?1 AND m.is_read = 0
               AND (i.client_id = ?1 OR i.owner_id = ?1)",
            params![user.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ========== Utility ==========

    /// Clear all data (for testing)
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM messages", [])?;
        conn.execute("DELETE FROM inquiries", [])?;
        conn.execute("DELETE FROM properties", [])?;
        Ok(())
    }
}

impl PropertyCatalog for Store {
    fn property(&self, id: PropertyId) -> Result<Option<Property>> {
        self.load_property(id)
    }

    fn mark_sold(&self, id: PropertyId) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE properties SET status = ?2 WHERE id = ?1",
            params![id.0, PropertyStatus::Sold.as_str()],
        )?;
        if changed == 0 {
            return Err(Error::PropertyNotFound(id));
        }
        info!("Property {} marked as sold", id);
        Ok(())
    }
}

fn insert_message(conn: &Connection, message: &NewMessage) -> Result<MessageId> {
    conn.execute(
        "INSERT INTO messages (inquiry_id, sender_id, message_type, content, price_amount, sent_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            message.inquiry_id.0,
            message.sender_id.0,
            message.message_type.as_str(),
            &message.content,
            message.price_amount.map(Price::minor_units),
            message.sent_at,
        ],
    )?;
    Ok(MessageId(conn.last_insert_rowid()))
}

fn row_to_inquiry(row: &Row<'_>) -> rusqlite::Result<Inquiry> {
    Ok(Inquiry {
        id: InquiryId(row.get(0)?),
        property_id: PropertyId(row.get(1)?),
        client_id: UserId(row.get(2)?),
        owner_id: UserId(row.get(3)?),
        listed_price: price_column(row, 4)?,
        status: parse_column::<InquiryStatus>(row, 5)?,
        offered_price: optional_price_column(row, 6)?,
        offered_by: row.get::<_, Option<i64>>(7)?.map(UserId),
        agreed_price: optional_price_column(row, 8)?,
        version: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
        closed_at: row.get(12)?,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: MessageId(row.get(0)?),
        inquiry_id: InquiryId(row.get(1)?),
        sender_id: UserId(row.get(2)?),
        message_type: parse_column(row, 3)?,
        content: row.get(4)?,
        price_amount: optional_price_column(row, 5)?,
        sent_at: row.get(6)?,
        is_read: row.get::<_, i32>(7)? != 0,
        read_at: row.get(8)?,
    })
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = UnknownVariant>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn price_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Price> {
    let minor: i64 = row.get(idx)?;
    minor_to_price(minor, idx)
}

fn optional_price_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Price>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|minor| minor_to_price(minor, idx))
        .transpose()
}

fn minor_to_price(minor: i64, idx: usize) -> rusqlite::Result<Price> {
    Price::from_minor(minor).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            Box::new(UnknownVariant {
                kind: "price",
                value: minor.to_string(),
            }),
        )
    })
}
