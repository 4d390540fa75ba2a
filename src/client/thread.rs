//! Client-side view of one inquiry thread
//!
//! Messages sent over the live channel show up immediately as pending
//! entries tagged with a `clientRef`. The server's echo (or error) carrying
//! the same tag turns them into confirmed (or failed) entries. History
//! fetched over HTTP is merged in by message id, so refetching after a
//! reconnect never duplicates anything.

use crate::protocol::ServerEnvelope;
use crate::storage::{InquiryId, Message, MessageId, MessageType, Price, UserId};

/// One line of the local thread
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Sent, not yet acknowledged
    Pending {
        /// Correlation tag
        client_ref: String,
        /// Message kind
        message_type: MessageType,
        /// Content as typed
        content: String,
        /// Amount for price kinds
        price_amount: Option<Price>,
    },
    /// Persisted by the server
    Confirmed(Message),
    /// Rejected by the server
    Failed {
        /// Correlation tag
        client_ref: String,
        /// Message kind
        message_type: MessageType,
        /// Content as typed
        content: String,
        /// Server's explanation
        reason: String,
    },
}

impl Entry {
    /// Correlation tag of an unconfirmed entry
    pub fn client_ref(&self) -> Option<&str> {
        match self {
            Entry::Pending { client_ref, .. } | Entry::Failed { client_ref, .. } => {
                Some(client_ref)
            }
            Entry::Confirmed(_) => None,
        }
    }

    /// The stored message, once confirmed
    pub fn message(&self) -> Option<&Message> {
        match self {
            Entry::Confirmed(message) => Some(message),
            _ => None,
        }
    }

    fn sort_key(&self) -> (u8, i64, MessageId) {
        match self {
            Entry::Confirmed(message) => {
                let (sent_at, id) = message.order_key();
                (0, sent_at, id)
            }
            // Unconfirmed entries trail the history in insertion order
            _ => (1, 0, MessageId(0)),
        }
    }
}

/// Local, reconciled copy of a thread
#[derive(Debug, Clone, PartialEq)]
pub struct LocalThread {
    inquiry_id: InquiryId,
    entries: Vec<Entry>,
}

impl LocalThread {
    /// Empty thread
    pub fn new(inquiry_id: InquiryId) -> Self {
        Self {
            inquiry_id,
            entries: Vec::new(),
        }
    }

    /// Thread seeded with fetched history
    pub fn from_history(inquiry_id: InquiryId, messages: Vec<Message>) -> Self {
        let mut thread = Self::new(inquiry_id);
        thread.merge(messages);
        thread
    }

    /// Inquiry this thread belongs to
    pub fn inquiry_id(&self) -> InquiryId {
        self.inquiry_id
    }

    /// All entries: confirmed history by `(sent_at, id)`, then unconfirmed
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Confirmed messages only
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter().filter_map(Entry::message)
    }

    /// Entries still waiting for the server
    pub fn pending_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| matches!(entry, Entry::Pending { .. }))
            .count()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// No entries at all
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Record an outgoing message before the server has seen it
    pub fn push_pending(
        &mut self,
        client_ref: impl Into<String>,
        message_type: MessageType,
        content: impl Into<String>,
        price_amount: Option<Price>,
    ) {
        self.entries.push(Entry::Pending {
            client_ref: client_ref.into(),
            message_type,
            content: content.into(),
            price_amount,
        });
    }

    /// Replace the pending entry tagged `client_ref` with the stored message
    ///
    /// A message already present by id is updated in place instead, and the
    /// pending entry dropped.
    pub fn confirm(&mut self, client_ref: &str, message: Message) {
        self.entries
            .retain(|entry| entry.client_ref() != Some(client_ref));
        self.upsert(message);
        self.sort();
    }

    /// Mark the pending entry tagged `client_ref` as rejected
    ///
    /// Returns `false` if no pending entry carries that tag.
    pub fn fail(&mut self, client_ref: &str, reason: impl Into<String>) -> bool {
        let Some(index) = self.entries.iter().position(|entry| {
            matches!(entry, Entry::Pending { client_ref: tag, .. } if tag == client_ref)
        }) else {
            return false;
        };

        if let Entry::Pending {
            client_ref,
            message_type,
            content,
            ..
        } = self.entries.remove(index)
        {
            self.entries.insert(
                index,
                Entry::Failed {
                    client_ref,
                    message_type,
                    content,
                    reason: reason.into(),
                },
            );
        }
        true
    }

    /// Merge fetched history; existing messages are replaced by id
    pub fn merge(&mut self, messages: Vec<Message>) {
        for message in messages {
            if message.inquiry_id == self.inquiry_id {
                self.upsert(message);
            }
        }
        self.sort();
    }

    /// Fold a server envelope into the thread
    ///
    /// Returns `true` if the thread changed.
    pub fn apply(&mut self, envelope: &ServerEnvelope) -> bool {
        if envelope.inquiry_id() != Some(self.inquiry_id) {
            return false;
        }

        match envelope {
            ServerEnvelope::NewMessage {
                message,
                client_ref: Some(client_ref),
                ..
            } => {
                self.confirm(client_ref, message.clone());
                true
            }
            ServerEnvelope::NewMessage { message, .. } => {
                self.merge(vec![message.clone()]);
                true
            }
            ServerEnvelope::Error {
                client_ref: Some(client_ref),
                message,
                ..
            } => self.fail(client_ref, message.clone()),
            ServerEnvelope::MessagesRead {
                reader_id, read_at, ..
            } => self.mark_read_by(*reader_id, *read_at) > 0,
            _ => false,
        }
    }

    /// Mark messages addressed to `reader` as read
    fn mark_read_by(&mut self, reader: UserId, read_at: i64) -> usize {
        let mut count = 0;
        for entry in &mut self.entries {
            if let Entry::Confirmed(message) = entry {
                if message.sender_id != reader && !message.is_read {
                    message.is_read = true;
                    message.read_at = Some(read_at);
                    count += 1;
                }
            }
        }
        count
    }

    fn upsert(&mut self, message: Message) {
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.message().map(|m| m.id) == Some(message.id))
        {
            Some(existing) => *existing = Entry::Confirmed(message),
            None => self.entries.push(Entry::Confirmed(message)),
        }
    }

    fn sort(&mut self) {
        self.entries.sort_by_key(Entry::sort_key);
    }
}
