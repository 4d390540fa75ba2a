//! Typing indicator tracking
//!
//! Best-effort and lossy. Each `isTyping: true` bumps a generation; the
//! expiry timer only clears the indicator if no newer signal arrived since.

use crate::storage::{InquiryId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

type Key = (InquiryId, UserId);

/// Who is currently typing where
pub struct TypingTracker {
    expiry: Duration,
    active: Mutex<HashMap<Key, u64>>,
    generation: AtomicU64,
}

impl TypingTracker {
    /// Create a tracker whose indicators expire after `expiry` of silence
    pub fn new(expiry: Duration) -> Self {
        Self {
            expiry,
            active: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// Silence after which an indicator clears
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Record a typing signal; returns its generation
    pub fn start(&self, inquiry_id: InquiryId, user: UserId) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((inquiry_id, user), generation);
        generation
    }

    /// Explicit stop; returns whether the user was marked as typing
    pub fn stop(&self, inquiry_id: InquiryId, user: UserId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(inquiry_id, user))
            .is_some()
    }

    /// Clear the indicator if `generation` is still the latest signal
    pub fn expire(&self, inquiry_id: InquiryId, user: UserId, generation: u64) -> bool {
        let mut active = self.active.lock().unwrap_or_else(|e| e.into_inner());
        match active.get(&(inquiry_id, user)) {
            Some(current) if *current == generation => {
                active.remove(&(inquiry_id, user));
                true
            }
            _ => false,
        }
    }

    /// Whether the user is currently marked as typing
    pub fn is_typing(&self, inquiry_id: InquiryId, user: UserId) -> bool {
        self.active
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&(inquiry_id, user))
    }
}
