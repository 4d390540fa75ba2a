//! Per-inquiry mutual exclusion
//!
//! Every read-decide-write cycle on an inquiry runs under that inquiry's
//! lock. Locks are independent across inquiries and acquisition is bounded
//! by a timeout, so a stalled holder cannot block an inquiry forever.

use crate::storage::InquiryId;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::warn;

/// Held while an inquiry is being mutated; released on drop
pub struct InquiryGuard {
    inquiry_id: InquiryId,
    _guard: OwnedMutexGuard<()>,
}

impl InquiryGuard {
    /// Inquiry this guard protects
    pub fn inquiry_id(&self) -> InquiryId {
        self.inquiry_id
    }
}

/// Lock table keyed by inquiry id
pub struct InquiryLocks {
    locks: Mutex<HashMap<InquiryId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl InquiryLocks {
    /// Create a lock table with the given acquisition timeout
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Acquire the lock for one inquiry
    ///
    /// Fails with [`Error::Busy`] when the lock is not obtained within the
    /// configured timeout.
    pub async fn acquire(&self, inquiry_id: InquiryId) -> Result<InquiryGuard> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only the table refers to are neither held nor awaited
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks
                .entry(inquiry_id)
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        match tokio::time::timeout(self.timeout, lock.lock_owned()).await {
            Ok(guard) => Ok(InquiryGuard {
                inquiry_id,
                _guard: guard,
            }),
            Err(_) => {
                warn!("Timed out waiting for lock on inquiry {}", inquiry_id);
                Err(Error::Busy(inquiry_id))
            }
        }
    }

    /// Number of inquiries with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether no lock entry is live
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
