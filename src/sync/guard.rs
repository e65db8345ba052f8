//! Per-account concurrency guard.
//!
//! Tier tasks run independently and may overlap in wall-clock time. The guard
//! makes sure only one of them works on a given account at a time.
//!
//! The set lives in process memory. Two engine processes sharing one database
//! do not see each other's permits.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::model::AccountId;

/// Set of accounts with a run in flight. Cheap to clone; clones share state.
#[derive(Debug, Clone, Default)]
pub struct ImportGuard {
    in_flight: Arc<Mutex<HashSet<AccountId>>>,
}

impl ImportGuard {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<AccountId>> {
        self.in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Claim `account_id`. `None` if a run for it is already in flight.
    pub fn try_acquire(&self, account_id: AccountId) -> Option<ImportPermit> {
        if self.lock().insert(account_id) {
            Some(ImportPermit {
                guard: self.clone(),
                account_id,
            })
        } else {
            None
        }
    }

    pub fn is_held(&self, account_id: AccountId) -> bool {
        self.lock().contains(&account_id)
    }
}

/// Proof of a claimed account. Releases the claim when dropped, including
/// during unwinding.
#[derive(Debug)]
pub struct ImportPermit {
    guard: ImportGuard,
    account_id: AccountId,
}

impl Drop for ImportPermit {
    fn drop(&mut self) {
        self.guard.lock().remove(&self.account_id);
    }
}
