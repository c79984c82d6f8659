//! Process-local registry of users that currently hold an open channel.

use murmur_types::UserId;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Set of online user ids.
///
/// Cloning shares the underlying set. Every operation is a short critical
/// section on a `std::sync::RwLock` that never spans an `.await`, so callers
/// on the async runtime never block on I/O here. Reads are advisory: a user
/// may disconnect right after `is_online` returns `true`.
#[derive(Clone, Debug, Default)]
pub struct PresenceRegistry {
    online: Arc<RwLock<HashSet<UserId>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `user_id` online. Returns `true` if they were offline before.
    pub fn connect(&self, user_id: UserId) -> bool {
        let inserted = self.write().insert(user_id);
        if inserted {
            tracing::info!(user_id, "user online");
        }
        inserted
    }

    /// Marks `user_id` offline. Returns `true` if they were online before.
    pub fn disconnect(&self, user_id: UserId) -> bool {
        let removed = self.write().remove(&user_id);
        if removed {
            tracing::info!(user_id, "user offline");
        }
        removed
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.read().contains(&user_id)
    }

    /// Copy of the current online set.
    pub fn snapshot(&self) -> HashSet<UserId> {
        self.read().clone()
    }

    pub fn online_count(&self) -> usize {
        self.read().len()
    }

    // A panic while holding the lock cannot leave a HashSet half-updated in a
    // way that matters here, so poisoning is recovered rather than propagated.
    fn read(&self) -> RwLockReadGuard<'_, HashSet<UserId>> {
        self.online.read().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::error!("presence lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashSet<UserId>> {
        self.online.write().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::error!("presence lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}
