//! Optional cache of assumed-role sessions.
//!
//! Layout: an arena of slots (`Vec<Option<Slot>>` + free list) and a
//! key → slot index. Keys always carry the tenant and the user; an ARN alone
//! never matches, and a session tagged for one user is never handed to another.
//! Entries are never served past their stored deadline; callers clamp that
//! deadline again to their own token's expiry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::services::credentials::provider::AssumedCredentials;

/// Width of the token-expiry bucket in a cache key. Tokens whose `exp` falls in
/// the same bucket may share a session; each caller clamps the deadline to its
/// own token.
pub const EXPIRY_BUCKET_SECONDS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub role_arn: String,
    pub tenant_id: String,
    pub user_id: String,
    pub expiry_bucket: i64,
}

impl SessionKey {
    pub fn new(
        role_arn: &str,
        tenant_id: &str,
        user_id: &str,
        token_expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            role_arn: role_arn.to_string(),
            tenant_id: tenant_id.to_string(),
            user_id: user_id.to_string(),
            expiry_bucket: token_expires_at.timestamp().div_euclid(EXPIRY_BUCKET_SECONDS),
        }
    }
}

#[derive(Debug)]
struct Slot {
    key: SessionKey,
    credentials: AssumedCredentials,
    deadline: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Option<Slot>>,
    free: Vec<usize>,
    index: HashMap<SessionKey, usize>,
}

impl Arena {
    fn remove(&mut self, idx: usize) -> Option<Slot> {
        let slot = self.slots.get_mut(idx)?.take()?;
        self.index.remove(&slot.key);
        self.free.push(idx);
        Some(slot)
    }

    fn evict_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<usize> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().filter(|s| s.deadline <= now).map(|_| i))
            .collect();
        for idx in expired {
            self.remove(idx);
        }
    }

    fn evict_oldest(&mut self) {
        let oldest = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (s.deadline, i)))
            .min()
            .map(|(_, i)| i);
        if let Some(idx) = oldest {
            self.remove(idx);
        }
    }
}

#[derive(Debug)]
pub struct SessionCache {
    arena: Mutex<Arena>,
    capacity: usize,
}

impl SessionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: Mutex::new(Arena::default()),
            capacity: capacity.max(1),
        }
    }

    /// Live entry for `key`, evicting it if its deadline has passed.
    pub fn get(&self, key: &SessionKey, now: DateTime<Utc>) -> Option<(AssumedCredentials, DateTime<Utc>)> {
        let mut arena = self.arena.lock();
        let idx = *arena.index.get(key)?;
        let live = arena.slots[idx].as_ref().filter(|s| s.deadline > now).is_some();
        if !live {
            arena.remove(idx);
            return None;
        }
        arena.slots[idx]
            .as_ref()
            .map(|s| (s.credentials.clone(), s.deadline))
    }

    /// Store a session. Written only after a successful assumption.
    pub fn insert(
        &self,
        key: SessionKey,
        credentials: AssumedCredentials,
        deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        if deadline <= now {
            return;
        }

        let mut arena = self.arena.lock();
        if let Some(idx) = arena.index.get(&key).copied() {
            arena.remove(idx);
        }
        if arena.index.len() >= self.capacity {
            arena.evict_expired(now);
        }
        if arena.index.len() >= self.capacity {
            arena.evict_oldest();
        }

        let slot = Slot {
            key: key.clone(),
            credentials,
            deadline,
        };
        let idx = match arena.free.pop() {
            Some(idx) => {
                arena.slots[idx] = Some(slot);
                idx
            }
            None => {
                arena.slots.push(Some(slot));
                arena.slots.len() - 1
            }
        };
        arena.index.insert(key, idx);
    }

    /// Drop every session for (role, tenant), whatever its expiry bucket.
    pub fn invalidate(&self, role_arn: &str, tenant_id: &str) -> usize {
        let mut arena = self.arena.lock();
        let matching: Vec<usize> = arena
            .index
            .iter()
            .filter(|(k, _)| k.role_arn == role_arn && k.tenant_id == tenant_id)
            .map(|(_, idx)| *idx)
            .collect();
        let removed = matching.len();
        for idx in matching {
            arena.remove(idx);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.arena.lock().index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
