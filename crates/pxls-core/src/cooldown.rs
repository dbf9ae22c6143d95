//! Per-client placement cooldowns.
//!
//! [`CooldownTracker`] remembers when each [`ClientIdentity`] last had a
//! placement accepted and answers how long it must still wait. The
//! cooldown length is process-wide and can be changed at runtime; already
//! recorded timestamps are kept, so shortening the cooldown immediately
//! frees anyone whose wait now computes to zero.
//!
//! The table lives only in memory and is empty after a restart.
//!
//! # Concurrency
//!
//! Identities are spread over a fixed number of mutex-guarded shards, so
//! placements by different clients rarely touch the same lock. Checking a
//! cooldown and recording a placement are two separate steps; two racing
//! requests from one identity can both pass the check. Other identities
//! are never affected by such a race.

use std::collections::HashMap;
use std::collections::hash_map::RandomState;
use std::fmt;
use std::hash::BuildHasher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Number of independently locked shards.
const SHARD_COUNT: u64 = 32;

/// Opaque key identifying a client for rate limiting.
///
/// Derived from the request origin and not authenticated; two requests
/// with the same identity are treated as the same actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    /// Wrap a raw identity string.
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The raw identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClientIdentity {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Tracks the last accepted placement time of every client.
#[derive(Debug)]
pub struct CooldownTracker {
    /// Current cooldown length in milliseconds.
    cooldown_ms: AtomicU64,
    /// Entries older than this (or the cooldown, if longer) are swept.
    retention_ms: u64,
    shards: Vec<Mutex<HashMap<ClientIdentity, u64>>>,
    hasher: RandomState,
}

impl CooldownTracker {
    /// Create a tracker whose entries are retained for 24 hours.
    pub fn new(cooldown: Duration) -> Self {
        Self::with_retention(cooldown, Duration::from_secs(24 * 60 * 60))
    }

    /// Create a tracker with an explicit sweep retention window.
    pub fn with_retention(cooldown: Duration, retention: Duration) -> Self {
        let shards = (0..SHARD_COUNT)
            .map(|_| Mutex::new(HashMap::new()))
            .collect();
        Self {
            cooldown_ms: AtomicU64::new(duration_millis(cooldown)),
            retention_ms: duration_millis(retention),
            shards,
            hasher: RandomState::new(),
        }
    }

    /// The cooldown currently applied to every client.
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms.load(Ordering::Acquire))
    }

    /// Change the cooldown for all future checks, returning the old value.
    pub fn set_cooldown(&self, cooldown: Duration) -> Duration {
        let prev = self
            .cooldown_ms
            .swap(duration_millis(cooldown), Ordering::AcqRel);
        Duration::from_millis(prev)
    }

    /// How long `identity` must still wait at `now_ms` before placing.
    ///
    /// Zero for identities that have never placed or whose cooldown has
    /// elapsed.
    pub fn time_until_allowed(&self, identity: &ClientIdentity, now_ms: u64) -> Duration {
        let Some(last) = self.last_placement(identity) else {
            return Duration::ZERO;
        };
        let next_allowed = last.saturating_add(self.cooldown_ms.load(Ordering::Acquire));
        Duration::from_millis(next_allowed.saturating_sub(now_ms))
    }

    /// Record an accepted placement by `identity` at `now_ms`.
    pub fn record_placement(&self, identity: &ClientIdentity, now_ms: u64) {
        if let Some(mut map) = self.shard(identity) {
            map.insert(identity.clone(), now_ms);
        }
    }

    /// Timestamp of the last accepted placement by `identity`, if any.
    pub fn last_placement(&self, identity: &ClientIdentity) -> Option<u64> {
        self.shard(identity)?.get(identity).copied()
    }

    /// Drop entries whose last placement is older than the retention
    /// window (never shorter than the live cooldown). Returns how many
    /// entries were removed.
    ///
    /// A swept identity would have computed a zero wait anyway.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let horizon = self
            .retention_ms
            .max(self.cooldown_ms.load(Ordering::Acquire));
        let mut removed = 0usize;
        for shard in &self.shards {
            let mut map = lock(shard);
            let before = map.len();
            map.retain(|_, last| last.saturating_add(horizon) > now_ms);
            removed = removed.saturating_add(before.saturating_sub(map.len()));
        }
        removed
    }

    /// Number of identities currently remembered.
    pub fn tracked_identities(&self) -> usize {
        self.shards
            .iter()
            .map(|s| lock(s).len())
            .fold(0usize, usize::saturating_add)
    }

    fn shard(
        &self,
        identity: &ClientIdentity,
    ) -> Option<MutexGuard<'_, HashMap<ClientIdentity, u64>>> {
        let bucket = self.hasher.hash_one(identity).checked_rem(SHARD_COUNT)?;
        self.shards.get(usize::try_from(bucket).ok()?).map(lock)
    }
}

/// Lock a shard, recovering the map if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
