//! Per-player mutation locks.
//!
//! A keyed registry of async mutexes. Holding a player's lock across
//! snapshot-before, write, snapshot-after and emit keeps two mutations of
//! the same player from interleaving and producing a wrong delta.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use permsync_core::PlayerId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Held locks for a set of players. Released on drop.
#[derive(Debug, Default)]
pub struct PlayerGuards {
    guards: Vec<OwnedMutexGuard<()>>,
}

impl PlayerGuards {
    /// Number of players locked.
    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

/// Registry of per-player async mutexes.
///
/// Entries are held weakly and pruned once no guard references them.
#[derive(Debug, Default)]
pub struct PlayerLocks {
    locks: Mutex<HashMap<PlayerId, Weak<AsyncMutex<()>>>>,
}

impl PlayerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&self, player: PlayerId) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = locks.get(&player).and_then(Weak::upgrade) {
            return existing;
        }
        locks.retain(|_, weak| weak.strong_count() > 0);
        let lock = Arc::new(AsyncMutex::new(()));
        locks.insert(player, Arc::downgrade(&lock));
        lock
    }

    /// Lock one player.
    pub async fn lock(&self, player: PlayerId) -> PlayerGuards {
        self.lock_all([player]).await
    }

    /// Lock several players in ascending id order, so two callers locking
    /// overlapping sets cannot deadlock.
    pub async fn lock_all(&self, players: impl IntoIterator<Item = PlayerId>) -> PlayerGuards {
        let ordered: BTreeSet<PlayerId> = players.into_iter().collect();
        let mut guards = Vec::with_capacity(ordered.len());
        for player in ordered {
            guards.push(self.handle(player).lock_owned().await);
        }
        PlayerGuards { guards }
    }

    /// Number of players with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}
