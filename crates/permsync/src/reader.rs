//! Snapshot reader: a player's current permissions, computed from the store.

use std::sync::Arc;

use permsync_core::{PermissionSnapshot, PlayerId, SnapshotScope};
use permsync_store::{PermissionStore, Result};

/// Reads player snapshots with expiry applied at read time.
///
/// Store failures propagate. An empty snapshot means the player truly has
/// no active rows, never that the read failed.
pub struct SnapshotReader<S> {
    store: Arc<S>,
}

impl<S> Clone for SnapshotReader<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: PermissionStore> SnapshotReader<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Read `player`'s snapshot as of `now`.
    ///
    /// `scope` selects the returned dimensions. The effective set needs both
    /// direct and inherited grants, so asking for it loads them regardless.
    pub async fn read(
        &self,
        player: PlayerId,
        scope: SnapshotScope,
        now: i64,
    ) -> Result<PermissionSnapshot> {
        let direct = if scope.loads_direct() {
            self.store.player_direct_grants(player, now).await?
        } else {
            Vec::new()
        };

        let memberships = if scope.groups {
            self.store.player_memberships(player, now).await?
        } else {
            Vec::new()
        };

        let inherited = if scope.effective {
            self.store.group_grants_for_player(player, now).await?
        } else {
            Default::default()
        };

        Ok(PermissionSnapshot::assemble(
            player,
            scope,
            direct,
            memberships,
            inherited,
            now,
        ))
    }

    /// Read every dimension.
    pub async fn read_full(&self, player: PlayerId, now: i64) -> Result<PermissionSnapshot> {
        self.read(player, SnapshotScope::FULL, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permsync_core::{GroupMembership, PermissionGrant};
    use permsync_store::MemoryStore;

    async fn seeded() -> (SnapshotReader<MemoryStore>, PlayerId) {
        let store = MemoryStore::new();
        let player = PlayerId::from_bytes([9; 16]);
        store.create_group("admins").await.unwrap();
        store
            .add_group_permissions("admins", &[PermissionGrant::permanent("ban")])
            .await
            .unwrap();
        store
            .add_player_groups(player, &[GroupMembership::permanent("admins")])
            .await
            .unwrap();
        store
            .add_player_permissions(
                player,
                &[PermissionGrant::permanent("fly"), PermissionGrant::until("build", 100)],
            )
            .await
            .unwrap();
        (SnapshotReader::new(Arc::new(store)), player)
    }

    #[tokio::test]
    async fn test_full_read() {
        let (reader, player) = seeded().await;
        let snapshot = reader.read_full(player, 50).await.unwrap();

        assert_eq!(snapshot.direct_grants.len(), 2);
        assert_eq!(snapshot.group_names().collect::<Vec<_>>(), vec!["admins"]);
        let effective: Vec<_> = snapshot.effective_permissions.iter().map(String::as_str).collect();
        assert_eq!(effective, vec!["ban", "build", "fly"]);
    }

    #[tokio::test]
    async fn test_expired_rows_vanish() {
        let (reader, player) = seeded().await;
        let snapshot = reader.read_full(player, 100).await.unwrap();
        assert!(!snapshot.has_permission("build"));
        assert_eq!(snapshot.direct_permissions().collect::<Vec<_>>(), vec!["fly"]);
    }

    #[tokio::test]
    async fn test_effective_only_still_loads_everything_it_needs() {
        let (reader, player) = seeded().await;
        let snapshot = reader
            .read(player, SnapshotScope::new(true, false, false), 0)
            .await
            .unwrap();

        assert!(snapshot.direct_grants.is_empty());
        assert!(snapshot.group_memberships.is_empty());
        assert!(snapshot.has_permission("ban"));
        assert!(snapshot.has_permission("fly"));
    }

    #[tokio::test]
    async fn test_unknown_player_is_empty() {
        let (reader, _) = seeded().await;
        let snapshot = reader.read_full(PlayerId::random(), 0).await.unwrap();
        assert!(snapshot.is_empty());
    }
}
