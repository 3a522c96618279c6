//! Expiry scanner: turns the passage of time into refresh events.
//!
//! Expired rows are filtered at read time, so nothing in the store changes
//! when a grant lapses. The scanner walks forward in contiguous windows
//! `(since, until]` and emits a full-refresh event for every player whose
//! permissions may have changed because a row expired inside the window.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use permsync_core::{reason, Clock, PlayerId};
use permsync_store::{PermissionStore, PermissionStoreExt, Result};
use permsync_stream::ChangeEmitter;
use tokio::sync::watch;

use crate::config::ScannerConfig;

/// A half-open scan window `(since, until]` in Unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub since: i64,
    pub until: i64,
}

/// Position of the last completed scan.
///
/// Advancing is a compare-and-swap, so two overlapping ticks never scan the
/// same window.
#[derive(Debug)]
pub struct ScanCursor {
    last: AtomicI64,
}

impl ScanCursor {
    pub fn new(start: i64) -> Self {
        Self {
            last: AtomicI64::new(start),
        }
    }

    /// Claim the window from the cursor up to `until`. `None` if the cursor
    /// is already at or past `until`.
    pub fn advance(&self, until: i64) -> Option<ScanWindow> {
        let mut since = self.last.load(Ordering::Acquire);
        loop {
            if since >= until {
                return None;
            }
            match self
                .last
                .compare_exchange(since, until, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return Some(ScanWindow { since, until }),
                Err(current) => since = current,
            }
        }
    }

    /// Hand a claimed window back after a failed scan. Does nothing if
    /// another tick has already moved past it.
    pub fn rewind(&self, window: ScanWindow) -> bool {
        self.last
            .compare_exchange(window.until, window.since, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn last(&self) -> i64 {
        self.last.load(Ordering::Acquire)
    }
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    /// Window covered, or `None` if there was nothing to scan.
    pub window: Option<ScanWindow>,
    /// Players refreshed.
    pub refreshed: BTreeSet<PlayerId>,
}

impl ScanReport {
    fn idle() -> Self {
        Self {
            window: None,
            refreshed: BTreeSet::new(),
        }
    }
}

/// Periodic expiry scanner.
pub struct ExpiryScanner<S> {
    store: Arc<S>,
    emitter: ChangeEmitter,
    clock: Arc<dyn Clock>,
    config: ScannerConfig,
    cursor: ScanCursor,
}

impl<S: PermissionStore> ExpiryScanner<S> {
    /// Create a scanner. The first window reaches `bootstrap_window` back
    /// from now, so grants that lapsed while the service was down are
    /// caught.
    pub fn new(
        store: Arc<S>,
        emitter: ChangeEmitter,
        clock: Arc<dyn Clock>,
        config: ScannerConfig,
    ) -> Self {
        let bootstrap = i64::try_from(config.bootstrap_window.as_millis()).unwrap_or(i64::MAX);
        let start = clock.now_millis().saturating_sub(bootstrap);
        Self {
            store,
            emitter,
            clock,
            config,
            cursor: ScanCursor::new(start),
        }
    }

    pub fn cursor(&self) -> &ScanCursor {
        &self.cursor
    }

    /// Emit a startup refresh for every player with any stored row, expired
    /// or not. Does not move the cursor.
    pub async fn startup_refresh(&self) -> Result<usize> {
        let players = self.store.players_with_any_rows().await?;
        for player in &players {
            self.emitter.emit_refresh(*player, reason::STARTUP);
        }
        tracing::info!(players = players.len(), "startup refresh emitted");
        Ok(players.len())
    }

    /// Scan the window since the previous tick.
    ///
    /// On a store failure the window is handed back, so the next tick scans
    /// it again instead of losing it.
    pub async fn tick(&self) -> Result<ScanReport> {
        let Some(window) = self.cursor.advance(self.clock.now_millis()) else {
            return Ok(ScanReport::idle());
        };

        let refreshed = match self.affected_players(window).await {
            Ok(players) => players,
            Err(err) => {
                let rewound = self.cursor.rewind(window);
                tracing::debug!(
                    since = window.since,
                    until = window.until,
                    rewound,
                    "expiry scan failed, window handed back"
                );
                return Err(err);
            }
        };

        for player in &refreshed {
            self.emitter.emit_refresh(*player, reason::EXPIRY);
        }

        if refreshed.is_empty() {
            tracing::trace!(
                since = window.since,
                until = window.until,
                "expiry scan found nothing"
            );
        } else {
            tracing::info!(
                since = window.since,
                until = window.until,
                players = refreshed.len(),
                "expiry refresh emitted"
            );
        }

        Ok(ScanReport {
            window: Some(window),
            refreshed,
        })
    }

    /// Players with a direct grant or membership that expired in the
    /// window, plus active members of groups with a grant that expired in it.
    async fn affected_players(&self, window: ScanWindow) -> Result<BTreeSet<PlayerId>> {
        let mut players = self
            .store
            .players_with_expired_rows(window.since, window.until)
            .await?;

        let groups = self
            .store
            .groups_with_expired_grants(window.since, window.until)
            .await?;
        let now = self.clock.now_millis();
        for group in &groups {
            players.extend(self.store.active_players_for_group(group, now).await?);
        }

        Ok(players)
    }

    /// Emit the startup refresh, then tick every `scan_interval` until
    /// `shutdown` turns true or its sender is dropped.
    ///
    /// A failed startup refresh or tick is logged and the loop keeps going.
    /// A failed tick's window is scanned again on the next one.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        if let Err(err) = self.startup_refresh().await {
            tracing::warn!(error = %err, "startup refresh failed");
        }

        let mut interval = tokio::time::interval(self.config.scan_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = self.config.scan_interval.as_millis() as u64,
            "expiry scanner started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(err) = self.tick().await {
                        tracing::warn!(error = %err, "expiry tick failed, window will be retried");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("expiry scanner stopped");
    }
}

impl<S> std::fmt::Debug for ExpiryScanner<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiryScanner")
            .field("config", &self.config)
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
    }
}
