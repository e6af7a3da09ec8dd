//! Indexing scheduler.
//!
//! Tracks one [`RunState`] per connector in a `DashMap` and advances it on a
//! fixed tick:
//!
//! ```text
//! not_started/success/failed --(due, enabled)--> in_progress
//! in_progress --(next tick)--> success   (credential linked, or none needed)
//!                          \-> failed    ("No credential linked")
//! ```
//!
//! A connector is due when its refresh interval has elapsed since the last
//! run, or immediately after a run-once request. Connectors without a
//! refresh interval run once and then only on request.

use crate::store::{CatalogStore, StoreError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use connector_console::connectors::{Connector, ConnectorId, IndexingState, IndexingStatus};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// Documents credited per successful run.
const DOCS_PER_RUN: u64 = 25;

/// Run bookkeeping for one connector.
#[derive(Clone, Debug)]
pub struct RunState {
    pub last_status: IndexingState,
    pub last_run_at: Option<DateTime<Utc>>,
    pub docs_indexed: u64,
    pub error_msg: Option<String>,
    /// When the next scheduled run is due. `None` means only on request.
    pub next_due: Option<DateTime<Utc>>,
    pub requested: bool,
}

impl RunState {
    fn new(created_at: DateTime<Utc>) -> Self {
        Self {
            last_status: IndexingState::NotStarted,
            last_run_at: None,
            docs_indexed: 0,
            error_msg: None,
            next_due: Some(created_at),
            requested: false,
        }
    }

    fn is_due(&self, connector: &Connector, now: DateTime<Utc>) -> bool {
        if self.requested {
            return true;
        }
        !connector.disabled && self.next_due.map_or(false, |due| due <= now)
    }
}

pub struct IndexingScheduler {
    store: Arc<CatalogStore>,
    runs: DashMap<ConnectorId, RunState>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl IndexingScheduler {
    pub fn new(store: Arc<CatalogStore>) -> Self {
        Self {
            store,
            runs: DashMap::new(),
            handle: Mutex::new(None),
        }
    }

    /// Spawns the tick loop. Replaces a previously started loop.
    ///
    /// The loop only holds a weak reference and ends once the scheduler is
    /// dropped.
    pub fn start(self: &Arc<Self>, every: Duration) {
        let scheduler = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let mut interval = time::interval(every);
            loop {
                interval.tick().await;
                let Some(scheduler) = scheduler.upgrade() else {
                    break;
                };
                if let Err(e) = scheduler.tick(Utc::now()) {
                    warn!(error = %e, "Indexing tick failed");
                }
            }
        });

        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.replace(handle) {
            old.abort();
        }
        info!(every = ?every, "Indexing scheduler started");
    }

    pub fn shutdown(&self) {
        let mut slot = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
            info!("Indexing scheduler stopped");
        }
    }

    /// Advances every connector by one step.
    pub fn tick(&self, now: DateTime<Utc>) -> Result<(), StoreError> {
        let connectors = self.store.list_connectors()?;
        let live: HashSet<ConnectorId> = connectors.iter().map(|c| c.id).collect();

        // Deleted connectors leave tracking
        self.runs.retain(|id, _| live.contains(id));

        for connector in &connectors {
            let mut run = self
                .runs
                .entry(connector.id)
                .or_insert_with(|| RunState::new(connector.created_at));

            if run.last_status == IndexingState::InProgress {
                complete_run(run.value_mut(), connector, now);
            } else if run.is_due(connector, now) {
                run.last_status = IndexingState::InProgress;
                run.requested = false;
                run.error_msg = None;
                debug!(connector_id = connector.id, "Indexing run started");
            }
        }
        Ok(())
    }

    /// Marks a connector due on the next tick, even when paused.
    pub fn request_run(&self, connector: &Connector) {
        let mut run = self
            .runs
            .entry(connector.id)
            .or_insert_with(|| RunState::new(connector.created_at));
        run.requested = true;
        info!(connector_id = connector.id, "Indexing run requested");
    }

    pub fn forget(&self, connector_id: ConnectorId) {
        self.runs.remove(&connector_id);
    }

    /// Status of `connector`, `not_started` if it was never ticked.
    pub fn status_of(&self, connector: Connector) -> IndexingStatus {
        match self.runs.get(&connector.id) {
            Some(run) => IndexingStatus {
                last_status: run.last_status,
                last_run_at: run.last_run_at,
                docs_indexed: run.docs_indexed,
                error_msg: run.error_msg.clone(),
                connector,
            },
            None => IndexingStatus::not_started(connector),
        }
    }

    /// Statuses of every catalogued connector.
    pub fn statuses(&self) -> Result<Vec<IndexingStatus>, StoreError> {
        Ok(self
            .store
            .list_connectors()?
            .into_iter()
            .map(|c| self.status_of(c))
            .collect())
    }
}

impl Drop for IndexingScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Next scheduled run, `None` when the interval does not fit a timestamp.
fn next_due_after(now: DateTime<Utc>, refresh_secs: u64) -> Option<DateTime<Utc>> {
    let secs = i64::try_from(refresh_secs).ok()?;
    now.checked_add_signed(ChronoDuration::try_seconds(secs)?)
}

fn complete_run(run: &mut RunState, connector: &Connector, now: DateTime<Utc>) {
    run.last_run_at = Some(now);
    run.next_due = connector.refresh_interval.and_then(|secs| {
        let due = next_due_after(now, secs);
        if due.is_none() {
            warn!(
                connector_id = connector.id,
                refresh_freq = secs,
                "Refresh interval out of range, running only on request"
            );
        }
        due
    });

    if connector.source.requires_credential() && !connector.is_linked() {
        run.last_status = IndexingState::Failed;
        run.error_msg = Some("No credential linked".to_string());
        warn!(connector_id = connector.id, "Indexing run failed: no credential linked");
    } else {
        run.last_status = IndexingState::Success;
        run.docs_indexed += DOCS_PER_RUN;
        info!(
            connector_id = connector.id,
            docs_indexed = run.docs_indexed,
            "Indexing run succeeded"
        );
    }
}
