//! Reconciliation of successive ledger polls into lifecycle events.

use std::collections::HashSet;
use std::sync::Arc;

use ledgerwatch_domain::config::MonitorSettings;
use ledgerwatch_domain::model::{Block, MonitorEvent, Snapshot, Transaction, TxId};
use ledgerwatch_domain::source::SnapshotSource;
use metrics::{counter, gauge};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::state::{MonitorState, PendingEntry};
use crate::worker::MonitorError;

/// Consecutive failed fetches of one block body before it is skipped.
pub const MAX_BLOCK_FETCH_ATTEMPTS: u32 = 3;

/// Result of a single tick that completed without a fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The liveness marker did not move since the previous tick.
    Skipped,
    Reconciled { height: u64, events: usize },
}

pub struct LedgerMonitor<S> {
    source: S,
    settings: MonitorSettings,
    state: MonitorState,
    events: UnboundedSender<MonitorEvent>,
    emitted: usize,
}

impl<S> LedgerMonitor<S>
where
    S: SnapshotSource,
{
    pub fn new(source: S, settings: MonitorSettings, events: UnboundedSender<MonitorEvent>) -> Self {
        Self {
            source,
            settings,
            state: MonitorState::default(),
            events,
            emitted: 0,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    /// Runs one poll-and-reconcile cycle. Events are pushed to the channel as
    /// soon as they are inferred, so a failure half way through keeps the
    /// ones already emitted and the state they produced. The liveness marker
    /// is only recorded once a tick completes, so a failed tick is always
    /// retried in full.
    pub async fn tick(&mut self) -> Result<TickOutcome, MonitorError> {
        self.emitted = 0;

        let info = self.source.chain_info().await?;
        if let Some(mark) = info.liveness {
            if self.state.last_liveness_mark == Some(mark) {
                debug!(mark, "no ledger activity since last poll");
                return Ok(TickOutcome::Skipped);
            }
        }

        let pool = self.drain_pending_pool().await?;
        let snapshot = Snapshot::new(info.height, pool);
        debug!(
            height = snapshot.height,
            pending = snapshot.pending.len(),
            "gathered ledger snapshot"
        );

        self.handle_pending(&snapshot);

        if snapshot.height > self.state.last_observed_height {
            self.handle_new_height(&snapshot).await?;
        }

        self.check_drops(&snapshot);
        self.state.last_liveness_mark = info.liveness;

        gauge!("monitor_last_height").set(self.state.last_observed_height as f64);
        gauge!("monitor_pending_tracked").set(self.state.pending.len() as f64);

        Ok(TickOutcome::Reconciled {
            height: snapshot.height,
            events: self.emitted,
        })
    }

    /// Fetches every page of the pending pool before returning; a failed page
    /// fails the whole drain.
    async fn drain_pending_pool(&self) -> Result<Vec<Transaction>, MonitorError> {
        let limit = self.settings.page_size.max(1);
        let mut offset = 0;
        let mut seen = HashSet::new();
        let mut pool = Vec::new();

        loop {
            let page = self.source.pending_page(offset, limit).await?;
            let fetched = page.len();
            for tx in page {
                // pages can overlap while the pool shifts underneath us
                if seen.insert(tx.id.clone()) {
                    pool.push(tx);
                }
            }
            if fetched < limit {
                break;
            }
            offset += limit;
        }

        Ok(pool)
    }

    pub(crate) fn handle_pending(&mut self, snapshot: &Arc<Snapshot>) {
        let mut departed = std::mem::take(&mut self.state.ids_seen_last_poll);
        let mut present = HashSet::with_capacity(snapshot.pending.len());
        let mut fresh = Vec::new();

        for tx in &snapshot.pending {
            let entry = self
                .state
                .pending
                .entry(tx.id.clone())
                .or_insert_with(|| PendingEntry::new(tx.clone()));

            if !entry.delivered {
                entry.delivered = true;
                fresh.push(tx.clone());
            }

            entry.missing_polls = 0;
            departed.remove(&tx.id);
            present.insert(tx.id.clone());
        }

        for tx in fresh {
            self.emit(MonitorEvent::PendingTx {
                tx,
                snapshot: snapshot.clone(),
            });
        }

        // Either confirmed or on its way out; check_drops and the block
        // handler decide which.
        for id in &departed {
            debug!(tx = %id, "transaction left the pending pool");
        }
        if !departed.is_empty() {
            counter!("monitor_pool_departures_total").increment(departed.len() as u64);
        }

        self.state.ids_seen_last_poll = present;
    }

    async fn handle_new_height(&mut self, snapshot: &Arc<Snapshot>) -> Result<(), MonitorError> {
        // Start from the tip on the first observation rather than replaying
        // the whole chain.
        let first = if self.state.last_observed_height == 0 {
            snapshot.height
        } else {
            self.state.last_observed_height + 1
        };

        for height in first..=snapshot.height {
            let blocks = self.fetch_blocks_at(height).await?;
            for block in blocks {
                self.handle_new_block(block, snapshot);
            }
            self.state.last_observed_height = height;
        }

        Ok(())
    }

    /// Fetches every block body listed at `height` before anything about the
    /// height is emitted. Unknown bodies are skipped. A failed fetch aborts
    /// the tick until the same block has failed `MAX_BLOCK_FETCH_ATTEMPTS`
    /// times, after which it is skipped too.
    async fn fetch_blocks_at(&mut self, height: u64) -> Result<Vec<Block>, MonitorError> {
        let block_ids = self.source.block_ids_at_height(height).await?;
        let mut blocks = Vec::with_capacity(block_ids.len());

        for block_id in block_ids {
            match self.source.block_by_id(&block_id).await {
                Ok(Some(block)) => blocks.push(block),
                Ok(None) => {
                    counter!("monitor_missing_blocks_total").increment(1);
                    warn!(height, block = %block_id, "block listed at height but not found, skipping");
                }
                Err(err) => {
                    let attempts = self
                        .state
                        .block_fetch_failures
                        .entry(block_id.clone())
                        .or_insert(0);
                    *attempts += 1;
                    if *attempts < MAX_BLOCK_FETCH_ATTEMPTS {
                        return Err(err.into());
                    }
                    counter!("monitor_missing_blocks_total").increment(1);
                    warn!(
                        height,
                        block = %block_id,
                        attempts = *attempts,
                        %err,
                        "block fetch keeps failing, skipping"
                    );
                }
            }
        }

        self.state.block_fetch_failures.clear();
        Ok(blocks)
    }

    pub(crate) fn handle_new_block(&mut self, block: Block, snapshot: &Arc<Snapshot>) {
        let block = Arc::new(block);
        debug!(
            block = %block.id(),
            txs = block.transactions().len(),
            "new block"
        );

        self.emit(MonitorEvent::NewBlock {
            block: block.clone(),
            snapshot: snapshot.clone(),
        });

        for tx in block.transactions() {
            self.emit(MonitorEvent::ConfirmedTx {
                tx: tx.clone(),
                snapshot: snapshot.clone(),
            });
            // confirmed txs are no longer candidates for delivery or eviction
            self.state.pending.remove(&tx.id);
        }
    }

    /// Counts one missed poll for every tracked tx absent from this tick's
    /// pool and evicts those past the threshold.
    pub(crate) fn check_drops(&mut self, snapshot: &Arc<Snapshot>) {
        let threshold = self.settings.max_missing_polls;
        let present = &self.state.ids_seen_last_poll;
        let mut dropped: Vec<TxId> = Vec::new();

        for (id, entry) in self.state.pending.iter_mut() {
            if present.contains(id) {
                continue;
            }
            entry.missing_polls = entry.missing_polls.saturating_add(1);
            if entry.missing_polls > threshold {
                dropped.push(id.clone());
            }
        }

        for id in dropped {
            if let Some(entry) = self.state.pending.remove(&id) {
                debug!(tx = %id, missing_polls = entry.missing_polls, "transaction dropped from pool");
                self.emit(MonitorEvent::DroppedTx {
                    tx: entry.tx,
                    snapshot: snapshot.clone(),
                });
            }
        }
    }

    fn emit(&mut self, event: MonitorEvent) {
        counter!("monitor_events_total", "kind" => event.kind().as_ref().to_string()).increment(1);
        self.emitted += 1;
        if self.events.send(event).is_err() {
            debug!("event receiver closed, discarding event");
        }
    }

    #[cfg(test)]
    pub(crate) fn state_mut(&mut self) -> &mut MonitorState {
        &mut self.state
    }
}
