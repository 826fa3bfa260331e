use std::collections::{BTreeMap, HashMap, HashSet};

use ledgerwatch_domain::model::{BlockId, Transaction, TxId};

/// One tracked pending-pool transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingEntry {
    pub tx: Transaction,
    /// Whether the pending event for this episode has been emitted.
    pub delivered: bool,
    /// Consecutive ticks in which the tx was absent from the pool while still
    /// unconfirmed.
    pub missing_polls: u32,
}

impl PendingEntry {
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            delivered: false,
            missing_polls: 0,
        }
    }
}

/// Working set of the monitor. Only mutated from inside a single tick.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MonitorState {
    pub last_observed_height: u64,
    pub pending: BTreeMap<TxId, PendingEntry>,
    pub ids_seen_last_poll: HashSet<TxId>,
    /// Recorded after a tick completes.
    pub last_liveness_mark: Option<u64>,
    /// Failed body fetches per block at the height being caught up.
    pub block_fetch_failures: HashMap<BlockId, u32>,
}

impl MonitorState {
    pub fn entry(&self, id: &TxId) -> Option<&PendingEntry> {
        self.pending.get(id)
    }

    pub fn is_tracking(&self, id: &TxId) -> bool {
        self.pending.contains_key(id)
    }
}
