//! Ledger monitor: polls a node, reconciles successive snapshots and emits
//! pending/confirmed/dropped/new-block events on a channel.

pub mod pipeline;
pub mod rpc;
pub mod state;
pub mod worker;


pub use pipeline::{LedgerMonitor, TickOutcome, MAX_BLOCK_FETCH_ATTEMPTS};
pub use rpc::{ExplorerClient, LedgerProvider, NodeClient};
pub use state::{MonitorState, PendingEntry};
pub use worker::{build_node_source, run_monitor, MonitorError};
