use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::model::{Block, BlockId, ChainInfo, Transaction, TxId};

/// Common result alias for ledger source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Failures talking to the node or explorer. All of them are transient from
/// the monitor's point of view.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(String),
    #[error("unexpected status {status} from {endpoint}")]
    Status { endpoint: String, status: u16 },
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SourceError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Http(err.to_string())
    }
}

/// Read side of the ledger used by the monitor.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Current height plus the liveness marker.
    async fn chain_info(&self) -> SourceResult<ChainInfo>;

    /// One page of the pending pool. A page shorter than `limit` is the last
    /// one.
    async fn pending_page(&self, offset: usize, limit: usize) -> SourceResult<Vec<Transaction>>;

    async fn block_ids_at_height(&self, height: u64) -> SourceResult<Vec<BlockId>>;

    /// `Ok(None)` when the source does not know the block.
    async fn block_by_id(&self, id: &BlockId) -> SourceResult<Option<Block>>;
}

/// Restricted ledger access handed to plugins. Plugins receive chain state
/// through snapshots and only get the calls they cannot get from there.
#[async_trait]
pub trait LedgerFacade: Send + Sync {
    async fn submit_transaction(&self, tx: &Transaction) -> SourceResult<TxId>;

    async fn boxes_by_token_id(&self, token_id: &str) -> SourceResult<Vec<Value>>;
}
