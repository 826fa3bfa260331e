//! Ledger data structures shared by the monitor, the plugin router and the
//! REST clients.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

mod events;

pub use events::{ErrorNotice, ErrorSubject, EventKind, MonitorEvent};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxId(String);

impl TxId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TxId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for BlockId {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed transaction as reported by the node. Everything except the id is
/// kept as an opaque JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Transaction {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: TxId::new(id),
            payload: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub id: BlockId,
    #[serde(default)]
    pub height: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BlockTransactions {
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub header: BlockHeader,
    #[serde(default)]
    pub block_transactions: BlockTransactions,
}

impl Block {
    pub fn new(id: impl Into<String>, height: u64, transactions: Vec<Transaction>) -> Self {
        Self {
            header: BlockHeader {
                id: BlockId::new(id),
                height,
            },
            block_transactions: BlockTransactions { transactions },
        }
    }

    pub fn id(&self) -> &BlockId {
        &self.header.id
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.block_transactions.transactions
    }
}

/// Cheap chain status used to decide whether a full poll is worth doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInfo {
    pub height: u64,
    /// Opaque activity marker (the node's last peer message time). `None`
    /// means the source cannot tell, so the poll is never skipped.
    pub liveness: Option<u64>,
}

/// Immutable view of the ledger captured once per tick and shared by every
/// event raised during that tick.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub height: u64,
    pub pending: Vec<Transaction>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(height: u64, pending: Vec<Transaction>) -> Arc<Self> {
        Arc::new(Self {
            height,
            pending,
            captured_at: Utc::now(),
        })
    }

    pub fn contains(&self, id: &TxId) -> bool {
        self.pending.iter().any(|tx| &tx.id == id)
    }
}
