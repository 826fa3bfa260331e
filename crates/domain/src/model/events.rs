use std::fmt;
use std::sync::Arc;

use strum_macros::{AsRefStr, Display};

use super::{Block, Snapshot, Transaction};

/// Ledger lifecycle events raised by the monitor. Every event carries the
/// snapshot of the tick that produced it.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    PendingTx {
        tx: Transaction,
        snapshot: Arc<Snapshot>,
    },
    ConfirmedTx {
        tx: Transaction,
        snapshot: Arc<Snapshot>,
    },
    DroppedTx {
        tx: Transaction,
        snapshot: Arc<Snapshot>,
    },
    NewBlock {
        block: Arc<Block>,
        snapshot: Arc<Snapshot>,
    },
}

impl MonitorEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            MonitorEvent::PendingTx { .. } => EventKind::PendingTx,
            MonitorEvent::ConfirmedTx { .. } => EventKind::ConfirmedTx,
            MonitorEvent::DroppedTx { .. } => EventKind::DroppedTx,
            MonitorEvent::NewBlock { .. } => EventKind::NewBlock,
        }
    }

    pub fn snapshot(&self) -> &Arc<Snapshot> {
        match self {
            MonitorEvent::PendingTx { snapshot, .. }
            | MonitorEvent::ConfirmedTx { snapshot, .. }
            | MonitorEvent::DroppedTx { snapshot, .. }
            | MonitorEvent::NewBlock { snapshot, .. } => snapshot,
        }
    }

    /// Id of the transaction or block the event is about.
    pub fn subject_id(&self) -> &str {
        match self {
            MonitorEvent::PendingTx { tx, .. }
            | MonitorEvent::ConfirmedTx { tx, .. }
            | MonitorEvent::DroppedTx { tx, .. } => tx.id.as_str(),
            MonitorEvent::NewBlock { block, .. } => block.id().as_str(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    PendingTx,
    ConfirmedTx,
    DroppedTx,
    NewBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorSubject {
    Plugin,
    Component,
}

/// Raised whenever a plugin or component ends up errored. Consumers only log
/// or report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub subject: ErrorSubject,
    pub identity: String,
    pub cause: String,
}

impl ErrorNotice {
    pub fn plugin(identity: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            subject: ErrorSubject::Plugin,
            identity: identity.into(),
            cause: cause.to_string(),
        }
    }

    pub fn component(identity: impl Into<String>, cause: impl fmt::Display) -> Self {
        Self {
            subject: ErrorSubject::Component,
            identity: identity.into(),
            cause: cause.to_string(),
        }
    }
}
