use ledgerwatch_domain::model::ChainInfo;
use serde::Deserialize;
use serde_json::Value;

/// Subset of the node's `/info` response the monitor cares about.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    /// `null` until the node has a full block.
    #[serde(default)]
    pub full_height: Option<u64>,
    #[serde(default)]
    pub last_seen_message_time: Option<u64>,
}

impl From<NodeInfo> for ChainInfo {
    fn from(value: NodeInfo) -> Self {
        ChainInfo {
            height: value.full_height.unwrap_or(0),
            liveness: value.last_seen_message_time,
        }
    }
}

/// Explorer list responses carry the total item count next to the page.
#[derive(Debug, Deserialize, Default)]
pub struct ExplorerPage {
    #[serde(default)]
    pub items: Vec<Value>,
    #[serde(default)]
    pub total: u64,
}
