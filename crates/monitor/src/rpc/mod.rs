use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;

use ledgerwatch_domain::model::{Block, BlockId, ChainInfo, Transaction, TxId};
use ledgerwatch_domain::source::{LedgerFacade, SnapshotSource, SourceError, SourceResult};

mod types;

pub use types::{ExplorerPage, NodeInfo};

pub const USER_AGENT: &str = concat!("ledgerwatch/", env!("CARGO_PKG_VERSION"));

fn http_client(timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response, endpoint: &str) -> SourceResult<T> {
    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        });
    }
    response
        .json()
        .await
        .map_err(|err| SourceError::Decode(err.to_string()))
}

/// REST client for a full node: chain info, pending pool, blocks and
/// transaction submission.
#[derive(Clone)]
pub struct NodeClient {
    http: Client,
    base_url: String,
}

impl NodeClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> SourceResult<T> {
        let url = join_url(&self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(SourceError::from_source)?;
        decode(response, path).await
    }

    pub async fn submit_transaction(&self, tx: &Transaction) -> SourceResult<TxId> {
        let url = join_url(&self.base_url, "/transactions");
        let response = self
            .http
            .post(&url)
            .json(tx)
            .send()
            .await
            .map_err(SourceError::from_source)?;
        decode(response, "/transactions").await
    }
}

#[async_trait]
impl SnapshotSource for NodeClient {
    async fn chain_info(&self) -> SourceResult<ChainInfo> {
        let info: NodeInfo = self.get("/info", &[]).await?;
        Ok(info.into())
    }

    async fn pending_page(&self, offset: usize, limit: usize) -> SourceResult<Vec<Transaction>> {
        self.get(
            "/transactions/unconfirmed",
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn block_ids_at_height(&self, height: u64) -> SourceResult<Vec<BlockId>> {
        self.get(&format!("/blocks/at/{height}"), &[]).await
    }

    async fn block_by_id(&self, id: &BlockId) -> SourceResult<Option<Block>> {
        let path = format!("/blocks/{id}");
        let response = self
            .http
            .get(join_url(&self.base_url, &path))
            .send()
            .await
            .map_err(SourceError::from_source)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response, &path).await.map(Some)
    }
}

/// REST client for the explorer's `/api/v1` surface.
#[derive(Clone)]
pub struct ExplorerClient {
    http: Client,
    base_url: String,
    page_size: usize,
}

impl ExplorerClient {
    pub const DEFAULT_PAGE_SIZE: usize = 100;

    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: http_client(timeout)?,
            base_url: join_url(endpoint, "/api/v1"),
            page_size: Self::DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    async fn boxes_page(&self, token_id: &str, offset: usize) -> SourceResult<ExplorerPage> {
        let path = format!("/boxes/byTokenId/{token_id}");
        let response = self
            .http
            .get(join_url(&self.base_url, &path))
            .query(&[("offset", offset), ("limit", self.page_size)])
            .send()
            .await
            .map_err(SourceError::from_source)?;
        decode(response, &path).await
    }

    /// Collects every box holding `token_id`, following the explorer's
    /// offset pagination until the advertised total has been fetched.
    pub async fn boxes_by_token_id(&self, token_id: &str) -> SourceResult<Vec<Value>> {
        let mut boxes = Vec::new();
        let mut offset = 0;
        let mut expected = None;

        loop {
            let page = self.boxes_page(token_id, offset).await?;
            let total = *expected.get_or_insert(page.total);
            let fetched = page.items.len();
            boxes.extend(page.items);
            offset += self.page_size;

            if fetched == 0 || boxes.len() as u64 >= total {
                break;
            }
        }

        Ok(boxes)
    }
}

/// Plugin-facing ledger access: submissions go to the node, token lookups to
/// the explorer.
#[derive(Clone)]
pub struct LedgerProvider {
    node: NodeClient,
    explorer: ExplorerClient,
}

impl LedgerProvider {
    pub fn new(node: NodeClient, explorer: ExplorerClient) -> Self {
        Self { node, explorer }
    }
}

#[async_trait]
impl LedgerFacade for LedgerProvider {
    async fn submit_transaction(&self, tx: &Transaction) -> SourceResult<TxId> {
        self.node.submit_transaction(tx).await
    }

    async fn boxes_by_token_id(&self, token_id: &str) -> SourceResult<Vec<Value>> {
        self.explorer.boxes_by_token_id(token_id).await
    }
}
