use alloy::eips::BlockNumberOrTag;
use alloy::primitives::{Address, Bytes, B256, U256, U64};
use alloy::providers::{Provider, ProviderBuilder, RootProvider};
use alloy::rpc::client::ClientBuilder;
use alloy::rpc::types::{Filter, TransactionRequest};
use alloy::transports::http::{Client, Http};
use alloy::transports::{RpcError, TransportError, TransportErrorKind};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::events::{EventWatcher, WatchSettings};
use super::transaction::{TxManager, TxSettings};
use super::{BlockInfo, LogEntry, Receipt, TransactionInfo};
use crate::config::{Config, RpcConfig};
use crate::error::{ClientError, Result};

/// Sends one JSON-RPC request and returns its `result`.
///
/// Implementations report an unreachable node as [`ClientError::Connection`];
/// that is the only failure the retry policy acts on.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value>;
}

/// JSON-RPC over HTTP through alloy's `RootProvider`.
pub struct HttpTransport {
    provider: RootProvider<Http<Client>>,
    url: String,
}

impl HttpTransport {
    pub fn new(url: &str, request_timeout: Duration) -> Result<Self> {
        let rpc_url = url
            .parse()
            .map_err(|e| ClientError::Http(format!("Invalid RPC url '{}': {}", url, e)))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(request_timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;

        let transport = Http::with_client(client, rpc_url);
        let is_local = transport.guess_local();
        let provider =
            ProviderBuilder::new().on_client(ClientBuilder::default().transport(transport, is_local));

        Ok(Self {
            provider,
            url: url.to_string(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, error: TransportError) -> ClientError {
        match error {
            RpcError::ErrorResp(payload) => ClientError::Rpc {
                code: payload.code,
                message: payload.message.to_string(),
            },
            RpcError::Transport(TransportErrorKind::Custom(inner))
                if inner
                    .downcast_ref::<reqwest::Error>()
                    .is_some_and(reqwest::Error::is_connect) =>
            {
                ClientError::Connection(format!("{}: {}", self.url, inner))
            }
            other => ClientError::Http(other.to_string()),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let result = self
            .provider
            .raw_request::<Value, Value>(Cow::Owned(method.to_string()), params)
            .await;
        match result {
            Ok(value) => Ok(value),
            // A null result is meaningful (e.g. a receipt that is not mined yet).
            Err(RpcError::NullResp) => Ok(Value::Null),
            Err(e) => Err(self.classify(e)),
        }
    }
}

/// How often a request is repeated after a connection failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 1,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }
}

/// Typed `eth_*` calls over a shared transport.
///
/// Cloning is cheap and every clone talks through the same transport.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl fmt::Debug for RpcClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcClient")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RpcClient {
    pub fn new(transport: Arc<dyn Transport>, retry: RetryPolicy) -> Self {
        Self { transport, retry }
    }

    pub fn http(url: &str, request_timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let transport = HttpTransport::new(url, request_timeout)?;
        Ok(Self::new(Arc::new(transport), retry))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Raw request with the retry policy applied.
    pub async fn request_value(&self, method: &str, params: Value) -> Result<Value> {
        let mut attempt = 0;
        loop {
            match self.transport.request(method, params.clone()).await {
                Err(e) if e.is_connection() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        method, e, attempt, self.retry.max_retries, self.retry.delay
                    );
                    tokio::time::sleep(self.retry.delay).await;
                }
                other => return other,
            }
        }
    }

    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let value = self.request_value(method, params).await?;
        serde_json::from_value(value).map_err(|e| {
            ClientError::Serialization(format!("Unexpected {} response: {}", method, e))
        })
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let id: U64 = self.request("eth_chainId", json!([])).await?;
        Ok(id.to())
    }

    pub async fn block_number(&self) -> Result<u64> {
        let number: U64 = self.request("eth_blockNumber", json!([])).await?;
        Ok(number.to())
    }

    pub async fn gas_price(&self) -> Result<u128> {
        let price: U256 = self.request("eth_gasPrice", json!([])).await?;
        Ok(price.saturating_to())
    }

    pub async fn get_balance(&self, address: Address, block: BlockNumberOrTag) -> Result<U256> {
        self.request("eth_getBalance", json!([address, block])).await
    }

    pub async fn get_transaction_count(
        &self,
        address: Address,
        block: BlockNumberOrTag,
    ) -> Result<u64> {
        let count: U64 = self
            .request("eth_getTransactionCount", json!([address, block]))
            .await?;
        Ok(count.to())
    }

    pub async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64> {
        let gas: U64 = self.request("eth_estimateGas", json!([tx])).await?;
        Ok(gas.to())
    }

    /// Simulated call against the latest block.
    pub async fn call(&self, tx: &TransactionRequest) -> Result<Bytes> {
        self.request("eth_call", json!([tx, BlockNumberOrTag::Latest]))
            .await
    }

    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<B256> {
        let encoded = format!("0x{}", hex::encode(raw));
        self.request("eth_sendRawTransaction", json!([encoded])).await
    }

    pub async fn get_transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.request("eth_getTransactionReceipt", json!([hash]))
            .await
    }

    pub async fn get_transaction(&self, hash: B256) -> Result<Option<TransactionInfo>> {
        self.request("eth_getTransactionByHash", json!([hash]))
            .await
    }

    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<LogEntry>> {
        self.request("eth_getLogs", json!([filter])).await
    }

    pub async fn get_block(&self, block: BlockNumberOrTag) -> Result<Option<BlockInfo>> {
        let block: Option<BlockInfo> = self
            .request("eth_getBlockByNumber", json!([block, false]))
            .await?;
        log_block(block.as_ref());
        Ok(block)
    }

    pub async fn get_block_by_hash(&self, hash: B256) -> Result<Option<BlockInfo>> {
        let block: Option<BlockInfo> = self
            .request("eth_getBlockByHash", json!([hash, false]))
            .await?;
        log_block(block.as_ref());
        Ok(block)
    }
}

fn log_block(block: Option<&BlockInfo>) {
    if let Some(info) = block {
        debug!(
            "Block number={:?} hash={:?} gasUsed={} gasLimit={} txs={}",
            info.number,
            info.hash,
            info.gas_used,
            info.gas_limit,
            info.transactions.len()
        );
    }
}

/// A chain endpoint plus the transaction and watch settings used against it.
///
/// Contract wrappers hold a clone; the underlying transport is shared.
#[derive(Debug, Clone)]
pub struct Network {
    rpc: RpcClient,
    tx_settings: TxSettings,
    watch_settings: WatchSettings,
}

impl Network {
    pub fn new(rpc: RpcClient) -> Self {
        Self {
            rpc,
            tx_settings: TxSettings::default(),
            watch_settings: WatchSettings::default(),
        }
    }

    pub fn from_config(url: &str, config: &RpcConfig, watch: WatchSettings) -> Result<Self> {
        let rpc = RpcClient::http(url, config.request_timeout(), config.retry_policy())?;
        Ok(Self::new(rpc)
            .with_tx_settings(config.tx_settings())
            .with_watch_settings(watch))
    }

    pub fn with_tx_settings(mut self, settings: TxSettings) -> Self {
        self.tx_settings = settings;
        self
    }

    pub fn with_watch_settings(mut self, settings: WatchSettings) -> Self {
        self.watch_settings = settings;
        self
    }

    pub fn rpc(&self) -> &RpcClient {
        &self.rpc
    }

    pub fn tx_manager(&self) -> TxManager {
        TxManager::new(self.rpc.clone(), self.tx_settings.clone())
    }

    pub fn watcher(&self) -> EventWatcher {
        EventWatcher::new(self.rpc.clone(), self.watch_settings.clone())
    }
}

/// Home and foreign side of one configured bridge.
#[derive(Debug)]
pub struct ProviderManager {
    networks: HashMap<String, Network>,
    token: String,
}

impl ProviderManager {
    pub const HOME: &'static str = "home";
    pub const FOREIGN: &'static str = "foreign";

    pub fn new(config: &Config, token: &str) -> anyhow::Result<Self> {
        let bridge = config.bridge(token)?;
        let watch = config.watch.settings();

        let mut networks = HashMap::new();
        networks.insert(
            Self::HOME.to_string(),
            Network::from_config(&bridge.home_rpc, &config.rpc, watch.clone())?,
        );
        networks.insert(
            Self::FOREIGN.to_string(),
            Network::from_config(&bridge.foreign_rpc, &config.rpc, watch)?,
        );

        Ok(Self {
            networks,
            token: token.to_string(),
        })
    }

    pub fn get_network(&self, name: &str) -> anyhow::Result<&Network> {
        self.networks.get(name).ok_or_else(|| {
            anyhow::anyhow!(
                "Network '{}' not configured for bridge '{}'. Available networks: {}",
                name,
                self.token,
                self.get_available_networks().join(", ")
            )
        })
    }

    pub fn get_available_networks(&self) -> Vec<String> {
        let mut names: Vec<String> = self.networks.keys().cloned().collect();
        names.sort();
        names
    }

    pub async fn check_connection(&self, name: &str) -> anyhow::Result<bool> {
        let network = self.get_network(name)?;
        match network.rpc().block_number().await {
            Ok(_) => Ok(true),
            Err(e) => {
                debug!("Connection check failed for network {}: {}", name, e);
                Ok(false)
            }
        }
    }
}
