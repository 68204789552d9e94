use alloy::eips::eip2718::Encodable2718;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::provider::RpcClient;
use super::{utils, Receipt};
use crate::error::{ClientError, Result};

/// How long to wait for the receipt of a block's transaction when re-summing gas.
const BLOCK_RECEIPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Knobs for building and confirming transactions.
#[derive(Debug, Clone)]
pub struct TxSettings {
    pub poll_interval: Duration,
    pub confirm_timeout: Duration,
    /// Used when the node reports a gas price of zero.
    pub default_gas_price: u128,
    /// Gas limit for plain value transfers.
    pub default_gas_limit: u64,
}

impl Default for TxSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            confirm_timeout: Duration::from_secs(60),
            default_gas_price: 9_000_000_000, // 9 Gwei
            default_gas_limit: 22_000,
        }
    }
}

/// Signing identity for one account.
///
/// Neither `Clone` nor `Copy`. Every nonce-consuming operation
/// takes `&mut Account`, so the transaction stream of one handle can only be
/// driven from one place at a time.
///
/// The guarantee is per handle, not per key: calling
/// [`from_private_key`](Self::from_private_key) twice with the same key gives
/// two independent handles whose nonces will collide. Build one handle per
/// key and pass it around.
pub struct Account {
    signer: PrivateKeySigner,
}

impl Account {
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let private_key = private_key.trim();
        let private_key = private_key.strip_prefix("0x").unwrap_or(private_key);

        let signer = PrivateKeySigner::from_str(private_key)
            .map_err(|e| ClientError::InvalidKey(e.to_string()))?;
        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    fn wallet(&self) -> EthereumWallet {
        EthereumWallet::from(self.signer.clone())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// A tally that did not add up after a run of transactions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TallyMismatch {
    #[error("balance of {account}: expected {expected}, node reports {actual}")]
    Balance {
        account: Address,
        expected: U256,
        actual: U256,
    },
    #[error("block {block}: gasUsed is {reported} but its receipts sum to {summed}")]
    BlockGas {
        block: B256,
        reported: u64,
        summed: u64,
    },
    #[error("block {block}: gasUsed is {reported}, tracked {tracked} + untracked {untracked}")]
    TrackedGas {
        block: B256,
        reported: u64,
        tracked: u64,
        untracked: u64,
    },
}

/// What a transaction should do, before gas and nonce are filled in.
#[derive(Debug, Clone, Default)]
pub struct TxCall {
    pub to: Address,
    pub value: U256,
    pub data: Bytes,
}

impl TxCall {
    pub fn contract_call(to: Address, data: impl Into<Bytes>) -> Self {
        Self {
            to,
            value: U256::ZERO,
            data: data.into(),
        }
    }

    pub fn value_transfer(to: Address, value: U256) -> Self {
        Self {
            to,
            value,
            data: Bytes::new(),
        }
    }
}

/// Builds, signs, submits and confirms transactions on one chain.
#[derive(Debug, Clone)]
pub struct TxManager {
    rpc: RpcClient,
    settings: TxSettings,
    chain_id: Arc<OnceCell<u64>>,
}

impl TxManager {
    pub fn new(rpc: RpcClient, settings: TxSettings) -> Self {
        Self {
            rpc,
            settings,
            chain_id: Arc::new(OnceCell::new()),
        }
    }

    pub fn settings(&self) -> &TxSettings {
        &self.settings
    }

    /// Confirmed transaction count of `account`, i.e. the nonce its next
    /// transaction must use. Only valid while nothing else from the account
    /// is in flight.
    pub async fn next_nonce(&self, account: Address) -> Result<u64> {
        let nonce = self
            .rpc
            .get_transaction_count(account, BlockNumberOrTag::Latest)
            .await?;
        debug!(
            "For account: {}, next transaction's nonce should be: {}",
            account, nonce
        );
        Ok(nonce)
    }

    /// Same as [`next_nonce`](Self::next_nonce) but counts pool transactions too.
    pub async fn next_nonce_pending(&self, account: Address) -> Result<u64> {
        self.rpc
            .get_transaction_count(account, BlockNumberOrTag::Pending)
            .await
    }

    async fn chain_id(&self) -> Result<u64> {
        self.chain_id
            .get_or_try_init(|| self.rpc.chain_id())
            .await
            .copied()
    }

    async fn gas_price(&self) -> Result<u128> {
        // Dev chains may report zero.
        let price = self.rpc.gas_price().await?;
        Ok(if price == 0 {
            self.settings.default_gas_price
        } else {
            price
        })
    }

    /// Fills in gas price and gas limit. The nonce is assigned by the caller.
    pub async fn prepare(&self, from: Address, call: &TxCall) -> Result<TransactionRequest> {
        let mut tx = TransactionRequest::default()
            .with_from(from)
            .with_to(call.to)
            .with_value(call.value)
            .with_gas_price(self.gas_price().await?);
        tx.input = TransactionInput::both(call.data.clone());

        let gas = if call.data.is_empty() {
            self.settings.default_gas_limit
        } else {
            self.rpc
                .estimate_gas(&tx)
                .await
                .map_err(submission_error)?
        };
        debug!("Prepared transaction {:?} with gas {}", tx, gas);

        Ok(tx.with_gas_limit(gas))
    }

    async fn sign(&self, account: &Account, tx: TransactionRequest) -> Result<Bytes> {
        let chain_id = self.chain_id().await?;
        let envelope = tx
            .with_chain_id(chain_id)
            .build(&account.wallet())
            .await
            .map_err(|e| ClientError::Submission(format!("signing failed: {}", e)))?;
        Ok(envelope.encoded_2718().into())
    }

    async fn submit(&self, account: &Account, tx: TransactionRequest) -> Result<B256> {
        let raw = self.sign(account, tx).await?;
        let hash = self
            .rpc
            .send_raw_transaction(&raw)
            .await
            .map_err(submission_error)?;
        info!("TX hash: {}", hash);
        Ok(hash)
    }

    /// Polls until the receipt carries a block number or `timeout` runs out.
    pub async fn wait_for_receipt(&self, hash: B256, timeout: Duration) -> Result<Receipt> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(receipt) = self.rpc.get_transaction_receipt(hash).await? {
                if receipt.block_number.is_some() {
                    return Ok(receipt);
                }
                debug!("Receipt for {} is not final yet", hash);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(ClientError::ConfirmationTimeout {
                    tx_hash: hash.to_string(),
                    waited_secs: timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
        }
    }

    /// Sign, submit and wait for one transaction.
    pub async fn execute(
        &self,
        account: &mut Account,
        call: &TxCall,
        timeout: Option<Duration>,
    ) -> Result<Receipt> {
        let from = account.address();
        let tx = self.prepare(from, call).await?;
        let nonce = self.next_nonce(from).await?;

        let hash = self.submit(account, tx.with_nonce(nonce)).await?;
        let receipt = self
            .wait_for_receipt(hash, timeout.unwrap_or(self.settings.confirm_timeout))
            .await?;
        log_receipt(&receipt);
        Ok(receipt)
    }

    /// Submits every call without waiting, on a contiguous nonce block taken
    /// from a single nonce query, then waits for all of them.
    ///
    /// Receipts come back in submission order.
    pub async fn execute_batch(
        &self,
        account: &mut Account,
        calls: &[TxCall],
    ) -> Result<Vec<Receipt>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let from = account.address();
        let first_nonce = self.next_nonce(from).await?;

        let mut transactions = Vec::with_capacity(calls.len());
        for (offset, call) in (0u64..).zip(calls) {
            let tx = self.prepare(from, call).await?;
            transactions.push(tx.with_nonce(first_nonce + offset));
        }
        info!(
            "Built {} transactions. First txn nonce:{} Last txn nonce:{}",
            transactions.len(),
            first_nonce,
            first_nonce + transactions.len() as u64 - 1
        );

        let mut hashes = Vec::with_capacity(transactions.len());
        for tx in transactions {
            hashes.push(self.submit(account, tx).await?);
        }

        let mut receipts = Vec::with_capacity(hashes.len());
        for hash in hashes {
            let receipt = self
                .wait_for_receipt(hash, self.settings.confirm_timeout)
                .await?;
            log_receipt(&receipt);
            receipts.push(receipt);
        }
        Ok(receipts)
    }

    /// Plain value transfer from `account` to `to`.
    pub async fn send_value(
        &self,
        account: &mut Account,
        to: Address,
        value: U256,
    ) -> Result<Receipt> {
        self.execute(account, &TxCall::value_transfer(to, value), None)
            .await
    }

    /// One value transfer per `(recipient, value)` on contiguous nonces.
    pub async fn send_value_batch(
        &self,
        account: &mut Account,
        transfers: &[(Address, U256)],
    ) -> Result<Vec<Receipt>> {
        let calls: Vec<TxCall> = transfers
            .iter()
            .map(|(to, value)| TxCall::value_transfer(*to, *value))
            .collect();
        self.execute_batch(account, &calls).await
    }

    /// Fee paid by a mined transaction in wei.
    pub fn transaction_cost(&self, receipt: &Receipt, gas_price: u128) -> U256 {
        let gas_price = if gas_price == 0 {
            self.settings.default_gas_price
        } else {
            gas_price
        };
        U256::from(receipt.gas_used.to::<u64>()) * U256::from(gas_price)
    }

    /// Replays value transfers from `source` to `destination` over their
    /// starting balances and compares the result with the node's balances.
    ///
    /// Each receipt costs the source its value plus `gasUsed * gasPrice`, with
    /// value and gas price read back through `eth_getTransactionByHash`.
    pub async fn verify_stats(
        &self,
        receipts: &[Receipt],
        source: (Address, U256),
        destination: (Address, U256),
    ) -> Result<Vec<TallyMismatch>> {
        let (source, mut source_balance) = source;
        let (destination, mut destination_balance) = destination;

        for (count, receipt) in (1u64..).zip(receipts) {
            let hash = receipt.transaction_hash;
            let tx = self.rpc.get_transaction(hash).await?.ok_or_else(|| {
                ClientError::Decode(format!("transaction {} is unknown to the node", hash))
            })?;
            let gas_price = tx.gas_price.map_or(0, |p| p.saturating_to::<u128>());
            let cost = self.transaction_cost(receipt, gas_price);

            source_balance = source_balance.saturating_sub(cost.saturating_add(tx.value));
            destination_balance = destination_balance.saturating_add(tx.value);
            debug!(
                "Tx:{} ({}) block:{:?}, src balance: {}, dest balance: {}",
                count,
                hash,
                receipt.block(),
                source_balance,
                destination_balance
            );
        }

        let mut mismatches = Vec::new();
        for (account, expected) in [
            (destination, destination_balance),
            (source, source_balance),
        ] {
            let actual = self
                .rpc
                .get_balance(account, BlockNumberOrTag::Latest)
                .await?;
            if actual != expected {
                let mismatch = TallyMismatch::Balance {
                    account,
                    expected,
                    actual,
                };
                warn!("{}", mismatch);
                mismatches.push(mismatch);
            }
        }
        Ok(mismatches)
    }

    /// Checks every block touched by `receipts`: its `gasUsed` must equal the
    /// sum over all of its transactions, and equal the gas of the tracked
    /// receipts plus whatever other transactions landed in it.
    pub async fn verify_block_gas_used(&self, receipts: &[Receipt]) -> Result<Vec<TallyMismatch>> {
        let mut tracked_by_block: BTreeMap<B256, u64> = BTreeMap::new();
        for receipt in receipts {
            match receipt.block_hash {
                Some(block) => {
                    *tracked_by_block.entry(block).or_default() += receipt.gas_used.to::<u64>()
                }
                None => debug!("Receipt {} has no block hash", receipt.transaction_hash),
            }
        }
        let tracked_hashes: HashSet<B256> =
            receipts.iter().map(|r| r.transaction_hash).collect();

        let mut mismatches = Vec::new();
        for (block_hash, tracked) in tracked_by_block {
            let block = self
                .rpc
                .get_block_by_hash(block_hash)
                .await?
                .ok_or_else(|| {
                    ClientError::Decode(format!("block {} is unknown to the node", block_hash))
                })?;
            let reported = block.gas_used.to::<u64>();

            let mut summed = 0u64;
            let mut untracked = 0u64;
            for tx_hash in &block.transactions {
                let receipt = self
                    .wait_for_receipt(*tx_hash, BLOCK_RECEIPT_TIMEOUT)
                    .await?;
                let gas = receipt.gas_used.to::<u64>();
                summed += gas;
                if !tracked_hashes.contains(tx_hash) {
                    untracked += gas;
                }
            }

            if reported != summed {
                mismatches.push(TallyMismatch::BlockGas {
                    block: block_hash,
                    reported,
                    summed,
                });
            }
            if reported != tracked + untracked {
                mismatches.push(TallyMismatch::TrackedGas {
                    block: block_hash,
                    reported,
                    tracked,
                    untracked,
                });
            }
            info!(
                "Gas used in block {}, tracked transactions {}, untracked {}",
                block_hash, tracked, untracked
            );
            info!("Gas used in block {} = {}", block_hash, reported);
        }
        Ok(mismatches)
    }
}

fn submission_error(e: ClientError) -> ClientError {
    match e {
        ClientError::Rpc { message, .. } => {
            ClientError::Submission(utils::interpret_rpc_error(&message))
        }
        other => other,
    }
}

fn log_receipt(receipt: &Receipt) {
    info!(
        "Transaction {} executed. blockHash={:?} blockNumber={:?} cumulativeGasUsed={}",
        receipt.transaction_hash,
        receipt.block_hash,
        receipt.block(),
        receipt.cumulative_gas_used
    );
    if let Some(address) = receipt.contract_address {
        info!("Contract address={}", utils::checksum(&address));
    }
}
