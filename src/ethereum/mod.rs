pub mod abi;
pub mod catalog;
pub mod contract;
pub mod events;
pub mod provider;
pub mod transaction;
pub mod utils;

#[cfg(test)]
pub(crate) mod mock;

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, Bytes, B256, U256, U64};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A raw log entry as returned by `eth_getLogs` or embedded in a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<U64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_index: Option<U64>,
}

/// Chain-confirmed outcome of a transaction.
///
/// The only field the client ever writes is `events`, which carries the logs
/// decoded against the signatures declared for the method that produced it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_index: Option<U64>,
    #[serde(default)]
    pub from: Option<Address>,
    #[serde(default)]
    pub to: Option<Address>,
    #[serde(default)]
    pub gas_used: U64,
    #[serde(default)]
    pub cumulative_gas_used: U64,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<LogEntry>,
    #[serde(default, skip_deserializing, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<DecodedEvent>,
}

impl Receipt {
    /// Block the transaction was mined in, if the node reports one yet.
    pub fn block(&self) -> Option<u64> {
        self.block_number.map(|n| n.to::<u64>())
    }

    /// Pre-byzantium nodes report no status; those receipts count as success.
    pub fn succeeded(&self) -> bool {
        self.status.map_or(true, |s| !s.is_zero())
    }
}

/// Subset of `eth_getTransactionByHash` the client reads back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionInfo {
    pub hash: B256,
    pub nonce: U64,
    pub from: Address,
    #[serde(default)]
    pub to: Option<Address>,
    pub value: U256,
    #[serde(default)]
    pub gas_price: Option<U256>,
    pub gas: U64,
    pub input: Bytes,
    #[serde(default)]
    pub block_number: Option<U64>,
}

/// Header fields of `eth_getBlockByNumber` (transaction hashes only).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockInfo {
    #[serde(default)]
    pub number: Option<U64>,
    #[serde(default)]
    pub hash: Option<B256>,
    pub parent_hash: B256,
    pub timestamp: U64,
    pub gas_used: U64,
    pub gas_limit: U64,
    #[serde(default)]
    pub transactions: Vec<B256>,
}

/// A log reconstructed against an event signature: every declared parameter
/// in declaration order, indexed ones interleaved with data ones.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub name: String,
    pub values: Vec<DynSolValue>,
}

impl fmt::Display for DecodedEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.values.iter().map(abi::render_value).collect();
        write!(f, "{}({})", self.name, rendered.join(", "))
    }
}

impl Serialize for DecodedEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
