use alloy::dyn_abi::DynSolValue;
use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, U256};
use alloy::rpc::types::{TransactionInput, TransactionRequest};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::abi::{self, MethodSignature};
use super::events::WatchedEvent;
use super::provider::Network;
use super::transaction::{Account, TxCall};
use super::{utils, Receipt};
use crate::error::{ClientError, Result};

/// Static description of one contract method, as written in a catalog.
#[derive(Debug, Clone, Copy)]
pub struct MethodDecl {
    pub name: &'static str,
    pub signature: &'static str,
    /// The last positional argument is raw bytes appended after the encoded
    /// call instead of an ABI parameter.
    pub payload: bool,
    /// Events decoded from the receipt of a state-changing call.
    pub events: &'static [&'static str],
}

impl MethodDecl {
    pub const fn new(name: &'static str, signature: &'static str) -> Self {
        Self {
            name,
            signature,
            payload: false,
            events: &[],
        }
    }

    pub const fn with_payload(self) -> Self {
        Self {
            payload: true,
            ..self
        }
    }

    pub const fn with_events(self, events: &'static [&'static str]) -> Self {
        Self { events, ..self }
    }
}

/// A parsed method declaration.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    signature: MethodSignature,
    payload: bool,
    events: Vec<MethodSignature>,
}

impl MethodEntry {
    fn from_decl(decl: &MethodDecl) -> Result<Self> {
        let events = decl
            .events
            .iter()
            .map(|event| MethodSignature::parse(event))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            signature: MethodSignature::parse(decl.signature)?,
            payload: decl.payload,
            events,
        })
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }

    pub fn events(&self) -> &[MethodSignature] {
        &self.events
    }
}

/// Method name to parsed declaration. Later declarations replace earlier ones
/// with the same name, which is how derived catalogs override their base.
#[derive(Debug, Clone, Default)]
pub struct MethodTable {
    entries: HashMap<String, MethodEntry>,
}

impl MethodTable {
    pub fn from_decls(decls: &[MethodDecl]) -> Result<Self> {
        let mut table = Self::default();
        table.extend(decls)?;
        Ok(table)
    }

    pub fn extend(&mut self, decls: &[MethodDecl]) -> Result<()> {
        for decl in decls {
            self.entries
                .insert(decl.name.to_string(), MethodEntry::from_decl(decl)?);
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&MethodEntry> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// How a resolved method is invoked.
#[derive(Debug, Clone, Copy)]
pub enum Method<'a> {
    /// Simulated call, decoded return value.
    ReadCall(BoundMethod<'a>),
    /// Signed transaction, receipt with decoded events.
    WriteCall(BoundMethod<'a>),
    /// Like `WriteCall` with raw bytes appended to the call data.
    WriteCallWithPayload(BoundMethod<'a>),
    /// Watches the chain for the event.
    EventAccessor(BoundMethod<'a>),
}

impl<'a> Method<'a> {
    pub fn bound(&self) -> BoundMethod<'a> {
        match *self {
            Method::ReadCall(m)
            | Method::WriteCall(m)
            | Method::WriteCallWithPayload(m)
            | Method::EventAccessor(m) => m,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Method::ReadCall(_) => "read",
            Method::WriteCall(_) => "write",
            Method::WriteCallWithPayload(_) => "write+payload",
            Method::EventAccessor(_) => "event",
        }
    }
}

/// A method entry bound to the contract it is called on.
#[derive(Debug, Clone, Copy)]
pub struct BoundMethod<'a> {
    contract: &'a Contract,
    entry: &'a MethodEntry,
}

impl<'a> BoundMethod<'a> {
    pub fn signature(&self) -> &'a MethodSignature {
        &self.entry.signature
    }

    /// Simulates the call from the contract's own address.
    ///
    /// `Err` only for arguments that do not fit the signature. Anything that
    /// goes wrong on the node (revert, empty data, unreachable) gives `Ok(None)`.
    pub async fn read(&self, args: &[DynSolValue]) -> Result<Option<DynSolValue>> {
        let data = self.entry.signature.encode(args)?;
        let address = self.contract.address;
        let rpc = self.contract.network.rpc();

        let attempt = async {
            let mut tx = TransactionRequest::default()
                .with_from(address)
                .with_to(address)
                .with_value(U256::ZERO)
                .with_gas_price(rpc.gas_price().await?);
            tx.input = TransactionInput::both(data.into());
            let gas = rpc.estimate_gas(&tx).await?;
            rpc.call(&tx.with_gas_limit(gas)).await
        };

        match attempt.await {
            Ok(raw) => {
                let value = self.entry.signature.decode_return(&raw);
                debug!(
                    "Call {}, return Data: {:?}",
                    self.entry.signature,
                    value.as_ref().map(abi::render_value)
                );
                Ok(value)
            }
            Err(e) => {
                debug!("Call {} on {} failed: {}", self.entry.signature, address, e);
                Ok(None)
            }
        }
    }

    /// Call data for a state-changing invocation, payload appended if given.
    pub fn call_data(&self, args: &[DynSolValue], payload: Option<&[u8]>) -> Result<TxCall> {
        let mut data = self.entry.signature.encode(args)?;
        if let Some(payload) = payload {
            data.extend_from_slice(payload);
        }
        Ok(TxCall::contract_call(self.contract.address, data))
    }

    /// Signs and submits, then attaches the declared events found in the
    /// receipt's logs.
    pub async fn transact(
        &self,
        account: &mut Account,
        args: &[DynSolValue],
        payload: Option<&[u8]>,
        timeout: Option<Duration>,
    ) -> Result<Receipt> {
        let call = self.call_data(args, payload)?;
        let mut receipt = self
            .contract
            .network
            .tx_manager()
            .execute(account, &call, timeout)
            .await?;
        if !self.entry.events.is_empty() {
            receipt.events = abi::decode_logs(&self.entry.events, &receipt.logs);
        }
        Ok(receipt)
    }

    pub async fn watch(
        &self,
        from_block: u64,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<WatchedEvent>> {
        self.contract
            .network
            .watcher()
            .watch(
                self.contract.address,
                std::slice::from_ref(&self.entry.signature),
                from_block,
                count,
                timeout,
            )
            .await
    }
}

/// A deployed contract: network handle, address and method table.
#[derive(Debug, Clone)]
pub struct Contract {
    network: Network,
    address: Address,
    methods: MethodTable,
}

impl Contract {
    pub fn new(network: &Network, address: &str, methods: MethodTable) -> Result<Self> {
        let address = utils::validate_address(address)?;
        Ok(Self::at(network, address, methods))
    }

    pub fn at(network: &Network, address: Address, methods: MethodTable) -> Self {
        Self {
            network: network.clone(),
            address,
            methods,
        }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn methods(&self) -> &MethodTable {
        &self.methods
    }

    /// Resolves `name`; unknown names give `None`.
    pub fn method(&self, name: &str) -> Option<Method<'_>> {
        let entry = self.methods.get(name)?;
        let bound = BoundMethod {
            contract: self,
            entry,
        };
        let signature = &entry.signature;
        Some(if signature.is_event() {
            Method::EventAccessor(bound)
        } else if signature.return_type().is_some() {
            Method::ReadCall(bound)
        } else if entry.payload {
            Method::WriteCallWithPayload(bound)
        } else {
            Method::WriteCall(bound)
        })
    }

    /// Read-only call by name. Unknown and non-read methods give `None`.
    pub async fn read(&self, name: &str, args: &[DynSolValue]) -> Result<Option<DynSolValue>> {
        match self.method(name) {
            Some(Method::ReadCall(method)) => method.read(args).await,
            _ => Ok(None),
        }
    }

    /// Builds the transaction for a write method without sending it, so that
    /// several calls can go out as one nonce-contiguous batch.
    pub fn call_data(&self, name: &str, args: &[DynSolValue]) -> Result<TxCall> {
        match self.method(name) {
            Some(Method::WriteCall(method)) => method.call_data(args, None),
            Some(Method::WriteCallWithPayload(method)) => {
                let (args, payload) = split_payload(name, args)?;
                method.call_data(args, Some(payload))
            }
            _ => Err(ClientError::UnknownMethod(name.to_string())),
        }
    }

    /// State-changing call by name. For payload methods the last argument
    /// must be `DynSolValue::Bytes`.
    pub async fn transact(
        &self,
        name: &str,
        account: &mut Account,
        args: &[DynSolValue],
    ) -> Result<Receipt> {
        match self.method(name) {
            Some(Method::WriteCall(method)) => method.transact(account, args, None, None).await,
            Some(Method::WriteCallWithPayload(method)) => {
                let (args, payload) = split_payload(name, args)?;
                method.transact(account, args, Some(payload), None).await
            }
            _ => Err(ClientError::UnknownMethod(name.to_string())),
        }
    }

    /// Watches for any of the named events.
    pub async fn watch(
        &self,
        names: &[&str],
        from_block: u64,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<WatchedEvent>> {
        let mut signatures = Vec::with_capacity(names.len());
        for name in names {
            match self.method(name) {
                Some(Method::EventAccessor(method)) => signatures.push(method.signature().clone()),
                _ => return Err(ClientError::UnknownMethod(name.to_string())),
            }
        }
        self.network
            .watcher()
            .watch(self.address, &signatures, from_block, count, timeout)
            .await
    }

    /// Converts JSON arguments (CLI input) for `name`. A payload method takes
    /// one extra trailing hex string.
    pub fn coerce_args(&self, name: &str, values: &[Value]) -> Result<Vec<DynSolValue>> {
        let method = self
            .method(name)
            .ok_or_else(|| ClientError::UnknownMethod(name.to_string()))?;
        match method {
            Method::WriteCallWithPayload(bound) => {
                let (payload, values) = values.split_last().ok_or_else(|| {
                    ClientError::Encode(format!("{} expects a trailing payload argument", name))
                })?;
                let payload = payload.as_str().ok_or_else(|| {
                    ClientError::Encode("payload must be a hex string".to_string())
                })?;
                let mut args = abi::coerce_args(bound.signature(), values)?;
                args.push(DynSolValue::Bytes(utils::parse_hex_bytes(payload)?.to_vec()));
                Ok(args)
            }
            other => abi::coerce_args(other.bound().signature(), values),
        }
    }
}

fn split_payload<'v>(name: &str, args: &'v [DynSolValue]) -> Result<(&'v [DynSolValue], &'v [u8])> {
    match args.split_last() {
        Some((DynSolValue::Bytes(payload), rest)) => Ok((rest, payload.as_slice())),
        _ => Err(ClientError::Encode(format!(
            "{} expects raw bytes as its last argument",
            name
        ))),
    }
}
