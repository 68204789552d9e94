//! Parallel cross-chain transfer check.
//!
//! Every configured key gets its own pool task. A task moves a fixed amount of
//! tokens across the bridge to the same address on the other side, waits for
//! the validators to relay it, and checks both balances against the bridge fee.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use anyhow::{anyhow, Result};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::{Config, RpcConfig};
use crate::ethereum::abi;
use crate::ethereum::catalog::{self, ContractKind};
use crate::ethereum::contract::Contract;
use crate::ethereum::events::WatchSettings;
use crate::ethereum::provider::{Network, ProviderManager};
use crate::ethereum::transaction::Account;
use crate::pool::{TaskError, TaskPool};

/// Fee percentages are expressed in hundredths of a percent.
const FEE_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    ForeignToHome,
    HomeToForeign,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ForeignToHome => f.write_str("foreign-to-home"),
            Direction::HomeToForeign => f.write_str("home-to-foreign"),
        }
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "foreign-to-home" | "f2h" => Ok(Direction::ForeignToHome),
            "home-to-foreign" | "h2f" => Ok(Direction::HomeToForeign),
            other => Err(format!(
                "Unknown direction '{}'. Expected foreign-to-home or home-to-foreign",
                other
            )),
        }
    }
}

/// Bytes the bridge reads after the call data: the recipient left-padded to a word.
pub fn recipient_payload(recipient: Address) -> Vec<u8> {
    recipient.into_word().to_vec()
}

pub fn bridge_fee(amount: U256, fee_percent: U256) -> U256 {
    fee_percent * amount / U256::from(FEE_DENOMINATOR)
}

/// Balances of the sender on the source chain and of the recipient on the
/// destination chain, before and after a transfer.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BalanceCheck {
    pub source_before: U256,
    pub source_after: U256,
    pub destination_before: U256,
    pub destination_after: U256,
}

impl BalanceCheck {
    /// The source lost exactly `amount` and the destination gained `amount - fee`.
    pub fn holds(&self, amount: U256, fee: U256) -> bool {
        let spent = self.source_before.checked_sub(self.source_after);
        let received = self.destination_after.checked_sub(self.destination_before);
        spent == Some(amount) && received == amount.checked_sub(fee)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub account: Address,
    pub direction: Direction,
    pub amount: U256,
    pub fee: U256,
    pub balances: BalanceCheck,
    pub passed: bool,
}

/// Addresses and bridge parameters resolved once before the tasks start.
#[derive(Debug, Clone)]
pub struct ScenarioSetup {
    pub home_rpc: String,
    pub foreign_rpc: String,
    pub rpc: RpcConfig,
    pub watch: WatchSettings,
    pub home_bridge: Address,
    pub foreign_bridge: Address,
    pub home_token: Address,
    pub foreign_token: Address,
    pub home_fee_percent: U256,
    pub foreign_fee_percent: U256,
    pub decimals: u8,
    pub units: u64,
    pub settle: Duration,
}

impl ScenarioSetup {
    pub async fn resolve(config: &Config, token: &str) -> Result<Self> {
        let bridge = config.bridge(token)?;
        let providers = ProviderManager::new(config, token)?;
        let home = providers.get_network(ProviderManager::HOME)?;
        let foreign = providers.get_network(ProviderManager::FOREIGN)?;

        let home_bridge = ContractKind::Bridge.bind(home, &bridge.home_bridge)?;
        let foreign_bridge = ContractKind::Bridge.bind(foreign, &bridge.foreign_bridge)?;
        let home_token = catalog::erc677(&home_bridge).await?;
        let foreign_token = catalog::erc20(&foreign_bridge).await?;

        let decimals = read_uint(&foreign_token, "decimals", &[]).await?;
        let decimals =
            u8::try_from(decimals).map_err(|_| anyhow!("Token reports {} decimals", decimals))?;

        let setup = Self {
            home_rpc: bridge.home_rpc.clone(),
            foreign_rpc: bridge.foreign_rpc.clone(),
            rpc: config.rpc.clone(),
            watch: config.watch.settings(),
            home_bridge: home_bridge.address(),
            foreign_bridge: foreign_bridge.address(),
            home_token: home_token.address(),
            foreign_token: foreign_token.address(),
            home_fee_percent: read_uint(&home_bridge, "fee_percent", &[]).await?,
            foreign_fee_percent: read_uint(&foreign_bridge, "fee_percent", &[]).await?,
            decimals,
            units: config.scenario.units,
            settle: Duration::from_secs(config.scenario.settle_secs),
        };
        info!(
            "Bridge {}: home token {}, foreign token {}, fees {}/{}",
            token,
            setup.home_token,
            setup.foreign_token,
            setup.home_fee_percent,
            setup.foreign_fee_percent
        );
        Ok(setup)
    }

    pub fn amount(&self) -> U256 {
        U256::from(self.units) * U256::from(10u64).pow(U256::from(self.decimals))
    }

    /// Fee charged by the bridge that pays out on the destination chain.
    pub fn fee(&self, direction: Direction, amount: U256) -> U256 {
        match direction {
            Direction::ForeignToHome => bridge_fee(amount, self.home_fee_percent),
            Direction::HomeToForeign => bridge_fee(amount, self.foreign_fee_percent),
        }
    }
}

async fn read_uint(contract: &Contract, method: &str, args: &[DynSolValue]) -> Result<U256> {
    match contract.read(method, args).await? {
        Some(DynSolValue::Uint(value, _)) => Ok(value),
        other => Err(anyhow!(
            "{} on {} returned {:?} instead of an integer",
            method,
            contract.address(),
            other.as_ref().map(abi::render_value)
        )),
    }
}

/// One transfer from `account` to its own address on the other chain.
pub async fn transfer_once(
    setup: &ScenarioSetup,
    home: &Network,
    foreign: &Network,
    account: &mut Account,
    direction: Direction,
) -> Result<TransferReport> {
    let holder = account.address();
    let home_token = Contract::at(home, setup.home_token, ContractKind::Erc677.methods()?);
    let foreign_token = Contract::at(foreign, setup.foreign_token, ContractKind::Erc20.methods()?);
    let (source, destination) = match direction {
        Direction::ForeignToHome => (&foreign_token, &home_token),
        Direction::HomeToForeign => (&home_token, &foreign_token),
    };

    let amount = setup.amount();
    let owner = [abi::address_arg(holder)];
    let mut balances = BalanceCheck {
        source_before: read_uint(source, "balance_of", &owner).await?,
        destination_before: read_uint(destination, "balance_of", &owner).await?,
        ..BalanceCheck::default()
    };
    info!("Src account balance - {}: {}", holder, balances.source_before);
    info!("Dst account balance - {}: {}", holder, balances.destination_before);

    if balances.source_before < amount {
        return Err(anyhow!(
            "Balance of {} ({}) is lower than the amount to transfer ({})",
            holder,
            balances.source_before,
            amount
        ));
    }

    let payload = recipient_payload(holder);
    let receipt = match direction {
        Direction::ForeignToHome => {
            foreign_token
                .transact(
                    "transfer",
                    account,
                    &[
                        abi::address_arg(setup.foreign_bridge),
                        abi::uint_arg(amount),
                        DynSolValue::Bytes(payload),
                    ],
                )
                .await?
        }
        Direction::HomeToForeign => {
            home_token
                .transact(
                    "transfer_call",
                    account,
                    &[
                        abi::address_arg(setup.home_bridge),
                        abi::uint_arg(amount),
                        DynSolValue::Bytes(payload),
                    ],
                )
                .await?
        }
    };
    info!(
        "Transfer {} mined in block {:?}, events: {}",
        receipt.transaction_hash,
        receipt.block(),
        receipt
            .events
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    );

    tokio::time::sleep(setup.settle).await;

    balances.source_after = read_uint(source, "balance_of", &owner).await?;
    balances.destination_after = read_uint(destination, "balance_of", &owner).await?;
    info!("Src account balance - {}: {}", holder, balances.source_after);
    info!("Dst account balance - {}: {}", holder, balances.destination_after);

    let fee = setup.fee(direction, amount);
    let passed = balances.holds(amount, fee);
    Ok(TransferReport {
        account: holder,
        direction,
        amount,
        fee,
        balances,
        passed,
    })
}

/// Runs one transfer per configured key, in parallel.
pub async fn run_parallel(
    config: &Config,
    token: &str,
    direction: Direction,
) -> Result<Vec<std::result::Result<TransferReport, TaskError>>> {
    let keys = config.scenario.private_keys.clone();
    if keys.is_empty() {
        return Err(anyhow!(
            "No private keys configured. Set scenario.private_keys or {}",
            crate::config::PRIVATE_KEYS_ENV
        ));
    }

    let setup = Arc::new(ScenarioSetup::resolve(config, token).await?);
    info!("========= Run Parallel Tests =========");

    let mut pool = TaskPool::new(config.pool.workers);
    for (index, key) in keys.into_iter().enumerate() {
        let setup = setup.clone();
        pool.submit(move || async move {
            // Clients and the account are built inside the task.
            let mut account = Account::from_private_key(&key)?;
            info!("Run parallel work: {} - {}", index, account.address());
            let home = Network::from_config(&setup.home_rpc, &setup.rpc, setup.watch.clone())?;
            let foreign =
                Network::from_config(&setup.foreign_rpc, &setup.rpc, setup.watch.clone())?;
            transfer_once(&setup, &home, &foreign, &mut account, direction).await
        });
    }

    Ok(pool.await_all().await)
}
