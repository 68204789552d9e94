use alloy::eips::BlockNumberOrTag;
use anyhow::{anyhow, Result};
use bridge_client::config::Config;
use bridge_client::ethereum::abi;
use bridge_client::ethereum::catalog::ContractKind;
use bridge_client::ethereum::contract::Method;
use bridge_client::ethereum::provider::ProviderManager;
use bridge_client::ethereum::transaction::Account;
use bridge_client::ethereum::utils;
use bridge_client::scenario::{self, Direction};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let level = matches
        .get_one::<String>("log-level")
        .map(String::as_str)
        .unwrap_or("info");
    let level: tracing::Level = level
        .parse()
        .map_err(|_| anyhow!("Invalid log level '{}'", level))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    if matches.get_flag("generate-config") {
        println!("{}", Config::generate_sample());
        return Ok(());
    }

    if matches.get_flag("config-path") {
        match Config::default_config_path() {
            Ok(path) => {
                println!("{}", path.display());
                return Ok(());
            }
            Err(e) => {
                error!("Could not determine default config path: {}", e);
                return Err(e);
            }
        }
    }

    let config_path = match matches.get_one::<String>("config") {
        Some(path) => Some(path.into()),
        None => Config::default_config_path().ok().filter(|p| p.exists()),
    };
    let mut config = Config::load_or_default(config_path).await;
    if let Some(overrides) = matches.get_many::<String>("override") {
        for assignment in overrides {
            config.apply_override(assignment)?;
        }
    }

    let token = matches
        .get_one::<String>("token")
        .map(String::as_str)
        .unwrap_or("usdt");

    let result = match matches.subcommand() {
        Some(("call", sub)) => call(&config, token, sub).await,
        Some(("watch", sub)) => watch(&config, token, sub).await,
        Some(("parallel", sub)) => parallel(&config, token, sub).await,
        Some(("status", sub)) => status(&config, token, sub).await,
        Some(("send", sub)) => send(&config, token, sub).await,
        _ => Err(anyhow!("No command given, see --help")),
    };

    match result {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
        Err(e) => {
            error!("{:#}", e);
            Err(e)
        }
    }
}

fn cli() -> Command {
    Command::new("bridge-client")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Smart-contract client for cross-chain bridge tests")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .global(true)
                .help("Path to configuration file"),
        )
        .arg(
            Arg::new("token")
                .long("token")
                .value_name("TOKEN")
                .global(true)
                .help("Bridge to use, as named in the config (usdt, dai, ...)"),
        )
        .arg(
            Arg::new("log-level")
                .short('d')
                .long("log-level")
                .value_name("LEVEL")
                .global(true)
                .help("Log level: error, warn, info, debug, trace"),
        )
        .arg(
            Arg::new("override")
                .short('o')
                .value_name("KEY=VALUE")
                .action(ArgAction::Append)
                .global(true)
                .help("Override a config value, e.g. -o rpc.max_retries=3"),
        )
        .arg(
            Arg::new("generate-config")
                .long("generate-config")
                .help("Generate a sample configuration file and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config-path")
                .long("config-path")
                .help("Print the default configuration file path and exit")
                .action(ArgAction::SetTrue),
        )
        .subcommand(
            Command::new("call")
                .about("Call one contract method and print the result")
                .arg(
                    Arg::new("kind")
                        .required(true)
                        .value_parser(clap::builder::ValueParser::new(parse_kind))
                        .help("Contract type: erc20, erc677, validators, bridge"),
                )
                .arg(Arg::new("address").required(true).help("Checksummed contract address"))
                .arg(Arg::new("method").required(true).help("Method name from the contract's table"))
                .arg(
                    Arg::new("args")
                        .num_args(0..)
                        .allow_hyphen_values(true)
                        .help("Positional arguments (JSON literals or plain strings)"),
                )
                .arg(
                    Arg::new("key")
                        .long("key")
                        .value_name("PRIVATE_KEY")
                        .help("Signing key for state-changing methods"),
                )
                .arg(network_arg()),
        )
        .subcommand(
            Command::new("watch")
                .about("Wait for bridge events")
                .arg(
                    Arg::new("events")
                        .required(true)
                        .num_args(1..)
                        .help("Event names, e.g. relayed_msg signed_affirm"),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .value_name("BLOCK")
                        .value_parser(clap::value_parser!(u64))
                        .help("First block to scan (default: current block)"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_name("N")
                        .default_value("1")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .value_parser(clap::value_parser!(u64)),
                )
                .arg(network_arg()),
        )
        .subcommand(
            Command::new("status")
                .about("Show connectivity and head block of both bridge sides")
                .arg(
                    Arg::new("account")
                        .long("account")
                        .value_name("ADDRESS")
                        .help("Also show this account's balance and pending nonce"),
                ),
        )
        .subcommand(
            Command::new("send")
                .about("Send value transfers on contiguous nonces, then check balances and block gas")
                .arg(
                    Arg::new("to")
                        .long("to")
                        .value_name("ADDRESS")
                        .required(true)
                        .help("Recipient address"),
                )
                .arg(
                    Arg::new("value")
                        .long("value")
                        .value_name("WEI")
                        .default_value("1")
                        .help("Amount per transfer, decimal or 0x hex"),
                )
                .arg(
                    Arg::new("count")
                        .long("count")
                        .value_name("N")
                        .default_value("1")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    Arg::new("key")
                        .long("key")
                        .value_name("PRIVATE_KEY")
                        .help("Signing key (default: first configured key)"),
                )
                .arg(network_arg()),
        )
        .subcommand(
            Command::new("parallel")
                .about("Run the parallel cross-chain transfer check, one task per key")
                .arg(
                    Arg::new("direction")
                        .long("direction")
                        .default_value("foreign-to-home")
                        .value_parser(clap::builder::ValueParser::new(parse_direction))
                        .help("foreign-to-home or home-to-foreign"),
                ),
        )
}

fn network_arg() -> Arg {
    Arg::new("network")
        .long("network")
        .value_name("NETWORK")
        .default_value(ProviderManager::HOME)
        .value_parser([ProviderManager::HOME, ProviderManager::FOREIGN])
        .help("Which side of the bridge to talk to")
}

fn parse_kind(value: &str) -> std::result::Result<ContractKind, String> {
    value.parse()
}

fn parse_direction(value: &str) -> std::result::Result<Direction, String> {
    value.parse()
}

/// CLI arguments are JSON when they parse as JSON, plain strings otherwise.
/// Numbers stay strings so that values above `u64::MAX` survive.
fn cli_value(raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(Value::Number(_)) | Err(_) => Value::String(raw.to_string()),
        Ok(value) => value,
    }
}

fn signing_key(config: &Config, sub: &ArgMatches) -> Result<Account> {
    let key = sub
        .get_one::<String>("key")
        .or_else(|| config.scenario.private_keys.first())
        .ok_or_else(|| anyhow!("This method sends a transaction; pass --key"))?;
    Ok(Account::from_private_key(key)?)
}

async fn call(config: &Config, token: &str, sub: &ArgMatches) -> Result<Value> {
    let providers = ProviderManager::new(config, token)?;
    let network = providers.get_network(
        sub.get_one::<String>("network")
            .map(String::as_str)
            .unwrap_or(ProviderManager::HOME),
    )?;

    let kind = *sub
        .get_one::<ContractKind>("kind")
        .ok_or_else(|| anyhow!("Missing contract kind"))?;
    let address = sub
        .get_one::<String>("address")
        .ok_or_else(|| anyhow!("Missing contract address"))?;
    let name = sub
        .get_one::<String>("method")
        .ok_or_else(|| anyhow!("Missing method name"))?;
    let raw_args: Vec<Value> = sub
        .get_many::<String>("args")
        .map(|values| values.map(|v| cli_value(v)).collect())
        .unwrap_or_default();

    let contract = kind.bind(network, address)?;
    let method = contract.method(name).ok_or_else(|| {
        anyhow!(
            "{} has no method '{}'. Available: {}",
            kind,
            name,
            contract.methods().names().join(", ")
        )
    })?;
    info!("Calling {} {} ({})", kind, name, method.kind());

    match method {
        Method::ReadCall(bound) => {
            let args = contract.coerce_args(name, &raw_args)?;
            let value = bound.read(&args).await?;
            Ok(value.as_ref().map(abi::value_to_json).unwrap_or(Value::Null))
        }
        Method::WriteCall(_) | Method::WriteCallWithPayload(_) => {
            let args = contract.coerce_args(name, &raw_args)?;
            let mut account = signing_key(config, sub)?;
            let receipt = contract.transact(name, &mut account, &args).await?;
            Ok(serde_json::to_value(receipt)?)
        }
        Method::EventAccessor(_) => Err(anyhow!(
            "'{}' is an event; use `bridge-client watch {}`",
            name,
            name
        )),
    }
}

async fn watch(config: &Config, token: &str, sub: &ArgMatches) -> Result<Value> {
    let providers = ProviderManager::new(config, token)?;
    let side = sub
        .get_one::<String>("network")
        .map(String::as_str)
        .unwrap_or(ProviderManager::HOME);
    let network = providers.get_network(side)?;

    let bridge_config = config.bridge(token)?;
    let address = if side == ProviderManager::FOREIGN {
        &bridge_config.foreign_bridge
    } else {
        &bridge_config.home_bridge
    };
    let bridge = ContractKind::Bridge.bind(network, address)?;

    let names: Vec<&str> = sub
        .get_many::<String>("events")
        .map(|values| values.map(String::as_str).collect())
        .unwrap_or_default();
    let from = match sub.get_one::<u64>("from") {
        Some(block) => *block,
        None => network.rpc().block_number().await?,
    };
    let count = sub.get_one::<usize>("count").copied().unwrap_or(1);
    let timeout = sub.get_one::<u64>("timeout").map(|s| Duration::from_secs(*s));

    info!("Watching {} on {} bridge from block {}", names.join(", "), side, from);
    let events = bridge.watch(&names, from, count, timeout).await?;
    if events.len() < count {
        info!("Found {} of {} requested events", events.len(), count);
    }
    Ok(serde_json::to_value(events)?)
}

async fn parallel(config: &Config, token: &str, sub: &ArgMatches) -> Result<Value> {
    let direction = sub
        .get_one::<Direction>("direction")
        .copied()
        .unwrap_or(Direction::ForeignToHome);

    let outcomes = scenario::run_parallel(config, token, direction).await?;
    let passed = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(report) if report.passed))
        .count();
    info!("Test Results: {}/{} passed", passed, outcomes.len());

    let rows: Vec<Value> = outcomes
        .into_iter()
        .map(|outcome| match outcome {
            Ok(report) => json!({ "result": report, "error": null }),
            Err(e) => json!({ "result": null, "error": e.to_string() }),
        })
        .collect();
    Ok(Value::Array(rows))
}

async fn status(config: &Config, token: &str, sub: &ArgMatches) -> Result<Value> {
    let providers = ProviderManager::new(config, token)?;
    let account = sub
        .get_one::<String>("account")
        .map(|a| utils::validate_address(a))
        .transpose()?;

    let mut sides = serde_json::Map::new();
    for name in providers.get_available_networks() {
        if !providers.check_connection(&name).await? {
            sides.insert(name, json!({ "connected": false }));
            continue;
        }

        let network = providers.get_network(&name)?;
        let rpc = network.rpc();
        let mut entry = json!({
            "connected": true,
            "chainId": rpc.chain_id().await?,
            "latest": rpc.get_block(BlockNumberOrTag::Latest).await?,
        });
        if let Some(address) = account {
            let tx = network.tx_manager();
            entry["account"] = json!({
                "address": utils::checksum(&address),
                "balance": rpc.get_balance(address, BlockNumberOrTag::Latest).await?,
                "nonce": tx.next_nonce(address).await?,
                "pendingNonce": tx.next_nonce_pending(address).await?,
            });
        }
        sides.insert(name, entry);
    }
    Ok(Value::Object(sides))
}

async fn send(config: &Config, token: &str, sub: &ArgMatches) -> Result<Value> {
    let providers = ProviderManager::new(config, token)?;
    let network = providers.get_network(
        sub.get_one::<String>("network")
            .map(String::as_str)
            .unwrap_or(ProviderManager::HOME),
    )?;
    let to = utils::validate_address(
        sub.get_one::<String>("to")
            .ok_or_else(|| anyhow!("Missing recipient"))?,
    )?;
    let value = utils::parse_quantity(
        sub.get_one::<String>("value")
            .map(String::as_str)
            .unwrap_or("1"),
    )?;
    let count = sub.get_one::<usize>("count").copied().unwrap_or(1);
    let mut account = signing_key(config, sub)?;
    let from = account.address();

    let rpc = network.rpc();
    let source_start = rpc.get_balance(from, BlockNumberOrTag::Latest).await?;
    let destination_start = rpc.get_balance(to, BlockNumberOrTag::Latest).await?;

    let tx = network.tx_manager();
    let transfers = vec![(to, value); count];
    let receipts = tx.send_value_batch(&mut account, &transfers).await?;

    let mut mismatches = tx
        .verify_stats(&receipts, (from, source_start), (to, destination_start))
        .await?;
    mismatches.extend(tx.verify_block_gas_used(&receipts).await?);
    for mismatch in &mismatches {
        warn!("{}", mismatch);
    }

    let mismatches: Vec<String> = mismatches.iter().map(ToString::to_string).collect();
    Ok(json!({
        "receipts": receipts,
        "mismatches": mismatches,
    }))
}
