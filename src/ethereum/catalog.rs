//! Method tables of the contracts a token bridge deployment consists of.

use alloy::dyn_abi::DynSolValue;
use std::fmt;
use std::str::FromStr;

use super::contract::{Contract, MethodDecl, MethodTable};
use super::provider::Network;
use crate::error::{ClientError, Result};

const TRANSFER_EVENT: &str = "Transfer(i:address,i:address,uint256)";
const USER_REQUEST_EVENT: &str = "UserRequestForSignature(address,uint256)";

pub const ERC20: &[MethodDecl] = &[
    MethodDecl::new("name", "name()string"),
    MethodDecl::new("symbol", "symbol()string"),
    MethodDecl::new("decimals", "decimals()uint8"),
    MethodDecl::new("total_supply", "totalSupply()uint256"),
    MethodDecl::new("balance_of", "balanceOf(address)uint256"),
    MethodDecl::new("allowance", "allowance(address,address)uint256"),
    // Bridges relay a plain transfer to themselves using the recipient
    // appended after the call data.
    MethodDecl::new("transfer", "transfer(address,uint256)")
        .with_payload()
        .with_events(&[TRANSFER_EVENT]),
    MethodDecl::new("approve", "approve(address,uint256)"),
    MethodDecl::new("transfer_from", "transferFrom(address,address,uint256)"),
];

/// Declared on top of [`ERC20`].
pub const ERC677: &[MethodDecl] = &[
    MethodDecl::new("transfer_call", "transferAndCall(address,uint256,bytes)").with_events(&[
        TRANSFER_EVENT,
        "Burn(i:address,uint256)",
        USER_REQUEST_EVENT,
        "Transfer(i:address,i:address,uint256,bytes)",
    ]),
    MethodDecl::new(
        "get_rules",
        "getFundingRules()(uint256,uint256,uint256,uint256)",
    ),
    MethodDecl::new("owner", "owner()address"),
];

pub const VALIDATORS: &[MethodDecl] = &[
    MethodDecl::new("owner", "owner()address"),
    MethodDecl::new("required_signatures", "requiredSignatures()uint256"),
    MethodDecl::new("count", "validatorCount()uint256"),
    MethodDecl::new("list", "validatorsList()address[]"),
    MethodDecl::new("set_required_signatures", "setRequiredSignatures(uint256)"),
    MethodDecl::new("add", "addValidator(address)"),
    MethodDecl::new("remove", "removeValidator(address)"),
];

pub const BRIDGE: &[MethodDecl] = &[
    MethodDecl::new("owner", "owner()address"),
    MethodDecl::new("required_signatures", "requiredSignatures()uint256"),
    // fee manager
    MethodDecl::new("fee_percent", "feePercent()uint256"),
    MethodDecl::new("fee_subtract", "subtractFee(uint256)uint256"),
    MethodDecl::new("set_fee_percent", "setFeePercent(uint256)"),
    // limits
    MethodDecl::new("daily_limit", "dailyLimit()uint256"),
    MethodDecl::new("set_daily_limit", "setDailyLimit(uint256)"),
    MethodDecl::new("exec_daily_limit", "executionDailyLimit()uint256"),
    MethodDecl::new("set_exec_daily_limit", "setExecutionDailyLimit(uint256)"),
    MethodDecl::new("get_current_day", "getCurrentDay()uint256"),
    MethodDecl::new("total_spent_per_day", "totalSpentPerDay(uint256)uint256"),
    MethodDecl::new("total_exec_per_day", "totalExecutedPerDay(uint256)uint256"),
    MethodDecl::new("within_limit", "withinLimit(uint256)bool"),
    MethodDecl::new("within_exec_limit", "withinExecutionLimit(uint256)bool"),
    MethodDecl::new("min_per_tx", "minPerTx()uint256"),
    MethodDecl::new("max_per_tx", "maxPerTx()uint256"),
    MethodDecl::new("set_min_per_tx", "setMinPerTx(uint256)"),
    MethodDecl::new("set_max_per_tx", "setMaxPerTx(uint256)"),
    MethodDecl::new("claim_tokens", "claimTokens(address,address)"),
    // home side
    MethodDecl::new("set_rules", "setFundingRules(uint256,uint256,uint256,uint256)"),
    MethodDecl::new("fix_assets", "fixAssetsAboveLimits(bytes32,bool)")
        .with_events(&[USER_REQUEST_EVENT]),
    // linked contracts
    MethodDecl::new("validator_contract", "validatorContract()address"),
    MethodDecl::new("erc677_token", "erc677token()address"),
    MethodDecl::new("erc20_token", "erc20token()address"),
    // events
    MethodDecl::new("signed_affirm", "event:SignedForAffirmation(i:address,bytes32)"),
    MethodDecl::new(
        "affirm_completed",
        "event:AffirmationCompleted(address,uint256,bytes32)",
    ),
    MethodDecl::new(
        "amount_limit",
        "event:AmountLimitExceeded(address,uint256,bytes32)",
    ),
    MethodDecl::new("signed_request", "event:SignedForUserRequest(i:address,bytes32)"),
    MethodDecl::new("relayed_msg", "event:RelayedMessage(address,uint256,bytes32)"),
];

/// Contract types known to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractKind {
    Erc20,
    Erc677,
    Validators,
    Bridge,
}

impl ContractKind {
    pub const ALL: [ContractKind; 4] = [
        ContractKind::Erc20,
        ContractKind::Erc677,
        ContractKind::Validators,
        ContractKind::Bridge,
    ];

    pub fn methods(self) -> Result<MethodTable> {
        match self {
            ContractKind::Erc20 => MethodTable::from_decls(ERC20),
            ContractKind::Erc677 => {
                let mut table = MethodTable::from_decls(ERC20)?;
                table.extend(ERC677)?;
                Ok(table)
            }
            ContractKind::Validators => MethodTable::from_decls(VALIDATORS),
            ContractKind::Bridge => MethodTable::from_decls(BRIDGE),
        }
    }

    pub fn bind(self, network: &Network, address: &str) -> Result<Contract> {
        Contract::new(network, address, self.methods()?)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ContractKind::Erc20 => "erc20",
            ContractKind::Erc677 => "erc677",
            ContractKind::Validators => "validators",
            ContractKind::Bridge => "bridge",
        }
    }
}

impl fmt::Display for ContractKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ContractKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = ContractKind::ALL.iter().map(|k| k.as_str()).collect();
                format!("Unknown contract kind '{}'. Expected one of: {}", s, names.join(", "))
            })
    }
}

/// Follows an address getter on `contract` and binds the result as `kind`.
async fn linked(contract: &Contract, getter: &str, kind: ContractKind) -> Result<Contract> {
    match contract.read(getter, &[]).await? {
        Some(DynSolValue::Address(address)) => Ok(Contract::at(
            contract.network(),
            address,
            kind.methods()?,
        )),
        _ => Err(ClientError::Decode(format!(
            "{} on {} returned no address",
            getter,
            contract.address()
        ))),
    }
}

pub async fn validators(bridge: &Contract) -> Result<Contract> {
    linked(bridge, "validator_contract", ContractKind::Validators).await
}

/// Token of a home-side bridge.
pub async fn erc677(bridge: &Contract) -> Result<Contract> {
    linked(bridge, "erc677_token", ContractKind::Erc677).await
}

/// Token of a foreign-side bridge.
pub async fn erc20(bridge: &Contract) -> Result<Contract> {
    linked(bridge, "erc20_token", ContractKind::Erc20).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::contract::Method;
    use crate::ethereum::mock::MockTransport;
    use crate::ethereum::provider::{RetryPolicy, RpcClient};
    use alloy::primitives::Address;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn network(mock: &Arc<MockTransport>) -> Network {
        Network::new(RpcClient::new(mock.clone(), RetryPolicy::none()))
    }

    #[test]
    fn test_all_catalogs_parse() {
        for kind in ContractKind::ALL {
            let table = kind.methods().unwrap();
            assert!(!table.names().is_empty(), "{} has no methods", kind);
        }
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("ERC677".parse::<ContractKind>().unwrap(), ContractKind::Erc677);
        assert_eq!("bridge".parse::<ContractKind>().unwrap(), ContractKind::Bridge);
        assert!("token".parse::<ContractKind>().is_err());
    }

    #[test]
    fn test_method_shapes() {
        let mock = Arc::new(MockTransport::new(|_, _| Ok(Value::Null)));
        let network = network(&mock);
        let address = "0x742d35Cc6634C0532925a3b844Bc454e4438f44e";

        let token = ContractKind::Erc677.bind(&network, address).unwrap();
        // Inherited from ERC20.
        assert!(matches!(token.method("balance_of"), Some(Method::ReadCall(_))));
        assert!(matches!(token.method("transfer"), Some(Method::WriteCallWithPayload(_))));
        assert!(matches!(token.method("transfer_call"), Some(Method::WriteCall(_))));
        assert!(matches!(token.method("get_rules"), Some(Method::ReadCall(_))));

        let bridge = ContractKind::Bridge.bind(&network, address).unwrap();
        for event in [
            "signed_affirm",
            "affirm_completed",
            "amount_limit",
            "signed_request",
            "relayed_msg",
        ] {
            assert!(
                matches!(bridge.method(event), Some(Method::EventAccessor(_))),
                "{} should be an event",
                event
            );
        }
        assert!(matches!(bridge.method("fix_assets"), Some(Method::WriteCall(_))));
    }

    #[test]
    fn test_bind_rejects_bad_checksum() {
        let mock = Arc::new(MockTransport::new(|_, _| Ok(Value::Null)));
        let err = ContractKind::Erc20
            .bind(&network(&mock), "0x742d35cC6634C0532925a3b844Bc454e4438f44e")
            .unwrap_err();
        assert!(matches!(err, ClientError::InvalidAddress(_)));
    }

    #[tokio::test]
    async fn test_linked_validator_contract() {
        let validators = Address::repeat_byte(0x5a);
        let mock = Arc::new(MockTransport::new(move |method, _| match method {
            "eth_call" => Ok(json!(validators.into_word())),
            _ => Ok(json!("0x1")),
        }));
        let bridge = ContractKind::Bridge
            .bind(&network(&mock), "0x742d35Cc6634C0532925a3b844Bc454e4438f44e")
            .unwrap();

        let linked = super::validators(&bridge).await.unwrap();
        assert_eq!(linked.address(), validators);
        assert!(linked.method("required_signatures").is_some());
        assert!(linked.method("fee_percent").is_none());
    }

    #[tokio::test]
    async fn test_linked_contract_missing() {
        let mock = Arc::new(MockTransport::new(|method, _| match method {
            "eth_call" => Ok(json!("0x")),
            _ => Ok(json!("0x1")),
        }));
        let bridge = ContractKind::Bridge
            .bind(&network(&mock), "0x742d35Cc6634C0532925a3b844Bc454e4438f44e")
            .unwrap();
        assert!(erc20(&bridge).await.is_err());
    }
}
