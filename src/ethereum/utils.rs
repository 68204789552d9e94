use alloy::primitives::{Address, Bytes, U256};
use std::str::FromStr;

use crate::error::{ClientError, Result};

/// Validates an address and returns it parsed.
///
/// Mixed-case input must carry a valid EIP-55 checksum; all-lowercase or
/// all-uppercase input is accepted as is.
pub fn validate_address(address: &str) -> Result<Address> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ClientError::InvalidAddress(
            "Address cannot be empty".to_string(),
        ));
    }

    if !address.starts_with("0x") && !address.starts_with("0X") {
        return Err(ClientError::InvalidAddress(format!(
            "'{}' must start with '0x'",
            address
        )));
    }

    if address.len() != 42 {
        return Err(ClientError::InvalidAddress(format!(
            "'{}' must be exactly 42 characters (0x + 40 hex characters)",
            address
        )));
    }

    let hex_part = &address[2..];
    if !hex_part.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ClientError::InvalidAddress(format!(
            "'{}' contains non-hexadecimal characters",
            address
        )));
    }

    let has_lower = hex_part.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = hex_part.chars().any(|c| c.is_ascii_uppercase());
    if has_lower && has_upper {
        return Address::parse_checksummed(address, None).map_err(|e| {
            ClientError::InvalidAddress(format!("'{}' has a bad checksum: {}", address, e))
        });
    }

    Address::from_str(address)
        .map_err(|e| ClientError::InvalidAddress(format!("'{}': {}", address, e)))
}

/// Returns the EIP-55 form of an address.
pub fn checksum(address: &Address) -> String {
    address.to_checksum(None)
}

/// Validates a method or event name from a signature.
pub fn validate_function_name(function_name: &str) -> Result<()> {
    let Some(first) = function_name.chars().next() else {
        return Err(ClientError::signature(function_name, "name cannot be empty"));
    };

    if !first.is_ascii_alphabetic() && first != '_' {
        return Err(ClientError::signature(
            function_name,
            "names must start with a letter or underscore",
        ));
    }

    if !function_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(ClientError::signature(
            function_name,
            "names can only contain letters, numbers, and underscores",
        ));
    }

    Ok(())
}

/// Parses a decimal or `0x`-prefixed hex quantity.
pub fn parse_quantity(value_str: &str) -> Result<U256> {
    let value_str = value_str.trim();
    if value_str.is_empty() {
        return Err(ClientError::Encode("Value cannot be empty".to_string()));
    }

    if let Some(hex_digits) = value_str
        .strip_prefix("0x")
        .or_else(|| value_str.strip_prefix("0X"))
    {
        U256::from_str_radix(hex_digits, 16)
            .map_err(|_| ClientError::Encode(format!("Invalid hexadecimal value: '{}'", value_str)))
    } else {
        U256::from_str(value_str).map_err(|_| {
            ClientError::Encode(format!(
                "Invalid numeric value: '{}'. Use decimal format or '0x' prefixed hex",
                value_str
            ))
        })
    }
}

/// Decodes a hex string with or without the `0x` prefix.
pub fn parse_hex_bytes(value: &str) -> Result<Bytes> {
    let digits = value.trim().trim_start_matches("0x");
    Ok(Bytes::from(hex::decode(digits)?))
}

/// Creates user-friendly error messages for common RPC errors
pub fn interpret_rpc_error(error: &str) -> String {
    if error.contains("execution reverted") {
        "The contract function reverted execution. This usually means the function's requirements were not met or an assertion failed.".to_string()
    } else if error.contains("insufficient funds") {
        "Insufficient funds to cover value plus gas costs.".to_string()
    } else if error.contains("gas required exceeds allowance") {
        "Gas limit too low for this transaction.".to_string()
    } else if error.contains("nonce too low") {
        "Nonce too low. Another transaction from this account was already mined with this nonce.".to_string()
    } else if error.contains("replacement transaction underpriced") {
        "Gas price too low to replace the pending transaction with the same nonce.".to_string()
    } else if error.contains("already known") {
        "The node already holds this exact transaction in its pool.".to_string()
    } else if error.contains("invalid sender") || error.contains("invalid signature") {
        "The node rejected the transaction signature. Check the chain id and private key."
            .to_string()
    } else {
        format!("RPC error: {}", error)
    }
}
