//! Call codec for the compact method-signature grammar.
//!
//! A signature looks like `name(type,type,...)returnType`. The return type is
//! omitted for state-changing calls, a parameter prefixed with `i:` is an
//! indexed log topic, and an `event:` prefix marks an entry that is only ever
//! matched against logs.

use alloy::dyn_abi::{DynSolType, DynSolValue, Word};
use alloy::primitives::ruint::UintTryFrom;
use alloy::primitives::{keccak256, Address, FixedBytes, B256, I256, U256};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{utils, DecodedEvent, LogEntry};
use crate::error::{ClientError, Result};

const EVENT_PREFIX: &str = "event:";
const INDEXED_PREFIX: &str = "i:";

/// One declared parameter of a signature.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub ty: DynSolType,
    pub indexed: bool,
}

/// A parsed method or event signature. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSignature {
    name: String,
    params: Vec<Param>,
    returns: Option<DynSolType>,
    event_only: bool,
    canonical: String,
}

impl MethodSignature {
    pub fn parse(text: &str) -> Result<Self> {
        let normalized: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let (event_only, body) = match normalized.strip_prefix(EVENT_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, normalized.as_str()),
        };

        let open = body
            .find('(')
            .ok_or_else(|| ClientError::signature(text, "missing '('"))?;
        let name = &body[..open];
        utils::validate_function_name(name)?;

        let close = matching_paren(body, open)
            .ok_or_else(|| ClientError::signature(text, "unbalanced parentheses"))?;

        let mut params = Vec::new();
        for raw in split_top_level(&body[open + 1..close]) {
            let (indexed, ty_text) = match raw.strip_prefix(INDEXED_PREFIX) {
                Some(rest) => (true, rest),
                None => (false, raw),
            };
            let ty = parse_type(text, ty_text)?;
            if matches!(ty, DynSolType::Tuple(_)) {
                return Err(ClientError::signature(
                    text,
                    "tuple parameters are not supported",
                ));
            }
            params.push(Param { ty, indexed });
        }

        let tail = &body[close + 1..];
        let returns = if tail.is_empty() {
            None
        } else if event_only {
            return Err(ClientError::signature(text, "events cannot declare a return type"));
        } else {
            Some(parse_type(text, tail)?)
        };

        let type_names: Vec<String> = params
            .iter()
            .map(|p| p.ty.sol_type_name().into_owned())
            .collect();
        let canonical = format!("{}({})", name, type_names.join(","));

        Ok(Self {
            name: name.to_string(),
            params,
            returns,
            event_only,
            canonical,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn return_type(&self) -> Option<&DynSolType> {
        self.returns.as_ref()
    }

    pub fn is_event(&self) -> bool {
        self.event_only
    }

    /// `name(type,...)` with markers and return type removed; the text that gets hashed.
    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn selector(&self) -> FixedBytes<4> {
        FixedBytes::from_slice(&keccak256(self.canonical.as_bytes())[..4])
    }

    /// Topic 0 of a log emitted by this event.
    pub fn topic(&self) -> B256 {
        keccak256(self.canonical.as_bytes())
    }

    /// Selector followed by the ABI encoding of `args`.
    pub fn encode(&self, args: &[DynSolValue]) -> Result<Vec<u8>> {
        if args.len() != self.params.len() {
            return Err(ClientError::Encode(format!(
                "{} expects {} arguments, got {}",
                self.canonical,
                self.params.len(),
                args.len()
            )));
        }

        for (i, (param, arg)) in self.params.iter().zip(args).enumerate() {
            if !param.ty.matches(arg) {
                return Err(ClientError::Encode(format!(
                    "argument #{} of {} must be {}, got {}",
                    i + 1,
                    self.canonical,
                    param.ty,
                    arg.sol_type_name().as_deref().unwrap_or("an unsupported value")
                )));
            }
            if !fits_width(arg) {
                return Err(ClientError::Encode(format!(
                    "argument #{} of {} does not fit in {}",
                    i + 1,
                    self.canonical,
                    param.ty
                )));
            }
        }

        let mut data = self.selector().to_vec();
        data.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
        Ok(data)
    }

    /// Decodes the declared return type. Missing or malformed data yields `None`.
    pub fn decode_return(&self, data: &[u8]) -> Option<DynSolValue> {
        let returns = self.returns.as_ref()?;
        if data.is_empty() {
            return None;
        }

        match DynSolType::Tuple(vec![returns.clone()]).abi_decode_params(data) {
            Ok(DynSolValue::Tuple(mut values)) if values.len() == 1 => {
                let value = values.pop()?;
                if fits_width(&value) {
                    Some(value)
                } else {
                    debug!("Return of {} overflows {}", self.canonical, returns);
                    None
                }
            }
            Ok(other) => {
                debug!("Unexpected decode shape for {}: {:?}", self.canonical, other);
                None
            }
            Err(e) => {
                debug!("Failed to decode return of {}: {}", self.canonical, e);
                None
            }
        }
    }

    /// Matches `log` against this event.
    ///
    /// `Ok(None)` means the log belongs to a different event; an error means the
    /// hash matched but the topics or data do not fit the declared parameters.
    pub fn decode_log(&self, log: &LogEntry) -> Result<Option<DecodedEvent>> {
        match log.topics.first() {
            Some(topic) if *topic == self.topic() => {}
            _ => return Ok(None),
        }

        let mut topics = log.topics.iter().skip(1);
        let mut values: Vec<Option<DynSolValue>> = Vec::with_capacity(self.params.len());
        let mut data_types = Vec::new();

        for param in &self.params {
            if param.indexed {
                let topic = topics.next().ok_or_else(|| {
                    ClientError::Decode(format!("{}: log has too few topics", self.canonical))
                })?;
                values.push(Some(decode_topic(&param.ty, *topic)?));
            } else {
                data_types.push(param.ty.clone());
                values.push(None);
            }
        }

        if !data_types.is_empty() {
            let decoded = DynSolType::Tuple(data_types)
                .abi_decode_params(&log.data)
                .map_err(|e| ClientError::Decode(format!("{}: {}", self.canonical, e)))?;
            let DynSolValue::Tuple(unindexed) = decoded else {
                return Err(ClientError::Decode(format!(
                    "{}: log data is not a tuple",
                    self.canonical
                )));
            };
            let mut unindexed = unindexed.into_iter();
            for slot in values.iter_mut().filter(|v| v.is_none()) {
                *slot = unindexed.next();
            }
        }

        let values = values
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| ClientError::Decode(format!("{}: missing values", self.canonical)))?;
        if !values.iter().all(fits_width) {
            return Err(ClientError::Decode(format!(
                "{}: value overflows its declared width",
                self.canonical
            )));
        }

        Ok(Some(DecodedEvent {
            name: self.name.clone(),
            values,
        }))
    }
}

impl FromStr for MethodSignature {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.event_only {
            f.write_str(EVENT_PREFIX)?;
        }
        write!(f, "{}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            if param.indexed {
                f.write_str(INDEXED_PREFIX)?;
            }
            write!(f, "{}", param.ty)?;
        }
        f.write_str(")")?;
        if let Some(returns) = &self.returns {
            write!(f, "{}", returns)?;
        }
        Ok(())
    }
}

/// Parses `signature` and encodes a call to it.
pub fn encode(signature: &str, args: &[DynSolValue]) -> Result<Vec<u8>> {
    MethodSignature::parse(signature)?.encode(args)
}

/// Decodes a call's return data; `None` for a bad signature, no data or bad data.
pub fn decode_return(signature: &str, data: Option<&[u8]>) -> Option<DynSolValue> {
    let signature = MethodSignature::parse(signature).ok()?;
    signature.decode_return(data?)
}

/// Decodes one log against one event signature; `None` unless it matches cleanly.
pub fn decode_log(signature: &str, log: &LogEntry) -> Option<DecodedEvent> {
    let signature = MethodSignature::parse(signature).ok()?;
    signature.decode_log(log).ok().flatten()
}

/// Every (log, signature) pair that decodes, in log order.
pub fn decode_logs(signatures: &[MethodSignature], logs: &[LogEntry]) -> Vec<DecodedEvent> {
    let mut events = Vec::new();
    for log in logs {
        for signature in signatures {
            match signature.decode_log(log) {
                Ok(Some(event)) => events.push(event),
                Ok(None) => {}
                Err(e) => debug!("Skipping log that does not fit {}: {}", signature, e),
            }
        }
    }
    events
}

/// Renders a decoded value for logs and event strings. Byte values become hex.
pub fn render_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(addr) => utils::checksum(addr),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(n, _) => n.to_string(),
        DynSolValue::Uint(n, _) => n.to_string(),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", rendered.join(", "))
        }
        DynSolValue::Tuple(items) => {
            let rendered: Vec<String> = items.iter().map(render_value).collect();
            format!("({})", rendered.join(", "))
        }
        other => format!("{:?}", other),
    }
}

/// Converts a decoded value to JSON for printing.
pub fn value_to_json(value: &DynSolValue) -> Value {
    match value {
        DynSolValue::Bool(b) => Value::Bool(*b),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            Value::Array(items.iter().map(value_to_json).collect())
        }
        other => Value::String(render_value(other)),
    }
}

/// Converts JSON (or a bare string from the command line) into a value of `ty`.
pub fn coerce_arg(ty: &DynSolType, value: &Value) -> Result<DynSolValue> {
    match ty {
        DynSolType::Address => {
            let addr_str = value
                .as_str()
                .ok_or_else(|| ClientError::Encode("Address must be a string".to_string()))?;
            Ok(DynSolValue::Address(utils::validate_address(addr_str)?))
        }
        DynSolType::Uint(bits) => {
            let num = match value {
                Value::Number(n) => n
                    .as_u64()
                    .map(U256::from)
                    .ok_or_else(|| ClientError::Encode(format!("Invalid uint value: {}", n)))?,
                Value::String(s) => utils::parse_quantity(s)?,
                _ => {
                    return Err(ClientError::Encode(
                        "Uint must be a number or string".to_string(),
                    ))
                }
            };
            if num.bit_len() > *bits {
                return Err(ClientError::Encode(format!(
                    "{} does not fit in uint{}",
                    num, bits
                )));
            }
            Ok(DynSolValue::Uint(num, *bits))
        }
        DynSolType::Int(bits) => {
            let num = match value {
                Value::Number(n) => {
                    let n = n
                        .as_i64()
                        .ok_or_else(|| ClientError::Encode(format!("Invalid int value: {}", n)))?;
                    I256::try_from(n).map_err(|e| ClientError::Encode(e.to_string()))?
                }
                Value::String(s) => I256::from_str(s.trim())
                    .map_err(|_| ClientError::Encode(format!("Invalid int string: {}", s)))?,
                _ => {
                    return Err(ClientError::Encode(
                        "Int must be a number or string".to_string(),
                    ))
                }
            };
            let value = DynSolValue::Int(num, *bits);
            if !fits_width(&value) {
                return Err(ClientError::Encode(format!(
                    "{} does not fit in int{}",
                    num, bits
                )));
            }
            Ok(value)
        }
        DynSolType::Bool => match value {
            Value::Bool(b) => Ok(DynSolValue::Bool(*b)),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(DynSolValue::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(DynSolValue::Bool(false)),
            _ => Err(ClientError::Encode(
                "Bool parameter must be a boolean".to_string(),
            )),
        },
        DynSolType::String => {
            let s = value
                .as_str()
                .ok_or_else(|| ClientError::Encode("String parameter must be a string".to_string()))?;
            Ok(DynSolValue::String(s.to_string()))
        }
        DynSolType::FixedBytes(size) => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| ClientError::Encode("Bytes must be a hex string".to_string()))?;
            let bytes = utils::parse_hex_bytes(hex_str)?;
            if bytes.len() != *size {
                return Err(ClientError::Encode(format!(
                    "bytes{} needs exactly {} bytes, got {}",
                    size,
                    size,
                    bytes.len()
                )));
            }
            let mut word = Word::ZERO;
            word[..*size].copy_from_slice(&bytes);
            Ok(DynSolValue::FixedBytes(word, *size))
        }
        DynSolType::Bytes => {
            let hex_str = value
                .as_str()
                .ok_or_else(|| ClientError::Encode("Bytes must be a hex string".to_string()))?;
            Ok(DynSolValue::Bytes(utils::parse_hex_bytes(hex_str)?.to_vec()))
        }
        DynSolType::Array(inner) => {
            let items = match value {
                Value::Array(items) => items.clone(),
                Value::String(s) => match serde_json::from_str::<Value>(s)? {
                    Value::Array(items) => items,
                    _ => {
                        return Err(ClientError::Encode(
                            "Array parameter must be an array".to_string(),
                        ))
                    }
                },
                _ => {
                    return Err(ClientError::Encode(
                        "Array parameter must be an array".to_string(),
                    ))
                }
            };
            let values = items
                .iter()
                .map(|item| coerce_arg(inner, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(DynSolValue::Array(values))
        }
        other => Err(ClientError::Encode(format!("Unsupported type: {}", other))),
    }
}

/// Coerces a whole positional argument list against a signature's parameters.
pub fn coerce_args(signature: &MethodSignature, values: &[Value]) -> Result<Vec<DynSolValue>> {
    if values.len() != signature.params().len() {
        return Err(ClientError::Encode(format!(
            "{} expects {} arguments, got {}",
            signature.canonical(),
            signature.params().len(),
            values.len()
        )));
    }
    signature
        .params()
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (param, value))| {
            coerce_arg(&param.ty, value).map_err(|e| {
                ClientError::Encode(format!("Invalid parameter #{} ({}): {}", i + 1, param.ty, e))
            })
        })
        .collect()
}

/// Address argument helper.
pub fn address_arg(address: Address) -> DynSolValue {
    DynSolValue::Address(address)
}

/// `uint256` argument helper.
pub fn uint_arg<T>(value: T) -> DynSolValue
where
    U256: UintTryFrom<T>,
{
    DynSolValue::Uint(U256::from(value), 256)
}

/// Whether every integer inside `value` fits the bit width it is tagged with.
fn fits_width(value: &DynSolValue) -> bool {
    match value {
        DynSolValue::Uint(n, bits) => n.bit_len() <= *bits,
        DynSolValue::Int(n, bits) => {
            // For negative n, !raw is -n - 1.
            let raw = n.into_raw();
            let magnitude = if n.is_negative() { !raw } else { raw };
            magnitude.bit_len() < *bits
        }
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) | DynSolValue::Tuple(items) => {
            items.iter().all(fits_width)
        }
        _ => true,
    }
}

fn decode_topic(ty: &DynSolType, topic: B256) -> Result<DynSolValue> {
    // Reference-typed indexed values are stored as the hash of their encoding.
    if matches!(
        ty,
        DynSolType::String | DynSolType::Bytes | DynSolType::Array(_) | DynSolType::FixedArray(..)
    ) {
        return Ok(DynSolValue::FixedBytes(topic, 32));
    }
    let value = ty
        .abi_decode(topic.as_slice())
        .map_err(|e| ClientError::Decode(format!("topic as {}: {}", ty, e)))?;
    if !fits_width(&value) {
        return Err(ClientError::Decode(format!("topic overflows {}", ty)));
    }
    Ok(value)
}

fn parse_type(signature: &str, text: &str) -> Result<DynSolType> {
    let ty = DynSolType::parse(text)
        .map_err(|e| ClientError::signature(signature, format!("bad type '{}': {}", text, e)))?;
    if !is_supported(&ty) {
        return Err(ClientError::signature(
            signature,
            format!("type '{}' is outside the supported grammar", text),
        ));
    }
    Ok(ty)
}

fn is_supported(ty: &DynSolType) -> bool {
    match ty {
        DynSolType::Address
        | DynSolType::Bool
        | DynSolType::Int(_)
        | DynSolType::Uint(_)
        | DynSolType::FixedBytes(_)
        | DynSolType::Bytes
        | DynSolType::String => true,
        DynSolType::Array(inner) => is_supported(inner),
        DynSolType::Tuple(items) => items.iter().all(is_supported),
        _ => false,
    }
}

fn matching_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, c) in text.char_indices().skip_while(|(i, _)| *i < open) {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn split_top_level(list: &str) -> Vec<&str> {
    if list.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&list[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&list[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{address, Bytes};
    use serde_json::json;

    fn log(topics: Vec<B256>, data: Vec<u8>) -> LogEntry {
        LogEntry {
            address: Address::ZERO,
            topics,
            data: Bytes::from(data),
            block_number: None,
            transaction_hash: None,
            log_index: None,
        }
    }

    fn topic_of(value: &DynSolValue) -> B256 {
        B256::from_slice(&value.abi_encode())
    }

    #[test]
    fn test_parse_signature_parts() {
        let sig = MethodSignature::parse("balanceOf(address)uint256").unwrap();
        assert_eq!(sig.name(), "balanceOf");
        assert_eq!(sig.canonical(), "balanceOf(address)");
        assert_eq!(sig.params().len(), 1);
        assert_eq!(sig.return_type(), Some(&DynSolType::Uint(256)));
        assert!(!sig.is_event());

        let event = MethodSignature::parse("event:SignedForAffirmation(i:address,bytes32)").unwrap();
        assert!(event.is_event());
        assert!(event.params()[0].indexed);
        assert!(!event.params()[1].indexed);
        assert_eq!(event.canonical(), "SignedForAffirmation(address,bytes32)");
        assert_eq!(event.return_type(), None);
    }

    #[test]
    fn test_parse_normalizes_whitespace_and_tuple_return() {
        let sig = MethodSignature::parse(" getFundingRules ( ) (uint256, uint256) ").unwrap();
        assert_eq!(sig.canonical(), "getFundingRules()");
        assert_eq!(
            sig.return_type(),
            Some(&DynSolType::Tuple(vec![DynSolType::Uint(256), DynSolType::Uint(256)]))
        );
        assert_eq!(sig.to_string(), "getFundingRules()(uint256,uint256)");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(MethodSignature::parse("noParens").is_err());
        assert!(MethodSignature::parse("f(uint256").is_err());
        assert!(MethodSignature::parse("f(notatype)").is_err());
        assert!(MethodSignature::parse("1f()").is_err());
        assert!(MethodSignature::parse("event:E(uint256)bool").is_err());
        assert!(MethodSignature::parse("f(uint256[2])").is_err());
    }

    #[test]
    fn test_transfer_encoding_layout() {
        let to = address!("0000000000000000000000000000000000000abc");
        let data = encode("transfer(address,uint256)", &[address_arg(to), uint_arg(100u64)]).unwrap();

        assert_eq!(data.len(), 4 + 32 + 32);
        assert_eq!(&data[..4], &keccak256(b"transfer(address,uint256)")[..4]);
        assert_eq!(&data[..4], &[0xa9, 0x05, 0x9c, 0xbb]);
        assert_eq!(&data[4..16], &[0u8; 12]);
        assert_eq!(&data[16..36], to.as_slice());
        assert_eq!(&data[36..67], &[0u8; 31]);
        assert_eq!(data[67], 100);
    }

    #[test]
    fn test_encode_without_params_is_selector_only() {
        let data = encode("totalSupply()uint256", &[]).unwrap();
        assert_eq!(data, vec![0x18, 0x16, 0x0d, 0xdd]);
    }

    #[test]
    fn test_encode_rejects_wrong_arity_and_type() {
        let sig = MethodSignature::parse("transfer(address,uint256)").unwrap();
        assert!(matches!(
            sig.encode(&[uint_arg(1u64)]),
            Err(ClientError::Encode(_))
        ));
        assert!(matches!(
            sig.encode(&[uint_arg(1u64), uint_arg(2u64)]),
            Err(ClientError::Encode(_))
        ));
    }

    #[test]
    fn test_round_trip_through_return_decoding() {
        let cases: Vec<(&str, DynSolValue)> = vec![
            ("uint256", uint_arg(500u64)),
            ("uint8", DynSolValue::Uint(U256::from(18), 8)),
            ("int64", DynSolValue::Int(I256::try_from(-42i64).unwrap(), 64)),
            ("bool", DynSolValue::Bool(true)),
            (
                "address",
                address_arg(address!("742d35Cc6634C0532925a3b844Bc454e4438f44e")),
            ),
            ("bytes", DynSolValue::Bytes(vec![1, 2, 3, 4, 5])),
            ("bytes32", DynSolValue::FixedBytes(B256::repeat_byte(7), 32)),
            ("string", DynSolValue::String("TT-USDT".to_string())),
            (
                "address[]",
                DynSolValue::Array(vec![
                    address_arg(Address::repeat_byte(1)),
                    address_arg(Address::repeat_byte(2)),
                ]),
            ),
            (
                "string[]",
                DynSolValue::Array(vec![
                    DynSolValue::String("a".into()),
                    DynSolValue::String("bc".into()),
                ]),
            ),
        ];

        for (ty, value) in cases {
            let call = MethodSignature::parse(&format!("echo({}){}", ty, ty)).unwrap();
            let encoded = call.encode(&[value.clone()]).unwrap();
            // The body of a one-argument call is exactly what the method would return.
            let decoded = call.decode_return(&encoded[4..]);
            assert_eq!(decoded, Some(value), "round trip failed for {}", ty);
        }
    }

    #[test]
    fn test_decode_return_absent_on_bad_data() {
        assert_eq!(decode_return("balanceOf(address)uint256", None), None);
        assert_eq!(decode_return("balanceOf(address)uint256", Some(&[][..])), None);
        assert_eq!(decode_return("balanceOf(address)uint256", Some(&[1u8, 2, 3][..])), None);
        // No return type declared.
        assert_eq!(decode_return("approve(address,uint256)", Some(&[0u8; 32][..])), None);
    }

    #[test]
    fn test_decode_return_tuple() {
        let sig = MethodSignature::parse("getFundingRules()(uint256,uint256)").unwrap();
        let body = DynSolValue::Tuple(vec![uint_arg(1u64), uint_arg(2u64)]).abi_encode_params();
        assert_eq!(
            sig.decode_return(&body),
            Some(DynSolValue::Tuple(vec![uint_arg(1u64), uint_arg(2u64)]))
        );
    }

    #[test]
    fn test_decode_log_interleaves_indexed_and_data() {
        let sig = MethodSignature::parse("Transfer(i:address,i:address,uint256)").unwrap();
        let from = Address::repeat_byte(0x11);
        let to = Address::repeat_byte(0x22);
        let entry = log(
            vec![
                keccak256(b"Transfer(address,address,uint256)"),
                topic_of(&address_arg(from)),
                topic_of(&address_arg(to)),
            ],
            uint_arg(1000u64).abi_encode(),
        );

        let event = sig.decode_log(&entry).unwrap().unwrap();
        assert_eq!(event.name, "Transfer");
        assert_eq!(
            event.values,
            vec![address_arg(from), address_arg(to), uint_arg(1000u64)]
        );
        assert_eq!(
            event.to_string(),
            format!(
                "Transfer({}, {}, 1000)",
                utils::checksum(&from),
                utils::checksum(&to)
            )
        );
    }

    #[test]
    fn test_decode_log_mixed_order_and_bytes_render_as_hex() {
        let sig = MethodSignature::parse("SignedForAffirmation(i:address,bytes32)").unwrap();
        let signer = Address::repeat_byte(0x33);
        let entry = log(
            vec![sig.topic(), topic_of(&address_arg(signer))],
            B256::repeat_byte(0xab).to_vec(),
        );

        let rendered = decode_log("SignedForAffirmation(i:address,bytes32)", &entry)
            .unwrap()
            .to_string();
        assert_eq!(
            rendered,
            format!(
                "SignedForAffirmation({}, 0x{})",
                utils::checksum(&signer),
                "ab".repeat(32)
            )
        );
    }

    #[test]
    fn test_decode_log_indexed_string_renders_topic_hash() {
        let sig = MethodSignature::parse("Deposited(i:address,i:string,uint256,bytes)").unwrap();
        let sender = Address::repeat_byte(0x44);
        let memo_hash = keccak256(b"cross-chain memo");
        let data = DynSolValue::Tuple(vec![
            uint_arg(7u64),
            DynSolValue::Bytes(vec![0xde, 0xad]),
        ])
        .abi_encode_params();
        let entry = log(
            vec![
                keccak256(b"Deposited(address,string,uint256,bytes)"),
                topic_of(&address_arg(sender)),
                memo_hash,
            ],
            data,
        );

        let event = sig.decode_log(&entry).unwrap().unwrap();
        assert_eq!(event.values[1], DynSolValue::FixedBytes(memo_hash, 32));
        assert_eq!(
            event.to_string(),
            format!(
                "Deposited({}, 0x{}, 7, 0xdead)",
                utils::checksum(&sender),
                hex::encode(memo_hash)
            )
        );
    }

    #[test]
    fn test_encode_rejects_values_wider_than_declared() {
        let sig = MethodSignature::parse("set(uint8)uint8").unwrap();
        assert!(matches!(
            sig.encode(&[DynSolValue::Uint(U256::from(300u64), 8)]),
            Err(ClientError::Encode(_))
        ));
        assert!(sig.encode(&[DynSolValue::Uint(U256::from(255u64), 8)]).is_ok());

        let signed = MethodSignature::parse("shift(int8)").unwrap();
        let int = |n: i64| DynSolValue::Int(I256::try_from(n).unwrap(), 8);
        assert!(signed.encode(&[int(127)]).is_ok());
        assert!(signed.encode(&[int(-128)]).is_ok());
        assert!(matches!(signed.encode(&[int(128)]), Err(ClientError::Encode(_))));
        assert!(matches!(signed.encode(&[int(-129)]), Err(ClientError::Encode(_))));

        let list = MethodSignature::parse("setAll(uint8[])").unwrap();
        assert!(list
            .encode(&[DynSolValue::Array(vec![DynSolValue::Uint(U256::from(256u64), 8)])])
            .is_err());
    }

    #[test]
    fn test_decode_return_absent_when_word_overflows() {
        let sig = MethodSignature::parse("get()uint8").unwrap();
        let word = uint_arg(300u64).abi_encode();
        assert_eq!(sig.decode_return(&word), None);
        let word = uint_arg(200u64).abi_encode();
        assert_eq!(
            sig.decode_return(&word),
            Some(DynSolValue::Uint(U256::from(200u64), 8))
        );
    }

    #[test]
    fn test_coerce_int_checks_width() {
        let int8 = DynSolType::Int(8);
        assert!(matches!(
            coerce_arg(&int8, &json!(1000)),
            Err(ClientError::Encode(_))
        ));
        assert!(matches!(
            coerce_arg(&int8, &json!("-129")),
            Err(ClientError::Encode(_))
        ));
        assert_eq!(
            coerce_arg(&int8, &json!(-5)).unwrap(),
            DynSolValue::Int(I256::try_from(-5i64).unwrap(), 8)
        );
    }

    #[test]
    fn test_decode_log_absent_on_other_event() {
        let entry = log(vec![keccak256(b"Burn(address,uint256)")], vec![0u8; 64]);
        assert!(decode_log("Transfer(i:address,i:address,uint256)", &entry).is_none());
        assert!(decode_log("Transfer(i:address,i:address,uint256)", &log(vec![], vec![])).is_none());
    }

    #[test]
    fn test_decode_log_without_params() {
        let sig = MethodSignature::parse("event:Paused()").unwrap();
        let event = sig.decode_log(&log(vec![sig.topic()], vec![])).unwrap().unwrap();
        assert_eq!(event.to_string(), "Paused()");
    }

    #[test]
    fn test_decode_logs_skips_failures() {
        let transfer = MethodSignature::parse("Transfer(i:address,i:address,uint256)").unwrap();
        let burn = MethodSignature::parse("Burn(i:address,uint256)").unwrap();

        let good_burn = log(
            vec![burn.topic(), topic_of(&address_arg(Address::repeat_byte(1)))],
            uint_arg(5u64).abi_encode(),
        );
        // Right hash, but the indexed topics are missing.
        let broken_transfer = log(vec![transfer.topic()], uint_arg(5u64).abi_encode());
        let unrelated = log(vec![B256::repeat_byte(9)], vec![]);

        let events = decode_logs(
            &[transfer, burn],
            &[broken_transfer, good_burn, unrelated],
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, "Burn");
    }

    #[test]
    fn test_coerce_args_from_json() {
        let sig = MethodSignature::parse("setFundingRules(uint256,bool,bytes32,address[])").unwrap();
        let args = coerce_args(
            &sig,
            &[
                json!("0x10"),
                json!("true"),
                json!(format!("0x{}", "00".repeat(31) + "01")),
                json!(["0x742d35Cc6634C0532925a3b844Bc454e4438f44e"]),
            ],
        )
        .unwrap();
        assert_eq!(args[0], uint_arg(16u64));
        assert_eq!(args[1], DynSolValue::Bool(true));
        assert!(sig.encode(&args).is_ok());

        assert!(coerce_args(&sig, &[json!(1)]).is_err());
        assert!(coerce_arg(&DynSolType::Uint(8), &json!(256)).is_err());
        assert!(coerce_arg(&DynSolType::FixedBytes(4), &json!("0x0102")).is_err());
    }
}
