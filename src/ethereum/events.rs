use alloy::primitives::{Address, B256};
use alloy::rpc::types::Filter;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use super::abi::MethodSignature;
use super::provider::RpcClient;
use super::{DecodedEvent, LogEntry};
use crate::error::Result;

#[derive(Debug, Clone)]
pub struct WatchSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(120),
        }
    }
}

/// One matching log together with its decoded form.
#[derive(Debug, Clone, Serialize)]
pub struct WatchedEvent {
    pub event: DecodedEvent,
    pub log: LogEntry,
}

/// Polls `eth_getLogs` for events that may only be emitted after the watch
/// has started.
#[derive(Debug, Clone)]
pub struct EventWatcher {
    rpc: RpcClient,
    settings: WatchSettings,
}

impl EventWatcher {
    pub fn new(rpc: RpcClient, settings: WatchSettings) -> Self {
        Self { rpc, settings }
    }

    /// Collects up to `count` logs emitted by `address` that match any of
    /// `signatures`, scanning forward from `from_block`.
    ///
    /// Running out of time is not an error: whatever was found so far is
    /// returned and the caller checks the length. Matches beyond `count` in the
    /// last fetched range are dropped.
    pub async fn watch(
        &self,
        address: Address,
        signatures: &[MethodSignature],
        from_block: u64,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<WatchedEvent>> {
        let mut found = Vec::new();
        if count == 0 || signatures.is_empty() {
            return Ok(found);
        }

        let timeout = timeout.unwrap_or(self.settings.timeout);
        let deadline = Instant::now() + timeout;
        let topics: Vec<B256> = signatures.iter().map(MethodSignature::topic).collect();

        let mut from = from_block;
        let mut to = self.rpc.block_number().await?;
        loop {
            if from <= to {
                let filter = Filter::new()
                    .address(address)
                    .event_signature(topics.clone())
                    .from_block(from)
                    .to_block(to);
                let logs = self.rpc.get_logs(&filter).await?;
                debug!("Blocks {}..={}: {} candidate logs", from, to, logs.len());

                for log in logs {
                    if let Some(event) = first_match(signatures, &log) {
                        info!("Observed {}", event);
                        found.push(WatchedEvent { event, log });
                        if found.len() == count {
                            return Ok(found);
                        }
                    }
                }
                from = to + 1;
            }

            let now = Instant::now();
            if now >= deadline {
                info!(
                    "Watch timed out after {:?} with {}/{} events",
                    timeout,
                    found.len(),
                    count
                );
                return Ok(found);
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;
            to = self.rpc.block_number().await?;
        }
    }
}

fn first_match(signatures: &[MethodSignature], log: &LogEntry) -> Option<DecodedEvent> {
    signatures.iter().find_map(|signature| {
        signature.decode_log(log).unwrap_or_else(|e| {
            debug!("Skipping log for {}: {}", signature, e);
            None
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ethereum::mock::MockTransport;
    use crate::ethereum::provider::RetryPolicy;
    use alloy::dyn_abi::DynSolValue;
    use alloy::primitives::U256;
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const TRANSFER: &str = "event:Transfer(i:address,i:address,uint256)";

    fn transfer_log(contract: Address, from: Address, to: Address, amount: u64, block: u64) -> Value {
        let signature = MethodSignature::parse(TRANSFER).unwrap();
        json!({
            "address": contract,
            "topics": [signature.topic(), from.into_word(), to.into_word()],
            "data": format!("0x{}", hex::encode(U256::from(amount).to_be_bytes::<32>())),
            "blockNumber": format!("0x{:x}", block),
        })
    }

    fn fast_watcher(mock: &Arc<MockTransport>) -> EventWatcher {
        EventWatcher::new(
            RpcClient::new(mock.clone(), RetryPolicy::none()),
            WatchSettings {
                poll_interval: Duration::from_millis(5),
                timeout: Duration::from_secs(5),
            },
        )
    }

    #[tokio::test]
    async fn test_expired_watch_returns_empty() {
        let mock = Arc::new(MockTransport::new(|method, _| match method {
            "eth_blockNumber" => Ok(json!("0x10")),
            _ => Ok(json!([])),
        }));
        let signatures = vec![MethodSignature::parse(TRANSFER).unwrap()];

        let started = Instant::now();
        let events = fast_watcher(&mock)
            .watch(
                Address::repeat_byte(1),
                &signatures,
                16,
                1,
                Some(Duration::from_millis(40)),
            )
            .await
            .unwrap();

        assert!(events.is_empty());
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert!(mock.count("eth_getLogs") >= 1);
    }

    #[tokio::test]
    async fn test_events_emitted_after_start_are_found() {
        let contract = Address::repeat_byte(0xcc);
        let head = Arc::new(Mutex::new(10u64));
        let head_in = head.clone();

        let mock = Arc::new(MockTransport::new(move |method, params| match method {
            "eth_blockNumber" => {
                let mut head = head_in.lock().unwrap();
                let current = *head;
                *head += 2;
                Ok(json!(format!("0x{:x}", current)))
            }
            "eth_getLogs" => {
                // Nothing until the range reaches block 12.
                if params[0]["toBlock"] == json!("0xc") {
                    Ok(json!([transfer_log(
                        contract,
                        Address::repeat_byte(1),
                        Address::repeat_byte(2),
                        75,
                        12
                    )]))
                } else {
                    Ok(json!([]))
                }
            }
            other => panic!("unexpected call {}", other),
        }));
        let signatures = vec![MethodSignature::parse(TRANSFER).unwrap()];

        let events = fast_watcher(&mock)
            .watch(contract, &signatures, 8, 1, None)
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.name, "Transfer");
        assert_eq!(events[0].event.values[2], DynSolValue::Uint(U256::from(75), 256));

        let ranges: Vec<(Value, Value)> = mock
            .calls()
            .into_iter()
            .filter(|(m, _)| m == "eth_getLogs")
            .map(|(_, p)| (p[0]["fromBlock"].clone(), p[0]["toBlock"].clone()))
            .collect();
        assert_eq!(
            ranges,
            vec![(json!("0x8"), json!("0xa")), (json!("0xb"), json!("0xc"))]
        );
    }

    #[tokio::test]
    async fn test_results_truncated_to_count_and_foreign_logs_skipped() {
        let contract = Address::repeat_byte(0xcc);
        let mock = Arc::new(MockTransport::new(move |method, _| match method {
            "eth_blockNumber" => Ok(json!("0x20")),
            _ => {
                let mut unrelated = transfer_log(contract, Address::ZERO, Address::ZERO, 1, 30);
                unrelated["topics"][0] = json!(B256::repeat_byte(0xee));
                Ok(json!([
                    unrelated,
                    transfer_log(contract, Address::repeat_byte(1), Address::repeat_byte(2), 1, 30),
                    transfer_log(contract, Address::repeat_byte(1), Address::repeat_byte(2), 2, 31),
                    transfer_log(contract, Address::repeat_byte(1), Address::repeat_byte(2), 3, 32),
                ]))
            }
        }));
        let signatures = vec![
            MethodSignature::parse("event:Approval(i:address,i:address,uint256)").unwrap(),
            MethodSignature::parse(TRANSFER).unwrap(),
        ];

        let events = fast_watcher(&mock)
            .watch(contract, &signatures, 30, 2, None)
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].event.values[2], DynSolValue::Uint(U256::from(2), 256));
        assert_eq!(mock.count("eth_getLogs"), 1);

        let topic0 = &mock.last_params("eth_getLogs").unwrap()[0]["topics"][0];
        assert_eq!(topic0.as_array().map(Vec::len), Some(2));
    }

    #[tokio::test]
    async fn test_zero_count_does_not_poll() {
        let mock = Arc::new(MockTransport::new(|_, _| Ok(Value::Null)));
        let signatures = vec![MethodSignature::parse(TRANSFER).unwrap()];
        let events = fast_watcher(&mock)
            .watch(Address::ZERO, &signatures, 0, 0, None)
            .await
            .unwrap();
        assert!(events.is_empty());
        assert!(mock.calls().is_empty());
    }
}
