//! Scripted node used by the unit tests.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Mutex;

use super::provider::Transport;
use crate::error::{ClientError, Result};

type Handler = dyn Fn(&str, &Value) -> Result<Value> + Send + Sync;

pub struct MockTransport {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, Value)>>,
    pending_failures: Mutex<u32>,
}

impl MockTransport {
    pub fn new(handler: impl Fn(&str, &Value) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            pending_failures: Mutex::new(0),
        }
    }

    /// The next `n` requests fail as if the node refused the connection.
    pub fn fail_next_with_connection_error(&self, n: u32) {
        *self.pending_failures.lock().unwrap() = n;
    }

    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(m, _)| m == method)
            .map(|(_, params)| params.clone())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params.clone()));

        {
            let mut pending = self.pending_failures.lock().unwrap();
            if *pending > 0 {
                *pending -= 1;
                return Err(ClientError::Connection("connection refused".to_string()));
            }
        }

        (self.handler)(method, &params)
    }
}
