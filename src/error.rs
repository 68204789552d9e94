use thiserror::Error;

/// Errors surfaced by the contract client.
///
/// Decode mismatches and failed read calls never show up here: those are
/// reported as `None` by the codec and the dispatcher.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The node could not be reached, even after the retry policy ran out.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The request reached the endpoint but the exchange failed (bad status,
    /// read timeout, unparsable body). Not retried.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The node answered with a JSON-RPC error object.
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Signing or submitting a transaction was rejected.
    #[error("Transaction submission failed: {0}")]
    Submission(String),

    /// The transaction was submitted but no mined receipt showed up in time.
    /// Resubmitting with the same nonce would conflict, so callers should
    /// re-query the hash instead.
    #[error("Transaction {tx_hash} was not mined within {waited_secs}s")]
    ConfirmationTimeout { tx_hash: String, waited_secs: u64 },

    #[error("Malformed method signature '{signature}': {reason}")]
    Signature { signature: String, reason: String },

    #[error("ABI encoding error: {0}")]
    Encode(String),

    #[error("ABI decoding error: {0}")]
    Decode(String),

    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    pub(crate) fn signature(signature: &str, reason: impl Into<String>) -> Self {
        ClientError::Signature {
            signature: signature.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure happened before the request reached the node.
    pub fn is_connection(&self) -> bool {
        matches!(self, ClientError::Connection(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<hex::FromHexError> for ClientError {
    fn from(e: hex::FromHexError) -> Self {
        ClientError::Decode(e.to_string())
    }
}
