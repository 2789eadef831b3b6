//! Transport-level error types.

use chainevents_core::{Category, SubscriptionError};
use thiserror::Error;

use crate::rpc::JsonRpcError;

/// Errors raised by the WebSocket event source.
#[derive(Debug, Error)]
pub enum WsSourceError {
    #[error("WebSocket connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    /// The background connection task has stopped.
    #[error("WebSocket connection closed")]
    Closed,

    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// JSON-RPC error returned by the gateway.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// A response whose result does not have the expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl WsSourceError {
    /// Returns `true` if the connection itself is the problem.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Closed | Self::Timeout { .. })
    }

    /// Map an error from a `fabric_subscribe` call.
    pub fn into_registration_error(self, category: Category) -> SubscriptionError {
        match self {
            Self::Rpc(e) => SubscriptionError::Rejected {
                category,
                reason: e.message,
            },
            Self::InvalidResponse(reason) => SubscriptionError::Rejected { category, reason },
            e if e.is_transport() => SubscriptionError::TransportUnavailable(e.to_string()),
            e => SubscriptionError::Other(e.to_string()),
        }
    }

    /// Map an error from a `fabric_queryInfo` call.
    pub fn into_query_error(self) -> SubscriptionError {
        if self.is_transport() {
            SubscriptionError::TransportUnavailable(self.to_string())
        } else {
            SubscriptionError::Query(self.to_string())
        }
    }
}

impl From<WsSourceError> for SubscriptionError {
    fn from(e: WsSourceError) -> Self {
        if e.is_transport() {
            SubscriptionError::TransportUnavailable(e.to_string())
        } else {
            SubscriptionError::Other(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_on_subscribe_is_rejection() {
        let err = WsSourceError::Rpc(JsonRpcError {
            code: -32602,
            message: "chaincode 'nope' not instantiated".into(),
            data: None,
        });
        match err.into_registration_error(Category::Chaincode) {
            SubscriptionError::Rejected { category, reason } => {
                assert_eq!(category, Category::Chaincode);
                assert!(reason.contains("nope"));
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[test]
    fn transport_errors_map_to_unavailable() {
        assert!(WsSourceError::Closed.into_query_error().is_transport());
        assert!(SubscriptionError::from(WsSourceError::Timeout { ms: 10 }).is_transport());
        assert!(matches!(
            WsSourceError::InvalidEvent("x".into()).into_query_error(),
            SubscriptionError::Query(_)
        ));
    }
}
