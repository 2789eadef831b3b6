//! Error types for the subscription pipeline.

use thiserror::Error;

use crate::state::SubscriberState;
use crate::types::Category;

/// Errors raised while establishing or managing a subscription.
///
/// All of these are setup-tier errors. Runtime conditions (a closed stream,
/// an event that fails validation) are reported through
/// [`Report`](crate::report::Report) instead.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("Event source rejected {category} registration: {reason}")]
    Rejected { category: Category, reason: String },

    #[error("Invalid event filter pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Event source unavailable: {0}")]
    TransportUnavailable(String),

    #[error("Ledger query failed: {0}")]
    Query(String),

    #[error("Cannot {operation} while subscriber is {state}")]
    InvalidState {
        state: SubscriberState,
        operation: &'static str,
    },

    #[error("{0}")]
    Other(String),
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

impl SubscriptionError {
    /// Returns `true` if the error came from the transport rather than from
    /// the request itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::TransportUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let err = SubscriptionError::Rejected {
            category: Category::Chaincode,
            reason: "unknown chaincode 'nope'".into(),
        };
        assert_eq!(
            err.to_string(),
            "Event source rejected chaincode registration: unknown chaincode 'nope'"
        );
    }

    #[test]
    fn transport_classification() {
        assert!(SubscriptionError::TransportUnavailable("down".into()).is_transport());
        assert!(!SubscriptionError::Query("bad".into()).is_transport());
    }
}
