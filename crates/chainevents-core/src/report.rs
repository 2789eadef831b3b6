//! Reports emitted by listeners for every event and lifecycle change.

use crate::listener::ListenerExit;
use crate::registration::RegistrationId;
use crate::types::Category;
use crate::validate::SkipReason;

/// One line of listener output. Consumers receive these on the channel
/// returned by [`EventSubscriber::new`](crate::subscriber::EventSubscriber::new).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    /// A block event carrying a block.
    BlockReceived { number: u64, source_url: String },
    /// A block event that was skipped.
    BlockSkipped { reason: SkipReason },
    /// A chaincode event that passed validation.
    ChaincodeAccepted {
        chaincode_id: String,
        event_name: String,
        tx_id: String,
        block_number: u64,
    },
    /// A chaincode event that failed validation.
    ChaincodeSkipped { reason: SkipReason },
    /// The stream for a registration closed; `attempt` counts consecutive closures.
    StreamClosed {
        registration: RegistrationId,
        category: Category,
        attempt: u32,
    },
    /// A listener has exited.
    ListenerStopped {
        registration: RegistrationId,
        category: Category,
        exit: ListenerExit,
    },
}

impl Report {
    /// Returns `true` for per-event reports (as opposed to lifecycle reports).
    pub fn is_event(&self) -> bool {
        matches!(
            self,
            Self::BlockReceived { .. }
                | Self::BlockSkipped { .. }
                | Self::ChaincodeAccepted { .. }
                | Self::ChaincodeSkipped { .. }
        )
    }
}

impl std::fmt::Display for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockReceived { number, .. } => write!(f, "New block created, number {number}"),
            Self::BlockSkipped { reason } => write!(f, "Skipped block event: {reason}"),
            Self::ChaincodeAccepted {
                chaincode_id,
                event_name,
                block_number,
                ..
            } => write!(
                f,
                "Accepted chaincode event '{event_name}' from {chaincode_id} at block {block_number}"
            ),
            Self::ChaincodeSkipped { reason } => write!(f, "Skipped chaincode event: {reason}"),
            Self::StreamClosed {
                registration,
                category,
                attempt,
            } => write!(f, "{category} stream closed for {registration} (attempt {attempt})"),
            Self::ListenerStopped {
                registration,
                category,
                exit,
            } => write!(f, "{category} listener for {registration} stopped: {exit}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_report_mentions_number() {
        let r = Report::BlockReceived {
            number: 42,
            source_url: "grpcs://peer0:7051".into(),
        };
        assert!(r.is_event());
        assert_eq!(r.to_string(), "New block created, number 42");
    }

    #[test]
    fn lifecycle_reports_are_not_events() {
        let r = Report::StreamClosed {
            registration: RegistrationId(1),
            category: Category::Block,
            attempt: 2,
        };
        assert!(!r.is_event());
        assert_eq!(r.to_string(), "block stream closed for reg-1 (attempt 2)");
    }
}
