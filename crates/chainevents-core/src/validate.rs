//! Category-specific checks applied to every delivered event.

use serde::{Deserialize, Serialize};

use crate::types::{BlockEvent, Category, ChaincodeEvent};

/// Why an event was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Block event without a block.
    MissingBlock,
    /// Chaincode event from a chaincode other than the subscribed one.
    ChaincodeMismatch { expected: String, actual: String },
    /// Chaincode event carried a payload; filtered delivery was expected.
    UnexpectedPayload { len: usize },
    /// Chaincode event without a source URL.
    MissingSourceUrl,
    /// Chaincode event at block 0.
    ZeroBlockNumber,
    /// The stream delivered an event of the other category.
    UnexpectedCategory { expected: Category, actual: Category },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingBlock => write!(f, "event carries no block"),
            Self::ChaincodeMismatch { expected, actual } => write!(
                f,
                "expected event for chaincode '{expected}' but got '{actual}'"
            ),
            Self::UnexpectedPayload { len } => {
                write!(f, "expected no payload for filtered event but got {len} bytes")
            }
            Self::MissingSourceUrl => write!(f, "event has no source URL"),
            Self::ZeroBlockNumber => write!(f, "event has block number 0"),
            Self::UnexpectedCategory { expected, actual } => {
                write!(f, "expected {expected} event but got {actual} event")
            }
        }
    }
}

/// Outcome of validating one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted { block_number: u64 },
    Skipped(SkipReason),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// A block event is accepted iff it carries a block; the reported number is
/// the header's.
pub fn check_block(event: &BlockEvent) -> Verdict {
    match event.block_number() {
        Some(block_number) => Verdict::Accepted { block_number },
        None => Verdict::Skipped(SkipReason::MissingBlock),
    }
}

/// Validates chaincode events against the subscribed chaincode ID.
#[derive(Debug, Clone)]
pub struct ChaincodeValidator {
    chaincode_id: String,
}

impl ChaincodeValidator {
    pub fn new(chaincode_id: impl Into<String>) -> Self {
        Self {
            chaincode_id: chaincode_id.into(),
        }
    }

    pub fn chaincode_id(&self) -> &str {
        &self.chaincode_id
    }

    /// Runs the checks in order; the first failure decides the skip reason.
    pub fn check(&self, event: &ChaincodeEvent) -> Verdict {
        if event.chaincode_id != self.chaincode_id {
            return Verdict::Skipped(SkipReason::ChaincodeMismatch {
                expected: self.chaincode_id.clone(),
                actual: event.chaincode_id.clone(),
            });
        }
        if let Some(payload) = &event.payload {
            return Verdict::Skipped(SkipReason::UnexpectedPayload { len: payload.len() });
        }
        if event.source_url.is_empty() {
            return Verdict::Skipped(SkipReason::MissingSourceUrl);
        }
        if event.block_number == 0 {
            return Verdict::Skipped(SkipReason::ZeroBlockNumber);
        }
        Verdict::Accepted {
            block_number: event.block_number,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn good_event() -> ChaincodeEvent {
        ChaincodeEvent {
            tx_id: "tx1".into(),
            chaincode_id: "mycc".into(),
            event_name: "transfer".into(),
            payload: None,
            block_number: 5,
            source_url: "grpcs://peer0:7051".into(),
        }
    }

    #[test]
    fn block_with_payload_reports_header_number() {
        assert_eq!(
            check_block(&BlockEvent::new(42, "grpcs://peer0:7051")),
            Verdict::Accepted { block_number: 42 }
        );
    }

    #[test]
    fn block_without_payload_is_skipped() {
        assert_eq!(
            check_block(&BlockEvent::default()),
            Verdict::Skipped(SkipReason::MissingBlock)
        );
    }

    #[test]
    fn chaincode_event_accepted() {
        let v = ChaincodeValidator::new("mycc");
        assert_eq!(v.check(&good_event()), Verdict::Accepted { block_number: 5 });
    }

    #[test]
    fn chaincode_mismatch_skipped() {
        let v = ChaincodeValidator::new("mycc");
        let event = ChaincodeEvent {
            chaincode_id: "othercc".into(),
            ..good_event()
        };
        assert_eq!(
            v.check(&event),
            Verdict::Skipped(SkipReason::ChaincodeMismatch {
                expected: "mycc".into(),
                actual: "othercc".into(),
            })
        );
    }

    #[test]
    fn each_check_rejects() {
        let v = ChaincodeValidator::new("mycc");

        let with_payload = ChaincodeEvent {
            payload: Some(vec![1, 2, 3]),
            ..good_event()
        };
        assert_eq!(
            v.check(&with_payload),
            Verdict::Skipped(SkipReason::UnexpectedPayload { len: 3 })
        );

        let no_url = ChaincodeEvent {
            source_url: String::new(),
            ..good_event()
        };
        assert_eq!(v.check(&no_url), Verdict::Skipped(SkipReason::MissingSourceUrl));

        let genesis = ChaincodeEvent {
            block_number: 0,
            ..good_event()
        };
        assert_eq!(v.check(&genesis), Verdict::Skipped(SkipReason::ZeroBlockNumber));
    }

    #[test]
    fn first_failing_check_wins() {
        let v = ChaincodeValidator::new("mycc");
        let everything_wrong = ChaincodeEvent {
            tx_id: String::new(),
            chaincode_id: "othercc".into(),
            event_name: String::new(),
            payload: Some(vec![0]),
            block_number: 0,
            source_url: String::new(),
        };
        assert!(matches!(
            v.check(&everything_wrong),
            Verdict::Skipped(SkipReason::ChaincodeMismatch { .. })
        ));

        let payload_and_no_url = ChaincodeEvent {
            payload: Some(vec![]),
            source_url: String::new(),
            ..good_event()
        };
        assert_eq!(
            v.check(&payload_and_no_url),
            Verdict::Skipped(SkipReason::UnexpectedPayload { len: 0 })
        );
    }
}
