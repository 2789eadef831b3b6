//! Shared types for the event pipeline.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::SubscriptionError;

// ─── Category ─────────────────────────────────────────────────────────────────

/// The kind of event a registration delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// One event per committed block.
    Block,
    /// Events emitted by a chaincode during transaction execution.
    Chaincode,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Block => write!(f, "block"),
            Self::Chaincode => write!(f, "chaincode"),
        }
    }
}

// ─── Blocks ───────────────────────────────────────────────────────────────────

/// Header of a committed block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    /// Block number (height - 1).
    pub number: u64,
    /// Hash of the previous block header (hex).
    #[serde(default)]
    pub previous_hash: String,
    /// Hash of the block data (hex).
    #[serde(default)]
    pub data_hash: String,
}

/// A committed block.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    /// Serialized envelopes, one per transaction.
    #[serde(default)]
    pub data: Vec<Vec<u8>>,
}

/// A block event as delivered by the event source.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockEvent {
    /// The block, or `None` when the source delivered a header-less event.
    #[serde(default)]
    pub block: Option<Block>,
    /// URL of the peer that produced the event.
    #[serde(default)]
    pub source_url: String,
}

impl BlockEvent {
    /// Create a block event for block `number` with an empty data section.
    pub fn new(number: u64, source_url: impl Into<String>) -> Self {
        Self {
            block: Some(Block {
                header: BlockHeader {
                    number,
                    ..Default::default()
                },
                data: vec![],
            }),
            source_url: source_url.into(),
        }
    }

    /// Returns the block number from the header, if a block is present.
    pub fn block_number(&self) -> Option<u64> {
        self.block.as_ref().map(|b| b.header.number)
    }
}

// ─── Chaincode events ─────────────────────────────────────────────────────────

/// A chaincode event as delivered by the event source.
///
/// Filtered delivery carries no payload; `payload` is `Some` only when the
/// source was asked for full blocks.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChaincodeEvent {
    #[serde(default)]
    pub tx_id: String,
    pub chaincode_id: String,
    #[serde(default)]
    pub event_name: String,
    #[serde(default)]
    pub payload: Option<Vec<u8>>,
    pub block_number: u64,
    #[serde(default)]
    pub source_url: String,
}

// ─── Event ────────────────────────────────────────────────────────────────────

/// Any event delivered on an [`EventStream`](crate::source::EventStream).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Block(BlockEvent),
    Chaincode(ChaincodeEvent),
}

impl Event {
    pub fn category(&self) -> Category {
        match self {
            Self::Block(_) => Category::Block,
            Self::Chaincode(_) => Category::Chaincode,
        }
    }
}

// ─── EventFilter ──────────────────────────────────────────────────────────────

/// Selects the category (and, for chaincode events, the emitter) of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventFilter {
    Block,
    Chaincode {
        #[serde(rename = "chaincodeId")]
        chaincode_id: String,
        /// Regular expression matched against the event name.
        #[serde(rename = "eventFilter")]
        event_pattern: String,
    },
}

impl EventFilter {
    /// Filter for chaincode events from `chaincode_id` whose name matches `pattern`.
    pub fn chaincode(chaincode_id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Chaincode {
            chaincode_id: chaincode_id.into(),
            event_pattern: pattern.into(),
        }
    }

    pub fn category(&self) -> Category {
        match self {
            Self::Block => Category::Block,
            Self::Chaincode { .. } => Category::Chaincode,
        }
    }

    /// Check the filter before sending it upstream.
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        match self {
            Self::Block => Ok(()),
            Self::Chaincode {
                chaincode_id,
                event_pattern,
            } => {
                if chaincode_id.trim().is_empty() {
                    return Err(SubscriptionError::Rejected {
                        category: Category::Chaincode,
                        reason: "chaincode ID must not be empty".into(),
                    });
                }
                compile_pattern(event_pattern).map(|_| ())
            }
        }
    }
}

/// Compile an event-name pattern. Matching is unanchored, as on the peer.
pub fn compile_pattern(pattern: &str) -> Result<Regex, SubscriptionError> {
    Regex::new(pattern).map_err(|e| SubscriptionError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

// ─── BlockchainInfo ───────────────────────────────────────────────────────────

/// Ledger metadata returned by the connectivity check at startup.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockchainInfo {
    pub height: u64,
    #[serde(default)]
    pub current_block_hash: String,
    #[serde(default)]
    pub previous_block_hash: String,
}

impl std::fmt::Display for BlockchainInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "height={} current={} previous={}",
            self.height, self.current_block_hash, self.previous_block_hash
        )
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_number_from_header() {
        let event = BlockEvent::new(42, "grpcs://peer0:7051");
        assert_eq!(event.block_number(), Some(42));

        let empty = BlockEvent::default();
        assert_eq!(empty.block_number(), None);
    }

    #[test]
    fn chaincode_filter_validates_pattern() {
        assert!(EventFilter::chaincode("mycc", ".*").validate().is_ok());
        let err = EventFilter::chaincode("mycc", "(unclosed").validate().unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidPattern { .. }));
    }

    #[test]
    fn chaincode_filter_rejects_empty_id() {
        let err = EventFilter::chaincode("  ", ".*").validate().unwrap_err();
        assert!(matches!(err, SubscriptionError::Rejected { .. }));
    }

    #[test]
    fn pattern_matches_substrings_unless_anchored() {
        let re = compile_pattern("transfer").unwrap();
        assert!(re.is_match("transfer"));
        assert!(re.is_match("transferFrom"));
        assert!(!compile_pattern("^transfer$").unwrap().is_match("transferFrom"));
        assert!(compile_pattern(".*").unwrap().is_match(""));
    }

    #[test]
    fn filter_serializes_with_type_tag() {
        let json = serde_yaml::to_string(&EventFilter::chaincode("mycc", ".*")).unwrap();
        assert!(json.contains("type: chaincode"));
        assert!(json.contains("chaincodeId: mycc"));
    }
}
