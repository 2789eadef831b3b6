//! Gateway event encoding. Field names are camelCase; byte fields are hex
//! with an optional `0x` prefix.

use chainevents_core::{Block, BlockEvent, BlockHeader, Category, ChaincodeEvent, Event};
use serde::Deserialize;
use serde_json::Value;

use crate::error::WsSourceError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHeader {
    number: u64,
    #[serde(default)]
    previous_hash: String,
    #[serde(default)]
    data_hash: String,
}

#[derive(Debug, Deserialize)]
struct WireBlock {
    header: WireHeader,
    #[serde(default)]
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireBlockEvent {
    #[serde(default)]
    block: Option<WireBlock>,
    #[serde(default)]
    source_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChaincodeEvent {
    #[serde(default)]
    tx_id: String,
    chaincode_id: String,
    #[serde(default)]
    event_name: String,
    #[serde(default)]
    payload: Option<String>,
    block_number: u64,
    #[serde(default)]
    source_url: String,
}

fn decode_hex(field: &str, s: &str) -> Result<Vec<u8>, WsSourceError> {
    hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| WsSourceError::InvalidEvent(format!("{field}: {e}")))
}

/// Decode the `result` of a notification for a registration of `category`.
pub fn decode_event(category: Category, result: Value) -> Result<Event, WsSourceError> {
    match category {
        Category::Block => {
            let wire: WireBlockEvent = serde_json::from_value(result)?;
            let block = match wire.block {
                Some(b) => Some(Block {
                    header: BlockHeader {
                        number: b.header.number,
                        previous_hash: b.header.previous_hash,
                        data_hash: b.header.data_hash,
                    },
                    data: b
                        .data
                        .iter()
                        .map(|d| decode_hex("block.data", d))
                        .collect::<Result<_, _>>()?,
                }),
                None => None,
            };
            Ok(Event::Block(BlockEvent {
                block,
                source_url: wire.source_url,
            }))
        }
        Category::Chaincode => {
            let wire: WireChaincodeEvent = serde_json::from_value(result)?;
            let payload = wire
                .payload
                .as_deref()
                .map(|p| decode_hex("payload", p))
                .transpose()?;
            Ok(Event::Chaincode(ChaincodeEvent {
                tx_id: wire.tx_id,
                chaincode_id: wire.chaincode_id,
                event_name: wire.event_name,
                payload,
                block_number: wire.block_number,
                source_url: wire.source_url,
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_block_event() {
        let v = json!({
            "block": {
                "header": {"number": 42, "previousHash": "aa", "dataHash": "bb"},
                "data": ["0x0102", "ff"]
            },
            "sourceUrl": "grpcs://peer0:7051"
        });
        match decode_event(Category::Block, v).unwrap() {
            Event::Block(b) => {
                assert_eq!(b.block_number(), Some(42));
                let block = b.block.unwrap();
                assert_eq!(block.header.previous_hash, "aa");
                assert_eq!(block.data, vec![vec![1, 2], vec![0xff]]);
                assert_eq!(b.source_url, "grpcs://peer0:7051");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_block_event_without_block() {
        let v = json!({"block": null, "sourceUrl": "grpcs://peer0:7051"});
        match decode_event(Category::Block, v).unwrap() {
            Event::Block(b) => assert_eq!(b.block_number(), None),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_filtered_chaincode_event() {
        let v = json!({
            "txId": "tx1",
            "chaincodeId": "mycc",
            "eventName": "transfer",
            "blockNumber": 5,
            "sourceUrl": "grpcs://peer0:7051"
        });
        match decode_event(Category::Chaincode, v).unwrap() {
            Event::Chaincode(c) => {
                assert_eq!(c.chaincode_id, "mycc");
                assert_eq!(c.payload, None);
                assert_eq!(c.block_number, 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn decode_chaincode_payload_hex() {
        let v = json!({"chaincodeId": "mycc", "payload": "0xdead", "blockNumber": 1});
        match decode_event(Category::Chaincode, v).unwrap() {
            Event::Chaincode(c) => assert_eq!(c.payload, Some(vec![0xde, 0xad])),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bad_hex_is_invalid_event() {
        let v = json!({"chaincodeId": "mycc", "payload": "zz", "blockNumber": 1});
        assert!(matches!(
            decode_event(Category::Chaincode, v),
            Err(WsSourceError::InvalidEvent(_))
        ));
    }

    #[test]
    fn missing_required_field_fails() {
        let v = json!({"chaincodeId": "mycc"});
        assert!(matches!(
            decode_event(Category::Chaincode, v),
            Err(WsSourceError::Deserialization(_))
        ));
    }
}
