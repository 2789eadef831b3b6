//! JSON-RPC 2.0 framing used by the event gateway.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METHOD_QUERY_INFO: &str = "fabric_queryInfo";
pub const METHOD_SUBSCRIBE: &str = "fabric_subscribe";
pub const METHOD_UNSUBSCRIBE: &str = "fabric_unsubscribe";
pub const METHOD_NOTIFICATION: &str = "fabric_subscription";

/// A JSON-RPC 2.0 request. Only numeric IDs are issued by this client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result value, or the error the gateway returned.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Payload of a `fabric_subscription` notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionParams {
    pub subscription: String,
    pub result: Value,
}

/// A message received from the gateway, classified.
#[derive(Debug)]
pub enum Incoming {
    Response(JsonRpcResponse),
    Notification(SubscriptionParams),
}

/// Classify a text frame. Returns `None` for anything unrecognised.
pub fn classify(text: &str) -> Option<Incoming> {
    let value: Value = serde_json::from_str(text).ok()?;

    if value.get("method").and_then(Value::as_str) == Some(METHOD_NOTIFICATION) {
        let params = serde_json::from_value(value.get("params")?.clone()).ok()?;
        return Some(Incoming::Notification(params));
    }

    if value.get("id").is_some() {
        return serde_json::from_value(value).ok().map(Incoming::Response);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest::new(3, METHOD_QUERY_INFO, vec![Value::from("mychannel")]);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"fabric_queryInfo\""));
        assert!(json.contains("\"id\":3"));
    }

    #[test]
    fn classify_response_and_error() {
        match classify(r#"{"jsonrpc":"2.0","id":1,"result":"sub-1"}"#) {
            Some(Incoming::Response(r)) => {
                assert_eq!(r.id, Some(1));
                assert_eq!(r.into_result().unwrap(), Value::from("sub-1"));
            }
            other => panic!("unexpected {other:?}"),
        }

        match classify(r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"denied"}}"#) {
            Some(Incoming::Response(r)) => {
                assert_eq!(r.into_result().unwrap_err().message, "denied");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn classify_notification() {
        let text = r#"{"jsonrpc":"2.0","method":"fabric_subscription",
            "params":{"subscription":"sub-7","result":{"chaincodeId":"mycc","blockNumber":5}}}"#;
        match classify(text) {
            Some(Incoming::Notification(p)) => {
                assert_eq!(p.subscription, "sub-7");
                assert_eq!(p.result["blockNumber"], 5);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn classify_ignores_garbage() {
        assert!(classify("not json").is_none());
        assert!(classify(r#"{"jsonrpc":"2.0","method":"something_else"}"#).is_none());
    }
}
