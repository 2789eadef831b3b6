//! chainevents-ws — WebSocket JSON-RPC event source for a Fabric event gateway.
//!
//! # Protocol
//! - `fabric_queryInfo [channel]` → ledger info
//! - `fabric_subscribe [channel, filter]` → subscription ID
//! - `fabric_unsubscribe [id]`
//! - notifications arrive as `fabric_subscription` with `{subscription, result}`
//!
//! The connection is not re-established after a disconnect: every open
//! stream ends and the subscriber decides what to do about it.

pub mod client;
pub mod error;
pub mod rpc;
pub mod subscriptions;
pub mod wire;

pub use client::{WsEventSource, WsSourceConfig};
pub use error::WsSourceError;
pub use subscriptions::SubscriptionManager;
