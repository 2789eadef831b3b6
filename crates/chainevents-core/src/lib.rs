//! chainevents-core — foundation for the Fabric block/chaincode event subscriber.
//!
//! # Architecture
//!
//! ```text
//! EventSubscriber ──register()──► EventSource (memory / WebSocket gateway)
//!       │                               │
//!       │ RegistrationGuard             │ EventStream per registration
//!       ▼                               ▼
//!   shutdown (watch) ──────────► Listener task (one per category)
//!                                       ├── Processor::Block     (payload check)
//!                                       └── Processor::Chaincode (ID / payload / URL / height)
//!                                               │
//!                                               ▼
//!                                   mpsc::UnboundedSender<Report>
//! ```

pub mod config;
pub mod error;
pub mod listener;
pub mod memory;
pub mod registration;
pub mod report;
pub mod source;
pub mod state;
pub mod subscriber;
pub mod types;
pub mod validate;

pub use config::{NetworkConfig, SubscriberConfig};
pub use error::{ConfigError, SubscriptionError};
pub use listener::{CounterSnapshot, ListenerExit};
pub use memory::MemoryEventSource;
pub use registration::{Registration, RegistrationGuard, RegistrationId};
pub use report::Report;
pub use source::{EventSource, EventStream};
pub use state::SubscriberState;
pub use subscriber::{EventSubscriber, ShutdownHandle, ShutdownSummary, SubscriberMetrics};
pub use types::{
    Block, BlockEvent, BlockHeader, BlockchainInfo, Category, ChaincodeEvent, Event, EventFilter,
};
pub use validate::{ChaincodeValidator, SkipReason, Verdict};
