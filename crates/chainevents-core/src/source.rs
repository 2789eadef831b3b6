//! `EventSource` trait: abstraction over the upstream event service.
//!
//! A source hands out one [`Registration`] plus one [`EventStream`] per
//! `register` call. The subscriber shares a single source across all of its
//! listeners, so implementations must be `Send + Sync`.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

use crate::error::SubscriptionError;
use crate::registration::Registration;
use crate::types::{BlockchainInfo, Event, EventFilter};

/// A stream of events for a single registration. `None` means the source
/// closed the stream.
pub type EventStream = Pin<Box<dyn Stream<Item = Event> + Send>>;

/// Abstracts over event service backends.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Identifier of the upstream endpoint, for logging.
    fn url(&self) -> &str;

    /// Register interest in the events selected by `filter`.
    async fn register(
        &self,
        filter: &EventFilter,
    ) -> Result<(Registration, EventStream), SubscriptionError>;

    /// Stop delivery for `registration` and free its upstream resources.
    /// Unknown registrations are ignored.
    fn unregister(&self, registration: Registration);

    /// Query ledger metadata for the channel.
    async fn query_info(&self) -> Result<BlockchainInfo, SubscriptionError>;
}
