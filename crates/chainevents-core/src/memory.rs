//! In-memory event source for tests and local demos.
//!
//! Routes published events to matching registrations the way a peer-side
//! event service would, and exposes hooks to simulate upstream failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::channel::mpsc;
use regex::Regex;

use crate::error::SubscriptionError;
use crate::registration::{Registration, RegistrationId};
use crate::source::{EventSource, EventStream};
use crate::types::{
    compile_pattern, BlockEvent, BlockchainInfo, Category, ChaincodeEvent, Event, EventFilter,
};

struct Sink {
    filter: EventFilter,
    pattern: Option<Regex>,
    /// `None` once the stream has been closed from the source side.
    sender: Option<mpsc::UnboundedSender<Event>>,
}

impl Sink {
    fn wants_chaincode(&self, event: &ChaincodeEvent) -> bool {
        match (&self.filter, &self.pattern) {
            (EventFilter::Chaincode { chaincode_id, .. }, Some(pattern)) => {
                *chaincode_id == event.chaincode_id && pattern.is_match(&event.event_name)
            }
            _ => false,
        }
    }

    fn deliver(&self, event: Event) -> bool {
        self.sender
            .as_ref()
            .is_some_and(|tx| tx.unbounded_send(event).is_ok())
    }
}

/// In-memory [`EventSource`].
pub struct MemoryEventSource {
    url: String,
    info: Mutex<BlockchainInfo>,
    available: AtomicBool,
    /// Empty = every chaincode ID is accepted.
    known_chaincodes: Mutex<HashSet<String>>,
    sinks: Mutex<HashMap<RegistrationId, Sink>>,
    next_id: AtomicU64,
    unregistered: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryEventSource {
    pub fn new() -> Self {
        Self {
            url: "memory://local".into(),
            info: Mutex::new(BlockchainInfo::default()),
            available: AtomicBool::new(true),
            known_chaincodes: Mutex::new(HashSet::new()),
            sinks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            unregistered: AtomicU64::new(0),
        }
    }

    /// Set the ledger info returned by `query_info`.
    pub fn with_info(self, info: BlockchainInfo) -> Self {
        *lock(&self.info) = info;
        self
    }

    /// Only accept chaincode registrations for these IDs.
    pub fn with_known_chaincodes(self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        lock(&self.known_chaincodes).extend(ids.into_iter().map(Into::into));
        self
    }

    /// Toggle availability. While unavailable, `register` and `query_info` fail.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    /// Publish a block event to every block registration.
    /// Returns the number of registrations it was delivered to.
    pub fn publish_block(&self, event: BlockEvent) -> usize {
        let sinks = lock(&self.sinks);
        sinks
            .values()
            .filter(|s| matches!(s.filter, EventFilter::Block))
            .filter(|s| s.deliver(Event::Block(event.clone())))
            .count()
    }

    /// Publish a chaincode event to registrations whose chaincode ID and
    /// event-name pattern match.
    pub fn publish_chaincode(&self, event: ChaincodeEvent) -> usize {
        let sinks = lock(&self.sinks);
        sinks
            .values()
            .filter(|s| s.wants_chaincode(&event))
            .filter(|s| s.deliver(Event::Chaincode(event.clone())))
            .count()
    }

    /// Deliver `event` to one registration without any filtering.
    pub fn inject(&self, id: RegistrationId, event: Event) -> bool {
        lock(&self.sinks).get(&id).is_some_and(|s| s.deliver(event))
    }

    /// Close every open stream while keeping the registrations alive.
    pub fn close_streams(&self) {
        for sink in lock(&self.sinks).values_mut() {
            sink.sender = None;
        }
    }

    /// Number of registrations not yet unregistered.
    pub fn active_registrations(&self) -> usize {
        lock(&self.sinks).len()
    }

    /// Number of successful `unregister` calls.
    pub fn unregister_count(&self) -> u64 {
        self.unregistered.load(Ordering::Relaxed)
    }

    fn ensure_available(&self) -> Result<(), SubscriptionError> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(SubscriptionError::TransportUnavailable(format!(
                "{} is not reachable",
                self.url
            )))
        }
    }
}

impl Default for MemoryEventSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSource for MemoryEventSource {
    fn url(&self) -> &str {
        &self.url
    }

    async fn register(
        &self,
        filter: &EventFilter,
    ) -> Result<(Registration, EventStream), SubscriptionError> {
        self.ensure_available()?;
        filter.validate()?;

        let pattern = match filter {
            EventFilter::Block => None,
            EventFilter::Chaincode {
                chaincode_id,
                event_pattern,
            } => {
                let known = lock(&self.known_chaincodes);
                if !known.is_empty() && !known.contains(chaincode_id) {
                    return Err(SubscriptionError::Rejected {
                        category: Category::Chaincode,
                        reason: format!("unknown chaincode '{chaincode_id}'"),
                    });
                }
                Some(compile_pattern(event_pattern)?)
            }
        };

        let id = RegistrationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded();
        lock(&self.sinks).insert(
            id,
            Sink {
                filter: filter.clone(),
                pattern,
                sender: Some(tx),
            },
        );
        tracing::debug!(%id, category = %filter.category(), "memory source registered");

        Ok((Registration::new(id, filter.category()), Box::pin(rx)))
    }

    fn unregister(&self, registration: Registration) {
        if lock(&self.sinks).remove(&registration.id()).is_some() {
            self.unregistered.fetch_add(1, Ordering::Relaxed);
        } else {
            tracing::debug!(id = %registration.id(), "unregister for unknown registration ignored");
        }
    }

    async fn query_info(&self) -> Result<BlockchainInfo, SubscriptionError> {
        self.ensure_available()?;
        Ok(lock(&self.info).clone())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
