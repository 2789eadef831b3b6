//! `EventSubscriber`: owns registrations and runs one listener per category.
//!
//! # Lifecycle
//!
//! ```text
//! Unsubscribed ──subscribe()──► Subscribed ──shutdown()──► Draining ──► Closed
//! ```
//!
//! Shutdown raises the signal, releases every registration exactly once,
//! then waits up to the grace period for listeners to drain before
//! aborting whatever is left.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::config::SubscriberConfig;
use crate::error::SubscriptionError;
use crate::listener::{
    CounterSnapshot, Listener, ListenerCounters, ListenerExit, ListenerSettings, Processor,
};
use crate::registration::{RegistrationGuard, RegistrationId};
use crate::report::Report;
use crate::source::EventSource;
use crate::state::SubscriberState;
use crate::types::{Category, EventFilter};
use crate::validate::ChaincodeValidator;

/// Counters aggregated per category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberMetrics {
    pub block: CounterSnapshot,
    pub chaincode: CounterSnapshot,
}

impl SubscriberMetrics {
    fn add(&mut self, category: Category, c: CounterSnapshot) {
        let slot = match category {
            Category::Block => &mut self.block,
            Category::Chaincode => &mut self.chaincode,
        };
        slot.received += c.received;
        slot.accepted += c.accepted;
        slot.skipped += c.skipped;
        slot.closures += c.closures;
    }
}

/// What happened during shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownSummary {
    /// Registrations released by this shutdown call.
    pub released: usize,
    /// Exit of every listener, in subscription order.
    pub listeners: Vec<(RegistrationId, Category, ListenerExit)>,
    pub metrics: SubscriberMetrics,
}

impl ShutdownSummary {
    /// `true` if every listener stopped because of the shutdown signal.
    pub fn is_clean(&self) -> bool {
        self.listeners
            .iter()
            .all(|(_, _, exit)| *exit == ListenerExit::Shutdown)
    }
}

/// Cloneable trigger for stopping a running subscriber from elsewhere.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    /// Raise the shutdown signal. Idempotent.
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

struct ListenerSlot {
    guard: RegistrationGuard,
    counters: Arc<ListenerCounters>,
    exit: Option<ListenerExit>,
}

/// Subscribes to event categories on a shared [`EventSource`] and consumes
/// each on its own listener task.
pub struct EventSubscriber {
    source: Arc<dyn EventSource>,
    config: SubscriberConfig,
    state: SubscriberState,
    shutdown_tx: Arc<watch::Sender<bool>>,
    reports: mpsc::UnboundedSender<Report>,
    slots: Vec<ListenerSlot>,
    tasks: JoinSet<(RegistrationId, ListenerExit)>,
}

impl EventSubscriber {
    /// Create a subscriber and the channel its listeners report on.
    pub fn new(
        source: Arc<dyn EventSource>,
        config: SubscriberConfig,
    ) -> (Self, mpsc::UnboundedReceiver<Report>) {
        let (reports, rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let subscriber = Self {
            source,
            config,
            state: SubscriberState::Unsubscribed,
            shutdown_tx: Arc::new(shutdown_tx),
            reports,
            slots: vec![],
            tasks: JoinSet::new(),
        };
        (subscriber, rx)
    }

    pub fn state(&self) -> SubscriberState {
        self.state
    }

    pub fn source(&self) -> &Arc<dyn EventSource> {
        &self.source
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: Arc::clone(&self.shutdown_tx),
        }
    }

    /// Number of registrations not yet released.
    pub fn active_registrations(&self) -> usize {
        self.slots.iter().filter(|s| s.guard.is_active()).count()
    }

    /// Snapshot of the per-category counters.
    pub fn metrics(&self) -> SubscriberMetrics {
        let mut metrics = SubscriberMetrics::default();
        for slot in &self.slots {
            metrics.add(slot.guard.category(), slot.counters.snapshot());
        }
        metrics
    }

    /// Register `filter` with the source and start a listener for it.
    pub async fn subscribe(
        &mut self,
        filter: EventFilter,
    ) -> Result<RegistrationId, SubscriptionError> {
        if !self.state.accepts_subscriptions() {
            return Err(SubscriptionError::InvalidState {
                state: self.state,
                operation: "subscribe",
            });
        }
        filter.validate()?;

        let (registration, stream) = self.source.register(&filter).await?;
        let id = registration.id();
        let category = registration.category();
        let guard = RegistrationGuard::new(Arc::clone(&self.source), registration);

        let processor = match &filter {
            EventFilter::Block => Processor::Block,
            EventFilter::Chaincode { chaincode_id, .. } => {
                Processor::Chaincode(ChaincodeValidator::new(chaincode_id.clone()))
            }
        };
        let listener = Listener::new(
            id,
            processor,
            stream,
            self.shutdown_tx.subscribe(),
            self.reports.clone(),
            ListenerSettings {
                max_closed_retries: self.config.max_closed_retries,
                closed_retry_delay: self.config.closed_retry_delay(),
            },
        );
        let counters = listener.counters();
        self.tasks.spawn(async move { (id, listener.run().await) });
        self.slots.push(ListenerSlot {
            guard,
            counters,
            exit: None,
        });

        self.transition(SubscriberState::Subscribed);
        tracing::info!(%id, %category, source = self.source.url(), "subscribed");
        Ok(id)
    }

    /// Run until `stop` completes, the shutdown handle fires, or every
    /// listener has exited on its own; then shut down.
    pub async fn run_until<F>(&mut self, stop: F) -> ShutdownSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(stop);
        let mut signal = self.shutdown_tx.subscribe();

        while !*signal.borrow_and_update() {
            tokio::select! {
                _ = &mut stop => {
                    tracing::info!("stop requested");
                    break;
                }
                _ = signal.changed() => {}
                joined = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Some(joined) = joined {
                        self.record(joined);
                    }
                    if self.tasks.is_empty() {
                        tracing::warn!("all listeners exited before shutdown");
                        break;
                    }
                }
            }
        }

        self.shutdown().await
    }

    /// Release every registration and wait for listeners to finish.
    /// Calling it again after `Closed` returns an empty summary.
    pub async fn shutdown(&mut self) -> ShutdownSummary {
        match self.state {
            SubscriberState::Closed => return ShutdownSummary::default(),
            SubscriberState::Unsubscribed => {
                self.shutdown_tx.send_replace(true);
                self.transition(SubscriberState::Closed);
                return ShutdownSummary::default();
            }
            SubscriberState::Subscribed => self.transition(SubscriberState::Draining),
            SubscriberState::Draining => {}
        }

        self.shutdown_tx.send_replace(true);

        let mut released = 0;
        for slot in &mut self.slots {
            if slot.guard.release() {
                released += 1;
            }
        }
        tracing::info!(released, "registrations released, draining listeners");

        let deadline = Instant::now() + self.config.grace_period();
        while !self.tasks.is_empty() {
            match tokio::time::timeout_at(deadline, self.tasks.join_next()).await {
                Ok(Some(joined)) => self.record(joined),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        remaining = self.tasks.len(),
                        grace_ms = self.config.grace_period_ms,
                        "grace period elapsed, aborting listeners"
                    );
                    self.tasks.shutdown().await;
                    break;
                }
            }
        }

        let listeners = self
            .slots
            .iter_mut()
            .map(|slot| {
                let exit = *slot.exit.get_or_insert(ListenerExit::Aborted);
                (slot.guard.id(), slot.guard.category(), exit)
            })
            .collect();
        let summary = ShutdownSummary {
            released,
            listeners,
            metrics: self.metrics(),
        };

        self.transition(SubscriberState::Closed);
        summary
    }

    fn record(
        &mut self,
        joined: Result<(RegistrationId, ListenerExit), tokio::task::JoinError>,
    ) {
        match joined {
            Ok((id, exit)) => {
                if let Some(slot) = self.slots.iter_mut().find(|s| s.guard.id() == id) {
                    slot.exit = Some(exit);
                }
            }
            Err(e) => tracing::error!(error = %e, "listener task failed"),
        }
    }

    fn transition(&mut self, next: SubscriberState) {
        if self.state == next {
            return;
        }
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        tracing::debug!(from = %self.state, to = %next, "subscriber state");
        self.state = next;
    }
}

impl std::fmt::Debug for EventSubscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let exits: HashMap<RegistrationId, Option<ListenerExit>> = self
            .slots
            .iter()
            .map(|s| (s.guard.id(), s.exit))
            .collect();
        f.debug_struct("EventSubscriber")
            .field("source", &self.source.url())
            .field("state", &self.state)
            .field("listeners", &exits)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryEventSource;

    #[tokio::test]
    async fn shutdown_without_subscriptions_closes() {
        let source = Arc::new(MemoryEventSource::new());
        let (mut sub, _rx) = EventSubscriber::new(source, SubscriberConfig::default());
        assert_eq!(sub.state(), SubscriberState::Unsubscribed);

        let summary = sub.shutdown().await;
        assert_eq!(summary, ShutdownSummary::default());
        assert_eq!(sub.state(), SubscriberState::Closed);
    }

    #[tokio::test]
    async fn no_resubscribe_after_close() {
        let source = Arc::new(MemoryEventSource::new());
        let (mut sub, _rx) = EventSubscriber::new(source, SubscriberConfig::default());
        sub.subscribe(EventFilter::Block).await.unwrap();
        sub.shutdown().await;

        let err = sub.subscribe(EventFilter::Block).await.unwrap_err();
        assert!(matches!(
            err,
            SubscriptionError::InvalidState {
                state: SubscriberState::Closed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalid_filter_leaves_state_untouched() {
        let source = Arc::new(MemoryEventSource::new());
        let (mut sub, _rx) = EventSubscriber::new(source.clone(), SubscriberConfig::default());
        let err = sub
            .subscribe(EventFilter::chaincode("mycc", "(("))
            .await
            .unwrap_err();
        assert!(matches!(err, SubscriptionError::InvalidPattern { .. }));
        assert_eq!(sub.state(), SubscriberState::Unsubscribed);
        assert_eq!(source.active_registrations(), 0);
    }

    #[tokio::test]
    async fn second_shutdown_is_noop() {
        let source = Arc::new(MemoryEventSource::new());
        let (mut sub, _rx) = EventSubscriber::new(source.clone(), SubscriberConfig::default());
        sub.subscribe(EventFilter::Block).await.unwrap();

        let first = sub.shutdown().await;
        assert_eq!(first.released, 1);
        let second = sub.shutdown().await;
        assert_eq!(second.released, 0);
        assert_eq!(source.unregister_count(), 1);
    }
}
