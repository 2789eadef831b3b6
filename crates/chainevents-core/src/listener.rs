//! The per-category consumption loop.
//!
//! Each listener owns one stream exclusively and runs on its own Tokio task:
//!
//! 1. Check the shutdown signal (every iteration, not only while waiting).
//! 2. Race the next stream item against the shutdown signal.
//! 3. Item → validate → [`Report`] + log.
//! 4. Closed stream → report, back off, try again; give up after
//!    `max_closed_retries` consecutive closures.
//! 5. Shutdown → drain whatever is already buffered, then exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::Fuse;
use futures::{FutureExt, StreamExt};
use tokio::sync::{mpsc, watch};

use crate::registration::RegistrationId;
use crate::report::Report;
use crate::source::EventStream;
use crate::types::{Category, Event};
use crate::validate::{check_block, ChaincodeValidator, SkipReason, Verdict};

/// Why a listener stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerExit {
    /// The shutdown signal was raised.
    Shutdown,
    /// The stream stayed closed for more than the allowed number of retries.
    StreamClosed { attempts: u32 },
    /// The listener did not finish within the grace period and was aborted.
    Aborted,
}

impl std::fmt::Display for ListenerExit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shutdown => write!(f, "shutdown"),
            Self::StreamClosed { attempts } => {
                write!(f, "stream closed after {attempts} attempts")
            }
            Self::Aborted => write!(f, "aborted after grace period"),
        }
    }
}

/// Per-listener counters. Only the owning listener writes them.
#[derive(Debug, Default)]
pub struct ListenerCounters {
    pub received: AtomicU64,
    pub accepted: AtomicU64,
    pub skipped: AtomicU64,
    pub closures: AtomicU64,
}

/// Point-in-time copy of [`ListenerCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub received: u64,
    pub accepted: u64,
    pub skipped: u64,
    pub closures: u64,
}

impl ListenerCounters {
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            accepted: self.accepted.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            closures: self.closures.load(Ordering::Relaxed),
        }
    }
}

/// Category-specific handling applied to each event.
#[derive(Debug, Clone)]
pub enum Processor {
    Block,
    Chaincode(ChaincodeValidator),
}

impl Processor {
    pub fn category(&self) -> Category {
        match self {
            Self::Block => Category::Block,
            Self::Chaincode(_) => Category::Chaincode,
        }
    }

    /// Validate `event` and turn it into a report.
    pub fn process(&self, event: Event) -> Report {
        match (self, event) {
            (Self::Block, Event::Block(block)) => match check_block(&block) {
                Verdict::Accepted { block_number } => Report::BlockReceived {
                    number: block_number,
                    source_url: block.source_url,
                },
                Verdict::Skipped(reason) => Report::BlockSkipped { reason },
            },
            (Self::Chaincode(validator), Event::Chaincode(cc)) => match validator.check(&cc) {
                Verdict::Accepted { block_number } => Report::ChaincodeAccepted {
                    chaincode_id: cc.chaincode_id,
                    event_name: cc.event_name,
                    tx_id: cc.tx_id,
                    block_number,
                },
                Verdict::Skipped(reason) => Report::ChaincodeSkipped { reason },
            },
            (processor, other) => {
                let reason = SkipReason::UnexpectedCategory {
                    expected: processor.category(),
                    actual: other.category(),
                };
                match processor {
                    Self::Block => Report::BlockSkipped { reason },
                    Self::Chaincode(_) => Report::ChaincodeSkipped { reason },
                }
            }
        }
    }
}

/// Settings a listener needs from [`SubscriberConfig`](crate::config::SubscriberConfig).
#[derive(Debug, Clone, Copy)]
pub struct ListenerSettings {
    pub max_closed_retries: u32,
    pub closed_retry_delay: Duration,
}

enum Step {
    Item(Option<Event>),
    Recheck,
    Shutdown,
}

/// One consumption loop bound to one registration.
pub struct Listener {
    registration: RegistrationId,
    processor: Processor,
    stream: Fuse<EventStream>,
    shutdown: watch::Receiver<bool>,
    reports: mpsc::UnboundedSender<Report>,
    counters: Arc<ListenerCounters>,
    settings: ListenerSettings,
}

impl Listener {
    pub fn new(
        registration: RegistrationId,
        processor: Processor,
        stream: EventStream,
        shutdown: watch::Receiver<bool>,
        reports: mpsc::UnboundedSender<Report>,
        settings: ListenerSettings,
    ) -> Self {
        Self {
            registration,
            processor,
            stream: stream.fuse(),
            shutdown,
            reports,
            counters: Arc::new(ListenerCounters::default()),
            settings,
        }
    }

    /// Shared handle to this listener's counters.
    pub fn counters(&self) -> Arc<ListenerCounters> {
        Arc::clone(&self.counters)
    }

    /// Run until shutdown or until the stream is given up on.
    pub async fn run(mut self) -> ListenerExit {
        let category = self.processor.category();
        tracing::info!(registration = %self.registration, %category, "receiving {category} events");

        let mut closed_attempts = 0u32;
        let exit = loop {
            if *self.shutdown.borrow() {
                self.drain_buffered();
                break ListenerExit::Shutdown;
            }

            let step = tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() { Step::Shutdown } else { Step::Recheck }
                }
                item = self.stream.next() => Step::Item(item),
            };

            match step {
                Step::Recheck => continue,
                Step::Shutdown => {
                    self.drain_buffered();
                    break ListenerExit::Shutdown;
                }
                Step::Item(Some(event)) => {
                    closed_attempts = 0;
                    self.handle(event);
                }
                Step::Item(None) => {
                    closed_attempts += 1;
                    self.counters.closures.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        registration = %self.registration,
                        %category,
                        attempt = closed_attempts,
                        "unexpected closed event stream"
                    );
                    self.emit(Report::StreamClosed {
                        registration: self.registration,
                        category,
                        attempt: closed_attempts,
                    });

                    if closed_attempts > self.settings.max_closed_retries {
                        tracing::error!(
                            registration = %self.registration,
                            %category,
                            attempts = closed_attempts,
                            "giving up on closed event stream"
                        );
                        break ListenerExit::StreamClosed {
                            attempts: closed_attempts,
                        };
                    }

                    tokio::select! {
                        biased;
                        _ = self.shutdown.changed() => {}
                        _ = tokio::time::sleep(self.settings.closed_retry_delay) => {}
                    }
                }
            }
        };

        tracing::info!(registration = %self.registration, %category, %exit, "listener stopped");
        self.emit(Report::ListenerStopped {
            registration: self.registration,
            category,
            exit,
        });
        exit
    }

    /// Process items that are already buffered without waiting for more.
    fn drain_buffered(&mut self) {
        let mut drained = 0usize;
        while let Some(Some(event)) = self.stream.next().now_or_never() {
            self.handle(event);
            drained += 1;
        }
        if drained > 0 {
            tracing::debug!(registration = %self.registration, drained, "drained buffered events");
        }
    }

    fn handle(&mut self, event: Event) {
        self.counters.received.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(registration = %self.registration, ?event, "received event");

        let report = self.processor.process(event);
        match &report {
            Report::BlockReceived { number, .. } => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                tracing::info!(number, "New block created");
            }
            Report::ChaincodeAccepted {
                chaincode_id,
                event_name,
                block_number,
                ..
            } => {
                self.counters.accepted.fetch_add(1, Ordering::Relaxed);
                tracing::info!(%chaincode_id, %event_name, block_number, "chaincode event accepted");
            }
            Report::BlockSkipped { reason } | Report::ChaincodeSkipped { reason } => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(registration = %self.registration, %reason, "event skipped");
            }
            _ => {}
        }
        self.emit(report);
    }

    fn emit(&self, report: Report) {
        // Nobody listening is fine; the log line above already went out.
        let _ = self.reports.send(report);
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
