//! The intent dispatcher.
//!
//! [`Dispatcher::dispatch`] turns one [`Intent`] into its lifecycle:
//!
//! 1. `Started` is delivered to the store before `dispatch` returns.
//! 2. The transport call runs on a spawned tokio task.
//! 3. Exactly one terminal message (`Succeeded`, `FailedApplication` or
//!    `FailedTransport`) is delivered when the call settles.
//!
//! Runtime failures never surface as errors to the caller; they are terminal
//! messages. A transport that panics or exceeds the configured timeout yields
//! `FailedTransport`.
//!
//! # Exactly One Terminal
//!
//! The spawned task owns an `IntentTicket`. Resolving the ticket consumes it,
//! so a second terminal cannot be expressed. If the task is torn down before
//! resolving (runtime shutdown, abort), dropping the ticket delivers
//! `FailedTransport` instead.

use crate::error::StoreError;
use crate::metrics::IntentMetrics;
use crate::store::Store;
use crate::DispatcherConfig;
use futures::FutureExt;
use serde_json::Value;
use slate_core::{ActionKind, Intent, IntentId, LifecycleMessage, Transport, TransportFailure, TransportRequest};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::Instrument;

/// Interval at which [`Dispatcher::drain`] re-checks the in-flight count
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Dispatches intents against a [`Store`] through an injected [`Transport`]
///
/// Cloning is cheap; clones share the store, transport, id sequence and
/// in-flight counter.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::new(store.clone(), transport);
///
/// let mut handle = dispatcher.dispatch(Intent::get(FETCH_CANDIDATE, "/api/candidates/ZTF21aaa"));
/// // `Started` has already been applied here
/// let terminal = handle.wait().await?;
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    store: Store,
    transport: Arc<dyn Transport>,
    config: DispatcherConfig,
    next_id: Arc<AtomicU64>,
    in_flight: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Create a dispatcher with the default [`DispatcherConfig`]
    #[must_use]
    pub fn new(store: Store, transport: impl Transport + 'static) -> Self {
        Self::with_config(store, transport, DispatcherConfig::default())
    }

    /// Create a dispatcher with an explicit configuration
    #[must_use]
    pub fn with_config(
        store: Store,
        transport: impl Transport + 'static,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            store,
            transport: Arc::new(transport),
            config,
            next_id: Arc::new(AtomicU64::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The store this dispatcher delivers to
    #[must_use]
    pub const fn store(&self) -> &Store {
        &self.store
    }

    /// Intents that have been started but not yet terminated
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Start an intent
    ///
    /// `Started` is delivered synchronously; the transport call and the
    /// terminal message happen on a spawned task. The returned handle can be
    /// awaited for the terminal message or dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn dispatch(&self, intent: Intent) -> DispatchHandle {
        let id = IntentId::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let (kind, method, target, payload) = intent.into_parts();
        let request = TransportRequest::new(method, target, payload);

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        IntentMetrics::record_started(in_flight);
        tracing::debug!(kind = %kind, intent = %id, method = %method, path = %request.path, "Intent started");

        self.store.dispatch_message(LifecycleMessage::Started {
            kind: kind.clone(),
            id,
        });

        let (terminal_tx, terminal_rx) = watch::channel(None);
        let ticket = IntentTicket {
            store: self.store.clone(),
            kind: kind.clone(),
            id,
            terminal: terminal_tx,
            in_flight: Arc::clone(&self.in_flight),
            started_at: Instant::now(),
            resolved: false,
        };

        let span = tracing::info_span!(
            "intent",
            kind = %kind,
            intent = %id,
            method = %method,
            path = %request.path
        );
        let transport = Arc::clone(&self.transport);
        let timeout = self.config.request_timeout;

        tokio::spawn(
            async move {
                let outcome = perform(transport.as_ref(), request, timeout).await;
                ticket.resolve(outcome);
            }
            .instrument(span),
        );

        DispatchHandle {
            id,
            kind,
            terminal: terminal_rx,
        }
    }

    /// Start an intent and wait for its terminal message
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChannelClosed`] if the intent task vanished
    /// without delivering a terminal message.
    pub async fn dispatch_and_wait(&self, intent: Intent) -> Result<LifecycleMessage, StoreError> {
        self.dispatch(intent).wait().await
    }

    /// Wait until no intent is in flight
    ///
    /// Intents dispatched while draining are waited for too.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DrainTimeout`] with the remaining count if
    /// `timeout` elapses first.
    pub async fn drain(&self, timeout: Duration) -> Result<(), StoreError> {
        let start = Instant::now();

        loop {
            let pending = self.in_flight();

            if pending == 0 {
                tracing::debug!("All intents settled");
                return Ok(());
            }

            if start.elapsed() >= timeout {
                tracing::error!(in_flight = pending, "Drain timed out with intents in flight");
                return Err(StoreError::DrainTimeout(pending));
            }

            tracing::trace!(
                in_flight = pending,
                elapsed_ms = start.elapsed().as_millis(),
                "Waiting for intents to settle"
            );

            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

/// Run one transport call, folding panics and timeouts into transport failures
async fn perform(
    transport: &dyn Transport,
    request: TransportRequest,
    timeout: Option<Duration>,
) -> Result<Value, TransportFailure> {
    // Building the future happens inside the guarded block so a panicking
    // `request` implementation is caught as well
    let call = AssertUnwindSafe(async move { transport.request(request).await }).catch_unwind();

    let caught = match timeout {
        Some(limit) => match tokio::time::timeout(limit, call).await {
            Ok(caught) => caught,
            Err(_) => {
                tracing::warn!(timeout_ms = limit.as_millis(), "Transport call timed out");
                return Err(TransportFailure::Transport(format!(
                    "request timed out after {}ms",
                    limit.as_millis()
                )));
            }
        },
        None => call.await,
    };

    caught.unwrap_or_else(|_| {
        tracing::error!("Transport panicked");
        Err(TransportFailure::Transport("transport panicked".to_string()))
    })
}

/// The obligation to deliver one terminal message for an intent
struct IntentTicket {
    store: Store,
    kind: ActionKind,
    id: IntentId,
    terminal: watch::Sender<Option<LifecycleMessage>>,
    in_flight: Arc<AtomicUsize>,
    started_at: Instant,
    resolved: bool,
}

impl IntentTicket {
    fn resolve(mut self, outcome: Result<Value, TransportFailure>) {
        let kind = self.kind.clone();
        let id = self.id;

        let message = match outcome {
            Ok(data) => LifecycleMessage::Succeeded { kind, id, data },
            Err(TransportFailure::Application { status, message }) => {
                tracing::info!(?status, message = %message, "Intent failed with application error");
                LifecycleMessage::FailedApplication { kind, id, message }
            }
            Err(TransportFailure::Transport(reason)) => {
                tracing::warn!(reason = %reason, "Intent failed in transport");
                LifecycleMessage::FailedTransport { kind, id }
            }
        };

        self.finish(message);
    }

    fn finish(&mut self, message: LifecycleMessage) {
        self.resolved = true;
        let phase = message.phase();

        // Applied before the counter drops so a finished drain implies
        // every terminal has reached the store
        self.store.dispatch_message(message.clone());
        let remaining = self
            .in_flight
            .fetch_sub(1, Ordering::SeqCst)
            .saturating_sub(1);

        IntentMetrics::record_finished(phase, self.started_at.elapsed(), remaining);
        tracing::debug!(
            phase,
            elapsed_ms = self.started_at.elapsed().as_millis(),
            "Intent finished"
        );

        self.terminal.send_replace(Some(message));
    }
}

impl Drop for IntentTicket {
    fn drop(&mut self) {
        if !self.resolved {
            tracing::error!(
                kind = %self.kind,
                intent = %self.id,
                "Intent task ended without a result"
            );
            let message = LifecycleMessage::FailedTransport {
                kind: self.kind.clone(),
                id: self.id,
            };
            self.finish(message);
        }
    }
}

/// Handle to a dispatched intent
///
/// Dropping the handle does not cancel the intent.
#[derive(Clone)]
pub struct DispatchHandle {
    id: IntentId,
    kind: ActionKind,
    terminal: watch::Receiver<Option<LifecycleMessage>>,
}

impl DispatchHandle {
    /// Identifier shared by all of this intent's lifecycle messages
    #[must_use]
    pub const fn id(&self) -> IntentId {
        self.id
    }

    /// The intent's action kind
    #[must_use]
    pub const fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// The terminal message, if it has been delivered
    #[must_use]
    pub fn terminal(&self) -> Option<LifecycleMessage> {
        self.terminal.borrow().clone()
    }

    /// Whether the terminal message has been delivered
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.terminal.borrow().is_some()
    }

    /// Wait for the terminal message
    ///
    /// When this returns the message has already been applied to the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ChannelClosed`] if the intent task vanished
    /// without delivering a terminal message.
    pub async fn wait(&mut self) -> Result<LifecycleMessage, StoreError> {
        let terminal = self
            .terminal
            .wait_for(Option::is_some)
            .await
            .map_err(|_| StoreError::ChannelClosed)?;

        terminal.clone().ok_or(StoreError::ChannelClosed)
    }

    /// Wait for the terminal message with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if `timeout` elapses first, or
    /// [`StoreError::ChannelClosed`] as for [`wait`](Self::wait).
    pub async fn wait_with_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<LifecycleMessage, StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)?
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("settled", &self.is_settled())
            .finish()
    }
}
