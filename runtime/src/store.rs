//! The dynamic slice store.
//!
//! A [`Store`] starts empty and accepts slices at any point in its lifetime.
//! Each slice pairs a [`SliceReducer`] with its current state. Every message
//! passed to [`Store::dispatch_message`] is delivered to every registered slice
//! in registration order, atomically with respect to other dispatches and
//! registrations.
//!
//! # Registration Rules
//!
//! - Names are unique and non-empty.
//! - Registering an existing name replaces only the reducer; the slice keeps
//!   the state it accumulated (hot-reload continuity). The new `initial_state`
//!   is discarded.
//! - A slice only sees messages dispatched after it registered. Nothing is
//!   replayed.
//!
//! # Concurrency
//!
//! The registry sits behind one exclusive lock. Reducers run while it is held
//! and must not block. Listeners run after it is released, so a listener may
//! read state or dispatch again.

use crate::error::StoreError;
use crate::metrics::StoreMetrics;
use crate::StoreConfig;
use slate_core::lifecycle::LifecycleMessage;
use slate_core::reducer::{Reduction, SliceReducer};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Instant;
use tokio::sync::broadcast;

/// Type-erased, immutable slice state
type SharedState = Arc<dyn Any + Send + Sync>;

/// Listener callback invoked after every dispatch
type Listener = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

/// Outcome of one [`Store::dispatch_message`] call
///
/// Delivered to every listener and broadcast to every
/// [`Store::subscribe_events`] receiver.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    /// Monotonic dispatch counter of the store (first dispatch is 1)
    pub revision: u64,
    /// The message that was dispatched
    pub message: LifecycleMessage,
    /// Slices whose state changed, in registration order
    pub changed: Vec<String>,
}

impl StoreEvent {
    /// Whether the named slice changed
    #[must_use]
    pub fn changed(&self, slice: &str) -> bool {
        self.changed.iter().any(|name| name == slice)
    }
}

/// Result of [`Store::get_state`]
#[derive(Debug, Clone, PartialEq)]
pub enum SliceLookup<S> {
    /// The slice's current state
    Registered(Arc<S>),
    /// No slice with this name has registered yet
    ///
    /// Treat this as the slice's eventual initial state.
    NotRegistered,
}

impl<S> SliceLookup<S> {
    /// Whether the slice is registered
    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self, Self::Registered(_))
    }

    /// The state, if registered
    #[must_use]
    pub fn into_option(self) -> Option<Arc<S>> {
        match self {
            Self::Registered(state) => Some(state),
            Self::NotRegistered => None,
        }
    }

    /// The state, or `initial` when the slice has not registered yet
    #[must_use]
    pub fn or_initial(self, initial: S) -> Arc<S> {
        match self {
            Self::Registered(state) => state,
            Self::NotRegistered => Arc::new(initial),
        }
    }
}

/// Object-safe view of a [`SliceReducer`] over type-erased state
trait ErasedReducer: Send + Sync {
    fn reduce(&self, state: &SharedState, message: &LifecycleMessage) -> Option<SharedState>;
}

struct Erased<R>(R);

impl<R: SliceReducer> ErasedReducer for Erased<R> {
    fn reduce(&self, state: &SharedState, message: &LifecycleMessage) -> Option<SharedState> {
        // Registration pins the state type, so the downcast only fails on a registry bug.
        let current = state.downcast_ref::<R::State>()?;
        match self.0.reduce(current, message) {
            Reduction::Unchanged => None,
            Reduction::Next(next) => Some(Arc::new(next)),
        }
    }
}

/// A slice waiting to be inserted into the registry
struct PendingSlice {
    name: String,
    reducer: Box<dyn ErasedReducer>,
    initial: SharedState,
    state_type: TypeId,
    state_type_name: &'static str,
}

impl PendingSlice {
    fn new<R: SliceReducer>(name: String, reducer: R, initial: R::State) -> Self {
        Self {
            name,
            reducer: Box::new(Erased(reducer)),
            initial: Arc::new(initial),
            state_type: TypeId::of::<R::State>(),
            state_type_name: std::any::type_name::<R::State>(),
        }
    }
}

struct SliceEntry {
    name: String,
    reducer: Box<dyn ErasedReducer>,
    state: SharedState,
    state_type: TypeId,
    state_type_name: &'static str,
}

/// Slices in registration order, indexed by name
#[derive(Default)]
struct Registry {
    slices: Vec<SliceEntry>,
    index: HashMap<String, usize>,
}

impl Registry {
    /// Insert or replace; returns `true` when an existing slice was replaced
    fn register(&mut self, pending: PendingSlice) -> Result<bool, StoreError> {
        if pending.name.is_empty() {
            return Err(StoreError::EmptySliceName);
        }

        if let Some(&position) = self.index.get(&pending.name) {
            let entry = &mut self.slices[position];
            if entry.state_type != pending.state_type {
                return Err(StoreError::StateTypeMismatch {
                    slice: pending.name,
                    registered: entry.state_type_name,
                    requested: pending.state_type_name,
                });
            }
            entry.reducer = pending.reducer;
            return Ok(true);
        }

        self.index.insert(pending.name.clone(), self.slices.len());
        self.slices.push(SliceEntry {
            name: pending.name,
            reducer: pending.reducer,
            state: pending.initial,
            state_type: pending.state_type,
            state_type_name: pending.state_type_name,
        });
        Ok(false)
    }

    fn get(&self, name: &str) -> Option<&SliceEntry> {
        self.index.get(name).map(|&position| &self.slices[position])
    }

    /// Run every reducer; returns the names of slices that changed
    fn apply(&mut self, message: &LifecycleMessage) -> Vec<String> {
        let mut changed = Vec::new();
        for entry in &mut self.slices {
            if let Some(next) = entry.reducer.reduce(&entry.state, message) {
                entry.state = next;
                changed.push(entry.name.clone());
            }
        }
        changed
    }
}

struct Shared {
    registry: Mutex<Registry>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
    revision: AtomicU64,
    events: broadcast::Sender<StoreEvent>,
}

/// The dynamic store - owner of every slice's state
///
/// `Store` is a cheap handle; clones share the same registry. Independent
/// stores created with [`Store::new`] are fully isolated from each other.
///
/// # Example
///
/// ```
/// use slate_core::{ActionKind, Document, FetchReducer, IntentId, LifecycleMessage};
/// use slate_runtime::{SliceLookup, Store};
/// use serde_json::json;
///
/// # fn main() -> Result<(), slate_runtime::StoreError> {
/// const FETCH_SOURCE: ActionKind = ActionKind::from_static("app/FETCH_SOURCE");
///
/// let store = Store::new();
/// assert_eq!(store.get_state::<Document>("source")?, SliceLookup::NotRegistered);
///
/// store.register_slice("source", FetchReducer::<Document>::new(FETCH_SOURCE), Document::default())?;
/// store.dispatch_message(LifecycleMessage::Succeeded {
///     kind: FETCH_SOURCE,
///     id: IntentId::new(1),
///     data: json!({"name": "M31"}),
/// });
///
/// let source = store.get_state::<Document>("source")?.into_option();
/// assert_eq!(source.and_then(|doc| doc.get("name").cloned()), Some(json!("M31")));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Shared>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("slices", &self.slice_names())
            .field("revision", &self.revision())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Create an empty store with default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Create an empty store with custom configuration
    #[must_use]
    pub fn with_config(config: StoreConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(Shared {
                registry: Mutex::new(Registry::default()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
                revision: AtomicU64::new(0),
                events,
            }),
        }
    }

    /// Start building a store seeded with slices
    #[must_use]
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.inner
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Vec<(u64, Listener)>> {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a slice, or swap the reducer of an existing one
    ///
    /// When `name` is already registered only the reducer is replaced; the
    /// accumulated state is kept and `initial_state` is dropped.
    ///
    /// # Errors
    ///
    /// - [`StoreError::EmptySliceName`] if `name` is empty
    /// - [`StoreError::StateTypeMismatch`] if `name` is registered with a
    ///   different state type
    pub fn register_slice<R>(
        &self,
        name: impl Into<String>,
        reducer: R,
        initial_state: R::State,
    ) -> Result<(), StoreError>
    where
        R: SliceReducer,
    {
        self.insert(PendingSlice::new(name.into(), reducer, initial_state))
    }

    fn insert(&self, pending: PendingSlice) -> Result<(), StoreError> {
        let name = pending.name.clone();
        let state_type = pending.state_type_name;
        let result = self.registry().register(pending);

        match &result {
            Ok(false) => {
                tracing::debug!(slice = %name, state_type, "Slice registered");
                StoreMetrics::record_registration(false);
            }
            Ok(true) => {
                tracing::info!(slice = %name, state_type, "Slice reducer replaced, state preserved");
                StoreMetrics::record_registration(true);
            }
            Err(error) => {
                tracing::error!(slice = %name, error = %error, "Slice registration rejected");
            }
        }

        result.map(|_| ())
    }

    /// Deliver `message` to every registered slice, then notify subscribers
    ///
    /// Slices are visited in registration order. Each reducer either passes
    /// the message through or produces a new state for its own slice.
    ///
    /// # Returns
    ///
    /// The [`StoreEvent`] that was delivered to listeners.
    ///
    /// # Panics
    ///
    /// If a reducer panics the panic propagates to the caller. Reducers
    /// should be pure functions that do not panic.
    #[tracing::instrument(
        skip(self, message),
        name = "store_dispatch",
        fields(kind = %message.kind(), intent = %message.id(), phase = message.phase())
    )]
    pub fn dispatch_message(&self, message: LifecycleMessage) -> StoreEvent {
        let start = Instant::now();

        let event = {
            let mut registry = self.registry();
            let changed = registry.apply(&message);
            let revision = self.inner.revision.fetch_add(1, Ordering::SeqCst) + 1;
            let event = StoreEvent {
                revision,
                message,
                changed,
            };
            // Sent under the lock so event receivers see revisions in order.
            // No receivers is fine.
            let _ = self.inner.events.send(event.clone());
            event
        };

        StoreMetrics::record_dispatch(event.message.phase(), event.changed.len(), start.elapsed());
        tracing::trace!(
            revision = event.revision,
            changed = event.changed.len(),
            "Message delivered to slices"
        );

        self.notify(&event);
        event
    }

    fn notify(&self, event: &StoreEvent) {
        // Snapshot so listeners can subscribe/unsubscribe from inside a callback
        let listeners: Vec<Listener> = self
            .listeners()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in listeners {
            listener(event);
        }
    }

    /// Current state of a slice
    ///
    /// Returns [`SliceLookup::NotRegistered`] (not an error) when no slice of
    /// that name exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StateTypeMismatch`] if the slice holds a state
    /// type other than `S`.
    pub fn get_state<S>(&self, name: &str) -> Result<SliceLookup<S>, StoreError>
    where
        S: Send + Sync + 'static,
    {
        let (state, registered) = {
            let registry = self.registry();
            let Some(entry) = registry.get(name) else {
                return Ok(SliceLookup::NotRegistered);
            };
            (Arc::clone(&entry.state), entry.state_type_name)
        };

        state
            .downcast::<S>()
            .map(SliceLookup::Registered)
            .map_err(|_| StoreError::StateTypeMismatch {
                slice: name.to_string(),
                registered,
                requested: std::any::type_name::<S>(),
            })
    }

    /// Read a slice's state through a closure
    ///
    /// ```ignore
    /// let error = store.select("candidate", |c: &CandidateState| c.load_error.clone())?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::StateTypeMismatch`] if the slice holds a state
    /// type other than `S`.
    pub fn select<S, T, F>(&self, name: &str, f: F) -> Result<Option<T>, StoreError>
    where
        S: Send + Sync + 'static,
        F: FnOnce(&S) -> T,
    {
        Ok(self.get_state::<S>(name)?.into_option().map(|state| f(&state)))
    }

    /// Register a listener invoked after every dispatch
    ///
    /// The listener runs on the dispatching thread after the registry lock
    /// has been released. Keep the returned [`Subscription`] to unsubscribe.
    ///
    /// Listeners are not serialized: when several threads dispatch at once,
    /// a listener can see revision N+1 before revision N, and a dispatch made
    /// from inside a listener is delivered before the outer call returns.
    /// Use [`StoreEvent::revision`] or [`subscribe_events`](Self::subscribe_events)
    /// when order matters.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::SeqCst);
        self.listeners().push((id, Arc::new(listener)));
        tracing::trace!(listener = id, "Listener subscribed");

        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    /// Receive every [`StoreEvent`] on an async channel
    ///
    /// Events arrive in revision order, before listeners registered with
    /// [`subscribe`](Self::subscribe) are called for them.
    ///
    /// Receivers that fall behind by more than the configured capacity get
    /// `RecvError::Lagged` and skip the oldest events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.events.subscribe()
    }

    /// Whether a slice with this name is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.registry().get(name).is_some()
    }

    /// Names of all registered slices, in registration order
    #[must_use]
    pub fn slice_names(&self) -> Vec<String> {
        self.registry()
            .slices
            .iter()
            .map(|entry| entry.name.clone())
            .collect()
    }

    /// Number of registered slices
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().slices.len()
    }

    /// Whether no slice is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of messages dispatched so far
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.inner.revision.load(Ordering::SeqCst)
    }

    /// Number of active listeners
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners().len()
    }
}

/// Handle returned by [`Store::subscribe`]
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    store: Weak<Shared>,
}

impl Subscription {
    /// Remove the listener; returns `false` if it was already gone or the
    /// store no longer exists
    pub fn unsubscribe(self) -> bool {
        let Some(shared) = self.store.upgrade() else {
            return false;
        };

        let mut listeners = shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(id, _)| *id != self.id);
        let removed = listeners.len() < before;

        tracing::trace!(listener = self.id, removed, "Listener unsubscribed");
        removed
    }
}

/// Builder for a [`Store`] seeded with an initial registry
///
/// # Example
///
/// ```
/// use slate_core::{ActionKind, Document, FetchReducer};
/// use slate_runtime::{Store, StoreConfig};
///
/// # fn main() -> Result<(), slate_runtime::StoreError> {
/// let store = Store::builder()
///     .config(StoreConfig::default().with_event_capacity(8))
///     .slice("a", FetchReducer::<Document>::new(ActionKind::from_static("app/A")), Document::default())
///     .slice("b", FetchReducer::<Document>::new(ActionKind::from_static("app/B")), Document::default())
///     .build()?;
///
/// assert_eq!(store.slice_names(), vec!["a".to_string(), "b".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct StoreBuilder {
    config: StoreConfig,
    slices: Vec<PendingSlice>,
}

impl std::fmt::Debug for StoreBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBuilder")
            .field("config", &self.config)
            .field(
                "slices",
                &self.slices.iter().map(|s| s.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl StoreBuilder {
    /// Use a custom configuration
    #[must_use]
    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a slice to the initial registry
    #[must_use]
    pub fn slice<R>(mut self, name: impl Into<String>, reducer: R, initial_state: R::State) -> Self
    where
        R: SliceReducer,
    {
        self.slices
            .push(PendingSlice::new(name.into(), reducer, initial_state));
        self
    }

    /// Build the store, registering slices in the order they were added
    ///
    /// # Errors
    ///
    /// Returns the first registration error (see [`Store::register_slice`]).
    pub fn build(self) -> Result<Store, StoreError> {
        let store = Store::with_config(self.config);
        for pending in self.slices {
            store.insert(pending)?;
        }
        Ok(store)
    }
}
