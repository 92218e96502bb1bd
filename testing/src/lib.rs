//! # Slate Testing
//!
//! Testing utilities and helpers for the Slate architecture.
//!
//! This crate provides:
//! - [`ScriptedTransport`]: an in-memory transport with scripted and gated replies
//! - [`SliceReducerTest`]: Given-When-Then tests for slice reducers
//! - [`RecordingListener`]: captures every [`StoreEvent`] a store emits
//! - Lifecycle message constructors and proptest strategies
//!
//! ## Example
//!
//! ```ignore
//! use slate_testing::{RecordingListener, ScriptedTransport};
//! use slate_runtime::{Dispatcher, Store};
//!
//! #[tokio::test]
//! async fn test_candidate_fetch() {
//!     let store = Store::new();
//!     candidate::register(&store)?;
//!
//!     let transport = ScriptedTransport::new();
//!     transport.succeed(Method::Get, "/api/candidates/ZTF21aaa", json!({"ra": 234.22}));
//!
//!     let recorder = RecordingListener::new();
//!     let _subscription = recorder.attach(&store);
//!
//!     Dispatcher::new(store.clone(), transport)
//!         .dispatch_and_wait(candidate::fetch_candidate("ZTF21aaa"))
//!         .await?;
//!
//!     assert_eq!(recorder.phases(), vec!["started", "succeeded"]);
//! }
//! ```

use slate_core::{IntentId, LifecycleMessage};
use slate_runtime::{Store, StoreEvent, Subscription};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Scripted transport mocks
pub mod transport_mocks;

/// Fluent slice reducer tests
pub mod reducer_test;

/// Constructors for lifecycle messages
///
/// Intent ids are plain integers here; the dispatcher assigns them in
/// production.
pub mod lifecycle {
    use serde_json::Value;
    use slate_core::{ActionKind, IntentId, LifecycleMessage};

    /// `Started` for intent `id`
    #[must_use]
    pub const fn started(kind: ActionKind, id: u64) -> LifecycleMessage {
        LifecycleMessage::Started {
            kind,
            id: IntentId::new(id),
        }
    }

    /// `Succeeded` carrying `data`
    #[must_use]
    pub const fn succeeded(kind: ActionKind, id: u64, data: Value) -> LifecycleMessage {
        LifecycleMessage::Succeeded {
            kind,
            id: IntentId::new(id),
            data,
        }
    }

    /// `FailedApplication` carrying `message`
    #[must_use]
    pub fn failed_application(kind: ActionKind, id: u64, message: &str) -> LifecycleMessage {
        LifecycleMessage::FailedApplication {
            kind,
            id: IntentId::new(id),
            message: message.to_string(),
        }
    }

    /// `FailedTransport`
    #[must_use]
    pub const fn failed_transport(kind: ActionKind, id: u64) -> LifecycleMessage {
        LifecycleMessage::FailedTransport {
            kind,
            id: IntentId::new(id),
        }
    }
}

/// Property-based testing utilities using proptest
pub mod properties {
    use proptest::prelude::*;
    use serde_json::{Map, Value};
    use slate_core::{ActionKind, IntentId, LifecycleMessage};

    /// Flat JSON objects with scalar values
    pub fn arb_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map(
            "[a-z]{1,8}",
            prop_oneof![
                any::<i64>().prop_map(Value::from),
                any::<bool>().prop_map(Value::from),
                "[a-zA-Z0-9 ]{0,12}".prop_map(Value::from),
                Just(Value::Null),
            ],
            0..5,
        )
        .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<String, Value>>()))
    }

    /// Action kinds in a namespace of their own (`prop/…`)
    pub fn arb_kind() -> impl Strategy<Value = ActionKind> {
        "[A-Z_]{1,16}".prop_map(|name| ActionKind::new(format!("prop/{name}")))
    }

    /// Any lifecycle message of `kind`
    pub fn arb_message_of(kind: ActionKind) -> impl Strategy<Value = LifecycleMessage> {
        let id = any::<u64>().prop_map(IntentId::new);
        (id, 0..4_u8, arb_object(), "[a-z ]{0,20}").prop_map(move |(id, phase, data, message)| {
            let kind = kind.clone();
            match phase {
                0 => LifecycleMessage::Started { kind, id },
                1 => LifecycleMessage::Succeeded { kind, id, data },
                2 => LifecycleMessage::FailedApplication { kind, id, message },
                _ => LifecycleMessage::FailedTransport { kind, id },
            }
        })
    }

    /// Any lifecycle message of a generated `prop/…` kind
    pub fn arb_foreign_message() -> impl Strategy<Value = LifecycleMessage> {
        arb_kind().prop_flat_map(arb_message_of)
    }
}

/// Records every [`StoreEvent`] of the stores it is attached to
///
/// # Example
///
/// ```
/// use slate_runtime::Store;
/// use slate_testing::{RecordingListener, lifecycle};
/// use slate_core::ActionKind;
///
/// let store = Store::new();
/// let recorder = RecordingListener::new();
/// let _subscription = recorder.attach(&store);
///
/// store.dispatch_message(lifecycle::started(ActionKind::from_static("app/PING"), 1));
/// assert_eq!(recorder.phases(), vec!["started"]);
/// ```
#[derive(Clone, Debug, Default)]
pub struct RecordingListener {
    events: Arc<Mutex<Vec<StoreEvent>>>,
}

impl RecordingListener {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, Vec<StoreEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to `store`; recording continues until the returned
    /// subscription is unsubscribed
    pub fn attach(&self, store: &Store) -> Subscription {
        let events = Arc::clone(&self.events);
        store.subscribe(move |event| {
            events
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(event.clone());
        })
    }

    /// Recorded events in delivery order
    #[must_use]
    pub fn events(&self) -> Vec<StoreEvent> {
        self.guard().clone()
    }

    /// Recorded messages in delivery order
    #[must_use]
    pub fn messages(&self) -> Vec<LifecycleMessage> {
        self.guard().iter().map(|event| event.message.clone()).collect()
    }

    /// Phases of all recorded messages
    #[must_use]
    pub fn phases(&self) -> Vec<&'static str> {
        self.guard().iter().map(|event| event.message.phase()).collect()
    }

    /// Phases of the messages belonging to intent `id`
    #[must_use]
    pub fn phases_for(&self, id: IntentId) -> Vec<&'static str> {
        self.guard()
            .iter()
            .filter(|event| event.message.id() == id)
            .map(|event| event.message.phase())
            .collect()
    }

    /// Number of recorded events
    #[must_use]
    pub fn len(&self) -> usize {
        self.guard().len()
    }

    /// Whether nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Forget all recorded events
    pub fn clear(&self) {
        self.guard().clear();
    }
}

/// Install a `tracing` subscriber for tests, honouring `RUST_LOG`
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// Re-export commonly used items
pub use reducer_test::{SliceReducerTest, assertions};
pub use transport_mocks::{Gate, ScriptedTransport};
