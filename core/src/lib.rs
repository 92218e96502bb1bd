//! # Slate Core
//!
//! Core traits and types for the Slate dynamic slice store.
//!
//! This crate is the pure half of the architecture: it has no runtime, no
//! locks and no I/O. It defines what flows through the store and how slices
//! react to it.
//!
//! ## Core Concepts
//!
//! - **Intent**: a request to perform one async operation (`kind`, `method`, `target`, `payload`)
//! - **Lifecycle message**: `Started`, then exactly one of `Succeeded`,
//!   `FailedTransport` or `FailedApplication`
//! - **Slice reducer**: pure function `(&State, &LifecycleMessage) → Reduction<State>`
//! - **Loadable**: slice state with a `loadError` field managed by [`FetchReducer`]
//! - **Transport**: the injected adapter that performs network calls
//!
//! ## Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use slate_core::{ActionKind, FetchReducer, IntentId, LifecycleMessage, Loadable, SliceReducer};
//! use serde_json::json;
//!
//! const FETCH_SOURCE: ActionKind = ActionKind::from_static("app/FETCH_SOURCE");
//!
//! #[derive(Clone, Debug, Default, Serialize, Deserialize)]
//! struct SourceState {
//!     name: Option<String>,
//!     #[serde(rename = "loadError", default)]
//!     load_error: String,
//! }
//!
//! impl Loadable for SourceState {
//!     fn load_error(&self) -> &str {
//!         &self.load_error
//!     }
//!
//!     fn set_load_error(&mut self, message: String) {
//!         self.load_error = message;
//!     }
//! }
//!
//! let reducer = FetchReducer::<SourceState>::new(FETCH_SOURCE);
//! let message = LifecycleMessage::Succeeded {
//!     kind: FETCH_SOURCE,
//!     id: IntentId::new(1),
//!     data: json!({"name": "M31"}),
//! };
//!
//! let next = reducer.reduce(&SourceState::default(), &message).into_next();
//! assert_eq!(next.and_then(|s| s.name), Some("M31".to_string()));
//! ```

// Re-export commonly used types
pub use serde::{Deserialize, Serialize};

/// Intents, action kinds, methods and intent identifiers
pub mod intent;

/// Lifecycle messages emitted for every dispatched intent
pub mod lifecycle;

/// The slice reducer trait and closure-backed reducers
pub mod reducer;

/// Load-state handling shared by fetch-backed slices
pub mod loadable;

/// Reducer composition (`combine`, `scope`)
pub mod composition;

/// Transport adapter trait and request/failure types
pub mod transport;

pub use intent::{ActionKind, Intent, IntentId, Method};
pub use lifecycle::LifecycleMessage;
pub use loadable::{Document, FetchReducer, Loadable, MergeError, LOAD_ERROR_FIELD, UNKNOWN_LOAD_ERROR, merge_data};
pub use reducer::{FnReducer, Reduction, SliceReducer, reducer_fn};
pub use transport::{Transport, TransportFailure, TransportFuture, TransportRequest};
