//! # Slate Runtime
//!
//! Runtime implementation for the Slate architecture.
//!
//! This crate provides the dynamic [`Store`] that owns every slice's state and
//! the [`Dispatcher`] that turns intents into lifecycle messages.
//!
//! ## Core Components
//!
//! - **Store**: registry of slice reducers and their states; fans every
//!   lifecycle message out to all registered slices and notifies subscribers
//! - **Dispatcher**: emits `Started`, runs the transport call on a spawned
//!   task, then emits exactly one terminal message
//! - **Transports**: [`http::HttpTransport`] (JSON envelope over HTTP) and
//!   [`retry::RetryingTransport`] (exponential backoff decorator)
//!
//! ## Example
//!
//! ```ignore
//! use slate_runtime::{Dispatcher, Store};
//! use slate_core::{ActionKind, Document, FetchReducer, Intent};
//!
//! const FETCH_SOURCE: ActionKind = ActionKind::from_static("app/FETCH_SOURCE");
//!
//! let store = Store::new();
//! store.register_slice("source", FetchReducer::<Document>::new(FETCH_SOURCE), Document::default())?;
//!
//! let dispatcher = Dispatcher::new(store.clone(), transport);
//! let terminal = dispatcher.dispatch_and_wait(Intent::get(FETCH_SOURCE, "/api/sources/1")).await?;
//!
//! let source = store.get_state::<Document>("source")?;
//! ```

use std::time::Duration;

/// Retry logic with exponential backoff and the retrying transport decorator
pub mod retry;

/// Prometheus metrics for observability
pub mod metrics;

/// The dynamic slice store
pub mod store;

/// The intent dispatcher
pub mod dispatcher;

/// HTTP transport speaking the `{status, data, message}` JSON envelope
pub mod http;

/// Error types for the Slate runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store and Dispatcher operations
    ///
    /// `EmptySliceName` and `StateTypeMismatch` signal programmer errors and are
    /// returned synchronously; they never become slice state. Runtime failures
    /// of intents are not errors at all: they are delivered as lifecycle messages.
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// A slice was registered with an empty name
        #[error("Slice name must not be empty")]
        EmptySliceName,

        /// A slice was accessed or re-registered with a different state type
        #[error("Slice '{slice}' holds {registered}, not {requested}")]
        StateTypeMismatch {
            /// Slice name
            slice: String,
            /// State type the slice was registered with
            registered: &'static str,
            /// State type that was requested
            requested: &'static str,
        },

        /// Timeout waiting for an intent's terminal message
        #[error("Timeout waiting for terminal message")]
        Timeout,

        /// The intent's terminal channel closed without a message
        #[error("Terminal message channel closed")]
        ChannelClosed,

        /// In-flight intents did not settle before the drain timeout
        #[error("Drain timed out with {0} intents still in flight")]
        DrainTimeout(usize),
    }
}

pub use dispatcher::{DispatchHandle, Dispatcher};
pub use error::StoreError;
pub use store::{SliceLookup, Store, StoreBuilder, StoreEvent, Subscription};

/// Configuration for Store instances
///
/// # Example
///
/// ```
/// use slate_runtime::{Store, StoreConfig};
///
/// let store = Store::with_config(StoreConfig::default().with_event_capacity(256));
/// assert!(store.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the `StoreEvent` broadcast channel (events buffered per lagging receiver)
    pub event_capacity: usize,
}

impl StoreConfig {
    /// Set the broadcast capacity (clamped to at least 1)
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

/// Configuration for Dispatcher instances
///
/// # Example
///
/// ```
/// use slate_runtime::DispatcherConfig;
/// use std::time::Duration;
///
/// let config = DispatcherConfig::default().with_request_timeout(Duration::from_secs(5));
/// assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
/// ```
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on one transport call; elapsing it yields `FailedTransport`
    pub request_timeout: Option<Duration>,
}

impl DispatcherConfig {
    /// Bound every transport call by `timeout`
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Let transport calls run as long as the transport allows
    #[must_use]
    pub const fn without_request_timeout(mut self) -> Self {
        self.request_timeout = None;
        self
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_clamps_capacity() {
        assert_eq!(StoreConfig::default().event_capacity, 64);
        assert_eq!(StoreConfig::default().with_event_capacity(0).event_capacity, 1);
    }

    #[test]
    fn test_dispatcher_config_timeout() {
        let config = DispatcherConfig::default();
        assert_eq!(config.request_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.without_request_timeout().request_timeout, None);
    }

    #[test]
    fn test_type_mismatch_message() {
        let error = StoreError::StateTypeMismatch {
            slice: "candidate".into(),
            registered: "CandidateState",
            requested: "Document",
        };
        assert_eq!(
            error.to_string(),
            "Slice 'candidate' holds CandidateState, not Document"
        );
    }
}
