//! Transport adapter abstraction.
//!
//! The dispatcher never talks to the network directly. It hands a
//! [`TransportRequest`] to a [`Transport`] and folds the result into lifecycle
//! messages:
//!
//! - `Ok(data)` becomes `Succeeded { data }`
//! - `Err(TransportFailure::Application { .. })` becomes `FailedApplication { message }`
//! - `Err(TransportFailure::Transport(_))` becomes `FailedTransport`
//!
//! Retry policy, headers, authentication and wire encoding all belong to the
//! transport implementation.
//!
//! # Dyn Compatibility
//!
//! `request` returns `Pin<Box<dyn Future>>` rather than being an `async fn` so
//! transports can be shared as `Arc<dyn Transport>`.

use crate::intent::{Intent, Method};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Boxed future returned by [`Transport::request`]
pub type TransportFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Value, TransportFailure>> + Send + 'a>>;

/// Why a transport call did not produce data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFailure {
    /// The endpoint answered with a structured error
    #[error("application error (status {status:?}): {message}")]
    Application {
        /// Protocol status code, when the transport has one
        status: Option<u16>,
        /// Message reported by the endpoint
        message: String,
    },

    /// No interpretable response: network failure, timeout, malformed body
    #[error("transport error: {0}")]
    Transport(String),
}

impl TransportFailure {
    /// Whether the failure happened below the application layer
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// A request handed to a transport
#[derive(Clone, Debug, PartialEq)]
pub struct TransportRequest {
    /// Verb
    pub method: Method,
    /// Resource path, e.g. `/api/candidates/ZTF21aaa`
    pub path: String,
    /// Optional JSON body
    pub payload: Option<Value>,
}

impl TransportRequest {
    /// Create a request
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            payload,
        }
    }
}

impl From<&Intent> for TransportRequest {
    fn from(intent: &Intent) -> Self {
        Self::new(intent.method(), intent.target(), intent.payload().cloned())
    }
}

/// Performs the network call for an intent
///
/// Implementations must be `Send + Sync`; the dispatcher calls them from
/// spawned tasks.
pub trait Transport: Send + Sync {
    /// Execute `request`, resolving once with data or a failure
    fn request(&self, request: TransportRequest) -> TransportFuture<'_>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn request(&self, request: TransportRequest) -> TransportFuture<'_> {
        (**self).request(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn request(&self, request: TransportRequest) -> TransportFuture<'_> {
        (**self).request(request)
    }
}
