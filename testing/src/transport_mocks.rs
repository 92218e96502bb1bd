//! Scripted transport for deterministic dispatcher tests
//!
//! [`ScriptedTransport`] answers requests from per-route queues. A reply is
//! either ready immediately or held behind a [`Gate`] that the test opens
//! later, which makes it possible to interleave the terminals of concurrent
//! intents in any order.

#![allow(clippy::missing_panics_doc)] // Test utilities document panics where critical

use serde_json::Value;
use slate_core::{Method, Transport, TransportFailure, TransportFuture, TransportRequest};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::oneshot;

type Outcome = Result<Value, TransportFailure>;

enum Reply {
    Ready(Outcome),
    Gated(oneshot::Receiver<Outcome>),
}

#[derive(Default)]
struct Script {
    replies: HashMap<(Method, String), VecDeque<Reply>>,
    requests: Vec<TransportRequest>,
}

/// In-memory [`Transport`] answering from scripted replies
///
/// Replies for the same route are consumed in the order they were scripted.
/// A request with no scripted reply fails with
/// [`TransportFailure::Transport`]. Every request is recorded.
///
/// # Example
///
/// ```
/// use slate_testing::ScriptedTransport;
/// use slate_core::{Method, Transport, TransportRequest};
/// use serde_json::json;
///
/// let transport = ScriptedTransport::new();
/// transport.succeed(Method::Get, "/api/candidates/1", json!({"ra": 10.0}));
///
/// let data = tokio_test::block_on(
///     transport.request(TransportRequest::new(Method::Get, "/api/candidates/1", None)),
/// );
/// assert_eq!(data, Ok(json!({"ra": 10.0})));
/// assert_eq!(transport.request_count(), 1);
/// ```
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    /// Create a transport with no scripted replies
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, method: Method, path: &str, reply: Reply) {
        self.script()
            .replies
            .entry((method, path.to_string()))
            .or_default()
            .push_back(reply);
    }

    /// Queue a reply for `method path`
    pub fn respond(&self, method: Method, path: &str, outcome: Result<Value, TransportFailure>) -> &Self {
        self.push(method, path, Reply::Ready(outcome));
        self
    }

    /// Queue a success carrying `data`
    pub fn succeed(&self, method: Method, path: &str, data: Value) -> &Self {
        self.respond(method, path, Ok(data))
    }

    /// Queue an application failure carrying `message`
    pub fn fail_application(&self, method: Method, path: &str, message: &str) -> &Self {
        self.respond(
            method,
            path,
            Err(TransportFailure::Application {
                status: Some(400),
                message: message.to_string(),
            }),
        )
    }

    /// Queue a transport failure
    pub fn fail_transport(&self, method: Method, path: &str) -> &Self {
        self.respond(
            method,
            path,
            Err(TransportFailure::Transport("connection refused".to_string())),
        )
    }

    /// Queue a reply that is held until the returned [`Gate`] is opened
    #[must_use]
    pub fn gate(&self, method: Method, path: &str) -> Gate {
        let (sender, receiver) = oneshot::channel();
        self.push(method, path, Reply::Gated(receiver));
        Gate { sender }
    }

    /// All requests received so far, in arrival order
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.script().requests.clone()
    }

    /// Number of requests received so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.script().requests.len()
    }

    /// Number of scripted replies not yet consumed
    #[must_use]
    pub fn pending_replies(&self) -> usize {
        self.script().replies.values().map(VecDeque::len).sum()
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("requests", &self.request_count())
            .field("pending_replies", &self.pending_replies())
            .finish()
    }
}

impl Transport for ScriptedTransport {
    fn request(&self, request: TransportRequest) -> TransportFuture<'_> {
        let reply = {
            let mut script = self.script();
            script.requests.push(request.clone());
            script
                .replies
                .get_mut(&(request.method, request.path.clone()))
                .and_then(VecDeque::pop_front)
        };

        Box::pin(async move {
            match reply {
                Some(Reply::Ready(outcome)) => outcome,
                Some(Reply::Gated(receiver)) => receiver.await.unwrap_or_else(|_| {
                    Err(TransportFailure::Transport("gate dropped without a reply".to_string()))
                }),
                None => Err(TransportFailure::Transport(format!(
                    "no scripted reply for {} {}",
                    request.method, request.path
                ))),
            }
        })
    }
}

/// Releases one held reply of a [`ScriptedTransport`]
///
/// Dropping an unopened gate releases a transport failure.
#[derive(Debug)]
pub struct Gate {
    sender: oneshot::Sender<Outcome>,
}

impl Gate {
    /// Release `outcome`
    pub fn open(self, outcome: Result<Value, TransportFailure>) {
        // The request may have been abandoned already
        let _ = self.sender.send(outcome);
    }

    /// Release a success carrying `data`
    pub fn succeed(self, data: Value) {
        self.open(Ok(data));
    }

    /// Release an application failure carrying `message`
    pub fn fail_application(self, message: &str) {
        self.open(Err(TransportFailure::Application {
            status: Some(400),
            message: message.to_string(),
        }));
    }

    /// Release a transport failure
    pub fn fail_transport(self) {
        self.open(Err(TransportFailure::Transport("connection reset".to_string())));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can unwrap
mod tests {
    use super::*;
    use serde_json::json;

    fn get(path: &str) -> TransportRequest {
        TransportRequest::new(Method::Get, path, None)
    }

    #[tokio::test]
    async fn test_replies_are_consumed_in_order() {
        let transport = ScriptedTransport::new();
        transport
            .succeed(Method::Get, "/a", json!(1))
            .fail_application(Method::Get, "/a", "not found");

        assert_eq!(transport.request(get("/a")).await, Ok(json!(1)));
        assert_eq!(
            transport.request(get("/a")).await,
            Err(TransportFailure::Application {
                status: Some(400),
                message: "not found".into(),
            })
        );
        assert!(transport.request(get("/a")).await.unwrap_err().is_transport());
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_routes_are_keyed_by_method() {
        let transport = ScriptedTransport::new();
        transport.succeed(Method::Post, "/a", json!({"id": 1}));

        assert!(transport.request(get("/a")).await.is_err());
        assert_eq!(transport.pending_replies(), 1);
    }

    #[tokio::test]
    async fn test_gate_holds_reply_until_opened() {
        let transport = ScriptedTransport::new();
        let gate = transport.gate(Method::Get, "/slow");

        let pending = tokio::spawn({
            let transport = transport.clone();
            async move { transport.request(get("/slow")).await }
        });

        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        gate.succeed(json!("done"));
        assert_eq!(pending.await.unwrap(), Ok(json!("done")));
    }

    #[tokio::test]
    async fn test_dropped_gate_is_transport_failure() {
        let transport = ScriptedTransport::new();
        drop(transport.gate(Method::Get, "/slow"));

        assert!(transport.request(get("/slow")).await.unwrap_err().is_transport());
    }
}
