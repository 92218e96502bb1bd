//! Intents: a caller's request to perform one async operation.
//!
//! An [`Intent`] names the action ([`ActionKind`]), the transport verb
//! ([`Method`]), the resource it targets and an optional JSON payload. Intents
//! are consumed by value when dispatched; each dispatch is assigned a fresh
//! [`IntentId`] so lifecycle messages can be correlated with the call that
//! produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

/// Identifier of an async action, e.g. `"skyportal/FETCH_CANDIDATE"`.
///
/// Kinds are compared by value. They can be declared as constants:
///
/// ```
/// use slate_core::intent::ActionKind;
///
/// pub const FETCH_SOURCE: ActionKind = ActionKind::from_static("app/FETCH_SOURCE");
///
/// assert_eq!(FETCH_SOURCE.as_str(), "app/FETCH_SOURCE");
/// assert_eq!(FETCH_SOURCE.ok_type(), "app/FETCH_SOURCE_OK");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionKind(Cow<'static, str>);

impl ActionKind {
    /// Create a kind from a static string (usable in `const` items)
    #[must_use]
    pub const fn from_static(kind: &'static str) -> Self {
        Self(Cow::Borrowed(kind))
    }

    /// Create a kind from an owned or borrowed string
    #[must_use]
    pub fn new(kind: impl Into<String>) -> Self {
        Self(Cow::Owned(kind.into()))
    }

    /// The kind as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire name of the success message (`KIND_OK`)
    #[must_use]
    pub fn ok_type(&self) -> String {
        format!("{}_OK", self.0)
    }

    /// Wire name of the transport failure message (`KIND_FAIL`)
    #[must_use]
    pub fn fail_type(&self) -> String {
        format!("{}_FAIL", self.0)
    }

    /// Wire name of the application error message (`KIND_ERROR`)
    #[must_use]
    pub fn error_type(&self) -> String {
        format!("{}_ERROR", self.0)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ActionKind {
    fn from(kind: &'static str) -> Self {
        Self::from_static(kind)
    }
}

impl From<String> for ActionKind {
    fn from(kind: String) -> Self {
        Self::new(kind)
    }
}

/// Transport verb of an intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// Read a resource
    Get,
    /// Create a resource
    Post,
    /// Replace a resource
    Put,
    /// Partially update a resource
    Patch,
    /// Remove a resource
    Delete,
    /// Check that a resource exists
    Head,
}

impl Method {
    /// Upper-case verb name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one dispatched intent instance
///
/// Assigned by the dispatcher; unique per dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IntentId(u64);

impl IntentId {
    /// Wrap a raw identifier
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for IntentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "intent-{}", self.0)
    }
}

/// A request to perform one async operation
///
/// # Example
///
/// ```
/// use slate_core::intent::{ActionKind, Intent, Method};
/// use serde_json::json;
///
/// const SAVE_COMMENT: ActionKind = ActionKind::from_static("app/SAVE_COMMENT");
///
/// let intent = Intent::post(SAVE_COMMENT, "/api/comment", json!({"text": "nice"}));
/// assert_eq!(intent.method(), Method::Post);
/// assert_eq!(intent.target(), "/api/comment");
/// assert!(intent.payload().is_some());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    kind: ActionKind,
    method: Method,
    target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
}

impl Intent {
    /// Create an intent without payload
    #[must_use]
    pub fn new(kind: impl Into<ActionKind>, method: Method, target: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            method,
            target: target.into(),
            payload: None,
        }
    }

    /// `GET target`
    #[must_use]
    pub fn get(kind: impl Into<ActionKind>, target: impl Into<String>) -> Self {
        Self::new(kind, Method::Get, target)
    }

    /// `HEAD target`
    #[must_use]
    pub fn head(kind: impl Into<ActionKind>, target: impl Into<String>) -> Self {
        Self::new(kind, Method::Head, target)
    }

    /// `DELETE target`
    #[must_use]
    pub fn delete(kind: impl Into<ActionKind>, target: impl Into<String>) -> Self {
        Self::new(kind, Method::Delete, target)
    }

    /// `POST target` with a JSON payload
    #[must_use]
    pub fn post(kind: impl Into<ActionKind>, target: impl Into<String>, payload: Value) -> Self {
        Self::new(kind, Method::Post, target).with_payload(payload)
    }

    /// `PUT target` with a JSON payload
    #[must_use]
    pub fn put(kind: impl Into<ActionKind>, target: impl Into<String>, payload: Value) -> Self {
        Self::new(kind, Method::Put, target).with_payload(payload)
    }

    /// `PATCH target` with a JSON payload
    #[must_use]
    pub fn patch(kind: impl Into<ActionKind>, target: impl Into<String>, payload: Value) -> Self {
        Self::new(kind, Method::Patch, target).with_payload(payload)
    }

    /// Attach a JSON payload
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// The action kind
    #[must_use]
    pub const fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// The transport verb
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// The targeted resource path
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// The payload, if any
    #[must_use]
    pub const fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Split into `(kind, method, target, payload)`
    #[must_use]
    pub fn into_parts(self) -> (ActionKind, Method, String, Option<Value>) {
        (self.kind, self.method, self.target, self.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const FETCH: ActionKind = ActionKind::from_static("test/FETCH");

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(FETCH.ok_type(), "test/FETCH_OK");
        assert_eq!(FETCH.fail_type(), "test/FETCH_FAIL");
        assert_eq!(FETCH.error_type(), "test/FETCH_ERROR");
        assert_eq!(FETCH.to_string(), "test/FETCH");
    }

    #[test]
    fn test_static_and_owned_kinds_compare_equal() {
        assert_eq!(FETCH, ActionKind::new(String::from("test/FETCH")));
        assert_ne!(FETCH, ActionKind::new("test/OTHER"));
    }

    #[test]
    fn test_intent_builders() {
        let get = Intent::get(FETCH, "/api/things/1");
        assert_eq!(get.method(), Method::Get);
        assert!(get.payload().is_none());

        let patch = Intent::patch(FETCH, "/api/things/1", json!({"name": "x"}));
        let (kind, method, target, payload) = patch.into_parts();
        assert_eq!(kind, FETCH);
        assert_eq!(method, Method::Patch);
        assert_eq!(target, "/api/things/1");
        assert_eq!(payload, Some(json!({"name": "x"})));
    }

    #[test]
    fn test_method_serializes_upper_case() {
        assert_eq!(serde_json::to_value(Method::Delete).ok(), Some(json!("DELETE")));
        assert_eq!(Method::Head.to_string(), "HEAD");
    }

    #[test]
    fn test_intent_id_display() {
        assert_eq!(IntentId::new(7).to_string(), "intent-7");
        assert_eq!(IntentId::new(7).value(), 7);
    }
}
