//! Load-state handling shared by every fetch-backed slice.
//!
//! A slice whose state implements [`Loadable`] can hand its lifecycle handling
//! to [`FetchReducer`]:
//!
//! | message                      | next state                                          |
//! |------------------------------|-----------------------------------------------------|
//! | `Started`                    | [`Loadable::begin_loading`] (unchanged by default)  |
//! | `Succeeded { data }`         | `data` fields merged over the state, `loadError = ""` |
//! | `FailedApplication { message }` | `loadError = message`                            |
//! | `FailedTransport`            | `loadError = "unknown error while loading"`         |
//! | anything for another kind    | unchanged                                           |
//!
//! Merging goes through serde: the current state is serialized to a JSON object,
//! the fields of `data` are laid over it and the result is deserialized back.
//! Any `Serialize + DeserializeOwned` struct therefore works as slice state.

use crate::intent::ActionKind;
use crate::lifecycle::LifecycleMessage;
use crate::reducer::{Reduction, SliceReducer};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::marker::PhantomData;
use thiserror::Error;

/// Message stored in `loadError` when the transport failed without detail
pub const UNKNOWN_LOAD_ERROR: &str = "unknown error while loading";

/// Serialized name of the load error field
pub const LOAD_ERROR_FIELD: &str = "loadError";

/// Errors produced when merging response data into a slice state
#[derive(Error, Debug)]
pub enum MergeError {
    /// The slice state does not serialize to a JSON object
    #[error("slice state does not serialize to a JSON object")]
    StateNotAnObject,

    /// The response data is neither an object nor null
    #[error("response data must be a JSON object, got {0}")]
    DataNotAnObject(&'static str),

    /// Serialization or deserialization of the merged state failed
    #[error("merged state does not fit the slice: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Slice state with a `loadError` field managed by lifecycle handling
///
/// `loadError` is the empty string when there is no error.
pub trait Loadable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Current load error (`""` when none)
    fn load_error(&self) -> &str;

    /// Replace the load error
    fn set_load_error(&mut self, message: String);

    /// State to use when a fetch starts; `None` leaves the state unchanged
    fn begin_loading(&self) -> Option<Self> {
        None
    }

    /// Hook run on the new state for every terminal message of the slice's kind
    fn finish_loading(&mut self) {}
}

/// Merge the fields of `data` over `state`; `data` fields take precedence
///
/// `null` data merges nothing. The returned state is a new value; `state` is
/// left untouched. The load error is not modified: a `loadError` key in `data`
/// is ignored.
///
/// # Errors
///
/// Returns [`MergeError`] if `data` is not an object (or null), or if the merged
/// object cannot be deserialized back into `S`.
pub fn merge_data<S>(state: &S, data: &Value) -> Result<S, MergeError>
where
    S: Serialize + DeserializeOwned,
{
    let overlay = match data {
        Value::Null => return Ok(serde_json::from_value(serde_json::to_value(state)?)?),
        Value::Object(fields) => fields,
        Value::Bool(_) => return Err(MergeError::DataNotAnObject("a boolean")),
        Value::Number(_) => return Err(MergeError::DataNotAnObject("a number")),
        Value::String(_) => return Err(MergeError::DataNotAnObject("a string")),
        Value::Array(_) => return Err(MergeError::DataNotAnObject("an array")),
    };

    let Value::Object(mut merged) = serde_json::to_value(state)? else {
        return Err(MergeError::StateNotAnObject);
    };

    for (key, value) in overlay {
        if key != LOAD_ERROR_FIELD {
            merged.insert(key.clone(), value.clone());
        }
    }

    Ok(serde_json::from_value(Value::Object(merged))?)
}

/// Generic reducer implementing the fetch lifecycle for one action kind
///
/// # Example
///
/// ```
/// use slate_core::intent::{ActionKind, IntentId};
/// use slate_core::lifecycle::LifecycleMessage;
/// use slate_core::loadable::{Document, FetchReducer, Loadable};
/// use slate_core::reducer::SliceReducer;
/// use serde_json::json;
///
/// const FETCH_SOURCE: ActionKind = ActionKind::from_static("app/FETCH_SOURCE");
///
/// let reducer = FetchReducer::<Document>::new(FETCH_SOURCE);
/// let failed = LifecycleMessage::FailedApplication {
///     kind: FETCH_SOURCE,
///     id: IntentId::new(1),
///     message: "not found".into(),
/// };
///
/// let next = reducer.reduce(&Document::default(), &failed).into_next();
/// assert_eq!(next.map(|doc| doc.load_error().to_string()), Some("not found".to_string()));
/// ```
pub struct FetchReducer<S> {
    kind: ActionKind,
    transport_error: Cow<'static, str>,
    _state: PhantomData<fn() -> S>,
}

impl<S> FetchReducer<S> {
    /// Handle the lifecycle of `kind` with the generic transport error message
    #[must_use]
    pub const fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            transport_error: Cow::Borrowed(UNKNOWN_LOAD_ERROR),
            _state: PhantomData,
        }
    }

    /// Use a slice-specific message for transport failures
    #[must_use]
    pub fn with_transport_error(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.transport_error = message.into();
        self
    }

    /// The action kind this reducer owns
    #[must_use]
    pub const fn kind(&self) -> &ActionKind {
        &self.kind
    }

    /// The message stored on transport failure
    #[must_use]
    pub fn transport_error(&self) -> &str {
        &self.transport_error
    }
}

impl<S> Clone for FetchReducer<S> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            transport_error: self.transport_error.clone(),
            _state: PhantomData,
        }
    }
}

impl<S> std::fmt::Debug for FetchReducer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchReducer")
            .field("kind", &self.kind)
            .field("transport_error", &self.transport_error)
            .finish_non_exhaustive()
    }
}

impl<S: Loadable> FetchReducer<S> {
    fn failed(&self, state: &S, message: String) -> S {
        let mut next = state.clone();
        next.set_load_error(message);
        next.finish_loading();
        next
    }
}

impl<S: Loadable> SliceReducer for FetchReducer<S> {
    type State = S;

    fn reduce(&self, state: &S, message: &LifecycleMessage) -> Reduction<S> {
        if !message.is_kind(&self.kind) {
            return Reduction::Unchanged;
        }

        match message {
            LifecycleMessage::Started { .. } => state.begin_loading().into(),
            LifecycleMessage::Succeeded { id, data, .. } => match merge_data(state, data) {
                Ok(mut next) => {
                    next.set_load_error(String::new());
                    next.finish_loading();
                    Reduction::Next(next)
                }
                Err(error) => {
                    tracing::warn!(
                        kind = %self.kind,
                        intent = %id,
                        error = %error,
                        "Response data could not be merged into slice state"
                    );
                    Reduction::Next(self.failed(state, self.transport_error.to_string()))
                }
            },
            LifecycleMessage::FailedApplication { message, .. } => {
                Reduction::Next(self.failed(state, message.clone()))
            }
            LifecycleMessage::FailedTransport { .. } => {
                Reduction::Next(self.failed(state, self.transport_error.to_string()))
            }
        }
    }
}

/// Schemaless loadable state: arbitrary JSON fields plus `loadError`
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Current load error (`""` when none)
    #[serde(rename = "loadError", default)]
    pub load_error: String,

    /// All other fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// A document seeded with the given fields
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            load_error: String::new(),
            fields,
        }
    }

    /// Look up a field
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Loadable for Document {
    fn load_error(&self) -> &str {
        &self.load_error
    }

    fn set_load_error(&mut self, message: String) {
        self.load_error = message;
    }
}
