//! # Candidate Slice
//!
//! A fetch-backed slice holding one transient candidate, demonstrating the
//! Slate architecture.
//!
//! This example showcases:
//! - Declaring an action kind and an intent constructor
//! - Slice state with typed fields plus pass-through extras
//! - Delegating the fetch lifecycle to [`FetchReducer`]
//! - Registering the slice when the feature loads
//!
//! ## Lifecycle
//!
//! | message                 | `CandidateState`                                      |
//! |-------------------------|-------------------------------------------------------|
//! | `Started`               | unchanged                                             |
//! | `Succeeded { data }`    | candidate fields merged, `loadError = ""`             |
//! | `FailedApplication`     | `loadError` = server message                          |
//! | `FailedTransport`       | `loadError = "Unknown error while loading candidate"` |
//!
//! ## Example
//!
//! ```no_run
//! use candidate::{CandidateState, SLICE};
//! use slate_runtime::http::HttpTransport;
//! use slate_runtime::{Dispatcher, Store};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Store::new();
//! candidate::register(&store)?;
//!
//! let dispatcher = Dispatcher::new(store.clone(), HttpTransport::from_env()?);
//! dispatcher.dispatch_and_wait(candidate::fetch_candidate("ZTF21aaqjmps")).await?;
//!
//! let state = store.get_state::<CandidateState>(SLICE)?.or_initial(CandidateState::default());
//! println!("ra = {:?}", state.ra);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use slate_core::{ActionKind, FetchReducer, Intent, Loadable};
use slate_runtime::{Store, StoreError};

/// Action kind of the candidate fetch
pub const FETCH_CANDIDATE: ActionKind = ActionKind::from_static("skyportal/FETCH_CANDIDATE");

/// Name the slice is registered under
pub const SLICE: &str = "candidate";

/// `loadError` after a transport failure
pub const CANDIDATE_LOAD_ERROR: &str = "Unknown error while loading candidate";

/// Candidate slice state
///
/// Fields the server sends beyond the typed ones (`dm`, `photometry`,
/// `spectra`, …) are kept in `extra` and survive merges.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateState {
    /// Object identifier
    #[serde(default)]
    pub id: Option<String>,
    /// Right ascension in degrees
    #[serde(default)]
    pub ra: Option<f64>,
    /// Declination in degrees
    #[serde(default)]
    pub dec: Option<f64>,
    /// Redshift, when measured
    #[serde(default)]
    pub redshift: Option<f64>,
    /// Last load error (`""` when none)
    #[serde(rename = "loadError", default)]
    pub load_error: String,
    /// Any other candidate fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CandidateState {
    /// Whether a candidate has been loaded
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.id.is_some()
    }
}

impl Loadable for CandidateState {
    fn load_error(&self) -> &str {
        &self.load_error
    }

    fn set_load_error(&mut self, message: String) {
        self.load_error = message;
    }
}

/// Intent fetching candidate `id`
#[must_use]
pub fn fetch_candidate(id: &str) -> Intent {
    Intent::get(FETCH_CANDIDATE, format!("/api/candidates/{id}"))
}

/// The candidate slice reducer
#[must_use]
pub fn reducer() -> FetchReducer<CandidateState> {
    FetchReducer::new(FETCH_CANDIDATE).with_transport_error(CANDIDATE_LOAD_ERROR)
}

/// Register the candidate slice with `store`
///
/// Calling this again (e.g., after a hot reload) swaps the reducer and keeps
/// the loaded candidate.
///
/// # Errors
///
/// Returns [`StoreError::StateTypeMismatch`] if another feature already
/// registered `"candidate"` with a different state type.
pub fn register(store: &Store) -> Result<(), StoreError> {
    store.register_slice(SLICE, reducer(), CandidateState::default())
}
