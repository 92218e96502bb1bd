//! Slice reducer composition utilities
//!
//! - **[`combine`]**: run two reducers over the same slice state
//! - **[`scope`]**: focus a reducer on one field of a larger slice state
//!
//! A slice that reacts to several action kinds (fetch and save, say) is built by
//! combining one [`FetchReducer`](crate::loadable::FetchReducer) per kind, or by
//! scoping each onto its own sub-state.
//!
//! # Example
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use slate_core::composition::scope;
//! use slate_core::intent::{ActionKind, IntentId};
//! use slate_core::lifecycle::LifecycleMessage;
//! use slate_core::loadable::{Document, FetchReducer};
//! use slate_core::reducer::SliceReducer;
//! use serde_json::json;
//!
//! const FETCH_GROUPS: ActionKind = ActionKind::from_static("app/FETCH_GROUPS");
//!
//! #[derive(Clone, Default)]
//! struct ProfileState {
//!     groups: Document,
//!     theme: String,
//! }
//!
//! let reducer = scope(
//!     FetchReducer::<Document>::new(FETCH_GROUPS),
//!     |profile: &ProfileState| &profile.groups,
//!     |profile: &ProfileState, groups: Document| ProfileState { groups, ..profile.clone() },
//! );
//!
//! let message = LifecycleMessage::Succeeded {
//!     kind: FETCH_GROUPS,
//!     id: IntentId::new(1),
//!     data: json!({"count": 2}),
//! };
//! let next = reducer.reduce(&ProfileState::default(), &message).into_next();
//! assert_eq!(next.and_then(|p| p.groups.get("count").cloned()), Some(json!(2)));
//! ```

use crate::lifecycle::LifecycleMessage;
use crate::reducer::{Reduction, SliceReducer};
use std::marker::PhantomData;

/// Run `first` then `second` over the same state
///
/// When `first` produces a new state, `second` sees that state. The combined
/// reducer reports [`Reduction::Unchanged`] only when both do.
#[must_use]
pub const fn combine<A, B>(first: A, second: B) -> Combined<A, B>
where
    A: SliceReducer,
    B: SliceReducer<State = A::State>,
{
    Combined { first, second }
}

/// Two reducers over one state
///
/// Created by [`combine`].
#[derive(Debug, Clone)]
pub struct Combined<A, B> {
    first: A,
    second: B,
}

impl<A, B> SliceReducer for Combined<A, B>
where
    A: SliceReducer,
    B: SliceReducer<State = A::State>,
{
    type State = A::State;

    fn reduce(&self, state: &Self::State, message: &LifecycleMessage) -> Reduction<Self::State> {
        match self.first.reduce(state, message) {
            Reduction::Unchanged => self.second.reduce(state, message),
            Reduction::Next(next) => match self.second.reduce(&next, message) {
                Reduction::Unchanged => Reduction::Next(next),
                changed @ Reduction::Next(_) => changed,
            },
        }
    }
}

/// Focus `reducer` on the part of `S` selected by `get`
///
/// `set` builds a new parent state from the old parent and the new child; it
/// only runs when the child reducer produced a change.
pub fn scope<S, R>(
    reducer: R,
    get: fn(&S) -> &R::State,
    set: fn(&S, R::State) -> S,
) -> Scoped<S, R>
where
    S: Send + Sync + 'static,
    R: SliceReducer,
{
    Scoped {
        reducer,
        get,
        set,
        _parent: PhantomData,
    }
}

/// A reducer applied to a sub-state
///
/// Created by [`scope`].
pub struct Scoped<S, R: SliceReducer> {
    reducer: R,
    get: fn(&S) -> &R::State,
    set: fn(&S, R::State) -> S,
    _parent: PhantomData<fn() -> S>,
}

impl<S, R> SliceReducer for Scoped<S, R>
where
    S: Send + Sync + 'static,
    R: SliceReducer,
{
    type State = S;

    fn reduce(&self, state: &S, message: &LifecycleMessage) -> Reduction<S> {
        self.reducer
            .reduce((self.get)(state), message)
            .map(|child| (self.set)(state, child))
    }
}
