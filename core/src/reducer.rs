//! Slice reducers: pure functions from `(state, message)` to the next state.
//!
//! A slice reducer never mutates the state it is given. It either reports
//! [`Reduction::Unchanged`] (the mandatory default for messages it does not
//! recognize) or returns a brand new value in [`Reduction::Next`]. The store
//! keeps the previous `Arc` for unchanged slices, so observers can detect
//! changes by pointer comparison.
//!
//! # Example
//!
//! ```
//! use slate_core::intent::{ActionKind, IntentId};
//! use slate_core::lifecycle::LifecycleMessage;
//! use slate_core::reducer::{Reduction, SliceReducer};
//!
//! const FETCH_COUNT: ActionKind = ActionKind::from_static("app/FETCH_COUNT");
//!
//! struct FetchCounter;
//!
//! impl SliceReducer for FetchCounter {
//!     type State = u32;
//!
//!     fn reduce(&self, state: &u32, message: &LifecycleMessage) -> Reduction<u32> {
//!         match message {
//!             LifecycleMessage::Started { kind, .. } if *kind == FETCH_COUNT => {
//!                 Reduction::Next(state + 1)
//!             }
//!             _ => Reduction::Unchanged,
//!         }
//!     }
//! }
//!
//! let started = LifecycleMessage::Started { kind: FETCH_COUNT, id: IntentId::new(1) };
//! assert_eq!(FetchCounter.reduce(&0, &started), Reduction::Next(1));
//! ```

use crate::lifecycle::LifecycleMessage;
use std::marker::PhantomData;

/// Result of applying one message to a slice
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reduction<S> {
    /// The message does not concern this slice; keep the current state
    Unchanged,
    /// The slice's next state
    Next(S),
}

impl<S> Reduction<S> {
    /// Whether the reducer produced a new state
    #[must_use]
    pub const fn is_changed(&self) -> bool {
        matches!(self, Self::Next(_))
    }

    /// Map the produced state, if any
    pub fn map<T, F>(self, f: F) -> Reduction<T>
    where
        F: FnOnce(S) -> T,
    {
        match self {
            Self::Unchanged => Reduction::Unchanged,
            Self::Next(state) => Reduction::Next(f(state)),
        }
    }

    /// The produced state, if any
    #[must_use]
    pub fn into_next(self) -> Option<S> {
        match self {
            Self::Unchanged => None,
            Self::Next(state) => Some(state),
        }
    }

    /// Resolve to a concrete state, cloning `current` when unchanged
    #[must_use]
    pub fn resolve(self, current: &S) -> S
    where
        S: Clone,
    {
        match self {
            Self::Unchanged => current.clone(),
            Self::Next(state) => state,
        }
    }
}

impl<S> From<Option<S>> for Reduction<S> {
    fn from(next: Option<S>) -> Self {
        next.map_or(Self::Unchanged, Self::Next)
    }
}

/// The per-feature reducer contract
///
/// Implementations must be pure: no I/O, no blocking, no interior mutation.
/// Reducers run while the store's registry lock is held.
pub trait SliceReducer: Send + Sync + 'static {
    /// The slice's state type
    type State: Send + Sync + 'static;

    /// Compute the slice's next state for `message`
    ///
    /// Messages the slice does not recognize must return [`Reduction::Unchanged`].
    fn reduce(&self, state: &Self::State, message: &LifecycleMessage) -> Reduction<Self::State>;
}

/// A [`SliceReducer`] backed by a closure
///
/// Created by [`reducer_fn`].
pub struct FnReducer<S, F> {
    f: F,
    _state: PhantomData<fn() -> S>,
}

impl<S, F> std::fmt::Debug for FnReducer<S, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnReducer")
            .field("state", &std::any::type_name::<S>())
            .finish_non_exhaustive()
    }
}

/// Build a slice reducer from a closure
///
/// ```
/// use slate_core::lifecycle::LifecycleMessage;
/// use slate_core::reducer::{reducer_fn, Reduction, SliceReducer};
///
/// let terminal_count = reducer_fn(|count: &u64, message: &LifecycleMessage| {
///     if message.is_terminal() {
///         Reduction::Next(count + 1)
///     } else {
///         Reduction::Unchanged
///     }
/// });
/// # let _ = terminal_count;
/// ```
pub const fn reducer_fn<S, F>(f: F) -> FnReducer<S, F>
where
    F: Fn(&S, &LifecycleMessage) -> Reduction<S>,
{
    FnReducer {
        f,
        _state: PhantomData,
    }
}

impl<S, F> SliceReducer for FnReducer<S, F>
where
    S: Send + Sync + 'static,
    F: Fn(&S, &LifecycleMessage) -> Reduction<S> + Send + Sync + 'static,
{
    type State = S;

    fn reduce(&self, state: &S, message: &LifecycleMessage) -> Reduction<S> {
        (self.f)(state, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{ActionKind, IntentId};

    const PING: ActionKind = ActionKind::from_static("test/PING");

    #[test]
    fn test_reduction_helpers() {
        let next: Reduction<i32> = Reduction::Next(2);
        assert!(next.is_changed());
        assert_eq!(next.clone().map(|n| n * 10), Reduction::Next(20));
        assert_eq!(next.resolve(&1), 2);

        let unchanged: Reduction<i32> = Reduction::Unchanged;
        assert!(!unchanged.is_changed());
        assert_eq!(unchanged.clone().into_next(), None);
        assert_eq!(unchanged.resolve(&1), 1);

        assert_eq!(Reduction::from(Some(5)), Reduction::Next(5));
        assert_eq!(Reduction::<i32>::from(None), Reduction::Unchanged);
    }

    #[test]
    fn test_fn_reducer_matches_its_kind_only() {
        let reducer = reducer_fn(|seen: &Vec<String>, message: &LifecycleMessage| {
            if message.is_kind(&PING) {
                let mut next = seen.clone();
                next.push(message.type_name());
                Reduction::Next(next)
            } else {
                Reduction::Unchanged
            }
        });

        let ours = LifecycleMessage::Started { kind: PING, id: IntentId::new(1) };
        let foreign = LifecycleMessage::Started {
            kind: ActionKind::from_static("test/OTHER"),
            id: IntentId::new(2),
        };

        let state = Vec::new();
        assert_eq!(reducer.reduce(&state, &foreign), Reduction::Unchanged);
        assert_eq!(
            reducer.reduce(&state, &ours),
            Reduction::Next(vec!["test/PING".to_string()])
        );
        assert!(state.is_empty());
    }
}
