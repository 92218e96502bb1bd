//! Ergonomic testing utilities for slice reducers
//!
//! This module provides a fluent API for testing slice reducers with readable
//! Given-When-Then syntax.

#![allow(clippy::module_name_repetitions)] // SliceReducerTest is the natural name

use slate_core::{LifecycleMessage, Reduction, SliceReducer};

/// Type alias for state assertion functions
type StateAssertion<S> = Box<dyn FnOnce(&S)>;

/// Fluent API for testing slice reducers with Given-When-Then syntax
///
/// Messages are applied in order, each to the state the previous one left.
///
/// # Example
///
/// ```ignore
/// use slate_testing::{SliceReducerTest, lifecycle};
///
/// SliceReducerTest::new(candidate::reducer())
///     .given_state(CandidateState::default())
///     .when_message(lifecycle::started(FETCH_CANDIDATE, 1))
///     .when_message(lifecycle::failed_application(FETCH_CANDIDATE, 1, "not found"))
///     .then_state(|state| {
///         assert_eq!(state.load_error, "not found");
///     })
///     .run();
/// ```
pub struct SliceReducerTest<R: SliceReducer> {
    reducer: R,
    initial_state: Option<R::State>,
    messages: Vec<LifecycleMessage>,
    state_assertions: Vec<StateAssertion<R::State>>,
    expect_unchanged: bool,
}

impl<R: SliceReducer> SliceReducerTest<R> {
    /// Create a new reducer test with the given reducer
    #[must_use]
    pub const fn new(reducer: R) -> Self {
        Self {
            reducer,
            initial_state: None,
            messages: Vec::new(),
            state_assertions: Vec::new(),
            expect_unchanged: false,
        }
    }

    /// Set the initial state (Given)
    #[must_use]
    pub fn given_state(mut self, state: R::State) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Add a message to apply (When)
    #[must_use]
    pub fn when_message(mut self, message: LifecycleMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Add several messages to apply in order (When)
    #[must_use]
    pub fn when_messages(mut self, messages: impl IntoIterator<Item = LifecycleMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Add an assertion about the resulting state (Then)
    #[must_use]
    pub fn then_state<F>(mut self, assertion: F) -> Self
    where
        F: FnOnce(&R::State) + 'static,
    {
        self.state_assertions.push(Box::new(assertion));
        self
    }

    /// Assert that every message passed through unchanged (Then)
    #[must_use]
    pub const fn then_unchanged(mut self) -> Self {
        self.expect_unchanged = true;
        self
    }

    /// Run the test and execute all assertions
    ///
    /// # Panics
    ///
    /// Panics if the initial state or messages are not set, or if any
    /// assertion fails.
    #[allow(clippy::panic)] // Test code can panic
    #[allow(clippy::expect_used)] // Test code can use expect
    pub fn run(self) {
        let mut state = self
            .initial_state
            .expect("Initial state must be set with given_state()");

        assert!(
            !self.messages.is_empty(),
            "At least one message must be set with when_message()"
        );

        for message in &self.messages {
            match self.reducer.reduce(&state, message) {
                Reduction::Unchanged => {}
                Reduction::Next(next) => {
                    assert!(
                        !self.expect_unchanged,
                        "Expected {} to pass through unchanged",
                        message.type_name()
                    );
                    state = next;
                }
            }
        }

        for assertion in self.state_assertions {
            assertion(&state);
        }
    }
}

/// Helper assertions for store events
pub mod assertions {
    use slate_core::LifecycleMessage;
    use slate_runtime::StoreEvent;

    /// Assert the lifecycle phases of the recorded messages
    ///
    /// # Panics
    ///
    /// Panics if the phases differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_phases(messages: &[LifecycleMessage], expected: &[&str]) {
        let phases: Vec<&str> = messages.iter().map(LifecycleMessage::phase).collect();
        assert_eq!(phases, expected, "Unexpected lifecycle phases");
    }

    /// Assert that an event changed exactly the given slices
    ///
    /// # Panics
    ///
    /// Panics if the changed slices differ.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_changed(event: &StoreEvent, expected: &[&str]) {
        assert_eq!(
            event.changed, expected,
            "Unexpected changed slices for {}",
            event.message.type_name()
        );
    }

    /// Assert that an event changed no slice
    ///
    /// # Panics
    ///
    /// Panics if any slice changed.
    #[allow(clippy::panic)] // Test assertion
    pub fn assert_unchanged(event: &StoreEvent) {
        assert!(
            event.changed.is_empty(),
            "Expected no slice to change, but found {:?}",
            event.changed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle;
    use slate_core::{ActionKind, reducer_fn};

    const BUMP: ActionKind = ActionKind::from_static("test/BUMP");

    fn counter() -> impl SliceReducer<State = u32> {
        reducer_fn(|count: &u32, message: &LifecycleMessage| {
            if message.is_kind(&BUMP) && message.is_terminal() {
                Reduction::Next(count + 1)
            } else {
                Reduction::Unchanged
            }
        })
    }

    #[test]
    fn test_messages_apply_in_order() {
        SliceReducerTest::new(counter())
            .given_state(0)
            .when_message(lifecycle::started(BUMP, 1))
            .when_message(lifecycle::failed_transport(BUMP, 1))
            .when_message(lifecycle::succeeded(BUMP, 2, serde_json::Value::Null))
            .then_state(|count| assert_eq!(*count, 2))
            .run();
    }

    #[test]
    fn test_then_unchanged() {
        SliceReducerTest::new(counter())
            .given_state(7)
            .when_messages([
                lifecycle::started(BUMP, 1),
                lifecycle::failed_transport(ActionKind::from_static("other/KIND"), 2),
            ])
            .then_unchanged()
            .then_state(|count| assert_eq!(*count, 7))
            .run();
    }

    #[test]
    #[should_panic(expected = "pass through unchanged")]
    fn test_then_unchanged_detects_change() {
        SliceReducerTest::new(counter())
            .given_state(0)
            .when_message(lifecycle::failed_transport(BUMP, 1))
            .then_unchanged()
            .run();
    }

    #[test]
    fn test_assert_phases() {
        assertions::assert_phases(
            &[lifecycle::started(BUMP, 1), lifecycle::failed_transport(BUMP, 1)],
            &["started", "failed_transport"],
        );
    }
}
