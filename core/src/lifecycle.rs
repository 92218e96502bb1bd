//! Lifecycle messages: the tagged events describing an intent's progress.
//!
//! Every dispatched intent produces exactly two messages: [`LifecycleMessage::Started`]
//! followed by one terminal message ([`Succeeded`], [`FailedTransport`] or
//! [`FailedApplication`]). The store fans each message out to every registered
//! slice; slices match on the [`ActionKind`] they own and pass everything else
//! through unchanged.
//!
//! [`Succeeded`]: LifecycleMessage::Succeeded
//! [`FailedTransport`]: LifecycleMessage::FailedTransport
//! [`FailedApplication`]: LifecycleMessage::FailedApplication

use crate::intent::{ActionKind, IntentId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One step in an intent's lifecycle
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum LifecycleMessage {
    /// The intent was dispatched; its transport call is pending
    Started {
        /// Originating action kind
        kind: ActionKind,
        /// Originating intent instance
        id: IntentId,
    },

    /// The transport returned a well-formed response
    Succeeded {
        /// Originating action kind
        kind: ActionKind,
        /// Originating intent instance
        id: IntentId,
        /// Parsed response payload
        data: Value,
    },

    /// No interpretable response (network failure, timeout, malformed body)
    FailedTransport {
        /// Originating action kind
        kind: ActionKind,
        /// Originating intent instance
        id: IntentId,
    },

    /// The remote endpoint reported a structured error
    FailedApplication {
        /// Originating action kind
        kind: ActionKind,
        /// Originating intent instance
        id: IntentId,
        /// Error message reported by the endpoint
        message: String,
    },
}

impl LifecycleMessage {
    /// The action kind this message belongs to
    #[must_use]
    pub const fn kind(&self) -> &ActionKind {
        match self {
            Self::Started { kind, .. }
            | Self::Succeeded { kind, .. }
            | Self::FailedTransport { kind, .. }
            | Self::FailedApplication { kind, .. } => kind,
        }
    }

    /// The intent instance this message belongs to
    #[must_use]
    pub const fn id(&self) -> IntentId {
        match self {
            Self::Started { id, .. }
            | Self::Succeeded { id, .. }
            | Self::FailedTransport { id, .. }
            | Self::FailedApplication { id, .. } => *id,
        }
    }

    /// Whether this message ends its intent's lifecycle
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Started { .. })
    }

    /// Whether this message belongs to `kind`
    #[must_use]
    pub fn is_kind(&self, kind: &ActionKind) -> bool {
        self.kind() == kind
    }

    /// Wire type name, e.g. `app/FETCH_THING_OK`
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Self::Started { kind, .. } => kind.as_str().to_owned(),
            Self::Succeeded { kind, .. } => kind.ok_type(),
            Self::FailedTransport { kind, .. } => kind.fail_type(),
            Self::FailedApplication { kind, .. } => kind.error_type(),
        }
    }

    /// Short lowercase phase name, used as a log and metric label
    #[must_use]
    pub const fn phase(&self) -> &'static str {
        match self {
            Self::Started { .. } => "started",
            Self::Succeeded { .. } => "succeeded",
            Self::FailedTransport { .. } => "failed_transport",
            Self::FailedApplication { .. } => "failed_application",
        }
    }
}
