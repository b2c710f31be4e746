//! Workflow Events
//!
//! Events emitted by the workflow controller for external consumers such
//! as audit logs or dashboards.

use super::arbiter::SessionToken;
use super::sequencer::StepKind;
use serde::{Deserialize, Serialize};

/// Events emitted over a session's lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// Facts loaded and first step ready
    SessionStarted {
        token: SessionToken,
        server: String,
        filesystem: String,
        steps: usize,
    },

    /// Session could not start
    SessionFailed {
        token: SessionToken,
        server: String,
        code: String,
    },

    /// A step's input was accepted
    StepAccepted { token: SessionToken, step: StepKind },

    /// A step's input was rejected
    StepRejected {
        token: SessionToken,
        step: StepKind,
        code: String,
    },

    /// The step sequence was recomputed
    SequenceChanged { token: SessionToken, steps: usize },

    /// The grow operation completed
    GrowSucceeded {
        token: SessionToken,
        server: String,
        filesystem: String,
        luns_added: usize,
    },

    /// The grow operation, or its preparation, failed
    GrowFailed {
        token: SessionToken,
        server: String,
        filesystem: String,
        code: String,
    },

    /// Finish refused because another session became active
    SessionSuperseded { token: SessionToken, server: String },

    /// The operator cancelled
    SessionCancelled { token: SessionToken },
}

impl WorkflowEvent {
    /// Get the session token associated with this event
    pub fn token(&self) -> SessionToken {
        match self {
            WorkflowEvent::SessionStarted { token, .. }
            | WorkflowEvent::SessionFailed { token, .. }
            | WorkflowEvent::StepAccepted { token, .. }
            | WorkflowEvent::StepRejected { token, .. }
            | WorkflowEvent::SequenceChanged { token, .. }
            | WorkflowEvent::GrowSucceeded { token, .. }
            | WorkflowEvent::GrowFailed { token, .. }
            | WorkflowEvent::SessionSuperseded { token, .. }
            | WorkflowEvent::SessionCancelled { token } => *token,
        }
    }

    /// Check if this event ends the session
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowEvent::SessionFailed { .. }
                | WorkflowEvent::GrowSucceeded { .. }
                | WorkflowEvent::GrowFailed { .. }
                | WorkflowEvent::SessionCancelled { .. }
        )
    }
}
