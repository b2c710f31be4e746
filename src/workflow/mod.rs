//! Grow Workflow Engine
//!
//! Computes the steps needed to grow one file system, validates what the
//! operator enters at each step and commits the result as a single grow.
//!
//! ## Components
//!
//! - **Constraints**: LUN and striped-group budgets derived from file-system facts
//! - **Selection**: the per-session store of choices and device selections
//! - **Sequencer**: pure step-sequence computation
//! - **Validator**: one check per step kind
//! - **Controller**: session lifecycle (start, advance, back, cancel, finish)
//! - **Arbiter**: decides which of several open sessions on a server may commit

pub mod arbiter;
pub mod constraints;
pub mod controller;
pub mod events;
pub mod metrics;
pub mod selection;
pub mod sequencer;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use arbiter::{SessionToken, WorkflowArbiter, WorkflowKind};
pub use constraints::{max_devices_addable, Facts, GrowthLimits, StripedGroupCapacity};
pub use controller::{GrowOutcome, SessionState, StepResponse, WorkflowController, WorkflowSession};
pub use events::WorkflowEvent;
pub use metrics::WorkflowMetrics;
pub use selection::{Choices, ErrorState, SelectionStore, SelectionTarget, Severity, StripedGroupPlan};
pub use sequencer::{StepDescriptor, StepKind, StepSequence, StepSequencer};
pub use validator::{DeviceInventory, StepInput, StepValidator, ValidationPolicy};
