//! GrowFS Wizard - Guided Capacity Expansion
//!
//! Works out the steps needed to grow one clustered file system with new
//! metadata, data and striped-group devices, validates each step against
//! the LUN budget and overlap rules, and commits everything as a single
//! grow operation.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          REST API (axum)                                │
//! │        /v1/sessions  ·  advance  ·  back  ·  finish  ·  /metrics        │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                        Workflow Controller                              │
//! │   ┌──────────────┐   ┌──────────────┐   ┌──────────────┐   ┌─────────┐  │
//! │   │   Sequencer  │   │   Validator  │   │  Selection   │   │ Arbiter │  │
//! │   │ (step list)  │   │ (per step)   │   │    Store     │   │ (token) │  │
//! │   └──────────────┘   └──────┬───────┘   └──────────────┘   └─────────┘  │
//! │                             │                                           │
//! │                   ┌─────────┴─────────┐                                 │
//! │                   │ Growth Constraints│                                 │
//! │                   │   (LUN budget)    │                                 │
//! │                   └───────────────────┘                                 │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                         Collaborator Ports                              │
//! │   ┌────────────────┐   ┌────────────────┐   ┌───────────────────────┐   │
//! │   │ DeviceCatalog  │   │ OverlapChecker │   │   FileSystemAdmin     │   │
//! │   └────────────────┘   └────────────────┘   └───────────────────────┘   │
//! │                  implemented by StaticInventory (YAML)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`workflow`]: sequencing, validation and the session state machine
//! - [`domain`]: value types and collaborator ports
//! - [`adapters`]: port implementations
//! - [`api`]: REST server
//! - [`config`]: configuration loading
//! - [`error`]: error types and taxonomy

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod workflow;

// Re-export commonly used types
pub use adapters::StaticInventory;
pub use api::{ApiServer, RestRouter};
pub use config::{ApiConfig, WizardConfig};

pub use domain::ports::{
    Device, DeviceCatalog, DeviceId, FileSystemAdmin, FileSystemInfo, GrowRequest, OverlapChecker,
    StripedGroupDescriptor,
};

pub use error::{Error, ErrorKind, Phase, Result};

pub use workflow::{
    ErrorState, GrowOutcome, GrowthLimits, SessionState, Severity, StepDescriptor, StepInput, StepKind,
    StepResponse, StepSequence, StepSequencer, StripedGroupPlan, ValidationPolicy, WorkflowArbiter,
    WorkflowController, WorkflowEvent, WorkflowSession,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
