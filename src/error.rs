//! Error types for the grow workflow
//!
//! Provides structured error types for every stage of a capacity-expansion
//! session: operator input, LUN conflicts, collaborator calls, and session
//! integrity.

use crate::domain::ports::DeviceId;
use thiserror::Error;

/// Unified error type for the workflow engine
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Operator Input Errors
    // =========================================================================
    #[error("no growth method selected")]
    NoGrowthMethod,

    #[error("no metadata device selected")]
    NoMetadataDevice,

    #[error("no data device selected")]
    NoDataDevice,

    #[error("data growth was explicitly requested but nothing was selected")]
    DataRequestedButEmpty,

    #[error("LUN limit exceeded: {requested} selected, {available} available")]
    LunLimitExceeded { requested: usize, available: usize },

    #[error("striped group device size mismatch in group {group}: all members must share one capacity")]
    StripedGroupSizeMismatch { group: u32 },

    #[error("invalid striped group count {input:?}: enter a number between 0 and {max}")]
    InvalidStripedGroupCount { input: String, max: u32 },

    #[error("device not allocatable: {device}")]
    DeviceNotAllocatable { device: DeviceId },

    #[error("input does not belong to step {step}")]
    UnexpectedInput { step: String },

    #[error("step {requested} is not the current step ({current})")]
    StepOutOfOrder { requested: String, current: String },

    // =========================================================================
    // Domain Conflict Errors
    // =========================================================================
    #[error("overlapping LUNs selected:{}", render_device_list(.devices))]
    LunOverlap { devices: Vec<DeviceId> },

    // =========================================================================
    // Collaborator Errors
    // =========================================================================
    #[error("{operation} failed ({code}): {message}")]
    Collaborator {
        operation: String,
        code: i32,
        message: String,
    },

    // =========================================================================
    // Integrity Errors
    // =========================================================================
    #[error("file system {filesystem} not found on {server}")]
    FileSystemNotFound { server: String, filesystem: String },

    #[error("server not found: {server}")]
    ServerNotFound { server: String },

    #[error("workflow session is not usable: {0}")]
    SessionUnavailable(String),

    #[error("another grow workflow is active on {server}")]
    SessionSuperseded { server: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("YAML parse error: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn render_device_list(devices: &[DeviceId]) -> String {
    devices.iter().map(|d| format!("\n{}", d)).collect()
}

/// Failure category, used to decide how a failure is surfaced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Recoverable on the current step
    UserInput,
    /// Recoverable on the current step, carries offending identifiers
    DomainConflict,
    /// An external call failed
    Collaborator,
    /// The session can no longer continue
    Integrity,
    /// Bug or environment problem
    Internal,
}

/// Where in the session lifecycle an error was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Start,
    Step,
    Finish,
}

impl Error {
    /// Build a collaborator error
    pub fn collaborator(operation: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Error::Collaborator {
            operation: operation.into(),
            code,
            message: message.into(),
        }
    }

    /// Taxonomy for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoGrowthMethod
            | Error::NoMetadataDevice
            | Error::NoDataDevice
            | Error::DataRequestedButEmpty
            | Error::LunLimitExceeded { .. }
            | Error::StripedGroupSizeMismatch { .. }
            | Error::InvalidStripedGroupCount { .. }
            | Error::DeviceNotAllocatable { .. }
            | Error::UnexpectedInput { .. }
            | Error::StepOutOfOrder { .. } => ErrorKind::UserInput,

            Error::LunOverlap { .. } => ErrorKind::DomainConflict,

            Error::Collaborator { .. } => ErrorKind::Collaborator,

            Error::FileSystemNotFound { .. }
            | Error::ServerNotFound { .. }
            | Error::SessionUnavailable(_)
            | Error::SessionSuperseded { .. } => ErrorKind::Integrity,

            Error::Internal(_)
            | Error::Configuration(_)
            | Error::YamlParse(_)
            | Error::Io(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoGrowthMethod => "no_growth_method",
            Error::NoMetadataDevice => "no_metadata_device",
            Error::NoDataDevice => "no_data_device",
            Error::DataRequestedButEmpty => "data_requested_but_empty",
            Error::LunLimitExceeded { .. } => "lun_limit_exceeded",
            Error::StripedGroupSizeMismatch { .. } => "device_size_mismatch",
            Error::InvalidStripedGroupCount { .. } => "invalid_striped_group_count",
            Error::DeviceNotAllocatable { .. } => "device_not_allocatable",
            Error::UnexpectedInput { .. } => "unexpected_input",
            Error::StepOutOfOrder { .. } => "step_out_of_order",
            Error::LunOverlap { .. } => "lun_overlap",
            Error::Collaborator { .. } => "collaborator_failure",
            Error::FileSystemNotFound { .. } => "file_system_not_found",
            Error::ServerNotFound { .. } => "server_not_found",
            Error::SessionUnavailable(_) => "session_unavailable",
            Error::SessionSuperseded { .. } => "session_superseded",
            Error::Internal(_) => "internal",
            Error::Configuration(_) => "configuration",
            Error::YamlParse(_) => "yaml_parse",
            Error::Io(_) => "io",
        }
    }

    /// Whether this error ends the session when raised in `phase`
    pub fn is_fatal_during(&self, phase: Phase) -> bool {
        match self.kind() {
            ErrorKind::UserInput | ErrorKind::DomainConflict => false,
            ErrorKind::Collaborator => matches!(phase, Phase::Start | Phase::Finish),
            ErrorKind::Integrity | ErrorKind::Internal => true,
        }
    }

    /// Identifiers the operator has to deselect, if any
    pub fn offending_devices(&self) -> &[DeviceId] {
        match self {
            Error::LunOverlap { devices } => devices,
            Error::DeviceNotAllocatable { device } => std::slice::from_ref(device),
            _ => &[],
        }
    }
}

/// Result type alias for the workflow engine
pub type Result<T> = std::result::Result<T, Error>;
