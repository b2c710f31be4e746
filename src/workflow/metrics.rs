//! Workflow Metrics
//!
//! Prometheus counters for grow sessions, kept in a private registry so
//! several controllers (and tests) never collide on metric names.

use crate::error::{Error, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Counters for the grow workflow
#[derive(Clone)]
pub struct WorkflowMetrics {
    registry: Registry,
    sessions_started: IntCounter,
    steps_accepted: IntCounterVec,
    steps_rejected: IntCounterVec,
    grow_operations: IntCounterVec,
}

impl WorkflowMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let sessions_started = IntCounter::new(
            "growfs_sessions_started_total",
            "Total number of grow sessions started",
        )
        .map_err(metrics_error)?;
        let steps_accepted = IntCounterVec::new(
            Opts::new("growfs_steps_accepted_total", "Accepted step submissions"),
            &["step"],
        )
        .map_err(metrics_error)?;
        let steps_rejected = IntCounterVec::new(
            Opts::new("growfs_steps_rejected_total", "Rejected step submissions"),
            &["step", "code"],
        )
        .map_err(metrics_error)?;
        let grow_operations = IntCounterVec::new(
            Opts::new("growfs_grow_operations_total", "Grow operations by result"),
            &["result"],
        )
        .map_err(metrics_error)?;

        registry
            .register(Box::new(sessions_started.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(steps_accepted.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(steps_rejected.clone()))
            .map_err(metrics_error)?;
        registry
            .register(Box::new(grow_operations.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            sessions_started,
            steps_accepted,
            steps_rejected,
            grow_operations,
        })
    }

    pub fn record_session_started(&self) {
        self.sessions_started.inc();
    }

    pub fn record_step_accepted(&self, step: &str) {
        self.steps_accepted.with_label_values(&[step]).inc();
    }

    pub fn record_step_rejected(&self, step: &str, code: &str) {
        self.steps_rejected.with_label_values(&[step, code]).inc();
    }

    pub fn record_grow(&self, succeeded: bool) {
        let result = if succeeded { "success" } else { "failure" };
        self.grow_operations.with_label_values(&[result]).inc();
    }

    pub fn sessions_started(&self) -> u64 {
        self.sessions_started.get()
    }

    pub fn steps_rejected(&self, step: &str, code: &str) -> u64 {
        self.steps_rejected.with_label_values(&[step, code]).get()
    }

    pub fn grow_operations(&self, succeeded: bool) -> u64 {
        let result = if succeeded { "success" } else { "failure" };
        self.grow_operations.with_label_values(&[result]).get()
    }

    /// Render all counters in the text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(format!("metrics encoding: {}", e)))
    }
}

impl std::fmt::Debug for WorkflowMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowMetrics")
            .field("sessions_started", &self.sessions_started.get())
            .finish()
    }
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics: {}", e))
}
