//! Workflow Controller
//!
//! Drives a grow session through its lifecycle:
//!
//! ```text
//! Initializing ──► InProgress ──► Finished
//!      │               │
//!      ▼               ▼
//!    Failed        Cancelled
//! ```
//!
//! `InProgress` holds a cursor over the current [`StepSequence`]. The
//! sequence is rebuilt only after a shape-changing step is accepted.

use super::arbiter::{SessionToken, WorkflowArbiter, WorkflowKind};
use super::constraints::{Facts, GrowthLimits};
use super::events::WorkflowEvent;
use super::metrics::WorkflowMetrics;
use super::selection::{ErrorState, SelectionStore, Severity};
use super::sequencer::{StepDescriptor, StepKind, StepSequence, StepSequencer};
use super::validator::{DeviceInventory, StepInput, StepValidator, ValidationPolicy};
use crate::domain::ports::{
    DeviceCatalogRef, FileSystemAdminRef, GrowRequest, OverlapCheckerRef, StripedGroupDescriptor,
};
use crate::error::{Error, Phase, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Session
// =============================================================================

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Initializing,
    InProgress,
    /// Start failed; only the error is available
    Failed,
    Cancelled,
    /// Finish ran; the outcome is on the result step
    Finished,
}

impl SessionState {
    /// No further step can run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Failed | SessionState::Cancelled | SessionState::Finished
        )
    }
}

/// Result of the final grow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GrowOutcome {
    Succeeded { luns_added: usize, message: String },
    Failed { error: ErrorState },
}

impl GrowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, GrowOutcome::Succeeded { .. })
    }
}

/// Everything a started session needs to run steps
#[derive(Debug, Clone)]
struct SessionContext {
    facts: Facts,
    inventory: DeviceInventory,
    store: SelectionStore,
    sequence: StepSequence,
    cursor: usize,
}

impl SessionContext {
    fn current(&self) -> Option<StepKind> {
        self.sequence.get(self.cursor)
    }
}

/// One operator's pass through the grow workflow
#[derive(Debug, Clone)]
pub struct WorkflowSession {
    token: SessionToken,
    server: String,
    filesystem: String,
    state: SessionState,
    created_at: DateTime<Utc>,
    context: Option<SessionContext>,
    /// Error raised before a context existed
    start_error: Option<ErrorState>,
    outcome: Option<GrowOutcome>,
}

impl WorkflowSession {
    fn new(token: SessionToken, server: &str, filesystem: &str) -> Self {
        Self {
            token,
            server: server.to_string(),
            filesystem: filesystem.to_string(),
            state: SessionState::Initializing,
            created_at: Utc::now(),
            context: None,
            start_error: None,
            outcome: None,
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn filesystem(&self) -> &str {
        &self.filesystem
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn facts(&self) -> Option<&Facts> {
        self.context.as_ref().map(|c| &c.facts)
    }

    pub fn selections(&self) -> Option<&SelectionStore> {
        self.context.as_ref().map(|c| &c.store)
    }

    pub fn inventory(&self) -> Option<&DeviceInventory> {
        self.context.as_ref().map(|c| &c.inventory)
    }

    /// The current step sequence with display ordinals
    pub fn step_sequence(&self) -> Vec<StepDescriptor> {
        self.context
            .as_ref()
            .map(|c| c.sequence.descriptors())
            .unwrap_or_default()
    }

    pub fn current_step(&self) -> Option<StepDescriptor> {
        let ctx = self.context.as_ref()?;
        ctx.current().map(|kind| StepDescriptor {
            kind,
            ordinal: ctx.cursor + 1,
        })
    }

    /// Steps after the current one
    pub fn future_steps(&self) -> Vec<StepDescriptor> {
        match &self.context {
            Some(ctx) => ctx
                .sequence
                .descriptors()
                .into_iter()
                .skip(ctx.cursor + 1)
                .collect(),
            None => Vec::new(),
        }
    }

    /// The single active error, if any
    pub fn error(&self) -> Option<&ErrorState> {
        self.start_error
            .as_ref()
            .or_else(|| self.context.as_ref().and_then(|c| c.store.error()))
    }

    pub fn outcome(&self) -> Option<&GrowOutcome> {
        self.outcome.as_ref()
    }

    fn response(&self, advanced: bool) -> StepResponse {
        StepResponse {
            advanced,
            error: self.error().cloned(),
            current: self.current_step(),
        }
    }

    /// Respond with an error that is not recorded on the session
    fn reject(&self, err: &Error, phase: Phase) -> StepResponse {
        StepResponse {
            advanced: false,
            error: Some(ErrorState::from_error(err, phase)),
            current: self.current_step(),
        }
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state != SessionState::InProgress || self.context.is_none() {
            return Err(Error::SessionUnavailable(format!(
                "session {} is {:?}",
                self.token, self.state
            )));
        }
        Ok(())
    }
}

/// Reply to every lifecycle call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResponse {
    /// Whether the cursor moved
    pub advanced: bool,
    pub error: Option<ErrorState>,
    pub current: Option<StepDescriptor>,
}

// =============================================================================
// Controller
// =============================================================================

/// Orchestrates sequencing, validation and the final grow
pub struct WorkflowController {
    catalog: DeviceCatalogRef,
    overlap: OverlapCheckerRef,
    filesystems: FileSystemAdminRef,
    arbiter: Arc<WorkflowArbiter>,
    limits: GrowthLimits,
    policy: ValidationPolicy,
    metrics: WorkflowMetrics,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowController {
    pub fn new(
        catalog: DeviceCatalogRef,
        overlap: OverlapCheckerRef,
        filesystems: FileSystemAdminRef,
        arbiter: Arc<WorkflowArbiter>,
        limits: GrowthLimits,
        policy: ValidationPolicy,
    ) -> Result<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            catalog,
            overlap,
            filesystems,
            arbiter,
            limits,
            policy,
            metrics: WorkflowMetrics::new()?,
            events,
        })
    }

    /// Subscribe to workflow events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    pub fn metrics(&self) -> &WorkflowMetrics {
        &self.metrics
    }

    pub fn arbiter(&self) -> &Arc<WorkflowArbiter> {
        &self.arbiter
    }

    pub fn limits(&self) -> &GrowthLimits {
        &self.limits
    }

    fn emit(&self, event: WorkflowEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    // -------------------------------------------------------------------------
    // Start
    // -------------------------------------------------------------------------

    /// Open a session for `filesystem` on `server`.
    ///
    /// A failure to load facts or discover devices yields a session in
    /// [`SessionState::Failed`] carrying a fatal error.
    #[instrument(skip(self))]
    pub async fn start(&self, server: &str, filesystem: &str) -> WorkflowSession {
        let token = self.arbiter.register(WorkflowKind::GrowFileSystem, server);
        let mut session = WorkflowSession::new(token, server, filesystem);

        match self.load_context(server, filesystem).await {
            Ok(context) => {
                info!(
                    token = %token,
                    steps = context.sequence.len(),
                    devices = context.inventory.len(),
                    "Started grow session for {} on {}",
                    filesystem,
                    server
                );
                self.metrics.record_session_started();
                self.emit(WorkflowEvent::SessionStarted {
                    token,
                    server: server.to_string(),
                    filesystem: filesystem.to_string(),
                    steps: context.sequence.len(),
                });
                session.context = Some(context);
                session.state = SessionState::InProgress;
            }
            Err(e) => {
                error!(token = %token, code = e.code(), "Failed to start grow session: {}", e);
                let mut state = ErrorState::from_error(&e, Phase::Start);
                state.severity = Severity::Fatal;
                session.start_error = Some(state);
                session.state = SessionState::Failed;
                self.arbiter.release(WorkflowKind::GrowFileSystem, server, token);
                self.emit(WorkflowEvent::SessionFailed {
                    token,
                    server: server.to_string(),
                    code: e.code().to_string(),
                });
            }
        }

        session
    }

    async fn load_context(&self, server: &str, filesystem: &str) -> Result<SessionContext> {
        let info = self.filesystems.load_file_system(server, filesystem).await?;
        let facts = Facts::derive(&info, &self.limits);
        let devices = self.catalog.discover_allocatable_devices(server).await?;
        debug!("Discovered {} allocatable devices on {}", devices.len(), server);

        let store = SelectionStore::new(&facts);
        let sequence = StepSequencer::for_choices(&facts, &store.choices);
        Ok(SessionContext {
            facts,
            inventory: DeviceInventory::new(devices),
            store,
            sequence,
            cursor: 0,
        })
    }

    // -------------------------------------------------------------------------
    // Step navigation
    // -------------------------------------------------------------------------

    /// Submit `input` for `step`, which must be the current step
    pub async fn advance(&self, session: &mut WorkflowSession, step: StepKind, input: StepInput) -> StepResponse {
        if let Err(e) = session.ensure_running() {
            return session.reject(&e, Phase::Step);
        }

        let token = session.token;
        let advanced = match session.context.as_mut() {
            Some(ctx) => self.advance_context(token, &session.server, ctx, step, input).await,
            None => false,
        };
        session.response(advanced)
    }

    async fn advance_context(
        &self,
        token: SessionToken,
        server: &str,
        ctx: &mut SessionContext,
        step: StepKind,
        input: StepInput,
    ) -> bool {
        let current = ctx.current();
        if current != Some(step) {
            let err = Error::StepOutOfOrder {
                requested: step.to_string(),
                current: current.map(|s| s.to_string()).unwrap_or_default(),
            };
            ctx.store.set_error(ErrorState::from_error(&err, Phase::Step));
            return false;
        }

        // Touching a session makes it the one allowed to commit
        self.arbiter.activate(WorkflowKind::GrowFileSystem, server, token);

        let validator = StepValidator::new(server, &ctx.facts, &ctx.inventory, self.overlap.as_ref(), &self.policy);
        if !validator.validate(step, input, &mut ctx.store).await {
            let code = ctx.store.error().map(|e| e.code.clone()).unwrap_or_default();
            self.metrics.record_step_rejected(step.name(), &code);
            self.emit(WorkflowEvent::StepRejected { token, step, code });
            return false;
        }

        self.metrics.record_step_accepted(step.name());
        self.emit(WorkflowEvent::StepAccepted { token, step });

        if step.reshapes_sequence() {
            let sequence = StepSequencer::for_choices(&ctx.facts, &ctx.store.choices);
            ctx.cursor = sequence.position(step).unwrap_or(ctx.cursor);
            debug!(token = %token, "Sequence recomputed after {}: {} steps", step, sequence.len());
            self.emit(WorkflowEvent::SequenceChanged {
                token,
                steps: sequence.len(),
            });
            ctx.sequence = sequence;
        }

        // Summary is only left through finish
        if ctx.cursor + 1 < ctx.sequence.len() {
            ctx.cursor += 1;
        }
        true
    }

    /// Return to the previous step, keeping every selection
    pub fn back(&self, session: &mut WorkflowSession) -> StepResponse {
        if let Err(e) = session.ensure_running() {
            return session.reject(&e, Phase::Step);
        }

        let moved = match session.context.as_mut() {
            Some(ctx) if ctx.cursor > 0 => {
                ctx.cursor -= 1;
                ctx.store.clear_error();
                true
            }
            _ => false,
        };
        session.response(moved)
    }

    /// Discard the session. Calling it again is a no-op.
    pub fn cancel(&self, session: &mut WorkflowSession) -> StepResponse {
        if session.state == SessionState::Cancelled {
            return session.response(false);
        }

        self.arbiter
            .release(WorkflowKind::GrowFileSystem, &session.server, session.token);
        session.context = None;
        session.start_error = None;
        session.state = SessionState::Cancelled;
        info!(token = %session.token, "Cancelled grow session for {}", session.filesystem);
        self.emit(WorkflowEvent::SessionCancelled { token: session.token });
        session.response(false)
    }

    // -------------------------------------------------------------------------
    // Finish
    // -------------------------------------------------------------------------

    /// Commit the session's selections as one grow operation.
    ///
    /// Only valid on the summary step of the active session. The outcome is
    /// shown on the result step whether or not the grow succeeded.
    #[instrument(skip(self, session), fields(token = %session.token))]
    pub async fn finish(&self, session: &mut WorkflowSession) -> StepResponse {
        if let Err(e) = session.ensure_running() {
            return session.reject(&e, Phase::Finish);
        }
        let token = session.token;

        let current = session.context.as_ref().and_then(SessionContext::current);
        if current != Some(StepKind::Summary) {
            let err = Error::StepOutOfOrder {
                requested: StepKind::Summary.to_string(),
                current: current.map(|s| s.to_string()).unwrap_or_default(),
            };
            if let Some(ctx) = session.context.as_mut() {
                ctx.store.set_error(ErrorState::from_error(&err, Phase::Finish));
            }
            return session.response(false);
        }

        if !self
            .arbiter
            .is_active(WorkflowKind::GrowFileSystem, &session.server, token)
        {
            warn!("Another grow workflow is active on {}; refusing to commit", session.server);
            let err = Error::SessionSuperseded {
                server: session.server.clone(),
            };
            self.emit(WorkflowEvent::SessionSuperseded {
                token,
                server: session.server.clone(),
            });
            return session.reject(&err, Phase::Finish);
        }

        let result = match &session.context {
            Some(ctx) => self.commit(&session.server, &session.filesystem, ctx).await,
            None => return session.response(false),
        };
        let Some(ctx) = session.context.as_mut() else {
            return session.response(false);
        };

        let (outcome, event) = match result {
            Ok(luns_added) => {
                info!(luns_added, "Grew {} on {}", session.filesystem, session.server);
                ctx.store.clear_error();
                (
                    GrowOutcome::Succeeded {
                        luns_added,
                        message: format!("File system {} grown by {} LUNs", session.filesystem, luns_added),
                    },
                    WorkflowEvent::GrowSucceeded {
                        token,
                        server: session.server.clone(),
                        filesystem: session.filesystem.clone(),
                        luns_added,
                    },
                )
            }
            Err(e) => {
                error!(code = e.code(), "Grow of {} failed: {}", session.filesystem, e);
                let mut state = ErrorState::from_error(&e, Phase::Finish);
                state.severity = Severity::Fatal;
                ctx.store.set_error(state.clone());
                (
                    GrowOutcome::Failed { error: state },
                    WorkflowEvent::GrowFailed {
                        token,
                        server: session.server.clone(),
                        filesystem: session.filesystem.clone(),
                        code: e.code().to_string(),
                    },
                )
            }
        };

        self.metrics.record_grow(outcome.is_success());
        ctx.cursor = ctx.sequence.position(StepKind::Result).unwrap_or(ctx.cursor);
        session.outcome = Some(outcome);
        session.state = SessionState::Finished;
        self.arbiter
            .release(WorkflowKind::GrowFileSystem, &session.server, token);
        self.emit(event);

        session.response(true)
    }

    /// Build every striped-group descriptor, then grow once
    async fn commit(&self, server: &str, filesystem: &str, ctx: &SessionContext) -> Result<usize> {
        let store = &ctx.store;
        let metadata_devices = ctx.inventory.resolve(store.metadata())?;
        let data_devices = ctx.inventory.resolve(store.data())?;

        let groups = if store.choices.adding_data {
            store.choices.striped_groups.count().unwrap_or(0)
        } else {
            0
        };

        let mut striped_groups: Vec<StripedGroupDescriptor> = Vec::with_capacity(groups as usize);
        for group in 0..groups {
            let members = ctx.inventory.resolve(store.striped_group(group))?;
            if members.is_empty() {
                return Err(Error::SessionUnavailable(format!(
                    "striped group {} has no devices",
                    group
                )));
            }
            let descriptor = self
                .filesystems
                .create_striped_group_descriptor(server, &members)
                .await?;
            debug!("Prepared striped group {} with {} members", group, members.len());
            striped_groups.push(descriptor);
        }

        let request = GrowRequest {
            server: server.to_string(),
            filesystem: filesystem.to_string(),
            metadata_devices,
            data_devices,
            striped_groups,
        };
        let luns = request.lun_count();
        self.filesystems.grow_file_system(request).await?;
        Ok(luns)
    }
}

impl std::fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowController")
            .field("limits", &self.limits)
            .field("policy", &self.policy)
            .finish()
    }
}
