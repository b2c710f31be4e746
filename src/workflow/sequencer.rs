//! Step Sequencer
//!
//! Computes the ordered steps of a grow session from the file-system facts
//! and the choices made so far. Sequences are immutable values; a session
//! swaps in a new one when a choice changes its shape.

use super::constraints::Facts;
use super::selection::{Choices, StripedGroupPlan};
use serde::{Deserialize, Serialize};

// =============================================================================
// Step Kind
// =============================================================================

/// One step of the grow workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "group", rename_all = "snake_case")]
pub enum StepKind {
    /// Choose whether metadata, data, or both grow
    Method,
    MetadataSelection,
    StripedGroupCount,
    /// Device selection for the new striped group with this index
    StripedGroupSelection(u32),
    DataSelection,
    Summary,
    Result,
}

impl StepKind {
    /// Whether accepting this step can change the remaining steps
    pub fn reshapes_sequence(&self) -> bool {
        matches!(self, StepKind::Method | StepKind::StripedGroupCount)
    }

    /// Whether this step collects a device selection
    pub fn is_device_selection(&self) -> bool {
        matches!(
            self,
            StepKind::MetadataSelection | StepKind::StripedGroupSelection(_) | StepKind::DataSelection
        )
    }

    /// Short name used in logs, metrics labels and error messages
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Method => "method",
            StepKind::MetadataSelection => "metadata_selection",
            StepKind::StripedGroupCount => "striped_group_count",
            StepKind::StripedGroupSelection(_) => "striped_group_selection",
            StepKind::DataSelection => "data_selection",
            StepKind::Summary => "summary",
            StepKind::Result => "result",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::StripedGroupSelection(group) => write!(f, "striped_group_selection[{}]", group),
            other => write!(f, "{}", other.name()),
        }
    }
}

// =============================================================================
// Step Sequence
// =============================================================================

/// A step together with its 1-based position, for step indicators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepDescriptor {
    pub kind: StepKind,
    pub ordinal: usize,
}

/// Ordered, immutable list of steps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSequence {
    steps: Vec<StepKind>,
}

impl StepSequence {
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<StepKind> {
        self.steps.get(index).copied()
    }

    pub fn steps(&self) -> &[StepKind] {
        &self.steps
    }

    pub fn position(&self, kind: StepKind) -> Option<usize> {
        self.steps.iter().position(|s| *s == kind)
    }

    /// Steps after `index`
    pub fn future(&self, index: usize) -> &[StepKind] {
        self.steps.get(index + 1..).unwrap_or(&[])
    }

    pub fn descriptors(&self) -> Vec<StepDescriptor> {
        self.steps
            .iter()
            .enumerate()
            .map(|(i, kind)| StepDescriptor {
                kind: *kind,
                ordinal: i + 1,
            })
            .collect()
    }

    pub fn count_of(&self, predicate: impl Fn(&StepKind) -> bool) -> usize {
        self.steps.iter().filter(|s| predicate(s)).count()
    }
}

// =============================================================================
// Step Sequencer
// =============================================================================

/// Pure step-sequence computation
pub struct StepSequencer;

impl StepSequencer {
    /// Number of steps `compute` emits for these inputs
    pub fn step_count(
        facts: &Facts,
        adding_metadata: bool,
        adding_data: bool,
        striped_groups: StripedGroupPlan,
    ) -> usize {
        let mut count = 2; // summary + result
        if facts.needs_method_step() {
            count += 1;
        }
        if adding_metadata {
            count += 1;
        }
        match striped_groups {
            StripedGroupPlan::Count(n) => {
                count += 1;
                if adding_data {
                    count += n as usize;
                }
            }
            StripedGroupPlan::NotApplicable => {
                if adding_data {
                    count += 1;
                }
            }
        }
        count
    }

    /// Compute the step sequence.
    ///
    /// Callers must not pass `adding_metadata == adding_data == false`; the
    /// method step rejects that input before a recompute.
    pub fn compute(
        facts: &Facts,
        adding_metadata: bool,
        adding_data: bool,
        striped_groups: StripedGroupPlan,
    ) -> StepSequence {
        let mut steps =
            Vec::with_capacity(Self::step_count(facts, adding_metadata, adding_data, striped_groups));

        if facts.needs_method_step() {
            steps.push(StepKind::Method);
        }
        if adding_metadata {
            steps.push(StepKind::MetadataSelection);
        }

        match striped_groups {
            StripedGroupPlan::Count(n) => {
                steps.push(StepKind::StripedGroupCount);
                if adding_data {
                    // Group index is the offset from the end of the count step
                    let before_block = steps.len();
                    for _ in 0..n {
                        let group = (steps.len() - before_block) as u32;
                        steps.push(StepKind::StripedGroupSelection(group));
                    }
                }
            }
            StripedGroupPlan::NotApplicable => {
                if adding_data {
                    steps.push(StepKind::DataSelection);
                }
            }
        }

        steps.push(StepKind::Summary);
        steps.push(StepKind::Result);

        StepSequence { steps }
    }

    /// Compute the step sequence for the current choices
    pub fn for_choices(facts: &Facts, choices: &Choices) -> StepSequence {
        Self::compute(
            facts,
            choices.adding_metadata,
            choices.adding_data,
            choices.striped_groups,
        )
    }
}
