//! Selection Store
//!
//! Holds the operator's accumulated choices for one session: what is being
//! grown, the devices picked for each part, and the current error.

use super::constraints::Facts;
use crate::domain::ports::DeviceId;
use crate::error::{Error, Phase};
use serde::{Deserialize, Serialize};

// =============================================================================
// Striped Group Plan
// =============================================================================

/// How many new striped groups this run adds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "plan", content = "groups", rename_all = "snake_case")]
pub enum StripedGroupPlan {
    /// Data growth goes through a single data-device step
    NotApplicable,
    /// Data growth goes through this many new striped groups
    Count(u32),
}

impl StripedGroupPlan {
    pub fn count(&self) -> Option<u32> {
        match self {
            StripedGroupPlan::NotApplicable => None,
            StripedGroupPlan::Count(n) => Some(*n),
        }
    }
}

// =============================================================================
// Choices
// =============================================================================

/// Choices that shape the step sequence
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choices {
    pub adding_metadata: bool,
    pub adding_data: bool,
    pub striped_groups: StripedGroupPlan,
    /// Group count accepted on the last visit to the group-count step
    pub previous_striped_group_count: Option<u32>,
}

impl Choices {
    /// Starting choices for a file system.
    ///
    /// Unmounted or combined file systems have no method step, so what is
    /// grown follows from the layout alone.
    pub fn initial(facts: &Facts) -> Self {
        let striped_groups = if facts.max_new_striped_groups.has_room() {
            StripedGroupPlan::Count(0)
        } else {
            StripedGroupPlan::NotApplicable
        };

        Self {
            adding_metadata: !facts.combined_metadata_and_data,
            adding_data: true,
            striped_groups,
            previous_striped_group_count: None,
        }
    }
}

// =============================================================================
// Error State
// =============================================================================

/// How an error is presented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Shown on the current step; the operator can correct it
    Inline,
    /// The session cannot continue
    Fatal,
}

/// The single active error of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorState {
    pub code: String,
    pub message: String,
    pub severity: Severity,
    /// Devices the error refers to, e.g. overlapping LUNs
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub devices: Vec<DeviceId>,
}

impl ErrorState {
    pub fn from_error(err: &Error, phase: Phase) -> Self {
        let severity = if err.is_fatal_during(phase) {
            Severity::Fatal
        } else {
            Severity::Inline
        };

        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            severity,
            devices: err.offending_devices().to_vec(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Fatal
    }
}

// =============================================================================
// Selection Store
// =============================================================================

/// Part of the session a device selection belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTarget {
    Metadata,
    Data,
    StripedGroup(u32),
}

/// Mutable container for a session's selections
#[derive(Debug, Clone)]
pub struct SelectionStore {
    pub choices: Choices,
    metadata: Vec<DeviceId>,
    data: Vec<DeviceId>,
    striped_groups: Vec<Vec<DeviceId>>,
    error: Option<ErrorState>,
}

impl SelectionStore {
    pub fn new(facts: &Facts) -> Self {
        Self {
            choices: Choices::initial(facts),
            metadata: Vec::new(),
            data: Vec::new(),
            striped_groups: Vec::new(),
            error: None,
        }
    }

    pub fn metadata(&self) -> &[DeviceId] {
        &self.metadata
    }

    pub fn data(&self) -> &[DeviceId] {
        &self.data
    }

    pub fn striped_groups(&self) -> &[Vec<DeviceId>] {
        &self.striped_groups
    }

    pub fn striped_group(&self, group: u32) -> &[DeviceId] {
        self.striped_groups
            .get(group as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn set_metadata(&mut self, devices: Vec<DeviceId>) {
        self.metadata = devices;
    }

    pub fn clear_metadata(&mut self) {
        self.metadata.clear();
    }

    pub fn set_data(&mut self, devices: Vec<DeviceId>) {
        self.data = devices;
    }

    pub fn clear_data(&mut self) {
        self.data.clear();
    }

    /// Store the devices of one group, creating empty slots for any
    /// earlier groups not visited yet
    pub fn set_striped_group(&mut self, group: u32, devices: Vec<DeviceId>) {
        let index = group as usize;
        if self.striped_groups.len() <= index {
            self.striped_groups.resize_with(index + 1, Vec::new);
        }
        self.striped_groups[index] = devices;
    }

    /// Forget every group selection and the last accepted group count
    pub fn clear_striped_groups(&mut self) {
        self.striped_groups.clear();
        self.choices.previous_striped_group_count = None;
    }

    /// Drop selections for groups at or beyond `count`
    pub fn truncate_striped_groups(&mut self, count: u32) {
        self.striped_groups.truncate(count as usize);
    }

    /// Devices selected this session for every part except `target`
    pub fn selected_outside(&self, target: SelectionTarget) -> usize {
        let metadata = match target {
            SelectionTarget::Metadata => 0,
            _ => self.metadata.len(),
        };
        let data = match target {
            SelectionTarget::Data => 0,
            _ => self.data.len(),
        };
        let striped: usize = self
            .striped_groups
            .iter()
            .enumerate()
            .filter(|(i, _)| target != SelectionTarget::StripedGroup(*i as u32))
            .map(|(_, devices)| devices.len())
            .sum();

        metadata + data + striped
    }

    pub fn error(&self) -> Option<&ErrorState> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: ErrorState) {
        self.error = Some(error);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::constraints::StripedGroupCapacity;

    fn facts(combined: bool, capacity: StripedGroupCapacity) -> Facts {
        Facts {
            filesystem: "qfs1".into(),
            mounted: true,
            combined_metadata_and_data: combined,
            existing_striped_group_count: 0,
            existing_metadata_device_count: 1,
            existing_data_device_count: 1,
            existing_striped_device_count: 0,
            max_luns_total: 252,
            max_new_striped_groups: capacity,
        }
    }

    fn ids(paths: &[&str]) -> Vec<DeviceId> {
        paths.iter().map(|p| DeviceId::from(*p)).collect()
    }

    #[test]
    fn test_initial_choices() {
        let choices = Choices::initial(&facts(true, StripedGroupCapacity::Unsupported));
        assert!(!choices.adding_metadata);
        assert!(choices.adding_data);
        assert_eq!(choices.striped_groups, StripedGroupPlan::NotApplicable);

        let choices = Choices::initial(&facts(false, StripedGroupCapacity::Available(4)));
        assert!(choices.adding_metadata);
        assert_eq!(choices.striped_groups, StripedGroupPlan::Count(0));

        // Group limit already reached
        let choices = Choices::initial(&facts(false, StripedGroupCapacity::Available(0)));
        assert_eq!(choices.striped_groups, StripedGroupPlan::NotApplicable);
    }

    #[test]
    fn test_clear_striped_groups_resets_count() {
        let mut store = SelectionStore::new(&facts(false, StripedGroupCapacity::Available(4)));
        store.set_metadata(ids(&["/dev/m1"]));
        store.set_striped_group(1, ids(&["/dev/a", "/dev/b"]));
        store.choices.previous_striped_group_count = Some(2);

        store.clear_striped_groups();
        assert!(store.striped_groups().is_empty());
        assert_eq!(store.choices.previous_striped_group_count, None);
        assert_eq!(store.selected_outside(SelectionTarget::Data), 1);
    }

    #[test]
    fn test_truncate_preserves_leading_groups() {
        let mut store = SelectionStore::new(&facts(false, StripedGroupCapacity::Available(4)));
        store.set_striped_group(0, ids(&["/dev/a"]));
        store.set_striped_group(1, ids(&["/dev/b", "/dev/c"]));
        store.set_striped_group(2, ids(&["/dev/d"]));

        store.truncate_striped_groups(1);
        assert_eq!(store.striped_groups().len(), 1);
        assert_eq!(store.striped_group(0), ids(&["/dev/a"]).as_slice());
        assert!(store.striped_group(1).is_empty());
    }

    #[test]
    fn test_set_group_out_of_order_pads() {
        let mut store = SelectionStore::new(&facts(false, StripedGroupCapacity::Available(4)));
        store.set_striped_group(2, ids(&["/dev/x"]));
        assert_eq!(store.striped_groups().len(), 3);
        assert!(store.striped_group(0).is_empty());
    }

    #[test]
    fn test_selected_outside() {
        let mut store = SelectionStore::new(&facts(false, StripedGroupCapacity::Available(4)));
        store.set_metadata(ids(&["/dev/m1", "/dev/m2"]));
        store.set_striped_group(0, ids(&["/dev/a", "/dev/b"]));
        store.set_striped_group(1, ids(&["/dev/c"]));

        assert_eq!(store.selected_outside(SelectionTarget::Metadata), 3);
        assert_eq!(store.selected_outside(SelectionTarget::StripedGroup(0)), 3);
        assert_eq!(store.selected_outside(SelectionTarget::StripedGroup(1)), 4);
        assert_eq!(store.selected_outside(SelectionTarget::Data), 5);
    }
}
