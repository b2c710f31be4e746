//! Step Validator
//!
//! One validation routine per step kind. Each routine checks the operator's
//! input against the session facts, the shared LUN budget and the overlap
//! checker, then records the accepted selection in the [`SelectionStore`].

use super::constraints::{max_devices_addable, Facts};
use super::selection::{ErrorState, SelectionStore, SelectionTarget, StripedGroupPlan};
use super::sequencer::StepKind;
use crate::domain::ports::{Device, DeviceId, OverlapChecker};
use crate::error::{Error, Phase, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

// =============================================================================
// Step Input
// =============================================================================

/// Raw input submitted for a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepInput {
    /// Method step checkboxes
    Method { add_metadata: bool, add_data: bool },
    /// Rows selected in a device table
    Devices { devices: Vec<DeviceId> },
    /// Text typed into the group-count field
    StripedGroupCount { count: String },
}

impl StepInput {
    pub fn devices<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DeviceId>,
    {
        StepInput::Devices {
            devices: devices.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Validation Policy
// =============================================================================

/// Behaviour switches for the validators
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Keep a striped-group selection whose members differ in capacity so
    /// it is shown again on redisplay. The step is rejected either way.
    pub retain_mismatched_stripe_selection: bool,
}

// =============================================================================
// Device Inventory
// =============================================================================

/// Allocatable devices discovered at session start
#[derive(Debug, Clone, Default)]
pub struct DeviceInventory {
    devices: BTreeMap<DeviceId, Device>,
}

impl DeviceInventory {
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Look up every identifier, failing on the first unknown one
    pub fn resolve(&self, ids: &[DeviceId]) -> Result<Vec<Device>> {
        ids.iter()
            .map(|id| {
                self.get(id)
                    .cloned()
                    .ok_or_else(|| Error::DeviceNotAllocatable { device: id.clone() })
            })
            .collect()
    }
}

// =============================================================================
// Step Validator
// =============================================================================

/// Validates step input for one session
pub struct StepValidator<'a> {
    server: &'a str,
    facts: &'a Facts,
    inventory: &'a DeviceInventory,
    overlap: &'a dyn OverlapChecker,
    policy: &'a ValidationPolicy,
}

impl<'a> StepValidator<'a> {
    pub fn new(
        server: &'a str,
        facts: &'a Facts,
        inventory: &'a DeviceInventory,
        overlap: &'a dyn OverlapChecker,
        policy: &'a ValidationPolicy,
    ) -> Self {
        Self {
            server,
            facts,
            inventory,
            overlap,
            policy,
        }
    }

    /// Validate `input` for `step`.
    ///
    /// On success the selection is recorded and the error state cleared; on
    /// failure the error state is set and `false` returned.
    pub async fn validate(&self, step: StepKind, input: StepInput, store: &mut SelectionStore) -> bool {
        match self.check(step, input, store).await {
            Ok(()) => {
                debug!("Step {} accepted for {}", step, self.facts.filesystem);
                store.clear_error();
                true
            }
            Err(e) => {
                warn!(code = e.code(), "Step {} rejected for {}: {}", step, self.facts.filesystem, e);
                store.set_error(ErrorState::from_error(&e, Phase::Step));
                false
            }
        }
    }

    /// Run the check for `step` without touching the error state
    pub async fn check(&self, step: StepKind, input: StepInput, store: &mut SelectionStore) -> Result<()> {
        match (step, input) {
            (StepKind::Method, StepInput::Method { add_metadata, add_data }) => {
                self.check_method(add_metadata, add_data, store)
            }
            (StepKind::MetadataSelection, StepInput::Devices { devices }) => {
                self.check_metadata(devices, store).await
            }
            (StepKind::DataSelection, StepInput::Devices { devices }) => {
                self.check_data(devices, store).await
            }
            (StepKind::StripedGroupSelection(group), StepInput::Devices { devices }) => {
                self.check_striped_group(group, devices, store).await
            }
            (StepKind::StripedGroupCount, StepInput::StripedGroupCount { count }) => {
                self.check_striped_group_count(&count, store)
            }
            (step, _) => Err(Error::UnexpectedInput {
                step: step.to_string(),
            }),
        }
    }

    fn check_method(&self, add_metadata: bool, add_data: bool, store: &mut SelectionStore) -> Result<()> {
        if !add_metadata && !add_data {
            return Err(Error::NoGrowthMethod);
        }

        store.choices.adding_metadata = add_metadata;
        store.choices.adding_data = add_data;
        if !add_metadata {
            store.clear_metadata();
        }
        if !add_data {
            store.clear_data();
            store.clear_striped_groups();
        }

        // Provisional single group; the count step settles the real number
        store.choices.striped_groups = if add_data && self.facts.max_new_striped_groups.has_room() {
            StripedGroupPlan::Count(1)
        } else {
            StripedGroupPlan::NotApplicable
        };

        Ok(())
    }

    async fn check_metadata(&self, devices: Vec<DeviceId>, store: &mut SelectionStore) -> Result<()> {
        if devices.is_empty() {
            return Err(Error::NoMetadataDevice);
        }

        let sorted = self.admit(&devices, store, SelectionTarget::Metadata)?;
        if let Err(e) = self.ensure_no_overlap(&sorted).await {
            if matches!(e, Error::LunOverlap { .. }) {
                store.set_metadata(devices);
            }
            return Err(e);
        }

        store.set_metadata(sorted);
        Ok(())
    }

    async fn check_data(&self, devices: Vec<DeviceId>, store: &mut SelectionStore) -> Result<()> {
        if devices.is_empty() {
            let facts = self.facts;
            if !facts.combined_metadata_and_data && facts.mounted && !store.choices.adding_data {
                store.clear_data();
                return Ok(());
            }
            if facts.mounted && !facts.combined_metadata_and_data {
                return Err(Error::DataRequestedButEmpty);
            }
            return Err(Error::NoDataDevice);
        }

        let sorted = self.admit(&devices, store, SelectionTarget::Data)?;
        if let Err(e) = self.ensure_no_overlap(&sorted).await {
            if matches!(e, Error::LunOverlap { .. }) {
                store.set_data(devices);
            }
            return Err(e);
        }

        store.set_data(sorted);
        Ok(())
    }

    async fn check_striped_group(
        &self,
        group: u32,
        devices: Vec<DeviceId>,
        store: &mut SelectionStore,
    ) -> Result<()> {
        if devices.is_empty() {
            return Err(Error::NoDataDevice);
        }

        let sorted = self.admit(&devices, store, SelectionTarget::StripedGroup(group))?;

        let members = self.inventory.resolve(&sorted)?;
        let uniform = members
            .windows(2)
            .all(|pair| pair[0].capacity_bytes == pair[1].capacity_bytes);
        if !uniform {
            if self.policy.retain_mismatched_stripe_selection {
                store.set_striped_group(group, devices);
            }
            return Err(Error::StripedGroupSizeMismatch { group });
        }

        // Only this group's members are checked against each other
        if let Err(e) = self.ensure_no_overlap(&sorted).await {
            if matches!(e, Error::LunOverlap { .. }) {
                store.set_striped_group(group, devices);
            }
            return Err(e);
        }

        store.set_striped_group(group, sorted);
        Ok(())
    }

    fn check_striped_group_count(&self, input: &str, store: &mut SelectionStore) -> Result<()> {
        let max = self.facts.max_new_striped_groups.remaining();
        let count = input
            .trim()
            .parse::<u32>()
            .ok()
            .filter(|n| *n <= max)
            .ok_or_else(|| Error::InvalidStripedGroupCount {
                input: input.to_string(),
                max,
            })?;

        store.choices.striped_groups = StripedGroupPlan::Count(count);
        if let Some(previous) = store.choices.previous_striped_group_count {
            if count < previous {
                debug!("Striped groups reduced from {} to {}", previous, count);
                store.truncate_striped_groups(count);
            }
        }
        store.choices.previous_striped_group_count = Some(count);

        Ok(())
    }

    /// Resolve, budget-check and sort a device selection
    fn admit(&self, devices: &[DeviceId], store: &SelectionStore, target: SelectionTarget) -> Result<Vec<DeviceId>> {
        self.inventory.resolve(devices)?;

        let sorted: Vec<DeviceId> = devices.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
        let available = max_devices_addable(self.facts, store, target);
        if sorted.len() > available {
            return Err(Error::LunLimitExceeded {
                requested: sorted.len(),
                available,
            });
        }

        Ok(sorted)
    }

    async fn ensure_no_overlap(&self, sorted: &[DeviceId]) -> Result<()> {
        let overlapping = self.overlap.check_overlap(self.server, sorted).await?;
        if overlapping.is_empty() {
            Ok(())
        } else {
            Err(Error::LunOverlap {
                devices: overlapping,
            })
        }
    }
}
