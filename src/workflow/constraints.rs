//! Growth Constraints
//!
//! Numeric limits derived from file-system facts: how many LUNs may still
//! be added, and how many new striped groups the file system can take.

use super::selection::{SelectionStore, SelectionTarget};
use crate::domain::ports::FileSystemInfo;
use serde::{Deserialize, Serialize};

// =============================================================================
// Limits
// =============================================================================

/// Maximum number of LUNs a file system may hold
pub const DEFAULT_MAX_LUNS: u32 = 252;

/// Maximum number of striped groups a file system may hold
pub const DEFAULT_MAX_STRIPED_GROUPS: u32 = 128;

/// System-wide ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrowthLimits {
    pub max_luns_total: u32,
    pub max_striped_groups: u32,
}

impl Default for GrowthLimits {
    fn default() -> Self {
        Self {
            max_luns_total: DEFAULT_MAX_LUNS,
            max_striped_groups: DEFAULT_MAX_STRIPED_GROUPS,
        }
    }
}

// =============================================================================
// Facts
// =============================================================================

/// Whether new striped groups can be added
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "remaining", rename_all = "snake_case")]
pub enum StripedGroupCapacity {
    /// The file system does not use striped groups
    Unsupported,
    /// Up to this many new groups may be added
    Available(u32),
}

impl StripedGroupCapacity {
    /// Number of groups that may be added, zero when unsupported
    pub fn remaining(&self) -> u32 {
        match self {
            StripedGroupCapacity::Unsupported => 0,
            StripedGroupCapacity::Available(n) => *n,
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, StripedGroupCapacity::Available(_))
    }

    /// Whether at least one more group can be added
    pub fn has_room(&self) -> bool {
        self.remaining() > 0
    }
}

/// Read-only facts for one session, derived once from the target file system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    pub filesystem: String,
    pub mounted: bool,
    pub combined_metadata_and_data: bool,
    pub existing_striped_group_count: u32,
    pub existing_metadata_device_count: u32,
    pub existing_data_device_count: u32,
    pub existing_striped_device_count: u32,
    pub max_luns_total: u32,
    pub max_new_striped_groups: StripedGroupCapacity,
}

impl Facts {
    /// Derive session facts from what the storage service reports.
    ///
    /// A file system takes new striped groups only when it already has at
    /// least one.
    pub fn derive(info: &FileSystemInfo, limits: &GrowthLimits) -> Self {
        let existing_groups = info.striped_groups.len() as u32;
        let max_new_striped_groups = if existing_groups > 0 {
            StripedGroupCapacity::Available(
                limits.max_striped_groups.saturating_sub(existing_groups),
            )
        } else {
            StripedGroupCapacity::Unsupported
        };

        Self {
            filesystem: info.name.clone(),
            mounted: info.mounted,
            combined_metadata_and_data: info.combined_metadata_and_data,
            existing_striped_group_count: existing_groups,
            existing_metadata_device_count: info.metadata_devices,
            existing_data_device_count: info.data_devices,
            existing_striped_device_count: info.striped_devices(),
            max_luns_total: limits.max_luns_total,
            max_new_striped_groups,
        }
    }

    /// Whether the operator picks what to grow on a method step
    pub fn needs_method_step(&self) -> bool {
        self.mounted && !self.combined_metadata_and_data
    }

    /// LUNs already committed to the file system
    pub fn committed_luns(&self) -> u32 {
        if self.combined_metadata_and_data {
            self.existing_data_device_count
        } else {
            self.existing_metadata_device_count
                + self.existing_data_device_count
                + self.existing_striped_device_count
        }
    }

    /// LUNs that may be added before any selection is made this session
    pub fn available_luns(&self) -> u32 {
        self.max_luns_total.saturating_sub(self.committed_luns())
    }
}

// =============================================================================
// Budget
// =============================================================================

/// Remaining LUN budget for `target`.
///
/// Metadata, data and striped groups share one budget, so the count
/// excludes devices chosen for every other part of the session.
pub fn max_devices_addable(facts: &Facts, selections: &SelectionStore, target: SelectionTarget) -> usize {
    let available = facts.available_luns() as usize;
    available.saturating_sub(selections.selected_outside(target))
}
