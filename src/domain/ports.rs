//! Domain Ports - Collaborator contracts for the grow workflow
//!
//! These traits define the boundaries between the workflow engine and the
//! storage-management services that discover devices, detect LUN overlap,
//! and perform the actual file-system grow. Adapters implement them.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// =============================================================================
// Device Types
// =============================================================================

/// Identifier of an allocatable device (its device path)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A device that can be added to a file system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Device path
    pub id: DeviceId,
    /// Usable capacity in bytes
    pub capacity_bytes: u64,
}

impl Device {
    pub fn new(id: impl Into<DeviceId>, capacity_bytes: u64) -> Self {
        Self {
            id: id.into(),
            capacity_bytes,
        }
    }
}

// =============================================================================
// File System Types
// =============================================================================

/// What the storage service reports about a file system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSystemInfo {
    /// File system name
    pub name: String,
    /// Whether the file system is currently mounted
    pub mounted: bool,
    /// Metadata and data share one device pool
    pub combined_metadata_and_data: bool,
    /// Number of metadata devices in use
    pub metadata_devices: u32,
    /// Number of data devices in use
    pub data_devices: u32,
    /// Member count of each existing striped group
    pub striped_groups: Vec<u32>,
}

impl FileSystemInfo {
    /// Total devices across existing striped groups
    pub fn striped_devices(&self) -> u32 {
        self.striped_groups.iter().sum()
    }
}

/// Striped group as constructed by the storage service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripedGroupDescriptor {
    /// Group name; empty until the grow assigns one
    pub name: String,
    /// Member devices
    pub members: Vec<Device>,
}

/// The single grow operation assembled at the end of a session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrowRequest {
    pub server: String,
    pub filesystem: String,
    pub metadata_devices: Vec<Device>,
    pub data_devices: Vec<Device>,
    pub striped_groups: Vec<StripedGroupDescriptor>,
}

impl GrowRequest {
    /// Number of LUNs this request adds
    pub fn lun_count(&self) -> usize {
        self.metadata_devices.len()
            + self.data_devices.len()
            + self.striped_groups.iter().map(|g| g.members.len()).sum::<usize>()
    }
}

// =============================================================================
// Device Catalog Port
// =============================================================================

/// Port for discovering devices that can be allocated on a server
#[async_trait]
pub trait DeviceCatalog: Send + Sync {
    /// All devices not in use by any file system
    async fn discover_allocatable_devices(&self, server: &str) -> Result<Vec<Device>>;
}

// =============================================================================
// Overlap Checker Port
// =============================================================================

/// Port for LUN overlap detection
#[async_trait]
pub trait OverlapChecker: Send + Sync {
    /// Return the subset of `devices` whose storage extents overlap each
    /// other or a device already in use
    async fn check_overlap(&self, server: &str, devices: &[DeviceId]) -> Result<Vec<DeviceId>>;
}

// =============================================================================
// File System Admin Port
// =============================================================================

/// Port for file-system level operations
#[async_trait]
pub trait FileSystemAdmin: Send + Sync {
    /// Load the facts a grow session is derived from
    async fn load_file_system(&self, server: &str, filesystem: &str) -> Result<FileSystemInfo>;

    /// Build a striped group from member devices
    async fn create_striped_group_descriptor(
        &self,
        server: &str,
        members: &[Device],
    ) -> Result<StripedGroupDescriptor>;

    /// Apply the grow atomically
    async fn grow_file_system(&self, request: GrowRequest) -> Result<()>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type DeviceCatalogRef = Arc<dyn DeviceCatalog>;
pub type OverlapCheckerRef = Arc<dyn OverlapChecker>;
pub type FileSystemAdminRef = Arc<dyn FileSystemAdmin>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_id_ordering() {
        let mut ids = vec![
            DeviceId::from("/dev/dsk/c2t0d0s0"),
            DeviceId::from("/dev/dsk/c1t0d0s6"),
            DeviceId::from("/dev/dsk/c1t0d0s1"),
        ];
        ids.sort();
        assert_eq!(ids[0].as_str(), "/dev/dsk/c1t0d0s1");
        assert_eq!(ids[2].as_str(), "/dev/dsk/c2t0d0s0");
    }

    #[test]
    fn test_grow_request_lun_count() {
        let request = GrowRequest {
            server: "mds1".into(),
            filesystem: "qfs1".into(),
            metadata_devices: vec![Device::new("/dev/a", 10)],
            data_devices: vec![],
            striped_groups: vec![StripedGroupDescriptor {
                name: String::new(),
                members: vec![Device::new("/dev/b", 20), Device::new("/dev/c", 20)],
            }],
        };
        assert_eq!(request.lun_count(), 3);
    }
}
