//! Static Inventory
//!
//! An in-memory description of servers, their devices and file systems,
//! loaded from YAML. It backs all three collaborator ports so the wizard
//! can run without a storage-management daemon:
//!
//! ```yaml
//! servers:
//!   mds1:
//!     devices:
//!       - path: /dev/dsk/c1t0d0s0
//!         capacity_bytes: 107374182400
//!         extent: { disk: c1t0d0, start: 0, end: 200 }
//!     file_systems:
//!       - name: qfs1
//!         mounted: true
//!         metadata_devices: [/dev/dsk/c1t0d0s0]
//!         striped_groups: [[/dev/dsk/c2t0d0s0, /dev/dsk/c2t1d0s0]]
//! ```

use crate::domain::ports::{
    Device, DeviceCatalog, DeviceId, FileSystemAdmin, FileSystemInfo, GrowRequest, OverlapChecker,
    StripedGroupDescriptor,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Device is already part of a file system
const ERR_DEVICE_IN_USE: i32 = 30_011;
/// Device is not declared on the server
const ERR_UNKNOWN_DEVICE: i32 = 30_012;
/// Striped group members differ or the group is empty
const ERR_BAD_STRIPED_GROUP: i32 = 30_013;

// =============================================================================
// Inventory Document
// =============================================================================

/// Physical range a device occupies on its disk, `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extent {
    pub disk: String,
    pub start: u64,
    pub end: u64,
}

impl Extent {
    pub fn intersects(&self, other: &Extent) -> bool {
        self.disk == other.disk && self.start < other.end && other.start < self.end
    }
}

/// A declared device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub path: DeviceId,
    pub capacity_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extent: Option<Extent>,
}

/// A declared file system and the devices it uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemSpec {
    pub name: String,
    pub mounted: bool,
    pub combined_metadata_and_data: bool,
    pub metadata_devices: Vec<DeviceId>,
    pub data_devices: Vec<DeviceId>,
    /// Members of each striped group; group `i` is named `g<i>`
    pub striped_groups: Vec<Vec<DeviceId>>,
}

impl FileSystemSpec {
    fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.metadata_devices
            .iter()
            .chain(self.data_devices.iter())
            .chain(self.striped_groups.iter().flatten())
    }

    fn info(&self) -> FileSystemInfo {
        FileSystemInfo {
            name: self.name.clone(),
            mounted: self.mounted,
            combined_metadata_and_data: self.combined_metadata_and_data,
            metadata_devices: self.metadata_devices.len() as u32,
            data_devices: self.data_devices.len() as u32,
            striped_groups: self.striped_groups.iter().map(|g| g.len() as u32).collect(),
        }
    }
}

/// Everything known about one server
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSpec {
    pub devices: Vec<DeviceSpec>,
    pub file_systems: Vec<FileSystemSpec>,
}

impl ServerSpec {
    fn in_use(&self) -> BTreeSet<&DeviceId> {
        self.file_systems.iter().flat_map(FileSystemSpec::devices).collect()
    }

    fn device(&self, id: &DeviceId) -> Option<&DeviceSpec> {
        self.devices.iter().find(|d| &d.path == id)
    }

    fn file_system_mut(&mut self, name: &str) -> Option<&mut FileSystemSpec> {
        self.file_systems.iter_mut().find(|fs| fs.name == name)
    }

    /// Fail unless every device is declared and unused
    fn ensure_allocatable<'a>(&self, ids: impl IntoIterator<Item = &'a DeviceId>) -> Result<()> {
        let in_use = self.in_use();
        for id in ids {
            if self.device(id).is_none() {
                return Err(Error::collaborator(
                    "allocate device",
                    ERR_UNKNOWN_DEVICE,
                    format!("{} is not a device on this server", id),
                ));
            }
            if in_use.contains(id) {
                return Err(Error::collaborator(
                    "allocate device",
                    ERR_DEVICE_IN_USE,
                    format!("{} is already in use", id),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct InventoryDocument {
    servers: BTreeMap<String, ServerSpec>,
}

// =============================================================================
// Static Inventory
// =============================================================================

/// YAML-backed implementation of the collaborator ports
#[derive(Debug, Default)]
pub struct StaticInventory {
    servers: RwLock<BTreeMap<String, ServerSpec>>,
}

impl StaticInventory {
    pub fn new(servers: BTreeMap<String, ServerSpec>) -> Self {
        Self {
            servers: RwLock::new(servers),
        }
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let document: InventoryDocument = serde_yaml::from_str(text)?;
        Ok(Self::new(document.servers))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inventory = Self::from_yaml(&std::fs::read_to_string(path)?)?;
        info!(
            "Loaded inventory from {} ({} servers)",
            path.display(),
            inventory.servers.read().len()
        );
        Ok(inventory)
    }

    /// Snapshot of one file system
    pub fn file_system(&self, server: &str, filesystem: &str) -> Option<FileSystemSpec> {
        self.servers
            .read()
            .get(server)?
            .file_systems
            .iter()
            .find(|fs| fs.name == filesystem)
            .cloned()
    }

    fn with_server<T>(&self, server: &str, f: impl FnOnce(&ServerSpec) -> Result<T>) -> Result<T> {
        let servers = self.servers.read();
        let host = servers.get(server).ok_or_else(|| Error::ServerNotFound {
            server: server.to_string(),
        })?;
        f(host)
    }
}

#[async_trait]
impl DeviceCatalog for StaticInventory {
    async fn discover_allocatable_devices(&self, server: &str) -> Result<Vec<Device>> {
        self.with_server(server, |host| {
            let in_use = host.in_use();
            Ok(host
                .devices
                .iter()
                .filter(|d| !in_use.contains(&d.path))
                .map(|d| Device::new(d.path.clone(), d.capacity_bytes))
                .collect())
        })
    }
}

#[async_trait]
impl OverlapChecker for StaticInventory {
    async fn check_overlap(&self, server: &str, devices: &[DeviceId]) -> Result<Vec<DeviceId>> {
        self.with_server(server, |host| {
            let in_use: Vec<&DeviceSpec> = host
                .in_use()
                .into_iter()
                .filter_map(|id| host.device(id))
                .collect();
            let selected: Vec<&DeviceSpec> = devices.iter().filter_map(|id| host.device(id)).collect();

            let overlapping: Vec<DeviceId> = selected
                .iter()
                .filter(|candidate| {
                    let Some(extent) = &candidate.extent else {
                        return false;
                    };
                    let clashes_with = |other: &&DeviceSpec| {
                        other.path != candidate.path
                            && other.extent.as_ref().is_some_and(|e| e.intersects(extent))
                    };
                    selected.iter().any(clashes_with) || in_use.iter().any(clashes_with)
                })
                .map(|d| d.path.clone())
                .collect();

            if !overlapping.is_empty() {
                debug!("Overlapping devices on {}: {:?}", server, overlapping);
            }
            Ok(overlapping)
        })
    }
}

#[async_trait]
impl FileSystemAdmin for StaticInventory {
    async fn load_file_system(&self, server: &str, filesystem: &str) -> Result<FileSystemInfo> {
        self.with_server(server, |host| {
            host.file_systems
                .iter()
                .find(|fs| fs.name == filesystem)
                .map(FileSystemSpec::info)
                .ok_or_else(|| Error::FileSystemNotFound {
                    server: server.to_string(),
                    filesystem: filesystem.to_string(),
                })
        })
    }

    async fn create_striped_group_descriptor(
        &self,
        server: &str,
        members: &[Device],
    ) -> Result<StripedGroupDescriptor> {
        self.with_server(server, |host| {
            host.ensure_allocatable(members.iter().map(|d| &d.id))?;
            let capacities: BTreeSet<u64> = members.iter().map(|d| d.capacity_bytes).collect();
            if capacities.len() != 1 {
                return Err(Error::collaborator(
                    "create striped group",
                    ERR_BAD_STRIPED_GROUP,
                    "striped group members must be non-empty and equally sized",
                ));
            }
            Ok(StripedGroupDescriptor {
                name: String::new(),
                members: members.to_vec(),
            })
        })
    }

    async fn grow_file_system(&self, request: GrowRequest) -> Result<()> {
        let mut servers = self.servers.write();
        let host = servers
            .get_mut(&request.server)
            .ok_or_else(|| Error::ServerNotFound {
                server: request.server.clone(),
            })?;

        let added: Vec<&DeviceId> = request
            .metadata_devices
            .iter()
            .chain(request.data_devices.iter())
            .chain(request.striped_groups.iter().flat_map(|g| g.members.iter()))
            .map(|d| &d.id)
            .collect();
        let unique: BTreeSet<&DeviceId> = added.iter().copied().collect();
        if unique.len() != added.len() {
            warn!("Grow request for {} lists a device twice", request.filesystem);
            return Err(Error::collaborator(
                "grow file system",
                ERR_DEVICE_IN_USE,
                "a device appears more than once in the request",
            ));
        }
        host.ensure_allocatable(added)?;

        let fs = host
            .file_system_mut(&request.filesystem)
            .ok_or_else(|| Error::FileSystemNotFound {
                server: request.server.clone(),
                filesystem: request.filesystem.clone(),
            })?;

        fs.metadata_devices
            .extend(request.metadata_devices.iter().map(|d| d.id.clone()));
        fs.data_devices
            .extend(request.data_devices.iter().map(|d| d.id.clone()));
        for group in &request.striped_groups {
            debug!("Adding striped group g{} to {}", fs.striped_groups.len(), fs.name);
            fs.striped_groups
                .push(group.members.iter().map(|d| d.id.clone()).collect());
        }

        info!(
            "Grew {} on {} by {} LUNs",
            request.filesystem,
            request.server,
            request.lun_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const INVENTORY: &str = r#"
servers:
  mds1:
    devices:
      - { path: /dev/m0, capacity_bytes: 10, extent: { disk: d0, start: 0, end: 100 } }
      - { path: /dev/m1, capacity_bytes: 10, extent: { disk: d0, start: 100, end: 200 } }
      - { path: /dev/m2, capacity_bytes: 10, extent: { disk: d0, start: 150, end: 250 } }
      - { path: /dev/s0, capacity_bytes: 50, extent: { disk: d1, start: 0, end: 100 } }
      - { path: /dev/s1, capacity_bytes: 50, extent: { disk: d1, start: 100, end: 200 } }
      - { path: /dev/s2, capacity_bytes: 50, extent: { disk: d2, start: 0, end: 100 } }
      - { path: /dev/s3, capacity_bytes: 50, extent: { disk: d2, start: 100, end: 200 } }
      - { path: /dev/x9, capacity_bytes: 80, extent: { disk: d1, start: 50, end: 60 } }
    file_systems:
      - name: qfs1
        mounted: true
        metadata_devices: [/dev/m0]
        striped_groups: [[/dev/s0, /dev/s1]]
"#;

    fn inventory() -> StaticInventory {
        StaticInventory::from_yaml(INVENTORY).unwrap()
    }

    fn ids(paths: &[&str]) -> Vec<DeviceId> {
        paths.iter().map(|p| DeviceId::from(*p)).collect()
    }

    #[tokio::test]
    async fn test_discover_excludes_in_use() {
        let devices = inventory().discover_allocatable_devices("mds1").await.unwrap();
        let paths: Vec<&str> = devices.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(paths, vec!["/dev/m1", "/dev/m2", "/dev/s2", "/dev/s3", "/dev/x9"]);
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let result = inventory().discover_allocatable_devices("mds9").await;
        assert_matches!(result, Err(Error::ServerNotFound { .. }));
    }

    #[tokio::test]
    async fn test_load_file_system() {
        let inv = inventory();
        let info = inv.load_file_system("mds1", "qfs1").await.unwrap();
        assert!(info.mounted);
        assert!(!info.combined_metadata_and_data);
        assert_eq!(info.metadata_devices, 1);
        assert_eq!(info.striped_groups, vec![2]);

        let missing = inv.load_file_system("mds1", "qfs2").await;
        assert_matches!(missing, Err(Error::FileSystemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_overlap_between_selected_devices() {
        let overlapping = inventory()
            .check_overlap("mds1", &ids(&["/dev/m1", "/dev/m2", "/dev/s2"]))
            .await
            .unwrap();
        assert_eq!(overlapping, ids(&["/dev/m1", "/dev/m2"]));
    }

    #[tokio::test]
    async fn test_overlap_with_in_use_device() {
        let overlapping = inventory()
            .check_overlap("mds1", &ids(&["/dev/s2", "/dev/x9"]))
            .await
            .unwrap();
        assert_eq!(overlapping, ids(&["/dev/x9"]));
    }

    #[tokio::test]
    async fn test_striped_group_descriptor_checks_members() {
        let inv = inventory();
        let group = vec![Device::new("/dev/s2", 50), Device::new("/dev/s3", 50)];
        let descriptor = inv.create_striped_group_descriptor("mds1", &group).await.unwrap();
        assert_eq!(descriptor.members.len(), 2);

        let mixed = vec![Device::new("/dev/s2", 50), Device::new("/dev/x9", 80)];
        assert_matches!(
            inv.create_striped_group_descriptor("mds1", &mixed).await,
            Err(Error::Collaborator { code: ERR_BAD_STRIPED_GROUP, .. })
        );

        let used = vec![Device::new("/dev/s0", 50)];
        assert_matches!(
            inv.create_striped_group_descriptor("mds1", &used).await,
            Err(Error::Collaborator { code: ERR_DEVICE_IN_USE, .. })
        );
    }

    #[tokio::test]
    async fn test_grow_consumes_devices() {
        let inv = inventory();
        let request = GrowRequest {
            server: "mds1".into(),
            filesystem: "qfs1".into(),
            metadata_devices: vec![Device::new("/dev/m1", 10)],
            data_devices: Vec::new(),
            striped_groups: vec![StripedGroupDescriptor {
                name: String::new(),
                members: vec![Device::new("/dev/s2", 50), Device::new("/dev/s3", 50)],
            }],
        };
        inv.grow_file_system(request.clone()).await.unwrap();

        let fs = inv.file_system("mds1", "qfs1").unwrap();
        assert_eq!(fs.metadata_devices, ids(&["/dev/m0", "/dev/m1"]));
        assert_eq!(fs.striped_groups.len(), 2);

        let remaining = inv.discover_allocatable_devices("mds1").await.unwrap();
        assert_eq!(remaining.len(), 2);

        // Same devices again are now in use
        assert_matches!(
            inv.grow_file_system(request).await,
            Err(Error::Collaborator { code: ERR_DEVICE_IN_USE, .. })
        );
    }
}
