//! Recording collaborator doubles shared by the workflow tests.

use crate::domain::ports::{
    Device, DeviceCatalog, DeviceId, FileSystemAdmin, FileSystemInfo, GrowRequest, OverlapChecker,
    StripedGroupDescriptor,
};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Overlap checker that reports a fixed set of devices
#[derive(Debug, Default)]
pub struct MockOverlapChecker {
    overlapping: Vec<DeviceId>,
    fail: bool,
    calls: Mutex<Vec<Vec<DeviceId>>>,
}

impl MockOverlapChecker {
    pub fn reporting<I, S>(devices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<DeviceId>,
    {
        Self {
            overlapping: devices.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<Vec<DeviceId>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl OverlapChecker for MockOverlapChecker {
    async fn check_overlap(&self, _server: &str, devices: &[DeviceId]) -> Result<Vec<DeviceId>> {
        self.calls.lock().push(devices.to_vec());
        if self.fail {
            return Err(Error::collaborator("check overlap", 30_001, "overlap service unavailable"));
        }
        Ok(self
            .overlapping
            .iter()
            .filter(|d| devices.contains(d))
            .cloned()
            .collect())
    }
}

/// Device catalog returning a fixed device list
#[derive(Debug, Default)]
pub struct MockCatalog {
    pub devices: Vec<Device>,
    pub fail: bool,
}

#[async_trait]
impl DeviceCatalog for MockCatalog {
    async fn discover_allocatable_devices(&self, _server: &str) -> Result<Vec<Device>> {
        if self.fail {
            return Err(Error::collaborator("discover devices", 30_002, "discovery failed"));
        }
        Ok(self.devices.clone())
    }
}

/// Calls observed by [`MockFileSystemAdmin`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCall {
    Load(String),
    CreateGroup(Vec<DeviceId>),
    Grow(usize),
}

/// File-system admin with scripted failures
#[derive(Debug, Default)]
pub struct MockFileSystemAdmin {
    pub info: Option<FileSystemInfo>,
    fail_group: Option<usize>,
    fail_grow: bool,
    calls: Mutex<Vec<AdminCall>>,
    grows: Mutex<Vec<GrowRequest>>,
}

impl MockFileSystemAdmin {
    pub fn with_info(info: FileSystemInfo) -> Self {
        Self {
            info: Some(info),
            ..Default::default()
        }
    }

    /// Fail the descriptor call with this zero-based index
    pub fn with_failing_group(mut self, index: usize) -> Self {
        self.fail_group = Some(index);
        self
    }

    pub fn with_failing_grow(mut self) -> Self {
        self.fail_grow = true;
        self
    }

    pub fn calls(&self) -> Vec<AdminCall> {
        self.calls.lock().clone()
    }

    pub fn grows(&self) -> Vec<GrowRequest> {
        self.grows.lock().clone()
    }
}

#[async_trait]
impl FileSystemAdmin for MockFileSystemAdmin {
    async fn load_file_system(&self, server: &str, filesystem: &str) -> Result<FileSystemInfo> {
        self.calls.lock().push(AdminCall::Load(filesystem.to_string()));
        self.info.clone().ok_or_else(|| Error::FileSystemNotFound {
            server: server.to_string(),
            filesystem: filesystem.to_string(),
        })
    }

    async fn create_striped_group_descriptor(
        &self,
        _server: &str,
        members: &[Device],
    ) -> Result<StripedGroupDescriptor> {
        let index = {
            let mut calls = self.calls.lock();
            calls.push(AdminCall::CreateGroup(members.iter().map(|d| d.id.clone()).collect()));
            calls.iter().filter(|c| matches!(c, AdminCall::CreateGroup(_))).count() - 1
        };
        if self.fail_group == Some(index) {
            return Err(Error::collaborator("create striped group", 30_003, "bad member"));
        }
        Ok(StripedGroupDescriptor {
            name: String::new(),
            members: members.to_vec(),
        })
    }

    async fn grow_file_system(&self, request: GrowRequest) -> Result<()> {
        self.calls.lock().push(AdminCall::Grow(request.lun_count()));
        if self.fail_grow {
            return Err(Error::collaborator("grow file system", 30_004, "device busy"));
        }
        self.grows.lock().push(request);
        Ok(())
    }
}
