//! Port Adapters
//!
//! Concrete implementations of the collaborator ports in [`crate::domain::ports`].

pub mod inventory;

pub use inventory::{DeviceSpec, Extent, FileSystemSpec, ServerSpec, StaticInventory};
