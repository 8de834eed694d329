//! Bridged-device registry and lifecycle.

pub mod address;
pub mod builders;
pub mod manager;
pub mod persistence;
pub mod registry;
pub mod table;

pub use address::PhysicalAddress;
pub use manager::{BridgeManager, ResumeReport};
pub use persistence::{BridgeStore, JsonFileStore, MemoryStore, PersistedDevice, StoreError};
pub use registry::{DeviceTypeEntry, DeviceTypeRegistry, EndpointBuilder};
pub use table::{BridgedDeviceRecord, BridgedDeviceTable, SlotHandle};
