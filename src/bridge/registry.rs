//! Device-Type Registry.
//!
//! Maps a Matter device type id to a name and an [`EndpointBuilder`] that
//! equips a freshly created endpoint with the clusters of that device type.
//! Tables are `'static` and immutable; supporting a new device type means
//! adding an entry.

use super::builders;
use crate::error::{BridgeError, Result};
use crate::matter::endpoint::{Endpoint, EndpointError};
use crate::matter::framework::UserData;

/// Populates an endpoint with the clusters of one device type.
pub trait EndpointBuilder: Send + Sync + 'static {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> std::result::Result<(), EndpointError>;
}

pub struct DeviceTypeEntry {
    pub id: u32,
    pub name: &'static str,
    pub builder: &'static dyn EndpointBuilder,
}

/// Device types every bridge supports out of the box.
pub static BUILTIN_DEVICE_TYPES: &[DeviceTypeEntry] = &[
    DeviceTypeEntry {
        id: 0x0100,
        name: "on_off_light",
        builder: &builders::OnOffLight,
    },
    DeviceTypeEntry {
        id: 0x0101,
        name: "dimmable_light",
        builder: &builders::DimmableLight,
    },
    DeviceTypeEntry {
        id: 0x010C,
        name: "color_temperature_light",
        builder: &builders::ColorTemperatureLight,
    },
    DeviceTypeEntry {
        id: 0x010A,
        name: "on_off_plugin_unit",
        builder: &builders::OnOffPlugInUnit,
    },
    DeviceTypeEntry {
        id: 0x0015,
        name: "contact_sensor",
        builder: &builders::ContactSensor,
    },
    DeviceTypeEntry {
        id: 0x0107,
        name: "occupancy_sensor",
        builder: &builders::OccupancySensor,
    },
    DeviceTypeEntry {
        id: 0x0302,
        name: "temperature_sensor",
        builder: &builders::TemperatureSensor,
    },
    DeviceTypeEntry {
        id: 0x0307,
        name: "humidity_sensor",
        builder: &builders::HumiditySensor,
    },
];

#[derive(Clone, Copy)]
pub struct DeviceTypeRegistry {
    entries: &'static [DeviceTypeEntry],
}

impl Default for DeviceTypeRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DeviceTypeRegistry {
    pub const fn new(entries: &'static [DeviceTypeEntry]) -> Self {
        Self { entries }
    }

    pub const fn builtin() -> Self {
        Self::new(BUILTIN_DEVICE_TYPES)
    }

    pub fn lookup(&self, device_type_id: u32) -> Option<&'static DeviceTypeEntry> {
        self.entries.iter().find(|e| e.id == device_type_id)
    }

    pub fn is_supported(&self, device_type_id: u32) -> bool {
        self.lookup(device_type_id).is_some()
    }

    pub fn name(&self, device_type_id: u32) -> Option<&'static str> {
        self.lookup(device_type_id).map(|e| e.name)
    }

    pub fn entries(&self) -> std::slice::Iter<'static, DeviceTypeEntry> {
        self.entries.iter()
    }

    /// Dispatch to the registered builder for `device_type_id`.
    pub fn construct(
        &self,
        endpoint: &mut Endpoint,
        device_type_id: u32,
        user_data: Option<&UserData>,
    ) -> Result<()> {
        let entry = self
            .lookup(device_type_id)
            .ok_or(BridgeError::UnsupportedDeviceType(device_type_id))?;
        entry
            .builder
            .build(endpoint, user_data)
            .map_err(|e| BridgeError::ConstructionFailed {
                device_type_id,
                reason: e.to_string(),
            })
    }
}
