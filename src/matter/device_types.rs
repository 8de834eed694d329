//! Device type definitions for the Matter bridge.
//!
//! This module defines the device types bridged endpoints can be composed of,
//! as published in the Matter device library.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Matter device type: identifier plus revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceType {
    pub dtype: u32,
    pub drev: u8,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X} (rev {})", self.dtype, self.drev)
    }
}

/// Matter Root Node device type
///
/// Device Type ID: 0x0016 (22 decimal)
/// Device Type Revision: 1
pub const DEV_TYPE_ROOT_NODE: DeviceType = DeviceType {
    dtype: 0x0016,
    drev: 1,
};

/// Matter Aggregator device type (for bridge root)
///
/// Device Type ID: 0x000E (14 decimal)
/// Device Type Revision: 1
///
/// Used as the bridge aggregator endpoint that enumerates bridged devices.
pub const DEV_TYPE_AGGREGATOR: DeviceType = DeviceType {
    dtype: 0x000E,
    drev: 1,
};

/// Matter Bridged Node device type
///
/// Device Type ID: 0x0013 (19 decimal)
/// Device Type Revision: 1
///
/// Required clusters:
/// - BridgedDeviceBasicInformation (0x0039)
/// - Descriptor (standard)
///
/// Added to bridged device endpoints alongside their functional device type.
pub const DEV_TYPE_BRIDGED_NODE: DeviceType = DeviceType {
    dtype: 0x0013,
    drev: 1,
};

/// Matter On/Off Light device type
///
/// Device Type ID: 0x0100 (256 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - Identify (0x0003), Groups (0x0004), OnOff (0x0006)
pub const DEV_TYPE_ON_OFF_LIGHT: DeviceType = DeviceType {
    dtype: 0x0100,
    drev: 2,
};

/// Matter Dimmable Light device type
///
/// Device Type ID: 0x0101 (257 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - Identify, Groups, OnOff, LevelControl (0x0008)
pub const DEV_TYPE_DIMMABLE_LIGHT: DeviceType = DeviceType {
    dtype: 0x0101,
    drev: 2,
};

/// Matter Color Temperature Light device type
///
/// Device Type ID: 0x010C (268 decimal)
/// Device Type Revision: 2
///
/// Required clusters:
/// - Identify, Groups, OnOff, LevelControl, ColorControl (0x0300)
pub const DEV_TYPE_COLOR_TEMPERATURE_LIGHT: DeviceType = DeviceType {
    dtype: 0x010C,
    drev: 2,
};

/// Matter On/Off Plug-in Unit device type
///
/// Device Type ID: 0x010A (266 decimal)
/// Device Type Revision: 2
///
/// Used for standalone on/off switches and outlets.
pub const DEV_TYPE_ON_OFF_PLUG_IN_UNIT: DeviceType = DeviceType {
    dtype: 0x010A,
    drev: 2,
};

/// Matter Contact Sensor device type
///
/// Device Type ID: 0x0015 (21 decimal)
/// Device Type Revision: 1
///
/// Used for binary sensors (open/closed, true/false states).
pub const DEV_TYPE_CONTACT_SENSOR: DeviceType = DeviceType {
    dtype: 0x0015,
    drev: 1,
};

/// Matter Occupancy Sensor device type
///
/// Device Type ID: 0x0107 (263 decimal)
/// Device Type Revision: 1
pub const DEV_TYPE_OCCUPANCY_SENSOR: DeviceType = DeviceType {
    dtype: 0x0107,
    drev: 1,
};

/// Matter Temperature Sensor device type
///
/// Device Type ID: 0x0302 (770 decimal)
/// Device Type Revision: 2
pub const DEV_TYPE_TEMPERATURE_SENSOR: DeviceType = DeviceType {
    dtype: 0x0302,
    drev: 2,
};

/// Matter Humidity Sensor device type
///
/// Device Type ID: 0x0307 (775 decimal)
/// Device Type Revision: 2
pub const DEV_TYPE_HUMIDITY_SENSOR: DeviceType = DeviceType {
    dtype: 0x0307,
    drev: 2,
};
