use crate::bridge::address::PhysicalAddress;
use crate::bridge::persistence::StoreError;
use crate::matter::endpoint::EndpointId;
use crate::matter::framework::NodeError;
use strum::FromRepr;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Device type 0x{0:04X} is not supported")]
    UnsupportedDeviceType(u32),

    #[error("Failed to construct endpoint for device type 0x{device_type_id:04X}: {reason}")]
    ConstructionFailed { device_type_id: u32, reason: String },

    #[error("Bridged device table is full ({capacity} devices)")]
    TableFull { capacity: usize },

    #[error("No bridged device on endpoint {0}")]
    EndpointNotFound(EndpointId),

    #[error("No bridged device with address {0}")]
    AddressNotFound(PhysicalAddress),

    #[error("Address {0} is already bridged")]
    AddressInUse(PhysicalAddress),

    #[error("Endpoint {0} is already bridged")]
    EndpointInUse(EndpointId),

    #[error("Failed to allocate bridged device bookkeeping")]
    NoMemory,

    #[error("Matter node is not available")]
    NodeUnavailable,

    #[error("Failed to create endpoint: {0}")]
    EndpointCreationFailed(#[source] NodeError),

    #[error("Failed to enable endpoint {endpoint_id}: {source}")]
    EndpointEnableFailed {
        endpoint_id: EndpointId,
        #[source]
        source: NodeError,
    },

    #[error("Failed to destroy endpoint {endpoint_id}: {source}")]
    EndpointDestructionFailed {
        endpoint_id: EndpointId,
        #[source]
        source: NodeError,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),
}

impl BridgeError {
    /// Collapse this error onto the status taxonomy reported by the console.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) | Self::UnsupportedDeviceType(_) => StatusCode::InvalidArgument,
            Self::EndpointNotFound(_) | Self::AddressNotFound(_) => StatusCode::NotFound,
            Self::TableFull { .. } | Self::NoMemory => StatusCode::NoMemory,
            Self::ConstructionFailed { .. }
            | Self::AddressInUse(_)
            | Self::EndpointInUse(_)
            | Self::NodeUnavailable
            | Self::EndpointCreationFailed(_)
            | Self::EndpointEnableFailed { .. }
            | Self::EndpointDestructionFailed { .. }
            | Self::Persistence(_) => StatusCode::InvalidState,
        }
    }
}

/// Generic result taxonomy shared by console commands and process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, strum::Display)]
#[repr(u8)]
pub enum StatusCode {
    Ok = 0,
    InvalidArgument = 1,
    NotFound = 2,
    NoMemory = 3,
    InvalidState = 4,
}

impl StatusCode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
