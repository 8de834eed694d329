//! Endpoint composition: the device types and clusters a Matter endpoint exposes.

use super::device_types::DeviceType;
use std::fmt;
use strum::FromRepr;
use thiserror::Error;

/// Matter endpoint identifier.
pub type EndpointId = u16;

/// Reserved "no endpoint" sentinel (`kInvalidEndpointId` in the Matter SDK).
pub const INVALID_ENDPOINT_ID: EndpointId = 0xFFFF;

/// Endpoint 0 hosts the root node clusters.
pub const ROOT_ENDPOINT_ID: EndpointId = 0;

/// Cluster identifiers used by bridged endpoints.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromRepr)]
#[repr(u32)]
pub enum ClusterId {
    Identify = 0x0003,
    Groups = 0x0004,
    OnOff = 0x0006,
    LevelControl = 0x0008,
    Descriptor = 0x001D,
    BridgedDeviceBasicInformation = 0x0039,
    BooleanState = 0x0045,
    ColorControl = 0x0300,
    TemperatureMeasurement = 0x0402,
    RelativeHumidityMeasurement = 0x0405,
    OccupancySensing = 0x0406,
}

impl ClusterId {
    pub const fn id(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}(0x{:04X})", self, self.id())
    }
}

/// Errors raised while composing an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("cluster {cluster} already present on endpoint {endpoint_id}")]
    DuplicateCluster {
        endpoint_id: EndpointId,
        cluster: ClusterId,
    },

    #[error("device type {device_type} already present on endpoint {endpoint_id}")]
    DuplicateDeviceType {
        endpoint_id: EndpointId,
        device_type: DeviceType,
    },
}

/// A Matter endpoint as held by the node.
///
/// Construction callbacks receive a freshly allocated, disabled endpoint and
/// populate its device types and clusters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    id: EndpointId,
    parent_id: EndpointId,
    device_types: Vec<DeviceType>,
    clusters: Vec<ClusterId>,
    node_label: Option<String>,
    destroyable: bool,
    enabled: bool,
}

impl Endpoint {
    pub fn new(id: EndpointId, parent_id: EndpointId, destroyable: bool) -> Self {
        Self {
            id,
            parent_id,
            device_types: Vec::new(),
            clusters: Vec::new(),
            node_label: None,
            destroyable,
            enabled: false,
        }
    }

    /// An enabled, non-destroyable endpoint that is part of the node layout.
    pub(crate) fn fixed(
        id: EndpointId,
        parent_id: EndpointId,
        device_type: DeviceType,
        clusters: &[ClusterId],
    ) -> Self {
        Self {
            device_types: vec![device_type],
            clusters: clusters.to_vec(),
            enabled: true,
            ..Self::new(id, parent_id, false)
        }
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    pub fn parent_id(&self) -> EndpointId {
        self.parent_id
    }

    pub fn device_types(&self) -> &[DeviceType] {
        &self.device_types
    }

    pub fn clusters(&self) -> &[ClusterId] {
        &self.clusters
    }

    pub fn node_label(&self) -> Option<&str> {
        self.node_label.as_deref()
    }

    pub fn is_destroyable(&self) -> bool {
        self.destroyable
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_cluster(&self, cluster: ClusterId) -> bool {
        self.clusters.contains(&cluster)
    }

    pub fn has_device_type(&self, dtype: u32) -> bool {
        self.device_types.iter().any(|d| d.dtype == dtype)
    }

    pub fn add_device_type(&mut self, device_type: DeviceType) -> Result<(), EndpointError> {
        if self.has_device_type(device_type.dtype) {
            return Err(EndpointError::DuplicateDeviceType {
                endpoint_id: self.id,
                device_type,
            });
        }
        self.device_types.push(device_type);
        Ok(())
    }

    pub fn add_cluster(&mut self, cluster: ClusterId) -> Result<(), EndpointError> {
        if self.has_cluster(cluster) {
            return Err(EndpointError::DuplicateCluster {
                endpoint_id: self.id,
                cluster,
            });
        }
        self.clusters.push(cluster);
        Ok(())
    }

    pub fn add_clusters(&mut self, clusters: &[ClusterId]) -> Result<(), EndpointError> {
        clusters.iter().try_for_each(|c| self.add_cluster(*c))
    }

    pub fn set_node_label(&mut self, label: impl Into<String>) {
        self.node_label = Some(label.into());
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Drop all clusters (endpoint teardown).
    pub(crate) fn clear_clusters(&mut self) {
        self.clusters.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::device_types::DEV_TYPE_ON_OFF_LIGHT;

    #[test]
    fn test_new_endpoint_is_disabled_and_empty() {
        let ep = Endpoint::new(5, 1, true);
        assert_eq!(ep.id(), 5);
        assert_eq!(ep.parent_id(), 1);
        assert!(!ep.is_enabled());
        assert!(ep.clusters().is_empty());
        assert!(ep.device_types().is_empty());
    }

    #[test]
    fn test_duplicate_cluster_rejected() {
        let mut ep = Endpoint::new(5, 1, true);
        ep.add_cluster(ClusterId::OnOff).unwrap();
        let err = ep.add_cluster(ClusterId::OnOff).unwrap_err();
        assert_eq!(
            err,
            EndpointError::DuplicateCluster {
                endpoint_id: 5,
                cluster: ClusterId::OnOff
            }
        );
        assert_eq!(ep.clusters(), &[ClusterId::OnOff]);
    }

    #[test]
    fn test_duplicate_device_type_rejected() {
        let mut ep = Endpoint::new(5, 1, true);
        ep.add_device_type(DEV_TYPE_ON_OFF_LIGHT).unwrap();
        assert!(ep.add_device_type(DEV_TYPE_ON_OFF_LIGHT).is_err());
        assert!(ep.has_device_type(0x0100));
    }

    #[test]
    fn test_fixed_endpoint() {
        let ep = Endpoint::fixed(1, 0, DEV_TYPE_ON_OFF_LIGHT, &[ClusterId::Descriptor]);
        assert!(ep.is_enabled());
        assert!(!ep.is_destroyable());
        assert!(ep.has_device_type(0x0100));
        assert_eq!(ep.clusters(), &[ClusterId::Descriptor]);
    }

    #[test]
    fn test_cluster_id_from_repr() {
        assert_eq!(ClusterId::from_repr(0x0006), Some(ClusterId::OnOff));
        assert_eq!(ClusterId::from_repr(0x1234), None);
        assert_eq!(ClusterId::OnOff.to_string(), "OnOff(0x0006)");
    }
}
