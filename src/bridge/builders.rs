//! Endpoint builders for the built-in device types.
//!
//! Every bridged endpoint carries the Bridged Node device type together with
//! the Descriptor and BridgedDeviceBasicInformation clusters, followed by the
//! functional clusters of its own device type.

use super::registry::EndpointBuilder;
use crate::matter::device_types::*;
use crate::matter::endpoint::{ClusterId, Endpoint, EndpointError};
use crate::matter::framework::UserData;

const BRIDGED_CLUSTERS: &[ClusterId] = &[
    ClusterId::Descriptor,
    ClusterId::BridgedDeviceBasicInformation,
];

const LIGHT_CLUSTERS: &[ClusterId] = &[ClusterId::Identify, ClusterId::Groups, ClusterId::OnOff];

fn bridged_endpoint(
    endpoint: &mut Endpoint,
    device_type: DeviceType,
    clusters: &[ClusterId],
    user_data: Option<&UserData>,
) -> Result<(), EndpointError> {
    endpoint.add_device_type(device_type)?;
    endpoint.add_device_type(DEV_TYPE_BRIDGED_NODE)?;
    endpoint.add_clusters(BRIDGED_CLUSTERS)?;
    endpoint.add_clusters(clusters)?;
    // A String token from the caller names the device in controllers.
    if let Some(label) = user_data.and_then(|d| d.downcast_ref::<String>()) {
        endpoint.set_node_label(label.clone());
    }
    Ok(())
}

pub struct OnOffLight;

impl EndpointBuilder for OnOffLight {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(endpoint, DEV_TYPE_ON_OFF_LIGHT, LIGHT_CLUSTERS, user_data)
    }
}

pub struct DimmableLight;

impl EndpointBuilder for DimmableLight {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(endpoint, DEV_TYPE_DIMMABLE_LIGHT, LIGHT_CLUSTERS, user_data)?;
        endpoint.add_cluster(ClusterId::LevelControl)
    }
}

pub struct ColorTemperatureLight;

impl EndpointBuilder for ColorTemperatureLight {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(
            endpoint,
            DEV_TYPE_COLOR_TEMPERATURE_LIGHT,
            LIGHT_CLUSTERS,
            user_data,
        )?;
        endpoint.add_clusters(&[ClusterId::LevelControl, ClusterId::ColorControl])
    }
}

/// Outlets and relays.
pub struct OnOffPlugInUnit;

impl EndpointBuilder for OnOffPlugInUnit {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(endpoint, DEV_TYPE_ON_OFF_PLUG_IN_UNIT, LIGHT_CLUSTERS, user_data)
    }
}

pub struct ContactSensor;

impl EndpointBuilder for ContactSensor {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(
            endpoint,
            DEV_TYPE_CONTACT_SENSOR,
            &[ClusterId::Identify, ClusterId::BooleanState],
            user_data,
        )
    }
}

pub struct OccupancySensor;

impl EndpointBuilder for OccupancySensor {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(
            endpoint,
            DEV_TYPE_OCCUPANCY_SENSOR,
            &[ClusterId::Identify, ClusterId::OccupancySensing],
            user_data,
        )
    }
}

pub struct TemperatureSensor;

impl EndpointBuilder for TemperatureSensor {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(
            endpoint,
            DEV_TYPE_TEMPERATURE_SENSOR,
            &[ClusterId::Identify, ClusterId::TemperatureMeasurement],
            user_data,
        )
    }
}

pub struct HumiditySensor;

impl EndpointBuilder for HumiditySensor {
    fn build(
        &self,
        endpoint: &mut Endpoint,
        user_data: Option<&UserData>,
    ) -> Result<(), EndpointError> {
        bridged_endpoint(
            endpoint,
            DEV_TYPE_HUMIDITY_SENSOR,
            &[ClusterId::Identify, ClusterId::RelativeHumidityMeasurement],
            user_data,
        )
    }
}
