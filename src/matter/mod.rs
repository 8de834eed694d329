pub mod device_types;
pub mod endpoint;
pub mod framework;
pub mod node;

pub use endpoint::{ClusterId, Endpoint, EndpointId, INVALID_ENDPOINT_ID};
pub use framework::{EndpointHandle, MatterNode, NodeError, UserData};
pub use node::{NodeConfig, NodeStore, SimulatedNode};
