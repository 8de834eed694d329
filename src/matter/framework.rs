//! Contract between the bridge core and the surrounding Matter framework.
//!
//! The bridge never manipulates the Matter data model directly. It asks the
//! node to create, resume, enable and destroy endpoints, and hands it a
//! construction callback that equips each new endpoint with its clusters.

use super::endpoint::{Endpoint, EndpointId};
use std::any::Any;
use std::sync::Arc;
use thiserror::Error;

/// Opaque caller-owned token threaded through to construction callbacks.
///
/// Neither the node nor the bridge interprets it.
pub type UserData = Arc<dyn Any + Send + Sync>;

/// Handle to the Matter node hosting all endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle(pub u64);

/// Handle to an endpoint owned by the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointHandle(EndpointId);

impl EndpointHandle {
    pub const fn new(id: EndpointId) -> Self {
        Self(id)
    }

    pub const fn id(self) -> EndpointId {
        self.0
    }
}

/// Returned by a construction callback to make the node abandon the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("endpoint construction aborted by callback")]
pub struct ConstructAborted;

/// Construction callback: populate the endpoint with clusters.
///
/// Invoked by the node exactly once per successful create/resume, before the
/// endpoint becomes visible. Must not call back into the bridge.
pub type ConstructFn<'a> = dyn FnMut(&mut Endpoint) -> Result<(), ConstructAborted> + 'a;

/// Failures reported by the Matter node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("dynamic endpoint count cannot exceed {max}")]
    EndpointLimit { max: usize },

    #[error("endpoint {0} does not exist")]
    EndpointNotFound(EndpointId),

    #[error("parent endpoint {0} does not exist")]
    ParentNotFound(EndpointId),

    #[error("endpoint {0} is already part of the node")]
    AlreadyExists(EndpointId),

    #[error("endpoint {0} was never allocated and cannot be resumed")]
    NeverAllocated(EndpointId),

    #[error("endpoint id space exhausted")]
    IdSpaceExhausted,

    #[error("endpoint {0} is not destroyable")]
    NotDestroyable(EndpointId),

    #[error("construction callback failed: {0}")]
    Construction(#[from] ConstructAborted),

    #[error("node storage error: {0}")]
    Storage(String),

    #[error("{0}")]
    Other(String),
}

/// The Matter framework as consumed by the bridge.
///
/// Implementations may perform I/O (persistence writes, inter-task messaging);
/// the bridge never holds its table lock across these calls.
pub trait MatterNode: Send + Sync {
    /// The node all bridged endpoints live on, if the data model is up.
    fn node_get(&self) -> Option<NodeHandle>;

    /// Allocate a fresh endpoint id under `parent` and construct it.
    fn endpoint_create(
        &self,
        parent: EndpointId,
        device_type_id: u32,
        construct: &mut ConstructFn<'_>,
        user_data: Option<&UserData>,
    ) -> Result<EndpointHandle, NodeError>;

    /// Re-create a previously allocated endpoint id after restart.
    fn endpoint_resume(
        &self,
        parent: EndpointId,
        endpoint_id: EndpointId,
        device_type_id: u32,
        construct: &mut ConstructFn<'_>,
        user_data: Option<&UserData>,
    ) -> Result<EndpointHandle, NodeError>;

    fn endpoint_enable(&self, handle: EndpointHandle) -> Result<(), NodeError>;

    fn endpoint_destroy(&self, handle: EndpointHandle) -> Result<(), NodeError>;

    /// Snapshot of an endpoint, for observability and tests.
    fn endpoint(&self, id: EndpointId) -> Option<Endpoint>;
}
