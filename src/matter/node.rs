//! In-memory Matter node.
//!
//! Reference implementation of [`MatterNode`] that keeps the endpoint tree in
//! memory. Endpoint ids are handed out from a monotonically increasing
//! "minimum unused endpoint id" counter which is persisted through an optional
//! [`NodeStore`], so ids are never reused across destroy or restart.

use super::device_types::{DEV_TYPE_AGGREGATOR, DEV_TYPE_ROOT_NODE};
use super::endpoint::{ClusterId, Endpoint, EndpointId, INVALID_ENDPOINT_ID, ROOT_ENDPOINT_ID};
use super::framework::{
    ConstructFn, EndpointHandle, MatterNode, NodeError, NodeHandle, UserData,
};
use crate::bridge::persistence::StoreError;
use crate::config::BridgeConfig;
use log::{debug, warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Storage for node-level metadata that must survive restart.
pub trait NodeStore: Send + Sync {
    fn load_min_unused_endpoint_id(&self) -> Result<Option<EndpointId>, StoreError>;
    fn store_min_unused_endpoint_id(&self, id: EndpointId) -> Result<(), StoreError>;
}

/// Static layout of the simulated node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub node_id: u64,
    pub aggregator_endpoint_id: EndpointId,
    pub first_dynamic_endpoint_id: EndpointId,
    pub max_dynamic_endpoint_count: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: 0,
            aggregator_endpoint_id: 1,
            first_dynamic_endpoint_id: 2,
            max_dynamic_endpoint_count: 16,
        }
    }
}

impl From<&BridgeConfig> for NodeConfig {
    fn from(config: &BridgeConfig) -> Self {
        Self {
            node_id: 0,
            aggregator_endpoint_id: config.aggregator_endpoint_id,
            first_dynamic_endpoint_id: config.first_dynamic_endpoint_id,
            max_dynamic_endpoint_count: config.max_dynamic_endpoint_count,
        }
    }
}

struct NodeState {
    endpoints: BTreeMap<EndpointId, Endpoint>,
    min_unused_endpoint_id: EndpointId,
}

impl NodeState {
    fn dynamic_count(&self) -> usize {
        self.endpoints.values().filter(|e| e.is_destroyable()).count()
    }
}

pub struct SimulatedNode {
    config: NodeConfig,
    state: Mutex<NodeState>,
    store: Option<Arc<dyn NodeStore>>,
}

impl SimulatedNode {
    /// Create a node with only the root and aggregator endpoints.
    pub fn new(config: NodeConfig) -> Self {
        let mut endpoints = BTreeMap::new();

        endpoints.insert(
            ROOT_ENDPOINT_ID,
            Endpoint::fixed(
                ROOT_ENDPOINT_ID,
                INVALID_ENDPOINT_ID,
                DEV_TYPE_ROOT_NODE,
                &[ClusterId::Descriptor],
            ),
        );
        endpoints.insert(
            config.aggregator_endpoint_id,
            Endpoint::fixed(
                config.aggregator_endpoint_id,
                ROOT_ENDPOINT_ID,
                DEV_TYPE_AGGREGATOR,
                &[ClusterId::Descriptor],
            ),
        );

        let min_unused_endpoint_id = config
            .first_dynamic_endpoint_id
            .max(config.aggregator_endpoint_id.saturating_add(1));

        Self {
            config,
            state: Mutex::new(NodeState {
                endpoints,
                min_unused_endpoint_id,
            }),
            store: None,
        }
    }

    /// Create a node whose id counter is restored from and saved to `store`.
    pub fn with_store(config: NodeConfig, store: Arc<dyn NodeStore>) -> Result<Self, NodeError> {
        let mut node = Self::new(config);
        let persisted = store
            .load_min_unused_endpoint_id()
            .map_err(|e| NodeError::Storage(e.to_string()))?;
        if let Some(id) = persisted {
            let state = node.state.get_mut();
            state.min_unused_endpoint_id = state.min_unused_endpoint_id.max(id);
        }
        node.store = Some(store);
        Ok(node)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn min_unused_endpoint_id(&self) -> EndpointId {
        self.state.lock().min_unused_endpoint_id
    }

    /// Ids of every endpoint on the node, fixed ones included.
    pub fn endpoint_ids(&self) -> Vec<EndpointId> {
        self.state.lock().endpoints.keys().copied().collect()
    }

    pub fn dynamic_endpoint_count(&self) -> usize {
        self.state.lock().dynamic_count()
    }

    fn check_capacity(&self, state: &NodeState, parent: EndpointId) -> Result<(), NodeError> {
        if !state.endpoints.contains_key(&parent) {
            return Err(NodeError::ParentNotFound(parent));
        }
        if state.dynamic_count() >= self.config.max_dynamic_endpoint_count {
            return Err(NodeError::EndpointLimit {
                max: self.config.max_dynamic_endpoint_count,
            });
        }
        Ok(())
    }

    fn persist_min_unused(&self, id: EndpointId) {
        if let Some(store) = &self.store
            && let Err(e) = store.store_min_unused_endpoint_id(id)
        {
            warn!("Failed to store minimum unused endpoint id {}: {}", id, e);
        }
    }
}

impl MatterNode for SimulatedNode {
    fn node_get(&self) -> Option<NodeHandle> {
        Some(NodeHandle(self.config.node_id))
    }

    fn endpoint_create(
        &self,
        parent: EndpointId,
        device_type_id: u32,
        construct: &mut ConstructFn<'_>,
        _user_data: Option<&UserData>,
    ) -> Result<EndpointHandle, NodeError> {
        let mut state = self.state.lock();
        self.check_capacity(&state, parent)?;

        let id = state.min_unused_endpoint_id;
        if id == INVALID_ENDPOINT_ID {
            return Err(NodeError::IdSpaceExhausted);
        }
        // The id is consumed even if construction fails below.
        state.min_unused_endpoint_id = id + 1;
        self.persist_min_unused(id + 1);

        let mut endpoint = Endpoint::new(id, parent, true);
        construct(&mut endpoint)?;
        state.endpoints.insert(id, endpoint);
        debug!(
            "Created endpoint {} (device type 0x{:04X}) under {}",
            id, device_type_id, parent
        );
        Ok(EndpointHandle::new(id))
    }

    fn endpoint_resume(
        &self,
        parent: EndpointId,
        endpoint_id: EndpointId,
        device_type_id: u32,
        construct: &mut ConstructFn<'_>,
        _user_data: Option<&UserData>,
    ) -> Result<EndpointHandle, NodeError> {
        let mut state = self.state.lock();
        if state.endpoints.contains_key(&endpoint_id) {
            return Err(NodeError::AlreadyExists(endpoint_id));
        }
        if endpoint_id >= state.min_unused_endpoint_id {
            return Err(NodeError::NeverAllocated(endpoint_id));
        }
        self.check_capacity(&state, parent)?;

        let mut endpoint = Endpoint::new(endpoint_id, parent, true);
        construct(&mut endpoint)?;
        state.endpoints.insert(endpoint_id, endpoint);
        debug!(
            "Resumed endpoint {} (device type 0x{:04X}) under {}",
            endpoint_id, device_type_id, parent
        );
        Ok(EndpointHandle::new(endpoint_id))
    }

    fn endpoint_enable(&self, handle: EndpointHandle) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        let endpoint = state
            .endpoints
            .get_mut(&handle.id())
            .ok_or(NodeError::EndpointNotFound(handle.id()))?;
        endpoint.set_enabled(true);
        Ok(())
    }

    fn endpoint_destroy(&self, handle: EndpointHandle) -> Result<(), NodeError> {
        let mut state = self.state.lock();
        let endpoint = state
            .endpoints
            .get_mut(&handle.id())
            .ok_or(NodeError::EndpointNotFound(handle.id()))?;
        if !endpoint.is_destroyable() {
            return Err(NodeError::NotDestroyable(handle.id()));
        }
        endpoint.set_enabled(false);
        endpoint.clear_clusters();
        state.endpoints.remove(&handle.id());
        debug!("Destroyed endpoint {}", handle.id());
        Ok(())
    }

    fn endpoint(&self, id: EndpointId) -> Option<Endpoint> {
        self.state.lock().endpoints.get(&id).cloned()
    }
}
