//! Fault-injecting collaborators for unit tests.

use crate::bridge::persistence::{BridgeStore, MemoryStore, PersistedDevice, StoreError};
use crate::matter::endpoint::{Endpoint, EndpointId};
use crate::matter::framework::{
    ConstructFn, EndpointHandle, MatterNode, NodeError, NodeHandle, UserData,
};
use crate::matter::node::{NodeConfig, NodeStore, SimulatedNode};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Called with the endpoint id on every enable attempt.
pub type EnableHook = Box<dyn Fn(EndpointId) + Send + Sync>;

fn injected(what: &str) -> NodeError {
    NodeError::Other(format!("injected {} failure", what))
}

/// [`SimulatedNode`] with switchable failures.
pub struct FaultyNode {
    pub inner: SimulatedNode,
    pub unavailable: AtomicBool,
    pub fail_next_create: AtomicBool,
    pub fail_next_enable: AtomicBool,
    pub fail_next_destroy: AtomicBool,
    pub fail_enable_for: Mutex<HashSet<EndpointId>>,
    pub destroy_calls: AtomicUsize,
    pub enable_hook: Mutex<Option<EnableHook>>,
}

impl FaultyNode {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            inner: SimulatedNode::new(config),
            unavailable: AtomicBool::new(false),
            fail_next_create: AtomicBool::new(false),
            fail_next_enable: AtomicBool::new(false),
            fail_next_destroy: AtomicBool::new(false),
            fail_enable_for: Mutex::new(HashSet::new()),
            destroy_calls: AtomicUsize::new(0),
            enable_hook: Mutex::new(None),
        }
    }

    pub fn with_store(config: NodeConfig, store: Arc<dyn NodeStore>) -> Self {
        let mut node = Self::new(config.clone());
        node.inner = SimulatedNode::with_store(config, store).unwrap();
        node
    }
}

impl Default for FaultyNode {
    fn default() -> Self {
        Self::new(NodeConfig::default())
    }
}

impl MatterNode for FaultyNode {
    fn node_get(&self) -> Option<NodeHandle> {
        if self.unavailable.load(Ordering::SeqCst) {
            None
        } else {
            self.inner.node_get()
        }
    }

    fn endpoint_create(
        &self,
        parent: EndpointId,
        device_type_id: u32,
        construct: &mut ConstructFn<'_>,
        user_data: Option<&UserData>,
    ) -> Result<EndpointHandle, NodeError> {
        if self.fail_next_create.swap(false, Ordering::SeqCst) {
            return Err(injected("create"));
        }
        self.inner
            .endpoint_create(parent, device_type_id, construct, user_data)
    }

    fn endpoint_resume(
        &self,
        parent: EndpointId,
        endpoint_id: EndpointId,
        device_type_id: u32,
        construct: &mut ConstructFn<'_>,
        user_data: Option<&UserData>,
    ) -> Result<EndpointHandle, NodeError> {
        self.inner
            .endpoint_resume(parent, endpoint_id, device_type_id, construct, user_data)
    }

    fn endpoint_enable(&self, handle: EndpointHandle) -> Result<(), NodeError> {
        if let Some(hook) = self.enable_hook.lock().as_ref() {
            hook(handle.id());
        }
        if self.fail_next_enable.swap(false, Ordering::SeqCst)
            || self.fail_enable_for.lock().contains(&handle.id())
        {
            return Err(injected("enable"));
        }
        self.inner.endpoint_enable(handle)
    }

    fn endpoint_destroy(&self, handle: EndpointHandle) -> Result<(), NodeError> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_next_destroy.swap(false, Ordering::SeqCst) {
            return Err(injected("destroy"));
        }
        self.inner.endpoint_destroy(handle)
    }

    fn endpoint(&self, id: EndpointId) -> Option<Endpoint> {
        self.inner.endpoint(id)
    }
}

/// [`MemoryStore`] whose writes can be made to fail.
#[derive(Default)]
pub struct FaultyStore {
    pub inner: MemoryStore,
    pub fail_writes: AtomicBool,
    pub device_info_reads: AtomicUsize,
}

impl FaultyStore {
    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected write failure".to_string()));
        }
        Ok(())
    }
}

impl BridgeStore for FaultyStore {
    fn persisted_endpoint_ids(&self, capacity: usize) -> Result<Vec<EndpointId>, StoreError> {
        self.inner.persisted_endpoint_ids(capacity)
    }

    fn store_endpoint_ids(&self, ids: &[EndpointId]) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.store_endpoint_ids(ids)
    }

    fn device_info(&self, endpoint_id: EndpointId) -> Result<Option<PersistedDevice>, StoreError> {
        self.device_info_reads.fetch_add(1, Ordering::SeqCst);
        self.inner.device_info(endpoint_id)
    }

    fn store_device_info(
        &self,
        endpoint_id: EndpointId,
        info: &PersistedDevice,
    ) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.store_device_info(endpoint_id, info)
    }

    fn erase_device_info(&self, endpoint_id: EndpointId) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.erase_device_info(endpoint_id)
    }

    fn factory_reset(&self) -> Result<(), StoreError> {
        self.check_write()?;
        self.inner.factory_reset()
    }
}
