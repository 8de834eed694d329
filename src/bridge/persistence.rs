//! Persistence of bridged devices across restarts.
//!
//! The bridge records which endpoint ids are bridged, plus per-endpoint
//! metadata (parent, device type, physical address) that `resume` recovers
//! after restart. The same state file also carries the node's minimum unused
//! endpoint id so the simulated node never hands out an id twice.

use super::address::PhysicalAddress;
use crate::matter::endpoint::{EndpointId, INVALID_ENDPOINT_ID};
use crate::matter::node::NodeStore;
use log::{error, info, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

/// Metadata stored per bridged endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDevice {
    pub parent_endpoint_id: EndpointId,
    pub device_type_id: u32,
    pub address: PhysicalAddress,
}

/// Key-value persistence collaborator consumed by the bridge manager.
pub trait BridgeStore: Send + Sync {
    /// Previously bridged endpoint ids, exactly `capacity` long, padded with
    /// [`INVALID_ENDPOINT_ID`].
    fn persisted_endpoint_ids(&self, capacity: usize) -> Result<Vec<EndpointId>, StoreError>;

    fn store_endpoint_ids(&self, ids: &[EndpointId]) -> Result<(), StoreError>;

    fn device_info(&self, endpoint_id: EndpointId) -> Result<Option<PersistedDevice>, StoreError>;

    fn store_device_info(
        &self,
        endpoint_id: EndpointId,
        info: &PersistedDevice,
    ) -> Result<(), StoreError>;

    fn erase_device_info(&self, endpoint_id: EndpointId) -> Result<(), StoreError>;

    fn factory_reset(&self) -> Result<(), StoreError>;
}

/// Everything persisted by the bridge.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub min_unused_endpoint_id: Option<EndpointId>,
    #[serde(default)]
    pub endpoint_ids: Vec<EndpointId>,
    #[serde(default)]
    pub devices: BTreeMap<EndpointId, PersistedDevice>,
}

impl PersistedState {
    /// Load from file
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match fs::read(path) {
            Ok(bytes) => {
                let state = serde_json::from_slice::<PersistedState>(&bytes)?;
                info!(
                    "Loaded {} persisted bridged devices from {:?}",
                    state.live_ids().count(),
                    path
                );
                Ok(state)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No persisted bridge state found (first run)");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    fn live_ids(&self) -> impl Iterator<Item = EndpointId> + '_ {
        self.endpoint_ids
            .iter()
            .copied()
            .filter(|id| *id != INVALID_ENDPOINT_ID)
    }

    fn padded_ids(&self, capacity: usize) -> Vec<EndpointId> {
        let mut ids: Vec<EndpointId> = self.live_ids().collect();
        if ids.len() > capacity {
            warn!(
                "{} persisted endpoint ids exceed capacity {}, ignoring the rest",
                ids.len(),
                capacity
            );
            ids.truncate(capacity);
        }
        ids.resize(capacity, INVALID_ENDPOINT_ID);
        ids
    }

    /// Clear bridge data; the endpoint id counter survives.
    fn reset(&mut self) {
        self.endpoint_ids.clear();
        self.devices.clear();
    }
}

/// Volatile store, for tests and for running without a state file.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<PersistedState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> PersistedState {
        self.state.read().clone()
    }
}

impl BridgeStore for MemoryStore {
    fn persisted_endpoint_ids(&self, capacity: usize) -> Result<Vec<EndpointId>, StoreError> {
        Ok(self.state.read().padded_ids(capacity))
    }

    fn store_endpoint_ids(&self, ids: &[EndpointId]) -> Result<(), StoreError> {
        self.state.write().endpoint_ids = ids.to_vec();
        Ok(())
    }

    fn device_info(&self, endpoint_id: EndpointId) -> Result<Option<PersistedDevice>, StoreError> {
        Ok(self.state.read().devices.get(&endpoint_id).cloned())
    }

    fn store_device_info(
        &self,
        endpoint_id: EndpointId,
        info: &PersistedDevice,
    ) -> Result<(), StoreError> {
        self.state.write().devices.insert(endpoint_id, info.clone());
        Ok(())
    }

    fn erase_device_info(&self, endpoint_id: EndpointId) -> Result<(), StoreError> {
        self.state.write().devices.remove(&endpoint_id);
        Ok(())
    }

    fn factory_reset(&self) -> Result<(), StoreError> {
        self.state.write().reset();
        Ok(())
    }
}

impl NodeStore for MemoryStore {
    fn load_min_unused_endpoint_id(&self) -> Result<Option<EndpointId>, StoreError> {
        Ok(self.state.read().min_unused_endpoint_id)
    }

    fn store_min_unused_endpoint_id(&self, id: EndpointId) -> Result<(), StoreError> {
        self.state.write().min_unused_endpoint_id = Some(id);
        Ok(())
    }
}

/// JSON state file, rewritten on every mutation.
pub struct JsonFileStore {
    path: PathBuf,
    state: RwLock<PersistedState>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let state = PersistedState::load(&path)?;
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `f` and write the result; memory is left untouched if the write fails.
    fn update(&self, f: impl FnOnce(&mut PersistedState)) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let mut next = state.clone();
        f(&mut next);
        if let Err(e) = next.save(&self.path) {
            error!("Failed to save bridge state to {:?}: {}", self.path, e);
            return Err(e);
        }
        *state = next;
        Ok(())
    }
}

impl BridgeStore for JsonFileStore {
    fn persisted_endpoint_ids(&self, capacity: usize) -> Result<Vec<EndpointId>, StoreError> {
        Ok(self.state.read().padded_ids(capacity))
    }

    fn store_endpoint_ids(&self, ids: &[EndpointId]) -> Result<(), StoreError> {
        self.update(|s| s.endpoint_ids = ids.to_vec())
    }

    fn device_info(&self, endpoint_id: EndpointId) -> Result<Option<PersistedDevice>, StoreError> {
        Ok(self.state.read().devices.get(&endpoint_id).cloned())
    }

    fn store_device_info(
        &self,
        endpoint_id: EndpointId,
        info: &PersistedDevice,
    ) -> Result<(), StoreError> {
        self.update(|s| {
            s.devices.insert(endpoint_id, info.clone());
        })
    }

    fn erase_device_info(&self, endpoint_id: EndpointId) -> Result<(), StoreError> {
        self.update(|s| {
            s.devices.remove(&endpoint_id);
        })
    }

    fn factory_reset(&self) -> Result<(), StoreError> {
        self.update(PersistedState::reset)?;
        info!("Bridge state in {:?} reset", self.path);
        Ok(())
    }
}

impl NodeStore for JsonFileStore {
    fn load_min_unused_endpoint_id(&self) -> Result<Option<EndpointId>, StoreError> {
        Ok(self.state.read().min_unused_endpoint_id)
    }

    fn store_min_unused_endpoint_id(&self, id: EndpointId) -> Result<(), StoreError> {
        self.update(|s| s.min_unused_endpoint_id = Some(id))
    }
}
