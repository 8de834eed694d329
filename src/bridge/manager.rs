//! Lifecycle Manager for bridged devices.
//!
//! Owns the bridged-device table and drives the Matter node through endpoint
//! create / enable / destroy. Lifecycle operations are serialised by one
//! mutex; the table itself sits behind a separate lock that is only taken for
//! slot reservation, index commit and lookups, never across calls into the
//! node or the store.
//!
//! Per device: Absent -> Allocating (slot reserved, endpoint being built) ->
//! Active (committed, visible) -> Removing -> Absent.

use super::address::PhysicalAddress;
use super::persistence::{BridgeStore, PersistedDevice, StoreError};
use super::registry::DeviceTypeRegistry;
use super::table::{BridgedDeviceRecord, BridgedDeviceTable, SlotHandle};
use crate::error::{BridgeError, Result};
use crate::matter::endpoint::{Endpoint, EndpointId, INVALID_ENDPOINT_ID};
use crate::matter::framework::{
    ConstructAborted, ConstructFn, EndpointHandle, MatterNode, NodeError, UserData,
};
use log::{error, info, warn};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Outcome of replaying persisted endpoints at startup.
#[derive(Debug, Default)]
pub struct ResumeReport {
    pub resumed: Vec<EndpointId>,
    pub failed: Vec<(EndpointId, BridgeError)>,
}

impl ResumeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Everything about a device that is fixed before its endpoint exists.
struct PendingDevice {
    parent_endpoint_id: EndpointId,
    device_type_id: u32,
    address: PhysicalAddress,
    user_data: Option<UserData>,
}

pub struct BridgeManager {
    node: Arc<dyn MatterNode>,
    store: Arc<dyn BridgeStore>,
    registry: DeviceTypeRegistry,
    table: RwLock<BridgedDeviceTable>,
    /// Persisted ids that failed to resume; kept in the id snapshot so the
    /// next boot retries them.
    unresumed: Mutex<Vec<EndpointId>>,
    lifecycle: Mutex<()>,
}

impl BridgeManager {
    pub fn new(
        capacity: usize,
        node: Arc<dyn MatterNode>,
        store: Arc<dyn BridgeStore>,
        registry: DeviceTypeRegistry,
    ) -> Result<Self> {
        Ok(Self {
            node,
            store,
            registry,
            table: RwLock::new(BridgedDeviceTable::new(capacity)?),
            unresumed: Mutex::new(Vec::new()),
            lifecycle: Mutex::new(()),
        })
    }

    pub fn registry(&self) -> &DeviceTypeRegistry {
        &self.registry
    }

    pub fn node(&self) -> &Arc<dyn MatterNode> {
        &self.node
    }

    pub fn capacity(&self) -> usize {
        self.table.read().capacity()
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bridge a new physical device as an endpoint under `parent`.
    ///
    /// All-or-nothing: on error no slot, index entry, persisted entry or
    /// Matter endpoint survives.
    pub fn create(
        &self,
        parent: EndpointId,
        device_type_id: u32,
        address: PhysicalAddress,
        user_data: Option<UserData>,
    ) -> Result<EndpointId> {
        let _op = self.lifecycle.lock();
        if !self.registry.is_supported(device_type_id) {
            return Err(BridgeError::UnsupportedDeviceType(device_type_id));
        }
        {
            let table = self.table.read();
            if table.find_by_address(&address).is_some() {
                return Err(BridgeError::AddressInUse(address));
            }
            table.ensure_free_slot()?;
        }
        self.require_node()?;
        // Lifecycle ops are serialised, so the free slot checked above is still free.
        let slot = self.table.write().allocate_slot()?;

        let device = PendingDevice {
            parent_endpoint_id: parent,
            device_type_id,
            address,
            user_data,
        };
        let created = self.build_endpoint(&device, |construct, user_data| {
            self.node
                .endpoint_create(parent, device_type_id, construct, user_data)
        });
        let handle = match created {
            Ok(handle) => handle,
            Err(e) => {
                self.table.write().release_slot(slot);
                return Err(e);
            }
        };
        self.activate(slot, handle, device, true)
    }

    /// Re-establish a device bridged before restart from its persisted metadata.
    pub fn resume(
        &self,
        parent: EndpointId,
        endpoint_id: EndpointId,
        user_data: Option<UserData>,
    ) -> Result<EndpointId> {
        let _op = self.lifecycle.lock();
        {
            let table = self.table.read();
            table.ensure_free_slot()?;
            if table.find_by_endpoint(endpoint_id).is_some() {
                return Err(BridgeError::EndpointInUse(endpoint_id));
            }
        }
        self.require_node()?;
        let info = self
            .store
            .device_info(endpoint_id)?
            .ok_or(BridgeError::EndpointNotFound(endpoint_id))?;
        if !self.registry.is_supported(info.device_type_id) {
            return Err(BridgeError::UnsupportedDeviceType(info.device_type_id));
        }
        if info.parent_endpoint_id != parent {
            warn!(
                "Endpoint {} was persisted under parent {}, resuming under {}",
                endpoint_id, info.parent_endpoint_id, parent
            );
        }
        let slot = {
            let mut table = self.table.write();
            table.check_unique(endpoint_id, &info.address)?;
            table.allocate_slot()?
        };

        let device = PendingDevice {
            parent_endpoint_id: parent,
            device_type_id: info.device_type_id,
            address: info.address,
            user_data,
        };
        let resumed = self.build_endpoint(&device, |construct, user_data| {
            self.node.endpoint_resume(
                parent,
                endpoint_id,
                info.device_type_id,
                construct,
                user_data,
            )
        });
        let handle = match resumed {
            Ok(handle) => handle,
            Err(e) => {
                self.table.write().release_slot(slot);
                return Err(e);
            }
        };
        self.activate(slot, handle, device, false)?;
        self.unresumed.lock().retain(|id| *id != endpoint_id);
        Ok(endpoint_id)
    }

    /// Resume every persisted endpoint; one failure never stops the rest.
    pub fn resume_all(&self, parent: EndpointId) -> Result<ResumeReport> {
        let ids = self.store.persisted_endpoint_ids(self.capacity())?;
        let mut report = ResumeReport::default();
        for endpoint_id in ids.into_iter().filter(|id| *id != INVALID_ENDPOINT_ID) {
            match self.resume(parent, endpoint_id, None) {
                Ok(id) => report.resumed.push(id),
                Err(e) => {
                    warn!("Skipping bridged endpoint {} on resume: {}", endpoint_id, e);
                    self.retain_unresumed(endpoint_id, &e);
                    report.failed.push((endpoint_id, e));
                }
            }
        }
        info!(
            "Resumed {} bridged devices ({} skipped)",
            report.resumed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Destroy the endpoint and forget the device.
    ///
    /// If the node refuses to destroy the endpoint the record stays in the
    /// table, so a live endpoint is never left untracked.
    pub fn remove(&self, endpoint_id: EndpointId) -> Result<()> {
        let _op = self.lifecycle.lock();
        self.remove_locked(endpoint_id)
    }

    /// Remove the device bridged for `address` (e.g. on a protocol leave event).
    pub fn remove_by_address(&self, address: &PhysicalAddress) -> Result<EndpointId> {
        let _op = self.lifecycle.lock();
        let endpoint_id = self
            .table
            .read()
            .find_by_address(address)
            .map(|r| r.endpoint_id)
            .ok_or(BridgeError::AddressNotFound(*address))?;
        self.remove_locked(endpoint_id)?;
        Ok(endpoint_id)
    }

    /// Persisted ids that failed to resume and will be retried next boot.
    pub fn unresumed(&self) -> Vec<EndpointId> {
        self.unresumed.lock().clone()
    }

    /// Remove every bridged device, then wipe persisted bridge state.
    ///
    /// Returns the number of devices removed, or the first removal error.
    /// Devices whose endpoint could not be destroyed stay bridged and are
    /// written back to the wiped store.
    pub fn factory_reset(&self) -> Result<usize> {
        let _op = self.lifecycle.lock();
        let ids = self.list();
        let mut removed = 0;
        let mut first_error = None;
        for endpoint_id in ids {
            match self.remove_locked(endpoint_id) {
                Ok(()) => removed += 1,
                Err(e) => {
                    error!("Factory reset could not remove endpoint {}: {}", endpoint_id, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.unresumed.lock().clear();
        self.store.factory_reset()?;
        let survivors = self.records();
        if !survivors.is_empty() {
            for record in &survivors {
                self.store
                    .store_device_info(record.endpoint_id, &persisted_device(record))?;
            }
            self.store_endpoint_snapshot(None)?;
            warn!(
                "{} bridged devices survived factory reset",
                survivors.len()
            );
        }
        info!("Factory reset removed {} bridged devices", removed);
        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Live endpoint ids in slot order.
    pub fn list(&self) -> Vec<EndpointId> {
        self.table
            .read()
            .enumerate()
            .into_iter()
            .filter(|id| *id != INVALID_ENDPOINT_ID)
            .collect()
    }

    /// Fixed-length per-slot view, [`INVALID_ENDPOINT_ID`] for empty slots.
    pub fn enumerate(&self) -> Vec<EndpointId> {
        self.table.read().enumerate()
    }

    pub fn find_by_endpoint(&self, endpoint_id: EndpointId) -> Option<BridgedDeviceRecord> {
        self.table.read().find_by_endpoint(endpoint_id).cloned()
    }

    pub fn find_by_address(&self, address: &PhysicalAddress) -> Option<BridgedDeviceRecord> {
        self.table.read().find_by_address(address).cloned()
    }

    pub fn records(&self) -> Vec<BridgedDeviceRecord> {
        self.table.read().records().cloned().collect()
    }

    fn require_node(&self) -> Result<()> {
        self.node
            .node_get()
            .map(|_| ())
            .ok_or(BridgeError::NodeUnavailable)
    }

    /// Run a node create/resume call with a construction callback that
    /// dispatches through the registry.
    ///
    /// A registry failure inside the callback is reported as itself rather
    /// than as the node's generic creation failure.
    fn build_endpoint<F>(&self, device: &PendingDevice, call: F) -> Result<EndpointHandle>
    where
        F: FnOnce(
            &mut ConstructFn<'_>,
            Option<&UserData>,
        ) -> std::result::Result<EndpointHandle, NodeError>,
    {
        let registry = self.registry;
        let user_data = device.user_data.as_ref();
        let mut construct_error = None;
        let result = {
            let mut construct = |endpoint: &mut Endpoint| {
                registry
                    .construct(endpoint, device.device_type_id, user_data)
                    .map_err(|e| {
                        construct_error = Some(e);
                        ConstructAborted
                    })
            };
            call(&mut construct, user_data)
        };
        result.map_err(|e| construct_error.unwrap_or(BridgeError::EndpointCreationFailed(e)))
    }

    /// Enable a constructed endpoint, persist it if new, and commit it to the
    /// table. Any failure tears the endpoint down and frees the slot.
    fn activate(
        &self,
        slot: SlotHandle,
        handle: EndpointHandle,
        device: PendingDevice,
        persist: bool,
    ) -> Result<EndpointId> {
        let endpoint_id = handle.id();
        if let Err(source) = self.node.endpoint_enable(handle) {
            self.unwind(slot, handle);
            return Err(BridgeError::EndpointEnableFailed {
                endpoint_id,
                source,
            });
        }

        if persist {
            let info = PersistedDevice {
                parent_endpoint_id: device.parent_endpoint_id,
                device_type_id: device.device_type_id,
                address: device.address,
            };
            if let Err(e) = self.persist_new(slot.index(), endpoint_id, &info) {
                self.unwind(slot, handle);
                return Err(e);
            }
        }

        let record = BridgedDeviceRecord {
            slot_index: slot.index(),
            endpoint_id,
            device_type_id: device.device_type_id,
            address: device.address,
            parent_endpoint_id: device.parent_endpoint_id,
            user_data: device.user_data,
        };
        // The slot is released by insert itself on failure.
        if let Err(e) = self.table.write().insert(slot, record) {
            self.destroy_quietly(handle);
            if persist {
                self.forget_persisted(endpoint_id);
            }
            return Err(e);
        }

        info!(
            "Bridged {} as endpoint {} (device type 0x{:04X}, parent {})",
            device.address, endpoint_id, device.device_type_id, device.parent_endpoint_id
        );
        Ok(endpoint_id)
    }

    fn remove_locked(&self, endpoint_id: EndpointId) -> Result<()> {
        self.require_node()?;
        if self.table.read().find_by_endpoint(endpoint_id).is_none() {
            return Err(BridgeError::EndpointNotFound(endpoint_id));
        }

        self.node
            .endpoint_destroy(EndpointHandle::new(endpoint_id))
            .map_err(|source| BridgeError::EndpointDestructionFailed {
                endpoint_id,
                source,
            })?;

        let Some(record) = self.table.write().release_endpoint(endpoint_id) else {
            unreachable!("bridged endpoint {} vanished during removal", endpoint_id);
        };
        self.forget_persisted(endpoint_id);

        info!(
            "Removed bridged device {} from endpoint {}",
            record.address, endpoint_id
        );
        Ok(())
    }

    fn persist_new(
        &self,
        slot_index: usize,
        endpoint_id: EndpointId,
        info: &PersistedDevice,
    ) -> Result<()> {
        self.store.store_device_info(endpoint_id, info)?;
        if let Err(e) = self.store_endpoint_snapshot(Some((slot_index, endpoint_id))) {
            if let Err(erase) = self.store.erase_device_info(endpoint_id) {
                warn!("Failed to erase device info for endpoint {}: {}", endpoint_id, erase);
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop a device from persisted state; failures only leave a stale entry
    /// that the next resume skips.
    fn forget_persisted(&self, endpoint_id: EndpointId) {
        if let Err(e) = self.store.erase_device_info(endpoint_id) {
            warn!("Failed to erase device info for endpoint {}: {}", endpoint_id, e);
        }
        if let Err(e) = self.store_endpoint_snapshot(None) {
            warn!("Failed to store bridged endpoint ids: {}", e);
        }
    }

    /// Write the persisted id list: live ids in slot order, `pending` placed
    /// in its reserved slot, unresumed ids in the remaining free positions.
    ///
    /// Unresumed ids that no longer fit are dropped for good once the list
    /// is written, together with their device info.
    fn store_endpoint_snapshot(
        &self,
        pending: Option<(usize, EndpointId)>,
    ) -> std::result::Result<(), StoreError> {
        let mut ids = self.table.read().enumerate();
        if let Some((slot_index, endpoint_id)) = pending {
            ids[slot_index] = endpoint_id;
        }
        let mut unresumed = self.unresumed.lock();
        let mut kept = 0;
        for (free, id) in ids
            .iter_mut()
            .filter(|id| **id == INVALID_ENDPOINT_ID)
            .zip(unresumed.iter())
        {
            *free = *id;
            kept += 1;
        }
        self.store.store_endpoint_ids(&ids)?;

        for endpoint_id in unresumed.split_off(kept) {
            warn!(
                "Dropping unresumed endpoint {}, every slot is in use",
                endpoint_id
            );
            if let Err(e) = self.store.erase_device_info(endpoint_id) {
                warn!("Failed to erase device info for endpoint {}: {}", endpoint_id, e);
            }
        }
        Ok(())
    }

    /// Remember a failed resume for retry, unless there is nothing to retry.
    fn retain_unresumed(&self, endpoint_id: EndpointId, err: &BridgeError) {
        if matches!(err, BridgeError::EndpointInUse(_)) {
            return;
        }
        match self.store.device_info(endpoint_id) {
            Ok(Some(_)) => {
                let mut unresumed = self.unresumed.lock();
                if !unresumed.contains(&endpoint_id) {
                    unresumed.push(endpoint_id);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to read device info for endpoint {}: {}", endpoint_id, e),
        }
    }

    fn unwind(&self, slot: SlotHandle, handle: EndpointHandle) {
        self.destroy_quietly(handle);
        self.table.write().release_slot(slot);
    }

    fn destroy_quietly(&self, handle: EndpointHandle) {
        if let Err(e) = self.node.endpoint_destroy(handle) {
            error!(
                "Failed to destroy endpoint {} while unwinding: {}",
                handle.id(),
                e
            );
        }
    }
}

fn persisted_device(record: &BridgedDeviceRecord) -> PersistedDevice {
    PersistedDevice {
        parent_endpoint_id: record.parent_endpoint_id,
        device_type_id: record.device_type_id,
        address: record.address,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::persistence::MemoryStore;
    use crate::matter::endpoint::ClusterId;
    use crate::matter::node::NodeConfig;
    use crate::testing::{FaultyNode, FaultyStore};
    use std::sync::atomic::Ordering;

    const AGGREGATOR: EndpointId = 1;
    const ON_OFF_LIGHT: u32 = 0x0100;

    fn zigbee(n: u16) -> PhysicalAddress {
        PhysicalAddress::zigbee(0x1000 + n, 1)
    }

    fn manager_with(capacity: usize) -> (BridgeManager, Arc<FaultyNode>, Arc<MemoryStore>) {
        let node = Arc::new(FaultyNode::default());
        let store = Arc::new(MemoryStore::new());
        let manager = BridgeManager::new(
            capacity,
            node.clone(),
            store.clone(),
            DeviceTypeRegistry::builtin(),
        )
        .unwrap();
        (manager, node, store)
    }

    #[test]
    fn test_create_round_trip() {
        let (manager, node, store) = manager_with(4);
        let addr = zigbee(1);
        let id = manager.create(AGGREGATOR, ON_OFF_LIGHT, addr, None).unwrap();

        let record = manager.find_by_endpoint(id).unwrap();
        assert_eq!(record.device_type_id, ON_OFF_LIGHT);
        assert_eq!(record.address, addr);
        assert_eq!(record.parent_endpoint_id, AGGREGATOR);
        assert_eq!(manager.find_by_address(&addr).unwrap().endpoint_id, id);

        let endpoint = node.endpoint(id).unwrap();
        assert!(endpoint.is_enabled());
        assert_eq!(endpoint.parent_id(), AGGREGATOR);
        assert!(endpoint.has_cluster(ClusterId::OnOff));

        let persisted = store.snapshot();
        assert_eq!(persisted.devices[&id].address, addr);
        assert!(persisted.endpoint_ids.contains(&id));
    }

    #[test]
    fn test_capacity_scenario() {
        let (manager, _node, _store) = manager_with(4);
        let ids: Vec<EndpointId> = (0..4)
            .map(|n| manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(n), None).unwrap())
            .collect();
        let mut unique = ids.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 4);

        let before = manager.enumerate();
        let err = manager
            .create(AGGREGATOR, ON_OFF_LIGHT, zigbee(4), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::TableFull { capacity: 4 }));
        assert_eq!(manager.enumerate(), before);

        manager.remove(ids[1]).unwrap();
        assert_eq!(manager.len(), 3);
        let fifth = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(4), None).unwrap();
        assert_eq!(manager.len(), 4);
        assert_eq!(manager.find_by_endpoint(fifth).unwrap().slot_index, 1);
        assert!(!ids.contains(&fifth));
    }

    #[test]
    fn test_unsupported_type_allocates_nothing() {
        let (manager, node, store) = manager_with(4);
        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let before = manager.list();
        let counter = node.inner.min_unused_endpoint_id();

        let err = manager.create(AGGREGATOR, 0xFFFF, zigbee(1), None).unwrap_err();
        assert!(matches!(err, BridgeError::UnsupportedDeviceType(0xFFFF)));
        assert_eq!(manager.list(), before);
        assert_eq!(node.inner.min_unused_endpoint_id(), counter);
        assert_eq!(store.snapshot().devices.len(), 1);
    }

    #[test]
    fn test_duplicate_address_rejected() {
        let (manager, node, _store) = manager_with(4);
        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let counter = node.inner.min_unused_endpoint_id();
        let err = manager
            .create(AGGREGATOR, 0x0101, zigbee(0), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::AddressInUse(_)));
        assert_eq!(manager.len(), 1);
        assert_eq!(node.inner.min_unused_endpoint_id(), counter);
    }

    #[test]
    fn test_enable_failure_unwinds() {
        let (manager, node, store) = manager_with(2);
        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let before = manager.enumerate();
        let persisted_before = store.snapshot();

        node.fail_next_enable.store(true, Ordering::SeqCst);
        let err = manager
            .create(AGGREGATOR, ON_OFF_LIGHT, zigbee(1), None)
            .unwrap_err();
        let BridgeError::EndpointEnableFailed { endpoint_id, .. } = err else {
            panic!("unexpected error {:?}", err);
        };

        assert_eq!(manager.enumerate(), before);
        assert_eq!(manager.len(), 1);
        assert!(manager.find_by_address(&zigbee(1)).is_none());
        assert!(node.endpoint(endpoint_id).is_none());
        assert_eq!(node.inner.dynamic_endpoint_count(), 1);
        assert_eq!(store.snapshot(), persisted_before);

        // The slot was not leaked.
        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(1), None).unwrap();
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_creation_failure_unwinds() {
        let (manager, node, _store) = manager_with(1);
        node.fail_next_create.store(true, Ordering::SeqCst);
        let err = manager
            .create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::EndpointCreationFailed(_)));
        assert!(manager.is_empty());
        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
    }

    #[test]
    fn test_unknown_parent_is_creation_failure() {
        let (manager, _node, _store) = manager_with(1);
        let err = manager.create(42, ON_OFF_LIGHT, zigbee(0), None).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::EndpointCreationFailed(NodeError::ParentNotFound(42))
        ));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_persistence_failure_unwinds() {
        let node = Arc::new(FaultyNode::default());
        let store = Arc::new(FaultyStore::default());
        let manager =
            BridgeManager::new(2, node.clone(), store.clone(), DeviceTypeRegistry::builtin())
                .unwrap();

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = manager
            .create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Persistence(_)));
        assert!(manager.is_empty());
        assert_eq!(node.inner.dynamic_endpoint_count(), 0);
    }

    #[test]
    fn test_remove_twice_reports_not_found() {
        let (manager, node, store) = manager_with(2);
        let id = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();

        manager.remove(id).unwrap();
        assert!(manager.find_by_endpoint(id).is_none());
        assert!(manager.find_by_address(&zigbee(0)).is_none());
        assert!(node.endpoint(id).is_none());
        assert!(store.snapshot().devices.is_empty());

        let err = manager.remove(id).unwrap_err();
        assert!(matches!(err, BridgeError::EndpointNotFound(e) if e == id));
        assert_eq!(node.destroy_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_failure_keeps_record() {
        let (manager, node, _store) = manager_with(2);
        let id = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();

        node.fail_next_destroy.store(true, Ordering::SeqCst);
        let err = manager.remove(id).unwrap_err();
        assert!(matches!(err, BridgeError::EndpointDestructionFailed { .. }));
        assert_eq!(manager.list(), vec![id]);
        assert!(manager.find_by_address(&zigbee(0)).is_some());

        manager.remove(id).unwrap();
        assert!(manager.is_empty());
    }

    #[test]
    fn test_remove_by_address() {
        let (manager, _node, _store) = manager_with(2);
        let id = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        assert_eq!(manager.remove_by_address(&zigbee(0)).unwrap(), id);
        assert!(matches!(
            manager.remove_by_address(&zigbee(0)),
            Err(BridgeError::AddressNotFound(_))
        ));
    }

    #[test]
    fn test_node_unavailable() {
        let (manager, node, _store) = manager_with(2);
        node.unavailable.store(true, Ordering::SeqCst);
        let err = manager
            .create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None)
            .unwrap_err();
        assert!(matches!(err, BridgeError::NodeUnavailable));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_user_data_threaded_to_builder_and_record() {
        let (manager, node, _store) = manager_with(2);
        let label: UserData = Arc::new(String::from("Porch Light"));
        let id = manager
            .create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), Some(label.clone()))
            .unwrap();
        assert_eq!(node.endpoint(id).unwrap().node_label(), Some("Porch Light"));
        let record = manager.find_by_endpoint(id).unwrap();
        assert!(Arc::ptr_eq(record.user_data.as_ref().unwrap(), &label));
    }

    fn restart(
        store: &Arc<MemoryStore>,
        capacity: usize,
    ) -> (BridgeManager, Arc<FaultyNode>) {
        let node = Arc::new(FaultyNode::with_store(NodeConfig::default(), store.clone()));
        let manager = BridgeManager::new(
            capacity,
            node.clone(),
            store.clone(),
            DeviceTypeRegistry::builtin(),
        )
        .unwrap();
        (manager, node)
    }

    #[test]
    fn test_resume_after_restart() {
        let store = Arc::new(MemoryStore::new());
        let (manager, _node) = restart(&store, 4);
        let light = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let sensor = manager
            .create(AGGREGATOR, 0x0015, PhysicalAddress::mac([2; 6]), None)
            .unwrap();
        drop(manager);

        let (manager, node) = restart(&store, 4);
        let report = manager.resume_all(AGGREGATOR).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.resumed, vec![light, sensor]);

        let record = manager.find_by_endpoint(sensor).unwrap();
        assert_eq!(record.device_type_id, 0x0015);
        assert_eq!(record.address, PhysicalAddress::mac([2; 6]));
        assert!(node.endpoint(sensor).unwrap().has_cluster(ClusterId::BooleanState));

        // New devices never reuse a resumed id.
        let next = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(9), None).unwrap();
        assert!(next > sensor);
    }

    #[test]
    fn test_resume_tolerates_partial_failure() {
        let store = Arc::new(MemoryStore::new());
        let (manager, _node) = restart(&store, 4);
        let ids: Vec<EndpointId> = (0..4)
            .map(|n| manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(n), None).unwrap())
            .collect();
        drop(manager);

        let (manager, node) = restart(&store, 4);
        node.fail_enable_for.lock().insert(ids[2]);
        let report = manager.resume_all(AGGREGATOR).unwrap();

        assert_eq!(report.resumed, vec![ids[0], ids[1], ids[3]]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, ids[2]);
        assert!(matches!(
            report.failed[0].1,
            BridgeError::EndpointEnableFailed { .. }
        ));
        for id in [ids[0], ids[1], ids[3]] {
            assert_eq!(manager.find_by_endpoint(id).unwrap().endpoint_id, id);
        }
        assert!(manager.find_by_endpoint(ids[2]).is_none());
        assert!(node.endpoint(ids[2]).is_none());
    }

    #[test]
    fn test_resume_rejects_live_endpoint() {
        let store = Arc::new(MemoryStore::new());
        let (manager, _node) = restart(&store, 2);
        let id = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let err = manager.resume(AGGREGATOR, id, None).unwrap_err();
        assert!(matches!(err, BridgeError::EndpointInUse(e) if e == id));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_resume_unknown_id() {
        let (manager, _node, _store) = manager_with(2);
        let err = manager.resume(AGGREGATOR, 77, None).unwrap_err();
        assert!(matches!(err, BridgeError::EndpointNotFound(77)));
    }

    #[test]
    fn test_factory_reset() {
        let (manager, node, store) = manager_with(3);
        for n in 0..3 {
            manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(n), None).unwrap();
        }
        assert_eq!(manager.factory_reset().unwrap(), 3);
        assert!(manager.is_empty());
        assert_eq!(node.inner.dynamic_endpoint_count(), 0);
        let persisted = store.snapshot();
        assert!(persisted.devices.is_empty());
        assert!(persisted.endpoint_ids.is_empty());
    }

    #[test]
    fn test_concurrent_creates_respect_capacity() {
        let node = Arc::new(FaultyNode::new(NodeConfig {
            max_dynamic_endpoint_count: 64,
            ..NodeConfig::default()
        }));
        let manager = BridgeManager::new(
            8,
            node,
            Arc::new(MemoryStore::new()),
            DeviceTypeRegistry::builtin(),
        )
        .unwrap();

        let results: Vec<Result<EndpointId>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|n| {
                    let manager = &manager;
                    s.spawn(move || manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(n), None))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let created = results.iter().filter(|r| r.is_ok()).count();
        let full = results
            .iter()
            .filter(|r| matches!(r, Err(BridgeError::TableFull { .. })))
            .count();
        assert_eq!(created, 8);
        assert_eq!(full, 8);

        let records = manager.records();
        for (i, a) in records.iter().enumerate() {
            for b in &records[i + 1..] {
                assert_ne!(a.endpoint_id, b.endpoint_id);
                assert_ne!(a.address, b.address);
            }
        }
    }
    #[test]
    fn test_device_invisible_until_enabled() {
        let (manager, node, _store) = manager_with(2);
        let existing = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();

        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        *node.enable_hook.lock() = Some(Box::new(move |id: EndpointId| {
            entered_tx.send(id).unwrap();
            release_rx.lock().recv().unwrap();
        }));

        let pending = std::thread::scope(|s| {
            let creating = s.spawn(|| manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(1), None));
            let pending = entered_rx.recv().unwrap();

            // Endpoint exists on the node, but the record is not published yet.
            assert!(node.endpoint(pending).is_some());
            assert!(manager.find_by_address(&zigbee(1)).is_none());
            assert!(manager.find_by_endpoint(pending).is_none());
            assert_eq!(manager.list(), vec![existing]);
            assert_eq!(manager.len(), 1);

            release_tx.send(()).unwrap();
            assert_eq!(creating.join().unwrap().unwrap(), pending);
            pending
        });

        assert_eq!(
            manager.find_by_address(&zigbee(1)).unwrap().endpoint_id,
            pending
        );
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_resume_checks_capacity_before_store() {
        let node = Arc::new(FaultyNode::default());
        let store = Arc::new(FaultyStore::default());
        let manager = BridgeManager::new(
            1,
            node,
            store.clone(),
            DeviceTypeRegistry::builtin(),
        )
        .unwrap();
        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();

        let reads = store.device_info_reads.load(Ordering::SeqCst);
        let err = manager.resume(AGGREGATOR, 77, None).unwrap_err();
        assert!(matches!(err, BridgeError::TableFull { capacity: 1 }));
        assert_eq!(store.device_info_reads.load(Ordering::SeqCst), reads);
    }

    #[test]
    fn test_failed_resume_retried_on_next_boot() {
        let store = Arc::new(MemoryStore::new());
        let (manager, _node) = restart(&store, 4);
        let light = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let flaky = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(1), None).unwrap();
        drop(manager);

        let (manager, node) = restart(&store, 4);
        node.fail_enable_for.lock().insert(flaky);
        let report = manager.resume_all(AGGREGATOR).unwrap();
        assert_eq!(report.resumed, vec![light]);
        assert_eq!(manager.unresumed(), vec![flaky]);

        // Rewriting the id list keeps the unresumed device.
        let added = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(2), None).unwrap();
        let persisted = store.snapshot();
        assert!(persisted.endpoint_ids.contains(&flaky));
        assert_eq!(persisted.devices[&flaky].address, zigbee(1));
        drop(manager);

        let (manager, _node) = restart(&store, 4);
        let report = manager.resume_all(AGGREGATOR).unwrap();
        assert!(report.is_complete());
        let mut resumed = report.resumed.clone();
        resumed.sort_unstable();
        assert_eq!(resumed, vec![light, flaky, added]);
        assert_eq!(manager.find_by_endpoint(flaky).unwrap().address, zigbee(1));
        assert!(manager.unresumed().is_empty());
    }

    #[test]
    fn test_unresumed_device_dropped_when_slots_run_out() {
        let store = Arc::new(MemoryStore::new());
        let (manager, _node) = restart(&store, 2);
        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let flaky = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(1), None).unwrap();
        drop(manager);

        let (manager, node) = restart(&store, 2);
        node.fail_enable_for.lock().insert(flaky);
        manager.resume_all(AGGREGATOR).unwrap();
        assert_eq!(manager.unresumed(), vec![flaky]);

        manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(2), None).unwrap();
        assert!(manager.unresumed().is_empty());
        let persisted = store.snapshot();
        assert!(!persisted.endpoint_ids.contains(&flaky));
        assert!(!persisted.devices.contains_key(&flaky));
    }

    #[test]
    fn test_factory_reset_keeps_undestroyed_device() {
        let store = Arc::new(MemoryStore::new());
        let (manager, node) = restart(&store, 3);
        let stuck = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(0), None).unwrap();
        let gone = manager.create(AGGREGATOR, ON_OFF_LIGHT, zigbee(1), None).unwrap();

        node.fail_next_destroy.store(true, Ordering::SeqCst);
        let err = manager.factory_reset().unwrap_err();
        assert!(matches!(err, BridgeError::EndpointDestructionFailed { .. }));
        assert_eq!(manager.list(), vec![stuck]);

        let persisted = store.snapshot();
        assert_eq!(persisted.devices[&stuck].address, zigbee(0));
        assert!(!persisted.devices.contains_key(&gone));
        assert!(persisted.endpoint_ids.contains(&stuck));
        assert!(!persisted.endpoint_ids.contains(&gone));
        drop(manager);

        let (manager, _node) = restart(&store, 3);
        let report = manager.resume_all(AGGREGATOR).unwrap();
        assert!(report.is_complete());
        assert_eq!(report.resumed, vec![stuck]);
        assert_eq!(manager.find_by_endpoint(stuck).unwrap().address, zigbee(0));
    }
}
