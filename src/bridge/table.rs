//! Bridged-Device Table and Address Index.
//!
//! A fixed-capacity arena of slots plus a free list of slot indices. Each live
//! record is reachable through two secondary indices, by Matter endpoint id
//! and by physical address. A slot moves Free -> Reserved -> Occupied -> Free;
//! reserved slots are invisible to lookups.

use super::address::PhysicalAddress;
use crate::error::{BridgeError, Result};
use crate::matter::endpoint::{EndpointId, INVALID_ENDPOINT_ID};
use crate::matter::framework::UserData;
use std::collections::HashMap;
use std::fmt;

/// A live bridged device.
#[derive(Clone)]
pub struct BridgedDeviceRecord {
    pub slot_index: usize,
    pub endpoint_id: EndpointId,
    pub device_type_id: u32,
    pub address: PhysicalAddress,
    pub parent_endpoint_id: EndpointId,
    pub user_data: Option<UserData>,
}

impl fmt::Debug for BridgedDeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgedDeviceRecord")
            .field("slot_index", &self.slot_index)
            .field("endpoint_id", &self.endpoint_id)
            .field("device_type_id", &format_args!("0x{:04X}", self.device_type_id))
            .field("address", &self.address)
            .field("parent_endpoint_id", &self.parent_endpoint_id)
            .field("user_data", &self.user_data.is_some())
            .finish()
    }
}

/// Exclusive token for one reserved or occupied slot.
///
/// Not `Clone`: releasing a slot consumes its handle.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct SlotHandle {
    index: usize,
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.index
    }
}

enum Slot {
    Free,
    Reserved,
    Occupied(BridgedDeviceRecord),
}

pub struct BridgedDeviceTable {
    slots: Vec<Slot>,
    /// Stack of free slot indices, lowest on top when the table is new.
    free: Vec<usize>,
    by_endpoint: HashMap<EndpointId, usize>,
    by_address: HashMap<PhysicalAddress, usize>,
}

impl BridgedDeviceTable {
    /// Allocate all bookkeeping for `capacity` slots up front.
    pub fn new(capacity: usize) -> Result<Self> {
        let mut slots = Vec::new();
        let mut free = Vec::new();
        let mut by_endpoint = HashMap::new();
        let mut by_address = HashMap::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| BridgeError::NoMemory)?;
        free.try_reserve_exact(capacity)
            .map_err(|_| BridgeError::NoMemory)?;
        by_endpoint
            .try_reserve(capacity)
            .map_err(|_| BridgeError::NoMemory)?;
        by_address
            .try_reserve(capacity)
            .map_err(|_| BridgeError::NoMemory)?;

        slots.extend((0..capacity).map(|_| Slot::Free));
        free.extend((0..capacity).rev());
        Ok(Self {
            slots,
            free,
            by_endpoint,
            by_address,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.by_endpoint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reserve a free slot. The slot stays invisible until [`Self::insert`].
    pub fn allocate_slot(&mut self) -> Result<SlotHandle> {
        let index = self.free.pop().ok_or(BridgeError::TableFull {
            capacity: self.capacity(),
        })?;
        assert!(
            matches!(self.slots[index], Slot::Free),
            "bridged device table corrupted: free list holds non-free slot {}",
            index
        );
        self.slots[index] = Slot::Reserved;
        Ok(SlotHandle { index })
    }

    /// Check that `endpoint_id` and `address` could be inserted right now.
    pub fn check_unique(&self, endpoint_id: EndpointId, address: &PhysicalAddress) -> Result<()> {
        if endpoint_id == INVALID_ENDPOINT_ID {
            return Err(BridgeError::InvalidArgument(
                "invalid endpoint id sentinel".to_string(),
            ));
        }
        if self.by_endpoint.contains_key(&endpoint_id) {
            return Err(BridgeError::EndpointInUse(endpoint_id));
        }
        if self.by_address.contains_key(address) {
            return Err(BridgeError::AddressInUse(*address));
        }
        Ok(())
    }

    /// Commit a record into a reserved slot and both indices.
    ///
    /// Both index updates are validated before either is applied. On failure
    /// the reservation is cancelled and the table is as it was before
    /// [`Self::allocate_slot`].
    pub fn insert(&mut self, handle: SlotHandle, mut record: BridgedDeviceRecord) -> Result<()> {
        assert!(
            matches!(self.slots[handle.index], Slot::Reserved),
            "bridged device table corrupted: inserting into unreserved slot {}",
            handle.index
        );
        if let Err(e) = self.check_unique(record.endpoint_id, &record.address) {
            self.release_slot(handle);
            return Err(e);
        }

        record.slot_index = handle.index;
        self.by_endpoint.insert(record.endpoint_id, handle.index);
        self.by_address.insert(record.address, handle.index);
        self.slots[handle.index] = Slot::Occupied(record);
        Ok(())
    }

    /// Release a reserved or occupied slot back to the free pool, dropping
    /// any index entries.
    ///
    /// The caller must already have torn down the underlying endpoint.
    pub fn release_slot(&mut self, handle: SlotHandle) -> Option<BridgedDeviceRecord> {
        let slot = std::mem::replace(&mut self.slots[handle.index], Slot::Free);
        let released = match slot {
            Slot::Reserved => None,
            Slot::Occupied(record) => {
                let by_ep = self.by_endpoint.remove(&record.endpoint_id);
                let by_addr = self.by_address.remove(&record.address);
                assert!(
                    by_ep == Some(handle.index) && by_addr == Some(handle.index),
                    "bridged device table corrupted: slot {} missing from indices",
                    handle.index
                );
                Some(record)
            }
            Slot::Free => unreachable!(
                "bridged device table corrupted: releasing free slot {}",
                handle.index
            ),
        };
        self.free.push(handle.index);
        released
    }

    /// Release the occupied slot holding `endpoint_id`.
    ///
    /// Same contract as [`Self::release_slot`]; `None` if no live record has
    /// that endpoint id.
    pub fn release_endpoint(&mut self, endpoint_id: EndpointId) -> Option<BridgedDeviceRecord> {
        let index = *self.by_endpoint.get(&endpoint_id)?;
        self.release_slot(SlotHandle { index })
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    /// `TableFull` when no slot can be allocated.
    pub fn ensure_free_slot(&self) -> Result<()> {
        if self.is_full() {
            return Err(BridgeError::TableFull {
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    pub fn find_by_endpoint(&self, endpoint_id: EndpointId) -> Option<&BridgedDeviceRecord> {
        self.by_endpoint
            .get(&endpoint_id)
            .map(|&index| self.occupied(index))
    }

    pub fn find_by_address(&self, address: &PhysicalAddress) -> Option<&BridgedDeviceRecord> {
        self.by_address
            .get(address)
            .map(|&index| self.occupied(index))
    }

    /// Endpoint id per slot, [`INVALID_ENDPOINT_ID`] for free or reserved slots.
    pub fn enumerate(&self) -> Vec<EndpointId> {
        self.slots
            .iter()
            .map(|slot| match slot {
                Slot::Occupied(record) => record.endpoint_id,
                Slot::Free | Slot::Reserved => INVALID_ENDPOINT_ID,
            })
            .collect()
    }

    /// Live records in slot order.
    pub fn records(&self) -> impl Iterator<Item = &BridgedDeviceRecord> {
        self.slots.iter().filter_map(|slot| match slot {
            Slot::Occupied(record) => Some(record),
            Slot::Free | Slot::Reserved => None,
        })
    }

    fn occupied(&self, index: usize) -> &BridgedDeviceRecord {
        match &self.slots[index] {
            Slot::Occupied(record) => record,
            Slot::Free | Slot::Reserved => {
                unreachable!("bridged device table corrupted: index points at empty slot {}", index)
            }
        }
    }
}
