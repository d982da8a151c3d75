//! Object identity table.
//!
//! Maps the handles the client sees to the ids the SDK hands out. Handles are
//! allocated from a monotonic counter and packed with the object type, so a
//! handle is never reused for the lifetime of the table, even after its object
//! is removed.
//!
//! Both directions live behind one `RwLock`: a writer updates the forward and
//! reverse maps together, so readers (including the notification relay) never
//! see one without the other.

use crate::error::{Result, SyncdError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sonic_sai::types::compose_object_id;
use sonic_sai::{AttrValue, ObjectType, RawSaiObjectId, SaiStatus, NULL_OBJECT_ID};
use std::collections::HashMap;
use std::fmt;

/// Switch index packed into every handle.
const HANDLE_SWITCH_INDEX: u8 = 0;

/// Externally visible object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(u64);

impl ObjectHandle {
    /// The null handle, used where a call has no target object.
    pub const NULL: ObjectHandle = ObjectHandle(NULL_OBJECT_ID);

    pub const fn from_raw(raw: u64) -> Self {
        ObjectHandle(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == NULL_OBJECT_ID
    }

    /// Object type packed into the handle.
    pub fn object_type(self) -> Option<ObjectType> {
        sonic_sai::types::object_type_of(self.0)
    }
}

impl fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "oid:0x{:x}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Entry {
    object_type: ObjectType,
    native: RawSaiObjectId,
}

#[derive(Debug, Default)]
struct Maps {
    by_handle: HashMap<ObjectHandle, Entry>,
    by_native: HashMap<RawSaiObjectId, ObjectHandle>,
    next_index: u64,
}

/// One persisted table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub handle: ObjectHandle,
    pub object_type: ObjectType,
    pub native: RawSaiObjectId,
}

/// Point-in-time copy of the table, ordered by handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub next_index: u64,
    pub entries: Vec<SnapshotEntry>,
}

/// Handle to native id mapping shared by the request path and the relay.
#[derive(Debug)]
pub struct IdentityTable {
    maps: RwLock<Maps>,
}

impl Default for IdentityTable {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityTable {
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(Maps {
                next_index: 1,
                ..Maps::default()
            }),
        }
    }

    /// Allocates a fresh handle for a newly created native object.
    ///
    /// Fails with `DuplicateAllocation` if the native id already has a
    /// handle; the table is left unchanged in that case.
    pub fn allocate(&self, object_type: ObjectType, native: RawSaiObjectId) -> Result<ObjectHandle> {
        let mut maps = self.maps.write();
        if maps.by_native.contains_key(&native) {
            return Err(SyncdError::DuplicateAllocation(native));
        }
        let raw = compose_object_id(HANDLE_SWITCH_INDEX, object_type, maps.next_index)
            .ok_or(SyncdError::from(SaiStatus::TableFull))?;
        let handle = ObjectHandle(raw);
        maps.next_index += 1;
        maps.by_handle.insert(handle, Entry { object_type, native });
        maps.by_native.insert(native, handle);
        Ok(handle)
    }

    /// Returns the native id behind a handle.
    pub fn resolve(&self, handle: ObjectHandle) -> Result<RawSaiObjectId> {
        self.resolve_typed(handle).map(|(_, native)| native)
    }

    /// Returns the object type and native id behind a handle.
    pub fn resolve_typed(&self, handle: ObjectHandle) -> Result<(ObjectType, RawSaiObjectId)> {
        self.maps
            .read()
            .by_handle
            .get(&handle)
            .map(|e| (e.object_type, e.native))
            .ok_or(SyncdError::UnknownObject(handle))
    }

    /// Reverse lookup used when translating SDK output.
    pub fn lookup_native(&self, native: RawSaiObjectId) -> Option<ObjectHandle> {
        self.maps.read().by_native.get(&native).copied()
    }

    /// Returns the handle for a native id, allocating one the first time the
    /// SDK reports an object the client never created (default ports, the
    /// default virtual router, ...).
    pub fn handle_for_native<F>(&self, native: RawSaiObjectId, query_type: F) -> Result<ObjectHandle>
    where
        F: FnOnce() -> ObjectType,
    {
        if let Some(handle) = self.lookup_native(native) {
            return Ok(handle);
        }
        match query_type() {
            ObjectType::Null => Err(SaiStatus::InvalidObjectId.into()),
            object_type => self.allocate(object_type, native),
        }
    }

    /// Drops a handle. Releasing an absent handle is a no-op.
    pub fn release(&self, handle: ObjectHandle) -> Option<(ObjectType, RawSaiObjectId)> {
        let mut maps = self.maps.write();
        let entry = maps.by_handle.remove(&handle)?;
        maps.by_native.remove(&entry.native);
        Some((entry.object_type, entry.native))
    }

    /// Removes every entry. The handle counter keeps running.
    pub fn clear(&self) -> usize {
        let mut maps = self.maps.write();
        let count = maps.by_handle.len();
        maps.by_handle.clear();
        maps.by_native.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.maps.read().by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.read().by_handle.is_empty()
    }

    /// Translates client handles inside an attribute value to native ids.
    pub fn to_native_value(&self, value: &AttrValue) -> Result<AttrValue> {
        value.map_object_ids(|raw| self.resolve(ObjectHandle(raw)))
    }

    /// Translates native ids inside an SDK attribute value to client handles.
    pub fn to_handle_value<F>(&self, value: &AttrValue, query_type: F) -> Result<AttrValue>
    where
        F: Fn(RawSaiObjectId) -> ObjectType,
    {
        value.map_object_ids(|native| {
            self.handle_for_native(native, || query_type(native))
                .map(ObjectHandle::as_raw)
        })
    }

    pub fn snapshot(&self) -> TableSnapshot {
        let maps = self.maps.read();
        let mut entries: Vec<SnapshotEntry> = maps
            .by_handle
            .iter()
            .map(|(handle, e)| SnapshotEntry {
                handle: *handle,
                object_type: e.object_type,
                native: e.native,
            })
            .collect();
        entries.sort_by_key(|e| e.handle);
        TableSnapshot {
            next_index: maps.next_index,
            entries,
        }
    }

    /// Replaces the table contents with a snapshot.
    ///
    /// The whole snapshot is checked before anything is written: duplicate
    /// handles or native ids leave the table untouched.
    pub fn restore(&self, snapshot: &TableSnapshot) -> Result<()> {
        let mut by_handle = HashMap::with_capacity(snapshot.entries.len());
        let mut by_native = HashMap::with_capacity(snapshot.entries.len());
        for e in &snapshot.entries {
            if by_native.insert(e.native, e.handle).is_some() {
                return Err(SyncdError::DuplicateAllocation(e.native));
            }
            let entry = Entry {
                object_type: e.object_type,
                native: e.native,
            };
            if by_handle.insert(e.handle, entry).is_some() {
                return Err(SyncdError::WarmRestart(format!(
                    "handle {} appears twice in snapshot",
                    e.handle
                )));
            }
        }

        let mut maps = self.maps.write();
        let counter_floor = snapshot
            .entries
            .iter()
            .map(|e| sonic_sai::types::object_index_of(e.handle.as_raw()) + 1)
            .max()
            .unwrap_or(1);
        maps.next_index = snapshot.next_index.max(counter_floor);
        maps.by_handle = by_handle;
        maps.by_native = by_native;
        Ok(())
    }
}
