//! The vendor SDK capability surface.
//!
//! `VendorSai` is the seam between the daemon and whatever executes object
//! operations against the ASIC: a vendor library behind FFI or the simulated
//! switch in [`crate::vs`]. Hardware events flow back through a
//! [`NotificationHandler`] handed to the SDK explicitly rather than through a
//! process-wide hook.

use crate::attr::{AttrId, Attribute};
use crate::error::{SaiError, SaiResult, SaiStatus};
use crate::profile::ProfileService;
use crate::types::{ObjectType, RawSaiObjectId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Error handling policy for bulk operations (`sai_bulk_op_error_mode_t`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkOpErrorMode {
    /// Stop at the first failing item; later items are not executed.
    #[default]
    StopOnError,
    /// Execute every item regardless of earlier failures.
    IgnoreError,
}

/// Result of a native bulk create.
///
/// Both vectors have one entry per requested object. Failed or skipped items
/// carry the null object id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkCreateOutcome {
    pub object_ids: Vec<RawSaiObjectId>,
    pub statuses: Vec<SaiStatus>,
}

/// Port operational status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortOperStatus {
    #[default]
    Unknown,
    Up,
    Down,
    Testing,
    NotPresent,
}

/// FDB event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FdbEventType {
    Learned,
    Aged,
    Moved,
    Flushed,
}

/// PFC deadlock events reported per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueuePfcDeadlockEvent {
    Detected,
    Recovered,
}

/// An asynchronous hardware event emitted by the SDK.
///
/// Object ids are SDK-native; the daemon translates them before publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SaiNotification {
    PortStateChange {
        port_id: RawSaiObjectId,
        status: PortOperStatus,
    },
    FdbEvent {
        event: FdbEventType,
        mac: [u8; 6],
        bv_id: RawSaiObjectId,
        bridge_port_id: RawSaiObjectId,
    },
    QueuePfcDeadlock {
        queue_id: RawSaiObjectId,
        event: QueuePfcDeadlockEvent,
    },
    SwitchShutdownRequest {
        switch_id: RawSaiObjectId,
    },
}

impl SaiNotification {
    /// Short name used in logs and counters.
    pub fn name(&self) -> &'static str {
        match self {
            SaiNotification::PortStateChange { .. } => "port_state_change",
            SaiNotification::FdbEvent { .. } => "fdb_event",
            SaiNotification::QueuePfcDeadlock { .. } => "queue_pfc_deadlock",
            SaiNotification::SwitchShutdownRequest { .. } => "switch_shutdown_request",
        }
    }

    /// Rewrites every object id carried by the event.
    ///
    /// Null ids (e.g. an FDB flush without a bridge port) are left alone.
    pub fn map_object_ids<E, F>(&self, mut f: F) -> Result<SaiNotification, E>
    where
        F: FnMut(RawSaiObjectId) -> Result<RawSaiObjectId, E>,
    {
        let mut translate = |id: RawSaiObjectId| {
            if id == crate::types::NULL_OBJECT_ID {
                Ok(id)
            } else {
                f(id)
            }
        };

        Ok(match self {
            SaiNotification::PortStateChange { port_id, status } => {
                SaiNotification::PortStateChange {
                    port_id: translate(*port_id)?,
                    status: *status,
                }
            }
            SaiNotification::FdbEvent {
                event,
                mac,
                bv_id,
                bridge_port_id,
            } => SaiNotification::FdbEvent {
                event: *event,
                mac: *mac,
                bv_id: translate(*bv_id)?,
                bridge_port_id: translate(*bridge_port_id)?,
            },
            SaiNotification::QueuePfcDeadlock { queue_id, event } => {
                SaiNotification::QueuePfcDeadlock {
                    queue_id: translate(*queue_id)?,
                    event: *event,
                }
            }
            SaiNotification::SwitchShutdownRequest { switch_id } => {
                SaiNotification::SwitchShutdownRequest {
                    switch_id: translate(*switch_id)?,
                }
            }
        })
    }
}

/// Receives hardware events from the SDK.
///
/// Called on the SDK's own event thread. Implementations must return quickly
/// and never block.
pub trait NotificationHandler: Send + Sync {
    fn on_notification(&self, notification: SaiNotification);
}

/// Object lifecycle operations exposed by a switch SDK.
pub trait VendorSai: Send + Sync {
    /// Initializes the SDK with the given profile.
    fn initialize(&self, profile: Arc<dyn ProfileService>) -> SaiResult<()>;

    /// Releases every SDK resource.
    fn uninitialize(&self) -> SaiResult<()>;

    /// Creates an object and returns its native id.
    ///
    /// `switch_id` is the null id when creating the switch itself.
    fn create(
        &self,
        object_type: ObjectType,
        switch_id: RawSaiObjectId,
        attrs: &[Attribute],
    ) -> SaiResult<RawSaiObjectId>;

    /// Removes an object.
    fn remove(&self, object_type: ObjectType, object_id: RawSaiObjectId) -> SaiResult<()>;

    /// Sets a single attribute on an object.
    fn set(
        &self,
        object_type: ObjectType,
        object_id: RawSaiObjectId,
        attr: &Attribute,
    ) -> SaiResult<()>;

    /// Reads the requested attributes of an object.
    fn get(
        &self,
        object_type: ObjectType,
        object_id: RawSaiObjectId,
        attr_ids: &[AttrId],
    ) -> SaiResult<Vec<Attribute>>;

    /// Creates several objects of one type in a single call.
    ///
    /// SDKs without native bulk support keep the default, which reports
    /// `NotImplemented` so callers fall back to per-item calls.
    fn bulk_create(
        &self,
        _object_type: ObjectType,
        _switch_id: RawSaiObjectId,
        _attrs: &[Vec<Attribute>],
        _mode: BulkOpErrorMode,
    ) -> SaiResult<BulkCreateOutcome> {
        Err(SaiError::not_implemented("bulk create"))
    }

    /// Removes several objects of one type in a single call.
    fn bulk_remove(
        &self,
        _object_type: ObjectType,
        _object_ids: &[RawSaiObjectId],
        _mode: BulkOpErrorMode,
    ) -> SaiResult<Vec<SaiStatus>> {
        Err(SaiError::not_implemented("bulk remove"))
    }

    /// Returns the type of a live native object, or `ObjectType::Null` if the
    /// SDK does not know the id.
    fn object_type_query(&self, object_id: RawSaiObjectId) -> ObjectType;

    /// Installs (or clears) the handler receiving hardware events.
    fn register_notification_handler(&self, handler: Option<Arc<dyn NotificationHandler>>);
}
