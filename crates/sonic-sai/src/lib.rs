//! SAI (Switch Abstraction Interface) object model.
//!
//! This crate holds everything the sync daemon needs to talk to a switch SDK
//! without knowing which one it is:
//!
//! - [`types`]: object types and the native object id layout
//! - [`attr`]: attribute values
//! - [`meta`]: per-object-type attribute metadata
//! - [`error`]: SAI status codes and the error type
//! - [`profile`]: the key/value profile handed to the SDK at start-up
//! - [`vendor`]: the [`VendorSai`] trait and hardware notifications
//! - [`vs`]: a virtual switch implementing [`VendorSai`] in software
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use sonic_sai::{meta::switch_attr, AttrValue, Attribute, ObjectType, ProfileMap, VendorSai, VirtualSwitch};
//!
//! let vs = VirtualSwitch::new();
//! vs.initialize(Arc::new(ProfileMap::new())).unwrap();
//! let switch_id = vs
//!     .create(
//!         ObjectType::Switch,
//!         sonic_sai::NULL_OBJECT_ID,
//!         &[Attribute::new(switch_attr::INIT_SWITCH, AttrValue::Bool(true))],
//!     )
//!     .unwrap();
//! assert_eq!(vs.object_type_query(switch_id), ObjectType::Switch);
//! vs.uninitialize().unwrap();
//! ```

pub mod attr;
pub mod error;
pub mod meta;
pub mod profile;
pub mod types;
pub mod vendor;
pub mod vs;

pub use attr::{find_attr, AttrId, AttrValue, AttrValueType, Attribute};
pub use error::{SaiError, SaiResult, SaiStatus};
pub use meta::{AttrAccess, AttrMetadata};
pub use profile::{ProfileMap, ProfileService};
pub use types::{ObjectType, RawSaiObjectId, NULL_OBJECT_ID};
pub use vendor::{
    BulkCreateOutcome, BulkOpErrorMode, FdbEventType, NotificationHandler, PortOperStatus,
    QueuePfcDeadlockEvent, SaiNotification, VendorSai,
};
pub use vs::VirtualSwitch;
