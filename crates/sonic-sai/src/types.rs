//! SAI object types and raw object ids.
//!
//! Object ids are opaque 64-bit values. Both the daemon's external handles and
//! the simulated ASIC's native ids use the same packed layout so the object
//! type can always be recovered from the id itself:
//!
//! ```text
//!  63      56 55      48 47                                   0
//! +----------+----------+--------------------------------------+
//! |  switch  |  object  |               index                  |
//! |  index   |  type    |                                      |
//! +----------+----------+--------------------------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw SAI object ID type (matches `sai_object_id_t`).
pub type RawSaiObjectId = u64;

/// `SAI_NULL_OBJECT_ID`.
pub const NULL_OBJECT_ID: RawSaiObjectId = 0;

const INDEX_BITS: u32 = 48;
const INDEX_MASK: u64 = (1 << INDEX_BITS) - 1;
const TYPE_SHIFT: u32 = 48;
const SWITCH_SHIFT: u32 = 56;

/// Largest index that fits in the packed layout.
pub const MAX_OBJECT_INDEX: u64 = INDEX_MASK;

macro_rules! define_object_types {
    ($($variant:ident = $raw:literal => $name:literal),+ $(,)?) => {
        /// SAI object types addressed by object id.
        ///
        /// Discriminants follow `sai_object_type_t`.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum ObjectType {
            Null = 0,
            $($variant = $raw,)+
        }

        impl ObjectType {
            /// Every non-null object type known to this crate.
            pub const ALL: &'static [ObjectType] = &[$(ObjectType::$variant,)+];

            /// Creates an ObjectType from its raw `sai_object_type_t` value.
            pub fn from_raw(raw: u32) -> Option<Self> {
                match raw {
                    0 => Some(ObjectType::Null),
                    $($raw => Some(ObjectType::$variant),)+
                    _ => None,
                }
            }

            /// Returns the `SAI_OBJECT_TYPE_*` name.
            pub fn name(&self) -> &'static str {
                match self {
                    ObjectType::Null => "SAI_OBJECT_TYPE_NULL",
                    $(ObjectType::$variant => $name,)+
                }
            }
        }
    };
}

define_object_types! {
    Port = 1 => "SAI_OBJECT_TYPE_PORT",
    Lag = 2 => "SAI_OBJECT_TYPE_LAG",
    VirtualRouter = 3 => "SAI_OBJECT_TYPE_VIRTUAL_ROUTER",
    RouterInterface = 6 => "SAI_OBJECT_TYPE_ROUTER_INTERFACE",
    Hostif = 13 => "SAI_OBJECT_TYPE_HOSTIF",
    Queue = 21 => "SAI_OBJECT_TYPE_QUEUE",
    LagMember = 27 => "SAI_OBJECT_TYPE_LAG_MEMBER",
    Switch = 33 => "SAI_OBJECT_TYPE_SWITCH",
    Vlan = 38 => "SAI_OBJECT_TYPE_VLAN",
    VlanMember = 39 => "SAI_OBJECT_TYPE_VLAN_MEMBER",
    Bridge = 57 => "SAI_OBJECT_TYPE_BRIDGE",
    BridgePort = 58 => "SAI_OBJECT_TYPE_BRIDGE_PORT",
}

impl ObjectType {
    /// Returns the raw `sai_object_type_t` value.
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Packs a switch index, object type and per-type index into an object id.
///
/// Returns `None` when `index` does not fit in 48 bits.
pub fn compose_object_id(switch_index: u8, object_type: ObjectType, index: u64) -> Option<RawSaiObjectId> {
    if index > INDEX_MASK {
        return None;
    }
    Some(
        (u64::from(switch_index) << SWITCH_SHIFT)
            | (u64::from(object_type.as_raw() as u8) << TYPE_SHIFT)
            | index,
    )
}

/// Recovers the object type packed into an object id.
///
/// The null id and ids carrying an unknown type yield `None`.
pub fn object_type_of(id: RawSaiObjectId) -> Option<ObjectType> {
    if id == NULL_OBJECT_ID {
        return None;
    }
    let raw = ((id >> TYPE_SHIFT) & 0xff) as u32;
    ObjectType::from_raw(raw).filter(|t| *t != ObjectType::Null)
}

/// Recovers the switch index packed into an object id.
pub fn switch_index_of(id: RawSaiObjectId) -> u8 {
    (id >> SWITCH_SHIFT) as u8
}

/// Recovers the per-type index packed into an object id.
pub fn object_index_of(id: RawSaiObjectId) -> u64 {
    id & INDEX_MASK
}
