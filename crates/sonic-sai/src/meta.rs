//! Attribute metadata.
//!
//! A static table describing, per object type, which attribute ids exist,
//! what kind of value each carries and how it may be used. The daemon's codec
//! consults it to reject unknown ids and the simulated ASIC uses it to check
//! mandatory create attributes.

use crate::attr::{AttrId, AttrValueType};
use crate::types::ObjectType;

/// How an attribute may be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrAccess {
    /// Supplied on create only.
    CreateOnly,
    /// Supplied on create and changeable with set.
    CreateAndSet,
    /// Settable after creation only.
    SetOnly,
    /// Reported by get, never written.
    ReadOnly,
}

/// Metadata for a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrMetadata {
    pub object_type: ObjectType,
    pub id: AttrId,
    pub name: &'static str,
    pub value_type: AttrValueType,
    pub access: AttrAccess,
    pub mandatory_on_create: bool,
}

impl AttrMetadata {
    const fn new(
        object_type: ObjectType,
        id: AttrId,
        name: &'static str,
        value_type: AttrValueType,
        access: AttrAccess,
        mandatory_on_create: bool,
    ) -> Self {
        Self {
            object_type,
            id,
            name,
            value_type,
            access,
            mandatory_on_create,
        }
    }

    /// Returns true if the attribute may appear in a create call.
    pub fn is_creatable(&self) -> bool {
        matches!(self.access, AttrAccess::CreateOnly | AttrAccess::CreateAndSet)
    }

    /// Returns true if the attribute may appear in a set call.
    pub fn is_settable(&self) -> bool {
        matches!(self.access, AttrAccess::CreateAndSet | AttrAccess::SetOnly)
    }
}

/// Switch attribute ids.
pub mod switch_attr {
    use crate::attr::AttrId;

    pub const PORT_NUMBER: AttrId = 0;
    pub const PORT_LIST: AttrId = 2;
    pub const CPU_PORT: AttrId = 4;
    pub const DEFAULT_VIRTUAL_ROUTER_ID: AttrId = 31;
    pub const SRC_MAC_ADDRESS: AttrId = 98;
    pub const RESTART_WARM: AttrId = 118;
    pub const INIT_SWITCH: AttrId = 143;
    /// Boot type requested for switch creation: 0 cold, 1 warm.
    pub const BOOT_TYPE: AttrId = 0x1000_0000;
    /// Client/daemon communication mode: 0 sync, 1 deferred sync.
    pub const COMMUNICATION_MODE: AttrId = 0x1000_0001;
    /// Enables or disables call recording.
    pub const RECORD: AttrId = 0x1000_0002;
}

/// Port attribute ids.
pub mod port_attr {
    use crate::attr::AttrId;

    pub const TYPE: AttrId = 0;
    pub const OPER_STATUS: AttrId = 1;
    pub const QOS_QUEUE_LIST: AttrId = 14;
    pub const HW_LANE_LIST: AttrId = 29;
    pub const SPEED: AttrId = 31;
    pub const FEC_MODE: AttrId = 36;
    pub const ADMIN_STATE: AttrId = 41;
    pub const PORT_VLAN_ID: AttrId = 45;
    pub const MTU: AttrId = 61;
}

/// Queue attribute ids.
pub mod queue_attr {
    use crate::attr::AttrId;

    pub const TYPE: AttrId = 0;
    pub const PORT: AttrId = 1;
    pub const INDEX: AttrId = 2;
    pub const PARENT_SCHEDULER_NODE: AttrId = 3;
}

/// LAG attribute ids.
pub mod lag_attr {
    use crate::attr::AttrId;

    pub const PORT_LIST: AttrId = 0;
}

/// LAG member attribute ids.
pub mod lag_member_attr {
    use crate::attr::AttrId;

    pub const LAG_ID: AttrId = 0;
    pub const PORT_ID: AttrId = 1;
}

/// Virtual router attribute ids.
pub mod virtual_router_attr {
    use crate::attr::AttrId;

    pub const ADMIN_V4_STATE: AttrId = 0;
    pub const ADMIN_V6_STATE: AttrId = 1;
    pub const SRC_MAC_ADDRESS: AttrId = 2;
}

/// Router interface attribute ids.
pub mod router_interface_attr {
    use crate::attr::AttrId;

    pub const VIRTUAL_ROUTER_ID: AttrId = 0;
    pub const TYPE: AttrId = 1;
    pub const PORT_ID: AttrId = 2;
    pub const SRC_MAC_ADDRESS: AttrId = 6;
    pub const MTU: AttrId = 12;
}

/// VLAN attribute ids.
pub mod vlan_attr {
    use crate::attr::AttrId;

    pub const VLAN_ID: AttrId = 0;
    pub const MEMBER_LIST: AttrId = 1;
}

/// VLAN member attribute ids.
pub mod vlan_member_attr {
    use crate::attr::AttrId;

    pub const VLAN_ID: AttrId = 0;
    pub const BRIDGE_PORT_ID: AttrId = 1;
    pub const VLAN_TAGGING_MODE: AttrId = 2;
}

/// Bridge attribute ids.
pub mod bridge_attr {
    use crate::attr::AttrId;

    pub const TYPE: AttrId = 0;
    pub const PORT_LIST: AttrId = 1;
}

/// Bridge port attribute ids.
pub mod bridge_port_attr {
    use crate::attr::AttrId;

    pub const TYPE: AttrId = 0;
    pub const PORT_ID: AttrId = 2;
    pub const BRIDGE_ID: AttrId = 10;
    pub const ADMIN_STATE: AttrId = 11;
}

/// Host interface attribute ids.
pub mod hostif_attr {
    use crate::attr::AttrId;

    pub const TYPE: AttrId = 0;
    pub const OBJ_ID: AttrId = 1;
    pub const NAME: AttrId = 2;
    pub const OPER_STATUS: AttrId = 3;
}

use self::AttrAccess::*;
use crate::attr::AttrValueType as V;
use crate::types::ObjectType as T;

static METADATA: &[AttrMetadata] = &[
    // switch
    AttrMetadata::new(T::Switch, switch_attr::PORT_NUMBER, "SAI_SWITCH_ATTR_PORT_NUMBER", V::U32, ReadOnly, false),
    AttrMetadata::new(T::Switch, switch_attr::PORT_LIST, "SAI_SWITCH_ATTR_PORT_LIST", V::OidList, ReadOnly, false),
    AttrMetadata::new(T::Switch, switch_attr::CPU_PORT, "SAI_SWITCH_ATTR_CPU_PORT", V::Oid, ReadOnly, false),
    AttrMetadata::new(T::Switch, switch_attr::DEFAULT_VIRTUAL_ROUTER_ID, "SAI_SWITCH_ATTR_DEFAULT_VIRTUAL_ROUTER_ID", V::Oid, ReadOnly, false),
    AttrMetadata::new(T::Switch, switch_attr::SRC_MAC_ADDRESS, "SAI_SWITCH_ATTR_SRC_MAC_ADDRESS", V::Mac, CreateAndSet, false),
    AttrMetadata::new(T::Switch, switch_attr::RESTART_WARM, "SAI_SWITCH_ATTR_RESTART_WARM", V::Bool, CreateAndSet, false),
    AttrMetadata::new(T::Switch, switch_attr::INIT_SWITCH, "SAI_SWITCH_ATTR_INIT_SWITCH", V::Bool, CreateOnly, true),
    AttrMetadata::new(T::Switch, switch_attr::BOOT_TYPE, "SAI_SWITCH_ATTR_BOOT_TYPE", V::S32, CreateOnly, false),
    AttrMetadata::new(T::Switch, switch_attr::COMMUNICATION_MODE, "SAI_REDIS_SWITCH_ATTR_REDIS_COMMUNICATION_MODE", V::S32, SetOnly, false),
    AttrMetadata::new(T::Switch, switch_attr::RECORD, "SAI_REDIS_SWITCH_ATTR_RECORD", V::Bool, SetOnly, false),
    // port
    AttrMetadata::new(T::Port, port_attr::TYPE, "SAI_PORT_ATTR_TYPE", V::S32, ReadOnly, false),
    AttrMetadata::new(T::Port, port_attr::OPER_STATUS, "SAI_PORT_ATTR_OPER_STATUS", V::S32, ReadOnly, false),
    AttrMetadata::new(T::Port, port_attr::QOS_QUEUE_LIST, "SAI_PORT_ATTR_QOS_QUEUE_LIST", V::OidList, ReadOnly, false),
    AttrMetadata::new(T::Port, port_attr::HW_LANE_LIST, "SAI_PORT_ATTR_HW_LANE_LIST", V::U32List, CreateOnly, true),
    AttrMetadata::new(T::Port, port_attr::SPEED, "SAI_PORT_ATTR_SPEED", V::U32, CreateAndSet, true),
    AttrMetadata::new(T::Port, port_attr::FEC_MODE, "SAI_PORT_ATTR_FEC_MODE", V::S32, CreateAndSet, false),
    AttrMetadata::new(T::Port, port_attr::ADMIN_STATE, "SAI_PORT_ATTR_ADMIN_STATE", V::Bool, CreateAndSet, false),
    AttrMetadata::new(T::Port, port_attr::PORT_VLAN_ID, "SAI_PORT_ATTR_PORT_VLAN_ID", V::U16, CreateAndSet, false),
    AttrMetadata::new(T::Port, port_attr::MTU, "SAI_PORT_ATTR_MTU", V::U32, CreateAndSet, false),
    // queue
    AttrMetadata::new(T::Queue, queue_attr::TYPE, "SAI_QUEUE_ATTR_TYPE", V::S32, CreateOnly, true),
    AttrMetadata::new(T::Queue, queue_attr::PORT, "SAI_QUEUE_ATTR_PORT", V::Oid, CreateOnly, true),
    AttrMetadata::new(T::Queue, queue_attr::INDEX, "SAI_QUEUE_ATTR_INDEX", V::U8, CreateOnly, true),
    AttrMetadata::new(T::Queue, queue_attr::PARENT_SCHEDULER_NODE, "SAI_QUEUE_ATTR_PARENT_SCHEDULER_NODE", V::Oid, CreateAndSet, false),
    // lag
    AttrMetadata::new(T::Lag, lag_attr::PORT_LIST, "SAI_LAG_ATTR_PORT_LIST", V::OidList, ReadOnly, false),
    AttrMetadata::new(T::LagMember, lag_member_attr::LAG_ID, "SAI_LAG_MEMBER_ATTR_LAG_ID", V::Oid, CreateOnly, true),
    AttrMetadata::new(T::LagMember, lag_member_attr::PORT_ID, "SAI_LAG_MEMBER_ATTR_PORT_ID", V::Oid, CreateOnly, true),
    // virtual router
    AttrMetadata::new(T::VirtualRouter, virtual_router_attr::ADMIN_V4_STATE, "SAI_VIRTUAL_ROUTER_ATTR_ADMIN_V4_STATE", V::Bool, CreateAndSet, false),
    AttrMetadata::new(T::VirtualRouter, virtual_router_attr::ADMIN_V6_STATE, "SAI_VIRTUAL_ROUTER_ATTR_ADMIN_V6_STATE", V::Bool, CreateAndSet, false),
    AttrMetadata::new(T::VirtualRouter, virtual_router_attr::SRC_MAC_ADDRESS, "SAI_VIRTUAL_ROUTER_ATTR_SRC_MAC_ADDRESS", V::Mac, CreateAndSet, false),
    // router interface
    AttrMetadata::new(T::RouterInterface, router_interface_attr::VIRTUAL_ROUTER_ID, "SAI_ROUTER_INTERFACE_ATTR_VIRTUAL_ROUTER_ID", V::Oid, CreateOnly, true),
    AttrMetadata::new(T::RouterInterface, router_interface_attr::TYPE, "SAI_ROUTER_INTERFACE_ATTR_TYPE", V::S32, CreateOnly, true),
    AttrMetadata::new(T::RouterInterface, router_interface_attr::PORT_ID, "SAI_ROUTER_INTERFACE_ATTR_PORT_ID", V::Oid, CreateOnly, false),
    AttrMetadata::new(T::RouterInterface, router_interface_attr::SRC_MAC_ADDRESS, "SAI_ROUTER_INTERFACE_ATTR_SRC_MAC_ADDRESS", V::Mac, CreateAndSet, false),
    AttrMetadata::new(T::RouterInterface, router_interface_attr::MTU, "SAI_ROUTER_INTERFACE_ATTR_MTU", V::U32, CreateAndSet, false),
    // vlan
    AttrMetadata::new(T::Vlan, vlan_attr::VLAN_ID, "SAI_VLAN_ATTR_VLAN_ID", V::U16, CreateOnly, true),
    AttrMetadata::new(T::Vlan, vlan_attr::MEMBER_LIST, "SAI_VLAN_ATTR_MEMBER_LIST", V::OidList, ReadOnly, false),
    AttrMetadata::new(T::VlanMember, vlan_member_attr::VLAN_ID, "SAI_VLAN_MEMBER_ATTR_VLAN_ID", V::Oid, CreateOnly, true),
    AttrMetadata::new(T::VlanMember, vlan_member_attr::BRIDGE_PORT_ID, "SAI_VLAN_MEMBER_ATTR_BRIDGE_PORT_ID", V::Oid, CreateOnly, true),
    AttrMetadata::new(T::VlanMember, vlan_member_attr::VLAN_TAGGING_MODE, "SAI_VLAN_MEMBER_ATTR_VLAN_TAGGING_MODE", V::S32, CreateAndSet, false),
    // bridge
    AttrMetadata::new(T::Bridge, bridge_attr::TYPE, "SAI_BRIDGE_ATTR_TYPE", V::S32, CreateOnly, true),
    AttrMetadata::new(T::Bridge, bridge_attr::PORT_LIST, "SAI_BRIDGE_ATTR_PORT_LIST", V::OidList, ReadOnly, false),
    AttrMetadata::new(T::BridgePort, bridge_port_attr::TYPE, "SAI_BRIDGE_PORT_ATTR_TYPE", V::S32, CreateOnly, true),
    AttrMetadata::new(T::BridgePort, bridge_port_attr::PORT_ID, "SAI_BRIDGE_PORT_ATTR_PORT_ID", V::Oid, CreateOnly, false),
    AttrMetadata::new(T::BridgePort, bridge_port_attr::BRIDGE_ID, "SAI_BRIDGE_PORT_ATTR_BRIDGE_ID", V::Oid, CreateAndSet, false),
    AttrMetadata::new(T::BridgePort, bridge_port_attr::ADMIN_STATE, "SAI_BRIDGE_PORT_ATTR_ADMIN_STATE", V::Bool, CreateAndSet, false),
    // hostif
    AttrMetadata::new(T::Hostif, hostif_attr::TYPE, "SAI_HOSTIF_ATTR_TYPE", V::S32, CreateOnly, true),
    AttrMetadata::new(T::Hostif, hostif_attr::OBJ_ID, "SAI_HOSTIF_ATTR_OBJ_ID", V::Oid, CreateOnly, false),
    AttrMetadata::new(T::Hostif, hostif_attr::NAME, "SAI_HOSTIF_ATTR_NAME", V::Chardata, CreateOnly, true),
    AttrMetadata::new(T::Hostif, hostif_attr::OPER_STATUS, "SAI_HOSTIF_ATTR_OPER_STATUS", V::Bool, CreateAndSet, false),
];

/// Looks up the metadata for an attribute of the given object type.
pub fn lookup(object_type: ObjectType, id: AttrId) -> Option<&'static AttrMetadata> {
    METADATA
        .iter()
        .find(|m| m.object_type == object_type && m.id == id)
}

/// Iterates over every attribute declared for an object type.
pub fn attributes_of(object_type: ObjectType) -> impl Iterator<Item = &'static AttrMetadata> {
    METADATA.iter().filter(move |m| m.object_type == object_type)
}

/// Iterates over the attributes that must be supplied when creating an object.
pub fn mandatory_on_create(object_type: ObjectType) -> impl Iterator<Item = &'static AttrMetadata> {
    attributes_of(object_type).filter(|m| m.mandatory_on_create)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_port_lanes() {
        let meta = lookup(ObjectType::Port, port_attr::HW_LANE_LIST).unwrap();
        assert_eq!(meta.value_type, AttrValueType::U32List);
        assert!(meta.mandatory_on_create);
        assert!(meta.is_creatable());
        assert!(!meta.is_settable());
    }

    #[test]
    fn test_lookup_is_scoped_by_object_type() {
        // Same numeric id, different object types.
        let port_type = lookup(ObjectType::Port, 0).unwrap();
        let vlan_id = lookup(ObjectType::Vlan, 0).unwrap();
        assert_eq!(port_type.name, "SAI_PORT_ATTR_TYPE");
        assert_eq!(vlan_id.name, "SAI_VLAN_ATTR_VLAN_ID");
        assert!(lookup(ObjectType::Port, 9999).is_none());
    }

    #[test]
    fn test_mandatory_port_attributes() {
        let mut ids: Vec<_> = mandatory_on_create(ObjectType::Port).map(|m| m.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![port_attr::HW_LANE_LIST, port_attr::SPEED]);
    }

    #[test]
    fn test_no_duplicate_ids() {
        for object_type in ObjectType::ALL {
            let mut ids: Vec<_> = attributes_of(*object_type).map(|m| m.id).collect();
            let before = ids.len();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(before, ids.len(), "duplicate attribute id for {}", object_type);
        }
    }
}
