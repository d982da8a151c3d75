//! Attribute codec.
//!
//! Converts between the wire form of attributes and the native
//! [`Attribute`] values the SDK consumes. The codec is pure: object
//! references pass through as raw handle values, and translating them to
//! native ids is the identity table's job.

use crate::error::{Result, SyncdError};
use crate::identity::ObjectHandle;
use crate::protocol::NotificationFrame;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sonic_sai::{meta, AttrId, AttrValue, AttrValueType, Attribute, ObjectType, SaiNotification};

/// Wire value of an attribute. Lists carry an explicit element count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireValue {
    Bool { value: bool },
    U8 { value: u8 },
    U16 { value: u16 },
    U32 { value: u32 },
    S32 { value: i32 },
    U64 { value: u64 },
    /// `aa:bb:cc:dd:ee:ff`
    Mac { value: String },
    Chardata { value: String },
    Oid { value: ObjectHandle },
    OidList { count: u32, list: Vec<ObjectHandle> },
    U32List { count: u32, list: Vec<u32> },
    S32List { count: u32, list: Vec<i32> },
}

impl WireValue {
    fn value_type(&self) -> AttrValueType {
        match self {
            WireValue::Bool { .. } => AttrValueType::Bool,
            WireValue::U8 { .. } => AttrValueType::U8,
            WireValue::U16 { .. } => AttrValueType::U16,
            WireValue::U32 { .. } => AttrValueType::U32,
            WireValue::S32 { .. } => AttrValueType::S32,
            WireValue::U64 { .. } => AttrValueType::U64,
            WireValue::Mac { .. } => AttrValueType::Mac,
            WireValue::Chardata { .. } => AttrValueType::Chardata,
            WireValue::Oid { .. } => AttrValueType::Oid,
            WireValue::OidList { .. } => AttrValueType::OidList,
            WireValue::U32List { .. } => AttrValueType::U32List,
            WireValue::S32List { .. } => AttrValueType::S32List,
        }
    }
}

/// An attribute as it travels over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAttribute {
    pub id: AttrId,
    #[serde(flatten)]
    pub value: WireValue,
}

fn check_count<T>(id: AttrId, count: u32, list: &[T]) -> Result<()> {
    if count as usize != list.len() {
        return Err(SyncdError::malformed(
            id,
            format!("count {} does not match {} items", count, list.len()),
        ));
    }
    Ok(())
}

fn parse_mac(id: AttrId, text: &str) -> Result<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.split(':');
    for byte in mac.iter_mut() {
        let part = parts
            .next()
            .ok_or_else(|| SyncdError::malformed(id, format!("invalid MAC address '{}'", text)))?;
        *byte = u8::from_str_radix(part, 16)
            .map_err(|_| SyncdError::malformed(id, format!("invalid MAC address '{}'", text)))?;
    }
    if parts.next().is_some() {
        return Err(SyncdError::malformed(id, format!("invalid MAC address '{}'", text)));
    }
    Ok(mac)
}

fn format_mac(mac: &[u8; 6]) -> String {
    mac.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":")
}

/// Checks that `id` is a known attribute of `object_type`.
pub fn check_attr_id(object_type: ObjectType, id: AttrId) -> Result<&'static meta::AttrMetadata> {
    meta::lookup(object_type, id).ok_or_else(|| {
        SyncdError::malformed(id, format!("unknown attribute for {}", object_type))
    })
}

/// Decodes one wire attribute for the given object type.
pub fn decode(object_type: ObjectType, attr: &WireAttribute) -> Result<Attribute> {
    let id = attr.id;
    let meta = check_attr_id(object_type, id)?;
    if meta.value_type != attr.value.value_type() {
        return Err(SyncdError::malformed(
            id,
            format!(
                "{} expects {:?}, got {:?}",
                meta.name,
                meta.value_type,
                attr.value.value_type()
            ),
        ));
    }

    let value = match &attr.value {
        WireValue::Bool { value } => AttrValue::Bool(*value),
        WireValue::U8 { value } => AttrValue::U8(*value),
        WireValue::U16 { value } => AttrValue::U16(*value),
        WireValue::U32 { value } => AttrValue::U32(*value),
        WireValue::S32 { value } => AttrValue::S32(*value),
        WireValue::U64 { value } => AttrValue::U64(*value),
        WireValue::Mac { value } => AttrValue::Mac(parse_mac(id, value)?),
        WireValue::Chardata { value } => AttrValue::Chardata(value.clone()),
        WireValue::Oid { value } => AttrValue::Oid(value.as_raw()),
        WireValue::OidList { count, list } => {
            check_count(id, *count, list)?;
            AttrValue::OidList(list.iter().map(|h| h.as_raw()).collect())
        }
        WireValue::U32List { count, list } => {
            check_count(id, *count, list)?;
            AttrValue::U32List(list.clone())
        }
        WireValue::S32List { count, list } => {
            check_count(id, *count, list)?;
            AttrValue::S32List(list.clone())
        }
    };
    Ok(Attribute::new(id, value))
}

/// Decodes a full attribute list, failing on the first bad record.
pub fn decode_all(object_type: ObjectType, attrs: &[WireAttribute]) -> Result<Vec<Attribute>> {
    attrs.iter().map(|a| decode(object_type, a)).collect()
}

/// Encodes a native attribute for the wire.
pub fn encode(attr: &Attribute) -> WireAttribute {
    let value = match &attr.value {
        AttrValue::Bool(v) => WireValue::Bool { value: *v },
        AttrValue::U8(v) => WireValue::U8 { value: *v },
        AttrValue::U16(v) => WireValue::U16 { value: *v },
        AttrValue::U32(v) => WireValue::U32 { value: *v },
        AttrValue::S32(v) => WireValue::S32 { value: *v },
        AttrValue::U64(v) => WireValue::U64 { value: *v },
        AttrValue::Mac(mac) => WireValue::Mac {
            value: format_mac(mac),
        },
        AttrValue::Chardata(s) => WireValue::Chardata { value: s.clone() },
        AttrValue::Oid(id) => WireValue::Oid {
            value: ObjectHandle::from_raw(*id),
        },
        AttrValue::OidList(ids) => WireValue::OidList {
            count: ids.len() as u32,
            list: ids.iter().map(|id| ObjectHandle::from_raw(*id)).collect(),
        },
        AttrValue::U32List(list) => WireValue::U32List {
            count: list.len() as u32,
            list: list.clone(),
        },
        AttrValue::S32List(list) => WireValue::S32List {
            count: list.len() as u32,
            list: list.clone(),
        },
    };
    WireAttribute { id: attr.id, value }
}

pub fn encode_all(attrs: &[Attribute]) -> Vec<WireAttribute> {
    attrs.iter().map(encode).collect()
}

/// Wraps an already translated event for publication.
pub fn encode_notification(event: SaiNotification, timestamp: DateTime<Utc>) -> NotificationFrame {
    NotificationFrame {
        timestamp,
        name: event.name().to_string(),
        event,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sonic_sai::meta::{port_attr, switch_attr};

    #[test]
    fn test_decode_lane_list() {
        let wire = WireAttribute {
            id: port_attr::HW_LANE_LIST,
            value: WireValue::U32List {
                count: 4,
                list: vec![1000, 1001, 1002, 1003],
            },
        };
        let attr = decode(ObjectType::Port, &wire).unwrap();
        assert_eq!(
            attr,
            Attribute::new(port_attr::HW_LANE_LIST, AttrValue::U32List(vec![1000, 1001, 1002, 1003]))
        );
        assert_eq!(encode(&attr), wire);
    }

    #[test]
    fn test_count_mismatch_is_malformed() {
        let wire = WireAttribute {
            id: port_attr::HW_LANE_LIST,
            value: WireValue::U32List {
                count: 4,
                list: vec![1000, 1001, 1002],
            },
        };
        let err = decode(ObjectType::Port, &wire).unwrap_err();
        assert!(matches!(
            err,
            SyncdError::MalformedAttribute { attr_id, .. } if attr_id == port_attr::HW_LANE_LIST
        ));
    }

    #[test]
    fn test_unknown_attribute_is_malformed() {
        let wire = WireAttribute {
            id: 0x7777,
            value: WireValue::U32 { value: 1 },
        };
        assert!(matches!(
            decode(ObjectType::Port, &wire),
            Err(SyncdError::MalformedAttribute { attr_id: 0x7777, .. })
        ));
    }

    #[test]
    fn test_value_kind_must_match_metadata() {
        let wire = WireAttribute {
            id: port_attr::SPEED,
            value: WireValue::Bool { value: true },
        };
        assert!(decode(ObjectType::Port, &wire).is_err());
    }

    #[test]
    fn test_mac_parsing() {
        let wire = WireAttribute {
            id: switch_attr::SRC_MAC_ADDRESS,
            value: WireValue::Mac {
                value: "00:11:22:aa:bb:cc".to_string(),
            },
        };
        let attr = decode(ObjectType::Switch, &wire).unwrap();
        assert_eq!(attr.value, AttrValue::Mac([0x00, 0x11, 0x22, 0xaa, 0xbb, 0xcc]));
        assert_eq!(encode(&attr), wire);

        let bad = WireAttribute {
            id: switch_attr::SRC_MAC_ADDRESS,
            value: WireValue::Mac {
                value: "00:11:22".to_string(),
            },
        };
        assert!(decode(ObjectType::Switch, &bad).is_err());
    }

    #[test]
    fn test_wire_json_shape() {
        let wire = WireAttribute {
            id: port_attr::SPEED,
            value: WireValue::U32 { value: 1000 },
        };
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json, serde_json::json!({"id": 31, "type": "u32", "value": 1000}));
        let back: WireAttribute = serde_json::from_value(json).unwrap();
        assert_eq!(back, wire);
    }
}
