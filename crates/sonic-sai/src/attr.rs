//! Native attribute values passed to and returned from the SDK.

use crate::types::RawSaiObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute id enumerant, scoped by object type.
pub type AttrId = u32;

/// Value kinds an attribute can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrValueType {
    Bool,
    U8,
    U16,
    U32,
    S32,
    U64,
    Mac,
    Chardata,
    Oid,
    OidList,
    U32List,
    S32List,
}

impl AttrValueType {
    /// Returns true for list-typed values.
    pub fn is_list(&self) -> bool {
        matches!(
            self,
            AttrValueType::OidList | AttrValueType::U32List | AttrValueType::S32List
        )
    }

    /// Returns true if values of this kind reference other objects.
    pub fn is_object_reference(&self) -> bool {
        matches!(self, AttrValueType::Oid | AttrValueType::OidList)
    }
}

/// A native attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttrValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    S32(i32),
    U64(u64),
    Mac([u8; 6]),
    Chardata(String),
    Oid(RawSaiObjectId),
    OidList(Vec<RawSaiObjectId>),
    U32List(Vec<u32>),
    S32List(Vec<i32>),
}

impl AttrValue {
    /// Returns the kind of this value.
    pub fn value_type(&self) -> AttrValueType {
        match self {
            AttrValue::Bool(_) => AttrValueType::Bool,
            AttrValue::U8(_) => AttrValueType::U8,
            AttrValue::U16(_) => AttrValueType::U16,
            AttrValue::U32(_) => AttrValueType::U32,
            AttrValue::S32(_) => AttrValueType::S32,
            AttrValue::U64(_) => AttrValueType::U64,
            AttrValue::Mac(_) => AttrValueType::Mac,
            AttrValue::Chardata(_) => AttrValueType::Chardata,
            AttrValue::Oid(_) => AttrValueType::Oid,
            AttrValue::OidList(_) => AttrValueType::OidList,
            AttrValue::U32List(_) => AttrValueType::U32List,
            AttrValue::S32List(_) => AttrValueType::S32List,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttrValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            AttrValue::U32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_s32(&self) -> Option<i32> {
        match self {
            AttrValue::S32(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_oid(&self) -> Option<RawSaiObjectId> {
        match self {
            AttrValue::Oid(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u32_list(&self) -> Option<&[u32]> {
        match self {
            AttrValue::U32List(v) => Some(v),
            _ => None,
        }
    }

    /// Rewrites every object id carried by this value.
    ///
    /// Null ids are passed through untouched. Non-reference values are
    /// returned as-is.
    pub fn map_object_ids<E, F>(&self, mut f: F) -> Result<AttrValue, E>
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

        match self {
            AttrValue::Oid(id) => Ok(AttrValue::Oid(translate(*id)?)),
            AttrValue::OidList(ids) => {
                let mapped = ids
                    .iter()
                    .map(|id| translate(*id))
                    .collect::<Result<Vec<_>, E>>()?;
                Ok(AttrValue::OidList(mapped))
            }
            other => Ok(other.clone()),
        }
    }
}

/// An attribute id paired with its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttrId,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(id: AttrId, value: AttrValue) -> Self {
        Self { id, value }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={:?}", self.id, self.value)
    }
}

/// Finds the attribute with the given id in a list.
pub fn find_attr(attrs: &[Attribute], id: AttrId) -> Option<&AttrValue> {
    attrs.iter().find(|a| a.id == id).map(|a| &a.value)
}
