//! Channel protocol: request and response envelopes.
//!
//! Frames are JSON documents. Over a byte stream each frame is one line.

use crate::codec::WireAttribute;
use crate::error::{Result, SyncdError};
use crate::identity::ObjectHandle;
use crate::lifecycle::SessionState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sonic_sai::{AttrId, BulkOpErrorMode, ObjectType, SaiNotification, SaiStatus};
use std::collections::BTreeMap;

/// Operation carried by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Hands the client's profile entries to the daemon before switch create.
    Initialize,
    Create,
    Remove,
    Set,
    Get,
    /// Explicit shutdown signal. Answered once the session has terminated.
    Shutdown,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::Initialize => "initialize",
            Operation::Create => "create",
            Operation::Remove => "remove",
            Operation::Set => "set",
            Operation::Get => "get",
            Operation::Shutdown => "shutdown",
        }
    }

    /// Operations a client may pipeline in deferred-sync mode.
    pub fn is_deferrable(&self) -> bool {
        matches!(self, Operation::Set | Operation::Remove)
    }
}

/// How the daemon should go down on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownKind {
    #[default]
    Cold,
    /// Persist state so the next start can reconcile instead of rebuilding.
    Warm,
}

/// One element of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BulkItem {
    /// Target object; null for create.
    #[serde(default)]
    pub handle: ObjectHandle,
    #[serde(default)]
    pub attributes: Vec<WireAttribute>,
    /// Attribute ids to read (bulk get).
    #[serde(default)]
    pub attr_ids: Vec<AttrId>,
}

fn null_object_type() -> ObjectType {
    ObjectType::Null
}

/// Request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub sequence: u64,
    pub operation: Operation,
    #[serde(default = "null_object_type")]
    pub object_type: ObjectType,
    /// Target object, or the null handle.
    #[serde(default)]
    pub handle: ObjectHandle,
    #[serde(default)]
    pub attributes: Vec<WireAttribute>,
    /// Attribute ids to read (get).
    #[serde(default)]
    pub attr_ids: Vec<AttrId>,
    #[serde(default)]
    pub bulk: bool,
    #[serde(default)]
    pub error_mode: BulkOpErrorMode,
    #[serde(default)]
    pub items: Vec<BulkItem>,
    /// Profile entries (initialize).
    #[serde(default)]
    pub profile: BTreeMap<String, String>,
    #[serde(default)]
    pub shutdown: ShutdownKind,
}

impl Request {
    /// A request with only the envelope header filled in.
    pub fn new(sequence: u64, operation: Operation, object_type: ObjectType) -> Self {
        Self {
            sequence,
            operation,
            object_type,
            handle: ObjectHandle::NULL,
            attributes: Vec::new(),
            attr_ids: Vec::new(),
            bulk: false,
            error_mode: BulkOpErrorMode::default(),
            items: Vec::new(),
            profile: BTreeMap::new(),
            shutdown: ShutdownKind::default(),
        }
    }

    /// Checks the envelope shape. Says nothing about whether the handles exist.
    pub fn validate(&self) -> Result<()> {
        let op = self.operation;
        match op {
            Operation::Initialize | Operation::Shutdown => {
                if self.bulk {
                    return Err(SyncdError::Protocol(format!("{} cannot be bulk", op.name())));
                }
                return Ok(());
            }
            _ => {}
        }

        if self.object_type == ObjectType::Null {
            return Err(SyncdError::Protocol(format!("{} without object type", op.name())));
        }

        if self.bulk {
            if self.items.is_empty() {
                return Err(SyncdError::Protocol("bulk request without items".to_string()));
            }
            if self.object_type == ObjectType::Switch {
                return Err(SyncdError::Protocol("switch objects cannot be bulked".to_string()));
            }
            return Ok(());
        }

        if !self.items.is_empty() {
            return Err(SyncdError::Protocol("items given on a non-bulk request".to_string()));
        }
        match op {
            Operation::Remove | Operation::Get if self.handle.is_null() => Err(
                SyncdError::Protocol(format!("{} requires a target handle", op.name())),
            ),
            Operation::Set if self.attributes.len() != 1 => Err(SyncdError::Protocol(format!(
                "set carries exactly one attribute, got {}",
                self.attributes.len()
            ))),
            _ => Ok(()),
        }
    }
}

/// Typed reason a request was refused before reaching the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Rejection {
    MalformedRequest { reason: String },
    InvalidLifecycleTransition { state: SessionState, operation: String },
    UnknownObject { handle: ObjectHandle },
    MalformedAttribute { attr_id: AttrId, reason: String },
}

impl Rejection {
    /// Rejection for errors raised before the SDK was called.
    pub fn from_error(err: &SyncdError) -> Option<Rejection> {
        match err {
            SyncdError::Protocol(reason) => Some(Rejection::MalformedRequest {
                reason: reason.clone(),
            }),
            SyncdError::InvalidLifecycleTransition { state, operation } => {
                Some(Rejection::InvalidLifecycleTransition {
                    state: *state,
                    operation: operation.clone(),
                })
            }
            SyncdError::UnknownObject(handle) => Some(Rejection::UnknownObject { handle: *handle }),
            SyncdError::MalformedAttribute { attr_id, reason } => Some(Rejection::MalformedAttribute {
                attr_id: *attr_id,
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    pub fn into_error(self) -> SyncdError {
        match self {
            Rejection::MalformedRequest { reason } => SyncdError::Protocol(reason),
            Rejection::InvalidLifecycleTransition { state, operation } => {
                SyncdError::InvalidLifecycleTransition { state, operation }
            }
            Rejection::UnknownObject { handle } => SyncdError::UnknownObject(handle),
            Rejection::MalformedAttribute { attr_id, reason } => {
                SyncdError::MalformedAttribute { attr_id, reason }
            }
        }
    }
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub sequence: u64,
    /// Aggregate status.
    pub status: SaiStatus,
    /// Per-item statuses (bulk only), positionally matching the request.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub object_statuses: Vec<SaiStatus>,
    /// Handles of created objects (create only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handles: Vec<ObjectHandle>,
    /// Attributes read (get only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<WireAttribute>,
    /// Attributes read per item (bulk get only).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub item_attributes: Vec<Vec<WireAttribute>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection: Option<Rejection>,
}

impl Response {
    pub fn new(sequence: u64, status: SaiStatus) -> Self {
        Self {
            sequence,
            status,
            object_statuses: Vec::new(),
            handles: Vec::new(),
            attributes: Vec::new(),
            item_attributes: Vec::new(),
            rejection: None,
        }
    }

    pub fn success(sequence: u64) -> Self {
        Self::new(sequence, SaiStatus::Success)
    }

    /// Failure response carrying the error's status and, if the request never
    /// reached the SDK, the typed rejection.
    pub fn from_error(sequence: u64, err: &SyncdError) -> Self {
        Self {
            rejection: Rejection::from_error(err),
            ..Self::new(sequence, err.status())
        }
    }

    /// Converts a failed non-bulk response back into an error.
    pub fn into_result(self) -> Result<Response> {
        if let Some(rejection) = self.rejection {
            return Err(rejection.into_error());
        }
        if self.status.is_error() && self.object_statuses.is_empty() {
            return Err(SyncdError::from(self.status));
        }
        Ok(self)
    }
}

/// A hardware event published to the client. Object ids are client handles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFrame {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub event: SaiNotification,
}

/// Anything the daemon writes to the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
pub enum ServerFrame {
    Response(Response),
    Notification(NotificationFrame),
}

/// Anything the daemon reads from the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Request(Request),
    /// A frame that could not be parsed as a request.
    Malformed(String),
}
