//! Error types for syncd

use crate::identity::ObjectHandle;
use crate::lifecycle::SessionState;
use sonic_sai::{AttrId, RawSaiObjectId, SaiError, SaiStatus};
use thiserror::Error;

/// Sync daemon errors
#[derive(Error, Debug)]
pub enum SyncdError {
    /// Wire attribute could not be converted to a native value
    #[error("Malformed attribute {attr_id}: {reason}")]
    MalformedAttribute { attr_id: AttrId, reason: String },

    /// Handle is not present in the identity table
    #[error("Unknown object {0}")]
    UnknownObject(ObjectHandle),

    /// Native object already has a handle
    #[error("Duplicate allocation for native object 0x{0:016x}")]
    DuplicateAllocation(RawSaiObjectId),

    /// Request is not valid in the current session state
    #[error("{operation} not allowed in session state {state}")]
    InvalidLifecycleTransition {
        state: SessionState,
        operation: String,
    },

    /// Malformed request envelope
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// SDK call failed
    #[error("SAI error: {0}")]
    Sai(#[from] SaiError),

    /// Peer went away
    #[error("Channel closed")]
    ChannelClosed,

    /// Warm restart state could not be saved or reconciled
    #[error("Warm restart error: {0}")]
    WarmRestart(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncdError {
    pub fn malformed(attr_id: AttrId, reason: impl Into<String>) -> Self {
        SyncdError::MalformedAttribute {
            attr_id,
            reason: reason.into(),
        }
    }

    pub fn lifecycle(state: SessionState, operation: impl Into<String>) -> Self {
        SyncdError::InvalidLifecycleTransition {
            state,
            operation: operation.into(),
        }
    }

    /// Status reported to the client for this error.
    pub fn status(&self) -> SaiStatus {
        match self {
            SyncdError::MalformedAttribute { .. } => SaiStatus::InvalidParameter,
            SyncdError::UnknownObject(_) => SaiStatus::ItemNotFound,
            SyncdError::DuplicateAllocation(_) => SaiStatus::ItemAlreadyExists,
            SyncdError::InvalidLifecycleTransition { .. } => SaiStatus::Failure,
            SyncdError::Protocol(_) => SaiStatus::InvalidParameter,
            SyncdError::Sai(e) => e.status(),
            SyncdError::ChannelClosed
            | SyncdError::WarmRestart(_)
            | SyncdError::Configuration(_)
            | SyncdError::Io(_) => SaiStatus::Failure,
        }
    }
}

impl From<SaiStatus> for SyncdError {
    fn from(status: SaiStatus) -> Self {
        SyncdError::Sai(SaiError::from(status))
    }
}

/// Result type for syncd operations
pub type Result<T> = std::result::Result<T, SyncdError>;
