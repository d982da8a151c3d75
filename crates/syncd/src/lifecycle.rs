//! Switch session lifecycle.
//!
//! ```text
//! Uninitialized -> Initializing -> Ready -> ShuttingDown -> Terminated
//!        ^              |
//!        +--------------+  (switch initialization failed)
//! ```
//!
//! The session also carries the per-session settings a client may change
//! before the switch exists: communication mode and recording.

use crate::error::{Result, SyncdError};
use crate::protocol::{Operation, Request};
use serde::{Deserialize, Serialize};
use sonic_sai::meta::switch_attr;
use sonic_sai::{AttrValue, Attribute, ObjectType};
use std::fmt;
use tracing::info;

/// Session state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No switch yet; only session setup and switch create are accepted
    Uninitialized,
    /// Switch create in progress
    Initializing,
    /// Switch up, all object operations accepted
    Ready,
    /// Shutdown signal received, draining
    ShuttingDown,
    /// SDK uninitialized and table released
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Uninitialized => write!(f, "Uninitialized"),
            SessionState::Initializing => write!(f, "Initializing"),
            SessionState::Ready => write!(f, "Ready"),
            SessionState::ShuttingDown => write!(f, "ShuttingDown"),
            SessionState::Terminated => write!(f, "Terminated"),
        }
    }
}

impl SessionState {
    fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Uninitialized, Initializing)
                | (Initializing, Ready)
                | (Initializing, Uninitialized)
                | (Uninitialized, ShuttingDown)
                | (Ready, ShuttingDown)
                | (ShuttingDown, Terminated)
        )
    }
}

/// How the switch comes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootMode {
    #[default]
    Cold,
    Warm,
}

impl BootMode {
    /// Decodes the `BOOT_TYPE` switch-create attribute.
    pub fn from_attr(value: &AttrValue) -> Result<Self> {
        match value.as_s32() {
            Some(0) => Ok(BootMode::Cold),
            Some(1) => Ok(BootMode::Warm),
            _ => Err(SyncdError::from(sonic_sai::SaiError::invalid_parameter(format!(
                "unsupported boot type {:?}",
                value
            )))),
        }
    }

    /// Value of the `SAI_BOOT_TYPE` profile key.
    pub fn profile_value(&self) -> &'static str {
        match self {
            BootMode::Cold => "0",
            BootMode::Warm => "1",
        }
    }
}

/// Client/daemon communication mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMode {
    /// Client waits for every response.
    #[default]
    Sync,
    /// Client pipelines set/remove and collects their statuses at the next
    /// synchronous call.
    DeferredSync,
}

impl CommunicationMode {
    pub fn from_attr(value: &AttrValue) -> Result<Self> {
        match value.as_s32() {
            Some(0) => Ok(CommunicationMode::Sync),
            Some(1) => Ok(CommunicationMode::DeferredSync),
            _ => Err(SyncdError::from(sonic_sai::SaiError::invalid_parameter(format!(
                "unsupported communication mode {:?}",
                value
            )))),
        }
    }

    pub fn as_attr(&self) -> AttrValue {
        match self {
            CommunicationMode::Sync => AttrValue::S32(0),
            CommunicationMode::DeferredSync => AttrValue::S32(1),
        }
    }
}

/// Returns true for `set` requests that change session settings rather than
/// an object: switch type, null handle, and a session attribute id.
pub fn is_session_attr_request(req: &Request) -> bool {
    req.operation == Operation::Set
        && !req.bulk
        && req.object_type == ObjectType::Switch
        && req.handle.is_null()
        && req
            .attributes
            .iter()
            .all(|a| a.id == switch_attr::COMMUNICATION_MODE || a.id == switch_attr::RECORD)
}

/// Per-session state.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    boot_mode: BootMode,
    communication_mode: CommunicationMode,
    record: bool,
    last_sequence: Option<u64>,
}

impl Session {
    pub fn new(boot_mode: BootMode, communication_mode: CommunicationMode) -> Self {
        Self {
            state: SessionState::Uninitialized,
            boot_mode,
            communication_mode,
            record: false,
            last_sequence: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn boot_mode(&self) -> BootMode {
        self.boot_mode
    }

    pub fn communication_mode(&self) -> CommunicationMode {
        self.communication_mode
    }

    pub fn is_recording(&self) -> bool {
        self.record
    }

    /// Moves to `next`, failing if the edge is not in the state machine.
    pub fn transition(&mut self, next: SessionState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(SyncdError::lifecycle(
                self.state,
                format!("transition to {}", next),
            ));
        }
        info!(from = %self.state, to = %next, "session state change");
        self.state = next;
        Ok(())
    }

    /// Sequence numbers must strictly increase within a session.
    pub fn check_sequence(&mut self, sequence: u64) -> Result<()> {
        if let Some(last) = self.last_sequence {
            if sequence <= last {
                return Err(SyncdError::Protocol(format!(
                    "sequence {} does not follow {}",
                    sequence, last
                )));
            }
        }
        self.last_sequence = Some(sequence);
        Ok(())
    }

    /// Checks whether a request may run in the current state.
    ///
    /// Shutdown, initialize and session settings are handled outside `Ready`;
    /// switch create is only valid before the switch exists; everything else
    /// needs `Ready`.
    pub fn admit(&self, req: &Request) -> Result<()> {
        let state = self.state;
        let allowed = match req.operation {
            Operation::Shutdown => {
                matches!(state, SessionState::Uninitialized | SessionState::Ready)
            }
            Operation::Initialize => state == SessionState::Uninitialized,
            Operation::Create if req.object_type == ObjectType::Switch => {
                state == SessionState::Uninitialized
            }
            _ if is_session_attr_request(req) => {
                matches!(state, SessionState::Uninitialized | SessionState::Ready)
            }
            _ => state == SessionState::Ready,
        };
        if allowed {
            Ok(())
        } else {
            Err(SyncdError::lifecycle(
                state,
                format!("{} {}", req.operation.name(), req.object_type),
            ))
        }
    }

    /// Picks the boot mode for switch create: the `BOOT_TYPE` attribute if
    /// present, the configured default otherwise.
    pub fn resolve_boot_mode(&mut self, attrs: &[Attribute]) -> Result<BootMode> {
        if let Some(value) = sonic_sai::find_attr(attrs, switch_attr::BOOT_TYPE) {
            self.boot_mode = BootMode::from_attr(value)?;
        }
        Ok(self.boot_mode)
    }

    /// Applies a session attribute.
    pub fn apply_session_attr(&mut self, attr: &Attribute) -> Result<()> {
        match attr.id {
            switch_attr::COMMUNICATION_MODE => {
                self.communication_mode = CommunicationMode::from_attr(&attr.value)?;
                info!(mode = ?self.communication_mode, "communication mode set");
            }
            switch_attr::RECORD => {
                self.record = attr.value.as_bool().ok_or_else(|| {
                    SyncdError::malformed(attr.id, "record expects a bool")
                })?;
                info!(record = self.record, "recording toggled");
            }
            other => {
                return Err(SyncdError::malformed(other, "not a session attribute"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{WireAttribute, WireValue};
    use crate::identity::ObjectHandle;

    fn session_set(id: u32, value: WireValue) -> Request {
        let mut req = Request::new(1, Operation::Set, ObjectType::Switch);
        req.attributes.push(WireAttribute { id, value });
        req
    }

    #[test]
    fn test_state_machine_edges() {
        let mut session = Session::new(BootMode::Cold, CommunicationMode::Sync);
        assert!(session.transition(SessionState::Ready).is_err());
        session.transition(SessionState::Initializing).unwrap();
        session.transition(SessionState::Ready).unwrap();
        assert!(session.transition(SessionState::Initializing).is_err());
        session.transition(SessionState::ShuttingDown).unwrap();
        session.transition(SessionState::Terminated).unwrap();
        assert!(session.transition(SessionState::Ready).is_err());
    }

    #[test]
    fn test_sequence_must_increase() {
        let mut session = Session::new(BootMode::Cold, CommunicationMode::Sync);
        session.check_sequence(1).unwrap();
        session.check_sequence(5).unwrap();
        assert!(matches!(session.check_sequence(5), Err(SyncdError::Protocol(_))));
        assert!(session.check_sequence(2).is_err());
        session.check_sequence(6).unwrap();
    }

    #[test]
    fn test_admission_before_ready() {
        let session = Session::new(BootMode::Cold, CommunicationMode::Sync);

        let mut remove = Request::new(1, Operation::Remove, ObjectType::Port);
        remove.handle = ObjectHandle::from_raw(1);
        assert!(matches!(
            session.admit(&remove),
            Err(SyncdError::InvalidLifecycleTransition {
                state: SessionState::Uninitialized,
                ..
            })
        ));

        let comm = session_set(switch_attr::COMMUNICATION_MODE, WireValue::S32 { value: 0 });
        assert!(session.admit(&comm).is_ok());
        assert!(session
            .admit(&Request::new(1, Operation::Create, ObjectType::Switch))
            .is_ok());
    }

    #[test]
    fn test_session_attrs() {
        let mut session = Session::new(BootMode::Cold, CommunicationMode::Sync);
        session
            .apply_session_attr(&Attribute::new(switch_attr::COMMUNICATION_MODE, AttrValue::S32(1)))
            .unwrap();
        assert_eq!(session.communication_mode(), CommunicationMode::DeferredSync);

        session
            .apply_session_attr(&Attribute::new(switch_attr::RECORD, AttrValue::Bool(true)))
            .unwrap();
        assert!(session.is_recording());

        assert!(session
            .apply_session_attr(&Attribute::new(switch_attr::COMMUNICATION_MODE, AttrValue::S32(7)))
            .is_err());
    }

    #[test]
    fn test_boot_mode_resolution() {
        let mut session = Session::new(BootMode::Cold, CommunicationMode::Sync);
        assert_eq!(session.resolve_boot_mode(&[]).unwrap(), BootMode::Cold);

        let warm = [Attribute::new(switch_attr::BOOT_TYPE, AttrValue::S32(1))];
        assert_eq!(session.resolve_boot_mode(&warm).unwrap(), BootMode::Warm);

        let bogus = [Attribute::new(switch_attr::BOOT_TYPE, AttrValue::S32(3))];
        let err = session.resolve_boot_mode(&bogus).unwrap_err();
        assert_eq!(err.status(), sonic_sai::SaiStatus::InvalidParameter);
    }
}
