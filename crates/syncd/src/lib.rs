//! SAI Synchronization Daemon
//!
//! Sits between an orchestration agent and a vendor switch SDK. Requests
//! arrive over a channel, object handles are translated to SDK-native ids,
//! calls (single or bulk) are executed against the SDK, and asynchronous
//! hardware events are relayed back with their ids translated the other way.
//!
//! Warm restart persists the handle mapping so that a restarted daemon keeps
//! handing out the same handles for the same hardware objects.

pub mod bulk;
pub mod channel;
pub mod client;
pub mod codec;
pub mod config;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod notification;
pub mod protocol;
pub mod syncd;
pub mod warm_restart;

pub use bulk::{BulkDispatcher, BulkOutcome, DispatchContext};
pub use channel::{
    client_endpoint_over_stream, duplex, server_endpoint_over_stream, ChannelAdapter,
    ClientEndpoint, ServerEndpoint, SessionEnd, ShutdownHandle, DEFAULT_DRAIN_GRACE,
};
pub use client::{BulkReply, SaiClient};
pub use codec::{WireAttribute, WireValue};
pub use config::{SyncdConfig, DEFAULT_CONFIG_PATH};
pub use error::{Result, SyncdError};
pub use identity::{IdentityTable, ObjectHandle, SnapshotEntry, TableSnapshot};
pub use lifecycle::{BootMode, CommunicationMode, Session, SessionState};
pub use notification::{NotificationRelay, RelayCounters, DEFAULT_QUEUE_CAPACITY};
pub use protocol::{
    BulkItem, Inbound, NotificationFrame, Operation, Rejection, Request, Response, ServerFrame,
    ShutdownKind,
};
pub use syncd::Syncd;
pub use warm_restart::{PersistedTable, ReconcileReport, WarmRestartStore};
