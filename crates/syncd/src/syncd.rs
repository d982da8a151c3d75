//! Request routing.
//!
//! [`Syncd`] owns everything one session touches: the SDK, the identity table,
//! the session state and the notification relay. The channel adapter feeds it
//! one request at a time and writes back whatever it returns.

use crate::bulk::{BulkDispatcher, DispatchContext};
use crate::codec;
use crate::config::SyncdConfig;
use crate::error::{Result, SyncdError};
use crate::identity::{IdentityTable, ObjectHandle};
use crate::lifecycle::{is_session_attr_request, BootMode, Session, SessionState};
use crate::notification::{NotificationRelay, RelayCounters};
use crate::protocol::{Operation, Request, Response, ServerFrame, ShutdownKind};
use crate::warm_restart::{self, WarmRestartStore};
use sonic_sai::meta::switch_attr;
use sonic_sai::profile::{
    collect_entries, KEY_BOOT_TYPE, KEY_WARM_BOOT_READ_FILE, KEY_WARM_BOOT_WRITE_FILE,
};
use sonic_sai::{
    AttrValue, Attribute, ObjectType, ProfileMap, RawSaiObjectId, VendorSai, NULL_OBJECT_ID,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// The daemon core for one session.
pub struct Syncd {
    sdk: Arc<dyn VendorSai>,
    config: SyncdConfig,
    profile: BTreeMap<String, String>,
    table: Arc<IdentityTable>,
    session: Session,
    bulk: BulkDispatcher,
    warm_store: WarmRestartStore,
    relay: Option<NotificationRelay>,
    outbound: mpsc::Sender<ServerFrame>,
    switch: Option<(ObjectHandle, RawSaiObjectId)>,
    sdk_initialized: bool,
    last_relay_counters: RelayCounters,
}

impl Syncd {
    /// Creates the core. Notifications are published on `outbound`.
    pub fn new(
        sdk: Arc<dyn VendorSai>,
        config: SyncdConfig,
        outbound: mpsc::Sender<ServerFrame>,
    ) -> Result<Self> {
        let profile = match &config.profile_map_file {
            Some(path) => {
                let map = ProfileMap::load(path).map_err(|e| {
                    SyncdError::Configuration(format!("profile map {}: {}", path.display(), e))
                })?;
                info!(path = %path.display(), entries = map.len(), "loaded profile map");
                collect_entries(&map)
            }
            None => BTreeMap::new(),
        };

        Ok(Self {
            session: Session::new(config.start_type, config.communication_mode),
            bulk: BulkDispatcher::new(config.enable_bulk),
            warm_store: WarmRestartStore::new(&config.warm_restart_file),
            table: Arc::new(IdentityTable::new()),
            relay: None,
            switch: None,
            sdk_initialized: false,
            last_relay_counters: RelayCounters::default(),
            sdk,
            config,
            profile,
            outbound,
        })
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn table(&self) -> &Arc<IdentityTable> {
        &self.table
    }

    /// Handle of the session's switch once it exists.
    pub fn switch_handle(&self) -> Option<ObjectHandle> {
        self.switch.map(|(handle, _)| handle)
    }

    /// Relay counters; after shutdown these are the final values.
    pub fn relay_counters(&self) -> RelayCounters {
        self.relay
            .as_ref()
            .map_or(self.last_relay_counters, NotificationRelay::counters)
    }

    /// Processes one request. Failures are reported in the response.
    pub async fn handle(&mut self, request: Request) -> Response {
        let sequence = request.sequence;
        if self.session.is_recording() {
            info!(
                target: "syncd::record",
                sequence,
                op = request.operation.name(),
                object_type = %request.object_type,
                handle = %request.handle,
                bulk = request.bulk,
                "request"
            );
        }

        match self.process(request).await {
            Ok(response) => response,
            Err(e) => {
                debug!(sequence, "request failed: {}", e);
                Response::from_error(sequence, &e)
            }
        }
    }

    async fn process(&mut self, request: Request) -> Result<Response> {
        request.validate()?;
        self.session.check_sequence(request.sequence)?;
        self.session.admit(&request)?;

        let sequence = request.sequence;
        match request.operation {
            Operation::Initialize => {
                info!(entries = request.profile.len(), "client profile received");
                self.profile.extend(request.profile);
                Ok(Response::success(sequence))
            }
            Operation::Shutdown => {
                self.shutdown(request.shutdown).await?;
                Ok(Response::success(sequence))
            }
            Operation::Set if is_session_attr_request(&request) => {
                for attr in codec::decode_all(ObjectType::Switch, &request.attributes)? {
                    self.session.apply_session_attr(&attr)?;
                }
                Ok(Response::success(sequence))
            }
            Operation::Create if request.object_type == ObjectType::Switch => {
                self.create_switch(&request).await
            }
            _ => self.dispatch(&request),
        }
    }

    fn dispatch(&self, request: &Request) -> Result<Response> {
        let (switch_handle, switch_native) = self.switch.ok_or_else(|| {
            SyncdError::lifecycle(self.session.state(), "object operation without switch")
        })?;
        let ctx = DispatchContext {
            sdk: self.sdk.as_ref(),
            table: &self.table,
            object_type: request.object_type,
            switch_native,
        };
        let sequence = request.sequence;

        if request.bulk {
            let outcome = self
                .bulk
                .dispatch(&ctx, request.operation, &request.items, request.error_mode);
            return Ok(outcome.into_response(sequence));
        }

        match request.operation {
            Operation::Create => {
                if !request.handle.is_null() && request.handle != switch_handle {
                    return Err(SyncdError::Protocol(format!(
                        "create names switch {}, session switch is {}",
                        request.handle, switch_handle
                    )));
                }
                let handle = ctx.create_one(&request.attributes)?;
                Ok(Response {
                    handles: vec![handle],
                    ..Response::success(sequence)
                })
            }
            Operation::Remove if request.object_type == ObjectType::Switch => Err(
                SyncdError::lifecycle(self.session.state(), "switch remove (use shutdown)"),
            ),
            Operation::Remove => {
                ctx.remove_one(request.handle)?;
                Ok(Response::success(sequence))
            }
            Operation::Set => {
                let attr = request
                    .attributes
                    .first()
                    .ok_or_else(|| SyncdError::Protocol("set without attribute".to_string()))?;
                ctx.set_one(request.handle, attr)?;
                Ok(Response::success(sequence))
            }
            Operation::Get => {
                let attributes = ctx.get_one(request.handle, &request.attr_ids)?;
                Ok(Response {
                    attributes,
                    ..Response::success(sequence)
                })
            }
            Operation::Initialize | Operation::Shutdown => Err(SyncdError::Protocol(format!(
                "{} is not an object operation",
                request.operation.name()
            ))),
        }
    }

    async fn create_switch(&mut self, request: &Request) -> Result<Response> {
        let attrs = codec::decode_all(ObjectType::Switch, &request.attributes)?;
        let boot_mode = self.session.resolve_boot_mode(&attrs)?;
        self.session.transition(SessionState::Initializing)?;

        match self.bring_up(boot_mode, &attrs) {
            Ok(handle) => {
                self.session.transition(SessionState::Ready)?;
                info!(switch = %handle, boot = ?boot_mode, "switch ready");
                Ok(Response {
                    handles: vec![handle],
                    ..Response::success(request.sequence)
                })
            }
            Err(e) => {
                error!(boot = ?boot_mode, "switch initialization failed: {}", e);
                if let Err(cleanup) = self.teardown().await {
                    warn!("teardown after failed initialization: {}", cleanup);
                }
                self.session.transition(SessionState::Uninitialized)?;
                Err(e)
            }
        }
    }

    /// Profile handed to the SDK: configured and client entries, plus the
    /// boot type and warm-boot file keys.
    fn sdk_profile(&self, boot_mode: BootMode) -> ProfileMap {
        let mut profile = ProfileMap::from_pairs(self.profile.clone());
        profile.insert(KEY_BOOT_TYPE, boot_mode.profile_value());
        let warm_boot_file = self.config.sdk_warm_boot_file.to_string_lossy().to_string();
        for key in [KEY_WARM_BOOT_READ_FILE, KEY_WARM_BOOT_WRITE_FILE] {
            if !self.profile.contains_key(key) {
                profile.insert(key, warm_boot_file.clone());
            }
        }
        profile
    }

    fn bring_up(&mut self, boot_mode: BootMode, attrs: &[Attribute]) -> Result<ObjectHandle> {
        self.sdk.initialize(Arc::new(self.sdk_profile(boot_mode)))?;
        self.sdk_initialized = true;

        let relay = NotificationRelay::start(
            self.config.notification_queue_capacity,
            Arc::clone(&self.table),
            self.outbound.clone(),
        );
        self.sdk.register_notification_handler(Some(relay.handler()));
        self.relay = Some(relay);

        let sdk_attrs: Vec<Attribute> = attrs
            .iter()
            .filter(|a| a.id != switch_attr::BOOT_TYPE)
            .cloned()
            .collect();
        let native = self.sdk.create(ObjectType::Switch, NULL_OBJECT_ID, &sdk_attrs)?;

        let handle = match boot_mode {
            BootMode::Cold => {
                self.warm_store.remove()?;
                self.table.allocate(ObjectType::Switch, native)?
            }
            BootMode::Warm => {
                let persisted = self.warm_store.load()?;
                let handle = warm_restart::switch_entry(&persisted)
                    .map(|e| e.handle)
                    .ok_or_else(|| SyncdError::WarmRestart("no switch in saved table".to_string()))?;
                let report = warm_restart::reconcile(&self.table, self.sdk.as_ref(), &persisted, native)?;
                info!(
                    restored = report.restored,
                    saved_at = %persisted.saved_at,
                    "identity table reconciled"
                );
                self.warm_store.remove()?;
                handle
            }
        };
        self.switch = Some((handle, native));
        Ok(handle)
    }

    /// Goes through ShuttingDown to Terminated.
    ///
    /// A warm shutdown persists the identity table and asks the SDK to save
    /// its own state before it is uninitialized. The session still terminates
    /// if that fails; the error is returned afterwards.
    async fn shutdown(&mut self, kind: ShutdownKind) -> Result<()> {
        self.session.transition(SessionState::ShuttingDown)?;
        info!(kind = ?kind, objects = self.table.len(), "shutting down");

        let mut result = Ok(());
        if kind == ShutdownKind::Warm {
            match self.switch {
                Some((_, native)) => result = self.prepare_warm_shutdown(native),
                None => warn!("warm shutdown requested before switch create, shutting down cold"),
            }
        }

        let teardown = self.teardown().await;
        if kind == ShutdownKind::Warm && teardown.is_err() {
            // The saved table is useless without the SDK's own image.
            if let Err(e) = self.warm_store.remove() {
                warn!("failed to discard warm restart state: {}", e);
            }
        }
        self.session.transition(SessionState::Terminated)?;
        result.and(teardown)
    }

    fn prepare_warm_shutdown(&self, switch_native: RawSaiObjectId) -> Result<()> {
        self.sdk.set(
            ObjectType::Switch,
            switch_native,
            &Attribute::new(switch_attr::RESTART_WARM, AttrValue::Bool(true)),
        )?;
        self.warm_store.save(switch_native, self.table.snapshot())
    }

    /// Terminates the session unless it already has. Used for external
    /// signals and channel loss.
    pub async fn terminate(&mut self, kind: ShutdownKind) -> Result<()> {
        match self.session.state() {
            SessionState::ShuttingDown | SessionState::Terminated => Ok(()),
            _ => self.shutdown(kind).await,
        }
    }

    /// Uninitializes the SDK, drains the relay and releases the table.
    ///
    /// Every step runs even when the SDK fails to uninitialize; that failure
    /// is returned at the end.
    async fn teardown(&mut self) -> Result<()> {
        let mut result = Ok(());
        if self.sdk_initialized {
            if let Err(e) = self.sdk.uninitialize() {
                warn!("SDK uninitialize failed: {}", e);
                result = Err(SyncdError::from(e));
            }
            self.sdk_initialized = false;
        }
        self.sdk.register_notification_handler(None);

        if let Some(relay) = self.relay.take() {
            self.last_relay_counters = relay.stop().await;
            info!(
                published = self.last_relay_counters.published,
                dropped = self.last_relay_counters.dropped,
                orphaned = self.last_relay_counters.orphaned,
                "notification relay stopped"
            );
        }

        let released = self.table.clear();
        self.switch = None;
        debug!(released, "identity table released");
        result
    }
}
