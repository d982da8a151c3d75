//! Virtual switch: a software ASIC implementing [`VendorSai`].
//!
//! Keeps every object in memory, validates create/set calls against the
//! attribute metadata, and delivers hardware events from its own event thread
//! the way a vendor SDK does. Warm boot is supported through the profile:
//! when `SAI_BOOT_TYPE=1` the switch is restored from
//! `SAI_WARM_BOOT_READ_FILE`, and uninitializing after `RESTART_WARM` was set
//! writes the state to `SAI_WARM_BOOT_WRITE_FILE`.

pub mod port;

use crate::attr::{find_attr, AttrId, AttrValue, Attribute};
use crate::error::{SaiError, SaiResult, SaiStatus};
use crate::meta::{self, bridge_attr, bridge_port_attr, lag_attr, lag_member_attr, port_attr, queue_attr, switch_attr, vlan_attr, vlan_member_attr};
use crate::profile::{ProfileService, KEY_BOOT_TYPE, KEY_WARM_BOOT_READ_FILE, KEY_WARM_BOOT_WRITE_FILE};
use crate::types::{compose_object_id, ObjectType, RawSaiObjectId, NULL_OBJECT_ID};
use crate::vendor::{BulkCreateOutcome, BulkOpErrorMode, NotificationHandler, PortOperStatus, SaiNotification, VendorSai};
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

const PORT_TYPE_LOGICAL: i32 = 0;
const PORT_TYPE_CPU: i32 = 1;
const PORT_OPER_STATUS_UP: i32 = 1;
const PORT_OPER_STATUS_DOWN: i32 = 2;
const BOOT_TYPE_WARM: &str = "1";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VsObject {
    object_type: ObjectType,
    attrs: Vec<Attribute>,
}

impl VsObject {
    fn new(object_type: ObjectType, attrs: Vec<Attribute>) -> Self {
        Self { object_type, attrs }
    }

    fn attr(&self, id: AttrId) -> Option<&AttrValue> {
        find_attr(&self.attrs, id)
    }

    fn set_attr(&mut self, attr: Attribute) {
        match self.attrs.iter_mut().find(|a| a.id == attr.id) {
            Some(existing) => existing.value = attr.value,
            None => self.attrs.push(attr),
        }
    }

    fn references(&self, target: RawSaiObjectId) -> bool {
        self.attrs.iter().any(|a| match &a.value {
            AttrValue::Oid(id) => *id == target,
            AttrValue::OidList(ids) => ids.contains(&target),
            _ => false,
        })
    }

    fn is_cpu_port(&self) -> bool {
        self.object_type == ObjectType::Port
            && self.attr(port_attr::TYPE) == Some(&AttrValue::S32(PORT_TYPE_CPU))
    }
}

/// Everything the switch knows; this is what warm boot persists.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SwitchState {
    switch_id: RawSaiObjectId,
    next_index: u64,
    objects: BTreeMap<RawSaiObjectId, VsObject>,
}

impl SwitchState {
    fn fresh(switch_index: u8, attrs: &[Attribute]) -> SaiResult<Self> {
        let switch_id = compose_object_id(switch_index, ObjectType::Switch, 0)
            .ok_or_else(|| SaiError::internal("switch id out of range"))?;
        let mut state = SwitchState {
            switch_id,
            next_index: 1,
            objects: BTreeMap::new(),
        };

        let cpu_port = state.insert(
            switch_index,
            ObjectType::Port,
            vec![Attribute::new(port_attr::TYPE, AttrValue::S32(PORT_TYPE_CPU))],
        )?;
        let default_vr = state.insert(switch_index, ObjectType::VirtualRouter, Vec::new())?;

        let mut switch_attrs: Vec<Attribute> = attrs
            .iter()
            .filter(|a| a.id != switch_attr::INIT_SWITCH && a.id != switch_attr::BOOT_TYPE)
            .cloned()
            .collect();
        switch_attrs.push(Attribute::new(switch_attr::CPU_PORT, AttrValue::Oid(cpu_port)));
        switch_attrs.push(Attribute::new(
            switch_attr::DEFAULT_VIRTUAL_ROUTER_ID,
            AttrValue::Oid(default_vr),
        ));
        state
            .objects
            .insert(switch_id, VsObject::new(ObjectType::Switch, switch_attrs));

        Ok(state)
    }

    fn insert(
        &mut self,
        switch_index: u8,
        object_type: ObjectType,
        attrs: Vec<Attribute>,
    ) -> SaiResult<RawSaiObjectId> {
        let id = compose_object_id(switch_index, object_type, self.next_index)
            .ok_or_else(|| SaiError::from(SaiStatus::InsufficientResources))?;
        self.next_index += 1;
        self.objects.insert(id, VsObject::new(object_type, attrs));
        Ok(id)
    }

    fn object(&self, object_type: ObjectType, id: RawSaiObjectId) -> SaiResult<&VsObject> {
        let obj = self
            .objects
            .get(&id)
            .ok_or_else(|| SaiError::not_found(format!("object 0x{:016x}", id)))?;
        if obj.object_type != object_type {
            return Err(SaiStatus::InvalidObjectType.into());
        }
        Ok(obj)
    }

    /// Every object id referenced by `attrs` must exist.
    fn check_references(&self, attrs: &[Attribute]) -> SaiResult<()> {
        for attr in attrs {
            let ids: &[RawSaiObjectId] = match &attr.value {
                AttrValue::Oid(id) => std::slice::from_ref(id),
                AttrValue::OidList(ids) => ids,
                _ => continue,
            };
            for id in ids {
                if *id != NULL_OBJECT_ID && !self.objects.contains_key(id) {
                    return Err(SaiStatus::InvalidObjectId.into());
                }
            }
        }
        Ok(())
    }

    fn lanes_in_use(&self) -> HashSet<u32> {
        self.objects
            .values()
            .filter_map(|o| o.attr(port_attr::HW_LANE_LIST))
            .filter_map(AttrValue::as_u32_list)
            .flat_map(|lanes| lanes.iter().copied())
            .collect()
    }

    /// Ids of objects of `object_type` whose `attr_id` points at `target`.
    fn children(&self, object_type: ObjectType, attr_id: AttrId, target: RawSaiObjectId) -> Vec<RawSaiObjectId> {
        self.objects
            .iter()
            .filter(|(_, o)| {
                o.object_type == object_type && o.attr(attr_id) == Some(&AttrValue::Oid(target))
            })
            .map(|(id, _)| *id)
            .collect()
    }

    fn computed_attr(&self, object_type: ObjectType, id: RawSaiObjectId, attr_id: AttrId) -> Option<AttrValue> {
        let obj = self.objects.get(&id)?;
        match (object_type, attr_id) {
            (ObjectType::Switch, switch_attr::PORT_LIST) => Some(AttrValue::OidList(self.front_panel_ports())),
            (ObjectType::Switch, switch_attr::PORT_NUMBER) => {
                Some(AttrValue::U32(self.front_panel_ports().len() as u32))
            }
            (ObjectType::Port, port_attr::TYPE) => {
                Some(obj.attr(port_attr::TYPE).cloned().unwrap_or(AttrValue::S32(PORT_TYPE_LOGICAL)))
            }
            (ObjectType::Port, port_attr::OPER_STATUS) => {
                let up = obj.attr(port_attr::ADMIN_STATE) == Some(&AttrValue::Bool(true));
                Some(AttrValue::S32(if up { PORT_OPER_STATUS_UP } else { PORT_OPER_STATUS_DOWN }))
            }
            (ObjectType::Port, port_attr::QOS_QUEUE_LIST) => {
                Some(AttrValue::OidList(self.children(ObjectType::Queue, queue_attr::PORT, id)))
            }
            (ObjectType::Vlan, vlan_attr::MEMBER_LIST) => Some(AttrValue::OidList(self.children(
                ObjectType::VlanMember,
                vlan_member_attr::VLAN_ID,
                id,
            ))),
            (ObjectType::Bridge, bridge_attr::PORT_LIST) => Some(AttrValue::OidList(self.children(
                ObjectType::BridgePort,
                bridge_port_attr::BRIDGE_ID,
                id,
            ))),
            (ObjectType::Lag, lag_attr::PORT_LIST) => {
                let ports = self
                    .children(ObjectType::LagMember, lag_member_attr::LAG_ID, id)
                    .iter()
                    .filter_map(|m| self.objects.get(m))
                    .filter_map(|m| m.attr(lag_member_attr::PORT_ID).and_then(AttrValue::as_oid))
                    .collect();
                Some(AttrValue::OidList(ports))
            }
            _ => None,
        }
    }

    fn front_panel_ports(&self) -> Vec<RawSaiObjectId> {
        self.objects
            .iter()
            .filter(|(_, o)| o.object_type == ObjectType::Port && !o.is_cpu_port())
            .map(|(id, _)| *id)
            .collect()
    }
}

/// Checks attribute ids, access and value kinds against the metadata table.
fn validate_attrs(object_type: ObjectType, attrs: &[Attribute], creating: bool) -> SaiResult<()> {
    for attr in attrs {
        let meta = meta::lookup(object_type, attr.id)
            .ok_or_else(|| SaiError::from(SaiStatus::InvalidAttribute))?;
        let allowed = if creating { meta.is_creatable() } else { meta.is_settable() };
        if !allowed {
            return Err(SaiStatus::InvalidAttribute.into());
        }
        if attr.value.value_type() != meta.value_type {
            return Err(SaiError::invalid_parameter(format!(
                "{} expects {:?}, got {:?}",
                meta.name,
                meta.value_type,
                attr.value.value_type()
            )));
        }
    }

    if creating {
        if let Some(missing) = meta::mandatory_on_create(object_type)
            .find(|m| find_attr(attrs, m.id).is_none())
        {
            return Err(SaiError::mandatory_missing(missing.name));
        }
    }
    Ok(())
}

struct Inner {
    profile: Option<Arc<dyn ProfileService>>,
    switch: Option<SwitchState>,
    restart_warm: bool,
}

struct Notifier {
    tx: mpsc::Sender<SaiNotification>,
    thread: JoinHandle<()>,
}

type SharedHandler = Arc<RwLock<Option<Arc<dyn NotificationHandler>>>>;

/// A software switch ASIC.
pub struct VirtualSwitch {
    switch_index: u8,
    inner: Mutex<Inner>,
    notifier: Mutex<Option<Notifier>>,
    handler: SharedHandler,
}

impl VirtualSwitch {
    pub fn new() -> Self {
        Self::with_switch_index(0)
    }

    /// Creates a virtual switch whose object ids carry the given switch index.
    pub fn with_switch_index(switch_index: u8) -> Self {
        Self {
            switch_index,
            inner: Mutex::new(Inner {
                profile: None,
                switch: None,
                restart_warm: false,
            }),
            notifier: Mutex::new(None),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Injects a hardware event as if the ASIC raised it.
    ///
    /// Delivery happens asynchronously on the event thread. Events raised
    /// before `initialize` or after `uninitialize` are discarded.
    pub fn emit_notification(&self, notification: SaiNotification) {
        match self.notifier.lock().as_ref() {
            Some(notifier) => {
                if notifier.tx.send(notification).is_err() {
                    warn!("vs: event thread gone, notification dropped");
                }
            }
            None => debug!("vs: not initialized, dropping {}", notification.name()),
        }
    }

    /// Number of live objects, including the switch and its default objects.
    pub fn object_count(&self) -> usize {
        self.inner
            .lock()
            .switch
            .as_ref()
            .map_or(0, |s| s.objects.len())
    }

    fn start_notifier(&self) -> SaiResult<()> {
        let (tx, rx) = mpsc::channel::<SaiNotification>();
        let handler = Arc::clone(&self.handler);
        let thread = thread::Builder::new()
            .name("vs-notify".to_string())
            .spawn(move || {
                while let Ok(notification) = rx.recv() {
                    let current = handler.read().clone();
                    match current {
                        Some(h) => h.on_notification(notification),
                        None => debug!("vs: no handler registered, dropping {}", notification.name()),
                    }
                }
            })
            .map_err(|e| SaiError::internal(format!("failed to spawn event thread: {}", e)))?;
        *self.notifier.lock() = Some(Notifier { tx, thread });
        Ok(())
    }

    fn stop_notifier(&self) -> SaiResult<()> {
        let notifier = self.notifier.lock().take();
        if let Some(Notifier { tx, thread }) = notifier {
            drop(tx);
            thread
                .join()
                .map_err(|_| SaiError::internal("event thread panicked"))?;
        }
        Ok(())
    }

    fn create_switch(&self, inner: &mut Inner, profile: &Arc<dyn ProfileService>, attrs: &[Attribute]) -> SaiResult<RawSaiObjectId> {
        if inner.switch.is_some() {
            return Err(SaiError::already_exists("switch"));
        }
        validate_attrs(ObjectType::Switch, attrs, true)?;
        if find_attr(attrs, switch_attr::INIT_SWITCH) != Some(&AttrValue::Bool(true)) {
            return Err(SaiError::invalid_parameter("INIT_SWITCH must be true"));
        }

        let warm = profile.get_value(KEY_BOOT_TYPE).as_deref() == Some(BOOT_TYPE_WARM);
        let state = if warm {
            load_warm_boot_state(profile.as_ref())?
        } else {
            SwitchState::fresh(self.switch_index, attrs)?
        };

        let switch_id = state.switch_id;
        info!(
            "vs: switch 0x{:016x} created ({} boot, {} objects)",
            switch_id,
            if warm { "warm" } else { "cold" },
            state.objects.len()
        );
        inner.switch = Some(state);
        inner.restart_warm = false;
        Ok(switch_id)
    }
}

impl Default for VirtualSwitch {
    fn default() -> Self {
        Self::new()
    }
}

fn load_warm_boot_state(profile: &dyn ProfileService) -> SaiResult<SwitchState> {
    let path = profile
        .get_value(KEY_WARM_BOOT_READ_FILE)
        .ok_or_else(|| SaiError::invalid_parameter("warm boot requested without SAI_WARM_BOOT_READ_FILE"))?;
    let text = fs::read_to_string(&path)
        .map_err(|e| SaiError::internal(format!("failed to read warm boot file {}: {}", path, e)))?;
    serde_json::from_str(&text)
        .map_err(|e| SaiError::internal(format!("corrupt warm boot file {}: {}", path, e)))
}

fn save_warm_boot_state(profile: &dyn ProfileService, state: &SwitchState) -> SaiResult<()> {
    let path = profile
        .get_value(KEY_WARM_BOOT_WRITE_FILE)
        .ok_or_else(|| SaiError::invalid_parameter("warm shutdown without SAI_WARM_BOOT_WRITE_FILE"))?;
    let text = serde_json::to_string(state)
        .map_err(|e| SaiError::internal(format!("failed to serialize switch state: {}", e)))?;
    fs::write(&path, text)
        .map_err(|e| SaiError::internal(format!("failed to write warm boot file {}: {}", path, e)))?;
    info!("vs: saved {} objects to {}", state.objects.len(), path);
    Ok(())
}

impl VendorSai for VirtualSwitch {
    fn initialize(&self, profile: Arc<dyn ProfileService>) -> SaiResult<()> {
        {
            let mut inner = self.inner.lock();
            if inner.profile.is_some() {
                return Err(SaiError::internal("already initialized"));
            }
            inner.profile = Some(profile);
        }
        self.start_notifier()?;
        info!("vs: initialized");
        Ok(())
    }

    fn uninitialize(&self) -> SaiResult<()> {
        let saved = {
            let mut inner = self.inner.lock();
            let profile = inner.profile.take().ok_or(SaiError::Uninitialized)?;
            let warm = std::mem::take(&mut inner.restart_warm);
            match inner.switch.take() {
                Some(state) if warm => save_warm_boot_state(profile.as_ref(), &state),
                _ => Ok(()),
            }
        };
        self.stop_notifier()?;
        if let Err(e) = &saved {
            warn!("vs: uninitialized without a warm boot image: {}", e);
        } else {
            info!("vs: uninitialized");
        }
        saved
    }

    fn create(&self, object_type: ObjectType, switch_id: RawSaiObjectId, attrs: &[Attribute]) -> SaiResult<RawSaiObjectId> {
        let mut inner = self.inner.lock();
        let profile = inner.profile.clone().ok_or(SaiError::Uninitialized)?;

        if object_type == ObjectType::Switch {
            return self.create_switch(&mut inner, &profile, attrs);
        }
        if object_type == ObjectType::Null {
            return Err(SaiStatus::InvalidObjectType.into());
        }

        let state = inner
            .switch
            .as_mut()
            .ok_or_else(|| SaiError::invalid_parameter("switch not created"))?;
        if switch_id != state.switch_id {
            return Err(SaiStatus::InvalidObjectId.into());
        }

        validate_attrs(object_type, attrs, true)?;
        state.check_references(attrs)?;

        match object_type {
            ObjectType::Port => {
                port::validate_port_attrs(attrs)?;
                if let Some(lanes) = find_attr(attrs, port_attr::HW_LANE_LIST).and_then(AttrValue::as_u32_list) {
                    let in_use = state.lanes_in_use();
                    if let Some(lane) = lanes.iter().find(|l| in_use.contains(l)) {
                        return Err(SaiError::already_exists(format!("lane {}", lane)));
                    }
                }
            }
            ObjectType::Vlan => {
                let vlan_id = find_attr(attrs, vlan_attr::VLAN_ID);
                let duplicate = state
                    .objects
                    .values()
                    .any(|o| o.object_type == ObjectType::Vlan && o.attr(vlan_attr::VLAN_ID) == vlan_id);
                if duplicate {
                    return Err(SaiError::already_exists(format!("vlan {:?}", vlan_id)));
                }
            }
            _ => {}
        }

        let id = state.insert(self.switch_index, object_type, attrs.to_vec())?;
        debug!("vs: created {} 0x{:016x}", object_type, id);
        Ok(id)
    }

    fn remove(&self, object_type: ObjectType, object_id: RawSaiObjectId) -> SaiResult<()> {
        let mut inner = self.inner.lock();
        if inner.profile.is_none() {
            return Err(SaiError::Uninitialized);
        }

        if object_type == ObjectType::Switch {
            let matches = inner.switch.as_ref().map(|s| s.switch_id) == Some(object_id);
            if !matches {
                return Err(SaiError::not_found(format!("switch 0x{:016x}", object_id)));
            }
            inner.switch = None;
            info!("vs: switch 0x{:016x} removed", object_id);
            return Ok(());
        }

        let state = inner
            .switch
            .as_mut()
            .ok_or_else(|| SaiError::invalid_parameter("switch not created"))?;
        state.object(object_type, object_id)?;

        if let Some((user, _)) = state
            .objects
            .iter()
            .find(|(id, o)| **id != object_id && o.references(object_id))
        {
            debug!("vs: 0x{:016x} still referenced by 0x{:016x}", object_id, user);
            return Err(SaiStatus::ObjectInUse.into());
        }

        state.objects.remove(&object_id);
        debug!("vs: removed {} 0x{:016x}", object_type, object_id);
        Ok(())
    }

    fn set(&self, object_type: ObjectType, object_id: RawSaiObjectId, attr: &Attribute) -> SaiResult<()> {
        let notification = {
            let mut inner = self.inner.lock();
            if inner.profile.is_none() {
                return Err(SaiError::Uninitialized);
            }

            validate_attrs(object_type, std::slice::from_ref(attr), false)?;

            let state = inner
                .switch
                .as_mut()
                .ok_or_else(|| SaiError::invalid_parameter("switch not created"))?;
            state.object(object_type, object_id)?;
            state.check_references(std::slice::from_ref(attr))?;
            if object_type == ObjectType::Port {
                port::validate_port_attrs(std::slice::from_ref(attr))?;
            }

            let obj = state
                .objects
                .get_mut(&object_id)
                .ok_or_else(|| SaiError::not_found(format!("object 0x{:016x}", object_id)))?;
            let previous = obj.attr(attr.id).cloned();
            obj.set_attr(attr.clone());

            let mut notification = None;
            match (object_type, attr.id) {
                (ObjectType::Switch, switch_attr::RESTART_WARM) => {
                    inner.restart_warm = attr.value.as_bool().unwrap_or(false);
                }
                (ObjectType::Port, port_attr::ADMIN_STATE) if previous.as_ref() != Some(&attr.value) => {
                    let status = if attr.value.as_bool() == Some(true) {
                        PortOperStatus::Up
                    } else {
                        PortOperStatus::Down
                    };
                    notification = Some(SaiNotification::PortStateChange {
                        port_id: object_id,
                        status,
                    });
                }
                _ => {}
            }
            notification
        };

        if let Some(notification) = notification {
            self.emit_notification(notification);
        }
        Ok(())
    }

    fn get(&self, object_type: ObjectType, object_id: RawSaiObjectId, attr_ids: &[AttrId]) -> SaiResult<Vec<Attribute>> {
        let inner = self.inner.lock();
        if inner.profile.is_none() {
            return Err(SaiError::Uninitialized);
        }
        let state = inner
            .switch
            .as_ref()
            .ok_or_else(|| SaiError::invalid_parameter("switch not created"))?;
        let obj = state.object(object_type, object_id)?;

        attr_ids
            .iter()
            .map(|id| {
                meta::lookup(object_type, *id).ok_or_else(|| SaiError::from(SaiStatus::InvalidAttribute))?;
                let value = state
                    .computed_attr(object_type, object_id, *id)
                    .or_else(|| obj.attr(*id).cloned())
                    .ok_or_else(|| SaiError::not_found(format!("attribute {} not set", id)))?;
                Ok(Attribute::new(*id, value))
            })
            .collect()
    }

    fn bulk_create(
        &self,
        object_type: ObjectType,
        switch_id: RawSaiObjectId,
        attrs: &[Vec<Attribute>],
        mode: BulkOpErrorMode,
    ) -> SaiResult<BulkCreateOutcome> {
        let mut object_ids = vec![NULL_OBJECT_ID; attrs.len()];
        let mut statuses = vec![SaiStatus::NotExecuted; attrs.len()];

        for (i, item) in attrs.iter().enumerate() {
            match self.create(object_type, switch_id, item) {
                Ok(id) => {
                    object_ids[i] = id;
                    statuses[i] = SaiStatus::Success;
                }
                Err(e) => {
                    statuses[i] = e.status();
                    if mode == BulkOpErrorMode::StopOnError {
                        break;
                    }
                }
            }
        }

        Ok(BulkCreateOutcome { object_ids, statuses })
    }

    fn bulk_remove(&self, object_type: ObjectType, object_ids: &[RawSaiObjectId], mode: BulkOpErrorMode) -> SaiResult<Vec<SaiStatus>> {
        let mut statuses = vec![SaiStatus::NotExecuted; object_ids.len()];

        for (i, id) in object_ids.iter().enumerate() {
            statuses[i] = match self.remove(object_type, *id) {
                Ok(()) => SaiStatus::Success,
                Err(e) => e.status(),
            };
            if statuses[i].is_error() && mode == BulkOpErrorMode::StopOnError {
                break;
            }
        }

        Ok(statuses)
    }

    fn object_type_query(&self, object_id: RawSaiObjectId) -> ObjectType {
        self.inner
            .lock()
            .switch
            .as_ref()
            .and_then(|s| s.objects.get(&object_id))
            .map_or(ObjectType::Null, |o| o.object_type)
    }

    fn register_notification_handler(&self, handler: Option<Arc<dyn NotificationHandler>>) {
        *self.handler.write() = handler;
    }
}
