//! Bulk dispatcher.
//!
//! Runs a bulk request item by item (or through the SDK's native bulk call
//! when it has one and bulk support is enabled) and assembles the per-item
//! status vector. The vector always has one entry per request item, in
//! request order, whatever the error mode.
//!
//! The single-object paths in [`crate::syncd`] use the same per-item helpers,
//! so a one-item bulk and a plain call behave identically.

use crate::codec::{self, WireAttribute};
use crate::error::{Result, SyncdError};
use crate::identity::{IdentityTable, ObjectHandle};
use crate::protocol::{BulkItem, Operation, Response};
use sonic_sai::{
    AttrId, Attribute, BulkOpErrorMode, ObjectType, RawSaiObjectId, SaiError, SaiStatus,
    VendorSai, NULL_OBJECT_ID,
};
use tracing::{debug, warn};

/// What a bulk (or single) operation runs against.
pub struct DispatchContext<'a> {
    pub sdk: &'a dyn VendorSai,
    pub table: &'a IdentityTable,
    pub object_type: ObjectType,
    /// Native id of the session's switch.
    pub switch_native: RawSaiObjectId,
}

impl DispatchContext<'_> {
    /// Decodes wire attributes and swaps handles for native ids.
    pub fn prepare_attrs(&self, attrs: &[WireAttribute]) -> Result<Vec<Attribute>> {
        codec::decode_all(self.object_type, attrs)?
            .into_iter()
            .map(|a| Ok(Attribute::new(a.id, self.table.to_native_value(&a.value)?)))
            .collect()
    }

    /// Resolves a target handle, checking it is of the request's object type.
    pub fn resolve_target(&self, handle: ObjectHandle) -> Result<RawSaiObjectId> {
        let (object_type, native) = self.table.resolve_typed(handle)?;
        if object_type != self.object_type {
            return Err(SaiStatus::InvalidObjectType.into());
        }
        Ok(native)
    }

    pub fn create_one(&self, attrs: &[WireAttribute]) -> Result<ObjectHandle> {
        let attrs = self.prepare_attrs(attrs)?;
        let native = self
            .sdk
            .create(self.object_type, self.switch_native, &attrs)
            .map_err(|e| self.sdk_failure("create", e))?;
        let handle = self.adopt(native)?;
        debug!(object_type = %self.object_type, handle = %handle, "created");
        Ok(handle)
    }

    /// Gives a freshly created native object a handle. If the table refuses
    /// it, the object is removed from the SDK again.
    pub fn adopt(&self, native: RawSaiObjectId) -> Result<ObjectHandle> {
        self.table.allocate(self.object_type, native).map_err(|e| {
            warn!(
                object_type = %self.object_type,
                native = format_args!("{:#x}", native),
                "no handle for created object: {}",
                e
            );
            if let Err(cleanup) = self.sdk.remove(self.object_type, native) {
                warn!("failed to remove unowned object {:#x}: {}", native, cleanup);
            }
            e
        })
    }

    pub fn remove_one(&self, handle: ObjectHandle) -> Result<()> {
        let native = self.resolve_target(handle)?;
        self.sdk
            .remove(self.object_type, native)
            .map_err(|e| self.sdk_failure("remove", e))?;
        self.table.release(handle);
        debug!(object_type = %self.object_type, handle = %handle, "removed");
        Ok(())
    }

    pub fn set_one(&self, handle: ObjectHandle, attr: &WireAttribute) -> Result<()> {
        let native = self.resolve_target(handle)?;
        let attr = self
            .prepare_attrs(std::slice::from_ref(attr))?
            .pop()
            .ok_or_else(|| SyncdError::Protocol("set without attribute".to_string()))?;
        self.sdk
            .set(self.object_type, native, &attr)
            .map_err(|e| self.sdk_failure("set", e))
    }

    pub fn get_one(&self, handle: ObjectHandle, attr_ids: &[AttrId]) -> Result<Vec<WireAttribute>> {
        let native = self.resolve_target(handle)?;
        for id in attr_ids {
            codec::check_attr_id(self.object_type, *id)?;
        }
        let attrs = self
            .sdk
            .get(self.object_type, native, attr_ids)
            .map_err(|e| self.sdk_failure("get", e))?;
        attrs
            .iter()
            .map(|a| {
                let value = self
                    .table
                    .to_handle_value(&a.value, |id| self.sdk.object_type_query(id))?;
                Ok(codec::encode(&Attribute::new(a.id, value)))
            })
            .collect()
    }

    fn sdk_failure(&self, op: &str, err: SaiError) -> SyncdError {
        warn!(object_type = %self.object_type, status = %err.status(), "SDK {} failed: {}", op, err);
        SyncdError::Sai(err)
    }
}

/// Result of a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    pub statuses: Vec<SaiStatus>,
    /// Created handles (create only); null for failed items.
    pub handles: Vec<ObjectHandle>,
    /// Attributes read per item (get only).
    pub attributes: Vec<Vec<WireAttribute>>,
}

impl BulkOutcome {
    fn new(len: usize) -> Self {
        Self {
            statuses: vec![SaiStatus::NotExecuted; len],
            handles: Vec::new(),
            attributes: Vec::new(),
        }
    }

    /// Success only if every item succeeded.
    pub fn aggregate(&self) -> SaiStatus {
        SaiStatus::aggregate(&self.statuses)
    }

    pub fn into_response(self, sequence: u64) -> Response {
        Response {
            object_statuses: self.statuses.clone(),
            handles: self.handles,
            item_attributes: self.attributes,
            ..Response::new(sequence, SaiStatus::aggregate(&self.statuses))
        }
    }
}

/// Runs `f` for each item in order, honouring the error mode.
fn run_items<F>(len: usize, mode: BulkOpErrorMode, mut f: F) -> Vec<SaiStatus>
where
    F: FnMut(usize) -> Result<()>,
{
    let mut statuses = vec![SaiStatus::NotExecuted; len];
    for (i, status) in statuses.iter_mut().enumerate() {
        *status = match f(i) {
            Ok(()) => SaiStatus::Success,
            Err(e) => e.status(),
        };
        if status.is_error() && mode == BulkOpErrorMode::StopOnError {
            break;
        }
    }
    statuses
}

/// Rewrites failures after the first one as `NotExecuted`.
///
/// Items a native SDK call reports as done past the first failure keep their
/// status: the object really was created or removed.
fn stop_after_first_failure(statuses: &mut [SaiStatus]) {
    let Some(first) = statuses.iter().position(|s| s.is_error()) else {
        return;
    };
    for status in &mut statuses[first + 1..] {
        if status.is_error() {
            *status = SaiStatus::NotExecuted;
        } else {
            warn!("SDK executed a bulk item past a failure in stop-on-error mode");
        }
    }
}

/// Dispatches bulk requests.
#[derive(Debug, Clone, Copy)]
pub struct BulkDispatcher {
    native_bulk: bool,
}

impl BulkDispatcher {
    /// `native_bulk` enables the SDK's own bulk calls where it has them.
    pub fn new(native_bulk: bool) -> Self {
        Self { native_bulk }
    }

    pub fn dispatch(
        &self,
        ctx: &DispatchContext<'_>,
        operation: Operation,
        items: &[BulkItem],
        mode: BulkOpErrorMode,
    ) -> BulkOutcome {
        debug!(
            op = operation.name(),
            object_type = %ctx.object_type,
            items = items.len(),
            mode = ?mode,
            "bulk request"
        );
        let outcome = match operation {
            Operation::Create => self.create(ctx, items, mode),
            Operation::Remove => self.remove(ctx, items, mode),
            Operation::Set => {
                let mut outcome = BulkOutcome::new(items.len());
                outcome.statuses = run_items(items.len(), mode, |i| match items[i].attributes.as_slice() {
                    [attr] => ctx.set_one(items[i].handle, attr),
                    other => Err(SyncdError::Protocol(format!(
                        "bulk set item carries {} attributes",
                        other.len()
                    ))),
                });
                outcome
            }
            Operation::Get => {
                let mut outcome = BulkOutcome::new(items.len());
                let mut attributes = vec![Vec::new(); items.len()];
                outcome.statuses = run_items(items.len(), mode, |i| {
                    attributes[i] = ctx.get_one(items[i].handle, &items[i].attr_ids)?;
                    Ok(())
                });
                outcome.attributes = attributes;
                outcome
            }
            Operation::Initialize | Operation::Shutdown => {
                let mut outcome = BulkOutcome::new(items.len());
                outcome.statuses = vec![SaiStatus::InvalidParameter; items.len()];
                outcome
            }
        };
        debug_assert_eq!(outcome.statuses.len(), items.len());
        outcome
    }

    fn create(&self, ctx: &DispatchContext<'_>, items: &[BulkItem], mode: BulkOpErrorMode) -> BulkOutcome {
        if self.native_bulk {
            if let Some(outcome) = self.native_create(ctx, items, mode) {
                return outcome;
            }
        }
        let mut outcome = BulkOutcome::new(items.len());
        let mut handles = vec![ObjectHandle::NULL; items.len()];
        outcome.statuses = run_items(items.len(), mode, |i| {
            handles[i] = ctx.create_one(&items[i].attributes)?;
            Ok(())
        });
        outcome.handles = handles;
        outcome
    }

    fn remove(&self, ctx: &DispatchContext<'_>, items: &[BulkItem], mode: BulkOpErrorMode) -> BulkOutcome {
        if self.native_bulk {
            if let Some(outcome) = self.native_remove(ctx, items, mode) {
                return outcome;
            }
        }
        let mut outcome = BulkOutcome::new(items.len());
        outcome.statuses = run_items(items.len(), mode, |i| ctx.remove_one(items[i].handle));
        outcome
    }

    /// Native bulk create. `None` means the SDK has no native bulk create.
    fn native_create(&self, ctx: &DispatchContext<'_>, items: &[BulkItem], mode: BulkOpErrorMode) -> Option<BulkOutcome> {
        let mut outcome = BulkOutcome::new(items.len());
        let mut handles = vec![ObjectHandle::NULL; items.len()];

        let mut indices = Vec::with_capacity(items.len());
        let mut attr_lists = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match ctx.prepare_attrs(&item.attributes) {
                Ok(attrs) => {
                    indices.push(i);
                    attr_lists.push(attrs);
                }
                Err(e) => {
                    outcome.statuses[i] = e.status();
                    if mode == BulkOpErrorMode::StopOnError {
                        break;
                    }
                }
            }
        }

        if !attr_lists.is_empty() {
            match ctx
                .sdk
                .bulk_create(ctx.object_type, ctx.switch_native, &attr_lists, mode)
            {
                Err(SaiError::NotImplemented { .. }) => return None,
                Err(e) => {
                    warn!(object_type = %ctx.object_type, "SDK bulk create failed: {}", e);
                    for &i in &indices {
                        outcome.statuses[i] = e.status();
                    }
                }
                Ok(result)
                    if result.statuses.len() != indices.len()
                        || result.object_ids.len() != indices.len() =>
                {
                    warn!(
                        expected = indices.len(),
                        got = result.statuses.len(),
                        "SDK bulk create returned a short result"
                    );
                    for &i in &indices {
                        outcome.statuses[i] = SaiStatus::Failure;
                    }
                }
                Ok(result) => {
                    for (k, &i) in indices.iter().enumerate() {
                        outcome.statuses[i] = result.statuses[k];
                        if result.statuses[k].is_success() && result.object_ids[k] != NULL_OBJECT_ID {
                            match ctx.adopt(result.object_ids[k]) {
                                Ok(handle) => handles[i] = handle,
                                Err(e) => outcome.statuses[i] = e.status(),
                            }
                        }
                    }
                }
            }
        }

        if mode == BulkOpErrorMode::StopOnError {
            stop_after_first_failure(&mut outcome.statuses);
        }
        outcome.handles = handles;
        Some(outcome)
    }

    /// Native bulk remove. `None` means the SDK has no native bulk remove.
    fn native_remove(&self, ctx: &DispatchContext<'_>, items: &[BulkItem], mode: BulkOpErrorMode) -> Option<BulkOutcome> {
        let mut outcome = BulkOutcome::new(items.len());

        let mut targets = Vec::with_capacity(items.len());
        let mut natives = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match ctx.resolve_target(item.handle) {
                Ok(native) => {
                    targets.push(i);
                    natives.push(native);
                }
                Err(e) => {
                    outcome.statuses[i] = e.status();
                    if mode == BulkOpErrorMode::StopOnError {
                        break;
                    }
                }
            }
        }

        if !natives.is_empty() {
            match ctx.sdk.bulk_remove(ctx.object_type, &natives, mode) {
                Err(SaiError::NotImplemented { .. }) => return None,
                Err(e) => {
                    warn!(object_type = %ctx.object_type, "SDK bulk remove failed: {}", e);
                    for &i in &targets {
                        outcome.statuses[i] = e.status();
                    }
                }
                Ok(statuses) if statuses.len() != targets.len() => {
                    warn!(
                        expected = targets.len(),
                        got = statuses.len(),
                        "SDK bulk remove returned a short result"
                    );
                    for &i in &targets {
                        outcome.statuses[i] = SaiStatus::Failure;
                    }
                }
                Ok(statuses) => {
                    for (k, &i) in targets.iter().enumerate() {
                        outcome.statuses[i] = statuses[k];
                        if statuses[k].is_success() {
                            ctx.table.release(items[i].handle);
                        }
                    }
                }
            }
        }

        if mode == BulkOpErrorMode::StopOnError {
            stop_after_first_failure(&mut outcome.statuses);
        }
        Some(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::WireValue;
    use pretty_assertions::assert_eq;
    use sonic_sai::meta::{port_attr, switch_attr};
    use sonic_sai::types::{compose_object_id, object_index_of, switch_index_of};
    use sonic_sai::{AttrValue, ProfileMap, VirtualSwitch};
    use std::sync::Arc;

    struct Fixture {
        sdk: VirtualSwitch,
        table: IdentityTable,
        switch_native: RawSaiObjectId,
    }

    impl Fixture {
        fn new() -> Self {
            let sdk = VirtualSwitch::new();
            sdk.initialize(Arc::new(ProfileMap::new())).unwrap();
            let switch_native = sdk
                .create(
                    ObjectType::Switch,
                    NULL_OBJECT_ID,
                    &[Attribute::new(switch_attr::INIT_SWITCH, AttrValue::Bool(true))],
                )
                .unwrap();
            Self {
                sdk,
                table: IdentityTable::new(),
                switch_native,
            }
        }

        fn ctx(&self) -> DispatchContext<'_> {
            DispatchContext {
                sdk: &self.sdk,
                table: &self.table,
                object_type: ObjectType::Port,
                switch_native: self.switch_native,
            }
        }
    }

    fn port_item(lanes: Vec<u32>, speed: u32) -> BulkItem {
        BulkItem {
            attributes: vec![
                WireAttribute {
                    id: port_attr::HW_LANE_LIST,
                    value: WireValue::U32List {
                        count: lanes.len() as u32,
                        list: lanes,
                    },
                },
                WireAttribute {
                    id: port_attr::SPEED,
                    value: WireValue::U32 { value: speed },
                },
            ],
            ..BulkItem::default()
        }
    }

    fn handle_item(handle: ObjectHandle) -> BulkItem {
        BulkItem {
            handle,
            ..BulkItem::default()
        }
    }

    #[test]
    fn test_single_item_ignore_error() {
        for native in [false, true] {
            let fx = Fixture::new();
            let outcome = BulkDispatcher::new(native).dispatch(
                &fx.ctx(),
                Operation::Create,
                &[port_item(vec![1000, 1001, 1002, 1003], 1000)],
                BulkOpErrorMode::IgnoreError,
            );
            assert_eq!(outcome.statuses, vec![SaiStatus::Success]);
            assert_eq!(outcome.aggregate(), SaiStatus::Success);
            assert_eq!(fx.table.len(), 1);
        }
    }

    #[test]
    fn test_stop_on_error_marks_rest_not_executed() {
        for native in [false, true] {
            let fx = Fixture::new();
            let items = vec![
                port_item(vec![1], 1000),
                port_item(vec![1], 1000),
                port_item(vec![2], 1000),
                port_item(vec![3], 1000),
            ];
            let outcome = BulkDispatcher::new(native).dispatch(
                &fx.ctx(),
                Operation::Create,
                &items,
                BulkOpErrorMode::StopOnError,
            );
            assert_eq!(
                outcome.statuses,
                vec![
                    SaiStatus::Success,
                    SaiStatus::ItemAlreadyExists,
                    SaiStatus::NotExecuted,
                    SaiStatus::NotExecuted
                ]
            );
            assert_eq!(outcome.aggregate(), SaiStatus::Failure);
            assert!(!outcome.handles[0].is_null());
            assert!(outcome.handles[2].is_null());
            assert_eq!(fx.table.len(), 1);
        }
    }

    #[test]
    fn test_ignore_error_continues_past_failure() {
        for native in [false, true] {
            let fx = Fixture::new();
            let items = vec![
                port_item(vec![1], 1000),
                port_item(vec![1], 1000),
                port_item(vec![2], 1000),
            ];
            let outcome = BulkDispatcher::new(native).dispatch(
                &fx.ctx(),
                Operation::Create,
                &items,
                BulkOpErrorMode::IgnoreError,
            );
            assert_eq!(
                outcome.statuses,
                vec![SaiStatus::Success, SaiStatus::ItemAlreadyExists, SaiStatus::Success]
            );
            assert_eq!(outcome.aggregate(), SaiStatus::Failure);
            assert_eq!(fx.table.len(), 2);
        }
    }

    /// Claims the native id the switch will hand out next, so the table
    /// refuses the next created object.
    fn claim_next_native(fx: &Fixture) {
        let scratch_attrs = [
            Attribute::new(port_attr::HW_LANE_LIST, AttrValue::U32List(vec![900])),
            Attribute::new(port_attr::SPEED, AttrValue::U32(1000)),
        ];
        let last = fx
            .sdk
            .create(ObjectType::Port, fx.switch_native, &scratch_attrs)
            .unwrap();
        fx.sdk.remove(ObjectType::Port, last).unwrap();
        let next = compose_object_id(
            switch_index_of(last),
            ObjectType::Port,
            object_index_of(last) + 1,
        )
        .unwrap();
        fx.table.allocate(ObjectType::Port, next).unwrap();
    }

    #[test]
    fn test_created_object_without_handle_is_removed() {
        for native in [false, true] {
            let fx = Fixture::new();
            claim_next_native(&fx);
            let objects_before = fx.sdk.object_count();

            let outcome = BulkDispatcher::new(native).dispatch(
                &fx.ctx(),
                Operation::Create,
                &[port_item(vec![1], 1000)],
                BulkOpErrorMode::IgnoreError,
            );
            assert_eq!(outcome.statuses, vec![SaiStatus::ItemAlreadyExists]);
            assert!(outcome.handles[0].is_null());
            assert_eq!(fx.sdk.object_count(), objects_before);
            assert_eq!(fx.table.len(), 1);
        }
    }

    #[test]
    fn test_create_one_removes_object_the_table_refuses() {
        let fx = Fixture::new();
        claim_next_native(&fx);
        let objects_before = fx.sdk.object_count();

        let err = fx
            .ctx()
            .create_one(&port_item(vec![1], 1000).attributes)
            .unwrap_err();
        assert!(matches!(err, SyncdError::DuplicateAllocation(_)));
        assert_eq!(fx.sdk.object_count(), objects_before);

        // The lane is free again.
        fx.ctx()
            .create_one(&port_item(vec![1], 1000).attributes)
            .unwrap();
    }

    #[test]
    fn test_malformed_item_is_per_item_failure() {
        for native in [false, true] {
            let fx = Fixture::new();
            let mut bad = port_item(vec![5, 6], 1000);
            bad.attributes[0].value = WireValue::U32List {
                count: 3,
                list: vec![5, 6],
            };
            let items = vec![port_item(vec![1], 1000), bad, port_item(vec![2], 1000)];
            let outcome = BulkDispatcher::new(native).dispatch(
                &fx.ctx(),
                Operation::Create,
                &items,
                BulkOpErrorMode::IgnoreError,
            );
            assert_eq!(
                outcome.statuses,
                vec![SaiStatus::Success, SaiStatus::InvalidParameter, SaiStatus::Success]
            );
        }
    }

    #[test]
    fn test_remove_unknown_handle() {
        for native in [false, true] {
            let fx = Fixture::new();
            let dispatcher = BulkDispatcher::new(native);
            let created = dispatcher.dispatch(
                &fx.ctx(),
                Operation::Create,
                &[port_item(vec![9], 1000)],
                BulkOpErrorMode::StopOnError,
            );
            let port = created.handles[0];

            let items = vec![
                handle_item(ObjectHandle::from_raw(0x0100_0000_0000_0fff)),
                handle_item(port),
            ];
            let stop = dispatcher.dispatch(&fx.ctx(), Operation::Remove, &items, BulkOpErrorMode::StopOnError);
            assert_eq!(stop.statuses, vec![SaiStatus::ItemNotFound, SaiStatus::NotExecuted]);
            assert_eq!(fx.table.resolve(port).unwrap(), fx.ctx().resolve_target(port).unwrap());

            let ignore = dispatcher.dispatch(&fx.ctx(), Operation::Remove, &items, BulkOpErrorMode::IgnoreError);
            assert_eq!(ignore.statuses, vec![SaiStatus::ItemNotFound, SaiStatus::Success]);
            assert!(fx.table.resolve(port).is_err());
        }
    }

    #[test]
    fn test_bulk_set_and_get() {
        let fx = Fixture::new();
        let dispatcher = BulkDispatcher::new(false);
        let created = dispatcher.dispatch(
            &fx.ctx(),
            Operation::Create,
            &[port_item(vec![1], 1000), port_item(vec![2], 1000)],
            BulkOpErrorMode::StopOnError,
        );

        let set_items: Vec<BulkItem> = created
            .handles
            .iter()
            .map(|h| BulkItem {
                handle: *h,
                attributes: vec![WireAttribute {
                    id: port_attr::SPEED,
                    value: WireValue::U32 { value: 100_000 },
                }],
                ..BulkItem::default()
            })
            .collect();
        let set = dispatcher.dispatch(&fx.ctx(), Operation::Set, &set_items, BulkOpErrorMode::StopOnError);
        assert_eq!(set.aggregate(), SaiStatus::Success);

        let get_items: Vec<BulkItem> = created
            .handles
            .iter()
            .map(|h| BulkItem {
                handle: *h,
                attr_ids: vec![port_attr::SPEED],
                ..BulkItem::default()
            })
            .collect();
        let get = dispatcher.dispatch(&fx.ctx(), Operation::Get, &get_items, BulkOpErrorMode::StopOnError);
        assert_eq!(get.statuses, vec![SaiStatus::Success; 2]);
        assert_eq!(
            get.attributes[1],
            vec![WireAttribute {
                id: port_attr::SPEED,
                value: WireValue::U32 { value: 100_000 },
            }]
        );
    }

    #[test]
    fn test_outcome_response_shape() {
        let outcome = BulkOutcome {
            statuses: vec![SaiStatus::Success, SaiStatus::InvalidParameter],
            handles: vec![ObjectHandle::from_raw(1), ObjectHandle::NULL],
            attributes: Vec::new(),
        };
        let resp = outcome.into_response(42);
        assert_eq!(resp.sequence, 42);
        assert_eq!(resp.status, SaiStatus::Failure);
        assert_eq!(resp.object_statuses.len(), 2);
        assert_eq!(resp.handles.len(), 2);
    }
}
