//! Shutdown signal arriving while a bulk request is being executed.

mod common;

use common::{port_attrs, spawn_raw, test_config};
use pretty_assertions::assert_eq;
use sonic_sai::{
    AttrId, Attribute, BulkOpErrorMode, NotificationHandler, ObjectType, ProfileService,
    RawSaiObjectId, SaiResult, SaiStatus, VendorSai, VirtualSwitch,
};
use sonic_syncd::codec;
use sonic_syncd::{BulkItem, Operation, Request, ServerFrame, SessionEnd, SessionState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Virtual switch whose first port create blocks until released.
struct GatedSwitch {
    inner: VirtualSwitch,
    armed: AtomicBool,
    entered: Mutex<mpsc::Sender<()>>,
    release: Mutex<mpsc::Receiver<()>>,
}

impl VendorSai for GatedSwitch {
    fn initialize(&self, profile: Arc<dyn ProfileService>) -> SaiResult<()> {
        self.inner.initialize(profile)
    }

    fn uninitialize(&self) -> SaiResult<()> {
        self.inner.uninitialize()
    }

    fn create(
        &self,
        object_type: ObjectType,
        switch_id: RawSaiObjectId,
        attrs: &[Attribute],
    ) -> SaiResult<RawSaiObjectId> {
        if object_type == ObjectType::Port && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(10))
                .unwrap();
        }
        self.inner.create(object_type, switch_id, attrs)
    }

    fn remove(&self, object_type: ObjectType, object_id: RawSaiObjectId) -> SaiResult<()> {
        self.inner.remove(object_type, object_id)
    }

    fn set(&self, object_type: ObjectType, object_id: RawSaiObjectId, attr: &Attribute) -> SaiResult<()> {
        self.inner.set(object_type, object_id, attr)
    }

    fn get(
        &self,
        object_type: ObjectType,
        object_id: RawSaiObjectId,
        attr_ids: &[AttrId],
    ) -> SaiResult<Vec<Attribute>> {
        self.inner.get(object_type, object_id, attr_ids)
    }

    fn object_type_query(&self, object_id: RawSaiObjectId) -> ObjectType {
        self.inner.object_type_query(object_id)
    }

    fn register_notification_handler(&self, handler: Option<Arc<dyn NotificationHandler>>) {
        self.inner.register_notification_handler(handler)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_in_flight_bulk_completes_before_termination() {
    let dir = TempDir::new().unwrap();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let sdk = Arc::new(GatedSwitch {
        inner: VirtualSwitch::new(),
        armed: AtomicBool::new(false),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });

    let (mut endpoint, harness) = spawn_raw(sdk.clone(), test_config(&dir));

    let mut create_switch = Request::new(1, Operation::Create, ObjectType::Switch);
    create_switch.attributes = vec![codec::encode(&Attribute::new(
        sonic_sai::meta::switch_attr::INIT_SWITCH,
        sonic_sai::AttrValue::Bool(true),
    ))];
    endpoint.requests.send(create_switch).await.unwrap();
    let switch = match endpoint.frames.recv().await.unwrap() {
        ServerFrame::Response(r) => r.handles[0],
        other => panic!("unexpected frame {:?}", other),
    };

    sdk.armed.store(true, Ordering::SeqCst);
    let mut bulk = Request::new(2, Operation::Create, ObjectType::Port);
    bulk.bulk = true;
    bulk.error_mode = BulkOpErrorMode::IgnoreError;
    bulk.items = [0, 4, 8]
        .iter()
        .map(|lane| BulkItem {
            handle: switch,
            attributes: codec::encode_all(&port_attrs(*lane)),
            ..BulkItem::default()
        })
        .collect();
    endpoint.requests.send(bulk).await.unwrap();

    // Wait until the SDK is inside the first create, then signal shutdown.
    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(10)))
        .await
        .unwrap()
        .unwrap();
    harness.shutdown.trigger();
    release_tx.send(()).unwrap();

    let response = match endpoint.frames.recv().await.unwrap() {
        ServerFrame::Response(r) => r,
        other => panic!("unexpected frame {:?}", other),
    };
    assert_eq!(response.sequence, 2);
    assert_eq!(response.status, SaiStatus::Success);
    assert_eq!(response.object_statuses, vec![SaiStatus::Success; 3]);
    assert!(response.handles.iter().all(|h| !h.is_null()));

    let (adapter, result) = harness.daemon.await.unwrap();
    assert_eq!(result.unwrap(), SessionEnd::Terminated);
    assert_eq!(adapter.syncd().state(), SessionState::Terminated);
    assert!(adapter.syncd().table().is_empty());

    // Nothing further is answered once the session is gone.
    drop(adapter);
    assert!(endpoint.frames.recv().await.is_none());
}
