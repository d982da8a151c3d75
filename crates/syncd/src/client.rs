//! Control-plane client.
//!
//! [`SaiClient`] speaks the channel protocol on behalf of an orchestration
//! agent. Object ids it hands out and accepts are daemon handles, never native
//! ids.
//!
//! In deferred-sync mode `set` and `remove` are written to the channel without
//! waiting; their statuses are collected by the next call that waits for a
//! response (or by [`SaiClient::flush`]). The first deferred failure is
//! returned from that call. At most one request channel's worth of deferred
//! requests is left unanswered; past that the oldest responses are collected
//! before the next request goes out.

use crate::channel::ClientEndpoint;
use crate::codec;
use crate::error::{Result, SyncdError};
use crate::identity::ObjectHandle;
use crate::lifecycle::CommunicationMode;
use crate::protocol::{
    BulkItem, NotificationFrame, Operation, Request, Response, ServerFrame, ShutdownKind,
};
use sonic_sai::meta::switch_attr;
use sonic_sai::profile::collect_entries;
use sonic_sai::{
    AttrId, AttrValue, Attribute, BulkOpErrorMode, ObjectType, ProfileService, SaiStatus,
};
use std::collections::VecDeque;
use tracing::debug;

/// Outcome of a bulk call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkReply {
    /// Aggregate status.
    pub status: SaiStatus,
    /// Per-item statuses in request order.
    pub statuses: Vec<SaiStatus>,
    /// Created handles (bulk create only); null for failed items.
    pub handles: Vec<ObjectHandle>,
}

pub struct SaiClient {
    endpoint: ClientEndpoint,
    next_sequence: u64,
    mode: CommunicationMode,
    max_outstanding: usize,
    /// Sequences of deferred requests whose responses are still outstanding.
    outstanding: VecDeque<u64>,
    deferred_error: Option<SyncdError>,
    notifications: VecDeque<NotificationFrame>,
}

impl SaiClient {
    pub fn new(endpoint: ClientEndpoint) -> Self {
        let max_outstanding = endpoint.requests.max_capacity();
        Self {
            endpoint,
            next_sequence: 1,
            mode: CommunicationMode::Sync,
            max_outstanding,
            outstanding: VecDeque::new(),
            deferred_error: None,
            notifications: VecDeque::new(),
        }
    }

    pub fn communication_mode(&self) -> CommunicationMode {
        self.mode
    }

    /// Hands the profile entries to the daemon ahead of switch create.
    pub async fn initialize(&mut self, profile: &dyn ProfileService) -> Result<()> {
        let mut request = self.request(Operation::Initialize, ObjectType::Null);
        request.profile = collect_entries(profile);
        self.call(request).await.map(|_| ())
    }

    /// Switches between sync and deferred-sync.
    pub async fn set_communication_mode(&mut self, mode: CommunicationMode) -> Result<()> {
        let attr = Attribute::new(switch_attr::COMMUNICATION_MODE, mode.as_attr());
        self.set_session_attr(attr).await?;
        self.mode = mode;
        Ok(())
    }

    /// Turns request recording on the daemon on or off.
    pub async fn set_record(&mut self, enabled: bool) -> Result<()> {
        let attr = Attribute::new(switch_attr::RECORD, AttrValue::Bool(enabled));
        self.set_session_attr(attr).await
    }

    async fn set_session_attr(&mut self, attr: Attribute) -> Result<()> {
        let mut request = self.request(Operation::Set, ObjectType::Switch);
        request.attributes = vec![codec::encode(&attr)];
        self.call(request).await.map(|_| ())
    }

    /// Creates the switch. `INIT_SWITCH` is added when missing.
    pub async fn create_switch(&mut self, attrs: &[Attribute]) -> Result<ObjectHandle> {
        let mut attrs = attrs.to_vec();
        if !attrs.iter().any(|a| a.id == switch_attr::INIT_SWITCH) {
            attrs.push(Attribute::new(switch_attr::INIT_SWITCH, AttrValue::Bool(true)));
        }
        self.create(ObjectType::Switch, ObjectHandle::NULL, &attrs).await
    }

    pub async fn create(
        &mut self,
        object_type: ObjectType,
        switch: ObjectHandle,
        attrs: &[Attribute],
    ) -> Result<ObjectHandle> {
        let mut request = self.request(Operation::Create, object_type);
        request.handle = switch;
        request.attributes = codec::encode_all(attrs);
        let response = self.call(request).await?;
        response
            .handles
            .first()
            .copied()
            .ok_or_else(|| SyncdError::Protocol("create response without handle".to_string()))
    }

    pub async fn remove(&mut self, object_type: ObjectType, handle: ObjectHandle) -> Result<()> {
        let mut request = self.request(Operation::Remove, object_type);
        request.handle = handle;
        self.call_or_defer(request).await
    }

    pub async fn set(
        &mut self,
        object_type: ObjectType,
        handle: ObjectHandle,
        attr: &Attribute,
    ) -> Result<()> {
        let mut request = self.request(Operation::Set, object_type);
        request.handle = handle;
        request.attributes = vec![codec::encode(attr)];
        self.call_or_defer(request).await
    }

    pub async fn get(
        &mut self,
        object_type: ObjectType,
        handle: ObjectHandle,
        attr_ids: &[AttrId],
    ) -> Result<Vec<Attribute>> {
        let mut request = self.request(Operation::Get, object_type);
        request.handle = handle;
        request.attr_ids = attr_ids.to_vec();
        let response = self.call(request).await?;
        codec::decode_all(object_type, &response.attributes)
    }

    pub async fn bulk_create(
        &mut self,
        object_type: ObjectType,
        switch: ObjectHandle,
        attrs: &[Vec<Attribute>],
        mode: BulkOpErrorMode,
    ) -> Result<BulkReply> {
        let items = attrs
            .iter()
            .map(|a| BulkItem {
                handle: switch,
                attributes: codec::encode_all(a),
                ..BulkItem::default()
            })
            .collect();
        self.bulk(Operation::Create, object_type, items, mode).await
    }

    pub async fn bulk_remove(
        &mut self,
        object_type: ObjectType,
        handles: &[ObjectHandle],
        mode: BulkOpErrorMode,
    ) -> Result<BulkReply> {
        let items = handles
            .iter()
            .map(|h| BulkItem {
                handle: *h,
                ..BulkItem::default()
            })
            .collect();
        self.bulk(Operation::Remove, object_type, items, mode).await
    }

    pub async fn bulk_set(
        &mut self,
        object_type: ObjectType,
        targets: &[(ObjectHandle, Attribute)],
        mode: BulkOpErrorMode,
    ) -> Result<BulkReply> {
        let items = targets
            .iter()
            .map(|(h, attr)| BulkItem {
                handle: *h,
                attributes: vec![codec::encode(attr)],
                ..BulkItem::default()
            })
            .collect();
        self.bulk(Operation::Set, object_type, items, mode).await
    }

    async fn bulk(
        &mut self,
        operation: Operation,
        object_type: ObjectType,
        items: Vec<BulkItem>,
        mode: BulkOpErrorMode,
    ) -> Result<BulkReply> {
        let mut request = self.request(operation, object_type);
        request.bulk = true;
        request.items = items;
        request.error_mode = mode;
        let response = self.call(request).await?;
        Ok(BulkReply {
            status: response.status,
            statuses: response.object_statuses,
            handles: response.handles,
        })
    }

    /// Waits for every deferred response.
    pub async fn flush(&mut self) -> Result<()> {
        while !self.outstanding.is_empty() {
            self.collect_oldest().await?;
        }
        match self.deferred_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Reads the response of the oldest deferred request. A failure is kept
    /// for the next waiting call.
    async fn collect_oldest(&mut self) -> Result<()> {
        let Some(sequence) = self.outstanding.front().copied() else {
            return Ok(());
        };
        let response = self.next_response().await?;
        if response.sequence != sequence {
            return Err(SyncdError::Protocol(format!(
                "expected response {}, got {}",
                sequence, response.sequence
            )));
        }
        self.outstanding.pop_front();
        if let Err(e) = response.into_result() {
            debug!(sequence, "deferred request failed: {}", e);
            self.deferred_error.get_or_insert(e);
        }
        Ok(())
    }

    /// Cold shutdown: the daemon releases every object and terminates.
    pub async fn uninitialize(&mut self) -> Result<()> {
        self.send_shutdown(ShutdownKind::Cold).await
    }

    /// Sends the shutdown signal and waits until the daemon has terminated.
    pub async fn send_shutdown(&mut self, kind: ShutdownKind) -> Result<()> {
        let mut request = self.request(Operation::Shutdown, ObjectType::Null);
        request.shutdown = kind;
        self.call(request).await.map(|_| ())
    }

    /// Notifications received so far.
    pub fn take_notifications(&mut self) -> Vec<NotificationFrame> {
        self.notifications.drain(..).collect()
    }

    /// Waits for the next notification.
    pub async fn next_notification(&mut self) -> Result<NotificationFrame> {
        if let Some(frame) = self.notifications.pop_front() {
            return Ok(frame);
        }
        match self.endpoint.frames.recv().await {
            Some(ServerFrame::Notification(frame)) => Ok(frame),
            Some(ServerFrame::Response(response)) => Err(SyncdError::Protocol(format!(
                "unexpected response {} while waiting for a notification",
                response.sequence
            ))),
            None => Err(SyncdError::ChannelClosed),
        }
    }

    fn request(&mut self, operation: Operation, object_type: ObjectType) -> Request {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        Request::new(sequence, operation, object_type)
    }

    async fn send(&mut self, request: Request) -> Result<()> {
        self.endpoint
            .requests
            .send(request)
            .await
            .map_err(|_| SyncdError::ChannelClosed)
    }

    async fn call_or_defer(&mut self, request: Request) -> Result<()> {
        if self.mode == CommunicationMode::DeferredSync && request.operation.is_deferrable() {
            while self.outstanding.len() >= self.max_outstanding {
                self.collect_oldest().await?;
            }
            let sequence = request.sequence;
            self.send(request).await?;
            self.outstanding.push_back(sequence);
            return Ok(());
        }
        self.call(request).await.map(|_| ())
    }

    /// Sends a request and waits for its response. Deferred responses ahead
    /// of it are collected first; a deferred failure wins over the result.
    async fn call(&mut self, request: Request) -> Result<Response> {
        let sequence = request.sequence;
        self.send(request).await?;
        let deferred = self.flush().await;

        let response = self.next_response().await?;
        if response.sequence != sequence {
            return Err(SyncdError::Protocol(format!(
                "expected response {}, got {}",
                sequence, response.sequence
            )));
        }
        deferred?;
        response.into_result()
    }

    async fn next_response(&mut self) -> Result<Response> {
        loop {
            match self.endpoint.frames.recv().await {
                Some(ServerFrame::Response(response)) => return Ok(response),
                Some(ServerFrame::Notification(frame)) => self.notifications.push_back(frame),
                None => return Err(SyncdError::ChannelClosed),
            }
        }
    }
}
