//! Notification relay.
//!
//! The SDK calls [`NotificationHandler::on_notification`] from its own event
//! thread. The handler only timestamps the event and pushes it onto a bounded
//! queue, so it never blocks. A tokio task drains the queue, translates
//! native ids to client handles through the identity table's read path, and
//! publishes the result on the channel.
//!
//! ## Delivery contract
//!
//! - **Queue size**: configurable (`notification_queue_capacity`)
//! - **Drop policy**: oldest-first when the queue is full, counted in `dropped`
//! - **Backpressure**: none towards the SDK
//! - **Orphans**: events naming an object with no handle (already removed, or
//!   never known) are dropped and counted in `orphaned`

use crate::codec;
use crate::identity::{IdentityTable, ObjectHandle};
use crate::protocol::ServerFrame;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sonic_sai::{NotificationHandler, SaiNotification};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Pending {
    received_at: DateTime<Utc>,
    event: SaiNotification,
}

#[derive(Debug, Default)]
struct RelayStats {
    published: AtomicU64,
    dropped: AtomicU64,
    orphaned: AtomicU64,
}

/// Relay counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RelayCounters {
    /// Events written to the channel
    pub published: u64,
    /// Events evicted by queue overflow, or lost because the channel was gone
    pub dropped: u64,
    /// Events whose objects had no handle
    pub orphaned: u64,
}

#[derive(Debug)]
struct EventQueue {
    events: Mutex<VecDeque<Pending>>,
    capacity: usize,
    closed: AtomicBool,
    wake: Notify,
    stats: RelayStats,
}

impl EventQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            closed: AtomicBool::new(false),
            wake: Notify::new(),
            stats: RelayStats::default(),
        }
    }

    /// Queues an event, evicting the oldest one when full.
    fn push(&self, event: SaiNotification) {
        if self.capacity == 0 {
            self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        {
            let mut events = self.events.lock();
            if events.len() >= self.capacity {
                if let Some(evicted) = events.pop_front() {
                    debug!(event = evicted.event.name(), "notification queue full, dropping oldest");
                }
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
            }
            events.push_back(Pending {
                received_at: Utc::now(),
                event,
            });
        }
        self.wake.notify_one();
    }

    fn pop(&self) -> Option<Pending> {
        self.events.lock().pop_front()
    }

    fn len(&self) -> usize {
        self.events.lock().len()
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn counters(&self) -> RelayCounters {
        RelayCounters {
            published: self.stats.published.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            orphaned: self.stats.orphaned.load(Ordering::Relaxed),
        }
    }
}

/// The callback surface handed to the SDK.
struct QueueHandler(Arc<EventQueue>);

impl NotificationHandler for QueueHandler {
    fn on_notification(&self, notification: SaiNotification) {
        self.0.push(notification);
    }
}

/// Publishes SDK events to the channel from an independent task.
pub struct NotificationRelay {
    queue: Arc<EventQueue>,
    task: JoinHandle<()>,
}

impl NotificationRelay {
    /// Spawns the publisher task. Must be called from within a tokio runtime.
    pub fn start(capacity: usize, table: Arc<IdentityTable>, sink: mpsc::Sender<ServerFrame>) -> Self {
        let queue = Arc::new(EventQueue::new(capacity));
        let task = tokio::spawn(publish_loop(Arc::clone(&queue), table, sink));
        Self { queue, task }
    }

    /// Handler to register with the SDK.
    pub fn handler(&self) -> Arc<dyn NotificationHandler> {
        Arc::new(QueueHandler(Arc::clone(&self.queue)))
    }

    pub fn counters(&self) -> RelayCounters {
        self.queue.counters()
    }

    /// Events waiting to be published.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Publishes whatever is still queued, then stops the task.
    pub async fn stop(self) -> RelayCounters {
        self.queue.close();
        if let Err(e) = self.task.await {
            warn!("notification relay task failed: {}", e);
        }
        self.queue.counters()
    }
}

async fn publish_loop(queue: Arc<EventQueue>, table: Arc<IdentityTable>, sink: mpsc::Sender<ServerFrame>) {
    loop {
        let Some(pending) = queue.pop() else {
            if queue.is_closed() {
                if queue.len() == 0 {
                    break;
                }
                continue;
            }
            queue.wake.notified().await;
            continue;
        };

        let translated = pending.event.map_object_ids(|native| {
            table
                .lookup_native(native)
                .map(ObjectHandle::as_raw)
                .ok_or(native)
        });
        let event = match translated {
            Ok(event) => event,
            Err(native) => {
                queue.stats.orphaned.fetch_add(1, Ordering::Relaxed);
                debug!(
                    event = pending.event.name(),
                    native = format_args!("0x{:016x}", native),
                    "dropping notification for unknown object"
                );
                continue;
            }
        };

        let frame = codec::encode_notification(event, pending.received_at);
        if sink.send(ServerFrame::Notification(frame)).await.is_ok() {
            queue.stats.published.fetch_add(1, Ordering::Relaxed);
        } else {
            queue.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
    debug!("notification relay stopped");
}
