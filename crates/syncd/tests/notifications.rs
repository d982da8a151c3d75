//! Hardware events relayed to the client.

mod common;

use common::{port_attrs, spawn, test_config};
use pretty_assertions::assert_eq;
use sonic_sai::meta::port_attr;
use sonic_sai::{AttrValue, Attribute, ObjectType, PortOperStatus, SaiNotification, VirtualSwitch};
use sonic_syncd::{IdentityTable, NotificationRelay, RelayCounters, ServerFrame};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn port_up(port_id: u64) -> SaiNotification {
    SaiNotification::PortStateChange {
        port_id,
        status: PortOperStatus::Up,
    }
}

#[tokio::test]
async fn test_overflow_drops_oldest_events() {
    let table = Arc::new(IdentityTable::new());
    let ports: Vec<_> = (1..=5)
        .map(|i| table.allocate(ObjectType::Port, 0x100 + i).unwrap())
        .collect();
    let (tx, mut rx) = mpsc::channel(16);
    let relay = NotificationRelay::start(2, Arc::clone(&table), tx);

    // The publisher task cannot run before the first await on this runtime.
    let handler = relay.handler();
    for i in 1..=5 {
        handler.on_notification(port_up(0x100 + i));
    }
    assert_eq!(relay.pending(), 2);

    let counters = relay.stop().await;
    assert_eq!(
        counters,
        RelayCounters {
            published: 2,
            dropped: 3,
            orphaned: 0,
        }
    );

    let mut delivered = Vec::new();
    while let Ok(ServerFrame::Notification(frame)) = rx.try_recv() {
        delivered.push(frame.event);
    }
    assert_eq!(
        delivered,
        vec![port_up(ports[3].as_raw()), port_up(ports[4].as_raw())]
    );
}

#[tokio::test]
async fn test_port_admin_state_change_reaches_client() {
    let dir = TempDir::new().unwrap();
    let sdk = Arc::new(VirtualSwitch::new());
    let (mut client, harness) = spawn(sdk.clone(), test_config(&dir));
    let switch = client.create_switch(&[]).await.unwrap();
    let port = client
        .create(ObjectType::Port, switch, &port_attrs(0))
        .await
        .unwrap();

    client
        .set(
            ObjectType::Port,
            port,
            &Attribute::new(port_attr::ADMIN_STATE, AttrValue::Bool(true)),
        )
        .await
        .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), client.next_notification())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.name, "port_state_change");
    assert_eq!(frame.event, port_up(port.as_raw()));

    client.uninitialize().await.unwrap();
    let (adapter, result) = harness.daemon.await.unwrap();
    result.unwrap();
    assert_eq!(adapter.syncd().relay_counters().published, 1);
}

#[tokio::test]
async fn test_event_for_unknown_object_is_dropped() {
    let dir = TempDir::new().unwrap();
    let sdk = Arc::new(VirtualSwitch::new());
    let (mut client, harness) = spawn(sdk.clone(), test_config(&dir));
    let switch = client.create_switch(&[]).await.unwrap();
    let port = client
        .create(ObjectType::Port, switch, &port_attrs(0))
        .await
        .unwrap();

    // Events are delivered in order, so once the second one arrives the
    // first has been handled.
    sdk.emit_notification(port_up(0x0100_0000_dead_beef));
    client
        .set(
            ObjectType::Port,
            port,
            &Attribute::new(port_attr::ADMIN_STATE, AttrValue::Bool(true)),
        )
        .await
        .unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), client.next_notification())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame.event, port_up(port.as_raw()));
    assert!(client.take_notifications().is_empty());

    client.uninitialize().await.unwrap();
    let (adapter, result) = harness.daemon.await.unwrap();
    result.unwrap();
    assert_eq!(
        adapter.syncd().relay_counters(),
        RelayCounters {
            published: 1,
            dropped: 0,
            orphaned: 1,
        }
    );
}

#[tokio::test]
async fn test_events_after_shutdown_are_not_published() {
    let dir = TempDir::new().unwrap();
    let sdk = Arc::new(VirtualSwitch::new());
    let (mut client, harness) = spawn(sdk.clone(), test_config(&dir));
    client.create_switch(&[]).await.unwrap();
    client.uninitialize().await.unwrap();

    sdk.emit_notification(port_up(0x0100_0000_0000_0001));
    let (adapter, result) = harness.daemon.await.unwrap();
    result.unwrap();
    assert_eq!(adapter.syncd().relay_counters().published, 0);
    assert!(client.take_notifications().is_empty());
}
