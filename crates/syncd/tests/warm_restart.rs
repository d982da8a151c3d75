//! Warm shutdown and warm start against the virtual switch.

mod common;

use common::{port_attrs, spawn, test_config};
use pretty_assertions::assert_eq;
use sonic_sai::meta::{port_attr, switch_attr};
use sonic_sai::{AttrValue, Attribute, BulkOpErrorMode, ObjectType, SaiStatus, VirtualSwitch};
use sonic_syncd::{
    BootMode, ObjectHandle, SessionEnd, SessionState, ShutdownKind, SyncdConfig, WarmRestartStore,
};
use std::sync::Arc;
use tempfile::TempDir;

struct FirstBoot {
    switch: ObjectHandle,
    ports: Vec<ObjectHandle>,
    cpu_port: ObjectHandle,
}

/// Cold boots, creates two ports and goes down warm.
async fn cold_boot_then_warm_shutdown(config: &SyncdConfig) -> FirstBoot {
    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), config.clone());
    let switch = client.create_switch(&[]).await.unwrap();

    let created = client
        .bulk_create(
            ObjectType::Port,
            switch,
            &[port_attrs(0), port_attrs(4)],
            BulkOpErrorMode::StopOnError,
        )
        .await
        .unwrap();
    assert_eq!(created.status, SaiStatus::Success);

    let cpu_port = client
        .get(ObjectType::Switch, switch, &[switch_attr::CPU_PORT])
        .await
        .unwrap()[0]
        .value
        .as_oid()
        .map(ObjectHandle::from_raw)
        .unwrap();

    client.send_shutdown(ShutdownKind::Warm).await.unwrap();
    let (_, result) = harness.daemon.await.unwrap();
    assert_eq!(result.unwrap(), SessionEnd::Terminated);

    FirstBoot {
        switch,
        ports: created.handles,
        cpu_port,
    }
}

#[tokio::test]
async fn test_handles_survive_warm_restart() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let first = cold_boot_then_warm_shutdown(&config).await;

    let store = WarmRestartStore::new(&config.warm_restart_file);
    assert!(store.exists());
    assert_eq!(store.load().unwrap().table.entries.len(), 4);

    // Fresh SDK instance, as after a process restart.
    let warm = SyncdConfig {
        start_type: BootMode::Warm,
        ..config.clone()
    };
    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), warm);
    let switch = client.create_switch(&[]).await.unwrap();
    assert_eq!(switch, first.switch);

    // Pre-restart handles resolve without being re-created.
    for port in &first.ports {
        let attrs = client
            .get(ObjectType::Port, *port, &[port_attr::SPEED])
            .await
            .unwrap();
        assert_eq!(attrs[0].value, AttrValue::U32(10_000));
    }
    let cpu = client
        .get(ObjectType::Switch, switch, &[switch_attr::CPU_PORT])
        .await
        .unwrap();
    assert_eq!(cpu[0].value, AttrValue::Oid(first.cpu_port.as_raw()));

    // New handles never collide with restored ones.
    let port = client
        .create(ObjectType::Port, switch, &port_attrs(8))
        .await
        .unwrap();
    assert!(!first.ports.contains(&port));
    assert!(port > first.ports[1]);

    // The state file is consumed by a successful warm start.
    assert!(!store.exists());

    client.uninitialize().await.unwrap();
    harness.daemon.await.unwrap().1.unwrap();
}

#[tokio::test]
async fn test_boot_type_attribute_selects_warm_start() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let first = cold_boot_then_warm_shutdown(&config).await;

    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), config);
    let switch = client
        .create_switch(&[Attribute::new(switch_attr::BOOT_TYPE, AttrValue::S32(1))])
        .await
        .unwrap();
    assert_eq!(switch, first.switch);

    client.uninitialize().await.unwrap();
    harness.daemon.await.unwrap().1.unwrap();
}

#[tokio::test]
async fn test_invalid_boot_type_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), test_config(&dir));

    let err = client
        .create_switch(&[Attribute::new(switch_attr::BOOT_TYPE, AttrValue::S32(7))])
        .await
        .unwrap_err();
    assert_eq!(err.status(), SaiStatus::InvalidParameter);

    drop(client);
    let (adapter, result) = harness.daemon.await.unwrap();
    assert_eq!(result.unwrap(), SessionEnd::Disconnected);
    assert_eq!(adapter.syncd().state(), SessionState::Terminated);
}

#[tokio::test]
async fn test_warm_start_without_saved_state_fails() {
    let dir = TempDir::new().unwrap();
    let config = SyncdConfig {
        start_type: BootMode::Warm,
        ..test_config(&dir)
    };
    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), config);

    let err = client.create_switch(&[]).await.unwrap_err();
    assert_eq!(err.status(), SaiStatus::Failure);

    drop(client);
    let (adapter, result) = harness.daemon.await.unwrap();
    assert_eq!(result.unwrap(), SessionEnd::Disconnected);
    assert!(adapter.syncd().table().is_empty());
}

#[tokio::test]
async fn test_mismatched_saved_entry_fails_reconciliation() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let first = cold_boot_then_warm_shutdown(&config).await;

    // Claim one of the ports was a queue.
    let store = WarmRestartStore::new(&config.warm_restart_file);
    let mut persisted = store.load().unwrap();
    let entry = persisted
        .table
        .entries
        .iter_mut()
        .find(|e| e.handle == first.ports[0])
        .unwrap();
    entry.object_type = ObjectType::Queue;
    store.save(persisted.switch_native, persisted.table).unwrap();

    let warm = SyncdConfig {
        start_type: BootMode::Warm,
        ..config
    };
    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), warm);
    let err = client.create_switch(&[]).await.unwrap_err();
    assert_eq!(err.status(), SaiStatus::Failure);

    // Nothing half-restored, and the state file is kept for inspection.
    drop(client);
    let (adapter, result) = harness.daemon.await.unwrap();
    assert_eq!(result.unwrap(), SessionEnd::Disconnected);
    assert!(adapter.syncd().table().is_empty());
    assert!(store.exists());
}

#[tokio::test]
async fn test_cold_start_discards_stale_state() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    cold_boot_then_warm_shutdown(&config).await;

    let store = WarmRestartStore::new(&config.warm_restart_file);
    assert!(store.exists());

    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), config);
    client.create_switch(&[]).await.unwrap();
    assert!(!store.exists());

    client.uninitialize().await.unwrap();
    harness.daemon.await.unwrap().1.unwrap();
}

#[tokio::test]
async fn test_warm_shutdown_reports_sdk_save_failure() {
    let dir = TempDir::new().unwrap();
    let config = SyncdConfig {
        sdk_warm_boot_file: dir.path().join("missing-dir").join("sai.json"),
        ..test_config(&dir)
    };
    let (mut client, harness) = spawn(Arc::new(VirtualSwitch::new()), config.clone());
    let switch = client.create_switch(&[]).await.unwrap();
    client
        .create(ObjectType::Port, switch, &port_attrs(0))
        .await
        .unwrap();

    let err = client.send_shutdown(ShutdownKind::Warm).await.unwrap_err();
    assert_eq!(err.status(), SaiStatus::Failure);
    assert!(!config.sdk_warm_boot_file.exists());
    assert!(!config.warm_restart_file.exists());

    let (adapter, result) = harness.daemon.await.unwrap();
    assert_eq!(result.unwrap(), SessionEnd::Terminated);
    assert_eq!(adapter.syncd().state(), SessionState::Terminated);
    assert!(adapter.syncd().table().is_empty());
}
