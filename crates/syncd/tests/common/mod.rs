//! Shared helpers for syncd integration tests.

#![allow(dead_code)]

use sonic_sai::meta::port_attr;
use sonic_sai::{AttrValue, Attribute, VendorSai};
use sonic_syncd::{
    duplex, ChannelAdapter, ClientEndpoint, Result, SaiClient, SessionEnd, ShutdownHandle, Syncd,
    SyncdConfig,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::task::JoinHandle;

pub type DaemonTask = JoinHandle<(ChannelAdapter, Result<SessionEnd>)>;

/// A daemon session running in the background.
pub struct Harness {
    pub daemon: DaemonTask,
    pub shutdown: ShutdownHandle,
}

/// Spawns a session and returns the raw client endpoint.
pub fn spawn_raw(sdk: Arc<dyn VendorSai>, config: SyncdConfig) -> (ClientEndpoint, Harness) {
    let (client, server) = duplex(config.channel_capacity);
    let syncd = Syncd::new(sdk, config, server.outbound.clone()).unwrap();
    let shutdown = ShutdownHandle::new();
    let mut adapter = ChannelAdapter::new(syncd, server, shutdown.clone());
    let daemon = tokio::spawn(async move {
        let result = adapter.run().await;
        (adapter, result)
    });
    (client, Harness { daemon, shutdown })
}

/// Spawns a session and wraps the endpoint in a client.
pub fn spawn(sdk: Arc<dyn VendorSai>, config: SyncdConfig) -> (SaiClient, Harness) {
    let (endpoint, harness) = spawn_raw(sdk, config);
    (SaiClient::new(endpoint), harness)
}

/// Configuration with every state file inside `dir`.
pub fn test_config(dir: &TempDir) -> SyncdConfig {
    SyncdConfig {
        warm_restart_file: dir.path().join("syncd").join("identity_table.json"),
        sdk_warm_boot_file: dir.path().join("sai-warmboot.json"),
        socket_path: dir.path().join("syncd.sock"),
        ..SyncdConfig::default()
    }
}

/// Four-lane 10G port starting at `first_lane`.
pub fn port_attrs(first_lane: u32) -> Vec<Attribute> {
    vec![
        Attribute::new(
            port_attr::HW_LANE_LIST,
            AttrValue::U32List((first_lane..first_lane + 4).collect()),
        ),
        Attribute::new(port_attr::SPEED, AttrValue::U32(10_000)),
    ]
}
