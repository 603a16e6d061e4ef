// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the push transport using mockforge-mqtt.

use std::sync::Arc;
use std::time::Duration;

use mockforge_mqtt::broker::MqttConfig;
use mockforge_mqtt::start_mqtt_server;
use openwb_bridge::dispatch::{SyncState, UpdateDispatcher};
use openwb_bridge::event::{BridgeEvent, EventBus};
use openwb_bridge::state::NotifyPolicy;
use openwb_bridge::types::{DeviceInstance, DeviceKind, Transport};
use openwb_bridge::{Bridge, InstanceConfig, MqttBroker};
use tokio::time::sleep;

/// Helper to find an available port for testing.
fn get_test_port() -> u16 {
    use std::sync::atomic::{AtomicU16, Ordering};
    static PORT_COUNTER: AtomicU16 = AtomicU16::new(18850);
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Starts a mock MQTT broker on the given port.
async fn start_mock_broker(port: u16) {
    let config = MqttConfig {
        port,
        host: "127.0.0.1".to_string(),
        ..Default::default()
    };

    tokio::spawn(async move {
        let _ = start_mqtt_server(config).await;
    });

    sleep(Duration::from_millis(500)).await;
}

async fn connect_broker() -> MqttBroker {
    let port = get_test_port();
    start_mock_broker(port).await;

    MqttBroker::builder()
        .host("127.0.0.1")
        .port(port)
        .build()
        .await
        .expect("broker connection")
}

fn dispatcher(kind: DeviceKind, id: u32) -> Arc<UpdateDispatcher> {
    Arc::new(UpdateDispatcher::new(
        DeviceInstance::new(kind, id, "openWB"),
        Transport::Mqtt,
        NotifyPolicy::Always,
        EventBus::new(),
    ))
}

// ============================================================================
// MqttBroker Tests
// ============================================================================

mod broker {
    use super::*;

    #[tokio::test]
    async fn connect_to_broker() {
        let broker = connect_broker().await;

        assert!(broker.is_connected());
        assert_eq!(broker.host(), "127.0.0.1");
        assert!(!broker.has_credentials());
    }

    #[tokio::test]
    async fn bind_subscribes_once_per_address() {
        let broker = connect_broker().await;

        let first = dispatcher(DeviceKind::Counter, 0);
        let subscribed = broker.bind(&first).await.unwrap();
        assert!(subscribed > 0);
        assert_eq!(first.sync_state(), SyncState::Syncing);
        let addresses = broker.router().address_count();

        let second = dispatcher(DeviceKind::Counter, 0);
        assert_eq!(broker.bind(&second).await.unwrap(), 0);
        assert_eq!(broker.router().address_count(), addresses);

        broker.unbind(&first).await;
        assert_eq!(broker.router().address_count(), addresses);

        broker.unbind(&second).await;
        assert_eq!(broker.router().address_count(), 0);
    }

    #[tokio::test]
    async fn publish_write() {
        let broker = connect_broker().await;

        let result = broker
            .publish("openWB/set/chargepoint/4/set/manual_lock", "true")
            .await;
        assert!(result.is_ok(), "publish failed: {:?}", result.err());
    }

    #[tokio::test]
    async fn publish_after_disconnect_fails() {
        let broker = connect_broker().await;
        broker.disconnect().await.unwrap();

        assert!(!broker.is_connected());
        assert!(broker.publish("openWB/set/test", "1").await.is_err());
    }
}

// ============================================================================
// Bridge Tests
// ============================================================================

mod bridge {
    use super::*;

    #[tokio::test]
    async fn connect_and_disconnect_instance() {
        let broker = connect_broker().await;
        let bridge = Bridge::with_broker(broker.clone());
        let mut events = bridge.subscribe();

        let cp = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4))
            .await
            .unwrap();
        bridge.connect(&cp).await.unwrap();

        assert!(bridge.is_connected(&cp).await);
        assert_eq!(bridge.sync_state(&cp).await.unwrap(), SyncState::Syncing);
        assert!(broker.router().address_count() > 0);

        let mut saw_connected = false;
        while let Ok(event) = events.try_recv() {
            if let BridgeEvent::ConnectionChanged { connected: true, .. } = event {
                saw_connected = true;
            }
        }
        assert!(saw_connected);

        bridge.disconnect(&cp).await.unwrap();
        assert!(!bridge.is_connected(&cp).await);
        assert_eq!(broker.router().address_count(), 0);
    }

    #[tokio::test]
    async fn concurrent_connects_bind_once() {
        let broker = connect_broker().await;
        let bridge = Bridge::with_broker(broker.clone());
        let mut events = bridge.subscribe();

        let cp = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4))
            .await
            .unwrap();
        let (first, second) = tokio::join!(bridge.connect(&cp), bridge.connect(&cp));
        first.unwrap();
        second.unwrap();

        let mut connected = 0;
        while let Ok(event) = events.try_recv() {
            if let BridgeEvent::ConnectionChanged { connected: true, .. } = event {
                connected += 1;
            }
        }
        assert_eq!(connected, 1);

        bridge.disconnect(&cp).await.unwrap();
        assert!(!bridge.is_connected(&cp).await);
        assert_eq!(broker.router().address_count(), 0);
    }

    #[tokio::test]
    async fn write_publishes_on_push_instance() {
        let broker = connect_broker().await;
        let bridge = Bridge::with_broker(broker);

        let cp = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::ChargePoint, 4))
            .await
            .unwrap();
        bridge.connect(&cp).await.unwrap();

        bridge.write(&cp, "manual_lock", true).await.unwrap();
    }

    #[tokio::test]
    async fn remove_unbinds_instance() {
        let broker = connect_broker().await;
        let bridge = Bridge::with_broker(broker.clone());

        let counter = bridge
            .add_instance(InstanceConfig::mqtt(DeviceKind::Counter, 0))
            .await
            .unwrap();
        bridge.connect(&counter).await.unwrap();
        assert!(broker.router().address_count() > 0);

        assert!(bridge.remove_instance(&counter).await);
        assert_eq!(broker.router().address_count(), 0);
        assert_eq!(bridge.instance_count().await, 0);
    }
}
