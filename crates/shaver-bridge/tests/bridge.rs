//! Bridge behaviour against the mock transport.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::time::{Instant, timeout};

use shaver_bridge::{Bridge, BridgeError, Config, DeviceConfig, DeviceEntities, wait_until_live};
use shaver_core::{MockTransport, ShavingMode, uuids};

const WAIT: Duration = Duration::from_secs(3600);

fn config_for(transports: &[&MockTransport]) -> Config {
    Config {
        devices: transports
            .iter()
            .map(|t| DeviceConfig::new(t.address()))
            .collect(),
        ..Config::default()
    }
}

async fn next_matching<F>(
    updates: &mut tokio::sync::mpsc::Receiver<DeviceEntities>,
    mut matches: F,
) -> DeviceEntities
where
    F: FnMut(&DeviceEntities) -> bool,
{
    timeout(WAIT, async {
        loop {
            let entities = updates.recv().await.expect("publisher stopped");
            if matches(&entities) {
                return entities;
            }
        }
    })
    .await
    .expect("timed out waiting for entities")
}

#[tokio::test(start_paused = true)]
async fn test_publishes_entities_from_live_session() {
    let transport = MockTransport::new();
    let bridge = Bridge::new(&config_for(&[&transport]), Arc::new(transport.clone())).unwrap();

    let mut updates = bridge.publish().await;
    // Nothing read yet
    let first = next_matching(&mut updates, |_| true).await;
    assert!(!first.available);
    assert_eq!(first.get("battery").unwrap().value, None);

    bridge.start().await;
    let live = next_matching(&mut updates, |e| {
        e.get("device_state").is_some_and(|s| s.value.is_some())
    })
    .await;
    assert!(live.available);
    assert_eq!(live.get("battery").unwrap().value, Some(json!(85)));
    assert_eq!(live.get("device_state").unwrap().value, Some(json!("off")));
    assert_eq!(live.get("charging").unwrap().value, Some(json!(false)));
    assert_eq!(live.device.model, "XP9201");
    assert!(live.updated_at.is_some());
    // Default mock capabilities include the light ring and pressure
    assert!(live.get("light_ring_ok").is_some());
    assert!(live.get("pressure").is_some());
    assert!(live.get("cleaning_progress").is_none());

    bridge.shutdown().await;
    // Publisher tasks are gone, so the stream ends after anything buffered
    timeout(WAIT, async { while updates.recv().await.is_some() {} })
        .await
        .expect("stream did not end");
}

#[tokio::test(start_paused = true)]
async fn test_notification_republishes() {
    let transport = MockTransport::new();
    let bridge = Bridge::new(&config_for(&[&transport]), Arc::new(transport.clone())).unwrap();
    let mut updates = bridge.publish().await;
    bridge.start().await;

    let coordinator = &bridge.device(None).unwrap().coordinator;
    wait_until_live(coordinator, WAIT).await.unwrap();

    assert!(transport.notify(uuids::BATTERY_LEVEL, &[40]).await);
    let updated = next_matching(&mut updates, |e| {
        e.get("battery").is_some_and(|b| b.value == Some(json!(40)))
    })
    .await;
    assert_eq!(
        updated.get("battery").unwrap().icon.as_deref(),
        Some("mdi:battery-40")
    );

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_shaving_mode_write_updates_select() {
    let transport = MockTransport::new();
    let bridge = Bridge::new(&config_for(&[&transport]), Arc::new(transport.clone())).unwrap();
    let mut updates = bridge.publish().await;
    bridge.start().await;

    let device = bridge.device(None).unwrap();
    wait_until_live(&device.coordinator, WAIT).await.unwrap();
    device
        .coordinator
        .set_shaving_mode(ShavingMode::Foam)
        .await
        .unwrap();

    let entities = next_matching(&mut updates, |e| {
        e.get("shaving_mode").is_some_and(|m| m.value == Some(json!("foam")))
    })
    .await;
    assert!(entities.available);
    assert_eq!(
        transport.writes().await.last(),
        Some(&(uuids::SHAVING_MODE, vec![0x04]))
    );

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stale_device_published_unavailable() {
    let transport = MockTransport::new();
    let mut config = config_for(&[&transport]);
    config.devices[0].enable_live_updates = false;
    let bridge = Bridge::new(&config, Arc::new(transport.clone())).unwrap();
    let mut updates = bridge.publish().await;
    bridge.start().await;

    let fresh = next_matching(&mut updates, |e| e.available).await;
    assert_eq!(fresh.get("battery").unwrap().value, Some(json!(85)));
    let polled_at = Instant::now();

    // Every later poll is skipped, so neither the snapshot nor the link
    // state changes again.
    transport.set_observable(false);
    let stale = next_matching(&mut updates, |e| !e.available).await;
    assert!(polled_at.elapsed() >= Duration::from_secs(300));
    assert!(polled_at.elapsed() < Duration::from_secs(360));
    assert_eq!(stale.get("battery").unwrap().value, Some(json!(85)));

    bridge.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_wait_until_live_times_out_out_of_range() {
    let transport = MockTransport::builder().observable(false).build();
    let bridge = Bridge::new(&config_for(&[&transport]), Arc::new(transport.clone())).unwrap();
    bridge.start().await;

    let device = bridge.device(None).unwrap();
    let result = wait_until_live(&device.coordinator, Duration::from_secs(30)).await;
    assert!(matches!(result, Err(BridgeError::NotLive { .. })));

    let entities = device.entities().await;
    assert!(!entities.available);
    bridge.shutdown().await;
}

#[tokio::test]
async fn test_device_selection() {
    let first = MockTransport::new();
    let second = MockTransport::new();
    let mut config = config_for(&[&first, &second]);
    config.devices[1].alias = Some("travel".to_string());
    let bridge = Bridge::new(&config, Arc::new(first.clone())).unwrap();

    assert_eq!(bridge.devices().len(), 2);
    assert!(matches!(
        bridge.device(None),
        Err(BridgeError::AmbiguousDevice { count: 2 })
    ));
    let by_alias = bridge.device(Some("travel")).unwrap();
    assert_eq!(by_alias.config.address, second.address());
    let by_address = bridge
        .device(Some(&first.address().to_lowercase()))
        .unwrap();
    assert_eq!(by_address.config.address, first.address());
    assert!(matches!(
        bridge.device(Some("nope")),
        Err(BridgeError::UnknownDevice(_))
    ));
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let transport = MockTransport::new();
    let mut config = config_for(&[&transport]);
    config.devices[0].poll_interval = 5;

    let result = Bridge::new(&config, Arc::new(transport));
    assert!(matches!(result, Err(BridgeError::Config(_))));
}
