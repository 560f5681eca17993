use std::time::Duration;

use glancehud::core::event_bus::{EventBus, HudEvent, Topic};
use glancehud::core::protocol::{DataPayload, UpdateEvent};

fn update(id: &str, value: f64) -> UpdateEvent {
    UpdateEvent {
        id: id.to_string(),
        data: DataPayload::numeric(value),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishers_keep_per_id_order() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(Topic::DataUpdate);

    let producers: Vec<_> = ["cpu", "mem", "disk", "net"]
        .into_iter()
        .map(|id| {
            let bus = bus.clone();
            tokio::task::spawn_blocking(move || {
                for v in 0..200 {
                    bus.publish_data(update(id, v as f64));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.await.unwrap();
    }

    let mut last_seen = std::collections::HashMap::new();
    let mut total = 0;
    while let Some(event) = sub.try_recv() {
        let HudEvent::DataUpdate(update) = event else {
            continue;
        };
        let value = update.data.numeric_value().unwrap();
        if let Some(previous) = last_seen.insert(update.id.clone(), value) {
            assert!(value > previous, "{} went from {} to {}", update.id, previous, value);
        }
        total += 1;
    }

    assert_eq!(total, 800);
    let snapshot = bus.snapshot();
    assert_eq!(snapshot.len(), 4);
    for payload in snapshot.values() {
        assert_eq!(payload.numeric_value(), Some(199.0));
    }
}

#[tokio::test]
async fn test_late_subscriber_reads_snapshot() {
    let bus = EventBus::new();
    bus.publish_data(update("cpu", 12.0));

    let mut sub = bus.subscribe(Topic::DataUpdate);
    assert!(sub.try_recv().is_none());
    assert_eq!(bus.snapshot()["cpu"].numeric_value(), Some(12.0));

    bus.publish_data(update("cpu", 13.0));
    let received = tokio::time::timeout(Duration::from_secs(1), sub.recv())
        .await
        .unwrap();
    assert!(matches!(received, Some(HudEvent::DataUpdate(u)) if u.id == "cpu"));
}

#[tokio::test]
async fn test_history_capacity_follows_latest_publish() {
    let bus = EventBus::new();
    for v in 0..10 {
        bus.publish_data_with_history(update("cpu", v as f64), 4);
    }
    assert_eq!(bus.history("cpu"), vec![6.0, 7.0, 8.0, 9.0]);
}
