use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use glancehud::core::event_bus::{EventBus, HudEvent, Topic};
use glancehud::core::module::{BuiltinModule, MetricSource};
use glancehud::core::protocol::{DataPayload, RenderConfig, TemplateType};
use glancehud::core::Collector;
use glancehud::{HudError, Result};

/// Publishes 1, 2, 3, ...; `polls` counts polls as they begin.
struct Counter {
    id: &'static str,
    every: Duration,
    delay: Duration,
    polls: Arc<AtomicU32>,
}

impl Counter {
    fn new(id: &'static str, every: Duration) -> Self {
        Self {
            id,
            every,
            delay: Duration::ZERO,
            polls: Arc::new(AtomicU32::new(0)),
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl MetricSource for Counter {
    fn id(&self) -> &str {
        self.id
    }

    fn interval(&self) -> Duration {
        self.every
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig::new(self.id, TemplateType::Sparkline, self.id)
    }

    fn poll(&mut self) -> Result<DataPayload> {
        let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        std::thread::sleep(self.delay);
        Ok(DataPayload::numeric(n as f64))
    }
}

/// Succeeds `ok_polls` times, then fails (or panics) forever.
struct Flaky {
    id: &'static str,
    ok_polls: u32,
    panic: bool,
    polls: u32,
}

impl MetricSource for Flaky {
    fn id(&self) -> &str {
        self.id
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(20)
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig::new(self.id, TemplateType::Gauge, self.id)
    }

    fn poll(&mut self) -> Result<DataPayload> {
        self.polls += 1;
        if self.polls <= self.ok_polls {
            return Ok(DataPayload::numeric(42.0));
        }
        if self.panic {
            panic!("sensor unplugged");
        }
        Err(HudError::poll(self.id, "device busy"))
    }
}

/// Declares a gauge but never sends a number.
struct WrongShape;

impl MetricSource for WrongShape {
    fn id(&self) -> &str {
        "wrong"
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(20)
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig::new("wrong", TemplateType::Gauge, "Wrong")
    }

    fn poll(&mut self) -> Result<DataPayload> {
        Ok(DataPayload::default().with_label("not a number"))
    }
}

fn drain(sub: &mut glancehud::core::Subscription) -> Vec<String> {
    let mut ids = Vec::new();
    while let Some(event) = sub.try_recv() {
        if let HudEvent::DataUpdate(update) = event {
            ids.push(update.id);
        }
    }
    ids
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_first_poll_is_immediate() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(Topic::DataUpdate);
    let collector = Collector::new(bus.clone());

    collector
        .start(vec![BuiltinModule::new(Counter::new(
            "slowpoke",
            Duration::from_secs(30),
        ))])
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), sub.recv())
        .await
        .expect("first poll should not wait a full interval");
    match event {
        Some(HudEvent::DataUpdate(update)) => {
            assert_eq!(update.id, "slowpoke");
            assert_eq!(update.data.numeric_value(), Some(1.0));
        }
        other => panic!("unexpected {:?}", other),
    }
    collector.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failing_module_does_not_hold_back_others() {
    let bus = EventBus::new();
    let collector = Collector::new(bus.clone());

    collector
        .start(vec![
            BuiltinModule::new(Flaky {
                id: "broken",
                ok_polls: 0,
                panic: false,
                polls: 0,
            }),
            BuiltinModule::new(Counter::new("healthy", Duration::from_millis(20))),
        ])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    collector.stop();

    assert!(bus.history("healthy").len() >= 3);
    assert!(bus.latest("broken").is_none());
    assert!(collector.failure_count("broken") >= 3);
    assert_eq!(collector.failure_count("healthy"), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_failed_poll_keeps_last_value() {
    let bus = EventBus::new();
    let collector = Collector::new(bus.clone());

    collector
        .start(vec![BuiltinModule::new(Flaky {
            id: "gpu",
            ok_polls: 1,
            panic: false,
            polls: 0,
        })])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    collector.stop();

    assert_eq!(bus.latest("gpu").unwrap().numeric_value(), Some(42.0));
    assert!(collector.failure_count("gpu") >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_poll_is_contained() {
    let bus = EventBus::new();
    let collector = Collector::new(bus.clone());

    collector
        .start(vec![
            BuiltinModule::new(Flaky {
                id: "temps",
                ok_polls: 1,
                panic: true,
                polls: 0,
            }),
            BuiltinModule::new(Counter::new("healthy", Duration::from_millis(20))),
        ])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;

    let before = bus.history("healthy").len();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(bus.history("healthy").len() > before);
    assert!(collector.failure_count("temps") >= 1);
    assert_eq!(bus.latest("temps").unwrap().numeric_value(), Some(42.0));

    collector.stop();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_template_mismatch_is_not_published() {
    let bus = EventBus::new();
    let collector = Collector::new(bus.clone());

    collector.start(vec![BuiltinModule::new(WrongShape)]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    collector.stop();

    assert!(bus.latest("wrong").is_none());
    assert!(collector.failure_count("wrong") >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_no_publish_after_stop() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe(Topic::DataUpdate);
    let collector = Arc::new(Collector::new(bus.clone()));

    let slow = Counter::new("disk", Duration::from_millis(10)).slow(Duration::from_millis(150));
    let polls = slow.polls.clone();
    collector.start(vec![BuiltinModule::new(slow)]).unwrap();

    // Let one poll land and the next one get in flight.
    tokio::time::sleep(Duration::from_millis(220)).await;
    assert!(polls.load(Ordering::SeqCst) >= 2);

    // Stop from a different task than the one that started.
    let stopper = collector.clone();
    tokio::spawn(async move { stopper.stop() }).await.unwrap();
    assert!(!collector.is_running());

    let published_at_stop = drain(&mut sub).len();
    assert!(published_at_stop >= 1);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(drain(&mut sub).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_restart_replaces_tasks() {
    let bus = EventBus::new();
    let collector = Collector::new(bus.clone());

    collector
        .start(vec![BuiltinModule::new(Counter::new("cpu", Duration::from_millis(20)))])
        .unwrap();
    collector
        .restart(vec![BuiltinModule::new(Counter::new("mem", Duration::from_millis(20)))])
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(collector.is_running());
    assert_eq!(collector.active_tasks(), 1);
    assert!(bus.latest("mem").is_some());
    collector.stop();
    assert_eq!(collector.active_tasks(), 0);
}
