use std::sync::Arc;
use std::time::{Duration, Instant};

use glancehud::core::config::MemoryBackend;
use glancehud::core::event_bus::{HudEvent, Topic};
use glancehud::core::module::BuiltinModule;
use glancehud::core::protocol::{ConfigField, DataPayload, RenderConfig, TemplateType};
use glancehud::core::registry::{ModuleRegistry, SIDECAR_TTL};
use glancehud::{HudError, HudService};
use serde_json::json;

fn service() -> HudService {
    HudService::new(MemoryBackend::new(), Vec::<BuiltinModule>::new())
}

fn gauge(id: &str) -> RenderConfig {
    RenderConfig::new(id, TemplateType::Gauge, "Weather").with_prop("unit", "°F")
}

#[test]
fn test_weather_lifecycle() {
    let service = service();

    service
        .register_sidecar("weather", Some(gauge("weather")), Vec::new())
        .unwrap();
    assert!(service
        .get_modules()
        .unwrap()
        .iter()
        .any(|m| m.module_id == "weather" && m.is_sidecar && m.enabled));
    // Registration publishes nothing.
    assert!(!service.get_current_data().contains_key("weather"));

    service
        .update_sidecar_data("weather", Some(DataPayload::numeric(72.0)))
        .unwrap();
    assert_eq!(
        service.get_current_data()["weather"].numeric_value(),
        Some(72.0)
    );

    service.remove_sidecar("weather").unwrap();
    assert!(!service
        .get_modules()
        .unwrap()
        .iter()
        .any(|m| m.module_id == "weather"));
    assert!(service.get_config().unwrap().widget("weather").is_none());
    assert!(!service.get_current_data().contains_key("weather"));

    let late = service
        .update_sidecar_data("weather", Some(DataPayload::numeric(75.0)))
        .unwrap_err();
    assert!(matches!(late, HudError::UnknownModuleId(id) if id == "weather"));
    assert!(!service.get_current_data().contains_key("weather"));
}

#[test]
fn test_register_twice_fails() {
    let service = service();
    service.register_sidecar("x", None, Vec::new()).unwrap();
    let err = service
        .register_sidecar("x", Some(gauge("x")), Vec::new())
        .unwrap_err();
    assert!(matches!(err, HudError::DuplicateModuleId(_)));

    // The config still holds exactly one widget for it.
    let config = service.get_config().unwrap();
    assert_eq!(config.widgets.iter().filter(|w| w.id == "x").count(), 1);
}

#[test]
fn test_null_render_config_defaults_to_text() {
    let service = service();
    service.register_sidecar("notes", None, Vec::new()).unwrap();
    let info = service
        .get_modules()
        .unwrap()
        .into_iter()
        .find(|m| m.module_id == "notes")
        .unwrap();
    assert_eq!(info.config.template, TemplateType::Text);
    assert_eq!(info.config.title, "notes");
}

#[test]
fn test_update_unregistered_leaves_no_entry() {
    let service = service();
    let err = service
        .update_sidecar_data("unregistered-id", Some(DataPayload::numeric(1.0)))
        .unwrap_err();
    assert!(matches!(err, HudError::UnknownModuleId(_)));
    assert!(service.get_current_data().is_empty());
}

#[test]
fn test_remove_unknown_fails() {
    let err = service().remove_sidecar("ghost").unwrap_err();
    assert!(matches!(err, HudError::UnknownModuleId(_)));
}

#[test]
fn test_null_payload_marks_offline() {
    let service = service();
    service
        .register_sidecar("weather", Some(gauge("weather")), Vec::new())
        .unwrap();
    service.update_sidecar_data("weather", None).unwrap();

    let stored = &service.get_current_data()["weather"];
    assert!(stored.is_offline());
    assert!(service
        .get_modules()
        .unwrap()
        .iter()
        .any(|m| m.module_id == "weather"));

    let stats = service.get_stats(Some("weather"));
    assert!(stats.widgets["weather"].is_offline);
}

#[test]
fn test_payload_must_fit_template() {
    let service = service();
    service
        .register_sidecar("weather", Some(gauge("weather")), Vec::new())
        .unwrap();
    let err = service
        .update_sidecar_data("weather", Some(DataPayload::default().with_label("sunny")))
        .unwrap_err();
    assert!(matches!(err, HudError::TemplateMismatch { .. }));
    assert!(!service.get_current_data().contains_key("weather"));
}

#[test]
fn test_unknown_template_is_accepted() {
    let service = service();
    let render = RenderConfig::new("radar", TemplateType::Unknown("radar".into()), "Radar");
    service.register_sidecar("radar", Some(render), Vec::new()).unwrap();
    service
        .update_sidecar_data("radar", Some(DataPayload::numeric(3.0)))
        .unwrap();
    assert!(service.get_current_data().contains_key("radar"));
}

#[test]
fn test_update_returns_widget_props() {
    let service = service();
    service
        .register_sidecar(
            "weather",
            Some(gauge("weather")),
            vec![ConfigField::text("city", "City", "Oslo")],
        )
        .unwrap();

    let props = service
        .update_sidecar_data("weather", Some(DataPayload::numeric(60.0)))
        .unwrap();
    assert_eq!(props.get("city"), Some(&json!("Oslo")));
    assert_eq!(props.get("unit"), Some(&json!("°F")));

    let mut config = service.get_config().unwrap();
    config
        .widget_mut("weather")
        .unwrap()
        .props
        .insert("city".into(), json!("Bergen"));
    service.save_config(config).unwrap();

    let props = service
        .update_sidecar_data("weather", Some(DataPayload::numeric(61.0)))
        .unwrap();
    assert_eq!(props.get("city"), Some(&json!("Bergen")));
}

#[test]
fn test_schema_rejects_wrong_prop_type() {
    let service = service();
    service
        .register_sidecar(
            "weather",
            Some(gauge("weather")),
            vec![ConfigField::number("refresh", "Refresh (s)", 30.0)],
        )
        .unwrap();

    let before = service.get_config().unwrap();
    let mut config = before.clone();
    config
        .widget_mut("weather")
        .unwrap()
        .props
        .insert("refresh".into(), json!("soon"));

    let err = service.save_config(config).unwrap_err();
    assert!(matches!(err, HudError::ConfigValidation(_)));
    assert_eq!(service.get_config().unwrap(), before);
}

#[test]
fn test_updates_are_broadcast_in_order() {
    let service = service();
    let mut sub = service.bus().subscribe(Topic::DataUpdate);
    service
        .register_sidecar("weather", Some(gauge("weather")), Vec::new())
        .unwrap();

    for v in [70.0, 71.0, 72.0] {
        service
            .update_sidecar_data("weather", Some(DataPayload::numeric(v)))
            .unwrap();
    }

    let values: Vec<f64> = std::iter::from_fn(|| sub.try_recv())
        .filter_map(|e| match e {
            HudEvent::DataUpdate(u) => u.data.numeric_value(),
            _ => None,
        })
        .collect();
    assert_eq!(values, vec![70.0, 71.0, 72.0]);
}

#[test]
fn test_removal_racing_updates_never_resurrects() {
    let service = Arc::new(service());
    service
        .register_sidecar("weather", Some(gauge("weather")), Vec::new())
        .unwrap();

    let pushers: Vec<_> = (0..4)
        .map(|t| {
            let service = service.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let payload = DataPayload::numeric((t * 1000 + i) as f64);
                    if service.update_sidecar_data("weather", Some(payload)).is_err() {
                        break;
                    }
                }
            })
        })
        .collect();

    std::thread::sleep(Duration::from_millis(5));
    service.remove_sidecar("weather").unwrap();

    for pusher in pushers {
        pusher.join().unwrap();
    }
    assert!(!service.get_current_data().contains_key("weather"));
}

#[test]
fn test_silent_sidecar_goes_offline_once() {
    let registry = ModuleRegistry::new(Vec::new());
    registry
        .register_sidecar("weather", Some(gauge("weather")), Vec::new())
        .unwrap();
    registry
        .record_sidecar_data("weather", Some(DataPayload::numeric(72.0)), |_, _| {})
        .unwrap();

    let mut published = Vec::new();
    let later = Instant::now() + SIDECAR_TTL + Duration::from_secs(1);
    let expired = registry.expire_stale(later, SIDECAR_TTL, |id, _, payload| {
        published.push((id.to_string(), payload));
    });
    assert_eq!(expired, vec!["weather".to_string()]);
    assert_eq!(published.len(), 1);
    assert!(published[0].1.is_offline());
    assert_eq!(published[0].1.numeric_value(), Some(72.0));

    // Already offline: nothing new.
    assert!(registry
        .expire_stale(later, SIDECAR_TTL, |_, _, _| {})
        .is_empty());

    // A fresh push brings it back.
    registry
        .record_sidecar_data("weather", Some(DataPayload::numeric(73.0)), |_, _| {})
        .unwrap();
    let (_, current, offline) = registry.sidecar_state("weather").unwrap();
    assert!(!offline);
    assert!(!current.unwrap().is_offline());
}
