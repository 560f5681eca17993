use std::sync::Arc;

use glancehud::core::config::{
    merge_preserving_layout, migrate_layouts, AppConfig, ConfigBackend, ConfigStore,
    JsonFileBackend, MemoryBackend, WidgetConfig, WindowMode, LAYOUT_VERSION,
};
use glancehud::core::layout::ModelLayout;
use glancehud::HudError;
use serde_json::json;
use tempfile::TempDir;

fn widget(id: &str, enabled: bool, layout: (i32, i32, u32, u32)) -> WidgetConfig {
    WidgetConfig {
        id: id.to_string(),
        enabled,
        props: Default::default(),
        layout: Some(ModelLayout::new(layout.0, layout.1, layout.2, layout.3)),
    }
}

#[test]
fn test_file_backend_missing_file_uses_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let backend = JsonFileBackend::new(temp_dir.path().join("config.json"));
    assert!(backend.load().unwrap().is_none());

    let fallback = AppConfig {
        widgets: vec![WidgetConfig::enabled("cpu")],
        ..Default::default()
    };
    let store = ConfigStore::new(backend, fallback.clone());
    assert_eq!(store.get().unwrap(), fallback);
}

#[test]
fn test_file_backend_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nested").join("config.json");

    let config = AppConfig {
        widgets: vec![widget("cpu", true, (0, 0, 2, 3))],
        opacity: 0.5,
        window_mode: WindowMode::Locked,
        ..Default::default()
    };

    let store = ConfigStore::new(JsonFileBackend::new(&path), AppConfig::default());
    store.save(config.clone()).unwrap();
    assert!(path.exists());

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["windowMode"], json!("locked"));
    assert_eq!(raw["widgets"][0]["layout"], json!({"x": 0, "y": 0, "w": 2, "h": 3}));

    let reopened = ConfigStore::new(JsonFileBackend::new(&path), AppConfig::default());
    assert_eq!(reopened.get().unwrap(), config);
}

#[test]
fn test_corrupt_file_falls_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let store = ConfigStore::new(JsonFileBackend::new(&path), AppConfig::default());
    assert_eq!(store.get().unwrap(), AppConfig::default());
}

#[test]
fn test_legacy_document_gets_defaults_and_migration() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(
        &path,
        json!({
            "widgets": [
                {"id": "cpu", "enabled": true, "layout": {"x": 0, "y": 0, "w": 1, "h": 1}},
                {"id": "mem", "enabled": true, "layout": {"x": 1, "y": 1, "w": 2, "h": 2}}
            ],
            "opacity": 0,
            "theme": "",
            "windowMode": ""
        })
        .to_string(),
    )
    .unwrap();

    let config = ConfigStore::new(JsonFileBackend::new(&path), AppConfig::default())
        .get()
        .unwrap();

    assert_eq!(config.opacity, 0.72);
    assert_eq!(config.theme, "neon");
    assert_eq!(config.window_mode, WindowMode::Normal);
    assert_eq!(config.layout_version, Some(LAYOUT_VERSION));
    assert_eq!(config.widgets[0].layout, Some(ModelLayout::new(0, 0, 2, 3)));
    assert_eq!(config.widgets[1].layout, Some(ModelLayout::new(2, 3, 4, 6)));
}

#[test]
fn test_migrate_is_idempotent_on_fine_grid() {
    let config = AppConfig {
        widgets: vec![
            widget("cpu", true, (0, 0, 2, 3)),
            widget("disk", true, (2, 0, 3, 3)),
        ],
        layout_version: None,
        ..Default::default()
    };

    let once = migrate_layouts(config.clone());
    let twice = migrate_layouts(once.clone());
    assert_eq!(once.widgets, config.widgets);
    assert_eq!(once, twice);
}

#[test]
fn test_saved_unversioned_config_is_not_migrated_on_reload() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");

    // A full document from the settings window carries no version.
    let from_settings = AppConfig {
        widgets: vec![widget("notes", true, (2, 2, 2, 2))],
        layout_version: None,
        ..Default::default()
    };
    ConfigStore::new(JsonFileBackend::new(&path), AppConfig::default())
        .save(from_settings)
        .unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["layoutVersion"], json!(LAYOUT_VERSION));

    let reopened = ConfigStore::new(JsonFileBackend::new(&path), AppConfig::default())
        .get()
        .unwrap();
    assert_eq!(
        reopened.widget("notes").unwrap().layout,
        Some(ModelLayout::new(2, 2, 2, 2))
    );
}

#[test]
fn test_merge_keeps_previous_layout() {
    let previous = AppConfig {
        widgets: vec![
            widget("cpu", true, (0, 0, 2, 3)),
            widget("mem", true, (2, 0, 2, 3)),
        ],
        ..Default::default()
    };
    let fresh = AppConfig {
        widgets: vec![
            widget("cpu", true, (5, 5, 2, 3)),
            widget("mem", false, (2, 0, 2, 3)),
        ],
        ..Default::default()
    };

    let merged = merge_preserving_layout(fresh, &previous);
    let cpu = merged.widget("cpu").unwrap();
    assert_eq!(cpu.layout, Some(ModelLayout::new(0, 0, 2, 3)));
    assert!(!merged.is_enabled("mem"));
}

#[test]
fn test_duplicate_ids_block_save() {
    let backend = Arc::new(MemoryBackend::new());
    let store = ConfigStore::new(backend.clone(), AppConfig::default());
    let before = AppConfig {
        widgets: vec![WidgetConfig::enabled("cpu")],
        ..Default::default()
    };
    store.save(before.clone()).unwrap();

    let bad = AppConfig {
        widgets: vec![WidgetConfig::enabled("cpu"), WidgetConfig::enabled("cpu")],
        ..Default::default()
    };
    let err = store.save(bad).unwrap_err();

    assert!(matches!(err, HudError::ConfigValidation(_)));
    assert_eq!(store.get().unwrap(), before);
    assert_eq!(backend.stored(), Some(before));
}

#[test]
fn test_readers_never_see_partial_config() {
    let store = Arc::new(ConfigStore::new(MemoryBackend::new(), AppConfig::default()));
    let writer = {
        let store = store.clone();
        std::thread::spawn(move || {
            for i in 0..200 {
                let n = (i % 5) + 1;
                let config = AppConfig {
                    widgets: (0..n).map(|k| WidgetConfig::enabled(format!("w{}", k))).collect(),
                    opacity: 0.1 + n as f64 / 10.0,
                    ..Default::default()
                };
                store.save(config).unwrap();
            }
        })
    };

    for _ in 0..200 {
        let config = store.get().unwrap();
        let expected = 0.1 + config.widgets.len() as f64 / 10.0;
        if !config.widgets.is_empty() {
            assert!((config.opacity - expected).abs() < 1e-9);
        }
    }
    writer.join().unwrap();
}
