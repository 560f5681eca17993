use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::layout::{GridSize, ModelLayout};
use crate::core::protocol::{schema_defaults, ConfigField, Props};
use crate::error::{HudError, Result};

pub const DEFAULT_OPACITY: f64 = 0.72;
pub const DEFAULT_THEME: &str = "neon";
pub const DEFAULT_GRID_COLUMNS: u32 = 2;
pub const MIN_OPACITY: f64 = 0.1;
pub const MAX_OPACITY: f64 = 1.0;

/// Layout documents written with fine grid units carry this version.
pub const LAYOUT_VERSION: u32 = 2;

/// Built-in widgets in the order they appear in a fresh config.
pub const DEFAULT_WIDGET_ORDER: [&str; 4] = ["cpu", "mem", "disk", "net"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
    #[default]
    Normal,
    Locked,
}

impl FromStr for WindowMode {
    type Err = HudError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "" | "normal" => Ok(WindowMode::Normal),
            "locked" => Ok(WindowMode::Locked),
            other => Err(HudError::invalid_setting(format!(
                "invalid window mode: {:?}",
                other
            ))),
        }
    }
}

// Older documents may carry an empty string.
fn lenient_window_mode<'de, D>(deserializer: D) -> std::result::Result<WindowMode, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    raw.as_deref()
        .unwrap_or("")
        .parse()
        .map_err(serde::de::Error::custom)
}

/// Persisted per-widget settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfig {
    pub id: String,
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Props::is_empty")]
    pub props: Props,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<ModelLayout>,
}

impl WidgetConfig {
    pub fn enabled(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            enabled: true,
            props: Props::new(),
            layout: None,
        }
    }

    pub fn with_layout(mut self, layout: ModelLayout) -> Self {
        self.layout = Some(layout);
        self
    }
}

/// The persisted HUD document. Replaced only as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub minimal_mode: bool,
    /// Legacy; the visible width is derived from content.
    #[serde(default)]
    pub grid_columns: u32,
    #[serde(default)]
    pub opacity: f64,
    #[serde(default, deserialize_with = "lenient_window_mode")]
    pub window_mode: WindowMode,
    #[serde(default)]
    pub debug_console: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_version: Option<u32>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            widgets: Vec::new(),
            theme: DEFAULT_THEME.to_string(),
            minimal_mode: false,
            grid_columns: DEFAULT_GRID_COLUMNS,
            opacity: DEFAULT_OPACITY,
            window_mode: WindowMode::Normal,
            debug_console: false,
            layout_version: Some(LAYOUT_VERSION),
        }
    }
}

impl AppConfig {
    /// Fill fields an older or hand-edited document left empty and pull
    /// out-of-range values back into range.
    pub fn with_defaults(mut self) -> Self {
        if self.opacity <= 0.0 {
            self.opacity = DEFAULT_OPACITY;
        } else {
            self.opacity = self.opacity.clamp(MIN_OPACITY, MAX_OPACITY);
        }
        if self.theme.is_empty() {
            self.theme = DEFAULT_THEME.to_string();
        }
        if self.grid_columns == 0 {
            self.grid_columns = DEFAULT_GRID_COLUMNS;
        }
        self
    }

    pub fn widget(&self, id: &str) -> Option<&WidgetConfig> {
        self.widgets.iter().find(|w| w.id == id)
    }

    pub fn widget_mut(&mut self, id: &str) -> Option<&mut WidgetConfig> {
        self.widgets.iter_mut().find(|w| w.id == id)
    }

    pub fn is_enabled(&self, id: &str) -> bool {
        self.widget(id).map(|w| w.enabled).unwrap_or(false)
    }

    /// Invariants that hold regardless of which modules exist.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for widget in &self.widgets {
            if widget.id.is_empty() {
                return Err(HudError::config_validation("widget with empty id"));
            }
            if !seen.insert(widget.id.as_str()) {
                return Err(HudError::config_validation(format!(
                    "duplicate widget id '{}'",
                    widget.id
                )));
            }
        }

        if !(MIN_OPACITY..=MAX_OPACITY).contains(&self.opacity) {
            return Err(HudError::config_validation(format!(
                "opacity must be between {} and {}, got {}",
                MIN_OPACITY, MAX_OPACITY, self.opacity
            )));
        }

        Ok(())
    }

    /// Fold a partial update into this config.
    pub fn apply_delta(&mut self, delta: &ConfigDelta) -> Result<()> {
        if let Some(opacity) = delta.opacity {
            if !(MIN_OPACITY..=MAX_OPACITY).contains(&opacity) {
                return Err(HudError::invalid_setting(format!(
                    "opacity must be between {} and {}, got {}",
                    MIN_OPACITY, MAX_OPACITY, opacity
                )));
            }
            self.opacity = opacity;
        }
        if let Some(mode) = delta.window_mode {
            self.window_mode = mode;
        }
        if let Some(theme) = &delta.theme {
            self.theme = theme.clone();
        }
        if let Some(minimal) = delta.minimal_mode {
            self.minimal_mode = minimal;
        }
        if let Some(debug) = delta.debug_console {
            self.debug_console = debug;
        }
        Ok(())
    }
}

/// Partial config change, broadcast as the `config-update` payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_mode: Option<WindowMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimal_mode: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_console: Option<bool>,
}

/// Per-module constraints checked on save.
#[derive(Debug, Clone)]
pub struct WidgetRules {
    pub schema: Vec<ConfigField>,
    pub min_size: GridSize,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationRules {
    rules: HashMap<String, WidgetRules>,
}

impl ValidationRules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, rules: WidgetRules) {
        self.rules.insert(id.into(), rules);
    }

    pub fn check(&self, config: &AppConfig) -> Result<()> {
        self.check_changes(config, None)
    }

    /// Check only widgets that differ from their entry in `previous`.
    ///
    /// Widgets without rules (e.g. a sidecar that has not connected yet)
    /// are only held to the structural invariants.
    pub fn check_changes(&self, config: &AppConfig, previous: Option<&AppConfig>) -> Result<()> {
        for widget in &config.widgets {
            if previous.and_then(|p| p.widget(&widget.id)) == Some(widget) {
                continue;
            }
            let Some(rules) = self.rules.get(&widget.id) else {
                continue;
            };

            for field in &rules.schema {
                let Some(name) = field.name.as_deref() else {
                    continue;
                };
                if let Some(value) = widget.props.get(name) {
                    field.check(value).map_err(|reason| {
                        HudError::config_validation(format!("widget '{}': {}", widget.id, reason))
                    })?;
                }
            }

            if let Some(layout) = &widget.layout {
                if !layout.fits(rules.min_size) {
                    return Err(HudError::config_validation(format!(
                        "widget '{}' layout {}x{} is below minimum {}x{}",
                        widget.id, layout.w, layout.h, rules.min_size.w, rules.min_size.h
                    )));
                }
            }
        }
        Ok(())
    }

    /// Grow every layout below its module's minimum size.
    ///
    /// Returns the ids of the widgets that were changed.
    pub fn repair(&self, config: &mut AppConfig) -> Vec<String> {
        config
            .widgets
            .iter_mut()
            .filter_map(|widget| {
                let min = self.rules.get(&widget.id)?.min_size;
                let layout = widget.layout.as_mut()?;
                layout.grow_to(min).then(|| widget.id.clone())
            })
            .collect()
    }
}

/// Default widget list, seeded from each module's schema defaults.
pub fn build_default_widgets(schemas: &HashMap<String, Vec<ConfigField>>) -> Vec<WidgetConfig> {
    DEFAULT_WIDGET_ORDER
        .iter()
        .filter_map(|id| {
            let schema = schemas.get(*id)?;
            Some(WidgetConfig {
                id: id.to_string(),
                enabled: true,
                props: schema_defaults(schema),
                layout: None,
            })
        })
        .collect()
}

/// Keep `previous`'s layouts on top of a freshly reloaded config.
///
/// Widgets only in `previous` are dropped; widgets only in `fresh` keep
/// their own layout (or none).
pub fn merge_preserving_layout(fresh: AppConfig, previous: &AppConfig) -> AppConfig {
    let mut merged = fresh;
    for widget in &mut merged.widgets {
        if let Some(layout) = previous.widget(&widget.id).and_then(|w| w.layout) {
            widget.layout = Some(layout);
        }
    }
    merged
}

/// Upgrade coarse-grid layouts to fine grid units.
///
/// Unversioned documents where every laid-out widget has `w <= 2 && h <= 2`
/// are treated as coarse: x,y and w,h are scaled by (2, 3), sizes clamped to
/// at least 2. The result is stamped with `LAYOUT_VERSION`.
///
/// Scaling can leave a widget below its template minimum;
/// `ValidationRules::repair` fixes that once the modules are known.
pub fn migrate_layouts(mut config: AppConfig) -> AppConfig {
    if config.layout_version.unwrap_or(0) >= LAYOUT_VERSION {
        return config;
    }

    let coarse = config
        .widgets
        .iter()
        .filter_map(|w| w.layout.as_ref())
        .all(|l| l.w <= 2 && l.h <= 2);

    if coarse {
        for layout in config.widgets.iter_mut().filter_map(|w| w.layout.as_mut()) {
            layout.x *= 2;
            layout.y *= 3;
            layout.w = (layout.w * 2).max(2);
            layout.h = (layout.h * 3).max(2);
        }
        log::info!("Migrated widget layouts to fine grid units");
    }

    config.layout_version = Some(LAYOUT_VERSION);
    config
}

/// Where the config document is read from and written to.
pub trait ConfigBackend: Send + Sync {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<AppConfig>>;
    fn store(&self, config: &AppConfig) -> Result<()>;
}

/// Pretty-printed JSON file.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<config_dir>/glancehud/config.json`
    pub fn at_default_location() -> Result<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| HudError::runtime("Could not determine config directory"))?;
        Ok(config_dir.join("glancehud").join("config.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl ConfigBackend for JsonFileBackend {
    fn load(&self) -> Result<Option<AppConfig>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let data = fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(None);
        }

        match serde_json::from_slice(&data) {
            Ok(config) => Ok(Some(config)),
            Err(e) => {
                // A corrupt document falls back to defaults rather than
                // keeping the HUD from starting.
                log::warn!("Ignoring unreadable config {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    fn store(&self, config: &AppConfig) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(config)?;
        // Write-then-rename so a crash never leaves a truncated document.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// In-memory backend for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryBackend {
    stored: Mutex<Option<AppConfig>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self {
            stored: Mutex::new(Some(config)),
        }
    }

    pub fn stored(&self) -> Option<AppConfig> {
        self.stored.lock().clone()
    }
}

impl ConfigBackend for MemoryBackend {
    fn load(&self) -> Result<Option<AppConfig>> {
        Ok(self.stored.lock().clone())
    }

    fn store(&self, config: &AppConfig) -> Result<()> {
        *self.stored.lock() = Some(config.clone());
        Ok(())
    }
}

impl<T: ConfigBackend> ConfigBackend for Arc<T> {
    fn load(&self) -> Result<Option<AppConfig>> {
        (**self).load()
    }

    fn store(&self, config: &AppConfig) -> Result<()> {
        (**self).store(config)
    }
}

/// Owner of the single in-memory `AppConfig`.
///
/// Readers always observe a complete document: saves build the new value
/// first and swap it in under the write lock.
pub struct ConfigStore {
    backend: Box<dyn ConfigBackend>,
    fallback: AppConfig,
    load_rules: ValidationRules,
    current: RwLock<Option<Arc<AppConfig>>>,
    save_lock: Mutex<()>,
}

impl ConfigStore {
    /// `fallback` is used when the backend has nothing stored yet.
    pub fn new(backend: impl ConfigBackend + 'static, fallback: AppConfig) -> Self {
        Self {
            backend: Box::new(backend),
            fallback,
            load_rules: ValidationRules::default(),
            current: RwLock::new(None),
            save_lock: Mutex::new(()),
        }
    }

    /// Layouts of a loaded document are grown to these rules' minimum sizes.
    pub fn with_load_rules(mut self, rules: ValidationRules) -> Self {
        self.load_rules = rules;
        self
    }

    /// Current config, loading (and migrating) it on first use.
    pub fn get(&self) -> Result<AppConfig> {
        if let Some(config) = self.current.read().as_ref() {
            return Ok((**config).clone());
        }

        let mut slot = self.current.write();
        if let Some(config) = slot.as_ref() {
            return Ok((**config).clone());
        }

        let mut loaded = match self.backend.load()? {
            Some(config) => migrate_layouts(config.with_defaults()),
            None => self.fallback.clone().with_defaults(),
        };
        let grown = self.load_rules.repair(&mut loaded);
        if !grown.is_empty() {
            log::info!("Grew undersized layouts to their minimum: {}", grown.join(", "));
        }
        *slot = Some(Arc::new(loaded.clone()));
        Ok(loaded)
    }

    /// Validate structurally, persist, then replace the in-memory value.
    pub fn save(&self, config: AppConfig) -> Result<()> {
        self.save_with_rules(config, &ValidationRules::default())
    }

    pub fn save_with_rules(&self, config: AppConfig, rules: &ValidationRules) -> Result<()> {
        let _guard = self.save_lock.lock();
        self.commit(config, rules).map(|_| ())
    }

    /// Read-modify-write under the save lock. Returns the saved config.
    pub fn update<F>(&self, rules: &ValidationRules, mutate: F) -> Result<AppConfig>
    where
        F: FnOnce(&mut AppConfig) -> Result<()>,
    {
        let _guard = self.save_lock.lock();
        let mut config = self.get()?;
        mutate(&mut config)?;
        self.commit(config, rules)
    }

    /// Module rules apply to widgets that changed; untouched entries were
    /// accepted when they were loaded or last saved.
    fn commit(&self, mut config: AppConfig, rules: &ValidationRules) -> Result<AppConfig> {
        config.layout_version = Some(LAYOUT_VERSION);
        config.validate()?;
        let previous = self.current.read().clone();
        rules.check_changes(&config, previous.as_deref())?;
        self.backend.store(&config)?;
        *self.current.write() = Some(Arc::new(config.clone()));
        Ok(config)
    }
}
