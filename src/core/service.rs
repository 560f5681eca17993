//! `HudService`: the one object the presentation layer and the CLI talk to.
//!
//! It wires the config store, the module registry, the event bus and the
//! collector together. Every operation here is synchronous except that
//! `start` must be called from inside a tokio runtime.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};

use super::collector::{history_capacity, Collector};
use super::config::{
    build_default_widgets, AppConfig, ConfigBackend, ConfigDelta, ConfigStore, WidgetConfig,
    WindowMode,
};
use super::event_bus::{EventBus, HudEvent, ModeChange};
use super::layout::{
    min_size, normalize_committed, place_widgets, Placement, PlacementRequest, RenderLayout, VirtualOrigin,
};
use super::module::{BuiltinModule, HudModule};
use super::protocol::{
    schema_defaults, ConfigField, DataPayload, ModuleInfo, Props, RenderConfig, SidecarRequest,
    SidecarResponse, StatEntry, StatsResponse, UpdateEvent,
};
use super::registry::{ModuleRegistry, SIDECAR_TTL};
use super::sources::builtin_modules;
use crate::error::{HudError, Result};

/// How often silent sidecars are checked.
const TTL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// The running sidecar liveness check.
struct TtlRun {
    /// Held for reading while expiring; `stop` flips it under the write lock.
    gate: Arc<RwLock<bool>>,
    shutdown_tx: broadcast::Sender<()>,
}

impl TtlRun {
    fn close(self) {
        *self.gate.write() = false;
        let _ = self.shutdown_tx.send(());
    }
}

pub struct HudService {
    store: ConfigStore,
    registry: Arc<ModuleRegistry>,
    bus: EventBus,
    collector: Collector,
    edit_mode: AtomicBool,
    sidecar_ttl: Duration,
    ttl_run: Mutex<Option<TtlRun>>,
}

impl HudService {
    pub fn new(backend: impl ConfigBackend + 'static, builtins: Vec<BuiltinModule>) -> Self {
        let registry = Arc::new(ModuleRegistry::new(builtins));
        let fallback = AppConfig {
            widgets: build_default_widgets(&registry.schemas()),
            ..Default::default()
        };
        let bus = EventBus::new();

        Self {
            store: ConfigStore::new(backend, fallback)
                .with_load_rules(registry.validation_rules()),
            registry,
            collector: Collector::new(bus.clone()),
            bus,
            edit_mode: AtomicBool::new(false),
            sidecar_ttl: SIDECAR_TTL,
            ttl_run: Mutex::new(None),
        }
    }

    /// Silence after which a sidecar is marked offline.
    pub fn with_sidecar_ttl(mut self, ttl: Duration) -> Self {
        self.sidecar_ttl = ttl;
        self
    }

    /// Service over the built-in sysinfo sources.
    pub fn with_builtins(backend: impl ConfigBackend + 'static) -> Self {
        Self::new(backend, builtin_modules())
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn is_running(&self) -> bool {
        self.collector.is_running()
    }

    pub fn failure_count(&self, id: &str) -> u64 {
        self.collector.failure_count(id)
    }

    // ==========================================
    // Lifecycle
    // ==========================================

    /// Start polling every enabled built-in and the sidecar liveness check.
    pub fn start(&self) -> Result<()> {
        let config = self.store.get()?;
        self.collector.start(self.configured_builtins(&config))?;
        self.start_ttl_checker()
    }

    /// After this returns nothing is published by the collector or the
    /// liveness check.
    pub fn stop(&self) {
        self.collector.stop();
        if let Some(run) = self.ttl_run.lock().take() {
            run.close();
        }
    }

    fn start_ttl_checker(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|_| HudError::runtime("service must be started inside a tokio runtime"))?;

        let gate = Arc::new(RwLock::new(true));
        let (shutdown_tx, mut shutdown) = broadcast::channel::<()>(1);
        let run = TtlRun {
            gate: gate.clone(),
            shutdown_tx,
        };
        if let Some(previous) = self.ttl_run.lock().replace(run) {
            previous.close();
        }

        let registry = self.registry.clone();
        let bus = self.bus.clone();
        let ttl = self.sidecar_ttl;
        handle.spawn(async move {
            let mut ticker = interval(TTL_CHECK_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let open = gate.read();
                        if !*open {
                            break;
                        }
                        registry.expire_stale(Instant::now(), ttl, |id, render, data| {
                            bus.publish_data_with_history(
                                UpdateEvent { id: id.to_string(), data },
                                history_capacity(render),
                            );
                        });
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
        Ok(())
    }

    /// Enabled built-ins in config order, configured with their widget props.
    fn configured_builtins(&self, config: &AppConfig) -> Vec<BuiltinModule> {
        config
            .widgets
            .iter()
            .filter(|w| w.enabled)
            .filter_map(|widget| match self.registry.get(&widget.id) {
                Some(HudModule::Builtin(module)) => {
                    module.apply_config(&effective_module_props(&module, widget, config));
                    Some(module)
                }
                _ => None,
            })
            .collect()
    }

    // ==========================================
    // Modules and config
    // ==========================================

    /// Modules in widget order, then modules the config does not list yet.
    pub fn get_modules(&self) -> Result<Vec<ModuleInfo>> {
        let config = self.store.get()?;
        let mut listed = Vec::new();

        for widget in &config.widgets {
            if let Some(module) = self.registry.get(&widget.id) {
                listed.push(module_info(&module, widget.enabled));
            }
        }

        let mut rest: Vec<HudModule> = self
            .registry
            .all()
            .into_iter()
            .filter(|m| config.widget(m.id()).is_none())
            .collect();
        rest.sort_by(|a, b| a.id().cmp(b.id()));
        listed.extend(rest.iter().map(|m| module_info(m, m.is_sidecar())));

        Ok(listed)
    }

    pub fn get_module_config_schema(&self, id: &str) -> Result<Vec<ConfigField>> {
        self.registry
            .get(id)
            .map(|m| m.config_schema())
            .ok_or_else(|| HudError::unknown_module(id))
    }

    pub fn get_config(&self) -> Result<AppConfig> {
        self.store.get()
    }

    /// Validate and persist a full config, then apply it to running modules.
    ///
    /// On error the stored config is left as it was.
    pub fn save_config(&self, config: AppConfig) -> Result<()> {
        let rules = self.registry.validation_rules();
        self.store.save_with_rules(config.clone(), &rules)?;

        for widget in &config.widgets {
            if self.registry.is_sidecar(&widget.id) {
                self.registry.set_sidecar_props(&widget.id, widget.props.clone());
            }
        }

        if self.collector.is_running() {
            self.collector.restart(self.configured_builtins(&config))?;
        }

        self.bus.publish(HudEvent::ConfigUpdate(ConfigDelta {
            opacity: Some(config.opacity),
            window_mode: Some(config.window_mode),
            theme: Some(config.theme.clone()),
            minimal_mode: Some(config.minimal_mode),
            debug_console: Some(config.debug_console),
        }));
        Ok(())
    }

    /// Fold a partial change into the stored config and broadcast it.
    pub fn apply_delta(&self, delta: ConfigDelta) -> Result<AppConfig> {
        let rules = self.registry.validation_rules();
        let saved = self.store.update(&rules, |config| config.apply_delta(&delta))?;

        if delta.minimal_mode.is_some() && self.collector.is_running() {
            self.collector.restart(self.configured_builtins(&saved))?;
        }

        self.bus.publish(HudEvent::ConfigUpdate(delta));
        Ok(saved)
    }

    pub fn update_opacity(&self, opacity: f64) -> Result<()> {
        self.apply_delta(ConfigDelta {
            opacity: Some(opacity),
            ..Default::default()
        })
        .map(|_| ())
    }

    /// Persist the window mode and tell the window about it.
    pub fn set_window_mode(&self, mode: WindowMode) -> Result<()> {
        let rules = self.registry.validation_rules();
        self.store.update(&rules, |config| {
            config.window_mode = mode;
            Ok(())
        })?;
        self.bus.publish(HudEvent::ModeChange(ModeChange {
            window_mode: Some(mode),
            edit_mode: None,
        }));
        Ok(())
    }

    /// Edit mode is session state and is never persisted.
    pub fn set_edit_mode(&self, enabled: bool) {
        self.edit_mode.store(enabled, Ordering::Relaxed);
        self.bus.publish(HudEvent::ModeChange(ModeChange {
            window_mode: None,
            edit_mode: Some(enabled),
        }));
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode.load(Ordering::Relaxed)
    }

    pub fn open_settings(&self) {
        self.bus.publish(HudEvent::OpenSettings);
    }

    // ==========================================
    // Layout
    // ==========================================

    /// Render rectangles for every enabled widget with a live module.
    pub fn layout_plan(&self) -> Result<Vec<Placement>> {
        let config = self.store.get()?;
        let requests: Vec<PlacementRequest> = config
            .widgets
            .iter()
            .filter(|w| w.enabled)
            .filter_map(|w| {
                let module = self.registry.get(&w.id)?;
                Some(PlacementRequest {
                    id: w.id.clone(),
                    template: module.template(),
                    saved: w.layout,
                })
            })
            .collect();

        let origin = VirtualOrigin::of(requests.iter().filter_map(|r| r.saved.as_ref()));
        Ok(place_widgets(&requests, origin, config.grid_columns))
    }

    /// Store a finished layout edit, re-normalized to a (0, 0) origin.
    pub fn commit_layout(&self, edited: &[(String, RenderLayout)]) -> Result<AppConfig> {
        let normalized = normalize_committed(edited);
        let rules = self.registry.validation_rules();
        self.store.update(&rules, |config| {
            for (id, layout) in normalized {
                if let Some(widget) = config.widget_mut(&id) {
                    widget.layout = Some(layout);
                }
            }
            Ok(())
        })
    }

    // ==========================================
    // Data
    // ==========================================

    pub fn get_current_data(&self) -> HashMap<String, DataPayload> {
        self.bus.snapshot()
    }

    /// Current state of every widget, or only `filter` when given.
    pub fn get_stats(&self, filter: Option<&str>) -> StatsResponse {
        let mut stats = StatsResponse::default();
        for module in self.registry.all() {
            if filter.is_some_and(|id| id != module.id()) {
                continue;
            }
            let render = module.render_config();
            let data = self.bus.latest(module.id());
            let is_offline = data.as_ref().is_some_and(DataPayload::is_offline);
            stats.widgets.insert(
                module.id().to_string(),
                StatEntry {
                    id: module.id().to_string(),
                    template: render.template,
                    title: render.title,
                    data,
                    is_offline,
                },
            );
        }
        stats
    }

    // ==========================================
    // Sidecars
    // ==========================================

    /// Register a sidecar and add it to the widget list.
    ///
    /// A widget already present for `id` (from an earlier session) keeps
    /// its props and layout, grown to the template's minimum if needed.
    pub fn register_sidecar(
        &self,
        id: &str,
        render: Option<RenderConfig>,
        schema: Vec<ConfigField>,
    ) -> Result<()> {
        let render = self.registry.register_sidecar(id, render, schema.clone())?;

        let rules = self.registry.validation_rules();
        let saved = self.store.update(&rules, |config| {
            match config.widget_mut(id) {
                Some(widget) => {
                    if let Some(layout) = widget.layout.as_mut() {
                        layout.grow_to(min_size(&render.template));
                    }
                }
                None => config.widgets.push(WidgetConfig {
                    id: id.to_string(),
                    enabled: true,
                    props: seed_props(&render, &schema),
                    layout: None,
                }),
            }
            Ok(())
        });

        match saved {
            Ok(config) => {
                if let Some(widget) = config.widget(id) {
                    self.registry.set_sidecar_props(id, widget.props.clone());
                }
                Ok(())
            }
            Err(e) => {
                // Keep registry and config in step.
                let _ = self.registry.remove_sidecar(id, || {});
                Err(e)
            }
        }
    }

    /// Publish a sidecar's payload; `None` marks it offline.
    ///
    /// Returns the widget's current props.
    pub fn update_sidecar_data(&self, id: &str, payload: Option<DataPayload>) -> Result<Props> {
        self.registry.record_sidecar_data(id, payload, |render, data| {
            self.bus.publish_data_with_history(
                UpdateEvent {
                    id: id.to_string(),
                    data,
                },
                history_capacity(render),
            );
        })
    }

    /// Remove a sidecar, its cached value and its widget entry.
    ///
    /// The widget entry goes first; if that save fails the sidecar stays
    /// registered and the call can be retried.
    pub fn remove_sidecar(&self, id: &str) -> Result<()> {
        if !self.registry.is_sidecar(id) {
            return Err(HudError::unknown_module(id));
        }

        let rules = self.registry.validation_rules();
        self.store.update(&rules, |config| {
            config.widgets.retain(|w| w.id != id);
            Ok(())
        })?;

        self.registry.remove_sidecar(id, || {
            self.bus.forget(id);
        })
    }

    /// Register-on-first-contact plus data update in one call.
    pub fn push_sidecar(&self, request: SidecarRequest) -> Result<SidecarResponse> {
        let id = request.module_id.as_str();

        match self.registry.get(id) {
            Some(HudModule::Builtin(_)) => return Err(HudError::duplicate_module(id)),
            Some(HudModule::Sidecar(_)) => {
                if let Some(render) = request.template {
                    self.registry
                        .update_sidecar_template(id, render, request.schema)?;
                }
            }
            None => match self.register_sidecar(id, request.template, request.schema) {
                Ok(()) => {}
                // Lost a race with another first push for the same id.
                Err(HudError::DuplicateModuleId(_)) if self.registry.is_sidecar(id) => {}
                Err(e) => return Err(e),
            },
        }

        let props = self.update_sidecar_data(id, request.data)?;
        Ok(SidecarResponse {
            status: "ok".to_string(),
            props: Some(props),
        })
    }
}

impl Drop for HudService {
    fn drop(&mut self) {
        self.stop();
    }
}

fn module_info(module: &HudModule, enabled: bool) -> ModuleInfo {
    ModuleInfo {
        module_id: module.id().to_string(),
        config: module.render_config(),
        enabled,
        is_sidecar: module.is_sidecar(),
    }
}

/// Template props, then schema defaults for anything still missing.
fn seed_props(render: &RenderConfig, schema: &[ConfigField]) -> Props {
    let mut props = render.props.clone();
    for (key, value) in schema_defaults(schema) {
        props.entry(key).or_insert(value);
    }
    props
}

/// Schema defaults < widget props; the global minimal mode forces
/// `minimal_mode` on.
fn effective_module_props(module: &BuiltinModule, widget: &WidgetConfig, config: &AppConfig) -> Props {
    let mut props = schema_defaults(&module.config_schema());
    props.extend(widget.props.clone());

    let widget_minimal = props
        .get("minimal_mode")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    props.insert(
        "minimal_mode".to_string(),
        (config.minimal_mode || widget_minimal).into(),
    );
    props
}
