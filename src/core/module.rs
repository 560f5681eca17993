//! Metric sources and the closed set of module kinds the HUD knows about.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};

use super::protocol::{ConfigField, DataPayload, Props, RenderConfig, TemplateType};
use crate::error::Result;

/// A built-in, polled data source.
///
/// `poll` may do blocking OS reads; the collector always calls it off the
/// async workers.
pub trait MetricSource: Send {
    fn id(&self) -> &str;

    fn interval(&self) -> Duration;

    fn render_config(&self) -> RenderConfig;

    fn config_schema(&self) -> Vec<ConfigField> {
        Vec::new()
    }

    /// Receives the widget's props merged with global options
    /// (`minimal_mode`) before the collector starts.
    fn apply_config(&mut self, _props: &Props) {}

    fn poll(&mut self) -> Result<DataPayload>;
}

#[derive(Debug, Clone)]
struct Descriptor {
    interval: Duration,
    render: RenderConfig,
    schema: Vec<ConfigField>,
}

impl Descriptor {
    fn read(source: &dyn MetricSource) -> Self {
        Self {
            interval: source.interval(),
            render: source.render_config(),
            schema: source.config_schema(),
        }
    }
}

/// Shared handle to a built-in source.
///
/// The descriptor is cached so listing modules never waits on a poll that
/// currently holds the source.
#[derive(Clone)]
pub struct BuiltinModule {
    id: String,
    source: Arc<Mutex<Box<dyn MetricSource>>>,
    descriptor: Arc<RwLock<Descriptor>>,
}

impl BuiltinModule {
    pub fn new(source: impl MetricSource + 'static) -> Self {
        let descriptor = Descriptor::read(&source);
        Self {
            id: source.id().to_string(),
            source: Arc::new(Mutex::new(Box::new(source))),
            descriptor: Arc::new(RwLock::new(descriptor)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn interval(&self) -> Duration {
        self.descriptor.read().interval
    }

    pub fn render_config(&self) -> RenderConfig {
        self.descriptor.read().render.clone()
    }

    pub fn config_schema(&self) -> Vec<ConfigField> {
        self.descriptor.read().schema.clone()
    }

    pub fn apply_config(&self, props: &Props) {
        let mut source = self.source.lock();
        source.apply_config(props);
        *self.descriptor.write() = Descriptor::read(&**source);
    }

    /// Blocking; holds only this module's lock.
    pub fn poll(&self) -> Result<DataPayload> {
        self.source.lock().poll()
    }
}

impl std::fmt::Debug for BuiltinModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinModule")
            .field("id", &self.id)
            .field("interval", &self.interval())
            .finish()
    }
}

/// A module created and fed at runtime by an external process.
#[derive(Debug, Clone)]
pub struct SidecarModule {
    pub id: String,
    pub render: RenderConfig,
    pub schema: Vec<ConfigField>,
    pub last_seen: Instant,
    pub offline: bool,
    pub current: Option<DataPayload>,
    /// User settings handed back to the sidecar on each push.
    pub props: Props,
}

impl SidecarModule {
    pub fn new(id: &str, render: Option<RenderConfig>, schema: Vec<ConfigField>) -> Self {
        let mut render = render.unwrap_or_else(|| RenderConfig::default_text(id));
        render.id = id.to_string();
        if render.title.is_empty() {
            render.title = id.to_string();
        }
        Self {
            id: id.to_string(),
            render,
            schema,
            last_seen: Instant::now(),
            offline: false,
            current: None,
            props: Props::new(),
        }
    }

    pub fn mark_seen(&mut self) {
        self.last_seen = Instant::now();
        self.offline = false;
    }

    pub fn update_template(&mut self, render: RenderConfig, schema: Vec<ConfigField>) {
        self.render = render;
        self.render.id = self.id.clone();
        if self.render.title.is_empty() {
            self.render.title = self.id.clone();
        }
        self.schema = schema;
    }
}

/// Every module is one of these two kinds.
#[derive(Debug, Clone)]
pub enum HudModule {
    Builtin(BuiltinModule),
    Sidecar(SidecarModule),
}

impl HudModule {
    pub fn id(&self) -> &str {
        match self {
            HudModule::Builtin(m) => m.id(),
            HudModule::Sidecar(s) => &s.id,
        }
    }

    pub fn render_config(&self) -> RenderConfig {
        match self {
            HudModule::Builtin(m) => m.render_config(),
            HudModule::Sidecar(s) => s.render.clone(),
        }
    }

    pub fn template(&self) -> TemplateType {
        match self {
            HudModule::Builtin(m) => m.render_config().template,
            HudModule::Sidecar(s) => s.render.template.clone(),
        }
    }

    pub fn config_schema(&self) -> Vec<ConfigField> {
        match self {
            HudModule::Builtin(m) => m.config_schema(),
            HudModule::Sidecar(s) => s.schema.clone(),
        }
    }

    /// `None` for sidecars, which are never ticked.
    pub fn poll_interval(&self) -> Option<Duration> {
        match self {
            HudModule::Builtin(m) => Some(m.interval()),
            HudModule::Sidecar(_) => None,
        }
    }

    pub fn is_sidecar(&self) -> bool {
        matches!(self, HudModule::Sidecar(_))
    }
}
