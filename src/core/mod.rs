// Core: data model, config, event bus, modules and the collector

pub mod collector;
pub mod config;
pub mod event_bus;
pub mod history;
pub mod layout;
pub mod module;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod sources;

// Re-export commonly used items
pub use collector::Collector;
pub use config::{AppConfig, ConfigStore, JsonFileBackend, MemoryBackend, WidgetConfig, WindowMode};
pub use event_bus::{EventBus, HudEvent, Subscription, Topic};
pub use module::{BuiltinModule, HudModule, MetricSource};
pub use protocol::{DataPayload, RenderConfig, TemplateType};
pub use registry::ModuleRegistry;
pub use service::HudService;
