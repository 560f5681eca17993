//! Memory usage source.

use std::time::Duration;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use super::{as_gib, bool_prop, f64_prop, percent, round, ALERT_COLOR};
use crate::core::module::MetricSource;
use crate::core::protocol::{ConfigField, DataPayload, KvItem, Props, RenderConfig, TemplateType};
use crate::error::{HudError, Result};

const DEFAULT_ALERT_THRESHOLD: f64 = 85.0;

/// Polling frequency: 2 seconds
pub struct MemorySource {
    system: System,
    minimal_mode: bool,
    alert_threshold: f64,
}

impl MemorySource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_memory(MemoryRefreshKind::everything());
        Self {
            system: System::new_with_specifics(refresh_kind),
            minimal_mode: false,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for MemorySource {
    fn id(&self) -> &str {
        "mem"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(2)
    }

    fn render_config(&self) -> RenderConfig {
        if self.minimal_mode {
            return RenderConfig::new("glancehud.core.mem", TemplateType::KeyValue, "RAM")
                .with_prop("layout", "row");
        }
        RenderConfig::new("glancehud.core.mem", TemplateType::Gauge, "Memory")
            .with_prop("min", 0)
            .with_prop("max", 100)
            .with_prop("unit", "%")
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![ConfigField::number(
            "alert_threshold",
            "Alert Threshold (%)",
            DEFAULT_ALERT_THRESHOLD,
        )]
    }

    fn apply_config(&mut self, props: &Props) {
        if let Some(minimal) = bool_prop(props, "minimal_mode") {
            self.minimal_mode = minimal;
        }
        if let Some(threshold) = f64_prop(props, "alert_threshold") {
            self.alert_threshold = threshold;
        }
    }

    fn poll(&mut self) -> Result<DataPayload> {
        self.system.refresh_memory();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(HudError::poll("mem", "total memory reported as zero"));
        }
        let used = self.system.used_memory();

        let usage = round(percent(used, total), 1);
        let used_gb = round(as_gib(used), 1);
        let total_gb = round(as_gib(total), 0);

        let mut payload = DataPayload::numeric(usage).with_label(format!("{:.1}%", usage));

        if usage > self.alert_threshold {
            payload = payload.with_prop("color", ALERT_COLOR);
        }

        let items = if self.minimal_mode {
            vec![KvItem::new("RAM", format!("{:.1} G", used_gb)).with_icon("MemoryStick")]
        } else {
            vec![
                KvItem::new("used", format!("{:.1} GB", used_gb)),
                KvItem::new("total", format!("{:.0} GB", total_gb)),
            ]
        };

        Ok(payload.with_pairs(items))
    }
}
