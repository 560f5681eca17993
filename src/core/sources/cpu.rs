//! CPU usage source.

use std::time::Duration;

use sysinfo::{CpuRefreshKind, RefreshKind, System};

use super::{bool_prop, f64_prop, round, ALERT_COLOR};
use crate::core::module::MetricSource;
use crate::core::protocol::{ConfigField, DataPayload, KvItem, Props, RenderConfig, TemplateType};
use crate::error::Result;

const DEFAULT_ALERT_THRESHOLD: f64 = 80.0;

/// Polling frequency: 1 second
pub struct CpuSource {
    system: System,
    primed: bool,
    minimal_mode: bool,
    alert_threshold: f64,
}

impl CpuSource {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing().with_cpu(CpuRefreshKind::everything());
        Self {
            system: System::new_with_specifics(refresh_kind),
            primed: false,
            minimal_mode: false,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
        }
    }
}

impl Default for CpuSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for CpuSource {
    fn id(&self) -> &str {
        "cpu"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn render_config(&self) -> RenderConfig {
        if self.minimal_mode {
            return RenderConfig::new("glancehud.core.cpu", TemplateType::KeyValue, "CPU")
                .with_prop("layout", "row");
        }
        RenderConfig::new("glancehud.core.cpu", TemplateType::Sparkline, "CPU")
            .with_prop("unit", "%")
            // 60s of history at 1s interval
            .with_prop("maxPoints", 60)
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
        // Usage is a delta between two refreshes.
        if !self.primed {
            self.system.refresh_cpu_usage();
            std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
            self.primed = true;
        }
        self.system.refresh_cpu_usage();

        let usage = round(self.system.global_cpu_usage() as f64, 1);
        let mut payload = DataPayload::numeric(usage);

        if usage > self.alert_threshold {
            payload = payload.with_prop("color", ALERT_COLOR);
        }

        if self.minimal_mode {
            payload = payload.with_pairs(vec![
                KvItem::new("CPU", format!("{:.1}%", usage)).with_icon("Cpu")
            ]);
        }

        Ok(payload)
    }
}
