//! Disk usage source.

use std::time::Duration;

use sysinfo::Disks;

use super::{as_gib, bool_prop, percent, round};
use crate::core::module::MetricSource;
use crate::core::protocol::{
    BarItem, ConfigField, DataPayload, KvItem, Props, RenderConfig, TemplateType,
};
use crate::error::{HudError, Result};

/// Polling frequency: 10 seconds
pub struct DiskSource {
    disks: Disks,
    /// `None` auto-detects physical mounts.
    path: Option<String>,
    minimal_mode: bool,
}

struct Usage {
    mount: String,
    total: u64,
    used: u64,
}

impl DiskSource {
    pub fn new(path: Option<String>) -> Self {
        Self {
            disks: Disks::new_with_refreshed_list(),
            path,
            minimal_mode: false,
        }
    }

    fn collect_usage(&self) -> Vec<Usage> {
        self.disks
            .iter()
            .filter_map(|disk| {
                let mount = disk.mount_point().to_string_lossy().to_string();
                if !is_wanted_mount(&mount, self.path.as_deref()) {
                    return None;
                }
                let total = disk.total_space();
                Some(Usage {
                    mount,
                    total,
                    used: total.saturating_sub(disk.available_space()),
                })
            })
            .collect()
    }
}

/// Skip snap/loop mounts unless a specific path was asked for.
fn is_wanted_mount(mount: &str, wanted: Option<&str>) -> bool {
    match wanted {
        Some(path) => mount == path,
        None => !mount.is_empty() && !mount.starts_with("/snap") && !mount.starts_with("/loop"),
    }
}

impl MetricSource for DiskSource {
    fn id(&self) -> &str {
        "disk"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(10)
    }

    fn render_config(&self) -> RenderConfig {
        if self.minimal_mode {
            return RenderConfig::new("glancehud.core.disk", TemplateType::KeyValue, "Disk")
                .with_prop("layout", "column");
        }
        RenderConfig::new("glancehud.core.disk", TemplateType::BarList, "Disk Usage")
            .with_prop("headers", vec!["Drive", "Usage", "Details"])
    }

    fn config_schema(&self) -> Vec<ConfigField> {
        vec![
            ConfigField::text("path", "Disk path (empty = auto-detect)", ""),
            ConfigField::boolean("minimal_mode", "Minimal mode", false),
        ]
    }

    fn apply_config(&mut self, props: &Props) {
        if let Some(path) = props.get("path").and_then(|v| v.as_str()) {
            self.path = if path.is_empty() {
                None
            } else {
                Some(path.to_string())
            };
        }
        if let Some(minimal) = bool_prop(props, "minimal_mode") {
            self.minimal_mode = minimal;
        }
    }

    fn poll(&mut self) -> Result<DataPayload> {
        self.disks.refresh(true);

        let usage = self.collect_usage();
        if usage.is_empty() {
            return Err(HudError::poll(
                "disk",
                match &self.path {
                    Some(path) => format!("no disk mounted at {}", path),
                    None => "no disks found".to_string(),
                },
            ));
        }

        if self.minimal_mode {
            let items = usage
                .iter()
                .map(|u| {
                    KvItem::new(u.mount.clone(), format!("{:.0}%", percent(u.used, u.total)))
                        .with_icon("HardDrive")
                })
                .collect();
            return Ok(DataPayload::default().with_pairs(items));
        }

        let items = usage
            .iter()
            .map(|u| BarItem {
                label: u.mount.clone(),
                percent: round(percent(u.used, u.total), 1),
                value: format!(
                    "{:.1} / {:.0} GB",
                    round(as_gib(u.used), 1),
                    round(as_gib(u.total), 0)
                ),
            })
            .collect();

        Ok(DataPayload::default().with_bars(items))
    }
}
