//! Network throughput source.

use std::time::{Duration, Instant};

use sysinfo::Networks;

use crate::core::module::MetricSource;
use crate::core::protocol::{DataPayload, KvItem, RenderConfig, TemplateType};
use crate::error::Result;

/// Polling frequency: 1 second (needed for accurate rate calculation)
pub struct NetworkSource {
    networks: Networks,
    last_update: Option<Instant>,
    last_totals: (u64, u64),
}

impl NetworkSource {
    pub fn new() -> Self {
        Self {
            networks: Networks::new_with_refreshed_list(),
            last_update: None,
            last_totals: (0, 0),
        }
    }
}

impl Default for NetworkSource {
    fn default() -> Self {
        Self::new()
    }
}

/// KB/s between two counter readings; counter resets read as zero.
fn rate_kb(previous: u64, current: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= 0.0 {
        return 0.0;
    }
    current.saturating_sub(previous) as f64 / elapsed_secs / 1024.0
}

impl MetricSource for NetworkSource {
    fn id(&self) -> &str {
        "net"
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn render_config(&self) -> RenderConfig {
        RenderConfig::new("glancehud.core.net", TemplateType::KeyValue, "Network")
            .with_prop("layout", "column")
    }

    fn poll(&mut self) -> Result<DataPayload> {
        self.networks.refresh(true);

        let now = Instant::now();
        let totals = self.networks.values().fold((0u64, 0u64), |(rx, tx), data| {
            (
                rx.saturating_add(data.total_received()),
                tx.saturating_add(data.total_transmitted()),
            )
        });

        let (down, up) = match self.last_update {
            Some(last) => {
                let elapsed = now.duration_since(last).as_secs_f64();
                (
                    rate_kb(self.last_totals.0, totals.0, elapsed),
                    rate_kb(self.last_totals.1, totals.1, elapsed),
                )
            }
            None => (0.0, 0.0),
        };

        self.last_update = Some(now);
        self.last_totals = totals;

        Ok(DataPayload::default().with_pairs(vec![
            KvItem::new("UP", format!("{:.1} KB/s", up)).with_icon("ArrowUp"),
            KvItem::new("DOWN", format!("{:.1} KB/s", down)).with_icon("ArrowDown"),
        ]))
    }
}
