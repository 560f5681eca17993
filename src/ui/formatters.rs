//! Terminal rendering of resolved widgets for the `run` command.

use chrono::{DateTime, Local};
use colored::{ColoredString, Colorize};

use super::resolver::{Rendered, ResolvedWidget, CRITICAL_COLOR, WARNING_COLOR};
use crate::core::protocol::KvItem;

const SPARK_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const BAR_WIDTH: usize = 20;

/// Format timestamp as HH:MM:SS
pub fn format_clock(time: DateTime<Local>) -> String {
    time.format("%H:%M:%S").to_string()
}

/// Paint text with one of the band colors; other hex values print plain.
pub fn paint(text: &str, hex: &str) -> ColoredString {
    match hex {
        CRITICAL_COLOR => text.red(),
        WARNING_COLOR => text.yellow(),
        _ => text.green(),
    }
}

/// Unicode sparkline scaled between the series' min and max.
pub fn sparkline(values: &[f64]) -> String {
    let (min, max) = values
        .iter()
        .fold((f64::MAX, f64::MIN), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = max - min;

    values
        .iter()
        .map(|v| {
            if span <= f64::EPSILON {
                SPARK_CHARS[0]
            } else {
                let idx = ((v - min) / span * (SPARK_CHARS.len() - 1) as f64).round() as usize;
                SPARK_CHARS[idx.min(SPARK_CHARS.len() - 1)]
            }
        })
        .collect()
}

/// Fixed-width usage bar, `percent` clamped to 0..=100.
pub fn usage_bar(percent: f64) -> String {
    let filled = ((percent.clamp(0.0, 100.0) / 100.0) * BAR_WIDTH as f64).round() as usize;
    format!("[{}{}]", "█".repeat(filled), "░".repeat(BAR_WIDTH - filled))
}

fn pairs(items: &[KvItem], separator: &str) -> String {
    items
        .iter()
        .map(|i| format!("{} {}", i.key.dimmed(), i.value))
        .collect::<Vec<_>>()
        .join(separator)
}

/// One widget as printable lines, title first.
pub fn format_widget(widget: &ResolvedWidget) -> Vec<String> {
    let title = format!("{:<12}", widget.title).bold().bright_cyan().to_string();
    let mut lines = Vec::new();
    render_view(&widget.view, &title, &mut lines);
    lines
}

fn render_view(view: &Rendered, title: &str, lines: &mut Vec<String>) {
    match view {
        Rendered::Waiting => lines.push(format!("{} {}", title, "waiting...".dimmed())),
        Rendered::Offline(inner) => {
            let mut inner_lines = Vec::new();
            render_view(inner, title, &mut inner_lines);
            for line in inner_lines {
                lines.push(format!("{} {}", line.dimmed(), "(offline)".red()));
            }
        }
        Rendered::Gauge {
            value,
            label,
            breakdown,
            color,
        } => {
            let text = label.clone().unwrap_or_else(|| format!("{:.1}", value));
            lines.push(format!(
                "{} {} {}",
                title,
                paint(&usage_bar(*value), color),
                text
            ));
            if !breakdown.is_empty() {
                lines.push(format!("{:12} {}", "", pairs(breakdown, "  ")));
            }
        }
        Rendered::BarList { items } => {
            lines.push(title.to_string());
            for (item, color) in items {
                lines.push(format!(
                    "  {:<12} {} {}",
                    item.label,
                    paint(&usage_bar(item.percent), color),
                    item.value
                ));
            }
        }
        Rendered::KeyValue {
            items,
            row_oriented,
        } => {
            if *row_oriented || items.len() <= 1 {
                lines.push(format!("{} {}", title, pairs(items, "  ")));
            } else {
                lines.push(title.to_string());
                for item in items {
                    lines.push(format!("  {:<10} {}", item.key.dimmed(), item.value));
                }
            }
        }
        Rendered::Text { text, breakdown } => {
            lines.push(format!("{} {}", title, text));
            if !breakdown.is_empty() {
                lines.push(format!("{:12} {}", "", pairs(breakdown, "  ")));
            }
        }
        Rendered::Sparkline {
            value,
            display_value,
            history,
        } => {
            let shown = display_value
                .clone()
                .unwrap_or_else(|| format!("{:.1}", value));
            lines.push(format!("{} {} {}", title, sparkline(history).cyan(), shown));
        }
        Rendered::Group { payload } => {
            let body = serde_json::to_string(payload).unwrap_or_default();
            lines.push(format!("{} {}", title, body.dimmed()));
        }
        Rendered::Mismatch { reason } => {
            lines.push(format!("{} {}", title, format!("bad data: {}", reason).yellow()));
        }
        Rendered::Unknown { type_name, payload } => {
            let body = serde_json::to_string(payload).unwrap_or_default();
            lines.push(format!(
                "{} {} {}",
                title,
                format!("unknown template '{}'", type_name).yellow(),
                body.dimmed()
            ));
        }
    }
}
