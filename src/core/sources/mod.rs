//! Built-in metric sources backed by `sysinfo`.
//!
//! Each source owns its own `sysinfo` handle so sources poll independently.

mod cpu;
mod disks;
mod memory;
mod network;

pub use cpu::CpuSource;
pub use disks::DiskSource;
pub use memory::MemorySource;
pub use network::NetworkSource;

use serde_json::Value;

use super::module::BuiltinModule;
use super::protocol::Props;

/// Color used when a usage value crosses the widget's alert threshold.
pub const ALERT_COLOR: &str = "#ef4444";

/// The four sources every HUD starts with.
pub fn builtin_modules() -> Vec<BuiltinModule> {
    vec![
        BuiltinModule::new(CpuSource::new()),
        BuiltinModule::new(MemorySource::new()),
        BuiltinModule::new(DiskSource::new(None)),
        BuiltinModule::new(NetworkSource::new()),
    ]
}

pub(crate) fn round(value: f64, decimals: i32) -> f64 {
    let pow = 10f64.powi(decimals);
    (value * pow).round() / pow
}

pub(crate) fn bool_prop(props: &Props, key: &str) -> Option<bool> {
    props.get(key).and_then(Value::as_bool)
}

pub(crate) fn f64_prop(props: &Props, key: &str) -> Option<f64> {
    props.get(key).and_then(Value::as_f64)
}

pub(crate) fn percent(part: u64, total: u64) -> f64 {
    if total > 0 {
        (part as f64 / total as f64) * 100.0
    } else {
        0.0
    }
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

pub(crate) fn as_gib(bytes: u64) -> f64 {
    bytes as f64 / GIB
}
