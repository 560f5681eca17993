// Presentation: template resolution and terminal output

pub mod formatters;
pub mod resolver;

pub use formatters::{format_clock, format_widget, sparkline, usage_bar};
pub use resolver::{effective_props, resolve, resolve_placed, Rendered, ResolvedWidget, StatusBand};
