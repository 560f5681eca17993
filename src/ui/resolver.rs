//! Render-time template resolution.
//!
//! Given a module's render config, the widget's saved props and the latest
//! payload, decide what the widget shows. Nothing in here fails: bad or
//! unexpected input becomes a visible fallback view.

use serde_json::Value;

use crate::core::protocol::{
    BarItem, DataPayload, KvItem, Props, RenderConfig, TemplateData, TemplateType,
};
use crate::core::service::HudService;
use crate::error::Result;

pub const HEALTHY_COLOR: &str = "#22c55e";
pub const WARNING_COLOR: &str = "#f59e0b";
pub const CRITICAL_COLOR: &str = "#ef4444";

/// Usage severity used to color gauges and bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StatusBand {
    Healthy,
    Warning,
    Critical,
}

impl StatusBand {
    pub fn from_percent(percent: f64) -> Self {
        if percent >= 85.0 {
            StatusBand::Critical
        } else if percent >= 60.0 {
            StatusBand::Warning
        } else {
            StatusBand::Healthy
        }
    }

    pub fn hex(&self) -> &'static str {
        match self {
            StatusBand::Healthy => HEALTHY_COLOR,
            StatusBand::Warning => WARNING_COLOR,
            StatusBand::Critical => CRITICAL_COLOR,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rendered {
    /// No payload published yet.
    Waiting,
    /// Last known view, dimmed.
    Offline(Box<Rendered>),
    Gauge {
        value: f64,
        label: Option<String>,
        breakdown: Vec<KvItem>,
        color: String,
    },
    BarList {
        items: Vec<(BarItem, String)>,
    },
    KeyValue {
        items: Vec<KvItem>,
        row_oriented: bool,
    },
    Text {
        text: String,
        breakdown: Vec<KvItem>,
    },
    Sparkline {
        value: f64,
        display_value: Option<String>,
        history: Vec<f64>,
    },
    Group {
        payload: DataPayload,
    },
    /// Payload did not fit the declared template.
    Mismatch {
        reason: String,
    },
    /// Template type this build does not know.
    Unknown {
        type_name: String,
        payload: DataPayload,
    },
}

/// Everything the presentation layer needs for one widget.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWidget {
    pub id: String,
    pub title: String,
    pub template: TemplateType,
    pub props: Props,
    pub view: Rendered,
}

/// Template props < widget props < payload props.
pub fn effective_props(
    render: &RenderConfig,
    widget_props: Option<&Props>,
    payload: Option<&DataPayload>,
) -> Props {
    let mut props = render.props.clone();
    if let Some(widget) = widget_props {
        props.extend(widget.clone());
    }
    if let Some(overlay) = payload.and_then(|p| p.props.as_ref()) {
        props.extend(overlay.clone());
    }
    props
}

fn color_for(props: &Props, percent: f64) -> String {
    props
        .get("color")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| StatusBand::from_percent(percent).hex().to_string())
}

fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// `id` is the widget id; built-in render configs carry a namespaced id of
/// their own.
pub fn resolve(
    id: &str,
    render: &RenderConfig,
    widget_props: Option<&Props>,
    payload: Option<&DataPayload>,
    history: &[f64],
) -> ResolvedWidget {
    let props = effective_props(render, widget_props, payload);
    let view = match payload {
        None => Rendered::Waiting,
        Some(p) if p.is_offline() && !p.has_content() => Rendered::Offline(Box::new(Rendered::Waiting)),
        Some(p) => {
            let view = render_payload(&render.template, &props, p, history);
            if p.is_offline() {
                Rendered::Offline(Box::new(view))
            } else {
                view
            }
        }
    };

    ResolvedWidget {
        id: id.to_string(),
        title: render.title.clone(),
        template: render.template.clone(),
        props,
        view,
    }
}

fn render_payload(
    template: &TemplateType,
    props: &Props,
    payload: &DataPayload,
    history: &[f64],
) -> Rendered {
    if let TemplateType::Unknown(name) = template {
        return Rendered::Unknown {
            type_name: name.clone(),
            payload: payload.clone(),
        };
    }

    let data = match payload.to_template_data(template) {
        Ok(data) => data,
        Err(reason) => return Rendered::Mismatch { reason },
    };

    match data {
        TemplateData::Gauge {
            value,
            label,
            breakdown,
        } => Rendered::Gauge {
            value,
            label,
            breakdown,
            color: color_for(props, value),
        },
        TemplateData::BarList { items } => Rendered::BarList {
            items: items
                .into_iter()
                .map(|item| {
                    let color = StatusBand::from_percent(item.percent).hex().to_string();
                    (item, color)
                })
                .collect(),
        },
        TemplateData::KeyValue { items } => Rendered::KeyValue {
            items,
            row_oriented: props.get("layout").and_then(Value::as_str) == Some("row"),
        },
        TemplateData::Text { value, breakdown } => Rendered::Text {
            text: value_text(value.as_ref()),
            breakdown,
        },
        TemplateData::Sparkline {
            value,
            display_value,
        } => Rendered::Sparkline {
            value,
            display_value,
            history: if history.is_empty() {
                vec![value]
            } else {
                history.to_vec()
            },
        },
        TemplateData::Group { payload } => Rendered::Group { payload },
    }
}

/// Resolve every placed widget, in reading order of the layout plan.
pub fn resolve_placed(service: &HudService) -> Result<Vec<ResolvedWidget>> {
    let config = service.get_config()?;
    let modules = service.get_modules()?;
    let bus = service.bus();

    let mut placed = service.layout_plan()?;
    placed.sort_by_key(|p| (p.layout.y, p.layout.x));

    Ok(placed
        .iter()
        .filter_map(|placement| {
            let module = modules.iter().find(|m| m.module_id == placement.id)?;
            let payload = bus.latest(&placement.id);
            Some(resolve(
                &placement.id,
                &module.config,
                config.widget(&placement.id).map(|w| &w.props),
                payload.as_ref(),
                &bus.history(&placement.id),
            ))
        })
        .collect())
}
