//! Wire and data model shared by modules, sidecars and the presentation layer.
//!
//! Everything here serializes with the camelCase field names the HUD front end
//! reads, except the sidecar request which keeps its historical `module_id`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form property bag (template props, widget props, payload overlays).
pub type Props = Map<String, Value>;

/// Visual shape a module's data is rendered as.
///
/// Unrecognised names are kept verbatim in `Unknown` so a version-skewed
/// config still round-trips and the resolver can show a visible fallback.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TemplateType {
    Gauge,
    BarList,
    KeyValue,
    Text,
    Sparkline,
    Group,
    Unknown(String),
}

impl TemplateType {
    pub fn as_str(&self) -> &str {
        match self {
            TemplateType::Gauge => "gauge",
            TemplateType::BarList => "bar-list",
            TemplateType::KeyValue => "key-value",
            TemplateType::Text => "text",
            TemplateType::Sparkline => "sparkline",
            TemplateType::Group => "group",
            TemplateType::Unknown(name) => name,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, TemplateType::Unknown(_))
    }
}

impl From<String> for TemplateType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "gauge" => TemplateType::Gauge,
            "bar-list" => TemplateType::BarList,
            "key-value" => TemplateType::KeyValue,
            "text" => TemplateType::Text,
            "sparkline" => TemplateType::Sparkline,
            "group" => TemplateType::Group,
            _ => TemplateType::Unknown(name),
        }
    }
}

impl From<TemplateType> for String {
    fn from(template: TemplateType) -> Self {
        template.as_str().to_string()
    }
}

impl fmt::Display for TemplateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static description of how a module is displayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub template: TemplateType,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub props: Props,
}

impl RenderConfig {
    pub fn new(id: impl Into<String>, template: TemplateType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            template,
            title: title.into(),
            props: Props::new(),
        }
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props.insert(key.to_string(), value.into());
        self
    }

    /// Fallback used when a sidecar registers without a template.
    pub fn default_text(id: &str) -> Self {
        Self::new(id, TemplateType::Text, id)
    }
}

// ==========================================
// Config schema
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Select,
    Checkboxes,
    Button,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: String,
}

/// One user-editable field of a module's settings form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigField {
    /// Buttons carry an action instead of a name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub label: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<SelectOption>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
}

impl ConfigField {
    fn named(name: &str, label: &str, kind: FieldKind, default: Value) -> Self {
        Self {
            name: Some(name.to_string()),
            label: label.to_string(),
            kind,
            default: Some(default),
            options: Vec::new(),
            action: None,
        }
    }

    pub fn number(name: &str, label: &str, default: f64) -> Self {
        Self::named(name, label, FieldKind::Number, Value::from(default))
    }

    pub fn text(name: &str, label: &str, default: &str) -> Self {
        Self::named(name, label, FieldKind::Text, Value::from(default))
    }

    pub fn boolean(name: &str, label: &str, default: bool) -> Self {
        Self::named(name, label, FieldKind::Bool, Value::from(default))
    }

    /// Check a stored prop value against this field's type.
    pub fn check(&self, value: &Value) -> std::result::Result<(), String> {
        let ok = match self.kind {
            FieldKind::Text => value.is_string(),
            FieldKind::Number => value.is_number(),
            FieldKind::Bool => value.is_boolean(),
            FieldKind::Select => match value.as_str() {
                Some(chosen) => {
                    self.options.is_empty() || self.options.iter().any(|o| o.value == chosen)
                }
                None => false,
            },
            FieldKind::Checkboxes => match value.as_array() {
                Some(values) => values.iter().all(|v| match v.as_str() {
                    Some(chosen) => {
                        self.options.is_empty() || self.options.iter().any(|o| o.value == chosen)
                    }
                    None => false,
                }),
                None => false,
            },
            FieldKind::Button => true,
        };

        if ok {
            Ok(())
        } else {
            Err(format!(
                "'{}' expects {:?}, got {}",
                self.name.as_deref().unwrap_or(&self.label),
                self.kind,
                value
            ))
        }
    }
}

/// Props seeded from each named field's default.
pub fn schema_defaults(schema: &[ConfigField]) -> Props {
    let mut props = Props::new();
    for field in schema {
        if let (Some(name), Some(default)) = (&field.name, &field.default) {
            if !name.is_empty() {
                props.insert(name.clone(), default.clone());
            }
        }
    }
    props
}

// ==========================================
// Data payloads
// ==========================================

/// Row of a bar-list widget.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarItem {
    pub label: String,
    pub percent: f64,
    pub value: String,
}

/// Row of a key-value widget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KvItem {
    pub key: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl KvItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            icon: None,
        }
    }

    pub fn with_icon(mut self, icon: &str) -> Self {
        self.icon = Some(icon.to_string());
        self
    }
}

/// The two item shapes never mix within one payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Items {
    Bars(Vec<BarItem>),
    Pairs(Vec<KvItem>),
}

/// One module's current live value. Replaced wholesale on every update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Items>,
    /// Per-update overlay, wins over template and widget props.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,
}

pub const OFFLINE_PROP: &str = "isOffline";

impl DataPayload {
    pub fn numeric(value: f64) -> Self {
        Self {
            value: Some(Value::from(value)),
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_bars(mut self, items: Vec<BarItem>) -> Self {
        self.items = Some(Items::Bars(items));
        self
    }

    pub fn with_pairs(mut self, items: Vec<KvItem>) -> Self {
        self.items = Some(Items::Pairs(items));
        self
    }

    pub fn with_prop(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.props
            .get_or_insert_with(Props::new)
            .insert(key.to_string(), value.into());
        self
    }

    /// "Module reports no data currently" marker.
    pub fn offline() -> Self {
        Self::default().with_prop(OFFLINE_PROP, true)
    }

    pub fn is_offline(&self) -> bool {
        self.props
            .as_ref()
            .and_then(|p| p.get(OFFLINE_PROP))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn has_content(&self) -> bool {
        self.value.is_some() || self.items.is_some() || self.label.is_some()
    }

    /// Numeric view of `value`; numeric strings are accepted.
    pub fn numeric_value(&self) -> Option<f64> {
        match self.value.as_ref()? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    fn pairs(&self) -> std::result::Result<Vec<KvItem>, String> {
        match &self.items {
            None => Ok(Vec::new()),
            Some(Items::Pairs(items)) => Ok(items.clone()),
            Some(Items::Bars(items)) if items.is_empty() => Ok(Vec::new()),
            Some(Items::Bars(_)) => Err("bar items are not allowed here".to_string()),
        }
    }

    /// Resolve the untyped payload into the shape its template expects.
    pub fn to_template_data(
        &self,
        template: &TemplateType,
    ) -> std::result::Result<TemplateData, String> {
        match template {
            TemplateType::Gauge => Ok(TemplateData::Gauge {
                value: self
                    .numeric_value()
                    .ok_or_else(|| "gauge needs a numeric value".to_string())?,
                label: self.label.clone(),
                breakdown: self.pairs()?,
            }),
            TemplateType::BarList => match &self.items {
                None => Ok(TemplateData::BarList { items: Vec::new() }),
                Some(Items::Bars(items)) => {
                    if let Some(bad) = items
                        .iter()
                        .find(|i| !(0.0..=100.0).contains(&i.percent))
                    {
                        return Err(format!(
                            "bar '{}' percent {} outside 0..=100",
                            bad.label, bad.percent
                        ));
                    }
                    Ok(TemplateData::BarList {
                        items: items.clone(),
                    })
                }
                Some(Items::Pairs(_)) => Err("bar-list needs bar items".to_string()),
            },
            TemplateType::KeyValue => Ok(TemplateData::KeyValue {
                items: self.pairs()?,
            }),
            TemplateType::Text => Ok(TemplateData::Text {
                value: self.value.clone(),
                breakdown: self.pairs()?,
            }),
            TemplateType::Sparkline => Ok(TemplateData::Sparkline {
                value: self
                    .numeric_value()
                    .ok_or_else(|| "sparkline needs a numeric value".to_string())?,
                display_value: self.display_value.clone(),
            }),
            TemplateType::Group => Ok(TemplateData::Group {
                payload: self.clone(),
            }),
            TemplateType::Unknown(name) => Err(format!("unknown template type '{}'", name)),
        }
    }

    /// Publish-time check. Unknown templates are let through so the
    /// resolver can show its fallback instead of an empty widget.
    pub fn validate_for(&self, template: &TemplateType) -> std::result::Result<(), String> {
        if !template.is_known() {
            return Ok(());
        }
        self.to_template_data(template).map(|_| ())
    }
}

/// Typed payload, one variant per template type.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateData {
    Gauge {
        value: f64,
        label: Option<String>,
        breakdown: Vec<KvItem>,
    },
    BarList {
        items: Vec<BarItem>,
    },
    KeyValue {
        items: Vec<KvItem>,
    },
    Text {
        value: Option<Value>,
        breakdown: Vec<KvItem>,
    },
    Sparkline {
        value: f64,
        display_value: Option<String>,
    },
    Group {
        payload: DataPayload,
    },
}

// ==========================================
// Events and sidecar protocol
// ==========================================

/// Body of a `data-update` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub id: String,
    pub data: DataPayload,
}

/// What an external sidecar process pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarRequest {
    pub module_id: String,
    /// Required on first contact, optional afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<RenderConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub schema: Vec<ConfigField>,
    #[serde(default)]
    pub data: Option<DataPayload>,
}

/// Reply to a sidecar push; `props` are the user's current settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Props>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Current state of one widget, for pull-style consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatEntry {
    pub id: String,
    #[serde(rename = "type")]
    pub template: TemplateType,
    pub title: String,
    pub data: Option<DataPayload>,
    #[serde(default, rename = "is_offline", skip_serializing_if = "is_false")]
    pub is_offline: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    pub widgets: BTreeMap<String, StatEntry>,
}

/// Entry of the module list handed to the settings panel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleInfo {
    pub module_id: String,
    pub config: RenderConfig,
    pub enabled: bool,
    pub is_sidecar: bool,
}
