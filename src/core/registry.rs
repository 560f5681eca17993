//! Live module set: built-ins fixed at construction, sidecars added and
//! removed at runtime.
//!
//! Every sidecar mutation is a single transaction under the registry's write
//! lock. Callbacks passed to `record_sidecar_data` and `remove_sidecar` run
//! inside that transaction, so a publish can never land after the removal of
//! the same id.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use super::config::{ValidationRules, WidgetRules};
use super::layout::min_size;
use super::module::{BuiltinModule, HudModule, SidecarModule};
use super::protocol::{ConfigField, DataPayload, Props, RenderConfig, OFFLINE_PROP};
use crate::error::{HudError, Result};

/// A sidecar silent for longer than this is shown as offline.
pub const SIDECAR_TTL: Duration = Duration::from_secs(10);

pub struct ModuleRegistry {
    modules: RwLock<HashMap<String, HudModule>>,
}

impl ModuleRegistry {
    pub fn new(builtins: Vec<BuiltinModule>) -> Self {
        let modules = builtins
            .into_iter()
            .map(|m| (m.id().to_string(), HudModule::Builtin(m)))
            .collect();
        Self {
            modules: RwLock::new(modules),
        }
    }

    pub fn get(&self, id: &str) -> Option<HudModule> {
        self.modules.read().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.modules.read().contains_key(id)
    }

    pub fn is_sidecar(&self, id: &str) -> bool {
        matches!(self.modules.read().get(id), Some(HudModule::Sidecar(_)))
    }

    pub fn builtins(&self) -> Vec<BuiltinModule> {
        self.modules
            .read()
            .values()
            .filter_map(|m| match m {
                HudModule::Builtin(b) => Some(b.clone()),
                HudModule::Sidecar(_) => None,
            })
            .collect()
    }

    pub fn all(&self) -> Vec<HudModule> {
        self.modules.read().values().cloned().collect()
    }

    /// Schemas of every module, keyed by id.
    pub fn schemas(&self) -> HashMap<String, Vec<ConfigField>> {
        self.modules
            .read()
            .iter()
            .map(|(id, m)| (id.clone(), m.config_schema()))
            .collect()
    }

    /// Props and layout constraints for `ConfigStore::save_with_rules`.
    pub fn validation_rules(&self) -> ValidationRules {
        let mut rules = ValidationRules::new();
        for (id, module) in self.modules.read().iter() {
            rules.insert(
                id.clone(),
                WidgetRules {
                    schema: module.config_schema(),
                    min_size: min_size(&module.template()),
                },
            );
        }
        rules
    }

    /// Add a sidecar. Fails if the id is taken by any module.
    pub fn register_sidecar(
        &self,
        id: &str,
        render: Option<RenderConfig>,
        schema: Vec<ConfigField>,
    ) -> Result<RenderConfig> {
        if id.is_empty() {
            return Err(HudError::invalid_setting("module id must not be empty"));
        }

        let mut modules = self.modules.write();
        if modules.contains_key(id) {
            return Err(HudError::duplicate_module(id));
        }

        let sidecar = SidecarModule::new(id, render, schema);
        if !sidecar.render.template.is_known() {
            log::warn!(
                "Sidecar '{}' registered with unknown template '{}'",
                id,
                sidecar.render.template
            );
        }
        let render = sidecar.render.clone();
        modules.insert(id.to_string(), HudModule::Sidecar(sidecar));
        log::info!("Registered sidecar '{}' ({})", id, render.template);
        Ok(render)
    }

    /// Refresh a registered sidecar's template and schema.
    pub fn update_sidecar_template(
        &self,
        id: &str,
        render: RenderConfig,
        schema: Vec<ConfigField>,
    ) -> Result<()> {
        let mut modules = self.modules.write();
        match modules.get_mut(id) {
            Some(HudModule::Sidecar(sidecar)) => {
                sidecar.update_template(render, schema);
                Ok(())
            }
            _ => Err(HudError::unknown_module(id)),
        }
    }

    /// Store the user's settings for a sidecar so they can be read back.
    pub fn set_sidecar_props(&self, id: &str, props: Props) {
        if let Some(HudModule::Sidecar(sidecar)) = self.modules.write().get_mut(id) {
            sidecar.props = props;
        }
    }

    /// Record a sidecar push and hand the effective payload to `publish`.
    ///
    /// `None` means "no data right now": an empty offline payload is
    /// published and the module stays registered. Returns the sidecar's
    /// current props.
    pub fn record_sidecar_data<F>(
        &self,
        id: &str,
        payload: Option<DataPayload>,
        publish: F,
    ) -> Result<Props>
    where
        F: FnOnce(&RenderConfig, DataPayload),
    {
        let mut modules = self.modules.write();
        let sidecar = match modules.get_mut(id) {
            Some(HudModule::Sidecar(sidecar)) => sidecar,
            _ => return Err(HudError::unknown_module(id)),
        };

        let payload = match payload {
            Some(payload) => {
                payload
                    .validate_for(&sidecar.render.template)
                    .map_err(|reason| {
                        HudError::template_mismatch(
                            id,
                            sidecar.render.template.as_str(),
                            reason,
                        )
                    })?;
                payload
            }
            None => DataPayload::offline(),
        };

        sidecar.mark_seen();
        sidecar.current = Some(payload.clone());
        publish(&sidecar.render, payload);
        Ok(sidecar.props.clone())
    }

    /// Remove a sidecar; `on_removed` runs before the lock is released.
    pub fn remove_sidecar<F>(&self, id: &str, on_removed: F) -> Result<()>
    where
        F: FnOnce(),
    {
        let mut modules = self.modules.write();
        if !matches!(modules.get(id), Some(HudModule::Sidecar(_))) {
            return Err(HudError::unknown_module(id));
        }
        modules.remove(id);
        on_removed();
        log::info!("Removed sidecar '{}'", id);
        Ok(())
    }

    /// Mark sidecars silent for longer than `ttl` as offline.
    ///
    /// Their last payload is re-published with the offline flag set, once
    /// per silence period.
    pub fn expire_stale<F>(&self, now: Instant, ttl: Duration, mut publish: F) -> Vec<String>
    where
        F: FnMut(&str, &RenderConfig, DataPayload),
    {
        let mut expired = Vec::new();
        let mut modules = self.modules.write();
        for module in modules.values_mut() {
            let HudModule::Sidecar(sidecar) = module else {
                continue;
            };
            if sidecar.offline || now.saturating_duration_since(sidecar.last_seen) <= ttl {
                continue;
            }

            sidecar.offline = true;
            let payload = sidecar
                .current
                .clone()
                .unwrap_or_default()
                .with_prop(OFFLINE_PROP, true);
            sidecar.current = Some(payload.clone());
            publish(&sidecar.id, &sidecar.render, payload);
            log::warn!("Sidecar '{}' timed out", sidecar.id);
            expired.push(sidecar.id.clone());
        }
        expired
    }

    /// `(render, last payload, offline)` of a sidecar.
    pub fn sidecar_state(&self, id: &str) -> Option<(RenderConfig, Option<DataPayload>, bool)> {
        match self.modules.read().get(id) {
            Some(HudModule::Sidecar(s)) => Some((s.render.clone(), s.current.clone(), s.offline)),
            _ => None,
        }
    }
}
