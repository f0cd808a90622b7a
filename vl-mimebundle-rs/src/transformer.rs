//! Registry of data transformers applied to chart data before rendering
//!
//! The registry holds named transformer plugins, the active plugin and the
//! options it runs with. `enable` and `disable_max_rows` return a
//! [`PluginEnabler`] guard that puts the previous configuration back when it
//! goes out of scope, so temporary overrides are undone on every exit path.

use crate::error::{MimebundleError, Result};
use crate::options::Options;
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

pub const DATA_TRANSFORMER_GROUP: &str = "altair.vegalite.v5.data_transformer";

/// Row limit applied by the `default` transformer when `max_rows` is not set
pub const DEFAULT_MAX_ROWS: u64 = 5000;

pub type DataTransformer = Arc<dyn Fn(Value, &Options) -> Result<Value> + Send + Sync>;

lazy_static! {
    static ref DATA_TRANSFORMERS: Arc<DataTransformerRegistry> =
        Arc::new(DataTransformerRegistry::with_builtins());
}

/// Process-wide data transformer registry.
///
/// Overrides taken through this registry from several threads at once can
/// interleave and restore each other's state; use a dedicated registry when
/// that matters.
pub fn data_transformers() -> Arc<DataTransformerRegistry> {
    DATA_TRANSFORMERS.clone()
}

#[derive(Clone, Default)]
struct RegistryState {
    active: Option<DataTransformer>,
    active_name: String,
    plugins: HashMap<String, DataTransformer>,
    options: Options,
    global_settings: Options,
}

pub struct DataTransformerRegistry {
    entry_point_group: String,
    state: Mutex<RegistryState>,
}

impl DataTransformerRegistry {
    pub fn new(entry_point_group: impl Into<String>) -> Self {
        Self {
            entry_point_group: entry_point_group.into(),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Registry with the `default` and `identity` transformers, `default` enabled
    pub fn with_builtins() -> Self {
        let registry = Self::new(DATA_TRANSFORMER_GROUP);
        registry.register("default", Some(Arc::new(limit_rows)));
        registry.register("identity", Some(Arc::new(identity)));
        {
            let mut state = registry.lock();
            state.active = state.plugins.get("default").cloned();
            state.active_name = "default".to_string();
            state.global_settings.insert("consolidate_datasets", true);
        }
        registry
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a plugin under `name`, or unregister it when `value` is `None`.
    /// Returns the plugin that was registered or removed.
    pub fn register(
        &self,
        name: &str,
        value: Option<DataTransformer>,
    ) -> Option<DataTransformer> {
        let mut state = self.lock();
        match value {
            None => state.plugins.remove(name),
            Some(plugin) => {
                state.plugins.insert(name.to_string(), plugin.clone());
                Some(plugin)
            }
        }
    }

    /// Sorted names of the registered plugins
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lock().plugins.keys().cloned().collect();
        names.sort();
        names
    }

    /// Name of the active plugin
    pub fn active(&self) -> String {
        self.lock().active_name.clone()
    }

    /// Options the active plugin runs with
    pub fn options(&self) -> Options {
        self.lock().options.clone()
    }

    /// Settings shared by all plugins, such as `consolidate_datasets`
    pub fn global_settings(&self) -> Options {
        self.lock().global_settings.clone()
    }

    /// Activate the plugin `name` with `options` until the returned guard is dropped.
    ///
    /// Options whose key is a global setting update that setting instead of
    /// being passed to the plugin.
    pub fn enable(&self, name: &str, mut options: Options) -> Result<PluginEnabler<'_>> {
        let mut state = self.lock();
        let plugin = state.plugins.get(name).cloned().ok_or_else(|| {
            MimebundleError::invalid(format!(
                "No '{}' entry point found in group '{}'",
                name, self.entry_point_group
            ))
        })?;
        let original_state = state.clone();
        debug!("Enabling data transformer '{}'", name);
        state.active = Some(plugin);
        state.active_name = name.to_string();
        let global_keys: Vec<String> = state
            .global_settings
            .iter()
            .map(|(key, _)| key.clone())
            .filter(|key| options.contains_key(key))
            .collect();
        for key in global_keys {
            if let Some(value) = options.remove(&key) {
                state.global_settings.insert(key, value);
            }
        }
        state.options = options;
        Ok(PluginEnabler {
            registry: self,
            name: name.to_string(),
            original_state: Some(original_state),
        })
    }

    /// Re-enable the active plugin with new options
    pub fn enable_active(&self, options: Options) -> Result<PluginEnabler<'_>> {
        let name = self.active();
        self.enable(&name, options)
    }

    /// Lift the row limit of the `default` transformer until the guard is dropped.
    /// Other transformers keep their options.
    pub fn disable_max_rows(&self) -> Result<PluginEnabler<'_>> {
        let (name, mut options) = {
            let state = self.lock();
            (state.active_name.clone(), state.options.clone())
        };
        if name == "default" {
            options.insert("max_rows", Value::Null);
        }
        self.enable(&name, options)
    }

    /// Apply the active transformer to a data object
    pub fn transform(&self, data: Value) -> Result<Value> {
        let (active, options) = {
            let state = self.lock();
            (state.active.clone(), state.options.clone())
        };
        match active {
            Some(transformer) => transformer(data, &options),
            None => Ok(data),
        }
    }

    /// Apply the active transformer to the top-level `data` of a spec and to
    /// each entry of its `datasets`
    pub fn transform_spec(&self, mut spec: Value) -> Result<Value> {
        if let Some(obj) = spec.as_object_mut() {
            if let Some(data) = obj.remove("data") {
                obj.insert("data".to_string(), self.transform(data)?);
            }
            if let Some(Value::Object(datasets)) = obj.get_mut("datasets") {
                for dataset in datasets.values_mut() {
                    *dataset = self.transform(dataset.take())?;
                }
            }
        }
        Ok(spec)
    }

    fn set_state(&self, state: RegistryState) {
        *self.lock() = state;
    }
}

impl fmt::Debug for DataTransformerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DataTransformerRegistry(active={:?}, registered={:?})",
            self.active(),
            self.names()
        )
    }
}

/// Guard returned by [`DataTransformerRegistry::enable`].
///
/// Restores the registry to the state it had before the plugin was enabled
/// when dropped, unless [`PluginEnabler::keep`] was called.
#[must_use = "the previous transformer is restored as soon as the guard is dropped"]
pub struct PluginEnabler<'a> {
    registry: &'a DataTransformerRegistry,
    name: String,
    original_state: Option<RegistryState>,
}

impl PluginEnabler<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leave the plugin enabled after the guard is gone
    pub fn keep(mut self) {
        self.original_state = None;
    }
}

impl Drop for PluginEnabler<'_> {
    fn drop(&mut self) {
        if let Some(state) = self.original_state.take() {
            debug!("Restoring data transformer '{}'", state.active_name);
            self.registry.set_state(state);
        }
    }
}

impl fmt::Debug for PluginEnabler<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DataTransformerRegistry.enable({:?})", self.name)
    }
}

/// The `identity` transformer: pass data through unchanged
pub fn identity(data: Value, _options: &Options) -> Result<Value> {
    Ok(data)
}

/// The `default` transformer: reject inline datasets longer than `max_rows`.
/// A `max_rows` of null disables the check.
pub fn limit_rows(data: Value, options: &Options) -> Result<Value> {
    let max_rows = match options.get("max_rows") {
        None => Some(DEFAULT_MAX_ROWS),
        Some(Value::Null) => None,
        Some(value) => Some(value.as_u64().ok_or_else(|| {
            MimebundleError::invalid(format!(
                "max_rows must be a non-negative integer, received {}",
                value
            ))
        })?),
    };

    if let Some(max_rows) = max_rows {
        let rows = match &data {
            Value::Array(values) => Some(values.len()),
            Value::Object(obj) => obj
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.len()),
            _ => None,
        };
        if let Some(rows) = rows {
            if rows as u64 > max_rows {
                return Err(MimebundleError::MaxRows { max_rows, rows });
            }
        }
    }
    Ok(data)
}
