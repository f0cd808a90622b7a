use crate::error::{MimebundleError, Result};
use crate::format::Mode;
use crate::version::{SCHEMA_VERSION, VEGAEMBED_VERSION, VEGALITE_VERSION, VEGA_VERSION};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keyword options passed alongside a conversion request.
///
/// Only a handful of keys are interpreted here (`engine`, `scale_factor`,
/// and the HTML keys); every other key is forwarded untouched to the engine
/// or generator that ends up handling the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }

    /// Remove and return the `engine` option
    pub fn take_engine(&mut self) -> Result<Option<String>> {
        match self.0.remove("engine") {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(engine)) => Ok(Some(engine)),
            Some(other) => Err(MimebundleError::invalid(format!(
                "engine must be a string, received {}",
                other
            ))),
        }
    }

    /// The `scale_factor` option, defaulting to 1.0
    pub fn scale_factor(&self) -> Result<f32> {
        match self.0.get("scale_factor") {
            None | Some(Value::Null) => Ok(1.0),
            Some(Value::Number(n)) => n.as_f64().map(|n| n as f32).ok_or_else(|| {
                MimebundleError::invalid(format!("Invalid scale_factor: {}", n))
            }),
            Some(other) => Err(MimebundleError::invalid(format!(
                "scale_factor must be a number, received {}",
                other
            ))),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(MimebundleError::invalid(format!(
                "{} must be a string, received {}",
                key, other
            ))),
        }
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(MimebundleError::invalid(format!(
                "{} must be a boolean, received {}",
                key, other
            ))),
        }
    }

    pub fn get_object(&self, key: &str) -> Result<Option<&Map<String, Value>>> {
        match self.0.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(obj)) => Ok(Some(obj)),
            Some(other) => Err(MimebundleError::invalid(format!(
                "{} must be an object, received {}",
                key, other
            ))),
        }
    }

    /// Indentation requested through `json_kwds.indent`, if any
    pub fn json_indent(&self) -> Result<Option<usize>> {
        let indent = self
            .get_object("json_kwds")?
            .and_then(|kwds| kwds.get("indent"))
            .and_then(Value::as_u64);
        Ok(indent.map(|i| i as usize))
    }
}

impl From<Map<String, Value>> for Options {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl FromIterator<(String, Value)> for Options {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Library versions referenced by the generated output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Versions {
    pub vega: Option<String>,
    pub vegaembed: Option<String>,
    pub vegalite: Option<String>,
}

impl Versions {
    pub fn new(
        vega: Option<&str>,
        vegaembed: Option<&str>,
        vegalite: Option<&str>,
    ) -> Self {
        Self {
            vega: vega.map(str::to_string),
            vegaembed: vegaembed.map(str::to_string),
            vegalite: vegalite.map(str::to_string),
        }
    }
}

/// Versions and defaults applied to conversions that don't specify them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Vega-Lite schema version, used to select the vl-convert version
    pub schema_version: String,
    pub versions: Versions,
    /// Mode assumed for specs without a `$schema`
    pub mode: Mode,
}

impl BuildConfig {
    /// Read a JSON config file. Missing keys keep their defaults.
    pub fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            mode: Mode::VegaLite,
            schema_version: SCHEMA_VERSION.to_string(),
            versions: Versions::new(
                Some(VEGA_VERSION),
                Some(VEGAEMBED_VERSION),
                Some(VEGALITE_VERSION),
            ),
        }
    }
}

/// Serialize a JSON value, honouring an optional indentation width
pub fn to_json_string(value: &Value, indent: Option<usize>) -> Result<String> {
    match indent {
        None => Ok(serde_json::to_string(value)?),
        Some(width) => {
            let indent = " ".repeat(width);
            let formatter = serde_json::ser::PrettyFormatter::with_indent(indent.as_bytes());
            let mut buf = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            value.serialize(&mut ser)?;
            // serde_json only ever emits valid UTF-8
            Ok(String::from_utf8_lossy(&buf).into_owned())
        }
    }
}

/// Mode inferred from a spec's `$schema` url, e.g.
/// `https://vega.github.io/schema/vega-lite/v5.json` is vega-lite
pub fn mode_from_schema(spec: &Value) -> Option<&str> {
    let schema = spec.get("$schema")?.as_str()?;
    let mut parts = schema.rsplit('/');
    parts.next()?;
    parts.next()
}
