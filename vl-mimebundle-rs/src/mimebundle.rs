use base64::Engine as _;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

pub const JSON_MIME_TYPE: &str = "application/json";
pub const HTML_MIME_TYPE: &str = "text/html";
pub const SVG_MIME_TYPE: &str = "image/svg+xml";
pub const PNG_MIME_TYPE: &str = "image/png";
pub const PDF_MIME_TYPE: &str = "application/pdf";

/// MIME type of a Vega spec with the given major version
pub fn vega_mime_type(major: u64) -> String {
    format!("application/vnd.vega.v{}+json", major)
}

/// MIME type of a Vega-Lite spec with the given major version
pub fn vegalite_mime_type(major: u64) -> String {
    format!("application/vnd.vegalite.v{}+json", major)
}

/// A single rendered payload
#[derive(Debug, Clone, PartialEq)]
pub enum MimeData {
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl MimeData {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            MimeData::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MimeData::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            MimeData::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Raw bytes of the payload, as they would be written to a file
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        Ok(match self {
            MimeData::Json(v) => serde_json::to_vec(v)?,
            MimeData::Text(s) => s.clone().into_bytes(),
            MimeData::Bytes(b) => b.clone(),
        })
    }

    /// JSON representation used in Jupyter display data.
    /// Binary payloads are base64 encoded.
    pub fn to_display_value(&self) -> Value {
        match self {
            MimeData::Json(v) => v.clone(),
            MimeData::Text(s) => Value::String(s.clone()),
            MimeData::Bytes(b) => {
                Value::String(base64::engine::general_purpose::STANDARD.encode(b))
            }
        }
    }
}

impl From<Value> for MimeData {
    fn from(v: Value) -> Self {
        MimeData::Json(v)
    }
}

impl From<String> for MimeData {
    fn from(s: String) -> Self {
        MimeData::Text(s)
    }
}

impl From<Vec<u8>> for MimeData {
    fn from(b: Vec<u8>) -> Self {
        MimeData::Bytes(b)
    }
}

/// Mapping from MIME type to a rendering of the same chart
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mimebundle(BTreeMap<String, MimeData>);

impl Mimebundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bundle holding exactly one entry
    pub fn single(mime_type: impl Into<String>, data: impl Into<MimeData>) -> Self {
        let mut bundle = Self::new();
        bundle.insert(mime_type, data);
        bundle
    }

    pub fn insert(&mut self, mime_type: impl Into<String>, data: impl Into<MimeData>) {
        self.0.insert(mime_type.into(), data.into());
    }

    pub fn get(&self, mime_type: &str) -> Option<&MimeData> {
        self.0.get(mime_type)
    }

    pub fn remove(&mut self, mime_type: &str) -> Option<MimeData> {
        self.0.remove(mime_type)
    }

    pub fn mime_types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MimeData)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, MimeData> {
        self.0
    }

    /// Jupyter `display_data` message content for this bundle
    pub fn to_display_data(&self) -> Value {
        serde_json::json!({
            "data": self,
            "metadata": {},
        })
    }
}

impl Serialize for Mimebundle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (mime_type, data) in &self.0 {
            map.serialize_entry(mime_type, &data.to_display_value())?;
        }
        map.end()
    }
}

impl FromIterator<(String, MimeData)> for Mimebundle {
    fn from_iter<T: IntoIterator<Item = (String, MimeData)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
