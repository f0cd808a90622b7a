use crate::builder::MimebundleBuilder;
use crate::error::{MimebundleError, Result};
use crate::format::Mode;
use crate::mimebundle::{Mimebundle, HTML_MIME_TYPE, PDF_MIME_TYPE, PNG_MIME_TYPE, SVG_MIME_TYPE};
use crate::options::{mode_from_schema, to_json_string, Options, Versions};
use log::debug;
use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::Path;

/// Where a saved chart is written
pub enum SaveTarget<'a> {
    Path(&'a Path),
    Writer(&'a mut dyn Write),
}

impl SaveTarget<'_> {
    fn write(&mut self, content: &[u8]) -> Result<()> {
        match self {
            SaveTarget::Path(path) => fs::write(path, content)?,
            SaveTarget::Writer(writer) => writer.write_all(content)?,
        }
        Ok(())
    }

    /// File format implied by the target's extension. A path without one
    /// yields its file name, which is then rejected as an unknown format.
    fn format_from_extension(&self) -> Option<String> {
        match self {
            SaveTarget::Path(path) => path
                .extension()
                .or_else(|| path.file_name())
                .map(|ext| ext.to_string_lossy().into_owned()),
            SaveTarget::Writer(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveOptions {
    /// `json`, `html`, `png`, `svg` or `pdf`. Inferred from the file
    /// extension when unset.
    pub format: Option<String>,
    /// Inferred from `embed_options.mode` or the spec's `$schema` when unset
    pub mode: Option<String>,
    pub versions: Versions,
    pub embed_options: Map<String, Value>,
    pub json_kwds: Map<String, Value>,
    pub scale_factor: f32,
    /// Extra options forwarded to the mimebundle builder
    pub options: Options,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            format: None,
            mode: None,
            versions: Versions::default(),
            embed_options: Map::new(),
            json_kwds: Map::new(),
            scale_factor: 1.0,
            options: Options::new(),
        }
    }
}

impl SaveOptions {
    fn resolve_mode(&self, spec: &Value) -> Result<Mode> {
        let mode = match &self.mode {
            Some(mode) => mode.clone(),
            None => match self.embed_options.get("mode").and_then(Value::as_str) {
                Some(mode) => mode.to_string(),
                None => mode_from_schema(spec)
                    .unwrap_or(Mode::VegaLite.as_str())
                    .to_string(),
            },
        };
        mode.parse::<Mode>().map_err(|_| {
            MimebundleError::invalid(format!(
                "mode must be 'vega' or 'vega-lite', not '{}'",
                mode
            ))
        })
    }
}

/// Save a chart spec in one of several file formats
pub fn save(
    builder: &MimebundleBuilder,
    spec: &Value,
    mut target: SaveTarget<'_>,
    opts: SaveOptions,
) -> Result<()> {
    let format = match opts.format.clone().or_else(|| target.format_from_extension()) {
        Some(format) => format,
        None => {
            return Err(MimebundleError::invalid(
                "must specify file format: ['png', 'svg', 'pdf', 'html', 'json']",
            ))
        }
    };

    let mode = opts.resolve_mode(spec)?;
    if mode == Mode::VegaLite && opts.versions.vegalite.is_none() {
        return Err(MimebundleError::invalid("must specify vega-lite version"));
    }
    debug!("Saving {} chart as {}", mode, format);

    match format.as_str() {
        "json" => {
            let indent = opts
                .json_kwds
                .get("indent")
                .and_then(Value::as_u64)
                .map(|i| i as usize);
            let json_spec = to_json_string(spec, indent)?;
            target.write(json_spec.as_bytes())
        }
        "html" => {
            let mut options = opts.options.clone();
            options.insert("embed_options", Value::Object(opts.embed_options.clone()));
            options.insert("json_kwds", Value::Object(opts.json_kwds.clone()));
            let mut bundle = builder.spec_to_mimebundle(
                spec.clone(),
                &format,
                Some(mode.as_str()),
                &opts.versions,
                options,
            )?;
            let html = take_output(&mut bundle, HTML_MIME_TYPE)?;
            target.write(&html)
        }
        "png" | "svg" | "pdf" => {
            let mut options = opts.options.clone();
            options.insert("scale_factor", f64::from(opts.scale_factor));
            let mut bundle = builder.spec_to_mimebundle(
                spec.clone(),
                &format,
                Some(mode.as_str()),
                &opts.versions,
                options,
            )?;
            let mime_type = match format.as_str() {
                "png" => PNG_MIME_TYPE,
                "pdf" => PDF_MIME_TYPE,
                _ => SVG_MIME_TYPE,
            };
            let content = take_output(&mut bundle, mime_type)?;
            target.write(&content)
        }
        other => Err(MimebundleError::invalid(format!(
            "unrecognized format: '{}'",
            other
        ))),
    }
}

fn take_output(bundle: &mut Mimebundle, mime_type: &str) -> Result<Vec<u8>> {
    let data = bundle.remove(mime_type).ok_or_else(|| {
        MimebundleError::Engine(anyhow::anyhow!(
            "Conversion did not produce '{}' output",
            mime_type
        ))
    })?;
    Ok(data.to_bytes()?)
}
