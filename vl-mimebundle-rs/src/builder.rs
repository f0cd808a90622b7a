use crate::dispatch::EngineDispatcher;
use crate::engine::EngineRegistry;
use crate::error::{MimebundleError, Result};
use crate::format::{Format, Mode};
use crate::html::{EmbedHtmlGenerator, HtmlGenerator};
use crate::mimebundle::{
    vega_mime_type, vegalite_mime_type, Mimebundle, HTML_MIME_TYPE, JSON_MIME_TYPE,
};
use crate::options::{BuildConfig, Options, Versions};
use crate::transformer::{data_transformers, DataTransformerRegistry};
use crate::version::{major_version, SCHEMA_VERSION};
use serde_json::Value;
use std::sync::Arc;

/// Converts chart specs into mimebundles.
///
/// # Examples
///
/// ```
/// use vl_mimebundle_rs::{Format, MimebundleBuilder, Mode, Options, Versions};
///
/// let spec = serde_json::json!({"mark": "bar"});
/// let bundle = MimebundleBuilder::new()
///     .build(
///         spec.clone(),
///         Format::VegaLite,
///         Mode::VegaLite,
///         &Versions::new(None, None, Some("5.2.0")),
///         Options::new(),
///     )
///     .unwrap();
///
/// let data = bundle.get("application/vnd.vegalite.v5+json").unwrap();
/// assert_eq!(data.as_json(), Some(&spec));
/// ```
#[derive(Clone)]
pub struct MimebundleBuilder {
    engines: EngineRegistry,
    transformers: Arc<DataTransformerRegistry>,
    html: Arc<dyn HtmlGenerator>,
    schema_version: String,
}

impl MimebundleBuilder {
    /// Builder using the process-wide engine and data transformer registries
    pub fn new() -> Self {
        Self {
            engines: EngineRegistry::global(),
            transformers: data_transformers(),
            html: Arc::new(EmbedHtmlGenerator),
            schema_version: SCHEMA_VERSION.to_string(),
        }
    }

    /// Builder using the schema version of `config`
    pub fn from_config(config: &BuildConfig) -> Self {
        Self::new().with_schema_version(config.schema_version.as_str())
    }

    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_transformers(mut self, transformers: Arc<DataTransformerRegistry>) -> Self {
        self.transformers = transformers;
        self
    }

    pub fn with_html_generator(mut self, html: Arc<dyn HtmlGenerator>) -> Self {
        self.html = html;
        self
    }

    pub fn with_schema_version(mut self, schema_version: impl Into<String>) -> Self {
        self.schema_version = schema_version.into();
        self
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    pub fn transformers(&self) -> &DataTransformerRegistry {
        &self.transformers
    }

    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// Convert `spec` into a mimebundle holding the requested `format`
    pub fn build(
        &self,
        spec: Value,
        format: Format,
        mode: Mode,
        versions: &Versions,
        options: Options,
    ) -> Result<Mimebundle> {
        if mode == Mode::Vega && format == Format::Vega {
            let vega_version = versions
                .vega
                .as_deref()
                .ok_or_else(|| MimebundleError::invalid("Must specify vega_version"))?;
            return Ok(Mimebundle::single(
                vega_mime_type(major_version(vega_version)?),
                spec,
            ));
        }

        match format {
            Format::Png | Format::Svg | Format::Pdf | Format::Vega => {
                EngineDispatcher::new(&self.engines, &self.transformers, &self.schema_version)
                    .render_with_engine(&spec, format, mode, options)
            }
            Format::Html => {
                let html = self.html.spec_to_html(&spec, mode, versions, &options)?;
                Ok(Mimebundle::single(HTML_MIME_TYPE, html))
            }
            Format::VegaLite => {
                if mode == Mode::Vega {
                    return Err(MimebundleError::invalid(
                        "Cannot convert a vega spec to vegalite",
                    ));
                }
                let vegalite_version = versions
                    .vegalite
                    .as_deref()
                    .ok_or_else(|| MimebundleError::invalid("Must specify vegalite_version"))?;
                Ok(Mimebundle::single(
                    vegalite_mime_type(major_version(vegalite_version)?),
                    spec,
                ))
            }
            Format::Json => Ok(Mimebundle::single(JSON_MIME_TYPE, spec)),
        }
    }

    /// String-typed entry point: validates `mode` and `format` before building
    pub fn spec_to_mimebundle(
        &self,
        spec: Value,
        format: &str,
        mode: Option<&str>,
        versions: &Versions,
        options: Options,
    ) -> Result<Mimebundle> {
        let mode: Mode = mode
            .ok_or_else(|| MimebundleError::invalid("mode must be either 'vega' or 'vega-lite'"))?
            .parse()?;
        let format: Format = format.parse()?;
        self.build(spec, format, mode, versions, options)
    }
}

impl Default for MimebundleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Convert a vega or vega-lite spec to a mimebundle using the process-wide
/// engine registry.
///
/// `format` is one of `html`, `json`, `png`, `svg`, `pdf`, `vega` and
/// `vega-lite`; `mode` is `vega` or `vega-lite`.
pub fn spec_to_mimebundle(
    spec: Value,
    format: &str,
    mode: Option<&str>,
    versions: &Versions,
    options: Options,
) -> Result<Mimebundle> {
    MimebundleBuilder::new().spec_to_mimebundle(spec, format, mode, versions, options)
}
