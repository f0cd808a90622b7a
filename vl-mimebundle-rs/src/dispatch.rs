use crate::engine::{EngineId, EngineRegistry};
use crate::error::{MimebundleError, Result};
use crate::format::{Format, Mode};
use crate::mimebundle::{vega_mime_type, Mimebundle, PNG_MIME_TYPE, SVG_MIME_TYPE};
use crate::options::Options;
use crate::transformer::DataTransformerRegistry;
use crate::version::vl_version_token;
use log::debug;
use serde_json::Value;

/// Renders the formats that need a conversion engine (png, svg, pdf and
/// Vega-Lite to Vega)
pub struct EngineDispatcher<'a> {
    engines: &'a EngineRegistry,
    transformers: &'a DataTransformerRegistry,
    schema_version: &'a str,
}

impl<'a> EngineDispatcher<'a> {
    pub fn new(
        engines: &'a EngineRegistry,
        transformers: &'a DataTransformerRegistry,
        schema_version: &'a str,
    ) -> Self {
        Self {
            engines,
            transformers,
            schema_version,
        }
    }

    /// Render `spec` with the engine named by the `engine` option, or the
    /// preferred available engine when the option is absent. The `engine` key
    /// is consumed; the remaining options are forwarded.
    pub fn render_with_engine(
        &self,
        spec: &Value,
        format: Format,
        mode: Mode,
        mut options: Options,
    ) -> Result<Mimebundle> {
        let engine = options.take_engine()?;
        let engine_id = self.engines.resolver().resolve(engine.as_deref(), format)?;
        debug!(
            "Rendering '{}' output with the {} engine",
            format,
            engine_id.normalized_name()
        );

        match engine_id {
            EngineId::VlConvert => self.render_with_vl_convert(spec, format, &options),
            EngineId::AltairSaver => {
                let saver = self.engines.saver().ok_or_else(|| {
                    MimebundleError::Internal(format!(
                        "Unexpected normalized_engine '{}'",
                        engine_id.normalized_name()
                    ))
                })?;
                saver
                    .render(spec, format, mode, &options)
                    .map_err(MimebundleError::Engine)
            }
        }
    }

    fn render_with_vl_convert(
        &self,
        spec: &Value,
        format: Format,
        options: &Options,
    ) -> Result<Mimebundle> {
        let converter = self.engines.vl_convert().ok_or_else(|| {
            MimebundleError::Internal("Unexpected normalized_engine 'vlconvert'".to_string())
        })?;
        let vl_version = vl_version_token(self.schema_version);

        // Row limiting stays off while vl-convert runs; both guards restore on drop
        let _default = self.transformers.enable("default", Options::new())?;
        let _unlimited = self.transformers.disable_max_rows()?;

        match format {
            Format::Vega => {
                let vg_spec = converter
                    .vegalite_to_vega(spec, &vl_version)
                    .map_err(MimebundleError::Engine)?;
                Ok(Mimebundle::single(vega_mime_type(5), vg_spec))
            }
            Format::Svg => {
                let svg = converter
                    .vegalite_to_svg(spec, &vl_version)
                    .map_err(MimebundleError::Engine)?;
                Ok(Mimebundle::single(SVG_MIME_TYPE, svg))
            }
            Format::Png => {
                let scale = options.scale_factor()?;
                let png = converter
                    .vegalite_to_png(spec, &vl_version, scale)
                    .map_err(MimebundleError::Engine)?;
                Ok(Mimebundle::single(PNG_MIME_TYPE, png))
            }
            other => Err(MimebundleError::Internal(format!(
                "Unexpected format '{}'",
                other
            ))),
        }
    }
}
