use crate::error::{MimebundleError, Result};
use crate::format::Mode;
use crate::options::{to_json_string, Options, Versions};
use serde_json::{Map, Value};

pub const DEFAULT_BASE_URL: &str = "https://cdn.jsdelivr.net/npm";
pub const DEFAULT_OUTPUT_DIV: &str = "vis";

/// Renders a chart spec as an HTML page or fragment
pub trait HtmlGenerator: Send + Sync {
    fn spec_to_html(
        &self,
        spec: &Value,
        mode: Mode,
        versions: &Versions,
        options: &Options,
    ) -> Result<String>;
}

/// HTML generator that loads vega, vega-lite and vega-embed from a CDN and
/// embeds the chart with `vegaEmbed`.
///
/// Recognized options: `output_div`, `embed_options`, `fullhtml`, `base_url`
/// and `json_kwds.indent`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbedHtmlGenerator;

impl HtmlGenerator for EmbedHtmlGenerator {
    fn spec_to_html(
        &self,
        spec: &Value,
        mode: Mode,
        versions: &Versions,
        options: &Options,
    ) -> Result<String> {
        let (vega_version, vegaembed_version) =
            match (versions.vega.as_deref(), versions.vegaembed.as_deref()) {
                (Some(vega), Some(vegaembed)) => (vega, vegaembed),
                _ => {
                    return Err(MimebundleError::invalid(
                        "must specify vega_version and vegaembed_version",
                    ))
                }
            };
        let vegalite_version = match (mode, versions.vegalite.as_deref()) {
            (Mode::VegaLite, None) => {
                return Err(MimebundleError::invalid(
                    "must specify vega-lite version for mode='vega-lite'",
                ))
            }
            (_, vegalite) => vegalite,
        };

        let output_div = options.get_str("output_div")?.unwrap_or(DEFAULT_OUTPUT_DIV);
        let base_url = options
            .get_str("base_url")?
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        let fullhtml = options.get_bool("fullhtml")?.unwrap_or(true);

        let mut embed_options: Map<String, Value> =
            options.get_object("embed_options")?.cloned().unwrap_or_default();
        embed_options.insert("mode".to_string(), Value::String(mode.to_string()));

        let mut scripts = vec![format!("{base_url}/vega@{vega_version}")];
        if let (Mode::VegaLite, Some(vegalite_version)) = (mode, vegalite_version) {
            scripts.push(format!("{base_url}/vega-lite@{vegalite_version}"));
        }
        scripts.push(format!("{base_url}/vega-embed@{vegaembed_version}"));
        let script_tags = scripts
            .iter()
            .map(|src| format!(r#"<script type="text/javascript" src="{src}"></script>"#))
            .collect::<Vec<_>>()
            .join("\n  ");

        let embed_script = get_vega_or_vegalite_script(
            spec,
            output_div,
            &Value::Object(embed_options),
            options.json_indent()?,
        )?;

        if fullhtml {
            Ok(format!(
                r##"<!DOCTYPE html>
<html>
<head>
  <style>
    #{output_div}.vega-embed {{
      width: 100%;
      display: flex;
    }}

    #{output_div}.vega-embed details,
    #{output_div}.vega-embed details summary {{
      position: relative;
    }}
  </style>
  {script_tags}
</head>
<body>
  <div id="{output_div}"></div>
  <script>
{embed_script}
  </script>
</body>
</html>
"##
            ))
        } else {
            Ok(format!(
                r##"{script_tags}
<div id="{output_div}"></div>
<script>
{embed_script}
</script>
"##
            ))
        }
    }
}

/// JavaScript snippet that embeds `spec` into the element with id `output_div`
pub fn get_vega_or_vegalite_script(
    spec: &Value,
    output_div: &str,
    embed_opts: &Value,
    indent: Option<usize>,
) -> Result<String> {
    // "</" inside a JSON string would terminate the enclosing script element
    let spec_json = to_json_string(spec, indent)?.replace("</", "<\\/");
    let embed_json = serde_json::to_string(embed_opts)?.replace("</", "<\\/");
    let opts = format!("const embedOpt = {}", embed_json);

    let index_js = format!(
        r##"
{{
    const spec = {spec_json};
    {opts};
    vegaEmbed('#{output_div}', spec, embedOpt).catch(console.error);
}}
"##,
    );
    Ok(index_js)
}
