#![allow(clippy::uninlined_format_args)]

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;
use std::path::Path;
use vl_mimebundle_rs::options::mode_from_schema;
use vl_mimebundle_rs::save::{save, SaveOptions, SaveTarget};
use vl_mimebundle_rs::{
    data_transformers, BuildConfig, EngineId, EngineRegistry, MimebundleBuilder, Options,
};

/// vl-mimebundle: Render Vega and Vega-Lite specifications as display mimebundles
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a mimebundle and print it as Jupyter display data
    Bundle {
        /// Path to input Vega or Vega-Lite file
        #[arg(short, long)]
        input: String,

        /// One of html, json, png, svg, pdf, vega, vega-lite
        #[arg(short, long)]
        format: String,

        /// Path to output JSON file. Printed to stdout when omitted
        #[arg(short, long)]
        output: Option<String>,

        /// Pretty-print the display data
        #[arg(short, long)]
        pretty: bool,

        /// Maximum number of inline data rows accepted by the default data transformer
        #[arg(long, conflicts_with = "disable_max_rows")]
        max_rows: Option<u64>,

        /// Turn off the row limit of the default data transformer
        #[arg(long)]
        disable_max_rows: bool,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// Render a spec and write the result to a file
    Save {
        /// Path to input Vega or Vega-Lite file
        #[arg(short, long)]
        input: String,

        /// Path to the file to create. The extension selects the format
        /// unless --format is given
        #[arg(short, long)]
        output: String,

        /// One of json, html, png, svg, pdf
        #[arg(short, long)]
        format: Option<String>,

        /// vega-embed options as a JSON object (html output)
        #[arg(long)]
        embed_options: Option<String>,

        /// Indentation of JSON output
        #[arg(long)]
        indent: Option<usize>,

        #[command(flatten)]
        render: RenderArgs,
    },

    /// List the conversion engines available on this system
    Engines,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// vega or vega-lite. Inferred from the spec's $schema when omitted
    #[arg(short, long)]
    mode: Option<String>,

    /// Conversion engine: vl-convert or altair_saver
    #[arg(short, long)]
    engine: Option<String>,

    /// Scale factor for png and pdf output
    #[arg(short, long)]
    scale_factor: Option<f32>,

    /// JSON file with default versions and mode
    #[arg(long)]
    config: Option<String>,

    #[arg(long)]
    vega_version: Option<String>,

    #[arg(long)]
    vegalite_version: Option<String>,

    #[arg(long)]
    vegaembed_version: Option<String>,

    /// Vega-Lite schema version used to select the vl-convert version
    #[arg(long)]
    schema_version: Option<String>,

    /// Additional KEY=VALUE option forwarded to the engine. VALUE is parsed as
    /// JSON when possible
    #[arg(long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,
}

impl RenderArgs {
    /// Config file contents with command line overrides applied
    fn config(&self) -> Result<BuildConfig, anyhow::Error> {
        let mut config = match &self.config {
            Some(path) => {
                let path = shellexpand::tilde(path.trim()).into_owned();
                BuildConfig::from_path(&path)
                    .with_context(|| format!("Failed to read config file: {}", path))?
            }
            None => BuildConfig::default(),
        };
        if let Some(vega_version) = &self.vega_version {
            config.versions.vega = Some(vega_version.clone());
        }
        if let Some(vegalite_version) = &self.vegalite_version {
            config.versions.vegalite = Some(vegalite_version.clone());
        }
        if let Some(vegaembed_version) = &self.vegaembed_version {
            config.versions.vegaembed = Some(vegaembed_version.clone());
        }
        if let Some(schema_version) = &self.schema_version {
            config.schema_version = schema_version.clone();
        }
        Ok(config)
    }

    /// Explicit --mode, else the spec's $schema, else the configured mode
    fn mode(&self, spec: &Value, config: &BuildConfig) -> String {
        self.mode
            .clone()
            .or_else(|| mode_from_schema(spec).map(str::to_string))
            .unwrap_or_else(|| config.mode.to_string())
    }

    fn options(&self) -> Result<Options, anyhow::Error> {
        let mut options = Options::new();
        for pair in &self.options {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("Invalid option {:?}, expected KEY=VALUE", pair))?;
            let value = serde_json::from_str::<Value>(value)
                .unwrap_or_else(|_| Value::String(value.to_string()));
            options.insert(key, value);
        }
        if let Some(engine) = &self.engine {
            options.insert("engine", engine.as_str());
        }
        if let Some(scale_factor) = self.scale_factor {
            options.insert("scale_factor", f64::from(scale_factor));
        }
        Ok(options)
    }
}

fn read_spec(path: &str) -> Result<Value, anyhow::Error> {
    let path = shellexpand::tilde(path.trim()).into_owned();
    let spec_str = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read input file: {}", path))?;
    serde_json::from_str::<Value>(&spec_str)
        .with_context(|| format!("Failed to parse input file as JSON: {}", path))
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level));
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Bundle {
            input,
            format,
            output,
            pretty,
            max_rows,
            disable_max_rows,
            render,
        } => {
            let spec = read_spec(&input)?;
            let config = render.config()?;
            let mode = render.mode(&spec, &config);

            let transformers = data_transformers();
            let _row_limit = if disable_max_rows {
                Some(transformers.disable_max_rows()?)
            } else if let Some(max_rows) = max_rows {
                Some(transformers.enable("default", Options::new().with("max_rows", max_rows))?)
            } else {
                None
            };
            let spec = transformers.transform_spec(spec)?;

            let bundle = MimebundleBuilder::from_config(&config).spec_to_mimebundle(
                spec,
                &format,
                Some(&mode),
                &config.versions,
                render.options()?,
            )?;

            let display_data = bundle.to_display_data();
            let display_str = if pretty {
                serde_json::to_string_pretty(&display_data)?
            } else {
                serde_json::to_string(&display_data)?
            };
            match output {
                Some(output) => {
                    let output = shellexpand::tilde(output.trim()).into_owned();
                    std::fs::write(&output, display_str)
                        .with_context(|| format!("Failed to write output to {}", output))?;
                }
                None => println!("{}", display_str),
            }
        }
        Commands::Save {
            input,
            output,
            format,
            embed_options,
            indent,
            render,
        } => {
            let spec = read_spec(&input)?;
            let config = render.config()?;
            let embed_options = match embed_options {
                Some(embed_options) => match serde_json::from_str::<Value>(&embed_options)
                    .context("Failed to parse --embed-options as JSON")?
                {
                    Value::Object(obj) => obj,
                    _ => bail!("--embed-options must be a JSON object"),
                },
                None => Default::default(),
            };
            let mut json_kwds = serde_json::Map::new();
            if let Some(indent) = indent {
                json_kwds.insert("indent".to_string(), Value::from(indent));
            }

            let mode = render.mode.clone().or_else(|| {
                let inferred = mode_from_schema(&spec).is_some() || embed_options.contains_key("mode");
                (!inferred).then(|| config.mode.to_string())
            });
            let mut options = render.options()?;
            let scale_factor = options.scale_factor()?;
            options.remove("scale_factor");

            let opts = SaveOptions {
                format,
                mode,
                versions: config.versions.clone(),
                embed_options,
                json_kwds,
                scale_factor,
                options,
            };
            let output = shellexpand::tilde(output.trim()).into_owned();
            save(
                &MimebundleBuilder::from_config(&config),
                &spec,
                SaveTarget::Path(Path::new(&output)),
                opts,
            )
            .with_context(|| format!("Failed to save chart to {}", output))?;
        }
        Commands::Engines => {
            let engines = EngineRegistry::global();
            for engine in [EngineId::VlConvert, EngineId::AltairSaver] {
                let status = if engines.is_available(engine) {
                    "available"
                } else {
                    "not installed"
                };
                println!("{}: {}", engine, status);
            }
        }
    }
    Ok(())
}
