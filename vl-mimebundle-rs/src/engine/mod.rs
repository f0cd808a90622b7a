pub mod process;

use crate::error::{MimebundleError, Result};
use crate::format::{Format, Mode};
use crate::mimebundle::Mimebundle;
use crate::options::Options;
use log::debug;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use process::{VegaCliSaver, VlConvertCli};

lazy_static! {
    static ref GLOBAL_ENGINES: EngineRegistry = EngineRegistry::detect();
}

/// Conversion engines that can render a chart
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum EngineId {
    VlConvert,
    AltairSaver,
}

impl EngineId {
    /// Name with case and separators removed, used for matching user input
    pub fn normalized_name(&self) -> &'static str {
        match self {
            EngineId::VlConvert => "vlconvert",
            EngineId::AltairSaver => "altairsaver",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineId::VlConvert => "vl-convert",
            EngineId::AltairSaver => "altair_saver",
        }
    }
}

impl FromStr for EngineId {
    type Err = MimebundleError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.to_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "vlconvert" => Ok(EngineId::VlConvert),
            "altairsaver" => Ok(EngineId::AltairSaver),
            _ => Err(MimebundleError::invalid(format!(
                "Invalid conversion engine '{}'. Expected one of ('vl-convert', 'altair_saver')",
                s
            ))),
        }
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Vega-Lite to Vega/SVG/PNG converter with the interface of vl-convert
pub trait VlConvertEngine: Send + Sync {
    fn vegalite_to_vega(&self, vl_spec: &Value, vl_version: &str) -> anyhow::Result<Value>;

    fn vegalite_to_svg(&self, vl_spec: &Value, vl_version: &str) -> anyhow::Result<String>;

    fn vegalite_to_png(
        &self,
        vl_spec: &Value,
        vl_version: &str,
        scale: f32,
    ) -> anyhow::Result<Vec<u8>>;
}

/// General purpose renderer with the interface of altair_saver
pub trait SaverEngine: Send + Sync {
    fn render(
        &self,
        spec: &Value,
        format: Format,
        mode: Mode,
        options: &Options,
    ) -> anyhow::Result<Mimebundle>;
}

/// Capability registry of the conversion engines installed in this process.
///
/// An engine that isn't registered is treated as not installed.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    vl_convert: Option<Arc<dyn VlConvertEngine>>,
    saver: Option<Arc<dyn SaverEngine>>,
}

impl EngineRegistry {
    /// Registry with no engines available
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry populated with the engine executables found on `PATH`
    pub fn detect() -> Self {
        let mut registry = Self::new();
        if let Some(vl_convert) = VlConvertCli::detect() {
            registry.vl_convert = Some(Arc::new(vl_convert));
        }
        if let Some(saver) = VegaCliSaver::detect() {
            registry.saver = Some(Arc::new(saver));
        }
        debug!(
            "Detected conversion engines: vl-convert={}, altair_saver={}",
            registry.vl_convert.is_some(),
            registry.saver.is_some()
        );
        registry
    }

    pub fn with_vl_convert(mut self, engine: Arc<dyn VlConvertEngine>) -> Self {
        self.vl_convert = Some(engine);
        self
    }

    pub fn with_saver(mut self, engine: Arc<dyn SaverEngine>) -> Self {
        self.saver = Some(engine);
        self
    }

    pub fn vl_convert(&self) -> Option<&Arc<dyn VlConvertEngine>> {
        self.vl_convert.as_ref()
    }

    pub fn saver(&self) -> Option<&Arc<dyn SaverEngine>> {
        self.saver.as_ref()
    }

    pub fn is_available(&self, engine: EngineId) -> bool {
        match engine {
            EngineId::VlConvert => self.vl_convert.is_some(),
            EngineId::AltairSaver => self.saver.is_some(),
        }
    }

    pub fn resolver(&self) -> EngineResolver {
        EngineResolver {
            vl_convert_available: self.vl_convert.is_some(),
            saver_available: self.saver.is_some(),
        }
    }

    /// Snapshot of the process-wide registry
    pub fn global() -> Self {
        GLOBAL_ENGINES.clone()
    }
}

impl fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("vl_convert", &self.vl_convert.is_some())
            .field("saver", &self.saver.is_some())
            .finish()
    }
}

/// Chooses the engine for a conversion from the user's request and the
/// engines that are available
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct EngineResolver {
    pub vl_convert_available: bool,
    pub saver_available: bool,
}

impl EngineResolver {
    pub fn resolve(&self, engine: Option<&str>, format: Format) -> Result<EngineId> {
        let requested = engine.map(EngineId::from_str).transpose()?;

        match requested {
            Some(EngineId::VlConvert) => {
                if !self.vl_convert_available {
                    return Err(MimebundleError::invalid(
                        "The 'vl-convert' conversion engine requires the vl-convert-python package",
                    ));
                }
                if format == Format::Pdf {
                    return Err(MimebundleError::invalid(format!(
                        "The 'vl-convert' conversion engine does not support the '{}' format.\n\
                         Use the 'altair_saver' engine instead",
                        format
                    )));
                }
                Ok(EngineId::VlConvert)
            }
            Some(EngineId::AltairSaver) => {
                if !self.saver_available {
                    return Err(MimebundleError::invalid(
                        "The 'altair_saver' conversion engine requires the altair_saver package",
                    ));
                }
                Ok(EngineId::AltairSaver)
            }
            None => {
                if self.vl_convert_available && format != Format::Pdf {
                    Ok(EngineId::VlConvert)
                } else if self.saver_available {
                    Ok(EngineId::AltairSaver)
                } else if format == Format::Pdf {
                    Err(MimebundleError::invalid(format!(
                        "Saving charts in '{}' format requires the altair_saver package: \
                         see http://github.com/altair-viz/altair_saver/",
                        format
                    )))
                } else {
                    Err(MimebundleError::invalid(format!(
                        "Saving charts in '{}' format requires the vl-convert-python or altair_saver package: \
                         see http://github.com/altair-viz/altair_saver/",
                        format
                    )))
                }
            }
        }
    }
}
