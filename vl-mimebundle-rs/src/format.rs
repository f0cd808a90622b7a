use crate::error::MimebundleError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Schema family that a chart specification conforms to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    Vega,
    VegaLite,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Vega => "vega",
            Mode::VegaLite => "vega-lite",
        }
    }
}

impl FromStr for Mode {
    type Err = MimebundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vega" => Ok(Mode::Vega),
            "vega-lite" => Ok(Mode::VegaLite),
            _ => Err(MimebundleError::invalid(
                "mode must be either 'vega' or 'vega-lite'",
            )),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format of a mimebundle
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Format {
    Html,
    Json,
    Png,
    Svg,
    Pdf,
    Vega,
    VegaLite,
}

impl Format {
    pub const ALL: [Format; 7] = [
        Format::Html,
        Format::Json,
        Format::Png,
        Format::Svg,
        Format::Pdf,
        Format::Vega,
        Format::VegaLite,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Format::Html => "html",
            Format::Json => "json",
            Format::Png => "png",
            Format::Svg => "svg",
            Format::Pdf => "pdf",
            Format::Vega => "vega",
            Format::VegaLite => "vega-lite",
        }
    }
}

impl FromStr for Format {
    type Err = MimebundleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Format::ALL
            .iter()
            .find(|f| f.as_str() == s)
            .copied()
            .ok_or_else(|| {
                MimebundleError::invalid(
                    "format must be one of ['html', 'json', 'png', 'svg', 'pdf', 'vega', 'vega-lite']",
                )
            })
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
