use crate::error::{MimebundleError, Result};
use itertools::Itertools;

/// Vega-Lite schema version this crate targets
pub const SCHEMA_VERSION: &str = "5.2.0";

/// Default library versions used when generating HTML
pub const VEGA_VERSION: &str = "5";
pub const VEGALITE_VERSION: &str = "5.2.0";
pub const VEGAEMBED_VERSION: &str = "6";

/// Extract the major version from a version string such as `5.20.0` or `v5.2`.
///
/// The whole leading numeric component is used, so `10.0.0` yields 10.
pub fn major_version(version: &str) -> Result<u64> {
    let trimmed = version.strip_prefix('v').unwrap_or(version);
    let digits: String = trimmed.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse::<u64>().map_err(|_| {
        MimebundleError::invalid(format!(
            "Invalid version string {:?}: expected a leading major version number",
            version
        ))
    })
}

/// Version token understood by vl-convert, built from the first two components
/// of a schema version (`5.2.0` becomes `5_2`).
pub fn vl_version_token(schema_version: &str) -> String {
    schema_version.split('.').take(2).join("_")
}
