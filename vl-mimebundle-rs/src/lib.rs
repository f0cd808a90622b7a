// Allow uninlined format args for cleaner bail!/anyhow! macros
#![allow(clippy::uninlined_format_args)]
#![doc = include_str!("../README.md")]

pub mod builder;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod format;
pub mod html;
pub mod mimebundle;
pub mod options;
pub mod save;
pub mod transformer;
pub mod version;

#[macro_use]
extern crate lazy_static;

pub use builder::{spec_to_mimebundle, MimebundleBuilder};
pub use engine::{EngineId, EngineRegistry, EngineResolver, SaverEngine, VlConvertEngine};
pub use error::MimebundleError;
pub use format::{Format, Mode};
pub use mimebundle::{MimeData, Mimebundle};
pub use options::{BuildConfig, Options, Versions};
pub use transformer::{data_transformers, DataTransformerRegistry};

pub use anyhow;
pub use serde_json;
