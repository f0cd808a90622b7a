use std::io;

/// Errors produced while building, rendering or saving a mimebundle.
#[derive(Debug, thiserror::Error)]
pub enum MimebundleError {
    /// The caller supplied an unsupported mode, format, engine or version,
    /// or requested an engine that is not available.
    #[error("{0}")]
    InvalidArgument(String),

    /// An unreachable dispatch branch was reached.
    #[error("Internal error: `{0}`")]
    Internal(String),

    #[error("The number of rows in your dataset ({rows}) is greater than the maximum allowed ({max_rows}).\n\nTry enabling the identity data transformer or disabling the row limit with disable_max_rows().")]
    MaxRows { max_rows: u64, rows: usize },

    /// A rendering engine or the HTML generator failed.
    #[error("Conversion engine failed: {0:#}")]
    Engine(#[source] anyhow::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl MimebundleError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

pub type Result<T> = std::result::Result<T, MimebundleError>;
