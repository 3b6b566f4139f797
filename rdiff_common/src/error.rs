use thiserror::Error;

#[derive(Error, Debug)]
pub enum RDiffError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Contradictory options or missing operands; aborts before any comparison.
    #[error("{0}")]
    Usage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{pattern}: {message}")]
    Pattern { pattern: String, message: String },

    /// Standard output could not be written or flushed.
    #[error("{context}: {source}")]
    Output {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl RDiffError {
    pub fn usage(message: impl Into<String>) -> Self {
        RDiffError::Usage(message.into())
    }

    pub fn output(source: std::io::Error) -> Self {
        RDiffError::Output {
            context: "standard output".to_string(),
            source,
        }
    }

    /// Usage errors get the `--help` hint appended by the binary.
    pub fn is_usage(&self) -> bool {
        matches!(self, RDiffError::Usage(_) | RDiffError::Pattern { .. })
    }
}

pub type Result<T> = std::result::Result<T, RDiffError>;
