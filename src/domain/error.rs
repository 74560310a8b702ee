// ============================================================
// Layer 3 — Pipeline Errors
// ============================================================
// Every failure the data pipeline can raise. Nothing below the
// application layer recovers from these: they travel up with `?`
// and the caller decides whether to skip a batch or abort.
//
// The application and CLI layers wrap these in anyhow::Error
// with extra context (which file, which subcommand).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A line that does not have the expected number of fields,
    /// or a line index outside the file
    #[error("format error in {source_name} line {line}: {reason}")]
    Format {
        source_name: String,
        line:        usize,
        reason:      String,
    },

    /// A relation label that the vocabulary has never seen
    #[error("unknown relation '{0}'")]
    UnknownRelation(String),

    /// Nonsensical sampling or graph parameters
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Candidate lists of different lengths in one batch
    #[error("inconsistent batch: candidate list {index} has length {found}, expected {expected}")]
    InconsistentBatch {
        index:    usize,
        expected: usize,
        found:    usize,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

impl PipelineError {
    /// Shorthand for a Format error
    pub fn format(source_name: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        Self::Format {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
