use crate::syntax::SourceSpan;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// A node the engine requires is missing, malformed or not part of the tree.
    #[error("invalid input in {file} at {line}:{column}: {reason}")]
    InvalidInput {
        file: String,
        line: i64,
        column: i64,
        reason: String,
    },
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AnalysisError {
    pub fn invalid_at(file: &str, span: SourceSpan, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidInput {
            file: file.to_string(),
            line: span.start_line,
            column: span.start_col,
            reason: reason.into(),
        }
    }

    pub fn invalid_in(file: &str, reason: impl Into<String>) -> Self {
        AnalysisError::InvalidInput {
            file: file.to_string(),
            line: 0,
            column: 0,
            reason: reason.into(),
        }
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
