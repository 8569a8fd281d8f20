use thiserror::Error;

use crate::models::CheckResult;

pub type Result<T> = std::result::Result<T, CheckError>;

/// Every way a single file check can go wrong. None of these stop the worker.
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("File not found")]
    NotFound,

    #[error("File is not readable: {0}")]
    Unreadable(String),

    #[error("Not an audio file")]
    UnsupportedType,

    #[error("{tool} not found")]
    ToolMissing { tool: String },

    #[error("{tool} timed out after {secs}s")]
    ToolTimeout { tool: String, secs: u64 },

    #[error("{tool} exited with {code}: {stderr}")]
    ToolNonZeroExit {
        tool: String,
        code: String,
        stderr: String,
    },

    #[error("Unrecognized {tool} output: {output}")]
    UnparseableOutput { tool: String, output: String },

    #[error("Could not determine bitrate")]
    IndeterminateBitrate,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CheckError {
    /// Resolve the error into the result recorded for the file.
    pub fn into_result(self) -> CheckResult {
        match self {
            CheckError::UnsupportedType => CheckResult::skipped(self.to_string()),
            CheckError::IndeterminateBitrate | CheckError::NotFound | CheckError::Unreadable(_) => {
                CheckResult::error(self.to_string())
            }
            CheckError::UnparseableOutput { .. } => CheckResult::error(self.to_string()),
            other => CheckResult::error(format!("Could not determine bitrate: {}", other)),
        }
    }
}
