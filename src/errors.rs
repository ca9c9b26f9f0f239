//! Centralized error handling for ClimWrangle
//!
//! This module provides structured error types so that every pipeline stage
//! can fail with precise context instead of a generic `Box<dyn Error>`.

use std::fmt;
use std::path::PathBuf;

/// Main error type for ClimWrangle operations
#[derive(Debug)]
pub enum WrangleError {
    /// NetCDF file operation errors
    NetCDFError(netcdf::Error),

    /// I/O operation errors
    IoError(std::io::Error),

    /// Array shape or dimension error
    ArrayError(ndarray::ShapeError),

    /// JSON parsing errors (vocabulary files, clean-up configs)
    JsonError(serde_json::Error),

    /// Variable not found in dataset
    VariableNotFound { var: String },

    /// Dimension not found in variable
    DimensionNotFound { var: String, dim: String },

    /// Controlled-vocabulary key lookup failed with the `Raise` policy
    VocabKeyNotFound { vocab: String, key: String },

    /// A vocabulary mapping file could not be loaded
    MalformedVocabulary { path: PathBuf, message: String },

    /// No physically meaningful conversion between the two units
    UnitMismatch { var: String, from: String, to: String },

    /// A unit string could not be parsed
    UnitParse { unit: String },

    /// `missing_by_var` does not cover every data variable
    MissingPolicyGap { vars: Vec<String> },

    /// Time frequency cannot be mapped to season labels
    FrequencyUnsupported { freq: String },

    /// A timestamp's "MM-DD" key is absent from the season map
    SeasonKeyMissing { key: String },

    /// Unrecognized release-notes style token
    UnknownStyle { style: String },

    /// Release history file missing
    HistoryNotFound { path: PathBuf },

    /// Invalid stack/unstack specification
    InvalidStack { message: String },

    /// Generic error for everything else
    Generic(String),
}

impl fmt::Display for WrangleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WrangleError::NetCDFError(e) => write!(f, "NetCDF error: {}", e),
            WrangleError::IoError(e) => write!(f, "I/O error: {}", e),
            WrangleError::ArrayError(e) => write!(f, "Array error: {}", e),
            WrangleError::JsonError(e) => write!(f, "JSON error: {}", e),
            WrangleError::VariableNotFound { var } => {
                write!(f, "Variable '{}' not found in dataset", var)
            }
            WrangleError::DimensionNotFound { var, dim } => {
                write!(f, "Dimension '{}' not found in variable '{}'", dim, var)
            }
            WrangleError::VocabKeyNotFound { vocab, key } => {
                write!(f, "Key '{}' not found in vocabulary '{}'", key, vocab)
            }
            WrangleError::MalformedVocabulary { path, message } => {
                write!(
                    f,
                    "Malformed vocabulary file '{}': {}",
                    path.display(),
                    message
                )
            }
            WrangleError::UnitMismatch { var, from, to } => {
                write!(
                    f,
                    "No known transformation between '{}' and '{}' for variable '{}' (temporal dimensionality mismatch)",
                    from, to, var
                )
            }
            WrangleError::UnitParse { unit } => write!(f, "Could not parse unit '{}'", unit),
            WrangleError::MissingPolicyGap { vars } => {
                write!(
                    f,
                    "All variables must be covered by 'missing_by_var'; missing: [{}]",
                    vars.join(", ")
                )
            }
            WrangleError::FrequencyUnsupported { freq } => {
                write!(
                    f,
                    "Can't infer season labels for time coordinate with frequency '{}'; pass an explicit season map",
                    freq
                )
            }
            WrangleError::SeasonKeyMissing { key } => {
                write!(f, "Date key '{}' has no entry in the season map", key)
            }
            WrangleError::UnknownStyle { style } => {
                write!(f, "Unrecognized release-notes style '{}'", style)
            }
            WrangleError::HistoryNotFound { path } => {
                write!(f, "History file not found: {}", path.display())
            }
            WrangleError::InvalidStack { message } => {
                write!(f, "Invalid stack specification: {}", message)
            }
            WrangleError::Generic(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for WrangleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WrangleError::NetCDFError(e) => Some(e),
            WrangleError::IoError(e) => Some(e),
            WrangleError::ArrayError(e) => Some(e),
            WrangleError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<netcdf::Error> for WrangleError {
    fn from(error: netcdf::Error) -> Self {
        WrangleError::NetCDFError(error)
    }
}

impl From<std::io::Error> for WrangleError {
    fn from(error: std::io::Error) -> Self {
        WrangleError::IoError(error)
    }
}

impl From<ndarray::ShapeError> for WrangleError {
    fn from(error: ndarray::ShapeError) -> Self {
        WrangleError::ArrayError(error)
    }
}

impl From<serde_json::Error> for WrangleError {
    fn from(error: serde_json::Error) -> Self {
        WrangleError::JsonError(error)
    }
}

impl From<String> for WrangleError {
    fn from(error: String) -> Self {
        WrangleError::Generic(error)
    }
}

impl From<&str> for WrangleError {
    fn from(error: &str) -> Self {
        WrangleError::Generic(error.to_string())
    }
}

/// Result type alias for ClimWrangle operations
pub type Result<T> = std::result::Result<T, WrangleError>;
