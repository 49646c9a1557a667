use std::fmt;
use std::io;

use crate::signature::InvocationError;
use crate::store::StoreError;

/// Errors that can occur while planning or executing a wrapped function
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed mapping '{raw}': {reason}")]
    MalformedMapping { raw: String, reason: String },

    #[error("unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("missing required parameter '{0}'")]
    MissingRequiredParameter(String),

    #[error("unknown output slot '{0}'")]
    UnknownOutput(String),

    #[error("argument index {index} out of range ({available} arguments available)")]
    IndexOutOfRange { index: usize, available: usize },

    #[error("unknown option '{0}'")]
    UnknownOption(String),

    #[error("cannot load dataset \"{root}/{subpath}\": no such dataset")]
    MissingDataset { root: String, subpath: String },

    #[error("dataset already exists: {root}/{subpath}")]
    DatasetExists { root: String, subpath: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unexpected function result: {0}")]
    OutputShape(String),

    #[error(transparent)]
    Invocation(#[from] InvocationError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Enumerated error kind, used when reporting failed iterations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedMapping,
    UnknownParameter,
    MissingRequiredParameter,
    UnknownOutput,
    IndexOutOfRange,
    UnknownOption,
    MissingDataset,
    DatasetExists,
    InvalidArguments,
    OutputShape,
    InvocationError,
    StoreIOError,
    ConfigError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::MalformedMapping => "MalformedMapping",
            ErrorKind::UnknownParameter => "UnknownParameter",
            ErrorKind::MissingRequiredParameter => "MissingRequiredParameter",
            ErrorKind::UnknownOutput => "UnknownOutput",
            ErrorKind::IndexOutOfRange => "IndexOutOfRange",
            ErrorKind::UnknownOption => "UnknownOption",
            ErrorKind::MissingDataset => "MissingDataset",
            ErrorKind::DatasetExists => "DatasetExists",
            ErrorKind::InvalidArguments => "InvalidArguments",
            ErrorKind::OutputShape => "OutputShape",
            ErrorKind::InvocationError => "InvocationError",
            ErrorKind::StoreIOError => "StoreIOError",
            ErrorKind::ConfigError => "ConfigError",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn malformed(raw: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedMapping {
            raw: raw.into(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MalformedMapping { .. } => ErrorKind::MalformedMapping,
            Error::UnknownParameter(_) => ErrorKind::UnknownParameter,
            Error::MissingRequiredParameter(_) => ErrorKind::MissingRequiredParameter,
            Error::UnknownOutput(_) => ErrorKind::UnknownOutput,
            Error::IndexOutOfRange { .. } => ErrorKind::IndexOutOfRange,
            Error::UnknownOption(_) => ErrorKind::UnknownOption,
            Error::MissingDataset { .. } => ErrorKind::MissingDataset,
            Error::DatasetExists { .. } => ErrorKind::DatasetExists,
            Error::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Error::OutputShape(_) => ErrorKind::OutputShape,
            Error::Invocation(_) => ErrorKind::InvocationError,
            Error::Store(_) | Error::IoError(_) => ErrorKind::StoreIOError,
            Error::ConfigError(_) | Error::SerializationError(_) => ErrorKind::ConfigError,
        }
    }

    /// Configuration-time errors abort before any iteration starts
    pub fn is_configuration(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::MalformedMapping
                | ErrorKind::UnknownParameter
                | ErrorKind::MissingRequiredParameter
                | ErrorKind::UnknownOutput
                | ErrorKind::InvalidArguments
                | ErrorKind::ConfigError
        )
    }
}

/// Result type alias for comliner operations
pub type Result<T> = std::result::Result<T, Error>;
