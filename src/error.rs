use std::fmt;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The record store or the profile provider could not be reached.
    #[error("Dependency error: {0}")]
    Dependency(String),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("{0}")]
    Other(String),
}

/// Stable, machine-checkable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Configuration,
    Dependency,
    Internal,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Dependency(_) => ErrorKind::Dependency,
            // A CSV that cannot be read at all is the caller's input problem.
            Error::Csv(_) => ErrorKind::Validation,
            Error::Migration(_) | Error::Other(_) => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Dependency => "dependency",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Dependency(e.to_string())
    }
}

impl From<rusqlite_migration::Error> for Error {
    fn from(e: rusqlite_migration::Error) -> Self {
        Error::Migration(e.to_string())
    }
}

impl<E: fmt::Display> From<tokio_rusqlite::Error<E>> for Error {
    fn from(e: tokio_rusqlite::Error<E>) -> Self {
        Error::Dependency(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
