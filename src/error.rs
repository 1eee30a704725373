//! Error taxonomy for a validation run.
//!
//! Extraction calls return `Result<Fetched<T>>`: `Ok(Fetched::Found)` carries data,
//! `Ok(Fetched::Skipped)` marks an expected absence for one cadence, and `Err`
//! is a structural failure whose [`Error::scope`] tells the engine how far to unwind.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while extracting and comparing pixel data.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration; fatal before any cadence is processed.
    #[error("usage error: {0}")]
    Usage(String),

    /// No export or task file covers the requested cadence.
    #[error("could not find {kind} file in {} for cadence {cadence} (approx {timestamp})", dir.display())]
    FileAccess {
        kind: String,
        dir: PathBuf,
        cadence: i32,
        timestamp: String,
    },

    /// A whole category has no files for the run.
    #[error("no {kind} files found in {}", dir.display())]
    NoFiles { kind: String, dir: PathBuf },

    /// File contents disagree with what was expected of the file.
    #[error("{}: {message}", file.display())]
    Format { file: PathBuf, message: String },

    /// Two sources disagree on pixel membership or on a collateral collision.
    #[error("state inconsistency: {0}")]
    StateInconsistency(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A task artifact could not be decoded.
    #[error("{}: artifact decode failed: {message}", path.display())]
    Artifact { path: PathBuf, message: String },

    /// Terminal outcome of a run whose report contains mismatches.
    #[error("Task and FITS files differ; see log ({errors} errors in {compared} values)")]
    ValidationFailed { errors: u64, compared: u64 },
}

/// How far an error unwinds inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Abandon the affected cadence; the sweep continues.
    Cadence,
    /// Count as a mismatch; the sweep continues.
    Mismatch,
    /// Abandon the current category for the work unit.
    Category,
    /// Abandon the run.
    Run,
}

impl Error {
    pub fn format(file: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Format {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::Usage(_) | Error::ValidationFailed { .. } => ErrorScope::Run,
            Error::NoFiles { .. } => ErrorScope::Category,
            Error::StateInconsistency(_) => ErrorScope::Mismatch,
            Error::FileAccess { .. }
            | Error::Format { .. }
            | Error::Io { .. }
            | Error::Artifact { .. } => ErrorScope::Cadence,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a per-cadence fetch that may legitimately find nothing.
#[derive(Debug)]
pub enum Fetched<T> {
    Found(T),
    /// Expected absence; the reason is logged and the cadence skipped.
    Skipped(Error),
}

impl<T> Fetched<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        match self {
            Fetched::Found(v) => Fetched::Found(f(v)),
            Fetched::Skipped(e) => Fetched::Skipped(e),
        }
    }

    pub fn found(self) -> Option<T> {
        match self {
            Fetched::Found(v) => Some(v),
            Fetched::Skipped(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Fetched::Found(_))
    }
}

/// Unwraps `Fetched::Found`, returning `Ok(Fetched::Skipped(..))` from the
/// enclosing function otherwise.
macro_rules! try_found {
    ($e:expr) => {
        match $e {
            $crate::error::Fetched::Found(v) => v,
            $crate::error::Fetched::Skipped(e) => return Ok($crate::error::Fetched::Skipped(e)),
        }
    };
}
pub(crate) use try_found;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_access_message_names_cadence() {
        let e = Error::FileAccess {
            kind: "targ".to_string(),
            dir: PathBuf::from("/data/in"),
            cadence: 1234,
            timestamp: "2009123010203".to_string(),
        };
        let msg = e.to_string();
        assert!(msg.contains("cadence 1234"));
        assert!(msg.contains("approx 2009123010203"));
        assert_eq!(e.scope(), ErrorScope::Cadence);
    }

    #[test]
    fn test_scopes() {
        assert_eq!(Error::Usage("x".into()).scope(), ErrorScope::Run);
        assert_eq!(
            Error::StateInconsistency("x".into()).scope(),
            ErrorScope::Mismatch
        );
        let e = Error::NoFiles {
            kind: "bkg".into(),
            dir: PathBuf::from("."),
        };
        assert_eq!(e.scope(), ErrorScope::Category);
    }

    #[test]
    fn test_fetched_map() {
        let f: Fetched<i32> = Fetched::Found(2);
        assert_eq!(f.map(|v| v * 2).found(), Some(4));
        let s: Fetched<i32> = Fetched::Skipped(Error::Usage("gone".into()));
        assert!(!s.is_found());
    }
}
