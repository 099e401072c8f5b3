use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use audience_sync::error::SyncError;

/// Result type for syncer operations.
pub type SyncerResult<T> = Result<T, SyncerError>;

/// Captured backtrace wrapper so variants can carry one without thiserror's nightly support.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type of the syncer binary.
///
/// Upstream failures never show up here: the engine records them per record. What remains are
/// problems that stop the whole run.
#[derive(Debug)]
pub enum SyncerError {
    /// Non-upstream engine error.
    Sync(SyncError),
    /// Configuration could not be loaded or is invalid.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// An input line is not a membership record.
    Input {
        line: usize,
        source: serde_json::Error,
    },
    /// Reading input or writing outcomes failed.
    Io(std::io::Error, CapturedBacktrace),
}

impl SyncerError {
    /// Creates a configuration error from any error source.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        SyncerError::Config(Box::new(err), CapturedBacktrace::capture())
    }

    /// Returns the backtrace for this error, if one was captured.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self {
            SyncerError::Sync(err) => err.backtrace(),
            SyncerError::Config(_, cb) => Some(&cb.0),
            SyncerError::Input { .. } => None,
            SyncerError::Io(_, cb) => Some(&cb.0),
        }
    }
}

impl fmt::Display for SyncerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncerError::Sync(err) => write!(f, "{err}"),
            SyncerError::Config(source, _) => write!(f, "configuration error: {source}"),
            SyncerError::Input { line, source } => {
                write!(f, "invalid membership record on line {line}: {source}")
            }
            SyncerError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for SyncerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncerError::Sync(err) => err.source(),
            SyncerError::Config(source, _) => Some(source.as_ref()),
            SyncerError::Input { source, .. } => Some(source),
            SyncerError::Io(source, _) => Some(source),
        }
    }
}

impl From<std::io::Error> for SyncerError {
    fn from(err: std::io::Error) -> Self {
        SyncerError::Io(err, CapturedBacktrace::capture())
    }
}

impl From<SyncError> for SyncerError {
    fn from(err: SyncError) -> Self {
        SyncerError::Sync(err)
    }
}
