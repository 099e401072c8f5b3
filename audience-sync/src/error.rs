//! Error types and result definitions for audience synchronization.
//!
//! Provides a classified error value with captured diagnostic metadata. A [`SyncError`] can carry
//! the upstream HTTP status and error code that caused it, which is what callers of the
//! single-record path receive when a dispatch fails, and what the batch path copies into each
//! affected record's outcome.

use std::backtrace::{Backtrace, BacktraceStatus};
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for synchronization operations using [`SyncError`] as the error type.
pub type SyncResult<T> = Result<T, SyncError>;

/// Status and code reported by the upstream API for a failed request or item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamDetail {
    pub http_status: u16,
    pub error_code: String,
}

/// Detailed payload stored for single [`SyncError`] instances.
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    upstream: Option<UpstreamDetail>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for synchronization operations.
///
/// [`SyncError`] represents either a single classified error or several aggregated errors.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<SyncError>,
        location: &'static Location<'static>,
    },
}

/// Categories of errors that can occur while synchronizing audience membership.
///
/// Upstream kinds are failures reported by, or on the way to, the third-party API. They are
/// recorded per record in batch mode. Every other kind means the engine itself could not do its
/// job and is always propagated to the caller.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Validation Errors
    ValidationFailed,
    MissingIdentifier,
    MissingAudience,

    // Upstream Errors
    PartialUpstreamFailure,
    UpstreamRequestFailed,
    UpstreamConnectionFailed,
    UpstreamTimeout,
    UpstreamAuthenticationFailed,

    // IO & Serialization Errors
    IoError,
    SerializationError,
    DeserializationError,

    // Configuration Errors
    ConfigError,

    // Engine Errors
    InvariantViolation,

    // Unknown / Uncategorized
    Unknown,
}

impl ErrorKind {
    /// Returns the stable code used in per-record outcomes when no upstream code is available.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ValidationFailed => "PAYLOAD_VALIDATION_FAILED",
            ErrorKind::MissingIdentifier => "MISSING_IDENTIFIER",
            ErrorKind::MissingAudience => "MISSING_AUDIENCE",
            ErrorKind::PartialUpstreamFailure => "PARTIAL_ERRORS",
            ErrorKind::UpstreamRequestFailed => "UPSTREAM_REQUEST_FAILED",
            ErrorKind::UpstreamConnectionFailed => "ECONNREFUSED",
            ErrorKind::UpstreamTimeout => "ETIMEDOUT",
            ErrorKind::UpstreamAuthenticationFailed => "INVALID_AUTHENTICATION",
            ErrorKind::IoError => "IO_ERROR",
            ErrorKind::SerializationError => "SERIALIZATION_ERROR",
            ErrorKind::DeserializationError => "DESERIALIZATION_ERROR",
            ErrorKind::ConfigError => "CONFIG_ERROR",
            ErrorKind::InvariantViolation => "INVARIANT_VIOLATION",
            ErrorKind::Unknown => "UNKNOWN_ERROR",
        }
    }

    /// Returns `true` for failures raised by or on the way to the upstream API.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ErrorKind::PartialUpstreamFailure
                | ErrorKind::UpstreamRequestFailed
                | ErrorKind::UpstreamConnectionFailed
                | ErrorKind::UpstreamTimeout
                | ErrorKind::UpstreamAuthenticationFailed
        )
    }

    /// Returns `true` for failures detected locally before anything is sent.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::ValidationFailed | ErrorKind::MissingIdentifier | ErrorKind::MissingAudience
        )
    }
}

impl SyncError {
    /// Returns the [`ErrorKind`] of this error.
    ///
    /// For multiple errors, returns the kind of the first error or [`ErrorKind::Unknown`]
    /// if the error list is empty.
    pub fn kind(&self) -> ErrorKind {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.kind,
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.kind())
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns all [`ErrorKind`]s present in this error.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match self.repr {
            ErrorRepr::Single(ref payload) => vec![payload.kind],
            ErrorRepr::Many { ref errors, .. } => errors
                .iter()
                .flat_map(|err| err.kinds())
                .collect::<Vec<_>>(),
        }
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.description.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors
                .first()
                .map(|err| err.description())
                .unwrap_or("multiple errors"),
        }
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.detail.as_deref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.detail()),
        }
    }

    /// Returns the most specific human-readable message: the detail if present, otherwise the
    /// description.
    pub fn message(&self) -> &str {
        self.detail().unwrap_or_else(|| self.description())
    }

    /// Returns the upstream status and code attached to this error, if any.
    pub fn upstream(&self) -> Option<&UpstreamDetail> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.upstream.as_ref(),
            ErrorRepr::Many { ref errors, .. } => errors.iter().find_map(|e| e.upstream()),
        }
    }

    /// Returns the HTTP status reported by the upstream, if any.
    pub fn http_status(&self) -> Option<u16> {
        self.upstream().map(|upstream| upstream.http_status)
    }

    /// Returns the upstream error code, falling back to the code of this error's kind.
    pub fn error_code(&self) -> &str {
        self.upstream()
            .map(|upstream| upstream.error_code.as_str())
            .unwrap_or_else(|| self.kind().code())
    }

    /// Returns `true` if every aggregated kind is an upstream failure.
    pub fn is_upstream(&self) -> bool {
        let kinds = self.kinds();
        !kinds.is_empty() && kinds.iter().all(ErrorKind::is_upstream)
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match self.repr {
            ErrorRepr::Single(ref payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        match self.repr {
            ErrorRepr::Single(ref payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    ///
    /// Has no effect on aggregated errors, which forward their first error as source.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.source = Some(Arc::new(source));
        }
        self
    }

    /// Attaches the upstream HTTP status and error code to this error.
    pub fn with_upstream(mut self, http_status: u16, error_code: impl Into<String>) -> Self {
        if let ErrorRepr::Single(ref mut payload) = self.repr {
            payload.upstream = Some(UpstreamDetail {
                http_status,
                error_code: error_code.into(),
            });
        }
        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                upstream: None,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => {
                a.kind == b.kind && a.upstream == b.upstream
            }
            (
                ErrorRepr::Many {
                    errors: errors_a, ..
                },
                ErrorRepr::Many {
                    errors: errors_b, ..
                },
            ) => {
                errors_a.len() == errors_b.len()
                    && errors_a.iter().zip(errors_b.iter()).all(|(a, b)| a == b)
            }
            _ => false,
        }
    }
}

impl Hash for SyncError {
    /// Hashes only the kind and static description so that repeated occurrences of the same
    /// failure group together regardless of location or detail.
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.repr).hash(state);
        match &self.repr {
            ErrorRepr::Single(payload) => {
                payload.kind.hash(state);
                payload.description.hash(state);
            }
            ErrorRepr::Many { errors, .. } => {
                errors.len().hash(state);
                for error in errors {
                    error.hash(state);
                }
            }
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if let Some(upstream) = &payload.upstream {
                    write!(
                        f,
                        "\n  Upstream: status {} code {}",
                        upstream.http_status, upstream.error_code
                    )?;
                }

                write_detail(payload.detail.as_deref(), f, 1)?;
                write_backtrace(payload.backtrace.as_ref(), f, 1)?;

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                let count = errors.len();
                write!(
                    f,
                    "[Many] {} error{} aggregated @ {}:{}:{}",
                    count,
                    if count == 1 { "" } else { "s" },
                    location.file(),
                    location.line(),
                    location.column()
                )?;

                if errors.is_empty() {
                    write!(f, "\n  (no inner errors provided)")?;
                }

                for (index, error) in errors.iter().enumerate() {
                    let rendered = format!("{error}");
                    let mut lines = rendered.lines();
                    match lines.next() {
                        Some(first_line) => write!(f, "\n  {}. {}", index + 1, first_line)?,
                        None => write!(f, "\n  {}.", index + 1)?,
                    }

                    for line in lines {
                        write!(f, "\n     {line}")?;
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

fn write_backtrace(
    backtrace: &Backtrace,
    f: &mut fmt::Formatter<'_>,
    indent: usize,
) -> fmt::Result {
    if backtrace.status() != BacktraceStatus::Captured {
        return Ok(());
    }

    let indent_str = "  ".repeat(indent);
    write!(f, "\n{indent_str}Backtrace:")?;
    for line in backtrace.to_string().lines() {
        if line.trim().is_empty() {
            write!(f, "\n{indent_str}  ")?;
        } else {
            write!(f, "\n{indent_str}  {line}")?;
        }
    }

    Ok(())
}

fn write_detail(detail: Option<&str>, f: &mut fmt::Formatter<'_>, indent: usize) -> fmt::Result {
    let Some(detail) = detail else {
        return Ok(());
    };

    let indent_str = "  ".repeat(indent);
    if detail.trim().is_empty() {
        return write!(f, "\n{indent_str}Detail: <empty>");
    }

    write!(f, "\n{indent_str}Detail:")?;
    for line in detail.lines() {
        write!(f, "\n{indent_str}  {line}")?;
    }

    Ok(())
}

/// Creates a [`SyncError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`SyncError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

/// Creates a [`SyncError`] from a vector of errors for aggregation.
///
/// A vector holding exactly one error yields that error unchanged.
impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SyncError {
        let location = Location::caller();

        let mut errors: Vec<SyncError> = errors.into_iter().map(Into::into).collect();
        if errors.len() == 1 {
            return errors.pop().expect("just checked length is 1");
        }

        SyncError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for SyncError {
    #[track_caller]
    fn from(err: std::io::Error) -> SyncError {
        let detail = err.to_string();
        SyncError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps [`serde_json::Error`] to [`ErrorKind::SerializationError`] for I/O failures and to
/// [`ErrorKind::DeserializationError`] otherwise.
impl From<serde_json::Error> for SyncError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => {
                (ErrorKind::SerializationError, "JSON serialization failed")
            }
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => {
                (ErrorKind::DeserializationError, "JSON deserialization failed")
            }
        };

        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Maps [`reqwest::Error`] onto the upstream error kinds, keeping the HTTP status when the
/// failure carries one.
impl From<reqwest::Error> for SyncError {
    #[track_caller]
    fn from(err: reqwest::Error) -> SyncError {
        let (kind, description) = if err.is_timeout() {
            (ErrorKind::UpstreamTimeout, "Upstream request timed out")
        } else if err.is_connect() {
            (
                ErrorKind::UpstreamConnectionFailed,
                "Upstream connection failed",
            )
        } else if err.is_builder() {
            (ErrorKind::ConfigError, "Upstream request could not be built")
        } else if err.is_decode() {
            (
                ErrorKind::DeserializationError,
                "Upstream response could not be decoded",
            )
        } else {
            (ErrorKind::UpstreamRequestFailed, "Upstream request failed")
        };

        let status = err.status();
        let detail = err.to_string();
        let error = SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        );

        match status {
            Some(status) => error.with_upstream(status.as_u16(), status.as_u16().to_string()),
            None => error,
        }
    }
}
