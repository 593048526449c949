//! The domain error taxonomy (spec component C2).
//!
//! [`ErrorCode`] enumerates the sixteen coarse failure classes every call path can be
//! classified into. [`FaultKind`] is the coarser caller/server/indeterminate axis derived
//! from a code. [`RelayError`] is the concrete error type returned by fallible APIs across
//! the workspace; it carries a code (or an opaque custom one), a message, an optional
//! source, and — independently of the code — an optional application-error marker.

use std::borrow::Cow;
use std::error::Error as StdError;
use std::fmt;

/// The stable, enumerated failure classes every typed error in the system carries.
///
/// Codes outside this enumeration are preserved on [`RelayError::custom`] and rendered
/// as their decimal string for metric tagging — see [`ErrorCode::tag`] and
/// [`RelayError::tag`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl ErrorCode {
    /// Lowercase kebab-case tag used for metric labels and log fields, e.g.
    /// `AlreadyExists` -> `"already-exists"`.
    pub const fn tag(self) -> &'static str {
        match self {
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Unknown => "unknown",
            ErrorCode::InvalidArgument => "invalid-argument",
            ErrorCode::DeadlineExceeded => "deadline-exceeded",
            ErrorCode::NotFound => "not-found",
            ErrorCode::AlreadyExists => "already-exists",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::ResourceExhausted => "resource-exhausted",
            ErrorCode::FailedPrecondition => "failed-precondition",
            ErrorCode::Aborted => "aborted",
            ErrorCode::OutOfRange => "out-of-range",
            ErrorCode::Unimplemented => "unimplemented",
            ErrorCode::Internal => "internal",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::DataLoss => "data-loss",
            ErrorCode::Unauthenticated => "unauthenticated",
        }
    }

    /// Classifies the code into caller-fault, server-fault, or indeterminate, per
    /// spec.md §4.2.
    pub const fn fault_kind(self) -> FaultKind {
        match self {
            ErrorCode::Cancelled
            | ErrorCode::InvalidArgument
            | ErrorCode::NotFound
            | ErrorCode::AlreadyExists
            | ErrorCode::PermissionDenied
            | ErrorCode::FailedPrecondition
            | ErrorCode::Aborted
            | ErrorCode::OutOfRange
            | ErrorCode::Unauthenticated
            | ErrorCode::Unimplemented
            | ErrorCode::ResourceExhausted => FaultKind::Client,
            ErrorCode::Unknown
            | ErrorCode::DeadlineExceeded
            | ErrorCode::Internal
            | ErrorCode::Unavailable
            | ErrorCode::DataLoss => FaultKind::Server,
        }
    }
}

/// Coarse caller/server/indeterminate classification driving counter selection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Client,
    Server,
    Indeterminate,
}

/// The sentinel tag used when an error carries no typed [`ErrorCode`] at all.
pub const UNKNOWN_INTERNAL_TAG: &str = "unknown_internal_relay";
/// The sentinel tag used when a response is an application error with no carried code.
pub const APPLICATION_ERROR_TAG: &str = "application_error";
/// The sentinel used in place of an absent `error_name` field.
pub const NOT_SET_TAG: &str = "__not_set__";
/// The sentinel substituted for metric-tag values suppressed by the blocklist.
pub const DROPPED_TAG: &str = "__dropped__";
/// The sentinel substituted for an empty transport identity component.
pub const UNKNOWN_TRANSPORT_TAG: &str = "unknown";

/// A custom, non-enumerated code carried on an error (e.g. a user-defined numeric code).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CustomCode(pub i64);

/// Either one of the sixteen stable codes or an opaque custom one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Code {
    Stable(ErrorCode),
    Custom(CustomCode),
}

impl Code {
    pub fn fault_kind(self) -> FaultKind {
        match self {
            Code::Stable(code) => code.fault_kind(),
            Code::Custom(_) => FaultKind::Indeterminate,
        }
    }

    pub fn tag(self) -> Cow<'static, str> {
        match self {
            Code::Stable(code) => Cow::Borrowed(code.tag()),
            Code::Custom(CustomCode(value)) => Cow::Owned(value.to_string()),
        }
    }
}

/// Name/details/code describing a handler-signaled application-level failure
/// (spec component C6's `applicationErrorMeta`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplicationErrorMeta {
    pub name: Option<String>,
    pub details: Option<String>,
    pub code: Option<Code>,
}

/// The error type returned from every fallible public API in the workspace.
///
/// Carries an optional [`Code`] (absent for untyped/opaque failures), a message, an
/// optional boxed source, and — independently of the code, matching spec.md's
/// "application errors are a separate axis" rule — an optional [`ApplicationErrorMeta`].
#[derive(Debug)]
pub struct RelayError {
    code: Option<Code>,
    message: Cow<'static, str>,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    application: Option<ApplicationErrorMeta>,
}

impl RelayError {
    pub fn new(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: Some(Code::Stable(code)),
            message: message.into(),
            source: None,
            application: None,
        }
    }

    pub fn custom(code: i64, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: Some(Code::Custom(CustomCode(code))),
            message: message.into(),
            source: None,
            application: None,
        }
    }

    /// An opaque failure with no carried code at all (tagged [`UNKNOWN_INTERNAL_TAG`]).
    pub fn opaque(message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code: None,
            message: message.into(),
            source: None,
            application: None,
        }
    }

    pub fn cancelled(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Cancelled, message)
    }

    pub fn deadline_exceeded(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::DeadlineExceeded, message)
    }

    pub fn unavailable(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::Unavailable, message)
    }

    pub fn invalid_argument(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_application(mut self, meta: ApplicationErrorMeta) -> Self {
        self.application = Some(meta);
        self
    }

    pub fn code(&self) -> Option<Code> {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn application(&self) -> Option<&ApplicationErrorMeta> {
        self.application.as_ref()
    }

    /// The metric-tag form of this error: the code's tag if present, else
    /// [`APPLICATION_ERROR_TAG`] if this is an application error without a code, else
    /// [`UNKNOWN_INTERNAL_TAG`].
    pub fn tag(&self) -> Cow<'static, str> {
        match self.code {
            Some(code) => code.tag(),
            None if self.application.is_some() => Cow::Borrowed(APPLICATION_ERROR_TAG),
            None => Cow::Borrowed(UNKNOWN_INTERNAL_TAG),
        }
    }

    /// The `error_name` tag: the application meta's name if set, else [`NOT_SET_TAG`].
    pub fn error_name_tag(&self) -> Cow<'static, str> {
        match self.application.as_ref().and_then(|meta| meta.name.as_ref()) {
            Some(name) => Cow::Owned(name.clone()),
            None => Cow::Borrowed(NOT_SET_TAG),
        }
    }

    /// The fault kind this error attributes to, folding the application-error axis in:
    /// an application error with no carried code is always a client fault.
    pub fn fault_kind(&self) -> FaultKind {
        match self.code {
            Some(code) => code.fault_kind(),
            None if self.application.is_some() => FaultKind::Client,
            None => FaultKind::Server,
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "[{}] {}", code.tag(), self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl StdError for RelayError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_deref().map(|e| e as &(dyn StdError + 'static))
    }
}

pub type Result<T, E = RelayError> = core::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_code_tag_is_kebab_case() {
        assert_eq!(ErrorCode::AlreadyExists.tag(), "already-exists");
        assert_eq!(ErrorCode::InvalidArgument.tag(), "invalid-argument");
    }

    #[test]
    fn custom_code_renders_decimal_tag() {
        let err = RelayError::custom(1000, "surprise");
        assert_eq!(err.tag(), "1000");
        assert_eq!(err.fault_kind(), FaultKind::Indeterminate);
    }

    #[test]
    fn application_error_without_code_is_client_fault_tagged_application_error() {
        let err = RelayError::opaque("handler signalled failure")
            .with_application(ApplicationErrorMeta::default());
        assert_eq!(err.fault_kind(), FaultKind::Client);
        assert_eq!(err.tag(), APPLICATION_ERROR_TAG);
        assert_eq!(err.error_name_tag(), NOT_SET_TAG);
    }

    #[test]
    fn application_error_with_code_uses_the_code_for_fault_attribution() {
        let meta = ApplicationErrorMeta {
            name: Some("FunkyError".into()),
            details: None,
            code: Some(Code::Stable(ErrorCode::ResourceExhausted)),
        };
        let err = RelayError::new(ErrorCode::ResourceExhausted, "exhausted").with_application(meta);
        assert_eq!(err.fault_kind(), FaultKind::Client);
        assert_eq!(err.tag(), "resource-exhausted");
        assert_eq!(err.error_name_tag(), "FunkyError");
    }

    #[test]
    fn opaque_untyped_error_is_tagged_unknown_internal() {
        let err = RelayError::opaque("boom");
        assert_eq!(err.tag(), UNKNOWN_INTERNAL_TAG);
        assert_eq!(err.fault_kind(), FaultKind::Server);
    }
}
