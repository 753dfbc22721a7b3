// CLASSIFICATION: COMMUNITY
// Filename: error.rs v0.6
// Author: Lukas Bower
// Date Modified: 2026-05-02

//! The closed set of error kinds that may cross the envelope boundary,
//! and the carrier type every subsystem returns. Nothing in the crate
//! panics across the envelope; the HTTP surface converts a [`HostError`]
//! into the failure envelope in exactly one place.

use serde_json::Value;
use thiserror::Error;

/// Error kinds visible on the wire. Wire names are kebab-case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    HandlerUnknown,
    TapeNotFound,
    TapeAlreadyRegistered,
    TapeBusy,
    TapePermissionDenied,
    ManifestMissing,
    ManifestParse,
    ManifestInvalidField,
    ManifestEscape,
    PathEscape,
    PathNotFound,
    StackUnderflow,
    UndefinedVariable,
    UnknownOperation,
    DivisionByZero,
    LoopLimit,
    ExpressionRejected,
    ShardNotFound,
    EngineError,
    ScheduleExhausted,
    NoJudgesOnline,
    NoQuorum,
    DeadlineExceeded,
    HopLimitExceeded,
    BackendError,
}

impl ErrorKind {
    /// Wire name for the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadRequest => "bad-request",
            ErrorKind::HandlerUnknown => "handler-unknown",
            ErrorKind::TapeNotFound => "tape-not-found",
            ErrorKind::TapeAlreadyRegistered => "tape-already-registered",
            ErrorKind::TapeBusy => "tape-busy",
            ErrorKind::TapePermissionDenied => "tape-permission-denied",
            ErrorKind::ManifestMissing => "manifest-missing",
            ErrorKind::ManifestParse => "manifest-parse",
            ErrorKind::ManifestInvalidField => "manifest-invalid-field",
            ErrorKind::ManifestEscape => "manifest-escape",
            ErrorKind::PathEscape => "path-escape",
            ErrorKind::PathNotFound => "path-not-found",
            ErrorKind::StackUnderflow => "stack-underflow",
            ErrorKind::UndefinedVariable => "undefined-variable",
            ErrorKind::UnknownOperation => "unknown-operation",
            ErrorKind::DivisionByZero => "division-by-zero",
            ErrorKind::LoopLimit => "loop-limit",
            ErrorKind::ExpressionRejected => "expression-rejected",
            ErrorKind::ShardNotFound => "shard-not-found",
            ErrorKind::EngineError => "engine-error",
            ErrorKind::ScheduleExhausted => "schedule-exhausted",
            ErrorKind::NoJudgesOnline => "no-judges-online",
            ErrorKind::NoQuorum => "no-quorum",
            ErrorKind::DeadlineExceeded => "deadline-exceeded",
            ErrorKind::HopLimitExceeded => "hop-limit-exceeded",
            ErrorKind::BackendError => "backend-error",
        }
    }

    /// Parse a wire name back into a kind. Unknown names map to
    /// `backend-error` so remote envelopes can never widen the set.
    pub fn parse(name: &str) -> ErrorKind {
        match name {
            "bad-request" => ErrorKind::BadRequest,
            "handler-unknown" => ErrorKind::HandlerUnknown,
            "tape-not-found" => ErrorKind::TapeNotFound,
            "tape-already-registered" => ErrorKind::TapeAlreadyRegistered,
            "tape-busy" => ErrorKind::TapeBusy,
            "tape-permission-denied" => ErrorKind::TapePermissionDenied,
            "manifest-missing" => ErrorKind::ManifestMissing,
            "manifest-parse" => ErrorKind::ManifestParse,
            "manifest-invalid-field" => ErrorKind::ManifestInvalidField,
            "manifest-escape" => ErrorKind::ManifestEscape,
            "path-escape" => ErrorKind::PathEscape,
            "path-not-found" => ErrorKind::PathNotFound,
            "stack-underflow" => ErrorKind::StackUnderflow,
            "undefined-variable" => ErrorKind::UndefinedVariable,
            "unknown-operation" => ErrorKind::UnknownOperation,
            "division-by-zero" => ErrorKind::DivisionByZero,
            "loop-limit" => ErrorKind::LoopLimit,
            "expression-rejected" => ErrorKind::ExpressionRejected,
            "shard-not-found" => ErrorKind::ShardNotFound,
            "engine-error" => ErrorKind::EngineError,
            "schedule-exhausted" => ErrorKind::ScheduleExhausted,
            "no-judges-online" => ErrorKind::NoJudgesOnline,
            "no-quorum" => ErrorKind::NoQuorum,
            "deadline-exceeded" => ErrorKind::DeadlineExceeded,
            "hop-limit-exceeded" => ErrorKind::HopLimitExceeded,
            _ => ErrorKind::BackendError,
        }
    }
}

/// Error carrier returned at every boundary inside the runtime.
#[derive(Debug, Clone, Error)]
#[error("{}: {message}", kind.as_str())]
pub struct HostError {
    pub kind: ErrorKind,
    pub message: String,
    /// Optional structured context attached to the failure envelope,
    /// e.g. the session record of a no-quorum tribunal.
    pub context: Option<Value>,
}

impl HostError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

pub type HostResult<T> = Result<T, HostError>;
