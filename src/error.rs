use std::time::Duration;

use crate::profile::Domain;

/// A single field that failed validation, with the reason it was rejected.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Violation {
    pub field: String,
    pub reason: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("device did not respond within {0:?}")]
    TransportTimeout(Duration),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed control message for {domain}: {reason}")]
    MalformedControlMessage { domain: String, reason: String },

    #[error("validation failed for {domain}: {}", join_violations(.violations))]
    ValidationFailed {
        domain: Domain,
        violations: Vec<Violation>,
    },

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("unknown domain '{0}'")]
    UnknownDomain(String),

    #[error("invalid value {value} for field {field}: {reason}")]
    InvalidFieldValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("write operations are disabled in read-only mode")]
    ReadOnly,

    #[error("flush of {domain} stopped after {completed} of {total} write groups: {source}")]
    FlushIncomplete {
        domain: Domain,
        completed: usize,
        total: usize,
        #[source]
        source: Box<Error>,
    },

    #[error("profile {profile} is invalid: {reason}")]
    InvalidProfile { profile: String, reason: String },

    #[error("register window {space:?}@{start}+{len} does not cover field {field}")]
    WindowMismatch {
        field: String,
        space: crate::codec::RegisterSpace,
        start: u16,
        len: usize,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TransportTimeout(_))
    }

    /// The violated fields, if this is a validation failure.
    pub fn violations(&self) -> &[Violation] {
        match self {
            Error::ValidationFailed { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
