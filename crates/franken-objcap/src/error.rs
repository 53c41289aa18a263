//! Error taxonomy for policy decisions and lifecycle guards.
//!
//! Every failure is local and final: the offending operation aborts and the
//! error is handed to the immediate caller.  Codes returned by
//! [`ObjcapError::error_code`] are stable and append-only.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::object_model::ObjectHandle;

const ERROR_ACCESS_DENIED: &str = "FE-OBJCAP-1001";
const ERROR_ROLE_VIOLATION: &str = "FE-OBJCAP-1002";
const ERROR_IDENTITY_VIOLATION: &str = "FE-OBJCAP-1003";
const ERROR_INVARIANT_VIOLATION: &str = "FE-OBJCAP-1004";
const ERROR_UNSUPPORTED: &str = "FE-OBJCAP-1005";
const ERROR_UNKNOWN_OBJECT: &str = "FE-OBJCAP-1006";
const ERROR_NOT_CALLABLE: &str = "FE-OBJCAP-1007";

/// Property operation a caller attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessOperation {
    Read,
    Enumerate,
    Set,
    Delete,
    /// A host mutator invoked on its receiver.
    Mutate,
}

impl fmt::Display for AccessOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Read => "read",
            Self::Enumerate => "enumerate",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Mutate => "mutate",
        };
        f.write_str(name)
    }
}

/// Payload-free discriminant of [`ObjcapError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AccessDenied,
    RoleViolation,
    IdentityViolation,
    InvariantViolation,
    Unsupported,
    UnknownObject,
    NotCallable,
}

/// Errors raised by the capability policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ObjcapError {
    /// Read, enumerate, set, delete, or mutate refused by policy.
    #[error("access denied: cannot {operation} `{name}` on {object}")]
    AccessDenied {
        operation: AccessOperation,
        object: ObjectHandle,
        name: String,
    },
    /// A constructor-only callable used as a method, a method used as a
    /// constructor, or conflicting role declarations.
    #[error("role violation on {callable}: {detail}")]
    RoleViolation {
        callable: ObjectHandle,
        detail: String,
    },
    /// Stolen constructor or method, or a lifecycle guard entered out of order.
    #[error("identity violation on {object}: {detail}")]
    IdentityViolation { object: ObjectHandle, detail: String },
    /// Write-once or reserved-name rule broken.
    #[error("invariant violation on {object}: {detail}")]
    InvariantViolation { object: ObjectHandle, detail: String },
    /// The operation passed its access check but is not implemented.
    #[error("unsupported: {operation} of `{name}` on {object}")]
    Unsupported {
        operation: AccessOperation,
        object: ObjectHandle,
        name: String,
    },
    #[error("unknown object {object}")]
    UnknownObject { object: ObjectHandle },
    #[error("{object} is not callable")]
    NotCallable { object: ObjectHandle },
}

impl ObjcapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::RoleViolation { .. } => ErrorKind::RoleViolation,
            Self::IdentityViolation { .. } => ErrorKind::IdentityViolation,
            Self::InvariantViolation { .. } => ErrorKind::InvariantViolation,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::UnknownObject { .. } => ErrorKind::UnknownObject,
            Self::NotCallable { .. } => ErrorKind::NotCallable,
        }
    }

    /// Stable machine-readable code for evidence and log correlation.
    pub fn error_code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::AccessDenied => ERROR_ACCESS_DENIED,
            ErrorKind::RoleViolation => ERROR_ROLE_VIOLATION,
            ErrorKind::IdentityViolation => ERROR_IDENTITY_VIOLATION,
            ErrorKind::InvariantViolation => ERROR_INVARIANT_VIOLATION,
            ErrorKind::Unsupported => ERROR_UNSUPPORTED,
            ErrorKind::UnknownObject => ERROR_UNKNOWN_OBJECT,
            ErrorKind::NotCallable => ERROR_NOT_CALLABLE,
        }
    }

    pub(crate) fn access_denied(
        operation: AccessOperation,
        object: ObjectHandle,
        name: &str,
    ) -> Self {
        Self::AccessDenied {
            operation,
            object,
            name: name.to_string(),
        }
    }

    pub(crate) fn role(callable: ObjectHandle, detail: impl Into<String>) -> Self {
        Self::RoleViolation {
            callable,
            detail: detail.into(),
        }
    }

    pub(crate) fn identity(object: ObjectHandle, detail: impl Into<String>) -> Self {
        Self::IdentityViolation {
            object,
            detail: detail.into(),
        }
    }

    pub(crate) fn invariant(object: ObjectHandle, detail: impl Into<String>) -> Self {
        Self::InvariantViolation {
            object,
            detail: detail.into(),
        }
    }
}
