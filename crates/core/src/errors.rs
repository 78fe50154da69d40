use std::time::Duration;

use thiserror::Error;

use crate::policy::Operation;

/// A request violated the entity policy or the scope rules. Always rejected,
/// always audited, never retried: resubmitting the same request cannot
/// succeed without correcting it.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum PolicyError {
    #[error("unknown entity `{0}`")]
    UnknownEntity(String),
    #[error("{operation} is not allowed for `{entity}`")]
    OperationNotAllowed { entity: String, operation: Operation },
    #[error("field `{field}` is not readable on `{entity}`")]
    FieldNotReadable { entity: String, field: String },
    #[error("field `{field}` cannot be set on create for `{entity}`")]
    FieldNotCreatable { entity: String, field: String },
    #[error("empty field list for read of `{entity}`")]
    EmptyFieldList { entity: String },
    #[error("domain references forbidden field `{field}` on `{entity}`")]
    ForbiddenField { entity: String, field: String },
    #[error("tenant scoping for `{entity}` is system-managed; `{field}` cannot be supplied by the caller")]
    TenantOverride { entity: String, field: String },
    #[error("cross-tenant access to `{entity}` id {requested} is forbidden")]
    CrossTenant { entity: String, requested: i64 },
    #[error("a positive record limit is required for reads of `{entity}`")]
    LimitUnset { entity: String },
    #[error("limit {requested} exceeds the maximum of {max} for `{entity}`")]
    LimitExceeded { entity: String, requested: u32, max: u32 },
    #[error("required filter on `{field}` is missing for `{entity}`")]
    MissingMandatoryFragment { entity: String, field: String },
    #[error("create values for `{entity}` must not be empty")]
    EmptyCreateValues { entity: String },
}

impl PolicyError {
    /// Short class name recorded in audit entries for rejected calls.
    pub fn class(&self) -> &'static str {
        match self {
            Self::UnknownEntity(_) => "unknown_entity",
            Self::OperationNotAllowed { .. } => "operation_not_allowed",
            Self::FieldNotReadable { .. } => "field_not_readable",
            Self::FieldNotCreatable { .. } => "field_not_creatable",
            Self::EmptyFieldList { .. } => "empty_field_list",
            Self::ForbiddenField { .. } => "forbidden_field",
            Self::TenantOverride { .. } => "tenant_override",
            Self::CrossTenant { .. } => "cross_tenant",
            Self::LimitUnset { .. } => "limit_unset",
            Self::LimitExceeded { .. } => "limit_exceeded",
            Self::MissingMandatoryFragment { .. } => "missing_mandatory_fragment",
            Self::EmptyCreateValues { .. } => "empty_create_values",
        }
    }
}

/// Transport or backend failure, surfaced after bounded retries (reads) or
/// immediately (creates, which are never retried).
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BackendError {
    #[error("backend transport failure: {0}")]
    Transport(String),
    #[error("backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("backend unavailable after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
    #[error("backend protocol violation: {0}")]
    Protocol(String),
}

/// Session bootstrap failure. The session cannot proceed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("backend authentication failed for `{login}`")]
    AuthenticationFailed { login: String },
    #[error("could not resolve a tenant for uid {uid}")]
    UnresolvedTenant { uid: i64 },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum GatewayError {
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
}

/// The caller-visible error taxonomy. Every tool failure is exactly one of
/// these five kinds; raw backend payloads never pass through.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ToolError {
    #[error("invalid input: {}", violations.join("; "))]
    Validation { violations: Vec<String> },
    #[error(transparent)]
    Policy(#[from] PolicyError),
    #[error("{0}")]
    NotFound(String),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl ToolError {
    pub fn validation(violations: Vec<String>) -> Self {
        Self::Validation { violations }
    }

    /// Stable kind tag for transport adapters and CLI output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::Policy(_) => "policy",
            Self::NotFound(_) => "not_found",
            Self::Identity(_) => "identity",
            Self::Backend(_) => "backend",
        }
    }

    /// Caller-safe message: enough to fix the request, nothing that maps the
    /// policy table or replays backend internals.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { .. } | Self::Policy(_) | Self::NotFound(_) => self.to_string(),
            Self::Identity(_) => "the session could not be established".to_string(),
            Self::Backend(_) => {
                "the backend is temporarily unavailable; retry shortly".to_string()
            }
        }
    }
}

impl From<GatewayError> for ToolError {
    fn from(value: GatewayError) -> Self {
        match value {
            GatewayError::Policy(err) => Self::Policy(err),
            GatewayError::Backend(err) => Self::Backend(err),
            GatewayError::Identity(err) => Self::Identity(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_lists_every_violation() {
        let err = ToolError::validation(vec![
            "limit must be between 1 and 100".to_string(),
            "date_from must be YYYY-MM-DD".to_string(),
        ]);
        let rendered = err.to_string();
        assert!(rendered.contains("limit must be between 1 and 100"));
        assert!(rendered.contains("date_from must be YYYY-MM-DD"));
    }

    #[test]
    fn backend_error_is_masked_for_callers() {
        let err = ToolError::Backend(BackendError::Transport(
            "connection refused (10.0.0.7:8069)".to_string(),
        ));
        assert!(!err.user_message().contains("10.0.0.7"));
        assert_eq!(err.kind(), "backend");
    }

    #[test]
    fn policy_error_keeps_entity_context() {
        let err = ToolError::from(GatewayError::Policy(PolicyError::ForbiddenField {
            entity: "hr.employee".to_string(),
            field: "private_email".to_string(),
        }));
        assert!(err.user_message().contains("hr.employee"));
        assert_eq!(err.kind(), "policy");
    }
}
