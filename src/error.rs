//! Unified credential error model.
//! Every failure the intake path can raise is one `CredentialError` variant. The variant decides
//! how far the failure reaches (whole batch, one request, one credential id) and whether the
//! caller may retry on its next cycle.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    /// Factory-side misconfiguration, e.g. no key material to decrypt with.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Decryption failure, identity mismatch or unauthorized frontend.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// A security class that does not resolve to a local user.
    #[error("cannot find a mapping for credential {cred_id} of client {client}; security class '{security_class}' is not mapped")]
    Mapping { client: String, cred_id: String, security_class: String },

    /// Supplied credential fields do not match the entry's declared auth method.
    #[error("request from {client} for entry {entry}: {constraint}")]
    ContractViolation { client: String, entry: String, constraint: String },

    /// The request lacks an attribute the protocol requires.
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("unknown credential type: {0}")]
    UnknownCredentialKind(String),

    #[error("incorrect parameters for credential {kind}: {reason}")]
    InvalidCredentialFields { kind: String, reason: String },

    /// Broken internal invariant; never caused by user input.
    #[error("internal inconsistency: {0}")]
    Internal(String),

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How far a failure reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Blocks all processing until fixed.
    Global,
    /// Drops the offending request; siblings proceed.
    Request,
    /// Skips one embedded credential; the rest of the request proceeds.
    Credential,
}

impl CredentialError {
    pub fn auth<S: Into<String>>(msg: S) -> Self { CredentialError::Authentication(msg.into()) }
    pub fn config<S: Into<String>>(msg: S) -> Self { CredentialError::Configuration(msg.into()) }
    pub fn malformed<S: Into<String>>(msg: S) -> Self { CredentialError::MalformedRequest(msg.into()) }
    pub fn internal<S: Into<String>>(msg: S) -> Self { CredentialError::Internal(msg.into()) }

    pub fn contract<S: Into<String>>(client: &str, entry: &str, constraint: S) -> Self {
        CredentialError::ContractViolation { client: client.to_string(), entry: entry.to_string(), constraint: constraint.into() }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CredentialError::Io { path: path.into(), source }
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            CredentialError::Configuration(_) => "configuration",
            CredentialError::Authentication(_) => "authentication",
            CredentialError::Mapping { .. } => "mapping",
            CredentialError::ContractViolation { .. } => "contract_violation",
            CredentialError::MalformedRequest(_) => "malformed_request",
            CredentialError::UnknownCredentialKind(_) => "unknown_credential_kind",
            CredentialError::InvalidCredentialFields { .. } => "invalid_credential_fields",
            CredentialError::Internal(_) => "internal",
            CredentialError::Io { .. } => "io",
        }
    }

    pub fn scope(&self) -> ErrorScope {
        match self {
            CredentialError::Configuration(_) => ErrorScope::Global,
            CredentialError::Mapping { .. } => ErrorScope::Credential,
            _ => ErrorScope::Request,
        }
    }

    /// Only persistence failures are worth another attempt; the pipeline is idempotent so the
    /// orchestrator simply re-reads the request next cycle.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CredentialError::Io { .. })
    }
}

pub type CredResult<T> = Result<T, CredentialError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_mapping() {
        assert_eq!(CredentialError::config("no key").scope(), ErrorScope::Global);
        assert_eq!(CredentialError::auth("bad identity").scope(), ErrorScope::Request);
        assert_eq!(CredentialError::contract("fe", "entry", "extra Username").scope(), ErrorScope::Request);
        let m = CredentialError::Mapping { client: "fe".into(), cred_id: "1".into(), security_class: "x".into() };
        assert_eq!(m.scope(), ErrorScope::Credential);
        assert_eq!(m.code_str(), "mapping");
    }

    #[test]
    fn only_io_is_retryable() {
        let io = CredentialError::io("/tmp/x", std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(io.is_retryable());
        assert!(!CredentialError::auth("x").is_retryable());
        assert!(!CredentialError::internal("x").is_retryable());
    }

    #[test]
    fn contract_message_carries_context() {
        let e = CredentialError::contract("frontend_a", "entry_b", "credential Username not allowed");
        let msg = e.to_string();
        assert!(msg.contains("frontend_a"));
        assert!(msg.contains("entry_b"));
        assert!(msg.contains("Username"));
        assert_eq!(e.code_str(), "contract_violation");
    }
}
