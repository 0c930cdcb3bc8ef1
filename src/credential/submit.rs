use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::CredentialKind;
use crate::storage::is_str_safe;

/// Credentials gathered for one (username, security class) during a single processing cycle.
///
/// The maps are only mutated through the `add_*` accessors, which validate their target and
/// report failure with `false` instead of an error.
#[derive(Debug, Clone)]
pub struct SubmitCredentials {
    pub username: String,
    pub security_class: String,
    /// Id used for tracking the submit credentials.
    pub id: Option<String>,
    pub cred_dir: PathBuf,
    security_credentials: BTreeMap<CredentialKind, PathBuf>,
    identity_credentials: BTreeMap<CredentialKind, String>,
}

impl SubmitCredentials {
    pub fn new(username: impl Into<String>, security_class: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            security_class: security_class.into(),
            id: None,
            cred_dir: PathBuf::new(),
            security_credentials: BTreeMap::new(),
            identity_credentials: BTreeMap::new(),
        }
    }

    /// Register a credential file that lives in `cred_dir` as `<prefix><filename>`.
    pub fn add_security_credential(&mut self, kind: CredentialKind, filename: &str, prefix: &str) -> bool {
        let name = format!("{}{}", prefix, filename);
        if !is_str_safe(&name) {
            debug!(target: "glidecred::submit", "refusing unsafe credential file name for {}", kind);
            return false;
        }
        let path = self.cred_dir.join(name);
        if !path.is_file() {
            return false;
        }
        self.security_credentials.insert(kind, path);
        true
    }

    /// Register a credential file owned by the factory itself, by absolute path.
    pub fn add_factory_credential(&mut self, kind: CredentialKind, abs_path: &Path) -> bool {
        if !abs_path.is_file() {
            return false;
        }
        self.security_credentials.insert(kind, abs_path.to_path_buf());
        true
    }

    pub fn add_identity_credential(&mut self, kind: CredentialKind, value: &str) -> bool {
        self.identity_credentials.insert(kind, value.to_string());
        true
    }

    pub fn security_credential(&self, kind: CredentialKind) -> Option<&Path> {
        self.security_credentials.get(&kind).map(PathBuf::as_path)
    }

    pub fn identity_credential(&self, kind: CredentialKind) -> Option<&str> {
        self.identity_credentials.get(&kind).map(String::as_str)
    }

    pub fn security_credentials(&self) -> impl Iterator<Item = (CredentialKind, &Path)> {
        self.security_credentials.iter().map(|(k, p)| (*k, p.as_path()))
    }
}
