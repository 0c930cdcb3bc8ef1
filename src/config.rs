use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::storage::UserDirectoryResolver;

/// What to do when an entry declares only auth methods this factory does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownAuthMethodPolicy {
    /// Log a warning and let the request through (forward compatibility with newer frontends).
    #[default]
    Allow,
    /// Refuse the request as a contract violation.
    Deny,
}

impl std::str::FromStr for UnknownAuthMethodPolicy {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "allow" => Ok(Self::Allow),
            "deny" => Ok(Self::Deny),
            other => anyhow::bail!("unknown auth method policy '{}', expected allow|deny", other),
        }
    }
}

/// Factory-wide intake settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FactoryConfig {
    /// Root of the per-user client proxy directories.
    pub client_proxies_base_dir: PathBuf,
    /// Glidein (factory instance) name, last component of each user's credential directory.
    pub glidein_name: String,
    /// Let SciToken-bearing requests bypass the per-method credential contract.
    #[serde(default)]
    pub scitoken_passthru: bool,
    #[serde(default)]
    pub unknown_auth_method: UnknownAuthMethodPolicy,
    /// Parallel ClassAd workers used by batch processing.
    #[serde(default = "FactoryConfig::default_workers")]
    pub workers: usize,
}

impl FactoryConfig {
    fn default_workers() -> usize { 1 }

    pub fn new(client_proxies_base_dir: impl Into<PathBuf>, glidein_name: impl Into<String>) -> Self {
        Self {
            client_proxies_base_dir: client_proxies_base_dir.into(),
            glidein_name: glidein_name.into(),
            scitoken_passthru: false,
            unknown_auth_method: UnknownAuthMethodPolicy::default(),
            workers: Self::default_workers(),
        }
    }

    /// Load from a JSON file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading factory config {}", path.display()))?;
        let cfg: FactoryConfig = serde_json::from_str(&text)
            .with_context(|| format!("parsing factory config {}", path.display()))?;
        cfg.with_env_overrides(|k| std::env::var(k).ok())
    }

    /// Overlay `GLIDECRED_*` variables. The lookup is injected so tests do not touch the
    /// process environment.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("GLIDECRED_PROXIES_DIR") { self.client_proxies_base_dir = PathBuf::from(v); }
        if let Some(v) = lookup("GLIDECRED_GLIDEIN_NAME") { self.glidein_name = v; }
        if let Some(v) = lookup("GLIDECRED_SCITOKEN_PASSTHRU") {
            self.scitoken_passthru = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        if let Some(v) = lookup("GLIDECRED_UNKNOWN_AUTH_METHOD") { self.unknown_auth_method = v.parse()?; }
        if let Some(v) = lookup("GLIDECRED_WORKERS") {
            self.workers = v.trim().parse::<usize>()
                .with_context(|| format!("GLIDECRED_WORKERS='{}' is not a number", v))?
                .max(1);
        }
        Ok(self)
    }
}

impl UserDirectoryResolver for FactoryConfig {
    fn credential_dir(&self, username: &str) -> PathBuf {
        self.client_proxies_base_dir
            .join(format!("user_{}", username))
            .join(format!("glidein_{}", self.glidein_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn json_defaults_and_env_overlay() {
        let cfg: FactoryConfig = serde_json::from_str(
            r#"{"client_proxies_base_dir":"/var/lib/factory/proxies","glidein_name":"gfactory"}"#,
        ).unwrap();
        assert!(!cfg.scitoken_passthru);
        assert_eq!(cfg.unknown_auth_method, UnknownAuthMethodPolicy::Allow);
        assert_eq!(cfg.workers, 1);

        let env: HashMap<&str, &str> = [
            ("GLIDECRED_SCITOKEN_PASSTHRU", "True"),
            ("GLIDECRED_UNKNOWN_AUTH_METHOD", "deny"),
            ("GLIDECRED_WORKERS", "0"),
        ].into_iter().collect();
        let cfg = cfg.with_env_overrides(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert!(cfg.scitoken_passthru);
        assert_eq!(cfg.unknown_auth_method, UnknownAuthMethodPolicy::Deny);
        assert_eq!(cfg.workers, 1);
    }

    #[test]
    fn bad_policy_value_is_rejected() {
        let cfg = FactoryConfig::new("/tmp", "g");
        let res = cfg.with_env_overrides(|k| (k == "GLIDECRED_UNKNOWN_AUTH_METHOD").then(|| "maybe".to_string()));
        assert!(res.is_err());
    }

    #[test]
    fn credential_dir_layout() {
        let cfg = FactoryConfig::new("/srv/proxies", "gf1");
        assert_eq!(cfg.credential_dir("alice"), PathBuf::from("/srv/proxies/user_alice/glidein_gf1"));
    }
}
