//! Entry (element) descriptor: which credential files an entry is configured with, their types,
//! their trust domains and the generator plugins that can produce them. Element-level settings
//! take precedence over the frontend-wide defaults.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::credential::CredentialKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DescriptSection {
    /// Credential file -> credential type name.
    #[serde(default)]
    pub proxy_types: Option<BTreeMap<String, String>>,
    /// Credential file -> trust domain.
    #[serde(default)]
    pub proxy_trust_domains: Option<BTreeMap<String, String>>,
    /// Credential file -> generator plugin name.
    #[serde(default)]
    pub credential_generators: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ElementDescript {
    #[serde(default)]
    pub element: DescriptSection,
    #[serde(default)]
    pub frontend: DescriptSection,
}

fn pick<'a>(element: &'a Option<BTreeMap<String, String>>, frontend: &'a Option<BTreeMap<String, String>>) -> Option<&'a BTreeMap<String, String>> {
    element.as_ref().filter(|m| !m.is_empty()).or(frontend.as_ref())
}

impl ElementDescript {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading element descript {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing element descript {}", path.display()))
    }

    pub fn proxy_types(&self) -> Option<&BTreeMap<String, String>> {
        pick(&self.element.proxy_types, &self.frontend.proxy_types)
    }

    pub fn proxy_trust_domains(&self) -> Option<&BTreeMap<String, String>> {
        pick(&self.element.proxy_trust_domains, &self.frontend.proxy_trust_domains)
    }

    pub fn credential_generators(&self) -> Option<&BTreeMap<String, String>> {
        pick(&self.element.credential_generators, &self.frontend.credential_generators)
    }

    /// Credential files of `kind` configured for `trust_domain`, in name order.
    pub fn credentials_for(&self, kind: CredentialKind, trust_domain: &str) -> Vec<&str> {
        let (Some(types), Some(domains)) = (self.proxy_types(), self.proxy_trust_domains()) else {
            return Vec::new();
        };
        types
            .iter()
            .filter(|(name, t)| t.as_str() == kind.as_str() && domains.get(*name).map(String::as_str) == Some(trust_domain))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Read the locally configured SciToken for `trust_domain`, whitespace-trimmed.
    /// When several match, the last one in name order wins.
    pub fn local_scitoken(&self, trust_domain: &str) -> Option<String> {
        let path = PathBuf::from(*self.credentials_for(CredentialKind::SciToken, trust_domain).last()?);
        if !path.exists() {
            return None;
        }
        debug!(target: "glidecred::descript", "found scitoken {}", path.display());
        match std::fs::read_to_string(&path) {
            Ok(s) => Some(s.trim().to_string()),
            Err(e) => {
                error!(target: "glidecred::descript", "failed to read scitoken {}: {}", path.display(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> Option<BTreeMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn element_overrides_frontend() {
        let d = ElementDescript {
            element: DescriptSection { proxy_types: map(&[("/a", "grid_proxy")]), ..Default::default() },
            frontend: DescriptSection {
                proxy_types: map(&[("/b", "scitoken")]),
                proxy_trust_domains: map(&[("/a", "grid"), ("/b", "osg")]),
                ..Default::default()
            },
        };
        assert_eq!(d.proxy_types().unwrap().len(), 1);
        assert_eq!(d.credentials_for(CredentialKind::GridProxy, "grid"), vec!["/a"]);
        assert!(d.credentials_for(CredentialKind::SciToken, "osg").is_empty());
    }

    #[test]
    fn local_scitoken_reads_and_trims() {
        let tmp = tempfile::tempdir().unwrap();
        let tok = tmp.path().join("osg.scitoken");
        std::fs::write(&tok, "  eyJ0eXAi.payload.sig\n").unwrap();
        let tok_s = tok.to_string_lossy().into_owned();
        let d = ElementDescript {
            element: DescriptSection {
                proxy_types: map(&[(tok_s.as_str(), "scitoken"), ("/nonexistent", "scitoken")]),
                proxy_trust_domains: map(&[(tok_s.as_str(), "osg"), ("/nonexistent", "other")]),
                ..Default::default()
            },
            frontend: DescriptSection::default(),
        };
        assert_eq!(d.local_scitoken("osg").as_deref(), Some("eyJ0eXAi.payload.sig"));
        assert_eq!(d.local_scitoken("other"), None);
        assert_eq!(d.local_scitoken("nowhere"), None);
    }

    #[test]
    fn deserializes_partial_json() {
        let d: ElementDescript = serde_json::from_str(r#"{"frontend":{"credential_generators":{"/tok":"osg_gen"}}}"#).unwrap();
        assert_eq!(d.credential_generators().unwrap().get("/tok").map(String::as_str), Some("osg_gen"));
        assert!(d.proxy_trust_domains().is_none());
    }
}
