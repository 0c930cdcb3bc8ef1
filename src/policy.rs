//! Frontend authorization policy: which identity each frontend security name must present and
//! which local user each (security name, security class) pair maps to.

use std::collections::BTreeMap;
use std::path::Path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub trait FrontendPolicy: Send + Sync {
    fn get_identity(&self, security_name: &str) -> Option<&str>;
    fn get_username(&self, security_name: &str, security_class: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FrontendEntry {
    /// Authenticated identity the transport must report for this frontend.
    pub identity: String,
    /// Security class -> local username.
    #[serde(default)]
    pub usermap: BTreeMap<String, String>,
}

/// Descriptor of all frontends this factory accepts, keyed by security name.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FrontendDescript {
    #[serde(default)]
    pub frontends: BTreeMap<String, FrontendEntry>,
}

impl FrontendDescript {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading frontend descript {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing frontend descript {}", path.display()))
    }

    pub fn add_frontend(&mut self, security_name: &str, identity: &str) -> &mut FrontendEntry {
        let e = self.frontends.entry(security_name.to_string()).or_default();
        e.identity = identity.to_string();
        e
    }
}

impl FrontendEntry {
    pub fn map_class(&mut self, security_class: &str, username: &str) -> &mut Self {
        self.usermap.insert(security_class.to_string(), username.to_string());
        self
    }
}

impl FrontendPolicy for FrontendDescript {
    fn get_identity(&self, security_name: &str) -> Option<&str> {
        self.frontends.get(security_name).map(|f| f.identity.as_str())
    }

    fn get_username(&self, security_name: &str, security_class: &str) -> Option<&str> {
        self.frontends.get(security_name)?.usermap.get(security_class).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups() {
        let d: FrontendDescript = serde_json::from_str(r#"{
            "frontends": {
                "vofe": {"identity": "vofe@host.example.org", "usermap": {"prod": "vo_prod", "test": "vo_test"}}
            }
        }"#).unwrap();
        assert_eq!(d.get_identity("vofe"), Some("vofe@host.example.org"));
        assert_eq!(d.get_identity("other"), None);
        assert_eq!(d.get_username("vofe", "prod"), Some("vo_prod"));
        assert_eq!(d.get_username("vofe", "nope"), None);
        assert_eq!(d.get_username("other", "prod"), None);
    }

    #[test]
    fn builder_helpers() {
        let mut d = FrontendDescript::default();
        d.add_frontend("fe", "fe@x").map_class("c1", "u1");
        assert_eq!(d.get_username("fe", "c1"), Some("u1"));
    }
}
