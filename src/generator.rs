//! Credential generator plugins.
//!
//! Sites can produce credentials on demand (typically tokens) with a generator bound to a trust
//! domain. Generators are registered by the host at startup and bound to the names the entry
//! descriptor configures; a configured name with no generator is reported once, at binding time.
//! At call time a missing or failing generator just means no credential.

use std::collections::{BTreeMap, BTreeSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::classad::{self, ClassAd};
use crate::descript::ElementDescript;

/// Entry facts handed to a generator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryInfo {
    pub name: Option<String>,
    pub gatekeeper: Option<String>,
    /// Identity of the factory serving the entry.
    pub factory: Option<String>,
}

impl EntryInfo {
    pub fn from_attrs(attrs: &ClassAd) -> Self {
        Self {
            name: attrs.get("EntryName").map(str::to_string),
            gatekeeper: attrs.get("GLIDEIN_Gatekeeper").map(str::to_string),
            factory: attrs.get(classad::AUTHENTICATED_IDENTITY).map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedCredential {
    pub token: String,
    /// Remaining lifetime in seconds.
    pub lifetime_secs: u64,
}

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("missing information to generate credential: {0}")]
    MissingInformation(String),
    #[error("could not generate credential: {0}")]
    CouldNotGenerate(String),
}

pub trait CredentialGenerator: Send + Sync {
    fn get_credential(&self, group: &str, entry: &EntryInfo, trust_domain: &str) -> Result<GeneratedCredential, GeneratorError>;
}

/// Generators bound to the names configured in an element descriptor.
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    bound: BTreeMap<String, Arc<dyn CredentialGenerator>>,
    unavailable: BTreeSet<String>,
}

impl GeneratorRegistry {
    /// Bind every generator name `descript` mentions to one of `available`.
    pub fn from_config(descript: &ElementDescript, available: &BTreeMap<String, Arc<dyn CredentialGenerator>>) -> Self {
        let mut reg = GeneratorRegistry::default();
        let Some(configured) = descript.credential_generators() else { return reg; };
        for name in configured.values() {
            if reg.bound.contains_key(name) || reg.unavailable.contains(name) {
                continue;
            }
            match available.get(name) {
                Some(g) => { reg.bound.insert(name.clone(), g.clone()); }
                None => {
                    warn!(target: "glidecred::generator", "failed to load credential generator plugin {}", name);
                    reg.unavailable.insert(name.clone());
                }
            }
        }
        reg
    }

    pub fn register(&mut self, name: impl Into<String>, generator: Arc<dyn CredentialGenerator>) {
        let name = name.into();
        self.unavailable.remove(&name);
        self.bound.insert(name, generator);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn CredentialGenerator>> { self.bound.get(name) }

    pub fn unavailable(&self) -> impl Iterator<Item = &str> { self.unavailable.iter().map(String::as_str) }
}

/// Ask the generator configured for `trust_domain` for a credential.
///
/// Returns the first credential produced. Unbound generators, generator errors and generator
/// panics are logged and yield `None`.
pub fn generate_credential(
    descript: &ElementDescript,
    registry: &GeneratorRegistry,
    entry_attrs: &ClassAd,
    group: &str,
    trust_domain: &str,
) -> Option<String> {
    let (Some(generators), Some(domains)) = (descript.credential_generators(), descript.proxy_trust_domains()) else {
        return None;
    };
    let entry = EntryInfo::from_attrs(entry_attrs);
    for (cred_name, gen_name) in generators {
        if domains.get(cred_name).map(String::as_str) != Some(trust_domain) {
            continue;
        }
        debug!(target: "glidecred::generator", "found credential generator plugin {} for {}", gen_name, cred_name);
        let Some(generator) = registry.get(gen_name) else {
            continue;
        };
        let called = catch_unwind(AssertUnwindSafe(|| generator.get_credential(group, &entry, trust_domain)));
        match called {
            Ok(Ok(generated)) => return Some(generated.token),
            Ok(Err(e)) => warn!(target: "glidecred::generator", "failed to generate credential: {}", e),
            Err(_) => warn!(target: "glidecred::generator", "credential generator plugin {} panicked", gen_name),
        }
    }
    None
}
