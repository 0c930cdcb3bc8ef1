//! Credential model.
//! ----------------
//! A `Credential` is one piece of credential material an entry can be configured with, together
//! with the policy metadata (security class, trust domain) and the optional cloud and renewal
//! fields. Credentials are immutable once built; the kind is derived from the material variant so
//! the tag can never disagree with the populated fields.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CredResult, CredentialError};

mod submit;

pub use submit::SubmitCredentials;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CredentialKind {
    GridProxy,
    CertPair,
    KeyPair,
    UsernamePassword,
    AuthFile,
    SciToken,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 6] = [
        CredentialKind::GridProxy,
        CredentialKind::CertPair,
        CredentialKind::KeyPair,
        CredentialKind::UsernamePassword,
        CredentialKind::AuthFile,
        CredentialKind::SciToken,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CredentialKind::GridProxy => "grid_proxy",
            CredentialKind::CertPair => "cert_pair",
            CredentialKind::KeyPair => "key_pair",
            CredentialKind::UsernamePassword => "username_password",
            CredentialKind::AuthFile => "auth_file",
            CredentialKind::SciToken => "scitoken",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for CredentialKind {
    type Err = CredentialError;
    fn from_str(s: &str) -> CredResult<Self> {
        CredentialKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CredentialError::UnknownCredentialKind(s.to_string()))
    }
}

/// Kind-specific material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialMaterial {
    GridProxy { location: PathBuf },
    SciToken { location: PathBuf },
    CertPair { cert: PathBuf, key: PathBuf },
    KeyPair { public_key: PathBuf, private_key: PathBuf, remote_username: Option<String> },
    UsernamePassword { username: String, password: String },
    AuthFile { file: PathBuf, remote_username: Option<String> },
}

impl CredentialMaterial {
    pub fn kind(&self) -> CredentialKind {
        match self {
            CredentialMaterial::GridProxy { .. } => CredentialKind::GridProxy,
            CredentialMaterial::SciToken { .. } => CredentialKind::SciToken,
            CredentialMaterial::CertPair { .. } => CredentialKind::CertPair,
            CredentialMaterial::KeyPair { .. } => CredentialKind::KeyPair,
            CredentialMaterial::UsernamePassword { .. } => CredentialKind::UsernamePassword,
            CredentialMaterial::AuthFile { .. } => CredentialKind::AuthFile,
        }
    }
}

/// Cloud-only fields; empty for grid entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloudFields {
    pub vm_id: Option<String>,
    pub vm_type: Option<String>,
    pub pilot_proxy: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewalFields {
    pub creation_script: Option<String>,
    /// Seconds between regenerations.
    pub update_frequency: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    security_class: String,
    trust_domain: String,
    cloud: CloudFields,
    renewal: RenewalFields,
    material: CredentialMaterial,
}

impl Credential {
    pub fn kind(&self) -> CredentialKind { self.material.kind() }
    pub fn security_class(&self) -> &str { &self.security_class }
    pub fn trust_domain(&self) -> &str { &self.trust_domain }
    pub fn cloud(&self) -> &CloudFields { &self.cloud }
    pub fn renewal(&self) -> &RenewalFields { &self.renewal }
    pub fn material(&self) -> &CredentialMaterial { &self.material }

    /// Primary file backing this credential, if it is file based.
    pub fn location(&self) -> Option<&Path> {
        match &self.material {
            CredentialMaterial::GridProxy { location } | CredentialMaterial::SciToken { location } => Some(location),
            CredentialMaterial::CertPair { cert, .. } => Some(cert),
            CredentialMaterial::KeyPair { public_key, .. } => Some(public_key),
            CredentialMaterial::AuthFile { file, .. } => Some(file),
            CredentialMaterial::UsernamePassword { .. } => None,
        }
    }
}

/// Named construction fields, e.g. as read from an entry descriptor.
pub type CredentialFields = BTreeMap<String, String>;

/// Consumes fields by name so whatever is left over after construction is, by definition, extra.
struct FieldReader<'a> {
    kind: CredentialKind,
    remaining: BTreeMap<&'a str, &'a str>,
}

impl<'a> FieldReader<'a> {
    fn new(kind: CredentialKind, fields: &'a CredentialFields) -> Self {
        Self { kind, remaining: fields.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect() }
    }

    fn required(&mut self, name: &str) -> CredResult<String> {
        self.remaining
            .remove(name)
            .map(str::to_string)
            .ok_or_else(|| self.invalid(format!("missing required field '{}'", name)))
    }

    fn optional(&mut self, name: &str) -> Option<String> { self.remaining.remove(name).map(str::to_string) }

    fn path(&mut self, name: &str) -> CredResult<PathBuf> { self.required(name).map(PathBuf::from) }

    fn invalid(&self, reason: String) -> CredentialError {
        CredentialError::InvalidCredentialFields { kind: self.kind.to_string(), reason }
    }

    fn finish(self) -> CredResult<()> {
        if self.remaining.is_empty() {
            return Ok(());
        }
        let extra: Vec<&str> = self.remaining.keys().copied().collect();
        Err(self.invalid(format!("unexpected field(s) {}", extra.join(", "))))
    }
}

type Constructor = fn(&mut FieldReader<'_>) -> CredResult<CredentialMaterial>;

fn build_grid_proxy(r: &mut FieldReader<'_>) -> CredResult<CredentialMaterial> {
    Ok(CredentialMaterial::GridProxy { location: r.path("cred_loc")? })
}

fn build_scitoken(r: &mut FieldReader<'_>) -> CredResult<CredentialMaterial> {
    Ok(CredentialMaterial::SciToken { location: r.path("cred_loc")? })
}

fn build_cert_pair(r: &mut FieldReader<'_>) -> CredResult<CredentialMaterial> {
    Ok(CredentialMaterial::CertPair { cert: r.path("cert")?, key: r.path("certkey")? })
}

fn build_key_pair(r: &mut FieldReader<'_>) -> CredResult<CredentialMaterial> {
    Ok(CredentialMaterial::KeyPair {
        public_key: r.path("pub_key")?,
        private_key: r.path("priv_key")?,
        remote_username: r.optional("rem_user"),
    })
}

fn build_username_password(r: &mut FieldReader<'_>) -> CredResult<CredentialMaterial> {
    Ok(CredentialMaterial::UsernamePassword { username: r.required("username")?, password: r.required("password")? })
}

fn build_auth_file(r: &mut FieldReader<'_>) -> CredResult<CredentialMaterial> {
    Ok(CredentialMaterial::AuthFile { file: r.path("file")?, remote_username: r.optional("rem_user") })
}

/// Adding a kind means adding an enum variant and a row here.
const CONSTRUCTORS: [(CredentialKind, Constructor); 6] = [
    (CredentialKind::GridProxy, build_grid_proxy),
    (CredentialKind::CertPair, build_cert_pair),
    (CredentialKind::KeyPair, build_key_pair),
    (CredentialKind::UsernamePassword, build_username_password),
    (CredentialKind::AuthFile, build_auth_file),
    (CredentialKind::SciToken, build_scitoken),
];

/// Build a credential of the named kind from its fields.
///
/// `sec_class` and `trust_dom` are required for every kind; `vm_id`, `vm_type`, `pilot_proxy`,
/// `creation_script` and `update_freq` are optional. Any field the kind does not know is rejected.
pub fn create(kind: &str, fields: &CredentialFields) -> CredResult<Credential> {
    let kind: CredentialKind = kind.parse()?;
    let ctor = CONSTRUCTORS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, c)| *c)
        .ok_or_else(|| CredentialError::internal(format!("no constructor registered for {}", kind)))?;

    let mut r = FieldReader::new(kind, fields);
    let material = ctor(&mut r)?;
    let security_class = r.required("sec_class")?;
    let trust_domain = r.required("trust_dom")?;
    let cloud = CloudFields { vm_id: r.optional("vm_id"), vm_type: r.optional("vm_type"), pilot_proxy: r.optional("pilot_proxy") };
    let update_frequency = match r.optional("update_freq") {
        Some(v) => Some(v.trim().parse::<u64>().map_err(|_| r.invalid(format!("update_freq '{}' is not a number of seconds", v)))?),
        None => None,
    };
    let renewal = RenewalFields { creation_script: r.optional("creation_script"), update_frequency };
    r.finish()?;
    Ok(Credential { security_class, trust_domain, cloud, renewal, material })
}

/// Credentials keyed by name. The value type is the credential itself, so nothing else can be
/// stored here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    inner: BTreeMap<String, Credential>,
}

impl Credentials {
    pub fn new() -> Self { Self::default() }

    /// Insert or replace; returns the previous credential under that key.
    pub fn insert(&mut self, key: impl Into<String>, cred: Credential) -> Option<Credential> {
        self.inner.insert(key.into(), cred)
    }

    pub fn get(&self, key: &str) -> Option<&Credential> { self.inner.get(key) }
    pub fn len(&self) -> usize { self.inner.len() }
    pub fn is_empty(&self) -> bool { self.inner.is_empty() }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Credential)> { self.inner.iter().map(|(k, v)| (k.as_str(), v)) }

    /// Credentials of one kind in a given trust domain.
    pub fn in_trust_domain<'a>(&'a self, kind: CredentialKind, trust_domain: &'a str) -> impl Iterator<Item = &'a Credential> + 'a {
        self.inner.values().filter(move |c| c.kind() == kind && c.trust_domain == trust_domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> CredentialFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn well_formed(kind: CredentialKind) -> CredentialFields {
        let mut f = fields(&[("sec_class", "prod"), ("trust_dom", "grid")]);
        let specific: &[(&str, &str)] = match kind {
            CredentialKind::GridProxy | CredentialKind::SciToken => &[("cred_loc", "/etc/cred")],
            CredentialKind::CertPair => &[("cert", "/etc/c.pem"), ("certkey", "/etc/k.pem")],
            CredentialKind::KeyPair => &[("pub_key", "/etc/id.pub"), ("priv_key", "/etc/id")],
            CredentialKind::UsernamePassword => &[("username", "bob"), ("password", "s3cret")],
            CredentialKind::AuthFile => &[("file", "/etc/auth")],
        };
        f.extend(fields(specific));
        f
    }

    #[test]
    fn every_kind_builds_and_reports_its_kind() {
        for kind in CredentialKind::ALL {
            let cred = create(kind.as_str(), &well_formed(kind)).unwrap();
            assert_eq!(cred.kind(), kind);
            assert_eq!(cred.security_class(), "prod");
            assert_eq!(cred.trust_domain(), "grid");
        }
    }

    #[test]
    fn missing_required_field_is_rejected_for_every_kind() {
        for kind in CredentialKind::ALL {
            let full = well_formed(kind);
            for name in full.keys() {
                let mut partial = full.clone();
                partial.remove(name);
                let err = create(kind.as_str(), &partial).unwrap_err();
                assert!(matches!(err, CredentialError::InvalidCredentialFields { .. }), "{} without {}", kind, name);
            }
        }
    }

    #[test]
    fn extra_field_is_rejected() {
        let mut f = well_formed(CredentialKind::GridProxy);
        f.insert("username".into(), "sneaky".into());
        let err = create("grid_proxy", &f).unwrap_err();
        assert!(err.to_string().contains("username"));
    }

    #[test]
    fn unknown_kind() {
        let err = create("kerberos", &well_formed(CredentialKind::GridProxy)).unwrap_err();
        assert!(matches!(err, CredentialError::UnknownCredentialKind(k) if k == "kerberos"));
    }

    #[test]
    fn optional_fields_are_carried() {
        let mut f = well_formed(CredentialKind::KeyPair);
        f.extend(fields(&[("rem_user", "cloudy"), ("vm_id", "ami-1"), ("vm_type", "m5.large"), ("update_freq", "3600")]));
        let cred = create("key_pair", &f).unwrap();
        assert_eq!(cred.cloud().vm_id.as_deref(), Some("ami-1"));
        assert_eq!(cred.renewal().update_frequency, Some(3600));
        match cred.material() {
            CredentialMaterial::KeyPair { remote_username, .. } => assert_eq!(remote_username.as_deref(), Some("cloudy")),
            other => panic!("unexpected material {:?}", other),
        }
        assert_eq!(cred.location(), Some(Path::new("/etc/id.pub")));
    }

    #[test]
    fn bad_update_frequency() {
        let mut f = well_formed(CredentialKind::SciToken);
        f.insert("update_freq".into(), "hourly".into());
        assert!(matches!(create("scitoken", &f), Err(CredentialError::InvalidCredentialFields { .. })));
    }

    #[test]
    fn credentials_map_filters_by_trust_domain() {
        let mut creds = Credentials::new();
        creds.insert("a", create("scitoken", &well_formed(CredentialKind::SciToken)).unwrap());
        let mut other = well_formed(CredentialKind::SciToken);
        other.insert("trust_dom".into(), "cloud".into());
        creds.insert("b", create("scitoken", &other).unwrap());
        assert_eq!(creds.len(), 2);
        assert_eq!(creds.in_trust_domain(CredentialKind::SciToken, "cloud").count(), 1);
        assert!(creds.insert("a", create("grid_proxy", &well_formed(CredentialKind::GridProxy)).unwrap()).is_some());
        assert_eq!(creds.get("a").map(|c| c.kind()), Some(CredentialKind::GridProxy));
    }
}
