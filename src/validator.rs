//! Credential-set contract per declared auth method.
//!
//! An entry declares how glideins authenticate (`grid_proxy`, `cert_pair+scitoken`, ...). A
//! request for that entry must carry exactly the credential fields that method needs: a missing
//! field means the request cannot be served, an extra one means somebody is trying to slip a
//! second credential type past the entry, and both drop the request.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, warn};

use crate::config::UnknownAuthMethodPolicy;
use crate::error::{CredResult, CredentialError};

/// Every parameter name that carries credential material.
pub const RELEVANT_KEYS: [&str; 11] = [
    "SubmitProxy",
    "GlideinProxy",
    "Username",
    "Password",
    "PublicCert",
    "PrivateCert",
    "PublicKey",
    "PrivateKey",
    "VMId",
    "VMType",
    "AuthFile",
];

/// Parameter a frontend sets when it forwards a SciToken.
pub const FRONTEND_SCITOKEN: &str = "frontend_scitoken";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AuthMethodKind {
    GridProxy,
    CertPair,
    KeyPair,
    AuthFile,
    UsernamePassword,
    IdToken,
    SciToken,
    Other(String),
}

impl AuthMethodKind {
    fn parse(s: &str) -> Self {
        match s {
            "grid_proxy" => AuthMethodKind::GridProxy,
            "cert_pair" => AuthMethodKind::CertPair,
            "key_pair" => AuthMethodKind::KeyPair,
            "auth_file" => AuthMethodKind::AuthFile,
            "username_password" => AuthMethodKind::UsernamePassword,
            "idtoken" => AuthMethodKind::IdToken,
            "scitoken" => AuthMethodKind::SciToken,
            other => AuthMethodKind::Other(other.to_string()),
        }
    }

    pub fn is_supported(&self) -> bool { !matches!(self, AuthMethodKind::Other(_)) }
}

/// A possibly composite auth method, e.g. `grid_proxy+scitoken`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthMethod {
    raw: String,
    parts: Vec<AuthMethodKind>,
}

impl AuthMethod {
    pub fn parse(raw: &str) -> Self {
        let parts = raw.split('+').map(|p| AuthMethodKind::parse(p.trim())).collect();
        Self { raw: raw.to_string(), parts }
    }

    pub fn contains(&self, kind: &AuthMethodKind) -> bool { self.parts.contains(kind) }

    pub fn has_supported(&self) -> bool { self.parts.iter().any(AuthMethodKind::is_supported) }

    pub fn parts(&self) -> &[AuthMethodKind] { &self.parts }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.raw) }
}

/// Request context used in diagnostics.
#[derive(Debug, Clone, Copy)]
pub struct RequestRef<'a> {
    pub client: &'a str,
    pub entry: &'a str,
}

/// Rules for one non-proxy sub-method: what must be present and what may be present.
struct SubMethodRule {
    kind: AuthMethodKind,
    label: &'static str,
    required: &'static [&'static str],
    allowed: &'static [&'static str],
}

static NON_PROXY_RULES: [SubMethodRule; 4] = [
    SubMethodRule {
        kind: AuthMethodKind::CertPair,
        label: "certificate pair",
        required: &["PublicCert", "PrivateCert"],
        allowed: &["GlideinProxy", "PublicCert", "PrivateCert", "VMId", "VMType"],
    },
    SubMethodRule {
        kind: AuthMethodKind::KeyPair,
        label: "key pair",
        required: &["PublicKey", "PrivateKey"],
        allowed: &["GlideinProxy", "PublicKey", "PrivateKey", "VMId", "VMType"],
    },
    SubMethodRule {
        kind: AuthMethodKind::AuthFile,
        label: "auth_file",
        required: &["AuthFile"],
        allowed: &["GlideinProxy", "AuthFile", "VMId", "VMType"],
    },
    SubMethodRule {
        kind: AuthMethodKind::UsernamePassword,
        label: "username and password",
        required: &["Username", "Password"],
        allowed: &["GlideinProxy", "Username", "Password", "VMId", "VMType"],
    },
];

fn reject_unlisted(params: &HashSet<&str>, allowed: &[&str], req: RequestRef<'_>) -> CredResult<()> {
    let mut extra: Vec<&str> = RELEVANT_KEYS
        .iter()
        .copied()
        .filter(|k| !allowed.contains(k) && params.contains(k))
        .collect();
    if extra.is_empty() {
        return Ok(());
    }
    extra.sort_unstable();
    Err(violation(req, format!("credentials not required by the entry were supplied ({}), skipping request", extra.join(", "))))
}

fn violation(req: RequestRef<'_>, constraint: impl Into<String>) -> CredentialError {
    let constraint = constraint.into();
    warn!(target: "glidecred::validator", "request from {} for entry {} rejected: {}", req.client, req.entry, constraint);
    CredentialError::contract(req.client, req.entry, constraint)
}

/// Verify that `params` holds exactly the credentials `method` calls for.
///
/// `params` are the names of the decrypted parameters of the request. With `scitoken_passthru`
/// a SciToken-bearing request bypasses the contract.
pub fn check_security_credentials<'p, I>(
    method: &AuthMethod,
    params: I,
    req: RequestRef<'_>,
    scitoken_passthru: bool,
    unknown_policy: UnknownAuthMethodPolicy,
) -> CredResult<()>
where
    I: IntoIterator<Item = &'p str>,
{
    if !method.has_supported() {
        return match unknown_policy {
            UnknownAuthMethodPolicy::Allow => {
                warn!(target: "glidecred::validator", "none of the supported auth methods in '{}' for entry {}; allowing request from {}", method, req.entry, req.client);
                Ok(())
            }
            UnknownAuthMethodPolicy::Deny => Err(violation(req, format!("auth method '{}' is not supported by this factory", method))),
        };
    }

    let params: HashSet<&str> = params.into_iter().collect();

    if method.contains(&AuthMethodKind::SciToken) || (params.contains(FRONTEND_SCITOKEN) && scitoken_passthru) {
        debug!(target: "glidecred::validator", "scitoken accepted for {} on entry {}", req.client, req.entry);
        return Ok(());
    }

    if method.contains(&AuthMethodKind::GridProxy) {
        if scitoken_passthru {
            return Ok(());
        }
        if !params.contains("SubmitProxy") {
            return Err(violation(req, "no proxy provided as required by the entry, skipping request"));
        }
        return reject_unlisted(&params, &["SubmitProxy"], req);
    }

    if !params.contains("GlideinProxy") && !scitoken_passthru {
        return Err(violation(req, "glidein proxy cannot be found, skipping request"));
    }

    let Some(rule) = NON_PROXY_RULES.iter().find(|r| method.contains(&r.kind)) else {
        return Err(CredentialError::internal(format!(
            "auth method '{}' passed the supported check but has no credential rule",
            method
        )));
    };
    if !rule.required.iter().all(|k| params.contains(k)) {
        return Err(violation(
            req,
            format!("the {} required by the entry was not specified, skipping request", rule.label),
        ));
    }
    reject_unlisted(&params, rule.allowed, req)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REQ: RequestRef<'static> = RequestRef { client: "fe_client", entry: "CE_entry" };

    fn check(method: &str, params: &[&str], passthru: bool) -> CredResult<()> {
        check_security_credentials(&AuthMethod::parse(method), params.iter().copied(), REQ, passthru, UnknownAuthMethodPolicy::Allow)
    }

    fn is_contract(r: CredResult<()>) -> bool { matches!(r, Err(CredentialError::ContractViolation { .. })) }

    #[test]
    fn grid_proxy_contract() {
        assert!(check("grid_proxy", &["SubmitProxy"], false).is_ok());
        assert!(is_contract(check("grid_proxy", &["SubmitProxy", "Username"], false)));
        assert!(is_contract(check("grid_proxy", &["Username", "Password"], false)));
        // irrelevant parameters do not matter
        assert!(check("grid_proxy", &["SubmitProxy", "GLIDEIN_Site"], false).is_ok());
    }

    #[test]
    fn grid_proxy_with_passthru_skips_checks() {
        assert!(check("grid_proxy", &["Username", "Password"], true).is_ok());
    }

    #[test]
    fn cert_pair_contract() {
        assert!(check("cert_pair", &["GlideinProxy", "PublicCert", "PrivateCert"], false).is_ok());
        assert!(check("cert_pair", &["GlideinProxy", "PublicCert", "PrivateCert", "VMId", "VMType"], false).is_ok());
        assert!(is_contract(check("cert_pair", &["GlideinProxy", "PublicCert"], false)));
        let err = check("cert_pair", &["GlideinProxy", "PublicCert", "PrivateCert", "Username"], false).unwrap_err();
        assert!(err.to_string().contains("Username"));
        assert!(err.to_string().contains("fe_client"));
        assert!(err.to_string().contains("CE_entry"));
    }

    #[test]
    fn non_proxy_methods_need_glidein_proxy() {
        assert!(is_contract(check("key_pair", &["PublicKey", "PrivateKey"], false)));
        assert!(check("key_pair", &["GlideinProxy", "PublicKey", "PrivateKey"], false).is_ok());
        assert!(check("auth_file", &["GlideinProxy", "AuthFile"], false).is_ok());
        assert!(is_contract(check("auth_file", &["GlideinProxy", "AuthFile", "SubmitProxy"], false)));
        assert!(check("username_password", &["GlideinProxy", "Username", "Password"], false).is_ok());
        assert!(is_contract(check("username_password", &["GlideinProxy", "Username"], false)));
    }

    #[test]
    fn scitoken_declared_or_forwarded() {
        assert!(check("scitoken", &["Username", "SubmitProxy"], false).is_ok());
        assert!(check("grid_proxy+scitoken", &[], false).is_ok());
        assert!(check("cert_pair", &["frontend_scitoken"], true).is_ok());
        // without passthru the forwarded token does not bypass the contract
        assert!(is_contract(check("cert_pair", &["frontend_scitoken"], false)));
    }

    #[test]
    fn unknown_methods_follow_policy() {
        assert!(check("kerberos", &["Username"], false).is_ok());
        let denied = check_security_credentials(
            &AuthMethod::parse("kerberos+ldap"),
            ["Username"],
            REQ,
            false,
            UnknownAuthMethodPolicy::Deny,
        );
        assert!(is_contract(denied));
    }

    #[test]
    fn idtoken_alone_is_an_internal_inconsistency() {
        let r = check("idtoken", &["GlideinProxy"], false);
        assert!(matches!(r, Err(CredentialError::Internal(_))));
    }

    #[derive(Clone, Default)]
    struct LogBuf(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
    }

    #[test]
    fn violations_are_logged_with_request_context() {
        let buf = LogBuf::default();
        let writer = buf.clone();
        let subscriber = tracing_subscriber::fmt().with_writer(move || writer.clone()).with_ansi(false).finish();
        tracing::subscriber::with_default(subscriber, || {
            assert!(is_contract(check("cert_pair", &["GlideinProxy", "PublicCert", "PrivateCert", "Username"], false)));
        });
        let out = String::from_utf8(buf.0.lock().clone()).unwrap();
        let warned: Vec<&str> = out.lines().filter(|l| l.contains("WARN")).collect();
        assert_eq!(warned.len(), 1, "{}", out);
        assert!(warned[0].contains("fe_client"));
        assert!(warned[0].contains("CE_entry"));
        assert!(warned[0].contains("Username"));
    }

    #[test]
    fn composite_parsing() {
        let m = AuthMethod::parse("grid_proxy+vm_id");
        assert_eq!(m.parts(), &[AuthMethodKind::GridProxy, AuthMethodKind::Other("vm_id".into())]);
        assert!(m.has_supported());
        assert_eq!(m.to_string(), "grid_proxy+vm_id");
    }
}
