//! Frontend authentication.
//!
//! A request is trusted only if the identity the frontend encrypted into the ad matches the
//! identity the transport authenticated, and the frontend's declared security name is one the
//! factory knows with that same identity. Every failure is terminal for the ad; nothing is
//! retried here.

use tracing::debug;

use crate::classad::{self, ClassAd};
use crate::crypto::{decrypt_utf8, FactoryKey, SymmetricKey};
use crate::error::{CredResult, CredentialError};
use crate::policy::FrontendPolicy;

/// A request that passed authentication.
pub struct AuthenticatedFrontend {
    /// Symmetric key of this request, used to decrypt the remaining parameters.
    pub sym_key: Box<dyn SymmetricKey>,
    /// Verified frontend security name.
    pub security_name: String,
}

impl std::fmt::Debug for AuthenticatedFrontend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedFrontend").field("security_name", &self.security_name).finish_non_exhaustive()
    }
}

/// Recover the per-request symmetric key from `ReqEncKeyCode`.
pub fn extract_key(factory_key: &dyn FactoryKey, ad: &ClassAd) -> CredResult<Box<dyn SymmetricKey>> {
    let Some(code) = ad.get(classad::REQ_ENC_KEY_CODE) else {
        return Err(CredentialError::auth("classad does not contain a key, cannot decrypt"));
    };
    factory_key.extract_sym_key(code).map_err(|e| {
        debug!(target: "glidecred::auth", "symmetric key extraction failed for client {}: {:#}", ad.get(classad::CLIENT_NAME).unwrap_or("<unknown>"), e);
        CredentialError::auth("symmetric key extraction failed")
    })
}

fn decrypt_attr(key: &dyn SymmetricKey, ad: &ClassAd, attr: &str) -> CredResult<String> {
    let ciphertext = ad.get(attr).ok_or_else(|| CredentialError::auth(format!("classad has no {}", attr)))?;
    decrypt_utf8(key, ciphertext).map_err(|e| {
        debug!(target: "glidecred::auth", "cannot decrypt {}: {:#}", attr, e);
        CredentialError::auth(format!("cannot decrypt {}", attr))
    })
}

/// Validate that the frontend advertising `ad` is allowed and that it claims the same identity
/// the transport authenticated.
pub fn authenticate(factory_key: &dyn FactoryKey, ad: &ClassAd, policy: &dyn FrontendPolicy) -> CredResult<AuthenticatedFrontend> {
    let sym_key = extract_key(factory_key, ad)?;
    let authenticated_identity = ad
        .get(classad::AUTHENTICATED_IDENTITY)
        .ok_or_else(|| CredentialError::auth("classad has no AuthenticatedIdentity"))?;

    let claimed = decrypt_attr(sym_key.as_ref(), ad, classad::REQ_ENC_IDENTITY)?;
    if claimed != authenticated_identity {
        return Err(CredentialError::Authentication(format!(
            "client provided invalid ReqEncIdentity ({} != {}), skipping for security reasons",
            claimed, authenticated_identity
        )));
    }

    let security_name = decrypt_attr(sym_key.as_ref(), ad, classad::ENC_PARAM_SECURITY_NAME)?;
    let Some(expected) = policy.get_identity(&security_name) else {
        return Err(CredentialError::auth(format!("frontend is not authorized by the factory, supplied security name: {}", security_name)));
    };
    if expected != authenticated_identity {
        return Err(CredentialError::auth(format!("authenticated identity of frontend {} does not match the expected identity", security_name)));
    }

    debug!(target: "glidecred::auth", "frontend {} authenticated as {}", security_name, authenticated_identity);
    Ok(AuthenticatedFrontend { sym_key, security_name })
}
