//! Read-only view of one decoded request ClassAd.

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

use crate::error::{CredResult, CredentialError};

pub const CLIENT_NAME: &str = "ClientName";
pub const AUTHENTICATED_IDENTITY: &str = "AuthenticatedIdentity";
pub const REQ_ENC_KEY_CODE: &str = "ReqEncKeyCode";
pub const REQ_ENC_IDENTITY: &str = "ReqEncIdentity";
pub const ENC_PARAM_SECURITY_NAME: &str = "GlideinEncParamSecurityName";
pub const ENC_PARAM_SECURITY_CLASS_PREFIX: &str = "GlideinEncParamSecurityClass";
pub const ENC_PARAM_PREFIX: &str = "GlideinEncParam";

/// Flat attribute map of a single request. Keys are case sensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassAd {
    attrs: BTreeMap<String, String>,
}

impl ClassAd {
    pub fn new(attrs: BTreeMap<String, String>) -> Self { Self { attrs } }

    pub fn get(&self, key: &str) -> Option<&str> { self.attrs.get(key).map(String::as_str) }

    pub fn contains(&self, key: &str) -> bool { self.attrs.contains_key(key) }

    pub fn require(&self, key: &str) -> CredResult<&str> {
        self.get(key).ok_or_else(|| CredentialError::malformed(format!("classad has no {} attribute", key)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.attrs.keys().map(String::as_str) }

    /// Ids of all embedded credentials, i.e. the suffixes of every
    /// `GlideinEncParamSecurityClass<ID>` attribute, in key order.
    pub fn credential_ids(&self) -> Vec<&str> {
        self.keys()
            .filter_map(|k| k.strip_prefix(ENC_PARAM_SECURITY_CLASS_PREFIX))
            .collect()
    }

    pub fn security_class_key(cred_id: &str) -> String { format!("{}{}", ENC_PARAM_SECURITY_CLASS_PREFIX, cred_id) }

    pub fn param_key(cred_id: &str) -> String { format!("{}{}", ENC_PARAM_PREFIX, cred_id) }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ClassAd {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { attrs: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_ids_are_suffixes_of_security_class_keys() {
        let ad: ClassAd = [
            ("ClientName", "fe"),
            ("GlideinEncParamSecurityName", "aa"),
            ("GlideinEncParamSecurityClass7", "bb"),
            ("GlideinEncParam7", "cc"),
            ("GlideinEncParamSecurityClassx_1", "dd"),
        ]
        .into_iter()
        .collect();
        assert_eq!(ad.credential_ids(), vec!["7", "x_1"]);
        assert_eq!(ClassAd::param_key("7"), "GlideinEncParam7");
    }

    #[test]
    fn require_reports_missing_attribute() {
        let ad = ClassAd::default();
        let err = ad.require(CLIENT_NAME).unwrap_err();
        assert_eq!(err.code_str(), "malformed_request");
        assert!(err.to_string().contains("ClientName"));
    }

    #[test]
    fn deserializes_from_flat_json_object() {
        let ad: ClassAd = serde_json::from_str(r#"{"ClientName":"fe","ReqEncKeyCode":"00"}"#).unwrap();
        assert_eq!(ad.get("ClientName"), Some("fe"));
        assert!(ad.contains("ReqEncKeyCode"));
    }
}
