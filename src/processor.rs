//! Global credential processing: one request ClassAd from authentication to files on disk.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::authenticator::authenticate;
use crate::classad::{self, ClassAd};
use crate::crypto::{decrypt_utf8, FactoryKey};
use crate::error::{CredResult, CredentialError};
use crate::policy::FrontendPolicy;
use crate::storage::{CredentialStore, PersistedFiles};

/// Factory-side material needed to process requests.
#[derive(Clone, Default)]
pub struct GlideinDescript {
    pub factory_key: Option<Arc<dyn FactoryKey>>,
}

impl GlideinDescript {
    pub fn new(factory_key: Arc<dyn FactoryKey>) -> Self { Self { factory_key: Some(factory_key) } }

    fn require_key(&self) -> CredResult<&dyn FactoryKey> {
        self.factory_key
            .as_deref()
            .ok_or_else(|| CredentialError::config("factory has no public key, cannot decrypt"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCredential {
    pub cred_id: String,
    pub username: String,
    pub files: PersistedFiles,
}

/// Result of processing one ClassAd.
#[derive(Debug)]
pub struct ProcessReport {
    pub client_name: String,
    pub security_name: String,
    pub persisted: Vec<PersistedCredential>,
    /// Per-id mapping failures; the rest of the ad was still processed.
    pub skipped: Vec<CredentialError>,
}

/// Authenticate `ad`, then decrypt, map and persist every embedded credential.
///
/// A security class without a user mapping only skips that credential id. Anything else aborts
/// the whole ad before any file is written, and is logged once here and returned unchanged.
pub fn process_global(
    ad: &ClassAd,
    glidein: &GlideinDescript,
    policy: &dyn FrontendPolicy,
    store: &CredentialStore,
) -> CredResult<ProcessReport> {
    process_ad(ad, glidein, policy, store).map_err(|e| {
        error!(
            target: "glidecred::process",
            "error processing globals classad from client {}: {}",
            ad.get(classad::CLIENT_NAME).unwrap_or("<unknown>"),
            e
        );
        e
    })
}

/// Credential decrypted and mapped, not yet written.
struct Staged<'a> {
    cred_id: &'a str,
    username: &'a str,
    data: Vec<u8>,
}

fn process_ad(
    ad: &ClassAd,
    glidein: &GlideinDescript,
    policy: &dyn FrontendPolicy,
    store: &CredentialStore,
) -> CredResult<ProcessReport> {
    let factory_key = glidein.require_key()?;
    let frontend = authenticate(factory_key, ad, policy)?;
    let client_name = ad.require(classad::CLIENT_NAME)?;
    let key = frontend.sym_key.as_ref();

    let mut report = ProcessReport {
        client_name: client_name.to_string(),
        security_name: frontend.security_name.clone(),
        persisted: Vec::new(),
        skipped: Vec::new(),
    };

    let mut staged = Vec::new();
    for cred_id in ad.credential_ids() {
        let param_key = ClassAd::param_key(cred_id);
        let data = key.decrypt_hex(ad.require(&param_key)?).map_err(|e| {
            debug!(target: "glidecred::process", "cannot decrypt {} of client {}: {:#}", param_key, client_name, e);
            CredentialError::auth(format!("cannot decrypt {}", param_key))
        })?;
        let class_key = ClassAd::security_class_key(cred_id);
        let security_class = decrypt_utf8(key, ad.require(&class_key)?).map_err(|e| {
            debug!(target: "glidecred::process", "cannot decrypt {} of client {}: {:#}", class_key, client_name, e);
            CredentialError::auth(format!("cannot decrypt {}", class_key))
        })?;

        let Some(username) = policy.get_username(&frontend.security_name, &security_class) else {
            let skip = CredentialError::Mapping {
                client: client_name.to_string(),
                cred_id: cred_id.to_string(),
                security_class,
            };
            error!(target: "glidecred::process", "{}; skipping it, verify the frontend security class mapping", skip);
            report.skipped.push(skip);
            continue;
        };
        staged.push(Staged { cred_id, username, data });
    }

    // every id decrypted and mapped; only now touch the disk
    for Staged { cred_id, username, data } in staged {
        debug!(target: "glidecred::process", "updating credential {} for {}", cred_id, username);
        let files = store.persist_credential(username, cred_id, &data, client_name)?;
        report.persisted.push(PersistedCredential { cred_id: cred_id.to_string(), username: username.to_string(), files });
    }
    Ok(report)
}

/// Outcome of one ad in a batch, in input order.
#[derive(Debug)]
pub struct AdOutcome {
    pub index: usize,
    pub result: CredResult<ProcessReport>,
}

#[derive(Debug, Default)]
pub struct BatchSummary {
    pub outcomes: Vec<AdOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize { self.outcomes.iter().filter(|o| o.result.is_ok()).count() }
    pub fn failed(&self) -> usize { self.outcomes.len() - self.succeeded() }
    pub fn persisted(&self) -> usize {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok()).map(|r| r.persisted.len()).sum()
    }
}

/// Process a batch of ads. Per-ad failures are logged and recorded, never fatal to the batch;
/// only a missing factory key stops everything before any ad is read.
pub fn process_globals(
    ads: &[ClassAd],
    glidein: &GlideinDescript,
    policy: &dyn FrontendPolicy,
    store: &CredentialStore,
    workers: usize,
) -> CredResult<BatchSummary> {
    if let Err(e) = glidein.require_key() {
        error!(target: "glidecred::process", "not processing {} globals classads: {}", ads.len(), e);
        return Err(e);
    }

    let run_one = |index: usize| AdOutcome { index, result: process_global(&ads[index], glidein, policy, store) };

    let workers = workers.clamp(1, ads.len().max(1));
    let mut outcomes: Vec<AdOutcome> = if workers == 1 {
        (0..ads.len()).map(run_one).collect()
    } else {
        let next = AtomicUsize::new(0);
        let collected = Mutex::new(Vec::with_capacity(ads.len()));
        std::thread::scope(|s| {
            for _ in 0..workers {
                s.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::Relaxed);
                    if i >= ads.len() {
                        break;
                    }
                    let outcome = run_one(i);
                    collected.lock().push(outcome);
                });
            }
        });
        collected.into_inner()
    };
    outcomes.sort_by_key(|o| o.index);

    let summary = BatchSummary { outcomes };
    info!(
        target: "glidecred::process",
        "processed {} globals classads: {} ok, {} failed, {} credentials persisted",
        ads.len(),
        summary.succeeded(),
        summary.failed(),
        summary.persisted()
    );
    Ok(summary)
}
