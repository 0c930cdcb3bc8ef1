//! Credential intake for a pilot factory.
//!
//! Frontends advertise encrypted credential requests as ClassAds. This crate verifies the
//! frontend's identity, maps each embedded credential to a local user through the
//! security-class policy and persists the credential bytes under that user's directory.

pub mod error;
pub mod classad;
pub mod crypto;
pub mod config;
pub mod policy;
pub mod credential;
pub mod validator;
pub mod authenticator;
pub mod storage;
pub mod processor;
pub mod descript;
pub mod generator;
pub mod telemetry;

pub use error::{CredentialError, CredResult, ErrorScope};
pub use classad::ClassAd;
pub use config::FactoryConfig;
pub use processor::{process_global, process_globals, GlideinDescript, ProcessReport};
pub use storage::CredentialStore;

// Test-only printing helper: expands to eprintln! during tests and debug builds and is absent otherwise.
#[cfg(any(test, debug_assertions))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ( eprintln!($($arg)*) );
}

// In non-test builds, provide a no-op tprintln! so calls compile without effect.
#[cfg(not(any(test, debug_assertions)))]
#[macro_export]
macro_rules! tprintln {
    ($($arg:tt)*) => ({
        // Preserve formatting checks in release without producing code
        if false { let _ = format!($($arg)*); }
    });
}
