#![deny(clippy::all, clippy::pedantic, clippy::nursery)]
//! Credential lifecycle core for managed devices.
//!
//! `certinstaller-core` fetches client key-pairs (PKCS#12 archives) and
//! trust-anchor certificates from URLs supplied by managed configuration,
//! parses them, hands them to a privileged trust-store capability and keeps a
//! durable local record of every key-pair it installed. The privileged store
//! has no reliable enumeration API for key-pairs, so that record is the only
//! listing source for them.
//!
//! Hosts (Android, iOS, a CLI) provide the platform side through foreign
//! traits:
//!
//! - [`ManagedConfigurationSource`]: managed configuration values
//! - [`TrustAdministrationPort`]: the delegated trust-store capability
//! - [`storage::AtomicBlobStore`]: durable key-value storage
//! - [`logger::Logger`]: log sink
//!
//! and drive everything through [`CertificateInstaller`].

mod error;
pub use error::*;

mod config;
pub use config::*;

mod fetcher;
pub use fetcher::{FetchConfig, FetchError, RemoteFetcher};

pub mod credential;
pub use credential::{CertificateFields, ParseError};

mod trust_admin;
pub use trust_admin::*;

pub mod storage;
pub use storage::{CertificateRecord, RecordSnapshot};

mod installer;
pub use installer::*;

pub mod logger;

pub mod testing;

uniffi::setup_scaffolding!("certinstaller_core");
