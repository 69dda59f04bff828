//! `certinstaller` - drive the credential installer from a workstation.
//!
//! Managed configuration comes from flags or the environment, local records
//! and the alias counter live under the data directory, and the trust store
//! is a plain directory (see [`trust_dir`]).

use std::path::PathBuf;
use std::sync::Arc;

use certinstaller_core::{
    CertificateInstaller, FetchConfig, InstallerConfig, KeyPairInstallFlags,
    ManagedConfigurationSource, TrustAnchorEntry,
};
use clap::{Args, Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use tracing_subscriber::EnvFilter;

mod file_store;
mod lock;
mod trust_dir;

use file_store::FileBlobStore;
use trust_dir::DirectoryTrustStore;

#[derive(Debug, Parser)]
#[command(name = "certinstaller")]
#[command(about = "Install and track client key-pairs and trust anchors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding local records and the alias counter
    /// (default: <platform data dir>/certinstaller)
    #[arg(long, env = "CERTINSTALLER_DATA_DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Directory standing in for the device trust store
    /// (default: <data dir>/trust-store)
    #[arg(long, env = "CERTINSTALLER_TRUST_DIR", global = true)]
    trust_dir: Option<PathBuf>,

    /// Print listings as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    managed: ManagedArgs,

    #[command(flatten)]
    transport: TransportArgs,
}

/// The managed configuration values a device policy would push.
#[derive(Debug, Clone, Args)]
struct ManagedArgs {
    /// URL of the PKCS#12 client credential
    #[arg(long, env = "CERT_DOWNLOAD_URL", global = true)]
    cert_download_url: Option<String>,

    /// URL of the trust anchor certificate (DER or PEM)
    #[arg(long, env = "CA_CERT_DOWNLOAD_URL", global = true)]
    ca_cert_download_url: Option<String>,

    /// Password of the PKCS#12 archive
    #[arg(long, env = "P12_PASSWORD", global = true, hide_env_values = true)]
    p12_password: Option<String>,
}

impl ManagedConfigurationSource for ManagedArgs {
    fn get_string(&self, key: String) -> Option<String> {
        match key.as_str() {
            "cert_download_url" => self.cert_download_url.clone(),
            "ca_cert_download_url" => self.ca_cert_download_url.clone(),
            "p12_password" => self.p12_password.clone(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct TransportArgs {
    /// Connect timeout in seconds
    #[arg(long, default_value_t = 30, global = true)]
    connect_timeout: u64,

    /// Timeout for the whole download in seconds
    #[arg(long, default_value_t = 30, global = true)]
    read_timeout: u64,

    /// Allow plain http:// URLs (local test servers)
    #[arg(long, global = true)]
    allow_http: bool,

    /// Do not let the installing app use the key without a user grant
    #[arg(long, global = true)]
    no_credential_access: bool,

    /// Hide the key from system credential choosers
    #[arg(long, global = true)]
    not_user_selectable: bool,
}

impl TransportArgs {
    const fn installer_config(&self) -> InstallerConfig {
        InstallerConfig {
            fetch: FetchConfig {
                connect_timeout_secs: self.connect_timeout,
                read_timeout_secs: self.read_timeout,
                require_https: !self.allow_http,
            },
            key_pair_flags: KeyPairInstallFlags {
                request_credential_access: !self.no_credential_access,
                user_selectable: !self.not_user_selectable,
            },
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Download the PKCS#12 credential and install its key-pair
    Install,
    /// Download the trust anchor and install it
    InstallCa,
    /// Remove an installed key-pair
    Remove {
        /// Alias printed by `install`
        alias: String,
    },
    /// List key-pairs installed by this tool
    List,
    /// List trust anchors held by the trust store
    ListCa,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn default_data_dir() -> Result<PathBuf> {
    dirs::data_dir()
        .map(|dir| dir.join("certinstaller"))
        .ok_or_else(|| eyre!("cannot determine the platform data directory; pass --data-dir"))
}

fn build_installer(cli: &Cli) -> Result<CertificateInstaller> {
    let data_dir = cli.data_dir.clone().map_or_else(default_data_dir, Ok)?;
    let trust_dir = cli
        .trust_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("trust-store"));

    let blob_store = FileBlobStore::new(data_dir.join("state"))
        .wrap_err_with(|| format!("opening data directory {}", data_dir.display()))?;
    let trust_store = DirectoryTrustStore::new(&trust_dir)
        .wrap_err_with(|| format!("opening trust directory {}", trust_dir.display()))?;
    tracing::debug!(data_dir = %data_dir.display(), trust_dir = %trust_dir.display(), "opened stores");

    Ok(CertificateInstaller::new(
        Arc::new(cli.managed.clone()),
        Arc::new(trust_store),
        Arc::new(blob_store),
        &cli.transport.installer_config(),
    )?)
}

fn run(cli: &Cli) -> Result<()> {
    let installer = build_installer(cli)?;

    match &cli.command {
        Command::Install => {
            let alias = installer.install_key_pair()?;
            println!("{alias}");
        }
        Command::InstallCa => {
            let common_name = installer.install_trust_anchor()?;
            println!("{common_name}");
        }
        Command::Remove { alias } => {
            let outcome = installer.remove_key_pair(alias)?;
            if outcome.records_removed == 0 {
                println!("removed {} (no local record)", outcome.alias);
            } else {
                println!("removed {}", outcome.alias);
            }
        }
        Command::List => {
            let snapshot = installer.list_key_pairs()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&snapshot.records)?);
            } else {
                for record in &snapshot.records {
                    println!(
                        "{}\t{}\t{}\tserial {}",
                        record.alias, record.common_name, record.issuer_dn, record.serial_number
                    );
                }
            }
            if snapshot.skipped > 0 {
                tracing::warn!(skipped = snapshot.skipped, "some local records are unreadable");
            }
        }
        Command::ListCa => {
            let entries = installer.list_trust_anchors()?;
            if cli.json {
                let values = entries
                    .iter()
                    .map(|entry| match entry {
                        TrustAnchorEntry::Parsed { fields } => serde_json::to_value(fields),
                        TrustAnchorEntry::Unreadable { reason } => {
                            Ok(serde_json::json!({ "unreadable": reason }))
                        }
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                println!("{}", serde_json::to_string_pretty(&values)?);
            } else {
                for entry in &entries {
                    match entry {
                        TrustAnchorEntry::Parsed { fields } => {
                            println!("{}\t{}", fields.common_name, fields.sha256_fingerprint);
                        }
                        TrustAnchorEntry::Unreadable { reason } => {
                            println!("<unreadable>\t{reason}");
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run(&cli)
}
