//! End-to-end installer flows against a mock HTTP server and the in-memory
//! platform implementations.

use std::sync::Arc;

use certinstaller_core::storage::AtomicBlobStore;
use certinstaller_core::testing::{FakeTrustAdministration, MemoryBlobStore, StaticConfiguration};
use certinstaller_core::{
    CertificateInstaller, FetchConfig, InstallerConfig, InstallerError, ParseError,
    TrustAnchorEntry,
};
use p12_keystore::{Certificate, KeyStore, KeyStoreEntry, PrivateKeyChain};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

const PASSWORD: &str = "correct horse";

struct Credential {
    cert_der: Vec<u8>,
    cert_pem: String,
    key_der: Vec<u8>,
}

fn credential(common_name: &str) -> Credential {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("params");
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CountryName, "US");
    dn.push(DnType::OrganizationName, "ExampleCorp");
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;

    let key_pair = KeyPair::generate().expect("key pair");
    let cert = params.self_signed(&key_pair).expect("self signed");
    Credential {
        cert_der: cert.der().to_vec(),
        cert_pem: cert.pem(),
        key_der: key_pair.serialize_der(),
    }
}

fn pkcs12(credential: &Credential, password: &str) -> Vec<u8> {
    let chain = PrivateKeyChain::new(
        &credential.key_der,
        [0x11u8; 20],
        vec![Certificate::from_der(&credential.cert_der).expect("certificate")],
    );
    let mut keystore = KeyStore::new();
    keystore.add_entry("client", KeyStoreEntry::PrivateKeyChain(chain));
    keystore.writer(password).write().expect("write pkcs12")
}

struct TestContext {
    server: mockito::ServerGuard,
    trust: Arc<FakeTrustAdministration>,
    blobs: Arc<MemoryBlobStore>,
}

impl TestContext {
    fn new() -> Self {
        Self {
            server: mockito::Server::new(),
            trust: Arc::new(FakeTrustAdministration::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
        }
    }

    fn configuration(&self) -> StaticConfiguration {
        StaticConfiguration::new()
            .with("cert_download_url", &format!("{}/client.p12", self.server.url()))
            .with("ca_cert_download_url", &format!("{}/ca.crt", self.server.url()))
            .with("p12_password", PASSWORD)
    }

    fn installer(&self, configuration: StaticConfiguration) -> CertificateInstaller {
        CertificateInstaller::new(
            Arc::new(configuration),
            self.trust.clone(),
            self.blobs.clone(),
            &InstallerConfig {
                fetch: FetchConfig {
                    require_https: false,
                    ..FetchConfig::default()
                },
                ..InstallerConfig::default()
            },
        )
        .expect("installer")
    }

    fn counter(&self) -> Option<Vec<u8>> {
        self.blobs
            .read("alias_counter.json".to_string())
            .expect("read counter")
    }
}

#[test]
fn test_sequential_installs_yield_sequential_aliases() {
    let mut ctx = TestContext::new();
    let bundle = pkcs12(&credential("Jane Doe"), PASSWORD);
    let mock = ctx
        .server
        .mock("GET", "/client.p12")
        .with_status(200)
        .with_body(bundle)
        .expect(5)
        .create();
    let installer = ctx.installer(ctx.configuration());

    let aliases: Vec<String> = (0..5)
        .map(|_| installer.install_key_pair().expect("install"))
        .collect();

    assert_eq!(aliases, vec!["cert1", "cert2", "cert3", "cert4", "cert5"]);
    let recorded: Vec<String> = installer
        .list_key_pairs()
        .expect("list")
        .records
        .into_iter()
        .map(|record| record.alias)
        .collect();
    assert_eq!(recorded, aliases);
    mock.assert();
}

#[test]
fn test_aliases_continue_after_restart() {
    let mut ctx = TestContext::new();
    let bundle = pkcs12(&credential("Jane Doe"), PASSWORD);
    let _mock = ctx
        .server
        .mock("GET", "/client.p12")
        .with_status(200)
        .with_body(bundle)
        .create();

    let first = ctx.installer(ctx.configuration());
    first.install_key_pair().expect("install");
    first.install_key_pair().expect("install");
    drop(first);

    let second = ctx.installer(ctx.configuration());
    assert_eq!(second.install_key_pair().expect("install"), "cert3");
    assert_eq!(second.list_key_pairs().expect("list").records.len(), 3);
}

#[test]
fn test_wrong_password_consumes_nothing() {
    let mut ctx = TestContext::new();
    let bundle = pkcs12(&credential("Jane Doe"), "another password");
    let _mock = ctx
        .server
        .mock("GET", "/client.p12")
        .with_status(200)
        .with_body(bundle)
        .create();
    let installer = ctx.installer(ctx.configuration());

    let err = installer.install_key_pair().expect_err("must fail");

    assert!(matches!(
        err,
        InstallerError::Parse(ParseError::BadFormat { .. })
    ));
    assert_eq!(ctx.counter(), None);
    assert!(installer.list_key_pairs().expect("list").records.is_empty());
    assert!(ctx.trust.key_pairs().is_empty());
}

#[test]
fn test_missing_configuration_never_fetches() {
    for key in ["cert_download_url", "ca_cert_download_url", "p12_password"] {
        let mut ctx = TestContext::new();
        let mock = ctx.server.mock("GET", mockito::Matcher::Any).expect(0).create();
        let installer = ctx.installer(ctx.configuration().with(key, ""));

        let err = installer.install_key_pair().expect_err("must fail");
        assert!(
            matches!(err, InstallerError::ConfigMissing { ref missing } if missing == key),
            "unexpected error {err}"
        );
        assert!(matches!(
            installer.install_trust_anchor(),
            Err(InstallerError::ConfigMissing { .. })
        ));
        mock.assert();
    }
}

#[test]
fn test_missing_capability_fails_closed() {
    let mut ctx = TestContext::new();
    let mock = ctx.server.mock("GET", mockito::Matcher::Any).expect(0).create();
    ctx.trust.set_capability(false);
    let installer = ctx.installer(ctx.configuration());

    assert!(matches!(
        installer.install_key_pair(),
        Err(InstallerError::CapabilityMissing)
    ));
    assert!(matches!(
        installer.install_trust_anchor(),
        Err(InstallerError::CapabilityMissing)
    ));
    assert!(matches!(
        installer.remove_key_pair("cert1"),
        Err(InstallerError::CapabilityMissing)
    ));
    assert_eq!(ctx.trust.calls(), 0);
    mock.assert();
}

#[test]
fn test_rejected_install_burns_the_alias() {
    let mut ctx = TestContext::new();
    let bundle = pkcs12(&credential("Jane Doe"), PASSWORD);
    let _mock = ctx
        .server
        .mock("GET", "/client.p12")
        .with_status(200)
        .with_body(bundle)
        .create();
    let installer = ctx.installer(ctx.configuration());

    ctx.trust.set_accepting(false);
    let err = installer.install_key_pair().expect_err("must fail");
    assert!(matches!(err, InstallerError::InstallRejected { ref alias } if alias == "cert1"));
    assert!(installer.list_key_pairs().expect("list").records.is_empty());

    ctx.trust.set_accepting(true);
    assert_eq!(installer.install_key_pair().expect("install"), "cert2");
}

#[test]
fn test_http_failure_is_reported() {
    let mut ctx = TestContext::new();
    let _mock = ctx
        .server
        .mock("GET", "/client.p12")
        .with_status(503)
        .create();
    let installer = ctx.installer(ctx.configuration());

    let err = installer.install_key_pair().expect_err("must fail");
    assert!(err.to_string().contains("503"), "unexpected error {err}");
    assert_eq!(ctx.counter(), None);
}

#[test]
fn test_install_and_remove_round_trip() {
    let mut ctx = TestContext::new();
    let bundle = pkcs12(&credential("Jane Doe"), PASSWORD);
    let _mock = ctx
        .server
        .mock("GET", "/client.p12")
        .with_status(200)
        .with_body(bundle)
        .create();
    let installer = ctx.installer(ctx.configuration());

    let first = installer.install_key_pair().expect("install");
    let second = installer.install_key_pair().expect("install");
    let outcome = installer.remove_key_pair(&first).expect("remove");

    assert_eq!(outcome.records_removed, 1);
    let remaining = installer.list_key_pairs().expect("list").records;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].alias, second);
    assert!(matches!(
        installer.remove_key_pair(&first),
        Err(InstallerError::RecordNotFound { .. })
    ));
}

#[test]
fn test_install_trust_anchor_from_pem() {
    let mut ctx = TestContext::new();
    let anchor = credential("Example Root CA");
    let _mock = ctx
        .server
        .mock("GET", "/ca.crt")
        .with_status(200)
        .with_body(anchor.cert_pem.clone())
        .create();
    let installer = ctx.installer(ctx.configuration());

    let common_name = installer.install_trust_anchor().expect("install");

    assert_eq!(common_name, "Example Root CA");
    assert_eq!(ctx.trust.trust_anchors(), vec![anchor.cert_pem.into_bytes()]);
    assert!(installer.list_key_pairs().expect("list").records.is_empty());
}

#[test]
fn test_rejected_trust_anchor() {
    let mut ctx = TestContext::new();
    let _mock = ctx
        .server
        .mock("GET", "/ca.crt")
        .with_status(200)
        .with_body(credential("Example Root CA").cert_der)
        .create();
    ctx.trust.set_accepting(false);
    let installer = ctx.installer(ctx.configuration());

    let err = installer.install_trust_anchor().expect_err("must fail");
    assert!(
        matches!(err, InstallerError::TrustAnchorRejected { ref common_name } if common_name == "Example Root CA")
    );
}

#[test]
fn test_trust_anchor_listing_survives_malformed_entry() {
    let ctx = TestContext::new();
    ctx.trust.add_trust_anchor(credential("Root A").cert_der);
    ctx.trust.add_trust_anchor(vec![0x30, 0x03, 0x02, 0x01, 0x00]);
    ctx.trust.add_trust_anchor(credential("Root B").cert_pem.into_bytes());
    let installer = ctx.installer(ctx.configuration());

    let names: Vec<String> = installer
        .list_trust_anchors()
        .expect("list")
        .into_iter()
        .map(|entry| match entry {
            TrustAnchorEntry::Parsed { fields } => fields.common_name,
            TrustAnchorEntry::Unreadable { .. } => "<unreadable>".to_string(),
        })
        .collect();

    assert_eq!(names, vec!["Root A", "<unreadable>", "Root B"]);
}

#[test]
fn test_empty_listings() {
    let ctx = TestContext::new();
    let installer = ctx.installer(ctx.configuration());

    let snapshot = installer.list_key_pairs().expect("list");
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.skipped, 0);
    assert!(installer.list_trust_anchors().expect("list").is_empty());
}

#[test]
fn test_skipped_records_are_surfaced() {
    let ctx = TestContext::new();
    ctx.blobs
        .put("certificate_records.json", br#"[{"alias":"cert1"}, 17]"#.to_vec());
    let installer = ctx.installer(ctx.configuration());

    let snapshot = installer.list_key_pairs().expect("list");
    assert!(snapshot.records.is_empty());
    assert_eq!(snapshot.skipped, 2);
}

#[test]
fn test_installers_sharing_storage_never_reuse_an_alias() {
    let mut ctx = TestContext::new();
    let bundle = pkcs12(&credential("Jane Doe"), PASSWORD);
    let _mock = ctx
        .server
        .mock("GET", "/client.p12")
        .with_status(200)
        .with_body(bundle)
        .expect(20)
        .create();
    let installers = [
        ctx.installer(ctx.configuration()),
        ctx.installer(ctx.configuration()),
    ];

    let mut aliases: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = installers
            .iter()
            .map(|installer| {
                scope.spawn(move || {
                    (0..10)
                        .map(|_| installer.install_key_pair().expect("install"))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().expect("join"))
            .collect()
    });

    aliases.sort();
    aliases.dedup();
    assert_eq!(aliases.len(), 20);
    assert_eq!(ctx.trust.key_pairs().len(), 20);
    assert_eq!(
        installers[0].list_key_pairs().expect("list").records.len(),
        20
    );
    assert_eq!(ctx.counter(), Some(b"20".to_vec()));
}
