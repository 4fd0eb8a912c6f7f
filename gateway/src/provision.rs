//! # Sandbox Provisioning
//!
//! Writers for the two vendor artifacts and a stand-in for the gateway's
//! side of the conversation. None of this is needed to talk to a real
//! gateway; it exists so integrations can be exercised end to end without a
//! bank-issued resource kit.
//!
//! - [`KeystoreBuilder`] writes a keystore container.
//! - [`ResourceBuilder`] writes a resource artifact holding any number of
//!   terminals.
//! - [`Sandbox`] produces a matching pair in one call.
//! - [`GatewaySimulator`] answers a redirect URL with a callback body, the
//!   way the hosted payment page would.

use std::fmt;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::{Rng, RngCore};
use serde::Serialize;
use tracing::debug;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::codec::form::{encode_pairs, parse_strict};
use crate::config::{
    DEFAULT_KEY_ALIAS, FIELD_AUTH, FIELD_AUTH_RESP_CODE, FIELD_ERROR, FIELD_ERROR_TEXT,
    FIELD_PAYMENT_ID, FIELD_POST_DATE, FIELD_REF, FIELD_RESULT, FIELD_TRACK_ID, FIELD_TRANDATA,
    FIELD_TRAN_ID, FIELD_AMOUNT, PBE_DEFAULT_ITERATIONS, PBE_MAX_ITERATIONS, PBE_SALT_LENGTH,
    TDES_THREE_KEY_LENGTH, TRANSPORT_KEY_LENGTH, UDF_FIELDS, VENDOR_KEYSTORE_PASSPHRASE,
};
use crate::crypto::{tdes, transport, KeyMaterial, VaultKey};
use crate::error::{GatewayError, Result};
use crate::gateway::Gateway;
use crate::keystore::{seal_secret_key, ContainerWriter};
use crate::resource::TerminalProfile;

// ---------------------------------------------------------------------------
// KeystoreBuilder
// ---------------------------------------------------------------------------

enum PendingEntry {
    Secret {
        alias: String,
        key: Zeroizing<Vec<u8>>,
    },
    Certificate {
        alias: String,
        der: Vec<u8>,
    },
}

/// Writes JCEKS keystores. Both [`Keystore`](crate::keystore::Keystore) and
/// Java's `keytool` read them.
pub struct KeystoreBuilder {
    iterations: u32,
    entries: Vec<PendingEntry>,
}

impl Default for KeystoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl KeystoreBuilder {
    pub fn new() -> Self {
        Self {
            iterations: PBE_DEFAULT_ITERATIONS,
            entries: Vec::new(),
        }
    }

    /// PBE iteration count for sealed entries.
    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Adds a sealed triple-DES key (16 or 24 bytes).
    pub fn secret_key(mut self, alias: &str, key: &[u8]) -> Self {
        self.entries.push(PendingEntry::Secret {
            alias: alias.to_string(),
            key: Zeroizing::new(key.to_vec()),
        });
        self
    }

    /// Adds a trusted X.509 certificate entry. The DER bytes are stored
    /// as given.
    pub fn trusted_certificate(mut self, alias: &str, der: &[u8]) -> Self {
        self.entries.push(PendingEntry::Certificate {
            alias: alias.to_string(),
            der: der.to_vec(),
        });
        self
    }

    /// Serializes, seals and signs the container. Every secret key is
    /// sealed under `passphrase`, as keytool does when no separate key
    /// password is given.
    pub fn build(self, passphrase: &str) -> Result<Vec<u8>> {
        if self.iterations == 0 || self.iterations > PBE_MAX_ITERATIONS {
            return Err(GatewayError::KeystoreFormat(format!(
                "iteration count {} out of range",
                self.iterations
            )));
        }

        let timestamp = Utc::now().timestamp_millis().max(0) as u64;
        let mut writer = ContainerWriter::new(self.entries.len(), timestamp)?;
        let mut rng = rand::thread_rng();

        for entry in &self.entries {
            match entry {
                PendingEntry::Secret { alias, key } => {
                    VaultKey::from_bytes(key.clone())
                        .map_err(|e| GatewayError::KeystoreFormat(format!("vault key: {e}")))?;

                    let mut salt = [0u8; PBE_SALT_LENGTH];
                    rng.fill_bytes(&mut salt);
                    let sealed = seal_secret_key(passphrase, &salt, self.iterations, key)?;
                    writer.secret_key(alias, &sealed)?;
                }
                PendingEntry::Certificate { alias, der } => {
                    writer.trusted_certificate(alias, der)?;
                }
            }
        }

        Ok(writer.finish(passphrase))
    }
}

// ---------------------------------------------------------------------------
// ResourceBuilder
// ---------------------------------------------------------------------------

/// One terminal to be written into a resource artifact.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TerminalSpec {
    pub alias: String,
    pub id: String,
    pub password: String,
    pub webaddress: String,
    pub resource_key: String,
    pub port: Option<u16>,
    pub context: Option<String>,
}

impl fmt::Debug for TerminalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminalSpec")
            .field("alias", &self.alias)
            .field("id", &self.id)
            .field("webaddress", &self.webaddress)
            .field("password", &"<redacted>")
            .field("resource_key", &"<redacted>")
            .finish()
    }
}

/// The terminal document as written to the archive.
#[derive(Serialize)]
struct TerminalDoc<'a> {
    id: &'a str,
    password: &'a str,
    webaddress: &'a str,
    #[serde(rename = "resourceKey")]
    resource_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<&'a str>,
}

fn resource_error(reason: impl fmt::Display) -> GatewayError {
    GatewayError::ResourceFormat(reason.to_string())
}

/// Writes resource artifacts readable by
/// [`ResourceDescriptor`](crate::resource::ResourceDescriptor).
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    terminals: Vec<TerminalSpec>,
}

impl ResourceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn terminal(mut self, spec: TerminalSpec) -> Self {
        self.terminals.push(spec);
        self
    }

    /// Encrypts every terminal, zips them and encrypts the archive.
    pub fn build(&self, vault_key: &[u8]) -> Result<Vec<u8>> {
        let key = VaultKey::from_bytes(Zeroizing::new(vault_key.to_vec()))
            .map_err(|e| resource_error(format!("vault key: {e}")))?;

        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        for spec in &self.terminals {
            let doc = TerminalDoc {
                id: &spec.id,
                password: &spec.password,
                webaddress: &spec.webaddress,
                resource_key: &spec.resource_key,
                port: spec.port,
                context: spec.context.as_deref(),
            };
            let xml = Zeroizing::new(
                quick_xml::se::to_string_with_root("terminal", &doc).map_err(resource_error)?,
            );
            let sealed = tdes::encrypt_ecb(&key, xml.as_bytes()).map_err(resource_error)?;

            writer
                .start_file(format!("{}.xml", spec.alias), options)
                .map_err(resource_error)?;
            writer.write_all(&sealed).map_err(resource_error)?;
        }

        let archive = Zeroizing::new(writer.finish().map_err(resource_error)?.into_inner());
        tdes::encrypt_ecb(&key, &archive).map_err(resource_error)
    }
}

// ---------------------------------------------------------------------------
// Sandbox
// ---------------------------------------------------------------------------

/// A matching keystore and resource artifact.
pub struct SandboxArtifacts {
    pub keystore: Vec<u8>,
    pub resource: Vec<u8>,
    /// Passphrase the keystore was sealed with.
    pub passphrase: Zeroizing<String>,
    pub key_alias: String,
    pub terminal: TerminalSpec,
}

impl SandboxArtifacts {
    /// Writes `keystore.bin` and `resource.cgn` into `dir`.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        let keystore_path = dir.join("keystore.bin");
        let resource_path = dir.join("resource.cgn");

        std::fs::write(&keystore_path, &self.keystore).map_err(|source| {
            GatewayError::KeystoreIo {
                path: keystore_path.clone(),
                source,
            }
        })?;
        std::fs::write(&resource_path, &self.resource).map_err(|source| {
            GatewayError::ResourceIo {
                path: resource_path.clone(),
                source,
            }
        })?;

        debug!(
            keystore = %keystore_path.display(),
            resource = %resource_path.display(),
            alias = %self.terminal.alias,
            "sandbox artifacts written"
        );
        Ok((keystore_path, resource_path))
    }
}

impl fmt::Debug for SandboxArtifacts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxArtifacts")
            .field("keystore_len", &self.keystore.len())
            .field("resource_len", &self.resource.len())
            .field("key_alias", &self.key_alias)
            .field("terminal", &self.terminal)
            .finish()
    }
}

/// Generates a self-consistent pair of artifacts for one terminal.
///
/// Keys are random unless pinned, so two runs produce different files that
/// each open with the same passphrase and alias.
pub struct Sandbox {
    alias: String,
    merchant_id: String,
    password: Zeroizing<String>,
    webaddress: String,
    passphrase: Zeroizing<String>,
    key_alias: String,
    iterations: u32,
    vault_key: Option<Zeroizing<Vec<u8>>>,
    resource_key: Option<Zeroizing<String>>,
}

impl Sandbox {
    /// Sandbox for terminal `alias` with vendor defaults.
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            merchant_id: "sandbox001".to_string(),
            password: Zeroizing::new("sandbox-pass".to_string()),
            webaddress: "https://gateway.sandbox.invalid/pg".to_string(),
            passphrase: Zeroizing::new(VENDOR_KEYSTORE_PASSPHRASE.to_string()),
            key_alias: DEFAULT_KEY_ALIAS.to_string(),
            iterations: PBE_DEFAULT_ITERATIONS,
            vault_key: None,
            resource_key: None,
        }
    }

    pub fn merchant_id(mut self, id: impl Into<String>) -> Self {
        self.merchant_id = id.into();
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Zeroizing::new(password.into());
        self
    }

    pub fn webaddress(mut self, url: impl Into<String>) -> Self {
        self.webaddress = url.into();
        self
    }

    pub fn passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.passphrase = Zeroizing::new(passphrase.into());
        self
    }

    pub fn key_alias(mut self, alias: impl Into<String>) -> Self {
        self.key_alias = alias.into();
        self
    }

    pub fn iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    /// Pins the vault key instead of drawing a random one.
    pub fn vault_key(mut self, key: &[u8]) -> Self {
        self.vault_key = Some(Zeroizing::new(key.to_vec()));
        self
    }

    /// Pins the terminal's resource key (16 ASCII characters).
    pub fn resource_key(mut self, key: impl Into<String>) -> Self {
        self.resource_key = Some(Zeroizing::new(key.into()));
        self
    }

    pub fn generate(&self) -> Result<SandboxArtifacts> {
        let mut rng = rand::thread_rng();

        let vault_key = match &self.vault_key {
            Some(k) => k.clone(),
            None => {
                let mut k = Zeroizing::new(vec![0u8; TDES_THREE_KEY_LENGTH]);
                rng.fill_bytes(&mut k);
                k
            }
        };
        let resource_key = match &self.resource_key {
            Some(k) => k.clone(),
            None => Zeroizing::new(
                (&mut rng)
                    .sample_iter(&Alphanumeric)
                    .take(TRANSPORT_KEY_LENGTH)
                    .map(char::from)
                    .collect::<String>(),
            ),
        };

        let terminal = TerminalSpec {
            alias: self.alias.clone(),
            id: self.merchant_id.clone(),
            password: self.password.to_string(),
            webaddress: self.webaddress.clone(),
            resource_key: resource_key.to_string(),
            port: None,
            context: None,
        };

        let keystore = KeystoreBuilder::new()
            .iterations(self.iterations)
            .secret_key(&self.key_alias, &vault_key)
            .build(&self.passphrase)?;
        let resource = ResourceBuilder::new()
            .terminal(terminal.clone())
            .build(&vault_key)?;

        Ok(SandboxArtifacts {
            keystore,
            resource,
            passphrase: self.passphrase.clone(),
            key_alias: self.key_alias.clone(),
            terminal,
        })
    }
}

// ---------------------------------------------------------------------------
// GatewaySimulator
// ---------------------------------------------------------------------------

/// Plays the hosted payment page for one terminal.
pub struct GatewaySimulator<'a> {
    profile: &'a TerminalProfile,
    material: &'a KeyMaterial,
}

/// Fields the gateway repeats in cleartext next to `trandata`.
const CLEARTEXT_ECHO: [&str; 3] = [FIELD_PAYMENT_ID, FIELD_RESULT, FIELD_TRACK_ID];

impl<'a> GatewaySimulator<'a> {
    pub fn new(gateway: &'a Gateway) -> Self {
        Self {
            profile: gateway.profile(),
            material: gateway.material(),
        }
    }

    /// Encrypts `fields` as a callback payload and returns the hex blob.
    pub fn seal_payload(&self, fields: &[(&str, &str)]) -> Result<String> {
        let plain = encode_pairs(fields.iter().copied());
        transport::seal(self.material.inbound(), plain.as_bytes())
            .map_err(|e| GatewayError::encoding(FIELD_TRANDATA, e.to_string()))
    }

    /// Full callback body: cleartext echoes followed by `trandata`.
    pub fn callback_body(&self, fields: &[(&str, &str)]) -> Result<String> {
        let blob = self.seal_payload(fields)?;
        let echoes: Vec<(&str, &str)> = fields
            .iter()
            .copied()
            .filter(|(k, _)| CLEARTEXT_ECHO.iter().any(|name| *name == *k))
            .chain(std::iter::once((FIELD_TRANDATA, blob.as_str())))
            .collect();
        Ok(encode_pairs(echoes).to_string())
    }

    /// Body of a redirect to the error URL with no result attached.
    pub fn error_redirect(&self, code: &str, text: &str) -> String {
        encode_pairs([(FIELD_ERROR, code), (FIELD_ERROR_TEXT, text)]).to_string()
    }

    /// Answers a redirect URL produced for this terminal.
    ///
    /// The request payload is decrypted and its track id, amount and UDFs
    /// are echoed back with `result` and gateway-generated ids.
    pub fn respond(&self, redirect_url: &str, result: &str) -> Result<String> {
        let url = Url::parse(redirect_url)
            .map_err(|e| GatewayError::CallbackFormat(format!("redirect url: {e}")))?;
        let trandata = url
            .query_pairs()
            .find(|(k, _)| k == FIELD_TRANDATA)
            .map(|(_, v)| v.into_owned())
            .ok_or_else(|| GatewayError::CallbackFormat(format!("missing {FIELD_TRANDATA}")))?;

        let plain = transport::open(self.material.outbound(), &trandata)
            .map_err(|_| GatewayError::Authentication)?;
        let request = parse_strict(&plain).map_err(|_| GatewayError::Authentication)?;
        if request.get("id") != Some(self.profile.merchant_id()) {
            return Err(GatewayError::Authentication);
        }

        let mut rng = rand::thread_rng();
        let payment_id = rng.gen_range(100_000_000_000_000u64..1_000_000_000_000_000).to_string();
        let tran_id = rng.gen_range(1_000_000u64..10_000_000).to_string();
        let reference = rng.gen_range(100_000_000_000u64..1_000_000_000_000).to_string();
        let auth = format!("{:06}", rng.gen_range(0..1_000_000u32));
        let post_date = Utc::now().format("%m%d").to_string();

        let mut fields: Vec<(&str, &str)> = vec![
            (FIELD_PAYMENT_ID, payment_id.as_str()),
            (FIELD_RESULT, result),
            (FIELD_AUTH, auth.as_str()),
            (FIELD_REF, reference.as_str()),
            (FIELD_POST_DATE, post_date.as_str()),
            (FIELD_TRAN_ID, tran_id.as_str()),
            (FIELD_AUTH_RESP_CODE, "00"),
        ];
        for name in [FIELD_TRACK_ID, FIELD_AMOUNT].into_iter().chain(UDF_FIELDS) {
            if let Some(value) = request.get(name) {
                fields.push((name, value));
            }
        }

        debug!(
            alias = self.profile.terminal_alias(),
            track_id = request.get(FIELD_TRACK_ID).unwrap_or_default(),
            result,
            "simulated gateway callback"
        );
        self.callback_body(&fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::{Keystore, PassphrasePolicy};
    use crate::resource::ResourceDescriptor;
    use crate::transaction::{Amount, Currency, Language, PurchaseIntent};

    fn spec(alias: &str) -> TerminalSpec {
        TerminalSpec {
            alias: alias.into(),
            id: format!("id-{alias}"),
            password: "p<&>w".into(),
            webaddress: "https://gw.example/pg".into(),
            resource_key: "0123456789abcdef".into(),
            port: Some(8443),
            context: Some("pg".into()),
        }
    }

    #[test]
    fn test_keystore_builder_rejects_bad_input() {
        assert!(KeystoreBuilder::new().iterations(0).build("x").is_err());
        assert!(KeystoreBuilder::new()
            .secret_key("pgkey", &[1u8; 20])
            .build("x")
            .is_err());
        assert!(KeystoreBuilder::new()
            .trusted_certificate(&"c".repeat(70_000), b"x")
            .build("x")
            .is_err());
    }

    #[test]
    fn test_resource_with_several_terminals() {
        let vault = [3u8; 16];
        let artifact = ResourceBuilder::new()
            .terminal(spec("one"))
            .terminal(spec("two"))
            .build(&vault)
            .unwrap();
        let key = VaultKey::from_bytes(Zeroizing::new(vault.to_vec())).unwrap();

        let two = ResourceDescriptor::from_bytes(&artifact, &key, "two", Currency::KWD, Language::English)
            .unwrap();
        assert_eq!(two.profile.merchant_id(), "id-two");
        assert_eq!(two.profile.port(), Some(8443));
        assert_eq!(two.material.portal_password(), "p<&>w");

        let missing =
            ResourceDescriptor::from_bytes(&artifact, &key, "three", Currency::KWD, Language::English)
                .unwrap_err();
        assert!(matches!(missing, GatewayError::KeystoreAccess));
    }

    #[test]
    fn test_sandbox_pair_opens() {
        let artifacts = Sandbox::new("merchant")
            .iterations(16)
            .passphrase("sandbox")
            .generate()
            .unwrap();
        let vault = Keystore::from_bytes(
            &artifacts.keystore,
            &artifacts.key_alias,
            &PassphrasePolicy::explicit("sandbox"),
        )
        .unwrap();
        let terminal = ResourceDescriptor::from_bytes(
            &artifacts.resource,
            &vault,
            "merchant",
            Currency::KWD,
            Language::English,
        )
        .unwrap();
        assert_eq!(terminal.profile.merchant_id(), "sandbox001");
        assert_eq!(terminal.material.outbound().as_bytes().len(), TRANSPORT_KEY_LENGTH);
    }

    #[test]
    fn test_sandbox_keystore_is_java_shaped() {
        let artifacts = Sandbox::new("merchant").iterations(3).generate().unwrap();
        let ks = &artifacts.keystore;
        assert_eq!(&ks[..12], &[0xCE, 0xCE, 0xCE, 0xCE, 0, 0, 0, 2, 0, 0, 0, 1]);
        // Secret-key tag, then the alias as Java's writeUTF.
        assert_eq!(&ks[12..16], &[0, 0, 0, 3]);
        assert_eq!(&ks[16..23], b"\x00\x05pgkey");
        assert_eq!(&ks[31..35], &[0xAC, 0xED, 0x00, 0x05]);
        let class = b"com.sun.crypto.provider.SealedObjectForKeyProtector";
        assert!(ks.windows(class.len()).any(|w| w == class));
    }

    #[test]
    fn test_simulator_answers_its_own_redirect() {
        let artifacts = Sandbox::new("t").iterations(4).generate().unwrap();
        let vault =
            Keystore::from_bytes(&artifacts.keystore, "pgkey", &PassphrasePolicy::VendorDefault)
                .unwrap();
        let terminal = ResourceDescriptor::from_bytes(
            &artifacts.resource,
            &vault,
            "t",
            Currency::KWD,
            Language::English,
        )
        .unwrap();
        let gateway = Gateway::from_parts(terminal, Amount::new(5_000, Currency::KWD));

        let intent = PurchaseIntent::builder()
            .amount(Amount::new(5_000, Currency::KWD))
            .track_id("SIM-1")
            .response_url("https://m.example/ok")
            .error_url("https://m.example/err")
            .udf(4, "loyalty")
            .build()
            .unwrap();
        let url = gateway.purchase_request(&intent).unwrap();

        let sim = GatewaySimulator::new(&gateway);
        let body = sim.respond(url.as_str(), "CAPTURED").unwrap();
        assert!(body.starts_with("paymentid="));

        let record = gateway.get_result(&body).unwrap();
        assert_eq!(record.track_id, "SIM-1");
        assert_eq!(record.amount, Some(Amount::new(5_000, Currency::KWD)));
        assert_eq!(record.udf(4), Some("loyalty"));
        assert!(record.is_approved());
    }

    #[test]
    fn test_simulator_error_redirect() {
        let artifacts = Sandbox::new("t").iterations(4).generate().unwrap();
        let vault =
            Keystore::from_bytes(&artifacts.keystore, "pgkey", &PassphrasePolicy::VendorDefault)
                .unwrap();
        let terminal = ResourceDescriptor::from_bytes(
            &artifacts.resource,
            &vault,
            "t",
            Currency::KWD,
            Language::English,
        )
        .unwrap();
        let gateway = Gateway::from_parts(terminal, Amount::new(1, Currency::KWD));
        let body = GatewaySimulator::new(&gateway).error_redirect("IPAY0100013", "Invalid id");
        assert!(matches!(
            gateway.get_result(body).unwrap_err(),
            GatewayError::GatewayReported { .. }
        ));
    }

    #[test]
    fn test_artifacts_debug_is_redacted() {
        let artifacts = Sandbox::new("t").iterations(1).resource_key("ABCDEFGHIJKLMNOP").generate().unwrap();
        let debug = format!("{artifacts:?}");
        assert!(!debug.contains("ABCDEFGHIJKLMNOP"));
        assert!(!debug.contains("sandbox-pass"));
    }
}
