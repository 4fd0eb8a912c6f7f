//! # Resource Descriptor
//!
//! Reads the vendor resource artifact (`resource.cgn`) and pulls one
//! terminal's configuration out of it.
//!
//! ## Layout
//!
//! ```text
//! resource.cgn  = 3DES-ECB(vault key, zip archive)
//! zip archive   = { "<alias>.xml" => 3DES-ECB(vault key, terminal xml), ... }
//! terminal xml  = <terminal>
//!                   <id/> <password/> <webaddress/> <resourceKey/>   required
//!                   <port/> <context/>                               optional
//!                 </terminal>
//! ```
//!
//! Every decrypted stage sits in a zeroizing buffer, and the XML secrets are
//! moved straight into [`KeyMaterial`]. A missing terminal alias is reported
//! as [`GatewayError::KeystoreAccess`] so callers cannot enumerate the
//! archive by guessing.

use std::io::{Cursor, Read};
use std::path::Path;

use serde::Deserialize;
use tracing::debug;
use url::Url;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};
use zip::result::ZipError;
use zip::ZipArchive;

use crate::config::{MAX_TERMINAL_ENTRY_BYTES, PAYMENT_PAGE, TRANSPORT_KEY_LENGTH};
use crate::crypto::{tdes, KeyMaterial, TransportKey, VaultKey};
use crate::error::{GatewayError, Result};
use crate::transaction::types::{Currency, Language};

// ---------------------------------------------------------------------------
// TerminalProfile
// ---------------------------------------------------------------------------

/// Non-secret configuration of one gateway terminal.
///
/// Immutable once loaded. Everything here is safe to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalProfile {
    merchant_id: String,
    terminal_alias: String,
    currency: Currency,
    language: Language,
    endpoint_base: String,
    port: Option<u16>,
    context: Option<String>,
}

impl TerminalProfile {
    /// Tranportal id, sent as `id` and `tranportalId`.
    pub fn merchant_id(&self) -> &str {
        &self.merchant_id
    }

    pub fn terminal_alias(&self) -> &str {
        &self.terminal_alias
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Gateway base URL from `webaddress`, without a trailing slash.
    pub fn endpoint_base(&self) -> &str {
        &self.endpoint_base
    }

    /// `port` from the resource, informational only.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// `context` from the resource, informational only.
    pub fn context(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Hosted payment initialisation URL without the query string.
    pub fn payment_url(&self) -> String {
        format!("{}/{}", self.endpoint_base, PAYMENT_PAGE)
    }
}

/// A terminal's profile together with its secrets.
#[derive(Debug)]
pub struct LoadedTerminal {
    pub profile: TerminalProfile,
    pub material: KeyMaterial,
}

// ---------------------------------------------------------------------------
// Terminal XML
// ---------------------------------------------------------------------------

/// The terminal document as the vendor writes it. Unknown children are
/// ignored; missing required ones fail deserialization.
#[derive(Deserialize, Zeroize, ZeroizeOnDrop)]
struct TerminalXml {
    id: String,
    password: String,
    webaddress: String,
    #[serde(rename = "resourceKey")]
    resource_key: String,
    #[serde(default)]
    port: Option<String>,
    #[serde(default)]
    context: Option<String>,
}

fn resource_format(reason: impl Into<String>) -> GatewayError {
    GatewayError::ResourceFormat(reason.into())
}

fn parse_endpoint(raw: &str) -> Result<String> {
    let url = Url::parse(raw).map_err(|e| resource_format(format!("webaddress: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(resource_format("webaddress is not an http(s) URL"));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(resource_format("webaddress has no host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(resource_format("webaddress carries a query or fragment"));
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Builds a terminal from a decrypted terminal document.
pub(crate) fn parse_terminal(
    xml: &str,
    alias: &str,
    currency: Currency,
    language: Language,
) -> Result<LoadedTerminal> {
    let mut doc: TerminalXml =
        quick_xml::de::from_str(xml).map_err(|e| resource_format(format!("terminal xml: {e}")))?;

    let merchant_id = doc.id.trim().to_string();
    if merchant_id.is_empty() {
        return Err(resource_format("terminal id is empty"));
    }
    let password = Zeroizing::new(std::mem::take(&mut doc.password).trim().to_string());
    if password.is_empty() {
        return Err(resource_format("terminal password is empty"));
    }

    let resource_key = Zeroizing::new(std::mem::take(&mut doc.resource_key));
    let resource_key = resource_key.trim();
    if resource_key.len() != TRANSPORT_KEY_LENGTH {
        return Err(resource_format(format!(
            "resourceKey must be {TRANSPORT_KEY_LENGTH} bytes"
        )));
    }
    let transport_key = TransportKey::from_slice(resource_key.as_bytes())
        .map_err(|e| resource_format(format!("resourceKey: {e}")))?;

    let endpoint_base = parse_endpoint(doc.webaddress.trim())?;

    let port = match doc.port.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => Some(
            p.parse::<u16>()
                .map_err(|_| resource_format(format!("port {p:?} is not a port number")))?,
        ),
        None => None,
    };
    let context = doc
        .context
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string);

    Ok(LoadedTerminal {
        profile: TerminalProfile {
            merchant_id,
            terminal_alias: alias.to_string(),
            currency,
            language,
            endpoint_base,
            port,
            context,
        },
        material: KeyMaterial::new(transport_key, password),
    })
}

// ---------------------------------------------------------------------------
// ResourceDescriptor
// ---------------------------------------------------------------------------

/// Loader for the resource artifact.
pub struct ResourceDescriptor;

impl ResourceDescriptor {
    /// Reads the artifact at `path` and extracts terminal `alias`.
    pub fn load(
        path: impl AsRef<Path>,
        vault_key: &VaultKey,
        alias: &str,
        currency: Currency,
        language: Language,
    ) -> Result<LoadedTerminal> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| GatewayError::ResourceIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_bytes(&bytes, vault_key, alias, currency, language)
    }

    /// Same as [`ResourceDescriptor::load`] for an artifact already in memory.
    pub fn from_bytes(
        artifact: &[u8],
        vault_key: &VaultKey,
        alias: &str,
        currency: Currency,
        language: Language,
    ) -> Result<LoadedTerminal> {
        let archive_bytes = tdes::decrypt_ecb(vault_key, artifact)
            .map_err(|e| resource_format(format!("artifact: {e}")))?;

        let mut archive = ZipArchive::new(Cursor::new(archive_bytes.as_slice()))
            .map_err(|e| resource_format(format!("not a zip archive: {e}")))?;

        let entry_name = format!("{alias}.xml");
        let sealed_entry = {
            let entry = match archive.by_name(&entry_name) {
                Ok(entry) => entry,
                Err(ZipError::FileNotFound) => {
                    debug!(alias, "terminal alias not present in resource archive");
                    return Err(GatewayError::KeystoreAccess);
                }
                Err(e) => return Err(resource_format(format!("archive entry: {e}"))),
            };
            if entry.size() > MAX_TERMINAL_ENTRY_BYTES {
                return Err(resource_format("terminal entry too large"));
            }
            let mut buf = Vec::with_capacity(entry.size() as usize);
            entry
                .take(MAX_TERMINAL_ENTRY_BYTES + 1)
                .read_to_end(&mut buf)
                .map_err(|e| resource_format(format!("archive entry: {e}")))?;
            if buf.len() as u64 > MAX_TERMINAL_ENTRY_BYTES {
                return Err(resource_format("terminal entry too large"));
            }
            buf
        };

        let xml_bytes = tdes::decrypt_ecb(vault_key, &sealed_entry)
            .map_err(|e| resource_format(format!("terminal entry: {e}")))?;
        let xml = std::str::from_utf8(&xml_bytes)
            .map_err(|_| resource_format("terminal entry is not UTF-8"))?;

        let terminal = parse_terminal(xml, alias, currency, language)?;
        debug!(
            alias,
            merchant_id = terminal.profile.merchant_id(),
            key = %terminal.material.fingerprint(),
            "terminal loaded from resource"
        );
        Ok(terminal)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn xml(body: &str) -> String {
        format!("<terminal>{body}</terminal>")
    }

    const FULL: &str = "<id>ipay1234</id><password>pw123</password>\
        <webaddress>https://gateway.example/pg/</webaddress>\
        <resourceKey>0123456789ABCDEF</resourceKey><port>443</port>\
        <context>pg</context><unknown>x</unknown>";

    #[test]
    fn test_parse_full_terminal() {
        let t = parse_terminal(&xml(FULL), "alias", Currency::KWD, Language::English).unwrap();
        assert_eq!(t.profile.merchant_id(), "ipay1234");
        assert_eq!(t.profile.terminal_alias(), "alias");
        assert_eq!(t.profile.endpoint_base(), "https://gateway.example/pg");
        assert_eq!(
            t.profile.payment_url(),
            "https://gateway.example/pg/PaymentHTTP.htm"
        );
        assert_eq!(t.profile.port(), Some(443));
        assert_eq!(t.profile.context(), Some("pg"));
        assert_eq!(t.material.portal_password(), "pw123");
        assert_eq!(t.material.outbound().as_bytes(), b"0123456789ABCDEF");
    }

    #[test]
    fn test_optional_children_absent() {
        let body = "<id>1</id><password>p</password>\
            <webaddress>http://gw.example</webaddress><resourceKey>0123456789abcdef</resourceKey>";
        let t = parse_terminal(&xml(body), "a", Currency::KWD, Language::Arabic).unwrap();
        assert_eq!(t.profile.port(), None);
        assert_eq!(t.profile.context(), None);
        assert_eq!(t.profile.language(), Language::Arabic);
    }

    #[test]
    fn test_missing_required_child() {
        let body = "<id>1</id><password>p</password><webaddress>http://gw.example</webaddress>";
        let err = parse_terminal(&xml(body), "a", Currency::KWD, Language::English).unwrap_err();
        assert!(matches!(err, GatewayError::ResourceFormat(_)));
    }

    #[test]
    fn test_bad_values_rejected() {
        let cases = [
            FULL.replace("0123456789ABCDEF", "short"),
            FULL.replace("https://gateway.example/pg/", "gateway.example"),
            FULL.replace("https://gateway.example/pg/", "ftp://gateway.example"),
            FULL.replace("<port>443</port>", "<port>http</port>"),
            FULL.replace("ipay1234", ""),
            FULL.replace("pw123", " "),
        ];
        for body in cases {
            let err = parse_terminal(&xml(&body), "a", Currency::KWD, Language::English)
                .unwrap_err();
            assert!(matches!(err, GatewayError::ResourceFormat(_)), "{body}");
        }
    }

    #[test]
    fn test_not_xml() {
        let err = parse_terminal("not xml", "a", Currency::KWD, Language::English).unwrap_err();
        assert!(matches!(err, GatewayError::ResourceFormat(_)));
    }

    #[test]
    fn test_garbage_artifact_is_format_error() {
        let key = VaultKey::from_bytes(Zeroizing::new(vec![7u8; 24])).unwrap();
        let err = ResourceDescriptor::from_bytes(&[0u8; 13], &key, "a", Currency::KWD, Language::English)
            .unwrap_err();
        assert!(matches!(err, GatewayError::ResourceFormat(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let key = VaultKey::from_bytes(Zeroizing::new(vec![7u8; 24])).unwrap();
        let err = ResourceDescriptor::load(
            "/nonexistent/resource.cgn",
            &key,
            "a",
            Currency::KWD,
            Language::English,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::ResourceIo { .. }));
    }
}
