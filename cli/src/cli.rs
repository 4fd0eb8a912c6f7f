//! # CLI Interface
//!
//! Defines the command-line argument structure for `ipay` using `clap`
//! derive. Supports five subcommands: `purchase`, `result`, `sandbox`,
//! `simulate`, and `version`.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use ipay_gateway::{Currency, Language};

/// iPay hosted checkout tool.
///
/// Signs purchase redirects and verifies gateway callbacks using a
/// merchant's resource kit. Also writes sandbox kits and plays the
/// gateway's side for local testing.
#[derive(Parser, Debug)]
#[command(
    name = "ipay",
    about = "iPay hosted checkout request signing and callback verification",
    version,
    propagate_version = true
)]
pub struct IpayCli {
    /// Log output format: `pretty` or `json`.
    #[arg(long, global = true, env = "IPAY_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the `ipay` binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the signed redirect URL for a purchase.
    Purchase(PurchaseArgs),
    /// Decode and verify a callback body, printing the record as JSON.
    Result(ResultArgs),
    /// Write a sandbox keystore and resource artifact pair.
    Sandbox(SandboxArgs),
    /// Answer a redirect URL the way the hosted payment page would.
    Simulate(SimulateArgs),
    /// Print version information and exit.
    Version,
}

/// Where the resource kit lives and which terminal to use.
#[derive(Args, Debug)]
pub struct TerminalArgs {
    /// Path to the keystore artifact.
    #[arg(long, short = 'k', env = "IPAY_KEYSTORE", default_value = "keystore.bin")]
    pub keystore: PathBuf,

    /// Path to the resource artifact.
    #[arg(long, short = 'r', env = "IPAY_RESOURCE", default_value = "resource.cgn")]
    pub resource: PathBuf,

    /// Terminal alias inside the resource artifact.
    #[arg(long, short = 'a', env = "IPAY_ALIAS")]
    pub alias: String,

    /// Alias of the vault key inside the keystore.
    #[arg(long, env = "IPAY_KEY_ALIAS", default_value = "pgkey")]
    pub key_alias: String,

    /// Keystore passphrase. The vendor default is used when unset.
    #[arg(long, env = "IPAY_KEYSTORE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// Transaction currency (alphabetic ISO code).
    #[arg(long, default_value = "KWD")]
    pub currency: Currency,

    /// Hosted page language: `en` or `ar`.
    #[arg(long, default_value = "en", value_parser = parse_language)]
    pub language: Language,
}

/// Arguments for the `purchase` subcommand.
#[derive(Parser, Debug)]
pub struct PurchaseArgs {
    #[command(flatten)]
    pub terminal: TerminalArgs,

    /// Amount as a decimal string, e.g. `1.234`.
    #[arg(long)]
    pub amount: String,

    /// Merchant track id. Defaults to the current Unix timestamp.
    #[arg(long)]
    pub track_id: Option<String>,

    /// Where the gateway sends the browser after a processed payment.
    #[arg(long)]
    pub response_url: String,

    /// Where the gateway sends the browser when the request is refused.
    #[arg(long)]
    pub error_url: String,

    /// User-defined field, repeatable up to five times (udf1 first).
    #[arg(long = "udf", value_name = "TEXT")]
    pub udfs: Vec<String>,

    /// Print a JSON object instead of the bare URL.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `result` subcommand.
#[derive(Parser, Debug)]
pub struct ResultArgs {
    #[command(flatten)]
    pub terminal: TerminalArgs,

    /// Callback body as received. Read from stdin when neither this nor
    /// `--file` is given.
    #[arg(long, conflicts_with = "file")]
    pub body: Option<String>,

    /// File holding the callback body.
    #[arg(long)]
    pub file: Option<PathBuf>,
}

/// Arguments for the `sandbox` subcommand.
#[derive(Parser, Debug)]
pub struct SandboxArgs {
    /// Directory to write `keystore.bin` and `resource.cgn` into.
    #[arg(long, short = 'o', default_value = ".")]
    pub out_dir: PathBuf,

    /// Terminal alias to provision.
    #[arg(long, short = 'a', env = "IPAY_ALIAS", default_value = "sandbox")]
    pub alias: String,

    /// Tranportal id written into the terminal entry.
    #[arg(long, default_value = "sandbox001")]
    pub merchant_id: String,

    /// Gateway base URL written into the terminal entry.
    #[arg(long, default_value = "https://gateway.sandbox.invalid/pg")]
    pub webaddress: String,

    /// Keystore passphrase. The vendor default is used when unset.
    #[arg(long, env = "IPAY_KEYSTORE_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// PBE iterations for the sealed vault key.
    #[arg(long, default_value_t = ipay_gateway::config::PBE_DEFAULT_ITERATIONS)]
    pub iterations: u32,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    #[command(flatten)]
    pub terminal: TerminalArgs,

    /// Redirect URL produced by `ipay purchase`.
    #[arg(long, required_unless_present = "error_code")]
    pub url: Option<String>,

    /// Result word to report.
    #[arg(long, default_value = "CAPTURED")]
    pub result: String,

    /// Produce an error redirect with this code instead of a result.
    #[arg(long, conflicts_with = "url")]
    pub error_code: Option<String>,

    /// Text accompanying `--error-code`.
    #[arg(long, requires = "error_code")]
    pub error_text: Option<String>,
}

fn parse_language(s: &str) -> Result<Language, String> {
    match s.to_ascii_lowercase().as_str() {
        "en" | "ar" => Ok(Language::from_code_lossy(s)),
        other => Err(format!("unknown language `{other}` (expected en or ar)")),
    }
}
