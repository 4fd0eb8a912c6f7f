// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # iPay Command Line
//!
//! Entry point for the `ipay` binary. Parses CLI arguments, initializes
//! logging, and runs one operation against a resource kit.
//!
//! The binary supports five subcommands:
//!
//! - `purchase` — print the signed redirect URL for a purchase
//! - `result`   — verify a callback body and print the record as JSON
//! - `sandbox`  — write a matching keystore and resource artifact
//! - `simulate` — answer a redirect URL like the hosted payment page
//! - `version`  — print build version information

mod cli;
mod logging;

use std::io::Read;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Serialize;
use zeroize::Zeroizing;

use ipay_gateway::provision::{GatewaySimulator, Sandbox};
use ipay_gateway::{Amount, Gateway, GatewayConfig, GatewayError, PassphrasePolicy};

use cli::{Commands, IpayCli, TerminalArgs};
use logging::LogFormat;

fn main() -> Result<()> {
    let cli = IpayCli::parse();
    logging::init_logging(logging::DEFAULT_FILTER, LogFormat::from_str_lossy(&cli.log_format));

    match cli.command {
        Commands::Purchase(args) => purchase(args),
        Commands::Result(args) => result(args),
        Commands::Sandbox(args) => sandbox(args),
        Commands::Simulate(args) => simulate(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Builds the gateway configuration from the shared terminal flags.
fn config(args: TerminalArgs) -> GatewayConfig {
    let passphrase = match args.passphrase {
        Some(p) => PassphrasePolicy::explicit(p),
        None => PassphrasePolicy::VendorDefault,
    };
    GatewayConfig::new(args.keystore, args.resource, args.alias)
        .key_alias(args.key_alias)
        .passphrase(passphrase)
        .currency(args.currency)
        .language(args.language)
}

/// Opens a terminal session. Callback-side commands never read the session
/// amount, so they pass zero.
fn open_gateway(args: TerminalArgs, amount: Option<Amount>) -> Result<Gateway> {
    let config = config(args);
    let amount = amount.unwrap_or(Amount::new(0, config.currency));
    Gateway::open(&config, amount).with_context(|| {
        format!(
            "cannot open terminal `{}` from {} and {}",
            config.alias,
            config.keystore_path.display(),
            config.resource_path.display()
        )
    })
}

#[derive(Serialize)]
struct PurchaseOutput<'a> {
    url: &'a str,
    track_id: &'a str,
    trandata: &'a str,
    key_fingerprint: String,
}

fn purchase(args: cli::PurchaseArgs) -> Result<()> {
    let amount = Amount::parse(&args.amount, args.terminal.currency)
        .with_context(|| format!("invalid amount `{}`", args.amount))?;
    let mut gateway = open_gateway(args.terminal, Some(amount))?;

    gateway.set_response_url(&args.response_url)?;
    gateway.set_error_url(&args.error_url)?;
    if let Some(track_id) = &args.track_id {
        gateway.set_track_id(track_id)?;
    }
    for (i, udf) in args.udfs.iter().enumerate() {
        gateway.set_udf(i + 1, udf)?;
    }

    let url = gateway.generate_purchase_request()?;
    tracing::info!(amount = %amount, track_id = %url.track_id(), "purchase request generated");

    if args.json {
        let output = PurchaseOutput {
            url: url.as_str(),
            track_id: url.track_id().as_str(),
            trandata: url.trandata(),
            key_fingerprint: gateway.key_fingerprint(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{url}");
    }
    Ok(())
}

fn result(args: cli::ResultArgs) -> Result<()> {
    let body = match (&args.body, &args.file) {
        (Some(body), _) => Zeroizing::new(body.clone().into_bytes()),
        (None, Some(path)) => Zeroizing::new(
            std::fs::read(path)
                .with_context(|| format!("failed to read callback body from {}", path.display()))?,
        ),
        (None, None) => {
            let mut buf = Zeroizing::new(Vec::new());
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read callback body from stdin")?;
            buf
        }
    };

    let gateway = open_gateway(args.terminal, None)?;
    match gateway.get_result(body.as_slice()) {
        Ok(record) => {
            tracing::info!(
                payment_id = record.payment_id,
                outcome = %record.outcome(),
                "callback verified"
            );
            println!("{}", serde_json::to_string_pretty(&record)?);
            Ok(())
        }
        Err(GatewayError::Authentication) => {
            bail!("callback REJECTED: it did not verify against this terminal's key; treat the payment as unpaid")
        }
        Err(GatewayError::GatewayReported { code, text }) => {
            bail!("gateway refused the payment request: {code} {text}")
        }
        Err(e) => Err(e).context("cannot decode callback"),
    }
}

fn sandbox(args: cli::SandboxArgs) -> Result<()> {
    let mut sandbox = Sandbox::new(&args.alias)
        .merchant_id(&args.merchant_id)
        .webaddress(&args.webaddress)
        .iterations(args.iterations);
    if let Some(passphrase) = &args.passphrase {
        sandbox = sandbox.passphrase(passphrase.as_str());
    }
    let artifacts = sandbox.generate()?;

    std::fs::create_dir_all(&args.out_dir)
        .with_context(|| format!("failed to create {}", args.out_dir.display()))?;
    let (keystore, resource) = artifacts.write_to(&args.out_dir)?;

    println!("Sandbox resource kit written.");
    println!("  Terminal alias : {}", args.alias);
    println!("  Tranportal id  : {}", args.merchant_id);
    println!("  Keystore       : {}", keystore.display());
    println!("  Resource       : {}", resource.display());
    println!("  Key alias      : {}", artifacts.key_alias);
    Ok(())
}

fn simulate(args: cli::SimulateArgs) -> Result<()> {
    let gateway = open_gateway(args.terminal, None)?;
    let simulator = GatewaySimulator::new(&gateway);

    let body = match (&args.error_code, &args.url) {
        (Some(code), _) => {
            simulator.error_redirect(code, args.error_text.as_deref().unwrap_or_default())
        }
        (None, Some(url)) => simulator.respond(url, &args.result)?,
        (None, None) => bail!("either --url or --error-code is required"),
    };
    println!("{body}");
    Ok(())
}

/// Prints version information to stdout.
fn print_version() {
    println!("ipay     {}", env!("CARGO_PKG_VERSION"));
    println!("protocol {}", ipay_gateway::config::PROTOCOL_VERSION);
}
