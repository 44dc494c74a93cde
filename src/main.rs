#![allow(missing_docs)]

//! Switchboard CLI entry point.
//!
//! Provides `compile`, `classify` and `replay` subcommands for translating a
//! message between provider schemas, normalizing a recorded webhook payload,
//! and running a payload through the full pipeline.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::info;

use switchboard::config::{config_dir, load_config, Config};
use switchboard::event::{
    classify, Inbound, FACEBOOK_SIGNATURE_HEADER, LINE_SIGNATURE_HEADER,
};
use switchboard::provider::Provider;
use switchboard::transport::{self, DryRunTransport, FacebookTransport, LineTransport};
use switchboard::webhook::{Webhook, WebhookRequest};
use switchboard::{compiler, logging, store};

/// Switchboard: one conversation engine for LINE and Facebook Messenger.
#[derive(Parser)]
#[command(name = "switchboard", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Compile a message object into another provider's schema.
    Compile {
        /// Target provider.
        #[arg(long)]
        to: Provider,
        /// JSON file holding the message object.
        message: PathBuf,
    },
    /// Normalize a webhook payload into events.
    Classify {
        /// Provider that sent the payload.
        #[arg(long)]
        provider: Provider,
        /// JSON file holding the webhook body.
        payload: PathBuf,
    },
    /// Run a webhook payload through the whole pipeline.
    Replay {
        /// Config file. Defaults to `~/.switchboard/config.toml`.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write JSON logs to this directory, rotated daily.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Provider that sent the payload.
        #[arg(long)]
        provider: Provider,
        /// Deliver through the real provider APIs, signing the payload with
        /// the configured secret. Without this flag nothing leaves the process.
        #[arg(long)]
        live: bool,
        /// JSON file holding the webhook body.
        payload: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = match &cli.command {
        Command::Replay {
            log_dir: Some(dir), ..
        } => Some(logging::init_production(dir)?),
        _ => {
            logging::init_cli()?;
            None
        }
    };

    match cli.command {
        Command::Compile { to, message } => handle_compile(to, &message),
        Command::Classify { provider, payload } => handle_classify(provider, &payload),
        Command::Replay {
            config,
            provider,
            live,
            payload,
            ..
        } => {
            let config = match config {
                Some(path) => path,
                None => config_dir()?.join("config.toml"),
            };
            handle_replay(&config, provider, live, &payload).await
        }
    }
}

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn print_json(value: &impl serde::Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn handle_compile(to: Provider, path: &Path) -> anyhow::Result<()> {
    let message = read_json(path)?;
    let compiled = compiler::compile(&message, to)
        .with_context(|| format!("failed to compile {}", path.display()))?;
    print_json(&compiled)
}

fn handle_classify(provider: Provider, path: &Path) -> anyhow::Result<()> {
    let payload = read_json(path)?;
    match classify(provider, &payload)? {
        Inbound::VerificationProbe => {
            println!("verification probe");
            Ok(())
        }
        Inbound::Events(events) => print_json(&events),
    }
}

async fn handle_replay(
    config_path: &Path,
    provider: Provider,
    live: bool,
    payload_path: &Path,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let body = std::fs::read(payload_path)
        .with_context(|| format!("failed to read {}", payload_path.display()))?;
    let store = store::open(&config.store)
        .await
        .context("failed to open session store")?;
    let webhook = Webhook::from_config(&config, store)?;

    let (webhook, signature, dry_run) = if live {
        let (webhook, signature) = live_transport(webhook, &config, provider, &body)?;
        (webhook, signature, None)
    } else {
        let dry_run = DryRunTransport::new(provider);
        let webhook = webhook.with_transport(Arc::new(dry_run.clone()));
        (webhook, "dry-run".to_owned(), Some(dry_run))
    };

    let header = match provider {
        Provider::Line => LINE_SIGNATURE_HEADER,
        Provider::Facebook => FACEBOOK_SIGNATURE_HEADER,
    };
    let request = WebhookRequest::new(body).header(header, signature);
    info!(%provider, live, "replaying payload");

    let outcome = Arc::new(webhook).handle(&request).await?;
    let deliveries = match dry_run {
        Some(transport) => transport.deliveries().await,
        None => Vec::new(),
    };
    print_json(&json!({"outcome": outcome, "deliveries": deliveries}))
}

fn live_transport(
    webhook: Webhook,
    config: &Config,
    provider: Provider,
    body: &[u8],
) -> anyhow::Result<(Webhook, String)> {
    let missing = || anyhow::anyhow!("config has no [providers.{provider}] section");
    match provider {
        Provider::Line => {
            let credentials = config.providers.line.as_ref().ok_or_else(missing)?.credentials()?;
            let signature = transport::line::sign(&credentials.channel_secret, body)
                .context("failed to sign payload")?;
            Ok((
                webhook.with_transport(Arc::new(LineTransport::new(credentials))),
                signature,
            ))
        }
        Provider::Facebook => {
            let credentials = config
                .providers
                .facebook
                .as_ref()
                .ok_or_else(missing)?
                .credentials()?;
            let signature = transport::facebook::sign(&credentials.app_secret, body)
                .context("failed to sign payload")?;
            Ok((
                webhook.with_transport(Arc::new(FacebookTransport::new(credentials))),
                signature,
            ))
        }
    }
}
