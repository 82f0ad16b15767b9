//! ShopLane CLI - storefront and back-office front end.
//!
//! # Usage
//!
//! ```bash
//! # Browse and shop
//! shoplane shop login -e asha@example.com -p secret123
//! shoplane shop products --category clothing
//! shoplane shop cart add 65f1c0ffee --size M
//! shoplane shop checkout --address addr_1f3a
//!
//! # Back office
//! shoplane admin orders --tab rtd
//! shoplane admin advance 66a0beef shipped
//! shoplane admin import products.csv
//! shoplane admin ledger
//! ```
//!
//! # Environment Variables
//!
//! - `SHOPLANE_API_URL` - Store API base URL (required)
//! - `SHOPLANE_ADMIN_TOKEN` - Back-office credential (admin commands only)
//! - `SENTRY_DSN` - Error tracking (optional)
//! - `RUST_LOG` - Log filter
//!
//! Storefront state (cart, wishlist, session, addresses) persists in
//! `SHOPLANE_CACHE_DIR` between invocations.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::admin::AdminCommand;
use commands::shop::ShopCommand;

#[derive(Parser)]
#[command(name = "shoplane")]
#[command(author, version, about = "ShopLane storefront and back-office tools")]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Customer operations: catalog, cart, wishlist, addresses, checkout
    Shop {
        #[command(subcommand)]
        command: ShopCommand,
    },
    /// Back-office operations: orders, inventory, products, customers
    Admin {
        #[command(subcommand)]
        command: AdminCommand,
    },
}

/// Error-tracking settings shared by both command families.
struct Telemetry {
    dsn: Option<String>,
    environment: Option<String>,
    sample_rate: f32,
    traces_sample_rate: f32,
}

/// Initialize Sentry error tracking.
///
/// Returns a guard that must be held for the lifetime of the process.
fn init_sentry(telemetry: &Telemetry) -> Option<sentry::ClientInitGuard> {
    let dsn = telemetry.dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: telemetry
                .environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: telemetry.sample_rate,
            traces_sample_rate: telemetry.traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing(json: bool) {
    // Logs go to stderr; stdout carries command output
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shoplane_storefront=info,shoplane_admin=info".into());

    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

fn telemetry_from_env() -> Telemetry {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();
    let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    let rate = |key: &str, default: f32| var(key).and_then(|v| v.parse().ok()).unwrap_or(default);
    Telemetry {
        dsn: var("SENTRY_DSN"),
        environment: var("SENTRY_ENVIRONMENT"),
        sample_rate: rate("SENTRY_SAMPLE_RATE", 1.0),
        traces_sample_rate: rate("SENTRY_TRACES_SAMPLE_RATE", 0.0),
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _sentry_guard = init_sentry(&telemetry_from_env());
    init_tracing(cli.json_logs);

    let result = match cli.command {
        Commands::Shop { command } => commands::shop::run(command).await,
        Commands::Admin { command } => commands::admin::run(command).await,
    };

    if let Err(e) = result {
        e.report();
        tracing::error!("Command failed: {e}");
        commands::fail(&e);
        std::process::exit(1);
    }
}
