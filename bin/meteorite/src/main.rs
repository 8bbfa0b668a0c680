//! Meteorite - Cosmos inscriptions and metaprotocol indexer.
//!
//! # Usage
//!
//! ```bash
//! # Start with environment configuration
//! CHAIN_ID=cosmoshub-4 \
//! DATABASE_URL=postgres://localhost/meteorite \
//! LCD_URL=https://rest.cosmos.directory/cosmoshub \
//! BRIDGE_PRIVATE_KEY=... BRIDGE_PUBLIC_KEY=... \
//! meteorite
//! ```

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, EnvFilter};

use meteorite_chain::{LcdClient, LcdClientConfig};
use meteorite_core::error::IndexerError;
use meteorite_core::metrics::init_metrics;
use meteorite_core::ports::PayloadStore;
use meteorite_core::services::{IndexerConfig, IndexerService};
use meteorite_objectstore::{S3Config, S3PayloadStore};
use meteorite_protocols::marketplace::MarketplaceConfig;
use meteorite_protocols::{
    BridgeBundle, BundleRegistry, Cft20Bundle, InscriptionBundle, MarketplaceBundle,
};
use meteorite_protocols::bridge::BridgeSigner;
use meteorite_storage::{Database, DatabaseConfig, PgRepositories};

/// Meteorite CLI - Cosmos inscriptions indexer.
#[derive(Parser, Debug)]
#[command(name = "meteorite")]
#[command(about = "Meteorite - Cosmos inscriptions and metaprotocol indexer")]
#[command(version)]
struct Cli {
    /// Chain ID to index; every metaprotocol URN must name it.
    #[arg(long, env = "CHAIN_ID")]
    chain_id: String,

    /// PostgreSQL database URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost/meteorite"
    )]
    database_url: String,

    /// Cosmos LCD (REST) endpoint.
    #[arg(long, env = "LCD_URL", default_value = "http://127.0.0.1:1317")]
    lcd_url: String,

    /// Denom of the chain's base token.
    #[arg(long, env = "BASE_TOKEN", default_value = "uatom")]
    base_token: String,

    /// Seconds between new-block checks when caught up.
    #[arg(long, env = "POLL_INTERVAL", default_value = "6")]
    poll_interval: u64,

    /// Default marketplace deposit timeout in blocks.
    #[arg(long, env = "DEPOSIT_TIMEOUT_DEFAULT", default_value = "100")]
    deposit_timeout_default: u64,

    /// Base64 PKCS#8 DER Ed25519 private key for bridge attestations.
    #[arg(long, env = "BRIDGE_PRIVATE_KEY", hide_env_values = true)]
    bridge_private_key: String,

    /// Base64 SPKI DER Ed25519 public key for bridge attestations.
    #[arg(long, env = "BRIDGE_PUBLIC_KEY", hide_env_values = true)]
    bridge_public_key: String,

    /// S3-compatible endpoint for inscription content.
    #[arg(long, env = "S3_ENDPOINT", default_value = "http://127.0.0.1:9000")]
    s3_endpoint: String,

    /// S3 region.
    #[arg(long, env = "S3_REGION", default_value = "us-east-1")]
    s3_region: String,

    /// S3 bucket.
    #[arg(long, env = "S3_BUCKET", default_value = "inscriptions")]
    s3_bucket: String,

    /// S3 access key ID.
    #[arg(long, env = "S3_ID", hide_env_values = true)]
    s3_id: Option<String>,

    /// S3 secret access key.
    #[arg(long, env = "S3_SECRET", hide_env_values = true)]
    s3_secret: Option<String>,

    /// S3 session token.
    #[arg(long, env = "S3_TOKEN", hide_env_values = true)]
    s3_token: Option<String>,

    /// Prometheus metrics port.
    #[arg(long, env = "METRICS_PORT", default_value = "9090")]
    metrics_port: u16,

    /// Enable JSON log output.
    #[arg(long, env = "JSON_LOGS")]
    json_logs: bool,

    /// Run database migrations and exit.
    #[arg(long)]
    migrate_only: bool,

    /// Purge all indexed data from the database and exit.
    ///
    /// This deletes all transactions, inscriptions, tokens, listings and
    /// bridge history, and resets the checkpoint. Schema/migrations and
    /// bridge configuration tables are preserved.
    #[arg(long)]
    purge: bool,

    /// Skip confirmation prompt for destructive operations (like --purge).
    #[arg(long, short = 'y')]
    yes: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    // Prometheus metrics exporter (optional - failures don't crash the app)
    let metrics_enabled = match format!("0.0.0.0:{}", cli.metrics_port).parse::<std::net::SocketAddr>()
    {
        Ok(metrics_addr) => match PrometheusBuilder::new()
            .with_http_listener(metrics_addr)
            .install()
        {
            Ok(()) => {
                init_metrics();
                true
            }
            Err(e) => {
                warn!("⚠️  Failed to start metrics exporter: {}. Continuing without metrics.", e);
                false
            }
        },
        Err(e) => {
            warn!("⚠️  Invalid metrics address: {}. Continuing without metrics.", e);
            false
        }
    };

    // ─────────────────────────────────────────────────────────────────────────
    // 🚀 STARTUP
    // ─────────────────────────────────────────────────────────────────────────
    info!("🚀 Starting Meteorite Indexer");
    debug!(chain_id = %cli.chain_id, lcd_url = %cli.lcd_url, "Chain endpoint");
    debug!(database_url = %mask_password(&cli.database_url), "Database endpoint");

    // Bad key material must be fatal before any block is read.
    let signer = BridgeSigner::from_base64_der(&cli.bridge_private_key, &cli.bridge_public_key)
        .context("Failed to parse bridge signing keys")?;

    // ─────────────────────────────────────────────────────────────────────────
    // 🗄️ DATABASE
    // ─────────────────────────────────────────────────────────────────────────
    info!("🗄️  Connecting to database...");
    let db = Database::connect(&DatabaseConfig::for_indexer(&cli.database_url))
        .await
        .context("Failed to connect to database")?;

    db.migrate().await.context("Failed to run migrations")?;
    info!("🗄️  Database ready (migrations applied)");

    // ─────────────────────────────────────────────────────────────────────────
    // 📦 PROTOCOL BUNDLES (register early for migrations and purge)
    // ─────────────────────────────────────────────────────────────────────────
    let payload_store: Arc<dyn PayloadStore> = Arc::new(
        S3PayloadStore::new(S3Config {
            endpoint: cli.s3_endpoint.clone(),
            region: cli.s3_region.clone(),
            bucket: cli.s3_bucket.clone(),
            access_key_id: cli.s3_id.clone(),
            secret_access_key: cli.s3_secret.clone(),
            session_token: cli.s3_token.clone(),
            ..Default::default()
        })
        .context("Failed to create payload store")?,
    );

    let mut bundle_registry = BundleRegistry::new();
    bundle_registry.register(Box::new(InscriptionBundle::new(payload_store.clone())));
    bundle_registry.register(Box::new(Cft20Bundle::new(payload_store.clone())));
    bundle_registry.register(Box::new(MarketplaceBundle::new(MarketplaceConfig {
        default_deposit_timeout: cli.deposit_timeout_default,
    })));
    bundle_registry.register(Box::new(BridgeBundle::new(signer)));

    bundle_registry
        .run_migrations(db.pool())
        .await
        .context("Failed to run bundle migrations")?;

    if cli.migrate_only {
        info!("🛑 --migrate-only flag set, exiting");
        return Ok(());
    }

    if cli.purge {
        return handle_purge(&db, &bundle_registry, cli.yes).await;
    }

    let db = Arc::new(db);
    let repositories = Arc::new(PgRepositories::new(db.clone()));

    // ─────────────────────────────────────────────────────────────────────────
    // 📡 CHAIN CONNECTION
    // ─────────────────────────────────────────────────────────────────────────
    info!("📡 Connecting to chain node...");
    let chain = Arc::new(
        LcdClient::new(LcdClientConfig {
            base_url: cli.lcd_url.clone(),
            ..Default::default()
        })
        .context("Failed to create LCD client")?,
    );

    let handlers = Arc::new(bundle_registry.into_handler_registry());

    let indexer_config = IndexerConfig {
        chain_id: cli.chain_id.clone(),
        base_token: cli.base_token.clone(),
        poll_interval: Duration::from_secs(cli.poll_interval),
        ..Default::default()
    };

    let indexer = IndexerService::new(indexer_config, chain, repositories, handlers);

    // ─────────────────────────────────────────────────────────────────────────
    // ⚡ SERVICE START
    // ─────────────────────────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let indexer_shutdown_tx = shutdown_tx.clone();
    let indexer_handle = tokio::spawn(
        async move {
            if let Err(e) = indexer.run(shutdown_rx).await {
                match &e {
                    IndexerError::ShutdownRequested => {}
                    IndexerError::ChainMismatch { .. } => {
                        // Chain mismatch is fatal - trigger shutdown
                        error!(error = %e, "❌ {}", e);
                        let _ = indexer_shutdown_tx.send(true);
                    }
                    _ => error!(error = ?e, "❌ Indexer error"),
                }
            }
        }
        .instrument(info_span!("indexer")),
    );

    // ─────────────────────────────────────────────────────────────────────────
    // ✅ READY
    // ─────────────────────────────────────────────────────────────────────────
    info!("✅ Meteorite ready");
    if metrics_enabled {
        info!("   📊 Metrics:  http://localhost:{}/metrics", cli.metrics_port);
    } else {
        info!("   📊 Metrics:  disabled");
    }
    info!("   Press Ctrl+C to stop");

    shutdown_signal().await;

    // ─────────────────────────────────────────────────────────────────────────
    // 🛑 SHUTDOWN
    // ─────────────────────────────────────────────────────────────────────────
    info!("🛑 Shutting down...");
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(Duration::from_secs(30), indexer_handle).await {
        Ok(_) => debug!("Indexer stopped"),
        Err(_) => warn!("⚠️  Indexer shutdown timed out"),
    }

    db.close().await;

    info!("🛑 Shutdown complete");
    Ok(())
}

/// Initialize tracing subscriber.
fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

/// Mask password in database URL for logging.
fn mask_password(url_str: &str) -> String {
    match url::Url::parse(url_str) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => url_str.to_string(),
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Handle the --purge command.
async fn handle_purge(
    db: &Database,
    bundle_registry: &BundleRegistry,
    skip_confirmation: bool,
) -> Result<()> {
    let bundle_tables = bundle_registry.tables_to_purge();

    warn!("⚠️  PURGE MODE: This will delete ALL indexed data!");
    warn!("   - All transactions and the checkpoint will be reset");
    if !bundle_tables.is_empty() {
        warn!("   - Bundle tables: {}", bundle_tables.join(", "));
    }
    warn!("   - Schema, migrations and bridge configuration will be preserved");

    if !skip_confirmation {
        print!("\n🔴 Are you sure you want to purge all data? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            info!("❌ Purge cancelled");
            return Ok(());
        }
    }

    info!("🗑️  Purging database...");

    // Bundle tables first (children of transactions)
    let bundle_tables_purged = bundle_registry
        .purge_tables(db.pool())
        .await
        .context("Failed to purge bundle tables")?;

    if bundle_tables_purged > 0 {
        info!("   🧹 Purged {} bundle table(s)", bundle_tables_purged);
    }

    let stats = db.purge().await.context("Failed to purge database")?;

    info!("✅ Database purged successfully");
    info!("   📦 Transactions removed: {}", stats.transactions_removed);
    info!("   The indexer will start from the beginning on next run");

    Ok(())
}
