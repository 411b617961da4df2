//! Process wiring for the Nostr Wallet Connect service provider: config,
//! logging, store/wallet setup, and graceful shutdown, mirroring
//! `cdk-mintd`'s `run_mintd`/`run_mintd_with_shutdown` split.

#![warn(missing_docs)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use nwc_core::crypto::SecretKey;
use nwc_core::dispatcher::Dispatcher;
use nwc_core::handlers::HandlerContext;
use nwc_core::queue::ExecutionQueue;
use nwc_core::store::{config_keys, ConfigStore, Store};
use nwc_core::wallet::fake::FakeWallet;
use tokio_util::sync::CancellationToken;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

pub mod cli;
pub mod config;
pub mod env_vars;

use cli::CLIArgs;
use config::LoggingOutput;
use env_vars::ENV_WORK_DIR;

/// Queue capacity for inbound spend jobs, matching `nwc_core::queue`'s
/// per-pubkey-gated single-consumer design.
const EXECUTION_QUEUE_CAPACITY: usize = 256;

/// Resolve the directory holding `config.toml` and `nwcd.sqlite`, in order:
/// CLI flag, `NWCD_WORK_DIR`, `~/.nwcd`.
pub fn get_work_directory(args: &CLIArgs) -> Result<PathBuf> {
    let work_dir = if let Some(work_dir) = &args.work_dir {
        tracing::info!("Using work dir from cmd arg");
        PathBuf::from(work_dir)
    } else if let Ok(env_work_dir) = std::env::var(ENV_WORK_DIR) {
        tracing::info!("Using work dir from env var");
        PathBuf::from(env_work_dir)
    } else {
        default_work_dir()?
    };
    std::fs::create_dir_all(&work_dir)?;
    tracing::info!("Using work dir: {}", work_dir.display());
    Ok(work_dir)
}

fn default_work_dir() -> Result<PathBuf> {
    let home_dir = home::home_dir().ok_or_else(|| anyhow!("unknown home dir"))?;
    Ok(home_dir.join(".nwcd"))
}

/// Load settings from `<work_dir>/config.toml` (or `config_path` if given),
/// overlaid with `NWCD_*` environment variables.
pub fn load_settings(work_dir: &Path, config_path: Option<PathBuf>) -> Result<config::Settings> {
    let config_file = config_path.unwrap_or_else(|| work_dir.join("config.toml"));
    let settings = config::Settings::new(Some(config_file));
    Ok(settings.from_env()?)
}

/// Configure `tracing-subscriber` for console/file/both output, mirroring
/// `cdk-mintd::setup_tracing`.
pub fn setup_tracing(
    work_dir: &Path,
    logging_config: &config::LoggingConfig,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let env_filter = EnvFilter::new("debug,hyper=warn,rustls=warn,tokio_tungstenite=warn,tungstenite=warn");

    match logging_config.output {
        LoggingOutput::Stderr => {
            let console_level = logging_config
                .console_level
                .as_deref()
                .unwrap_or("info")
                .parse::<tracing::Level>()
                .unwrap_or(tracing::Level::INFO);
            let stderr = std::io::stderr.with_max_level(console_level);
            tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(stderr).init();
            Ok(None)
        }
        LoggingOutput::File => {
            let file_level = logging_config
                .file_level
                .as_deref()
                .unwrap_or("debug")
                .parse::<tracing::Level>()
                .unwrap_or(tracing::Level::DEBUG);
            let logs_dir = work_dir.join("logs");
            std::fs::create_dir_all(&logs_dir)?;
            let file_appender = rolling::daily(&logs_dir, "nwcd.log");
            let (non_blocking_appender, guard) = non_blocking(file_appender);
            let file_writer = non_blocking_appender.with_max_level(file_level);
            tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(file_writer).init();
            Ok(Some(guard))
        }
        LoggingOutput::Both => {
            let console_level = logging_config
                .console_level
                .as_deref()
                .unwrap_or("info")
                .parse::<tracing::Level>()
                .unwrap_or(tracing::Level::INFO);
            let file_level = logging_config
                .file_level
                .as_deref()
                .unwrap_or("debug")
                .parse::<tracing::Level>()
                .unwrap_or(tracing::Level::DEBUG);
            let logs_dir = work_dir.join("logs");
            std::fs::create_dir_all(&logs_dir)?;
            let file_appender = rolling::daily(&logs_dir, "nwcd.log");
            let (non_blocking_appender, guard) = non_blocking(file_appender);
            let stderr = std::io::stderr.with_max_level(console_level);
            let file_writer = non_blocking_appender.with_max_level(file_level);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(stderr.and(file_writer))
                .init();
            Ok(Some(guard))
        }
    }
}

/// Read the persisted provider key, generating and persisting a fresh one
/// on first boot.
async fn load_or_create_provider_key(store: &Arc<dyn Store>) -> Result<SecretKey> {
    match store.get_config(config_keys::PROVIDER_KEY).await? {
        Some(hex) => Ok(SecretKey::from_hex(hex)?),
        None => {
            let key = SecretKey::generate();
            store.set_config(config_keys::PROVIDER_KEY, &key.to_hex()).await?;
            tracing::info!("Generated new provider key on first boot");
            Ok(key)
        }
    }
}

async fn relay_url(store: &Arc<dyn Store>, settings: &config::Settings) -> Result<url::Url> {
    if store.get_config(config_keys::RELAY).await?.is_none() {
        store.set_config(config_keys::RELAY, &settings.info.relay).await?;
    }
    let relay = store
        .get_config(config_keys::RELAY)
        .await?
        .unwrap_or_else(|| settings.info.relay.clone());
    Ok(url::Url::parse(&relay)?)
}

/// Run the provider to completion against a `Ctrl+C` shutdown signal,
/// mirroring `cdk-mintd::run_mintd`.
pub async fn run(work_dir: &Path, settings: &config::Settings, enable_logging: bool) -> Result<()> {
    let _guard = if enable_logging {
        setup_tracing(work_dir, &settings.info.logging)?
    } else {
        None
    };

    let shutdown = CancellationToken::new();
    let result = run_with_shutdown(work_dir, settings, shutdown.clone(), async move {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
    })
    .await;

    if let Some(guard) = _guard {
        drop(guard);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    result
}

/// Run the provider with a caller-supplied shutdown future, for embedding
/// and tests.
pub async fn run_with_shutdown(
    work_dir: &Path,
    settings: &config::Settings,
    shutdown: CancellationToken,
    shutdown_signal: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let sqlite_path = work_dir.join("nwcd.sqlite");
    let store: Arc<dyn Store> = Arc::new(nwc_sqlite::SqliteStore::open(sqlite_path.to_string_lossy().as_ref()).await?);

    let provider_sk = load_or_create_provider_key(&store).await?;
    let relay = relay_url(&store, settings).await?;

    tracing::info!(provider_pubkey = %provider_sk.x_only_public_key(), %relay, "starting nwcd");

    let wallet = Arc::new(FakeWallet::default());
    let queue = ExecutionQueue::spawn(store.clone(), EXECUTION_QUEUE_CAPACITY);
    let handler_ctx = HandlerContext {
        wallet,
        store: store.clone(),
        queue,
        alias: settings.info.alias.clone(),
    };
    let dispatcher = Arc::new(Dispatcher::new(provider_sk, store.clone(), handler_ctx));

    nwc_core::service::spawn(relay, dispatcher, shutdown.clone());

    tokio::spawn(shutdown_signal);
    shutdown.cancelled().await;

    tracing::info!("nwcd shutdown");
    Ok(())
}
