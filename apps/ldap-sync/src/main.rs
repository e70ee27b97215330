use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use xavyo_syncrepl::config::DEFAULT_CONFIG_PATH;
use xavyo_syncrepl::{ChangePublisher, ConnectionSupervisor, LdapConnector, SyncConfig, SyncSearch};

/// Exit status for configuration problems.
const EXIT_CONFIG: i32 = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Watch an LDAP subtree and publish every change to a pubsub sink.
#[derive(Parser)]
#[command(name = "ldap-sync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "LDAP_SYNC_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,xavyo_syncrepl=debug"));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
    }

    // Load configuration
    let mut config = SyncConfig::from_file(&cli.config).unwrap_or_else(|e| {
        eprintln!("Configuration error: {e}");
        std::process::exit(EXIT_CONFIG);
    });
    if let Err(e) = config.apply_env_overrides() {
        eprintln!("Configuration error: {e}");
        std::process::exit(EXIT_CONFIG);
    }

    info!(
        config = %cli.config.display(),
        ldap_url = %config.ldapurl.server_url(),
        base_dn = %config.ldapurl.base_dn,
        pubsub_url = %config.pubsuburl,
        retry_delay_secs = config.retry_delay_secs,
        "starting ldap-sync"
    );

    let publisher = ChangePublisher::new(&config.pubsuburl, config.sink_timeout())
        .unwrap_or_else(|e| {
            eprintln!("Publisher error: {e}");
            std::process::exit(EXIT_CONFIG);
        });

    let connector = LdapConnector::new(config.ldapurl.clone())
        .with_connect_timeout(config.connect_timeout())
        .with_starttls(config.starttls);

    let supervisor = ConnectionSupervisor::new(
        Arc::new(connector),
        Arc::new(publisher),
        SyncSearch::from_url(&config.ldapurl),
    )
    .with_retry_delay(config.retry_delay());

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let exit = supervisor.run(shutdown).await;
    info!(?exit, "ldap-sync stopped");
    std::process::exit(exit.exit_code());
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, stopping sync");
        }
        _ = terminate => {
            info!("Received SIGTERM, stopping sync");
        }
    }

    shutdown.cancel();
}
