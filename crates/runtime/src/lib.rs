use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::info;
use whisperwall_api::services::expiry;
use whisperwall_auth::Authenticator;
use whisperwall_config::AppConfig;
use whisperwall_database::initialize_database;

pub mod telemetry {
    use anyhow::Result;
    use tracing::Level;
    use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

    pub fn init_tracing() -> Result<()> {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let subscriber = SubscriberBuilder::default()
            .with_max_level(Level::INFO)
            .with_env_filter(env_filter)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|error| anyhow::anyhow!("failed to set tracing subscriber: {error}"))
    }
}

#[derive(Clone)]
pub struct BackendServices {
    pub db_pool: SqlitePool,
    pub authenticator: Authenticator,
}

impl BackendServices {
    pub async fn initialise(config: &AppConfig) -> Result<Self> {
        let db_pool = initialize_database(&config.database)
            .await
            .context("failed to initialise database")?;

        let authenticator = Authenticator::new(db_pool.clone(), config.auth.clone());
        info!(url = %config.database.url, "backend services ready");

        Ok(Self {
            db_pool,
            authenticator,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub vanished_posts: u64,
    pub expired_sessions: u64,
}

/// Remove vanished posts and expired sessions once.
pub async fn run_maintenance(services: &BackendServices) -> Result<MaintenanceReport> {
    let vanished_posts = expiry::purge_expired(&services.db_pool, Utc::now())
        .await
        .context("failed to purge vanished posts")?;
    let expired_sessions = services
        .authenticator
        .purge_expired_sessions()
        .await
        .context("failed to purge expired sessions")?;

    Ok(MaintenanceReport {
        vanished_posts,
        expired_sessions,
    })
}

/// Run maintenance every `interval_seconds`. Zero disables the sweeper.
pub fn spawn_expiry_sweeper(
    services: BackendServices,
    interval_seconds: u64,
) -> Option<JoinHandle<()>> {
    if interval_seconds == 0 {
        info!("expiry sweeper disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds));
        loop {
            ticker.tick().await;
            match run_maintenance(&services).await {
                Ok(report) if report != MaintenanceReport::default() => {
                    info!(
                        vanished_posts = report.vanished_posts,
                        expired_sessions = report.expired_sessions,
                        "expiry sweep finished"
                    );
                }
                Ok(_) => {}
                Err(error) => tracing::warn!("expiry sweep failed: {error:#}"),
            }
        }
    }))
}

/// Resolves on ctrl-c, or SIGTERM on unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(?error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(error) => {
                tracing::warn!(?error, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
