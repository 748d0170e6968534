use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::info;
use whisperwall_api::routes::models::{CreatePostRequest, GeoPoint, PostMedia};
use whisperwall_api::services::{post, stats};
use whisperwall_api::{build_router, AppState};
use whisperwall_config::{load as load_config, AppConfig};
use whisperwall_runtime::{run_maintenance, spawn_expiry_sweeper, telemetry, BackendServices};

#[derive(Parser)]
#[command(name = "whisperwall-backend")]
#[command(about = "WhisperWall anonymous social backend (serves HTTP by default)")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server (default)
    Serve,
    /// Delete vanished posts and expired sessions once
    PurgeExpired,
    /// Print platform counters as JSON
    Stats,
    /// Seed the database with demo users and posts
    SeedData,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    telemetry::init_tracing().context("failed to initialise tracing")?;
    let config = load_config().context("failed to load configuration")?;

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => run_server(config).await,
        Commands::PurgeExpired => purge_expired(config).await,
        Commands::Stats => print_stats(config).await,
        Commands::SeedData => seed_data(config).await,
    }
}

async fn initialise(config: &AppConfig) -> anyhow::Result<BackendServices> {
    BackendServices::initialise(config)
        .await
        .context("failed to initialise backend services")
}

async fn run_server(config: AppConfig) -> anyhow::Result<()> {
    info!("starting WhisperWall backend");

    let services = initialise(&config).await?;
    let sweeper = spawn_expiry_sweeper(services.clone(), config.feed.purge_interval_seconds);

    let address = format!("{}:{}", config.http.address, config.http.port);
    let state = AppState::new(services.db_pool, services.authenticator, config);
    let app = build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    info!(%address, "http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(whisperwall_runtime::shutdown_signal())
        .await
        .context("http server error")?;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    info!("backend shut down");
    Ok(())
}

async fn purge_expired(config: AppConfig) -> anyhow::Result<()> {
    let services = initialise(&config).await?;
    let report = run_maintenance(&services).await?;

    println!("Expired content purged:");
    println!("- {} vanished posts deleted", report.vanished_posts);
    println!("- {} expired sessions deleted", report.expired_sessions);
    Ok(())
}

async fn print_stats(config: AppConfig) -> anyhow::Result<()> {
    let services = initialise(&config).await?;
    let stats = stats::platform_stats(&services.db_pool)
        .await
        .context("failed to collect platform stats")?;

    println!(
        "{}",
        serde_json::to_string_pretty(&stats).context("failed to encode stats")?
    );
    Ok(())
}

struct SeedPost {
    content: &'static str,
    category: &'static str,
    location: Option<(f64, f64)>,
    image: Option<&'static str>,
}

const SEED_POSTS: &[SeedPost] = &[
    SeedPost {
        content: "Anyone else hear the fireworks by the river tonight?",
        category: "city",
        location: Some((52.5200, 13.4050)),
        image: None,
    },
    SeedPost {
        content: "Best late night noodles are two blocks from the station.",
        category: "food",
        location: Some((52.5163, 13.3777)),
        image: Some("/uploads/seed-noodles.jpg"),
    },
    SeedPost {
        content: "Confession: I still have not returned my library books.",
        category: "confession",
        location: None,
        image: None,
    },
];

async fn seed_data(config: AppConfig) -> anyhow::Result<()> {
    info!("seeding database with demo data");

    let services = initialise(&config).await?;
    let now = Utc::now();

    let mut authors = Vec::new();
    for _ in 0..SEED_POSTS.len() {
        let (user, session) = services
            .authenticator
            .register_anonymous()
            .await
            .context("failed to register demo user")?;
        println!(
            "- user {} ({}) token {}",
            user.anonymous_id, user.display_name, session.token
        );
        authors.push(user);
    }

    for (seed, author) in SEED_POSTS.iter().zip(&authors) {
        let request = CreatePostRequest {
            content: Some(seed.content.to_string()),
            category: Some(seed.category.to_string()),
            location: seed.location.map(|(latitude, longitude)| GeoPoint {
                latitude,
                longitude,
            }),
            media: seed.image.map(|image| PostMedia {
                image: Some(image.to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let created = post::create_post(&services.db_pool, author, request, now)
            .await
            .context("failed to insert demo post")?;
        println!("- post {} by {}", created.id, author.anonymous_id);
    }

    println!(
        "Database seeded: {} users, {} posts",
        authors.len(),
        SEED_POSTS.len()
    );
    Ok(())
}
