use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use admin_insights::api::{self, middleware::SecurityConfig};
use admin_insights::config::{self, HostConfig};
use admin_insights::db::Database;
use admin_insights::features::builtin_registry;
use admin_insights::hooks::HookService;
use admin_insights::models::is_toggleable;

#[derive(Parser)]
#[command(name = "admin-insights")]
#[command(about = "Supplementary admin and data-entry page features for a host application")]
struct Cli {
    /// SQLite database path (overrides ADMIN_INSIGHTS_DB)
    #[arg(long, global = true)]
    db: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hook service
    Serve {
        /// Port for HTTP API
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Address to bind to
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Show a feature's toggle state in a project
    State {
        #[arg(short, long)]
        project: i64,
        feature: String,
    },
    /// Flip a feature's toggle state in a project
    Toggle {
        #[arg(short, long)]
        project: i64,
        feature: String,
    },
    /// Switch client-side debug logging on or off
    Debug { mode: Switch },
}

#[derive(Clone, Copy, ValueEnum)]
enum Switch {
    On,
    Off,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG")
            .unwrap_or_else(|_| "admin_insights=debug,insights_core=debug,tower_http=debug".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn open_database(path: Option<std::path::PathBuf>) -> anyhow::Result<Database> {
    let db = match path.or_else(config::database_path_from_env) {
        Some(path) => Database::open(path)?,
        None => Database::open_default()?,
    };
    db.migrate()?;
    Ok(db)
}

fn check_toggleable(feature: &str) -> anyhow::Result<()> {
    anyhow::ensure!(is_toggleable(feature), "Feature '{}' cannot be toggled", feature);
    Ok(())
}

async fn serve(db: Database, bind: &str, port: u16) -> anyhow::Result<()> {
    let host = HostConfig::from_env();
    let security = SecurityConfig::from_env();
    if security.api_key.is_none() {
        tracing::warn!("ADMIN_INSIGHTS_API_KEY is not set, hook endpoints are unauthenticated");
    }

    let registry = builtin_registry().context("Failed to build feature registry")?;
    tracing::info!(features = ?registry.features(), "Registered features");

    let service = HookService::new(registry, db, host);
    let app = api::create_router_with_security(service, security);

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", bind, port)).await?;
    tracing::info!("admin-insights listening on http://{}:{}", bind, port);

    axum::serve(listener, app).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let db = open_database(cli.db)?;

    match cli.command {
        Some(Commands::Serve { port, bind }) => serve(db, &bind, port).await?,
        Some(Commands::State { project, feature }) => {
            check_toggleable(&feature)?;
            let state = db.get_feature_state(project, &feature)?;
            println!("{}: {}", feature, state.as_str());
        }
        Some(Commands::Toggle { project, feature }) => {
            check_toggleable(&feature)?;
            let state = db.toggle_feature_state(project, &feature)?;
            println!("{}: {}", feature, state.as_str());
        }
        Some(Commands::Debug { mode }) => {
            db.set_debug_mode(matches!(mode, Switch::On))?;
            println!("debug mode: {}", if matches!(mode, Switch::On) { "on" } else { "off" });
        }
        None => serve(db, "127.0.0.1", 3000).await?,
    }

    Ok(())
}
