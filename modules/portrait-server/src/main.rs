use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use portrait_engine::{HttpLinkProber, PgRecordStore, PortraitConfig, PortraitEngine};
use storage_client::StorageClient;

mod rest;

#[derive(Parser)]
#[command(name = "portrait")]
#[command(about = "Resolve and reconcile profile images across identities")]
#[command(version)]
struct Cli {
    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API
    Serve,

    /// Print the live image URL for an identity
    Resolve { identity: String },

    /// Resolve and write the result to every holder row
    Reconcile { identity: String },

    /// Reconcile, then delete superseded stored objects
    Cleanup {
        identity: String,

        /// Filenames to keep (comma separated). Defaults to the canonical file.
        #[arg(long, value_delimiter = ',')]
        keep: Option<Vec<String>>,
    },

    /// Upload a fresh placeholder and point every holder at it
    Placeholder { identity: String },

    /// Run cleanup for every person in the record store
    BatchCleanup,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let config = PortraitConfig::from_env()?;
    let engine = build_engine(&config).await?;

    match cli.command {
        Commands::Serve => serve(&config, engine).await,
        Commands::Resolve { identity } => print_json(&engine.resolve(&identity).await?),
        Commands::Reconcile { identity } => print_json(&engine.reconcile(&identity).await?),
        Commands::Cleanup { identity, keep } => {
            print_json(&engine.cleanup(&identity, keep.as_deref()).await?)
        }
        Commands::Placeholder { identity } => {
            print_json(&engine.create_placeholder(&identity).await?)
        }
        Commands::BatchCleanup => {
            let report = engine.batch_cleanup().await?;
            info!("Batch cleanup finished. {report}");
            print_json(&report)
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn build_engine(config: &PortraitConfig) -> Result<PortraitEngine> {
    let records = PgRecordStore::connect(&config.database_url).await?;
    info!("Connected to record store");

    let blobs = StorageClient::new(
        &config.storage_url,
        &config.storage_service_key,
        &config.storage_bucket,
        config.engine.io_timeout,
    )?;
    let prober = HttpLinkProber::new(config.engine.liveness_timeout)?;

    Ok(PortraitEngine::new(
        Arc::new(records),
        Arc::new(blobs),
        Arc::new(prober),
        config.engine.clone(),
    ))
}

async fn serve(config: &PortraitConfig, engine: PortraitEngine) -> Result<()> {
    let app = rest::build_router(Arc::new(rest::AppState { engine }));

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("Portrait API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
