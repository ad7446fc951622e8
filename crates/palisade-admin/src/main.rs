//! Palisade schema administration
//!
//! Thin binary over the management layer: compile the configured
//! permission map locally, publish it to the policy service, read back
//! the live schema, or probe connectivity.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;

use config::Settings;
use palisade_authz::ManagementService;
use palisade_core::compile_schema;
use palisade_spicedb::SpiceDbClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    init_tracing();

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;

    info!("Palisade admin v{}", env!("CARGO_PKG_VERSION"));

    let mode = std::env::args().nth(1).unwrap_or_else(|| "show".to_string());
    match mode.as_str() {
        "show" => show_schema(&settings),
        "publish" => publish_schema(&settings).await,
        "read" => read_schema(&settings).await,
        "ping" => ping(&settings).await,
        other => {
            error!("Unknown mode {:?}", other);
            eprintln!("Usage: palisade-admin [show|publish|read|ping]");
            std::process::exit(2)
        }
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,palisade=debug"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Compiles the configured permission map and prints the schema without
/// touching the policy service.
fn show_schema(settings: &Settings) -> Result<()> {
    let schema =
        compile_schema(&settings.permissions).context("Permission map does not compile")?;
    print!("{}", schema.render());
    Ok(())
}

async fn publish_schema(settings: &Settings) -> Result<()> {
    let management = management_service(settings).await?;
    management
        .publish_schema()
        .await
        .context("Failed to publish the schema")?;
    info!("Schema published");
    Ok(())
}

async fn read_schema(settings: &Settings) -> Result<()> {
    let management = management_service(settings).await?;
    let schema = management
        .read_schema()
        .await
        .context("Failed to read the schema")?;
    println!("{}", schema.trim_end_matches('\n'));
    Ok(())
}

async fn ping(settings: &Settings) -> Result<()> {
    let client = connect(settings).await?;
    if client.health_check().await? {
        info!("Policy service at {} is reachable", settings.spicedb.endpoint);
        Ok(())
    } else {
        error!(
            "Policy service at {} did not answer the schema probe",
            settings.spicedb.endpoint
        );
        std::process::exit(1)
    }
}

async fn connect(settings: &Settings) -> Result<SpiceDbClient> {
    info!(
        "Connecting to the policy service at {}...",
        settings.spicedb.endpoint
    );
    let client = SpiceDbClient::new(settings.spicedb_config())
        .await
        .context("Failed to connect to the policy service")?;
    info!("Policy service connection established");
    Ok(client)
}

async fn management_service(settings: &Settings) -> Result<ManagementService> {
    let client = connect(settings).await?;
    Ok(ManagementService::new(
        Arc::new(client),
        Arc::new(settings.permissions.clone()),
    ))
}
