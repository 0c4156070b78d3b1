use std::sync::Arc;

use tracing::{error, info};

use file_bucket::bucket::BlobStorage;
use file_bucket::upload::UploadStore;
use file_bucket::web::{AppState, WebServer};
use file_bucket::{Config, Database};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    // Initialize logging
    if let Err(e) = file_bucket::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        file_bucket::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(config).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> file_bucket::Result<()> {
    config.validate()?;

    info!("File bucket service starting");

    let db = Database::open(&config.database.path).await?;
    info!("Database schema version {}", db.schema_version().await?);

    let storage = BlobStorage::new(&config.storage.storage_path)?;
    let uploads = UploadStore::new(&config.storage.upload_path)?;
    info!(
        storage = %config.storage.storage_path,
        uploads = %config.storage.upload_path,
        "Storage initialized"
    );

    let app_state = AppState::new(Arc::new(db), storage, Arc::new(uploads))
        .with_max_archive_size(config.max_archive_size());

    WebServer::new(&config.web, app_state)?.run().await?;
    Ok(())
}
