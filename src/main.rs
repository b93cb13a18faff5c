//! Growest Connect server

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use growest_connect::{
    config::Args,
    db::{MemoryStore, MongoClient, MongoStore, Store},
    feed::ChangeFeed,
    functions::{HttpFunctionsConfig, HttpRemoteFunctions, RemoteFunctions, UnconfiguredFunctions},
    server::{self, AppState},
    services::ServiceContext,
    storage::{HttpObjectStorage, HttpStorageConfig, MemoryObjectStorage, ObjectStorage},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("growest_connect={},info", args.log_level).into());
    if args.json_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Growest Connect");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("Storage: {}", args.storage_url.as_deref().unwrap_or("in-memory"));
    info!("Functions: {}", args.functions_url.as_deref().unwrap_or("not configured"));
    info!("======================================");

    // Row store (in-memory fallback in dev mode)
    let store: Arc<dyn Store> = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Arc::new(MongoStore::new(&client).await?)
        }
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
            Arc::new(MemoryStore::new())
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let storage: Arc<dyn ObjectStorage> = match &args.storage_url {
        Some(url) => Arc::new(HttpObjectStorage::new(HttpStorageConfig {
            base_url: url.clone(),
            public_url: args.storage_public_url.clone(),
            service_key: args.storage_service_key.clone(),
            request_timeout: args.request_timeout(),
        })),
        None if args.dev_mode => {
            warn!("STORAGE_URL not set, uploads kept in memory");
            Arc::new(MemoryObjectStorage::default())
        }
        None => anyhow::bail!("STORAGE_URL is required in production mode"),
    };

    let functions: Arc<dyn RemoteFunctions> = match &args.functions_url {
        Some(url) => Arc::new(HttpRemoteFunctions::new(HttpFunctionsConfig {
            base_url: url.clone(),
            api_key: args.functions_api_key.clone(),
            request_timeout: args.request_timeout(),
        })),
        None => {
            warn!("FUNCTIONS_URL not set, chatbot, matching and payments unavailable");
            Arc::new(UnconfiguredFunctions)
        }
    };

    let ctx = ServiceContext {
        store,
        feed: ChangeFeed::new(args.feed_capacity),
        storage,
        functions,
        billing: args.billing(),
    };

    let state = Arc::new(AppState::new(args, ctx)?);
    server::run(state).await?;

    Ok(())
}
