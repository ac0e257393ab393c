use std::{net::SocketAddr, sync::Arc};

use engine::{FsBlobStore, PasswordPolicy};
use migration::{Migrator, MigratorTrait};
use sea_orm::ConnectOptions;
use settings::Database;

mod settings;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let settings = settings::Settings::new()?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "rozliczenia={level},server={level},engine={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.server.database).await?;

    let mut policy = PasswordPolicy::default();
    if let Some(memory_kb) = settings.security.argon2_memory_kb {
        policy.memory_kb = memory_kb;
    }
    if let Some(iterations) = settings.security.argon2_iterations {
        policy.iterations = iterations;
    }

    let mut builder = engine::Engine::builder().database(db).password_policy(policy);
    if let Some(dir) = &settings.storage.blob_dir {
        tracing::info!("invoice scans stored in {dir}");
        builder = builder.blob_store(Arc::new(FsBlobStore::new(dir)));
    }
    let engine = builder.build().await?;

    let bind = settings
        .server
        .bind
        .unwrap_or_else(|| "127.0.0.1".to_string());
    let addr: SocketAddr = format!("{}:{}", bind, settings.server.port).parse()?;
    server::run(engine, addr).await;

    Ok(())
}

async fn parse_database(
    config: &Database,
) -> Result<sea_orm::DatabaseConnection, Box<dyn std::error::Error + Send + Sync>> {
    let options = match config {
        // Every pooled connection would open its own empty in-memory database.
        Database::Memory => {
            let mut options = ConnectOptions::new("sqlite::memory:");
            options.max_connections(1);
            options
        }
        Database::Sqlite(path) => ConnectOptions::new(format!("sqlite:{}?mode=rwc", path)),
    };

    let database = sea_orm::Database::connect(options).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
