//! Creates the service database out of band, before the first server start.

use tokio_postgres::NoTls;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let conn_str = std::env::var("PG_ADMIN_CONN")
        .unwrap_or_else(|_| "host=127.0.0.1 user=postgres dbname=postgres".into());
    let db_name = std::env::var("DB_NAME").unwrap_or_else(|_| "review_marketplace".into());

    ensure_valid_database_name(&db_name)?;

    log::info!("Connecting to Postgres to manage databases...");
    let (client, connection) = tokio_postgres::connect(&conn_str, NoTls).await?;

    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::error!("connection error: {}", e);
        }
    });

    let row = client
        .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&db_name])
        .await?;

    if row.is_some() {
        log::info!("Database '{}' already exists", db_name);
        return Ok(());
    }

    let create_sql = format!("CREATE DATABASE \"{}\"", db_name);
    client
        .execute(create_sql.as_str(), &[])
        .await
        .map_err(|e| {
            log::error!("Failed to create database '{}': {}", db_name, e);
            e
        })?;
    log::info!("Database '{}' created; migrations run on server start", db_name);

    Ok(())
}

fn ensure_valid_database_name(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    if is_valid_database_name(name) {
        return Ok(());
    }
    log::error!("Refusing to create database: invalid database name '{}'", name);
    Err(format!("invalid database name '{name}'").into())
}

fn is_valid_database_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
