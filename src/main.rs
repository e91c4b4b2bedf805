mod auth;
mod config;
mod database;
mod error;
mod explore;
mod handlers;
mod landing;
mod models;
mod ranking;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use crate::config::AppConfig;
use crate::database::{Database, Store};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|err| {
        log::error!("Invalid configuration: {err}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err)
    })?;

    let db = Database::connect(&config).await.map_err(|err| {
        log::error!("Failed to initialize database: {err:?}");
        std::io::Error::other(err)
    })?;
    log::info!("Database connection established");

    let bind_address = config.bind_address();
    let store: web::Data<dyn Store> = web::Data::from(Arc::new(db) as Arc<dyn Store>);
    let config_data = web::Data::new(config);

    log::info!("🚀 Starting review marketplace service on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(store.clone())
            .app_data(config_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(web::scope("/api/v1").configure(handlers::configure))
    })
    .bind(&bind_address)?
    .run()
    .await
}
