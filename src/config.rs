use std::{env, fmt::Display, str::FromStr};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in environment")]
    Missing(&'static str),

    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Runtime settings read once at startup
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    /// Reviews a business needs before it can be featured or ranked best-in-category
    pub featured_min_reviews: i64,
    pub featured_limit: usize,
    pub explore_default_limit: i64,
    pub landing_default_limit: i64,
    pub max_page_size: i64,
    pub placeholder_image_url: String,
    pub uncategorized_label: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8082,
            database_url: String::new(),
            db_max_connections: 10,
            db_min_connections: 2,
            featured_min_reviews: 3,
            featured_limit: 3,
            explore_default_limit: 12,
            landing_default_limit: 8,
            max_page_size: 100,
            placeholder_image_url: "/placeholder.svg".to_string(),
            uncategorized_label: "Uncategorized".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let database_url =
            env::var("DATABASE_URL").map_err(|_| ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", defaults.port)?,
            database_url,
            db_max_connections: parse_or("DB_MAX_CONNECTIONS", defaults.db_max_connections)?,
            db_min_connections: parse_or("DB_MIN_CONNECTIONS", defaults.db_min_connections)?,
            featured_min_reviews: parse_or("FEATURED_MIN_REVIEWS", defaults.featured_min_reviews)?,
            featured_limit: parse_or("FEATURED_LIMIT", defaults.featured_limit)?,
            explore_default_limit: parse_or("EXPLORE_DEFAULT_LIMIT", defaults.explore_default_limit)?,
            landing_default_limit: parse_or("LANDING_DEFAULT_LIMIT", defaults.landing_default_limit)?,
            max_page_size: parse_or("MAX_PAGE_SIZE", defaults.max_page_size)?,
            placeholder_image_url: env::var("PLACEHOLDER_IMAGE_URL")
                .unwrap_or(defaults.placeholder_image_url),
            uncategorized_label: env::var("UNCATEGORIZED_LABEL")
                .unwrap_or(defaults.uncategorized_label),
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        message: e.to_string(),
    })
}
