//! Runtime configuration collected from the environment at startup.

use anyhow::{Context, Result};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub shipping: ShippingConfig,
}

/// Settings for the outbound rate-provider client.
#[derive(Debug, Clone)]
pub struct ShippingConfig {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
    /// City id rates are computed from (the warehouse location).
    pub origin_city_id: u32,
    /// Fallback weight for products without one, in grams.
    pub default_item_weight_grams: i32,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?,
            port: env_or("PORT", 8083)?,
            shipping: ShippingConfig {
                api_key: std::env::var("RAJAONGKIR_API_KEY")
                    .context("RAJAONGKIR_API_KEY is not set")?,
                base_url: std::env::var("RAJAONGKIR_BASE_URL")
                    .unwrap_or_else(|_| "https://api.rajaongkir.com/starter".to_string()),
                timeout: Duration::from_secs(env_or("RAJAONGKIR_TIMEOUT_SECS", 30)?),
                origin_city_id: env_or("SHIPPING_ORIGIN_CITY_ID", 152)?,
                default_item_weight_grams: env_or("DEFAULT_ITEM_WEIGHT_GRAMS", 1000)?,
            },
        })
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(v) => v.parse().with_context(|| format!("{key} is not a valid value")),
        Err(_) => Ok(default),
    }
}
