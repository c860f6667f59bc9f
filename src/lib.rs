//! Storefront service core
//!
//! Cart, shipping-rate lookup and checkout for a small storefront:
//! - stock-bounded cart state, one line per (user, product)
//! - rate quotes from an external courier API, normalized to one error shape
//! - atomic checkout: order + line-item snapshots + shipment, cart cleared
//!
//! Catalog and customer-profile administration live elsewhere; this crate
//! only reads the product and address data checkout needs.

pub mod cart;
pub mod checkout;
pub mod config;
pub mod error;
pub mod http;
pub mod order;
pub mod shipping;

#[cfg(test)]
pub(crate) mod testutil;

pub use config::Config;
pub use error::{Result, StoreError};

use shipping::RateClient;
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub rates: RateClient,
    pub config: Config,
}
