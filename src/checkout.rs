//! Checkout orchestration: gate entry, assemble the priced page, quote
//! shipping, and commit the order atomically.
//!
//! Confirmation runs in a single transaction: stock is re-validated and
//! decremented on locked product rows, the order with its items and shipment
//! is inserted, and the cart is cleared. Any failure rolls all of it back, so
//! a partial order can never be observed.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::cart::{self, ensure_stock, CartLineView, CartView};
use crate::error::{Result, StoreError};
use crate::order::{self, Order, OrderStatus, ShipmentStatus};
use crate::shipping::{Courier, Province, ShippingQuote};
use crate::AppState;

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CustomerAddress {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub label: String,
    pub recipient: String,
    pub phone: String,
    pub province_id: i32,
    pub province: String,
    pub city_id: i32,
    pub city: String,
    pub subdistrict_id: Option<i32>,
    pub subdistrict: Option<String>,
    pub postal_code: String,
    pub street: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything the checkout page needs in one payload.
#[derive(Debug, Serialize)]
pub struct CheckoutPage {
    pub cart: CartView,
    pub addresses: Vec<CustomerAddress>,
    /// Primary address, or the first saved one if none is flagged primary.
    pub selected_address_id: Option<Uuid>,
    pub provinces: Vec<Province>,
    pub origin_city_id: u32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct QuoteRequest {
    #[validate(range(min = 1))]
    pub destination_id: u32,
    pub courier: Courier,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmRequest {
    pub address_id: Uuid,
    pub courier: Courier,
    #[validate(length(min = 1))]
    pub service_code: String,
    #[validate(length(min = 1))]
    pub service_name: String,
    pub service_description: Option<String>,
    pub shipping_cost: Decimal,
    pub etd: Option<String>,
    #[validate(length(min = 1))]
    pub payment_method: String,
    pub note: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct Customer {
    id: Uuid,
}

/// Cart line joined with the locked product row during confirmation.
#[derive(Debug, sqlx::FromRow)]
struct CheckoutLine {
    product_id: Uuid,
    quantity: i32,
    product_name: String,
    product_code: String,
    price: Decimal,
    stock: i32,
    weight_grams: Option<i32>,
    thumbnail: Option<String>,
}

/// Chargeable cart weight: per-line product weight (or the configured
/// default when a product omits one) times quantity.
pub(crate) fn total_weight(weights: &[(Option<i32>, i32)], default_grams: i32) -> i32 {
    weights
        .iter()
        .map(|(weight, qty)| weight.unwrap_or(default_grams) * qty)
        .sum()
}

fn cart_weight(lines: &[CartLineView], default_grams: i32) -> i32 {
    let weights: Vec<(Option<i32>, i32)> =
        lines.iter().map(|l| (l.weight_grams, l.quantity)).collect();
    total_weight(&weights, default_grams)
}

async fn require_customer(db: &sqlx::PgPool, user_id: Uuid) -> Result<Customer> {
    sqlx::query_as::<_, Customer>("SELECT id FROM customers WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::ProfileIncomplete)
}

/// Entry to checkout: requires a customer profile and a non-empty cart, and
/// resolves the saved addresses with the primary one preselected. The
/// province list is best-effort; a provider outage does not block the page.
pub async fn load(state: &AppState, user_id: Uuid) -> Result<CheckoutPage> {
    let customer = require_customer(&state.db, user_id).await?;

    let cart = cart::list_cart(&state.db, user_id).await?;
    if cart.is_empty() {
        return Err(StoreError::EmptyCart);
    }

    let addresses = sqlx::query_as::<_, CustomerAddress>(
        "SELECT * FROM customer_addresses
         WHERE customer_id = $1
         ORDER BY is_primary DESC, created_at",
    )
    .bind(customer.id)
    .fetch_all(&state.db)
    .await?;
    let selected_address_id = addresses.first().map(|a| a.id);

    let provinces = match state.rates.provinces().await {
        Ok(provinces) => provinces,
        Err(e) => {
            tracing::warn!(error = %e, "province list unavailable, rendering checkout without it");
            vec![]
        }
    };

    Ok(CheckoutPage {
        cart,
        addresses,
        selected_address_id,
        provinces,
        origin_city_id: state.rates.origin_city_id(),
    })
}

/// Quotes shipping for the current cart contents to the given destination.
pub async fn quote(state: &AppState, user_id: Uuid, req: &QuoteRequest) -> Result<Vec<ShippingQuote>> {
    let cart = cart::list_cart(&state.db, user_id).await?;
    if cart.is_empty() {
        return Err(StoreError::EmptyCart);
    }
    let weight = cart_weight(&cart.lines, state.config.shipping.default_item_weight_grams);
    state.rates.get_rates(req.destination_id, weight, req.courier).await
}

/// Commits the checkout: one transaction covering stock re-validation and
/// decrement, order + items + shipment insertion, and cart clearing.
pub async fn confirm(state: &AppState, user_id: Uuid, req: &ConfirmRequest) -> Result<Order> {
    if req.shipping_cost < Decimal::ZERO {
        return Err(StoreError::Validation("shipping cost cannot be negative".into()));
    }

    let mut tx = state.db.begin().await?;

    let customer = sqlx::query_as::<_, Customer>("SELECT id FROM customers WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::ProfileIncomplete)?;

    // The shipping address must be one of the customer's own.
    let address_ok: Option<Uuid> = sqlx::query_scalar(
        "SELECT id FROM customer_addresses WHERE id = $1 AND customer_id = $2",
    )
    .bind(req.address_id)
    .bind(customer.id)
    .fetch_optional(&mut *tx)
    .await?;
    if address_ok.is_none() {
        return Err(StoreError::NotFound);
    }

    // Lock cart lines and their products for the duration of the commit so
    // the stock check below holds when the decrement lands.
    let lines = sqlx::query_as::<_, CheckoutLine>(
        "SELECT c.product_id, c.quantity,
                p.name AS product_name, p.code AS product_code,
                p.price, p.stock, p.weight_grams,
                (SELECT i.path FROM product_images i
                 WHERE i.product_id = p.id
                 ORDER BY i.is_thumbnail DESC, i.position ASC
                 LIMIT 1) AS thumbnail
         FROM cart_lines c
         JOIN products p ON p.id = c.product_id AND p.deleted_at IS NULL
         WHERE c.user_id = $1
         ORDER BY c.created_at
         FOR UPDATE OF c, p",
    )
    .bind(user_id)
    .fetch_all(&mut *tx)
    .await?;

    if lines.is_empty() {
        return Err(StoreError::EmptyCart);
    }

    for line in &lines {
        ensure_stock(line.quantity, line.stock)?;
        sqlx::query("UPDATE products SET stock = stock - $2, updated_at = NOW() WHERE id = $1")
            .bind(line.product_id)
            .bind(line.quantity)
            .execute(&mut *tx)
            .await?;
    }

    let today = Utc::now().date_naive();
    let prefix = format!("INV{}", today.format("%Y%m%d"));
    let last_for_day = order::last_number_for_day(&mut *tx, &prefix).await?;
    let order_number = order::next_order_number(today, last_for_day.as_deref());

    let pricings: Vec<_> = lines
        .iter()
        .map(|l| order::price_line(l.price, l.quantity, Decimal::ZERO, Decimal::ZERO))
        .collect();
    let goods_total: Decimal = pricings.iter().map(|p| p.subtotal).sum();
    let grand_total = goods_total + req.shipping_cost;

    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, order_number, user_id, customer_id, shipping_address_id,
                             order_date, goods_total, shipping_cost, grand_total,
                             status, payment_method, payment_status, note)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, 'pending', $12)
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&order_number)
    .bind(user_id)
    .bind(customer.id)
    .bind(req.address_id)
    .bind(today)
    .bind(goods_total)
    .bind(req.shipping_cost)
    .bind(grand_total)
    .bind(OrderStatus::AwaitingPayment.as_str())
    .bind(&req.payment_method)
    .bind(&req.note)
    .fetch_one(&mut *tx)
    .await?;

    for (line, pricing) in lines.iter().zip(&pricings) {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, product_name, product_code,
                                      image, quantity, original_price, discount_percent,
                                      discount_amount, unit_price, subtotal)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, $9, $10, $11)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(&line.product_code)
        .bind(&line.thumbnail)
        .bind(line.quantity)
        .bind(pricing.original)
        .bind(pricing.discount)
        .bind(pricing.unit_price)
        .bind(pricing.subtotal)
        .execute(&mut *tx)
        .await?;
    }

    let weights: Vec<(Option<i32>, i32)> =
        lines.iter().map(|l| (l.weight_grams, l.quantity)).collect();
    let weight_grams = total_weight(&weights, state.config.shipping.default_item_weight_grams);

    sqlx::query(
        "INSERT INTO shipments (id, order_id, address_id, courier_code, courier_name,
                                service_code, service_name, service_description,
                                weight_grams, cost, etd, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(Uuid::now_v7())
    .bind(order.id)
    .bind(req.address_id)
    .bind(req.courier.code())
    .bind(req.courier.display_name())
    .bind(&req.service_code)
    .bind(&req.service_name)
    .bind(&req.service_description)
    .bind(weight_grams)
    .bind(req.shipping_cost)
    .bind(&req.etd)
    .bind(ShipmentStatus::Pending.as_str())
    .execute(&mut *tx)
    .await?;

    sqlx::query("DELETE FROM cart_lines WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(%user_id, %order_number, total = %order.grand_total, "order placed");
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_sums_per_line() {
        let weights = [(Some(500), 2), (Some(250), 4)];
        assert_eq!(total_weight(&weights, 1000), 2000);
    }

    #[test]
    fn missing_weight_falls_back_to_default() {
        let weights = [(None, 3), (Some(200), 1)];
        assert_eq!(total_weight(&weights, 1000), 3200);
    }

    #[test]
    fn empty_cart_weighs_nothing() {
        assert_eq!(total_weight(&[], 1000), 0);
    }

    use crate::config::{Config, ShippingConfig};
    use crate::shipping::RateClient;
    use crate::testutil;
    use sqlx::PgPool;
    use std::time::Duration;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn test_state(pool: PgPool) -> AppState {
        let config = Config {
            database_url: String::new(),
            port: 0,
            shipping: ShippingConfig {
                api_key: "test-key".into(),
                base_url: "http://127.0.0.1:1".into(),
                timeout: Duration::from_secs(1),
                origin_city_id: 152,
                default_item_weight_grams: 1000,
            },
        };
        let rates = RateClient::new(&config.shipping).unwrap();
        AppState { db: pool, rates, config }
    }

    fn confirm_req(address_id: Uuid) -> ConfirmRequest {
        ConfirmRequest {
            address_id,
            courier: Courier::Jne,
            service_code: "REG".into(),
            service_name: "Layanan Reguler".into(),
            service_description: None,
            shipping_cost: dec("15000.00"),
            etd: Some("2-3".into()),
            payment_method: "transfer".into(),
            note: None,
        }
    }

    #[sqlx::test]
    async fn missing_profile_blocks_checkout(pool: PgPool) {
        let state = test_state(pool);
        let user = testutil::seed_user(&state.db).await;
        assert!(matches!(
            load(&state, user).await,
            Err(StoreError::ProfileIncomplete)
        ));
    }

    #[sqlx::test]
    async fn empty_cart_aborts_without_an_order(pool: PgPool) {
        let state = test_state(pool);
        let user = testutil::seed_user(&state.db).await;
        let customer = testutil::seed_customer(&state.db, user).await;
        let address = testutil::seed_address(&state.db, customer).await;

        assert!(matches!(load(&state, user).await, Err(StoreError::EmptyCart)));
        assert!(matches!(
            confirm(&state, user, &confirm_req(address)).await,
            Err(StoreError::EmptyCart)
        ));

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(orders, 0);
    }

    #[sqlx::test]
    async fn confirm_places_the_order_and_clears_the_cart(pool: PgPool) {
        let state = test_state(pool);
        let user = testutil::seed_user(&state.db).await;
        let customer = testutil::seed_customer(&state.db, user).await;
        let address = testutil::seed_address(&state.db, customer).await;
        let first = testutil::seed_product(&state.db, "25000.00", 5).await;
        let second = testutil::seed_product(&state.db, "10000.00", 3).await;
        crate::cart::add_item(&state.db, user, first, 2).await.unwrap();
        crate::cart::add_item(&state.db, user, second, 1).await.unwrap();

        let order = confirm(&state, user, &confirm_req(address)).await.unwrap();
        assert!(order.order_number.starts_with("INV"));
        assert_eq!(order.goods_total, dec("60000.00"));
        assert_eq!(order.grand_total, dec("75000.00"));
        assert_eq!(order.status, "awaiting_payment");

        let detail = crate::order::detail(&state.db, user, order.id).await.unwrap();
        assert_eq!(detail.items.len(), 2);
        // Items keep cart order.
        assert_eq!(detail.items[0].product_id, first);
        assert_eq!(detail.items[1].product_id, second);
        let shipment = detail.shipment.unwrap();
        assert_eq!(shipment.cost, dec("15000.00"));
        assert_eq!(shipment.weight_grams, 1500);

        let stock: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(first)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(stock, 3);

        assert!(crate::cart::list_cart(&state.db, user).await.unwrap().is_empty());
        assert!(matches!(
            confirm(&state, user, &confirm_req(address)).await,
            Err(StoreError::EmptyCart)
        ));
    }

    #[sqlx::test]
    async fn confirm_revalidates_stock_and_rolls_back(pool: PgPool) {
        let state = test_state(pool);
        let user = testutil::seed_user(&state.db).await;
        let customer = testutil::seed_customer(&state.db, user).await;
        let address = testutil::seed_address(&state.db, customer).await;
        let product = testutil::seed_product(&state.db, "25000.00", 5).await;
        crate::cart::add_item(&state.db, user, product, 3).await.unwrap();

        // Stock dropped after the add-to-cart check passed.
        sqlx::query("UPDATE products SET stock = 2 WHERE id = $1")
            .bind(product)
            .execute(&state.db)
            .await
            .unwrap();

        match confirm(&state, user, &confirm_req(address)).await {
            Err(StoreError::StockExceeded { remaining }) => assert_eq!(remaining, 2),
            other => panic!("expected StockExceeded, got {other:?}"),
        }

        let orders: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(orders, 0);
        let stock: i32 = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
            .bind(product)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(stock, 2);
        assert_eq!(crate::cart::list_cart(&state.db, user).await.unwrap().lines.len(), 1);
    }
}
