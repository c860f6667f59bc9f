//! Cart engine: stock-bounded cart state for a single user.
//!
//! Every operation takes the acting user id explicitly; nothing here reads
//! ambient session state. At most one line exists per (user, product) pair,
//! enforced by a unique index and an upsert, and every mutation re-validates
//! the requested quantity against current stock before anything is written.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLine {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One cart line joined with the live product data the storefront renders.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct CartLineView {
    pub id: Uuid,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_price: Decimal,
    pub stock: i32,
    pub weight_grams: Option<i32>,
    pub thumbnail: Option<String>,
}

/// Read model for the cart page: lines plus the aggregate total.
#[derive(Debug, Clone, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLineView>,
    pub total: Decimal,
}

impl CartView {
    pub fn new(lines: Vec<CartLineView>) -> Self {
        let total = lines.iter().map(|l| l.subtotal).sum();
        Self { lines, total }
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ProductSnapshot {
    id: Uuid,
    price: Decimal,
    stock: i32,
}

pub(crate) fn line_subtotal(unit_price: Decimal, quantity: i32) -> Decimal {
    (unit_price * Decimal::from(quantity)).round_dp(2)
}

/// Rejects quantities the current stock cannot cover, carrying the remaining
/// count back to the user.
pub(crate) fn ensure_stock(requested: i32, stock: i32) -> Result<()> {
    if requested > stock {
        return Err(StoreError::StockExceeded { remaining: stock });
    }
    Ok(())
}

async fn active_product(db: &PgPool, product_id: Uuid) -> Result<ProductSnapshot> {
    sqlx::query_as::<_, ProductSnapshot>(
        "SELECT id, price, stock FROM products
         WHERE id = $1 AND is_active AND deleted_at IS NULL",
    )
    .bind(product_id)
    .fetch_optional(db)
    .await?
    .ok_or(StoreError::NotFound)
}

/// Adds `quantity` units of a product to the user's cart, merging with an
/// existing line for the same product. The merged quantity is validated
/// against stock before the write; on rejection the cart is untouched.
pub async fn add_item(
    db: &PgPool,
    user_id: Uuid,
    product_id: Uuid,
    quantity: i32,
) -> Result<CartLine> {
    if quantity < 1 {
        return Err(StoreError::Validation("quantity must be at least 1".into()));
    }
    let product = active_product(db, product_id).await?;

    let existing: Option<i32> =
        sqlx::query_scalar("SELECT quantity FROM cart_lines WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .fetch_optional(db)
            .await?;

    let target = existing.unwrap_or(0) + quantity;
    ensure_stock(target, product.stock)?;

    // The unique (user_id, product_id) index makes concurrent adds collapse
    // onto one row; last write wins on quantity.
    let line = sqlx::query_as::<_, CartLine>(
        "INSERT INTO cart_lines (id, user_id, product_id, quantity, unit_price, subtotal)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (user_id, product_id) DO UPDATE
             SET quantity = EXCLUDED.quantity,
                 unit_price = EXCLUDED.unit_price,
                 subtotal = EXCLUDED.subtotal,
                 updated_at = NOW()
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .bind(product_id)
    .bind(target)
    .bind(product.price)
    .bind(line_subtotal(product.price, target))
    .fetch_one(db)
    .await?;

    tracing::debug!(%user_id, %product_id, quantity = target, "cart line upserted");
    Ok(line)
}

/// Sets an existing line to an absolute quantity. The unit price is
/// re-snapshotted from the live product price, so a line updated after a
/// price change picks up the current price.
pub async fn update_quantity(
    db: &PgPool,
    user_id: Uuid,
    line_id: Uuid,
    quantity: i32,
) -> Result<CartLine> {
    if quantity < 1 {
        return Err(StoreError::Validation("quantity must be at least 1".into()));
    }

    // Scoped by owner: a line belonging to someone else looks identical to a
    // missing one. Lines on soft-deleted products read the same way, matching
    // the filtering in list_cart and checkout.
    let product = sqlx::query_as::<_, ProductSnapshot>(
        "SELECT p.id, p.price, p.stock FROM cart_lines c
         JOIN products p ON p.id = c.product_id AND p.deleted_at IS NULL
         WHERE c.id = $1 AND c.user_id = $2",
    )
    .bind(line_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?
    .ok_or(StoreError::NotFound)?;

    ensure_stock(quantity, product.stock)?;

    let line = sqlx::query_as::<_, CartLine>(
        "UPDATE cart_lines
         SET quantity = $3, unit_price = $4, subtotal = $5, updated_at = NOW()
         WHERE id = $1 AND user_id = $2
         RETURNING *",
    )
    .bind(line_id)
    .bind(user_id)
    .bind(quantity)
    .bind(product.price)
    .bind(line_subtotal(product.price, quantity))
    .fetch_one(db)
    .await?;

    Ok(line)
}

/// Ownership-scoped delete. Removing a line that is already gone (or was
/// never the caller's) reports `NotFound` and changes nothing.
pub async fn remove_item(db: &PgPool, user_id: Uuid, line_id: Uuid) -> Result<()> {
    let result = sqlx::query("DELETE FROM cart_lines WHERE id = $1 AND user_id = $2")
        .bind(line_id)
        .bind(user_id)
        .execute(db)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound);
    }
    Ok(())
}

/// Assembles the cart read model in one joined query. The inner join on
/// products drops lines whose product has since been deleted or archived,
/// mirroring the defensive filtering the storefront expects.
pub async fn list_cart(db: &PgPool, user_id: Uuid) -> Result<CartView> {
    let lines = sqlx::query_as::<_, CartLineView>(
        "SELECT c.id, c.quantity, c.unit_price, c.subtotal,
                p.id AS product_id, p.name AS product_name, p.price AS product_price,
                p.stock, p.weight_grams,
                (SELECT i.path FROM product_images i
                 WHERE i.product_id = p.id
                 ORDER BY i.is_thumbnail DESC, i.position ASC
                 LIMIT 1) AS thumbnail
         FROM cart_lines c
         JOIN products p ON p.id = c.product_id AND p.deleted_at IS NULL
         WHERE c.user_id = $1
         ORDER BY c.created_at",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;

    Ok(CartView::new(lines))
}

/// Number of lines in the user's cart, for the header badge.
pub async fn count_items(db: &PgPool, user_id: Uuid) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM cart_lines WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(db)
        .await?;
    Ok(count)
}
