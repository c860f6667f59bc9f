//! Order, order item and shipment records, plus the pure pricing and
//! numbering rules checkout relies on.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    AwaitingPayment,
    Processing,
    Shipped,
    Completed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingPayment => "awaiting_payment",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipmentStatus {
    Pending,
    Packed,
    Shipped,
    InTransit,
    Delivered,
    Failed,
}

impl ShipmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Packed => "packed",
            Self::Shipped => "shipped",
            Self::InTransit => "in_transit",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub customer_id: Uuid,
    pub shipping_address_id: Uuid,
    pub order_date: NaiveDate,
    pub goods_total: Decimal,
    pub shipping_cost: Decimal,
    pub grand_total: Decimal,
    pub status: String,
    pub payment_method: Option<String>,
    pub payment_status: String,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_code: String,
    pub image: Option<String>,
    pub quantity: i32,
    pub original_price: Decimal,
    pub discount_percent: Decimal,
    pub discount_amount: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Shipment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub address_id: Uuid,
    pub courier_code: String,
    pub courier_name: String,
    pub service_code: String,
    pub service_name: String,
    pub service_description: Option<String>,
    pub weight_grams: i32,
    pub cost: Decimal,
    pub etd: Option<String>,
    pub tracking_number: Option<String>,
    pub status: String,
}

/// An order with its frozen line items and shipment record.
#[derive(Debug, Serialize)]
pub struct OrderDetail {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub shipment: Option<Shipment>,
}

/// The user's order history, newest first.
pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> Result<Vec<Order>> {
    let orders = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(orders)
}

/// One order with items and shipment, scoped to its owner. A foreign order
/// id reads as `NotFound`.
pub async fn detail(db: &PgPool, user_id: Uuid, order_id: Uuid) -> Result<OrderDetail> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or(StoreError::NotFound)?;

    // The v7 ids are generated in cart order; created_at ties for every item
    // inserted in the same transaction.
    let items = sqlx::query_as::<_, OrderItem>(
        "SELECT * FROM order_items WHERE order_id = $1 ORDER BY id",
    )
    .bind(order.id)
    .fetch_all(db)
    .await?;

    let shipment = sqlx::query_as::<_, Shipment>("SELECT * FROM shipments WHERE order_id = $1")
        .bind(order.id)
        .fetch_optional(db)
        .await?;

    Ok(OrderDetail { order, items, shipment })
}

/// Priced snapshot of one line at order time. Frozen into `order_items` so
/// later catalog changes cannot reprice a placed order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinePricing {
    pub original: Decimal,
    pub discount: Decimal,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Computes a line's totals from unit price, quantity and an optional
/// discount (percent takes precedence over nominal). The discount never
/// exceeds the undiscounted line value.
pub fn price_line(
    unit_price: Decimal,
    quantity: i32,
    discount_percent: Decimal,
    discount_nominal: Decimal,
) -> LinePricing {
    let original = (unit_price * Decimal::from(quantity)).round_dp(2);
    let discount = if discount_percent > Decimal::ZERO {
        (original * discount_percent / Decimal::from(100)).round_dp(2)
    } else {
        discount_nominal
    };
    let discount = discount.min(original);
    LinePricing {
        original,
        discount,
        unit_price,
        subtotal: original - discount,
    }
}

/// Highest order number issued under a day prefix, looked up inside the same
/// transaction that inserts the next order. Longer numbers sort first so a
/// day whose sequence grew past 9999 keeps counting up instead of getting
/// stuck behind the lexicographically larger 4-digit suffix.
pub(crate) async fn last_number_for_day<'e>(
    executor: impl sqlx::PgExecutor<'e>,
    prefix: &str,
) -> Result<Option<String>> {
    let last = sqlx::query_scalar(
        "SELECT order_number FROM orders
         WHERE order_number LIKE $1 || '%'
         ORDER BY LENGTH(order_number) DESC, order_number DESC
         LIMIT 1",
    )
    .bind(prefix)
    .fetch_optional(executor)
    .await?;
    Ok(last)
}

/// Date-prefixed order number: `INV` + YYYYMMDD + 4-digit sequence. The
/// sequence continues from the highest number already issued that day, so the
/// caller passes today's last order number (if any), looked up inside the
/// same transaction that inserts the order.
pub fn next_order_number(date: NaiveDate, last_for_day: Option<&str>) -> String {
    let prefix = format!("INV{}", date.format("%Y%m%d"));
    let next = last_for_day
        .and_then(|n| n.strip_prefix(prefix.as_str()))
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .map(|n| n + 1)
        .unwrap_or(1);
    format!("{prefix}{next:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn first_order_of_the_day_is_0001() {
        assert_eq!(next_order_number(day(2025, 6, 7), None), "INV202506070001");
    }

    #[test]
    fn sequence_increments_from_last() {
        let n = next_order_number(day(2025, 6, 7), Some("INV202506070042"));
        assert_eq!(n, "INV202506070043");
    }

    #[test]
    fn sequence_resets_across_days() {
        // Yesterday's number does not share today's prefix, so it is ignored.
        let n = next_order_number(day(2025, 6, 8), Some("INV202506070042"));
        assert_eq!(n, "INV202506080001");
    }

    #[test]
    fn sequence_survives_four_digit_rollover() {
        let n = next_order_number(day(2025, 6, 7), Some("INV202506079999"));
        assert_eq!(n, "INV2025060710000");
    }

    #[test]
    fn line_without_discount() {
        let p = price_line(dec("25000.00"), 3, Decimal::ZERO, Decimal::ZERO);
        assert_eq!(p.original, dec("75000.00"));
        assert_eq!(p.discount, Decimal::ZERO);
        assert_eq!(p.subtotal, dec("75000.00"));
    }

    #[test]
    fn percent_discount_applies_to_line_value() {
        let p = price_line(dec("100.00"), 2, dec("10"), Decimal::ZERO);
        assert_eq!(p.discount, dec("20.00"));
        assert_eq!(p.subtotal, dec("180.00"));
    }

    #[test]
    fn nominal_discount_is_capped_at_line_value() {
        let p = price_line(dec("10.00"), 1, Decimal::ZERO, dec("25.00"));
        assert_eq!(p.discount, dec("10.00"));
        assert_eq!(p.subtotal, Decimal::ZERO);
    }

    #[test]
    fn percent_takes_precedence_over_nominal() {
        let p = price_line(dec("100.00"), 1, dec("5"), dec("50.00"));
        assert_eq!(p.discount, dec("5.00"));
    }

    #[test]
    fn status_strings_match_schema_defaults() {
        assert_eq!(OrderStatus::AwaitingPayment.as_str(), "awaiting_payment");
        assert_eq!(ShipmentStatus::Pending.as_str(), "pending");
    }

    #[sqlx::test]
    async fn day_lookup_sequences_past_four_digits(pool: PgPool) {
        let user = crate::testutil::seed_user(&pool).await;
        let customer = crate::testutil::seed_customer(&pool, user).await;
        let address = crate::testutil::seed_address(&pool, customer).await;
        crate::testutil::seed_order(&pool, user, customer, address, "INV202506079999").await;
        crate::testutil::seed_order(&pool, user, customer, address, "INV2025060710000").await;

        let last = last_number_for_day(&pool, "INV20250607").await.unwrap();
        assert_eq!(last.as_deref(), Some("INV2025060710000"));
        assert_eq!(
            next_order_number(day(2025, 6, 7), last.as_deref()),
            "INV2025060710001"
        );
    }
}
