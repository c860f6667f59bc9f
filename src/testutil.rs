//! Seed helpers for database-backed tests.

use rust_decimal::Decimal;
use sqlx::PgPool;
use uuid::Uuid;

pub(crate) async fn seed_user(db: &PgPool) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO users (id, name, email) VALUES ($1, $2, $3)")
        .bind(id)
        .bind("Test User")
        .bind(format!("{id}@example.com"))
        .execute(db)
        .await
        .unwrap();
    id
}

pub(crate) async fn seed_product(db: &PgPool, price: &str, stock: i32) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO products (id, code, name, price, stock, weight_grams)
         VALUES ($1, $2, $3, $4, $5, 500)",
    )
    .bind(id)
    .bind(format!("PRD-{id}"))
    .bind("Widget")
    .bind(price.parse::<Decimal>().unwrap())
    .bind(stock)
    .execute(db)
    .await
    .unwrap();
    id
}

pub(crate) async fn seed_customer(db: &PgPool, user_id: Uuid) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query("INSERT INTO customers (id, user_id, phone) VALUES ($1, $2, '0800000000')")
        .bind(id)
        .bind(user_id)
        .execute(db)
        .await
        .unwrap();
    id
}

pub(crate) async fn seed_address(db: &PgPool, customer_id: Uuid) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO customer_addresses
             (id, customer_id, label, recipient, phone, province_id, province,
              city_id, city, postal_code, street, is_primary)
         VALUES ($1, $2, 'Home', 'Test User', '0800000000', 9, 'Banten',
                 152, 'Cilegon', '42411', 'Jl. Test 1', TRUE)",
    )
    .bind(id)
    .bind(customer_id)
    .execute(db)
    .await
    .unwrap();
    id
}

pub(crate) async fn seed_order(
    db: &PgPool,
    user_id: Uuid,
    customer_id: Uuid,
    address_id: Uuid,
    order_number: &str,
) -> Uuid {
    let id = Uuid::now_v7();
    sqlx::query(
        "INSERT INTO orders (id, order_number, user_id, customer_id, shipping_address_id,
                             order_date, goods_total, shipping_cost, grand_total)
         VALUES ($1, $2, $3, $4, $5, CURRENT_DATE, 0, 0, 0)",
    )
    .bind(id)
    .bind(order_number)
    .bind(user_id)
    .bind(customer_id)
    .bind(address_id)
    .execute(db)
    .await
    .unwrap();
    id
}
