//! HTTP surface: JSON API routes and request DTOs.
//!
//! The acting user arrives as an `x-user-id` header resolved by the session
//! layer in front of this service; the extractor turns it into an explicit
//! identity passed into every cart and checkout call.

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::{request::Parts, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;
use validator::Validate;

use crate::cart;
use crate::checkout::{self, ConfirmRequest, QuoteRequest};
use crate::error::{Result, StoreError};
use crate::order;
use crate::shipping::Courier;
use crate::AppState;

#[derive(Debug, Clone, Copy)]
pub struct AuthUser(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> std::result::Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .map(AuthUser)
            .ok_or((
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "missing or invalid x-user-id header" })),
            ))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/health",
            get(|| async { Json(serde_json::json!({ "status": "healthy", "service": "storefront" })) }),
        )
        .route("/api/v1/cart", get(get_cart).post(add_to_cart))
        .route("/api/v1/cart/count", get(cart_count))
        .route("/api/v1/cart/:id", axum::routing::put(update_cart_line).delete(remove_cart_line))
        .route("/api/v1/checkout", get(checkout_page).post(confirm_checkout))
        .route("/api/v1/checkout/rates", post(quote_rates))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/orders/:id", get(order_detail))
        .route("/api/v1/shipping/provinces", get(provinces))
        .route("/api/v1/shipping/cities", get(cities))
        .route("/api/v1/shipping/subdistricts", get(subdistricts))
        .route("/api/v1/shipping/track", post(track_shipment))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn validated<T: Validate>(req: T) -> Result<T> {
    req.validate().map_err(|e| StoreError::Validation(e.to_string()))?;
    Ok(req)
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddToCartRequest {
    pub product_id: Uuid,
    #[validate(range(min = 1))]
    pub quantity: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCartRequest {
    #[validate(range(min = 1))]
    pub quantity: i32,
}

async fn get_cart(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> Result<impl IntoResponse> {
    let view = cart::list_cart(&state.db, user_id).await?;
    Ok(Json(view))
}

async fn add_to_cart(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<AddToCartRequest>,
) -> Result<impl IntoResponse> {
    let req = validated(req)?;
    let line = cart::add_item(&state.db, user_id, req.product_id, req.quantity).await?;
    Ok((StatusCode::CREATED, Json(line)))
}

async fn update_cart_line(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(line_id): Path<Uuid>,
    Json(req): Json<UpdateCartRequest>,
) -> Result<impl IntoResponse> {
    let req = validated(req)?;
    let line = cart::update_quantity(&state.db, user_id, line_id, req.quantity).await?;
    Ok(Json(line))
}

async fn remove_cart_line(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(line_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    cart::remove_item(&state.db, user_id, line_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn cart_count(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> Result<impl IntoResponse> {
    let count = cart::count_items(&state.db, user_id).await?;
    Ok(Json(serde_json::json!({ "count": count })))
}

async fn list_orders(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> Result<impl IntoResponse> {
    let orders = order::list_for_user(&state.db, user_id).await?;
    Ok(Json(orders))
}

async fn order_detail(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let detail = order::detail(&state.db, user_id, order_id).await?;
    Ok(Json(detail))
}

async fn checkout_page(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<impl IntoResponse> {
    let page = checkout::load(&state, user_id).await?;
    Ok(Json(page))
}

async fn quote_rates(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<QuoteRequest>,
) -> Result<impl IntoResponse> {
    let req = validated(req)?;
    let quotes = checkout::quote(&state, user_id, &req).await?;
    Ok(Json(quotes))
}

async fn confirm_checkout(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(req): Json<ConfirmRequest>,
) -> Result<impl IntoResponse> {
    let req = validated(req)?;
    let order = checkout::confirm(&state, user_id, &req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[derive(Debug, Deserialize)]
pub struct CitiesParams {
    pub province: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct SubdistrictsParams {
    pub city: u32,
}

async fn provinces(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(state.rates.provinces().await?))
}

async fn cities(
    State(state): State<AppState>,
    Query(params): Query<CitiesParams>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.rates.cities(params.province).await?))
}

async fn subdistricts(
    State(state): State<AppState>,
    Query(params): Query<SubdistrictsParams>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.rates.subdistricts(params.city).await?))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TrackRequest {
    #[validate(length(min = 1))]
    pub waybill: String,
    pub courier: Courier,
}

async fn track_shipment(
    State(state): State<AppState>,
    Json(req): Json<TrackRequest>,
) -> Result<impl IntoResponse> {
    let req = validated(req)?;
    Ok(Json(state.rates.track(&req.waybill, req.courier).await?))
}
