use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::common::{created, Created, StatusListQuery};
use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    entities::order::OrderStatus,
    errors::ServiceError,
    services::{
        order_status::parse_status,
        orders::{CreateOrderRequest, OrderDetails},
        Page,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

pub fn orders_routes(auth: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/", post(create_order))
        .route("/mine", get(list_my_orders))
        .route("/shop", get(list_shop_orders))
        .route("/:id", get(get_order))
        .route("/:id/status", patch(update_order_status))
        .route("/:id/cancel", patch(cancel_order))
        .with_auth(auth)
}

fn status_filter(query: &StatusListQuery) -> Result<Option<OrderStatus>, ServiceError> {
    query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_status)
        .transpose()
}

pub async fn create_order(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Json(payload): Json<CreateOrderRequest>,
) -> Created<OrderDetails> {
    let order = state.services.orders.create_order(&ctx, payload).await?;
    info!(order_id = %order.order.id, "order placed");
    Ok(created(order))
}

pub async fn list_my_orders(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Query(query): Query<StatusListQuery>,
) -> ApiResult<Page<OrderDetails>> {
    let status = status_filter(&query)?;
    let (page, limit) = query.pagination().resolve(&state.config);
    let (orders, total) = state
        .services
        .orders
        .list_my_orders(&ctx, status, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(orders, total, page, limit))))
}

pub async fn list_shop_orders(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Query(query): Query<StatusListQuery>,
) -> ApiResult<Page<OrderDetails>> {
    let status = status_filter(&query)?;
    let (page, limit) = query.pagination().resolve(&state.config);
    let (orders, total) = state
        .services
        .orders
        .list_shop_orders(&ctx, status, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(orders, total, page, limit))))
}

pub async fn get_order(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    let order = state.services.orders.get_order(&ctx, id).await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateOrderStatusRequest>,
) -> ApiResult<OrderDetails> {
    let status = parse_status(&payload.status)?;
    let order = state
        .services
        .orders
        .update_status(&ctx, id, status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

pub async fn cancel_order(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<OrderDetails> {
    let order = state.services.orders.cancel_order(&ctx, id).await?;
    Ok(Json(ApiResponse::success(order)))
}
