use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use uuid::Uuid;

use super::common::{created, no_content, Created, PaginationParams};
use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    entities::product,
    errors::ServiceError,
    services::{
        products::{AdjustStockRequest, CreateProductRequest, UpdateProductRequest},
        reviews::ProductReviews,
    },
    ApiResponse, ApiResult, AppState,
};

/// Creates the router for product endpoints
pub fn products_routes(auth: Arc<AuthService>) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_product))
        .route("/:id", patch(update_product).delete(delete_product))
        .route("/:id/stock", patch(adjust_stock))
        .with_auth(auth);

    Router::new()
        .route("/:id", get(get_product))
        .route("/:id/reviews", get(list_product_reviews))
        .merge(protected)
}

pub async fn create_product(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Json(payload): Json<CreateProductRequest>,
) -> Created<product::Model> {
    let product = state.services.products.create_product(&ctx, payload).await?;
    Ok(created(product))
}

pub async fn get_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<product::Model> {
    let product = state.services.products.get_product(id).await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateProductRequest>,
) -> ApiResult<product::Model> {
    let product = state
        .services
        .products
        .update_product(&ctx, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn adjust_stock(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustStockRequest>,
) -> ApiResult<product::Model> {
    let product = state
        .services
        .products
        .adjust_stock(&ctx, id, payload.delta)
        .await?;
    Ok(Json(ApiResponse::success(product)))
}

pub async fn delete_product(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.products.delete_product(&ctx, id).await?;
    Ok(no_content())
}

pub async fn list_product_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<ProductReviews> {
    let (page, limit) = params.resolve(&state.config);
    let reviews = state
        .services
        .reviews
        .list_product_reviews(id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(reviews)))
}
