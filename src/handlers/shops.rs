use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created, Created, PaginationParams};
use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    entities::{product, review, shop},
    services::{
        shops::{CreateShopRequest, UpdateShopRequest},
        Page,
    },
    ApiResponse, ApiResult, AppState,
};

pub fn shops_routes(auth: Arc<AuthService>) -> Router<AppState> {
    let protected = Router::new()
        .route("/", post(create_shop))
        .route("/me", get(get_my_shop))
        .route("/:id", axum::routing::patch(update_shop))
        .with_auth(auth);

    Router::new()
        .route("/:id", get(get_shop))
        .route("/:id/products", get(list_shop_products))
        .route("/:id/reviews", get(list_shop_reviews))
        .merge(protected)
}

pub async fn create_shop(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Json(payload): Json<CreateShopRequest>,
) -> Created<shop::Model> {
    let shop = state.services.shops.create_shop(&ctx, payload).await?;
    Ok(created(shop))
}

pub async fn get_my_shop(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
) -> ApiResult<shop::Model> {
    let shop = state.services.shops.get_my_shop(&ctx).await?;
    Ok(Json(ApiResponse::success(shop)))
}

pub async fn get_shop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<shop::Model> {
    let shop = state.services.shops.get_shop(id).await?;
    Ok(Json(ApiResponse::success(shop)))
}

pub async fn update_shop(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateShopRequest>,
) -> ApiResult<shop::Model> {
    let shop = state.services.shops.update_shop(&ctx, id, payload).await?;
    Ok(Json(ApiResponse::success(shop)))
}

pub async fn list_shop_products(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Page<product::Model>> {
    let (page, limit) = params.resolve(&state.config);
    let (products, total) = state
        .services
        .products
        .list_shop_products(id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(
        products, total, page, limit,
    ))))
}

pub async fn list_shop_reviews(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Page<review::Model>> {
    let (page, limit) = params.resolve(&state.config);
    let (reviews, total) = state
        .services
        .reviews
        .list_shop_reviews(id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(
        reviews, total, page, limit,
    ))))
}
