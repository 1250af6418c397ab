use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use super::common::{created, no_content, Created};
use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    entities::coupon,
    errors::ServiceError,
    services::{
        coupons::{CreateCouponRequest, UpdateCouponRequest},
        promotions::{CouponValidationResponse, ValidateCouponRequest},
    },
    ApiResponse, ApiResult, AppState,
};

pub fn coupons_routes(auth: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/", post(create_coupon).get(list_coupons))
        .route("/validate", post(validate_coupon))
        .route(
            "/:id",
            get(get_coupon).patch(update_coupon).delete(delete_coupon),
        )
        .with_auth(auth)
}

pub async fn create_coupon(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Json(payload): Json<CreateCouponRequest>,
) -> Created<coupon::Model> {
    let coupon = state.services.coupons.create_coupon(&ctx, payload).await?;
    Ok(created(coupon))
}

pub async fn list_coupons(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
) -> ApiResult<Vec<coupon::Model>> {
    let coupons = state.services.coupons.list_coupons(&ctx).await?;
    Ok(Json(ApiResponse::success(coupons)))
}

/// Checkout preview: evaluates a code without consuming a use.
pub async fn validate_coupon(
    State(state): State<AppState>,
    _ctx: AuthorizationContext,
    Json(payload): Json<ValidateCouponRequest>,
) -> ApiResult<CouponValidationResponse> {
    let result = state.services.promotions.validate_coupon(payload).await?;
    Ok(Json(ApiResponse::success(result)))
}

pub async fn get_coupon(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<coupon::Model> {
    let coupon = state.services.coupons.get_coupon(&ctx, id).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

pub async fn update_coupon(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateCouponRequest>,
) -> ApiResult<coupon::Model> {
    let coupon = state
        .services
        .coupons
        .update_coupon(&ctx, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(coupon)))
}

pub async fn delete_coupon(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.coupons.delete_coupon(&ctx, id).await?;
    Ok(no_content())
}
