use std::sync::Arc;

use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};

use super::common::StatusListQuery;
use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    services::{
        admin::{PlatformStats, SellerFilter, SellerSummary},
        Page,
    },
    ApiResponse, ApiResult, AppState,
};

pub fn admin_routes(auth: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/stats", get(platform_stats))
        .route("/sellers", get(list_sellers))
        .with_auth(auth)
}

pub async fn platform_stats(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
) -> ApiResult<PlatformStats> {
    let stats = state.services.admin.platform_stats(&ctx).await?;
    Ok(Json(ApiResponse::success(stats)))
}

/// `?status=pending|verified|all`
pub async fn list_sellers(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Query(query): Query<StatusListQuery>,
) -> ApiResult<Page<SellerSummary>> {
    let filter = SellerFilter::parse(query.status.as_deref())?;
    let (page, limit) = query.pagination().resolve(&state.config);
    let (sellers, total) = state
        .services
        .admin
        .list_sellers(&ctx, filter, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(
        sellers, total, page, limit,
    ))))
}
