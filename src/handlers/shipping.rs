use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::Json,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    services::shipping::ShippingLabel,
    ApiResponse, ApiResult, AppState,
};

pub fn shipping_routes(auth: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/label/:order_id", get(get_label))
        .with_auth(auth)
}

/// Label for an order of the caller's shop.
pub async fn get_label(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(order_id): Path<Uuid>,
) -> ApiResult<ShippingLabel> {
    let label = state.services.shipping.get_label(&ctx, order_id).await?;
    Ok(Json(ApiResponse::success(label)))
}
