use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, patch, post},
    Router,
};
use uuid::Uuid;

use super::common::{created, Created};
use crate::{
    auth::{AuthRouterExt, AuthService, AuthorizationContext},
    entities::complaint,
    services::complaints::{
        ComplaintFilter, ComplaintPage, ComplaintQuery, DecideComplaintRequest,
        FileComplaintRequest, SellerEvidenceRequest,
    },
    ApiResponse, ApiResult, AppState,
};

const DEFAULT_COMPLAINT_PAGE_SIZE: u64 = 10;

pub fn complaints_routes(auth: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/", post(file_complaint).get(list_complaints))
        .route("/:id", get(get_complaint))
        .route("/:id/acknowledge", patch(acknowledge_complaint))
        .route("/:id/action", patch(decide_complaint))
        .route("/:id/seller-evidence", post(add_seller_evidence))
        .with_auth(auth)
}

pub async fn file_complaint(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Json(payload): Json<FileComplaintRequest>,
) -> Created<complaint::Model> {
    let complaint = state
        .services
        .complaints
        .file_complaint(&ctx, payload)
        .await?;
    Ok(created(complaint))
}

/// Filtered listing, scoped to what the caller may see.
pub async fn list_complaints(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Query(query): Query<ComplaintQuery>,
) -> ApiResult<ComplaintPage> {
    let filter = ComplaintFilter::parse(
        query,
        DEFAULT_COMPLAINT_PAGE_SIZE,
        state.config.max_page_size,
    )?;
    let page = state
        .services
        .complaints
        .list_complaints(&ctx, filter)
        .await?;
    Ok(Json(ApiResponse::success(page)))
}

pub async fn get_complaint(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<complaint::Model> {
    let complaint = state.services.complaints.get_complaint(&ctx, id).await?;
    Ok(Json(ApiResponse::success(complaint)))
}

pub async fn acknowledge_complaint(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<complaint::Model> {
    let complaint = state.services.complaints.acknowledge(&ctx, id).await?;
    Ok(Json(ApiResponse::success(complaint)))
}

pub async fn decide_complaint(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecideComplaintRequest>,
) -> ApiResult<complaint::Model> {
    let complaint = state.services.complaints.decide(&ctx, id, payload).await?;
    Ok(Json(ApiResponse::success(complaint)))
}

pub async fn add_seller_evidence(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<SellerEvidenceRequest>,
) -> ApiResult<complaint::Model> {
    let complaint = state
        .services
        .complaints
        .add_seller_evidence(&ctx, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(complaint)))
}
