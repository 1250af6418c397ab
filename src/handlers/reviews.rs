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
    entities::review,
    errors::ServiceError,
    services::{
        reviews::{CreateReviewRequest, HelpfulVote, RespondToReviewRequest, UpdateReviewRequest},
        Page,
    },
    ApiResponse, ApiResult, AppState,
};

/// Review writes and the caller's own reviews. Public listings live under
/// `/products/:id/reviews` and `/shops/:id/reviews`.
pub fn reviews_routes(auth: Arc<AuthService>) -> Router<AppState> {
    Router::new()
        .route("/", post(create_review))
        .route("/mine", get(list_my_reviews))
        .route("/:id/vote", post(vote_review))
        .route("/:id", patch(update_review).delete(delete_review))
        .route("/:id/response", post(respond_to_review))
        .with_auth(auth)
}

pub async fn create_review(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Json(payload): Json<CreateReviewRequest>,
) -> Created<review::Model> {
    let review = state.services.reviews.create_review(&ctx, payload).await?;
    Ok(created(review))
}

pub async fn update_review(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateReviewRequest>,
) -> ApiResult<review::Model> {
    let review = state
        .services
        .reviews
        .update_review(&ctx, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(review)))
}

pub async fn delete_review(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ServiceError> {
    state.services.reviews.delete_review(&ctx, id).await?;
    Ok(no_content())
}

pub async fn respond_to_review(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
    Json(payload): Json<RespondToReviewRequest>,
) -> ApiResult<review::Model> {
    let review = state
        .services
        .reviews
        .respond_to_review(&ctx, id, payload)
        .await?;
    Ok(Json(ApiResponse::success(review)))
}

pub async fn list_my_reviews(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Page<review::Model>> {
    let (page, limit) = params.resolve(&state.config);
    let (reviews, total) = state
        .services
        .reviews
        .list_my_reviews(&ctx, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(Page::new(
        reviews, total, page, limit,
    ))))
}

/// Toggles the caller's "helpful" vote.
pub async fn vote_review(
    State(state): State<AppState>,
    ctx: AuthorizationContext,
    Path(id): Path<Uuid>,
) -> ApiResult<HelpfulVote> {
    let vote = state.services.reviews.vote_review(&ctx, id).await?;
    Ok(Json(ApiResponse::success(vote)))
}
