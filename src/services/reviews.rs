use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthorizationContext,
    entities::{
        order::{self, OrderStatus},
        order_item, product, review, review_vote, shop,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const DUPLICATE_REVIEW: &str = "Already reviewed this product";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReviewRequest {
    pub product_id: Uuid,
    pub order_id: Uuid,
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i16,
    #[validate(length(min = 1, max = 2000, message = "Comment is required"))]
    pub comment: String,
    #[serde(default)]
    pub images: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReviewRequest {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: Option<i16>,
    #[validate(length(min = 1, max = 2000))]
    pub comment: Option<String>,
    pub images: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RespondToReviewRequest {
    #[validate(length(min = 1, max = 2000, message = "Response is required"))]
    pub response: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStats {
    pub average_rating: f64,
    pub total_reviews: u64,
    /// Counts for ratings 1 through 5.
    pub distribution: [u64; 5],
}

impl ReviewStats {
    pub fn from_ratings(ratings: &[i16]) -> Self {
        let mut distribution = [0u64; 5];
        for r in ratings {
            if (1..=5).contains(r) {
                distribution[(*r - 1) as usize] += 1;
            }
        }
        Self {
            average_rating: average_rating(ratings),
            total_reviews: ratings.len() as u64,
            distribution,
        }
    }
}

/// Result of toggling a helpful vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HelpfulVote {
    pub helpful_votes: i32,
    pub has_voted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductReviews {
    pub reviews: Vec<review::Model>,
    pub total: u64,
    pub stats: ReviewStats,
}

/// Mean rating rounded half-up to one decimal; zero when there are no reviews.
pub fn average_rating(ratings: &[i16]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    let sum: i64 = ratings.iter().map(|r| i64::from(*r)).sum();
    let mean = sum as f64 / ratings.len() as f64;
    (mean * 10.0).round() / 10.0
}

async fn ratings_where<C>(db: &C, column: review::Column, id: Uuid) -> Result<Vec<i16>, DbErr>
where
    C: ConnectionTrait,
{
    review::Entity::find()
        .select_only()
        .column(review::Column::Rating)
        .filter(column.eq(id))
        .into_tuple::<i16>()
        .all(db)
        .await
}

/// Row lock that serializes rating recomputes for one product. Callers run
/// inside the transaction that changed the reviews.
pub fn lock_product(product_id: Uuid) -> Select<product::Entity> {
    product::Entity::find_by_id(product_id).lock_exclusive()
}

pub fn lock_shop(shop_id: Uuid) -> Select<shop::Entity> {
    shop::Entity::find_by_id(shop_id).lock_exclusive()
}

pub async fn recompute_product_rating<C>(db: &C, product_id: Uuid) -> Result<f64, DbErr>
where
    C: ConnectionTrait,
{
    lock_product(product_id).one(db).await?;
    let rating = average_rating(&ratings_where(db, review::Column::ProductId, product_id).await?);
    product::Entity::update_many()
        .col_expr(product::Column::Rating, Expr::value(rating))
        .filter(product::Column::Id.eq(product_id))
        .exec(db)
        .await?;
    debug!(%product_id, rating, "product rating recomputed");
    Ok(rating)
}

pub async fn recompute_shop_rating<C>(db: &C, shop_id: Uuid) -> Result<f64, DbErr>
where
    C: ConnectionTrait,
{
    lock_shop(shop_id).one(db).await?;
    let rating = average_rating(&ratings_where(db, review::Column::ShopId, shop_id).await?);
    shop::Entity::update_many()
        .col_expr(shop::Column::Rating, Expr::value(rating))
        .filter(shop::Column::Id.eq(shop_id))
        .exec(db)
        .await?;
    debug!(%shop_id, rating, "shop rating recomputed");
    Ok(rating)
}

#[derive(Clone)]
pub struct ReviewService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReviewService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Accepts a review for a product of one of the caller's delivered orders.
    #[instrument(skip(self, ctx, request), fields(product_id = %request.product_id, order_id = %request.order_id))]
    pub async fn create_review(
        &self,
        ctx: &AuthorizationContext,
        request: CreateReviewRequest,
    ) -> Result<review::Model, ServiceError> {
        request.validate()?;
        let db = self.db.as_ref();

        let order = order::Entity::find_by_id(request.order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        if order.buyer_id != ctx.user_id() {
            return Err(ServiceError::Forbidden("Not authorized".to_string()));
        }
        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::ValidationError(
                "Can only review delivered orders".to_string(),
            ));
        }
        let contains_product = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .filter(order_item::Column::ProductId.eq(request.product_id))
            .count(db)
            .await?
            > 0;
        if !contains_product {
            return Err(ServiceError::ValidationError(
                "Product not in this order".to_string(),
            ));
        }

        let already = review::Entity::find()
            .filter(review::Column::ProductId.eq(request.product_id))
            .filter(review::Column::OrderId.eq(order.id))
            .filter(review::Column::BuyerId.eq(ctx.user_id()))
            .count(db)
            .await?;
        if already > 0 {
            return Err(ServiceError::Conflict(DUPLICATE_REVIEW.to_string()));
        }

        let now = Utc::now();
        let txn = db.begin().await?;
        let review = review::ActiveModel {
            id: Set(Uuid::new_v4()),
            product_id: Set(request.product_id),
            order_id: Set(order.id),
            buyer_id: Set(ctx.user_id()),
            shop_id: Set(order.shop_id),
            rating: Set(request.rating),
            comment: Set(request.comment.trim().to_string()),
            images: Set(json!(request.images)),
            seller_response: Set(None),
            responded_at: Set(None),
            helpful_votes: Set(0),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::on_unique(e, DUPLICATE_REVIEW))?;
        let (product_rating, shop_rating) =
            recompute_ratings(&txn, review.product_id, review.shop_id).await?;
        txn.commit().await?;

        info!(review_id = %review.id, rating = review.rating, "review created");
        self.publish_change(&review, product_rating, shop_rating)
            .await;
        Ok(review)
    }

    #[instrument(skip(self, ctx, request))]
    pub async fn update_review(
        &self,
        ctx: &AuthorizationContext,
        review_id: Uuid,
        request: UpdateReviewRequest,
    ) -> Result<review::Model, ServiceError> {
        request.validate()?;
        let existing = self.find_review(review_id).await?;
        if existing.buyer_id != ctx.user_id() {
            return Err(ServiceError::Forbidden("Not authorized".to_string()));
        }

        let mut active: review::ActiveModel = existing.into();
        if let Some(rating) = request.rating {
            active.rating = Set(rating);
        }
        if let Some(comment) = request.comment {
            active.comment = Set(comment.trim().to_string());
        }
        if let Some(images) = request.images {
            active.images = Set(json!(images));
        }
        active.updated_at = Set(Utc::now());

        let txn = self.db.begin().await?;
        let review = active.update(&txn).await?;
        let (product_rating, shop_rating) =
            recompute_ratings(&txn, review.product_id, review.shop_id).await?;
        txn.commit().await?;

        info!(review_id = %review.id, "review updated");
        self.publish_change(&review, product_rating, shop_rating)
            .await;
        Ok(review)
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_review(
        &self,
        ctx: &AuthorizationContext,
        review_id: Uuid,
    ) -> Result<(), ServiceError> {
        let review = self.find_review(review_id).await?;
        if review.buyer_id != ctx.user_id() && !ctx.is_admin() {
            return Err(ServiceError::Forbidden("Not authorized".to_string()));
        }

        let txn = self.db.begin().await?;
        review::Entity::delete_by_id(review.id).exec(&txn).await?;
        let (product_rating, shop_rating) =
            recompute_ratings(&txn, review.product_id, review.shop_id).await?;
        txn.commit().await?;

        info!(review_id = %review.id, "review deleted");
        self.publish_change(&review, product_rating, shop_rating)
            .await;
        Ok(())
    }

    /// Seller reply; the owner of the reviewed shop may set or replace it.
    pub async fn respond_to_review(
        &self,
        ctx: &AuthorizationContext,
        review_id: Uuid,
        request: RespondToReviewRequest,
    ) -> Result<review::Model, ServiceError> {
        request.validate()?;
        let existing = self.find_review(review_id).await?;
        ctx.require_owner_of(existing.shop_id)?;

        let now = Utc::now();
        let mut active: review::ActiveModel = existing.into();
        active.seller_response = Set(Some(request.response.trim().to_string()));
        active.responded_at = Set(Some(now));
        active.updated_at = Set(now);
        let review = active.update(self.db.as_ref()).await?;
        info!(review_id = %review.id, "seller responded to review");
        Ok(review)
    }

    pub async fn list_product_reviews(
        &self,
        product_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<ProductReviews, ServiceError> {
        let db = self.db.as_ref();
        let paginator = review::Entity::find()
            .filter(review::Column::ProductId.eq(product_id))
            .order_by_desc(review::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let reviews = paginator.fetch_page(page.saturating_sub(1)).await?;
        let ratings = ratings_where(db, review::Column::ProductId, product_id).await?;

        Ok(ProductReviews {
            reviews,
            total,
            stats: ReviewStats::from_ratings(&ratings),
        })
    }

    /// Newest first, across every product of the shop.
    pub async fn list_shop_reviews(
        &self,
        shop_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<review::Model>, u64), ServiceError> {
        let paginator = review::Entity::find()
            .filter(review::Column::ShopId.eq(shop_id))
            .order_by_desc(review::Column::CreatedAt)
            .paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let reviews = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((reviews, total))
    }

    /// Reviews written by the caller, newest first.
    pub async fn list_my_reviews(
        &self,
        ctx: &AuthorizationContext,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<review::Model>, u64), ServiceError> {
        let paginator = review::Entity::find()
            .filter(review::Column::BuyerId.eq(ctx.user_id()))
            .order_by_desc(review::Column::CreatedAt)
            .paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let reviews = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((reviews, total))
    }

    /// Toggles the caller's "helpful" vote. The vote row and the counter move
    /// together in one transaction.
    #[instrument(skip(self, ctx), fields(user_id = %ctx.user_id()))]
    pub async fn vote_review(
        &self,
        ctx: &AuthorizationContext,
        review_id: Uuid,
    ) -> Result<HelpfulVote, ServiceError> {
        let review = self.find_review(review_id).await?;
        let txn = self.db.begin().await?;

        let removed = review_vote::Entity::delete_many()
            .filter(review_vote::Column::ReviewId.eq(review.id))
            .filter(review_vote::Column::UserId.eq(ctx.user_id()))
            .exec(&txn)
            .await?
            .rows_affected
            > 0;

        if removed {
            review::Entity::update_many()
                .col_expr(
                    review::Column::HelpfulVotes,
                    Expr::col(review::Column::HelpfulVotes).sub(1),
                )
                .filter(review::Column::Id.eq(review.id))
                .filter(review::Column::HelpfulVotes.gt(0))
                .exec(&txn)
                .await?;
        } else {
            review_vote::ActiveModel {
                review_id: Set(review.id),
                user_id: Set(ctx.user_id()),
                created_at: Set(Utc::now()),
            }
            .insert(&txn)
            .await
            .map_err(|e| ServiceError::on_unique(e, "Vote already recorded"))?;
            review::Entity::update_many()
                .col_expr(
                    review::Column::HelpfulVotes,
                    Expr::col(review::Column::HelpfulVotes).add(1),
                )
                .filter(review::Column::Id.eq(review.id))
                .exec(&txn)
                .await?;
        }

        let helpful_votes = review::Entity::find_by_id(review.id)
            .select_only()
            .column(review::Column::HelpfulVotes)
            .into_tuple::<i32>()
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Review {} not found", review_id)))?;
        txn.commit().await?;

        info!(%review_id, helpful_votes, has_voted = !removed, "review vote toggled");
        Ok(HelpfulVote {
            helpful_votes,
            has_voted: !removed,
        })
    }

    async fn find_review(&self, review_id: Uuid) -> Result<review::Model, ServiceError> {
        review::Entity::find_by_id(review_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Review not found".to_string()))
    }

    async fn publish_change(&self, review: &review::Model, product_rating: f64, shop_rating: f64) {
        self.event_sender
            .publish(Event::ReviewChanged {
                product_id: review.product_id,
                shop_id: review.shop_id,
                product_rating,
                shop_rating,
            })
            .await;
    }
}

async fn recompute_ratings<C>(db: &C, product_id: Uuid, shop_id: Uuid) -> Result<(f64, f64), DbErr>
where
    C: ConnectionTrait,
{
    let product_rating = recompute_product_rating(db, product_id).await?;
    let shop_rating = recompute_shop_rating(db, shop_id).await?;
    Ok((product_rating, shop_rating))
}
