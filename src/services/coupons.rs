use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use super::promotions::normalize_code;
use crate::{
    auth::AuthorizationContext,
    entities::{
        coupon::{self, DiscountType},
        product,
    },
    errors::ServiceError,
};

const DUPLICATE_CODE: &str = "Coupon code already exists";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateCouponRequest {
    #[validate(length(min = 3, max = 32, message = "Code must be 3-32 characters"))]
    pub code: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    #[serde(default)]
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[validate(range(min = 1, message = "Usage limit must be positive"))]
    pub usage_limit: Option<i32>,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCouponRequest {
    #[validate(length(min = 3, max = 32, message = "Code must be 3-32 characters"))]
    pub code: Option<String>,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    pub discount_type: Option<DiscountType>,
    pub discount_value: Option<Decimal>,
    pub min_purchase: Option<Decimal>,
    pub max_discount: Option<Decimal>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    #[validate(range(min = 1, message = "Usage limit must be positive"))]
    pub usage_limit: Option<i32>,
    pub applicable_products: Option<Vec<Uuid>>,
    pub is_active: Option<bool>,
}

/// Terms a coupon must satisfy on every write.
fn check_terms(
    discount_type: DiscountType,
    discount_value: Decimal,
    min_purchase: Decimal,
    max_discount: Option<Decimal>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
) -> Result<(), ServiceError> {
    if discount_value < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Discount value cannot be negative".to_string(),
        ));
    }
    if discount_type == DiscountType::Percentage && discount_value > Decimal::ONE_HUNDRED {
        return Err(ServiceError::ValidationError(
            "Percentage discount must be between 0 and 100".to_string(),
        ));
    }
    if min_purchase < Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Minimum purchase cannot be negative".to_string(),
        ));
    }
    if matches!(max_discount, Some(cap) if cap < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "Maximum discount cannot be negative".to_string(),
        ));
    }
    if end_date < start_date {
        return Err(ServiceError::ValidationError(
            "End date must not be before start date".to_string(),
        ));
    }
    Ok(())
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DatabaseConnection>,
}

impl CouponService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates a coupon for the caller's shop. Only verified sellers may
    /// publish coupons.
    #[instrument(skip(self, ctx, request), fields(code = %request.code))]
    pub async fn create_coupon(
        &self,
        ctx: &AuthorizationContext,
        request: CreateCouponRequest,
    ) -> Result<coupon::Model, ServiceError> {
        let shop_id = ctx.require_verified_seller()?;
        request.validate()?;

        let min_purchase = request.min_purchase.unwrap_or(Decimal::ZERO);
        check_terms(
            request.discount_type,
            request.discount_value,
            min_purchase,
            request.max_discount,
            request.start_date,
            request.end_date,
        )?;

        let code = normalize_code(&request.code);
        self.ensure_code_free(shop_id, &code, None).await?;
        self.ensure_products_in_shop(shop_id, &request.applicable_products)
            .await?;

        let now = Utc::now();
        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_id: Set(shop_id),
            code: Set(code),
            description: Set(request.description),
            discount_type: Set(request.discount_type),
            discount_value: Set(request.discount_value),
            min_purchase: Set(min_purchase),
            max_discount: Set(request.max_discount),
            start_date: Set(request.start_date),
            end_date: Set(request.end_date),
            usage_limit: Set(request.usage_limit),
            used_count: Set(0),
            applicable_products: Set(product_ids_json(&request.applicable_products)),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(self.db.as_ref())
        .await
        .map_err(|e| ServiceError::on_unique(e, DUPLICATE_CODE))?;

        info!(coupon_id = %model.id, %shop_id, "coupon created");
        Ok(model)
    }

    pub async fn list_coupons(
        &self,
        ctx: &AuthorizationContext,
    ) -> Result<Vec<coupon::Model>, ServiceError> {
        let shop_id = ctx.require_shop()?;
        Ok(coupon::Entity::find()
            .filter(coupon::Column::ShopId.eq(shop_id))
            .order_by_desc(coupon::Column::CreatedAt)
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn get_coupon(
        &self,
        ctx: &AuthorizationContext,
        coupon_id: Uuid,
    ) -> Result<coupon::Model, ServiceError> {
        let coupon = coupon::Entity::find_by_id(coupon_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;
        ctx.require_owner_of(coupon.shop_id)?;
        Ok(coupon)
    }

    /// Edits a coupon in place. Orders keep their own snapshot of the terms,
    /// so nothing historical changes.
    #[instrument(skip(self, ctx, request))]
    pub async fn update_coupon(
        &self,
        ctx: &AuthorizationContext,
        coupon_id: Uuid,
        request: UpdateCouponRequest,
    ) -> Result<coupon::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_coupon(ctx, coupon_id).await?;

        let discount_type = request.discount_type.unwrap_or(existing.discount_type);
        let discount_value = request.discount_value.unwrap_or(existing.discount_value);
        let min_purchase = request.min_purchase.unwrap_or(existing.min_purchase);
        let max_discount = request.max_discount.or(existing.max_discount);
        let start_date = request.start_date.unwrap_or(existing.start_date);
        let end_date = request.end_date.unwrap_or(existing.end_date);
        check_terms(
            discount_type,
            discount_value,
            min_purchase,
            max_discount,
            start_date,
            end_date,
        )?;

        let mut active: coupon::ActiveModel = existing.clone().into();
        if let Some(code) = request.code.as_deref().map(normalize_code) {
            if code != existing.code {
                self.ensure_code_free(existing.shop_id, &code, Some(existing.id))
                    .await?;
                active.code = Set(code);
            }
        }
        if let Some(ids) = &request.applicable_products {
            self.ensure_products_in_shop(existing.shop_id, ids).await?;
            active.applicable_products = Set(product_ids_json(ids));
        }
        if request.description.is_some() {
            active.description = Set(request.description);
        }
        if request.usage_limit.is_some() {
            active.usage_limit = Set(request.usage_limit);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        active.discount_type = Set(discount_type);
        active.discount_value = Set(discount_value);
        active.min_purchase = Set(min_purchase);
        active.max_discount = Set(max_discount);
        active.start_date = Set(start_date);
        active.end_date = Set(end_date);
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(self.db.as_ref())
            .await
            .map_err(|e| ServiceError::on_unique(e, DUPLICATE_CODE))?;
        info!(coupon_id = %updated.id, "coupon updated");
        Ok(updated)
    }

    pub async fn delete_coupon(
        &self,
        ctx: &AuthorizationContext,
        coupon_id: Uuid,
    ) -> Result<(), ServiceError> {
        let coupon = self.get_coupon(ctx, coupon_id).await?;
        coupon::Entity::delete_by_id(coupon.id)
            .exec(self.db.as_ref())
            .await?;
        info!(coupon_id = %coupon.id, "coupon deleted");
        Ok(())
    }

    async fn ensure_code_free(
        &self,
        shop_id: Uuid,
        code: &str,
        except: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        let mut query = coupon::Entity::find()
            .filter(coupon::Column::ShopId.eq(shop_id))
            .filter(coupon::Column::Code.eq(code));
        if let Some(id) = except {
            query = query.filter(coupon::Column::Id.ne(id));
        }
        if query.count(self.db.as_ref()).await? > 0 {
            return Err(ServiceError::Conflict(DUPLICATE_CODE.to_string()));
        }
        Ok(())
    }

    async fn ensure_products_in_shop(
        &self,
        shop_id: Uuid,
        product_ids: &[Uuid],
    ) -> Result<(), ServiceError> {
        let unique: HashSet<Uuid> = product_ids.iter().copied().collect();
        if unique.is_empty() {
            return Ok(());
        }
        let found = product::Entity::find()
            .filter(product::Column::ShopId.eq(shop_id))
            .filter(product::Column::Id.is_in(unique.iter().copied()))
            .count(self.db.as_ref())
            .await?;
        if found != unique.len() as u64 {
            return Err(ServiceError::ValidationError(
                "Applicable products must belong to your shop".to_string(),
            ));
        }
        Ok(())
    }
}

fn product_ids_json(ids: &[Uuid]) -> serde_json::Value {
    json!(ids.iter().map(Uuid::to_string).collect::<Vec<_>>())
}
