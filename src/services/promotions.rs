use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::{Condition, Expr},
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::entities::{
    coupon::{self, DiscountType},
    order::CouponSnapshot,
};
use crate::errors::ServiceError;

/// Why a coupon did not apply. These are values, not failures: order creation
/// degrades to full price when it sees one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CouponRejection {
    #[error("Coupon not found")]
    NotFound,
    #[error("Coupon is not active")]
    Inactive,
    #[error("Coupon has expired")]
    Expired,
    #[error("Coupon is not valid yet")]
    NotStarted,
    #[error("Coupon usage limit reached")]
    UsageLimitReached,
    #[error("Minimum purchase of {0} required")]
    MinPurchaseNotMet(Decimal),
    #[error("Coupon does not apply to the selected products")]
    ProductNotApplicable,
}

impl CouponRejection {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "COUPON_NOT_FOUND",
            Self::Inactive => "COUPON_INACTIVE",
            Self::Expired => "COUPON_EXPIRED",
            Self::NotStarted => "COUPON_NOT_STARTED",
            Self::UsageLimitReached => "USAGE_LIMIT_REACHED",
            Self::MinPurchaseNotMet(_) => "MIN_PURCHASE_NOT_MET",
            Self::ProductNotApplicable => "PRODUCT_NOT_APPLICABLE",
        }
    }
}

/// Price breakdown produced by a coupon that applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub discount: Decimal,
    pub final_price: Decimal,
}

/// A coupon that passed every check for a concrete purchase.
#[derive(Debug, Clone)]
pub struct AppliedCoupon {
    pub coupon: coupon::Model,
    pub evaluation: Evaluation,
}

impl AppliedCoupon {
    pub fn snapshot(&self) -> CouponSnapshot {
        CouponSnapshot {
            code: self.coupon.code.clone(),
            discount_type: self.coupon.discount_type,
            discount_value: self.coupon.discount_value,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CouponOutcome {
    Applied(AppliedCoupon),
    Rejected(CouponRejection),
}

/// Canonical form of a coupon code.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Checks `coupon` against a purchase and computes its discount. Checks run in
/// a fixed order and the first failure wins. Pure: no I/O, no clock.
pub fn evaluate(
    coupon: &coupon::Model,
    product_ids: &[Uuid],
    candidate_total: Decimal,
    now: DateTime<Utc>,
) -> Result<Evaluation, CouponRejection> {
    if !coupon.is_active {
        return Err(CouponRejection::Inactive);
    }
    if now < coupon.start_date {
        return Err(CouponRejection::NotStarted);
    }
    if now > coupon.end_date {
        return Err(CouponRejection::Expired);
    }
    if let Some(limit) = coupon.usage_limit {
        if coupon.used_count >= limit {
            return Err(CouponRejection::UsageLimitReached);
        }
    }
    if candidate_total < coupon.min_purchase {
        return Err(CouponRejection::MinPurchaseNotMet(coupon.min_purchase));
    }

    let applicable = coupon.applicable_product_ids();
    if !applicable.is_empty() && !product_ids.iter().any(|id| applicable.contains(id)) {
        return Err(CouponRejection::ProductNotApplicable);
    }

    let discount = compute_discount(
        coupon.discount_type,
        coupon.discount_value,
        coupon.max_discount,
        candidate_total,
    );
    Ok(Evaluation {
        discount,
        final_price: candidate_total - discount,
    })
}

/// Discount arithmetic. The result is never negative, never above the
/// percentage cap and never above `candidate_total`.
pub fn compute_discount(
    discount_type: DiscountType,
    discount_value: Decimal,
    max_discount: Option<Decimal>,
    candidate_total: Decimal,
) -> Decimal {
    let raw = match discount_type {
        DiscountType::Percentage => {
            let pct = (candidate_total * discount_value / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
            match max_discount {
                Some(cap) => pct.min(cap),
                None => pct,
            }
        }
        DiscountType::Fixed => discount_value,
    };

    raw.min(candidate_total).max(Decimal::ZERO)
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "Coupon code is required"))]
    pub code: String,
    pub shop_id: Uuid,
    #[validate(length(min = 1, message = "At least one product is required"))]
    pub product_ids: Vec<Uuid>,
    pub total_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponSummary {
    pub id: Uuid,
    pub code: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub max_discount: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CouponValidationResponse {
    pub valid: bool,
    pub discount: Decimal,
    pub final_price: Decimal,
    pub coupon: CouponSummary,
}

#[derive(Clone)]
pub struct PromotionService {
    db: Arc<DatabaseConnection>,
}

impl PromotionService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Looks up `code` in `shop_id` and evaluates it. Store failures are
    /// errors; every coupon-level problem comes back as `Rejected`.
    pub async fn evaluate_code<C>(
        db: &C,
        code: &str,
        shop_id: Uuid,
        product_ids: &[Uuid],
        candidate_total: Decimal,
        now: DateTime<Utc>,
    ) -> Result<CouponOutcome, DbErr>
    where
        C: ConnectionTrait,
    {
        let code = normalize_code(code);
        let found = coupon::Entity::find()
            .filter(coupon::Column::ShopId.eq(shop_id))
            .filter(coupon::Column::Code.eq(code.as_str()))
            .one(db)
            .await?;

        let Some(coupon) = found else {
            debug!(%shop_id, code = %code, "coupon not found");
            return Ok(CouponOutcome::Rejected(CouponRejection::NotFound));
        };

        Ok(match evaluate(&coupon, product_ids, candidate_total, now) {
            Ok(evaluation) => CouponOutcome::Applied(AppliedCoupon { coupon, evaluation }),
            Err(rejection) => {
                debug!(coupon_id = %coupon.id, reason = rejection.code(), "coupon rejected");
                CouponOutcome::Rejected(rejection)
            }
        })
    }

    /// Consumes one use of the coupon with a single guarded UPDATE. Returns
    /// `false` when the guard fails (limit hit, deactivated or gone).
    pub async fn redeem<C>(db: &C, coupon_id: Uuid) -> Result<bool, DbErr>
    where
        C: ConnectionTrait,
    {
        let result = coupon::Entity::update_many()
            .col_expr(
                coupon::Column::UsedCount,
                Expr::col(coupon::Column::UsedCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(coupon_id))
            .filter(coupon::Column::IsActive.eq(true))
            .filter(
                Condition::any()
                    .add(coupon::Column::UsageLimit.is_null())
                    .add(
                        Expr::col(coupon::Column::UsedCount)
                            .lt(Expr::col(coupon::Column::UsageLimit)),
                    ),
            )
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            warn!(%coupon_id, "coupon redemption lost: usage limit reached");
            return Ok(false);
        }
        info!(%coupon_id, "coupon redeemed");
        Ok(true)
    }

    /// Read-only coupon check for checkout previews. No usage is consumed.
    #[instrument(skip(self, request), fields(shop_id = %request.shop_id))]
    pub async fn validate_coupon(
        &self,
        request: ValidateCouponRequest,
    ) -> Result<CouponValidationResponse, ServiceError> {
        request.validate()?;
        if request.total_price < Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "totalPrice cannot be negative".to_string(),
            ));
        }

        let outcome = Self::evaluate_code(
            self.db.as_ref(),
            &request.code,
            request.shop_id,
            &request.product_ids,
            request.total_price,
            Utc::now(),
        )
        .await?;

        match outcome {
            CouponOutcome::Applied(applied) => Ok(CouponValidationResponse {
                valid: true,
                discount: applied.evaluation.discount,
                final_price: applied.evaluation.final_price,
                coupon: CouponSummary {
                    id: applied.coupon.id,
                    code: applied.coupon.code,
                    discount_type: applied.coupon.discount_type,
                    discount_value: applied.coupon.discount_value,
                    max_discount: applied.coupon.max_discount,
                },
            }),
            CouponOutcome::Rejected(rejection) => Err(ServiceError::Coupon(rejection)),
        }
    }
}
