use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::reviews::recompute_shop_rating;
use crate::{
    auth::AuthorizationContext,
    entities::{product, shop},
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateProductRequest {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub price: Decimal,
    pub original_price: Option<Decimal>,
    #[validate(range(min = 0, max = 100, message = "Discount must be between 0 and 100"))]
    #[serde(default)]
    pub discount: i32,
    pub category: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i32,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    pub price: Option<Decimal>,
    pub original_price: Option<Decimal>,
    #[validate(range(min = 0, max = 100, message = "Discount must be between 0 and 100"))]
    pub discount: Option<i32>,
    pub category: Option<String>,
    pub images: Option<Vec<String>>,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: Option<i32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustStockRequest {
    pub delta: i32,
}

/// How a stock write changes the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockChange {
    Set(i32),
    Delta(i32),
}

pub fn is_active_for(stock: i32) -> bool {
    stock > 0
}

/// The only place `stock` is written after creation. `is_active` is derived
/// in the same statement and the guard keeps stock from going negative.
/// Returns `false` when no row matched.
pub async fn write_stock<C>(db: &C, product_id: Uuid, change: StockChange) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
{
    let mut update = product::Entity::update_many()
        .col_expr(product::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(product::Column::Id.eq(product_id));

    update = match change {
        StockChange::Set(stock) => update
            .col_expr(product::Column::Stock, Expr::value(stock))
            .col_expr(product::Column::IsActive, Expr::value(is_active_for(stock))),
        StockChange::Delta(delta) => update
            .col_expr(
                product::Column::Stock,
                Expr::col(product::Column::Stock).add(delta),
            )
            .col_expr(
                product::Column::IsActive,
                Expr::expr(Expr::col(product::Column::Stock).add(delta)).gt(0),
            )
            .filter(Expr::expr(Expr::col(product::Column::Stock).add(delta)).gte(0)),
    };

    Ok(update.exec(db).await?.rows_affected > 0)
}

/// `totalProducts` counter maintained with atomic guarded increments.
async fn bump_total_products<C>(db: &C, shop_id: Uuid, delta: i32) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let mut update = shop::Entity::update_many()
        .col_expr(
            shop::Column::TotalProducts,
            Expr::col(shop::Column::TotalProducts).add(delta),
        )
        .filter(shop::Column::Id.eq(shop_id));
    if delta < 0 {
        update = update.filter(shop::Column::TotalProducts.gte(-delta));
    }
    let result = update.exec(db).await?;
    if result.rows_affected == 0 {
        warn!(%shop_id, delta, "shop product counter not adjusted");
    }
    Ok(())
}

#[derive(Clone)]
pub struct ProductService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ProductService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Lists a product in the caller's shop. Verification-gated.
    #[instrument(skip(self, ctx, request), fields(title = %request.title))]
    pub async fn create_product(
        &self,
        ctx: &AuthorizationContext,
        request: CreateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        let shop_id = ctx.require_verified_seller()?;
        request.validate()?;
        check_prices(request.price, request.original_price)?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let product = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_id: Set(shop_id),
            title: Set(request.title.trim().to_string()),
            description: Set(request.description),
            price: Set(request.price),
            original_price: Set(request.original_price.unwrap_or(request.price)),
            discount: Set(request.discount),
            category: Set(request.category),
            images: Set(json!(request.images)),
            stock: Set(request.stock),
            sold: Set(0),
            rating: Set(0.0),
            is_active: Set(is_active_for(request.stock)),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;
        bump_total_products(&txn, shop_id, 1).await?;
        txn.commit().await?;

        info!(product_id = %product.id, %shop_id, "product created");
        self.event_sender
            .publish(Event::ProductCreated {
                product_id: product.id,
                shop_id,
            })
            .await;
        Ok(product)
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        product::Entity::find_by_id(product_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))
    }

    /// Public catalogue of a shop: in-stock products only.
    pub async fn list_shop_products(
        &self,
        shop_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<product::Model>, u64), ServiceError> {
        let paginator = product::Entity::find()
            .filter(product::Column::ShopId.eq(shop_id))
            .filter(product::Column::IsActive.eq(true))
            .order_by_desc(product::Column::CreatedAt)
            .paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let products = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((products, total))
    }

    #[instrument(skip(self, ctx, request))]
    pub async fn update_product(
        &self,
        ctx: &AuthorizationContext,
        product_id: Uuid,
        request: UpdateProductRequest,
    ) -> Result<product::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_product(product_id).await?;
        ctx.require_owner_of(existing.shop_id)?;
        check_prices(
            request.price.unwrap_or(existing.price),
            request.original_price.or(Some(existing.original_price)),
        )?;

        let mut active: product::ActiveModel = existing.into();
        if let Some(title) = request.title {
            active.title = Set(title.trim().to_string());
        }
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(price) = request.price {
            active.price = Set(price);
        }
        if let Some(original_price) = request.original_price {
            active.original_price = Set(original_price);
        }
        if let Some(discount) = request.discount {
            active.discount = Set(discount);
        }
        if request.category.is_some() {
            active.category = Set(request.category);
        }
        if let Some(images) = request.images {
            active.images = Set(json!(images));
        }
        active.updated_at = Set(Utc::now());

        let txn = self.db.begin().await?;
        active.update(&txn).await?;
        if let Some(stock) = request.stock {
            write_stock(&txn, product_id, StockChange::Set(stock)).await?;
        }
        txn.commit().await?;

        info!(%product_id, "product updated");
        self.get_product(product_id).await
    }

    /// Relative stock change by the owning seller.
    #[instrument(skip(self, ctx))]
    pub async fn adjust_stock(
        &self,
        ctx: &AuthorizationContext,
        product_id: Uuid,
        delta: i32,
    ) -> Result<product::Model, ServiceError> {
        let existing = self.get_product(product_id).await?;
        ctx.require_owner_of(existing.shop_id)?;

        if !write_stock(self.db.as_ref(), product_id, StockChange::Delta(delta)).await? {
            return Err(ServiceError::Conflict(format!(
                "Insufficient stock for product {}",
                product_id
            )));
        }

        let product = self.get_product(product_id).await?;
        info!(%product_id, delta, stock = product.stock, is_active = product.is_active, "stock adjusted");
        self.event_sender
            .publish(Event::StockAdjusted {
                product_id,
                stock: product.stock,
                is_active: product.is_active,
            })
            .await;
        Ok(product)
    }

    #[instrument(skip(self, ctx))]
    pub async fn delete_product(
        &self,
        ctx: &AuthorizationContext,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        let existing = self.get_product(product_id).await?;
        ctx.require_owner_of(existing.shop_id)?;

        let txn = self.db.begin().await?;
        product::Entity::delete_by_id(product_id).exec(&txn).await?;
        bump_total_products(&txn, existing.shop_id, -1).await?;
        recompute_shop_rating(&txn, existing.shop_id).await?;
        txn.commit().await?;

        info!(%product_id, shop_id = %existing.shop_id, "product deleted");
        self.event_sender
            .publish(Event::ProductDeleted {
                product_id,
                shop_id: existing.shop_id,
            })
            .await;
        Ok(())
    }
}

fn check_prices(price: Decimal, original_price: Option<Decimal>) -> Result<(), ServiceError> {
    if price <= Decimal::ZERO {
        return Err(ServiceError::ValidationError(
            "Price must be greater than zero".to_string(),
        ));
    }
    if matches!(original_price, Some(p) if p < Decimal::ZERO) {
        return Err(ServiceError::ValidationError(
            "Original price cannot be negative".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn active_flag_follows_stock() {
        assert!(!is_active_for(0));
        assert!(is_active_for(1));
        assert!(!is_active_for(-3));
    }

    #[test]
    fn zero_price_is_rejected() {
        assert!(check_prices(dec!(0), None).is_err());
        assert!(check_prices(dec!(9.99), Some(dec!(12))).is_ok());
    }
}
