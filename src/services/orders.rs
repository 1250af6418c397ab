use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::promotions::{AppliedCoupon, CouponOutcome, PromotionService};
use super::{order_status, Address};
use crate::{
    auth::AuthorizationContext,
    entities::{
        order::{self, CouponSnapshot, OrderStatus},
        order_item, product, shop,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: i32,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub shop_id: Uuid,
    #[validate(length(min = 1, message = "At least one item is required"))]
    pub items: Vec<OrderItemInput>,
    pub coupon_code: Option<String>,
    pub shipping_address: Address,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

/// An order with its frozen line items and coupon snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetails {
    #[serde(flatten)]
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
    pub coupon: Option<CouponSnapshot>,
}

impl OrderDetails {
    fn new(order: order::Model, items: Vec<order_item::Model>) -> Self {
        let coupon = order.coupon_snapshot();
        Self {
            order,
            items,
            coupon,
        }
    }
}

/// `ORD-YYYYMMDD-<order id as 32 upper-case hex digits>`, used as the
/// searchable order code. Unique because the order id is.
pub fn generate_order_number(order_id: Uuid) -> String {
    let suffix = order_id.simple().to_string().to_uppercase();
    format!("ORD-{}-{}", Utc::now().format("%Y%m%d"), suffix)
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Prices the cart from live products, applies the coupon when it still
    /// qualifies and persists the order with a frozen price snapshot. The coupon
    /// usage increment shares the order's transaction.
    #[instrument(skip(self, ctx, request), fields(buyer_id = %ctx.user_id(), shop_id = %request.shop_id))]
    pub async fn create_order(
        &self,
        ctx: &AuthorizationContext,
        request: CreateOrderRequest,
    ) -> Result<OrderDetails, ServiceError> {
        request.validate()?;
        for item in &request.items {
            item.validate()?;
        }
        request.shipping_address.validate()?;

        let db = self.db.as_ref();
        let shop = shop::Entity::find_by_id(request.shop_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shop not found".to_string()))?;
        if ctx.is_owner_of(shop.id) {
            return Err(ServiceError::ValidationError(
                "You cannot order from your own shop".to_string(),
            ));
        }

        let product_ids: Vec<Uuid> = request.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<Uuid, product::Model> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids.clone()))
            .all(db)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut lines = Vec::with_capacity(request.items.len());
        let mut subtotal = Decimal::ZERO;
        for item in &request.items {
            let product = products
                .get(&item.product_id)
                .filter(|p| p.shop_id == shop.id)
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product {} is not sold by this shop",
                        item.product_id
                    ))
                })?;
            if !product.is_active {
                return Err(ServiceError::ValidationError(format!(
                    "Product {} is out of stock",
                    product.title
                )));
            }
            subtotal += product.price * Decimal::from(item.quantity);
            lines.push((product.title.clone(), product.price, item));
        }

        let order_id = Uuid::new_v4();
        let now = Utc::now();
        let txn = db.begin().await?;

        let mut applied: Option<AppliedCoupon> = None;
        if let Some(code) = request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) {
            match PromotionService::evaluate_code(&txn, code, shop.id, &product_ids, subtotal, now)
                .await?
            {
                CouponOutcome::Applied(candidate) => {
                    if PromotionService::redeem(&txn, candidate.coupon.id).await? {
                        applied = Some(candidate);
                    } else {
                        info!(code = %candidate.coupon.code, "coupon exhausted during checkout; charging full price");
                    }
                }
                CouponOutcome::Rejected(rejection) => {
                    info!(reason = rejection.code(), "coupon not applied; charging full price");
                }
            }
        }

        let (discount, total_price) = match &applied {
            Some(a) => (a.evaluation.discount, a.evaluation.final_price),
            None => (Decimal::ZERO, subtotal),
        };
        let snapshot = applied.as_ref().map(AppliedCoupon::snapshot);

        let order = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(generate_order_number(order_id)),
            buyer_id: Set(ctx.user_id()),
            shop_id: Set(shop.id),
            status: Set(OrderStatus::Pending),
            original_price: Set(subtotal),
            discount: Set(discount),
            total_price: Set(total_price),
            coupon_id: Set(applied.as_ref().map(|a| a.coupon.id)),
            coupon_code: Set(snapshot.as_ref().map(|s| s.code.clone())),
            coupon_discount_type: Set(snapshot.as_ref().map(|s| s.discount_type)),
            coupon_discount_value: Set(snapshot.as_ref().map(|s| s.discount_value)),
            shipping_address: Set(serde_json::to_value(&request.shipping_address)
                .map_err(|e| ServiceError::InternalError(e.to_string()))?),
            notes: Set(request.notes.clone()),
            tracking_number: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        let mut items = Vec::with_capacity(lines.len());
        for (title, price, item) in lines {
            let line = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                title: Set(title),
                price: Set(price),
                quantity: Set(item.quantity),
                created_at: Set(now),
            }
            .insert(&txn)
            .await?;
            items.push(line);
        }

        txn.commit().await?;

        info!(
            order_id = %order.id,
            order_number = %order.order_number,
            original_price = %order.original_price,
            discount = %order.discount,
            total_price = %order.total_price,
            "order created"
        );

        if let Some(a) = &applied {
            self.event_sender
                .publish(Event::CouponRedeemed {
                    coupon_id: a.coupon.id,
                    order_id,
                    discount,
                })
                .await;
        }
        self.event_sender
            .publish(Event::OrderCreated {
                order_id,
                shop_id: order.shop_id,
                buyer_id: order.buyer_id,
                total_price: order.total_price,
            })
            .await;

        Ok(OrderDetails::new(order, items))
    }

    /// Visible to the buyer and to the owner of the selling shop only.
    #[instrument(skip(self, ctx))]
    pub async fn get_order(
        &self,
        ctx: &AuthorizationContext,
        order_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.find_order(order_id).await?;
        if order.buyer_id != ctx.user_id() && !ctx.is_owner_of(order.shop_id) {
            return Err(ServiceError::Forbidden(
                "Not authorized to view this order".to_string(),
            ));
        }
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(self.db.as_ref())
            .await?;
        Ok(OrderDetails::new(order, items))
    }

    pub async fn list_my_orders(
        &self,
        ctx: &AuthorizationContext,
        status: Option<OrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderDetails>, u64), ServiceError> {
        self.list_where(
            Condition::all().add(order::Column::BuyerId.eq(ctx.user_id())),
            status,
            page,
            limit,
        )
        .await
    }

    pub async fn list_shop_orders(
        &self,
        ctx: &AuthorizationContext,
        status: Option<OrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderDetails>, u64), ServiceError> {
        let shop_id = ctx.require_shop()?;
        self.list_where(
            Condition::all().add(order::Column::ShopId.eq(shop_id)),
            status,
            page,
            limit,
        )
        .await
    }

    async fn list_where(
        &self,
        mut condition: Condition,
        status: Option<OrderStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<OrderDetails>, u64), ServiceError> {
        if let Some(status) = status {
            condition = condition.add(order::Column::Status.eq(status));
        }
        let db = self.db.as_ref();
        let paginator = order::Entity::find()
            .filter(condition)
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page.saturating_sub(1)).await?;

        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();
        let mut items_by_order: HashMap<Uuid, Vec<order_item::Model>> = HashMap::new();
        for item in order_item::Entity::find()
            .filter(order_item::Column::OrderId.is_in(ids))
            .all(db)
            .await?
        {
            items_by_order.entry(item.order_id).or_default().push(item);
        }

        let details = orders
            .into_iter()
            .map(|o| {
                let items = items_by_order.remove(&o.id).unwrap_or_default();
                OrderDetails::new(o, items)
            })
            .collect();
        Ok((details, total))
    }

    /// Seller-driven status change along the transition table.
    #[instrument(skip(self, ctx), fields(new_status = %new_status))]
    pub async fn update_status(
        &self,
        ctx: &AuthorizationContext,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.find_order(order_id).await?;
        ctx.require_owner_of(order.shop_id)?;
        order_status::validate_transition(order.status, new_status)?;

        self.apply_transition(&order, new_status).await?;
        self.event_sender
            .publish(Event::OrderStatusChanged {
                order_id,
                old_status: order.status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        self.get_order(ctx, order_id).await
    }

    /// Buyer or seller cancellation of an order that has not been delivered.
    #[instrument(skip(self, ctx))]
    pub async fn cancel_order(
        &self,
        ctx: &AuthorizationContext,
        order_id: Uuid,
    ) -> Result<OrderDetails, ServiceError> {
        let order = self.find_order(order_id).await?;
        if order.buyer_id != ctx.user_id() && !ctx.is_owner_of(order.shop_id) {
            return Err(ServiceError::Forbidden(
                "Not authorized to cancel this order".to_string(),
            ));
        }
        order_status::validate_transition(order.status, OrderStatus::Cancelled)?;

        self.apply_transition(&order, OrderStatus::Cancelled).await?;
        self.event_sender
            .publish(Event::OrderCancelled {
                order_id,
                cancelled_by: ctx.user_id(),
            })
            .await;
        self.get_order(ctx, order_id).await
    }

    /// Compare-and-swap on `(id, status, version)`. Losing the race means
    /// someone else moved the order first.
    async fn apply_transition(
        &self,
        order: &order::Model,
        to: OrderStatus,
    ) -> Result<(), ServiceError> {
        let result = order::Entity::update_many()
            .col_expr(order::Column::Status, Expr::value(to))
            .col_expr(
                order::Column::Version,
                Expr::col(order::Column::Version).add(1),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .filter(order::Column::Status.eq(order.status))
            .filter(order::Column::Version.eq(order.version))
            .exec(self.db.as_ref())
            .await?;

        if result.rows_affected == 0 {
            warn!(order_id = %order.id, from = %order.status, to = %to, "order changed concurrently");
            return Err(ServiceError::ConcurrentModification(order.id));
        }
        info!(order_id = %order.id, from = %order.status, to = %to, "order status updated");
        Ok(())
    }

    async fn find_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }
}
