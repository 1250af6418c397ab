use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Address;
use crate::{
    auth::AuthorizationContext,
    entities::{
        order::{self, CouponSnapshot, OrderStatus},
        order_item, shop, user,
    },
    errors::ServiceError,
};

const MISSING_SHOP_ADDRESS: &str = "Shop Address Not Provided";
const MISSING_BUYER_ADDRESS: &str = "Address Not Provided";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSender {
    pub shop_name: String,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRecipient {
    pub name: String,
    pub email: Option<String>,
    pub address: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelItem {
    pub title: String,
    pub quantity: i32,
    pub price: Decimal,
}

/// Printable shipping label. Prices come from the order's frozen snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingLabel {
    pub tracking_number: String,
    pub order_number: String,
    pub order_date: DateTime<Utc>,
    pub from: LabelSender,
    pub to: LabelRecipient,
    pub items: Vec<LabelItem>,
    pub original_price: Decimal,
    pub discount: Decimal,
    pub total_price: Decimal,
    pub coupon: Option<CouponSnapshot>,
    pub status: OrderStatus,
    pub barcode_data: String,
}

/// `TRK-YYYYMMDD-` followed by 16 upper-case hex digits.
pub fn generate_tracking_number() -> String {
    let random = Uuid::new_v4().simple().to_string()[..16].to_uppercase();
    format!("TRK-{}-{}", Utc::now().format("%Y%m%d"), random)
}

/// Single-line postal address, skipping blank parts.
pub fn format_address(address: &Address) -> String {
    let region = [address.state.trim(), address.zip_code.trim()]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    [
        address.street.trim(),
        address.city.trim(),
        region.as_str(),
        address.country.trim(),
    ]
    .into_iter()
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

#[derive(Clone)]
pub struct ShippingService {
    db: Arc<DatabaseConnection>,
}

impl ShippingService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Label for one of the caller's shop orders. The tracking number is
    /// assigned on first request and reused afterwards.
    #[instrument(skip(self, ctx), fields(seller_id = %ctx.user_id()))]
    pub async fn get_label(
        &self,
        ctx: &AuthorizationContext,
        order_id: Uuid,
    ) -> Result<ShippingLabel, ServiceError> {
        let db = self.db.as_ref();
        let order = order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))?;
        if !ctx.is_owner_of(order.shop_id) {
            warn!(%order_id, "shipping label requested by a non-owner");
            return Err(ServiceError::Forbidden(
                "Not authorized to generate a label for this order".to_string(),
            ));
        }

        let tracking_number = match order.tracking_number.clone() {
            Some(existing) => existing,
            None => self.assign_tracking_number(order.id).await?,
        };

        let shop = shop::Entity::find_by_id(order.shop_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shop not found".to_string()))?;
        let buyer = user::Entity::find_by_id(order.buyer_id).one(db).await?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::CreatedAt)
            .all(db)
            .await?;

        let address = serde_json::from_value::<Address>(order.shipping_address.clone())
            .map(|a| format_address(&a))
            .unwrap_or_else(|_| MISSING_BUYER_ADDRESS.to_string());

        info!(%order_id, %tracking_number, "shipping label generated");
        Ok(ShippingLabel {
            barcode_data: tracking_number.clone(),
            tracking_number,
            order_number: order.order_number.clone(),
            order_date: order.created_at,
            from: LabelSender {
                shop_name: shop.shop_name,
                address: shop
                    .location
                    .filter(|l| !l.trim().is_empty())
                    .unwrap_or_else(|| MISSING_SHOP_ADDRESS.to_string()),
            },
            to: LabelRecipient {
                name: buyer
                    .as_ref()
                    .map(|b| b.username.clone())
                    .unwrap_or_default(),
                email: buyer.and_then(|b| b.email),
                address,
            },
            items: items
                .into_iter()
                .map(|item| LabelItem {
                    title: item.title,
                    quantity: item.quantity,
                    price: item.price,
                })
                .collect(),
            original_price: order.original_price,
            discount: order.discount,
            total_price: order.total_price,
            coupon: order.coupon_snapshot(),
            status: order.status,
        })
    }

    /// Sets the tracking number only while none is stored, then reads back
    /// whichever value won.
    async fn assign_tracking_number(&self, order_id: Uuid) -> Result<String, ServiceError> {
        let db = self.db.as_ref();
        order::Entity::update_many()
            .col_expr(
                order::Column::TrackingNumber,
                Expr::value(generate_tracking_number()),
            )
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::TrackingNumber.is_null())
            .exec(db)
            .await?;

        order::Entity::find_by_id(order_id)
            .one(db)
            .await?
            .and_then(|o| o.tracking_number)
            .ok_or_else(|| ServiceError::InternalError("tracking number was not stored".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(state: &str, zip: &str) -> Address {
        Address {
            street: "1 Rua Augusta".to_string(),
            city: "Lisbon".to_string(),
            state: state.to_string(),
            zip_code: zip.to_string(),
            country: "Portugal".to_string(),
        }
    }

    #[test]
    fn address_joins_present_parts() {
        assert_eq!(
            format_address(&address("Lisboa", "1100-048")),
            "1 Rua Augusta, Lisbon, Lisboa 1100-048, Portugal"
        );
        assert_eq!(
            format_address(&address("", "1100-048")),
            "1 Rua Augusta, Lisbon, 1100-048, Portugal"
        );
        assert_eq!(
            format_address(&address(" ", "")),
            "1 Rua Augusta, Lisbon, Portugal"
        );
    }

    #[test]
    fn tracking_numbers_are_prefixed_and_distinct() {
        let a = generate_tracking_number();
        let b = generate_tracking_number();
        assert!(a.starts_with("TRK-"));
        assert_eq!(a.len(), "TRK-".len() + 8 + 1 + 16);
        assert_ne!(a, b);
    }
}
