use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthorizationContext,
    entities::{
        shop,
        user::{self, UserRole},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const DUPLICATE_NAME: &str = "Shop name already exists";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateShopRequest {
    #[validate(length(min = 2, max = 100, message = "Shop name must be 2-100 characters"))]
    pub shop_name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShopRequest {
    #[validate(length(min = 2, max = 100, message = "Shop name must be 2-100 characters"))]
    pub shop_name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    pub logo: Option<String>,
    pub banner: Option<String>,
    #[validate(length(max = 200))]
    pub location: Option<String>,
}

#[derive(Clone)]
pub struct ShopService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ShopService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens the caller's one shop and promotes a buyer account to seller.
    #[instrument(skip(self, ctx, request), fields(user_id = %ctx.user_id()))]
    pub async fn create_shop(
        &self,
        ctx: &AuthorizationContext,
        request: CreateShopRequest,
    ) -> Result<shop::Model, ServiceError> {
        request.validate()?;
        if ctx.shop_id().is_some() {
            return Err(ServiceError::Conflict("You already have a shop".to_string()));
        }
        let shop_name = request.shop_name.trim().to_string();
        self.ensure_name_free(&shop_name, None).await?;

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let shop = shop::ActiveModel {
            id: Set(Uuid::new_v4()),
            owner_id: Set(ctx.user_id()),
            shop_name: Set(shop_name),
            description: Set(request.description),
            logo: Set(request.logo),
            banner: Set(request.banner),
            location: Set(request.location),
            rating: Set(0.0),
            total_products: Set(0),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| ServiceError::on_unique(e, "You already have a shop or the name is taken"))?;

        let mut owner: user::ActiveModel = ctx.user().clone().into();
        owner.store_id = Set(Some(shop.id));
        if ctx.user().role == UserRole::Buyer {
            owner.role = Set(UserRole::Seller);
        }
        owner.updated_at = Set(now);
        owner.update(&txn).await?;
        txn.commit().await?;

        info!(shop_id = %shop.id, shop_name = %shop.shop_name, "shop created");
        self.event_sender
            .publish(Event::ShopCreated {
                shop_id: shop.id,
                owner_id: shop.owner_id,
            })
            .await;
        Ok(shop)
    }

    pub async fn get_shop(&self, shop_id: Uuid) -> Result<shop::Model, ServiceError> {
        shop::Entity::find_by_id(shop_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Shop not found".to_string()))
    }

    pub async fn get_my_shop(&self, ctx: &AuthorizationContext) -> Result<shop::Model, ServiceError> {
        match ctx.shop_id() {
            Some(id) => self.get_shop(id).await,
            None => Err(ServiceError::NotFound("You do not have a shop".to_string())),
        }
    }

    #[instrument(skip(self, ctx, request))]
    pub async fn update_shop(
        &self,
        ctx: &AuthorizationContext,
        shop_id: Uuid,
        request: UpdateShopRequest,
    ) -> Result<shop::Model, ServiceError> {
        request.validate()?;
        let existing = self.get_shop(shop_id).await?;
        ctx.require_owner_of(existing.id)?;

        let mut active: shop::ActiveModel = existing.clone().into();
        if let Some(name) = request.shop_name.as_deref().map(str::trim) {
            if name != existing.shop_name {
                self.ensure_name_free(name, Some(existing.id)).await?;
                active.shop_name = Set(name.to_string());
            }
        }
        if request.description.is_some() {
            active.description = Set(request.description);
        }
        if request.logo.is_some() {
            active.logo = Set(request.logo);
        }
        if request.banner.is_some() {
            active.banner = Set(request.banner);
        }
        if request.location.is_some() {
            active.location = Set(request.location);
        }
        active.updated_at = Set(Utc::now());

        let updated = active
            .update(self.db.as_ref())
            .await
            .map_err(|e| ServiceError::on_unique(e, DUPLICATE_NAME))?;
        info!(shop_id = %updated.id, "shop updated");
        Ok(updated)
    }

    async fn ensure_name_free(&self, name: &str, except: Option<Uuid>) -> Result<(), ServiceError> {
        let mut query = shop::Entity::find().filter(shop::Column::ShopName.eq(name));
        if let Some(id) = except {
            query = query.filter(shop::Column::Id.ne(id));
        }
        if query.count(self.db.as_ref()).await? > 0 {
            return Err(ServiceError::Conflict(DUPLICATE_NAME.to_string()));
        }
        Ok(())
    }
}
