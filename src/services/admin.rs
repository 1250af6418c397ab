use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    auth::AuthorizationContext,
    entities::{shop, user},
    errors::ServiceError,
};

/// Platform-wide counters for the admin dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStats {
    pub total_users: u64,
    /// Users that own a shop.
    pub total_sellers: u64,
    pub verified_sellers: u64,
    pub pending_sellers: u64,
    pub total_shops: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SellerFilter {
    #[default]
    All,
    /// Shop owners not yet verified.
    Pending,
    Verified,
}

impl SellerFilter {
    pub fn parse(raw: Option<&str>) -> Result<Self, ServiceError> {
        match raw.map(str::trim).filter(|s| !s.is_empty()) {
            None | Some("all") => Ok(Self::All),
            Some("pending") => Ok(Self::Pending),
            Some("verified") => Ok(Self::Verified),
            Some(other) => Err(ServiceError::ValidationError(format!(
                "Unknown seller status: {other}"
            ))),
        }
    }

    fn condition(self) -> Condition {
        let sellers = Condition::all().add(user::Column::StoreId.is_not_null());
        match self {
            Self::All => sellers,
            Self::Pending => sellers.add(user::Column::IsVerified.eq(false)),
            Self::Verified => sellers.add(user::Column::IsVerified.eq(true)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerSummary {
    #[serde(flatten)]
    pub user: user::Model,
    pub shop: Option<shop::Model>,
}

#[derive(Clone)]
pub struct AdminService {
    db: Arc<DatabaseConnection>,
}

impl AdminService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, ctx))]
    pub async fn platform_stats(
        &self,
        ctx: &AuthorizationContext,
    ) -> Result<PlatformStats, ServiceError> {
        ctx.require_admin()?;
        let db = self.db.as_ref();
        Ok(PlatformStats {
            total_users: user::Entity::find().count(db).await?,
            total_sellers: user::Entity::find()
                .filter(SellerFilter::All.condition())
                .count(db)
                .await?,
            verified_sellers: user::Entity::find()
                .filter(SellerFilter::Verified.condition())
                .count(db)
                .await?,
            pending_sellers: user::Entity::find()
                .filter(SellerFilter::Pending.condition())
                .count(db)
                .await?,
            total_shops: shop::Entity::find().count(db).await?,
        })
    }

    /// Shop owners with their shop, newest first.
    #[instrument(skip(self, ctx))]
    pub async fn list_sellers(
        &self,
        ctx: &AuthorizationContext,
        filter: SellerFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<SellerSummary>, u64), ServiceError> {
        ctx.require_admin()?;
        let db = self.db.as_ref();
        let paginator = user::Entity::find()
            .filter(filter.condition())
            .order_by_desc(user::Column::CreatedAt)
            .paginate(db, limit);
        let total = paginator.num_items().await?;
        let sellers = paginator.fetch_page(page.saturating_sub(1)).await?;

        let shop_ids: Vec<Uuid> = sellers.iter().filter_map(|u| u.store_id).collect();
        let mut shops: HashMap<Uuid, shop::Model> = shop::Entity::find()
            .filter(shop::Column::Id.is_in(shop_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|s| (s.id, s))
            .collect();

        let summaries = sellers
            .into_iter()
            .map(|user| {
                let shop = user.store_id.and_then(|id| shops.remove(&id));
                SellerSummary { user, shop }
            })
            .collect();
        Ok((summaries, total))
    }
}
