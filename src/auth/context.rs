use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, Set};
use tracing::info;
use uuid::Uuid;

use super::{AuthUser, ROLE_SELLER};
use crate::entities::{
    shop,
    user::{self, UserRole, UserVerificationStatus},
};
use crate::errors::ServiceError;
use crate::AppState;

/// Human guidance attached to `NOT_VERIFIED` rejections.
pub fn verification_hint(status: UserVerificationStatus) -> &'static str {
    match status {
        UserVerificationStatus::Unverified => "Please submit your verification documents",
        UserVerificationStatus::Pending => {
            "Your verification is under review. Please wait for approval."
        }
        _ => "Your verification was rejected. Please check your verification status for details.",
    }
}

/// Caller capabilities, resolved once per operation from the bearer identity
/// and the caller's stored user and shop rows.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    user: user::Model,
    shop_id: Option<Uuid>,
    admin: bool,
}

impl AuthorizationContext {
    /// Loads the caller, provisioning a user row on first sight.
    pub async fn load<C>(db: &C, auth: &AuthUser) -> Result<Self, ServiceError>
    where
        C: ConnectionTrait,
    {
        let user = match user::Entity::find_by_id(auth.user_id).one(db).await? {
            Some(user) => user,
            None => provision_user(db, auth).await?,
        };

        let shop_id = shop::Entity::find()
            .filter(shop::Column::OwnerId.eq(user.id))
            .one(db)
            .await?
            .map(|s| s.id);

        let admin = auth.is_admin() || user.role == UserRole::Admin;
        Ok(Self {
            user,
            shop_id,
            admin,
        })
    }

    pub fn user_id(&self) -> Uuid {
        self.user.id
    }

    pub fn user(&self) -> &user::Model {
        &self.user
    }

    pub fn shop_id(&self) -> Option<Uuid> {
        self.shop_id
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn is_owner_of(&self, shop_id: Uuid) -> bool {
        self.shop_id == Some(shop_id)
    }

    pub fn is_verified_seller(&self) -> bool {
        self.shop_id.is_some() && self.user.is_verified
    }

    pub fn require_admin(&self) -> Result<(), ServiceError> {
        if self.admin {
            Ok(())
        } else {
            Err(ServiceError::Forbidden("Admin access required".to_string()))
        }
    }

    pub fn require_owner_of(&self, shop_id: Uuid) -> Result<(), ServiceError> {
        if self.is_owner_of(shop_id) {
            Ok(())
        } else {
            Err(ServiceError::Forbidden(
                "You do not own this shop".to_string(),
            ))
        }
    }

    pub fn require_shop(&self) -> Result<Uuid, ServiceError> {
        self.shop_id.ok_or(ServiceError::NoShop)
    }

    /// Gate for seller actions that need an approved verification. Reads the
    /// live `is_verified` flag on the user row.
    pub fn require_verified_seller(&self) -> Result<Uuid, ServiceError> {
        let shop_id = self.require_shop()?;
        if self.is_verified_seller() {
            Ok(shop_id)
        } else {
            let status = self.user.verification_status;
            Err(ServiceError::NotVerified {
                status: status.to_string(),
                hint: verification_hint(status).to_string(),
            })
        }
    }
}

async fn provision_user<C>(db: &C, auth: &AuthUser) -> Result<user::Model, ServiceError>
where
    C: ConnectionTrait,
{
    let role = if auth.is_admin() {
        UserRole::Admin
    } else if auth.has_role(ROLE_SELLER) {
        UserRole::Seller
    } else {
        UserRole::Buyer
    };
    let now = Utc::now();

    let model = user::ActiveModel {
        id: Set(auth.user_id),
        username: Set(auth
            .name
            .clone()
            .unwrap_or_else(|| auth.user_id.to_string())),
        email: Set(auth.email.clone()),
        role: Set(role),
        store_id: Set(None),
        is_verified: Set(false),
        verification_status: Set(UserVerificationStatus::Unverified),
        verification_submitted_at: Set(None),
        verified_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let user = model.insert(db).await?;
    info!(user_id = %user.id, role = %role, "provisioned marketplace user");
    Ok(user)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthorizationContext {
    type Rejection = ServiceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("Authentication required".to_string()))?;
        AuthorizationContext::load(state.db.as_ref(), &auth).await
    }
}

#[cfg(test)]
impl AuthorizationContext {
    pub(crate) fn for_tests(user: user::Model, shop_id: Option<Uuid>) -> Self {
        let admin = user.role == UserRole::Admin;
        Self {
            user,
            shop_id,
            admin,
        }
    }
}
