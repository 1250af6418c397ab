use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::Address;
use crate::{
    auth::AuthorizationContext,
    entities::{
        seller_verification::{self, BusinessType, VerificationLevel, VerificationStatus},
        user::{self, UserVerificationStatus},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityDocumentType {
    Passport,
    NationalId,
    DriversLicense,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IdentityDocument {
    #[serde(rename = "type")]
    pub document_type: IdentityDocumentType,
    #[validate(length(min = 1, message = "Document number is required"))]
    pub number: String,
    #[validate(length(min = 1, message = "Front image is required"))]
    pub front_image: String,
    pub back_image: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BusinessDocumentType {
    BusinessLicense,
    TaxCertificate,
    BankStatement,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BusinessDocument {
    #[validate(length(min = 1))]
    pub name: String,
    #[serde(rename = "type")]
    pub document_type: BusinessDocumentType,
    #[validate(length(min = 1))]
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    #[validate(length(min = 1))]
    pub account_holder_name: String,
    #[validate(length(min = 4, max = 34))]
    pub account_number: String,
    #[validate(length(min = 1))]
    pub bank_name: String,
    pub branch_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitVerificationRequest {
    #[validate(length(min = 1, max = 200, message = "Business name is required"))]
    pub business_name: String,
    pub business_type: BusinessType,
    pub business_registration_number: Option<String>,
    pub tax_id: Option<String>,
    pub business_address: Address,
    #[validate(length(min = 1, max = 200, message = "Owner name is required"))]
    pub owner_full_name: String,
    #[validate(email(message = "Owner email is invalid"))]
    pub owner_email: String,
    #[validate(length(min = 5, max = 32, message = "Owner phone is invalid"))]
    pub owner_phone: String,
    pub identity_document: IdentityDocument,
    #[serde(default)]
    pub business_documents: Vec<BusinessDocument>,
    pub bank_account: Option<BankAccount>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

impl SubmitVerificationRequest {
    fn validate_all(&self) -> Result<(), ServiceError> {
        self.validate()?;
        self.business_address.validate()?;
        self.identity_document.validate()?;
        for document in &self.business_documents {
            document.validate()?;
        }
        if let Some(bank) = &self.bank_account {
            bank.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApproveVerificationRequest {
    pub verification_level: Option<VerificationLevel>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RejectVerificationRequest {
    #[validate(length(min = 1, message = "Rejection reason is required"))]
    pub rejection_reason: String,
    pub require_resubmit: Option<bool>,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationStatusView {
    pub is_verified: bool,
    pub verification_status: UserVerificationStatus,
    pub verification: Option<seller_verification::Model>,
}

fn to_json<T: Serialize>(value: &T) -> Result<serde_json::Value, ServiceError> {
    serde_json::to_value(value).map_err(|e| ServiceError::InternalError(e.to_string()))
}

/// Mirrors the verification outcome onto the user row, which is what the
/// selling gate reads.
async fn sync_user<C>(
    db: &C,
    user_id: Uuid,
    status: UserVerificationStatus,
) -> Result<(), DbErr>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let mut update = user::Entity::update_many()
        .col_expr(user::Column::VerificationStatus, Expr::value(status))
        .col_expr(
            user::Column::IsVerified,
            Expr::value(status == UserVerificationStatus::Verified),
        )
        .col_expr(user::Column::UpdatedAt, Expr::value(now))
        .filter(user::Column::Id.eq(user_id));
    update = match status {
        UserVerificationStatus::Pending => {
            update.col_expr(user::Column::VerificationSubmittedAt, Expr::value(now))
        }
        UserVerificationStatus::Verified => {
            update.col_expr(user::Column::VerifiedAt, Expr::value(now))
        }
        UserVerificationStatus::Unverified | UserVerificationStatus::Rejected => update.col_expr(
            user::Column::VerifiedAt,
            Expr::value(Option::<chrono::DateTime<Utc>>::None),
        ),
    };
    update.exec(db).await?;
    Ok(())
}

#[derive(Clone)]
pub struct VerificationService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl VerificationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// First submission, or a resubmission after a rejection.
    #[instrument(skip(self, ctx, request), fields(seller_id = %ctx.user_id()))]
    pub async fn submit(
        &self,
        ctx: &AuthorizationContext,
        request: SubmitVerificationRequest,
    ) -> Result<seller_verification::Model, ServiceError> {
        let shop_id = ctx.require_shop()?;
        if ctx.user().is_verified {
            return Err(ServiceError::AlreadyVerified);
        }
        request.validate_all()?;

        let existing = seller_verification::Entity::find()
            .filter(seller_verification::Column::SellerId.eq(ctx.user_id()))
            .one(self.db.as_ref())
            .await?;
        if let Some(current) = &existing {
            match current.status {
                VerificationStatus::Approved => return Err(ServiceError::AlreadyVerified),
                status if !status.accepts_resubmission() => {
                    return Err(ServiceError::AlreadyPending)
                }
                _ => {}
            }
        }

        let now = Utc::now();
        let txn = self.db.begin().await?;
        let resubmission = existing.is_some();
        let verification = match existing {
            Some(current) => {
                let previous_status = current.status;
                let count = current.resubmission_count + 1;
                let mut active: seller_verification::ActiveModel = current.clone().into();
                self.fill(&mut active, &request, shop_id)?;
                active.status = Set(VerificationStatus::Pending);
                active.resubmission_count = Set(count);
                active.rejection_reason = Set(None);
                active.reviewed_by = Set(None);
                active.reviewed_at = Set(None);
                active.verification_level = Set(None);
                active.submitted_at = Set(now);
                active.updated_at = Set(now);

                // only the submission that still sees the rejected row wins
                let result = seller_verification::Entity::update_many()
                    .set(active)
                    .filter(seller_verification::Column::Id.eq(current.id))
                    .filter(seller_verification::Column::Status.is_in([
                        VerificationStatus::Rejected,
                        VerificationStatus::ResubmitRequired,
                    ]))
                    .filter(
                        seller_verification::Column::ResubmissionCount
                            .eq(current.resubmission_count),
                    )
                    .exec(&txn)
                    .await?;
                if result.rows_affected == 0 {
                    warn!(verification_id = %current.id, "verification resubmitted concurrently");
                    return Err(ServiceError::AlreadyPending);
                }
                let updated = seller_verification::Entity::find_by_id(current.id)
                    .one(&txn)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::NotFound("Verification request not found".to_string())
                    })?;
                info!(verification_id = %updated.id, from = %previous_status, resubmission_count = count, "verification resubmitted");
                updated
            }
            None => {
                let mut active = seller_verification::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    seller_id: Set(ctx.user_id()),
                    status: Set(VerificationStatus::Pending),
                    reviewed_by: Set(None),
                    reviewed_at: Set(None),
                    rejection_reason: Set(None),
                    resubmission_count: Set(0),
                    verification_level: Set(None),
                    submitted_at: Set(now),
                    created_at: Set(now),
                    updated_at: Set(now),
                    ..Default::default()
                };
                self.fill(&mut active, &request, shop_id)?;
                let created = active.insert(&txn).await.map_err(|e| {
                    match ServiceError::on_unique(e, "duplicate verification") {
                        ServiceError::Conflict(_) => ServiceError::AlreadyPending,
                        other => other,
                    }
                })?;
                info!(verification_id = %created.id, "verification submitted");
                created
            }
        };
        sync_user(&txn, ctx.user_id(), UserVerificationStatus::Pending).await?;
        txn.commit().await?;

        self.event_sender
            .publish(Event::VerificationSubmitted {
                verification_id: verification.id,
                seller_id: verification.seller_id,
                resubmission,
            })
            .await;
        Ok(verification)
    }

    fn fill(
        &self,
        active: &mut seller_verification::ActiveModel,
        request: &SubmitVerificationRequest,
        shop_id: Uuid,
    ) -> Result<(), ServiceError> {
        active.shop_id = Set(shop_id);
        active.business_name = Set(request.business_name.trim().to_string());
        active.business_type = Set(request.business_type);
        active.business_registration_number = Set(request.business_registration_number.clone());
        active.tax_id = Set(request.tax_id.clone());
        active.business_address = Set(to_json(&request.business_address)?);
        active.owner_full_name = Set(request.owner_full_name.trim().to_string());
        active.owner_email = Set(request.owner_email.trim().to_lowercase());
        active.owner_phone = Set(request.owner_phone.trim().to_string());
        active.identity_document = Set(to_json(&request.identity_document)?);
        active.business_documents = Set(to_json(&request.business_documents)?);
        active.bank_account = Set(request.bank_account.as_ref().map(to_json).transpose()?);
        active.notes = Set(request.notes.clone());
        Ok(())
    }

    pub async fn get_my_verification(
        &self,
        ctx: &AuthorizationContext,
    ) -> Result<seller_verification::Model, ServiceError> {
        self.find_for_seller(ctx.user_id())
            .await?
            .ok_or_else(|| ServiceError::NotFound("No verification request found".to_string()))
    }

    pub async fn get_status(
        &self,
        ctx: &AuthorizationContext,
    ) -> Result<VerificationStatusView, ServiceError> {
        Ok(VerificationStatusView {
            is_verified: ctx.user().is_verified,
            verification_status: ctx.user().verification_status,
            verification: self.find_for_seller(ctx.user_id()).await?,
        })
    }

    pub async fn list(
        &self,
        ctx: &AuthorizationContext,
        status: Option<VerificationStatus>,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<seller_verification::Model>, u64), ServiceError> {
        ctx.require_admin()?;
        let mut query = seller_verification::Entity::find();
        if let Some(status) = status {
            query = query.filter(seller_verification::Column::Status.eq(status));
        }
        let paginator = query
            .order_by_desc(seller_verification::Column::SubmittedAt)
            .paginate(self.db.as_ref(), limit);
        let total = paginator.num_items().await?;
        let items = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((items, total))
    }

    pub async fn get(
        &self,
        ctx: &AuthorizationContext,
        verification_id: Uuid,
    ) -> Result<seller_verification::Model, ServiceError> {
        ctx.require_admin()?;
        self.find(verification_id).await
    }

    /// Admin picks up a pending request: `pending -> under_review`.
    #[instrument(skip(self, ctx))]
    pub async fn start_review(
        &self,
        ctx: &AuthorizationContext,
        verification_id: Uuid,
    ) -> Result<seller_verification::Model, ServiceError> {
        ctx.require_admin()?;
        let current = self.find(verification_id).await?;
        if current.status != VerificationStatus::Pending {
            return Err(ServiceError::InvalidTransition {
                from: current.status.to_string(),
                to: VerificationStatus::UnderReview.to_string(),
            });
        }

        let result = seller_verification::Entity::update_many()
            .col_expr(
                seller_verification::Column::Status,
                Expr::value(VerificationStatus::UnderReview),
            )
            .col_expr(
                seller_verification::Column::ReviewedBy,
                Expr::value(ctx.user_id()),
            )
            .col_expr(seller_verification::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(seller_verification::Column::Id.eq(verification_id))
            .filter(seller_verification::Column::Status.eq(VerificationStatus::Pending))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(verification_id));
        }
        info!(%verification_id, "verification under review");
        self.find(verification_id).await
    }

    #[instrument(skip(self, ctx, request))]
    pub async fn approve(
        &self,
        ctx: &AuthorizationContext,
        verification_id: Uuid,
        request: ApproveVerificationRequest,
    ) -> Result<seller_verification::Model, ServiceError> {
        ctx.require_admin()?;
        request.validate()?;
        let current = self.find(verification_id).await?;
        match current.status {
            VerificationStatus::Approved => return Err(ServiceError::AlreadyApproved),
            VerificationStatus::Pending | VerificationStatus::UnderReview => {}
            other => {
                return Err(ServiceError::InvalidTransition {
                    from: other.to_string(),
                    to: VerificationStatus::Approved.to_string(),
                })
            }
        }

        let level = request.verification_level.unwrap_or_default();
        let now = Utc::now();
        let txn = self.db.begin().await?;
        let mut update = seller_verification::Entity::update_many()
            .col_expr(
                seller_verification::Column::Status,
                Expr::value(VerificationStatus::Approved),
            )
            .col_expr(seller_verification::Column::VerificationLevel, Expr::value(level))
            .col_expr(
                seller_verification::Column::ReviewedBy,
                Expr::value(ctx.user_id()),
            )
            .col_expr(seller_verification::Column::ReviewedAt, Expr::value(now))
            .col_expr(seller_verification::Column::UpdatedAt, Expr::value(now));
        if request.notes.is_some() {
            update = update.col_expr(
                seller_verification::Column::Notes,
                Expr::value(request.notes.clone()),
            );
        }
        let result = update
            .filter(seller_verification::Column::Id.eq(verification_id))
            .filter(seller_verification::Column::Status.is_in([
                VerificationStatus::Pending,
                VerificationStatus::UnderReview,
            ]))
            .exec(&txn)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::AlreadyApproved);
        }
        sync_user(&txn, current.seller_id, UserVerificationStatus::Verified).await?;
        txn.commit().await?;

        info!(%verification_id, seller_id = %current.seller_id, %level, "verification approved");
        self.event_sender
            .publish(Event::VerificationApproved {
                verification_id,
                seller_id: current.seller_id,
                level: level.to_string(),
            })
            .await;
        self.find(verification_id).await
    }

    /// Rejects, optionally asking for a resubmission. Also revokes an earlier
    /// approval.
    #[instrument(skip(self, ctx, request))]
    pub async fn reject(
        &self,
        ctx: &AuthorizationContext,
        verification_id: Uuid,
        request: RejectVerificationRequest,
    ) -> Result<seller_verification::Model, ServiceError> {
        ctx.require_admin()?;
        request.validate()?;
        if request.rejection_reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Rejection reason is required".to_string(),
            ));
        }
        let current = self.find(verification_id).await?;

        let require_resubmit = request.require_resubmit.unwrap_or(true);
        let status = if require_resubmit {
            VerificationStatus::ResubmitRequired
        } else {
            VerificationStatus::Rejected
        };
        let now = Utc::now();

        let txn = self.db.begin().await?;
        let mut active: seller_verification::ActiveModel = current.clone().into();
        active.status = Set(status);
        active.rejection_reason = Set(Some(request.rejection_reason.trim().to_string()));
        active.verification_level = Set(None);
        active.reviewed_by = Set(Some(ctx.user_id()));
        active.reviewed_at = Set(Some(now));
        if request.notes.is_some() {
            active.notes = Set(request.notes.clone());
        }
        active.updated_at = Set(now);
        let updated = active.update(&txn).await?;
        sync_user(&txn, current.seller_id, UserVerificationStatus::Rejected).await?;
        txn.commit().await?;

        if current.status == VerificationStatus::Approved {
            warn!(%verification_id, "approved verification revoked");
        }
        info!(%verification_id, %status, "verification rejected");
        self.event_sender
            .publish(Event::VerificationRejected {
                verification_id,
                seller_id: current.seller_id,
                resubmit_required: require_resubmit,
            })
            .await;
        Ok(updated)
    }

    /// Removes the request and returns the seller to `unverified`.
    #[instrument(skip(self, ctx))]
    pub async fn delete(
        &self,
        ctx: &AuthorizationContext,
        verification_id: Uuid,
    ) -> Result<(), ServiceError> {
        ctx.require_admin()?;
        let current = self.find(verification_id).await?;

        let txn = self.db.begin().await?;
        seller_verification::Entity::delete_by_id(verification_id)
            .exec(&txn)
            .await?;
        sync_user(&txn, current.seller_id, UserVerificationStatus::Unverified).await?;
        txn.commit().await?;

        info!(%verification_id, seller_id = %current.seller_id, "verification deleted");
        Ok(())
    }

    async fn find(&self, verification_id: Uuid) -> Result<seller_verification::Model, ServiceError> {
        seller_verification::Entity::find_by_id(verification_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Verification not found".to_string()))
    }

    async fn find_for_seller(
        &self,
        seller_id: Uuid,
    ) -> Result<Option<seller_verification::Model>, ServiceError> {
        Ok(seller_verification::Entity::find()
            .filter(seller_verification::Column::SellerId.eq(seller_id))
            .one(self.db.as_ref())
            .await?)
    }
}
