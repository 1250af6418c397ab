use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use super::Pagination;
use crate::{
    auth::AuthorizationContext,
    entities::{
        complaint::{self, ComplaintStatus, ComplaintType, ResolutionAction},
        order, order_item,
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

const DUPLICATE_COMPLAINT: &str = "A complaint already exists for this order";

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FileComplaintRequest {
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub complaint_type: ComplaintType,
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, max = 5000, message = "Description is required"))]
    pub description: String,
    #[serde(default)]
    pub evidence_images: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DecideComplaintRequest {
    pub action: ResolutionAction,
    pub refund_amount: Option<Decimal>,
    #[validate(range(min = 0, max = 100, message = "Refund percentage must be between 0 and 100"))]
    pub refund_percentage: Option<i32>,
    #[validate(length(max = 2000))]
    pub note: Option<String>,
    pub seller_evidence_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SellerEvidenceRequest {
    #[validate(length(min = 1, message = "At least one URL is required"))]
    pub urls: Vec<String>,
}

/// Raw list query as it arrives on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintQuery {
    pub shop: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub complaint_type: Option<String>,
    pub order_code: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    Exact(ComplaintStatus),
    /// Anything a seller has already touched, i.e. not `new`.
    Processed,
}

impl Serialize for StatusFilter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Exact(status) => status.serialize(serializer),
            Self::Processed => serializer.serialize_str("processed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComplaintSort {
    CreatedAsc,
    #[default]
    CreatedDesc,
    UpdatedAsc,
    UpdatedDesc,
}

impl ComplaintSort {
    fn parse(raw: &str) -> Result<Self, ServiceError> {
        match raw {
            "createdAt" => Ok(Self::CreatedAsc),
            "-createdAt" => Ok(Self::CreatedDesc),
            "updatedAt" => Ok(Self::UpdatedAsc),
            "-updatedAt" => Ok(Self::UpdatedDesc),
            other => Err(ServiceError::ValidationError(format!(
                "Unsupported sort: {other}"
            ))),
        }
    }
}

/// Resolved filter after parsing and scoping to the caller. Serialized back
/// to the client as `appliedFilter`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shop: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buyer: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusFilter>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub complaint_type: Option<ComplaintType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub page: u64,
    #[serde(skip)]
    pub limit: u64,
    #[serde(skip)]
    pub sort: ComplaintSort,
}

impl ComplaintFilter {
    /// Parses the wire query. `page` is at least 1 and `limit` is clamped to
    /// `1..=max_limit`.
    pub fn parse(
        query: ComplaintQuery,
        default_limit: u64,
        max_limit: u64,
    ) -> Result<Self, ServiceError> {
        let shop = match non_blank(query.shop) {
            Some(raw) => Some(Uuid::parse_str(&raw).map_err(|_| {
                ServiceError::ValidationError(format!("Invalid shop id: {raw}"))
            })?),
            None => None,
        };
        let status = match non_blank(query.status).as_deref() {
            Some("processed") => Some(StatusFilter::Processed),
            Some(raw) => Some(StatusFilter::Exact(raw.parse().map_err(|_| {
                ServiceError::ValidationError(format!("Unknown complaint status: {raw}"))
            })?)),
            None => None,
        };
        let complaint_type = match non_blank(query.complaint_type) {
            Some(raw) => Some(raw.parse().map_err(|_| {
                ServiceError::ValidationError(format!("Unknown complaint type: {raw}"))
            })?),
            None => None,
        };
        let start_date = non_blank(query.start_date)
            .map(|raw| parse_bound(&raw, false))
            .transpose()?;
        let end_date = non_blank(query.end_date)
            .map(|raw| parse_bound(&raw, true))
            .transpose()?;
        let sort = match non_blank(query.sort) {
            Some(raw) => ComplaintSort::parse(&raw)?,
            None => ComplaintSort::default(),
        };

        Ok(Self {
            shop,
            buyer: None,
            status,
            complaint_type,
            order_code: non_blank(query.order_code),
            start_date,
            end_date,
            page: query.page.unwrap_or(1).max(1),
            limit: query.limit.unwrap_or(default_limit).clamp(1, max_limit.max(1)),
            sort,
        })
    }

    /// Narrows the filter to what the caller may see. Admins keep any shop
    /// filter. Everyone else sees the complaints they filed, and shop owners
    /// additionally see those filed against their shop.
    pub fn scoped_to(mut self, ctx: &AuthorizationContext) -> Self {
        if ctx.is_admin() {
            return self;
        }
        self.shop = ctx.shop_id();
        self.buyer = Some(ctx.user_id());
        self
    }

    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        match (self.shop, self.buyer) {
            (Some(shop), Some(buyer)) => {
                cond = cond.add(
                    Condition::any()
                        .add(complaint::Column::ShopId.eq(shop))
                        .add(complaint::Column::BuyerId.eq(buyer)),
                );
            }
            (Some(shop), None) => cond = cond.add(complaint::Column::ShopId.eq(shop)),
            (None, Some(buyer)) => cond = cond.add(complaint::Column::BuyerId.eq(buyer)),
            (None, None) => {}
        }
        match self.status {
            Some(StatusFilter::Exact(status)) => {
                cond = cond.add(complaint::Column::Status.eq(status));
            }
            Some(StatusFilter::Processed) => {
                cond = cond.add(complaint::Column::Status.ne(ComplaintStatus::New));
            }
            None => {}
        }
        if let Some(kind) = self.complaint_type {
            cond = cond.add(complaint::Column::ComplaintType.eq(kind));
        }
        if let Some(code) = &self.order_code {
            // order codes are stored upper-cased
            cond = cond.add(complaint::Column::OrderCode.contains(code.to_uppercase()));
        }
        if let Some(start) = self.start_date {
            cond = cond.add(complaint::Column::CreatedAt.gte(start));
        }
        if let Some(end) = self.end_date {
            cond = cond.add(complaint::Column::CreatedAt.lte(end));
        }
        cond
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Accepts `YYYY-MM-DD` or RFC 3339. An end bound covers the whole day.
fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, ServiceError> {
    let date = match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) if !end_of_day => return Ok(ts.with_timezone(&Utc)),
        Ok(ts) => ts.with_timezone(&Utc).date_naive(),
        Err(_) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map_err(|_| ServiceError::ValidationError(format!("Invalid date: {raw}")))?,
    };
    let time = if end_of_day {
        NaiveTime::from_hms_milli_opt(23, 59, 59, 999)
    } else {
        NaiveTime::from_hms_opt(0, 0, 0)
    }
    .ok_or_else(|| ServiceError::InternalError("invalid time of day".to_string()))?;
    Ok(date.and_time(time).and_utc())
}

fn clean_urls(urls: &[String]) -> Vec<String> {
    urls.iter()
        .map(|u| u.trim())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect()
}

/// Status a decision moves the complaint to.
pub fn status_after(action: ResolutionAction) -> ComplaintStatus {
    match action {
        ResolutionAction::Reject => ComplaintStatus::Disputed,
        ResolutionAction::Refund | ResolutionAction::Replace => ComplaintStatus::Resolved,
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintPage {
    pub data: Vec<complaint::Model>,
    pub pagination: Pagination,
    pub applied_filter: ComplaintFilter,
}

#[derive(Clone)]
pub struct ComplaintService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ComplaintService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    /// Opens the single complaint allowed for an order. Any order status is
    /// accepted; uniqueness is enforced by the store.
    #[instrument(skip(self, ctx, request), fields(order_id = %request.order_id))]
    pub async fn file_complaint(
        &self,
        ctx: &AuthorizationContext,
        request: FileComplaintRequest,
    ) -> Result<complaint::Model, ServiceError> {
        request.validate()?;
        let db = self.db.as_ref();

        let order = order::Entity::find_by_id(request.order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
        if order.buyer_id != ctx.user_id() {
            return Err(ServiceError::Forbidden(
                "Only the buyer can file a complaint for this order".to_string(),
            ));
        }
        if let Some(product_id) = request.product_id {
            let in_order = order_item::Entity::find()
                .filter(order_item::Column::OrderId.eq(order.id))
                .filter(order_item::Column::ProductId.eq(product_id))
                .count(db)
                .await?
                > 0;
            if !in_order {
                return Err(ServiceError::ValidationError(
                    "Product not in this order".to_string(),
                ));
            }
        }
        let existing = complaint::Entity::find()
            .filter(complaint::Column::OrderId.eq(order.id))
            .count(db)
            .await?;
        if existing > 0 {
            return Err(ServiceError::Conflict(DUPLICATE_COMPLAINT.to_string()));
        }

        let now = Utc::now();
        let complaint = complaint::ActiveModel {
            id: Set(Uuid::new_v4()),
            shop_id: Set(order.shop_id),
            order_id: Set(order.id),
            product_id: Set(request.product_id),
            buyer_id: Set(ctx.user_id()),
            order_code: Set(order.order_number.clone()),
            complaint_type: Set(request.complaint_type),
            title: Set(request.title.trim().to_string()),
            description: Set(request.description),
            status: Set(ComplaintStatus::New),
            evidence_images: Set(json!(clean_urls(&request.evidence_images))),
            seller_evidence: Set(json!([])),
            resolution_action: Set(None),
            refund_amount: Set(None),
            refund_percentage: Set(None),
            resolution_note: Set(None),
            decided_by: Set(None),
            decided_at: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(db)
        .await
        .map_err(|e| ServiceError::on_unique(e, DUPLICATE_COMPLAINT))?;

        info!(complaint_id = %complaint.id, order_code = %complaint.order_code, "complaint filed");
        self.event_sender
            .publish(Event::ComplaintFiled {
                complaint_id: complaint.id,
                order_id: complaint.order_id,
                shop_id: complaint.shop_id,
            })
            .await;
        Ok(complaint)
    }

    pub async fn get_complaint(
        &self,
        ctx: &AuthorizationContext,
        complaint_id: Uuid,
    ) -> Result<complaint::Model, ServiceError> {
        let complaint = self.find_complaint(complaint_id).await?;
        if complaint.buyer_id != ctx.user_id()
            && !ctx.is_owner_of(complaint.shop_id)
            && !ctx.is_admin()
        {
            return Err(ServiceError::Forbidden(
                "Not authorized to view this complaint".to_string(),
            ));
        }
        Ok(complaint)
    }

    pub async fn list_complaints(
        &self,
        ctx: &AuthorizationContext,
        filter: ComplaintFilter,
    ) -> Result<ComplaintPage, ServiceError> {
        let filter = filter.scoped_to(ctx);
        let query = complaint::Entity::find().filter(filter.condition());
        let query = match filter.sort {
            ComplaintSort::CreatedAsc => query.order_by_asc(complaint::Column::CreatedAt),
            ComplaintSort::CreatedDesc => query.order_by_desc(complaint::Column::CreatedAt),
            ComplaintSort::UpdatedAsc => query.order_by_asc(complaint::Column::UpdatedAt),
            ComplaintSort::UpdatedDesc => query.order_by_desc(complaint::Column::UpdatedAt),
        };

        let paginator = query.paginate(self.db.as_ref(), filter.limit);
        let total = paginator.num_items().await?;
        let data = paginator.fetch_page(filter.page.saturating_sub(1)).await?;

        Ok(ComplaintPage {
            data,
            pagination: Pagination::new(total, filter.page, filter.limit),
            applied_filter: filter,
        })
    }

    /// Seller acknowledges a new complaint: `new -> in_progress`.
    #[instrument(skip(self, ctx))]
    pub async fn acknowledge(
        &self,
        ctx: &AuthorizationContext,
        complaint_id: Uuid,
    ) -> Result<complaint::Model, ServiceError> {
        let complaint = self.find_complaint(complaint_id).await?;
        ctx.require_owner_of(complaint.shop_id)?;
        if complaint.status != ComplaintStatus::New {
            return Err(ServiceError::InvalidTransition {
                from: complaint.status.to_string(),
                to: ComplaintStatus::InProgress.to_string(),
            });
        }

        let result = complaint::Entity::update_many()
            .col_expr(
                complaint::Column::Status,
                Expr::value(ComplaintStatus::InProgress),
            )
            .col_expr(complaint::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(complaint::Column::Id.eq(complaint.id))
            .filter(complaint::Column::Status.eq(ComplaintStatus::New))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(complaint.id));
        }

        info!(%complaint_id, "complaint acknowledged");
        self.find_complaint(complaint_id).await
    }

    /// Records the seller's one decision. `reject` disputes the complaint,
    /// `refund` and `replace` resolve it.
    #[instrument(skip(self, ctx, request), fields(action = %request.action))]
    pub async fn decide(
        &self,
        ctx: &AuthorizationContext,
        complaint_id: Uuid,
        request: DecideComplaintRequest,
    ) -> Result<complaint::Model, ServiceError> {
        request.validate()?;
        let complaint = self.find_complaint(complaint_id).await?;
        ctx.require_owner_of(complaint.shop_id)?;

        if complaint.resolution_action.is_some()
            || !matches!(
                complaint.status,
                ComplaintStatus::New | ComplaintStatus::InProgress
            )
        {
            return Err(ServiceError::Conflict(
                "Complaint has already been decided".to_string(),
            ));
        }

        let is_refund = request.action == ResolutionAction::Refund;
        if let Some(amount) = request.refund_amount.filter(|_| is_refund) {
            let order = order::Entity::find_by_id(complaint.order_id)
                .one(self.db.as_ref())
                .await?
                .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;
            if amount < Decimal::ZERO || amount > order.total_price {
                return Err(ServiceError::ValidationError(format!(
                    "Refund amount must be between 0 and {}",
                    order.total_price
                )));
            }
        }

        let status = status_after(request.action);
        let now = Utc::now();
        let mut update = complaint::Entity::update_many()
            .col_expr(complaint::Column::Status, Expr::value(status))
            .col_expr(
                complaint::Column::ResolutionAction,
                Expr::value(request.action),
            )
            .col_expr(
                complaint::Column::RefundAmount,
                Expr::value(request.refund_amount.filter(|_| is_refund)),
            )
            .col_expr(
                complaint::Column::RefundPercentage,
                Expr::value(request.refund_percentage.filter(|_| is_refund)),
            )
            .col_expr(
                complaint::Column::ResolutionNote,
                Expr::value(request.note.clone()),
            )
            .col_expr(complaint::Column::DecidedBy, Expr::value(ctx.user_id()))
            .col_expr(complaint::Column::DecidedAt, Expr::value(now))
            .col_expr(complaint::Column::UpdatedAt, Expr::value(now));
        if request.action == ResolutionAction::Reject {
            if let Some(urls) = &request.seller_evidence_urls {
                update = update.col_expr(
                    complaint::Column::SellerEvidence,
                    Expr::value(json!(clean_urls(urls))),
                );
            }
        }

        let result = update
            .filter(complaint::Column::Id.eq(complaint.id))
            .filter(
                complaint::Column::Status
                    .is_in([ComplaintStatus::New, ComplaintStatus::InProgress]),
            )
            .filter(complaint::Column::ResolutionAction.is_null())
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            warn!(%complaint_id, "complaint decided concurrently");
            return Err(ServiceError::Conflict(
                "Complaint has already been decided".to_string(),
            ));
        }

        info!(%complaint_id, %status, "complaint decided");
        self.event_sender
            .publish(Event::ComplaintDecided {
                complaint_id,
                action: request.action.to_string(),
                status: status.to_string(),
            })
            .await;
        self.find_complaint(complaint_id).await
    }

    /// Appends seller evidence to a disputed complaint.
    #[instrument(skip(self, ctx, request))]
    pub async fn add_seller_evidence(
        &self,
        ctx: &AuthorizationContext,
        complaint_id: Uuid,
        request: SellerEvidenceRequest,
    ) -> Result<complaint::Model, ServiceError> {
        request.validate()?;
        let complaint = self.find_complaint(complaint_id).await?;
        ctx.require_owner_of(complaint.shop_id)?;
        if complaint.status != ComplaintStatus::Disputed {
            return Err(ServiceError::Conflict(
                "Seller evidence can only be added to a disputed complaint".to_string(),
            ));
        }

        let mut evidence: Vec<String> = serde_json::from_value(complaint.seller_evidence.clone())
            .map_err(|e| {
                ServiceError::InternalError(format!("Stored seller evidence is unreadable: {e}"))
            })?;
        evidence.extend(clean_urls(&request.urls));

        let result = complaint::Entity::update_many()
            .col_expr(
                complaint::Column::SellerEvidence,
                Expr::value(json!(evidence)),
            )
            .col_expr(complaint::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(complaint::Column::Id.eq(complaint_id))
            .filter(complaint::Column::Status.eq(ComplaintStatus::Disputed))
            .filter(complaint::Column::UpdatedAt.eq(complaint.updated_at))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::ConcurrentModification(complaint_id));
        }

        info!(%complaint_id, count = evidence.len(), "seller evidence added");
        self.find_complaint(complaint_id).await
    }

    async fn find_complaint(&self, complaint_id: Uuid) -> Result<complaint::Model, ServiceError> {
        complaint::Entity::find_by_id(complaint_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::NotFound("Complaint not found".to_string()))
    }
}
