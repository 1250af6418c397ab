use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "complaints")]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub shop_id: Uuid,
    #[sea_orm(unique)]
    pub order_id: Uuid,
    pub product_id: Option<Uuid>,
    pub buyer_id: Uuid,
    /// Denormalized order number, searchable without a join.
    pub order_code: String,
    #[serde(rename = "type")]
    pub complaint_type: ComplaintType,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub status: ComplaintStatus,
    #[sea_orm(column_type = "Json")]
    pub evidence_images: Json,
    #[sea_orm(column_type = "Json")]
    pub seller_evidence: Json,
    pub resolution_action: Option<ResolutionAction>,
    pub refund_amount: Option<Decimal>,
    pub refund_percentage: Option<i32>,
    pub resolution_note: Option<String>,
    pub decided_by: Option<Uuid>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The seller's decision, present once and never replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub action: ResolutionAction,
    pub refund_amount: Option<Decimal>,
    pub refund_percentage: Option<i32>,
    pub note: Option<String>,
    pub decided_by: Uuid,
    pub decided_at: DateTime<Utc>,
}

impl Model {
    pub fn resolution(&self) -> Option<Resolution> {
        match (self.resolution_action, self.decided_by, self.decided_at) {
            (Some(action), Some(decided_by), Some(decided_at)) => Some(Resolution {
                action,
                refund_amount: self.refund_amount,
                refund_percentage: self.refund_percentage,
                note: self.resolution_note.clone(),
                decided_by,
                decided_at,
            }),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::order::Entity",
        from = "Column::OrderId",
        to = "super::order::Column::Id"
    )]
    Order,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComplaintType {
    #[sea_orm(string_value = "damaged_product")]
    DamagedProduct,
    #[sea_orm(string_value = "wrong_item")]
    WrongItem,
    #[sea_orm(string_value = "missing_item")]
    MissingItem,
    #[sea_orm(string_value = "late_delivery")]
    LateDelivery,
    #[sea_orm(string_value = "other")]
    Other,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ComplaintStatus {
    #[sea_orm(string_value = "new")]
    New,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "resolved")]
    Resolved,
    #[sea_orm(string_value = "disputed")]
    Disputed,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ResolutionAction {
    #[sea_orm(string_value = "refund")]
    Refund,
    #[sea_orm(string_value = "replace")]
    Replace,
    #[sea_orm(string_value = "reject")]
    Reject,
}
