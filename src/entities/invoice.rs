use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invoice lifecycle states.
///
/// `DRAFT -> SENT -> {PARTIALLY_PAID <-> PAID}`, with `OVERDUE` reachable
/// from `SENT`/`PARTIALLY_PAID` by the aging job and `CANCELLED` terminal
/// from any non-`PAID` state. Only `DRAFT` permits line-item mutation.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    #[sea_orm(string_value = "DRAFT")]
    Draft,
    #[sea_orm(string_value = "SENT")]
    Sent,
    #[sea_orm(string_value = "PARTIALLY_PAID")]
    PartiallyPaid,
    #[sea_orm(string_value = "PAID")]
    Paid,
    #[sea_orm(string_value = "OVERDUE")]
    Overdue,
    #[sea_orm(string_value = "CANCELLED")]
    Cancelled,
}

impl InvoiceStatus {
    /// Line items (and draft fields) may only change before the invoice
    /// has been sent.
    pub fn allows_draft_mutation(&self) -> bool {
        matches!(self, Self::Draft)
    }

    /// Payments are accepted once sent and until fully paid, including
    /// while overdue.
    pub fn accepts_payment(&self) -> bool {
        matches!(self, Self::Sent | Self::PartiallyPaid | Self::Overdue)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub contact_id: Uuid,
    /// Originating booking, when the invoice was raised from one.
    /// At most one invoice per booking (unique index).
    pub booking_id: Option<Uuid>,
    /// Unique, immutable once issued.
    pub invoice_number: String,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub tax_rate_percent: Decimal,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub amount_paid: Decimal,
    pub amount_due: Decimal,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    /// Soft-delete marker; soft-deleted invoices are invisible to the ledger.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency guard for all invoice updates.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::contact::Entity",
        from = "Column::ContactId",
        to = "super::contact::Column::Id"
    )]
    Contact,
    #[sea_orm(
        belongs_to = "super::booking::Entity",
        from = "Column::BookingId",
        to = "super::booking::Column::Id"
    )]
    Booking,
    #[sea_orm(has_many = "super::line_item::Entity")]
    LineItems,
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::contact::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Contact.def()
    }
}

impl Related<super::booking::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Booking.def()
    }
}

impl Related<super::line_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LineItems.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_draft_allows_mutation() {
        assert!(InvoiceStatus::Draft.allows_draft_mutation());
        for status in [
            InvoiceStatus::Sent,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Cancelled,
        ] {
            assert!(!status.allows_draft_mutation(), "{status} must be immutable");
        }
    }

    #[test]
    fn payment_accepted_while_overdue() {
        assert!(InvoiceStatus::Sent.accepts_payment());
        assert!(InvoiceStatus::PartiallyPaid.accepts_payment());
        assert!(InvoiceStatus::Overdue.accepts_payment());
        assert!(!InvoiceStatus::Draft.accepts_payment());
        assert!(!InvoiceStatus::Paid.accepts_payment());
        assert!(!InvoiceStatus::Cancelled.accepts_payment());
    }

    #[test]
    fn status_display_matches_wire_format() {
        assert_eq!(InvoiceStatus::PartiallyPaid.to_string(), "PARTIALLY_PAID");
        assert_eq!(InvoiceStatus::Draft.to_string(), "DRAFT");
    }
}
