use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which entity an activity belongs to. One polymorphic table carries the
/// audit trail for all four entity types; the aggregator treats each kind
/// as an independent stream.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    #[sea_orm(string_value = "CONTACT")]
    Contact,
    #[sea_orm(string_value = "ENQUIRY")]
    Enquiry,
    #[sea_orm(string_value = "BOOKING")]
    Booking,
    #[sea_orm(string_value = "INVOICE")]
    Invoice,
}

/// Closed enumeration of audit-worthy events, per entity kind.
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(64))")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ActivityType {
    #[sea_orm(string_value = "CONTACT_CREATED")]
    ContactCreated,
    #[sea_orm(string_value = "CONTACT_UPDATED")]
    ContactUpdated,
    #[sea_orm(string_value = "ENQUIRY_CREATED")]
    EnquiryCreated,
    #[sea_orm(string_value = "ENQUIRY_UPDATED")]
    EnquiryUpdated,
    #[sea_orm(string_value = "STAGE_CHANGED")]
    StageChanged,
    #[sea_orm(string_value = "BOOKING_CREATED")]
    BookingCreated,
    #[sea_orm(string_value = "BOOKING_UPDATED")]
    BookingUpdated,
    #[sea_orm(string_value = "BOOKING_STATUS_CHANGED")]
    BookingStatusChanged,
    #[sea_orm(string_value = "BOOKING_RESCHEDULED")]
    BookingRescheduled,
    #[sea_orm(string_value = "INVOICE_CREATED")]
    InvoiceCreated,
    #[sea_orm(string_value = "INVOICE_UPDATED")]
    InvoiceUpdated,
    #[sea_orm(string_value = "INVOICE_SENT")]
    InvoiceSent,
    #[sea_orm(string_value = "LINE_ITEM_ADDED")]
    LineItemAdded,
    #[sea_orm(string_value = "LINE_ITEM_UPDATED")]
    LineItemUpdated,
    #[sea_orm(string_value = "LINE_ITEM_DELETED")]
    LineItemDeleted,
    #[sea_orm(string_value = "PAYMENT_RECORDED")]
    PaymentRecorded,
    #[sea_orm(string_value = "PAYMENT_DELETED")]
    PaymentDeleted,
    #[sea_orm(string_value = "INVOICE_STATUS_CHANGED")]
    InvoiceStatusChanged,
}

impl ActivityType {
    /// The entity kind this activity type belongs to.
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            Self::ContactCreated | Self::ContactUpdated => EntityKind::Contact,
            Self::EnquiryCreated | Self::EnquiryUpdated | Self::StageChanged => EntityKind::Enquiry,
            Self::BookingCreated
            | Self::BookingUpdated
            | Self::BookingStatusChanged
            | Self::BookingRescheduled => EntityKind::Booking,
            Self::InvoiceCreated
            | Self::InvoiceUpdated
            | Self::InvoiceSent
            | Self::LineItemAdded
            | Self::LineItemUpdated
            | Self::LineItemDeleted
            | Self::PaymentRecorded
            | Self::PaymentDeleted
            | Self::InvoiceStatusChanged => EntityKind::Invoice,
        }
    }
}

/// A single field's before/after pair inside a diff payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

/// Field-level diff as recorded in `*_UPDATED` payloads, keyed by the
/// wire field name.
pub type Changes = BTreeMap<String, FieldChange>;

/// Typed payloads, one variant per activity type. They serialize to the
/// type-tagged flat map downstream renderers consume; key names are part
/// of the wire contract and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum ActivityPayload {
    ContactCreated {
        name: String,
    },
    ContactUpdated {
        changes: Changes,
    },
    EnquiryCreated {
        subject: String,
        contact_name: String,
    },
    EnquiryUpdated {
        changes: Changes,
    },
    StageChanged {
        from: String,
        to: String,
    },
    BookingCreated {
        service: String,
        contact_name: String,
    },
    BookingUpdated {
        changes: Changes,
    },
    BookingStatusChanged {
        from: String,
        to: String,
    },
    BookingRescheduled {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    InvoiceCreated {
        invoice_number: String,
        contact_name: String,
        total: Decimal,
        #[serde(skip_serializing_if = "Option::is_none")]
        from_booking: Option<bool>,
    },
    InvoiceUpdated {
        changes: Changes,
    },
    InvoiceSent {
        invoice_number: String,
    },
    LineItemAdded {
        description: String,
        total: Decimal,
    },
    LineItemUpdated {
        description: String,
        changes: Changes,
    },
    LineItemDeleted {
        description: String,
        total: Decimal,
    },
    PaymentRecorded {
        amount: Decimal,
        method: String,
        invoice_number: String,
    },
    PaymentDeleted {
        amount: Decimal,
        method: String,
        invoice_number: String,
    },
    InvoiceStatusChanged {
        from: String,
        to: String,
    },
}

impl ActivityPayload {
    pub fn activity_type(&self) -> ActivityType {
        match self {
            Self::ContactCreated { .. } => ActivityType::ContactCreated,
            Self::ContactUpdated { .. } => ActivityType::ContactUpdated,
            Self::EnquiryCreated { .. } => ActivityType::EnquiryCreated,
            Self::EnquiryUpdated { .. } => ActivityType::EnquiryUpdated,
            Self::StageChanged { .. } => ActivityType::StageChanged,
            Self::BookingCreated { .. } => ActivityType::BookingCreated,
            Self::BookingUpdated { .. } => ActivityType::BookingUpdated,
            Self::BookingStatusChanged { .. } => ActivityType::BookingStatusChanged,
            Self::BookingRescheduled { .. } => ActivityType::BookingRescheduled,
            Self::InvoiceCreated { .. } => ActivityType::InvoiceCreated,
            Self::InvoiceUpdated { .. } => ActivityType::InvoiceUpdated,
            Self::InvoiceSent { .. } => ActivityType::InvoiceSent,
            Self::LineItemAdded { .. } => ActivityType::LineItemAdded,
            Self::LineItemUpdated { .. } => ActivityType::LineItemUpdated,
            Self::LineItemDeleted { .. } => ActivityType::LineItemDeleted,
            Self::PaymentRecorded { .. } => ActivityType::PaymentRecorded,
            Self::PaymentDeleted { .. } => ActivityType::PaymentDeleted,
            Self::InvoiceStatusChanged { .. } => ActivityType::InvoiceStatusChanged,
        }
    }

    /// The entity kind this payload's activity belongs to.
    pub fn entity_kind(&self) -> EntityKind {
        self.activity_type().entity_kind()
    }
}

/// An immutable audit record. Created exactly once per audit-worthy
/// mutation; never updated or deleted. Ordered by `(created_at, id)`
/// descending for display.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "activities")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub activity_type: ActivityType,
    pub payload: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Decodes the stored payload back into its typed form.
    pub fn typed_payload(&self) -> Result<ActivityPayload, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn payload_serializes_to_type_tagged_flat_map() {
        let payload = ActivityPayload::InvoiceCreated {
            invoice_number: "INV-2025-0001".into(),
            contact_name: "Ada Lovelace".into(),
            total: dec!(59.99),
            from_booking: Some(true),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], json!("INVOICE_CREATED"));
        assert_eq!(value["invoiceNumber"], json!("INV-2025-0001"));
        assert_eq!(value["contactName"], json!("Ada Lovelace"));
        assert_eq!(value["fromBooking"], json!(true));
    }

    #[test]
    fn from_booking_is_absent_when_none() {
        let payload = ActivityPayload::InvoiceCreated {
            invoice_number: "INV-2025-0002".into(),
            contact_name: "Ada Lovelace".into(),
            total: dec!(10.00),
            from_booking: None,
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert!(value.get("fromBooking").is_none());
    }

    #[test]
    fn status_change_payload_uses_from_to_keys() {
        let payload = ActivityPayload::InvoiceStatusChanged {
            from: "SENT".into(),
            to: "PAID".into(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"], json!("INVOICE_STATUS_CHANGED"));
        assert_eq!(value["from"], json!("SENT"));
        assert_eq!(value["to"], json!("PAID"));
    }

    #[test]
    fn payload_round_trips_through_json() {
        let payload = ActivityPayload::PaymentRecorded {
            amount: dec!(59.99),
            method: "CARD".into(),
            invoice_number: "INV-2025-0003".into(),
        };
        let value = serde_json::to_value(&payload).unwrap();
        let decoded: ActivityPayload = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn activity_types_belong_to_their_entity_kind() {
        assert_eq!(ActivityType::StageChanged.entity_kind(), EntityKind::Enquiry);
        assert_eq!(
            ActivityType::BookingRescheduled.entity_kind(),
            EntityKind::Booking
        );
        assert_eq!(
            ActivityType::PaymentRecorded.entity_kind(),
            EntityKind::Invoice
        );
        assert_eq!(
            ActivityType::ContactUpdated.entity_kind(),
            EntityKind::Contact
        );
    }

    #[test]
    fn payload_type_and_kind_agree() {
        let payload = ActivityPayload::StageChanged {
            from: "NEW".into(),
            to: "QUOTED".into(),
        };
        assert_eq!(payload.activity_type(), ActivityType::StageChanged);
        assert_eq!(payload.entity_kind(), EntityKind::Enquiry);
    }
}
