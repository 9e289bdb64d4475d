use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set, SqlErr, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::activity::ActivityPayload;
use crate::entities::booking::Entity as Booking;
use crate::entities::contact::Entity as Contact;
use crate::entities::invoice::{self, Entity as Invoice, InvoiceStatus};
use crate::entities::line_item::{self, Entity as LineItem};
use crate::entities::payment::{self, Entity as Payment, PaymentMethod};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::money;
use crate::services::activity_log::{diff, record_activity, Snapshot};
use crate::services::sequence::InvoiceNumberService;

const DEFAULT_PAYMENT_TERMS_DAYS: i64 = 30;

/// Request/response types for the ledger engine. Untrusted input is
/// validated upstream by the schema layer; the bounds here re-check the
/// invariants the core depends on.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LineItemInput {
    #[validate(length(min = 1, max = 500))]
    pub description: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    pub unit_price: Decimal,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvoiceRequest {
    pub contact_id: Uuid,
    pub booking_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub line_items: Vec<LineItemInput>,
    pub tax_rate_percent: Decimal,
    pub issue_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CreateFromBookingRequest {
    pub due_date: Option<DateTime<Utc>>,
    pub tax_rate_percent: Option<Decimal>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub method: PaymentMethod,
    #[validate(length(max = 500))]
    pub reference: Option<String>,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
    /// Makes a blind retry safe: the same key returns the already-applied
    /// result instead of double-counting the payment.
    #[validate(length(min = 1, max = 500))]
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateDraftFieldsRequest {
    pub issue_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub tax_rate_percent: Option<Decimal>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateLineItemRequest {
    #[validate(length(min = 1, max = 500))]
    pub description: Option<String>,
    pub quantity: Option<i32>,
    pub unit_price: Option<Decimal>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceDetail {
    pub invoice: invoice::Model,
    pub line_items: Vec<line_item::Model>,
    pub payments: Vec<payment::Model>,
}

#[derive(Debug, Serialize)]
pub struct RecordPaymentOutcome {
    pub invoice: invoice::Model,
    pub payment: payment::Model,
    /// True when an idempotency key matched an already-applied payment and
    /// no new payment was recorded.
    pub idempotent_replay: bool,
}

/// Owns an invoice's line items, totals, payments and status lifecycle.
///
/// Every mutation runs in one transaction covering the row updates and the
/// activity records it emits, and every invoice update is guarded by the
/// `version` column so concurrent writers cannot apply against stale
/// totals.
pub struct InvoiceService {
    db: Arc<DbPool>,
    sequence: Arc<InvoiceNumberService>,
    event_sender: Option<Arc<EventSender>>,
}

impl InvoiceService {
    pub fn new(
        db: Arc<DbPool>,
        sequence: Arc<InvoiceNumberService>,
        event_sender: Option<Arc<EventSender>>,
    ) -> Self {
        Self {
            db,
            sequence,
            event_sender,
        }
    }

    /// Raises a draft invoice from a booking: one line item derived from
    /// the booking's service and price, quantity 1. At most one invoice may
    /// ever exist per booking.
    #[instrument(skip(self, request), fields(booking_id = %booking_id))]
    pub async fn create_from_booking(
        &self,
        booking_id: Uuid,
        request: CreateFromBookingRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        request.validate()?;

        let booking = Booking::find_by_id(booking_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {booking_id} not found")))?;
        let contact = Contact::find_by_id(booking.contact_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Contact {} not found", booking.contact_id))
            })?;

        if self.invoice_exists_for_booking(booking_id).await? {
            return Err(booking_conflict(booking_id));
        }

        let issue_date = Utc::now();
        let due_date = request
            .due_date
            .unwrap_or(issue_date + Duration::days(DEFAULT_PAYMENT_TERMS_DAYS));
        let tax_rate_percent = request.tax_rate_percent.unwrap_or(Decimal::ZERO);

        let line_items = vec![LineItemInput {
            description: booking.service.clone(),
            quantity: 1,
            unit_price: booking.price,
            sort_order: Some(0),
        }];

        self.insert_invoice(NewInvoice {
            contact_id: booking.contact_id,
            booking_id: Some(booking_id),
            contact_name: contact.display_name(),
            line_items,
            tax_rate_percent,
            issue_date,
            due_date,
            notes: None,
            from_booking: true,
        })
        .await
    }

    /// Raises a draft invoice from explicit line items.
    #[instrument(skip(self, request), fields(contact_id = %request.contact_id))]
    pub async fn create_from_scratch(
        &self,
        request: CreateInvoiceRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        request.validate()?;
        for item in &request.line_items {
            item.validate()?;
            reject_non_positive(item.quantity, item.unit_price)?;
        }

        let contact = Contact::find_by_id(request.contact_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Contact {} not found", request.contact_id))
            })?;

        if let Some(booking_id) = request.booking_id {
            Booking::find_by_id(booking_id)
                .one(&*self.db)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("Booking {booking_id} not found")))?;
            if self.invoice_exists_for_booking(booking_id).await? {
                return Err(booking_conflict(booking_id));
            }
        }

        self.insert_invoice(NewInvoice {
            contact_id: request.contact_id,
            booking_id: request.booking_id,
            contact_name: contact.display_name(),
            line_items: request.line_items,
            tax_rate_percent: request.tax_rate_percent,
            issue_date: request.issue_date,
            due_date: request.due_date,
            notes: request.notes,
            from_booking: false,
        })
        .await
    }

    async fn invoice_exists_for_booking(&self, booking_id: Uuid) -> Result<bool, ServiceError> {
        let existing = Invoice::find()
            .filter(invoice::Column::BookingId.eq(booking_id))
            .one(&*self.db)
            .await?;
        Ok(existing.is_some())
    }

    async fn insert_invoice(&self, new: NewInvoice) -> Result<InvoiceDetail, ServiceError> {
        // The number is allocated before the insert transaction; a failed
        // insert leaves a gap in the sequence, which is acceptable, while
        // uniqueness and monotonicity are not negotiable.
        let invoice_number = self
            .sequence
            .next_invoice_number(new.issue_date.year())
            .await?;

        let now = Utc::now();
        let invoice_id = Uuid::new_v4();

        let line_totals: Vec<Decimal> = new
            .line_items
            .iter()
            .map(|item| money::line_total(item.quantity, item.unit_price))
            .collect();
        let totals = money::invoice_totals(&line_totals, new.tax_rate_percent, Decimal::ZERO);

        let txn = self.db.begin().await?;

        let invoice_model = invoice::ActiveModel {
            id: Set(invoice_id),
            contact_id: Set(new.contact_id),
            booking_id: Set(new.booking_id),
            invoice_number: Set(invoice_number.clone()),
            issue_date: Set(new.issue_date),
            due_date: Set(new.due_date),
            tax_rate_percent: Set(new.tax_rate_percent),
            subtotal: Set(totals.subtotal),
            tax_amount: Set(totals.tax_amount),
            total: Set(totals.total),
            amount_paid: Set(Decimal::ZERO),
            amount_due: Set(totals.amount_due),
            status: Set(InvoiceStatus::Draft),
            notes: Set(new.notes),
            deleted_at: Set(None),
            version: Set(1),
            created_at: Set(now),
            updated_at: Set(now),
        };
        let invoice_row = invoice_model.insert(&txn).await.map_err(|e| {
            map_unique_violation(e, "an invoice already exists for this booking")
        })?;

        let mut item_rows = Vec::with_capacity(new.line_items.len());
        for (index, item) in new.line_items.iter().enumerate() {
            let row = line_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                invoice_id: Set(invoice_id),
                description: Set(item.description.clone()),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                total: Set(line_totals[index]),
                sort_order: Set(item.sort_order.unwrap_or(index as i32)),
                created_at: Set(now),
                updated_at: Set(now),
            };
            item_rows.push(row.insert(&txn).await?);
        }

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::InvoiceCreated {
                invoice_number: invoice_number.clone(),
                contact_name: new.contact_name,
                total: totals.total,
                from_booking: new.from_booking.then_some(true),
            },
        )
        .await?;

        txn.commit().await?;
        info!(%invoice_id, %invoice_number, "invoice created");

        self.emit(Event::InvoiceCreated(invoice_id)).await;

        Ok(InvoiceDetail {
            invoice: invoice_row,
            line_items: item_rows,
            payments: Vec::new(),
        })
    }

    /// Adds a line item to a draft invoice and recomputes the invoice
    /// totals from the full item set.
    #[instrument(skip(self, input), fields(invoice_id = %invoice_id))]
    pub async fn add_line_item(
        &self,
        invoice_id: Uuid,
        input: LineItemInput,
    ) -> Result<InvoiceDetail, ServiceError> {
        input.validate()?;
        reject_non_positive(input.quantity, input.unit_price)?;

        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        require_draft(&current)?;

        let now = Utc::now();
        let existing = load_line_items(&txn, invoice_id).await?;
        let next_sort_order = existing
            .iter()
            .map(|item| item.sort_order)
            .max()
            .map_or(0, |max| max + 1);

        let total = money::line_total(input.quantity, input.unit_price);
        let row = line_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            description: Set(input.description.clone()),
            quantity: Set(input.quantity),
            unit_price: Set(input.unit_price),
            total: Set(total),
            sort_order: Set(input.sort_order.unwrap_or(next_sort_order)),
            created_at: Set(now),
            updated_at: Set(now),
        };
        row.insert(&txn).await?;

        let invoice_row = self.apply_recomputed_totals(&txn, &current).await?;

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::LineItemAdded {
                description: input.description,
                total,
            },
        )
        .await?;

        let line_items = load_line_items(&txn, invoice_id).await?;
        let payments = load_payments(&txn, invoice_id).await?;
        txn.commit().await?;

        Ok(InvoiceDetail {
            invoice: invoice_row,
            line_items,
            payments,
        })
    }

    /// Updates a draft invoice's line item and recomputes totals from the
    /// resulting item set.
    #[instrument(skip(self, patch), fields(invoice_id = %invoice_id, line_item_id = %line_item_id))]
    pub async fn update_line_item(
        &self,
        invoice_id: Uuid,
        line_item_id: Uuid,
        patch: UpdateLineItemRequest,
    ) -> Result<InvoiceDetail, ServiceError> {
        patch.validate()?;
        if let Some(quantity) = patch.quantity {
            if quantity <= 0 {
                return Err(ServiceError::InvalidAmount(
                    "quantity must be positive".to_string(),
                ));
            }
        }
        if let Some(unit_price) = patch.unit_price {
            if unit_price < Decimal::ZERO {
                return Err(ServiceError::InvalidAmount(
                    "unit price must not be negative".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        require_draft(&current)?;

        let item = load_line_item(&txn, invoice_id, line_item_id).await?;

        let quantity = patch.quantity.unwrap_or(item.quantity);
        let unit_price = patch.unit_price.unwrap_or(item.unit_price);
        let new_total = money::line_total(quantity, unit_price);

        let old_snapshot = line_item_snapshot(&item);
        let mut new_snapshot = Snapshot::new();
        if let Some(description) = &patch.description {
            new_snapshot.insert("description".into(), json!(description));
        }
        if patch.quantity.is_some() {
            new_snapshot.insert("quantity".into(), json!(quantity));
        }
        if patch.unit_price.is_some() {
            new_snapshot.insert("unitPrice".into(), dec_json(unit_price));
        }
        if let Some(sort_order) = patch.sort_order {
            new_snapshot.insert("sortOrder".into(), json!(sort_order));
        }
        if patch.quantity.is_some() || patch.unit_price.is_some() {
            new_snapshot.insert("total".into(), dec_json(new_total));
        }
        let changes = diff(
            &old_snapshot,
            &new_snapshot,
            &["description", "quantity", "unitPrice", "sortOrder", "total"],
        );

        let description = patch.description.clone().unwrap_or(item.description.clone());
        let mut active: line_item::ActiveModel = item.into();
        if let Some(new_description) = patch.description {
            active.description = Set(new_description);
        }
        active.quantity = Set(quantity);
        active.unit_price = Set(unit_price);
        active.total = Set(new_total);
        if let Some(sort_order) = patch.sort_order {
            active.sort_order = Set(sort_order);
        }
        active.updated_at = Set(Utc::now());
        active.update(&txn).await?;

        let invoice_row = self.apply_recomputed_totals(&txn, &current).await?;

        if !changes.is_empty() {
            record_activity(
                &txn,
                invoice_id,
                ActivityPayload::LineItemUpdated {
                    description,
                    changes,
                },
            )
            .await?;
        }

        let line_items = load_line_items(&txn, invoice_id).await?;
        let payments = load_payments(&txn, invoice_id).await?;
        txn.commit().await?;

        Ok(InvoiceDetail {
            invoice: invoice_row,
            line_items,
            payments,
        })
    }

    /// Removes a draft invoice's line item and recomputes totals from the
    /// remaining set.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, line_item_id = %line_item_id))]
    pub async fn delete_line_item(
        &self,
        invoice_id: Uuid,
        line_item_id: Uuid,
    ) -> Result<InvoiceDetail, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        require_draft(&current)?;

        let item = load_line_item(&txn, invoice_id, line_item_id).await?;
        let description = item.description.clone();
        let total = item.total;
        LineItem::delete_by_id(item.id).exec(&txn).await?;

        let invoice_row = self.apply_recomputed_totals(&txn, &current).await?;

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::LineItemDeleted { description, total },
        )
        .await?;

        let line_items = load_line_items(&txn, invoice_id).await?;
        let payments = load_payments(&txn, invoice_id).await?;
        txn.commit().await?;

        Ok(InvoiceDetail {
            invoice: invoice_row,
            line_items,
            payments,
        })
    }

    /// Marks a draft invoice as sent. Line items are immutable from here.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn send(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        if !current.status.allows_draft_mutation() {
            return Err(invalid_state("send", current.status));
        }

        let mut update = invoice_patch();
        update.status = Set(InvoiceStatus::Sent);
        let updated = persist_invoice_update(&txn, &current, update).await?;

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::InvoiceSent {
                invoice_number: current.invoice_number.clone(),
            },
        )
        .await?;

        txn.commit().await?;
        info!(%invoice_id, "invoice sent");
        self.emit(Event::InvoiceSent(invoice_id)).await;

        Ok(updated)
    }

    /// Applies a payment to an invoice. The payment insert, the invoice
    /// update and the emitted activity records commit atomically.
    #[instrument(skip(self, request), fields(invoice_id = %invoice_id, amount = %request.amount))]
    pub async fn record_payment(
        &self,
        invoice_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<RecordPaymentOutcome, ServiceError> {
        request.validate()?;
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(
                "payment amount must be positive".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;

        if let Some(key) = &request.idempotency_key {
            let existing = Payment::find()
                .filter(payment::Column::InvoiceId.eq(invoice_id))
                .filter(payment::Column::IdempotencyKey.eq(key.clone()))
                .one(&txn)
                .await?;
            if let Some(existing) = existing {
                txn.commit().await?;
                info!(%invoice_id, idempotency_key = %key, "replayed already-applied payment");
                return Ok(RecordPaymentOutcome {
                    invoice: current,
                    payment: existing,
                    idempotent_replay: true,
                });
            }
        }

        if !current.status.accepts_payment() {
            return Err(invalid_state("record a payment against", current.status));
        }

        let new_amount_paid = money::round_cents(current.amount_paid + request.amount);
        let new_amount_due = money::round_cents(current.total - new_amount_paid);
        let new_status = derive_status_after_payment(current.status, new_amount_paid, new_amount_due);

        let payment_row = payment::ActiveModel {
            id: Set(Uuid::new_v4()),
            invoice_id: Set(invoice_id),
            amount: Set(request.amount),
            method: Set(request.method),
            reference: Set(request.reference),
            notes: Set(request.notes),
            paid_at: Set(request.paid_at),
            idempotency_key: Set(request.idempotency_key),
            created_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await
        .map_err(|e| map_unique_violation(e, "a payment with this idempotency key already exists"))?;

        let mut update = invoice_patch();
        update.amount_paid = Set(new_amount_paid);
        update.amount_due = Set(new_amount_due);
        update.status = Set(new_status);
        let updated = persist_invoice_update(&txn, &current, update).await?;

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::PaymentRecorded {
                amount: request.amount,
                method: payment_row.method.to_string(),
                invoice_number: current.invoice_number.clone(),
            },
        )
        .await?;
        if new_status != current.status {
            record_activity(
                &txn,
                invoice_id,
                ActivityPayload::InvoiceStatusChanged {
                    from: current.status.to_string(),
                    to: new_status.to_string(),
                },
            )
            .await?;
        }

        txn.commit().await?;
        info!(%invoice_id, payment_id = %payment_row.id, status = %new_status, "payment recorded");

        self.emit(Event::PaymentRecorded {
            invoice_id,
            payment_id: payment_row.id,
            amount: payment_row.amount,
        })
        .await;
        if new_status != current.status {
            self.emit(Event::InvoiceStatusChanged {
                invoice_id,
                old_status: current.status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;
        }

        Ok(RecordPaymentOutcome {
            invoice: updated,
            payment: payment_row,
            idempotent_replay: false,
        })
    }

    /// Removes a payment and reverses its effect: `amount_paid` is
    /// recomputed from the remaining payments and the status re-derived.
    #[instrument(skip(self), fields(invoice_id = %invoice_id, payment_id = %payment_id))]
    pub async fn delete_payment(
        &self,
        invoice_id: Uuid,
        payment_id: Uuid,
    ) -> Result<invoice::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        if matches!(
            current.status,
            InvoiceStatus::Draft | InvoiceStatus::Cancelled
        ) {
            return Err(invalid_state("reverse a payment on", current.status));
        }

        let target = Payment::find_by_id(payment_id)
            .filter(payment::Column::InvoiceId.eq(invoice_id))
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {payment_id} not found")))?;

        Payment::delete_by_id(target.id).exec(&txn).await?;

        let remaining = load_payments(&txn, invoice_id).await?;
        let new_amount_paid = money::round_cents(
            remaining
                .iter()
                .map(|p| p.amount)
                .sum::<Decimal>(),
        );
        let new_amount_due = money::round_cents(current.total - new_amount_paid);
        let new_status =
            derive_status_after_reversal(current.status, new_amount_paid, new_amount_due);

        let mut update = invoice_patch();
        update.amount_paid = Set(new_amount_paid);
        update.amount_due = Set(new_amount_due);
        update.status = Set(new_status);
        let updated = persist_invoice_update(&txn, &current, update).await?;

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::PaymentDeleted {
                amount: target.amount,
                method: target.method.to_string(),
                invoice_number: current.invoice_number.clone(),
            },
        )
        .await?;
        if new_status != current.status {
            record_activity(
                &txn,
                invoice_id,
                ActivityPayload::InvoiceStatusChanged {
                    from: current.status.to_string(),
                    to: new_status.to_string(),
                },
            )
            .await?;
        }

        txn.commit().await?;
        info!(%invoice_id, %payment_id, "payment deleted and reversed");

        self.emit(Event::PaymentDeleted {
            invoice_id,
            payment_id,
        })
        .await;

        Ok(updated)
    }

    /// Patches draft-only fields. A tax-rate change recomputes totals from
    /// the existing line items; an `INVOICE_UPDATED` activity is emitted
    /// only when the field-level diff is non-empty.
    #[instrument(skip(self, patch), fields(invoice_id = %invoice_id))]
    pub async fn update_draft_fields(
        &self,
        invoice_id: Uuid,
        patch: UpdateDraftFieldsRequest,
    ) -> Result<invoice::Model, ServiceError> {
        patch.validate()?;

        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        require_draft(&current)?;

        let old_snapshot = invoice_field_snapshot(&current);
        let mut new_snapshot = Snapshot::new();
        if let Some(issue_date) = &patch.issue_date {
            new_snapshot.insert("issueDate".into(), json!(issue_date.to_rfc3339()));
        }
        if let Some(due_date) = &patch.due_date {
            new_snapshot.insert("dueDate".into(), json!(due_date.to_rfc3339()));
        }
        if let Some(tax_rate_percent) = &patch.tax_rate_percent {
            new_snapshot.insert("taxRatePercent".into(), dec_json(*tax_rate_percent));
        }
        if let Some(notes) = &patch.notes {
            new_snapshot.insert("notes".into(), json!(notes));
        }

        let changes = diff(
            &old_snapshot,
            &new_snapshot,
            &["issueDate", "dueDate", "taxRatePercent", "notes"],
        );
        if changes.is_empty() {
            txn.commit().await?;
            return Ok(current);
        }

        let mut update = invoice_patch();
        if let Some(issue_date) = patch.issue_date {
            update.issue_date = Set(issue_date);
        }
        if let Some(due_date) = patch.due_date {
            update.due_date = Set(due_date);
        }
        if let Some(notes) = patch.notes {
            update.notes = Set(Some(notes));
        }
        if let Some(tax_rate_percent) = patch.tax_rate_percent {
            let items = load_line_items(&txn, invoice_id).await?;
            let line_totals: Vec<Decimal> = items.iter().map(|item| item.total).collect();
            let totals =
                money::invoice_totals(&line_totals, tax_rate_percent, current.amount_paid);
            update.tax_rate_percent = Set(tax_rate_percent);
            update.subtotal = Set(totals.subtotal);
            update.tax_amount = Set(totals.tax_amount);
            update.total = Set(totals.total);
            update.amount_due = Set(totals.amount_due);
        }
        let updated = persist_invoice_update(&txn, &current, update).await?;

        record_activity(&txn, invoice_id, ActivityPayload::InvoiceUpdated { changes }).await?;

        txn.commit().await?;

        Ok(updated)
    }

    /// Cancels an invoice. Terminal; allowed from any non-`PAID` state.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn cancel(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        if matches!(current.status, InvoiceStatus::Paid | InvoiceStatus::Cancelled) {
            return Err(invalid_state("cancel", current.status));
        }

        let mut update = invoice_patch();
        update.status = Set(InvoiceStatus::Cancelled);
        let updated = persist_invoice_update(&txn, &current, update).await?;

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::InvoiceStatusChanged {
                from: current.status.to_string(),
                to: InvoiceStatus::Cancelled.to_string(),
            },
        )
        .await?;

        txn.commit().await?;
        self.emit(Event::InvoiceCancelled(invoice_id)).await;

        Ok(updated)
    }

    /// Transition called by the external aging job once an invoice passes
    /// its due date unpaid.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn mark_overdue(&self, invoice_id: Uuid) -> Result<invoice::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        if !matches!(
            current.status,
            InvoiceStatus::Sent | InvoiceStatus::PartiallyPaid
        ) {
            return Err(invalid_state("mark overdue", current.status));
        }

        let mut update = invoice_patch();
        update.status = Set(InvoiceStatus::Overdue);
        let updated = persist_invoice_update(&txn, &current, update).await?;

        record_activity(
            &txn,
            invoice_id,
            ActivityPayload::InvoiceStatusChanged {
                from: current.status.to_string(),
                to: InvoiceStatus::Overdue.to_string(),
            },
        )
        .await?;

        txn.commit().await?;
        self.emit(Event::InvoiceStatusChanged {
            invoice_id,
            old_status: current.status.to_string(),
            new_status: InvoiceStatus::Overdue.to_string(),
        })
        .await;

        Ok(updated)
    }

    /// Soft-deletes an invoice. Only `DRAFT` and `CANCELLED` invoices may
    /// be deleted; the row and its activity trail are retained.
    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    pub async fn delete_invoice(&self, invoice_id: Uuid) -> Result<(), ServiceError> {
        let txn = self.db.begin().await?;
        let current = load_invoice(&txn, invoice_id).await?;
        if !matches!(
            current.status,
            InvoiceStatus::Draft | InvoiceStatus::Cancelled
        ) {
            return Err(invalid_state("delete", current.status));
        }

        let mut update = invoice_patch();
        update.deleted_at = Set(Some(Utc::now()));
        persist_invoice_update(&txn, &current, update).await?;

        txn.commit().await?;
        info!(%invoice_id, "invoice soft-deleted");

        Ok(())
    }

    /// Fetches an invoice with its line items and payments.
    pub async fn get_invoice(&self, invoice_id: Uuid) -> Result<InvoiceDetail, ServiceError> {
        let invoice = load_invoice(&*self.db, invoice_id).await?;
        let line_items = load_line_items(&*self.db, invoice_id).await?;
        let payments = load_payments(&*self.db, invoice_id).await?;

        Ok(InvoiceDetail {
            invoice,
            line_items,
            payments,
        })
    }

    /// Recomputes the invoice totals from the full current line-item set
    /// and persists them with a version check.
    async fn apply_recomputed_totals<C: ConnectionTrait>(
        &self,
        conn: &C,
        current: &invoice::Model,
    ) -> Result<invoice::Model, ServiceError> {
        let items = load_line_items(conn, current.id).await?;
        let line_totals: Vec<Decimal> = items.iter().map(|item| item.total).collect();
        let totals =
            money::invoice_totals(&line_totals, current.tax_rate_percent, current.amount_paid);

        let mut update = invoice_patch();
        update.subtotal = Set(totals.subtotal);
        update.tax_amount = Set(totals.tax_amount);
        update.total = Set(totals.total);
        update.amount_due = Set(totals.amount_due);

        persist_invoice_update(conn, current, update).await
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            if let Err(error) = sender.send(event).await {
                tracing::warn!(%error, "failed to send event");
            }
        }
    }
}

struct NewInvoice {
    contact_id: Uuid,
    booking_id: Option<Uuid>,
    contact_name: String,
    line_items: Vec<LineItemInput>,
    tax_rate_percent: Decimal,
    issue_date: DateTime<Utc>,
    due_date: DateTime<Utc>,
    notes: Option<String>,
    from_booking: bool,
}

/// An all-`NotSet` active model for partial, version-checked updates.
fn invoice_patch() -> invoice::ActiveModel {
    invoice::ActiveModel {
        ..Default::default()
    }
}

/// Status after applying a payment. Total and deterministic over
/// `(total, amount_paid)`: `PAID` iff nothing remains due, otherwise
/// `PARTIALLY_PAID` once anything has been paid, otherwise unchanged.
fn derive_status_after_payment(
    current: InvoiceStatus,
    new_amount_paid: Decimal,
    new_amount_due: Decimal,
) -> InvoiceStatus {
    if new_amount_due <= Decimal::ZERO {
        InvoiceStatus::Paid
    } else if new_amount_paid > Decimal::ZERO {
        InvoiceStatus::PartiallyPaid
    } else {
        current
    }
}

/// Status after reversing a payment. Falls back to `SENT` when nothing
/// remains paid, except that an `OVERDUE` invoice stays overdue.
fn derive_status_after_reversal(
    current: InvoiceStatus,
    new_amount_paid: Decimal,
    new_amount_due: Decimal,
) -> InvoiceStatus {
    if new_amount_due <= Decimal::ZERO {
        InvoiceStatus::Paid
    } else if new_amount_paid > Decimal::ZERO {
        if current == InvoiceStatus::Overdue {
            InvoiceStatus::Overdue
        } else {
            InvoiceStatus::PartiallyPaid
        }
    } else if matches!(
        current,
        InvoiceStatus::Paid | InvoiceStatus::PartiallyPaid
    ) {
        InvoiceStatus::Sent
    } else {
        current
    }
}

async fn load_invoice<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
) -> Result<invoice::Model, ServiceError> {
    Invoice::find_by_id(invoice_id)
        .filter(invoice::Column::DeletedAt.is_null())
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Invoice {invoice_id} not found")))
}

async fn load_line_items<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
) -> Result<Vec<line_item::Model>, ServiceError> {
    let items = LineItem::find()
        .filter(line_item::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(line_item::Column::SortOrder)
        .order_by_asc(line_item::Column::CreatedAt)
        .all(conn)
        .await?;
    Ok(items)
}

async fn load_line_item<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
    line_item_id: Uuid,
) -> Result<line_item::Model, ServiceError> {
    LineItem::find_by_id(line_item_id)
        .filter(line_item::Column::InvoiceId.eq(invoice_id))
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Line item {line_item_id} not found")))
}

async fn load_payments<C: ConnectionTrait>(
    conn: &C,
    invoice_id: Uuid,
) -> Result<Vec<payment::Model>, ServiceError> {
    let payments = Payment::find()
        .filter(payment::Column::InvoiceId.eq(invoice_id))
        .order_by_asc(payment::Column::PaidAt)
        .all(conn)
        .await?;
    Ok(payments)
}

/// Writes an invoice patch guarded by the optimistic version column. Zero
/// rows affected means another writer got there first; the surrounding
/// transaction rolls back when the error propagates.
async fn persist_invoice_update<C: ConnectionTrait>(
    conn: &C,
    current: &invoice::Model,
    mut update: invoice::ActiveModel,
) -> Result<invoice::Model, ServiceError> {
    update.version = Set(current.version + 1);
    update.updated_at = Set(Utc::now());

    let result = Invoice::update_many()
        .set(update)
        .filter(invoice::Column::Id.eq(current.id))
        .filter(invoice::Column::Version.eq(current.version))
        .exec(conn)
        .await?;
    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(current.id));
    }

    Invoice::find_by_id(current.id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::InternalError("updated invoice row vanished".to_string()))
}

fn require_draft(invoice: &invoice::Model) -> Result<(), ServiceError> {
    if invoice.status.allows_draft_mutation() {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "invoice {} is {} and can no longer be edited",
            invoice.invoice_number, invoice.status
        )))
    }
}

fn invalid_state(operation: &str, status: InvoiceStatus) -> ServiceError {
    ServiceError::InvalidState(format!("cannot {operation} an invoice in status {status}"))
}

fn booking_conflict(booking_id: Uuid) -> ServiceError {
    ServiceError::Conflict(format!("an invoice already exists for booking {booking_id}"))
}

fn reject_non_positive(quantity: i32, unit_price: Decimal) -> Result<(), ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::InvalidAmount(
            "quantity must be positive".to_string(),
        ));
    }
    if unit_price < Decimal::ZERO {
        return Err(ServiceError::InvalidAmount(
            "unit price must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn map_unique_violation(err: DbErr, conflict_message: &str) -> ServiceError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            ServiceError::Conflict(conflict_message.to_string())
        }
        _ => ServiceError::DatabaseError(err),
    }
}

// Decimals are normalized so a stored 20.00 and a patched 20 compare equal
// in diffs regardless of scale.
fn dec_json(value: Decimal) -> serde_json::Value {
    json!(value.normalize())
}

fn line_item_snapshot(item: &line_item::Model) -> Snapshot {
    let value = json!({
        "description": item.description,
        "quantity": item.quantity,
        "unitPrice": dec_json(item.unit_price),
        "total": dec_json(item.total),
        "sortOrder": item.sort_order,
    });
    value.as_object().cloned().unwrap_or_default()
}

fn invoice_field_snapshot(invoice: &invoice::Model) -> Snapshot {
    let value = json!({
        "issueDate": invoice.issue_date.to_rfc3339(),
        "dueDate": invoice.due_date.to_rfc3339(),
        "taxRatePercent": dec_json(invoice.tax_rate_percent),
        "notes": invoice.notes,
    });
    value.as_object().cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn payment_status_is_paid_iff_nothing_due() {
        let status =
            derive_status_after_payment(InvoiceStatus::Sent, dec!(59.99), dec!(0.00));
        assert_eq!(status, InvoiceStatus::Paid);

        // overpayment also settles
        let status =
            derive_status_after_payment(InvoiceStatus::PartiallyPaid, dec!(70.00), dec!(-10.01));
        assert_eq!(status, InvoiceStatus::Paid);
    }

    #[test]
    fn payment_status_partial_when_something_remains() {
        let status = derive_status_after_payment(InvoiceStatus::Sent, dec!(20.00), dec!(39.99));
        assert_eq!(status, InvoiceStatus::PartiallyPaid);

        let status =
            derive_status_after_payment(InvoiceStatus::Overdue, dec!(20.00), dec!(39.99));
        assert_eq!(status, InvoiceStatus::PartiallyPaid);
    }

    #[test]
    fn payment_status_unchanged_when_nothing_paid() {
        let status = derive_status_after_payment(InvoiceStatus::Sent, dec!(0.00), dec!(59.99));
        assert_eq!(status, InvoiceStatus::Sent);
    }

    #[test]
    fn reversal_falls_back_to_sent_when_nothing_remains_paid() {
        let status =
            derive_status_after_reversal(InvoiceStatus::Paid, dec!(0.00), dec!(59.99));
        assert_eq!(status, InvoiceStatus::Sent);

        let status =
            derive_status_after_reversal(InvoiceStatus::PartiallyPaid, dec!(0.00), dec!(59.99));
        assert_eq!(status, InvoiceStatus::Sent);
    }

    #[test]
    fn reversal_keeps_overdue_invoices_overdue() {
        let status =
            derive_status_after_reversal(InvoiceStatus::Overdue, dec!(0.00), dec!(59.99));
        assert_eq!(status, InvoiceStatus::Overdue);

        let status =
            derive_status_after_reversal(InvoiceStatus::Overdue, dec!(10.00), dec!(49.99));
        assert_eq!(status, InvoiceStatus::Overdue);
    }

    #[test]
    fn reversal_downgrades_paid_to_partially_paid() {
        let status =
            derive_status_after_reversal(InvoiceStatus::Paid, dec!(30.00), dec!(29.99));
        assert_eq!(status, InvoiceStatus::PartiallyPaid);
    }
}
