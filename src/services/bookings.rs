use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::activity::ActivityPayload;
use crate::entities::booking::{self, BookingStatus, Entity as Booking};
use crate::entities::contact::Entity as Contact;
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::activity_log::{diff, record_activity, Snapshot};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateBookingRequest {
    pub contact_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub service: String,
    pub price: Decimal,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateBookingRequest {
    #[validate(length(min = 1, max = 500))]
    pub service: Option<String>,
    pub price: Option<Decimal>,
    #[validate(length(max = 500))]
    pub location: Option<String>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

/// Bookings. Status changes and reschedules are the specific audit events;
/// other field edits fall back to the generic diff activity.
pub struct BookingService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl BookingService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(contact_id = %request.contact_id))]
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<booking::Model, ServiceError> {
        request.validate()?;
        if request.price < Decimal::ZERO {
            return Err(ServiceError::InvalidAmount(
                "booking price must not be negative".to_string(),
            ));
        }
        if request.ends_at < request.starts_at {
            return Err(ServiceError::ValidationFailed(
                "booking cannot end before it starts".to_string(),
            ));
        }

        let contact = Contact::find_by_id(request.contact_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Contact {} not found", request.contact_id))
            })?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let row = booking::ActiveModel {
            id: Set(Uuid::new_v4()),
            contact_id: Set(request.contact_id),
            service: Set(request.service),
            price: Set(request.price),
            status: Set(BookingStatus::Scheduled),
            starts_at: Set(request.starts_at),
            ends_at: Set(request.ends_at),
            location: Set(request.location),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        record_activity(
            &txn,
            row.id,
            ActivityPayload::BookingCreated {
                service: row.service.clone(),
                contact_name: contact.display_name(),
            },
        )
        .await?;

        txn.commit().await?;

        Ok(row)
    }

    /// Moves a booking through its status lifecycle; a no-op when the
    /// status is unchanged.
    #[instrument(skip(self), fields(booking_id = %booking_id, status = %status))]
    pub async fn update_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
    ) -> Result<booking::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = Booking::find_by_id(booking_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {booking_id} not found")))?;

        if current.status == status {
            txn.commit().await?;
            return Ok(current);
        }

        let old_status = current.status;
        let mut active: booking::ActiveModel = current.into();
        active.status = Set(status);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        record_activity(
            &txn,
            booking_id,
            ActivityPayload::BookingStatusChanged {
                from: old_status.to_string(),
                to: status.to_string(),
            },
        )
        .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::BookingStatusChanged {
                    booking_id,
                    old_status: old_status.to_string(),
                    new_status: status.to_string(),
                })
                .await;
        }

        Ok(updated)
    }

    /// Moves a booking in time, emitting `BOOKING_RESCHEDULED` with the old
    /// and new start instants.
    #[instrument(skip(self), fields(booking_id = %booking_id))]
    pub async fn reschedule(
        &self,
        booking_id: Uuid,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Result<booking::Model, ServiceError> {
        if ends_at < starts_at {
            return Err(ServiceError::ValidationFailed(
                "booking cannot end before it starts".to_string(),
            ));
        }

        let txn = self.db.begin().await?;
        let current = Booking::find_by_id(booking_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {booking_id} not found")))?;

        if current.starts_at == starts_at && current.ends_at == ends_at {
            txn.commit().await?;
            return Ok(current);
        }

        let old_starts_at = current.starts_at;
        let mut active: booking::ActiveModel = current.into();
        active.starts_at = Set(starts_at);
        active.ends_at = Set(ends_at);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        record_activity(
            &txn,
            booking_id,
            ActivityPayload::BookingRescheduled {
                from: old_starts_at,
                to: starts_at,
            },
        )
        .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::BookingRescheduled(booking_id)).await;
        }

        Ok(updated)
    }

    /// Patches descriptive fields, emitting `BOOKING_UPDATED` with the diff
    /// when anything changed.
    #[instrument(skip(self, patch), fields(booking_id = %booking_id))]
    pub async fn update_booking(
        &self,
        booking_id: Uuid,
        patch: UpdateBookingRequest,
    ) -> Result<booking::Model, ServiceError> {
        patch.validate()?;
        if let Some(price) = patch.price {
            if price < Decimal::ZERO {
                return Err(ServiceError::InvalidAmount(
                    "booking price must not be negative".to_string(),
                ));
            }
        }

        let txn = self.db.begin().await?;
        let current = Booking::find_by_id(booking_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {booking_id} not found")))?;

        let old_snapshot = booking_snapshot(&current);
        let mut new_snapshot = Snapshot::new();
        if let Some(service) = &patch.service {
            new_snapshot.insert("service".into(), json!(service));
        }
        if let Some(price) = &patch.price {
            new_snapshot.insert("price".into(), json!(price.normalize()));
        }
        if let Some(location) = &patch.location {
            new_snapshot.insert("location".into(), json!(location));
        }
        if let Some(notes) = &patch.notes {
            new_snapshot.insert("notes".into(), json!(notes));
        }

        let changes = diff(
            &old_snapshot,
            &new_snapshot,
            &["service", "price", "location", "notes"],
        );
        if changes.is_empty() {
            txn.commit().await?;
            return Ok(current);
        }

        let mut active: booking::ActiveModel = current.into();
        if let Some(service) = patch.service {
            active.service = Set(service);
        }
        if let Some(price) = patch.price {
            active.price = Set(price);
        }
        if let Some(location) = patch.location {
            active.location = Set(Some(location));
        }
        if let Some(notes) = patch.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        record_activity(&txn, booking_id, ActivityPayload::BookingUpdated { changes }).await?;

        txn.commit().await?;

        Ok(updated)
    }
}

fn booking_snapshot(booking: &booking::Model) -> Snapshot {
    let value = json!({
        "service": booking.service,
        "price": booking.price.normalize(),
        "location": booking.location,
        "notes": booking.notes,
    });
    value.as_object().cloned().unwrap_or_default()
}
