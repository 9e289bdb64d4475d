use std::sync::Arc;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionTrait};
use serde::Deserialize;
use serde_json::json;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::activity::ActivityPayload;
use crate::entities::contact::{self, Entity as Contact};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::activity_log::{diff, record_activity, Snapshot};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContactRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateContactRequest {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 50))]
    pub phone: Option<String>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

pub struct ContactService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl ContactService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request))]
    pub async fn create_contact(
        &self,
        request: CreateContactRequest,
    ) -> Result<contact::Model, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let row = contact::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(request.first_name),
            last_name: Set(request.last_name),
            email: Set(request.email),
            phone: Set(request.phone),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        record_activity(
            &txn,
            row.id,
            ActivityPayload::ContactCreated {
                name: row.display_name(),
            },
        )
        .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            let _ = sender.send(Event::ContactCreated(row.id)).await;
        }

        Ok(row)
    }

    /// Patches contact fields, emitting a `CONTACT_UPDATED` activity with a
    /// field-level diff when anything actually changed.
    #[instrument(skip(self, patch), fields(contact_id = %contact_id))]
    pub async fn update_contact(
        &self,
        contact_id: Uuid,
        patch: UpdateContactRequest,
    ) -> Result<contact::Model, ServiceError> {
        patch.validate()?;

        let txn = self.db.begin().await?;
        let current = Contact::find_by_id(contact_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Contact {contact_id} not found")))?;

        let old_snapshot = contact_snapshot(&current);
        let mut new_snapshot = Snapshot::new();
        if let Some(first_name) = &patch.first_name {
            new_snapshot.insert("firstName".into(), json!(first_name));
        }
        if let Some(last_name) = &patch.last_name {
            new_snapshot.insert("lastName".into(), json!(last_name));
        }
        if let Some(email) = &patch.email {
            new_snapshot.insert("email".into(), json!(email));
        }
        if let Some(phone) = &patch.phone {
            new_snapshot.insert("phone".into(), json!(phone));
        }
        if let Some(notes) = &patch.notes {
            new_snapshot.insert("notes".into(), json!(notes));
        }

        let changes = diff(
            &old_snapshot,
            &new_snapshot,
            &["firstName", "lastName", "email", "phone", "notes"],
        );
        if changes.is_empty() {
            txn.commit().await?;
            return Ok(current);
        }

        let mut active: contact::ActiveModel = current.into();
        if let Some(first_name) = patch.first_name {
            active.first_name = Set(first_name);
        }
        if let Some(last_name) = patch.last_name {
            active.last_name = Set(last_name);
        }
        if let Some(email) = patch.email {
            active.email = Set(Some(email));
        }
        if let Some(phone) = patch.phone {
            active.phone = Set(Some(phone));
        }
        if let Some(notes) = patch.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        record_activity(&txn, contact_id, ActivityPayload::ContactUpdated { changes }).await?;

        txn.commit().await?;

        Ok(updated)
    }
}

fn contact_snapshot(contact: &contact::Model) -> Snapshot {
    let value = json!({
        "firstName": contact.first_name,
        "lastName": contact.last_name,
        "email": contact.email,
        "phone": contact.phone,
        "notes": contact.notes,
    });
    value.as_object().cloned().unwrap_or_default()
}
