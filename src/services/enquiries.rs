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
use crate::entities::contact::Entity as Contact;
use crate::entities::enquiry::{self, Entity as Enquiry, EnquiryStage};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::services::activity_log::{diff, record_activity, Snapshot};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateEnquiryRequest {
    pub contact_id: Uuid,
    #[validate(length(min = 1, max = 500))]
    pub subject: String,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateEnquiryRequest {
    #[validate(length(min = 1, max = 500))]
    pub subject: Option<String>,
    #[validate(length(max = 5000))]
    pub notes: Option<String>,
}

/// Pipeline enquiries. Stage movement is the audit-worthy event here:
/// `update_stage` emits the specific `STAGE_CHANGED` activity, which takes
/// priority over and excludes the generic diff activity.
pub struct EnquiryService {
    db: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl EnquiryService {
    pub fn new(db: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, request), fields(contact_id = %request.contact_id))]
    pub async fn create_enquiry(
        &self,
        request: CreateEnquiryRequest,
    ) -> Result<enquiry::Model, ServiceError> {
        request.validate()?;

        let contact = Contact::find_by_id(request.contact_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Contact {} not found", request.contact_id))
            })?;

        let now = Utc::now();
        let txn = self.db.begin().await?;

        let row = enquiry::ActiveModel {
            id: Set(Uuid::new_v4()),
            contact_id: Set(request.contact_id),
            subject: Set(request.subject),
            stage: Set(EnquiryStage::New),
            notes: Set(request.notes),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await?;

        record_activity(
            &txn,
            row.id,
            ActivityPayload::EnquiryCreated {
                subject: row.subject.clone(),
                contact_name: contact.display_name(),
            },
        )
        .await?;

        txn.commit().await?;

        Ok(row)
    }

    /// Moves an enquiry along the pipeline. A no-op when the stage is
    /// unchanged; otherwise emits `STAGE_CHANGED {from, to}`.
    #[instrument(skip(self), fields(enquiry_id = %enquiry_id, stage = %stage))]
    pub async fn update_stage(
        &self,
        enquiry_id: Uuid,
        stage: EnquiryStage,
    ) -> Result<enquiry::Model, ServiceError> {
        let txn = self.db.begin().await?;
        let current = Enquiry::find_by_id(enquiry_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Enquiry {enquiry_id} not found")))?;

        if current.stage == stage {
            txn.commit().await?;
            return Ok(current);
        }

        let old_stage = current.stage;
        let mut active: enquiry::ActiveModel = current.into();
        active.stage = Set(stage);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        record_activity(
            &txn,
            enquiry_id,
            ActivityPayload::StageChanged {
                from: old_stage.to_string(),
                to: stage.to_string(),
            },
        )
        .await?;

        txn.commit().await?;

        if let Some(sender) = &self.event_sender {
            let _ = sender
                .send(Event::EnquiryStageChanged {
                    enquiry_id,
                    old_stage: old_stage.to_string(),
                    new_stage: stage.to_string(),
                })
                .await;
        }

        Ok(updated)
    }

    /// Patches non-stage fields, emitting `ENQUIRY_UPDATED` with the diff
    /// when anything changed.
    #[instrument(skip(self, patch), fields(enquiry_id = %enquiry_id))]
    pub async fn update_enquiry(
        &self,
        enquiry_id: Uuid,
        patch: UpdateEnquiryRequest,
    ) -> Result<enquiry::Model, ServiceError> {
        patch.validate()?;

        let txn = self.db.begin().await?;
        let current = Enquiry::find_by_id(enquiry_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Enquiry {enquiry_id} not found")))?;

        let old_snapshot = enquiry_snapshot(&current);
        let mut new_snapshot = Snapshot::new();
        if let Some(subject) = &patch.subject {
            new_snapshot.insert("subject".into(), json!(subject));
        }
        if let Some(notes) = &patch.notes {
            new_snapshot.insert("notes".into(), json!(notes));
        }

        let changes = diff(&old_snapshot, &new_snapshot, &["subject", "notes"]);
        if changes.is_empty() {
            txn.commit().await?;
            return Ok(current);
        }

        let mut active: enquiry::ActiveModel = current.into();
        if let Some(subject) = patch.subject {
            active.subject = Set(subject);
        }
        if let Some(notes) = patch.notes {
            active.notes = Set(Some(notes));
        }
        active.updated_at = Set(Utc::now());
        let updated = active.update(&txn).await?;

        record_activity(&txn, enquiry_id, ActivityPayload::EnquiryUpdated { changes }).await?;

        txn.commit().await?;

        Ok(updated)
    }
}

fn enquiry_snapshot(enquiry: &enquiry::Model) -> Snapshot {
    let value = json!({
        "subject": enquiry.subject,
        "notes": enquiry.notes,
    });
    value.as_object().cloned().unwrap_or_default()
}
