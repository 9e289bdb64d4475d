use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::activity::{self, ActivityPayload, Changes, Entity as Activity, FieldChange};
use crate::errors::ServiceError;

/// A field-name/value snapshot of an entity, as used by [`diff`]. Keys are
/// the wire field names that end up in activity payloads.
pub type Snapshot = serde_json::Map<String, Value>;

/// Appends one immutable activity row on `conn`, which may be a pooled
/// connection or an open transaction so the record commits atomically with
/// the mutation it describes. The entity kind and type column are derived
/// from the payload variant.
pub async fn record_activity<C: ConnectionTrait>(
    conn: &C,
    entity_id: Uuid,
    payload: ActivityPayload,
) -> Result<activity::Model, ServiceError> {
    let payload_json = serde_json::to_value(&payload)
        .map_err(|e| ServiceError::SerializationError(e.to_string()))?;

    let model = activity::ActiveModel {
        id: Set(Uuid::new_v4()),
        entity_kind: Set(payload.entity_kind()),
        entity_id: Set(entity_id),
        activity_type: Set(payload.activity_type()),
        payload: Set(payload_json),
        created_at: Set(Utc::now()),
    };

    Ok(model.insert(conn).await?)
}

/// Computes a field-level change set between two snapshots.
///
/// Only `considered_fields` that are present in `new` participate: fields
/// absent from the incoming patch are never considered changed. Equality is
/// value equality, except that two strings which both parse as RFC 3339
/// date-times compare by instant.
pub fn diff(old: &Snapshot, new: &Snapshot, considered_fields: &[&str]) -> Changes {
    let mut changes = Changes::new();

    for field in considered_fields {
        let Some(new_value) = new.get(*field) else {
            continue;
        };
        let old_value = old.get(*field).cloned().unwrap_or(Value::Null);
        if !values_equal(&old_value, new_value) {
            changes.insert(
                (*field).to_string(),
                FieldChange {
                    from: old_value,
                    to: new_value.clone(),
                },
            );
        }
    }

    changes
}

fn values_equal(a: &Value, b: &Value) -> bool {
    if let (Value::String(a), Value::String(b)) = (a, b) {
        if let (Ok(instant_a), Ok(instant_b)) = (
            DateTime::parse_from_rfc3339(a),
            DateTime::parse_from_rfc3339(b),
        ) {
            return instant_a.with_timezone(&Utc) == instant_b.with_timezone(&Utc);
        }
    }
    a == b
}

/// Appends and reads activity records for any entity kind.
pub struct ActivityLogService {
    db: Arc<DbPool>,
}

impl ActivityLogService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Appends one immutable activity row outside any caller transaction.
    #[instrument(skip(self, payload), fields(entity_id = %entity_id, activity_type = %payload.activity_type()))]
    pub async fn record(
        &self,
        entity_id: Uuid,
        payload: ActivityPayload,
    ) -> Result<activity::Model, ServiceError> {
        record_activity(&*self.db, entity_id, payload).await
    }

    /// Most recent activities for a single entity, newest first.
    pub async fn latest_for_entity(
        &self,
        entity_id: Uuid,
        limit: u64,
    ) -> Result<Vec<activity::Model>, ServiceError> {
        let rows = Activity::find()
            .filter(activity::Column::EntityId.eq(entity_id))
            .order_by_desc(activity::Column::CreatedAt)
            .order_by_desc(activity::Column::Id)
            .limit(limit)
            .all(&*self.db)
            .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot(value: Value) -> Snapshot {
        value.as_object().cloned().expect("object snapshot")
    }

    #[test]
    fn equal_snapshots_produce_empty_diff() {
        let old = snapshot(json!({"status": "SENT"}));
        let new = snapshot(json!({"status": "SENT"}));
        assert!(diff(&old, &new, &["status"]).is_empty());
    }

    #[test]
    fn changed_field_produces_exactly_one_entry() {
        let old = snapshot(json!({"status": "SENT"}));
        let new = snapshot(json!({"status": "PAID"}));

        let changes = diff(&old, &new, &["status"]);
        assert_eq!(changes.len(), 1);
        let change = &changes["status"];
        assert_eq!(change.from, json!("SENT"));
        assert_eq!(change.to, json!("PAID"));
    }

    #[test]
    fn fields_absent_from_patch_are_never_changed() {
        let old = snapshot(json!({"status": "SENT", "notes": "hello"}));
        let new = snapshot(json!({"status": "PAID"}));

        let changes = diff(&old, &new, &["status", "notes"]);
        assert_eq!(changes.len(), 1);
        assert!(changes.contains_key("status"));
    }

    #[test]
    fn unconsidered_fields_are_ignored() {
        let old = snapshot(json!({"status": "SENT", "notes": "a"}));
        let new = snapshot(json!({"status": "SENT", "notes": "b"}));
        assert!(diff(&old, &new, &["status"]).is_empty());
    }

    #[test]
    fn date_fields_compare_by_instant_not_representation() {
        let old = snapshot(json!({"dueDate": "2025-06-01T10:00:00Z"}));
        let new = snapshot(json!({"dueDate": "2025-06-01T12:00:00+02:00"}));
        assert!(diff(&old, &new, &["dueDate"]).is_empty());

        let later = snapshot(json!({"dueDate": "2025-06-02T10:00:00Z"}));
        let changes = diff(&old, &later, &["dueDate"]);
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn null_to_value_counts_as_change() {
        let old = snapshot(json!({}));
        let new = snapshot(json!({"notes": "now set"}));

        let changes = diff(&old, &new, &["notes"]);
        assert_eq!(changes["notes"].from, Value::Null);
        assert_eq!(changes["notes"].to, json!("now set"));
    }
}
