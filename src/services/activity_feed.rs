use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, Condition, EntityTrait, Iterable, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect,
};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::db::DbPool;
use crate::entities::activity::{
    self, ActivityPayload, ActivityType, Entity as Activity, EntityKind,
};
use crate::errors::ServiceError;

const MAX_PAGE_SIZE: u64 = 100;

/// One globally time-ordered page drawn from the per-entity activity
/// streams.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityFeedPage {
    pub items: Vec<FeedItem>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedItem {
    pub id: Uuid,
    pub entity_kind: EntityKind,
    pub entity_id: Uuid,
    pub activity_type: ActivityType,
    pub payload: ActivityPayload,
    pub created_at: DateTime<Utc>,
}

impl FeedItem {
    fn from_model(model: activity::Model) -> Result<Self, ServiceError> {
        let payload = model
            .typed_payload()
            .map_err(|e| ServiceError::SerializationError(e.to_string()))?;
        Ok(Self {
            id: model.id,
            entity_kind: model.entity_kind,
            entity_id: model.entity_id,
            activity_type: model.activity_type,
            payload,
            created_at: model.created_at,
        })
    }
}

/// Read-only aggregator over the per-entity activity streams. Reads are
/// weakly consistent with concurrent writers; that is acceptable for a
/// dashboard feed.
pub struct ActivityFeedService {
    db: Arc<DbPool>,
}

impl ActivityFeedService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    /// Produces a globally `(created_at, id)`-descending page of activities.
    ///
    /// With a single-kind filter the source's own pagination is
    /// authoritative and the query maps straight to LIMIT/OFFSET. Across
    /// all kinds the streams are combined with a k-way merge: each source
    /// is read in batches behind a `(created_at, id)` cursor and the merge
    /// consumes the page offset, so a page is exact regardless of how
    /// skewed activity volume is between entity types.
    #[instrument(skip(self))]
    pub async fn feed(
        &self,
        page: u64,
        page_size: u64,
        kind: Option<EntityKind>,
    ) -> Result<ActivityFeedPage, ServiceError> {
        if page == 0 {
            return Err(ServiceError::ValidationFailed(
                "page numbers start at 1".to_string(),
            ));
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(ServiceError::ValidationFailed(format!(
                "page_size must be between 1 and {MAX_PAGE_SIZE}"
            )));
        }

        match kind {
            Some(kind) => self.single_kind_page(page, page_size, kind).await,
            None => self.merged_page(page, page_size).await,
        }
    }

    async fn single_kind_page(
        &self,
        page: u64,
        page_size: u64,
        kind: EntityKind,
    ) -> Result<ActivityFeedPage, ServiceError> {
        let total = Activity::find()
            .filter(activity::Column::EntityKind.eq(kind))
            .count(&*self.db)
            .await?;

        let rows = Activity::find()
            .filter(activity::Column::EntityKind.eq(kind))
            .order_by_desc(activity::Column::CreatedAt)
            .order_by_desc(activity::Column::Id)
            .offset((page - 1) * page_size)
            .limit(page_size)
            .all(&*self.db)
            .await?;

        let items = rows
            .into_iter()
            .map(FeedItem::from_model)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ActivityFeedPage {
            items,
            total,
            page,
            page_size,
            has_more: page * page_size < total,
        })
    }

    async fn merged_page(&self, page: u64, page_size: u64) -> Result<ActivityFeedPage, ServiceError> {
        let offset = (page - 1) * page_size;
        let batch = page_size.max(10);

        let mut total = 0;
        let mut streams = Vec::new();
        for kind in EntityKind::iter() {
            total += Activity::find()
                .filter(activity::Column::EntityKind.eq(kind))
                .count(&*self.db)
                .await?;
            streams.push(SourceStream::new(kind));
        }

        for stream in &mut streams {
            stream.refill(&self.db, batch).await?;
        }

        let mut skipped = 0;
        let mut items = Vec::with_capacity(page_size as usize);
        loop {
            // pick the stream whose head is globally newest
            let mut selected: Option<usize> = None;
            for (idx, stream) in streams.iter().enumerate() {
                let Some(key) = stream.head_key() else { continue };
                let newer = match selected {
                    Some(current) => key > streams[current].head_key().expect("selected head"),
                    None => true,
                };
                if newer {
                    selected = Some(idx);
                }
            }
            let Some(idx) = selected else { break };

            let record = streams[idx].pop();
            if skipped < offset {
                skipped += 1;
            } else {
                items.push(FeedItem::from_model(record)?);
                if items.len() as u64 == page_size {
                    break;
                }
            }

            streams[idx].refill(&self.db, batch).await?;
        }

        Ok(ActivityFeedPage {
            items,
            total,
            page,
            page_size,
            has_more: page * page_size < total,
        })
    }
}

/// One per-kind stream in `(created_at, id)`-descending order, read in
/// batches behind a resumption cursor.
struct SourceStream {
    kind: EntityKind,
    buffer: VecDeque<activity::Model>,
    cursor: Option<(DateTime<Utc>, Uuid)>,
    exhausted: bool,
}

impl SourceStream {
    fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    fn head_key(&self) -> Option<(DateTime<Utc>, Uuid)> {
        self.buffer.front().map(|m| (m.created_at, m.id))
    }

    fn pop(&mut self) -> activity::Model {
        self.buffer.pop_front().expect("pop on empty stream")
    }

    async fn refill(&mut self, db: &DbPool, batch: u64) -> Result<(), ServiceError> {
        if self.exhausted || !self.buffer.is_empty() {
            return Ok(());
        }

        let mut query = Activity::find()
            .filter(activity::Column::EntityKind.eq(self.kind))
            .order_by_desc(activity::Column::CreatedAt)
            .order_by_desc(activity::Column::Id)
            .limit(batch);

        if let Some((created_at, id)) = self.cursor {
            query = query.filter(
                Condition::any()
                    .add(activity::Column::CreatedAt.lt(created_at))
                    .add(
                        Condition::all()
                            .add(activity::Column::CreatedAt.eq(created_at))
                            .add(activity::Column::Id.lt(id)),
                    ),
            );
        }

        let rows = query.all(db).await?;
        if (rows.len() as u64) < batch {
            self.exhausted = true;
        }
        if let Some(last) = rows.last() {
            self.cursor = Some((last.created_at, last.id));
        }
        self.buffer.extend(rows);

        Ok(())
    }
}
