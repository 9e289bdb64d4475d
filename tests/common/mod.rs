#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, Set};
use tokio::sync::mpsc;
use uuid::Uuid;

use clientdesk::entities::activity::{self, ActivityPayload};
use clientdesk::entities::{booking, contact};
use clientdesk::events::{self, EventSender};
use clientdesk::services::bookings::CreateBookingRequest;
use clientdesk::services::contacts::CreateContactRequest;
use clientdesk::{config::AppConfig, db, logging, AppState};

/// Test harness backed by an in-memory SQLite database. The pool is pinned
/// to a single connection: every pooled connection to `sqlite::memory:`
/// would otherwise open its own empty database.
pub struct TestApp {
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        logging::init_tracing("warn");

        let mut config = AppConfig::new("sqlite::memory:", "test");
        config.auto_migrate = true;
        config.db_max_connections = 1;
        config.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&config)
            .await
            .expect("db connect");

        let (tx, rx) = mpsc::channel(100);
        let sender = Arc::new(EventSender::new(tx));
        let event_task = tokio::spawn(events::process_events(rx));

        let state = AppState::new(Arc::new(pool), config, Some(sender));

        Self {
            state,
            _event_task: event_task,
        }
    }

    pub async fn seed_contact(&self, first_name: &str, last_name: &str) -> contact::Model {
        self.state
            .services
            .contacts
            .create_contact(CreateContactRequest {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                email: None,
                phone: None,
                notes: None,
            })
            .await
            .expect("seed contact")
    }

    pub async fn seed_booking(
        &self,
        contact_id: Uuid,
        service: &str,
        price: Decimal,
    ) -> booking::Model {
        let starts_at = Utc::now() + Duration::days(7);
        self.state
            .services
            .bookings
            .create_booking(CreateBookingRequest {
                contact_id,
                service: service.to_string(),
                price,
                starts_at,
                ends_at: starts_at + Duration::hours(2),
                location: None,
                notes: None,
            })
            .await
            .expect("seed booking")
    }

    /// Inserts an activity row directly, bypassing the recorder, so feed
    /// tests can control creation timestamps.
    pub async fn seed_activity(
        &self,
        entity_id: Uuid,
        payload: ActivityPayload,
        created_at: DateTime<Utc>,
    ) -> activity::Model {
        activity::ActiveModel {
            id: Set(Uuid::new_v4()),
            entity_kind: Set(payload.entity_kind()),
            entity_id: Set(entity_id),
            activity_type: Set(payload.activity_type()),
            payload: Set(serde_json::to_value(&payload).expect("payload json")),
            created_at: Set(created_at),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed activity")
    }
}
