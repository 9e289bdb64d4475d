//! ClientDesk core
//!
//! The invoice ledger and activity engine behind the ClientDesk
//! business-management API: monetary totals, payment application and
//! status derivation, per-year invoice numbering, the append-only
//! activity log shared by every entity type, and the cross-entity
//! activity feed.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod logging;
pub mod migrator;
pub mod money;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

/// Application state shared by embedders (HTTP layer, jobs, tests).
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Option<Arc<events::EventSender>>,
    pub services: services::AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: Option<Arc<events::EventSender>>,
    ) -> Self {
        let services = services::AppServices::new(db.clone(), &config, event_sender.clone());
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}
