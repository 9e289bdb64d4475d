use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per calendar year backing the invoice number sequence.
/// `last_number` only ever moves forward, via a single atomic
/// upsert-increment (see `services::sequence`).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "year_counters")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub year: i32,
    pub last_number: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
