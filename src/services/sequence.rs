use std::sync::Arc;

use sea_orm::{ConnectionTrait, DbBackend, Statement};
use tracing::instrument;

use crate::db::DbPool;
use crate::errors::ServiceError;

/// Issues unique, monotonically increasing invoice numbers per calendar
/// year, backed by the `year_counters` table.
pub struct InvoiceNumberService {
    db: Arc<DbPool>,
    prefix: String,
}

impl InvoiceNumberService {
    pub fn new(db: Arc<DbPool>, prefix: impl Into<String>) -> Self {
        Self {
            db,
            prefix: prefix.into(),
        }
    }

    /// Allocates the next invoice number for `year` and formats it for
    /// display, e.g. `INV-2025-0042`.
    #[instrument(skip(self))]
    pub async fn next_invoice_number(&self, year: i32) -> Result<String, ServiceError> {
        let sequence = self.next_sequence(year).await?;
        Ok(format_invoice_number(&self.prefix, year, sequence))
    }

    /// Allocates the next sequence value for `year` with a single atomic
    /// upsert-increment. No two concurrent callers can observe the same
    /// value: the increment and the read happen in one statement, never as
    /// a separate read followed by a write.
    pub async fn next_sequence(&self, year: i32) -> Result<i64, ServiceError> {
        let backend = self.db.get_database_backend();
        let sql = match backend {
            DbBackend::Postgres => {
                "INSERT INTO year_counters (year, last_number) VALUES ($1, 1) \
                 ON CONFLICT (year) DO UPDATE SET last_number = year_counters.last_number + 1 \
                 RETURNING last_number"
            }
            _ => {
                "INSERT INTO year_counters (year, last_number) VALUES (?, 1) \
                 ON CONFLICT (year) DO UPDATE SET last_number = year_counters.last_number + 1 \
                 RETURNING last_number"
            }
        };

        let row = self
            .db
            .query_one(Statement::from_sql_and_values(backend, sql, [year.into()]))
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError("year counter upsert returned no row".to_string())
            })?;

        let last_number: i64 = row.try_get("", "last_number")?;
        Ok(last_number)
    }
}

fn format_invoice_number(prefix: &str, year: i32, sequence: i64) -> String {
    format!("{prefix}-{year}-{sequence:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_year_scoped_sequence() {
        assert_eq!(format_invoice_number("INV", 2025, 1), "INV-2025-0001");
        assert_eq!(format_invoice_number("INV", 2025, 42), "INV-2025-0042");
        // padding is presentation only; large sequences widen past it
        assert_eq!(format_invoice_number("INV", 2025, 123456), "INV-2025-123456");
    }
}
