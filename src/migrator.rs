use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250601_000001_create_contacts_table::Migration),
            Box::new(m20250601_000002_create_enquiries_table::Migration),
            Box::new(m20250601_000003_create_bookings_table::Migration),
            Box::new(m20250601_000004_create_invoices_tables::Migration),
            Box::new(m20250601_000005_create_activities_table::Migration),
            Box::new(m20250601_000006_create_year_counters_table::Migration),
        ]
    }
}

mod m20250601_000001_create_contacts_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000001_create_contacts_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Contacts::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Contacts::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Contacts::FirstName).string_len(100).not_null())
                        .col(ColumnDef::new(Contacts::LastName).string_len(100).not_null())
                        .col(ColumnDef::new(Contacts::Email).string_len(254).null())
                        .col(ColumnDef::new(Contacts::Phone).string_len(50).null())
                        .col(ColumnDef::new(Contacts::Notes).string_len(5000).null())
                        .col(
                            ColumnDef::new(Contacts::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Contacts::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Contacts::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Contacts {
        Table,
        Id,
        FirstName,
        LastName,
        Email,
        Phone,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250601_000002_create_enquiries_table {
    use sea_orm_migration::prelude::*;

    use super::m20250601_000001_create_contacts_table::Contacts;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000002_create_enquiries_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Enquiries::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Enquiries::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Enquiries::ContactId).uuid().not_null())
                        .col(ColumnDef::new(Enquiries::Subject).string_len(500).not_null())
                        .col(ColumnDef::new(Enquiries::Stage).string_len(32).not_null())
                        .col(ColumnDef::new(Enquiries::Notes).string_len(5000).null())
                        .col(
                            ColumnDef::new(Enquiries::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Enquiries::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_enquiries_contact")
                                .from(Enquiries::Table, Enquiries::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_enquiries_contact_id")
                        .table(Enquiries::Table)
                        .col(Enquiries::ContactId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Enquiries::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Enquiries {
        Table,
        Id,
        ContactId,
        Subject,
        Stage,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250601_000003_create_bookings_table {
    use sea_orm_migration::prelude::*;

    use super::m20250601_000001_create_contacts_table::Contacts;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000003_create_bookings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Bookings::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Bookings::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Bookings::ContactId).uuid().not_null())
                        .col(ColumnDef::new(Bookings::Service).string_len(500).not_null())
                        .col(
                            ColumnDef::new(Bookings::Price)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Bookings::Status).string_len(32).not_null())
                        .col(
                            ColumnDef::new(Bookings::StartsAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::EndsAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Bookings::Location).string_len(500).null())
                        .col(ColumnDef::new(Bookings::Notes).string_len(5000).null())
                        .col(
                            ColumnDef::new(Bookings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Bookings::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_bookings_contact")
                                .from(Bookings::Table, Bookings::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_bookings_contact_id")
                        .table(Bookings::Table)
                        .col(Bookings::ContactId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Bookings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Bookings {
        Table,
        Id,
        ContactId,
        Service,
        Price,
        Status,
        StartsAt,
        EndsAt,
        Location,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20250601_000004_create_invoices_tables {
    use sea_orm_migration::prelude::*;

    use super::m20250601_000001_create_contacts_table::Contacts;
    use super::m20250601_000003_create_bookings_table::Bookings;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000004_create_invoices_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Invoices::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Invoices::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Invoices::ContactId).uuid().not_null())
                        .col(ColumnDef::new(Invoices::BookingId).uuid().null())
                        .col(
                            ColumnDef::new(Invoices::InvoiceNumber)
                                .string_len(50)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::IssueDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::DueDate)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::TaxRatePercent)
                                .decimal_len(5, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::Subtotal)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::TaxAmount)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::Total)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::AmountPaid)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Invoices::AmountDue)
                                .decimal_len(12, 2)
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Invoices::Status).string_len(32).not_null())
                        .col(ColumnDef::new(Invoices::Notes).string_len(5000).null())
                        .col(
                            ColumnDef::new(Invoices::DeletedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::Version)
                                .integer()
                                .not_null()
                                .default(1),
                        )
                        .col(
                            ColumnDef::new(Invoices::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Invoices::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_contact")
                                .from(Invoices::Table, Invoices::ContactId)
                                .to(Contacts::Table, Contacts::Id),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_invoices_booking")
                                .from(Invoices::Table, Invoices::BookingId)
                                .to(Bookings::Table, Bookings::Id),
                        )
                        .to_owned(),
                )
                .await?;

            // Invoice numbers are unique forever; one invoice per booking is
            // enforced here, not only by the lookup-before-insert.
            manager
                .create_index(
                    Index::create()
                        .name("idx_invoices_invoice_number")
                        .table(Invoices::Table)
                        .col(Invoices::InvoiceNumber)
                        .unique()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_invoices_booking_id")
                        .table(Invoices::Table)
                        .col(Invoices::BookingId)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(LineItems::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(LineItems::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(LineItems::InvoiceId).uuid().not_null())
                        .col(
                            ColumnDef::new(LineItems::Description)
                                .string_len(500)
                                .not_null(),
                        )
                        .col(ColumnDef::new(LineItems::Quantity).integer().not_null())
                        .col(
                            ColumnDef::new(LineItems::UnitPrice)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LineItems::Total)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LineItems::SortOrder)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(LineItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(LineItems::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_line_items_invoice")
                                .from(LineItems::Table, LineItems::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_line_items_invoice_id")
                        .table(LineItems::Table)
                        .col(LineItems::InvoiceId)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Payments::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Payments::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Payments::InvoiceId).uuid().not_null())
                        .col(
                            ColumnDef::new(Payments::Amount)
                                .decimal_len(12, 2)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Payments::Method).string_len(32).not_null())
                        .col(ColumnDef::new(Payments::Reference).string_len(500).null())
                        .col(ColumnDef::new(Payments::Notes).string_len(1000).null())
                        .col(
                            ColumnDef::new(Payments::PaidAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Payments::IdempotencyKey)
                                .string_len(500)
                                .null(),
                        )
                        .col(
                            ColumnDef::new(Payments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_payments_invoice")
                                .from(Payments::Table, Payments::InvoiceId)
                                .to(Invoices::Table, Invoices::Id)
                                .on_delete(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .name("idx_payments_invoice_id")
                        .table(Payments::Table)
                        .col(Payments::InvoiceId)
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_payments_idempotency_key")
                        .table(Payments::Table)
                        .col(Payments::IdempotencyKey)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Payments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(LineItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Invoices::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Invoices {
        Table,
        Id,
        ContactId,
        BookingId,
        InvoiceNumber,
        IssueDate,
        DueDate,
        TaxRatePercent,
        Subtotal,
        TaxAmount,
        Total,
        AmountPaid,
        AmountDue,
        Status,
        Notes,
        DeletedAt,
        Version,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum LineItems {
        Table,
        Id,
        InvoiceId,
        Description,
        Quantity,
        UnitPrice,
        Total,
        SortOrder,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub enum Payments {
        Table,
        Id,
        InvoiceId,
        Amount,
        Method,
        Reference,
        Notes,
        PaidAt,
        IdempotencyKey,
        CreatedAt,
    }
}

mod m20250601_000005_create_activities_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000005_create_activities_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Activities::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Activities::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Activities::EntityKind)
                                .string_len(32)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Activities::EntityId).uuid().not_null())
                        .col(
                            ColumnDef::new(Activities::ActivityType)
                                .string_len(64)
                                .not_null(),
                        )
                        .col(ColumnDef::new(Activities::Payload).json().not_null())
                        .col(
                            ColumnDef::new(Activities::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // Backs both the per-kind feed streams and the per-entity timeline.
            manager
                .create_index(
                    Index::create()
                        .name("idx_activities_kind_created_at")
                        .table(Activities::Table)
                        .col(Activities::EntityKind)
                        .col(Activities::CreatedAt)
                        .col(Activities::Id)
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_activities_entity_created_at")
                        .table(Activities::Table)
                        .col(Activities::EntityId)
                        .col(Activities::CreatedAt)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Activities::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum Activities {
        Table,
        Id,
        EntityKind,
        EntityId,
        ActivityType,
        Payload,
        CreatedAt,
    }
}

mod m20250601_000006_create_year_counters_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20250601_000006_create_year_counters_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(YearCounters::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(YearCounters::Year)
                                .integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(YearCounters::LastNumber)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(YearCounters::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub enum YearCounters {
        Table,
        Year,
        LastNumber,
    }
}
