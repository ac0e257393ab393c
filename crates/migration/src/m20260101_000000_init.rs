//! Initial schema migration - creates all tables from scratch.
//!
//! - `users`: credentials, role and the running balance
//! - `companies`: legal entities requests and invoices are filed against
//! - `user_company_permissions`: companies a `user` may transact against
//! - `budget_requests`: asks for additional allowance
//! - `advances`: money actually disbursed
//! - `invoices`: expense documents
//! - `invoice_deletion_requests`: audit trail of deletion asks
//! - `saldo_transactions`: append-only balance ledger
//!
//! The "one pending row" rules are partial unique indexes, written as raw SQL
//! because the schema builder cannot express the `WHERE` clause.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Username,
    PasswordHash,
    Role,
    Balance,
    CreatedAt,
}

#[derive(Iden)]
enum Companies {
    Table,
    Id,
    Name,
    TaxId,
    Active,
    CreatedAt,
}

#[derive(Iden)]
enum UserCompanyPermissions {
    Table,
    UserId,
    CompanyId,
}

#[derive(Iden)]
enum BudgetRequests {
    Table,
    Id,
    UserId,
    CompanyId,
    RequestedAmount,
    CurrentBalanceAtRequest,
    Justification,
    Status,
    RejectionReason,
    TransferNumber,
    TransferDate,
    ReviewedBy,
    ReviewedAt,
    TransferConfirmedBy,
    TransferConfirmedAt,
    SettledBy,
    SettledAt,
    CreatedAt,
}

#[derive(Iden)]
enum Advances {
    Table,
    Id,
    UserId,
    CompanyId,
    Amount,
    Description,
    Status,
    SourceType,
    SourceId,
    TransferNumber,
    TransferDate,
    TransferConfirmedBy,
    TransferConfirmedAt,
    SettledBy,
    SettledAt,
    CreatedBy,
    CreatedAt,
}

#[derive(Iden)]
enum Invoices {
    Table,
    Id,
    UserId,
    CompanyId,
    InvoiceNumber,
    KsefNumber,
    ImageKey,
    Amount,
    Status,
    InvoiceType,
    OriginalInvoiceId,
    AdvanceId,
    BudgetRequestId,
    Description,
    Justification,
    RejectionReason,
    ReviewedBy,
    ReviewedAt,
    TransferredAt,
    SettledBy,
    SettledAt,
    CreatedAt,
}

#[derive(Iden)]
enum InvoiceDeletionRequests {
    Table,
    Id,
    InvoiceId,
    RequestedBy,
    Reason,
    Status,
    ReviewedBy,
    ReviewedAt,
    RejectionReason,
    CreatedAt,
}

#[derive(Iden)]
enum SaldoTransactions {
    Table,
    Id,
    UserId,
    Seq,
    Amount,
    BalanceBefore,
    BalanceAfter,
    TransactionType,
    ReferenceId,
    Notes,
    CreatedBy,
    CreatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(Users::Username)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Users::PasswordHash).string().not_null())
                    .col(
                        ColumnDef::new(Users::Role)
                            .string()
                            .not_null()
                            .default("user"),
                    )
                    .col(
                        ColumnDef::new(Users::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Companies
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Companies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Companies::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Companies::Name).string().not_null())
                    .col(ColumnDef::new(Companies::TaxId).string())
                    .col(
                        ColumnDef::new(Companies::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Companies::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"CREATE UNIQUE INDEX IF NOT EXISTS "uidx-companies-lower_name" ON companies (LOWER(name))"#,
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Company permissions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(UserCompanyPermissions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(UserCompanyPermissions::UserId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(UserCompanyPermissions::CompanyId)
                            .string()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(UserCompanyPermissions::UserId)
                            .col(UserCompanyPermissions::CompanyId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-user_company_permissions-user_id")
                            .from(UserCompanyPermissions::Table, UserCompanyPermissions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-user_company_permissions-company_id")
                            .from(
                                UserCompanyPermissions::Table,
                                UserCompanyPermissions::CompanyId,
                            )
                            .to(Companies::Table, Companies::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Budget requests
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(BudgetRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(BudgetRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(BudgetRequests::UserId).string().not_null())
                    .col(ColumnDef::new(BudgetRequests::CompanyId).string().not_null())
                    .col(
                        ColumnDef::new(BudgetRequests::RequestedAmount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BudgetRequests::CurrentBalanceAtRequest)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BudgetRequests::Justification)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(BudgetRequests::Status).string().not_null())
                    .col(ColumnDef::new(BudgetRequests::RejectionReason).string())
                    .col(ColumnDef::new(BudgetRequests::TransferNumber).string())
                    .col(ColumnDef::new(BudgetRequests::TransferDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(BudgetRequests::ReviewedBy).string())
                    .col(ColumnDef::new(BudgetRequests::ReviewedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(BudgetRequests::TransferConfirmedBy).string())
                    .col(
                        ColumnDef::new(BudgetRequests::TransferConfirmedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(BudgetRequests::SettledBy).string())
                    .col(ColumnDef::new(BudgetRequests::SettledAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(BudgetRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-budget_requests-user_id")
                            .from(BudgetRequests::Table, BudgetRequests::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-budget_requests-company_id")
                            .from(BudgetRequests::Table, BudgetRequests::CompanyId)
                            .to(Companies::Table, Companies::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-budget_requests-status-created_at")
                    .table(BudgetRequests::Table)
                    .col(BudgetRequests::Status)
                    .col(BudgetRequests::CreatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"CREATE UNIQUE INDEX IF NOT EXISTS "uidx-budget_requests-pending" ON budget_requests (user_id, company_id) WHERE status = 'pending'"#,
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Advances
        // ───────────────────────────────────────────────────────────────────
        // `source_id` is a soft reference: bulk-deleted budget requests leave
        // their advances behind.
        manager
            .create_table(
                Table::create()
                    .table(Advances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Advances::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Advances::UserId).string().not_null())
                    .col(ColumnDef::new(Advances::CompanyId).string().not_null())
                    .col(ColumnDef::new(Advances::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Advances::Description).string().not_null())
                    .col(ColumnDef::new(Advances::Status).string().not_null())
                    .col(
                        ColumnDef::new(Advances::SourceType)
                            .string()
                            .not_null()
                            .default("manual"),
                    )
                    .col(ColumnDef::new(Advances::SourceId).string())
                    .col(ColumnDef::new(Advances::TransferNumber).string())
                    .col(ColumnDef::new(Advances::TransferDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(Advances::TransferConfirmedBy).string())
                    .col(ColumnDef::new(Advances::TransferConfirmedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Advances::SettledBy).string())
                    .col(ColumnDef::new(Advances::SettledAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Advances::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(Advances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-advances-user_id")
                            .from(Advances::Table, Advances::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-advances-company_id")
                            .from(Advances::Table, Advances::CompanyId)
                            .to(Companies::Table, Companies::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-advances-source")
                    .table(Advances::Table)
                    .col(Advances::SourceType)
                    .col(Advances::SourceId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Invoices
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Invoices::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Invoices::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Invoices::UserId).string().not_null())
                    .col(ColumnDef::new(Invoices::CompanyId).string().not_null())
                    .col(ColumnDef::new(Invoices::InvoiceNumber).string().not_null())
                    .col(ColumnDef::new(Invoices::KsefNumber).string())
                    .col(ColumnDef::new(Invoices::ImageKey).string().not_null())
                    .col(ColumnDef::new(Invoices::Amount).big_integer().not_null())
                    .col(ColumnDef::new(Invoices::Status).string().not_null())
                    .col(
                        ColumnDef::new(Invoices::InvoiceType)
                            .string()
                            .not_null()
                            .default("einvoice"),
                    )
                    .col(ColumnDef::new(Invoices::OriginalInvoiceId).string())
                    .col(ColumnDef::new(Invoices::AdvanceId).string())
                    .col(ColumnDef::new(Invoices::BudgetRequestId).string())
                    .col(ColumnDef::new(Invoices::Description).string())
                    .col(ColumnDef::new(Invoices::Justification).string())
                    .col(ColumnDef::new(Invoices::RejectionReason).string())
                    .col(ColumnDef::new(Invoices::ReviewedBy).string())
                    .col(ColumnDef::new(Invoices::ReviewedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Invoices::TransferredAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Invoices::SettledBy).string())
                    .col(ColumnDef::new(Invoices::SettledAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Invoices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoices-user_id")
                            .from(Invoices::Table, Invoices::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoices-company_id")
                            .from(Invoices::Table, Invoices::CompanyId)
                            .to(Companies::Table, Companies::Id),
                    )
                    // Deleting a parent unlinks its invoices instead of blocking.
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoices-advance_id")
                            .from(Invoices::Table, Invoices::AdvanceId)
                            .to(Advances::Table, Advances::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoices-budget_request_id")
                            .from(Invoices::Table, Invoices::BudgetRequestId)
                            .to(BudgetRequests::Table, BudgetRequests::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-invoices-original_invoice_id")
                            .from(Invoices::Table, Invoices::OriginalInvoiceId)
                            .to(Invoices::Table, Invoices::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-advance_id")
                    .table(Invoices::Table)
                    .col(Invoices::AdvanceId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-budget_request_id")
                    .table(Invoices::Table)
                    .col(Invoices::BudgetRequestId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-invoices-user_id-company_id-number")
                    .table(Invoices::Table)
                    .col(Invoices::UserId)
                    .col(Invoices::CompanyId)
                    .col(Invoices::InvoiceNumber)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Invoice deletion requests
        // ───────────────────────────────────────────────────────────────────
        // No foreign key on `invoice_id`: the audit row outlives the invoice.
        manager
            .create_table(
                Table::create()
                    .table(InvoiceDeletionRequests::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(InvoiceDeletionRequests::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(InvoiceDeletionRequests::InvoiceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(InvoiceDeletionRequests::RequestedBy)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(InvoiceDeletionRequests::Reason).string().not_null())
                    .col(ColumnDef::new(InvoiceDeletionRequests::Status).string().not_null())
                    .col(ColumnDef::new(InvoiceDeletionRequests::ReviewedBy).string())
                    .col(
                        ColumnDef::new(InvoiceDeletionRequests::ReviewedAt)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(InvoiceDeletionRequests::RejectionReason).string())
                    .col(
                        ColumnDef::new(InvoiceDeletionRequests::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                r#"CREATE UNIQUE INDEX IF NOT EXISTS "uidx-invoice_deletion_requests-pending" ON invoice_deletion_requests (invoice_id) WHERE status = 'pending'"#,
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 8. Balance ledger
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(SaldoTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SaldoTransactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SaldoTransactions::UserId).string().not_null())
                    .col(ColumnDef::new(SaldoTransactions::Seq).big_integer().not_null())
                    .col(ColumnDef::new(SaldoTransactions::Amount).big_integer().not_null())
                    .col(
                        ColumnDef::new(SaldoTransactions::BalanceBefore)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SaldoTransactions::BalanceAfter)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SaldoTransactions::TransactionType)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SaldoTransactions::ReferenceId).string())
                    .col(ColumnDef::new(SaldoTransactions::Notes).string())
                    .col(ColumnDef::new(SaldoTransactions::CreatedBy).string().not_null())
                    .col(
                        ColumnDef::new(SaldoTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-saldo_transactions-user_id")
                            .from(SaldoTransactions::Table, SaldoTransactions::UserId)
                            .to(Users::Table, Users::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uidx-saldo_transactions-user_id-seq")
                    .table(SaldoTransactions::Table)
                    .col(SaldoTransactions::UserId)
                    .col(SaldoTransactions::Seq)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-saldo_transactions-reference_id")
                    .table(SaldoTransactions::Table)
                    .col(SaldoTransactions::ReferenceId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(SaldoTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(InvoiceDeletionRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Invoices::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Advances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BudgetRequests::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserCompanyPermissions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Companies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
