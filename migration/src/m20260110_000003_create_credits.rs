use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create credits table
        manager
            .create_table(
                Table::create()
                    .table(Credits::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Credits::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Credits::AccountId).uuid().not_null())
                    .col(
                        ColumnDef::new(Credits::Balance)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Credits::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Credits::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_account_id")
                    .table(Credits::Table)
                    .col(Credits::AccountId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Create credits_transactions table
        manager
            .create_table(
                Table::create()
                    .table(CreditsTransactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CreditsTransactions::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CreditsTransactions::AccountId).uuid().not_null())
                    .col(
                        ColumnDef::new(CreditsTransactions::Amount)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditsTransactions::TransactionType)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CreditsTransactions::Description)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(CreditsTransactions::ReferenceId).uuid())
                    .col(
                        ColumnDef::new(CreditsTransactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_credits_transactions_account_id")
                    .table(CreditsTransactions::Table)
                    .col(CreditsTransactions::AccountId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CreditsTransactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Credits::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Credits {
    Table,
    Id,
    AccountId,
    Balance,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum CreditsTransactions {
    Table,
    Id,
    AccountId,
    Amount,
    TransactionType,
    Description,
    ReferenceId,
    CreatedAt,
}
