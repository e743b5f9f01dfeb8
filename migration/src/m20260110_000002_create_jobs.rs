use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Create research_jobs table
        manager
            .create_table(
                Table::create()
                    .table(ResearchJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ResearchJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ResearchJobs::AccountId).uuid().not_null())
                    .col(ColumnDef::new(ResearchJobs::Target).string().not_null())
                    .col(ColumnDef::new(ResearchJobs::TargetKind).string().not_null())
                    .col(ColumnDef::new(ResearchJobs::Depth).string().not_null())
                    .col(ColumnDef::new(ResearchJobs::Status).string().not_null())
                    .col(
                        ColumnDef::new(ResearchJobs::CreditsCharged)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ResearchJobs::OutputDir).string())
                    .col(ColumnDef::new(ResearchJobs::ReportPath).string())
                    .col(ColumnDef::new(ResearchJobs::ErrorMessage).text())
                    .col(
                        ColumnDef::new(ResearchJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(ResearchJobs::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(ResearchJobs::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Create indexes
        manager
            .create_index(
                Index::create()
                    .name("idx_research_jobs_account_id")
                    .table(ResearchJobs::Table)
                    .col(ResearchJobs::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_research_jobs_status")
                    .table(ResearchJobs::Table)
                    .col(ResearchJobs::Status)
                    .to_owned(),
            )
            .await?;

        // Duplicate-window lookups filter on (account, target, kind, created_at)
        manager
            .create_index(
                Index::create()
                    .name("idx_research_jobs_dedup")
                    .table(ResearchJobs::Table)
                    .col(ResearchJobs::AccountId)
                    .col(ResearchJobs::Target)
                    .col(ResearchJobs::TargetKind)
                    .col(ResearchJobs::CreatedAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ResearchJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ResearchJobs {
    Table,
    Id,
    AccountId,
    Target,
    TargetKind,
    Depth,
    Status,
    CreditsCharged,
    OutputDir,
    ReportPath,
    ErrorMessage,
    CreatedAt,
    StartedAt,
    CompletedAt,
}
