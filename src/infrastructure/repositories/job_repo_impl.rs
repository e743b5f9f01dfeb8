// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::job::{Depth, JobStatus, ResearchJob, TargetKind};
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use crate::infrastructure::database::entities::{
    account, credits, credits_transactions, research_job,
};

pub struct JobRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl JobRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    fn to_domain(model: research_job::Model) -> ResearchJob {
        ResearchJob {
            id: model.id,
            account_id: model.account_id,
            target: model.target,
            target_kind: TargetKind::from_str(&model.target_kind).unwrap_or_default(),
            depth: Depth::from_str(&model.depth).unwrap_or_default(),
            status: JobStatus::from_str(&model.status).unwrap_or_default(),
            credits_charged: model.credits_charged,
            output_dir: model.output_dir,
            report_path: model.report_path,
            error_message: model.error_message,
            created_at: model.created_at.into(),
            started_at: model.started_at.map(Into::into),
            completed_at: model.completed_at.map(Into::into),
        }
    }

    fn to_active(job: &ResearchJob) -> research_job::ActiveModel {
        research_job::ActiveModel {
            id: Set(job.id),
            account_id: Set(job.account_id),
            target: Set(job.target.clone()),
            target_kind: Set(job.target_kind.to_string()),
            depth: Set(job.depth.to_string()),
            status: Set(job.status.to_string()),
            credits_charged: Set(job.credits_charged),
            output_dir: Set(job.output_dir.clone()),
            report_path: Set(job.report_path.clone()),
            error_message: Set(job.error_message.clone()),
            created_at: Set(job.created_at.fixed_offset()),
            started_at: Set(job.started_at.map(|t| t.fixed_offset())),
            completed_at: Set(job.completed_at.map(|t| t.fixed_offset())),
        }
    }

    /// 目标状态允许的前置状态
    ///
    /// 终态行不允许被改写，保证状态只会前进。
    fn allowed_prior(status: JobStatus) -> Vec<String> {
        let prior: &[JobStatus] = match status {
            JobStatus::Pending => &[JobStatus::Pending],
            JobStatus::Processing => &[JobStatus::Pending, JobStatus::Processing],
            JobStatus::Completed | JobStatus::Failed => &[JobStatus::Processing],
        };
        prior.iter().map(|s| s.to_string()).collect()
    }

    /// 构建守卫式状态更新语句（只影响处于合法前置状态的行）
    fn guarded_update(job: &ResearchJob) -> sea_orm::UpdateMany<research_job::Entity> {
        research_job::Entity::update_many()
            .col_expr(research_job::Column::Status, Expr::value(job.status.to_string()))
            .col_expr(
                research_job::Column::OutputDir,
                Expr::value(job.output_dir.clone()),
            )
            .col_expr(
                research_job::Column::ReportPath,
                Expr::value(job.report_path.clone()),
            )
            .col_expr(
                research_job::Column::ErrorMessage,
                Expr::value(job.error_message.clone()),
            )
            .col_expr(
                research_job::Column::StartedAt,
                Expr::value(job.started_at.map(|t| t.fixed_offset())),
            )
            .col_expr(
                research_job::Column::CompletedAt,
                Expr::value(job.completed_at.map(|t| t.fixed_offset())),
            )
            .filter(research_job::Column::Id.eq(job.id))
            .filter(research_job::Column::Status.is_in(Self::allowed_prior(job.status)))
    }
}

#[async_trait]
impl JobRepository for JobRepositoryImpl {
    async fn create(&self, job: &ResearchJob) -> Result<ResearchJob, RepositoryError> {
        let inserted = Self::to_active(job)
            .insert(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(Self::to_domain(inserted))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<ResearchJob>, RepositoryError> {
        let model = research_job::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(model.map(Self::to_domain))
    }

    async fn list_for_account(
        &self,
        account_id: Uuid,
        status: Option<JobStatus>,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<ResearchJob>, u64), RepositoryError> {
        let mut query = research_job::Entity::find()
            .filter(research_job::Column::AccountId.eq(account_id));

        if let Some(status) = status {
            query = query.filter(research_job::Column::Status.eq(status.to_string()));
        }

        let total = query
            .clone()
            .count(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        let models = query
            .order_by_desc(research_job::Column::CreatedAt)
            .offset(offset)
            .limit(limit)
            .all(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok((models.into_iter().map(Self::to_domain).collect(), total))
    }

    async fn find_recent_duplicate(
        &self,
        account_id: Uuid,
        target: &str,
        target_kind: TargetKind,
        since: DateTime<Utc>,
    ) -> Result<Option<ResearchJob>, RepositoryError> {
        let model = research_job::Entity::find()
            .filter(research_job::Column::AccountId.eq(account_id))
            .filter(research_job::Column::Target.eq(target))
            .filter(research_job::Column::TargetKind.eq(target_kind.to_string()))
            .filter(research_job::Column::CreatedAt.gt(since.fixed_offset()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(model.map(Self::to_domain))
    }

    async fn update(&self, job: &ResearchJob) -> Result<(), RepositoryError> {
        let result = Self::guarded_update(job)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::InvalidTransition);
        }
        Ok(())
    }

    async fn fail_and_refund(&self, job: &ResearchJob) -> Result<(), RepositoryError> {
        let update = Self::guarded_update(job);
        let account_id = job.account_id;
        let job_id = job.id;
        let amount = job.credits_charged;
        let target = job.target.clone();

        // 状态翻转与退款在同一事务内，额度不变式任何时刻成立
        self.db
            .transaction::<_, (), DbErr>(move |txn| {
                Box::pin(async move {
                    let result = update.exec(txn).await?;
                    if result.rows_affected == 0 {
                        return Err(DbErr::Custom("invalid state transition".to_string()));
                    }

                    if amount > 0 {
                        credits::Entity::update_many()
                            .col_expr(
                                credits::Column::Balance,
                                Expr::col(credits::Column::Balance).add(amount),
                            )
                            .col_expr(
                                credits::Column::UpdatedAt,
                                Expr::value(Utc::now().fixed_offset()),
                            )
                            .filter(credits::Column::AccountId.eq(account_id))
                            .exec(txn)
                            .await?;

                        credits_transactions::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            account_id: Set(account_id),
                            amount: Set(amount),
                            transaction_type: Set("refund".to_string()),
                            description: Set(format!("Refund for failed research job '{}'", target)),
                            reference_id: Set(Some(job_id)),
                            created_at: Set(Utc::now().fixed_offset()),
                        }
                        .insert(txn)
                        .await?;
                    }

                    Ok(())
                })
            })
            .await
            .map_err(|e| match e {
                sea_orm::TransactionError::Connection(e) => {
                    RepositoryError::Database(e.to_string())
                }
                sea_orm::TransactionError::Transaction(e) => {
                    if e.to_string().contains("invalid state transition") {
                        RepositoryError::InvalidTransition
                    } else {
                        RepositoryError::Database(e.to_string())
                    }
                }
            })
    }

    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
        let result = research_job::Entity::delete_by_id(id)
            .exec(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn account_email(&self, account_id: Uuid) -> Result<Option<String>, RepositoryError> {
        let model = account::Entity::find_by_id(account_id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| RepositoryError::Database(e.to_string()))?;
        Ok(model.map(|a| a.email))
    }
}
