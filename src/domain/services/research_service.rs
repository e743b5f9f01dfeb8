// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::settings::CreditSettings;
use crate::domain::models::credits::CreditsTransactionType;
use crate::domain::models::job::{Depth, JobStatus, ResearchJob, TargetKind};
use crate::domain::repositories::credits_repository::{CreditsRepository, CreditsRepositoryError};
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};

/// 重复提交去重窗口（秒）
const DUPLICATE_WINDOW_SECONDS: i64 = 60;

/// 目标字符串的最大长度
const MAX_TARGET_LEN: usize = 500;

#[derive(Error, Debug)]
pub enum ResearchServiceError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Insufficient credits: available {available}, required {required}")]
    InsufficientCredits { available: i64, required: i64 },
    #[error("A research job for this target was already created. Please wait before creating another.")]
    DuplicateSubmission,
    #[error("Research job not found")]
    NotFound,
    #[error("Cannot delete a job that is still pending or processing")]
    JobStillRunning,
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Credits error: {0}")]
    Credits(String),
}

/// 调研任务服务
///
/// 负责任务创建时的同步校验：额度检查与扣除、
/// 重复提交防护，以及任务的查询与删除规则。
pub struct ResearchService<J, C> {
    jobs: Arc<J>,
    credits: Arc<C>,
    costs: CreditSettings,
}

impl<J, C> ResearchService<J, C>
where
    J: JobRepository + 'static,
    C: CreditsRepository + 'static,
{
    pub fn new(jobs: Arc<J>, credits: Arc<C>, costs: CreditSettings) -> Self {
        Self {
            jobs,
            credits,
            costs,
        }
    }

    /// 查询档位对应的额度消耗
    pub fn cost_for(&self, depth: Depth) -> i64 {
        match depth {
            Depth::Quick => self.costs.cost_quick,
            Depth::Standard => self.costs.cost_standard,
            Depth::Deep => self.costs.cost_deep,
        }
    }

    /// 创建调研任务
    ///
    /// 依次执行：输入校验 → 去重窗口检查 → 原子扣除额度 →
    /// 持久化Pending任务。任何一步失败都不会留下半成品状态。
    pub async fn create_job(
        &self,
        account_id: Uuid,
        target: &str,
        target_kind: TargetKind,
        depth: Depth,
    ) -> Result<ResearchJob, ResearchServiceError> {
        let target = target.trim();
        if target.is_empty() {
            return Err(ResearchServiceError::Validation(
                "target cannot be empty".to_string(),
            ));
        }
        if target.len() > MAX_TARGET_LEN {
            return Err(ResearchServiceError::Validation(format!(
                "target cannot exceed {} characters",
                MAX_TARGET_LEN
            )));
        }

        // 去重窗口：同一账户对同一(目标, 类型)在窗口内只允许一次提交
        let since = Utc::now() - Duration::seconds(DUPLICATE_WINDOW_SECONDS);
        if self
            .jobs
            .find_recent_duplicate(account_id, target, target_kind, since)
            .await?
            .is_some()
        {
            return Err(ResearchServiceError::DuplicateSubmission);
        }

        let cost = self.cost_for(depth);
        let job = ResearchJob::new(account_id, target.to_string(), target_kind, depth, cost);

        self.credits
            .deduct_credits(
                account_id,
                cost,
                format!("Research job for '{}'", target),
                Some(job.id),
            )
            .await
            .map_err(|e| match e {
                CreditsRepositoryError::InsufficientCredits {
                    available,
                    required,
                } => ResearchServiceError::InsufficientCredits {
                    available,
                    required,
                },
                other => ResearchServiceError::Credits(other.to_string()),
            })?;

        match self.jobs.create(&job).await {
            Ok(created) => Ok(created),
            Err(e) => {
                // 任务行写入失败时把已扣的额度还回去，避免凭空消耗
                if let Err(refund_err) = self
                    .credits
                    .add_credits(
                        account_id,
                        cost,
                        CreditsTransactionType::Refund,
                        "Refund: job row could not be created".to_string(),
                        Some(job.id),
                    )
                    .await
                {
                    warn!("Failed to refund credits after create error: {}", refund_err);
                }
                Err(e.into())
            }
        }
    }

    /// 查询账户下的单个任务
    pub async fn get_job(
        &self,
        account_id: Uuid,
        job_id: Uuid,
    ) -> Result<ResearchJob, ResearchServiceError> {
        match self.jobs.find_by_id(job_id).await? {
            Some(job) if job.account_id == account_id => Ok(job),
            _ => Err(ResearchServiceError::NotFound),
        }
    }

    /// 列出账户下的任务
    pub async fn list_jobs(
        &self,
        account_id: Uuid,
        status: Option<JobStatus>,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<ResearchJob>, u64), ResearchServiceError> {
        Ok(self
            .jobs
            .list_for_account(account_id, status, limit, offset)
            .await?)
    }

    /// 删除任务
    ///
    /// 进行中的任务拒绝删除；返回被删除的任务行，
    /// 调用方据此清理工作目录。
    pub async fn delete_job(
        &self,
        account_id: Uuid,
        job_id: Uuid,
    ) -> Result<ResearchJob, ResearchServiceError> {
        let job = self.get_job(account_id, job_id).await?;

        if !job.can_delete() {
            return Err(ResearchServiceError::JobStillRunning);
        }

        self.jobs.delete(job.id).await?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::credits::CreditsTransaction;
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::Mutex;

    struct MockJobRepository {
        jobs: Mutex<Vec<ResearchJob>>,
    }

    impl MockJobRepository {
        fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl JobRepository for MockJobRepository {
        async fn create(&self, job: &ResearchJob) -> Result<ResearchJob, RepositoryError> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job.clone())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<ResearchJob>, RepositoryError> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.id == id)
                .cloned())
        }

        async fn list_for_account(
            &self,
            account_id: Uuid,
            status: Option<JobStatus>,
            _limit: u64,
            _offset: u64,
        ) -> Result<(Vec<ResearchJob>, u64), RepositoryError> {
            let jobs: Vec<ResearchJob> = self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|j| j.account_id == account_id)
                .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
                .cloned()
                .collect();
            let total = jobs.len() as u64;
            Ok((jobs, total))
        }

        async fn find_recent_duplicate(
            &self,
            account_id: Uuid,
            target: &str,
            target_kind: TargetKind,
            since: DateTime<Utc>,
        ) -> Result<Option<ResearchJob>, RepositoryError> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| {
                    j.account_id == account_id
                        && j.target == target
                        && j.target_kind == target_kind
                        && j.created_at > since
                })
                .cloned())
        }

        async fn update(&self, job: &ResearchJob) -> Result<(), RepositoryError> {
            let mut jobs = self.jobs.lock().unwrap();
            let existing = jobs
                .iter_mut()
                .find(|j| j.id == job.id)
                .ok_or(RepositoryError::NotFound)?;
            *existing = job.clone();
            Ok(())
        }

        async fn fail_and_refund(&self, job: &ResearchJob) -> Result<(), RepositoryError> {
            self.update(job).await
        }

        async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
            self.jobs.lock().unwrap().retain(|j| j.id != id);
            Ok(())
        }

        async fn account_email(
            &self,
            _account_id: Uuid,
        ) -> Result<Option<String>, RepositoryError> {
            Ok(None)
        }
    }

    struct MockCreditsRepository {
        balance: Mutex<i64>,
    }

    impl MockCreditsRepository {
        fn with_balance(balance: i64) -> Self {
            Self {
                balance: Mutex::new(balance),
            }
        }
    }

    #[async_trait]
    impl CreditsRepository for MockCreditsRepository {
        async fn get_balance(&self, _account_id: Uuid) -> Result<i64, CreditsRepositoryError> {
            Ok(*self.balance.lock().unwrap())
        }

        async fn deduct_credits(
            &self,
            _account_id: Uuid,
            amount: i64,
            _description: String,
            _reference_id: Option<Uuid>,
        ) -> Result<(), CreditsRepositoryError> {
            let mut balance = self.balance.lock().unwrap();
            if *balance < amount {
                return Err(CreditsRepositoryError::InsufficientCredits {
                    available: *balance,
                    required: amount,
                });
            }
            *balance -= amount;
            Ok(())
        }

        async fn add_credits(
            &self,
            _account_id: Uuid,
            amount: i64,
            _transaction_type: CreditsTransactionType,
            _description: String,
            _reference_id: Option<Uuid>,
        ) -> Result<i64, CreditsRepositoryError> {
            let mut balance = self.balance.lock().unwrap();
            *balance += amount;
            Ok(*balance)
        }

        async fn get_transaction_history(
            &self,
            _account_id: Uuid,
            _limit: Option<u32>,
        ) -> Result<Vec<CreditsTransaction>, CreditsRepositoryError> {
            Ok(Vec::new())
        }

        async fn initialize_account_credits(
            &self,
            _account_id: Uuid,
            initial_balance: i64,
        ) -> Result<i64, CreditsRepositoryError> {
            Ok(initial_balance)
        }
    }

    fn service(
        balance: i64,
    ) -> ResearchService<MockJobRepository, MockCreditsRepository> {
        ResearchService::new(
            Arc::new(MockJobRepository::new()),
            Arc::new(MockCreditsRepository::with_balance(balance)),
            CreditSettings {
                cost_quick: 1,
                cost_standard: 2,
                cost_deep: 4,
            },
        )
    }

    #[tokio::test]
    async fn test_create_job_charges_credits() {
        let svc = service(10);
        let account = Uuid::new_v4();

        let job = svc
            .create_job(account, "OpenAI", TargetKind::Company, Depth::Standard)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.credits_charged, 2);
        assert_eq!(svc.credits.get_balance(account).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_insufficient_credits_rejected() {
        let svc = service(1);
        let account = Uuid::new_v4();

        let err = svc
            .create_job(account, "OpenAI", TargetKind::Company, Depth::Deep)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ResearchServiceError::InsufficientCredits {
                available: 1,
                required: 4
            }
        ));
        // 拒绝时不创建任务行也不扣额度
        assert_eq!(svc.credits.get_balance(account).await.unwrap(), 1);
        let (jobs, _) = svc.list_jobs(account, None, 20, 0).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_submission_within_window() {
        let svc = service(10);
        let account = Uuid::new_v4();

        svc.create_job(account, "OpenAI", TargetKind::Company, Depth::Quick)
            .await
            .unwrap();

        let err = svc
            .create_job(account, " OpenAI ", TargetKind::Company, Depth::Quick)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchServiceError::DuplicateSubmission));

        // 恰好创建了一个任务，且第二次未扣额度
        let (jobs, total) = svc.list_jobs(account, None, 20, 0).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(total, 1);
        assert_eq!(svc.credits.get_balance(account).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_same_target_different_kind_allowed() {
        let svc = service(10);
        let account = Uuid::new_v4();

        svc.create_job(account, "Madonna", TargetKind::Company, Depth::Quick)
            .await
            .unwrap();
        svc.create_job(account, "Madonna", TargetKind::Person, Depth::Quick)
            .await
            .unwrap();

        let (jobs, _) = svc.list_jobs(account, None, 20, 0).await.unwrap();
        assert_eq!(jobs.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_target_rejected() {
        let svc = service(10);
        let err = svc
            .create_job(Uuid::new_v4(), "   ", TargetKind::Company, Depth::Quick)
            .await
            .unwrap_err();
        assert!(matches!(err, ResearchServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_refused_while_running() {
        let svc = service(10);
        let account = Uuid::new_v4();

        let job = svc
            .create_job(account, "OpenAI", TargetKind::Company, Depth::Quick)
            .await
            .unwrap();

        let err = svc.delete_job(account, job.id).await.unwrap_err();
        assert!(matches!(err, ResearchServiceError::JobStillRunning));
    }

    #[tokio::test]
    async fn test_delete_terminal_job() {
        let svc = service(10);
        let account = Uuid::new_v4();

        let job = svc
            .create_job(account, "OpenAI", TargetKind::Company, Depth::Quick)
            .await
            .unwrap();

        // 驱动到终态后删除
        let done = job
            .start("/tmp/r".to_string())
            .unwrap()
            .complete("/tmp/r/REPORT.html".to_string())
            .unwrap();
        svc.jobs.update(&done).await.unwrap();

        let deleted = svc.delete_job(account, done.id).await.unwrap();
        assert_eq!(deleted.id, done.id);
        assert!(matches!(
            svc.get_job(account, done.id).await.unwrap_err(),
            ResearchServiceError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_get_job_scoped_to_account() {
        let svc = service(10);
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();

        let job = svc
            .create_job(owner, "OpenAI", TargetKind::Company, Depth::Quick)
            .await
            .unwrap();

        assert!(svc.get_job(owner, job.id).await.is_ok());
        assert!(matches!(
            svc.get_job(stranger, job.id).await.unwrap_err(),
            ResearchServiceError::NotFound
        ));
    }
}
