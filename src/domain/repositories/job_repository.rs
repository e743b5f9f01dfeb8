// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::job::{JobStatus, ResearchJob, TargetKind};

/// 仓库错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found")]
    NotFound,

    #[error("Invalid state transition")]
    InvalidTransition,
}

/// 调研任务仓库特质
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// 持久化新任务
    async fn create(&self, job: &ResearchJob) -> Result<ResearchJob, RepositoryError>;

    /// 按ID查找任务
    async fn find_by_id(&self, id: Uuid) -> Result<Option<ResearchJob>, RepositoryError>;

    /// 列出账户下的任务（按创建时间倒序）
    ///
    /// # 返回值
    ///
    /// 返回任务列表和满足过滤条件的总数
    async fn list_for_account(
        &self,
        account_id: Uuid,
        status: Option<JobStatus>,
        limit: u64,
        offset: u64,
    ) -> Result<(Vec<ResearchJob>, u64), RepositoryError>;

    /// 查找去重窗口内同一(账户, 目标, 类型)的既有任务
    async fn find_recent_duplicate(
        &self,
        account_id: Uuid,
        target: &str,
        target_kind: TargetKind,
        since: DateTime<Utc>,
    ) -> Result<Option<ResearchJob>, RepositoryError>;

    /// 更新任务行
    ///
    /// 持久层会校验状态列的前进方向：终态任务的行不允许
    /// 再被改写为任何其他状态。
    async fn update(&self, job: &ResearchJob) -> Result<(), RepositoryError>;

    /// 标记任务失败并退还额度
    ///
    /// 状态更新与额度退还必须在同一数据库事务内完成，
    /// 保证额度不变式在任何时刻可观测成立。
    async fn fail_and_refund(
        &self,
        job: &ResearchJob,
    ) -> Result<(), RepositoryError>;

    /// 删除任务行
    async fn delete(&self, id: Uuid) -> Result<(), RepositoryError>;

    /// 查询账户的通知邮箱
    async fn account_email(&self, account_id: Uuid) -> Result<Option<String>, RepositoryError>;
}
