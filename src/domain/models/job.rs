// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// 调研任务实体
///
/// 表示一次针对单个目标（公司或个人）的档案调研请求。
/// 任务创建时扣除额度，由流水线在后台执行各数据源阶段，
/// 并在完成或失败时进入终态。失败时额度会被退还。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchJob {
    /// 任务唯一标识符
    pub id: Uuid,
    /// 所属账户ID，用于权限隔离和额度结算
    pub account_id: Uuid,
    /// 调研目标（公司名或人名）
    pub target: String,
    /// 目标类型，决定启用哪些数据源阶段
    pub target_kind: TargetKind,
    /// 调研深度档位，决定流水线广度和额度消耗
    pub depth: Depth,
    /// 任务状态，跟踪任务在其生命周期中的当前阶段
    pub status: JobStatus,
    /// 创建时扣除的额度数，失败时按此数额退还
    pub credits_charged: i64,
    /// 工作目录路径，保存各阶段的中间产物
    pub output_dir: Option<String>,
    /// 最终报告文件路径
    pub report_path: Option<String>,
    /// 失败时面向调用方的错误描述
    pub error_message: Option<String>,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 开始执行时间
    pub started_at: Option<DateTime<Utc>>,
    /// 完成或失败时间
    pub completed_at: Option<DateTime<Utc>>,
}

/// 目标类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// 公司目标，启用财务和监管备案阶段
    #[default]
    Company,
    /// 个人目标，跳过财务和监管备案阶段
    Person,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TargetKind::Company => write!(f, "company"),
            TargetKind::Person => write!(f, "person"),
        }
    }
}

impl FromStr for TargetKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "company" => Ok(TargetKind::Company),
            "person" => Ok(TargetKind::Person),
            _ => Err(()),
        }
    }
}

/// 调研深度档位枚举
///
/// 档位越深，启用的数据源阶段越多，额度消耗越高。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    /// 快速档：网络搜索、新闻、百科
    Quick,
    /// 标准档：增加财务、社交媒体和页面抽取
    #[default]
    Standard,
    /// 深度档：增加监管备案，并放大结果数量
    Deep,
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Depth::Quick => write!(f, "quick"),
            Depth::Standard => write!(f, "standard"),
            Depth::Deep => write!(f, "deep"),
        }
    }
}

impl FromStr for Depth {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "quick" => Ok(Depth::Quick),
            "standard" => Ok(Depth::Standard),
            "deep" => Ok(Depth::Deep),
            _ => Err(()),
        }
    }
}

/// 任务状态枚举
///
/// 状态转换只允许单向前进：
/// Pending → Processing → Completed/Failed
/// Completed和Failed为终态，进入终态后除删除外不可变更。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// 已创建，等待流水线开始执行
    #[default]
    Pending,
    /// 执行中，流水线正在抓取各数据源
    Processing,
    /// 已完成，报告产物已生成
    Completed,
    /// 已失败，未能生成报告，额度已退还
    Failed,
}

impl JobStatus {
    /// 判断状态是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Processing => write!(f, "processing"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

/// 领域错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 无效的状态转换，当任务状态转换不符合业务规则时发生
    #[error("Invalid state transition")]
    InvalidStateTransition,

    /// 验证错误，当输入数据不符合领域规则时发生
    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl ResearchJob {
    /// 创建一个新的调研任务
    ///
    /// # 参数
    ///
    /// * `account_id` - 所属账户ID
    /// * `target` - 调研目标
    /// * `target_kind` - 目标类型
    /// * `depth` - 调研深度档位
    /// * `credits_charged` - 本次扣除的额度数
    pub fn new(
        account_id: Uuid,
        target: String,
        target_kind: TargetKind,
        depth: Depth,
        credits_charged: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            target,
            target_kind,
            depth,
            status: JobStatus::Pending,
            credits_charged,
            output_dir: None,
            report_path: None,
            error_message: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// 启动任务
    ///
    /// 将任务状态从Pending变更为Processing，并记录工作目录
    ///
    /// # 返回值
    ///
    /// * `Ok(ResearchJob)` - 成功启动的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn start(mut self, output_dir: String) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Pending => {
                self.status = JobStatus::Processing;
                self.started_at = Some(Utc::now());
                self.output_dir = Some(output_dir).filter(|d| !d.is_empty());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 完成任务
    ///
    /// 将任务状态从Processing变更为Completed，并记录报告路径
    ///
    /// # 返回值
    ///
    /// * `Ok(ResearchJob)` - 成功完成的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn complete(mut self, report_path: String) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Processing => {
                self.status = JobStatus::Completed;
                self.report_path = Some(report_path);
                self.completed_at = Some(Utc::now());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 标记任务失败
    ///
    /// 将任务状态从Processing变更为Failed，并记录错误描述
    ///
    /// # 返回值
    ///
    /// * `Ok(ResearchJob)` - 失败的任务
    /// * `Err(DomainError)` - 状态转换失败
    pub fn fail(mut self, error: String) -> Result<Self, DomainError> {
        match self.status {
            JobStatus::Processing => {
                self.status = JobStatus::Failed;
                self.error_message = Some(error);
                self.completed_at = Some(Utc::now());
                Ok(self)
            }
            _ => Err(DomainError::InvalidStateTransition),
        }
    }

    /// 判断任务是否允许删除
    ///
    /// 进行中的任务不可删除，只有终态任务可以删除
    pub fn can_delete(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job() -> ResearchJob {
        ResearchJob::new(
            Uuid::new_v4(),
            "OpenAI".to_string(),
            TargetKind::Company,
            Depth::Standard,
            2,
        )
    }

    #[test]
    fn test_lifecycle_completed() {
        let job = new_job();
        assert_eq!(job.status, JobStatus::Pending);

        let job = job.start("/tmp/research_x".to_string()).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.started_at.is_some());

        let job = job.complete("/tmp/research_x/REPORT.html".to_string()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.completed_at.is_some());
        assert!(job.can_delete());
    }

    #[test]
    fn test_lifecycle_failed() {
        let job = new_job().start("/tmp/r".to_string()).unwrap();
        let job = job.fail("no report artifact produced".to_string()).unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(
            job.error_message.as_deref(),
            Some("no report artifact produced")
        );
    }

    #[test]
    fn test_terminal_states_are_immutable() {
        let job = new_job().start("/tmp/r".to_string()).unwrap();
        let done = job.complete("/tmp/r/REPORT.html".to_string()).unwrap();

        // 终态不允许再转换
        assert!(matches!(
            done.clone().fail("x".to_string()),
            Err(DomainError::InvalidStateTransition)
        ));
        assert!(matches!(
            done.start("/tmp/r".to_string()),
            Err(DomainError::InvalidStateTransition)
        ));
    }

    #[test]
    fn test_cannot_complete_pending() {
        let job = new_job();
        assert!(matches!(
            job.complete("r".to_string()),
            Err(DomainError::InvalidStateTransition)
        ));
    }

    #[test]
    fn test_cannot_delete_active() {
        let job = new_job();
        assert!(!job.can_delete());
        let job = job.start("/tmp/r".to_string()).unwrap();
        assert!(!job.can_delete());
    }
}
