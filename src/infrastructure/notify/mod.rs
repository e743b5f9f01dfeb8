// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// SMTP邮件通知实现
pub mod email;

use async_trait::async_trait;

use crate::domain::models::job::ResearchJob;

/// 通知接口
///
/// 任务完成后的通知是尽力而为的副作用：发送失败只记录日志，
/// 绝不影响任务状态。
#[async_trait]
pub trait Notifier: Send + Sync {
    /// 通知调用方报告已就绪
    async fn notify_job_ready(&self, job: &ResearchJob, recipient: Option<&str>);
}

/// 空实现，未配置通知渠道时使用
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify_job_ready(&self, _job: &ResearchJob, _recipient: Option<&str>) {}
}
