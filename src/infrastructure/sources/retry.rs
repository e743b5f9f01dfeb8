// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::config::settings::SourceSettings;
use crate::domain::models::record::FetchOutcome;
use crate::domain::sources::adapter::FetchResult;

/// 重试策略配置
///
/// 显式传入每次调用，不依赖任何全局可变状态。
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数
    pub max_attempts: u32,
    /// 初始退避时间
    pub base_delay: Duration,
    /// 最大退避时间
    pub max_delay: Duration,
    /// 抖动因子 (0.0-1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.1,
        }
    }
}

impl RetryPolicy {
    /// 从配置构建重试策略
    pub fn from_settings(settings: &SourceSettings) -> Self {
        Self {
            max_attempts: settings.max_retries,
            base_delay: Duration::from_secs(settings.retry_base_delay),
            max_delay: Duration::from_secs(settings.retry_max_delay),
            jitter_factor: 0.1,
        }
    }

    /// 覆盖最大尝试次数
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// 计算第attempt次失败后的退避时间
    ///
    /// min(base * 2^attempt, cap) 加上 0 到 jitter_factor 比例的随机抖动。
    /// 抖动只用于打散调度，不要求密码学强度。
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = exp.min(self.max_delay.as_secs_f64());
        let jitter = rand::random_range(0.0..=capped * self.jitter_factor);
        Duration::from_secs_f64(capped + jitter)
    }
}

/// 带重试地执行一次抓取操作
///
/// 空结果和可重试错误都会触发重试：上游抖动造成的空结果与
/// 真实不存在无法区分，重试空结果是面向可用性的取舍。
/// 永久性错误（404、明确未找到）立即返回，不消耗重试额度。
/// 重试耗尽后返回最后的错误或Empty，绝不向上抛出。
pub async fn run_with_retry<F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> FetchResult
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FetchResult>,
{
    let mut last_error = None;

    for attempt in 0..policy.max_attempts {
        match op().await {
            Ok(FetchOutcome::Hits(records)) => return Ok(FetchOutcome::Hits(records)),
            Ok(FetchOutcome::Empty) => {
                last_error = None;
            }
            Err(e) if e.is_retryable() => {
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }

        if attempt + 1 < policy.max_attempts {
            let delay = policy.backoff_delay(attempt);
            debug!(
                source = label,
                attempt = attempt + 1,
                delay_ms = delay.as_millis() as u64,
                "Retrying after empty or transient failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    match last_error {
        Some(e) => Err(e),
        None => Ok(FetchOutcome::Empty),
    }
}
