// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod composer;
pub mod encyclopedia;
pub mod filings;
pub mod financials;
pub mod news;
pub mod page;
pub mod retry;
pub mod social;
pub mod web_search;

use crate::config::settings::SourceSettings;
use std::time::Duration;

/// 构建数据源共用的HTTP客户端
///
/// 统一设置UA、超时与连接池参数；构建失败时退回默认客户端。
pub fn build_http_client(settings: &SourceSettings) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .timeout(Duration::from_secs(settings.request_timeout))
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
