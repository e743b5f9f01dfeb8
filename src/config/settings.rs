// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// 应用程序配置设置
///
/// 包含数据库、服务器、数据源重试、额度定价和通知等所有配置项
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// 数据库配置
    pub database: DatabaseSettings,
    /// 服务器配置
    pub server: ServerSettings,
    /// 数据源抓取配置
    pub sources: SourceSettings,
    /// 流水线配置
    pub pipeline: PipelineSettings,
    /// 额度定价配置
    pub credits: CreditSettings,
    /// 邮件通知配置
    pub notify: NotifySettings,
}

/// 数据库配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// 数据库连接URL
    pub url: String,
    /// 最大连接数
    pub max_connections: Option<u32>,
    /// 最小连接数
    pub min_connections: Option<u32>,
    /// 连接超时时间（秒）
    pub connect_timeout: Option<u64>,
    /// 空闲连接超时时间（秒）
    pub idle_timeout: Option<u64>,
}

/// 服务器配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// 服务器监听主机地址
    pub host: String,
    /// 服务器监听端口
    pub port: u16,
}

/// 数据源抓取配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSettings {
    /// 单次HTTP请求超时时间（秒）
    pub request_timeout: u64,
    /// 最大重试次数
    pub max_retries: u32,
    /// 重试初始退避时间（秒）
    pub retry_base_delay: u64,
    /// 重试最大退避时间（秒）
    pub retry_max_delay: u64,
    /// 每个数据源的最大结果数
    pub max_results: usize,
    /// NewsAPI密钥（可选，配置后启用第三新闻源）
    pub newsapi_key: Option<String>,
    /// SEC EDGAR要求的联系方式User-Agent
    pub sec_user_agent: String,
}

/// 流水线配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineSettings {
    /// 工作目录根路径
    pub output_root: String,
    /// 页面抓取阶段的最大页面数
    pub max_pages: usize,
    /// 页面抓取阶段跳过的低价值域名
    pub skip_domains: Vec<String>,
    /// 单个阶段的总超时上限（秒）
    pub stage_timeout: u64,
    /// 情感分析判定阈值（正负信号计数）
    pub sentiment_threshold: i64,
}

/// 额度定价配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct CreditSettings {
    /// quick档位的额度消耗
    pub cost_quick: i64,
    /// standard档位的额度消耗
    pub cost_standard: i64,
    /// deep档位的额度消耗
    pub cost_deep: i64,
}

/// 邮件通知配置设置
#[derive(Debug, Clone, Deserialize)]
pub struct NotifySettings {
    /// 是否启用邮件通知
    pub enabled: bool,
    /// SMTP服务器地址
    pub smtp_host: Option<String>,
    /// SMTP用户名
    pub smtp_user: Option<String>,
    /// SMTP密码
    pub smtp_pass: Option<String>,
    /// 发件人地址
    pub from_email: Option<String>,
}

impl Settings {
    /// 创建新的配置实例
    ///
    /// 从环境变量加载配置，支持默认值
    ///
    /// # Returns
    ///
    /// * `Ok(Settings)` - 成功加载的配置
    /// * `Err(ConfigError)` - 配置加载失败
    pub fn new() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENVIRONMENT").unwrap_or_else(|_| "default".to_string());
        let builder = Config::builder()
            // Start with default settings
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            // Default DB pool settings
            .set_default("database.url", "sqlite://dossiers.db?mode=rwc")?
            .set_default("database.max_connections", 100)?
            .set_default("database.min_connections", 10)?
            .set_default("database.connect_timeout", 10)?
            .set_default("database.idle_timeout", 300)?
            // Default source fetch settings
            .set_default("sources.request_timeout", 30)?
            .set_default("sources.max_retries", 3)?
            .set_default("sources.retry_base_delay", 2)?
            .set_default("sources.retry_max_delay", 30)?
            .set_default("sources.max_results", 20)?
            .set_default("sources.sec_user_agent", "dossiers/0.1 (contact@example.com)")?
            // Default pipeline settings
            .set_default("pipeline.output_root", "./research")?
            .set_default("pipeline.max_pages", 8)?
            .set_default(
                "pipeline.skip_domains",
                vec![
                    "youtube.com".to_string(),
                    "twitter.com".to_string(),
                    "facebook.com".to_string(),
                    "instagram.com".to_string(),
                ],
            )?
            .set_default("pipeline.stage_timeout", 300)?
            .set_default("pipeline.sentiment_threshold", 3)?
            // Default credit pricing
            .set_default("credits.cost_quick", 1)?
            .set_default("credits.cost_standard", 2)?
            .set_default("credits.cost_deep", 4)?
            // Default notification settings
            .set_default("notify.enabled", false)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("DOSSIER").separator("__"));

        builder.build()?.try_deserialize()
    }
}
