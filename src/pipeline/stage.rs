// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::models::job::{Depth, TargetKind};
use crate::domain::models::record::Record;

/// 最终报告文件名（Markdown）
pub const REPORT_MARKDOWN: &str = "DOSSIER.md";

/// 最终报告文件名（HTML）
pub const REPORT_HTML: &str = "REPORT.html";

/// 流水线阶段枚举
///
/// 产物文件名带固定数字前缀，消费方按文件名即可发现
/// 阶段顺序，不需要额外的清单文件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// 网络搜索
    Search,
    /// 页面抽取（由搜索结果播种）
    Pages,
    /// 新闻
    News,
    /// 财务数据
    Financials,
    /// 监管备案
    Filings,
    /// 社交媒体
    Social,
    /// 百科
    Encyclopedia,
    /// 启发式分析
    Analysis,
}

impl Stage {
    /// 阶段产物文件名
    pub fn artifact_name(&self) -> &'static str {
        match self {
            Stage::Search => "01_search.json",
            Stage::Pages => "02_pages.json",
            Stage::News => "03_news.json",
            Stage::Financials => "04_financials.json",
            Stage::Filings => "05_filings.json",
            Stage::Social => "06_social.json",
            Stage::Encyclopedia => "07_encyclopedia.json",
            Stage::Analysis => "08_analysis.json",
        }
    }

    /// 按档位和目标类型选择启用的阶段
    ///
    /// 财务与备案阶段只对公司目标有意义；个人目标直接跳过。
    pub fn for_depth(depth: Depth, target_kind: TargetKind) -> Vec<Stage> {
        let mut stages = vec![Stage::Search, Stage::News, Stage::Encyclopedia];

        if matches!(depth, Depth::Standard | Depth::Deep) {
            stages.push(Stage::Pages);
            stages.push(Stage::Social);
            if target_kind == TargetKind::Company {
                stages.push(Stage::Financials);
            }
        }

        if depth == Depth::Deep && target_kind == TargetKind::Company {
            stages.push(Stage::Filings);
        }

        stages.push(Stage::Analysis);
        stages
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Search => write!(f, "search"),
            Stage::Pages => write!(f, "pages"),
            Stage::News => write!(f, "news"),
            Stage::Financials => write!(f, "financials"),
            Stage::Filings => write!(f, "filings"),
            Stage::Social => write!(f, "social"),
            Stage::Encyclopedia => write!(f, "encyclopedia"),
            Stage::Analysis => write!(f, "analysis"),
        }
    }
}

/// 阶段产物
///
/// 每个阶段写出一个统一形状的JSON文件。阶段失败时
/// success为false并带错误描述，记录列表为空；下游消费方
/// 必须把缺失或空的阶段当作常态处理。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageArtifact {
    /// 阶段名
    pub stage: Stage,
    /// 本阶段使用的查询（即调研目标）
    pub query: String,
    /// 阶段是否成功取得数据
    pub success: bool,
    /// 失败原因
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// 记录数
    pub num_records: usize,
    /// 标准化记录
    pub records: Vec<Record>,
    /// 抓取时间
    pub fetched_at: DateTime<Utc>,
}

impl StageArtifact {
    /// 成功产物（空结果也算成功：缺数据是常态不是异常）
    pub fn success(stage: Stage, query: &str, records: Vec<Record>) -> Self {
        Self {
            stage,
            query: query.to_string(),
            success: true,
            error: None,
            num_records: records.len(),
            records,
            fetched_at: Utc::now(),
        }
    }

    /// 失败产物
    pub fn failure(stage: Stage, query: &str, error: String) -> Self {
        Self {
            stage,
            query: query.to_string(),
            success: false,
            error: Some(error),
            num_records: 0,
            records: Vec::new(),
            fetched_at: Utc::now(),
        }
    }

    /// 产物中是否有可用记录
    pub fn has_records(&self) -> bool {
        !self.records.is_empty()
    }
}
