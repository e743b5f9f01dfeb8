// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde::{Deserialize, Serialize};

/// 标准化记录
///
/// 各外部数据源返回的统一信息单元（搜索命中、新闻文章、
/// 社交资料等）。结构化数据源（财务、备案、百科）把完整
/// 载荷放在data字段中，列表字段保持统一形状。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// 标题
    pub title: String,
    /// 链接
    pub url: String,
    /// 摘要或正文片段
    pub snippet: String,
    /// 发布时间（原样保留的自由格式字符串）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    /// 来源名称（媒体名、平台名等）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// 出处标签，标识产生该记录的适配器
    pub provenance: String,
    /// 结构化载荷（财务指标、信息框键值等）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl Record {
    /// 创建一条新记录
    pub fn new(title: String, url: String, snippet: String, provenance: &str) -> Self {
        Self {
            title,
            url,
            snippet,
            published_at: None,
            source: None,
            provenance: provenance.to_string(),
            data: None,
        }
    }

    /// 设置发布时间
    pub fn with_published_at(mut self, published_at: Option<String>) -> Self {
        self.published_at = published_at.filter(|s| !s.is_empty());
        self
    }

    /// 设置来源名称
    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source.filter(|s| !s.is_empty());
        self
    }

    /// 设置结构化载荷
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// 适配器调用结果
///
/// 一次成功的适配器调用要么带回记录，要么明确为空。
/// 错误通过`SourceError`表达，不会越过适配器边界抛出。
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// 命中记录
    Hits(Vec<Record>),
    /// 上游明确返回空集
    Empty,
}

impl FetchOutcome {
    /// 从记录列表构造结果，空列表归一为Empty
    pub fn from_records(records: Vec<Record>) -> Self {
        if records.is_empty() {
            FetchOutcome::Empty
        } else {
            FetchOutcome::Hits(records)
        }
    }

    /// 取出记录列表，Empty等价于空列表
    pub fn into_records(self) -> Vec<Record> {
        match self {
            FetchOutcome::Hits(records) => records,
            FetchOutcome::Empty => Vec::new(),
        }
    }

    /// 是否为空结果
    pub fn is_empty(&self) -> bool {
        matches!(self, FetchOutcome::Empty)
    }
}
