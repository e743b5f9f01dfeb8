// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 人物抽取：头衔在前（如 "CEO Sam Altman"）
static PERSON_AFTER_ROLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:CEO|CTO|CFO|COO|[Ff]ounder|[Cc]o-founder|[Pp]resident|[Cc]hairman)\s+([A-Z][a-z]+\s+[A-Z][a-z]+)",
    )
    .expect("invalid person-after-role regex")
});

/// 人物抽取：头衔在后（如 "Sam Altman, CEO"）
static PERSON_BEFORE_ROLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"([A-Z][a-z]+\s+[A-Z][a-z]+),?\s+(?:the\s+)?(?:CEO|CTO|CFO|COO|[Ff]ounder|[Cc]o-founder|[Pp]resident|[Cc]hairman)",
    )
    .expect("invalid person-before-role regex")
});

/// 公司抽取：带常见公司后缀的专有名词
static COMPANY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Z][a-zA-Z]*(?:\s+[A-Z][a-zA-Z]*)*)\s+(?:Inc\.?|Corp\.?|LLC|Ltd\.?|Company|Co\.)")
        .expect("invalid company-suffix regex")
});

/// 金额抽取：融资、估值、员工数等显著数字
static KEY_NUMBER_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"(?i)raised\s+\$[\d,]+(?:\.\d+)?\s*(?:billion|million|B|M)\b").unwrap(),
            "funding",
        ),
        (
            Regex::new(r"(?i)valued\s+at\s+\$[\d,]+(?:\.\d+)?\s*(?:billion|million|B|M)\b")
                .unwrap(),
            "valuation",
        ),
        (
            Regex::new(r"(?i)\$[\d,]+(?:\.\d+)?\s*(?:billion|B)\b").unwrap(),
            "billion",
        ),
        (
            Regex::new(r"(?i)\$[\d,]+(?:\.\d+)?\s*(?:million|M)\b").unwrap(),
            "million",
        ),
        (
            Regex::new(r"(?i)(\d{1,3}(?:,\d{3})+)\s*employees").unwrap(),
            "employees",
        ),
    ]
});

/// 分析配置
///
/// 情感词表和判定阈值都是可调参数，不是业务不变式。
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    /// 正向信号词表
    pub positive_words: Vec<String>,
    /// 负向信号词表
    pub negative_words: Vec<String>,
    /// SWOT判定使用的信号计数阈值
    pub signal_threshold: i64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            positive_words: [
                "growth",
                "success",
                "innovative",
                "leading",
                "profitable",
                "expanding",
                "breakthrough",
                "achievement",
                "partnership",
                "launch",
                "award",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            negative_words: [
                "lawsuit",
                "decline",
                "loss",
                "layoff",
                "controversy",
                "investigation",
                "failure",
                "struggle",
                "debt",
                "scandal",
                "criticism",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            signal_threshold: 3,
        }
    }
}

/// 情感判定结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: String,
    pub score: f64,
    pub positive_signals: i64,
    pub negative_signals: i64,
}

/// 显著数字
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyNumber {
    pub value: String,
    pub category: String,
}

/// SWOT条目（仅基于启发式信号，精度有限）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Swot {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub opportunities: Vec<String>,
    pub threats: Vec<String>,
}

/// 分析输入的补充上下文
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    /// 财务阶段得到的营收增速（如有）
    pub revenue_growth: Option<f64>,
    /// 社交阶段发现的资料数
    pub social_profiles: usize,
}

/// 分析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub sentiment: Sentiment,
    pub key_people: Vec<String>,
    pub mentioned_companies: Vec<String>,
    pub key_numbers: Vec<KeyNumber>,
    pub swot: Swot,
}

/// 分析服务
///
/// 对聚合文本做尽力而为的模式抽取。这是启发式阶段，
/// 输出精度有明确边界，消费方不应依赖其完备性。
pub struct AnalysisService {
    config: AnalysisConfig,
}

impl AnalysisService {
    pub fn new(config: AnalysisConfig) -> Self {
        Self { config }
    }

    /// 分析聚合文本
    pub fn analyze(&self, text: &str, context: &AnalysisContext) -> Analysis {
        let sentiment = self.sentiment(text);
        let swot = self.swot(&sentiment, context);

        Analysis {
            key_people: Self::extract_people(text),
            mentioned_companies: Self::extract_companies(text),
            key_numbers: Self::extract_numbers(text),
            swot,
            sentiment,
        }
    }

    /// 基于词表计数的情感判定
    fn sentiment(&self, text: &str) -> Sentiment {
        let lower = text.to_lowercase();
        let positive = self
            .config
            .positive_words
            .iter()
            .filter(|w| lower.contains(w.as_str()))
            .count() as i64;
        let negative = self
            .config
            .negative_words
            .iter()
            .filter(|w| lower.contains(w.as_str()))
            .count() as i64;

        let total = positive + negative;
        if total == 0 {
            return Sentiment {
                label: "neutral".to_string(),
                score: 0.0,
                positive_signals: 0,
                negative_signals: 0,
            };
        }

        let score = (positive - negative) as f64 / total as f64;
        let label = if score > 0.2 {
            "positive"
        } else if score < -0.2 {
            "negative"
        } else {
            "neutral"
        };

        Sentiment {
            label: label.to_string(),
            score: (score * 100.0).round() / 100.0,
            positive_signals: positive,
            negative_signals: negative,
        }
    }

    fn swot(&self, sentiment: &Sentiment, context: &AnalysisContext) -> Swot {
        let mut swot = Swot::default();

        if sentiment.positive_signals > self.config.signal_threshold {
            swot.strengths.push("Positive media coverage".to_string());
        }
        if let Some(growth) = context.revenue_growth {
            if growth > 0.0 {
                swot.strengths
                    .push(format!("Revenue growth: {:.1}%", growth * 100.0));
            }
        }
        if context.social_profiles as i64 > self.config.signal_threshold {
            swot.strengths
                .push("Strong social media presence".to_string());
        }
        if sentiment.negative_signals > self.config.signal_threshold - 1 {
            swot.threats
                .push("Some negative media coverage".to_string());
        }

        swot
    }

    fn extract_people(text: &str) -> Vec<String> {
        let mut people = BTreeSet::new();
        for caps in PERSON_AFTER_ROLE.captures_iter(text) {
            people.insert(caps[1].to_string());
        }
        for caps in PERSON_BEFORE_ROLE.captures_iter(text) {
            people.insert(caps[1].to_string());
        }
        people.into_iter().take(10).collect()
    }

    fn extract_companies(text: &str) -> Vec<String> {
        let mut companies = BTreeSet::new();
        for caps in COMPANY_SUFFIX.captures_iter(text) {
            companies.insert(caps[1].to_string());
        }
        companies.into_iter().take(10).collect()
    }

    fn extract_numbers(text: &str) -> Vec<KeyNumber> {
        let mut numbers = Vec::new();
        for (pattern, category) in KEY_NUMBER_PATTERNS.iter() {
            for m in pattern.find_iter(text) {
                numbers.push(KeyNumber {
                    value: m.as_str().to_string(),
                    category: category.to_string(),
                });
                if numbers.len() >= 10 {
                    return numbers;
                }
            }
        }
        numbers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AnalysisService {
        AnalysisService::new(AnalysisConfig::default())
    }

    #[test]
    fn test_sentiment_positive() {
        let text = "Record growth and a breakthrough product launch, plus a new partnership and an industry award after strong success.";
        let s = service().sentiment(text);
        assert_eq!(s.label, "positive");
        assert!(s.positive_signals >= 4);
        assert_eq!(s.negative_signals, 0);
    }

    #[test]
    fn test_sentiment_negative() {
        let text = "The lawsuit and ongoing investigation follow a scandal, heavy losses and a large layoff round.";
        let s = service().sentiment(text);
        assert_eq!(s.label, "negative");
    }

    #[test]
    fn test_sentiment_neutral_on_empty_signals() {
        let s = service().sentiment("The company makes widgets.");
        assert_eq!(s.label, "neutral");
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn test_extract_people() {
        let text = "CEO Sam Altman announced the plan. Mira Murati, CTO, will lead it.";
        let people = AnalysisService::extract_people(text);
        assert!(people.contains(&"Sam Altman".to_string()));
        assert!(people.contains(&"Mira Murati".to_string()));
    }

    #[test]
    fn test_extract_companies() {
        let text = "Acme Corp. partnered with Globex Inc and Initech LLC on the deal.";
        let companies = AnalysisService::extract_companies(text);
        assert!(companies.contains(&"Acme".to_string()));
        assert!(companies.contains(&"Globex".to_string()));
    }

    #[test]
    fn test_extract_numbers_funding() {
        let text = "The startup raised $6.6 billion and is valued at $157 billion.";
        let numbers = AnalysisService::extract_numbers(text);
        assert!(numbers.iter().any(|n| n.category == "funding"));
        assert!(numbers.iter().any(|n| n.category == "valuation"));
    }

    #[test]
    fn test_swot_threshold_is_configurable() {
        let mut config = AnalysisConfig::default();
        config.signal_threshold = 1;
        let svc = AnalysisService::new(config);

        let text = "growth success"; // 两个正向信号
        let analysis = svc.analyze(text, &AnalysisContext::default());
        assert!(analysis
            .swot
            .strengths
            .contains(&"Positive media coverage".to_string()));
    }
}
