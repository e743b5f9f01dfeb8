// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// 标题指纹的最大长度
const FINGERPRINT_MAX_LEN: usize = 50;

/// 清理文本中的多余空白字符
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 计算标题指纹
///
/// 转为小写、去掉所有非字母数字字符并截断到固定长度，
/// 用于跨数据源的近似重复检测。
pub fn title_fingerprint(title: &str) -> String {
    let normalized: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    normalized.chars().take(FINGERPRINT_MAX_LEN).collect()
}

/// 宽松解析日期字符串
///
/// 新闻源返回的时间戳格式五花八门，依次尝试常见格式；
/// 全部失败时返回None，调用方应将其排在最后。
pub fn parse_date_flexible(date_str: &str) -> Option<DateTime<Utc>> {
    let trimmed = date_str.trim();
    if trimmed.is_empty() {
        return None;
    }

    // RFC 3339 / ISO 8601 with offset
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }

    // RFC 2822 (RSS pubDate), GMT spelled out included
    if let Ok(dt) = DateTime::parse_from_rfc2822(&trimmed.replace("GMT", "+0000")) {
        return Some(dt.with_timezone(&Utc));
    }

    // Naive timestamp formats
    let naive_formats = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];
    for fmt in naive_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    // Bare date
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("  hello \n\t world  "), "hello world");
        assert_eq!(clean_text(""), "");
    }

    #[test]
    fn test_title_fingerprint_normalizes() {
        assert_eq!(
            title_fingerprint("OpenAI Raises $6.6B!"),
            title_fingerprint("openai raises 66b")
        );
    }

    #[test]
    fn test_title_fingerprint_truncates() {
        let long_title = "a".repeat(200);
        assert_eq!(title_fingerprint(&long_title).len(), 50);
    }

    #[test]
    fn test_parse_date_rfc3339() {
        let dt = parse_date_flexible("2026-01-15T10:30:00Z").unwrap();
        assert_eq!(dt.timestamp(), 1768473000);
    }

    #[test]
    fn test_parse_date_rfc2822() {
        assert!(parse_date_flexible("Wed, 14 Jan 2026 09:00:00 GMT").is_some());
    }

    #[test]
    fn test_parse_date_bare() {
        assert!(parse_date_flexible("2026-01-15").is_some());
    }

    #[test]
    fn test_parse_date_garbage() {
        assert!(parse_date_flexible("yesterday-ish").is_none());
        assert!(parse_date_flexible("").is_none());
    }
}
