// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::Utc;
use std::path::PathBuf;
use thiserror::Error;

use crate::domain::models::job::ResearchJob;
use crate::pipeline::stage::{Stage, StageArtifact, REPORT_HTML, REPORT_MARKDOWN};
use crate::pipeline::workdir::{WorkDir, WorkdirError};

#[derive(Error, Debug)]
pub enum CompileError {
    /// Every stage came back empty; there is nothing to report on.
    #[error("No usable stage data to compile a report from")]
    NoData,

    #[error("Workdir error: {0}")]
    Workdir(#[from] WorkdirError),
}

/// Paths of the compiled report artifacts.
#[derive(Debug, Clone)]
pub struct CompiledReport {
    pub markdown_path: PathBuf,
    pub html_path: PathBuf,
}

#[derive(Debug, Default)]
struct ArtifactSet {
    search: Option<StageArtifact>,
    pages: Option<StageArtifact>,
    news: Option<StageArtifact>,
    financials: Option<StageArtifact>,
    filings: Option<StageArtifact>,
    social: Option<StageArtifact>,
    encyclopedia: Option<StageArtifact>,
    analysis: Option<StageArtifact>,
}

impl ArtifactSet {
    fn any_records(&self) -> bool {
        [
            &self.search,
            &self.pages,
            &self.news,
            &self.financials,
            &self.filings,
            &self.social,
            &self.encyclopedia,
        ]
        .iter()
        .any(|a| a.as_ref().map(|a| a.has_records()).unwrap_or(false))
    }

    /// First record's structured payload for a stage, if any.
    fn data(artifact: &Option<StageArtifact>) -> Option<&serde_json::Value> {
        artifact
            .as_ref()?
            .records
            .first()?
            .data
            .as_ref()
    }
}

/// Compiles the per-stage artifacts of a working directory into the
/// final dossier: a Markdown document plus a styled standalone HTML
/// rendering. Missing or empty stages are skipped section by section;
/// a minimal dossier from search data alone is valid output.
pub struct ReportCompiler;

impl ReportCompiler {
    pub fn new() -> Self {
        Self
    }

    pub async fn compile(
        &self,
        job: &ResearchJob,
        workdir: &WorkDir,
    ) -> Result<CompiledReport, CompileError> {
        let artifacts = ArtifactSet {
            search: workdir.read_stage(Stage::Search).await,
            pages: workdir.read_stage(Stage::Pages).await,
            news: workdir.read_stage(Stage::News).await,
            financials: workdir.read_stage(Stage::Financials).await,
            filings: workdir.read_stage(Stage::Filings).await,
            social: workdir.read_stage(Stage::Social).await,
            encyclopedia: workdir.read_stage(Stage::Encyclopedia).await,
            analysis: workdir.read_stage(Stage::Analysis).await,
        };

        if !artifacts.any_records() {
            return Err(CompileError::NoData);
        }

        let markdown = self.render_markdown(job, &artifacts);
        let markdown_path = workdir.write_text(REPORT_MARKDOWN, &markdown).await?;

        let html = self.render_html(job, &artifacts);
        let html_path = workdir.write_text(REPORT_HTML, &html).await?;

        Ok(CompiledReport {
            markdown_path,
            html_path,
        })
    }

    fn render_markdown(&self, job: &ResearchJob, artifacts: &ArtifactSet) -> String {
        let mut sections: Vec<String> = Vec::new();
        let count = |a: &Option<StageArtifact>| a.as_ref().map(|a| a.num_records).unwrap_or(0);

        sections.push(format!(
            "# Research Dossier: {}\n\n**Generated:** {}\n**Target kind:** {}\n**Data sources:** {} search results, {} news articles\n\n---\n",
            job.target,
            Utc::now().format("%Y-%m-%d %H:%M"),
            job.target_kind,
            count(&artifacts.search),
            count(&artifacts.news),
        ));

        // Executive summary: encyclopedia extract first, search snippet as fallback
        let summary = ArtifactSet::data(&artifacts.encyclopedia)
            .and_then(|d| d["summary"].as_str())
            .map(|s| s.to_string())
            .or_else(|| {
                artifacts
                    .search
                    .as_ref()
                    .and_then(|a| a.records.first())
                    .map(|r| r.snippet.clone())
            })
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("Research compilation for {}.", job.target));
        let summary = truncate_chars(&summary, 500);

        let sentiment_line = ArtifactSet::data(&artifacts.analysis)
            .and_then(|d| {
                let s = &d["sentiment"];
                s["label"].as_str().map(|label| {
                    format!(
                        "\n**Overall sentiment:** {} (score: {})",
                        label,
                        s["score"].as_f64().unwrap_or(0.0)
                    )
                })
            })
            .unwrap_or_default();

        sections.push(format!(
            "## Executive Summary\n\n{}{}\n\n---\n",
            summary, sentiment_line
        ));

        // Key facts from the encyclopedia infobox
        if let Some(infobox) = ArtifactSet::data(&artifacts.encyclopedia)
            .and_then(|d| d["infobox"].as_object())
            .filter(|o| !o.is_empty())
        {
            let mut lines = Vec::new();
            for (key, value) in infobox {
                if let Some(v) = value.as_str() {
                    lines.push(format!("- **{}:** {}", key.replace('_', " "), v));
                }
            }
            sections.push(format!("## Key Facts\n\n{}\n\n---\n", lines.join("\n")));
        }

        // Financial snapshot
        if let Some(data) = ArtifactSet::data(&artifacts.financials) {
            let mut lines = Vec::new();
            if let Some(ticker) = data["ticker"].as_str() {
                lines.push(format!("- **Ticker:** {}", ticker));
            }
            if let Some(exchange) = data["exchange"].as_str() {
                lines.push(format!("- **Exchange:** {}", exchange));
            }
            if let Some(price) = data["current_price"].as_f64() {
                let currency = data["currency"].as_str().unwrap_or("");
                lines.push(format!("- **Current price:** {:.2} {}", price, currency));
            }
            if let (Some(high), Some(low)) =
                (data["52_week_high"].as_f64(), data["52_week_low"].as_f64())
            {
                lines.push(format!("- **52-week range:** {:.2} - {:.2}", low, high));
            }
            if !lines.is_empty() {
                sections.push(format!(
                    "## Financial Snapshot\n\n{}\n\n---\n",
                    lines.join("\n")
                ));
            }
        }

        // Regulatory filings
        if let Some(data) = ArtifactSet::data(&artifacts.filings) {
            if let Some(filings) = data["recent_filings"].as_array().filter(|f| !f.is_empty()) {
                let lines: Vec<String> = filings
                    .iter()
                    .take(10)
                    .map(|f| {
                        format!(
                            "- **{}** ({})",
                            f["form"].as_str().unwrap_or("?"),
                            f["date"].as_str().unwrap_or("unknown date"),
                        )
                    })
                    .collect();
                sections.push(format!(
                    "## Regulatory Filings\n\n{}\n\n---\n",
                    lines.join("\n")
                ));
            }
        }

        // News timeline, newest first (the composer already sorted)
        if let Some(news) = artifacts.news.as_ref().filter(|a| a.has_records()) {
            let lines: Vec<String> = news
                .records
                .iter()
                .take(10)
                .map(|r| {
                    let date = r.published_at.as_deref().unwrap_or("Unknown date");
                    let source = r
                        .source
                        .as_deref()
                        .map(|s| format!(" _({})_", s))
                        .unwrap_or_default();
                    format!("- **{}**: {}{}", date, r.title, source)
                })
                .collect();
            sections.push(format!("## Recent News\n\n{}\n\n---\n", lines.join("\n")));
        }

        // Social presence
        if let Some(data) = ArtifactSet::data(&artifacts.social) {
            let mut lines = Vec::new();
            if let Some(score) = data["presence_score"].as_f64() {
                lines.push(format!("- **Presence score:** {}%", score));
            }
            if let Some(profiles) = data["profiles"].as_object() {
                for (platform, profile) in profiles {
                    if let Some(url) = profile["url"].as_str() {
                        lines.push(format!("- **{}:** {}", platform, url));
                    }
                }
            }
            sections.push(format!(
                "## Social Presence\n\n{}\n\n---\n",
                lines.join("\n")
            ));
        }

        // Heuristic analysis
        if let Some(data) = ArtifactSet::data(&artifacts.analysis) {
            let mut body = String::new();
            if let Some(people) = data["key_people"].as_array().filter(|p| !p.is_empty()) {
                let names: Vec<&str> = people.iter().filter_map(|p| p.as_str()).collect();
                body.push_str(&format!("**Key people:** {}\n\n", names.join(", ")));
            }
            if let Some(companies) = data["mentioned_companies"]
                .as_array()
                .filter(|c| !c.is_empty())
            {
                let names: Vec<&str> = companies.iter().filter_map(|c| c.as_str()).collect();
                body.push_str(&format!("**Mentioned companies:** {}\n\n", names.join(", ")));
            }
            if let Some(swot) = data["swot"].as_object() {
                for category in ["strengths", "weaknesses", "opportunities", "threats"] {
                    let items: Vec<&str> = swot
                        .get(category)
                        .and_then(|v| v.as_array())
                        .map(|a| a.iter().filter_map(|i| i.as_str()).collect())
                        .unwrap_or_default();
                    let rendered = if items.is_empty() {
                        "_None identified_".to_string()
                    } else {
                        items
                            .iter()
                            .map(|i| format!("- {}", i))
                            .collect::<Vec<_>>()
                            .join("\n")
                    };
                    body.push_str(&format!(
                        "**{}{}:**\n{}\n\n",
                        category[..1].to_uppercase(),
                        &category[1..],
                        rendered
                    ));
                }
            }
            if !body.is_empty() {
                sections.push(format!("## Analysis\n\n{}---\n", body));
            }
        }

        // Sources
        if let Some(search) = artifacts.search.as_ref().filter(|a| a.has_records()) {
            let lines: Vec<String> = search
                .records
                .iter()
                .take(10)
                .map(|r| format!("- [{}]({})", r.title, r.url))
                .collect();
            sections.push(format!("## Sources\n\n{}\n", lines.join("\n")));
        }

        sections.join("\n")
    }

    fn render_html(&self, job: &ResearchJob, artifacts: &ArtifactSet) -> String {
        let markdown = self.render_markdown(job, artifacts);
        let body = markdown_to_html(&markdown);

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Research Dossier: {title}</title>
<style>
  :root {{ --accent: #1a73e8; --ink: #1f2430; --muted: #5f6b7a; }}
  body {{ font-family: 'Segoe UI', Helvetica, Arial, sans-serif; color: var(--ink);
         max-width: 860px; margin: 0 auto; padding: 2rem 1.5rem; line-height: 1.6; }}
  h1 {{ border-bottom: 3px solid var(--accent); padding-bottom: .5rem; }}
  h2 {{ color: var(--accent); margin-top: 2rem; }}
  hr {{ border: none; border-top: 1px solid #e3e7ee; margin: 1.5rem 0; }}
  ul {{ padding-left: 1.2rem; }}
  li {{ margin: .25rem 0; }}
  a {{ color: var(--accent); text-decoration: none; }}
  a:hover {{ text-decoration: underline; }}
  strong {{ color: var(--ink); }}
  em {{ color: var(--muted); }}
</style>
</head>
<body>
{body}
<footer><hr><em>Generated by dossiers on {date}</em></footer>
</body>
</html>
"#,
            title = html_escape::encode_text(&job.target),
            body = body,
            date = Utc::now().format("%Y-%m-%d"),
        )
    }
}

impl Default for ReportCompiler {
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Minimal Markdown-to-HTML rendering for the subset the compiler
/// emits: headings, bullets, bold/italic, links and rules.
fn markdown_to_html(markdown: &str) -> String {
    let bold = regex::Regex::new(r"\*\*([^*]+)\*\*").expect("invalid bold regex");
    let italic = regex::Regex::new(r"(^|\s)_([^_]+)_").expect("invalid italic regex");
    let link = regex::Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("invalid link regex");

    let mut html = String::new();
    let mut in_list = false;

    for line in markdown.lines() {
        let escaped = html_escape::encode_text(line).to_string();
        // Links first so URL underscores never read as emphasis
        let styled = link.replace_all(&escaped, r#"<a href="$2">$1</a>"#);
        let styled = bold.replace_all(&styled, "<strong>$1</strong>");
        let styled = italic
            .replace_all(&styled, "$1<em>$2</em>")
            .to_string();

        let is_bullet = styled.starts_with("- ");
        if is_bullet && !in_list {
            html.push_str("<ul>\n");
            in_list = true;
        } else if !is_bullet && in_list {
            html.push_str("</ul>\n");
            in_list = false;
        }

        if let Some(rest) = styled.strip_prefix("## ") {
            html.push_str(&format!("<h2>{}</h2>\n", rest));
        } else if let Some(rest) = styled.strip_prefix("# ") {
            html.push_str(&format!("<h1>{}</h1>\n", rest));
        } else if styled == "---" {
            html.push_str("<hr>\n");
        } else if let Some(rest) = styled.strip_prefix("- ") {
            html.push_str(&format!("<li>{}</li>\n", rest));
        } else if !styled.is_empty() {
            html.push_str(&format!("<p>{}</p>\n", styled));
        }
    }

    if in_list {
        html.push_str("</ul>\n");
    }

    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::job::{Depth, TargetKind};
    use crate::domain::models::record::Record;
    use uuid::Uuid;

    fn job() -> ResearchJob {
        ResearchJob::new(
            Uuid::new_v4(),
            "OpenAI".to_string(),
            TargetKind::Company,
            Depth::Standard,
            2,
        )
    }

    fn search_artifact() -> StageArtifact {
        StageArtifact::success(
            Stage::Search,
            "OpenAI",
            vec![Record::new(
                "OpenAI homepage".into(),
                "https://openai.com".into(),
                "AI research organization".into(),
                "duckduckgo",
            )],
        )
    }

    async fn workdir() -> (tempfile::TempDir, WorkDir) {
        let tmp = tempfile::tempdir().unwrap();
        let wd = WorkDir::create(tmp.path().to_str().unwrap(), "OpenAI", Uuid::new_v4())
            .await
            .unwrap();
        (tmp, wd)
    }

    #[tokio::test]
    async fn test_compile_minimal_report_from_search_alone() {
        let (_tmp, wd) = workdir().await;
        wd.write_stage(&search_artifact()).await.unwrap();

        let report = ReportCompiler::new().compile(&job(), &wd).await.unwrap();
        assert!(wd.exists(REPORT_MARKDOWN).await);
        assert!(wd.exists(REPORT_HTML).await);

        let markdown = tokio::fs::read_to_string(&report.markdown_path).await.unwrap();
        assert!(markdown.contains("# Research Dossier: OpenAI"));
        assert!(markdown.contains("OpenAI homepage"));
    }

    #[tokio::test]
    async fn test_compile_fails_without_any_data() {
        let (_tmp, wd) = workdir().await;
        // 只有失败产物，没有任何记录
        wd.write_stage(&StageArtifact::failure(
            Stage::Search,
            "OpenAI",
            "Timeout".into(),
        ))
        .await
        .unwrap();

        let err = ReportCompiler::new().compile(&job(), &wd).await.unwrap_err();
        assert!(matches!(err, CompileError::NoData));
    }

    #[tokio::test]
    async fn test_compile_includes_news_section() {
        let (_tmp, wd) = workdir().await;
        wd.write_stage(&search_artifact()).await.unwrap();
        wd.write_stage(&StageArtifact::success(
            Stage::News,
            "OpenAI",
            vec![Record::new(
                "Funding round closes".into(),
                "https://news.example/1".into(),
                "snippet".into(),
                "google_news_rss",
            )
            .with_published_at(Some("2026-01-12".into()))
            .with_source(Some("Reuters".into()))],
        ))
        .await
        .unwrap();

        let report = ReportCompiler::new().compile(&job(), &wd).await.unwrap();
        let markdown = tokio::fs::read_to_string(&report.markdown_path).await.unwrap();
        assert!(markdown.contains("## Recent News"));
        assert!(markdown.contains("**2026-01-12**: Funding round closes _(Reuters)_"));
    }

    #[test]
    fn test_markdown_to_html_escapes_and_structures() {
        let html = markdown_to_html("# Title <script>\n- item **bold**\n---");
        assert!(html.contains("<h1>Title &lt;script&gt;</h1>"));
        assert!(html.contains("<li>item <strong>bold</strong></li>"));
        assert!(html.contains("<hr>"));
    }
}
