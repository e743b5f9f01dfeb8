// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

//! dossier-fetch: 手工调用单个数据源适配器的命令行入口。
//!
//! 统一约定：只要产出了合法的JSON结果文档就以0退出，哪怕文档
//! 语义上是`success:false`（如公司未上市）；非0退出只表示基础
//! 设施层面的失败（参数不可用、输出不可写）。

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use dossiers::config::settings::Settings;
use dossiers::domain::sources::adapter::{FetchResult, SourceAdapter};
use dossiers::infrastructure::sources::composer::FallbackComposer;
use dossiers::infrastructure::sources::encyclopedia::Wikipedia;
use dossiers::infrastructure::sources::filings::SecEdgar;
use dossiers::infrastructure::sources::financials::YahooFinance;
use dossiers::infrastructure::sources::news::{BingNews, GoogleNewsRss, NewsApi};
use dossiers::infrastructure::sources::page::PageFetcher;
use dossiers::infrastructure::sources::retry::RetryPolicy;
use dossiers::infrastructure::sources::social::SocialPresence;
use dossiers::infrastructure::sources::web_search::{
    ComposedWebSearch, DdgLiteSearch, DuckDuckGoSearch,
};
use dossiers::infrastructure::sources::build_http_client;

const USAGE: &str = "Usage: dossier-fetch <source> [options]

Sources:
  search       Web search (provider with HTML-scrape fallback)
  news         News from all keyless providers, unioned
  financials   Resolve a company to a ticker and fetch quote data
  filings      SEC EDGAR filings and annual financial facts
  social       Social-media presence probe
  wikipedia    Encyclopedia article, summary and infobox
  page         Fetch one web page as clean text

Options:
  -q, --query <text>        Query or target (also --target, --company)
      --ticker <symbol>     Direct ticker (financials only)
      --url <url>           Page URL (page only)
  -n, --max-results <n>     Maximum results where applicable (default 20)
  -r, --retries <n>         Retry attempts for search/news (default 3)
      --stdin               Read a JSON object with the same keys from stdin
  -o, --output <file>       Write the JSON result to a file (default stdout)
";

struct Args {
    source: String,
    query: Option<String>,
    ticker: Option<String>,
    url: Option<String>,
    max_results: usize,
    retries: u32,
    output: Option<String>,
}

fn parse_args() -> Result<Args, String> {
    let mut argv = std::env::args().skip(1);
    let source = argv.next().ok_or_else(|| "missing source".to_string())?;

    let mut flags: HashMap<String, String> = HashMap::new();
    let mut use_stdin = false;

    while let Some(flag) = argv.next() {
        match flag.as_str() {
            "--stdin" => use_stdin = true,
            "-q" | "--query" | "--target" | "--company" => {
                flags.insert("query".into(), argv.next().ok_or("missing value for query")?);
            }
            "--ticker" => {
                flags.insert("ticker".into(), argv.next().ok_or("missing value for ticker")?);
            }
            "--url" => {
                flags.insert("url".into(), argv.next().ok_or("missing value for url")?);
            }
            "-n" | "--max-results" => {
                flags.insert("max_results".into(), argv.next().ok_or("missing value for max-results")?);
            }
            "-r" | "--retries" => {
                flags.insert("retries".into(), argv.next().ok_or("missing value for retries")?);
            }
            "-o" | "--output" => {
                flags.insert("output".into(), argv.next().ok_or("missing value for output")?);
            }
            other => return Err(format!("unknown flag: {}", other)),
        }
    }

    // JSON-over-stdin supplies the same keys; explicit flags win
    if use_stdin {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .map_err(|e| format!("could not read stdin: {}", e))?;
        let input: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| format!("invalid JSON on stdin: {}", e))?;

        for key in ["query", "target", "company", "ticker", "url"] {
            if let Some(value) = input[key].as_str() {
                let slot = if key == "ticker" || key == "url" { key } else { "query" };
                flags.entry(slot.to_string()).or_insert_with(|| value.to_string());
            }
        }
        if let Some(n) = input["max_results"].as_u64() {
            flags.entry("max_results".into()).or_insert_with(|| n.to_string());
        }
        if let Some(n) = input["retries"].as_u64() {
            flags.entry("retries".into()).or_insert_with(|| n.to_string());
        }
    }

    let max_results = flags
        .get("max_results")
        .map(|v| v.parse::<usize>())
        .transpose()
        .map_err(|e| format!("invalid max-results: {}", e))?
        .unwrap_or(20);
    let retries = flags
        .get("retries")
        .map(|v| v.parse::<u32>())
        .transpose()
        .map_err(|e| format!("invalid retries: {}", e))?
        .unwrap_or(3);

    Ok(Args {
        source,
        query: flags.get("query").cloned(),
        ticker: flags.get("ticker").cloned(),
        url: flags.get("url").cloned(),
        max_results,
        retries,
        output: flags.get("output").cloned(),
    })
}

fn require<'a>(value: &'a Option<String>, what: &str) -> Result<&'a str, String> {
    value
        .as_deref()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| format!("missing {}", what))
}

/// 把适配器结果折叠为统一的JSON文档
fn to_document(source: &str, query: &str, result: FetchResult) -> serde_json::Value {
    match result {
        Ok(outcome) => {
            let records = outcome.into_records();
            serde_json::json!({
                "success": true,
                "source": source,
                "query": query,
                "num_records": records.len(),
                "records": records,
            })
        }
        Err(e) => serde_json::json!({
            "success": false,
            "source": source,
            "query": query,
            "error": e.to_string(),
        }),
    }
}

async fn fetch(args: &Args, settings: &Settings) -> Result<serde_json::Value, String> {
    let client = build_http_client(&settings.sources);
    let retry = RetryPolicy::from_settings(&settings.sources).with_max_attempts(args.retries);
    let composer = Arc::new(FallbackComposer::new(retry, args.max_results));

    let document = match args.source.as_str() {
        "search" => {
            let query = require(&args.query, "--query")?;
            let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
                Arc::new(DuckDuckGoSearch::new(client.clone())),
                Arc::new(DdgLiteSearch::new(client)),
            ];
            let result = composer
                .first_success(&adapters, query, args.max_results)
                .await;
            to_document("search", query, result)
        }
        "news" => {
            let query = require(&args.query, "--query")?;
            let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![
                Arc::new(BingNews::new(client.clone())),
                Arc::new(GoogleNewsRss::new(client.clone())),
            ];
            if let Some(key) = settings.sources.newsapi_key.clone() {
                adapters.push(Arc::new(NewsApi::new(client, key)));
            }
            let result = composer.union(&adapters, query, args.max_results).await;
            to_document("news", query, result)
        }
        "financials" => {
            let yahoo = YahooFinance::new(client);
            let (query, result) = match (&args.ticker, &args.query) {
                (Some(ticker), _) => (ticker.clone(), yahoo.fetch_by_ticker(ticker, None).await),
                (None, query) => {
                    let company = require(query, "--company or --ticker")?;
                    (company.to_string(), yahoo.fetch(company, args.max_results).await)
                }
            };
            to_document("financials", &query, result)
        }
        "filings" => {
            let query = require(&args.query, "--query")?;
            let sec = SecEdgar::new(client, settings.sources.sec_user_agent.clone());
            to_document("filings", query, sec.fetch(query, args.max_results).await)
        }
        "social" => {
            let target = require(&args.query, "--target")?;
            let search: Arc<dyn SourceAdapter> = Arc::new(ComposedWebSearch::new(
                composer.clone(),
                vec![
                    Arc::new(DuckDuckGoSearch::new(client.clone())),
                    Arc::new(DdgLiteSearch::new(client)),
                ],
            ));
            let social = SocialPresence::new(search);
            to_document("social", target, social.fetch(target, args.max_results).await)
        }
        "wikipedia" => {
            let query = require(&args.query, "--query")?;
            let wiki = Wikipedia::new(client);
            to_document("wikipedia", query, wiki.fetch(query, args.max_results).await)
        }
        "page" => {
            let url = require(&args.url, "--url")?;
            match PageFetcher::new(client).fetch_page(url).await {
                Ok(page) => serde_json::json!({
                    "success": true,
                    "source": "page",
                    "query": url,
                    "page": page,
                }),
                Err(e) => to_document("page", url, Err(e)),
            }
        }
        other => return Err(format!("unknown source: {}", other)),
    };

    Ok(document)
}

fn emit(document: &serde_json::Value, output: Option<&str>) -> Result<(), String> {
    let body = serde_json::to_string_pretty(document)
        .map_err(|e| format!("could not serialize result: {}", e))?;

    match output {
        Some(path) => {
            std::fs::write(path, body).map_err(|e| format!("could not write {}: {}", path, e))
        }
        None => {
            println!("{}", body);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(1);
        }
    };

    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: could not load configuration: {}", e);
            std::process::exit(1);
        }
    };

    // 空结果或上游失败都是正常的结果文档，不影响退出码
    let document = match fetch(&args, &settings).await {
        Ok(document) => document,
        Err(e) => {
            eprintln!("Error: {}\n\n{}", e, USAGE);
            std::process::exit(1);
        }
    };

    if let Err(e) = emit(&document, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if document["success"] == false {
        eprintln!(
            "Note: source reported a logical failure: {}",
            document["error"].as_str().unwrap_or("unknown")
        );
    }
}
