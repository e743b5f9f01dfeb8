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

use axum::Extension;
use axum::{
    routing::{delete, get, post},
    Router,
};
use dossiers::config::settings::Settings;
use dossiers::domain::services::analysis_service::{AnalysisConfig, AnalysisService};
use dossiers::domain::services::research_service::ResearchService;
use dossiers::domain::sources::adapter::SourceAdapter;
use dossiers::infrastructure::database::connection;
use dossiers::infrastructure::notify::email::EmailNotifier;
use dossiers::infrastructure::notify::{NoopNotifier, Notifier};
use dossiers::infrastructure::repositories::credits_repo_impl::CreditsRepositoryImpl;
use dossiers::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use dossiers::infrastructure::sources::composer::FallbackComposer;
use dossiers::infrastructure::sources::encyclopedia::Wikipedia;
use dossiers::infrastructure::sources::filings::SecEdgar;
use dossiers::infrastructure::sources::financials::YahooFinance;
use dossiers::infrastructure::sources::news::{BingNews, ComposedNews, GoogleNewsRss, NewsApi};
use dossiers::infrastructure::sources::page::PageFetcher;
use dossiers::infrastructure::sources::retry::RetryPolicy;
use dossiers::infrastructure::sources::social::SocialPresence;
use dossiers::infrastructure::sources::web_search::{
    ComposedWebSearch, DdgLiteSearch, DuckDuckGoSearch,
};
use dossiers::infrastructure::sources::build_http_client;
use dossiers::pipeline::orchestrator::{PipelineConfig, ResearchPipeline, SourceSet};
use dossiers::presentation::handlers::{credits_handler, research_handler};
use dossiers::presentation::middleware::auth_middleware::{auth_middleware, AuthState};
use dossiers::presentation::routes;
use dossiers::report::compiler::ReportCompiler;
use dossiers::utils::telemetry;
use migration::{Migrator, MigratorTrait};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting dossiers...");

    // 2. Load configuration
    let settings = Arc::new(Settings::new()?);
    info!("Configuration loaded");

    // 3. Connect to database
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Database connection established");

    // Run database migrations
    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Build source adapters behind the composers
    let client = build_http_client(&settings.sources);
    let retry = RetryPolicy::from_settings(&settings.sources);
    let composer = Arc::new(FallbackComposer::new(
        retry.clone(),
        settings.sources.max_results,
    ));

    let search: Arc<dyn SourceAdapter> = Arc::new(ComposedWebSearch::new(
        composer.clone(),
        vec![
            Arc::new(DuckDuckGoSearch::new(client.clone())),
            Arc::new(DdgLiteSearch::new(client.clone())),
        ],
    ));

    let mut news_adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(BingNews::new(client.clone())),
        Arc::new(GoogleNewsRss::new(client.clone())),
    ];
    if let Some(key) = settings.sources.newsapi_key.clone() {
        news_adapters.push(Arc::new(NewsApi::new(client.clone(), key)));
        info!("NewsAPI provider enabled");
    }
    let news: Arc<dyn SourceAdapter> = Arc::new(ComposedNews::new(composer.clone(), news_adapters));

    let sources = SourceSet {
        search: search.clone(),
        news,
        financials: Arc::new(YahooFinance::new(client.clone())),
        filings: Arc::new(SecEdgar::new(
            client.clone(),
            settings.sources.sec_user_agent.clone(),
        )),
        social: Arc::new(SocialPresence::new(search)),
        encyclopedia: Arc::new(Wikipedia::new(client.clone())),
    };

    // 5. Initialize repositories and services
    let job_repo = Arc::new(JobRepositoryImpl::new(db.clone()));
    let credits_repo = Arc::new(CreditsRepositoryImpl::new(db.clone()));
    let research_service = Arc::new(ResearchService::new(
        job_repo.clone(),
        credits_repo.clone(),
        settings.credits.clone(),
    ));

    let notifier: Arc<dyn Notifier> = match EmailNotifier::from_settings(&settings.notify) {
        Some(notifier) => {
            info!("Email notifications enabled");
            Arc::new(notifier)
        }
        None => Arc::new(NoopNotifier),
    };

    let mut analysis_config = AnalysisConfig::default();
    analysis_config.signal_threshold = settings.pipeline.sentiment_threshold;

    let pipeline = Arc::new(ResearchPipeline::new(
        job_repo.clone(),
        sources,
        Arc::new(PageFetcher::new(client)),
        Arc::new(AnalysisService::new(analysis_config)),
        Arc::new(ReportCompiler::new()),
        notifier,
        retry,
        PipelineConfig {
            output_root: settings.pipeline.output_root.clone(),
            max_pages: settings.pipeline.max_pages,
            skip_domains: settings.pipeline.skip_domains.clone(),
            max_results: settings.sources.max_results,
            stage_timeout: settings.pipeline.stage_timeout,
        },
    ));

    // 6. Setup auth state
    let auth_state = AuthState { db: db.clone() };

    // 7. Start HTTP server
    let public_routes = Router::new()
        .route("/health", get(routes::health_check))
        .route("/v1/version", get(routes::version));

    let protected_routes = Router::new()
        .route("/v1/research", post(research_handler::create_research))
        .route("/v1/research", get(research_handler::list_research))
        .route("/v1/research/{id}", get(research_handler::get_research))
        .route(
            "/v1/research/{id}/report",
            get(research_handler::download_report),
        )
        .route(
            "/v1/research/{id}",
            delete(research_handler::delete_research),
        )
        .route("/v1/credits", get(credits_handler::get_credits))
        .route("/v1/credits/topup", post(credits_handler::top_up))
        .layer(axum::middleware::from_fn_with_state(
            auth_state.clone(),
            auth_middleware,
        ));

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(Extension(research_service))
        .layer(Extension(pipeline))
        .layer(Extension(credits_repo))
        .layer(Extension(job_repo))
        .layer(Extension(settings.clone()))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
