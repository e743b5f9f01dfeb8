// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::domain::models::job::{Depth, DomainError, JobStatus, ResearchJob};
use crate::domain::models::record::Record;
use crate::domain::repositories::job_repository::{JobRepository, RepositoryError};
use crate::domain::services::analysis_service::{AnalysisContext, AnalysisService};
use crate::domain::sources::adapter::SourceAdapter;
use crate::infrastructure::notify::Notifier;
use crate::infrastructure::sources::page::PageFetcher;
use crate::infrastructure::sources::retry::{run_with_retry, RetryPolicy};
use crate::pipeline::stage::{Stage, StageArtifact};
use crate::pipeline::workdir::{WorkDir, WorkdirError};
use crate::report::compiler::{CompiledReport, ReportCompiler};

/// 流水线错误类型
///
/// 只有编排器自身的持久化故障会以错误形式冒出；
/// 阶段级失败全部折叠进产物文件和任务终态。
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Invalid job state: {0}")]
    Domain(#[from] DomainError),

    #[error("Workdir error: {0}")]
    Workdir(#[from] WorkdirError),
}

/// 流水线配置
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// 工作目录根路径
    pub output_root: String,
    /// 页面抽取阶段的最大页面数
    pub max_pages: usize,
    /// 页面抽取阶段跳过的域名
    pub skip_domains: Vec<String>,
    /// 每阶段最大结果数（deep档位加倍）
    pub max_results: usize,
    /// 单个阶段的总超时上限（秒）
    pub stage_timeout: u64,
}

/// 各数据源适配器集合
///
/// 搜索与新闻已在外层组合了回退/并集策略，其余为单一适配器。
pub struct SourceSet {
    pub search: Arc<dyn SourceAdapter>,
    pub news: Arc<dyn SourceAdapter>,
    pub financials: Arc<dyn SourceAdapter>,
    pub filings: Arc<dyn SourceAdapter>,
    pub social: Arc<dyn SourceAdapter>,
    pub encyclopedia: Arc<dyn SourceAdapter>,
}

/// 调研流水线编排器
///
/// 每个任务作为一个独立后台任务运行到完成或失败，
/// 不支持中途取消。阶段执行顺序：搜索 → 页面抽取（由搜索
/// 播种）→ 五个互不依赖的阶段并发 → 分析 → 报告编译。
/// 任何单阶段失败都不会中止任务；只有报告无法产出才算失败。
pub struct ResearchPipeline<J> {
    jobs: Arc<J>,
    sources: SourceSet,
    pages: Arc<PageFetcher>,
    analysis: Arc<AnalysisService>,
    compiler: Arc<ReportCompiler>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
    config: PipelineConfig,
}

impl<J> ResearchPipeline<J>
where
    J: JobRepository + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        jobs: Arc<J>,
        sources: SourceSet,
        pages: Arc<PageFetcher>,
        analysis: Arc<AnalysisService>,
        compiler: Arc<ReportCompiler>,
        notifier: Arc<dyn Notifier>,
        retry: RetryPolicy,
        config: PipelineConfig,
    ) -> Self {
        Self {
            jobs,
            sources,
            pages,
            analysis,
            compiler,
            notifier,
            retry,
            config,
        }
    }

    /// 把任务作为独立后台任务启动
    pub fn spawn(self: &Arc<Self>, job: ResearchJob) {
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.run(job).await;
        });
    }

    /// 运行任务到终态
    pub async fn run(&self, job: ResearchJob) {
        let job_id = job.id;
        match self.execute(job).await {
            Ok(status) => info!(%job_id, %status, "Research job finished"),
            Err(e) => error!(%job_id, "Research job aborted: {}", e),
        }
    }

    async fn execute(&self, job: ResearchJob) -> Result<JobStatus, PipelineError> {
        let workdir = match WorkDir::create(&self.config.output_root, &job.target, job.id).await {
            Ok(workdir) => workdir,
            Err(e) => {
                let failed = job
                    .start(String::new())?
                    .fail(format!("Could not create working directory: {}", e))?;
                self.jobs.fail_and_refund(&failed).await?;
                return Ok(JobStatus::Failed);
            }
        };

        let job = job.start(workdir.path().display().to_string())?;
        self.jobs.update(&job).await?;
        info!(job_id = %job.id, target = %job.target, "Research job processing");

        match self.run_stages(&job, &workdir).await {
            Ok(report) => {
                let completed = job.complete(report.html_path.display().to_string())?;
                self.jobs.update(&completed).await?;

                // 尽力而为的通知，失败不影响任务状态
                let recipient = self
                    .jobs
                    .account_email(completed.account_id)
                    .await
                    .unwrap_or_default();
                self.notifier
                    .notify_job_ready(&completed, recipient.as_deref())
                    .await;

                Ok(JobStatus::Completed)
            }
            Err(message) => {
                let failed = job.fail(message)?;
                self.jobs.fail_and_refund(&failed).await?;
                Ok(JobStatus::Failed)
            }
        }
    }

    /// 执行全部启用的阶段并编译报告
    ///
    /// 返回Err仅表示"没有产出报告"，携带面向调用方的原因。
    async fn run_stages(
        &self,
        job: &ResearchJob,
        workdir: &WorkDir,
    ) -> Result<CompiledReport, String> {
        let stages = Stage::for_depth(job.depth, job.target_kind);
        let limit = if job.depth == Depth::Deep {
            self.config.max_results * 2
        } else {
            self.config.max_results
        };
        let target = job.target.as_str();

        // 搜索先行，它的结果播种页面抽取阶段
        let search = self
            .fetch_stage(Stage::Search, &self.sources.search, target, limit, false)
            .await;
        workdir
            .write_stage(&search)
            .await
            .map_err(|e| format!("Could not persist search artifact: {}", e))?;

        if stages.contains(&Stage::Pages) {
            let ceiling = Duration::from_secs(self.config.stage_timeout);
            let pages = match tokio::time::timeout(ceiling, self.pages_stage(target, &search)).await
            {
                Ok(artifact) => artifact,
                Err(_) => StageArtifact::failure(
                    Stage::Pages,
                    target,
                    format!("Stage timed out after {}s", self.config.stage_timeout),
                ),
            };
            workdir
                .write_stage(&pages)
                .await
                .map_err(|e| format!("Could not persist pages artifact: {}", e))?;
        }

        // 互不依赖的阶段并发执行；产物仍按固定编号落盘
        let (news, financials, filings, social, encyclopedia) = tokio::join!(
            self.optional_stage(&stages, Stage::News, &self.sources.news, target, limit, false),
            self.optional_stage(
                &stages,
                Stage::Financials,
                &self.sources.financials,
                target,
                limit,
                true
            ),
            self.optional_stage(
                &stages,
                Stage::Filings,
                &self.sources.filings,
                target,
                limit,
                true
            ),
            self.optional_stage(&stages, Stage::Social, &self.sources.social, target, limit, false),
            self.optional_stage(
                &stages,
                Stage::Encyclopedia,
                &self.sources.encyclopedia,
                target,
                limit,
                true
            ),
        );

        for artifact in [news, financials, filings, social, encyclopedia]
            .into_iter()
            .flatten()
        {
            workdir
                .write_stage(&artifact)
                .await
                .map_err(|e| format!("Could not persist stage artifact: {}", e))?;
        }

        let analysis = self.analysis_stage(target, workdir).await;
        workdir
            .write_stage(&analysis)
            .await
            .map_err(|e| format!("Could not persist analysis artifact: {}", e))?;

        self.compiler
            .compile(job, workdir)
            .await
            .map_err(|e| format!("Report compilation failed: {}", e))
    }

    async fn optional_stage(
        &self,
        enabled: &[Stage],
        stage: Stage,
        adapter: &Arc<dyn SourceAdapter>,
        query: &str,
        limit: usize,
        with_retry: bool,
    ) -> Option<StageArtifact> {
        if !enabled.contains(&stage) {
            return None;
        }
        Some(
            self.fetch_stage(stage, adapter, query, limit, with_retry)
                .await,
        )
    }

    /// 执行一个适配器阶段并折叠其结果
    ///
    /// 组合适配器（搜索、新闻）内部已带重试，单一适配器在
    /// 这里包一层重试执行器。整个阶段受总超时上限约束；
    /// 错误和超时都落进产物，不向上传播。
    async fn fetch_stage(
        &self,
        stage: Stage,
        adapter: &Arc<dyn SourceAdapter>,
        query: &str,
        limit: usize,
        with_retry: bool,
    ) -> StageArtifact {
        let ceiling = Duration::from_secs(self.config.stage_timeout);
        let fetch = async {
            if with_retry {
                run_with_retry(&self.retry, adapter.name(), || adapter.fetch(query, limit)).await
            } else {
                adapter.fetch(query, limit).await
            }
        };

        match tokio::time::timeout(ceiling, fetch).await {
            Ok(Ok(outcome)) => StageArtifact::success(stage, query, outcome.into_records()),
            Ok(Err(e)) => {
                warn!(stage = %stage, error = %e, "Stage degraded to empty");
                StageArtifact::failure(stage, query, e.to_string())
            }
            Err(_) => {
                warn!(stage = %stage, "Stage hit the overall timeout ceiling");
                StageArtifact::failure(
                    stage,
                    query,
                    format!("Stage timed out after {}s", self.config.stage_timeout),
                )
            }
        }
    }

    /// 页面抽取阶段：抓取头部搜索结果的正文
    async fn pages_stage(&self, target: &str, search: &StageArtifact) -> StageArtifact {
        let mut records = Vec::new();
        let mut attempted = 0usize;

        for hit in &search.records {
            if attempted >= self.config.max_pages {
                break;
            }
            if hit.url.is_empty()
                || self
                    .config
                    .skip_domains
                    .iter()
                    .any(|domain| hit.url.contains(domain.as_str()))
            {
                continue;
            }

            attempted += 1;
            match self.pages.fetch_page(&hit.url).await {
                Ok(page) => {
                    let title = if page.title.is_empty() {
                        hit.title.clone()
                    } else {
                        page.title.clone()
                    };
                    records.push(
                        Record::new(title, page.url.clone(), page.description.clone(), "page")
                            .with_data(json!({
                                "domain": page.domain,
                                "content": page.content,
                            })),
                    );
                }
                Err(e) => {
                    warn!(url = %hit.url, error = %e, "Page fetch failed, skipping");
                }
            }
        }

        StageArtifact::success(Stage::Pages, target, records)
    }

    /// 分析阶段：对已落盘的文本做启发式抽取
    async fn analysis_stage(&self, target: &str, workdir: &WorkDir) -> StageArtifact {
        let mut text = String::new();
        for stage in [Stage::Search, Stage::News, Stage::Pages] {
            if let Some(artifact) = workdir.read_stage(stage).await {
                for record in &artifact.records {
                    text.push_str(&record.title);
                    text.push(' ');
                    text.push_str(&record.snippet);
                    text.push(' ');
                    if stage == Stage::Pages {
                        if let Some(content) =
                            record.data.as_ref().and_then(|d| d["content"].as_str())
                        {
                            text.push_str(content);
                            text.push(' ');
                        }
                    }
                }
            }
        }

        let social_profiles = workdir
            .read_stage(Stage::Social)
            .await
            .as_ref()
            .and_then(|a| a.records.first())
            .and_then(|r| r.data.as_ref())
            .and_then(|d| d["num_profiles_found"].as_u64())
            .unwrap_or(0) as usize;

        let context = AnalysisContext {
            revenue_growth: None,
            social_profiles,
        };
        let analysis = self.analysis.analyze(&text, &context);

        let record = Record::new(
            format!("Heuristic analysis: {}", target),
            String::new(),
            format!("Sentiment {} over {} characters of source text", analysis.sentiment.label, text.len()),
            "analysis",
        )
        .with_data(serde_json::to_value(&analysis).unwrap_or(serde_json::Value::Null));

        StageArtifact::success(Stage::Analysis, target, vec![record])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::job::TargetKind;
    use crate::domain::models::record::FetchOutcome;
    use crate::domain::services::analysis_service::AnalysisConfig;
    use crate::domain::sources::adapter::{FetchResult, SourceError};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;
    use uuid::Uuid;

    struct MockJobRepository {
        jobs: Mutex<Vec<ResearchJob>>,
        refunded: Mutex<Vec<Uuid>>,
    }

    impl MockJobRepository {
        fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                refunded: Mutex::new(Vec::new()),
            }
        }

        fn status_of(&self, id: Uuid) -> JobStatus {
            self.jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.id == id)
                .map(|j| j.status)
                .unwrap()
        }
    }

    #[async_trait]
    impl JobRepository for MockJobRepository {
        async fn create(&self, job: &ResearchJob) -> Result<ResearchJob, RepositoryError> {
            self.jobs.lock().unwrap().push(job.clone());
            Ok(job.clone())
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<ResearchJob>, RepositoryError> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .find(|j| j.id == id)
                .cloned())
        }

        async fn list_for_account(
            &self,
            _account_id: Uuid,
            _status: Option<JobStatus>,
            _limit: u64,
            _offset: u64,
        ) -> Result<(Vec<ResearchJob>, u64), RepositoryError> {
            Ok((Vec::new(), 0))
        }

        async fn find_recent_duplicate(
            &self,
            _account_id: Uuid,
            _target: &str,
            _target_kind: TargetKind,
            _since: DateTime<Utc>,
        ) -> Result<Option<ResearchJob>, RepositoryError> {
            Ok(None)
        }

        async fn update(&self, job: &ResearchJob) -> Result<(), RepositoryError> {
            let mut jobs = self.jobs.lock().unwrap();
            let existing = jobs
                .iter_mut()
                .find(|j| j.id == job.id)
                .ok_or(RepositoryError::NotFound)?;
            *existing = job.clone();
            Ok(())
        }

        async fn fail_and_refund(&self, job: &ResearchJob) -> Result<(), RepositoryError> {
            self.refunded.lock().unwrap().push(job.id);
            self.update(job).await
        }

        async fn delete(&self, id: Uuid) -> Result<(), RepositoryError> {
            self.jobs.lock().unwrap().retain(|j| j.id != id);
            Ok(())
        }

        async fn account_email(
            &self,
            _account_id: Uuid,
        ) -> Result<Option<String>, RepositoryError> {
            Ok(Some("owner@example.com".to_string()))
        }
    }

    struct StubAdapter {
        name: &'static str,
        outcome: FetchResult,
    }

    impl StubAdapter {
        fn hits(name: &'static str, titles: &[&str]) -> Arc<Self> {
            let records = titles
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    Record::new(
                        t.to_string(),
                        format!("https://example.com/{}/{}", name, i),
                        format!("snippet about {}", t),
                        name,
                    )
                })
                .collect();
            Arc::new(Self {
                name,
                outcome: Ok(FetchOutcome::Hits(records)),
            })
        }

        fn empty(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Ok(FetchOutcome::Empty),
            })
        }

        fn broken(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                outcome: Err(SourceError::NotFound("definitively absent".into())),
            })
        }
    }

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        async fn fetch(&self, _query: &str, _limit: usize) -> FetchResult {
            self.outcome.clone()
        }

        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct RecordingNotifier {
        notified: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify_job_ready(&self, job: &ResearchJob, recipient: Option<&str>) {
            assert_eq!(recipient, Some("owner@example.com"));
            self.notified.lock().unwrap().push(job.id);
        }
    }

    fn pipeline(
        jobs: Arc<MockJobRepository>,
        notifier: Arc<RecordingNotifier>,
        sources: SourceSet,
        output_root: &str,
    ) -> ResearchPipeline<MockJobRepository> {
        ResearchPipeline::new(
            jobs,
            sources,
            Arc::new(PageFetcher::new(reqwest::Client::new())),
            Arc::new(AnalysisService::new(AnalysisConfig::default())),
            Arc::new(ReportCompiler::new()),
            notifier,
            RetryPolicy {
                max_attempts: 1,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(1),
                jitter_factor: 0.0,
            },
            PipelineConfig {
                output_root: output_root.to_string(),
                max_pages: 0,
                skip_domains: Vec::new(),
                max_results: 20,
                stage_timeout: 30,
            },
        )
    }

    fn sources_with_search_only() -> SourceSet {
        SourceSet {
            search: StubAdapter::hits("web_search", &["Acme Corp homepage"]),
            news: StubAdapter::empty("news"),
            financials: StubAdapter::broken("financials"),
            filings: StubAdapter::broken("filings"),
            social: StubAdapter::empty("social"),
            encyclopedia: StubAdapter::broken("encyclopedia"),
        }
    }

    async fn new_job(jobs: &MockJobRepository) -> ResearchJob {
        let job = ResearchJob::new(
            Uuid::new_v4(),
            "Acme".to_string(),
            TargetKind::Company,
            Depth::Deep,
            4,
        );
        jobs.create(&job).await.unwrap()
    }

    #[tokio::test]
    async fn test_search_only_job_still_completes() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = Arc::new(MockJobRepository::new());
        let notifier = Arc::new(RecordingNotifier {
            notified: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline(
            jobs.clone(),
            notifier.clone(),
            sources_with_search_only(),
            tmp.path().to_str().unwrap(),
        );

        let job = new_job(&jobs).await;
        let job_id = job.id;
        pipeline.run(job).await;

        // 只有搜索有数据，报告仍应编译成功
        assert_eq!(jobs.status_of(job_id), JobStatus::Completed);
        assert!(jobs.refunded.lock().unwrap().is_empty());
        assert_eq!(notifier.notified.lock().unwrap().as_slice(), &[job_id]);

        let stored = jobs.find_by_id(job_id).await.unwrap().unwrap();
        let report_path = stored.report_path.unwrap();
        assert!(tokio::fs::try_exists(&report_path).await.unwrap());

        // 降级的阶段以失败产物落盘
        let workdir = WorkDir::open(stored.output_dir.as_deref().unwrap());
        let financials = workdir.read_stage(Stage::Financials).await.unwrap();
        assert!(!financials.success);
        assert!(financials.error.is_some());
    }

    #[tokio::test]
    async fn test_all_stages_empty_fails_and_refunds() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = Arc::new(MockJobRepository::new());
        let notifier = Arc::new(RecordingNotifier {
            notified: Mutex::new(Vec::new()),
        });
        let sources = SourceSet {
            search: StubAdapter::empty("web_search"),
            news: StubAdapter::empty("news"),
            financials: StubAdapter::broken("financials"),
            filings: StubAdapter::broken("filings"),
            social: StubAdapter::empty("social"),
            encyclopedia: StubAdapter::broken("encyclopedia"),
        };
        let pipeline = pipeline(
            jobs.clone(),
            notifier.clone(),
            sources,
            tmp.path().to_str().unwrap(),
        );

        let job = new_job(&jobs).await;
        let job_id = job.id;
        pipeline.run(job).await;

        assert_eq!(jobs.status_of(job_id), JobStatus::Failed);
        // 失败当且仅当退款
        assert_eq!(jobs.refunded.lock().unwrap().as_slice(), &[job_id]);
        assert!(notifier.notified.lock().unwrap().is_empty());

        let stored = jobs.find_by_id(job_id).await.unwrap().unwrap();
        assert!(stored.error_message.is_some());
        assert!(stored.report_path.is_none());
    }

    #[tokio::test]
    async fn test_artifacts_written_for_enabled_stages() {
        let tmp = tempfile::tempdir().unwrap();
        let jobs = Arc::new(MockJobRepository::new());
        let notifier = Arc::new(RecordingNotifier {
            notified: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline(
            jobs.clone(),
            notifier.clone(),
            sources_with_search_only(),
            tmp.path().to_str().unwrap(),
        );

        let job = new_job(&jobs).await;
        let job_id = job.id;
        pipeline.run(job).await;

        let stored = jobs.find_by_id(job_id).await.unwrap().unwrap();
        let workdir = WorkDir::open(stored.output_dir.as_deref().unwrap());

        for stage in [
            Stage::Search,
            Stage::News,
            Stage::Financials,
            Stage::Filings,
            Stage::Social,
            Stage::Encyclopedia,
            Stage::Analysis,
        ] {
            assert!(
                workdir.read_stage(stage).await.is_some(),
                "missing artifact for stage {}",
                stage
            );
        }
    }
}
