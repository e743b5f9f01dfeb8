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

use axum::{
    extract::{Extension, Json, Path, Query},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;
use validator::Validate;

use crate::domain::models::job::{Depth, JobStatus, ResearchJob, TargetKind};
use crate::domain::services::research_service::ResearchService;
use crate::infrastructure::repositories::credits_repo_impl::CreditsRepositoryImpl;
use crate::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use crate::pipeline::orchestrator::ResearchPipeline;
use crate::pipeline::workdir::WorkDir;
use crate::presentation::errors::{error_body, status_for};

type Service = ResearchService<JobRepositoryImpl, CreditsRepositoryImpl>;
type Pipeline = ResearchPipeline<JobRepositoryImpl>;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateResearchRequest {
    /// 调研目标（公司名或人名）
    #[validate(length(min = 1, max = 500))]
    pub target: String,
    /// 目标类型：company | person
    pub target_kind: String,
    /// 调研深度：quick | standard | deep，默认standard
    #[serde(default)]
    pub depth: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub target: String,
    pub target_kind: String,
    pub depth: String,
    pub status: String,
    pub credits_charged: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

impl From<ResearchJob> for JobResponse {
    fn from(job: ResearchJob) -> Self {
        let report_url = (job.status == JobStatus::Completed)
            .then(|| format!("/v1/research/{}/report", job.id));
        Self {
            id: job.id,
            target: job.target,
            target_kind: job.target_kind.to_string(),
            depth: job.depth.to_string(),
            status: job.status.to_string(),
            credits_charged: job.credits_charged,
            error_message: job.error_message,
            report_url,
            created_at: job.created_at.to_rfc3339(),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// 创建调研任务
///
/// 同步校验额度与重复提交，成功后把任务作为独立后台任务启动
pub async fn create_research(
    Extension(service): Extension<Arc<Service>>,
    Extension(pipeline): Extension<Arc<Pipeline>>,
    Extension(account_id): Extension<Uuid>,
    Json(payload): Json<CreateResearchRequest>,
) -> Response {
    if let Err(e) = payload.validate() {
        return error_body(StatusCode::BAD_REQUEST, &e.to_string());
    }

    let Ok(target_kind) = TargetKind::from_str(&payload.target_kind) else {
        return error_body(
            StatusCode::BAD_REQUEST,
            "target_kind must be 'company' or 'person'",
        );
    };

    let depth = match payload.depth.as_deref() {
        None | Some("") => Depth::Standard,
        Some(raw) => match Depth::from_str(raw) {
            Ok(depth) => depth,
            Err(()) => {
                return error_body(
                    StatusCode::BAD_REQUEST,
                    "depth must be 'quick', 'standard' or 'deep'",
                )
            }
        },
    };

    match service
        .create_job(account_id, &payload.target, target_kind, depth)
        .await
    {
        Ok(job) => {
            pipeline.spawn(job.clone());
            (StatusCode::CREATED, Json(JobResponse::from(job))).into_response()
        }
        Err(e) => error_body(status_for(&e), &e.to_string()),
    }
}

/// 列出账户下的调研任务
pub async fn list_research(
    Extension(service): Extension<Arc<Service>>,
    Extension(account_id): Extension<Uuid>,
    Query(query): Query<ListQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => match JobStatus::from_str(raw) {
            Ok(status) => Some(status),
            Err(()) => return error_body(StatusCode::BAD_REQUEST, "invalid status filter"),
        },
    };

    let limit = query.limit.unwrap_or(20).min(100);
    let offset = query.offset.unwrap_or(0);

    match service.list_jobs(account_id, status, limit, offset).await {
        Ok((jobs, total)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "jobs": jobs.into_iter().map(JobResponse::from).collect::<Vec<_>>(),
                "total": total,
            })),
        )
            .into_response(),
        Err(e) => error_body(status_for(&e), &e.to_string()),
    }
}

/// 查询单个调研任务
pub async fn get_research(
    Extension(service): Extension<Arc<Service>>,
    Extension(account_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Response {
    match service.get_job(account_id, job_id).await {
        Ok(job) => (StatusCode::OK, Json(JobResponse::from(job))).into_response(),
        Err(e) => error_body(status_for(&e), &e.to_string()),
    }
}

/// 下载已完成任务的报告
pub async fn download_report(
    Extension(service): Extension<Arc<Service>>,
    Extension(account_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Response {
    let job = match service.get_job(account_id, job_id).await {
        Ok(job) => job,
        Err(e) => return error_body(status_for(&e), &e.to_string()),
    };

    if job.status != JobStatus::Completed {
        return error_body(
            StatusCode::BAD_REQUEST,
            &format!("Report not ready. Current status: {}", job.status),
        );
    }

    let Some(report_path) = job.report_path else {
        return error_body(StatusCode::NOT_FOUND, "Report file not found");
    };

    match tokio::fs::read_to_string(&report_path).await {
        Ok(body) => {
            let filename = format!(
                "Research_Dossier_{}.html",
                job.target.replace(|c: char| !c.is_alphanumeric(), "_")
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, "text/html; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}\"", filename),
                    ),
                ],
                body,
            )
                .into_response()
        }
        Err(e) => {
            warn!(job_id = %job_id, "Report file unreadable: {}", e);
            error_body(StatusCode::NOT_FOUND, "Report file not found")
        }
    }
}

/// 删除调研任务
///
/// 进行中的任务拒绝删除；工作目录随任务行一并清理
pub async fn delete_research(
    Extension(service): Extension<Arc<Service>>,
    Extension(account_id): Extension<Uuid>,
    Path(job_id): Path<Uuid>,
) -> Response {
    match service.delete_job(account_id, job_id).await {
        Ok(job) => {
            if let Some(output_dir) = job.output_dir.as_deref() {
                if let Err(e) = WorkDir::open(output_dir).remove().await {
                    warn!(job_id = %job_id, "Could not remove working directory: {}", e);
                }
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => error_body(status_for(&e), &e.to_string()),
    }
}
