// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::domain::services::research_service::ResearchServiceError;

/// 应用错误类型
///
/// 封装所有可能的应用层错误，提供统一的错误处理接口。
/// 调用方看到的是任务状态和可读的错误描述，从不暴露堆栈。
#[derive(Debug)]
pub struct AppError(anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let error_message = self.0.to_string();

        let status = match self.0.downcast_ref::<ResearchServiceError>() {
            Some(e) => status_for(e),
            None => StatusCode::INTERNAL_SERVER_ERROR,
        };

        error_body(status, &error_message)
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

/// 服务错误到HTTP状态码的映射
///
/// 调用方输入错误在创建时同步拒绝，并给出可操作的信号：
/// 额度不足(402)、重复提交(409)、校验失败(400)。
pub fn status_for(err: &ResearchServiceError) -> StatusCode {
    match err {
        ResearchServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ResearchServiceError::InsufficientCredits { .. } => StatusCode::PAYMENT_REQUIRED,
        ResearchServiceError::DuplicateSubmission => StatusCode::CONFLICT,
        ResearchServiceError::NotFound => StatusCode::NOT_FOUND,
        ResearchServiceError::JobStillRunning => StatusCode::CONFLICT,
        ResearchServiceError::Repository(_) | ResearchServiceError::Credits(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// 统一的错误响应体
pub fn error_body(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
