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
    extract::{Extension, Json},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::domain::models::credits::CreditsTransactionType;
use crate::domain::repositories::credits_repository::CreditsRepository;
use crate::infrastructure::repositories::credits_repo_impl::CreditsRepositoryImpl;
use crate::presentation::errors::error_body;

#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    /// 充入的额度数
    #[validate(range(min = 1, max = 100_000))]
    pub amount: i64,
}

/// 查询额度余额与最近流水
pub async fn get_credits(
    Extension(credits): Extension<Arc<CreditsRepositoryImpl>>,
    Extension(account_id): Extension<Uuid>,
) -> Response {
    let balance = match credits.get_balance(account_id).await {
        Ok(balance) => balance,
        Err(e) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    let transactions = match credits.get_transaction_history(account_id, Some(20)).await {
        Ok(transactions) => transactions,
        Err(e) => return error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "balance": balance,
            "transactions": transactions,
        })),
    )
        .into_response()
}

/// 充入额度
///
/// 支付对账的入口；余额变更走与扣费相同的原子更新路径
pub async fn top_up(
    Extension(credits): Extension<Arc<CreditsRepositoryImpl>>,
    Extension(account_id): Extension<Uuid>,
    Json(payload): Json<TopUpRequest>,
) -> Response {
    if let Err(e) = payload.validate() {
        return error_body(StatusCode::BAD_REQUEST, &e.to_string());
    }

    match credits
        .add_credits(
            account_id,
            payload.amount,
            CreditsTransactionType::TopUp,
            format!("Top-up of {} credits", payload.amount),
            None,
        )
        .await
    {
        Ok(balance) => (
            StatusCode::OK,
            Json(serde_json::json!({ "balance": balance })),
        )
            .into_response(),
        Err(e) => error_body(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
