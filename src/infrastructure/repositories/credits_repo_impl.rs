// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{
    models::credits::{CreditsTransaction, CreditsTransactionType},
    repositories::credits_repository::{CreditsRepository, CreditsRepositoryError},
};

use crate::infrastructure::database::entities::{credits, credits_transactions};

pub struct CreditsRepositoryImpl {
    db: Arc<DatabaseConnection>,
}

impl CreditsRepositoryImpl {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    async fn record_transaction(
        &self,
        account_id: Uuid,
        amount: i64,
        transaction_type: CreditsTransactionType,
        description: String,
        reference_id: Option<Uuid>,
    ) -> Result<(), CreditsRepositoryError> {
        let transaction = credits_transactions::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            amount: Set(amount),
            transaction_type: Set(transaction_type.to_string()),
            description: Set(description),
            reference_id: Set(reference_id),
            created_at: Set(Utc::now().fixed_offset()),
        };

        transaction
            .insert(self.db.as_ref())
            .await
            .map_err(|e| CreditsRepositoryError::DatabaseError(e.to_string()))?;

        Ok(())
    }
}

#[async_trait]
impl CreditsRepository for CreditsRepositoryImpl {
    async fn get_balance(&self, account_id: Uuid) -> Result<i64, CreditsRepositoryError> {
        let credits = credits::Entity::find()
            .filter(credits::Column::AccountId.eq(account_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| CreditsRepositoryError::DatabaseError(e.to_string()))?;

        match credits {
            Some(credits) => Ok(credits.balance),
            None => {
                // Initialize with 0 credits if not exists
                self.initialize_account_credits(account_id, 0).await
            }
        }
    }

    async fn deduct_credits(
        &self,
        account_id: Uuid,
        amount: i64,
        description: String,
        reference_id: Option<Uuid>,
    ) -> Result<(), CreditsRepositoryError> {
        // Make sure the balance row exists before the guarded update
        let current_balance = self.get_balance(account_id).await?;

        // Single guarded UPDATE: concurrent submissions cannot lose
        // updates or drive the balance negative.
        let result = credits::Entity::update_many()
            .col_expr(
                credits::Column::Balance,
                Expr::col(credits::Column::Balance).sub(amount),
            )
            .col_expr(
                credits::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(credits::Column::AccountId.eq(account_id))
            .filter(credits::Column::Balance.gte(amount))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| CreditsRepositoryError::DatabaseError(e.to_string()))?;

        if result.rows_affected == 0 {
            return Err(CreditsRepositoryError::InsufficientCredits {
                available: current_balance,
                required: amount,
            });
        }

        self.record_transaction(
            account_id,
            -amount,
            CreditsTransactionType::Research,
            description,
            reference_id,
        )
        .await
    }

    async fn add_credits(
        &self,
        account_id: Uuid,
        amount: i64,
        transaction_type: CreditsTransactionType,
        description: String,
        reference_id: Option<Uuid>,
    ) -> Result<i64, CreditsRepositoryError> {
        // Make sure the balance row exists before the guarded update
        self.get_balance(account_id).await?;

        credits::Entity::update_many()
            .col_expr(
                credits::Column::Balance,
                Expr::col(credits::Column::Balance).add(amount),
            )
            .col_expr(
                credits::Column::UpdatedAt,
                Expr::value(Utc::now().fixed_offset()),
            )
            .filter(credits::Column::AccountId.eq(account_id))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| CreditsRepositoryError::DatabaseError(e.to_string()))?;

        self.record_transaction(
            account_id,
            amount,
            transaction_type,
            description,
            reference_id,
        )
        .await?;

        self.get_balance(account_id).await
    }

    async fn get_transaction_history(
        &self,
        account_id: Uuid,
        limit: Option<u32>,
    ) -> Result<Vec<CreditsTransaction>, CreditsRepositoryError> {
        let mut query = credits_transactions::Entity::find()
            .filter(credits_transactions::Column::AccountId.eq(account_id))
            .order_by_desc(credits_transactions::Column::CreatedAt);

        if let Some(limit) = limit {
            query = query.limit(limit as u64);
        }

        let transactions = query
            .all(self.db.as_ref())
            .await
            .map_err(|e| CreditsRepositoryError::DatabaseError(e.to_string()))?;

        Ok(transactions
            .into_iter()
            .map(|t| CreditsTransaction {
                id: t.id,
                account_id: t.account_id,
                amount: t.amount,
                transaction_type: CreditsTransactionType::from_str(&t.transaction_type)
                    .unwrap_or(CreditsTransactionType::ManualAdjustment),
                description: t.description,
                reference_id: t.reference_id,
                created_at: t.created_at.into(),
            })
            .collect())
    }

    async fn initialize_account_credits(
        &self,
        account_id: Uuid,
        initial_balance: i64,
    ) -> Result<i64, CreditsRepositoryError> {
        // Check if credits already exist
        let existing = credits::Entity::find()
            .filter(credits::Column::AccountId.eq(account_id))
            .one(self.db.as_ref())
            .await
            .map_err(|e| CreditsRepositoryError::DatabaseError(e.to_string()))?;

        if let Some(credits) = existing {
            return Ok(credits.balance);
        }

        // Create new credits record
        let credits = credits::ActiveModel {
            id: Set(Uuid::new_v4()),
            account_id: Set(account_id),
            balance: Set(initial_balance),
            created_at: Set(Utc::now().fixed_offset()),
            updated_at: Set(Utc::now().fixed_offset()),
        };

        credits
            .insert(self.db.as_ref())
            .await
            .map_err(|e| CreditsRepositoryError::DatabaseError(e.to_string()))?;

        Ok(initial_balance)
    }
}
