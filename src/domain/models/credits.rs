// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credits {
    pub id: Uuid,
    pub account_id: Uuid,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64, // Positive for credits added, negative for credits used
    pub transaction_type: CreditsTransactionType,
    pub description: String,
    pub reference_id: Option<Uuid>, // Reference to the research job, etc.
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreditsTransactionType {
    Research,
    Refund,
    TopUp,
    ManualAdjustment,
}

impl std::fmt::Display for CreditsTransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CreditsTransactionType::Research => write!(f, "research"),
            CreditsTransactionType::Refund => write!(f, "refund"),
            CreditsTransactionType::TopUp => write!(f, "top_up"),
            CreditsTransactionType::ManualAdjustment => write!(f, "manual_adjustment"),
        }
    }
}

impl std::str::FromStr for CreditsTransactionType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "research" => Ok(CreditsTransactionType::Research),
            "refund" => Ok(CreditsTransactionType::Refund),
            "top_up" => Ok(CreditsTransactionType::TopUp),
            "manual_adjustment" => Ok(CreditsTransactionType::ManualAdjustment),
            _ => Err(()),
        }
    }
}
