// src/models/commission.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::common::db_utils::{decimal_col, opt_uuid_col, uuid_col};
use crate::models::policy::PolicyKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    APagar,
    Cancelado,
}

/// Comissão gerada exatamente uma vez por item elegível na confirmação.
/// Cancelamento vira o status para 'cancelado' (nunca apaga, por auditoria);
/// estorno recalcula o valor mantendo a taxa originalmente aplicada.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub sale_item_id: Uuid,
    pub user_id: Uuid,
    pub base_amount: Decimal,
    pub commission_kind: PolicyKind,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub reference_date: NaiveDate,
    pub status: CommissionStatus,
    /// Nulo quando a taxa de contingência foi aplicada (nenhuma política casou).
    pub commission_policy_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Commission {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            sale_id: uuid_col(row, "sale_id")?,
            sale_item_id: uuid_col(row, "sale_item_id")?,
            user_id: uuid_col(row, "user_id")?,
            base_amount: decimal_col(row, "base_amount")?,
            commission_kind: row.try_get("commission_kind")?,
            commission_rate: decimal_col(row, "commission_rate")?,
            commission_amount: decimal_col(row, "commission_amount")?,
            reference_date: row.try_get("reference_date")?,
            status: row.try_get("status")?,
            commission_policy_id: opt_uuid_col(row, "commission_policy_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
