// src/models/sale.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::common::db_utils::{decimal_col, opt_uuid_col, uuid_col};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SaleStatus {
    Aberta,
    Confirmada,
    Cancelada,
}

impl SaleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SaleStatus::Aberta => "aberta",
            SaleStatus::Confirmada => "confirmada",
            SaleStatus::Cancelada => "cancelada",
        }
    }
}

/// Tipo do item: decide qual efeito a confirmação dispara.
/// '01' venda comum (comissão sobre o total líquido),
/// '02' compra de pacote (emissão de créditos, nunca comissão),
/// '03' consumo de pacote (baixa de créditos + comissão sobre o subtotal bruto).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum SaleType {
    #[sqlx(rename = "01")]
    #[serde(rename = "01")]
    Common,
    #[sqlx(rename = "02")]
    #[serde(rename = "02")]
    PackagePurchase,
    #[sqlx(rename = "03")]
    #[serde(rename = "03")]
    PackageConsumption,
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sale {
    pub id: Uuid,
    pub client_id: Uuid,
    pub attendant_id: Uuid,
    pub sale_date: NaiveDate,
    pub status: SaleStatus,
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total: Decimal,
    pub refund_total: Decimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for Sale {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            client_id: uuid_col(row, "client_id")?,
            attendant_id: uuid_col(row, "attendant_id")?,
            sale_date: row.try_get("sale_date")?,
            status: row.try_get("status")?,
            subtotal: decimal_col(row, "subtotal")?,
            total_discount: decimal_col(row, "total_discount")?,
            total: decimal_col(row, "total")?,
            refund_total: decimal_col(row, "refund_total")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleItem {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub product_id: Option<Uuid>,
    pub quantity: i64,
    pub sale_type: SaleType,
    /// Subtotal bruto do item, antes do desconto de linha.
    pub subtotal: Decimal,
    /// Total líquido do item, após o desconto de linha.
    pub total: Decimal,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for SaleItem {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            sale_id: uuid_col(row, "sale_id")?,
            product_id: opt_uuid_col(row, "product_id")?,
            quantity: row.try_get("quantity")?,
            sale_type: row.try_get("sale_type")?,
            subtotal: decimal_col(row, "subtotal")?,
            total: decimal_col(row, "total")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Estorno parcial, append-only: reduz o total líquido efetivo da venda sem
/// reescrever o histórico.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRefund {
    pub id: Uuid,
    pub sale_id: Uuid,
    pub amount: Decimal,
    pub reason: Option<String>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for SaleRefund {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            sale_id: uuid_col(row, "sale_id")?,
            amount: decimal_col(row, "amount")?,
            reason: row.try_get("reason")?,
            created_by: opt_uuid_col(row, "created_by")?,
            created_at: row.try_get("created_at")?,
        })
    }
}
