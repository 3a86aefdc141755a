// src/models/package.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::common::db_utils::{decimal_col, opt_uuid_col, uuid_col};

/// Carteira de créditos pré-pagos de um serviço para um cliente.
///
/// Invariante central: `available_quantity == initial_quantity - consumed_quantity`
/// sempre — o esquema tem um CHECK para isso e nenhuma operação grava os três
/// campos de forma independente. No máximo uma carteira ativa por
/// (cliente, serviço); emissões posteriores são aditivas na carteira ativa.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPackage {
    pub id: Uuid,
    pub client_id: Uuid,
    pub service_id: Uuid,
    pub initial_quantity: i64,
    pub consumed_quantity: i64,
    pub available_quantity: i64,
    pub unit_price: Decimal,
    pub total_paid: Decimal,
    pub is_active: bool,
    /// Venda que criou a carteira, quando criada por uma venda.
    pub sale_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for ClientPackage {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            client_id: uuid_col(row, "client_id")?,
            service_id: uuid_col(row, "service_id")?,
            initial_quantity: row.try_get("initial_quantity")?,
            consumed_quantity: row.try_get("consumed_quantity")?,
            available_quantity: row.try_get("available_quantity")?,
            unit_price: decimal_col(row, "unit_price")?,
            total_paid: decimal_col(row, "total_paid")?,
            is_active: row.try_get("is_active")?,
            sale_id: opt_uuid_col(row, "sale_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Linha do ledger append-only de consumos; a soma de `quantity` por pacote
/// deve bater com o `consumed_quantity` da carteira.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageConsumption {
    pub id: Uuid,
    pub package_id: Uuid,
    pub sale_id: Uuid,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub total_value: Decimal,
    pub consumed_at: DateTime<Utc>,
}

impl FromRow<'_, SqliteRow> for PackageConsumption {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            package_id: uuid_col(row, "package_id")?,
            sale_id: uuid_col(row, "sale_id")?,
            quantity: row.try_get("quantity")?,
            unit_price: decimal_col(row, "unit_price")?,
            total_value: decimal_col(row, "total_value")?,
            consumed_at: row.try_get("consumed_at")?,
        })
    }
}
