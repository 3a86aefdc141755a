// src/models/policy.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

use crate::common::db_utils::{decimal_col, opt_uuid_col, uuid_col};
use crate::models::sale::SaleType;
use crate::services::calendar::DayKind;

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    Percentage,
    FixedPerUnit,
}

/// Nível de especificidade da política, do mais específico ao mais genérico:
/// user_product > user > product > general.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PolicyScope {
    General,
    Product,
    User,
    UserProduct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PolicyAppliesTo {
    All,
    Weekdays,
    WeekendsHolidays,
}

impl PolicyAppliesTo {
    pub fn matches(self, day: DayKind) -> bool {
        match self {
            PolicyAppliesTo::All => true,
            PolicyAppliesTo::Weekdays => day == DayKind::Weekday,
            PolicyAppliesTo::WeekendsHolidays => day == DayKind::WeekendHoliday,
        }
    }
}

/// Filtro de tipo de venda da política: 'all', '01' (comum) ou '03' (consumo
/// de pacote). Compra de pacote ('02') nunca gera comissão, então não aparece.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
pub enum PolicySaleType {
    #[sqlx(rename = "all")]
    #[serde(rename = "all")]
    All,
    #[sqlx(rename = "01")]
    #[serde(rename = "01")]
    Common,
    #[sqlx(rename = "03")]
    #[serde(rename = "03")]
    PackageConsumption,
}

impl PolicySaleType {
    pub fn matches(self, sale_type: SaleType) -> bool {
        match self {
            PolicySaleType::All => true,
            PolicySaleType::Common => sale_type == SaleType::Common,
            PolicySaleType::PackageConsumption => sale_type == SaleType::PackageConsumption,
        }
    }

    /// Uma política com tipo exato vence uma com 'all' dentro do mesmo nível.
    pub fn is_exact(self) -> bool {
        self != PolicySaleType::All
    }
}

// --- Structs ---

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionPolicy {
    pub id: Uuid,
    pub name: String,
    pub kind: PolicyKind,
    pub value: Decimal,
    pub scope: PolicyScope,
    pub user_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub applies_to: PolicyAppliesTo,
    pub sale_type: PolicySaleType,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CommissionPolicy {
    /// Janela de validade: `valid_from <= date <= valid_until` (aberta à direita
    /// quando `valid_until` é nulo).
    pub fn valid_on(&self, date: NaiveDate) -> bool {
        date >= self.valid_from && self.valid_until.is_none_or(|until| date <= until)
    }
}

impl FromRow<'_, SqliteRow> for CommissionPolicy {
    fn from_row(row: &SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: uuid_col(row, "id")?,
            name: row.try_get("name")?,
            kind: row.try_get("kind")?,
            value: decimal_col(row, "value")?,
            scope: row.try_get("scope")?,
            user_id: opt_uuid_col(row, "user_id")?,
            product_id: opt_uuid_col(row, "product_id")?,
            applies_to: row.try_get("applies_to")?,
            sale_type: row.try_get("sale_type")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Dados de entrada para criar uma política (o id e os timestamps são
/// gerados na gravação).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommissionPolicy {
    pub name: String,
    pub kind: PolicyKind,
    pub value: Decimal,
    pub scope: PolicyScope,
    pub user_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub applies_to: PolicyAppliesTo,
    pub sale_type: PolicySaleType,
    pub valid_from: NaiveDate,
    pub valid_until: Option<NaiveDate>,
}
