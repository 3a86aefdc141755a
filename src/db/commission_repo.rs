// src/db/commission_repo.rs

use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::{common::error::AppError, models::commission::Commission};

#[derive(Debug, Clone, Default)]
pub struct CommissionRepository;

impl CommissionRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert<'e, E>(&self, executor: E, commission: &Commission) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO commissions (
                id, sale_id, sale_item_id, user_id,
                base_amount, commission_kind, commission_rate, commission_amount,
                reference_date, status, commission_policy_id,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(commission.id.to_string())
        .bind(commission.sale_id.to_string())
        .bind(commission.sale_item_id.to_string())
        .bind(commission.user_id.to_string())
        .bind(commission.base_amount.to_string())
        .bind(commission.commission_kind)
        .bind(commission.commission_rate.to_string())
        .bind(commission.commission_amount.to_string())
        .bind(commission.reference_date)
        .bind(commission.status)
        .bind(commission.commission_policy_id.map(|p| p.to_string()))
        .bind(commission.created_at)
        .bind(commission.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn list_by_sale<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<Vec<Commission>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let commissions = sqlx::query_as::<_, Commission>(
            "SELECT * FROM commissions WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id.to_string())
        .fetch_all(executor)
        .await?;

        Ok(commissions)
    }

    /// Cancela (nunca apaga) as comissões em aberto da venda. Retorna quantas
    /// linhas mudaram.
    pub async fn cancel_open_by_sale<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE commissions
            SET status = 'cancelado', updated_at = ?2
            WHERE sale_id = ?1 AND status = 'a_pagar'
            "#,
        )
        .bind(sale_id.to_string())
        .bind(Utc::now())
        .execute(executor)
        .await?;

        Ok(result.rows_affected())
    }

    /// Recalcula base e valor mantendo tipo/taxa (usado pelo estorno parcial).
    pub async fn update_amount<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        base_amount: Decimal,
        commission_amount: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            UPDATE commissions
            SET base_amount = ?2, commission_amount = ?3, updated_at = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(base_amount.to_string())
        .bind(commission_amount.to_string())
        .bind(Utc::now())
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Remove todas as comissões da venda (reagendamento e exclusão física).
    pub async fn delete_by_sale<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM commissions WHERE sale_id = ?1")
            .bind(sale_id.to_string())
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
