// src/db/policy_repo.rs

use chrono::{NaiveDate, Utc};
use sqlx::{Executor, Sqlite};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::policy::{CommissionPolicy, NewCommissionPolicy},
};

// Repositório de políticas de comissão. Cada método executa uma única
// instrução, parametrizada; a composição transacional fica nos services.
#[derive(Debug, Clone, Default)]
pub struct PolicyRepository;

impl PolicyRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert<'e, E>(
        &self,
        executor: E,
        new: &NewCommissionPolicy,
    ) -> Result<CommissionPolicy, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let now = Utc::now();
        let policy = CommissionPolicy {
            id: Uuid::new_v4(),
            name: new.name.clone(),
            kind: new.kind,
            value: new.value,
            scope: new.scope,
            user_id: new.user_id,
            product_id: new.product_id,
            applies_to: new.applies_to,
            sale_type: new.sale_type,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO commission_policies (
                id, name, kind, value, scope, user_id, product_id,
                applies_to, sale_type, valid_from, valid_until, is_active,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
        )
        .bind(policy.id.to_string())
        .bind(&policy.name)
        .bind(policy.kind)
        .bind(policy.value.to_string())
        .bind(policy.scope)
        .bind(policy.user_id.map(|u| u.to_string()))
        .bind(policy.product_id.map(|p| p.to_string()))
        .bind(policy.applies_to)
        .bind(policy.sale_type)
        .bind(policy.valid_from)
        .bind(policy.valid_until)
        .bind(policy.is_active)
        .bind(policy.created_at)
        .bind(policy.updated_at)
        .execute(executor)
        .await?;

        Ok(policy)
    }

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        id: Uuid,
    ) -> Result<Option<CommissionPolicy>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let policy = sqlx::query_as::<_, CommissionPolicy>(
            "SELECT * FROM commission_policies WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(executor)
        .await?;

        Ok(policy)
    }

    /// Candidatas para a resolução: ativas e com janela de validade cobrindo a
    /// data. O recorte por escopo, tipo de venda e tipo de dia acontece em
    /// memória, no resolvedor (puro e testável).
    pub async fn candidates_on<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        product_id: Option<Uuid>,
        date: NaiveDate,
    ) -> Result<Vec<CommissionPolicy>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let policies = sqlx::query_as::<_, CommissionPolicy>(
            r#"
            SELECT * FROM commission_policies
            WHERE is_active = 1
              AND valid_from <= ?1
              AND (valid_until IS NULL OR valid_until >= ?1)
              AND (
                    scope = 'general'
                 OR (scope = 'user' AND user_id = ?2)
                 OR (scope = 'product' AND product_id = ?3)
                 OR (scope = 'user_product' AND user_id = ?2 AND product_id = ?3)
              )
            "#,
        )
        .bind(date)
        .bind(user_id.to_string())
        .bind(product_id.map(|p| p.to_string()))
        .fetch_all(executor)
        .await?;

        Ok(policies)
    }

    /// Fecha a janela de validade (a política continua valendo até `last_day`).
    pub async fn close<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        last_day: NaiveDate,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE commission_policies SET valid_until = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(last_day)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PolicyNotFound);
        }
        Ok(())
    }

    pub async fn set_active<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        is_active: bool,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE commission_policies SET is_active = ?2, updated_at = ?3 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(is_active)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PolicyNotFound);
        }
        Ok(())
    }

    /// Uma política referenciada por qualquer comissão é imutável (só pode ser
    /// fechada/substituída).
    pub async fn is_referenced<'e, E>(&self, executor: E, id: Uuid) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM commissions WHERE commission_policy_id = ?1",
        )
        .bind(id.to_string())
        .fetch_one(executor)
        .await?;

        Ok(count > 0)
    }

    pub async fn delete<'e, E>(&self, executor: E, id: Uuid) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM commission_policies WHERE id = ?1")
            .bind(id.to_string())
            .execute(executor)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PolicyNotFound);
        }
        Ok(())
    }
}
