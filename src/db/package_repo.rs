// src/db/package_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

use crate::{
    common::db_utils::decimal_col,
    common::error::AppError,
    models::package::{ClientPackage, PackageConsumption},
};

/// Consumo anotado com o serviço da carteira (para o extrato por cliente).
#[derive(Debug, Clone)]
pub struct ClientConsumptionRow {
    pub service_id: Uuid,
    pub sale_id: Uuid,
    pub quantity: i64,
    pub total_value: Decimal,
    pub consumed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct PackageRepository;

impl PackageRepository {
    pub fn new() -> Self {
        Self
    }

    // =========================================================================
    //  CARTEIRAS
    // =========================================================================

    pub async fn insert<'e, E>(&self, executor: E, package: &ClientPackage) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO client_packages (
                id, client_id, service_id,
                initial_quantity, consumed_quantity, available_quantity,
                unit_price, total_paid, is_active, sale_id,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(package.id.to_string())
        .bind(package.client_id.to_string())
        .bind(package.service_id.to_string())
        .bind(package.initial_quantity)
        .bind(package.consumed_quantity)
        .bind(package.available_quantity)
        .bind(package.unit_price.to_string())
        .bind(package.total_paid.to_string())
        .bind(package.is_active)
        .bind(package.sale_id.map(|s| s.to_string()))
        .bind(package.created_at)
        .bind(package.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        id: Uuid,
    ) -> Result<Option<ClientPackage>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let package =
            sqlx::query_as::<_, ClientPackage>("SELECT * FROM client_packages WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(executor)
                .await?;

        Ok(package)
    }

    /// A carteira ativa do par (cliente, serviço) — única, pelo índice parcial.
    pub async fn find_active<'e, E>(
        &self,
        executor: E,
        client_id: Uuid,
        service_id: Uuid,
    ) -> Result<Option<ClientPackage>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let package = sqlx::query_as::<_, ClientPackage>(
            r#"
            SELECT * FROM client_packages
            WHERE client_id = ?1 AND service_id = ?2 AND is_active = 1
            "#,
        )
        .bind(client_id.to_string())
        .bind(service_id.to_string())
        .fetch_optional(executor)
        .await?;

        Ok(package)
    }

    pub async fn list_by_client<'e, E>(
        &self,
        executor: E,
        client_id: Uuid,
    ) -> Result<Vec<ClientPackage>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let packages = sqlx::query_as::<_, ClientPackage>(
            "SELECT * FROM client_packages WHERE client_id = ?1 ORDER BY created_at, id",
        )
        .bind(client_id.to_string())
        .fetch_all(executor)
        .await?;

        Ok(packages)
    }

    /// Emissão aditiva na carteira existente. As quantidades mudam de forma
    /// relativa; os valores monetários (recalculados na aplicação) de forma
    /// absoluta, porque TEXT decimal não soma em SQL.
    pub async fn apply_issue<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        quantity: i64,
        new_total_paid: Decimal,
        new_unit_price: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE client_packages
            SET initial_quantity   = initial_quantity + ?2,
                available_quantity = available_quantity + ?2,
                total_paid         = ?3,
                unit_price         = ?4,
                updated_at         = ?5
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(quantity)
        .bind(new_total_paid.to_string())
        .bind(new_unit_price.to_string())
        .bind(Utc::now())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PackageNotFound);
        }
        Ok(())
    }

    /// Baixa guardada: o `WHERE available_quantity >= ?` é o que impede duas
    /// baixas concorrentes de passarem ambas pela checagem de saldo (TOCTOU).
    /// Zero linhas afetadas = saldo insuficiente (decisão do chamador).
    pub async fn try_consume<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        quantity: i64,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE client_packages
            SET consumed_quantity  = consumed_quantity + ?2,
                available_quantity = available_quantity - ?2,
                updated_at         = ?3
            WHERE id = ?1 AND available_quantity >= ?2
            "#,
        )
        .bind(id.to_string())
        .bind(quantity)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Devolve créditos consumidos (cancelamento de venda de consumo).
    pub async fn apply_consumption_reversal<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        quantity: i64,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE client_packages
            SET consumed_quantity  = consumed_quantity - ?2,
                available_quantity = available_quantity + ?2,
                updated_at         = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(quantity)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PackageNotFound);
        }
        Ok(())
    }

    /// Retira da carteira os créditos emitidos por uma venda cancelada.
    /// `initial` e `available` caem juntos, então o CHECK do invariante segue
    /// valendo mesmo quando `available` fica negativo (sinal de que a compra
    /// cancelada precisa ser paga de novo, não escondido).
    pub async fn apply_issue_reversal<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        quantity: i64,
        new_total_paid: Decimal,
        new_unit_price: Decimal,
        deactivate: bool,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE client_packages
            SET initial_quantity   = initial_quantity - ?2,
                available_quantity = available_quantity - ?2,
                total_paid         = ?3,
                unit_price         = ?4,
                is_active          = CASE WHEN ?5 THEN 0 ELSE is_active END,
                updated_at         = ?6
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(quantity)
        .bind(new_total_paid.to_string())
        .bind(new_unit_price.to_string())
        .bind(deactivate)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PackageNotFound);
        }
        Ok(())
    }

    /// Ajuste administrativo: desloca `initial`/`available` juntos, podendo
    /// deixar o saldo negativo (dívida registrada).
    pub async fn apply_adjustment<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        delta: i64,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            r#"
            UPDATE client_packages
            SET initial_quantity   = initial_quantity + ?2,
                available_quantity = available_quantity + ?2,
                updated_at         = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .bind(delta)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::PackageNotFound);
        }
        Ok(())
    }

    // =========================================================================
    //  LEDGER DE CONSUMOS
    // =========================================================================

    pub async fn insert_consumption<'e, E>(
        &self,
        executor: E,
        consumption: &PackageConsumption,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO package_consumptions (
                id, package_id, sale_id, quantity, unit_price, total_value, consumed_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(consumption.id.to_string())
        .bind(consumption.package_id.to_string())
        .bind(consumption.sale_id.to_string())
        .bind(consumption.quantity)
        .bind(consumption.unit_price.to_string())
        .bind(consumption.total_value.to_string())
        .bind(consumption.consumed_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn consumptions_by_sale<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<Vec<PackageConsumption>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let consumptions = sqlx::query_as::<_, PackageConsumption>(
            "SELECT * FROM package_consumptions WHERE sale_id = ?1 ORDER BY consumed_at, id",
        )
        .bind(sale_id.to_string())
        .fetch_all(executor)
        .await?;

        Ok(consumptions)
    }

    pub async fn consumptions_by_package<'e, E>(
        &self,
        executor: E,
        package_id: Uuid,
    ) -> Result<Vec<PackageConsumption>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let consumptions = sqlx::query_as::<_, PackageConsumption>(
            "SELECT * FROM package_consumptions WHERE package_id = ?1 ORDER BY consumed_at, id",
        )
        .bind(package_id.to_string())
        .fetch_all(executor)
        .await?;

        Ok(consumptions)
    }

    pub async fn delete_consumptions_by_sale<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM package_consumptions WHERE sale_id = ?1")
            .bind(sale_id.to_string())
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    /// Consumos feitos por OUTRAS vendas sobre pacotes criados por esta venda.
    /// Se houver algum, a exclusão física da venda é bloqueada.
    pub async fn count_foreign_consumptions<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM package_consumptions pc
            JOIN client_packages cp ON cp.id = pc.package_id
            WHERE cp.sale_id = ?1 AND pc.sale_id <> ?1
            "#,
        )
        .bind(sale_id.to_string())
        .fetch_one(executor)
        .await?;

        Ok(count)
    }

    /// Consumos de todas as carteiras do cliente, anotados com o serviço
    /// (alimenta o extrato cronológico).
    pub async fn consumptions_by_client<'e, E>(
        &self,
        executor: E,
        client_id: Uuid,
    ) -> Result<Vec<ClientConsumptionRow>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(
            r#"
            SELECT cp.service_id, pc.sale_id, pc.quantity, pc.total_value, pc.consumed_at
            FROM package_consumptions pc
            JOIN client_packages cp ON cp.id = pc.package_id
            WHERE cp.client_id = ?1
            ORDER BY pc.consumed_at, pc.id
            "#,
        )
        .bind(client_id.to_string())
        .fetch_all(executor)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(ClientConsumptionRow {
                service_id: crate::common::db_utils::uuid_col(row, "service_id")?,
                sale_id: crate::common::db_utils::uuid_col(row, "sale_id")?,
                quantity: row.try_get("quantity")?,
                total_value: decimal_col(row, "total_value")?,
                consumed_at: row.try_get("consumed_at")?,
            });
        }
        Ok(out)
    }

    /// Total consumido registrado no ledger para um pacote (auditoria).
    pub async fn ledger_consumed_total<'e, E>(
        &self,
        executor: E,
        package_id: Uuid,
    ) -> Result<i64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let total: Option<i64> = sqlx::query_scalar(
            "SELECT SUM(quantity) FROM package_consumptions WHERE package_id = ?1",
        )
        .bind(package_id.to_string())
        .fetch_one(executor)
        .await?;

        Ok(total.unwrap_or(0))
    }
}
