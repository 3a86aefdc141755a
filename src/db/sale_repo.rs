// src/db/sale_repo.rs

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, Row, Sqlite};
use uuid::Uuid;

use crate::{
    common::db_utils::{decimal_col, uuid_col},
    common::error::AppError,
    models::sale::{Sale, SaleItem, SaleRefund, SaleStatus},
};

/// Compra de pacote confirmada, vista do extrato do cliente.
#[derive(Debug, Clone)]
pub struct ClientPurchaseRow {
    pub service_id: Uuid,
    pub sale_id: Uuid,
    pub quantity: i64,
    pub total: Decimal,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct SaleRepository;

impl SaleRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn insert_sale<'e, E>(&self, executor: E, sale: &Sale) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO sales (
                id, client_id, attendant_id, sale_date, status,
                subtotal, total_discount, total, refund_total,
                created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(sale.id.to_string())
        .bind(sale.client_id.to_string())
        .bind(sale.attendant_id.to_string())
        .bind(sale.sale_date)
        .bind(sale.status)
        .bind(sale.subtotal.to_string())
        .bind(sale.total_discount.to_string())
        .bind(sale.total.to_string())
        .bind(sale.refund_total.to_string())
        .bind(sale.created_at)
        .bind(sale.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn insert_item<'e, E>(&self, executor: E, item: &SaleItem) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO sale_items (
                id, sale_id, product_id, quantity, sale_type, subtotal, total, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.sale_id.to_string())
        .bind(item.product_id.map(|p| p.to_string()))
        .bind(item.quantity)
        .bind(item.sale_type)
        .bind(item.subtotal.to_string())
        .bind(item.total.to_string())
        .bind(item.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Sale>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sale = sqlx::query_as::<_, Sale>("SELECT * FROM sales WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(executor)
            .await?;

        Ok(sale)
    }

    /// Itens na ordem do documento.
    pub async fn list_items<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<Vec<SaleItem>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let items = sqlx::query_as::<_, SaleItem>(
            "SELECT * FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id.to_string())
        .fetch_all(executor)
        .await?;

        Ok(items)
    }

    /// Transição guardada pelo status de origem: zero linhas afetadas significa
    /// que a venda mudou de estado por baixo (ou não existe) — o chamador decide.
    pub async fn transition_status<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        from: SaleStatus,
        to: SaleStatus,
    ) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE sales SET status = ?3, updated_at = ?4 WHERE id = ?1 AND status = ?2",
        )
        .bind(id.to_string())
        .bind(from)
        .bind(to)
        .bind(Utc::now())
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Grava o novo total líquido e o acumulado de estornos.
    pub async fn apply_refund_totals<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        new_total: Decimal,
        new_refund_total: Decimal,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query(
            "UPDATE sales SET total = ?2, refund_total = ?3, updated_at = ?4 WHERE id = ?1",
        )
        .bind(id.to_string())
        .bind(new_total.to_string())
        .bind(new_refund_total.to_string())
        .bind(Utc::now())
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::SaleNotFound);
        }
        Ok(())
    }

    pub async fn set_sale_date<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        new_date: NaiveDate,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("UPDATE sales SET sale_date = ?2, updated_at = ?3 WHERE id = ?1")
            .bind(id.to_string())
            .bind(new_date)
            .bind(Utc::now())
            .execute(executor)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::SaleNotFound);
        }
        Ok(())
    }

    pub async fn insert_refund<'e, E>(&self, executor: E, refund: &SaleRefund) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO sale_refunds (id, sale_id, amount, reason, created_by, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(refund.id.to_string())
        .bind(refund.sale_id.to_string())
        .bind(refund.amount.to_string())
        .bind(refund.reason.as_deref())
        .bind(refund.created_by.map(|u| u.to_string()))
        .bind(refund.created_at)
        .execute(executor)
        .await?;

        Ok(())
    }

    pub async fn list_refunds<'e, E>(
        &self,
        executor: E,
        sale_id: Uuid,
    ) -> Result<Vec<SaleRefund>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let refunds = sqlx::query_as::<_, SaleRefund>(
            "SELECT * FROM sale_refunds WHERE sale_id = ?1 ORDER BY created_at, id",
        )
        .bind(sale_id.to_string())
        .fetch_all(executor)
        .await?;

        Ok(refunds)
    }

    // --- Exclusão física (limpeza administrativa) ---

    pub async fn delete_refunds<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM sale_refunds WHERE sale_id = ?1")
            .bind(sale_id.to_string())
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_items<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM sale_items WHERE sale_id = ?1")
            .bind(sale_id.to_string())
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn delete_sale<'e, E>(&self, executor: E, sale_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let result = sqlx::query("DELETE FROM sales WHERE id = ?1")
            .bind(sale_id.to_string())
            .execute(executor)
            .await?;
        Ok(result.rows_affected())
    }

    /// Itens '02' de vendas confirmadas do cliente: cada um é uma entrada de
    /// crédito no extrato (+quantidade/+valor).
    pub async fn package_purchases_by_client<'e, E>(
        &self,
        executor: E,
        client_id: Uuid,
    ) -> Result<Vec<ClientPurchaseRow>, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query(
            r#"
            SELECT si.product_id AS service_id, si.sale_id, si.quantity, si.total,
                   s.created_at AS occurred_at
            FROM sale_items si
            JOIN sales s ON s.id = si.sale_id
            WHERE s.client_id = ?1 AND s.status = 'confirmada' AND si.sale_type = '02'
            ORDER BY s.created_at, si.id
            "#,
        )
        .bind(client_id.to_string())
        .fetch_all(executor)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(ClientPurchaseRow {
                service_id: uuid_col(row, "service_id")?,
                sale_id: uuid_col(row, "sale_id")?,
                quantity: row.try_get("quantity")?,
                total: decimal_col(row, "total")?,
                occurred_at: row.try_get("occurred_at")?,
            });
        }
        Ok(out)
    }
}
