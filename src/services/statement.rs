// src/services/statement.rs
//
// Projeções de leitura do extrato de pacotes. Tudo é derivado de vendas +
// carteiras + ledger de consumos; nenhum saldo cacheado é tratado como fonte
// de verdade.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{PackageRepository, SaleRepository},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Purchase,
    Consumption,
}

/// Movimento do extrato: compra contribui +quantidade/+valor, consumo
/// contribui -quantidade/-valor. `balance_after` é o saldo acumulado de
/// créditos após o movimento.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementEntry {
    pub occurred_at: DateTime<Utc>,
    pub kind: StatementKind,
    pub service_id: Uuid,
    pub sale_id: Uuid,
    pub quantity: i64,
    pub value: Decimal,
    pub balance_after: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientPackageSummary {
    pub total_acquired: i64,
    pub total_consumed: i64,
    pub current_balance: i64,
    pub total_paid: Decimal,
}

#[derive(Clone)]
pub struct StatementService {
    sale_repo: SaleRepository,
    package_repo: PackageRepository,
}

impl StatementService {
    pub fn new(sale_repo: SaleRepository, package_repo: PackageRepository) -> Self {
        Self {
            sale_repo,
            package_repo,
        }
    }

    async fn movements(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
    ) -> Result<Vec<StatementEntry>, AppError> {
        let purchases = self
            .sale_repo
            .package_purchases_by_client(&mut *conn, client_id)
            .await?;
        let consumptions = self
            .package_repo
            .consumptions_by_client(&mut *conn, client_id)
            .await?;

        let mut entries: Vec<StatementEntry> = Vec::with_capacity(purchases.len() + consumptions.len());
        for p in purchases {
            entries.push(StatementEntry {
                occurred_at: p.occurred_at,
                kind: StatementKind::Purchase,
                service_id: p.service_id,
                sale_id: p.sale_id,
                quantity: p.quantity,
                value: p.total,
                balance_after: 0,
            });
        }
        for c in consumptions {
            entries.push(StatementEntry {
                occurred_at: c.consumed_at,
                kind: StatementKind::Consumption,
                service_id: c.service_id,
                sale_id: c.sale_id,
                quantity: -c.quantity,
                value: -c.total_value,
                balance_after: 0,
            });
        }

        // Ordem cronológica; em empate de instante, compra entra antes do
        // consumo para o saldo acumulado nunca mergulhar artificialmente.
        entries.sort_by(|a, b| {
            a.occurred_at
                .cmp(&b.occurred_at)
                .then_with(|| (a.kind == StatementKind::Consumption).cmp(&(b.kind == StatementKind::Consumption)))
        });

        let mut balance = 0i64;
        for entry in &mut entries {
            balance += entry.quantity;
            entry.balance_after = balance;
        }
        Ok(entries)
    }

    /// Extrato cronológico com saldo acumulado, do movimento mais recente para
    /// o mais antigo (ordem de exibição).
    pub async fn client_statement(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
    ) -> Result<Vec<StatementEntry>, AppError> {
        let mut entries = self.movements(conn, client_id).await?;
        entries.reverse();
        Ok(entries)
    }

    /// Resumo por cliente, derivado dos mesmos movimentos do extrato.
    pub async fn client_summary(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
    ) -> Result<ClientPackageSummary, AppError> {
        let entries = self.movements(conn, client_id).await?;

        let mut summary = ClientPackageSummary {
            total_acquired: 0,
            total_consumed: 0,
            current_balance: 0,
            total_paid: Decimal::ZERO,
        };
        for entry in &entries {
            match entry.kind {
                StatementKind::Purchase => {
                    summary.total_acquired += entry.quantity;
                    summary.total_paid += entry.value;
                }
                StatementKind::Consumption => {
                    summary.total_consumed += -entry.quantity;
                }
            }
        }
        summary.current_balance = summary.total_acquired - summary.total_consumed;
        Ok(summary)
    }
}
