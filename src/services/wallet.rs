// src/services/wallet.rs
//
// Operações da carteira de créditos (emitir, consumir, reverter). Todas rodam
// dentro da transação do chamador (recebem a conexão dela) e nunca gravam os
// campos de quantidade de forma independente — o CHECK do esquema garante
// `available = initial - consumed` em qualquer caminho.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::PackageRepository,
    models::package::{ClientPackage, PackageConsumption},
    models::sale::{Sale, SaleItem, SaleType},
    services::commission::round_money,
};

/// Divergência entre a carteira e o ledger de consumos (auditoria de dados
/// importados; as operações deste crate não conseguem produzir uma).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletDrift {
    pub package_id: Uuid,
    pub recorded_consumed: i64,
    pub ledger_consumed: i64,
    pub recorded_available: i64,
    pub expected_available: i64,
}

#[derive(Clone)]
pub struct WalletService {
    package_repo: PackageRepository,
}

impl WalletService {
    pub fn new(package_repo: PackageRepository) -> Self {
        Self { package_repo }
    }

    /// Emite créditos para (cliente, serviço). Se já existe carteira ativa, a
    /// emissão é aditiva e o preço unitário é recalculado como
    /// `total_paid / initial_quantity`; senão, cria a carteira.
    pub async fn issue(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
        service_id: Uuid,
        quantity: i64,
        unit_price: Decimal,
        total_paid: Decimal,
        source_sale_id: Option<Uuid>,
    ) -> Result<ClientPackage, AppError> {
        if quantity <= 0 {
            return Err(AppError::InvalidSaleItem(
                "emissão exige quantidade positiva".into(),
            ));
        }

        if let Some(existing) = self
            .package_repo
            .find_active(&mut *conn, client_id, service_id)
            .await?
        {
            let new_initial = existing.initial_quantity + quantity;
            let new_total_paid = existing.total_paid + total_paid;
            // Após um ajuste negativo, a emissão pode devolver initial a <= 0;
            // sem créditos não há preço unitário.
            let new_unit_price = if new_initial > 0 {
                round_money(new_total_paid / Decimal::from(new_initial))
            } else {
                Decimal::ZERO
            };

            self.package_repo
                .apply_issue(&mut *conn, existing.id, quantity, new_total_paid, new_unit_price)
                .await?;

            tracing::debug!(
                package_id = %existing.id,
                quantity,
                "créditos adicionados à carteira existente"
            );

            return self
                .package_repo
                .find_by_id(&mut *conn, existing.id)
                .await?
                .ok_or(AppError::PackageNotFound);
        }

        let now = Utc::now();
        let package = ClientPackage {
            id: Uuid::new_v4(),
            client_id,
            service_id,
            initial_quantity: quantity,
            consumed_quantity: 0,
            available_quantity: quantity,
            unit_price,
            total_paid,
            is_active: true,
            sale_id: source_sale_id,
            created_at: now,
            updated_at: now,
        };
        self.package_repo.insert(&mut *conn, &package).await?;

        tracing::debug!(package_id = %package.id, quantity, "carteira criada");
        Ok(package)
    }

    /// Consome créditos da carteira, gravando a linha do ledger ligada à venda.
    /// Saldo insuficiente rejeita o consumo sem alterar nada.
    pub async fn consume(
        &self,
        conn: &mut SqliteConnection,
        package_id: Uuid,
        quantity: i64,
        sale_id: Uuid,
    ) -> Result<PackageConsumption, AppError> {
        if quantity <= 0 {
            return Err(AppError::InvalidSaleItem(
                "consumo exige quantidade positiva".into(),
            ));
        }

        let package = self
            .package_repo
            .find_by_id(&mut *conn, package_id)
            .await?
            .ok_or(AppError::PackageNotFound)?;

        let consumed = self
            .package_repo
            .try_consume(&mut *conn, package_id, quantity)
            .await?;
        if !consumed {
            return Err(AppError::InsufficientBalance {
                package_id,
                available: package.available_quantity,
                requested: quantity,
            });
        }

        let consumption = PackageConsumption {
            id: Uuid::new_v4(),
            package_id,
            sale_id,
            quantity,
            unit_price: package.unit_price,
            total_value: round_money(package.unit_price * Decimal::from(quantity)),
            consumed_at: Utc::now(),
        };
        self.package_repo
            .insert_consumption(&mut *conn, &consumption)
            .await?;

        tracing::debug!(%package_id, %sale_id, quantity, "créditos consumidos");
        Ok(consumption)
    }

    /// Devolve à carteira todos os consumos de uma venda e apaga as linhas do
    /// ledger (cancelamento). Retorna quantos consumos foram revertidos.
    pub async fn reverse_consumption(
        &self,
        conn: &mut SqliteConnection,
        sale_id: Uuid,
    ) -> Result<u64, AppError> {
        let consumptions = self
            .package_repo
            .consumptions_by_sale(&mut *conn, sale_id)
            .await?;

        for consumption in &consumptions {
            self.package_repo
                .apply_consumption_reversal(&mut *conn, consumption.package_id, consumption.quantity)
                .await?;
        }
        let deleted = self
            .package_repo
            .delete_consumptions_by_sale(&mut *conn, sale_id)
            .await?;

        if deleted > 0 {
            tracing::debug!(%sale_id, deleted, "consumos revertidos");
        }
        Ok(deleted)
    }

    /// Retira das carteiras os créditos emitidos pelos itens '02' de uma venda
    /// cancelada. A carteira é desativada quando foi criada por essa venda e a
    /// retirada a devolve a zero; se já houve consumo parcial, o saldo pode
    /// ficar negativo.
    pub async fn reverse_issue(
        &self,
        conn: &mut SqliteConnection,
        sale: &Sale,
        items: &[SaleItem],
    ) -> Result<(), AppError> {
        for item in items {
            if item.sale_type != SaleType::PackagePurchase {
                continue;
            }
            let service_id = item.product_id.ok_or_else(|| {
                AppError::InvalidSaleItem("item de compra de pacote sem serviço".into())
            })?;

            let Some(package) = self
                .package_repo
                .find_active(&mut *conn, sale.client_id, service_id)
                .await?
            else {
                // Carteira sumiu por fora do fluxo normal; registra e segue.
                tracing::warn!(
                    sale_id = %sale.id,
                    %service_id,
                    "estorno de emissão sem carteira ativa correspondente"
                );
                continue;
            };

            let new_initial = package.initial_quantity - item.quantity;
            let new_total_paid = (package.total_paid - item.total).max(Decimal::ZERO);
            let new_unit_price = if new_initial > 0 {
                round_money(new_total_paid / Decimal::from(new_initial))
            } else {
                Decimal::ZERO
            };
            let deactivate = package.sale_id == Some(sale.id) && new_initial == 0;

            self.package_repo
                .apply_issue_reversal(
                    &mut *conn,
                    package.id,
                    item.quantity,
                    new_total_paid,
                    new_unit_price,
                    deactivate,
                )
                .await?;

            let new_available = package.available_quantity - item.quantity;
            if new_available < 0 {
                tracing::warn!(
                    package_id = %package.id,
                    sale_id = %sale.id,
                    new_available,
                    "estorno de emissão deixou saldo negativo (compra cancelada já consumida)"
                );
            }
        }
        Ok(())
    }

    /// Correção administrativa explícita: único caminho sancionado para forçar
    /// saldo (inclusive negativo) fora do fluxo de vendas.
    pub async fn adjust(
        &self,
        conn: &mut SqliteConnection,
        package_id: Uuid,
        delta: i64,
        reason: &str,
    ) -> Result<ClientPackage, AppError> {
        self.package_repo
            .apply_adjustment(&mut *conn, package_id, delta)
            .await?;

        let package = self
            .package_repo
            .find_by_id(&mut *conn, package_id)
            .await?
            .ok_or(AppError::PackageNotFound)?;

        tracing::warn!(
            %package_id,
            delta,
            reason,
            available = package.available_quantity,
            "ajuste administrativo de carteira"
        );
        Ok(package)
    }

    /// Reconfere os dois invariantes de cada carteira do cliente contra o
    /// ledger de consumos. Vazio = tudo consistente.
    pub async fn verify_invariants(
        &self,
        conn: &mut SqliteConnection,
        client_id: Uuid,
    ) -> Result<Vec<WalletDrift>, AppError> {
        let packages = self
            .package_repo
            .list_by_client(&mut *conn, client_id)
            .await?;

        let mut drifts = Vec::new();
        for package in &packages {
            let ledger_consumed = self
                .package_repo
                .ledger_consumed_total(&mut *conn, package.id)
                .await?;
            let expected_available = package.initial_quantity - package.consumed_quantity;

            if ledger_consumed != package.consumed_quantity
                || expected_available != package.available_quantity
            {
                drifts.push(WalletDrift {
                    package_id: package.id,
                    recorded_consumed: package.consumed_quantity,
                    ledger_consumed,
                    recorded_available: package.available_quantity,
                    expected_available,
                });
            }
        }
        Ok(drifts)
    }
}
