// src/services/sale.rs
//
// Máquina de estados da venda: aberta → confirmada → cancelada, com estorno
// parcial e reagendamento sobre vendas confirmadas. Cada transição roda numa
// única transação tudo-ou-nada; qualquer falha desfaz todos os efeitos
// (nenhum leitor vê venda "meio confirmada").

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{Acquire, Sqlite, SqliteConnection};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CommissionRepository, PackageRepository, SaleRepository},
    models::commission::{Commission, CommissionStatus},
    models::policy::PolicyKind,
    models::sale::{Sale, SaleItem, SaleStatus, SaleType},
    services::commission::{self, CommissionService, round_money},
    services::wallet::WalletService,
};

/// Resultado do estorno parcial, devolvido à camada de cima.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundOutcome {
    pub refund_total: Decimal,
    pub net_total: Decimal,
    /// Soma das comissões em aberto da venda após o recálculo.
    pub new_commission_amount: Decimal,
}

#[derive(Clone)]
pub struct SaleService {
    sale_repo: SaleRepository,
    commission_repo: CommissionRepository,
    package_repo: PackageRepository,
    commission_service: CommissionService,
    wallet: WalletService,
}

impl SaleService {
    pub fn new(
        sale_repo: SaleRepository,
        commission_repo: CommissionRepository,
        package_repo: PackageRepository,
        commission_service: CommissionService,
        wallet: WalletService,
    ) -> Self {
        Self {
            sale_repo,
            commission_repo,
            package_repo,
            commission_service,
            wallet,
        }
    }

    // =========================================================================
    //  CONFIRMAÇÃO (aberta → confirmada)
    // =========================================================================

    /// Aplica os efeitos de cada item na ordem do documento: '01' gera
    /// comissão sobre o total líquido; '02' emite créditos (nunca comissão);
    /// '03' baixa créditos e gera comissão sobre o subtotal bruto. Se qualquer
    /// baixa falhar por saldo, a confirmação inteira aborta.
    pub async fn confirm_sale<'a, A>(&self, conn: A, sale_id: Uuid) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;

        let sale = self
            .sale_repo
            .find_by_id(&mut *tx, sale_id)
            .await?
            .ok_or(AppError::SaleNotFound)?;
        if sale.status != SaleStatus::Aberta {
            return Err(AppError::InvalidTransition(format!(
                "confirmação exige venda aberta (status atual: {})",
                sale.status.as_str()
            )));
        }

        let items = self.sale_repo.list_items(&mut *tx, sale_id).await?;
        for item in &items {
            match item.sale_type {
                SaleType::PackagePurchase => {
                    let service_id = item.product_id.ok_or_else(|| {
                        AppError::InvalidSaleItem("item de compra de pacote sem serviço".into())
                    })?;
                    let unit_price = if item.quantity > 0 {
                        round_money(item.total / Decimal::from(item.quantity))
                    } else {
                        Decimal::ZERO
                    };
                    self.wallet
                        .issue(
                            &mut *tx,
                            sale.client_id,
                            service_id,
                            item.quantity,
                            unit_price,
                            item.total,
                            Some(sale.id),
                        )
                        .await?;
                }
                SaleType::PackageConsumption => {
                    let service_id = item.product_id.ok_or_else(|| {
                        AppError::InvalidSaleItem("item de consumo de pacote sem serviço".into())
                    })?;
                    let package = self
                        .package_repo
                        .find_active(&mut *tx, sale.client_id, service_id)
                        .await?
                        .ok_or(AppError::PackageNotFound)?;
                    self.wallet
                        .consume(&mut *tx, package.id, item.quantity, sale.id)
                        .await?;
                    // Consumo de pacote comissiona sobre o subtotal bruto
                    // (antes do desconto de linha) — regra intencional.
                    self.create_commission(&mut *tx, &sale, item, item.subtotal)
                        .await?;
                }
                SaleType::Common => {
                    // Venda comum comissiona sobre o total líquido.
                    self.create_commission(&mut *tx, &sale, item, item.total)
                        .await?;
                }
            }
        }

        let moved = self
            .sale_repo
            .transition_status(&mut *tx, sale_id, SaleStatus::Aberta, SaleStatus::Confirmada)
            .await?;
        if !moved {
            return Err(AppError::InvalidTransition(
                "a venda mudou de estado durante a confirmação".into(),
            ));
        }

        tx.commit().await?;
        tracing::info!(%sale_id, itens = items.len(), "venda confirmada");
        Ok(())
    }

    async fn create_commission(
        &self,
        conn: &mut SqliteConnection,
        sale: &Sale,
        item: &SaleItem,
        base_amount: Decimal,
    ) -> Result<(), AppError> {
        let policy = self
            .commission_service
            .resolve_policy(
                &mut *conn,
                sale.attendant_id,
                item.product_id,
                sale.sale_date,
                item.sale_type,
            )
            .await?;

        if policy.is_none() {
            // Soft error de qualidade de dados: a confirmação segue com a taxa
            // de contingência, mas o evento fica visível no log.
            tracing::warn!(
                sale_id = %sale.id,
                sale_item_id = %item.id,
                attendant_id = %sale.attendant_id,
                fallback_rate = %self.commission_service.fallback_rate(),
                "nenhuma política de comissão aplicável; aplicando taxa de contingência"
            );
        }

        let breakdown = commission::compute(
            policy.as_ref(),
            base_amount,
            item.quantity,
            self.commission_service.fallback_rate(),
        );

        let now = Utc::now();
        let commission = Commission {
            id: Uuid::new_v4(),
            sale_id: sale.id,
            sale_item_id: item.id,
            user_id: sale.attendant_id,
            base_amount,
            commission_kind: breakdown.kind,
            commission_rate: breakdown.rate,
            commission_amount: breakdown.amount,
            reference_date: sale.sale_date,
            status: CommissionStatus::APagar,
            commission_policy_id: policy.as_ref().map(|p| p.id),
            created_at: now,
            updated_at: now,
        };
        self.commission_repo.insert(&mut *conn, &commission).await?;
        Ok(())
    }

    // =========================================================================
    //  CANCELAMENTO (aberta|confirmada → cancelada)
    // =========================================================================

    /// Cancela a venda e reverte integralmente os efeitos: comissões viram
    /// 'cancelado' (nunca apagadas), consumos voltam para a carteira e
    /// emissões são retiradas. Cancelar venda já cancelada é rejeitado.
    pub async fn cancel_sale<'a, A>(&self, conn: A, sale_id: Uuid) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;

        let sale = self
            .sale_repo
            .find_by_id(&mut *tx, sale_id)
            .await?
            .ok_or(AppError::SaleNotFound)?;

        let from = match sale.status {
            SaleStatus::Cancelada => {
                return Err(AppError::InvalidTransition("venda já cancelada".into()));
            }
            status => status,
        };

        if from == SaleStatus::Confirmada {
            let cancelled = self
                .commission_repo
                .cancel_open_by_sale(&mut *tx, sale_id)
                .await?;
            self.wallet.reverse_consumption(&mut *tx, sale_id).await?;
            let items = self.sale_repo.list_items(&mut *tx, sale_id).await?;
            self.wallet.reverse_issue(&mut *tx, &sale, &items).await?;
            tracing::debug!(%sale_id, comissoes_canceladas = cancelled, "efeitos revertidos");
        }

        let moved = self
            .sale_repo
            .transition_status(&mut *tx, sale_id, from, SaleStatus::Cancelada)
            .await?;
        if !moved {
            return Err(AppError::InvalidTransition(
                "a venda mudou de estado durante o cancelamento".into(),
            ));
        }

        tx.commit().await?;
        tracing::info!(%sale_id, "venda cancelada");
        Ok(())
    }

    // =========================================================================
    //  ESTORNO PARCIAL (confirmada, status não muda)
    // =========================================================================

    /// Registra um estorno append-only, reduz o total líquido e recalcula as
    /// comissões em aberto com a MESMA taxa aplicada na confirmação (nunca
    /// re-resolve a política). Carteiras não são tocadas.
    pub async fn refund_sale<'a, A>(
        &self,
        conn: A,
        sale_id: Uuid,
        amount: Decimal,
        reason: Option<String>,
        created_by: Option<Uuid>,
    ) -> Result<RefundOutcome, AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;

        let sale = self
            .sale_repo
            .find_by_id(&mut *tx, sale_id)
            .await?
            .ok_or(AppError::SaleNotFound)?;
        if sale.status != SaleStatus::Confirmada {
            return Err(AppError::InvalidTransition(format!(
                "estorno exige venda confirmada (status atual: {})",
                sale.status.as_str()
            )));
        }
        if amount <= Decimal::ZERO {
            return Err(AppError::InvalidTransition(
                "valor do estorno deve ser positivo".into(),
            ));
        }
        if amount > sale.total {
            return Err(AppError::RefundExceedsBalance {
                requested: amount,
                net_total: sale.total,
            });
        }

        let old_net = sale.total;
        let new_net = old_net - amount;
        let new_refund_total = sale.refund_total + amount;

        let refund = crate::models::sale::SaleRefund {
            id: Uuid::new_v4(),
            sale_id,
            amount,
            reason,
            created_by,
            created_at: Utc::now(),
        };
        self.sale_repo.insert_refund(&mut *tx, &refund).await?;
        self.sale_repo
            .apply_refund_totals(&mut *tx, sale_id, new_net, new_refund_total)
            .await?;

        // old_net > 0 garantido: amount é positivo e não excede old_net.
        let ratio = new_net / old_net;
        let mut new_commission_amount = Decimal::ZERO;
        for commission in self.commission_repo.list_by_sale(&mut *tx, sale_id).await? {
            if commission.status != CommissionStatus::APagar {
                continue;
            }
            match commission.commission_kind {
                PolicyKind::Percentage => {
                    let new_base = round_money(commission.base_amount * ratio);
                    let new_amount =
                        round_money(new_base * commission.commission_rate / Decimal::ONE_HUNDRED);
                    self.commission_repo
                        .update_amount(&mut *tx, commission.id, new_base, new_amount)
                        .await?;
                    new_commission_amount += new_amount;
                }
                // Comissão por unidade depende da quantidade, não do valor.
                PolicyKind::FixedPerUnit => {
                    new_commission_amount += commission.commission_amount;
                }
            }
        }

        tx.commit().await?;
        tracing::info!(%sale_id, %amount, %new_net, "estorno parcial registrado");

        Ok(RefundOutcome {
            refund_total: new_refund_total,
            net_total: new_net,
            new_commission_amount,
        })
    }

    // =========================================================================
    //  REAGENDAMENTO (confirmada, admin)
    // =========================================================================

    /// Muda a data da venda e regenera TODAS as comissões re-resolvendo as
    /// políticas na nova data — o único caso em que re-resolução sobre venda
    /// confirmada é correta, porque a resolução é sensível à data. Carteiras
    /// não são tocadas.
    pub async fn reschedule_sale<'a, A>(
        &self,
        conn: A,
        sale_id: Uuid,
        new_date: NaiveDate,
    ) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;

        let mut sale = self
            .sale_repo
            .find_by_id(&mut *tx, sale_id)
            .await?
            .ok_or(AppError::SaleNotFound)?;
        if sale.status != SaleStatus::Confirmada {
            return Err(AppError::InvalidTransition(format!(
                "reagendamento exige venda confirmada (status atual: {})",
                sale.status.as_str()
            )));
        }

        let old_date = sale.sale_date;
        self.sale_repo.set_sale_date(&mut *tx, sale_id, new_date).await?;
        sale.sale_date = new_date;

        self.commission_repo.delete_by_sale(&mut *tx, sale_id).await?;
        let items = self.sale_repo.list_items(&mut *tx, sale_id).await?;
        for item in &items {
            match item.sale_type {
                SaleType::Common => {
                    self.create_commission(&mut *tx, &sale, item, item.total)
                        .await?;
                }
                SaleType::PackageConsumption => {
                    self.create_commission(&mut *tx, &sale, item, item.subtotal)
                        .await?;
                }
                SaleType::PackagePurchase => {}
            }
        }

        tx.commit().await?;
        tracing::info!(%sale_id, %old_date, %new_date, "venda reagendada, comissões regeneradas");
        Ok(())
    }

    // =========================================================================
    //  EXCLUSÃO FÍSICA (admin, limpeza terminal)
    // =========================================================================

    /// Remove a venda e tudo que ela gerou. Bloqueada se um pacote criado por
    /// ela já foi consumido por outra venda — nesse caso os consumos precisam
    /// ser estornados primeiro.
    pub async fn delete_sale<'a, A>(&self, conn: A, sale_id: Uuid) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;

        let sale = self
            .sale_repo
            .find_by_id(&mut *tx, sale_id)
            .await?
            .ok_or(AppError::SaleNotFound)?;

        let foreign = self
            .package_repo
            .count_foreign_consumptions(&mut *tx, sale_id)
            .await?;
        if foreign > 0 {
            return Err(AppError::DependentDataBlocksDelete(format!(
                "pacote gerado pela venda tem {foreign} consumo(s) de outras vendas; \
                 estorne esses consumos primeiro"
            )));
        }

        // Cancelada já teve os efeitos revertidos; aberta nunca os teve.
        if sale.status == SaleStatus::Confirmada {
            self.wallet.reverse_consumption(&mut *tx, sale_id).await?;
            let items = self.sale_repo.list_items(&mut *tx, sale_id).await?;
            self.wallet.reverse_issue(&mut *tx, &sale, &items).await?;
        }

        self.commission_repo.delete_by_sale(&mut *tx, sale_id).await?;
        self.sale_repo.delete_refunds(&mut *tx, sale_id).await?;
        self.sale_repo.delete_items(&mut *tx, sale_id).await?;
        self.sale_repo.delete_sale(&mut *tx, sale_id).await?;

        tx.commit().await?;
        tracing::info!(%sale_id, "venda excluída fisicamente");
        Ok(())
    }
}
