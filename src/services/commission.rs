// src/services/commission.rs
//
// Resolução de política + cálculo de comissão. O miolo é puro (listas em
// memória) para ser testável sem banco; o service só orquestra as buscas.

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{HolidayRepository, PolicyRepository},
    models::policy::{CommissionPolicy, PolicyKind, PolicyScope},
    models::sale::SaleType,
    services::calendar::{self, DayKind},
};

/// Resultado do cálculo: tipo, taxa aplicada e valor final (2 casas).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionBreakdown {
    pub kind: PolicyKind,
    pub rate: Decimal,
    pub amount: Decimal,
}

/// Arredondamento comercial (meio para cima), 2 casas.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn scope_matches(
    policy: &CommissionPolicy,
    user_id: Uuid,
    product_id: Option<Uuid>,
) -> bool {
    match policy.scope {
        PolicyScope::UserProduct => {
            policy.user_id == Some(user_id)
                && product_id.is_some()
                && policy.product_id == product_id
        }
        PolicyScope::User => policy.user_id == Some(user_id),
        PolicyScope::Product => product_id.is_some() && policy.product_id == product_id,
        PolicyScope::General => true,
    }
}

/// Resolve a política aplicável em quatro níveis de especificidade
/// (user_product > user > product > general), devolvendo o primeiro nível não
/// vazio. Dentro do nível: tipo de venda exato vence 'all', depois o
/// `valid_from` mais recente; `created_at` e id desempatam para manter o
/// resultado determinístico.
pub fn select_policy<'a>(
    candidates: &'a [CommissionPolicy],
    user_id: Uuid,
    product_id: Option<Uuid>,
    sale_type: SaleType,
    day: DayKind,
    date: NaiveDate,
) -> Option<&'a CommissionPolicy> {
    let eligible: Vec<&CommissionPolicy> = candidates
        .iter()
        .filter(|p| {
            p.is_active
                && p.valid_on(date)
                && p.sale_type.matches(sale_type)
                && p.applies_to.matches(day)
        })
        .collect();

    for scope in [
        PolicyScope::UserProduct,
        PolicyScope::User,
        PolicyScope::Product,
        PolicyScope::General,
    ] {
        let mut tier: Vec<&CommissionPolicy> = eligible
            .iter()
            .copied()
            .filter(|p| p.scope == scope && scope_matches(p, user_id, product_id))
            .collect();
        if tier.is_empty() {
            continue;
        }
        tier.sort_by(|a, b| {
            b.sale_type
                .is_exact()
                .cmp(&a.sale_type.is_exact())
                .then(b.valid_from.cmp(&a.valid_from))
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        return Some(tier[0]);
    }
    None
}

/// Calcula a comissão de um item. Sem política, aplica a taxa percentual de
/// contingência (`fallback_rate`) — válvula de segurança para a confirmação
/// nunca falhar só por falta de política; o chamador loga o evento.
pub fn compute(
    policy: Option<&CommissionPolicy>,
    base_amount: Decimal,
    quantity: i64,
    fallback_rate: Decimal,
) -> CommissionBreakdown {
    match policy {
        None => CommissionBreakdown {
            kind: PolicyKind::Percentage,
            rate: fallback_rate,
            amount: round_money(base_amount * fallback_rate / Decimal::ONE_HUNDRED),
        },
        Some(p) => match p.kind {
            PolicyKind::FixedPerUnit => CommissionBreakdown {
                kind: PolicyKind::FixedPerUnit,
                rate: p.value,
                amount: round_money(p.value * Decimal::from(quantity)),
            },
            PolicyKind::Percentage => CommissionBreakdown {
                kind: PolicyKind::Percentage,
                rate: p.value,
                amount: round_money(base_amount * p.value / Decimal::ONE_HUNDRED),
            },
        },
    }
}

#[derive(Clone)]
pub struct CommissionService {
    policy_repo: PolicyRepository,
    holiday_repo: HolidayRepository,
    fallback_rate: Decimal,
}

impl CommissionService {
    pub fn new(
        policy_repo: PolicyRepository,
        holiday_repo: HolidayRepository,
        fallback_rate: Decimal,
    ) -> Self {
        Self {
            policy_repo,
            holiday_repo,
            fallback_rate,
        }
    }

    pub fn fallback_rate(&self) -> Decimal {
        self.fallback_rate
    }

    /// Resolve a política aplicável para (atendente, produto, data, tipo).
    /// `None` não é erro: o cálculo cai na taxa de contingência.
    pub async fn resolve_policy(
        &self,
        conn: &mut SqliteConnection,
        user_id: Uuid,
        product_id: Option<Uuid>,
        sale_date: NaiveDate,
        sale_type: SaleType,
    ) -> Result<Option<CommissionPolicy>, AppError> {
        let holidays = self.holiday_repo.load_active(&mut *conn).await?;
        let day = calendar::classify(sale_date, &holidays);
        let candidates = self
            .policy_repo
            .candidates_on(&mut *conn, user_id, product_id, sale_date)
            .await?;

        Ok(select_policy(&candidates, user_id, product_id, sale_type, day, sale_date).cloned())
    }
}
