// tests/lifecycle.rs
//
// Ciclo de vida completo contra um banco SQLite em memória: confirmação,
// cancelamento, estorno parcial, reagendamento, exclusão física e as
// projeções de extrato, incluindo os invariantes da carteira.

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use comissoes_core::common::error::AppError;
use comissoes_core::db::{
    CommissionRepository, HolidayRepository, PackageRepository, PolicyRepository, SaleRepository,
};
use comissoes_core::models::{
    ClientPackage, CommissionStatus, NewCommissionPolicy, PolicyAppliesTo, PolicyKind,
    PolicySaleType, PolicyScope, Sale, SaleItem, SaleStatus, SaleType,
};
use comissoes_core::services::statement::StatementKind;
use comissoes_core::{AppState, init_tracing};

// =============================================================================
//  Helpers
// =============================================================================

fn dec(s: &str) -> Decimal {
    s.parse().expect("decimal literal")
}

fn date(s: &str) -> NaiveDate {
    s.parse().expect("date literal")
}

async fn state() -> AppState {
    init_tracing();
    AppState::in_memory().await.expect("banco em memória")
}

/// Item de venda para semear: (tipo, serviço, quantidade, subtotal, total).
type ItemSpec<'a> = (SaleType, Option<Uuid>, i64, &'a str, &'a str);

async fn seed_sale(
    state: &AppState,
    client_id: Uuid,
    attendant_id: Uuid,
    sale_date: NaiveDate,
    items: &[ItemSpec<'_>],
) -> Uuid {
    let repo = SaleRepository::new();
    let now = Utc::now();

    let mut subtotal = Decimal::ZERO;
    let mut total = Decimal::ZERO;
    for (_, _, _, sub, tot) in items {
        subtotal += dec(sub);
        total += dec(tot);
    }

    let sale = Sale {
        id: Uuid::new_v4(),
        client_id,
        attendant_id,
        sale_date,
        status: SaleStatus::Aberta,
        subtotal,
        total_discount: subtotal - total,
        total,
        refund_total: Decimal::ZERO,
        created_at: now,
        updated_at: now,
    };
    repo.insert_sale(&state.db_pool, &sale)
        .await
        .expect("insert sale");

    for (i, (sale_type, product_id, quantity, sub, tot)) in items.iter().enumerate() {
        let item = SaleItem {
            id: Uuid::new_v4(),
            sale_id: sale.id,
            product_id: *product_id,
            quantity: *quantity,
            sale_type: *sale_type,
            subtotal: dec(sub),
            total: dec(tot),
            // espaçados para preservar a ordem do documento
            created_at: now + Duration::milliseconds(i as i64),
        };
        repo.insert_item(&state.db_pool, &item)
            .await
            .expect("insert item");
    }

    sale.id
}

fn policy(
    name: &str,
    kind: PolicyKind,
    value: &str,
    applies_to: PolicyAppliesTo,
) -> NewCommissionPolicy {
    NewCommissionPolicy {
        name: name.into(),
        kind,
        value: dec(value),
        scope: PolicyScope::General,
        user_id: None,
        product_id: None,
        applies_to,
        sale_type: PolicySaleType::All,
        valid_from: date("2026-01-01"),
        valid_until: None,
    }
}

/// Par padrão de políticas gerais: 2.5% dia útil, 10% fim de semana/feriado.
async fn seed_day_policies(state: &AppState) {
    let repo = PolicyRepository::new();
    repo.insert(
        &state.db_pool,
        &policy(
            "geral dia útil",
            PolicyKind::Percentage,
            "2.5",
            PolicyAppliesTo::Weekdays,
        ),
    )
    .await
    .expect("weekday policy");
    repo.insert(
        &state.db_pool,
        &policy(
            "geral fim de semana",
            PolicyKind::Percentage,
            "10",
            PolicyAppliesTo::WeekendsHolidays,
        ),
    )
    .await
    .expect("weekend policy");
}

async fn seed_package(
    state: &AppState,
    client_id: Uuid,
    service_id: Uuid,
    quantity: i64,
    unit_price: &str,
) -> Uuid {
    let now = Utc::now();
    let package = ClientPackage {
        id: Uuid::new_v4(),
        client_id,
        service_id,
        initial_quantity: quantity,
        consumed_quantity: 0,
        available_quantity: quantity,
        unit_price: dec(unit_price),
        total_paid: dec(unit_price) * Decimal::from(quantity),
        is_active: true,
        sale_id: None,
        created_at: now,
        updated_at: now,
    };
    PackageRepository::new()
        .insert(&state.db_pool, &package)
        .await
        .expect("insert package");
    package.id
}

// =============================================================================
//  Comissão por dia (venda comum)
// =============================================================================

// 2026-03-03 é terça-feira: vale a política de dia útil.
#[tokio::test]
async fn confirm_common_sale_on_weekday_uses_weekday_rate() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let attendant = Uuid::new_v4();
    let sale_id = seed_sale(
        &state,
        client,
        attendant,
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].status, CommissionStatus::APagar);
    assert_eq!(commissions[0].commission_rate, dec("2.5"));
    assert_eq!(commissions[0].commission_amount, dec("25.00"));
    assert!(commissions[0].commission_policy_id.is_some());
}

// 2026-03-07 é sábado: vale a política de fim de semana.
#[tokio::test]
async fn confirm_common_sale_on_saturday_uses_weekend_rate() {
    let state = state().await;
    seed_day_policies(&state).await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-07"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].commission_amount, dec("100.00"));
}

// Feriado cadastrado numa terça-feira conta como fim de semana/feriado.
#[tokio::test]
async fn holiday_on_weekday_uses_weekend_rate() {
    let state = state().await;
    seed_day_policies(&state).await;
    HolidayRepository::new()
        .upsert(&state.db_pool, date("2026-03-03"), "feriado municipal")
        .await
        .unwrap();

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].commission_rate, dec("10"));
    assert_eq!(commissions[0].commission_amount, dec("100.00"));
}

// Sem política aplicável a confirmação não falha: aplica a taxa de
// contingência (5%) e registra a comissão sem vínculo de política.
#[tokio::test]
async fn fallback_rate_applies_when_no_policy_matches() {
    let state = state().await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].commission_rate, dec("5"));
    assert_eq!(commissions[0].commission_amount, dec("50.00"));
    assert!(commissions[0].commission_policy_id.is_none());
}

// Política por unidade: valor fixo × quantidade, indiferente ao dia.
#[tokio::test]
async fn fixed_per_unit_policy_multiplies_by_quantity() {
    let state = state().await;
    PolicyRepository::new()
        .insert(
            &state.db_pool,
            &policy(
                "fixa por sessão",
                PolicyKind::FixedPerUnit,
                "7",
                PolicyAppliesTo::All,
            ),
        )
        .await
        .unwrap();

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 3, "450", "450")],
    )
    .await;

    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].commission_kind, PolicyKind::FixedPerUnit);
    assert_eq!(commissions[0].commission_amount, dec("21.00"));
}

// =============================================================================
//  Carteira: emissão, consumo, reversões
// =============================================================================

// Compra de pacote emite créditos e nunca gera comissão.
#[tokio::test]
async fn package_purchase_issues_credits_without_commission() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let sale_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;

    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let package = PackageRepository::new()
        .find_active(&state.db_pool, client, service)
        .await
        .unwrap()
        .expect("carteira criada");
    assert_eq!(package.initial_quantity, 10);
    assert_eq!(package.available_quantity, 10);
    assert_eq!(package.consumed_quantity, 0);
    assert_eq!(package.unit_price, dec("50.00"));
    assert_eq!(package.sale_id, Some(sale_id));

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert!(commissions.is_empty());
}

// Consumo baixa créditos, grava o ledger e comissiona sobre o subtotal bruto.
#[tokio::test]
async fn package_consumption_debits_credits_and_commissions_on_gross() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let package_id = seed_package(&state, client, service, 200, "10").await;

    // subtotal bruto 500, total líquido 450: a base deve ser 500
    let sale_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackageConsumption, Some(service), 50, "500", "450")],
    )
    .await;

    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let package = PackageRepository::new()
        .find_by_id(&state.db_pool, package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(package.available_quantity, 150);
    assert_eq!(package.consumed_quantity, 50);

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].base_amount, dec("500"));
    assert_eq!(commissions[0].commission_amount, dec("12.50"));
}

// Saldo insuficiente aborta a confirmação inteira: venda segue aberta,
// carteira intocada, nenhuma comissão gravada.
#[tokio::test]
async fn insufficient_balance_aborts_whole_confirmation() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let package_id = seed_package(&state, client, service, 200, "10").await;

    let sale_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackageConsumption, Some(service), 300, "3000", "3000")],
    )
    .await;

    let err = state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect_err("deveria faltar saldo");
    match err {
        AppError::InsufficientBalance {
            available,
            requested,
            ..
        } => {
            assert_eq!(available, 200);
            assert_eq!(requested, 300);
        }
        other => panic!("erro inesperado: {other:?}"),
    }

    let sale = SaleRepository::new()
        .find_by_id(&state.db_pool, sale_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sale.status, SaleStatus::Aberta);

    let package = PackageRepository::new()
        .find_by_id(&state.db_pool, package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(package.available_quantity, 200);
    assert_eq!(package.consumed_quantity, 0);

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert!(commissions.is_empty());
}

// Consumo sem carteira ativa para o serviço é rejeitado.
#[tokio::test]
async fn consumption_without_active_package_is_rejected() {
    let state = state().await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(
            SaleType::PackageConsumption,
            Some(Uuid::new_v4()),
            1,
            "10",
            "10",
        )],
    )
    .await;

    let err = state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect_err("sem carteira");
    assert!(matches!(err, AppError::PackageNotFound));
}

// =============================================================================
//  Cancelamento
// =============================================================================

// Cancelar venda confirmada devolve os créditos e cancela (não apaga) a
// comissão; o ledger de consumos da venda é limpo.
#[tokio::test]
async fn cancel_confirmed_sale_restores_credits_and_cancels_commissions() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let package_id = seed_package(&state, client, service, 200, "10").await;

    let sale_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackageConsumption, Some(service), 50, "500", "500")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");
    sale_service
        .cancel_sale(&state.db_pool, sale_id)
        .await
        .expect("cancel");

    let package = PackageRepository::new()
        .find_by_id(&state.db_pool, package_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(package.available_quantity, 200);
    assert_eq!(package.consumed_quantity, 0);

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].status, CommissionStatus::Cancelado);

    let consumptions = PackageRepository::new()
        .consumptions_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert!(consumptions.is_empty());
}

// Cancelar a venda que criou a carteira retira os créditos e desativa a
// carteira quando ela volta a zero.
#[tokio::test]
async fn cancel_package_purchase_reverses_issue_and_deactivates_wallet() {
    let state = state().await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let sale_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let package_id = PackageRepository::new()
        .find_active(&state.db_pool, client, service)
        .await
        .unwrap()
        .unwrap()
        .id;

    sale_service
        .cancel_sale(&state.db_pool, sale_id)
        .await
        .expect("cancel");

    assert!(
        PackageRepository::new()
            .find_active(&state.db_pool, client, service)
            .await
            .unwrap()
            .is_none()
    );
    let package = PackageRepository::new()
        .find_by_id(&state.db_pool, package_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!package.is_active);
    assert_eq!(package.initial_quantity, 0);
    assert_eq!(package.available_quantity, 0);
    assert_eq!(package.total_paid, Decimal::ZERO);
}

// Cancelamento é terminal: cancelar de novo é rejeitado sem alterar nada.
#[tokio::test]
async fn cancel_is_terminal() {
    let state = state().await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "100", "100")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .cancel_sale(&state.db_pool, sale_id)
        .await
        .expect("cancel aberta");

    let err = sale_service
        .cancel_sale(&state.db_pool, sale_id)
        .await
        .expect_err("segundo cancelamento");
    assert!(matches!(err, AppError::InvalidTransition(_)));

    let err = sale_service
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect_err("confirmar cancelada");
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

// =============================================================================
//  Estorno parcial
// =============================================================================

// Estorno reduz o líquido e reescala a comissão percentual com a taxa
// originalmente aplicada (contingência de 5%, neste caso).
#[tokio::test]
async fn refund_rescales_percentage_commission_with_stored_rate() {
    let state = state().await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let outcome = sale_service
        .refund_sale(&state.db_pool, sale_id, dec("200"), None, None)
        .await
        .expect("refund");
    assert_eq!(outcome.net_total, dec("800"));
    assert_eq!(outcome.refund_total, dec("200"));
    assert_eq!(outcome.new_commission_amount, dec("40.00"));

    let sale = SaleRepository::new()
        .find_by_id(&state.db_pool, sale_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sale.status, SaleStatus::Confirmada);
    assert_eq!(sale.total, dec("800"));
    assert_eq!(sale.refund_total, dec("200"));

    let refunds = SaleRepository::new()
        .list_refunds(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0].amount, dec("200"));

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].base_amount, dec("800.00"));
    assert_eq!(commissions[0].commission_rate, dec("5"));
    assert_eq!(commissions[0].commission_amount, dec("40.00"));
}

// Comissão por unidade não depende do valor: estorno não a altera.
#[tokio::test]
async fn refund_leaves_fixed_per_unit_commission_untouched() {
    let state = state().await;
    PolicyRepository::new()
        .insert(
            &state.db_pool,
            &policy(
                "fixa por sessão",
                PolicyKind::FixedPerUnit,
                "7",
                PolicyAppliesTo::All,
            ),
        )
        .await
        .unwrap();

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 3, "450", "450")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");

    let outcome = sale_service
        .refund_sale(&state.db_pool, sale_id, dec("100"), None, None)
        .await
        .expect("refund");
    assert_eq!(outcome.new_commission_amount, dec("21.00"));

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].commission_amount, dec("21.00"));
}

// Estornos acumulam; o total nunca pode ficar negativo.
#[tokio::test]
async fn refund_cannot_exceed_remaining_net_total() {
    let state = state().await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");
    sale_service
        .refund_sale(&state.db_pool, sale_id, dec("700"), None, None)
        .await
        .expect("primeiro estorno");

    let err = sale_service
        .refund_sale(&state.db_pool, sale_id, dec("500"), None, None)
        .await
        .expect_err("excede o líquido restante");
    match err {
        AppError::RefundExceedsBalance {
            requested,
            net_total,
        } => {
            assert_eq!(requested, dec("500"));
            assert_eq!(net_total, dec("300"));
        }
        other => panic!("erro inesperado: {other:?}"),
    }
}

// Estorno exige venda confirmada.
#[tokio::test]
async fn refund_requires_confirmed_sale() {
    let state = state().await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "100", "100")],
    )
    .await;

    let err = state
        .sale_service()
        .refund_sale(&state.db_pool, sale_id, dec("10"), None, None)
        .await
        .expect_err("venda aberta");
    assert!(matches!(err, AppError::InvalidTransition(_)));
}

// =============================================================================
//  Reagendamento
// =============================================================================

// Mover a venda de terça para sábado regenera a comissão re-resolvendo a
// política na nova data.
#[tokio::test]
async fn reschedule_regenerates_commissions_at_new_date() {
    let state = state().await;
    seed_day_policies(&state).await;

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .expect("confirm");
    sale_service
        .reschedule_sale(&state.db_pool, sale_id, date("2026-03-07"))
        .await
        .expect("reschedule");

    let sale = SaleRepository::new()
        .find_by_id(&state.db_pool, sale_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sale.sale_date, date("2026-03-07"));

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].commission_rate, dec("10"));
    assert_eq!(commissions[0].commission_amount, dec("100.00"));
    assert_eq!(commissions[0].reference_date, date("2026-03-07"));
}

// =============================================================================
//  Exclusão física
// =============================================================================

// Exclusão é bloqueada enquanto o pacote criado pela venda tiver consumos de
// outras vendas; estornados os consumos, a exclusão passa.
#[tokio::test]
async fn delete_blocked_by_foreign_consumptions_until_reversed() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let purchase_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;
    let consumption_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-04"),
        &[(SaleType::PackageConsumption, Some(service), 4, "200", "200")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, purchase_id)
        .await
        .expect("confirm compra");
    sale_service
        .confirm_sale(&state.db_pool, consumption_id)
        .await
        .expect("confirm consumo");

    let err = sale_service
        .delete_sale(&state.db_pool, purchase_id)
        .await
        .expect_err("consumo de outra venda bloqueia");
    assert!(matches!(err, AppError::DependentDataBlocksDelete(_)));

    // cancelar a venda consumidora estorna os consumos
    sale_service
        .cancel_sale(&state.db_pool, consumption_id)
        .await
        .expect("cancel consumo");
    sale_service
        .delete_sale(&state.db_pool, purchase_id)
        .await
        .expect("delete compra");

    assert!(
        SaleRepository::new()
            .find_by_id(&state.db_pool, purchase_id)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        SaleRepository::new()
            .list_items(&state.db_pool, purchase_id)
            .await
            .unwrap()
            .is_empty()
    );
    // os créditos emitidos foram retirados junto
    assert!(
        PackageRepository::new()
            .find_active(&state.db_pool, client, service)
            .await
            .unwrap()
            .is_none()
    );
}

// =============================================================================
//  Invariantes da carteira
// =============================================================================

// Depois de emitir, consumir, cancelar e estornar, carteira e ledger batem.
#[tokio::test]
async fn wallet_invariants_hold_across_lifecycle() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let purchase_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;
    let consumption_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-04"),
        &[(SaleType::PackageConsumption, Some(service), 4, "200", "200")],
    )
    .await;
    let cancelled_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-05"),
        &[(SaleType::PackageConsumption, Some(service), 2, "100", "100")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, purchase_id)
        .await
        .unwrap();
    sale_service
        .confirm_sale(&state.db_pool, consumption_id)
        .await
        .unwrap();
    sale_service
        .confirm_sale(&state.db_pool, cancelled_id)
        .await
        .unwrap();
    sale_service
        .cancel_sale(&state.db_pool, cancelled_id)
        .await
        .unwrap();

    let package = PackageRepository::new()
        .find_active(&state.db_pool, client, service)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(package.consumed_quantity, 4);
    assert_eq!(package.available_quantity, 6);

    let mut conn = state.db_pool.acquire().await.unwrap();
    let drifts = state
        .wallet_service()
        .verify_invariants(&mut conn, client)
        .await
        .unwrap();
    assert!(drifts.is_empty(), "divergências: {drifts:?}");
}

// =============================================================================
//  Extrato e resumo
// =============================================================================

#[tokio::test]
async fn statement_and_summary_derive_from_facts() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let purchase_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;
    let consumption_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-04"),
        &[(SaleType::PackageConsumption, Some(service), 4, "200", "200")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, purchase_id)
        .await
        .unwrap();
    sale_service
        .confirm_sale(&state.db_pool, consumption_id)
        .await
        .unwrap();

    let statement_service = state.statement_service();
    let mut conn = state.db_pool.acquire().await.unwrap();

    let entries = statement_service
        .client_statement(&mut conn, client)
        .await
        .unwrap();
    assert_eq!(entries.len(), 2);
    // mais recente primeiro: o consumo
    assert_eq!(entries[0].kind, StatementKind::Consumption);
    assert_eq!(entries[0].quantity, -4);
    assert_eq!(entries[0].value, dec("-200.00"));
    assert_eq!(entries[0].balance_after, 6);
    assert_eq!(entries[1].kind, StatementKind::Purchase);
    assert_eq!(entries[1].quantity, 10);
    assert_eq!(entries[1].balance_after, 10);

    let summary = statement_service
        .client_summary(&mut conn, client)
        .await
        .unwrap();
    assert_eq!(summary.total_acquired, 10);
    assert_eq!(summary.total_consumed, 4);
    assert_eq!(summary.current_balance, 6);
    assert_eq!(summary.total_paid, dec("500"));
}

// Venda cancelada some do extrato: só fatos vigentes contam.
#[tokio::test]
async fn cancelled_sales_do_not_appear_in_statement() {
    let state = state().await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let purchase_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, purchase_id)
        .await
        .unwrap();
    sale_service
        .cancel_sale(&state.db_pool, purchase_id)
        .await
        .unwrap();

    let mut conn = state.db_pool.acquire().await.unwrap();
    let entries = state
        .statement_service()
        .client_statement(&mut conn, client)
        .await
        .unwrap();
    assert!(entries.is_empty());
}

// =============================================================================
//  Administração de políticas
// =============================================================================

#[tokio::test]
async fn policy_scope_requires_matching_ids() {
    let state = state().await;
    let admin = state.policy_admin_service();

    let mut new = policy(
        "por usuário sem user_id",
        PolicyKind::Percentage,
        "3",
        PolicyAppliesTo::All,
    );
    new.scope = PolicyScope::User;

    let err = admin
        .create_policy(&state.db_pool, new)
        .await
        .expect_err("escopo inconsistente");
    assert!(matches!(err, AppError::InvalidPolicy(_)));
}

// Política referenciada por comissão não pode ser excluída; encerrar a
// vigência é o caminho.
#[tokio::test]
async fn referenced_policy_cannot_be_deleted() {
    let state = state().await;
    let admin = state.policy_admin_service();

    let created = admin
        .create_policy(
            &state.db_pool,
            policy("geral", PolicyKind::Percentage, "5", PolicyAppliesTo::All),
        )
        .await
        .unwrap();

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "100", "100")],
    )
    .await;
    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .unwrap();

    let err = admin
        .delete_policy(&state.db_pool, created.id)
        .await
        .expect_err("referenciada");
    assert!(matches!(err, AppError::PolicyImmutable(_)));

    admin
        .close_policy(&state.db_pool, created.id, date("2026-03-31"))
        .await
        .expect("encerrar vigência");
}

// Substituição fecha a antiga no dia anterior e cria a nova atomicamente:
// vendas antes e depois do corte pegam taxas diferentes.
#[tokio::test]
async fn supersede_policy_switches_rate_at_cutover() {
    let state = state().await;
    let admin = state.policy_admin_service();

    let old = admin
        .create_policy(
            &state.db_pool,
            policy("geral 5%", PolicyKind::Percentage, "5", PolicyAppliesTo::All),
        )
        .await
        .unwrap();

    let mut replacement = policy("geral 8%", PolicyKind::Percentage, "8", PolicyAppliesTo::All);
    replacement.valid_from = date("2026-03-05");
    admin
        .supersede_policy(&state.db_pool, old.id, replacement)
        .await
        .expect("supersede");

    let before_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;
    let after_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-06"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, before_id)
        .await
        .unwrap();
    sale_service
        .confirm_sale(&state.db_pool, after_id)
        .await
        .unwrap();

    let repo = CommissionRepository::new();
    let before = repo.list_by_sale(&state.db_pool, before_id).await.unwrap();
    let after = repo.list_by_sale(&state.db_pool, after_id).await.unwrap();
    assert_eq!(before[0].commission_rate, dec("5"));
    assert_eq!(after[0].commission_rate, dec("8"));
}

// Política desativada sai da resolução na hora; a venda cai na contingência.
#[tokio::test]
async fn deactivated_policy_is_ignored_by_resolution() {
    let state = state().await;
    let admin = state.policy_admin_service();

    let created = admin
        .create_policy(
            &state.db_pool,
            policy("geral 3%", PolicyKind::Percentage, "3", PolicyAppliesTo::All),
        )
        .await
        .unwrap();
    admin
        .deactivate_policy(&state.db_pool, created.id)
        .await
        .unwrap();

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;
    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .unwrap();

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].commission_rate, dec("5"));
    assert!(commissions[0].commission_policy_id.is_none());
}

// Feriado desativado volta a contar como dia útil.
#[tokio::test]
async fn deactivated_holiday_counts_as_weekday_again() {
    let state = state().await;
    seed_day_policies(&state).await;

    let holidays = HolidayRepository::new();
    holidays
        .upsert(&state.db_pool, date("2026-03-03"), "feriado municipal")
        .await
        .unwrap();
    holidays
        .deactivate(&state.db_pool, date("2026-03-03"))
        .await
        .unwrap();

    let sale_id = seed_sale(
        &state,
        Uuid::new_v4(),
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::Common, None, 1, "1000", "1000")],
    )
    .await;
    state
        .sale_service()
        .confirm_sale(&state.db_pool, sale_id)
        .await
        .unwrap();

    let commissions = CommissionRepository::new()
        .list_by_sale(&state.db_pool, sale_id)
        .await
        .unwrap();
    assert_eq!(commissions[0].commission_rate, dec("2.5"));
}

// =============================================================================
//  Ajuste administrativo
// =============================================================================

// O ajuste desloca initial/available juntos (pode deixar saldo negativo) e,
// por isso, não quebra os invariantes auditáveis.
#[tokio::test]
async fn administrative_adjust_can_go_negative_without_breaking_invariants() {
    let state = state().await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let package_id = seed_package(&state, client, service, 5, "10").await;

    let wallet = state.wallet_service();
    let mut conn = state.db_pool.acquire().await.unwrap();

    let package = wallet
        .adjust(&mut conn, package_id, -8, "correção de importação")
        .await
        .unwrap();
    assert_eq!(package.initial_quantity, -3);
    assert_eq!(package.available_quantity, -3);

    let drifts = wallet.verify_invariants(&mut conn, client).await.unwrap();
    assert!(drifts.is_empty());
}

// Emitir sobre uma carteira que um ajuste deixou negativa não pode explodir:
// com initial de volta a zero não há preço unitário a recalcular.
#[tokio::test]
async fn issue_after_negative_adjust_recovers_without_unit_price() {
    let state = state().await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let package_id = seed_package(&state, client, service, 5, "10").await;

    let wallet = state.wallet_service();
    let mut conn = state.db_pool.acquire().await.unwrap();
    wallet
        .adjust(&mut conn, package_id, -8, "correção de importação")
        .await
        .unwrap();

    let package = wallet
        .issue(&mut conn, client, service, 3, dec("10"), dec("30"), None)
        .await
        .expect("emissão sobre carteira negativa");
    assert_eq!(package.initial_quantity, 0);
    assert_eq!(package.available_quantity, 0);
    assert_eq!(package.unit_price, Decimal::ZERO);
    assert_eq!(package.total_paid, dec("80"));

    let drifts = wallet.verify_invariants(&mut conn, client).await.unwrap();
    assert!(drifts.is_empty());
}

// Segunda compra do mesmo (cliente, serviço) é aditiva na carteira ativa, com
// o preço unitário recalculado como total_paid / initial; cancelar só a
// segunda devolve a carteira ao estado da primeira, ainda ativa.
#[tokio::test]
async fn second_purchase_adds_to_active_wallet_and_cancel_restores_it() {
    let state = state().await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let first_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;
    let second_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-04"),
        &[(SaleType::PackagePurchase, Some(service), 5, "300", "300")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, first_id)
        .await
        .expect("confirm primeira");
    sale_service
        .confirm_sale(&state.db_pool, second_id)
        .await
        .expect("confirm segunda");

    let repo = PackageRepository::new();
    let package = repo
        .find_active(&state.db_pool, client, service)
        .await
        .unwrap()
        .expect("uma única carteira ativa");
    assert_eq!(package.initial_quantity, 15);
    assert_eq!(package.available_quantity, 15);
    assert_eq!(package.total_paid, dec("800"));
    assert_eq!(package.unit_price, dec("53.33"));
    // a carteira pertence à venda que a criou, não à emissão aditiva
    assert_eq!(package.sale_id, Some(first_id));

    sale_service
        .cancel_sale(&state.db_pool, second_id)
        .await
        .expect("cancel segunda");

    let package = repo
        .find_active(&state.db_pool, client, service)
        .await
        .unwrap()
        .expect("segue ativa");
    assert_eq!(package.initial_quantity, 10);
    assert_eq!(package.available_quantity, 10);
    assert_eq!(package.total_paid, dec("500"));
    assert_eq!(package.unit_price, dec("50.00"));
}

// Cancelar a compra depois de parte dos créditos já consumida deixa o saldo
// negativo (dívida visível) e desativa a carteira que a venda criou.
#[tokio::test]
async fn cancel_purchase_after_consumption_leaves_negative_balance() {
    let state = state().await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let purchase_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;
    let consumption_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-04"),
        &[(SaleType::PackageConsumption, Some(service), 8, "400", "400")],
    )
    .await;

    let sale_service = state.sale_service();
    sale_service
        .confirm_sale(&state.db_pool, purchase_id)
        .await
        .expect("confirm compra");
    sale_service
        .confirm_sale(&state.db_pool, consumption_id)
        .await
        .expect("confirm consumo");
    sale_service
        .cancel_sale(&state.db_pool, purchase_id)
        .await
        .expect("cancel compra");

    let package_id = PackageRepository::new()
        .consumptions_by_sale(&state.db_pool, consumption_id)
        .await
        .unwrap()[0]
        .package_id;
    let package = PackageRepository::new()
        .find_by_id(&state.db_pool, package_id)
        .await
        .unwrap()
        .unwrap();
    assert!(!package.is_active);
    assert_eq!(package.initial_quantity, 0);
    assert_eq!(package.consumed_quantity, 8);
    assert_eq!(package.available_quantity, -8);

    // initial - consumed continua batendo mesmo no vermelho
    let mut conn = state.db_pool.acquire().await.unwrap();
    let drifts = state
        .wallet_service()
        .verify_invariants(&mut conn, client)
        .await
        .unwrap();
    assert!(drifts.is_empty());
}

// =============================================================================
//  Forma dos DTOs (consumida pela camada HTTP, fora deste crate)
// =============================================================================

#[tokio::test]
async fn statement_serializes_in_camel_case() {
    let state = state().await;
    seed_day_policies(&state).await;

    let client = Uuid::new_v4();
    let service = Uuid::new_v4();
    let purchase_id = seed_sale(
        &state,
        client,
        Uuid::new_v4(),
        date("2026-03-03"),
        &[(SaleType::PackagePurchase, Some(service), 10, "500", "500")],
    )
    .await;
    state
        .sale_service()
        .confirm_sale(&state.db_pool, purchase_id)
        .await
        .unwrap();

    // o ledger de consumos da venda fica acessível por pacote também
    let package_id = PackageRepository::new()
        .find_active(&state.db_pool, client, service)
        .await
        .unwrap()
        .unwrap()
        .id;
    let consumptions = PackageRepository::new()
        .consumptions_by_package(&state.db_pool, package_id)
        .await
        .unwrap();
    assert!(consumptions.is_empty());

    let mut conn = state.db_pool.acquire().await.unwrap();
    let entries = state
        .statement_service()
        .client_statement(&mut conn, client)
        .await
        .unwrap();

    let json = serde_json::to_value(&entries[0]).unwrap();
    assert_eq!(json["kind"], "purchase");
    assert_eq!(json["balanceAfter"], 10);
    assert!(json.get("occurredAt").is_some());
    assert!(json.get("serviceId").is_some());
}
