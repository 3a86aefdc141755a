// src/services/policy_admin.rs
//
// Ciclo de vida das políticas. Política já referenciada por comissão é
// imutável: não existe update de kind/value — só fechar a janela, desativar
// ou substituir (fechar + criar) em uma transação.

use chrono::{Days, NaiveDate};
use sqlx::{Acquire, Sqlite};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::PolicyRepository,
    models::policy::{CommissionPolicy, NewCommissionPolicy, PolicyScope},
};

#[derive(Clone)]
pub struct PolicyAdminService {
    policy_repo: PolicyRepository,
}

impl PolicyAdminService {
    pub fn new(policy_repo: PolicyRepository) -> Self {
        Self { policy_repo }
    }

    fn validate(new: &NewCommissionPolicy) -> Result<(), AppError> {
        if new.value < rust_decimal::Decimal::ZERO {
            return Err(AppError::InvalidPolicy("valor não pode ser negativo".into()));
        }
        if let Some(until) = new.valid_until {
            if until < new.valid_from {
                return Err(AppError::InvalidPolicy(
                    "valid_until anterior a valid_from".into(),
                ));
            }
        }
        let needs_user = matches!(new.scope, PolicyScope::User | PolicyScope::UserProduct);
        let needs_product = matches!(new.scope, PolicyScope::Product | PolicyScope::UserProduct);
        if needs_user && new.user_id.is_none() {
            return Err(AppError::InvalidPolicy(
                "escopo por usuário exige user_id".into(),
            ));
        }
        if needs_product && new.product_id.is_none() {
            return Err(AppError::InvalidPolicy(
                "escopo por produto exige product_id".into(),
            ));
        }
        Ok(())
    }

    pub async fn create_policy<'a, A>(
        &self,
        conn: A,
        new: NewCommissionPolicy,
    ) -> Result<CommissionPolicy, AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        Self::validate(&new)?;
        let mut tx = conn.begin().await?;
        let policy = self.policy_repo.insert(&mut *tx, &new).await?;
        tx.commit().await?;

        tracing::info!(policy_id = %policy.id, name = %policy.name, "política de comissão criada");
        Ok(policy)
    }

    /// Fecha a janela de validade; a política segue valendo até `last_day`.
    pub async fn close_policy<'a, A>(
        &self,
        conn: A,
        policy_id: Uuid,
        last_day: NaiveDate,
    ) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;
        self.policy_repo.close(&mut *tx, policy_id, last_day).await?;
        tx.commit().await?;

        tracing::info!(%policy_id, %last_day, "política de comissão encerrada");
        Ok(())
    }

    /// Substitui uma política: fecha a antiga no dia anterior ao início da nova
    /// e cria a nova, atomicamente. É o único jeito de "alterar" valor/tipo.
    pub async fn supersede_policy<'a, A>(
        &self,
        conn: A,
        policy_id: Uuid,
        replacement: NewCommissionPolicy,
    ) -> Result<CommissionPolicy, AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        Self::validate(&replacement)?;
        let mut tx = conn.begin().await?;

        let old = self
            .policy_repo
            .find_by_id(&mut *tx, policy_id)
            .await?
            .ok_or(AppError::PolicyNotFound)?;

        let last_day = replacement
            .valid_from
            .checked_sub_days(Days::new(1))
            .ok_or_else(|| AppError::InvalidPolicy("valid_from fora do calendário".into()))?;
        if last_day < old.valid_from {
            return Err(AppError::InvalidPolicy(
                "a substituta precisa começar depois do início da antiga".into(),
            ));
        }

        self.policy_repo.close(&mut *tx, policy_id, last_day).await?;
        let created = self.policy_repo.insert(&mut *tx, &replacement).await?;

        tx.commit().await?;

        tracing::info!(
            old_policy_id = %policy_id,
            new_policy_id = %created.id,
            "política de comissão substituída"
        );
        Ok(created)
    }

    pub async fn deactivate_policy<'a, A>(
        &self,
        conn: A,
        policy_id: Uuid,
    ) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;
        self.policy_repo.set_active(&mut *tx, policy_id, false).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Exclusão só é permitida enquanto nenhuma comissão referencia a política.
    pub async fn delete_policy<'a, A>(
        &self,
        conn: A,
        policy_id: Uuid,
    ) -> Result<(), AppError>
    where
        A: Acquire<'a, Database = Sqlite>,
    {
        let mut tx = conn.begin().await?;
        if self.policy_repo.is_referenced(&mut *tx, policy_id).await? {
            return Err(AppError::PolicyImmutable(
                "política referenciada por comissões; encerre a vigência em vez de excluir".into(),
            ));
        }
        self.policy_repo.delete(&mut *tx, policy_id).await?;
        tx.commit().await?;

        tracing::info!(%policy_id, "política de comissão excluída");
        Ok(())
    }
}
