use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

// Taxonomia de erros do ledger, com `thiserror` para melhor ergonomia.
// Erros "duros" abortam a transação inteira e sobem inalterados; a camada
// HTTP (fora deste crate) usa `kind()` para mapear o status correto.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Saldo insuficiente no pacote {package_id}: disponível {available}, solicitado {requested}")]
    InsufficientBalance {
        package_id: Uuid,
        available: i64,
        requested: i64,
    },

    #[error("Transição inválida: {0}")]
    InvalidTransition(String),

    #[error("Estorno de {requested} excede o total líquido atual de {net_total}")]
    RefundExceedsBalance {
        requested: Decimal,
        net_total: Decimal,
    },

    #[error("Exclusão bloqueada por dados dependentes: {0}")]
    DependentDataBlocksDelete(String),

    #[error("Venda não encontrada")]
    SaleNotFound,

    #[error("Nenhum pacote ativo para o cliente/serviço informado")]
    PackageNotFound,

    #[error("Política de comissão não encontrada")]
    PolicyNotFound,

    #[error("Política de comissão inválida: {0}")]
    InvalidPolicy(String),

    #[error("Política já referenciada por comissões: {0}")]
    PolicyImmutable(String),

    #[error("Item de venda inválido: {0}")]
    InvalidSaleItem(String),

    // Variante para erros de banco de dados (sqlx)
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro ao rodar migrações")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    // Variante genérica para qualquer outro erro inesperado.
    // `anyhow::Error` é ótimo para capturar o contexto do erro.
    #[error("Erro interno")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    /// Discriminante estável, consumido pela camada HTTP (fora deste crate)
    /// para traduzir cada erro no status adequado.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::InsufficientBalance { .. } => "insufficient_balance",
            AppError::InvalidTransition(_) => "invalid_transition",
            AppError::RefundExceedsBalance { .. } => "refund_exceeds_balance",
            AppError::DependentDataBlocksDelete(_) => "dependent_data_blocks_delete",
            AppError::SaleNotFound => "sale_not_found",
            AppError::PackageNotFound => "package_not_found",
            AppError::PolicyNotFound => "policy_not_found",
            AppError::InvalidPolicy(_) => "invalid_policy",
            AppError::PolicyImmutable(_) => "policy_immutable",
            AppError::InvalidSaleItem(_) => "invalid_sale_item",
            AppError::DatabaseError(_) => "storage_error",
            AppError::MigrationError(_) => "storage_error",
            AppError::InternalServerError(_) => "internal_error",
        }
    }
}
