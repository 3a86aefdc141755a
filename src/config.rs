// src/config.rs

use std::{env, str::FromStr, time::Duration};

use rust_decimal::Decimal;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};

use crate::common::error::AppError;
use crate::db::{
    CommissionRepository, HolidayRepository, PackageRepository, PolicyRepository, SaleRepository,
};
use crate::services::{
    CommissionService, PolicyAdminService, SaleService, StatementService, WalletService,
};

/// Configuração do núcleo, carregada do ambiente (arquivo .env suportado).
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    pub database_url: String,
    /// Taxa percentual de contingência aplicada quando nenhuma política casa.
    /// Explícita e configurável de propósito: é válvula de segurança, não
    /// default de negócio.
    pub fallback_commission_rate: Decimal,
    /// Espera máxima por lock do banco; estourou, vira erro de contenção
    /// (retryable) em vez de travar a transição.
    pub busy_timeout: Duration,
    pub max_connections: u32,
}

impl LedgerConfig {
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL deve ser definida"))?;

        let fallback_commission_rate = match env::var("FALLBACK_COMMISSION_RATE") {
            Ok(raw) => Decimal::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("FALLBACK_COMMISSION_RATE inválida: {e}"))?,
            Err(_) => Decimal::from(5),
        };

        let busy_timeout_ms = match env::var("DB_BUSY_TIMEOUT_MS") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("DB_BUSY_TIMEOUT_MS inválido: {e}"))?,
            Err(_) => 5_000,
        };

        let max_connections = match env::var("DB_MAX_CONNECTIONS") {
            Ok(raw) => raw
                .parse::<u32>()
                .map_err(|e| anyhow::anyhow!("DB_MAX_CONNECTIONS inválido: {e}"))?,
            Err(_) => 5,
        };

        Ok(Self {
            database_url,
            fallback_commission_rate,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            max_connections,
        })
    }

    /// Banco em memória, isolado — usado pelos testes.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            fallback_commission_rate: Decimal::from(5),
            busy_timeout: Duration::from_millis(5_000),
            // Em memória cada conexão seria um banco separado.
            max_connections: 1,
        }
    }
}

// O estado compartilhado que amarra pool + configuração e fabrica os services.
#[derive(Clone)]
pub struct AppState {
    pub db_pool: SqlitePool,
    pub config: LedgerConfig,
}

impl AppState {
    pub async fn new() -> Result<Self, AppError> {
        Self::with_config(LedgerConfig::from_env()?).await
    }

    pub async fn in_memory() -> Result<Self, AppError> {
        Self::with_config(LedgerConfig::in_memory()).await
    }

    pub async fn with_config(config: LedgerConfig) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let db_pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        sqlx::migrate!().run(&db_pool).await?;
        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

        Ok(Self { db_pool, config })
    }

    // --- Fábricas dos services, com as dependências já amarradas ---

    pub fn commission_service(&self) -> CommissionService {
        CommissionService::new(
            PolicyRepository::new(),
            HolidayRepository::new(),
            self.config.fallback_commission_rate,
        )
    }

    pub fn wallet_service(&self) -> WalletService {
        WalletService::new(PackageRepository::new())
    }

    pub fn sale_service(&self) -> SaleService {
        SaleService::new(
            SaleRepository::new(),
            CommissionRepository::new(),
            PackageRepository::new(),
            self.commission_service(),
            self.wallet_service(),
        )
    }

    pub fn policy_admin_service(&self) -> PolicyAdminService {
        PolicyAdminService::new(PolicyRepository::new())
    }

    pub fn statement_service(&self) -> StatementService {
        StatementService::new(SaleRepository::new(), PackageRepository::new())
    }
}

/// Inicializa o logger (idempotente para os testes).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_target(false).compact().try_init();
}
