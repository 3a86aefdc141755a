// src/lib.rs

//! Núcleo do livro-razão de comissões e saldos de pacotes: resolução e
//! cálculo de políticas de comissão, carteira pré-paga por
//! (cliente, serviço) e ciclo de vida de vendas (confirmar, cancelar,
//! reembolsar, reagendar, excluir), com extratos derivados dos fatos
//! registrados.

pub mod common;
pub mod config;
pub mod db;
pub mod models;
pub mod services;

pub use common::error::AppError;
pub use config::{AppState, LedgerConfig, init_tracing};
