// src/db/holiday_repo.rs

use chrono::NaiveDate;
use sqlx::{Executor, Row, Sqlite};

use crate::{common::error::AppError, services::calendar::HolidaySet};

#[derive(Debug, Clone, Default)]
pub struct HolidayRepository;

impl HolidayRepository {
    pub fn new() -> Self {
        Self
    }

    /// Carrega o conjunto de feriados ativos para o classificador de dia.
    pub async fn load_active<'e, E>(&self, executor: E) -> Result<HolidaySet, AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let rows = sqlx::query("SELECT holiday_date FROM holidays WHERE is_active = 1")
            .fetch_all(executor)
            .await?;

        let mut dates = Vec::with_capacity(rows.len());
        for row in &rows {
            dates.push(row.try_get::<NaiveDate, _>("holiday_date")?);
        }
        Ok(HolidaySet::from_dates(dates))
    }

    pub async fn upsert<'e, E>(
        &self,
        executor: E,
        date: NaiveDate,
        name: &str,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query(
            r#"
            INSERT INTO holidays (holiday_date, name, is_active)
            VALUES (?1, ?2, 1)
            ON CONFLICT (holiday_date) DO UPDATE SET name = ?2, is_active = 1
            "#,
        )
        .bind(date)
        .bind(name)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// Feriado desativado deixa de contar como `weekend_holiday`.
    pub async fn deactivate<'e, E>(&self, executor: E, date: NaiveDate) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        sqlx::query("UPDATE holidays SET is_active = 0 WHERE holiday_date = ?1")
            .bind(date)
            .execute(executor)
            .await?;

        Ok(())
    }
}
