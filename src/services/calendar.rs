// src/services/calendar.rs

use std::collections::HashSet;

use chrono::{Datelike, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};

/// Classificação de uma data para fins de política de comissão.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayKind {
    Weekday,
    WeekendHoliday,
}

/// Conjunto de feriados ativos (carregado de `holidays` pelo repositório).
#[derive(Debug, Clone, Default)]
pub struct HolidaySet {
    dates: HashSet<NaiveDate>,
}

impl HolidaySet {
    pub fn from_dates(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            dates: dates.into_iter().collect(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.dates.contains(&date)
    }
}

/// Sábado, domingo ou feriado ativo → `WeekendHoliday`; o resto é dia útil.
/// Função pura, sem efeitos colaterais.
pub fn classify(date: NaiveDate, holidays: &HolidaySet) -> DayKind {
    match date.weekday() {
        Weekday::Sat | Weekday::Sun => DayKind::WeekendHoliday,
        _ if holidays.contains(date) => DayKind::WeekendHoliday,
        _ => DayKind::Weekday,
    }
}
