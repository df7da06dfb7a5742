use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::fmt;

use crate::error::{ConsoleError, Result};

/// Inclusive range of calendar days a balance or report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Period {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ConsoleError::validation(
                "La fecha inicial no puede ser mayor a la fecha final",
            ));
        }
        Ok(Self { start, end })
    }

    /// First day of `today`'s month through `today`.
    pub fn current_month(today: NaiveDate) -> Self {
        let start = today.with_day(1).unwrap_or(today);
        Self { start, end: today }
    }

    /// Fill missing bounds from the current month, then validate.
    pub fn resolve(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> Result<Self> {
        let default = Self::current_month(today);
        Self::new(from.unwrap_or(default.start), to.unwrap_or(default.end))
    }

    pub fn start_param(&self) -> String {
        self.start.format("%Y-%m-%d").to_string()
    }

    pub fn end_param(&self) -> String {
        self.end.format("%Y-%m-%d").to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} → {}", self.start_param(), self.end_param())
    }
}
