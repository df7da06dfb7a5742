// src/models.rs
use crate::parser::{lenient_decimal, lenient_opt_decimal, lenient_opt_id};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A casino ("place") as listed by `/places/casino`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Casino {
    pub id: i64,
    #[serde(default, alias = "name")]
    pub nombre: Option<String>,
    #[serde(default, alias = "city")]
    pub ciudad: Option<String>,
    #[serde(default, alias = "description")]
    pub descripcion: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// A slot machine.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Machine {
    pub id: i64,
    #[serde(default)]
    pub marca: Option<String>,
    #[serde(default)]
    pub modelo: Option<String>,
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default)]
    pub asset: Option<String>,
    /// Raw denomination as sent; see [`crate::aggregator::Denomination::resolve`].
    #[serde(default, deserialize_with = "lenient_opt_decimal")]
    pub denominacion: Option<Decimal>,
    #[serde(default, alias = "place_id", deserialize_with = "lenient_opt_id")]
    pub casino_id: Option<i64>,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// One meter reading. Amounts are cumulative counters, not money.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CounterSnapshot {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "lenient_opt_id")]
    pub machine_id: Option<i64>,
    #[serde(default)]
    pub at: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub in_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub out_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub jackpot_amount: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub billetero_amount: Decimal,
}

/// Authoritative machine balance ("cuadre") stored by the backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineBalance {
    #[serde(default)]
    pub id: Option<i64>,
    pub machine_id: i64,
    pub period_start: String,
    pub period_end: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub in_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub out_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub jackpot_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub billetero_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub utilidad_total: Decimal,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

/// Authoritative casino-wide balance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CasinoBalance {
    #[serde(default)]
    pub id: Option<i64>,
    pub place_id: i64,
    pub period_start: String,
    pub period_end: String,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub in_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub out_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub jackpot_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub billetero_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub utilidad_total: Decimal,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub generated_by: Option<String>,
    #[serde(default)]
    pub locked: bool,
}

/// Consolidated totals over a set of machines.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CategoryTotals {
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub in_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub out_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub jackpot_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub billetero_total: Decimal,
    /// `in_total - (out_total + jackpot_total)`
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub utilidad_final: Decimal,
}

/// Per-machine line of a consolidated report.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MachineCounterSummary {
    pub machine_id: i64,
    #[serde(default)]
    pub casino_id: Option<i64>,
    #[serde(default)]
    pub casino_nombre: Option<String>,
    #[serde(default)]
    pub machine_marca: Option<String>,
    #[serde(default)]
    pub machine_modelo: Option<String>,
    #[serde(default)]
    pub machine_serial: Option<String>,
    #[serde(default)]
    pub machine_asset: Option<String>,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub denominacion: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub in_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub out_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub jackpot_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub billetero_total: Decimal,
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub utilidad: Decimal,
    #[serde(default = "default_true")]
    pub has_data: bool,
    #[serde(default)]
    pub error: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Server-side consolidated report for one casino.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CasinoDetailedReport {
    pub casino_id: i64,
    #[serde(default)]
    pub casino_nombre: Option<String>,
    pub period_start: String,
    pub period_end: String,
    #[serde(default)]
    pub machines_summary: Vec<MachineCounterSummary>,
    #[serde(default)]
    pub category_totals: CategoryTotals,
    #[serde(default)]
    pub total_machines: u32,
    #[serde(default)]
    pub machines_processed: u32,
    #[serde(default)]
    pub machines_with_data: u32,
    #[serde(default)]
    pub machines_without_data: u32,
    #[serde(default)]
    pub generated_at: Option<String>,
    #[serde(default)]
    pub generated_by: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IncludedCasino {
    pub casino_id: i64,
    #[serde(default)]
    pub casino_nombre: Option<String>,
    #[serde(default)]
    pub total_machines: u32,
}

/// Multi-casino report returned by `/balances/reportes/filtros`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FilteredReport {
    #[serde(default)]
    pub period_start: String,
    #[serde(default)]
    pub period_end: String,
    #[serde(default)]
    pub tipo_reporte: String,
    #[serde(default)]
    pub casinos_included: Vec<IncludedCasino>,
    #[serde(default)]
    pub machines_summary: Vec<MachineCounterSummary>,
    #[serde(default)]
    pub category_totals: CategoryTotals,
    #[serde(default)]
    pub total_machines: u32,
    #[serde(default)]
    pub machines_processed: u32,
    #[serde(default)]
    pub machines_with_data: u32,
    #[serde(default)]
    pub machines_without_data: u32,
    #[serde(default)]
    pub generated_at: Option<String>,
}

/// Result of `POST /login`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginResponse {
    pub id: i64,
    pub username: String,
    pub role: String,
    pub access_token: String,
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

// ---------- request bodies ----------

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CasinoInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CasinoInput {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.city.is_none() && self.description.is_none()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NewMachine {
    pub marca: String,
    pub modelo: String,
    pub serial: String,
    pub asset: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub denominacion: Decimal,
    pub place_id: i64,
    pub is_active: bool,
}

/// Partial machine update; only `Some` fields go over the wire.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MachineUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marca: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modelo: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "rust_decimal::serde::float_option"
    )]
    pub denominacion: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub casino_id: Option<i64>,
}

impl MachineUpdate {
    /// Drop fields equal to the current machine and trim text.
    pub fn diff_against(self, current: &Machine) -> Self {
        fn changed(new: Option<String>, old: &Option<String>) -> Option<String> {
            let new = new.map(|s| s.trim().to_string())?;
            if old.as_deref().map(str::trim) == Some(new.as_str()) {
                None
            } else {
                Some(new)
            }
        }

        Self {
            marca: changed(self.marca, &current.marca),
            modelo: changed(self.modelo, &current.modelo),
            serial: changed(self.serial, &current.serial),
            asset: changed(self.asset, &current.asset),
            denominacion: self.denominacion.filter(|d| Some(*d) != current.denominacion),
            casino_id: self.casino_id.filter(|id| Some(*id) != current.casino_id),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.marca.is_none()
            && self.modelo.is_none()
            && self.serial.is_none()
            && self.asset.is_none()
            && self.denominacion.is_none()
            && self.casino_id.is_none()
    }
}

/// Meter amounts typed by an operator.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CounterAmounts {
    #[serde(with = "rust_decimal::serde::float")]
    pub in_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub out_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub jackpot_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub billetero_amount: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCounter {
    pub casino_id: i64,
    pub machine_id: i64,
    pub at: String,
    #[serde(flatten)]
    pub amounts: CounterAmounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterCorrection {
    pub machine_id: i64,
    pub at: String,
    #[serde(flatten)]
    pub amounts: CounterAmounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct CounterCorrections {
    pub updates: Vec<CounterCorrection>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineBalanceRequest {
    pub machine_id: i64,
    pub period_start: String,
    pub period_end: String,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CasinoBalanceRequest {
    pub place_id: i64,
    pub period_start: String,
    pub period_end: String,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipationRequest {
    pub machine_ids: Vec<i64>,
    pub period_start: String,
    pub period_end: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub porcentaje_participacion: Decimal,
}
