use std::collections::{HashMap, HashSet};

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ConsoleError, Result};
use crate::models::{CategoryTotals, CounterSnapshot, Machine};
use crate::parser::parse_timestamp;

/// Monetary value of one meter unit.
///
/// Never zero or negative: anything unusable resolves to 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Denomination(Decimal);

impl Denomination {
    pub fn resolve(raw: Option<Decimal>) -> Self {
        match raw {
            Some(d) if d > Decimal::ZERO => Self(d),
            _ => Self(Decimal::ONE),
        }
    }

    pub fn of(machine: &Machine) -> Self {
        Self::resolve(machine.denominacion)
    }

    pub fn get(self) -> Decimal {
        self.0
    }
}

impl Default for Denomination {
    fn default() -> Self {
        Self(Decimal::ONE)
    }
}

/// Client-side estimate of a machine balance over a period.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalancePreview {
    pub in_delta: Decimal,
    pub out_delta: Decimal,
    pub jackpot_delta: Decimal,
    pub billetero_delta: Decimal,
    pub in_total: Decimal,
    pub out_total: Decimal,
    pub jackpot_total: Decimal,
    pub billetero_total: Decimal,
    pub utilidad_total: Decimal,
    pub denomination: Denomination,
    pub initial_at: NaiveDateTime,
    pub final_at: NaiveDateTime,
    pub snapshots: usize,
}

/// Drop snapshots without a usable timestamp and sort the rest, oldest first.
///
/// The sort is stable: readings with the same timestamp keep input order.
pub fn order_snapshots(snapshots: &[CounterSnapshot]) -> Vec<(NaiveDateTime, &CounterSnapshot)> {
    let mut ordered: Vec<_> = snapshots
        .iter()
        .filter_map(|s| {
            let at = s.at.as_deref().and_then(parse_timestamp);
            if at.is_none() {
                debug!("Skipping counter {:?} with unusable timestamp {:?}", s.id, s.at);
            }
            at.map(|at| (at, s))
        })
        .collect();
    ordered.sort_by_key(|(at, _)| *at);
    ordered
}

/// First-to-last meter deltas monetized by `denomination`.
///
/// `None` when no snapshot carries a parseable timestamp, or when the amounts
/// are too large to monetize. A single snapshot is both initial and final, so
/// every delta is zero.
pub fn preview_balance(
    snapshots: &[CounterSnapshot],
    denomination: Denomination,
) -> Option<BalancePreview> {
    let ordered = order_snapshots(snapshots);
    if ordered.is_empty() {
        return None;
    }

    let preview = settle(&ordered, denomination);
    if preview.is_none() {
        warn!(
            "Counters of machine {:?} overflow at denomination {}; no preview",
            ordered[0].1.machine_id,
            denomination.get()
        );
    }
    preview
}

/// Checked arithmetic over an ordered, non-empty snapshot list.
fn settle(
    ordered: &[(NaiveDateTime, &CounterSnapshot)],
    denomination: Denomination,
) -> Option<BalancePreview> {
    let (initial_at, initial) = *ordered.first()?;
    let (final_at, last) = *ordered.last()?;

    let d = denomination.get();
    let in_delta = last.in_amount.checked_sub(initial.in_amount)?;
    let out_delta = last.out_amount.checked_sub(initial.out_amount)?;
    let jackpot_delta = last.jackpot_amount.checked_sub(initial.jackpot_amount)?;
    let billetero_delta = last.billetero_amount.checked_sub(initial.billetero_amount)?;

    let in_total = in_delta.checked_mul(d)?;
    let out_total = out_delta.checked_mul(d)?;
    let jackpot_total = jackpot_delta.checked_mul(d)?;

    Some(BalancePreview {
        in_delta,
        out_delta,
        jackpot_delta,
        billetero_delta,
        in_total,
        out_total,
        jackpot_total,
        billetero_total: billetero_delta.checked_mul(d)?,
        // billetero is a cash-box figure, not part of the win
        utilidad_total: in_total.checked_sub(out_total.checked_add(jackpot_total)?)?,
        denomination,
        initial_at,
        final_at,
        snapshots: ordered.len(),
    })
}

/// Preview line for one machine inside a casino preview.
#[derive(Debug, Clone, Serialize)]
pub struct MachinePreview {
    pub machine: Machine,
    pub denomination: Denomination,
    pub preview: Option<BalancePreview>,
}

impl MachinePreview {
    pub fn has_data(&self) -> bool {
        self.preview.is_some()
    }
}

/// Client-side consolidation of every machine of a casino.
#[derive(Debug, Clone, Serialize)]
pub struct CasinoPreview {
    pub machines: Vec<MachinePreview>,
    pub totals: CategoryTotals,
    pub total_machines: usize,
    pub machines_with_data: usize,
    pub machines_without_data: usize,
}

fn group_by_machine(snapshots: &[CounterSnapshot]) -> HashMap<i64, Vec<CounterSnapshot>> {
    let mut grouped: HashMap<i64, Vec<CounterSnapshot>> = HashMap::new();
    for snapshot in snapshots {
        if let Some(id) = snapshot.machine_id {
            grouped.entry(id).or_default().push(snapshot.clone());
        }
    }
    grouped
}

/// Run the delta calculator for each listed machine and add up the results.
pub fn preview_casino(machines: &[Machine], snapshots: &[CounterSnapshot]) -> CasinoPreview {
    let grouped = group_by_machine(snapshots);
    let mut totals = CategoryTotals::default();

    let lines: Vec<MachinePreview> = machines
        .iter()
        .map(|machine| {
            let denomination = Denomination::of(machine);
            let preview = grouped
                .get(&machine.id)
                .and_then(|rows| preview_balance(rows, denomination));

            if let Some(p) = &preview {
                totals.in_total = totals.in_total.saturating_add(p.in_total);
                totals.out_total = totals.out_total.saturating_add(p.out_total);
                totals.jackpot_total = totals.jackpot_total.saturating_add(p.jackpot_total);
                totals.billetero_total = totals.billetero_total.saturating_add(p.billetero_total);
            }

            MachinePreview {
                machine: machine.clone(),
                denomination,
                preview,
            }
        })
        .collect();

    totals.utilidad_final = totals
        .in_total
        .saturating_sub(totals.out_total.saturating_add(totals.jackpot_total));

    let with_data = lines.iter().filter(|l| l.has_data()).count();
    CasinoPreview {
        total_machines: lines.len(),
        machines_with_data: with_data,
        machines_without_data: lines.len() - with_data,
        machines: lines,
        totals,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipationShare {
    pub machine_id: i64,
    pub utilidad_total: Decimal,
    pub participation_amount: Decimal,
    pub has_data: bool,
}

/// Revenue-sharing estimate over a selection of machines.
#[derive(Debug, Clone, Serialize)]
pub struct ParticipationPreview {
    pub percent: Decimal,
    pub shares: Vec<ParticipationShare>,
    pub utilidad_total: Decimal,
    pub participation_total: Decimal,
    pub machines_without_data: Vec<i64>,
}

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

pub fn validate_participation(selected: &[i64], percent: Decimal) -> Result<()> {
    if selected.is_empty() {
        return Err(ConsoleError::validation(
            "Selecciona al menos una máquina para calcular la participación",
        ));
    }
    if percent < Decimal::ZERO || percent > HUNDRED {
        return Err(ConsoleError::validation(
            "El porcentaje de participación debe estar entre 0 y 100",
        ));
    }
    Ok(())
}

/// Drop repeated machine ids, keeping first-seen order.
pub fn unique_machines(selected: &[i64]) -> Vec<i64> {
    let mut seen = HashSet::with_capacity(selected.len());
    selected.iter().copied().filter(|id| seen.insert(*id)).collect()
}

/// Scale each selected machine's previewed profit by `percent`.
///
/// A machine selected twice is counted once.
///
/// Unknown machines and machines without readings contribute zero and are
/// reported in `machines_without_data`.
pub fn preview_participation(
    machines: &[Machine],
    snapshots: &[CounterSnapshot],
    selected: &[i64],
    percent: Decimal,
) -> Result<ParticipationPreview> {
    validate_participation(selected, percent)?;

    let grouped = group_by_machine(snapshots);
    let by_id: HashMap<i64, &Machine> = machines.iter().map(|m| (m.id, m)).collect();
    let rate = percent / HUNDRED;

    let selected = unique_machines(selected);
    let mut shares = Vec::with_capacity(selected.len());
    let mut missing = Vec::new();

    for machine_id in selected {
        let preview = by_id.get(&machine_id).and_then(|machine| {
            grouped
                .get(&machine_id)
                .and_then(|rows| preview_balance(rows, Denomination::of(machine)))
        });

        let utilidad = preview.as_ref().map_or(Decimal::ZERO, |p| p.utilidad_total);
        if preview.is_none() {
            missing.push(machine_id);
        }

        shares.push(ParticipationShare {
            machine_id,
            utilidad_total: utilidad,
            participation_amount: utilidad.saturating_mul(rate),
            has_data: preview.is_some(),
        });
    }

    let utilidad_total = shares
        .iter()
        .fold(Decimal::ZERO, |acc, s| acc.saturating_add(s.utilidad_total));

    Ok(ParticipationPreview {
        percent,
        participation_total: utilidad_total.saturating_mul(rate),
        utilidad_total,
        shares,
        machines_without_data: missing,
    })
}
