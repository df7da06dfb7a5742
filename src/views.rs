use std::collections::BTreeSet;

use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::{
    order_snapshots, preview_balance, preview_casino, preview_participation, validate_participation,
    BalancePreview, CasinoPreview, Denomination, ParticipationPreview,
};
use crate::client::ApiClient;
use crate::error::{ConsoleError, Result};
use crate::models::{CounterSnapshot, Machine};
use crate::period::Period;

/// Everything shown on the per-machine balance screen.
#[derive(Debug, Clone, Serialize)]
pub struct MachineView {
    pub machine: Machine,
    pub period: Period,
    /// The machine's readings, oldest first, unusable timestamps dropped.
    pub snapshots: Vec<CounterSnapshot>,
    pub denomination: Denomination,
    pub preview: Option<BalancePreview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CasinoView {
    pub casino_id: i64,
    pub period: Period,
    pub preview: CasinoPreview,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipationView {
    pub period: Period,
    pub preview: ParticipationPreview,
}

/// Machine preview: machines of the casino, the casino's counters, then the calculator.
pub async fn machine_view(
    client: &ApiClient,
    casino_id: i64,
    machine_id: i64,
    period: Period,
) -> Result<MachineView> {
    let machines = client.list_machines(Some(casino_id), true).await?;
    let machine = machines
        .into_iter()
        .find(|m| m.id == machine_id)
        .ok_or_else(|| {
            ConsoleError::NotFound(format!("machine {machine_id} in casino {casino_id}"))
        })?;

    let rows: Vec<CounterSnapshot> = client
        .query_counters(casino_id, &period)
        .await?
        .into_iter()
        .filter(|row| row.machine_id == Some(machine_id))
        .collect();

    let denomination = Denomination::of(&machine);
    let preview = preview_balance(&rows, denomination);
    let snapshots: Vec<CounterSnapshot> = order_snapshots(&rows)
        .into_iter()
        .map(|(_, s)| s.clone())
        .collect();

    info!(
        "Machine {}: {} readings in {}, preview {}",
        machine_id,
        snapshots.len(),
        period,
        if preview.is_some() { "ready" } else { "unavailable" }
    );

    Ok(MachineView {
        machine,
        period,
        snapshots,
        denomination,
        preview,
    })
}

/// Casino preview over every active machine of the casino.
pub async fn casino_view(client: &ApiClient, casino_id: i64, period: Period) -> Result<CasinoView> {
    let (machines, rows) = tokio::try_join!(
        client.list_machines(Some(casino_id), true),
        client.query_counters(casino_id, &period),
    )?;

    let preview = preview_casino(&machines, &rows);
    info!(
        "Casino {}: {}/{} machines with data in {}",
        casino_id, preview.machines_with_data, preview.total_machines, period
    );

    Ok(CasinoView {
        casino_id,
        period,
        preview,
    })
}

/// Participation estimate across machines that may live in different casinos.
pub async fn participation_view(
    client: &ApiClient,
    machine_ids: &[i64],
    percent: Decimal,
    period: Period,
) -> Result<ParticipationView> {
    validate_participation(machine_ids, percent)?;

    let machines = client.list_machines(None, true).await?;
    let casinos: BTreeSet<i64> = machines
        .iter()
        .filter(|m| machine_ids.contains(&m.id))
        .filter_map(|m| m.casino_id)
        .collect();

    if casinos.is_empty() {
        warn!("None of the selected machines {:?} is active", machine_ids);
    }

    let rows: Vec<CounterSnapshot> = try_join_all(
        casinos
            .iter()
            .map(|&casino_id| client.query_counters(casino_id, &period)),
    )
    .await?
    .into_iter()
    .flatten()
    .collect();

    let preview = preview_participation(&machines, &rows, machine_ids, percent)?;
    Ok(ParticipationView { period, preview })
}
