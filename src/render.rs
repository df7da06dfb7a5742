//! Plain-text rendering for terminal output.
//!
//! Money follows the es-CO peso convention (`$ 80.000`), meter values use two
//! decimals with a comma (`1.234,50`).

use rust_decimal::{Decimal, RoundingStrategy};

use crate::aggregator::{BalancePreview, CasinoPreview, ParticipationPreview};
use crate::models::{
    CasinoBalance, CasinoDetailedReport, CategoryTotals, CounterSnapshot, FilteredReport, Machine,
    MachineBalance, MachineCounterSummary,
};
use crate::views::{CasinoView, MachineView, ParticipationView};

/// Append one formatted line to a `String`.
macro_rules! push_line {
    ($out:expr, $($arg:tt)*) => {{
        $out.push_str(&format!($($arg)*));
        $out.push('\n');
    }};
}

fn group_thousands(digits: &str) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push('.');
        }
        out.push(c);
    }
    out
}

fn split_rounded(value: Decimal, places: u32) -> (bool, String, String) {
    let rounded = value.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero);
    let negative = rounded.is_sign_negative() && !rounded.is_zero();
    let text = rounded.abs().to_string();
    let (int, frac) = text.split_once('.').unwrap_or((text.as_str(), ""));
    let mut frac = frac.to_string();
    while frac.len() < places as usize {
        frac.push('0');
    }
    (negative, group_thousands(int), frac)
}

/// `$ 80.000`, `-$ 40.000`.
pub fn format_cop(value: Decimal) -> String {
    let (negative, int, _) = split_rounded(value, 0);
    format!("{}$ {}", if negative { "-" } else { "" }, int)
}

/// `1.234,50`
pub fn format_number(value: Decimal) -> String {
    let (negative, int, frac) = split_rounded(value, 2);
    format!("{}{},{}", if negative { "-" } else { "" }, int, frac)
}

/// `IGT • Sphinx • A-100`, or a fallback when nothing is set.
pub fn machine_label(machine: &Machine) -> String {
    let parts: Vec<&str> = [&machine.marca, &machine.modelo, &machine.serial]
        .into_iter()
        .filter_map(|p| p.as_deref().map(str::trim).filter(|p| !p.is_empty()))
        .collect();
    if parts.is_empty() {
        format!("Máquina {}", machine.id)
    } else {
        parts.join(" • ")
    }
}

fn summary_label(line: &MachineCounterSummary) -> String {
    let name = line
        .machine_serial
        .clone()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| format!("ID {}", line.machine_id));
    let detail: Vec<&str> = [&line.machine_marca, &line.machine_modelo]
        .into_iter()
        .filter_map(|p| p.as_deref().filter(|p| !p.is_empty()))
        .collect();
    if detail.is_empty() {
        name
    } else {
        format!("{name} ({})", detail.join(" • "))
    }
}

pub fn render_counters(rows: &[CounterSnapshot]) -> String {
    if rows.is_empty() {
        return "No hay registros de contadores en este rango.\n".to_string();
    }
    let mut out = String::new();
    push_line!(
        out,
        "{:<20} {:>8} {:>16} {:>16} {:>16} {:>16}",
        "FECHA/HORA", "MÁQUINA", "IN", "OUT", "JACKPOT", "BILLETERO"
    );
    for r in rows {
        push_line!(
            out,
            "{:<20} {:>8} {:>16} {:>16} {:>16} {:>16}",
            r.at.as_deref().unwrap_or("-"),
            r.machine_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            format_number(r.in_amount),
            format_number(r.out_amount),
            format_number(r.jackpot_amount),
            format_number(r.billetero_amount),
        );
    }
    out
}

pub fn render_preview(preview: &BalancePreview) -> String {
    let mut out = String::new();
    let rows = [
        ("Total IN estimado", preview.in_total, Some(preview.in_delta)),
        ("Total OUT estimado", preview.out_total, Some(preview.out_delta)),
        ("Total JACKPOT", preview.jackpot_total, Some(preview.jackpot_delta)),
        ("Total BILLETERO", preview.billetero_total, Some(preview.billetero_delta)),
        ("Utilidad estimada", preview.utilidad_total, None),
    ];
    for (label, amount, delta) in rows {
        match delta {
            Some(delta) => push_line!(
                out,
                "{:<20} {:>18}   Δ Contador: {}",
                label,
                format_cop(amount),
                format_number(delta)
            ),
            None => push_line!(out, "{:<20} {:>18}", label, format_cop(amount)),
        }
    }
    push_line!(
        out,
        "Basada en denominación {} ({} lecturas, {} → {})",
        format_number(preview.denomination.get()),
        preview.snapshots,
        preview.initial_at.format("%Y-%m-%d %H:%M:%S"),
        preview.final_at.format("%Y-%m-%d %H:%M:%S"),
    );
    out
}

pub fn render_machine_view(view: &MachineView) -> String {
    let mut out = String::new();
    push_line!(out, "Máquina: {}", machine_label(&view.machine));
    push_line!(out, "Periodo: {}\n", view.period);
    out.push_str(&render_counters(&view.snapshots));
    out.push('\n');
    match &view.preview {
        Some(p) => out.push_str(&render_preview(p)),
        None => out.push_str(
            "Vista previa no disponible: no hay contadores con fecha válida en el periodo.\n",
        ),
    }
    out
}

fn render_totals(out: &mut String, totals: &CategoryTotals) {
    push_line!(out, "{:<16} {:>18}", "Total IN", format_cop(totals.in_total));
    push_line!(out, "{:<16} {:>18}", "Total OUT", format_cop(totals.out_total));
    push_line!(out, "{:<16} {:>18}", "Total JACKPOT", format_cop(totals.jackpot_total));
    push_line!(out, "{:<16} {:>18}", "Total BILLETERO", format_cop(totals.billetero_total));
    push_line!(out, "{:<16} {:>18}", "Utilidad final", format_cop(totals.utilidad_final));
}

pub fn render_casino_preview(preview: &CasinoPreview) -> String {
    let mut out = String::new();
    push_line!(
        out,
        "{:<36} {:>16} {:>16} {:>16} {:>16}  ESTADO",
        "MÁQUINA", "IN", "OUT", "JACKPOT", "UTILIDAD"
    );
    for line in &preview.machines {
        let label = machine_label(&line.machine);
        match &line.preview {
            Some(p) => {
                push_line!(
                    out,
                    "{:<36} {:>16} {:>16} {:>16} {:>16}  Con datos",
                    label,
                    format_cop(p.in_total),
                    format_cop(p.out_total),
                    format_cop(p.jackpot_total),
                    format_cop(p.utilidad_total),
                );
            }
            None => {
                push_line!(out, "{:<36} {:>16} {:>16} {:>16} {:>16}  Sin registros", label, "-", "-", "-", "-");
            }
        }
    }
    out.push('\n');
    render_totals(&mut out, &preview.totals);
    push_line!(
        out,
        "Máquinas: {} · con datos {} · sin datos {}",
        preview.total_machines, preview.machines_with_data, preview.machines_without_data
    );
    out
}

pub fn render_casino_view(view: &CasinoView) -> String {
    format!(
        "Casino {} · Periodo {}\n\n{}",
        view.casino_id,
        view.period,
        render_casino_preview(&view.preview)
    )
}

pub fn render_participation(preview: &ParticipationPreview) -> String {
    let mut out = String::new();
    push_line!(out, "{:<10} {:>18} {:>18}", "MÁQUINA", "UTILIDAD", "PARTICIPACIÓN");
    for share in &preview.shares {
        push_line!(
            out,
            "{:<10} {:>18} {:>18}{}",
            share.machine_id,
            format_cop(share.utilidad_total),
            format_cop(share.participation_amount),
            if share.has_data { "" } else { "  (sin registros)" }
        );
    }
    push_line!(
        out,
        "\nUtilidad total {} · {}% → {}",
        format_cop(preview.utilidad_total),
        format_number(preview.percent),
        format_cop(preview.participation_total)
    );
    out
}

pub fn render_participation_view(view: &ParticipationView) -> String {
    format!("Periodo {}\n\n{}", view.period, render_participation(&view.preview))
}

pub fn render_machine_balance(b: &MachineBalance) -> String {
    let mut out = String::new();
    push_line!(
        out,
        "Cuadre #{} · máquina {} · {} → {} · {}",
        b.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
        b.machine_id,
        b.period_start,
        b.period_end,
        if b.locked { "Bloqueado" } else { "Editable" }
    );
    render_totals(
        &mut out,
        &CategoryTotals {
            in_total: b.in_total,
            out_total: b.out_total,
            jackpot_total: b.jackpot_total,
            billetero_total: b.billetero_total,
            utilidad_final: b.utilidad_total,
        },
    );
    if let Some(by) = &b.generated_by {
        push_line!(out, "Generado por {} {}", by, b.generated_at.as_deref().unwrap_or(""));
    }
    out
}

pub fn render_casino_balance(b: &CasinoBalance) -> String {
    let mut out = String::new();
    push_line!(
        out,
        "Cuadre general #{} · casino {} · {} → {} · {}",
        b.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
        b.place_id,
        b.period_start,
        b.period_end,
        if b.locked { "Bloqueado" } else { "Editable" }
    );
    render_totals(
        &mut out,
        &CategoryTotals {
            in_total: b.in_total,
            out_total: b.out_total,
            jackpot_total: b.jackpot_total,
            billetero_total: b.billetero_total,
            utilidad_final: b.utilidad_total,
        },
    );
    if let Some(by) = &b.generated_by {
        push_line!(out, "Generado por {} {}", by, b.generated_at.as_deref().unwrap_or(""));
    }
    out
}

pub fn render_machine_history(history: &[MachineBalance]) -> String {
    if history.is_empty() {
        return "Aún no hay cuadres registrados para esta máquina.\n".to_string();
    }
    let mut out = String::new();
    push_line!(
        out,
        "{:<6} {:<24} {:>16} {:>16} {:>16} {:>16}  ESTADO",
        "ID", "PERIODO", "IN", "OUT", "JACKPOT", "UTILIDAD"
    );
    for b in history {
        push_line!(
            out,
            "{:<6} {:<24} {:>16} {:>16} {:>16} {:>16}  {}",
            b.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            format!("{} → {}", b.period_start, b.period_end),
            format_cop(b.in_total),
            format_cop(b.out_total),
            format_cop(b.jackpot_total),
            format_cop(b.utilidad_total),
            if b.locked { "Bloqueado" } else { "Editable" }
        );
    }
    out
}

pub fn render_casino_history(history: &[CasinoBalance]) -> String {
    if history.is_empty() {
        return "Aún no hay cuadres generales para este casino.\n".to_string();
    }
    let mut out = String::new();
    push_line!(
        out,
        "{:<6} {:<24} {:>16} {:>16} {:>16} {:>16}  ESTADO",
        "ID", "PERIODO", "IN", "OUT", "JACKPOT", "UTILIDAD"
    );
    for b in history {
        push_line!(
            out,
            "{:<6} {:<24} {:>16} {:>16} {:>16} {:>16}  {}",
            b.id.map_or_else(|| "-".to_string(), |id| id.to_string()),
            format!("{} → {}", b.period_start, b.period_end),
            format_cop(b.in_total),
            format_cop(b.out_total),
            format_cop(b.jackpot_total),
            format_cop(b.utilidad_total),
            if b.locked { "Bloqueado" } else { "Editable" }
        );
    }
    out
}

fn render_summary_lines(out: &mut String, lines: &[MachineCounterSummary]) {
    for line in lines {
        push_line!(
            out,
            "{:<36} {:>16} {:>16} {:>16} {:>16}  {}",
            summary_label(line),
            format_cop(line.in_total),
            format_cop(line.out_total),
            format_cop(line.jackpot_total),
            format_cop(line.utilidad),
            if line.has_data { "Con datos" } else { "Sin registros" }
        );
    }
}

pub fn render_casino_report(report: &CasinoDetailedReport) -> String {
    let mut out = String::new();
    push_line!(
        out,
        "{} · Periodo {} → {}",
        report.casino_nombre.as_deref().unwrap_or("Casino"),
        report.period_start,
        report.period_end
    );
    render_summary_lines(&mut out, &report.machines_summary);
    out.push('\n');
    render_totals(&mut out, &report.category_totals);
    push_line!(
        out,
        "Máquinas: {} · procesadas {} · con datos {} · sin datos {}",
        report.total_machines,
        report.machines_processed,
        report.machines_with_data,
        report.machines_without_data
    );
    out
}

pub fn render_filtered_report(report: &FilteredReport) -> String {
    let mut out = String::new();
    push_line!(
        out,
        "Periodo {} → {} · Tipo {}",
        report.period_start,
        report.period_end,
        report.tipo_reporte.to_uppercase()
    );
    for casino in &report.casinos_included {
        push_line!(
            out,
            "  {} ({} máquinas)",
            casino.casino_nombre.as_deref().unwrap_or("-"),
            casino.total_machines
        );
    }
    if report.tipo_reporte.eq_ignore_ascii_case("detallado") && !report.machines_summary.is_empty() {
        out.push('\n');
        render_summary_lines(&mut out, &report.machines_summary);
    }
    out.push('\n');
    render_totals(&mut out, &report.category_totals);
    push_line!(
        out,
        "Máquinas: {} · procesadas {} · con datos {} · sin datos {}",
        report.total_machines,
        report.machines_processed,
        report.machines_with_data,
        report.machines_without_data
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn pesos_have_dot_thousands_and_no_decimals() {
        assert_eq!(format_cop(d("80000")), "$ 80.000");
        assert_eq!(format_cop(d("1234567.5")), "$ 1.234.568");
        assert_eq!(format_cop(d("999")), "$ 999");
        assert_eq!(format_cop(d("-40000")), "-$ 40.000");
        assert_eq!(format_cop(Decimal::ZERO), "$ 0");
        assert_eq!(format_cop(d("-0.4")), "$ 0");
    }

    #[test]
    fn numbers_have_comma_decimals() {
        assert_eq!(format_number(d("1234.5")), "1.234,50");
        assert_eq!(format_number(d("80")), "80,00");
        assert_eq!(format_number(d("-30.125")), "-30,13");
        assert_eq!(format_number(d("1000000")), "1.000.000,00");
    }

    #[test]
    fn machine_label_joins_known_parts() {
        let m: Machine = serde_json::from_value(serde_json::json!({
            "id": 4, "marca": "IGT", "modelo": "", "serial": "A-100"
        }))
        .unwrap();
        assert_eq!(machine_label(&m), "IGT • A-100");

        let bare: Machine = serde_json::from_value(serde_json::json!({"id": 9})).unwrap();
        assert_eq!(machine_label(&bare), "Máquina 9");
    }

    #[test]
    fn totals_render_one_line_each() {
        let mut out = String::new();
        render_totals(
            &mut out,
            &CategoryTotals {
                in_total: d("80000"),
                out_total: d("30000"),
                jackpot_total: d("10000"),
                billetero_total: d("5"),
                utilidad_final: d("40000"),
            },
        );
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 5);
        assert!(lines[0].starts_with("Total IN") && lines[0].ends_with("$ 80.000"));
        assert!(lines[4].ends_with("$ 40.000"));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn empty_counter_table_says_so() {
        assert!(render_counters(&[]).contains("No hay registros"));
    }
}
