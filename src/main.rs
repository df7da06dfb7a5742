use std::path::PathBuf;

use casino_console::aggregator::unique_machines;
use casino_console::client::{
    participation_file_name, report_file_name, ExportFormat, ReportFilters, ReportKind,
};
use casino_console::config::{self, Config};
use casino_console::db::{self, StoredSession};
use casino_console::models::{
    CasinoInput, CounterAmounts, CounterCorrection, MachineUpdate, NewCounter, NewMachine,
    ParticipationRequest,
};
use casino_console::parser::{parse_datetime_input, to_backend_datetime, written_day};
use casino_console::period::Period;
use casino_console::{render, views, ApiClient, ConsoleError};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use eyre::{eyre, Result, WrapErr};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "casino-console")]
#[command(about = "Casino operations console: counters, balance previews and reports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Reporting period; missing bounds default to the current month.
#[derive(Args, Clone, Copy, Debug)]
struct PeriodArgs {
    /// First day (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
}

impl PeriodArgs {
    fn resolve(self) -> casino_console::Result<Period> {
        Period::resolve(self.from, self.to, Local::now().date_naive())
    }
}

#[derive(Args, Clone, Copy, Debug)]
struct AmountArgs {
    #[arg(long = "in", default_value = "0")]
    in_amount: Decimal,
    #[arg(long = "out", default_value = "0")]
    out_amount: Decimal,
    #[arg(long = "jackpot", default_value = "0")]
    jackpot_amount: Decimal,
    #[arg(long = "billetero", default_value = "0")]
    billetero_amount: Decimal,
}

impl From<AmountArgs> for CounterAmounts {
    fn from(a: AmountArgs) -> Self {
        Self {
            in_amount: a.in_amount,
            out_amount: a.out_amount,
            jackpot_amount: a.jackpot_amount,
            billetero_amount: a.billetero_amount,
        }
    }
}

/// Server-rendered file output.
#[derive(Args, Clone, Debug)]
struct ExportArgs {
    /// Download the report in this format instead of printing it
    #[arg(long, value_enum)]
    export: Option<ExportFormat>,
    /// Where to write the export (defaults to a dated file name)
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and cache the session locally
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the cached session
    Logout,
    /// Show the signed-in user
    Whoami,

    /// List casinos
    Casinos {
        /// Include inactive casinos
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Register a casino
    CasinoCreate {
        #[arg(long)]
        name: String,
        #[arg(long)]
        city: String,
        #[arg(long)]
        description: Option<String>,
    },
    /// Edit a casino
    CasinoUpdate {
        #[arg(long)]
        casino: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        city: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    CasinoActivate {
        #[arg(long)]
        casino: i64,
    },
    CasinoDeactivate {
        #[arg(long)]
        casino: i64,
    },

    /// List machines, optionally of one casino
    Machines {
        #[arg(long)]
        casino: Option<i64>,
        /// Include inactive machines
        #[arg(long)]
        all: bool,
        #[arg(long)]
        json: bool,
    },
    /// Register a machine in a casino
    MachineCreate {
        #[arg(long)]
        casino: i64,
        #[arg(long)]
        marca: String,
        #[arg(long)]
        modelo: String,
        #[arg(long)]
        serial: String,
        #[arg(long)]
        asset: String,
        #[arg(long)]
        denominacion: Decimal,
    },
    /// Edit a machine; only changed fields are sent
    MachineUpdate {
        #[arg(long)]
        machine: i64,
        #[arg(long)]
        marca: Option<String>,
        #[arg(long)]
        modelo: Option<String>,
        #[arg(long)]
        serial: Option<String>,
        #[arg(long)]
        asset: Option<String>,
        #[arg(long)]
        denominacion: Option<Decimal>,
        /// Move the machine to another casino
        #[arg(long)]
        move_to: Option<i64>,
    },

    /// Counter readings of a casino in a period
    Counters {
        #[arg(long)]
        casino: i64,
        #[arg(long)]
        machine: Option<i64>,
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        json: bool,
    },
    /// Record a counter reading
    RecordCounter {
        #[arg(long)]
        casino: i64,
        #[arg(long)]
        machine: i64,
        /// Reading time, e.g. "2024-05-01 10:30" (defaults to now)
        #[arg(long)]
        at: Option<String>,
        #[command(flatten)]
        amounts: AmountArgs,
    },
    /// Correct an existing counter reading
    FixCounter {
        #[arg(long)]
        casino: i64,
        #[arg(long)]
        machine: i64,
        /// Timestamp of the reading being corrected, exactly as stored
        #[arg(long)]
        at: String,
        /// Day the reading belongs to (defaults to the day written in --at)
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        amounts: AmountArgs,
    },

    /// Client-side balance estimate for one machine
    Preview {
        #[arg(long)]
        casino: i64,
        #[arg(long)]
        machine: i64,
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        json: bool,
    },
    /// Client-side consolidated estimate for a casino
    CasinoPreview {
        #[arg(long)]
        casino: i64,
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        json: bool,
    },
    /// Ask the backend to compute and store a machine balance
    GenerateMachine {
        #[arg(long)]
        machine: i64,
        #[command(flatten)]
        period: PeriodArgs,
        /// Lock the balance so it is not recalculated
        #[arg(long)]
        locked: bool,
        #[arg(long)]
        json: bool,
    },
    /// Ask the backend to compute and store a casino balance
    GenerateCasino {
        #[arg(long)]
        casino: i64,
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        locked: bool,
        #[arg(long)]
        json: bool,
    },
    /// Recent balances of a machine
    MachineHistory {
        #[arg(long)]
        machine: i64,
        #[arg(long, default_value = "25")]
        limit: u32,
    },
    /// Balances of a casino in a period
    CasinoHistory {
        #[arg(long)]
        casino: i64,
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long, default_value = "50")]
        limit: u32,
    },
    /// Server consolidated report of a casino
    CasinoReport {
        #[arg(long)]
        casino: i64,
        #[command(flatten)]
        period: PeriodArgs,
        #[command(flatten)]
        export: ExportArgs,
        #[arg(long)]
        json: bool,
    },
    /// Multi-casino report with filters
    Report {
        #[command(flatten)]
        period: PeriodArgs,
        #[arg(long)]
        casino: Option<i64>,
        #[arg(long)]
        marca: Option<String>,
        #[arg(long)]
        modelo: Option<String>,
        #[arg(long, value_enum, default_value = "detallado")]
        kind: ReportKind,
        #[command(flatten)]
        export: ExportArgs,
        #[arg(long)]
        json: bool,
    },
    /// Participation (revenue share) report over selected machines
    Participation {
        /// Comma-separated machine ids
        #[arg(long, value_delimiter = ',', required = true)]
        machines: Vec<i64>,
        /// Share in percent, 0 to 100
        #[arg(long, default_value = "30")]
        percent: Decimal,
        #[command(flatten)]
        period: PeriodArgs,
        /// Compute locally from counters instead of asking the backend
        #[arg(long)]
        estimate: bool,
        #[command(flatten)]
        export: ExportArgs,
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Balance and report commands, hidden from operators.
    fn is_advanced(&self) -> bool {
        matches!(
            self,
            Self::Preview { .. }
                | Self::CasinoPreview { .. }
                | Self::GenerateMachine { .. }
                | Self::GenerateCasino { .. }
                | Self::MachineHistory { .. }
                | Self::CasinoHistory { .. }
                | Self::CasinoReport { .. }
                | Self::Report { .. }
                | Self::Participation { .. }
        )
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn save_export(bytes: Vec<u8>, output: Option<PathBuf>, default_name: String) -> Result<()> {
    let path = output.unwrap_or_else(|| PathBuf::from(default_name));
    tokio::fs::write(&path, &bytes)
        .await
        .wrap_err_with(|| format!("writing {}", path.display()))?;
    info!("Saved {} bytes to {}", bytes.len(), path.display());
    println!("{}", path.display());
    Ok(())
}

async fn run(command: Commands, cfg: &Config, conn: &Connection) -> Result<()> {
    let client = ApiClient::new(cfg)?;

    match &command {
        Commands::Login { username, password } => {
            let login = client
                .login(username, password)
                .await
                .wrap_err("login failed")?;
            let session = db::save_session(conn, &login)?;
            info!("Session stored for {}", session.username);
            println!("Bienvenido {} ({})", session.username, session.role);
            return Ok(());
        }
        Commands::Logout => {
            if db::clear_session(conn)? {
                println!("Sesión cerrada");
            } else {
                println!("No había una sesión activa");
            }
            return Ok(());
        }
        _ => {}
    }

    let session: StoredSession = db::load_session(conn)?.ok_or(ConsoleError::NotAuthenticated)?;
    if command.is_advanced() && session.is_operator() {
        return Err(ConsoleError::Forbidden(format!(
            "el rol {} no tiene acceso a cuadres ni reportes",
            session.role
        ))
        .into());
    }
    let client = client.with_token(&session.access_token);

    match command {
        Commands::Login { .. } | Commands::Logout => unreachable!("handled above"),

        Commands::Whoami => {
            println!(
                "{} · rol {} · sesión desde {}",
                session.username,
                session.role,
                session.logged_in_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }

        Commands::Casinos { all, json } => {
            let casinos = client.list_casinos(!all).await?;
            if json {
                return print_json(&casinos);
            }
            for c in casinos {
                println!(
                    "{:>4}  {:<30} {:<20} {}",
                    c.id,
                    c.nombre.as_deref().unwrap_or("-"),
                    c.ciudad.as_deref().unwrap_or("-"),
                    if c.is_active == Some(false) { "inactivo" } else { "activo" }
                );
            }
        }
        Commands::CasinoCreate { name, city, description } => {
            let input = CasinoInput {
                name: Some(name),
                city: Some(city),
                description,
            };
            print_json(&client.create_casino(&input).await?)?;
        }
        Commands::CasinoUpdate { casino, name, city, description } => {
            let input = CasinoInput { name, city, description };
            print_json(&client.update_casino(casino, &input).await?)?;
        }
        Commands::CasinoActivate { casino } => {
            print_json(&client.set_casino_active(casino, true).await?)?;
        }
        Commands::CasinoDeactivate { casino } => {
            print_json(&client.set_casino_active(casino, false).await?)?;
        }

        Commands::Machines { casino, all, json } => {
            let machines = client.list_machines(casino, !all).await?;
            if json {
                return print_json(&machines);
            }
            for m in &machines {
                println!(
                    "{:>4}  {:<40} casino {:<4} denominación {}",
                    m.id,
                    render::machine_label(m),
                    m.casino_id.map_or_else(|| "-".to_string(), |id| id.to_string()),
                    render::format_number(casino_console::Denomination::of(m).get())
                );
            }
        }
        Commands::MachineCreate { casino, marca, modelo, serial, asset, denominacion } => {
            let machine = NewMachine {
                marca: marca.trim().to_string(),
                modelo: modelo.trim().to_string(),
                serial: serial.trim().to_string(),
                asset: asset.trim().to_string(),
                denominacion,
                place_id: casino,
                is_active: true,
            };
            print_json(&client.create_machine(&machine).await?)?;
        }
        Commands::MachineUpdate { machine, marca, modelo, serial, asset, denominacion, move_to } => {
            let current = client
                .list_machines(None, false)
                .await?
                .into_iter()
                .find(|m| m.id == machine)
                .ok_or_else(|| ConsoleError::NotFound(format!("machine {machine}")))?;
            let update = MachineUpdate {
                marca,
                modelo,
                serial,
                asset,
                denominacion,
                casino_id: move_to,
            };
            print_json(&client.update_machine(&current, update).await?)?;
        }

        Commands::Counters { casino, machine, period, json } => {
            let period = period.resolve()?;
            let mut rows = client.query_counters(casino, &period).await?;
            if let Some(id) = machine {
                rows.retain(|r| r.machine_id == Some(id));
            }
            if json {
                return print_json(&rows);
            }
            print!("{}", render::render_counters(&rows));
        }
        Commands::RecordCounter { casino, machine, at, amounts } => {
            let known = client.machines_by_casino(casino).await?;
            if !known.iter().any(|m| m.id == machine) {
                return Err(ConsoleError::NotFound(format!("machine {machine} in casino {casino}")).into());
            }
            let at = match at {
                Some(raw) => parse_datetime_input(&raw)
                    .ok_or_else(|| eyre!("invalid --at {raw:?}, expected YYYY-MM-DD HH:MM[:SS]"))?,
                None => to_backend_datetime(Local::now().naive_local()),
            };
            let counter = NewCounter {
                casino_id: casino,
                machine_id: machine,
                at,
                amounts: amounts.into(),
            };
            client.record_counter(&counter).await?;
            println!("Contador registrado correctamente ({})", counter.at);
        }
        Commands::FixCounter { casino, machine, at, date, amounts } => {
            let day = written_day(&at)
                .ok_or_else(|| eyre!("invalid --at {at:?}, expected YYYY-MM-DD HH:MM[:SS]"))?;
            let correction = CounterCorrection {
                machine_id: machine,
                at: at.trim().to_string(),
                amounts: amounts.into(),
            };
            client
                .update_counters(casino, date.unwrap_or(day), &session.username, vec![correction])
                .await?;
            println!("Registro actualizado correctamente");
        }

        Commands::Preview { casino, machine, period, json } => {
            let view = views::machine_view(&client, casino, machine, period.resolve()?).await?;
            if json {
                return print_json(&view);
            }
            print!("{}", render::render_machine_view(&view));
        }
        Commands::CasinoPreview { casino, period, json } => {
            let view = views::casino_view(&client, casino, period.resolve()?).await?;
            if json {
                return print_json(&view);
            }
            print!("{}", render::render_casino_view(&view));
        }
        Commands::GenerateMachine { machine, period, locked, json } => {
            let balance = client
                .generate_machine_balance(machine, &period.resolve()?, locked)
                .await
                .wrap_err("No fue posible completar el cuadre de la máquina")?;
            if json {
                return print_json(&balance);
            }
            println!("Cuadre generado correctamente");
            print!("{}", render::render_machine_balance(&balance));
        }
        Commands::GenerateCasino { casino, period, locked, json } => {
            let balance = client
                .generate_casino_balance(casino, &period.resolve()?, locked)
                .await
                .wrap_err("No fue posible generar el cuadre general")?;
            if json {
                return print_json(&balance);
            }
            println!("Cuadre general generado y almacenado correctamente");
            print!("{}", render::render_casino_balance(&balance));
        }
        Commands::MachineHistory { machine, limit } => {
            let history = client.machine_balance_history(machine, limit).await?;
            print!("{}", render::render_machine_history(&history));
        }
        Commands::CasinoHistory { casino, period, limit } => {
            let history = client
                .casino_balance_history(casino, &period.resolve()?, limit)
                .await?;
            print!("{}", render::render_casino_history(&history));
        }
        Commands::CasinoReport { casino, period, export, json } => {
            let period = period.resolve()?;
            if let Some(format) = export.export {
                let bytes = client.casino_report_export(casino, &period, format).await?;
                return save_export(bytes, export.output, report_file_name(&period, format)).await;
            }
            let report = client.casino_report(casino, &period).await?;
            if json {
                return print_json(&report);
            }
            print!("{}", render::render_casino_report(&report));
        }
        Commands::Report { period, casino, marca, modelo, kind, export, json } => {
            let filters = ReportFilters {
                period: period.resolve()?,
                kind,
                casino_id: casino,
                marca,
                modelo,
            };
            if let Some(format) = export.export {
                let bytes = client.report_export(&filters, format).await?;
                return save_export(bytes, export.output, report_file_name(&filters.period, format))
                    .await;
            }
            let report = client.filtered_report(&filters).await?;
            if json {
                return print_json(&report);
            }
            print!("{}", render::render_filtered_report(&report));
        }
        Commands::Participation { machines, percent, period, estimate, export, json } => {
            let period = period.resolve()?;
            if estimate {
                let view = views::participation_view(&client, &machines, percent, period).await?;
                if json {
                    return print_json(&view);
                }
                print!("{}", render::render_participation_view(&view));
                return Ok(());
            }

            let request = ParticipationRequest {
                machine_ids: unique_machines(&machines),
                period_start: period.start_param(),
                period_end: period.end_param(),
                porcentaje_participacion: percent,
            };
            if let Some(format) = export.export {
                let bytes = client.participation_export(&request, format).await?;
                return save_export(bytes, export.output, participation_file_name(&period, format))
                    .await;
            }
            print_json(&client.participation(&request).await?)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr) // keep stdout for command output
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let cfg = config::load()?;

    let conn = db::connect(&cfg.session_db)?;
    db::run_migrations(&conn)?;

    if let Err(e) = run(cli.command, &cfg, &conn).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
