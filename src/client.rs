// src/client.rs
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ConsoleError, Result};
use crate::models::{
    Casino, CasinoBalance, CasinoBalanceRequest, CasinoDetailedReport, CasinoInput,
    CounterAmounts, CounterCorrection, CounterCorrections, CounterSnapshot, FilteredReport,
    LoginRequest, LoginResponse, Machine, MachineBalance, MachineBalanceRequest, MachineUpdate,
    NewCounter, NewMachine, ParticipationRequest,
};
use crate::period::Period;

type Query<'a> = Vec<(&'a str, String)>;

/// File formats the backend can render reports into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    Pdf,
    Excel,
}

impl ExportFormat {
    /// Path segment the backend expects.
    pub fn segment(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Excel => "excel",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Excel => "xlsx",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ReportKind {
    /// Per-machine breakdown
    #[default]
    Detallado,
    /// Totals only
    Consolidado,
    /// Statistics
    Resumen,
}

impl ReportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Detallado => "detallado",
            Self::Consolidado => "consolidado",
            Self::Resumen => "resumen",
        }
    }
}

/// Filters of the multi-casino report.
#[derive(Debug, Clone)]
pub struct ReportFilters {
    pub period: Period,
    pub kind: ReportKind,
    pub casino_id: Option<i64>,
    pub marca: Option<String>,
    pub modelo: Option<String>,
}

impl ReportFilters {
    fn query(&self) -> Query<'static> {
        let mut q = vec![
            ("period_start", self.period.start_param()),
            ("period_end", self.period.end_param()),
            ("tipo_reporte", self.kind.as_str().to_string()),
        ];
        if let Some(id) = self.casino_id {
            q.push(("casino_id", id.to_string()));
        }
        for (key, value) in [("marca", &self.marca), ("modelo", &self.modelo)] {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                q.push((key, v.to_string()));
            }
        }
        q
    }
}

/// Turn an error body into something a person can read.
///
/// Follows the backend's `detail` convention: a string is used as-is, a list
/// of validation items is joined with `" | "`.
pub fn error_message(status: StatusCode, body: &str) -> String {
    let detail = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").cloned());

    match detail {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Array(items)) if !items.is_empty() => items
            .iter()
            .map(|item| match item.get("msg").and_then(Value::as_str) {
                Some(msg) => msg.to_string(),
                None => match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            })
            .collect::<Vec<_>>()
            .join(" | "),
        _ => format!("request failed with status {}", status.as_u16()),
    }
}

/// Map a non-success response to [`ConsoleError::Api`].
pub async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    warn!("Backend answered {} for {}", status, body);
    Err(ConsoleError::Api {
        status,
        message: error_message(status, &body),
    })
}

fn ensure_non_negative(amounts: &CounterAmounts) -> Result<()> {
    let all = [
        amounts.in_amount,
        amounts.out_amount,
        amounts.jackpot_amount,
        amounts.billetero_amount,
    ];
    if all.iter().any(|a| a.is_sign_negative() && !a.is_zero()) {
        return Err(ConsoleError::validation(
            "Los contadores deben ser números positivos",
        ));
    }
    Ok(())
}

/// Typed client for the casino backend REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: Option<String>,
    retries: u32,
    retry_delay: Duration,
}

impl ApiClient {
    pub fn new(cfg: &Config) -> Result<Self> {
        let http = Client::builder().timeout(cfg.timeout).build()?;
        Ok(Self {
            http,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            token: None,
            retries: cfg.retries.max(1),
            retry_delay: cfg.retry_delay,
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let rb = self.http.request(method, format!("{}{}", self.base_url, path));
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// GET with retries on transport failures.
    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Response> {
        for attempt in 1..=self.retries {
            info!("GET {} {:?}", path, query);
            match self.request(Method::GET, path).query(query).send().await {
                Ok(resp) => return check_status(resp).await,
                Err(e) if attempt < self.retries => {
                    warn!(
                        "GET {} failed (attempt {}): {}. Retrying...",
                        path, attempt, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
        unreachable!("retries is at least 1")
    }

    async fn get_value(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let text = self.get(path, query).await?.text().await?;
        debug!("Raw {} response: {}", path, text);
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T> {
        Ok(serde_json::from_value(self.get_value(path, query).await?)?)
    }

    /// Lists come back empty when the body is not an array.
    async fn get_list<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>> {
        match self.get_value(path, query).await? {
            list @ Value::Array(_) => Ok(serde_json::from_value(list)?),
            other => {
                warn!("Expected a list from {}, got {}", path, other);
                Ok(Vec::new())
            }
        }
    }

    async fn send_json<B, T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&B>,
    ) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        info!("{} {}", method, path);
        let mut rb = self.request(method, path).query(query);
        if let Some(body) = body {
            rb = rb.json(body);
        }
        let text = check_status(rb.send().await?).await?.text().await?;
        debug!("Raw {} response: {}", path, text);
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }

    async fn get_bytes(&self, path: &str, query: &[(&str, String)]) -> Result<Vec<u8>> {
        Ok(self.get(path, query).await?.bytes().await?.to_vec())
    }

    // ---------- auth ----------

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(ConsoleError::validation("username and password are required"));
        }
        let body = LoginRequest {
            username: username.trim(),
            password,
        };
        self.send_json(Method::POST, "/login", &[], Some(&body)).await
    }

    // ---------- casinos ----------

    pub async fn list_casinos(&self, only_active: bool) -> Result<Vec<Casino>> {
        self.get_list("/places/casino", &[("only_active", only_active.to_string())])
            .await
    }

    pub async fn create_casino(&self, input: &CasinoInput) -> Result<Value> {
        let missing = [&input.name, &input.city]
            .iter()
            .any(|f| f.as_deref().map_or(true, |v| v.trim().is_empty()));
        if missing {
            return Err(ConsoleError::validation("name and city are required"));
        }
        self.send_json(Method::POST, "/places/casino", &[], Some(input))
            .await
    }

    pub async fn update_casino(&self, casino_id: i64, input: &CasinoInput) -> Result<Value> {
        if input.is_empty() {
            return Err(ConsoleError::validation("Realiza un cambio antes de guardar."));
        }
        let path = format!("/places/casino/{casino_id}");
        self.send_json(Method::PUT, &path, &[], Some(input)).await
    }

    pub async fn set_casino_active(&self, casino_id: i64, active: bool) -> Result<Value> {
        let action = if active { "activar" } else { "inactivar" };
        let path = format!("/places/casino/{casino_id}/{action}");
        self.send_json::<(), _>(Method::PUT, &path, &[], None).await
    }

    // ---------- machines ----------

    pub async fn list_machines(&self, casino_id: Option<i64>, only_active: bool) -> Result<Vec<Machine>> {
        let mut query = vec![("only_active", only_active.to_string())];
        if let Some(id) = casino_id {
            query.push(("casino_id", id.to_string()));
        }
        self.get_list("/machines/", &query).await
    }

    pub async fn machines_by_casino(&self, casino_id: i64) -> Result<Vec<Machine>> {
        self.get_list(&format!("/counters/machines-by-casino/{casino_id}"), &[])
            .await
    }

    pub async fn create_machine(&self, machine: &NewMachine) -> Result<Value> {
        let text = [&machine.marca, &machine.modelo, &machine.serial, &machine.asset];
        if text.iter().any(|v| v.trim().is_empty()) {
            return Err(ConsoleError::validation("Todos los campos son obligatorios."));
        }
        if machine.denominacion.is_sign_negative() {
            return Err(ConsoleError::validation("denominacion must be >= 0"));
        }
        self.send_json(Method::POST, "/machines/", &[], Some(machine))
            .await
    }

    /// Send only what differs from `current`.
    pub async fn update_machine(&self, current: &Machine, update: MachineUpdate) -> Result<Value> {
        let update = update.diff_against(current);
        if update.is_empty() {
            return Err(ConsoleError::validation("Realiza un cambio antes de guardar."));
        }
        let path = format!("/machines/{}", current.id);
        self.send_json(Method::PUT, &path, &[], Some(&update)).await
    }

    // ---------- counters ----------

    /// Counter readings of every machine of a casino between two dates.
    pub async fn query_counters(&self, casino_id: i64, period: &Period) -> Result<Vec<CounterSnapshot>> {
        let query = [
            ("casino_id", casino_id.to_string()),
            ("start_date", period.start_param()),
            ("end_date", period.end_param()),
        ];
        self.get_list("/counters/reportes/consulta", &query).await
    }

    pub async fn record_counter(&self, counter: &NewCounter) -> Result<Value> {
        ensure_non_negative(&counter.amounts)?;
        self.send_json(Method::POST, "/counters", &[], Some(counter))
            .await
    }

    /// Correct readings of a casino for one day.
    pub async fn update_counters(
        &self,
        casino_id: i64,
        date: chrono::NaiveDate,
        actor: &str,
        updates: Vec<CounterCorrection>,
    ) -> Result<Value> {
        if updates.is_empty() {
            return Err(ConsoleError::validation("nothing to update"));
        }
        for u in &updates {
            ensure_non_negative(&u.amounts)?;
        }
        let path = format!("/counters/modificacion/{casino_id}/{}", date.format("%Y-%m-%d"));
        let body = CounterCorrections { updates };
        self.send_json(Method::PUT, &path, &[("actor", actor.to_string())], Some(&body))
            .await
    }

    // ---------- balances ----------

    pub async fn machine_balance_history(&self, machine_id: i64, limit: u32) -> Result<Vec<MachineBalance>> {
        let query = [
            ("machine_id", machine_id.to_string()),
            ("limit", limit.to_string()),
            ("offset", "0".to_string()),
        ];
        self.get_list("/balances/machines", &query).await
    }

    pub async fn generate_machine_balance(
        &self,
        machine_id: i64,
        period: &Period,
        locked: bool,
    ) -> Result<MachineBalance> {
        let body = MachineBalanceRequest {
            machine_id,
            period_start: period.start_param(),
            period_end: period.end_param(),
            locked,
        };
        self.send_json(Method::POST, "/balances/machines/generate", &[], Some(&body))
            .await
    }

    pub async fn casino_report(&self, casino_id: i64, period: &Period) -> Result<CasinoDetailedReport> {
        let query = [
            ("period_start", period.start_param()),
            ("period_end", period.end_param()),
        ];
        self.get_json(&format!("/balances/casinos/{casino_id}/report"), &query)
            .await
    }

    pub async fn casino_report_export(
        &self,
        casino_id: i64,
        period: &Period,
        format: ExportFormat,
    ) -> Result<Vec<u8>> {
        let query = [
            ("period_start", period.start_param()),
            ("period_end", period.end_param()),
        ];
        let path = format!("/balances/casinos/{casino_id}/report/{}", format.segment());
        self.get_bytes(&path, &query).await
    }

    pub async fn casino_balance_history(
        &self,
        casino_id: i64,
        period: &Period,
        limit: u32,
    ) -> Result<Vec<CasinoBalance>> {
        let query = [
            ("place_id", casino_id.to_string()),
            ("date_from", period.start_param()),
            ("date_to", period.end_param()),
            ("limit", limit.to_string()),
            ("offset", "0".to_string()),
        ];
        self.get_list("/balances/casinos", &query).await
    }

    pub async fn generate_casino_balance(
        &self,
        casino_id: i64,
        period: &Period,
        locked: bool,
    ) -> Result<CasinoBalance> {
        let body = CasinoBalanceRequest {
            place_id: casino_id,
            period_start: period.start_param(),
            period_end: period.end_param(),
            locked,
        };
        self.send_json(Method::POST, "/balances/casinos/generate", &[], Some(&body))
            .await
    }

    // ---------- reports ----------

    pub async fn filtered_report(&self, filters: &ReportFilters) -> Result<FilteredReport> {
        self.get_json("/balances/reportes/filtros", &filters.query())
            .await
    }

    pub async fn report_export(&self, filters: &ReportFilters, format: ExportFormat) -> Result<Vec<u8>> {
        let path = format!("/balances/reportes/filtros/{}", format.segment());
        self.get_bytes(&path, &filters.query()).await
    }

    /// Server-side participation report; the body is passed through untouched.
    pub async fn participation(&self, request: &ParticipationRequest) -> Result<Value> {
        crate::aggregator::validate_participation(&request.machine_ids, request.porcentaje_participacion)?;
        self.send_json(Method::POST, "/balances/participacion", &[], Some(request))
            .await
    }

    pub async fn participation_export(
        &self,
        request: &ParticipationRequest,
        format: ExportFormat,
    ) -> Result<Vec<u8>> {
        crate::aggregator::validate_participation(&request.machine_ids, request.porcentaje_participacion)?;
        let path = format!("/balances/participacion/{}", format.segment());
        info!("POST {}", path);
        let resp = self.request(Method::POST, &path).json(request).send().await?;
        Ok(check_status(resp).await?.bytes().await?.to_vec())
    }
}

/// Default file name for a participation export.
pub fn participation_file_name(period: &Period, format: ExportFormat) -> String {
    format!(
        "reporte_participacion_{}_{}.{}",
        period.start_param(),
        period.end_param(),
        format.extension()
    )
}

/// Default file name for a report export.
pub fn report_file_name(period: &Period, format: ExportFormat) -> String {
    format!(
        "reporte_{}_{}.{}",
        period.start_param(),
        period.end_param(),
        format.extension()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn may() -> Period {
        Period::new(
            NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn detail_string_is_used_verbatim() {
        let msg = error_message(StatusCode::BAD_REQUEST, r#"{"detail":"Máquina no encontrada"}"#);
        assert_eq!(msg, "Máquina no encontrada");
    }

    #[test]
    fn detail_list_is_joined() {
        let body = r#"{"detail":[{"loc":["body","machine_id"],"msg":"field required"},{"code":7}]}"#;
        let msg = error_message(StatusCode::UNPROCESSABLE_ENTITY, body);
        assert_eq!(msg, r#"field required | {"code":7}"#);
    }

    #[test]
    fn missing_detail_falls_back_to_status() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>oops</html>"),
            "request failed with status 502"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"detail":""}"#),
            "request failed with status 404"
        );
    }

    #[test]
    fn report_query_skips_blank_filters() {
        let filters = ReportFilters {
            period: may(),
            kind: ReportKind::Consolidado,
            casino_id: Some(3),
            marca: Some("  IGT ".into()),
            modelo: Some("   ".into()),
        };
        let q = filters.query();
        assert!(q.contains(&("tipo_reporte", "consolidado".to_string())));
        assert!(q.contains(&("casino_id", "3".to_string())));
        assert!(q.contains(&("marca", "IGT".to_string())));
        assert!(!q.iter().any(|(k, _)| *k == "modelo"));
    }

    #[test]
    fn export_file_names() {
        assert_eq!(
            participation_file_name(&may(), ExportFormat::Excel),
            "reporte_participacion_2024-05-01_2024-05-31.xlsx"
        );
        assert_eq!(report_file_name(&may(), ExportFormat::Pdf), "reporte_2024-05-01_2024-05-31.pdf");
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let amounts = CounterAmounts {
            out_amount: Decimal::from(-1),
            ..CounterAmounts::default()
        };
        assert!(ensure_non_negative(&amounts).is_err());
        assert!(ensure_non_negative(&CounterAmounts::default()).is_ok());
    }
}
