use std::collections::HashMap;

use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use casino_console::config::Config;
use casino_console::models::{CounterAmounts, CounterCorrection, NewCounter};
use casino_console::period::Period;
use casino_console::views;
use casino_console::{ApiClient, ConsoleError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::{json, Value};

const TOKEN: &str = "secret-token";

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Not authenticated" }))).into_response()
}

async fn machines(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    let all = json!([
        { "id": 7, "marca": "IGT", "modelo": "S2000", "serial": "A1", "asset": "100",
          "denominacion": "100", "casino_id": 3, "is_active": true },
        { "id": 9, "marca": "Aristocrat", "modelo": "MK6", "serial": "B2", "asset": "200",
          "denominacion": null, "casino_id": 3, "is_active": true },
        { "id": 11, "marca": "Novomatic", "modelo": "FV", "serial": "C3", "asset": "300",
          "denominacion": 0, "place_id": 4, "is_active": true }
    ]);
    let list = match q.get("casino_id").and_then(|id| id.parse::<i64>().ok()) {
        Some(casino) => all
            .as_array()
            .into_iter()
            .flatten()
            .filter(|m| m["casino_id"] == casino || m["place_id"] == casino)
            .cloned()
            .collect::<Vec<_>>(),
        None => all.as_array().cloned().unwrap_or_default(),
    };
    Json(Value::Array(list)).into_response()
}

async fn counters(headers: HeaderMap, Query(q): Query<HashMap<String, String>>) -> Response {
    if !authorized(&headers) {
        return unauthorized();
    }
    assert_eq!(q.get("start_date").map(String::as_str), Some("2024-05-01"));
    assert_eq!(q.get("end_date").map(String::as_str), Some("2024-05-31"));

    let rows = match q.get("casino_id").map(String::as_str) {
        Some("3") => json!([
            { "id": 3, "machine_id": 7, "at": "2024-05-10T08:00:00",
              "in_amount": 1500, "out_amount": 900, "jackpot_amount": 50, "billetero_amount": 300 },
            { "id": 1, "machine_id": 7, "at": "2024-05-01 09:00:00",
              "in_amount": 1000, "out_amount": 600, "jackpot_amount": 0, "billetero_amount": 100 },
            { "id": 2, "machine_id": "7", "at": "2024-05-05T12:00:00Z",
              "in_amount": "1200", "out_amount": 700, "jackpot_amount": 20, "billetero_amount": "200" },
            { "id": 4, "machine_id": 7, "at": null, "in_amount": 99999 },
            { "id": 5, "machine_id": 7, "at": "not a date", "in_amount": 99999 },
            { "id": 6, "machine_id": 42, "at": "2024-05-02T10:00:00", "in_amount": 5000 }
        ]),
        Some("4") => json!([
            { "id": 20, "machine_id": 11, "at": "2024-05-31T22:00:00",
              "in_amount": 400, "out_amount": 100, "jackpot_amount": 0, "billetero_amount": 0 },
            { "id": 21, "machine_id": 11, "at": "2024-05-01T06:00:00",
              "in_amount": 100, "out_amount": 0, "jackpot_amount": 0, "billetero_amount": 0 }
        ]),
        _ => json!([]),
    };
    Json(rows).into_response()
}

async fn record_counter(Json(_body): Json<Value>) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({ "detail": [
            { "loc": ["body", "at"], "msg": "field required" },
            { "loc": ["body", "in_amount"], "msg": "value is not a valid float" }
        ]})),
    )
        .into_response()
}

async fn update_counters(
    Path((casino, date)): Path<(i64, String)>,
    Query(q): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    Json(json!({
        "casino": casino,
        "date": date,
        "actor": q.get("actor"),
        "updates": body["updates"],
    }))
}

async fn login(Json(body): Json<Value>) -> Response {
    if body["password"] != "hunter2" {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "Credenciales inválidas" })))
            .into_response();
    }
    Json(json!({
        "id": 5,
        "username": body["username"],
        "role": "operador",
        "access_token": TOKEN
    }))
    .into_response()
}

async fn spawn_backend() -> String {
    let api = Router::new()
        .route("/login", post(login))
        .route("/machines/", get(machines))
        .route("/places/casino", get(|| async { Json(json!({ "items": [] })) }))
        .route("/counters", post(record_counter))
        .route("/counters/reportes/consulta", get(counters))
        .route("/counters/modificacion/:casino/:date", put(update_counters));
    let app = Router::new().nest("/api/v1", api);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/api/v1/")
}

async fn client() -> ApiClient {
    let base = spawn_backend().await;
    ApiClient::new(&Config::for_base_url(base))
        .unwrap()
        .with_token(TOKEN)
}

fn may() -> Period {
    Period::new(
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
    )
    .unwrap()
}

fn dec(v: i64) -> Decimal {
    Decimal::from(v)
}

#[tokio::test]
async fn machine_view_orders_readings_and_previews_balance() {
    let client = client().await;
    let view = views::machine_view(&client, 3, 7, may()).await.unwrap();

    let ids: Vec<_> = view.snapshots.iter().map(|s| s.id.unwrap()).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let p = view.preview.expect("preview");
    assert_eq!(p.snapshots, 3);
    assert_eq!(p.in_delta, dec(500));
    assert_eq!(p.out_delta, dec(300));
    assert_eq!(p.jackpot_delta, dec(50));
    assert_eq!(p.billetero_delta, dec(200));
    assert_eq!(p.in_total, dec(50_000));
    assert_eq!(p.billetero_total, dec(20_000));
    assert_eq!(p.utilidad_total, dec(15_000));
    assert_eq!(view.denomination.get(), dec(100));
}

#[tokio::test]
async fn machine_view_reports_unknown_machine() {
    let client = client().await;
    let err = views::machine_view(&client, 3, 99, may()).await.unwrap_err();
    assert!(matches!(err, ConsoleError::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn casino_view_sums_machines_with_data() {
    let client = client().await;
    let view = views::casino_view(&client, 3, may()).await.unwrap();
    let p = view.preview;

    assert_eq!(p.total_machines, 2);
    assert_eq!(p.machines_with_data, 1);
    assert_eq!(p.machines_without_data, 1);
    assert_eq!(p.totals.in_total, dec(50_000));
    assert_eq!(p.totals.out_total, dec(30_000));
    assert_eq!(p.totals.jackpot_total, dec(5_000));
    assert_eq!(p.totals.utilidad_final, dec(15_000));
}

#[tokio::test]
async fn participation_view_spans_casinos() {
    let client = client().await;
    let view = views::participation_view(&client, &[7, 11], dec(30), may())
        .await
        .unwrap();
    let p = view.preview;

    // machine 11 has denominacion 0, so its meters count at face value
    assert_eq!(p.utilidad_total, dec(15_200));
    assert_eq!(p.participation_total, dec(4_560));
    assert!(p.machines_without_data.is_empty());
}

#[tokio::test]
async fn participation_view_rejects_out_of_range_percent() {
    let client = client().await;
    let err = views::participation_view(&client, &[7], dec(101), may())
        .await
        .unwrap_err();
    assert!(matches!(err, ConsoleError::Validation(_)));
}

#[tokio::test]
async fn missing_token_surfaces_detail_string() {
    let base = spawn_backend().await;
    let anonymous = ApiClient::new(&Config::for_base_url(base)).unwrap();

    let err = anonymous.query_counters(3, &may()).await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
    assert_eq!(err.to_string(), "Not authenticated (HTTP 401 Unauthorized)");
}

#[tokio::test]
async fn validation_detail_list_is_joined() {
    let client = client().await;
    let counter = NewCounter {
        casino_id: 3,
        machine_id: 7,
        at: "2024-05-01 09:00:00".into(),
        amounts: CounterAmounts::default(),
    };

    match client.record_counter(&counter).await.unwrap_err() {
        ConsoleError::Api { status, message } => {
            assert_eq!(status, reqwest::StatusCode::UNPROCESSABLE_ENTITY);
            assert_eq!(message, "field required | value is not a valid float");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn non_list_body_reads_as_empty_list() {
    let client = client().await;
    assert!(client.list_casinos(true).await.unwrap().is_empty());
}

#[tokio::test]
async fn login_defaults_token_type() {
    let base = spawn_backend().await;
    let client = ApiClient::new(&Config::for_base_url(base)).unwrap();

    let login = client.login(" luis ", "hunter2").await.unwrap();
    assert_eq!(login.username, "luis");
    assert_eq!(login.role, "operador");
    assert_eq!(login.token_type, "bearer");

    let err = client.login("luis", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(reqwest::StatusCode::UNAUTHORIZED));
}

#[tokio::test]
async fn counter_corrections_carry_actor_and_day() {
    let client = client().await;
    let correction = CounterCorrection {
        machine_id: 7,
        at: "2024-05-10 08:00:00".into(),
        amounts: CounterAmounts {
            in_amount: dec(1600),
            ..CounterAmounts::default()
        },
    };

    let echo = client
        .update_counters(
            3,
            NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
            "ana",
            vec![correction],
        )
        .await
        .unwrap();

    assert_eq!(echo["casino"], 3);
    assert_eq!(echo["date"], "2024-05-10");
    assert_eq!(echo["actor"], "ana");
    assert_eq!(echo["updates"][0]["machine_id"], 7);
    assert_eq!(echo["updates"][0]["in_amount"], 1600.0);
}
