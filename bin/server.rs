// Net Worth Dashboard - Web Server
// JSON API over the vesting/tax engines and the dashboard metrics

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{Months, Utc};
use networth_dashboard::{
    get_assets, get_income_config, get_liabilities, get_recurring_bills, get_snapshots,
    get_transactions_between, get_unpaid_bills, get_vesting_records, income_by_month, logging,
    mark_bill_paid, monthly_commitment, net_worth_change_30d, open_database, upcoming_bills,
    upcoming_income_events, upsert_snapshot, value_grants, GrantValuation, IncomeBreakdown,
    IncomeConfig, IncomeEvent, IncomeTaxResult, NetWorthChange, NetWorthSnapshot,
    NetWorthSummary, OneOffBill, PayFrequency, RecurringBill, StaticPrices, TaxEngine,
    UpcomingBill,
};
use std::collections::BTreeMap;
use rusqlite::Connection;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    tax: Arc<TaxEngine>,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

fn internal_error<T: Serialize>(context: &str, e: anyhow::Error) -> axum::response::Response {
    tracing::error!(error = %e, "{}", context);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiResponse::<T>::err(context)),
    )
        .into_response()
}

#[derive(Serialize)]
struct TaxResponse {
    #[serde(flatten)]
    result: IncomeTaxResult,
    weekly_net: f64,
    fortnightly_net: f64,
    monthly_net: f64,
}

#[derive(Serialize)]
struct NetWorthResponse {
    #[serde(flatten)]
    summary: NetWorthSummary,
    change_30d: NetWorthChange,
}

#[derive(Serialize)]
struct BillsResponse {
    monthly_recurring: f64,
    upcoming: Vec<UpcomingBill>,
    recurring: Vec<RecurringBill>,
    one_off: Vec<OneOffBill>,
}

#[derive(Serialize)]
struct IncomeResponse {
    config: Option<IncomeConfig>,
    net_per_pay: Option<f64>,
    events: Vec<IncomeEvent>,
    by_month: BTreeMap<String, IncomeBreakdown>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/tax/:gross - Income tax breakdown
async fn get_tax(State(state): State<AppState>, Path(gross): Path<String>) -> impl IntoResponse {
    let gross = match gross.parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => value,
        _ => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<TaxResponse>::err(format!("invalid gross income: {}", gross))),
            )
                .into_response()
        }
    };

    let response = TaxResponse {
        result: state.tax.calculate_income_tax(gross),
        weekly_net: state.tax.gross_to_net(gross, PayFrequency::Weekly),
        fortnightly_net: state.tax.gross_to_net(gross, PayFrequency::Fortnightly),
        monthly_net: state.tax.gross_to_net(gross, PayFrequency::Monthly),
    };
    (StatusCode::OK, Json(ApiResponse::ok(response))).into_response()
}

/// GET /api/vesting - Every grant valued at the stored asset prices
async fn get_vesting(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    let now = Utc::now();

    let loaded = get_vesting_records(&conn).and_then(|grants| Ok((grants, get_assets(&conn)?)));
    match loaded {
        Ok((grants, assets)) => {
            let prices = StaticPrices::from_assets(&assets);
            let valued: Vec<GrantValuation> = value_grants(&grants, &prices, now);
            (StatusCode::OK, Json(ApiResponse::ok(valued))).into_response()
        }
        Err(e) => internal_error::<Vec<GrantValuation>>("Failed to load vesting schedules", e),
    }
}

/// GET /api/vesting/:symbol - One grant by token symbol
async fn get_vesting_by_symbol(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> impl IntoResponse {
    let symbol = urlencoding::decode(&symbol)
        .unwrap_or_else(|_| symbol.clone().into())
        .into_owned();
    let conn = state.db.lock().unwrap();

    let loaded = get_vesting_records(&conn).and_then(|grants| Ok((grants, get_assets(&conn)?)));
    match loaded {
        Ok((grants, assets)) => {
            let matching: Vec<_> = grants
                .into_iter()
                .filter(|g| g.token_symbol.eq_ignore_ascii_case(&symbol))
                .collect();
            if matching.is_empty() {
                return (
                    StatusCode::NOT_FOUND,
                    Json(ApiResponse::<Vec<GrantValuation>>::err(format!("no grant for {}", symbol))),
                )
                    .into_response();
            }
            let prices = StaticPrices::from_assets(&assets);
            let valued = value_grants(&matching, &prices, Utc::now());
            (StatusCode::OK, Json(ApiResponse::ok(valued))).into_response()
        }
        Err(e) => internal_error::<Vec<GrantValuation>>("Failed to load vesting schedules", e),
    }
}

/// GET /api/net-worth - Paper and liquid net worth
async fn get_net_worth(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    let now = Utc::now();

    let loaded = (|| -> anyhow::Result<NetWorthResponse> {
        let assets = get_assets(&conn)?;
        let liabilities = get_liabilities(&conn)?;
        let grants = get_vesting_records(&conn)?;
        let snapshots = get_snapshots(&conn, 365)?;
        Ok(NetWorthResponse {
            summary: NetWorthSummary::compute(&assets, &liabilities, &grants, now),
            change_30d: net_worth_change_30d(&snapshots, now.date_naive()),
        })
    })();

    match loaded {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        Err(e) => internal_error::<NetWorthResponse>("Failed to compute net worth", e),
    }
}

/// POST /api/net-worth/snapshot - Record today's net worth
async fn create_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    let saved = (|| -> anyhow::Result<NetWorthSnapshot> {
        let assets = get_assets(&conn)?;
        let liabilities = get_liabilities(&conn)?;
        let snapshot = NetWorthSnapshot::capture(Utc::now().date_naive(), &assets, &liabilities);
        upsert_snapshot(&conn, &snapshot)?;
        Ok(snapshot)
    })();

    match saved {
        Ok(snapshot) => (StatusCode::OK, Json(ApiResponse::ok(snapshot))).into_response(),
        Err(e) => internal_error::<NetWorthSnapshot>("Failed to create snapshot", e),
    }
}

/// GET /api/bills - Recurring commitment and what is due next
async fn get_bills(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    let today = Utc::now().date_naive();

    let loaded = (|| -> anyhow::Result<BillsResponse> {
        let recurring = get_recurring_bills(&conn, false)?;
        let one_off = get_unpaid_bills(&conn)?;
        Ok(BillsResponse {
            monthly_recurring: monthly_commitment(&recurring),
            upcoming: upcoming_bills(&recurring, &one_off, today),
            recurring,
            one_off,
        })
    })();

    match loaded {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        Err(e) => internal_error::<BillsResponse>("Failed to load bills", e),
    }
}

/// POST /api/bills/:id/paid - Mark a one-off bill paid
async fn pay_bill(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();

    match mark_bill_paid(&conn, &id) {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::ok(id))).into_response(),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<String>::err(format!("no unpaid bill {}", id))),
        )
            .into_response(),
        Err(e) => internal_error::<String>("Failed to mark bill paid", e),
    }
}

/// GET /api/income - Salary config, upcoming pay events, income by source
async fn get_income(State(state): State<AppState>) -> impl IntoResponse {
    let conn = state.db.lock().unwrap();
    let today = Utc::now().date_naive();

    let loaded = (|| -> anyhow::Result<IncomeResponse> {
        let config = get_income_config(&conn)?;
        let from = today
            .checked_sub_months(Months::new(6))
            .unwrap_or(today);
        let history = get_transactions_between(&conn, from, today)?;
        Ok(IncomeResponse {
            net_per_pay: config.as_ref().map(|c| c.net_per_pay(&state.tax)),
            events: upcoming_income_events(config.as_ref(), &state.tax, today),
            by_month: income_by_month(&history),
            config,
        })
    })();

    match loaded {
        Ok(response) => (StatusCode::OK, Json(ApiResponse::ok(response))).into_response(),
        Err(e) => internal_error::<IncomeResponse>("Failed to load income", e),
    }
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing();

    let db_path = std::env::var("NETWORTH_DB").unwrap_or_else(|_| "networth.db".to_string());
    let conn = open_database(std::path::Path::new(&db_path))?;

    let tax = match std::env::var("NETWORTH_TAX_TABLE") {
        Ok(path) => TaxEngine::from_file(path)?,
        Err(_) => TaxEngine::new(),
    };

    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        tax: Arc::new(tax),
    };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/tax/:gross", get(get_tax))
        .route("/vesting", get(get_vesting))
        .route("/vesting/:symbol", get(get_vesting_by_symbol))
        .route("/net-worth", get(get_net_worth))
        .route("/net-worth/snapshot", post(create_snapshot))
        .route("/bills", get(get_bills))
        .route("/bills/:id/paid", post(pay_bill))
        .route("/income", get(get_income))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    let addr = std::env::var("NETWORTH_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, db = %db_path, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
