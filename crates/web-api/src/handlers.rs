use crate::error::ApiError;
use crate::server::AppState;
use alert_bridge_core::TradeConfig;
use alert_bridge_pipeline::{exchange_date, Alert, AlertPayload, MonitorSnapshot};
use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const KITE_LOGIN_URL: &str = "https://kite.zerodha.com/connect/login";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub logged_in: bool,
    pub active_monitors: usize,
    /// Open positions whose tick stream ended before an exit.
    pub unmonitored_positions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AlertAccepted {
    pub status: String,
    pub scan_name: String,
    pub symbols: usize,
}

#[derive(Debug, Deserialize)]
pub struct LoginCallbackQuery {
    pub request_token: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub status: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateTradeConfigRequest {
    #[serde(alias = "stock")]
    pub symbol: String,
    pub qty: u32,
    pub tp: Decimal,
    pub sl: Decimal,
}

/// Liveness plus login and monitor counts.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let supervisor = state.dispatcher.supervisor();
    Json(HealthResponse {
        status: "ok".to_string(),
        logged_in: state.credentials.is_logged_in(),
        active_monitors: supervisor.active_count().await,
        unmonitored_positions: supervisor.unmonitored().await.len(),
    })
}

/// Accepts a screener alert and dispatches it in the background.
///
/// The webhook is acknowledged as soon as the payload validates; per-symbol
/// outcomes land in the activity log.
///
/// # Errors
/// Returns 400 if the payload is missing fields or its lists disagree in length.
pub async fn receive_alert(
    State(state): State<AppState>,
    Json(payload): Json<AlertPayload>,
) -> Result<Json<AlertAccepted>, ApiError> {
    let alert = Alert::try_from(&payload).map_err(|e| {
        tracing::warn!(error = %e, scan = ?payload.scan_name, "Rejected malformed alert");
        ApiError::from(e)
    })?;

    let accepted = AlertAccepted {
        status: "accepted".to_string(),
        scan_name: alert.scan_name.clone(),
        symbols: alert.legs.len(),
    };

    let dispatcher = Arc::clone(&state.dispatcher);
    tokio::spawn(async move {
        match dispatcher.handle(&alert, exchange_date(Utc::now())).await {
            Ok(outcomes) => {
                let opened = outcomes.iter().filter(|o| o.is_opened()).count();
                tracing::info!(scan = %alert.scan_name, opened, total = outcomes.len(), "Alert processed");
            }
            Err(e) => tracing::error!(scan = %alert.scan_name, error = %e, "Alert dropped"),
        }
    });

    Ok(Json(accepted))
}

/// Redirects to the broker's login page for the configured app.
pub async fn login_redirect(State(state): State<AppState>) -> Redirect {
    let api_key = &state.login.client.config().api_key;
    Redirect::temporary(&format!(
        "{KITE_LOGIN_URL}?v=3&api_key={}",
        urlencoding::encode(api_key)
    ))
}

/// Exchanges the broker's `request_token` for an access token and installs the lease.
///
/// # Errors
/// Returns 400 for a failed or incomplete redirect, 401 if the broker rejects
/// the token, and 500 when no API secret is configured.
pub async fn login_callback(
    State(state): State<AppState>,
    Query(query): Query<LoginCallbackQuery>,
) -> Result<Json<LoginResponse>, ApiError> {
    if let Some(status) = query.status.as_deref().filter(|s| *s != "success") {
        return Err(ApiError::BadRequest(format!("login was not completed: {status}")));
    }
    let request_token = query
        .request_token
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("request_token is required".to_string()))?;
    let api_secret = state
        .login
        .api_secret
        .as_ref()
        .ok_or_else(|| ApiError::Internal("API secret is not configured".to_string()))?;

    let lease = state.login.client.login(&request_token, api_secret).await?;

    Ok(Json(LoginResponse {
        status: "logged_in".to_string(),
        expires_at: lease.expires_at(),
    }))
}

/// Stores quantity and TP/SL percentages for one symbol (or `DEFAULT`).
///
/// # Errors
/// Returns 401 without a valid login, 400 for an invalid config, and 500 if
/// the store cannot be persisted.
pub async fn update_trade_config(
    State(state): State<AppState>,
    Json(req): Json<UpdateTradeConfigRequest>,
) -> Result<Json<TradeConfig>, ApiError> {
    if !state.credentials.is_logged_in() {
        return Err(ApiError::Unauthorized("login required".to_string()));
    }

    let config = TradeConfig {
        qty: req.qty,
        tp: req.tp,
        sl: req.sl,
    };
    state.dispatcher.trade_configs().upsert(&req.symbol, config)?;

    Ok(Json(config))
}

pub async fn list_trade_configs(State(state): State<AppState>) -> Json<BTreeMap<String, TradeConfig>> {
    Json(state.dispatcher.trade_configs().snapshot())
}

pub async fn list_monitors(State(state): State<AppState>) -> Json<Vec<MonitorSnapshot>> {
    Json(state.dispatcher.supervisor().list().await)
}

/// # Errors
/// Returns 404 for an unknown monitor id.
pub async fn get_monitor(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<MonitorSnapshot>, ApiError> {
    state
        .dispatcher
        .supervisor()
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no monitor with id {id}")))
}

/// Stops watching a position without placing an exit order.
///
/// # Errors
/// Returns 404 for an unknown monitor id.
pub async fn cancel_monitor(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<Json<MonitorSnapshot>, ApiError> {
    let snapshot = state.dispatcher.supervisor().cancel(id).await?;
    tracing::info!(monitor_id = id, tradingsymbol = %snapshot.tradingsymbol, "Monitor cancelled via API");
    Ok(Json(snapshot))
}
