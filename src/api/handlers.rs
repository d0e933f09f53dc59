use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
    Json,
};
use serde::Serialize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

use super::{ApiError, AppState};
use crate::config::{ConfigUpdate, StakingConfig, StrategyConfig};
use crate::persistence::EventEntry;
use crate::status::{summarize, LedgerSummary, StatusSnapshot};
use crate::strategy::TradeRecord;

/// Lines returned by `/logs`.
pub const LOG_LINES: usize = 50;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: StatusSnapshot,
    pub summary: LedgerSummary,
}

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub strategy: StrategyConfig,
    pub staking: StakingConfig,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub message: String,
}

/// Reject requests without the configured bearer password.
pub async fn require_password(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(expected) = &state.password {
        let supplied = request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if supplied != Some(expected.as_str()) {
            return Err(ApiError::unauthorized());
        }
    }
    Ok(next.run(request).await)
}

/// GET /status
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<StatusResponse>, ApiError> {
    let records = state.ledger.all_records_newest_first()?;
    Ok(Json(StatusResponse {
        status: state.board.snapshot().await,
        summary: summarize(&records),
    }))
}

/// GET /trades
pub async fn trades(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<TradeRecord>>, ApiError> {
    Ok(Json(state.ledger.all_records_newest_first()?))
}

/// GET /logs
pub async fn logs(State(state): State<Arc<AppState>>) -> Result<Json<Vec<EventEntry>>, ApiError> {
    Ok(Json(state.events.recent_events(LOG_LINES)?))
}

/// POST /force-close
pub async fn force_close(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    let snapshot = state.board.snapshot().await;
    let Some(position) = snapshot.position else {
        return Err(ApiError::conflict("no open position"));
    };

    state.force_close.store(true, Ordering::SeqCst);
    info!(symbol = %position.symbol, "Force-close requested via API");

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            message: format!(
                "{} {} position will be closed on the next tick",
                position.direction, position.symbol
            ),
        }),
    ))
}

/// POST /config
pub async fn update_config(
    State(state): State<Arc<AppState>>,
    Json(update): Json<ConfigUpdate>,
) -> Result<Json<ConfigResponse>, ApiError> {
    let next = state.config.update(&update).await?;
    info!(?update, "Configuration updated via API");

    Ok(Json(ConfigResponse {
        strategy: next.strategy,
        staking: next.staking,
    }))
}
