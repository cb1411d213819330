//! PTZ API Routes

use crate::error::Error;
use crate::ptz_controller::{PtzControlRequest, PtzControlResponse, PtzStatus};
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};

/// Symbol that stops motion instead of moving
const STOP_SYMBOL: &str = "stop";

/// POST /ptz_control
///
/// `{"direction": "stop"}` stops, any other symbol runs a timed move.
pub async fn ptz_control(
    State(state): State<AppState>,
    payload: Result<Json<PtzControlRequest>, JsonRejection>,
) -> Json<PtzControlResponse> {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "PTZ control rejected: invalid body");
            return Json(PtzControlResponse::failure(None, rejection.body_text()));
        }
    };

    let direction = request.direction;
    tracing::info!(direction = %direction, "PTZ control request received");

    let result = if direction == STOP_SYMBOL {
        state.controller.stop_ptz().await
    } else {
        state.controller.move_ptz(&direction).await.map(|_| ())
    };

    match result {
        Ok(()) => {
            tracing::info!(direction = %direction, "PTZ control succeeded");
            Json(PtzControlResponse::success(direction))
        }
        Err(e) => {
            tracing::error!(direction = %direction, error = %e, "PTZ control failed");
            Json(PtzControlResponse::failure(Some(direction), e.to_string()))
        }
    }
}

/// GET /ptz_status
pub async fn ptz_status(State(state): State<AppState>) -> Result<Json<PtzStatus>, Error> {
    state.controller.ptz_status().await.map(Json)
}
