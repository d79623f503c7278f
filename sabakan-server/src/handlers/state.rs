//! `GET/PUT /state/{serial}` (spec.md §6) — machine lifecycle state as a
//! plain-text body, per the REST table's `text body in/out`.

use std::str::FromStr;

use axum::extract::{Path, State};
use axum::http::StatusCode;

use sabakan_core::lifecycle::{set_state, MachineState};
use sabakan_core::SabakanError;

use crate::error::AppError;
use crate::state::AppState;

pub async fn get_state(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<String, AppError> {
    let machine = state
        .caches
        .machines
        .get(&serial)
        .await
        .ok_or(SabakanError::NotFound)?;
    Ok(machine.status.state.to_string())
}

pub async fn put_state(
    State(state): State<AppState>,
    Path(serial): Path<String>,
    body: String,
) -> Result<StatusCode, AppError> {
    let new_state = MachineState::from_str(body.trim())?;
    set_state(state.store.as_ref(), &state.prefix, &serial, new_state).await?;
    Ok(StatusCode::OK)
}
