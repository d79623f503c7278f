//! `GET/PUT /crypts/{serial}/{disk}`, `DELETE /crypts/{serial}` (spec.md §6).

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use serde_json::json;

use sabakan_core::crypt;

use crate::error::AppError;
use crate::state::AppState;

pub async fn get_crypt(
    State(state): State<AppState>,
    Path((serial, disk)): Path<(String, String)>,
) -> Result<Bytes, AppError> {
    let data = crypt::get(state.store.as_ref(), &state.prefix, &serial, &disk).await?;
    Ok(Bytes::from(data))
}

pub async fn put_crypt(
    State(state): State<AppState>,
    Path((serial, disk)): Path<(String, String)>,
    body: Bytes,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    crypt::put(
        state.store.as_ref(),
        &state.prefix,
        &serial,
        &disk,
        body.to_vec(),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(json!({"status": "created"}))))
}

pub async fn delete_crypts(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<StatusCode, AppError> {
    crypt::delete_all(state.store.as_ref(), &state.prefix, &serial).await?;
    Ok(StatusCode::OK)
}
