//! `GET/PUT /config/ipam`, `GET/PUT /config/dhcp` (spec.md §6).

use axum::extract::State;
use axum::{http::StatusCode, Json};

use sabakan_core::ipam::put_ipam_config;
use sabakan_core::types::{DhcpConfig, IpamConfig};
use sabakan_core::SabakanError;

use crate::error::AppError;
use crate::state::AppState;

pub async fn get_ipam(State(state): State<AppState>) -> Result<Json<IpamConfig>, AppError> {
    let config = state
        .caches
        .ipam
        .get()
        .await
        .ok_or(SabakanError::NotFound)?;
    Ok(Json((*config).clone()))
}

pub async fn put_ipam(
    State(state): State<AppState>,
    Json(config): Json<IpamConfig>,
) -> Result<StatusCode, AppError> {
    put_ipam_config(state.store.as_ref(), &state.prefix, &config).await?;
    Ok(StatusCode::OK)
}

pub async fn get_dhcp(State(state): State<AppState>) -> Result<Json<DhcpConfig>, AppError> {
    let config = state
        .caches
        .dhcp
        .get()
        .await
        .ok_or(SabakanError::NotFound)?;
    Ok(Json((*config).clone()))
}

pub async fn put_dhcp(
    State(state): State<AppState>,
    Json(config): Json<DhcpConfig>,
) -> Result<StatusCode, AppError> {
    let value = serde_json::to_vec(&config).map_err(|e| SabakanError::Store(e.into()))?;
    state
        .store
        .put(&sabakan_core::store::keys::dhcp(&state.prefix), value)
        .await?;
    Ok(StatusCode::OK)
}
