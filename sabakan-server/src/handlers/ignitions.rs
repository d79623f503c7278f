//! `GET/POST/DELETE /ignitions/{role}[/id]` (spec.md §6), gated behind the
//! `ignition-routes` feature.
//!
//! spec.md §9 Open Question (a): the source left this route commented out
//! at the server while template persistence itself was fully implemented
//! — ambiguous whether that was deliberate suspension or an oversight.
//! Exposed here behind a feature flag, off by default, rather than
//! silently guessed either way.

use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::{http::StatusCode, Json};
use serde::Deserialize;

use sabakan_core::ignition;
use sabakan_core::types::IgnitionTemplate;

use crate::error::AppError;
use crate::state::AppState;

pub async fn list_ignitions(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> Result<Json<Vec<IgnitionTemplate>>, AppError> {
    let templates = ignition::list(state.store.as_ref(), &state.prefix, &role).await?;
    Ok(Json(templates))
}

pub async fn get_ignition(
    State(state): State<AppState>,
    Path((role, id)): Path<(String, String)>,
) -> Result<Json<IgnitionTemplate>, AppError> {
    let template = ignition::get(state.store.as_ref(), &state.prefix, &role, Some(&id)).await?;
    Ok(Json(template))
}

#[derive(Debug, Deserialize)]
pub struct PutIgnitionBody {
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

pub async fn put_ignition(
    State(state): State<AppState>,
    Path(role): Path<String>,
    Json(body): Json<PutIgnitionBody>,
) -> Result<(StatusCode, Json<IgnitionTemplate>), AppError> {
    let template = ignition::put(
        state.store.as_ref(),
        &state.prefix,
        &role,
        body.content,
        body.metadata,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(template)))
}

pub async fn delete_ignition(
    State(state): State<AppState>,
    Path((role, id)): Path<(String, String)>,
) -> Result<StatusCode, AppError> {
    ignition::delete(state.store.as_ref(), &state.prefix, &role, &id).await?;
    Ok(StatusCode::OK)
}
