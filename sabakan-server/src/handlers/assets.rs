//! `GET/PUT/DELETE /assets/{name}` (spec.md §6). Metadata lives in
//! `sabakan_core::asset`; bytes go through this server's
//! [`crate::asset_body::AssetBodyStore`].

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use sabakan_core::asset;
use sabakan_core::types::AssetMeta;

use crate::error::AppError;
use crate::state::AppState;

pub async fn get_asset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let meta = asset::get(state.store.as_ref(), &state.prefix, &name).await?;
    let body = state.asset_bodies.get(&name).await?;
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        meta.content_type
            .parse()
            .unwrap_or(header::HeaderValue::from_static("application/octet-stream")),
    );
    Ok((headers, body).into_response())
}

pub async fn put_asset(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<AssetMeta>), AppError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let sha256 = asset::sha256_hex(&body);
    let size = body.len() as u64;

    state.asset_bodies.put(&name, body.to_vec()).await?;
    let meta = asset::put(
        state.store.as_ref(),
        &state.prefix,
        &name,
        content_type,
        sha256,
        size,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(meta)))
}

pub async fn delete_asset(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    asset::delete(state.store.as_ref(), &state.prefix, &name).await?;
    state.asset_bodies.delete(&name).await?;
    Ok(StatusCode::OK)
}
