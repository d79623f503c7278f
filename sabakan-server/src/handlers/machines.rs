//! `GET/POST /machines`, `DELETE /machines/{serial}` (spec.md §6).

use std::collections::{BTreeMap, HashMap};

use axum::extract::{Path, Query, State};
use axum::{http::StatusCode, Json};
use serde::Deserialize;

use sabakan_core::ipam::{delete_machine, register, RegistrationRequest};
use sabakan_core::query::{self, MachineQuery};
use sabakan_core::types::Machine;
use sabakan_core::SabakanError;

use crate::error::AppError;
use crate::state::AppState;

/// Query parameters are taken as a flat map rather than a typed struct:
/// `labels.<key>=<value>` and `without-labels.<key>=<value>` need
/// arbitrary keys, which `serde_urlencoded`'s struct deserializer can't
/// express directly.
fn query_from_params(params: &HashMap<String, String>) -> MachineQuery {
    let mut query = MachineQuery::default();
    for (key, value) in params {
        match key.as_str() {
            "serial" => query.serial = Some(value.clone()),
            "product" => query.product = Some(value.clone()),
            "datacenter" => query.datacenter = Some(value.clone()),
            "rack" => query.rack = value.parse().ok(),
            "role" => query.role = Some(value.clone()),
            "ipv4" => query.ipv4 = Some(value.clone()),
            "ipv6" => query.ipv6 = Some(value.clone()),
            "bmc-type" => query.bmc_type = Some(value.clone()),
            "state" => query.state = value.parse().ok(),
            _ => {
                if let Some(label_key) = key.strip_prefix("labels.") {
                    query.labels.insert(label_key.to_string(), value.clone());
                } else if let Some(label_key) = key.strip_prefix("without-labels.") {
                    query
                        .without_labels
                        .insert(label_key.to_string(), value.clone());
                }
            }
        }
    }
    query
}

pub async fn list_machines(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Machine>>, AppError> {
    let q = query_from_params(&params);
    let matches = query::run(&state.caches.machines, &q).await;
    if matches.is_empty() && state.caches.machines.len().await == 0 {
        return Err(SabakanError::NotFound.into());
    }
    Ok(Json(matches.into_iter().map(|m| (*m).clone()).collect()))
}

#[derive(Debug, Deserialize)]
pub struct RegisterBody {
    pub serial: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub datacenter: String,
    pub rack: u32,
    pub role: String,
    #[serde(default)]
    pub bmc_type: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl From<RegisterBody> for RegistrationRequest {
    fn from(body: RegisterBody) -> Self {
        RegistrationRequest {
            serial: body.serial,
            product: body.product,
            datacenter: body.datacenter,
            rack: body.rack,
            role: body.role,
            bmc_type: body.bmc_type,
            labels: body.labels,
        }
    }
}

pub async fn register_machines(
    State(state): State<AppState>,
    Json(bodies): Json<Vec<RegisterBody>>,
) -> Result<(StatusCode, Json<Vec<Machine>>), AppError> {
    let requests = bodies.into_iter().map(RegistrationRequest::from).collect();
    let machines = register(state.store.as_ref(), &state.prefix, requests).await?;
    Ok((StatusCode::CREATED, Json(machines)))
}

pub async fn delete_machine_handler(
    State(state): State<AppState>,
    Path(serial): Path<String>,
) -> Result<StatusCode, AppError> {
    delete_machine(state.store.as_ref(), &state.prefix, &serial).await?;
    Ok(StatusCode::OK)
}
