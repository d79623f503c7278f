//! Machine lifecycle state machine (spec.md §4.5, component E).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SabakanError};
use crate::store::{keys, Guard, Op, Store};
use crate::types::Machine;

/// A machine's lifecycle state (spec.md §3/§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MachineState {
    Uninitialized,
    Healthy,
    Unhealthy,
    Unreachable,
    Updating,
    Retiring,
    Retired,
}

impl std::fmt::Display for MachineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Uninitialized => "uninitialized",
            Self::Healthy => "healthy",
            Self::Unhealthy => "unhealthy",
            Self::Unreachable => "unreachable",
            Self::Updating => "updating",
            Self::Retiring => "retiring",
            Self::Retired => "retired",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for MachineState {
    type Err = SabakanError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "uninitialized" => Self::Uninitialized,
            "healthy" => Self::Healthy,
            "unhealthy" => Self::Unhealthy,
            "unreachable" => Self::Unreachable,
            "updating" => Self::Updating,
            "retiring" => Self::Retiring,
            "retired" => Self::Retired,
            other => return Err(SabakanError::BadRequest(format!("unknown state: {other}"))),
        })
    }
}

/// Per-machine status (spec.md §3). `duration_secs` is derived at read
/// time from `timestamp` and is never itself persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub state: MachineState,
    pub timestamp: DateTime<Utc>,
}

impl Status {
    pub fn new(state: MachineState, now: DateTime<Utc>) -> Self {
        Self {
            state,
            timestamp: now,
        }
    }

    /// Seconds since the last transition, computed at read time — never stored.
    pub fn duration_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_seconds().max(0)
    }
}

/// Validates a proposed transition against the state diagram in spec.md
/// §4.5. Returns `Ok(())` if legal, else a structured
/// `SabakanError::InvalidStateTransition { from, to }`.
pub fn validate_transition(from: MachineState, to: MachineState) -> Result<()> {
    use MachineState::*;

    let legal = match (from, to) {
        (Uninitialized, Healthy) => true,
        (Healthy, Unhealthy) | (Unhealthy, Healthy) => true,
        (Healthy, Unreachable) | (Unreachable, Healthy) => true,
        (Healthy, Updating) | (Updating, Healthy) => true,
        (Updating, Unhealthy) => true,
        // "any non-retired state" -> retiring
        (Uninitialized | Healthy | Unhealthy | Unreachable | Updating, Retiring) => true,
        (Retiring, Retired) => true,
        // re-commission
        (Retired, Uninitialized) => true,
        _ => false,
    };

    if legal {
        Ok(())
    } else {
        Err(SabakanError::InvalidStateTransition { from, to })
    }
}

/// Whether this transition retires the machine (`RetireDate` is set).
pub fn sets_retire_date(from: MachineState, to: MachineState) -> bool {
    to == MachineState::Retiring && from != MachineState::Retired
}

/// Whether this transition re-commissions a retired machine
/// (`RetireDate` is cleared).
pub fn clears_retire_date(from: MachineState, to: MachineState) -> bool {
    from == MachineState::Retired && to == MachineState::Uninitialized
}

/// Reads `serial`'s current state, validates the transition to
/// `new_state`, and commits it atomically (spec.md §4.5 `SetState`).
///
/// A transition into `Retired` is additionally gated on no encryption
/// key remaining for the machine (spec.md §4.6) — checked by scanning
/// the crypt prefix immediately before the commit. The commit itself is
/// a single CAS guarded on the machine's observed revision, exactly as
/// spec.md prescribes; the crypt scan is not itself part of that guard,
/// so a key inserted in the narrow window between the scan and the CAS
/// is not caught here — this mirrors the source system's behavior,
/// which checks-then-commits rather than guarding on crypt absence.
pub async fn set_state(
    store: &dyn Store,
    prefix: &str,
    serial: &str,
    new_state: MachineState,
) -> Result<Machine> {
    let key = keys::machine(prefix, serial);
    let kv = store.get(&key).await?.ok_or(SabakanError::NotFound)?;
    let mut machine: Machine =
        serde_json::from_slice(&kv.value).map_err(|e| SabakanError::Store(e.into()))?;

    let from = machine.status.state;
    validate_transition(from, new_state)?;

    if new_state == MachineState::Retired {
        let crypts = store.scan_prefix(&keys::crypts_prefix(prefix, serial)).await?;
        if !crypts.is_empty() {
            return Err(SabakanError::EncryptionKeyExists);
        }
    }

    let now = Utc::now();
    machine.status = Status::new(new_state, now);
    if sets_retire_date(from, new_state) {
        machine.retire_date = Some(now);
    } else if clears_retire_date(from, new_state) {
        machine.retire_date = None;
    }

    let value = serde_json::to_vec(&machine).map_err(|e| SabakanError::Store(e.into()))?;
    let applied = store
        .txn(
            vec![Guard::at_revision(&key, kv.revision)],
            vec![Op::put(&key, value)],
            Vec::new(),
        )
        .await?;
    if !applied {
        return Err(SabakanError::Conflicted);
    }
    Ok(machine)
}
