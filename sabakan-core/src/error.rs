//! Error taxonomy shared by every component in this crate.
//!
//! Frontends (the REST server, a future GraphQL layer) map these kinds to
//! transport-specific codes; `http_status` gives the REST mapping used by
//! `sabakan-server`.

use thiserror::Error;

use crate::lifecycle::MachineState;

pub type Result<T> = std::result::Result<T, SabakanError>;

#[derive(Debug, Error)]
pub enum SabakanError {
    #[error("not found")]
    NotFound,

    #[error("conflicted")]
    Conflicted,

    #[error("IPAM is not configured")]
    IpamNotConfigured,

    #[error("machines already exist")]
    MachinesExist,

    #[error("rack is full")]
    RackFull,

    /// Carries both ends of the rejected transition as structured fields,
    /// not just a formatted string — the original communicated `from`/`to`
    /// only via a parseable message. `Display` still renders that original
    /// wire format, kept as a compatibility rendering only.
    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition {
        from: MachineState,
        to: MachineState,
    },

    #[error("machine is not retired")]
    MachineIsNotRetired,

    #[error("encryption key exists")]
    EncryptionKeyExists,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl SabakanError {
    /// REST status code for this error kind (see spec §6/§7).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflicted => 409,
            Self::IpamNotConfigured => 409,
            Self::MachinesExist => 409,
            Self::RackFull => 409,
            Self::InvalidStateTransition { .. } => 400,
            Self::MachineIsNotRetired => 409,
            Self::EncryptionKeyExists => 409,
            Self::BadRequest(_) => 400,
            Self::Store(_) => 500,
        }
    }
}
