//! Core domain types (spec.md §3): pure value types, no store dependency.

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::lifecycle::Status;

/// BMC type for iDRAC-9 controllers. Kept as a plain string constant
/// rather than a closed enum — the original never validated BMC type
/// against a fixed set, only checked presence.
pub const BMC_IDRAC9: &str = "iDRAC-9";
/// BMC type for IPMI-2.0 controllers.
pub const BMC_IPMI2: &str = "IPMI-2.0";

/// Singleton IPAM configuration (spec.md §3). Immutable once any machine
/// is registered (`SabakanError::MachinesExist`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IpamConfig {
    pub max_nodes_in_rack: u32,
    pub node_ipv4_pool: String,
    pub node_ipv6_pool: Option<String>,
    pub node_range_size: u32,
    pub node_range_mask: u8,
    pub node_index_offset: u32,
    pub node_ip_per_node: u32,
    pub bmc_ipv4_pool: String,
    pub bmc_range_size: u32,
    pub bmc_range_mask: u8,
}

/// Singleton DHCP configuration (spec.md §3). Mutable at any time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpConfig {
    pub gateway_offset: u32,
    pub lease_minutes: u32,
    #[serde(default)]
    pub dns_servers: Vec<String>,
    #[serde(default)]
    pub ipxe_efi_url: Option<String>,
    #[serde(default)]
    pub ipxe_usb_url: Option<String>,
}

/// BMC interface descriptor for a `Machine`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MachineBmc {
    #[serde(default)]
    pub ipv4: String,
    #[serde(default)]
    pub ipv6: String,
    #[serde(default, rename = "type")]
    pub bmc_type: String,
}

/// A registered machine (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    pub serial: String,
    #[serde(default)]
    pub product: String,
    #[serde(default)]
    pub datacenter: String,
    pub rack: u32,
    #[serde(rename = "index-in-rack")]
    pub index_in_rack: u32,
    pub role: String,
    pub ipv4: Vec<String>,
    #[serde(default)]
    pub ipv6: Vec<String>,
    pub bmc: MachineBmc,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(rename = "register-date")]
    pub register_date: DateTime<Utc>,
    #[serde(rename = "retire-date")]
    pub retire_date: Option<DateTime<Utc>>,
    pub status: Status,
}

impl Machine {
    pub fn store_key(&self, prefix: &str) -> String {
        crate::store::keys::machine(prefix, &self.serial)
    }
}

/// Opaque per-(serial, disk) disk-encryption key (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub serial: String,
    pub disk: String,
    pub data: Vec<u8>,
}

/// An ignition template revision for a role (spec.md §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IgnitionTemplate {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Maximum number of ignition templates retained per role (spec.md §4.7).
pub const MAX_IGNITIONS: usize = 5;

/// Asset metadata (spec.md §3). The body bytes live behind
/// `AssetBodyStore`, a separate trait — the actual blob backend is
/// explicitly out of scope for this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub id: u64,
    pub name: String,
    pub content_type: String,
    pub sha256: String,
    pub version: u64,
    pub date: DateTime<Utc>,
    pub size: u64,
}

static ROLE_PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();

/// The regex role names must match (spec.md §3): `[0-9a-zA-Z._-]+`.
pub fn is_valid_role(role: &str) -> bool {
    let re = ROLE_PATTERN.get_or_init(|| regex::Regex::new(r"^[0-9a-zA-Z._-]+$").unwrap());
    re.is_match(role)
}

/// Parses a dotted IPv4 CIDR string ("a.b.c.d/len") into its network
/// address and prefix length. Kept minimal and dependency-free: the
/// `Store`/IPAM layers only ever need the network address and mask.
pub fn parse_ipv4_cidr(cidr: &str) -> crate::error::Result<(Ipv4Addr, u8)> {
    let (addr, len) = cidr
        .split_once('/')
        .ok_or_else(|| crate::error::SabakanError::BadRequest(format!("invalid CIDR: {cidr}")))?;
    let addr: Ipv4Addr = addr
        .parse()
        .map_err(|_| crate::error::SabakanError::BadRequest(format!("invalid CIDR: {cidr}")))?;
    let len: u8 = len
        .parse()
        .map_err(|_| crate::error::SabakanError::BadRequest(format!("invalid CIDR: {cidr}")))?;
    if len > 32 {
        return Err(crate::error::SabakanError::BadRequest(format!(
            "invalid CIDR: {cidr}"
        )));
    }
    Ok((addr, len))
}

/// Same as [`parse_ipv4_cidr`] for IPv6 pools.
pub fn parse_ipv6_cidr(cidr: &str) -> crate::error::Result<(Ipv6Addr, u8)> {
    let (addr, len) = cidr
        .split_once('/')
        .ok_or_else(|| crate::error::SabakanError::BadRequest(format!("invalid CIDR: {cidr}")))?;
    let addr: Ipv6Addr = addr
        .parse()
        .map_err(|_| crate::error::SabakanError::BadRequest(format!("invalid CIDR: {cidr}")))?;
    let len: u8 = len
        .parse()
        .map_err(|_| crate::error::SabakanError::BadRequest(format!("invalid CIDR: {cidr}")))?;
    if len > 128 {
        return Err(crate::error::SabakanError::BadRequest(format!(
            "invalid CIDR: {cidr}"
        )));
    }
    Ok((addr, len))
}
