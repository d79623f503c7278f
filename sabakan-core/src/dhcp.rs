//! DHCP decision logic (spec.md §4.9, supplement drawn from
//! `original_source`'s DHCP handler). Pure functions only — framing and
//! sending the actual DHCP wire packets is out of scope; this module
//! decides *what* a DHCP server fronting sabakan should hand out, not
//! how it's encoded on the wire.

use std::net::Ipv4Addr;

use crate::error::{Result, SabakanError};
use crate::types::{parse_ipv4_cidr, DhcpConfig, IpamConfig, Machine};

/// What a DHCP server should offer a requesting NIC, derived from the
/// machine's already-registered address and the DHCP config.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseOffer {
    pub address: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub lease_minutes: u32,
    pub dns_servers: Vec<String>,
}

/// Builds the lease offer for `serial`'s NIC at position `nic`, by
/// looking up the address sabakan already assigned it at registration
/// time rather than deriving one independently — DHCP here hands out
/// addresses IPAM already committed to, it never allocates its own.
pub fn offer_for(
    machine: &Machine,
    nic: usize,
    ipam: &IpamConfig,
    dhcp: &DhcpConfig,
) -> Result<LeaseOffer> {
    let address: Ipv4Addr = machine
        .ipv4
        .get(nic)
        .ok_or_else(|| SabakanError::BadRequest(format!("machine has no NIC {nic}")))?
        .parse()
        .map_err(|_| SabakanError::BadRequest("stored address is not valid IPv4".into()))?;

    let gateway = gateway_for(ipam, dhcp, address)?;

    Ok(LeaseOffer {
        address,
        gateway,
        lease_minutes: dhcp.lease_minutes,
        dns_servers: dhcp.dns_servers.clone(),
    })
}

fn netmask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    }
}

/// Derives the gateway address for the rack/NIC tier the given address
/// falls in: `NodeRangeMask` (spec.md §4.1), not the pool's own prefix,
/// is what delimits one rack's tier, so the gateway is that tier's
/// network address plus `gateway_offset` (spec.md §6) — not the whole
/// pool's, which would put every rack behind the same gateway.
pub fn gateway_for(ipam: &IpamConfig, dhcp: &DhcpConfig, address: Ipv4Addr) -> Result<Ipv4Addr> {
    let (pool_base, pool_prefix_len) = parse_ipv4_cidr(&ipam.node_ipv4_pool)?;
    let pool_mask = netmask(pool_prefix_len);
    if u32::from(address) & pool_mask != u32::from(pool_base) & pool_mask {
        return Err(SabakanError::BadRequest(format!(
            "address {address} is not within the configured node pool"
        )));
    }

    let tier_mask = netmask(ipam.node_range_mask);
    let subnet_base = u32::from(address) & tier_mask;
    let gateway = subnet_base
        .checked_add(dhcp.gateway_offset)
        .ok_or_else(|| SabakanError::BadRequest("gateway offset overflows subnet".into()))?;
    Ok(Ipv4Addr::from(gateway))
}

/// Chooses which iPXE firmware image to hand out for a boot request, per
/// the client's reported architecture (`is_efi`). Mirrors the original's
/// split between BIOS and UEFI iPXE binaries — sabakan never builds a
/// generic "pick a binary" abstraction because there are exactly two.
pub fn ipxe_url_for(dhcp: &DhcpConfig, is_efi: bool) -> Option<&str> {
    if is_efi {
        dhcp.ipxe_efi_url.as_deref()
    } else {
        dhcp.ipxe_usb_url.as_deref()
    }
}
