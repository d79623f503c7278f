//! Address arithmetic (spec.md §4.1, component A).
//!
//! Pure functions only — no I/O, no locking. CPU-bound paths never block
//! (spec.md §5).

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::error::{Result, SabakanError};
use crate::types::{parse_ipv4_cidr, parse_ipv6_cidr, IpamConfig};

/// The rack-local index space spans `[0, NodeIndexOffset +
/// MaxNodesInRack)`: indices below `NodeIndexOffset` are reserved
/// outside this allocator, `NodeIndexOffset` is the boot server's
/// dedicated slot, and `MaxNodesInRack` further slots follow it
/// (spec.md §4.4 step 4, validated by seed scenario S1).
fn max_index_in_rack(config: &IpamConfig) -> u32 {
    config.node_index_offset + config.max_nodes_in_rack
}

fn node_offset(config: &IpamConfig, rack: u32, index_in_rack: u32, nic: u32) -> Result<u128> {
    if index_in_rack >= max_index_in_rack(config) {
        return Err(SabakanError::BadRequest(format!(
            "index-in-rack {index_in_rack} exceeds max-nodes-in-rack {}",
            config.max_nodes_in_rack
        )));
    }
    if nic >= config.node_ip_per_node {
        return Err(SabakanError::BadRequest(format!(
            "nic ordinal {nic} exceeds node-ip-per-node {}",
            config.node_ip_per_node
        )));
    }
    let tier_size: u128 = 1u128 << config.node_range_size;
    let rack_block = tier_size * config.node_ip_per_node as u128;
    Ok(rack as u128 * rack_block + nic as u128 * tier_size + index_in_rack as u128)
}

/// Computes the IPv4 address for NIC `nic` of the machine at
/// `(rack, index_in_rack)`, per the formula in spec.md §4.1.
pub fn node_ipv4(config: &IpamConfig, rack: u32, index_in_rack: u32, nic: u32) -> Result<Ipv4Addr> {
    let (base, _prefix_len) = parse_ipv4_cidr(&config.node_ipv4_pool)?;
    let offset = node_offset(config, rack, index_in_rack, nic)?;
    let addr = u32::from(base)
        .checked_add(offset as u32)
        .ok_or_else(|| SabakanError::BadRequest("address overflow".into()))?;
    let addr = Ipv4Addr::from(addr);
    ensure_in_pool_v4(&config.node_ipv4_pool, addr)?;
    Ok(addr)
}

/// Computes the IPv6 address for NIC `nic`, if an IPv6 pool is configured.
pub fn node_ipv6(
    config: &IpamConfig,
    rack: u32,
    index_in_rack: u32,
    nic: u32,
) -> Result<Option<Ipv6Addr>> {
    let Some(pool) = &config.node_ipv6_pool else {
        return Ok(None);
    };
    let (base, _prefix_len) = parse_ipv6_cidr(pool)?;
    let offset = node_offset(config, rack, index_in_rack, nic)?;
    let addr = u128::from(base)
        .checked_add(offset)
        .ok_or_else(|| SabakanError::BadRequest("address overflow".into()))?;
    let addr = Ipv6Addr::from(addr);
    ensure_in_pool_v6(pool, addr)?;
    Ok(Some(addr))
}

/// Computes the BMC IPv4 address for the machine at `(rack, index_in_rack)`.
/// One address per machine — no NIC dimension.
pub fn bmc_ipv4(config: &IpamConfig, rack: u32, index_in_rack: u32) -> Result<Ipv4Addr> {
    if index_in_rack >= max_index_in_rack(config) {
        return Err(SabakanError::BadRequest(format!(
            "index-in-rack {index_in_rack} exceeds max-nodes-in-rack {}",
            config.max_nodes_in_rack
        )));
    }
    let (base, _prefix_len) = parse_ipv4_cidr(&config.bmc_ipv4_pool)?;
    let tier_size: u128 = 1u128 << config.bmc_range_size;
    let offset = rack as u128 * tier_size + index_in_rack as u128;
    let addr = u32::from(base)
        .checked_add(offset as u32)
        .ok_or_else(|| SabakanError::BadRequest("address overflow".into()))?;
    let addr = Ipv4Addr::from(addr);
    ensure_in_pool_v4(&config.bmc_ipv4_pool, addr)?;
    Ok(addr)
}

fn ensure_in_pool_v4(cidr: &str, addr: Ipv4Addr) -> Result<()> {
    let (base, prefix_len) = parse_ipv4_cidr(cidr)?;
    let mask: u32 = if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - prefix_len)
    };
    if u32::from(addr) & mask != u32::from(base) & mask {
        return Err(SabakanError::BadRequest(format!(
            "computed address {addr} falls outside pool {cidr}"
        )));
    }
    Ok(())
}

fn ensure_in_pool_v6(cidr: &str, addr: Ipv6Addr) -> Result<()> {
    let (base, prefix_len) = parse_ipv6_cidr(cidr)?;
    let mask: u128 = if prefix_len == 0 {
        0
    } else {
        u128::MAX << (128 - prefix_len)
    };
    if u128::from(addr) & mask != u128::from(base) & mask {
        return Err(SabakanError::BadRequest(format!(
            "computed address {addr} falls outside pool {cidr}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> IpamConfig {
        IpamConfig {
            max_nodes_in_rack: 28,
            node_ipv4_pool: "10.69.0.0/20".into(),
            node_ipv6_pool: None,
            node_range_size: 6,
            node_range_mask: 26,
            node_index_offset: 3,
            node_ip_per_node: 3,
            bmc_ipv4_pool: "10.72.16.0/20".into(),
            bmc_range_size: 5,
            bmc_range_mask: 20,
        }
    }

    // Seed scenario S3 (spec.md §8): rack=0, index=3.
    #[test]
    fn s3_address_determinism() {
        let c = config();
        assert_eq!(node_ipv4(&c, 0, 3, 0).unwrap(), "10.69.0.3".parse().unwrap());
        assert_eq!(
            node_ipv4(&c, 0, 3, 1).unwrap(),
            "10.69.0.67".parse().unwrap()
        );
        assert_eq!(
            node_ipv4(&c, 0, 3, 2).unwrap(),
            "10.69.0.131".parse().unwrap()
        );
    }

    #[test]
    fn addresses_are_unique_across_rack_index_nic() {
        let c = config();
        let mut seen = std::collections::HashSet::new();
        for rack in 0..3u32 {
            for idx in 0..c.max_nodes_in_rack {
                for nic in 0..c.node_ip_per_node {
                    let addr = node_ipv4(&c, rack, idx, nic).unwrap();
                    assert!(seen.insert(addr), "duplicate address {addr}");
                }
            }
        }
    }

    #[test]
    fn index_at_or_beyond_max_nodes_rejected() {
        let c = config();
        assert!(node_ipv4(&c, 0, c.node_index_offset + c.max_nodes_in_rack, 0).is_err());
    }

    #[test]
    fn bmc_has_one_address_per_machine() {
        let c = config();
        assert_eq!(bmc_ipv4(&c, 0, 3).unwrap(), "10.72.16.3".parse().unwrap());
    }
}
