//! CLI surface (spec.md §6): `-http`, `-etcd-servers`, `-etcd-prefix`,
//! `-etcd-timeout`, `-dhcp-bind`, `-dhcp-interface` (required),
//! `-dhcp-ipxe-firmware-url`.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "sabakan", about = "Rack-aware bare-metal provisioning service")]
pub struct Config {
    /// REST listen address.
    #[arg(long = "http", env = "SABAKAN_HTTP", default_value = "0.0.0.0:10080")]
    pub http_addr: String,

    /// Comma-separated etcd endpoints.
    #[arg(
        long = "etcd-servers",
        env = "SABAKAN_ETCD_SERVERS",
        default_value = "http://localhost:2379",
        value_delimiter = ','
    )]
    pub etcd_servers: Vec<String>,

    /// Key prefix under which all sabakan state is stored.
    #[arg(long = "etcd-prefix", env = "SABAKAN_ETCD_PREFIX", default_value = "/sabakan")]
    pub etcd_prefix: String,

    /// Timeout, in seconds, for etcd requests.
    #[arg(long = "etcd-timeout", env = "SABAKAN_ETCD_TIMEOUT", default_value_t = 5)]
    pub etcd_timeout_secs: u64,

    /// Bind address for the DHCP4 collaborator (not implemented by this
    /// crate — see spec.md §1 Non-goals; carried only so `sabakan`'s CLI
    /// surface matches what a fronting DHCP process would expect).
    #[arg(long = "dhcp-bind", env = "SABAKAN_DHCP_BIND", default_value = "0.0.0.0:67")]
    pub dhcp_bind: String,

    /// Network interface the DHCP collaborator listens on.
    #[arg(long = "dhcp-interface", env = "SABAKAN_DHCP_INTERFACE")]
    pub dhcp_interface: String,

    /// Override URL for the iPXE firmware image served to DHCP clients.
    #[arg(long = "dhcp-ipxe-firmware-url", env = "SABAKAN_DHCP_IPXE_FIRMWARE_URL")]
    pub dhcp_ipxe_firmware_url: Option<String>,
}
