//! IPAM: address arithmetic (component A) and registration (component D).

pub mod address;
pub mod registration;

pub use address::{bmc_ipv4, node_ipv4, node_ipv6};
pub use registration::{
    delete_machine, put_ipam_config, register, RackIndexSet, RegistrationRequest, ROLE_BOOT,
};
