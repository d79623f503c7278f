//! Persisted key layout (spec.md §6). `prefix` is the configurable `P`.

pub fn ipam(prefix: &str) -> String {
    format!("{prefix}/ipam")
}

pub fn dhcp(prefix: &str) -> String {
    format!("{prefix}/dhcp")
}

pub fn machines_prefix(prefix: &str) -> String {
    format!("{prefix}/machines/")
}

pub fn machine(prefix: &str, serial: &str) -> String {
    format!("{prefix}/machines/{serial}")
}

pub fn rack_index(prefix: &str, rack: u32) -> String {
    format!("{prefix}/rack-indices/{rack}")
}

pub fn crypts_prefix(prefix: &str, serial: &str) -> String {
    format!("{prefix}/crypts/{serial}/")
}

pub fn crypt(prefix: &str, serial: &str, disk: &str) -> String {
    format!("{prefix}/crypts/{serial}/{disk}")
}

pub fn ignitions_prefix(prefix: &str, role: &str) -> String {
    format!("{prefix}/ignitions/{role}/")
}

pub fn ignition(prefix: &str, role: &str, id: &str) -> String {
    format!("{prefix}/ignitions/{role}/{id}")
}

pub fn assets_prefix(prefix: &str) -> String {
    format!("{prefix}/assets/")
}

pub fn asset(prefix: &str, name: &str) -> String {
    format!("{prefix}/assets/{name}")
}
