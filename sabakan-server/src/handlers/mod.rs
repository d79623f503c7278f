pub mod assets;
pub mod config;
pub mod crypts;
#[cfg(feature = "ignition-routes")]
pub mod ignitions;
pub mod machines;
pub mod state;
