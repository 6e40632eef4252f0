//! Command implementations for the `forum` binary.

mod config;
mod extension;
mod serve;

pub use config::{parse_assignments, run_config_get, run_config_reset, run_config_set};
pub use extension::{
    Transition, run_install, run_list, run_token, run_transition, run_uninstall,
};
pub use serve::run_serve;
