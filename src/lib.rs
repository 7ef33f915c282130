pub mod analysis;
pub mod commands;
pub mod error;
pub mod models;
pub mod store;

pub use commands::growth::{CapabilityCheck, GrowthService, OwnerOrStaff, QuotaStatus};
pub use error::{ErrorKind, ErrorResponse, GrowthError};

/// Install `env_logger` with an `info` default. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
