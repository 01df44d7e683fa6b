//! Shared helpers for the workspace binaries.
//! - Logging initialization on top of `tracing-subscriber`.
//! - Startup checks for the host data directory.

pub mod env;

pub mod utils {
    pub mod logging;
}
