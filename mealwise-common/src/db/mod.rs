//! Database connection setup and schema migrations

pub mod init;
pub mod migrations;

pub use init::*;
pub use migrations::{current_version, downgrade_to, latest_version, run_migrations, upgrade_to};
