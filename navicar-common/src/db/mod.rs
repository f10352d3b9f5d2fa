//! Database models and queries

pub mod accounts;
pub mod init;
pub mod migrations;
pub mod models;
pub mod settings;

pub use accounts::AccountStore;
pub use init::init_database;
pub use migrations::{run_migrations, CURRENT_SCHEMA_VERSION};
pub use models::{Account, NewAccount};
