pub mod aggregate;
mod auth;
mod cli;
pub mod clock;
pub mod commands;
pub mod config;
mod database;
pub mod engine;
pub mod ipc;
pub mod ledger;
pub mod logging;
pub mod models;
pub mod network;
pub mod sync;

pub use crate::auth::{AuthManager, TokenEncryption};
pub use crate::commands::{Controller, Dashboard};
pub use crate::engine::TimerSession;
pub use crate::ledger::Ledger;
pub use crate::sync::SyncEngine;
pub use database::Database;


/// Точка входа бинарника
pub async fn run() -> anyhow::Result<()> {
    cli::run_cli().await
}
