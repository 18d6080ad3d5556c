pub mod checkin_db;
pub mod compliance_db;
mod config;
pub mod database;
pub mod migrations;

pub use config::{parse_local_time, AppConfig, ComplianceConfig, FollowupConfig, TransportConfig};
pub use database::Database;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Returns `~/.config/fleetcheck[-dev]/` based on FLEETCHECK_ENV.
///
/// Set FLEETCHECK_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FLEETCHECK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("fleetcheck-dev")
    } else {
        base_dir.join("fleetcheck")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Shared handle to the single SQLite connection.
///
/// All row mutations are single read-modify-write statements; the mutex
/// provides the single-writer guarantee, so no in-process state outlives
/// a lock acquisition. Poisoning is recovered rather than propagated:
/// the connection itself stays valid across a panicked holder.
#[derive(Clone)]
pub struct DbHandle {
    inner: Arc<Mutex<Database>>,
}

impl DbHandle {
    pub fn new(db: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(db)),
        }
    }

    /// Run `f` with exclusive access to the database.
    pub fn with<T>(&self, f: impl FnOnce(&Database) -> T) -> T {
        let guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}
