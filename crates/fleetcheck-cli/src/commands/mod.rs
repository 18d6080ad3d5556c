pub mod checkin;
pub mod driver;
pub mod group;
pub mod report;
pub mod serve;

use chrono::{NaiveDate, Utc};
use fleetcheck_core::roles::GroupSettings;
use fleetcheck_core::storage::{AppConfig, Database, DbHandle};

/// Open the configured database.
pub(crate) fn open_db(config: &AppConfig) -> Result<DbHandle, Box<dyn std::error::Error>> {
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::open()?,
    };
    Ok(DbHandle::new(db))
}

/// The configuration singleton, or a readable error.
pub(crate) fn default_group(db: &DbHandle) -> Result<GroupSettings, Box<dyn std::error::Error>> {
    Ok(fleetcheck_core::roles::require_default_group(db)?)
}

/// Parse `YYYY-MM-DD`, defaulting to the group-local today.
pub(crate) fn parse_date(
    value: Option<&str>,
    group: &GroupSettings,
) -> Result<NaiveDate, Box<dyn std::error::Error>> {
    match value {
        Some(raw) => Ok(NaiveDate::parse_from_str(raw, "%Y-%m-%d")?),
        None => Ok(group.local_date(Utc::now())),
    }
}
