use clap::Subcommand;

use fleetcheck_core::storage::AppConfig;

#[derive(Subcommand)]
pub enum DriverAction {
    /// List active drivers
    List,
    /// Register a driver by handle (placeholder until first contact)
    Add {
        #[arg(long)]
        handle: String,
        #[arg(long)]
        name: Option<String>,
    },
    /// Soft-deactivate a driver
    Deactivate {
        #[arg(long)]
        id: i64,
    },
    /// Link a driver to a notification channel
    Link {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        channel: i64,
    },
}

pub fn run(action: DriverAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let db = super::open_db(&config)?;

    match action {
        DriverAction::List => {
            let drivers = db.with(|d| d.active_drivers())?;
            println!("{}", serde_json::to_string_pretty(&drivers)?);
        }
        DriverAction::Add { handle, name } => {
            let driver = db.with(|d| d.upsert_driver(None, Some(&handle), name.as_deref()))?;
            println!("{}", serde_json::to_string_pretty(&driver)?);
        }
        DriverAction::Deactivate { id } => {
            db.with(|d| d.set_driver_active(id, false))?;
            println!("driver {id} deactivated");
        }
        DriverAction::Link { id, channel } => {
            db.with(|d| d.set_driver_notify_channel(id, channel))?;
            println!("driver {id} linked to channel {channel}");
        }
    }
    Ok(())
}
