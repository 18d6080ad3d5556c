use clap::Subcommand;

use fleetcheck_core::storage::AppConfig;

#[derive(Subcommand)]
pub enum CheckinAction {
    /// Show a driver's check-in for a date (defaults to today)
    Show {
        #[arg(long)]
        handle: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// Reset a check-in back to pending (clears media and review)
    Reset {
        #[arg(long)]
        id: i64,
    },
    /// Reopen a reviewed check-in back to submitted (keeps media)
    Reopen {
        #[arg(long)]
        handle: String,
        #[arg(long)]
        date: Option<String>,
    },
    /// A driver's recent history
    History {
        #[arg(long)]
        handle: String,
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

pub fn run(action: CheckinAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let db = super::open_db(&config)?;
    let group = super::default_group(&db)?;

    match action {
        CheckinAction::Show { handle, date } => {
            let date = super::parse_date(date.as_deref(), &group)?;
            let driver = db
                .with(|d| d.driver_by_handle(&handle))?
                .ok_or(format!("no driver with handle {handle}"))?;
            match db.with(|d| d.checkin_for(driver.id, group.id, date))? {
                Some(checkin) => println!("{}", serde_json::to_string_pretty(&checkin)?),
                None => println!("no check-in for {handle} on {date}"),
            }
        }
        CheckinAction::Reset { id } => {
            match db.with(|d| d.reset_checkin(id))? {
                Some(checkin) => println!("{}", serde_json::to_string_pretty(&checkin)?),
                None => println!("no check-in with id {id}"),
            }
        }
        CheckinAction::Reopen { handle, date } => {
            let date = super::parse_date(date.as_deref(), &group)?;
            let driver = db
                .with(|d| d.driver_by_handle(&handle))?
                .ok_or(format!("no driver with handle {handle}"))?;
            match db.with(|d| d.reopen_checkin(driver.id, group.id, date))? {
                Some(checkin) => println!("{}", serde_json::to_string_pretty(&checkin)?),
                None => println!("no check-in for {handle} on {date}"),
            }
        }
        CheckinAction::History { handle, days } => {
            let driver = db
                .with(|d| d.driver_by_handle(&handle))?
                .ok_or(format!("no driver with handle {handle}"))?;
            let today = super::parse_date(None, &group)?;
            let history =
                db.with(|d| fleetcheck_core::report::recent_history(d, driver.id, today, days))?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
    }
    Ok(())
}
