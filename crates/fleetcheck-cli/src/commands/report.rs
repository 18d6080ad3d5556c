use clap::Subcommand;

use fleetcheck_core::digest::render_daily_digest;
use fleetcheck_core::report;
use fleetcheck_core::storage::AppConfig;

#[derive(Subcommand)]
pub enum ReportAction {
    /// Daily digest text for a date (defaults to today)
    Daily {
        #[arg(long)]
        date: Option<String>,
    },
    /// Weekly pass-ratio leaderboard ending at a date
    Leaderboard {
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Current streak standings
    Streaks {
        #[arg(long, default_value_t = 10)]
        limit: i64,
    },
}

pub fn run(action: ReportAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let db = super::open_db(&config)?;
    let group = super::default_group(&db)?;

    match action {
        ReportAction::Daily { date } => {
            let date = super::parse_date(date.as_deref(), &group)?;
            let stats = db.with(|d| report::daily_stats(d, group.id, date))?;
            println!("{}", render_daily_digest(&stats));
        }
        ReportAction::Leaderboard { date, limit } => {
            let date = super::parse_date(date.as_deref(), &group)?;
            let (top, worst) = db.with(|d| report::weekly_rankings(d, group.id, date, limit))?;
            println!("Best:");
            for (idx, row) in top.iter().enumerate() {
                println!("{}. {} – {}%", idx + 1, row.label, row.pct);
            }
            println!("Worst:");
            for (idx, row) in worst.iter().enumerate() {
                println!("{}. {} – {}%", idx + 1, row.label, row.pct);
            }
        }
        ReportAction::Streaks { limit } => {
            let streaks = db.with(|d| report::top_streaks(d, limit))?;
            for (name, streak) in streaks {
                println!("{name} {streak}");
            }
        }
    }
    Ok(())
}
