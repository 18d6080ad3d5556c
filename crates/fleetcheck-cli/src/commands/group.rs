use clap::Subcommand;

use fleetcheck_core::roles::GroupSettings;
use fleetcheck_core::storage::{parse_local_time, AppConfig};

#[derive(Subcommand)]
pub enum GroupAction {
    /// Create or update the compliance group
    Set {
        /// Group channel id
        #[arg(long)]
        id: i64,
        #[arg(long)]
        title: String,
        /// Channel for review cards and digests
        #[arg(long)]
        review_channel: i64,
        /// Channel for compliance sweeps (omit to disable sweeps)
        #[arg(long)]
        compliance_channel: Option<i64>,
        /// Fixed UTC offset in minutes for local day boundaries
        #[arg(long, default_value_t = 0)]
        tz_offset_minutes: i32,
        /// Daily autosend time (HH:MM local); omit to disable autosend
        #[arg(long)]
        autosend_time: Option<String>,
        /// Daily digest time (HH:MM local); defaults from config
        #[arg(long)]
        digest_time: Option<String>,
    },
    /// Show the configured group
    Show,
}

pub fn run(action: GroupAction) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    let db = super::open_db(&config)?;

    match action {
        GroupAction::Set {
            id,
            title,
            review_channel,
            compliance_channel,
            tz_offset_minutes,
            autosend_time,
            digest_time,
        } => {
            let digest_time = match digest_time {
                Some(raw) => parse_local_time(&raw)?,
                None => config.digest_time()?,
            };
            let autosend_time = autosend_time.as_deref().map(parse_local_time).transpose()?;
            let group = GroupSettings {
                id,
                title,
                review_channel_id: review_channel,
                compliance_channel_id: compliance_channel,
                tz_offset_minutes,
                paused: false,
                autosend_enabled: autosend_time.is_some(),
                autosend_time,
                digest_time,
            };
            db.with(|d| d.upsert_group(&group))?;
            println!("{}", serde_json::to_string_pretty(&group)?);
        }
        GroupAction::Show => {
            let group = super::default_group(&db)?;
            println!("{}", serde_json::to_string_pretty(&group)?);
        }
    }
    Ok(())
}
