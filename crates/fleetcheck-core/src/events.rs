use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::CheckinStatus;

/// Every check-in transition produces an Event.
///
/// Flows return these so callers (and the CLI) can report what actually
/// happened without re-reading the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    MediaRecorded {
        checkin_id: i64,
        driver_id: i64,
        media_count: i64,
        first_media: bool,
        at: DateTime<Utc>,
    },
    /// Media arrived off-thread; warned once, nothing counted.
    OffthreadWarned {
        checkin_id: i64,
        driver_id: i64,
        at: DateTime<Utc>,
    },
    Reviewed {
        checkin_id: i64,
        driver_id: i64,
        status: CheckinStatus,
        reviewer_id: i64,
        at: DateTime<Utc>,
    },
    Excused {
        checkin_id: i64,
        driver_id: i64,
        reason: String,
        at: DateTime<Utc>,
    },
    Notified {
        checkin_id: i64,
        driver_id: i64,
        at: DateTime<Utc>,
    },
    CardRefreshed {
        checkin_id: i64,
        at: DateTime<Utc>,
    },
    Reset {
        checkin_id: i64,
        at: DateTime<Utc>,
    },
    Reopened {
        checkin_id: i64,
        at: DateTime<Utc>,
    },
}
