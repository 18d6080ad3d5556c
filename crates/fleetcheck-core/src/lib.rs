//! # Fleetcheck Core Library
//!
//! This library implements a daily compliance workflow for driver
//! check-ins: drivers submit photo/video evidence once per day,
//! reviewers approve, reject, or excuse each submission, and
//! non-responsive drivers are escalated through timed reminders and
//! supervisor alerts. The CLI binary is a thin operational layer over
//! this library.
//!
//! ## Architecture
//!
//! - **Ledger**: the per-driver, per-day check-in record and its status
//!   transitions, backed by SQLite row updates
//! - **Scheduler**: one shared tokio-driven job scheduler for follow-up
//!   slots and recurring per-group jobs (digest, rollover, autosend,
//!   compliance sweep, weekly leaderboard)
//! - **Compliance tracker**: periodic classification with consecutive
//!   non-compliance counters, cooldown-gated alerts, and escalations
//! - **Streak engine**: consecutive-pass counters with nightly rollover
//! - **Reporting aggregator**: read-only daily and weekly statistics
//! - **Transport**: the chat-network contract; a webhook relay ships as
//!   the concrete implementation
//!
//! ## Key Components
//!
//! - [`JobScheduler`]: timer arm/cancel with cancel-then-arm semantics
//! - [`ComplianceTracker`]: the evaluation tick
//! - [`ReviewService`] / [`MediaIntake`]: the two inbound flows
//! - [`Database`]: row-level storage and migrations

pub mod compliance;
pub mod digest;
pub mod error;
pub mod events;
pub mod ledger;
pub mod media;
pub mod report;
pub mod review;
pub mod roles;
pub mod scheduler;
pub mod storage;
pub mod streaks;
pub mod transport;

pub use compliance::{ComplianceStatus, ComplianceTracker, SweepSummary};
pub use error::{AccessError, ConfigError, CoreError, DatabaseError, TransportError};
pub use events::Event;
pub use ledger::{Checkin, CheckinStatus, Driver};
pub use media::{ChannelKind, InboundMedia, MediaIntake};
pub use report::{DailyStats, RankRow};
pub use review::{ReviewAction, ReviewService};
pub use roles::GroupSettings;
pub use scheduler::JobScheduler;
pub use storage::{AppConfig, Database, DbHandle};
pub use transport::{MediaFile, MediaKind, Transport, WebhookTransport};
