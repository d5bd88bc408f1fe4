//! Indicator snapshot source port trait.

use crate::domain::error::AlertgenError;
use crate::domain::snapshot::Snapshot;
use chrono::NaiveDateTime;

/// Shared across worker threads; implementations hand each call its own
/// connection.
pub trait SnapshotPort: Sync {
    /// Snapshots of every timeframe for `ticker` with `from <= timestamp <= to`,
    /// ascending by timestamp.
    fn load_snapshots(
        &self,
        ticker: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<Snapshot>, AlertgenError>;
}
