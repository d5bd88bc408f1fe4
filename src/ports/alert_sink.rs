//! Alert persistence port trait.

use crate::domain::alert::Alert;
use crate::domain::error::AlertgenError;

pub trait AlertSink: Sync {
    /// Persist one batch. Re-emitting an alert whose natural key
    /// `(criterion_id, ticker, timeframe, timestamp, range_id)` already exists
    /// is a no-op. Returns the number of newly stored rows.
    fn emit_alerts(&self, batch: &[Alert]) -> Result<usize, AlertgenError>;
}
