//! Criterion catalog port trait.

use crate::domain::catalog::{CriterionRecord, RangeRecord};
use crate::domain::error::AlertgenError;

pub trait CatalogPort {
    fn list_active_tickers(&self) -> Result<Vec<String>, AlertgenError>;

    /// Active criteria only.
    fn list_active_criteria(&self) -> Result<Vec<CriterionRecord>, AlertgenError>;

    /// Ranges of one criterion in their authoritative order.
    fn list_ranges(&self, criterion_id: &str) -> Result<Vec<RangeRecord>, AlertgenError>;
}
