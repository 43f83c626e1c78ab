//! Query builder for stored records.
//!
//! [`RecordQuery`] follows the builder pattern for filtering and paginating
//! records held by a [`ReconciliationStore`](crate::ReconciliationStore).
//!
//! # Example
//!
//! ```
//! use airlog_store::RecordQuery;
//! use time::{Duration, OffsetDateTime};
//!
//! let yesterday = OffsetDateTime::now_utc() - Duration::hours(24);
//!
//! let query = RecordQuery::new()
//!     .device("kitchen")
//!     .since(yesterday)
//!     .newest_first()
//!     .limit(50);
//! assert_eq!(query.limit, Some(50));
//! ```

use time::OffsetDateTime;

use airlog_types::{DeviceId, MeasurementRecord};

/// Fluent query builder for records.
///
/// By default, queries return every record of the global set, oldest first.
#[derive(Debug, Default, Clone)]
pub struct RecordQuery {
    /// Restrict to one device partition.
    pub device: Option<DeviceId>,
    /// Records at or after this time.
    pub since: Option<OffsetDateTime>,
    /// Records at or before this time.
    pub until: Option<OffsetDateTime>,
    /// Maximum number of results.
    pub limit: Option<usize>,
    /// Offset for pagination.
    pub offset: Option<usize>,
    /// Order newest first instead of chronologically.
    pub newest_first: bool,
}

impl RecordQuery {
    /// Create a query matching everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter by device.
    pub fn device(mut self, device: impl Into<DeviceId>) -> Self {
        self.device = Some(device.into());
        self
    }

    /// Filter to records at or after this time.
    pub fn since(mut self, time: OffsetDateTime) -> Self {
        self.since = Some(time);
        self
    }

    /// Filter to records at or before this time.
    pub fn until(mut self, time: OffsetDateTime) -> Self {
        self.until = Some(time);
        self
    }

    /// Limit the number of results.
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first results.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Newest records first.
    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    /// Whether a record falls inside the time filters.
    pub fn matches(&self, record: &MeasurementRecord) -> bool {
        self.since.is_none_or(|since| record.timestamp >= since)
            && self.until.is_none_or(|until| record.timestamp <= until)
    }

    /// Filter, order and paginate records that are already sorted ascending.
    pub(crate) fn apply(&self, records: Vec<MeasurementRecord>) -> Vec<MeasurementRecord> {
        let filtered = records.into_iter().filter(|r| self.matches(r));
        let ordered: Box<dyn Iterator<Item = MeasurementRecord>> = if self.newest_first {
            Box::new(filtered.rev())
        } else {
            Box::new(filtered)
        };
        ordered
            .skip(self.offset.unwrap_or(0))
            .take(self.limit.unwrap_or(usize::MAX))
            .collect()
    }
}
