use std::future::Future;

use crate::auction::AuctionRecord;

/// What a sink did with one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    Updated,
    /// The record had no usable auction identifier; nothing was written.
    Skipped,
}

impl PersistOutcome {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Skipped => "skipped",
        }
    }
}

/// Destination for normalized auction records.
///
/// Implementations commit each record independently so a failure on one
/// record never rolls back another.
pub trait AuctionSink {
    type Error: std::fmt::Display;

    fn persist(
        &self,
        record: &AuctionRecord,
    ) -> impl Future<Output = Result<PersistOutcome, Self::Error>> + Send;
}
