//! `reprocess` command handler.
//!
//! Re-runs field mapping and normalization over the `object_view_json`
//! retained for each stored auction, so cleanup rules can be changed
//! without refetching pages. Per-auction failures are logged and counted.

use kvd_core::{AuctionRecord, ImageSource, PersistOutcome};
use kvd_db::StoredObjectView;
use kvd_scraper::record_from_object_view;

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ReprocessTotals {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Rebuilds one stored auction. `None` means the stored subtree no longer
/// maps to a record.
///
/// The row's own `auction_id` is kept so the update lands on the same row.
/// Page `<meta>` tags are not retained, so a previously stored image wins
/// over having none.
pub(crate) fn rebuild_record(stored: StoredObjectView) -> Option<AuctionRecord> {
    let mut record = record_from_object_view(stored.object_view_json)?;
    record.auction_id = Some(stored.auction_id);
    if record.main_image_url.is_none() {
        record.main_image_url = stored.main_image_url;
        record.image_source = stored
            .image_source
            .as_deref()
            .and_then(ImageSource::from_tag);
    }
    Some(record)
}

/// # Errors
///
/// Returns an error only if the stored auctions cannot be listed.
pub(crate) async fn run_reprocess(
    pool: &sqlx::PgPool,
    limit: Option<i64>,
) -> anyhow::Result<ReprocessTotals> {
    let stored = kvd_db::list_object_views(pool, limit).await?;
    tracing::info!(count = stored.len(), "reprocessing stored auctions");

    let mut totals = ReprocessTotals::default();
    for view in stored {
        let auction_id = view.auction_id.clone();
        let Some(record) = rebuild_record(view) else {
            tracing::warn!(auction_id, "stored object view has no auction entry");
            totals.skipped += 1;
            continue;
        };

        match kvd_db::upsert_auction(pool, &record).await {
            Ok(PersistOutcome::Skipped) => totals.skipped += 1,
            Ok(_) => totals.updated += 1,
            Err(e) => {
                tracing::error!(auction_id, error = %e, "failed to save reprocessed auction");
                totals.failed += 1;
            }
        }
    }

    println!(
        "reprocess complete: {} updated, {} skipped, {} failed",
        totals.updated, totals.skipped, totals.failed
    );
    Ok(totals)
}
