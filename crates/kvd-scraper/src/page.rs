//! Detail page to [`AuctionRecord`]: blob extraction, field mapping,
//! normalization, and image resolution.

use kvd_core::{AuctionRecord, ImageSource};
use serde_json::{json, Value};

use crate::extract::extract;
use crate::html::{resolve_main_image, store_scripts};
use crate::mapper::map_fields;
use crate::normalize::normalize_auction;

/// Why a detail page produced no record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageMiss {
    /// No script carried a parseable store blob.
    NoStoreBlob,
    /// The blob parsed but `objectView.storeObjects` had no entry.
    NoStoreEntry,
}

impl PageMiss {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoStoreBlob => "no_store_blob",
            Self::NoStoreEntry => "no_store_entry",
        }
    }
}

/// Parses a detail page into a normalized record.
///
/// Only scripts mentioning `storeObjects` are scanned; the first one that
/// yields a parseable blob is used.
///
/// # Errors
///
/// Returns a [`PageMiss`] describing why no record could be built.
pub fn scrape_detail_page(html: &str, lenient_json: bool) -> Result<AuctionRecord, PageMiss> {
    let tree = store_scripts(html)
        .into_iter()
        .find_map(|script| extract(script, lenient_json))
        .ok_or(PageMiss::NoStoreBlob)?;

    let raw = map_fields(&tree).ok_or(PageMiss::NoStoreEntry)?;
    let preview_image = raw.preview_image.clone();
    let mut record = normalize_auction(raw);

    if let Some((url, source)) = resolve_main_image(html, preview_image.as_deref()) {
        record.main_image_url = Some(url);
        record.image_source = Some(source);
    }
    Ok(record)
}

/// Rebuilds a record from a stored `objectView` subtree.
///
/// Only the blob's own `previewImage` is available here; page `<meta>` tags
/// are not retained, so callers may want to keep a previously stored image.
#[must_use]
pub fn record_from_object_view(object_view: Value) -> Option<AuctionRecord> {
    let tree = json!({ "objectView": object_view });
    let raw = map_fields(&tree)?;
    let preview_image = raw.preview_image.clone();
    let mut record = normalize_auction(raw);
    if let Some(url) = preview_image {
        record.main_image_url = Some(url);
        record.image_source = Some(ImageSource::StoreDataPreviewImage);
    }
    Some(record)
}
