//! Shapes a deduplication result for the client.

use serde_json::Value as JsonValue;

use super::models::{
    DedupResult, DisplayGroup, DisplayMediaItem, DisplayResults, DuplicateGroup, MediaItem,
    FILENAME_SEARCH_URL_KEY,
};

pub const PHOTOS_SEARCH_URL_PREFIX: &str = "https://photos.google.com/search/intitle:";

/// Builds the Google Photos title search URL for a filename.
///
/// The filename is cut at its first `.`, so `PXL_20210303_210331830.PORTRAIT.jpg`
/// searches for `PXL_20210303_210331830`. The remaining stem is percent-encoded
/// and every `_` of the encoded text is doubled, as the search syntax requires.
/// Unlike path quoting, a `/` in the stem is encoded too (`%2F`), so the stem
/// always stays a single path segment.
pub fn filename_search_url(filename: &str) -> String {
    let stem = filename.split('.').next().unwrap_or_default();
    let encoded = urlencoding::encode(stem);
    let escaped = encoded.replace('_', "__");
    format!("{}{}", PHOTOS_SEARCH_URL_PREFIX, escaped)
}

fn display_media_item(item: &MediaItem) -> DisplayMediaItem {
    let mut attributes = item.attributes().clone();
    attributes.insert(
        FILENAME_SEARCH_URL_KEY.to_string(),
        JsonValue::String(filename_search_url(item.filename())),
    );
    DisplayMediaItem(attributes)
}

/// Maps raw duplicate groups to display groups, preserving group and item order.
pub fn format_groups(groups: &[DuplicateGroup]) -> Vec<DisplayGroup> {
    groups
        .iter()
        .map(|group| DisplayGroup {
            id: group.id.clone(),
            media_items: group.media_items.iter().map(display_media_item).collect(),
        })
        .collect()
}

pub fn format_result(result: &DedupResult) -> DisplayResults {
    DisplayResults {
        groups: format_groups(&result.groups),
    }
}
