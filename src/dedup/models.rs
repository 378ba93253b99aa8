//! Payload types exchanged with the duplicate detection unit of work.
//!
//! Media items are kept as ordered JSON objects: the detection service is free
//! to attach any attributes it wants (`baseUrl`, `productUrl`, `mediaMetadata`,
//! ...) and they must reach the client untouched and in their original order.
//! The only attribute this crate relies on is `filename`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;

use crate::jobs::SubmitError;

/// Name of the only attribute every media item must carry.
pub const FILENAME_KEY: &str = "filename";

/// Name of the attribute added to every media item for display.
pub const FILENAME_SEARCH_URL_KEY: &str = "filenameSearchUrl";

/// Opaque credentials bag handed over by the authentication layer.
///
/// Never inspected here, only passed through to the unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub JsonValue);

/// Options accepted by a deduplication submission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOptions {
    /// Re-fetch the media item list from the library instead of using a cached one.
    pub refresh_media_items: bool,
}

impl TaskOptions {
    pub const REFRESH_MEDIA_ITEMS: &'static str = "refresh_media_items";

    /// Build options from form-encoded fields.
    ///
    /// `refresh_media_items` is enabled only by the literal value `"true"`,
    /// anything else leaves it off. Unknown fields are rejected.
    pub fn from_form(fields: &HashMap<String, String>) -> Result<Self, SubmitError> {
        let mut options = TaskOptions::default();
        for (key, value) in fields {
            match key.as_str() {
                Self::REFRESH_MEDIA_ITEMS => options.refresh_media_items = value == "true",
                other => return Err(SubmitError::UnrecognizedOption(other.to_string())),
            }
        }
        Ok(options)
    }
}

/// A single media item as produced by the detection service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, JsonValue>", into = "Map<String, JsonValue>")]
pub struct MediaItem {
    attributes: Map<String, JsonValue>,
}

impl MediaItem {
    pub fn filename(&self) -> &str {
        // Presence and type are checked on construction.
        self.attributes
            .get(FILENAME_KEY)
            .and_then(JsonValue::as_str)
            .unwrap_or_default()
    }

    pub fn attributes(&self) -> &Map<String, JsonValue> {
        &self.attributes
    }
}

impl TryFrom<Map<String, JsonValue>> for MediaItem {
    type Error = String;

    fn try_from(attributes: Map<String, JsonValue>) -> Result<Self, Self::Error> {
        match attributes.get(FILENAME_KEY) {
            Some(JsonValue::String(_)) => Ok(MediaItem { attributes }),
            Some(other) => Err(format!("media item filename must be a string, got {}", other)),
            None => Err("media item is missing the filename attribute".to_string()),
        }
    }
}

impl From<MediaItem> for Map<String, JsonValue> {
    fn from(item: MediaItem) -> Self {
        item.attributes
    }
}

/// A cluster of media items detected as duplicates of each other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub id: JsonValue,
    pub media_items: Vec<MediaItem>,
}

/// Success payload of a deduplication run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DedupResult {
    pub groups: Vec<DuplicateGroup>,
}

/// Media item reshaped for the client: the raw attributes plus `filenameSearchUrl`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DisplayMediaItem(pub Map<String, JsonValue>);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayGroup {
    pub id: JsonValue,
    pub media_items: Vec<DisplayMediaItem>,
}

/// Payload returned to a poller once the job succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayResults {
    pub groups: Vec<DisplayGroup>,
}
