mod display;
mod finder;
mod models;

pub use display::{filename_search_url, format_groups, format_result, PHOTOS_SEARCH_URL_PREFIX};
pub use finder::{DuplicateFinder, HttpDuplicateFinder};
pub use models::{
    Credentials, DedupResult, DisplayGroup, DisplayMediaItem, DisplayResults, DuplicateGroup,
    MediaItem, TaskOptions, FILENAME_KEY, FILENAME_SEARCH_URL_KEY,
};
