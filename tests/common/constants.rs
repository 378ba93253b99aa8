//! Shared constants for end-to-end tests
//!
//! When the scripted detector output or test credentials change,
//! update only this file.

// ============================================================================
// Test Credentials
// ============================================================================

/// Access token of the regular test user
pub const TEST_ACCESS_TOKEN: &str = "test-access-token";

/// Access token that makes the scripted finder fail
pub const FAILING_ACCESS_TOKEN: &str = "failing-access-token";

/// Error reported by the scripted finder for `FAILING_ACCESS_TOKEN`
pub const FINDER_ERROR_MESSAGE: &str = "Detector rejected the library scan";

// ============================================================================
// Scripted Detector Output
// ============================================================================

pub const GROUP_1_ID: &str = "group-1";

pub const GROUP_1_FILENAMES: [&str; 2] = [
    "PXL_20210303_210331830.jpg",
    "PXL_20210303_210331830.PORTRAIT.jpg",
];

pub const GROUP_2_ID: &str = "group-2";

pub const GROUP_2_FILENAMES: [&str; 2] = ["my photo.png", "my photo (1).png"];

/// Search URL expected for both files of group 1
pub const GROUP_1_SEARCH_URL: &str =
    "https://photos.google.com/search/intitle:PXL__20210303__210331830";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for server to become ready (milliseconds)
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for server readiness (milliseconds)
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Maximum time to wait for a job to reach a terminal status (milliseconds)
pub const JOB_FINISH_TIMEOUT_MS: u64 = 5000;

/// HTTP request timeout (seconds)
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
