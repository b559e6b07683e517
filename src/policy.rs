//! Configuration options which can alter the behavior of resolution.

use serde::Deserialize;
use std::time::Duration;

/// How many times resolution is attempted before giving up, by default.
pub const DEFAULT_ATTEMPTS: usize = 2;

/// How long to wait between two resolution attempts, by default.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_millis(10);

/// Policy which is applicable to an endpoint manager.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Policy {
    /// The number of store-or-create attempts made for a single resolution.
    ///
    /// Values below one are treated as one.
    ///
    /// Default: 2
    pub attempts: usize,

    /// The delay between two failed attempts.
    ///
    /// Default: 10 milliseconds
    pub retry_backoff: Duration,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
        }
    }
}
