//! Progress reporting for project downloads.
//!
//! The client reports bytes written through [`ProgressCallback`]; front
//! ends decide how to render it (an `indicatif` bar in the CLI, nothing
//! in the server).

use std::sync::Arc;

/// Receives progress updates from a running download.
///
/// Implementations must be `Send + Sync` so a single reporter can be
/// shared through an `Arc`.
pub trait ProgressCallback: Send + Sync {
    /// Sets the total number of bytes expected.
    fn set_total(&self, total: u64);

    /// Advances progress by `delta` bytes.
    fn inc(&self, delta: u64);

    /// Updates the message shown next to the indicator.
    fn set_message(&self, msg: String);

    /// Marks the download complete with a final message.
    fn finish(&self, msg: String);
}

/// A [`ProgressCallback`] that ignores every update.
pub struct NullProgress;

impl ProgressCallback for NullProgress {
    fn set_total(&self, _total: u64) {}
    fn inc(&self, _delta: u64) {}
    fn set_message(&self, _msg: String) {}
    fn finish(&self, _msg: String) {}
}

/// Returns a shared [`NullProgress`].
#[must_use]
pub fn null_progress() -> Arc<dyn ProgressCallback> {
    Arc::new(NullProgress)
}
