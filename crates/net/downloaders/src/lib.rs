#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Implementations of the cairn block downloaders and the sync session.
//!
//! The [`headers`] downloader streams consensus-checked headers from a
//! peer's tip down to the local head; the [`bodies`] downloader fills the
//! resulting range concurrently with per-block commitment checks;
//! [`SyncSession`] drives the whole pipeline (ancestor search, header
//! skeleton, body/receipt fill, import) against the canonical chain, with
//! cancellation and peer penalization.

/// Block body downloaders.
pub mod bodies;

/// Block header downloaders.
pub mod headers;

mod ancestor;
mod receipts;
mod session;
mod state_sync;

#[cfg(any(test, feature = "test-utils"))]
/// Canned multi-protocol clients for tests.
pub mod test_utils;

pub use ancestor::find_common_ancestor;
pub use receipts::ReceiptsDownloader;
pub use session::{
    DownloaderStats, SyncConfig, SyncError, SyncMode, SyncOutcome, SyncSession, SyncStage,
};
pub use state_sync::StateSync;
