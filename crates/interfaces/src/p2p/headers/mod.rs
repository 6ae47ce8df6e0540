/// Client trait for fetching headers.
pub mod client;

/// Downloader trait and validation helpers for header downloads.
pub mod downloader;
