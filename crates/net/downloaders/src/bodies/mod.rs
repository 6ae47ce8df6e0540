mod concurrent;

pub use concurrent::{ConcurrentBodiesDownloader, ConcurrentBodiesDownloaderBuilder};
