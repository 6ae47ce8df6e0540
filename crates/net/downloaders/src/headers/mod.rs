mod reverse;

pub use reverse::{HeadersDownload, ReverseHeadersDownloader, ReverseHeadersDownloaderBuilder};
