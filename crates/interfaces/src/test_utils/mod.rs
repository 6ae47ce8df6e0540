//! Common test helpers for mocking out consensus, downloaders and clients.

mod clients;
pub mod generators;

pub use clients::{TestBodiesClient, TestConsensus, TestHeadersClient};
