/// Client trait for fetching block bodies.
pub mod client;
