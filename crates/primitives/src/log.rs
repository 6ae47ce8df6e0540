use crate::{Address, H256};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// An event emitted during transaction execution.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Log {
    /// The account that emitted the log.
    pub address: Address,
    /// Indexed topics.
    pub topics: Vec<H256>,
    /// Opaque log payload.
    pub data: Bytes,
}
