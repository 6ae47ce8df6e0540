use cairn_primitives::{
    BlockBody, BlockHashOrNumber, BlockNumber, Header, Receipt, H256, U256,
};
use serde::{Deserialize, Serialize};

/// A headers query: up to `limit` headers from `start`, every `skip + 1`-th,
/// rising or falling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetHeaders {
    /// First header to return.
    pub start: BlockHashOrNumber,
    /// Maximum number of headers.
    pub limit: u64,
    /// Headers to skip between entries (0 = dense).
    pub skip: u64,
    /// Whether numbers fall from `start`.
    pub reverse: bool,
}

/// The messages exchanged between chain-synchronizing peers.
///
/// Responses carry no request ids at this layer; matching is the
/// transport's concern, and every response is still validated against the
/// request's declared hashes or range before it is trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Announcement of a newly sealed or imported block.
    NewBlock {
        /// The announced block's hash.
        hash: H256,
        /// The announced block's number.
        number: BlockNumber,
        /// The announcing peer's accumulated difficulty at that block.
        total_difficulty: U256,
    },
    /// Headers query.
    GetHeaders(GetHeaders),
    /// Headers response.
    Headers(Vec<Header>),
    /// Bodies query by block hash.
    GetBodies(Vec<H256>),
    /// Bodies response, in request order.
    Bodies(Vec<BlockBody>),
    /// Receipts query by block hash.
    GetReceipts(Vec<H256>),
    /// Receipts response, one list per requested block.
    Receipts(Vec<Vec<Receipt>>),
    /// State trie node query by content hash. Full nodes only.
    GetNodeData(Vec<H256>),
    /// State trie node response; each entry hashes to its requested key.
    NodeData(Vec<Vec<u8>>),
}

impl Message {
    /// Whether `self` is the response kind matching the `request` kind.
    pub fn answers(&self, request: &Message) -> bool {
        matches!(
            (request, self),
            (Message::GetHeaders(_), Message::Headers(_)) |
                (Message::GetBodies(_), Message::Bodies(_)) |
                (Message::GetReceipts(_), Message::Receipts(_)) |
                (Message::GetNodeData(_), Message::NodeData(_))
        )
    }
}
