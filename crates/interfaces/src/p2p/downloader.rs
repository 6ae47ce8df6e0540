use super::error::DownloadResult;
use crate::consensus::Consensus;
use cairn_primitives::PeerId;
use futures::Stream;
use std::{fmt::Debug, pin::Pin};

/// A stream of download results, generic over the downloaded item.
pub type DownloadStream<'a, T> = Pin<Box<dyn Stream<Item = DownloadResult<T>> + Send + 'a>>;

/// Generic download client for peer penalization.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait DownloadClient: Send + Sync + Debug {
    /// Penalize the peer for responding with a message that violates
    /// validation rules.
    fn report_bad_message(&self, peer_id: PeerId);

    /// Returns how many peers the network is currently connected to.
    fn num_connected_peers(&self) -> usize;
}

/// The generic trait for requesting and verifying data over a p2p network
/// client.
pub trait Downloader: Send + Sync {
    /// The client used to fetch the data.
    type Client: DownloadClient;

    /// The consensus rules used to verify downloaded data.
    type Consensus: Consensus;

    /// The download client.
    fn client(&self) -> &Self::Client;

    /// The consensus engine.
    fn consensus(&self) -> &Self::Consensus;
}
