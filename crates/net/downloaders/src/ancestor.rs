use crate::session::SyncError;
use cairn_chain::BlockChain;
use cairn_interfaces::p2p::headers::client::{HeadersClient, HeadersRequest};
use cairn_primitives::{BlockNumHash, BlockNumber, HeadersDirection};
use std::sync::Arc;
use tracing::{debug, trace};

/// Sample stride of the skeleton probe.
const PROBE_SKIP: u64 = 15;

/// Samples per probe request.
const PROBE_LIMIT: u64 = 16;

/// Finds the highest block both the local canonical chain and the peer's
/// chain agree on.
///
/// First probes the peer at a coarse stride descending from the shorter
/// chain's height to bracket the divergence cheaply, then binary-searches
/// inside the bracket with single-header requests. Disagreement all the way
/// down to genesis means the peer is on an incompatible network.
pub async fn find_common_ancestor<H: HeadersClient>(
    client: &Arc<H>,
    chain: &BlockChain,
    peer_height: BlockNumber,
) -> Result<BlockNumHash, SyncError> {
    let local_height = chain.chain_info().best_number;
    let mut top = local_height.min(peer_height);

    // A local hash match against the peer's header at the same height.
    let matches_local = |number: BlockNumber, header: &cairn_primitives::Header| {
        chain
            .block_by_number(number)
            .map(|block| block.hash() == header.hash_slow())
            .unwrap_or(false)
    };

    loop {
        let request = HeadersRequest {
            start: top.into(),
            limit: PROBE_LIMIT,
            skip: PROBE_SKIP,
            direction: HeadersDirection::Falling,
        };
        trace!(target: "downloaders::ancestor", top, "probing for common ancestor");
        let samples = client
            .get_headers(request)
            .await
            .map_err(|e| SyncError::Download(e.into()))?
            .into_data();
        if samples.is_empty() {
            return Err(SyncError::NoCommonAncestor)
        }

        // Highest matching sample brackets the search from below, the
        // sample above it from above.
        let mut upper_bound = top + 1;
        for header in &samples {
            if matches_local(header.number, header) {
                let ancestor =
                    binary_search(client, chain, header.number, upper_bound).await?;
                debug!(target: "downloaders::ancestor", number = ancestor.number, "found common ancestor");
                return Ok(ancestor)
            }
            upper_bound = header.number;
        }

        // No sample matched; continue below the probed window.
        let lowest = samples.last().map(|h| h.number).unwrap_or(0);
        if lowest == 0 {
            return Err(SyncError::NoCommonAncestor)
        }
        top = lowest.saturating_sub(1);
    }
}

/// Binary search for the highest agreeing block in `(known_good, upper)`.
async fn binary_search<H: HeadersClient>(
    client: &Arc<H>,
    chain: &BlockChain,
    known_good: BlockNumber,
    upper: BlockNumber,
) -> Result<BlockNumHash, SyncError> {
    let mut low = known_good;
    let mut high = upper;

    while low + 1 < high {
        let mid = low + (high - low) / 2;
        let request = HeadersRequest {
            start: mid.into(),
            limit: 1,
            skip: 0,
            direction: HeadersDirection::Falling,
        };
        let response = client
            .get_headers(request)
            .await
            .map_err(|e| SyncError::Download(e.into()))?
            .into_data();

        let agreed = response
            .first()
            .map(|header| {
                chain
                    .block_by_number(mid)
                    .map(|block| block.hash() == header.hash_slow())
                    .unwrap_or(false)
            })
            .unwrap_or(false);
        if agreed {
            low = mid;
        } else {
            high = mid;
        }
    }

    let hash = chain
        .block_by_number(low)
        .map(|block| block.hash())
        .ok_or(SyncError::NoCommonAncestor)?;
    Ok(BlockNumHash { number: low, hash })
}
