use cairn_interfaces::{
    consensus::ConsensusError,
    p2p::{
        bodies::client::BodiesClient,
        downloader::DownloadClient,
        error::{DownloadError, DownloadResult},
    },
};
use cairn_primitives::{
    constants::{EMPTY_OMMER_ROOT, EMPTY_TRANSACTIONS_ROOT},
    BlockBody, SealedBlock, SealedHeader, H256,
};
use futures_util::{stream::FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::{debug, trace};

/// Downloads block bodies for a contiguous header range in concurrent
/// batches, verifying every body against its header's commitments before it
/// is trusted, and emitting the assembled blocks in range order.
///
/// The batch size adapts to an exponential moving average of observed
/// request round-trip time: a peer answering slowly gets smaller requests,
/// a fast one larger, between the configured bounds.
#[derive(Debug)]
pub struct ConcurrentBodiesDownloader<B> {
    client: Arc<B>,
    min_batch: usize,
    max_batch: usize,
    concurrency: usize,
    request_retries: usize,
    /// Current adaptive batch size.
    batch_size: Mutex<usize>,
    /// EWMA of request round-trip time.
    rtt: Mutex<Option<Duration>>,
}

impl<B> ConcurrentBodiesDownloader<B>
where
    B: BodiesClient + 'static,
{
    /// Verifies a downloaded body against its header's commitments.
    fn validate_body(header: &SealedHeader, body: &BlockBody) -> DownloadResult<()> {
        let tx_root = body.calculate_tx_root();
        if tx_root != header.transactions_root {
            return Err(DownloadError::BodyValidation {
                hash: header.hash(),
                error: ConsensusError::BodyTransactionRootDiff {
                    got: tx_root,
                    expected: header.transactions_root,
                },
            })
        }
        let ommers_root = body.calculate_ommers_root();
        if ommers_root != header.ommers_hash {
            return Err(DownloadError::BodyValidation {
                hash: header.hash(),
                error: ConsensusError::BodyOmmersHashDiff {
                    got: ommers_root,
                    expected: header.ommers_hash,
                },
            })
        }
        Ok(())
    }

    /// Whether the header commits to an empty body.
    fn has_empty_body(header: &SealedHeader) -> bool {
        header.transactions_root == EMPTY_TRANSACTIONS_ROOT &&
            header.ommers_hash == EMPTY_OMMER_ROOT
    }

    fn observe_rtt(&self, sample: Duration) {
        let mut rtt = self.rtt.lock();
        let smoothed = match *rtt {
            // Standard 7/8 smoothing.
            Some(prev) => (prev * 7 + sample) / 8,
            None => sample,
        };
        *rtt = Some(smoothed);

        let mut batch = self.batch_size.lock();
        if sample > smoothed * 2 {
            *batch = (*batch / 2).max(self.min_batch);
        } else if sample * 2 < smoothed {
            *batch = (*batch * 3 / 2).min(self.max_batch);
        }
    }

    /// Fetches the bodies for one batch of headers, retrying within the
    /// request bound, returning them keyed by block hash.
    async fn fetch_batch(
        &self,
        headers: &[SealedHeader],
    ) -> DownloadResult<HashMap<H256, BlockBody>> {
        let mut out: HashMap<H256, BlockBody> = HashMap::new();
        let mut last_error = DownloadError::EmptyResponse;

        for attempt in 0..self.request_retries {
            let missing: Vec<&SealedHeader> =
                headers.iter().filter(|h| !out.contains_key(&h.hash())).collect();
            if missing.is_empty() {
                return Ok(out)
            }
            let hashes: Vec<H256> = missing.iter().map(|h| h.hash()).collect();
            trace!(
                target: "downloaders::bodies",
                count = hashes.len(),
                attempt,
                "requesting bodies"
            );

            let started = Instant::now();
            let response = match self.client.get_block_bodies(hashes).await {
                Ok(response) => response,
                Err(error) => {
                    last_error = error.into();
                    continue
                }
            };
            self.observe_rtt(started.elapsed());

            let (peer, bodies) = response.split();
            if bodies.is_empty() {
                last_error = DownloadError::EmptyResponse;
                continue
            }
            if bodies.len() > missing.len() {
                self.client.report_bad_message(peer);
                last_error = DownloadError::TooManyBodies {
                    received: bodies.len(),
                    expected: missing.len(),
                };
                continue
            }

            // Bodies answer the request in order; verify each against the
            // header it was requested for.
            let mut bad_response = false;
            for (header, body) in missing.iter().zip(bodies) {
                match Self::validate_body(header, &body) {
                    Ok(()) => {
                        out.insert(header.hash(), body);
                    }
                    Err(error) => {
                        debug!(target: "downloaders::bodies", %error, "invalid body");
                        self.client.report_bad_message(peer);
                        last_error = error;
                        bad_response = true;
                        break
                    }
                }
            }
            if !bad_response && out.len() == headers.len() {
                return Ok(out)
            }
        }
        Err(last_error)
    }

    /// Downloads the bodies for `headers` and assembles the blocks in the
    /// given order. Headers committing to empty bodies are filled locally
    /// without a request.
    pub async fn download(&self, headers: Vec<SealedHeader>) -> DownloadResult<Vec<SealedBlock>> {
        let to_fetch: Vec<SealedHeader> =
            headers.iter().filter(|h| !Self::has_empty_body(h)).cloned().collect();

        let mut fetched: HashMap<H256, BlockBody> = HashMap::new();
        let batch_size = (*self.batch_size.lock()).max(1);
        let mut pending = FuturesUnordered::new();
        let mut batches = to_fetch.chunks(batch_size);

        loop {
            while pending.len() < self.concurrency {
                let Some(batch) = batches.next() else { break };
                pending.push(self.fetch_batch(batch));
            }
            let Some(result) = pending.next().await else { break };
            fetched.extend(result?);
        }

        let mut blocks = Vec::with_capacity(headers.len());
        for header in headers {
            let body = if Self::has_empty_body(&header) {
                BlockBody::default()
            } else {
                // fetch_batch only returns complete batches.
                fetched
                    .remove(&header.hash())
                    .ok_or(DownloadError::EmptyResponse)?
            };
            blocks.push(SealedBlock::new(header, body));
        }
        Ok(blocks)
    }
}

/// Builder for [`ConcurrentBodiesDownloader`] with default settings.
#[derive(Debug)]
pub struct ConcurrentBodiesDownloaderBuilder {
    min_batch: usize,
    max_batch: usize,
    initial_batch: usize,
    concurrency: usize,
    request_retries: usize,
}

impl Default for ConcurrentBodiesDownloaderBuilder {
    fn default() -> Self {
        Self {
            min_batch: 16,
            max_batch: 256,
            initial_batch: 64,
            concurrency: 4,
            request_retries: 5,
        }
    }
}

impl ConcurrentBodiesDownloaderBuilder {
    /// Bounds for the adaptive batch size.
    pub fn batch_bounds(mut self, min: usize, max: usize) -> Self {
        self.min_batch = min.max(1);
        self.max_batch = max.max(self.min_batch);
        self
    }

    /// Initial batch size before any round-trip has been observed.
    pub fn initial_batch(mut self, size: usize) -> Self {
        self.initial_batch = size.max(1);
        self
    }

    /// Number of batches fetched concurrently.
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Retries per batch before the download fails.
    pub fn retries(mut self, retries: usize) -> Self {
        self.request_retries = retries.max(1);
        self
    }

    /// Build the downloader over a bodies client.
    pub fn build<B: BodiesClient>(self, client: Arc<B>) -> ConcurrentBodiesDownloader<B> {
        ConcurrentBodiesDownloader {
            client,
            min_batch: self.min_batch,
            max_batch: self.max_batch,
            concurrency: self.concurrency,
            request_retries: self.request_retries,
            batch_size: Mutex::new(self.initial_batch.clamp(self.min_batch, self.max_batch)),
            rtt: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use cairn_interfaces::test_utils::{generators::random_block_range, TestBodiesClient};

    #[tokio::test]
    async fn downloads_bodies_in_order() {
        let blocks = random_block_range(1..6, H256::zero());
        let client = Arc::new(TestBodiesClient::default());
        for block in &blocks {
            client.insert(block.hash(), block.body());
        }
        let downloader =
            ConcurrentBodiesDownloaderBuilder::default().initial_batch(2).build(Arc::clone(&client));

        let headers: Vec<SealedHeader> = blocks.iter().map(|b| b.header.clone()).collect();
        let downloaded = downloader.download(headers).await.unwrap();
        assert_eq!(downloaded, blocks);
        assert!(client.request_attempts() >= 3, "batches of two for five blocks");
    }

    #[tokio::test]
    async fn empty_bodies_are_filled_without_requests() {
        let client = Arc::new(TestBodiesClient::default());
        let downloader = ConcurrentBodiesDownloaderBuilder::default().build(Arc::clone(&client));

        // Headers committing to empty bodies.
        let headers: Vec<SealedHeader> = (1..4u64)
            .map(|number| {
                cairn_primitives::Header {
                    number,
                    transactions_root: EMPTY_TRANSACTIONS_ROOT,
                    ommers_hash: EMPTY_OMMER_ROOT,
                    ..Default::default()
                }
                .seal()
            })
            .collect();

        let blocks = downloader.download(headers).await.unwrap();
        assert_eq!(blocks.len(), 3);
        assert!(blocks.iter().all(|b| b.body.is_empty()));
        assert_eq!(client.request_attempts(), 0);
    }

    #[tokio::test]
    async fn corrupt_body_is_rejected_and_peer_penalized() {
        let blocks = random_block_range(1..3, H256::zero());
        let client = Arc::new(TestBodiesClient::default());
        // Serve block 1's body under block 0's hash.
        client.insert(blocks[0].hash(), blocks[1].body());
        client.insert(blocks[1].hash(), blocks[1].body());
        let downloader = ConcurrentBodiesDownloaderBuilder::default()
            .retries(2)
            .build(Arc::clone(&client));

        let headers: Vec<SealedHeader> = blocks.iter().map(|b| b.header.clone()).collect();
        let result = downloader.download(headers).await;
        assert_matches!(result, Err(DownloadError::BodyValidation { .. }));
        assert!(!client.bad_peers().is_empty());
    }

    #[tokio::test]
    async fn missing_bodies_exhaust_retries() {
        let blocks = random_block_range(1..3, H256::zero());
        let client = Arc::new(TestBodiesClient::default());
        client.insert(blocks[0].hash(), blocks[0].body());
        // Block 1's body is never served.
        let downloader = ConcurrentBodiesDownloaderBuilder::default()
            .retries(3)
            .build(Arc::clone(&client));

        let headers: Vec<SealedHeader> = blocks.iter().map(|b| b.header.clone()).collect();
        let result = downloader.download(headers).await;
        assert!(result.is_err());
        assert_eq!(client.request_attempts(), 3);
    }
}
