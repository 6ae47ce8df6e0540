use cairn_interfaces::p2p::{
    downloader::DownloadClient,
    error::{DownloadError, DownloadResult},
    receipts::ReceiptsClient,
};
use cairn_primitives::{proofs, Receipt, SealedHeader};
use std::sync::Arc;
use tracing::{debug, trace};

/// Downloads receipt lists for a header range, verifying each list against
/// its header's receipts root. Used by fast sync, where receipts are
/// fetched instead of being re-derived by execution.
#[derive(Debug)]
pub struct ReceiptsDownloader<R> {
    client: Arc<R>,
    batch_size: usize,
    request_retries: usize,
}

impl<R> ReceiptsDownloader<R>
where
    R: ReceiptsClient + 'static,
{
    /// Creates the downloader over a receipts client.
    pub fn new(client: Arc<R>, batch_size: usize, request_retries: usize) -> Self {
        Self {
            client,
            batch_size: batch_size.max(1),
            request_retries: request_retries.max(1),
        }
    }

    /// Downloads the receipts for `headers`, one verified list per header,
    /// in order.
    pub async fn download(
        &self,
        headers: &[SealedHeader],
    ) -> DownloadResult<Vec<Vec<Receipt>>> {
        let mut out = Vec::with_capacity(headers.len());
        for batch in headers.chunks(self.batch_size) {
            out.extend(self.fetch_batch(batch).await?);
        }
        Ok(out)
    }

    async fn fetch_batch(&self, headers: &[SealedHeader]) -> DownloadResult<Vec<Vec<Receipt>>> {
        let hashes: Vec<_> = headers.iter().map(|h| h.hash()).collect();
        let mut last_error = DownloadError::EmptyResponse;

        for attempt in 0..self.request_retries {
            trace!(target: "downloaders::receipts", count = hashes.len(), attempt, "requesting receipts");
            let response = match self.client.get_receipts(hashes.clone()).await {
                Ok(response) => response,
                Err(error) => {
                    last_error = error.into();
                    continue
                }
            };
            let (peer, lists) = response.split();
            if lists.len() != headers.len() {
                last_error = DownloadError::EmptyResponse;
                continue
            }

            let mut valid = true;
            for (header, receipts) in headers.iter().zip(&lists) {
                let root = proofs::calculate_receipts_root(receipts.iter());
                if root != header.receipts_root {
                    debug!(
                        target: "downloaders::receipts",
                        hash = ?header.hash(),
                        "receipts root mismatch"
                    );
                    self.client.report_bad_message(peer);
                    last_error = DownloadError::ReceiptsRootMismatch { hash: header.hash() };
                    valid = false;
                    break
                }
            }
            if valid {
                return Ok(lists)
            }
        }
        Err(last_error)
    }
}
