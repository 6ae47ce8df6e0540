use futures::{stream::Stream, FutureExt};
use cairn_interfaces::{
    consensus::Consensus,
    p2p::{
        downloader::{DownloadClient, DownloadStream, Downloader},
        error::{DownloadError, DownloadResult, PeerRequestResult},
        headers::{
            client::{HeadersClient, HeadersRequest},
            downloader::{validate_header_download, HeaderDownloader},
        },
    },
};
use cairn_primitives::{Header, HeadersDirection, SealedHeader, H256};
use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::trace;

/// Downloads headers in batches from a tip hash backwards to a known local
/// head, consensus-checking every parent link.
#[derive(Debug)]
pub struct ReverseHeadersDownloader<C, H> {
    consensus: Arc<C>,
    client: Arc<H>,
    /// The number of headers to request in one call.
    pub batch_size: u64,
    /// The number of retries per request.
    pub request_retries: usize,
}

impl<C, H> Downloader for ReverseHeadersDownloader<C, H>
where
    C: Consensus,
    H: HeadersClient,
{
    type Consensus = C;
    type Client = H;

    fn consensus(&self) -> &Self::Consensus {
        &self.consensus
    }

    fn client(&self) -> &Self::Client {
        &self.client
    }
}

impl<C, H> HeaderDownloader for ReverseHeadersDownloader<C, H>
where
    C: Consensus + 'static,
    H: HeadersClient + 'static,
{
    fn stream(&self, head: SealedHeader, tip: H256) -> DownloadStream<'_, SealedHeader> {
        Box::pin(self.new_download(head, tip))
    }
}

impl<C: Consensus, H: HeadersClient> Clone for ReverseHeadersDownloader<C, H> {
    fn clone(&self) -> Self {
        Self {
            consensus: Arc::clone(&self.consensus),
            client: Arc::clone(&self.client),
            batch_size: self.batch_size,
            request_retries: self.request_retries,
        }
    }
}

impl<C: Consensus + 'static, H: HeadersClient + 'static> ReverseHeadersDownloader<C, H> {
    fn new_download(&self, head: SealedHeader, tip: H256) -> HeadersDownload<C, H> {
        HeadersDownload {
            head,
            tip,
            buffered: VecDeque::default(),
            request: None,
            consensus: Arc::clone(&self.consensus),
            client: Arc::clone(&self.client),
            batch_size: self.batch_size,
            request_retries: self.request_retries,
            encountered_error: false,
        }
    }
}

type HeadersFut = Pin<Box<dyn Future<Output = PeerRequestResult<Vec<Header>>> + Send>>;

/// A retryable in-flight headers request.
struct HeadersRequestFuture {
    request: HeadersRequest,
    fut: HeadersFut,
    retries: usize,
    max_retries: usize,
}

impl HeadersRequestFuture {
    /// Increments the retry counter and returns whether the request can
    /// still be retried.
    fn inc_err(&mut self) -> bool {
        self.retries += 1;
        self.retries < self.max_retries
    }
}

impl Future for HeadersRequestFuture {
    type Output = PeerRequestResult<Vec<Header>>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().fut.poll_unpin(cx)
    }
}

/// An in-progress reverse headers download.
pub struct HeadersDownload<C, H> {
    /// The local block the download walks back to.
    head: SealedHeader,
    /// The target tip the download starts from.
    tip: H256,
    /// Validated headers, descending; the back is the earliest.
    buffered: VecDeque<SealedHeader>,
    /// The request currently in flight.
    request: Option<HeadersRequestFuture>,
    consensus: Arc<C>,
    client: Arc<H>,
    batch_size: u64,
    request_retries: usize,
    /// Set once the stream failed terminally.
    encountered_error: bool,
}

impl<C, H> HeadersDownload<C, H>
where
    C: Consensus + 'static,
    H: HeadersClient + 'static,
{
    /// The earliest (lowest-number) validated header.
    fn earliest_header(&self) -> Option<&SealedHeader> {
        self.buffered.back()
    }

    fn has_reached_head(&self) -> bool {
        self.earliest_header().map(|h| h.hash() == self.head.hash()).unwrap_or_default()
    }

    fn has_terminated(&self) -> bool {
        self.has_reached_head() || self.encountered_error
    }

    /// The hash the next batch starts from.
    fn request_start(&self) -> H256 {
        self.earliest_header().map_or(self.tip, |h| h.parent_hash)
    }

    fn headers_request(&self) -> HeadersRequest {
        HeadersRequest {
            start: self.request_start().into(),
            limit: self.batch_size,
            skip: 0,
            direction: HeadersDirection::Falling,
        }
    }

    /// Pops a finished header off the buffer; the head itself stays.
    fn pop_header_from_buffer(&mut self) -> Option<SealedHeader> {
        if self.buffered.len() > 1 {
            self.buffered.pop_front()
        } else {
            None
        }
    }

    /// Gets the in-flight request or dispatches a new one.
    fn get_or_init_fut(&mut self) -> HeadersRequestFuture {
        match self.request.take() {
            None => {
                let client = Arc::clone(&self.client);
                let req = self.headers_request();
                trace!(target: "downloaders::headers", ?req, "requesting headers");
                HeadersRequestFuture {
                    request: req.clone(),
                    fut: Box::pin(async move { client.get_headers(req).await }),
                    retries: 0,
                    max_retries: self.request_retries,
                }
            }
            Some(fut) => fut,
        }
    }

    /// Rearms the future with a fresh request.
    ///
    /// Returns an `Err` if the request exhausted all retries.
    fn try_fuse_request_fut(&self, fut: &mut HeadersRequestFuture) -> Result<(), ()> {
        if !fut.inc_err() {
            return Err(())
        }
        trace!(
            target: "downloaders::headers",
            "retrying request, attempt {}/{}",
            fut.retries,
            fut.max_retries
        );
        let req = self.headers_request();
        fut.request = req.clone();
        let client = Arc::clone(&self.client);
        fut.fut = Box::pin(async move { client.get_headers(req).await });
        Ok(())
    }

    fn process_header_response(
        &mut self,
        response: PeerRequestResult<Vec<Header>>,
    ) -> DownloadResult<()> {
        let mut headers = response?.into_data();
        headers.sort_unstable_by_key(|h| h.number);

        if headers.is_empty() {
            return Err(DownloadError::EmptyResponse)
        }

        // Walk the batch highest-first; each entry is the parent of the
        // previously buffered earliest header.
        for parent in headers.into_iter().rev() {
            let parent = parent.seal();

            if self.head.hash() == parent.hash() {
                // Connected to the local chain, stop buffering.
                self.buffered.push_back(parent);
                break
            }

            if let Some(header) = self.earliest_header() {
                let header = header.clone();
                validate_header_download(self.consensus.as_ref(), &header, &parent)?;
            } else if parent.hash() != self.tip {
                // First header of the download must be the requested tip.
                return Err(DownloadError::InvalidTip {
                    received: parent.hash(),
                    expected: self.tip,
                })
            }

            if parent.number <= self.head.number {
                // Walked past the local head without connecting: the tip
                // does not descend from it.
                return Err(DownloadError::MismatchedHeaders {
                    header_number: parent.number,
                    header_hash: parent.hash(),
                    parent_number: self.head.number,
                    parent_hash: self.head.hash(),
                })
            }

            self.buffered.push_back(parent);
        }
        Ok(())
    }
}

impl<C, H> Stream for HeadersDownload<C, H>
where
    C: Consensus + 'static,
    H: HeadersClient + 'static,
{
    type Item = DownloadResult<SealedHeader>;

    /// Streams validated headers tip-first. If the in-flight request is
    /// pending, buffered headers are drained first. On a failed response the
    /// request is retried up to the bound; exhaustion clears the buffer and
    /// terminates the stream with the error.
    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(header) = this.pop_header_from_buffer() {
                return Poll::Ready(Some(Ok(header)))
            }

            if this.has_terminated() {
                return Poll::Ready(None)
            }

            let mut fut = this.get_or_init_fut();
            match fut.poll_unpin(cx) {
                Poll::Ready(result) => {
                    let peer_id = result.as_ref().map(|res| res.peer_id()).ok();
                    match this.process_header_response(result) {
                        Ok(()) => {
                            if !this.has_reached_head() {
                                this.request = Some(this.get_or_init_fut());
                            }
                        }
                        Err(error) => {
                            trace!(
                                target: "downloaders::headers",
                                request = ?fut.request, %error,
                                "error processing header response"
                            );
                            if let Some(peer_id) = peer_id {
                                this.client.report_bad_message(peer_id);
                            }
                            if this.try_fuse_request_fut(&mut fut).is_err() {
                                // Out of retries; terminate.
                                this.buffered.clear();
                                this.encountered_error = true;
                                return Poll::Ready(Some(Err(error)))
                            }
                            this.request = Some(fut);
                        }
                    }
                }
                Poll::Pending => {
                    this.request = Some(fut);
                    return Poll::Pending
                }
            }
        }
    }
}

/// Builder for [`ReverseHeadersDownloader`] with default settings.
#[derive(Debug)]
pub struct ReverseHeadersDownloaderBuilder {
    batch_size: u64,
    request_retries: usize,
}

impl Default for ReverseHeadersDownloaderBuilder {
    fn default() -> Self {
        Self { batch_size: 100, request_retries: 5 }
    }
}

impl ReverseHeadersDownloaderBuilder {
    /// Set the request batch size.
    pub fn batch_size(mut self, size: u64) -> Self {
        self.batch_size = size;
        self
    }

    /// Set the number of retries per request.
    pub fn retries(mut self, retries: usize) -> Self {
        self.request_retries = retries;
        self
    }

    /// Build the downloader from consensus and client handles.
    pub fn build<C: Consensus, H: HeadersClient>(
        self,
        consensus: Arc<C>,
        client: Arc<H>,
    ) -> ReverseHeadersDownloader<C, H> {
        ReverseHeadersDownloader {
            consensus,
            client,
            batch_size: self.batch_size,
            request_retries: self.request_retries,
        }
    }
}
