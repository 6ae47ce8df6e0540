use cairn_interfaces::p2p::{
    downloader::DownloadClient,
    error::{DownloadError, DownloadResult},
    node_data::NodeDataClient,
};
use cairn_primitives::{keccak256, H256};
use cairn_state::NodeStore;
use std::{collections::VecDeque, sync::Arc};
use tracing::{debug, trace};

/// Downloads the state trie below a pivot root by content hash.
///
/// Nodes are self-verifying: the keccak of the delivered bytes must equal
/// the hash they were requested under, so nothing a peer sends can land in
/// the store under a wrong key. Traversal is breadth-first over unknown
/// children; already-present subtrees (from earlier syncs or shared
/// content) are skipped wholesale.
#[derive(Debug)]
pub struct StateSync<C> {
    client: Arc<C>,
    store: Arc<NodeStore>,
    batch_size: usize,
    request_retries: usize,
}

impl<C> StateSync<C>
where
    C: NodeDataClient + 'static,
{
    /// Creates a state sync over a node-data client and the local store.
    pub fn new(
        client: Arc<C>,
        store: Arc<NodeStore>,
        batch_size: usize,
        request_retries: usize,
    ) -> Self {
        Self {
            client,
            store,
            batch_size: batch_size.max(1),
            request_retries: request_retries.max(1),
        }
    }

    /// Pulls every node reachable from `root` that is not yet stored.
    /// Returns how many nodes were fetched.
    pub async fn run(&self, root: H256) -> DownloadResult<usize> {
        let mut queue: VecDeque<H256> = VecDeque::new();
        if !self.store.contains(&root) {
            queue.push_back(root);
        }

        let mut fetched = 0usize;
        let mut failures = 0usize;
        while !queue.is_empty() {
            let batch: Vec<H256> = queue
                .iter()
                .take(self.batch_size)
                .copied()
                .collect();
            trace!(target: "downloaders::state", count = batch.len(), "requesting state nodes");

            let response = match self.client.get_node_data(batch.clone()).await {
                Ok(response) => response,
                Err(error) => {
                    failures += 1;
                    if failures >= self.request_retries {
                        return Err(error.into())
                    }
                    continue
                }
            };
            let (peer, entries) = response.split();
            if entries.is_empty() {
                failures += 1;
                if failures >= self.request_retries {
                    return Err(DownloadError::EmptyResponse)
                }
                continue
            }

            for (requested, bytes) in batch.iter().zip(entries) {
                let got = keccak256(&bytes);
                if got != *requested {
                    self.client.report_bad_message(peer);
                    return Err(DownloadError::NodeDataHashMismatch {
                        expected: *requested,
                        got,
                    })
                }
                let hash = self
                    .store
                    .insert_raw(bytes)
                    .map_err(|_| DownloadError::NodeDataHashMismatch {
                        expected: *requested,
                        got,
                    })?;
                // Content hash equality was checked above.
                debug_assert_eq!(hash, *requested);
                fetched += 1;
                queue.pop_front();

                if let Ok(node) = self.store.get_node(&hash) {
                    for child in node.child_hashes() {
                        if !self.store.contains(&child) && !queue.contains(&child) {
                            queue.push_back(child);
                        }
                    }
                }
            }
            failures = 0;
        }

        debug!(target: "downloaders::state", fetched, root = ?root, "state sync complete");
        Ok(fetched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestFullClient;
    use assert_matches::assert_matches;
    use cairn_primitives::constants::EMPTY_ROOT;

    fn populated_store() -> (Arc<NodeStore>, H256) {
        let store = Arc::new(NodeStore::new());
        let mut root = EMPTY_ROOT;
        for byte in 1..=8u8 {
            root = store.trie_insert(root, &[byte; 32], vec![byte]).unwrap();
        }
        (store, root)
    }

    #[tokio::test]
    async fn pulls_whole_trie_and_verifies_content() {
        let (remote, root) = populated_store();
        let client = Arc::new(TestFullClient::default());
        client.serve_state(&remote);

        let local = Arc::new(NodeStore::new());
        let sync = StateSync::new(Arc::clone(&client), Arc::clone(&local), 4, 3);
        let fetched = sync.run(root).await.unwrap();

        assert_eq!(fetched, remote.len());
        assert_eq!(local.trie_get(root, &[3u8; 32]).unwrap(), Some(vec![3]));
    }

    #[tokio::test]
    async fn corrupted_node_fails_the_sync() {
        let (remote, root) = populated_store();
        let client = Arc::new(TestFullClient::default());
        client.serve_state(&remote);
        client.corrupt_node(root);

        let local = Arc::new(NodeStore::new());
        let sync = StateSync::new(Arc::clone(&client), Arc::clone(&local), 4, 3);
        let result = sync.run(root).await;
        assert_matches!(result, Err(DownloadError::NodeDataHashMismatch { .. }));
        assert!(!client.bad_peers().is_empty());
    }

    #[tokio::test]
    async fn known_subtrees_are_skipped() {
        let (remote, root) = populated_store();
        let client = Arc::new(TestFullClient::default());
        client.serve_state(&remote);

        // Local store already has everything.
        let sync = StateSync::new(Arc::clone(&client), Arc::clone(&remote), 4, 3);
        let fetched = sync.run(root).await.unwrap();
        assert_eq!(fetched, 0);
    }
}
