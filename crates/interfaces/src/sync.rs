//! Traits used when interacting with the sync status of the network.

/// A type that provides information about whether the node is currently
/// syncing.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait SyncStateProvider: Send + Sync {
    /// Returns `true` if the node is undergoing sync.
    fn is_syncing(&self) -> bool;
}

/// An updater for the node's [`SyncState`].
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait SyncStateUpdater: SyncStateProvider {
    /// Notifies about a sync state update.
    fn update_sync_state(&self, state: SyncState);
}

/// The state the node is currently in when it comes to synchronization.
#[derive(Clone, Eq, PartialEq, Debug)]
pub enum SyncState {
    /// Sync is complete; the node serves requests and keeps up at the tip.
    Idle,
    /// The node is downloading and importing chain data.
    Syncing,
}

impl SyncState {
    /// Whether the node is currently syncing.
    pub fn is_syncing(&self) -> bool {
        !matches!(self, SyncState::Idle)
    }
}

/// A [`SyncStateUpdater`] implementation that does nothing.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct NoopSyncStateUpdate;

impl SyncStateProvider for NoopSyncStateUpdate {
    fn is_syncing(&self) -> bool {
        false
    }
}

impl SyncStateUpdater for NoopSyncStateUpdate {
    fn update_sync_state(&self, _state: SyncState) {}
}
