use cairn_primitives::SealedBlock;

pub use cairn_interfaces::events::{CanonStateListener, CanonicalStateUpdate};

/// Events published on canonical chain progress.
#[derive(Debug, Clone)]
pub enum ChainEvent {
    /// A new canonical head was adopted.
    Head {
        /// The new head block.
        block: SealedBlock,
    },
    /// A valid block was stored on a non-canonical branch.
    Side {
        /// The side block.
        block: SealedBlock,
    },
}
