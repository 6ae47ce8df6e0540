use crate::{Address, BlockHash, BlockNumber, Header, H256, U256};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// The consensus rule a chain runs under, with its tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    /// Nakamoto-style proof of work with difficulty retargeting.
    ProofOfWork {
        /// Number of blocks the difficulty bomb is delayed by.
        bomb_delay: u64,
    },
    /// Authority-round proof of authority with on-chain signer votes.
    ProofOfAuthority {
        /// Vote tally window; headers at multiples of this reset tallies.
        epoch: u64,
        /// Minimum seconds between consecutive blocks.
        period: u64,
        /// The initial authorized signers.
        signers: Vec<Address>,
    },
    /// Accepts any seal. Test and private networks only.
    Fake,
}

/// An account funded at genesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenesisAccount {
    /// The funded address.
    pub address: Address,
    /// Its initial balance.
    pub balance: U256,
}

/// The genesis block definition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Genesis {
    /// Genesis timestamp.
    pub timestamp: u64,
    /// Initial block gas limit.
    pub gas_limit: u64,
    /// Genesis difficulty.
    pub difficulty: U256,
    /// Genesis extra data.
    pub extra_data: Bytes,
    /// Accounts funded at genesis.
    pub alloc: Vec<GenesisAccount>,
}

/// Chain-wide configuration: identity, genesis and consensus selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSpec {
    /// Network/chain identifier used for replay protection and handshakes.
    pub chain_id: u64,
    /// The genesis definition.
    pub genesis: Genesis,
    /// Consensus engine selection.
    pub engine: EngineKind,
    /// Base reward minted per proof-of-work block.
    pub base_block_reward: U256,
}

impl ChainSpec {
    /// The genesis header for this chain, rooted at the given state.
    ///
    /// The state root is computed by applying [`Genesis::alloc`] to an empty
    /// state, which lives a crate above; callers thread it in.
    pub fn genesis_header(&self, state_root: H256) -> Header {
        Header {
            parent_hash: H256::zero(),
            ommers_hash: crate::constants::EMPTY_OMMER_ROOT,
            beneficiary: Address::zero(),
            state_root,
            transactions_root: crate::constants::EMPTY_TRANSACTIONS_ROOT,
            receipts_root: crate::constants::EMPTY_RECEIPTS_ROOT,
            difficulty: self.genesis.difficulty,
            number: 0,
            gas_limit: self.genesis.gas_limit,
            gas_used: 0,
            timestamp: self.genesis.timestamp,
            extra_data: self.genesis.extra_data.clone(),
            mix_hash: H256::zero(),
            nonce: 0,
        }
    }

    /// A proof-of-work spec with low difficulty, for tests and dev chains.
    pub fn dev_pow() -> Self {
        Self {
            chain_id: 1337,
            genesis: Genesis {
                gas_limit: 8_000_000,
                difficulty: U256::from(131_072u64),
                ..Default::default()
            },
            engine: EngineKind::ProofOfWork { bomb_delay: 9_000_000 },
            base_block_reward: U256::from(2_000_000_000_000_000_000u128),
        }
    }

    /// A proof-of-authority spec with the given signers.
    pub fn dev_poa(signers: Vec<Address>) -> Self {
        Self {
            chain_id: 1337,
            genesis: Genesis {
                gas_limit: 8_000_000,
                difficulty: U256::one(),
                ..Default::default()
            },
            engine: EngineKind::ProofOfAuthority { epoch: 30_000, period: 1, signers },
            base_block_reward: U256::zero(),
        }
    }

    /// A spec whose engine accepts any seal.
    pub fn dev_fake() -> Self {
        Self {
            chain_id: 1337,
            genesis: Genesis {
                gas_limit: 8_000_000,
                difficulty: U256::from(131_072u64),
                ..Default::default()
            },
            engine: EngineKind::Fake,
            base_block_reward: U256::from(2_000_000_000_000_000_000u128),
        }
    }
}

/// The current head of the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChainInfo {
    /// Hash of the best known block.
    pub best_hash: BlockHash,
    /// Number of the best known block.
    pub best_number: BlockNumber,
}
