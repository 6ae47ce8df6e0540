//! Well-known constant hashes and protocol bounds.

use crate::H256;

/// keccak256 of empty input.
pub const KECCAK_EMPTY: H256 = H256([
    0xc5, 0xd2, 0x46, 0x01, 0x86, 0xf7, 0x23, 0x3c, 0x92, 0x7e, 0x7d, 0xb2, 0xdc, 0xc7, 0x03,
    0xc0, 0xe5, 0x00, 0xb6, 0x53, 0xca, 0x82, 0x27, 0x3b, 0x7b, 0xfa, 0xd8, 0x04, 0x5d, 0x85,
    0xa4, 0x70,
]);

/// Commitment of a block with no ommers.
pub const EMPTY_OMMER_ROOT: H256 = KECCAK_EMPTY;

/// Commitment of a block with no transactions.
pub const EMPTY_TRANSACTIONS_ROOT: H256 = KECCAK_EMPTY;

/// Commitment of a block with no receipts.
pub const EMPTY_RECEIPTS_ROOT: H256 = KECCAK_EMPTY;

/// Root of the empty state trie.
pub const EMPTY_ROOT: H256 = KECCAK_EMPTY;

/// Upper bound on `extra_data` length for headers that do not carry an
/// authority seal.
pub const MAX_EXTRA_DATA_SIZE: usize = 32;

/// Gas charged for any transaction before payload costs.
pub const TX_BASE_GAS: u64 = 21_000;

/// Gas charged per non-zero transaction payload byte.
pub const TX_DATA_NONZERO_GAS: u64 = 16;

/// Gas charged per zero transaction payload byte.
pub const TX_DATA_ZERO_GAS: u64 = 4;
