//! Random generators for headers, transactions and blocks.
//!
//! Generated data links correctly (parent hashes, numbers) but does not pass
//! consensus validation unless stated otherwise.

use cairn_primitives::{
    proofs, Block, Header, SealedBlock, SealedHeader, Transaction, TransactionKind,
    TransactionSigned, H160, H256, U256,
};
use rand::Rng;
use secp256k1::SecretKey;

/// Generates a random header at `number` whose parent hash is `parent` (or
/// random if `None`).
pub fn random_header(number: u64, parent: Option<H256>) -> SealedHeader {
    let mut rng = rand::thread_rng();
    let header = Header {
        number,
        nonce: rng.gen(),
        difficulty: U256::from(rng.gen::<u32>()),
        parent_hash: parent.unwrap_or_else(|| H256(rng.gen())),
        gas_limit: 8_000_000,
        timestamp: number,
        ..Default::default()
    };
    header.seal()
}

/// Generates a linked range of random headers; the first header's parent
/// hash is `head`.
pub fn random_header_range(range: std::ops::Range<u64>, head: H256) -> Vec<SealedHeader> {
    let mut headers = Vec::with_capacity(range.end.saturating_sub(range.start) as usize);
    for number in range {
        let parent = headers.last().map(|h: &SealedHeader| h.hash()).unwrap_or(head);
        headers.push(random_header(number, Some(parent)));
    }
    headers
}

/// Generates a random unsigned transaction.
pub fn random_tx() -> Transaction {
    let mut rng = rand::thread_rng();
    Transaction {
        chain_id: 1337,
        nonce: rng.gen::<u16>() as u64,
        gas_price: rng.gen::<u16>() as u128,
        gas_limit: 21_000,
        to: TransactionKind::Call(H160(rng.gen())),
        value: U256::from(rng.gen::<u32>()),
        input: Default::default(),
    }
}

/// Generates a random transaction signed by a random key.
pub fn random_signed_tx() -> TransactionSigned {
    let mut rng = rand::thread_rng();
    let secret = loop {
        if let Ok(secret) = SecretKey::from_slice(&rng.gen::<[u8; 32]>()) {
            break secret
        }
    };
    TransactionSigned::sign(random_tx(), &secret).expect("valid key")
}

/// Generates a block at `number` on the given parent with `tx_count` random
/// signed transactions, with body commitments wired into the header.
pub fn random_block(number: u64, parent: Option<H256>, tx_count: usize) -> SealedBlock {
    let body: Vec<TransactionSigned> = (0..tx_count).map(|_| random_signed_tx()).collect();
    let mut header = random_header(number, parent).unseal();
    header.transactions_root = proofs::calculate_transaction_root(body.iter());
    header.ommers_hash = proofs::calculate_ommers_root(std::iter::empty());
    Block { header, body, ommers: Vec::new() }.seal()
}

/// Generates a linked range of random blocks.
pub fn random_block_range(range: std::ops::Range<u64>, head: H256) -> Vec<SealedBlock> {
    let mut blocks = Vec::with_capacity(range.end.saturating_sub(range.start) as usize);
    for number in range {
        let parent = blocks.last().map(|b: &SealedBlock| b.hash()).unwrap_or(head);
        blocks.push(random_block(number, Some(parent), 2));
    }
    blocks
}
