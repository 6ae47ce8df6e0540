//! Helpers for constructing valid blocks in tests.

use crate::BlockChain;
use cairn_executor::BlockExecutor;
use cairn_interfaces::consensus::Consensus;
use cairn_primitives::{
    proofs, Address, Block, SealedBlock, SealedHeader, TransactionSigned, U256,
};

/// Builds a fully valid child of `parent` carrying `body`, the way a miner
/// would: execute against the parent state to learn the outcome roots, wire
/// them into the header, then hand the header to the engine for sealing.
pub fn build_block(
    chain: &BlockChain,
    parent: &SealedHeader,
    body: Vec<TransactionSigned>,
    difficulty: U256,
    beneficiary: Address,
) -> SealedBlock {
    let mut header = cairn_primitives::Header {
        parent_hash: parent.hash(),
        ommers_hash: proofs::calculate_ommers_root(std::iter::empty()),
        beneficiary,
        transactions_root: proofs::calculate_transaction_root(body.iter()),
        difficulty,
        number: parent.number + 1,
        gas_limit: parent.gas_limit,
        timestamp: parent.timestamp + 10,
        ..Default::default()
    };

    // Dry-run to learn the declared roots. The committed nodes are the same
    // ones the real insertion will produce, so this leaves no garbage.
    let draft = Block {
        header: header.clone(),
        body: body.clone(),
        ommers: Vec::new(),
    }
    .seal();
    let mut state = chain.state_at(parent.state_root).expect("parent state");
    let outcome = BlockExecutor::new(chain.engine().as_ref())
        .execute(&draft, &mut state)
        .expect("buildable block");

    header.state_root = outcome.state_root;
    header.receipts_root = proofs::calculate_receipts_root(outcome.receipts.iter());
    header.gas_used = outcome.gas_used;

    let sealed = chain.engine().seal(header).expect("sealable header");
    Block { header: sealed, body, ommers: Vec::new() }.seal()
}
