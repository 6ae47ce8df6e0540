//! Engine-independent block validation, ordered cheap to expensive.

use cairn_interfaces::{
    consensus::ConsensusError,
    provider::{AccountProvider, HeaderProvider},
};
use cairn_primitives::{
    proofs, SealedBlock, SealedHeader, TransactionSignedEcRecovered,
};
use std::{
    collections::{hash_map::Entry, HashMap},
    time::SystemTime,
};

/// Seconds a header's timestamp may run ahead of the local clock.
pub const ALLOWED_FUTURE_BLOCK_SECS: u64 = 15;

/// Divisor bounding the per-block gas limit delta.
pub const GAS_LIMIT_BOUND_DIVISOR: u64 = 1024;

/// Validate header parts that need no chain context.
pub fn validate_header_standalone(
    header: &SealedHeader,
    max_extra_data: usize,
) -> Result<(), ConsensusError> {
    // Gas used is re-checked against actual execution later; the declared
    // value must at least be self-consistent.
    if header.gas_used > header.gas_limit {
        return Err(ConsensusError::HeaderGasUsedExceedsGasLimit {
            gas_used: header.gas_used,
            gas_limit: header.gas_limit,
        })
    }

    // Clocks drift; anything beyond the allowance is a consensus issue.
    let present_timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    if header.timestamp > present_timestamp + ALLOWED_FUTURE_BLOCK_SECS {
        return Err(ConsensusError::FutureBlock {
            timestamp: header.timestamp,
            present_timestamp,
        })
    }

    if header.extra_data.len() > max_extra_data {
        return Err(ConsensusError::ExtraDataExceedsMax { len: header.extra_data.len() })
    }

    Ok(())
}

/// Validate a header against its parent.
///
/// Difficulty and seal are the engine's business and are checked by the
/// engine after these structural rules pass.
pub fn validate_header_regarding_parent(
    parent: &SealedHeader,
    child: &SealedHeader,
) -> Result<(), ConsensusError> {
    if parent.number + 1 != child.number {
        return Err(ConsensusError::ParentBlockNumberMismatch {
            parent_block_number: parent.number,
            block_number: child.number,
        })
    }

    if child.timestamp <= parent.timestamp {
        return Err(ConsensusError::TimestampIsInPast {
            parent_timestamp: parent.timestamp,
            timestamp: child.timestamp,
        })
    }

    // The limit may move at most 1/1024th per block.
    let max_delta = parent.gas_limit / GAS_LIMIT_BOUND_DIVISOR;
    if child.gas_limit > parent.gas_limit {
        if child.gas_limit - parent.gas_limit >= max_delta {
            return Err(ConsensusError::GasLimitInvalidIncrease {
                parent_gas_limit: parent.gas_limit,
                child_gas_limit: child.gas_limit,
            })
        }
    } else if parent.gas_limit - child.gas_limit >= max_delta {
        return Err(ConsensusError::GasLimitInvalidDecrease {
            parent_gas_limit: parent.gas_limit,
            child_gas_limit: child.gas_limit,
        })
    }

    Ok(())
}

/// Validate a block's body against its header commitments.
pub fn validate_block_standalone(block: &SealedBlock) -> Result<(), ConsensusError> {
    let ommers_hash = proofs::calculate_ommers_root(block.ommers.iter());
    if block.header.ommers_hash != ommers_hash {
        return Err(ConsensusError::BodyOmmersHashDiff {
            got: ommers_hash,
            expected: block.header.ommers_hash,
        })
    }

    let transaction_root = proofs::calculate_transaction_root(block.body.iter());
    if block.header.transactions_root != transaction_root {
        return Err(ConsensusError::BodyTransactionRootDiff {
            got: transaction_root,
            expected: block.header.transactions_root,
        })
    }

    Ok(())
}

/// Validate a block's place in the chain: it must be new and its parent
/// known. Returns the parent header.
pub fn validate_block_regarding_chain<P: HeaderProvider>(
    block: &SealedBlock,
    provider: &P,
) -> cairn_interfaces::Result<SealedHeader> {
    let hash = block.hash();

    if provider.is_known(&hash)? {
        return Err(ConsensusError::BlockKnown { hash, number: block.number() }.into())
    }

    let parent = provider
        .header(&block.parent_hash())?
        .ok_or(ConsensusError::ParentUnknown { hash: block.parent_hash() })?;

    Ok(parent.seal())
}

/// Verify every transaction against the block and the per-sender nonce
/// sequence implied by the pre-state.
pub fn validate_all_transactions_regarding_block_and_nonces<
    'a,
    P: HeaderProvider + AccountProvider,
>(
    transactions: impl Iterator<Item = &'a TransactionSignedEcRecovered>,
    header: &SealedHeader,
    provider: &P,
    chain_id: u64,
) -> cairn_interfaces::Result<()> {
    let mut account_nonces = HashMap::new();

    for transaction in transactions {
        if transaction.chain_id != chain_id {
            return Err(ConsensusError::TransactionChainId.into())
        }

        if transaction.gas_limit > header.gas_limit {
            return Err(ConsensusError::TransactionGasLimitExceedsBlockGasLimit {
                gas_limit: transaction.gas_limit,
                block_gas_limit: header.gas_limit,
            }
            .into())
        }

        // Take the nonce from the previous transaction of the same sender if
        // there was one in this block already.
        let nonce = match account_nonces.entry(transaction.signer()) {
            Entry::Occupied(mut entry) => {
                let nonce = *entry.get();
                *entry.get_mut() += 1;
                nonce
            }
            Entry::Vacant(entry) => {
                let account =
                    provider.basic_account(transaction.signer())?.unwrap_or_default();
                // A sending account with bytecode is a contract, which cannot
                // originate transactions.
                if account.has_bytecode() {
                    return Err(ConsensusError::SignerAccountHasBytecode.into())
                }
                let nonce = account.nonce;
                entry.insert(account.nonce + 1);
                nonce
            }
        };

        if transaction.nonce != nonce {
            return Err(ConsensusError::TransactionNonceNotConsistent.into())
        }
    }

    Ok(())
}

/// Full pre-execution validation of a block.
pub fn full_validation<P: HeaderProvider + AccountProvider>(
    block: &SealedBlock,
    provider: &P,
    engine: &dyn cairn_interfaces::consensus::Consensus,
    chain_id: u64,
) -> cairn_interfaces::Result<()> {
    engine.validate_header_standalone(&block.header)?;
    validate_block_standalone(block)?;
    let parent = validate_block_regarding_chain(block, provider)?;
    engine.validate_header(&block.header, &parent)?;
    engine.validate_ommers(&block.header, &block.ommers, provider)?;

    let transactions = block
        .body
        .iter()
        .map(|tx| {
            tx.clone()
                .try_ecrecovered()
                .map_err(|_| ConsensusError::TransactionSignerRecoveryError)
        })
        .collect::<Result<Vec<_>, _>>()?;

    validate_all_transactions_regarding_block_and_nonces(
        transactions.iter(),
        &block.header,
        provider,
        chain_id,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_interfaces::test_utils::generators::random_header;
    use cairn_primitives::{Block, Header};

    #[test]
    fn future_timestamp_is_rejected() {
        let far_future = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default() +
            ALLOWED_FUTURE_BLOCK_SECS * 10;
        let header = Header { timestamp: far_future, ..Default::default() }.seal();
        assert!(matches!(
            validate_header_standalone(&header, 32),
            Err(ConsensusError::FutureBlock { .. })
        ));
    }

    #[test]
    fn number_must_follow_parent() {
        let parent = random_header(10, None);
        let mut child = random_header(12, Some(parent.hash())).unseal();
        child.timestamp = parent.timestamp + 1;
        child.gas_limit = parent.gas_limit;
        assert!(matches!(
            validate_header_regarding_parent(&parent, &child.seal()),
            Err(ConsensusError::ParentBlockNumberMismatch { .. })
        ));
    }

    #[test]
    fn timestamp_must_advance() {
        let parent = random_header(10, None);
        let mut child = random_header(11, Some(parent.hash())).unseal();
        child.timestamp = parent.timestamp;
        child.gas_limit = parent.gas_limit;
        assert!(matches!(
            validate_header_regarding_parent(&parent, &child.seal()),
            Err(ConsensusError::TimestampIsInPast { .. })
        ));
    }

    #[test]
    fn gas_limit_delta_is_bounded() {
        let parent = random_header(10, None);
        let mut child = random_header(11, Some(parent.hash())).unseal();
        child.timestamp = parent.timestamp + 1;
        child.gas_limit = parent.gas_limit * 2;
        assert!(matches!(
            validate_header_regarding_parent(&parent, &child.seal()),
            Err(ConsensusError::GasLimitInvalidIncrease { .. })
        ));
    }

    #[test]
    fn body_commitments_are_enforced() {
        let mut header = Header::default();
        header.transactions_root = proofs::calculate_transaction_root(std::iter::empty());
        header.ommers_hash = proofs::calculate_ommers_root(std::iter::empty());
        let ok = Block { header: header.clone(), body: vec![], ommers: vec![] }.seal();
        assert_eq!(validate_block_standalone(&ok), Ok(()));

        let bad = Block {
            header,
            body: vec![Default::default()],
            ommers: vec![],
        }
        .seal();
        assert!(matches!(
            validate_block_standalone(&bad),
            Err(ConsensusError::BodyTransactionRootDiff { .. })
        ));
    }
}
