use crate::{hash_encoded, keccak256, Header, Receipt, TransactionSigned, H256};

/// Order-sensitive commitment over a sequence of item hashes.
///
/// The empty sequence commits to [`KECCAK_EMPTY`](crate::constants::KECCAK_EMPTY),
/// so the empty-list constants fall out of the definition.
pub fn ordered_root(hashes: impl Iterator<Item = H256>) -> H256 {
    let mut buf = Vec::new();
    for hash in hashes {
        buf.extend_from_slice(hash.as_bytes());
    }
    keccak256(buf)
}

/// Commitment to an ordered list of transactions.
pub fn calculate_transaction_root<'a>(
    transactions: impl Iterator<Item = &'a TransactionSigned>,
) -> H256 {
    ordered_root(transactions.map(|tx| tx.hash()))
}

/// Commitment to an ordered list of ommer headers.
pub fn calculate_ommers_root<'a>(ommers: impl Iterator<Item = &'a Header>) -> H256 {
    ordered_root(ommers.map(|header| header.hash_slow()))
}

/// Commitment to an ordered list of receipts.
pub fn calculate_receipts_root<'a>(receipts: impl Iterator<Item = &'a Receipt>) -> H256 {
    ordered_root(receipts.map(hash_encoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{EMPTY_OMMER_ROOT, EMPTY_TRANSACTIONS_ROOT};

    #[test]
    fn empty_roots_match_constants() {
        let txs: [TransactionSigned; 0] = [];
        let ommers: [Header; 0] = [];
        assert_eq!(calculate_transaction_root(txs.iter()), EMPTY_TRANSACTIONS_ROOT);
        assert_eq!(calculate_ommers_root(ommers.iter()), EMPTY_OMMER_ROOT);
    }

    #[test]
    fn root_is_order_sensitive() {
        let a = Header { number: 1, ..Default::default() };
        let b = Header { number: 2, ..Default::default() };
        let ab = calculate_ommers_root([a.clone(), b.clone()].iter());
        let ba = calculate_ommers_root([b, a].iter());
        assert_ne!(ab, ba);
    }
}
