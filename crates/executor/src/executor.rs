use cairn_interfaces::{consensus::Consensus, executor::BlockExecutionError};
use cairn_primitives::{
    constants::{TX_BASE_GAS, TX_DATA_NONZERO_GAS, TX_DATA_ZERO_GAS},
    keccak256, proofs, Address, Receipt, SealedBlock, TransactionKind, TransactionSigned,
    H256, U256,
};
use cairn_state::{State, StateError};
use tracing::trace;

/// The verified result of executing a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// One receipt per transaction, in body order.
    pub receipts: Vec<Receipt>,
    /// The committed post-state root.
    pub state_root: H256,
    /// Total gas consumed.
    pub gas_used: u64,
}

/// Executes blocks against their parent state.
///
/// Transaction payloads are not interpreted; execution is the intrinsic
/// transfer/fee model with code-hash bookkeeping for creations, which is the
/// part of the state transition this crate is authoritative for.
#[derive(Debug)]
pub struct BlockExecutor<'a> {
    engine: &'a dyn Consensus,
}

impl<'a> BlockExecutor<'a> {
    /// Creates an executor finalizing rewards through `engine`.
    pub fn new(engine: &'a dyn Consensus) -> Self {
        Self { engine }
    }

    /// The gas any transaction consumes before payload interpretation.
    pub fn intrinsic_gas(tx: &TransactionSigned) -> u64 {
        let data_gas: u64 = tx
            .input
            .iter()
            .map(|byte| if *byte == 0 { TX_DATA_ZERO_GAS } else { TX_DATA_NONZERO_GAS })
            .sum();
        TX_BASE_GAS + data_gas
    }

    /// Applies the block's transactions and rewards to `state`, which must be
    /// opened at the parent's committed root, and commits.
    ///
    /// Does not compare against the header; [`execute_and_verify`](Self::execute_and_verify)
    /// layers that on.
    pub fn execute(
        &self,
        block: &SealedBlock,
        state: &mut State,
    ) -> Result<ExecutionOutcome, BlockExecutionError> {
        let mut receipts = Vec::with_capacity(block.body.len());
        let mut cumulative_gas_used = 0u64;

        for tx in block.body.iter() {
            let sender = tx
                .recover_signer()
                .map_err(|_| BlockExecutionError::SenderRecoveryFailed { hash: tx.hash() })?;
            let account = state.basic_account(sender).map_err(state_err)?.unwrap_or_default();

            if tx.nonce != account.nonce {
                return Err(BlockExecutionError::NonceMismatch {
                    sender,
                    tx: tx.nonce,
                    state: account.nonce,
                })
            }

            let gas_used = Self::intrinsic_gas(tx);
            if gas_used > tx.gas_limit {
                return Err(BlockExecutionError::IntrinsicGasTooHigh { hash: tx.hash() })
            }
            if cumulative_gas_used + gas_used > block.header.gas_limit {
                return Err(BlockExecutionError::BlockGasLimitExceeded {
                    used: cumulative_gas_used + gas_used,
                    limit: block.header.gas_limit,
                })
            }
            if account.balance < tx.cost() {
                return Err(BlockExecutionError::InsufficientFunds { sender, hash: tx.hash() })
            }

            let fee = U256::from(tx.gas_price) * U256::from(gas_used);
            state.sub_balance(sender, tx.value + fee).map_err(state_err)?;
            state.increment_nonce(sender).map_err(state_err)?;
            state.add_balance(block.header.beneficiary, fee).map_err(state_err)?;

            match tx.to {
                TransactionKind::Call(recipient) => {
                    state.add_balance(recipient, tx.value).map_err(state_err)?;
                }
                TransactionKind::Create => {
                    let contract = create_address(sender, tx.nonce);
                    state.add_balance(contract, tx.value).map_err(state_err)?;
                    state
                        .set_bytecode_hash(contract, keccak256(&tx.input))
                        .map_err(state_err)?;
                }
            }

            cumulative_gas_used += gas_used;
            receipts.push(Receipt::new(true, cumulative_gas_used, Vec::new()));
        }

        // Consensus-defined minting comes after the transactions.
        let credits = self
            .engine
            .finalize(&block.header, &block.ommers)
            .map_err(|e| BlockExecutionError::StateAccess(e.to_string()))?;
        for (address, amount) in credits {
            state.add_balance(address, amount).map_err(state_err)?;
        }

        let state_root = state.commit().map_err(state_err)?;
        trace!(
            target: "executor",
            number = block.number(),
            gas = cumulative_gas_used,
            root = ?state_root,
            "executed block"
        );
        Ok(ExecutionOutcome { receipts, state_root, gas_used: cumulative_gas_used })
    }

    /// Executes the block and verifies the header's declared state root,
    /// receipts root and gas used against the outcome.
    pub fn execute_and_verify(
        &self,
        block: &SealedBlock,
        state: &mut State,
    ) -> Result<ExecutionOutcome, BlockExecutionError> {
        let outcome = self.execute(block, state)?;

        if outcome.gas_used != block.header.gas_used {
            return Err(BlockExecutionError::BlockGasUsedMismatch {
                expected: block.header.gas_used,
                got: outcome.gas_used,
            })
        }

        let receipts_root = proofs::calculate_receipts_root(outcome.receipts.iter());
        if receipts_root != block.header.receipts_root {
            return Err(BlockExecutionError::ReceiptsRootMismatch {
                expected: block.header.receipts_root,
                got: receipts_root,
            })
        }

        if outcome.state_root != block.header.state_root {
            return Err(BlockExecutionError::StateRootMismatch {
                expected: block.header.state_root,
                got: outcome.state_root,
            })
        }

        Ok(outcome)
    }
}

/// The address of a contract created by `sender` at `nonce`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    let mut input = [0u8; 28];
    input[..20].copy_from_slice(sender.as_bytes());
    input[20..].copy_from_slice(&nonce.to_be_bytes());
    let digest = keccak256(input);
    Address::from_slice(&digest.as_bytes()[12..])
}

fn state_err(error: StateError) -> BlockExecutionError {
    BlockExecutionError::StateAccess(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_interfaces::test_utils::TestConsensus;
    use cairn_primitives::{constants::EMPTY_ROOT, Block, Header, Transaction};
    use cairn_state::NodeStore;
    use secp256k1::SecretKey;
    use std::sync::Arc;

    fn sender_key() -> SecretKey {
        SecretKey::from_slice(&[0xaa; 32]).unwrap()
    }

    fn sender_address() -> Address {
        TransactionSigned::sign(Transaction::default(), &sender_key())
            .unwrap()
            .recover_signer()
            .unwrap()
    }

    fn transfer(nonce: u64, to: Address, value: u64, gas_price: u128) -> TransactionSigned {
        let tx = Transaction {
            chain_id: 1337,
            nonce,
            gas_price,
            gas_limit: TX_BASE_GAS,
            to: TransactionKind::Call(to),
            value: U256::from(value),
            input: Default::default(),
        };
        TransactionSigned::sign(tx, &sender_key()).unwrap()
    }

    fn block_with(body: Vec<TransactionSigned>) -> SealedBlock {
        let header = Header {
            number: 1,
            gas_limit: 8_000_000,
            beneficiary: Address::repeat_byte(0xbb),
            ..Default::default()
        };
        Block { header, body, ommers: Vec::new() }.seal()
    }

    fn funded_state(balance: u64) -> (Arc<NodeStore>, State) {
        let store = Arc::new(NodeStore::new());
        let mut state = State::new(Arc::clone(&store), EMPTY_ROOT);
        state.add_balance(sender_address(), U256::from(balance)).unwrap();
        state.commit().unwrap();
        (store, state)
    }

    #[test]
    fn transfer_moves_value_and_fees() {
        let engine = TestConsensus::default();
        let executor = BlockExecutor::new(&engine);
        let recipient = Address::repeat_byte(0x22);

        // Fund the sender with value + exactly one base fee at price 1.
        let (_, mut state) = funded_state(30 + TX_BASE_GAS);
        let block = block_with(vec![transfer(0, recipient, 30, 1)]);
        let outcome = executor.execute(&block, &mut state).unwrap();

        assert_eq!(outcome.gas_used, TX_BASE_GAS);
        assert_eq!(outcome.receipts.len(), 1);
        assert_eq!(outcome.receipts[0].cumulative_gas_used, TX_BASE_GAS);

        let sender = state.basic_account(sender_address()).unwrap().unwrap();
        assert_eq!(sender.balance, U256::zero());
        assert_eq!(sender.nonce, 1);
        assert_eq!(
            state.basic_account(recipient).unwrap().unwrap().balance,
            U256::from(30u64)
        );
        assert_eq!(
            state.basic_account(block.header.beneficiary).unwrap().unwrap().balance,
            U256::from(TX_BASE_GAS)
        );
    }

    #[test]
    fn nonce_gap_fails_execution() {
        let engine = TestConsensus::default();
        let executor = BlockExecutor::new(&engine);
        let (_, mut state) = funded_state(1_000_000);
        let block = block_with(vec![transfer(5, Address::repeat_byte(0x22), 1, 1)]);
        assert!(matches!(
            executor.execute(&block, &mut state),
            Err(BlockExecutionError::NonceMismatch { tx: 5, state: 0, .. })
        ));
    }

    #[test]
    fn insufficient_funds_fails_execution() {
        let engine = TestConsensus::default();
        let executor = BlockExecutor::new(&engine);
        let (_, mut state) = funded_state(10);
        let block = block_with(vec![transfer(0, Address::repeat_byte(0x22), 30, 1)]);
        assert!(matches!(
            executor.execute(&block, &mut state),
            Err(BlockExecutionError::InsufficientFunds { .. })
        ));
    }

    #[test]
    fn declared_state_root_is_enforced() {
        let engine = TestConsensus::default();
        let executor = BlockExecutor::new(&engine);
        let (_, mut state) = funded_state(1_000_000);
        // Header declares garbage roots.
        let mut block = block_with(vec![]).unseal();
        block.header.state_root = H256::repeat_byte(0xde);
        block.header.receipts_root = proofs::calculate_receipts_root(std::iter::empty());
        let block = block.seal();

        assert!(matches!(
            executor.execute_and_verify(&block, &mut state),
            Err(BlockExecutionError::StateRootMismatch { .. })
        ));
    }

    #[test]
    fn create_deploys_code_hash() {
        let engine = TestConsensus::default();
        let executor = BlockExecutor::new(&engine);
        let (_, mut state) = funded_state(1_000_000);

        let code = vec![0x60, 0x00, 0x60, 0x00];
        let tx = Transaction {
            chain_id: 1337,
            nonce: 0,
            gas_price: 1,
            gas_limit: 1_000_000,
            to: TransactionKind::Create,
            value: U256::zero(),
            input: code.clone().into(),
        };
        let signed = TransactionSigned::sign(tx, &sender_key()).unwrap();
        let block = block_with(vec![signed]);
        executor.execute(&block, &mut state).unwrap();

        let contract = create_address(sender_address(), 0);
        let account = state.basic_account(contract).unwrap().unwrap();
        assert_eq!(account.bytecode_hash, Some(keccak256(&code)));
    }

    #[test]
    fn execution_is_deterministic() {
        let recipient = Address::repeat_byte(0x22);
        let block = block_with(vec![transfer(0, recipient, 30, 1)]);

        let run = || {
            let engine = TestConsensus::default();
            let executor = BlockExecutor::new(&engine);
            let (_, mut state) = funded_state(1_000_000);
            executor.execute(&block, &mut state).unwrap().state_root
        };
        assert_eq!(run(), run());
    }
}
