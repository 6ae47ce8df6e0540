use crate::{
    error::InvalidPoolTransactionError,
    pool::TransactionOrigin,
    PoolError,
};
use cairn_primitives::{
    constants::{TX_BASE_GAS, TX_DATA_NONZERO_GAS, TX_DATA_ZERO_GAS},
    Account, TransactionSigned, TransactionSignedEcRecovered,
};

/// Stateless and stateful admission checks shared by local and external
/// submission paths. Origin only changes the trust policy (price floor),
/// never the validity rules.
#[derive(Debug, Clone)]
pub struct TransactionValidator {
    chain_id: u64,
    price_floor: u128,
}

impl TransactionValidator {
    /// Creates a validator for the given chain.
    pub fn new(chain_id: u64, price_floor: u128) -> Self {
        Self { chain_id, price_floor }
    }

    /// The intrinsic gas of a transaction.
    pub fn intrinsic_gas(tx: &TransactionSigned) -> u64 {
        let data_gas: u64 = tx
            .input
            .iter()
            .map(|byte| if *byte == 0 { TX_DATA_ZERO_GAS } else { TX_DATA_NONZERO_GAS })
            .sum();
        TX_BASE_GAS + data_gas
    }

    /// Validates a submitted transaction, recovering the sender and checking
    /// it against the account `account_of` resolves for the recovered
    /// address.
    pub fn validate(
        &self,
        origin: TransactionOrigin,
        tx: TransactionSigned,
        account_of: impl FnOnce(cairn_primitives::Address) -> Option<Account>,
        block_gas_limit: u64,
    ) -> Result<TransactionSignedEcRecovered, PoolError> {
        if tx.chain_id != self.chain_id {
            return Err(InvalidPoolTransactionError::ChainIdMismatch.into())
        }

        if tx.gas_limit > block_gas_limit {
            return Err(InvalidPoolTransactionError::ExceedsBlockGasLimit {
                gas_limit: tx.gas_limit,
                block_gas_limit,
            }
            .into())
        }

        if Self::intrinsic_gas(&tx) > tx.gas_limit {
            return Err(InvalidPoolTransactionError::IntrinsicGasTooLow.into())
        }

        // Locals and reorg reinjections bypass the economic floor.
        if origin.enforces_price_floor() && tx.gas_price < self.price_floor {
            return Err(PoolError::Underpriced { price: tx.gas_price, floor: self.price_floor })
        }

        let recovered = tx
            .try_ecrecovered()
            .map_err(|_| InvalidPoolTransactionError::SignatureInvalid)?;

        let account = account_of(recovered.signer()).unwrap_or_default();
        if recovered.nonce < account.nonce {
            return Err(InvalidPoolTransactionError::NonceTooLow {
                tx: recovered.nonce,
                state: account.nonce,
            }
            .into())
        }

        let cost = recovered.cost();
        if cost > account.balance {
            return Err(InvalidPoolTransactionError::InsufficientFunds {
                cost,
                balance: account.balance,
            }
            .into())
        }

        Ok(recovered)
    }
}
