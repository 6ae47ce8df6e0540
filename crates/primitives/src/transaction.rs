use crate::{hash_encoded, keccak256, Address, ChainId, TxHash, H256, U256};
use bytes::Bytes;
use secp256k1::{
    ecdsa::{RecoverableSignature, RecoveryId},
    Message, SecretKey, SECP256K1,
};
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use thiserror::Error;

/// Errors produced while signing or recovering transaction signatures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TxError {
    /// The signature did not recover to a valid public key.
    #[error("could not recover signer from signature")]
    RecoveryFailed,
    /// The signature values are out of range.
    #[error("signature values out of range")]
    InvalidSignatureValues,
}

/// Whether a transaction calls an existing account or creates a new contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransactionKind {
    /// A call carrying value and/or payload to the given address.
    Call(Address),
    /// A contract creation; the payload is the contract code.
    #[default]
    Create,
}

impl TransactionKind {
    /// The call target, if any.
    pub fn to(&self) -> Option<Address> {
        match self {
            TransactionKind::Call(to) => Some(*to),
            TransactionKind::Create => None,
        }
    }
}

/// An unsigned state-transition transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    /// Chain this transaction is replay-protected for.
    pub chain_id: ChainId,
    /// Sender account nonce this transaction consumes.
    pub nonce: u64,
    /// Price per unit of gas, in the smallest currency denomination.
    pub gas_price: u128,
    /// Maximum gas the sender is willing to spend.
    pub gas_limit: u64,
    /// Call target or contract creation.
    pub to: TransactionKind,
    /// Value transferred to the recipient.
    pub value: U256,
    /// Call payload or contract initialization code.
    pub input: Bytes,
}

impl Transaction {
    /// The hash the signature commits to.
    pub fn signature_hash(&self) -> H256 {
        hash_encoded(self)
    }

    /// The maximum amount the sender account must hold for this transaction
    /// to be includable: transferred value plus the gas allowance.
    pub fn cost(&self) -> U256 {
        self.value + U256::from(self.gas_price) * U256::from(self.gas_limit)
    }
}

/// An ECDSA signature over a transaction's [signature hash](Transaction::signature_hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature {
    /// R value.
    pub r: U256,
    /// S value.
    pub s: U256,
    /// Parity bit of the curve point's y coordinate.
    pub odd_y_parity: bool,
}

impl Signature {
    /// Recovers the address that produced this signature over `hash`.
    pub fn recover_signer(&self, hash: H256) -> Result<Address, TxError> {
        let mut compact = [0u8; 64];
        self.r.to_big_endian(&mut compact[..32]);
        self.s.to_big_endian(&mut compact[32..]);
        let rec_id = RecoveryId::from_i32(self.odd_y_parity as i32)
            .map_err(|_| TxError::InvalidSignatureValues)?;
        let signature = RecoverableSignature::from_compact(&compact, rec_id)
            .map_err(|_| TxError::InvalidSignatureValues)?;
        let message =
            Message::from_slice(hash.as_bytes()).map_err(|_| TxError::RecoveryFailed)?;
        let public = SECP256K1
            .recover_ecdsa(&message, &signature)
            .map_err(|_| TxError::RecoveryFailed)?;
        Ok(public_key_to_address(&public))
    }
}

/// Derives an address from an uncompressed secp256k1 public key.
fn public_key_to_address(public: &secp256k1::PublicKey) -> Address {
    // Skip the 0x04 uncompressed-point tag, address is the low 20 bytes of
    // the keccak of the remaining 64.
    let digest = keccak256(&public.serialize_uncompressed()[1..]);
    Address::from_slice(&digest.as_bytes()[12..])
}

/// Signs the given message hash, producing a recoverable [`Signature`].
pub fn sign_message(secret: &SecretKey, hash: H256) -> Result<Signature, TxError> {
    let message = Message::from_slice(hash.as_bytes()).map_err(|_| TxError::RecoveryFailed)?;
    let (rec_id, compact) =
        SECP256K1.sign_ecdsa_recoverable(&message, secret).serialize_compact();
    Ok(Signature {
        r: U256::from_big_endian(&compact[..32]),
        s: U256::from_big_endian(&compact[32..]),
        odd_y_parity: rec_id.to_i32() != 0,
    })
}

/// A signed transaction with its memoized identity hash.
///
/// Only the transaction and signature are encoded; the hash is recomputed on
/// decode so a peer cannot plant a forged identity that would satisfy a
/// header's transaction-root commitment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransactionSigned {
    /// The unsigned transaction.
    pub transaction: Transaction,
    /// The sender's signature.
    pub signature: Signature,
    /// Memoized hash of the encoded signed transaction.
    hash: TxHash,
}

impl Serialize for TransactionSigned {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.transaction, &self.signature).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TransactionSigned {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (transaction, signature) = <(Transaction, Signature)>::deserialize(deserializer)?;
        Ok(Self::from_transaction_and_signature(transaction, signature))
    }
}

impl TransactionSigned {
    /// Assembles a signed transaction, computing its hash.
    pub fn from_transaction_and_signature(
        transaction: Transaction,
        signature: Signature,
    ) -> Self {
        let hash = hash_encoded(&(&transaction, &signature));
        Self { transaction, signature, hash }
    }

    /// Signs `transaction` with `secret` and assembles the result.
    pub fn sign(transaction: Transaction, secret: &SecretKey) -> Result<Self, TxError> {
        let signature = sign_message(secret, transaction.signature_hash())?;
        Ok(Self::from_transaction_and_signature(transaction, signature))
    }

    /// The transaction's identity hash.
    pub fn hash(&self) -> TxHash {
        self.hash
    }

    /// Recovers the sender address from the signature.
    pub fn recover_signer(&self) -> Result<Address, TxError> {
        self.signature.recover_signer(self.transaction.signature_hash())
    }

    /// Recovers the signer, consuming self into a recovered transaction.
    pub fn try_ecrecovered(self) -> Result<TransactionSignedEcRecovered, TxError> {
        let signer = self.recover_signer()?;
        Ok(TransactionSignedEcRecovered { signed: self, signer })
    }
}

impl Deref for TransactionSigned {
    type Target = Transaction;

    fn deref(&self) -> &Self::Target {
        &self.transaction
    }
}

/// A signed transaction paired with its recovered sender.
///
/// Recovery is expensive, so it is done once at the trust boundary and the
/// result carried alongside the transaction from then on. Deliberately not
/// serializable: a decoded signer would be an unverified claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSignedEcRecovered {
    signed: TransactionSigned,
    signer: Address,
}

impl TransactionSignedEcRecovered {
    /// Pairs a signed transaction with an already known signer.
    ///
    /// Intended for tests and for senders recovered elsewhere; the caller
    /// vouches for `signer` actually matching the signature.
    pub fn from_signed_transaction(signed: TransactionSigned, signer: Address) -> Self {
        Self { signed, signer }
    }

    /// The recovered sender address.
    pub fn signer(&self) -> Address {
        self.signer
    }

    /// The transaction's identity hash.
    pub fn hash(&self) -> TxHash {
        self.signed.hash()
    }

    /// The underlying signed transaction.
    pub fn as_signed(&self) -> &TransactionSigned {
        &self.signed
    }

    /// Discards the signer, yielding the signed transaction.
    pub fn into_signed(self) -> TransactionSigned {
        self.signed
    }
}

impl Deref for TransactionSignedEcRecovered {
    type Target = TransactionSigned;

    fn deref(&self) -> &Self::Target {
        &self.signed
    }
}
