#![warn(missing_docs, unreachable_pub)]
#![deny(unused_must_use, rust_2018_idioms)]

//! Consensus engine implementations for cairn.
//!
//! The [`Engine`] type is a closed set of variants behind the
//! [`Consensus`](cairn_interfaces::consensus::Consensus) capability set:
//! proof of work with difficulty retargeting, authority-round proof of
//! authority with on-chain signer votes, and a fake engine for dev chains.
//! Shared pre-execution validation that is identical across engines lives in
//! [`validation`].

mod calc;
mod difficulty;
mod engine;
mod poa;
mod pow;

/// Engine-independent block validation.
pub mod validation;

pub use calc::{block_reward, ommer_reward};
pub use difficulty::calc_difficulty;
pub use engine::{Engine, FakeEngine};
pub use poa::{PoaEngine, Snapshot, NONCE_AUTH, NONCE_DROP, SEAL_LENGTH};
pub use pow::PowEngine;
