use crate::{calc, difficulty::calc_difficulty, validation};
use cairn_interfaces::{
    consensus::{Consensus, ConsensusError},
    provider::HeaderProvider,
};
use cairn_primitives::{
    constants::MAX_EXTRA_DATA_SIZE, keccak256, Address, Header, SealedHeader, H256, U256,
};
use std::collections::HashSet;
use tracing::trace;

/// Maximum number of ommers a block may reference.
const MAX_OMMERS: usize = 2;

/// How many generations back an ommer may reach.
const MAX_OMMER_DEPTH: u64 = 7;

/// Upper bound on nonces tried when sealing before giving up.
const MAX_SEAL_ATTEMPTS: u64 = 1 << 26;

/// Proof-of-work consensus engine.
///
/// The seal binds a nonce to the header's seal hash through two keccak
/// passes: the first produces the intermediate `mix_hash` recorded in the
/// header, the second the work value compared against the difficulty target.
/// A dataset-backed hash like the original's is out of scope; both schemes
/// share the verify-cheap/produce-expensive asymmetry this engine relies on.
#[derive(Debug, Clone)]
pub struct PowEngine {
    bomb_delay: u64,
    base_block_reward: U256,
}

impl PowEngine {
    /// Creates the engine with the given bomb delay and base reward.
    pub fn new(bomb_delay: u64, base_block_reward: U256) -> Self {
        Self { bomb_delay, base_block_reward }
    }

    /// The mix and work digests for a seal hash and nonce.
    pub fn compute_seal(seal_hash: H256, nonce: u64) -> (H256, H256) {
        let mut input = [0u8; 40];
        input[..32].copy_from_slice(seal_hash.as_bytes());
        input[32..].copy_from_slice(&nonce.to_le_bytes());
        let mix = keccak256(input);

        let mut work_input = [0u8; 64];
        work_input[..32].copy_from_slice(mix.as_bytes());
        work_input[32..].copy_from_slice(seal_hash.as_bytes());
        let work = keccak256(work_input);
        (mix, work)
    }

    /// The work target for a difficulty.
    fn target(difficulty: U256) -> Option<U256> {
        if difficulty.is_zero() {
            None
        } else {
            Some(U256::MAX / difficulty)
        }
    }

    fn verify_seal(&self, header: &SealedHeader) -> Result<(), ConsensusError> {
        let target = Self::target(header.difficulty)
            .ok_or(ConsensusError::InvalidSeal { hash: header.hash() })?;
        let (mix, work) = Self::compute_seal(header.seal_hash(), header.nonce);
        if mix != header.mix_hash {
            return Err(ConsensusError::InvalidSeal { hash: header.hash() })
        }
        if U256::from_big_endian(work.as_bytes()) > target {
            return Err(ConsensusError::InvalidSeal { hash: header.hash() })
        }
        Ok(())
    }

    /// Collects the hashes of up to [`MAX_OMMER_DEPTH`] ancestors of
    /// `header`, nearest first.
    fn ancestor_hashes(
        &self,
        header: &SealedHeader,
        provider: &dyn HeaderProvider,
    ) -> Result<Vec<(H256, Header)>, ConsensusError> {
        let mut out = Vec::new();
        let mut hash = header.parent_hash;
        for _ in 0..MAX_OMMER_DEPTH {
            let Ok(Some(ancestor)) = provider.header(&hash) else { break };
            let next = ancestor.parent_hash;
            out.push((hash, ancestor));
            hash = next;
        }
        Ok(out)
    }
}

impl Consensus for PowEngine {
    fn validate_header_standalone(&self, header: &SealedHeader) -> Result<(), ConsensusError> {
        validation::validate_header_standalone(header, MAX_EXTRA_DATA_SIZE)
    }

    fn validate_header(
        &self,
        header: &SealedHeader,
        parent: &SealedHeader,
    ) -> Result<(), ConsensusError> {
        validation::validate_header_regarding_parent(parent, header)?;

        let expected = calc_difficulty(header.timestamp, parent, self.bomb_delay);
        if header.difficulty != expected {
            return Err(ConsensusError::DifficultyMismatch { expected, got: header.difficulty })
        }

        self.verify_seal(header)
    }

    fn validate_ommers(
        &self,
        header: &SealedHeader,
        ommers: &[Header],
        provider: &dyn HeaderProvider,
    ) -> Result<(), ConsensusError> {
        if ommers.is_empty() {
            return Ok(())
        }
        if ommers.len() > MAX_OMMERS {
            return Err(ConsensusError::TooManyOmmers { count: ommers.len() })
        }

        let ancestors = self.ancestor_hashes(header, provider)?;
        let ancestor_hashes: HashSet<H256> = ancestors.iter().map(|(hash, _)| *hash).collect();

        let mut seen = HashSet::new();
        for ommer in ommers {
            let hash = ommer.hash_slow();
            if !seen.insert(hash) {
                return Err(ConsensusError::DuplicateOmmer { hash })
            }
            if ancestor_hashes.contains(&hash) || hash == header.hash() {
                return Err(ConsensusError::OmmerIsAncestor { hash })
            }

            let depth = header.number.saturating_sub(ommer.number);
            if depth == 0 || depth > MAX_OMMER_DEPTH {
                return Err(ConsensusError::OmmerTooDeep {
                    number: header.number,
                    ommer: ommer.number,
                })
            }

            // The ommer must branch off a known near ancestor and be a valid
            // block in its own right.
            let parent = ancestors
                .iter()
                .find(|(hash, _)| *hash == ommer.parent_hash)
                .map(|(_, header)| header.clone())
                .ok_or(ConsensusError::OmmerParentUnknown { hash: ommer.parent_hash })?;
            self.validate_header(&ommer.clone().seal(), &parent.seal())?;
        }

        Ok(())
    }

    fn finalize(
        &self,
        header: &SealedHeader,
        ommers: &[Header],
    ) -> Result<Vec<(Address, U256)>, ConsensusError> {
        let mut credits = Vec::with_capacity(1 + ommers.len());
        credits.push((
            header.beneficiary,
            calc::block_reward(self.base_block_reward, ommers.len()),
        ));
        for ommer in ommers {
            credits.push((
                ommer.beneficiary,
                calc::ommer_reward(self.base_block_reward, header.number, ommer.number),
            ));
        }
        Ok(credits)
    }

    fn author(&self, header: &SealedHeader) -> Result<Address, ConsensusError> {
        Ok(header.beneficiary)
    }

    fn seal(&self, mut header: Header) -> Result<Header, ConsensusError> {
        let target = Self::target(header.difficulty)
            .ok_or(ConsensusError::CannotSeal { reason: "zero difficulty" })?;
        let seal_hash = header.seal_hash();
        for nonce in 0..MAX_SEAL_ATTEMPTS {
            let (mix, work) = Self::compute_seal(seal_hash, nonce);
            if U256::from_big_endian(work.as_bytes()) <= target {
                trace!(target: "consensus::pow", nonce, number = header.number, "sealed header");
                header.nonce = nonce;
                header.mix_hash = mix;
                return Ok(header)
            }
        }
        Err(ConsensusError::CannotSeal { reason: "exhausted nonce attempts" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::difficulty::calc_difficulty;
    use assert_matches::assert_matches;
    use cairn_primitives::constants::EMPTY_OMMER_ROOT;

    fn engine() -> PowEngine {
        PowEngine::new(u64::MAX, U256::from(1_000u64))
    }

    fn genesis() -> SealedHeader {
        Header {
            difficulty: U256::from(131_072u64),
            gas_limit: 8_000_000,
            timestamp: 100,
            ommers_hash: EMPTY_OMMER_ROOT,
            ..Default::default()
        }
        .seal()
    }

    fn sealed_child(engine: &PowEngine, parent: &SealedHeader) -> SealedHeader {
        let header = Header {
            parent_hash: parent.hash(),
            number: parent.number + 1,
            timestamp: parent.timestamp + 10,
            difficulty: calc_difficulty(parent.timestamp + 10, parent, u64::MAX),
            gas_limit: parent.gas_limit,
            ommers_hash: EMPTY_OMMER_ROOT,
            ..Default::default()
        };
        engine.seal(header).unwrap().seal()
    }

    #[test]
    fn sealed_header_verifies() {
        let engine = engine();
        let parent = genesis();
        let child = sealed_child(&engine, &parent);
        assert_eq!(engine.validate_header(&child, &parent), Ok(()));
    }

    #[test]
    fn tampered_nonce_is_rejected() {
        let engine = engine();
        let parent = genesis();
        let mut child = sealed_child(&engine, &parent).unseal();
        child.nonce = child.nonce.wrapping_add(1);
        assert_matches!(
            engine.validate_header(&child.seal(), &parent),
            Err(ConsensusError::InvalidSeal { .. })
        );
    }

    #[test]
    fn wrong_difficulty_is_rejected() {
        let engine = engine();
        let parent = genesis();
        let mut child = sealed_child(&engine, &parent).unseal();
        child.difficulty = child.difficulty + U256::one();
        assert_matches!(
            engine.validate_header(&child.seal(), &parent),
            Err(ConsensusError::DifficultyMismatch { .. })
        );
    }

    #[derive(Debug, Default)]
    struct MapProvider(std::collections::HashMap<H256, Header>);

    impl HeaderProvider for MapProvider {
        fn header(&self, block_hash: &H256) -> cairn_interfaces::Result<Option<Header>> {
            Ok(self.0.get(block_hash).cloned())
        }

        fn header_by_number(&self, _num: u64) -> cairn_interfaces::Result<Option<Header>> {
            Ok(None)
        }

        fn total_difficulty(&self, _: &H256) -> cairn_interfaces::Result<Option<U256>> {
            Ok(None)
        }
    }

    #[test]
    fn ommer_must_branch_off_a_near_ancestor() {
        let engine = engine();
        let grandparent = genesis();
        let parent = sealed_child(&engine, &grandparent);
        let child = sealed_child(&engine, &parent);

        let mut provider = MapProvider::default();
        provider.0.insert(parent.hash(), parent.as_ref().clone());
        provider.0.insert(grandparent.hash(), grandparent.as_ref().clone());

        // A sibling of the parent is a valid ommer.
        let mut sibling = sealed_child(&engine, &grandparent).unseal();
        sibling.beneficiary = Address::repeat_byte(7);
        sibling.timestamp += 9;
        sibling.difficulty = calc_difficulty(sibling.timestamp, &grandparent, u64::MAX);
        let sibling = engine.seal(sibling).unwrap();
        assert_eq!(engine.validate_ommers(&child, &[sibling.clone()], &provider), Ok(()));

        // The canonical parent itself is not.
        assert_matches!(
            engine.validate_ommers(&child, &[parent.as_ref().clone()], &provider),
            Err(ConsensusError::OmmerIsAncestor { .. })
        );

        // An ommer with an unknown parent is not.
        let stray = Header { parent_hash: H256::repeat_byte(0x99), number: 1, ..Default::default() };
        assert_matches!(
            engine.validate_ommers(&child, &[stray], &provider),
            Err(ConsensusError::OmmerParentUnknown { .. })
        );

        // Twice the same ommer is not.
        assert_matches!(
            engine.validate_ommers(&child, &[sibling.clone(), sibling], &provider),
            Err(ConsensusError::DuplicateOmmer { .. })
        );
    }

    #[test]
    fn rewards_include_ommers() {
        let engine = engine();
        let header = genesis();
        let ommer = Header {
            number: 0,
            beneficiary: Address::repeat_byte(9),
            ..Default::default()
        };
        let mut with_ommer = header.clone().unseal();
        with_ommer.number = 1;
        let credits = engine.finalize(&with_ommer.seal(), &[ommer]).unwrap();
        assert_eq!(credits.len(), 2);
        assert_eq!(credits[0].1, calc::block_reward(U256::from(1_000u64), 1));
        assert_eq!(credits[1].0, Address::repeat_byte(9));
    }
}
