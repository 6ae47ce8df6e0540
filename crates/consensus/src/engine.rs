use crate::{PoaEngine, PowEngine};
use cairn_interfaces::{
    consensus::{Consensus, ConsensusError},
    provider::HeaderProvider,
};
use cairn_primitives::{Address, ChainSpec, EngineKind, Header, SealedHeader, U256};

/// An engine that accepts any seal. Dev chains and tests only.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct FakeEngine;

impl Consensus for FakeEngine {
    fn validate_header_standalone(&self, _header: &SealedHeader) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn validate_header(
        &self,
        _header: &SealedHeader,
        _parent: &SealedHeader,
    ) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn validate_ommers(
        &self,
        _header: &SealedHeader,
        _ommers: &[Header],
        _provider: &dyn HeaderProvider,
    ) -> Result<(), ConsensusError> {
        Ok(())
    }

    fn finalize(
        &self,
        _header: &SealedHeader,
        _ommers: &[Header],
    ) -> Result<Vec<(Address, U256)>, ConsensusError> {
        Ok(Vec::new())
    }

    fn author(&self, header: &SealedHeader) -> Result<Address, ConsensusError> {
        Ok(header.beneficiary)
    }

    fn seal(&self, header: Header) -> Result<Header, ConsensusError> {
        Ok(header)
    }
}

/// The closed set of consensus engines a chain can run.
///
/// Dispatch is a tagged variant rather than trait objects so the full
/// capability set stays visible in one place and matching on the engine kind
/// stays possible for callers that need it.
#[derive(Debug)]
pub enum Engine {
    /// Proof of work.
    ProofOfWork(PowEngine),
    /// Proof of authority.
    ProofOfAuthority(PoaEngine),
    /// Accepts everything.
    Fake(FakeEngine),
}

impl Engine {
    /// Builds the engine selected by the chain spec.
    pub fn from_spec(spec: &ChainSpec) -> Self {
        match &spec.engine {
            EngineKind::ProofOfWork { bomb_delay } => {
                Engine::ProofOfWork(PowEngine::new(*bomb_delay, spec.base_block_reward))
            }
            EngineKind::ProofOfAuthority { epoch, period, signers } => {
                Engine::ProofOfAuthority(PoaEngine::new(*epoch, *period, signers.clone()))
            }
            EngineKind::Fake => Engine::Fake(FakeEngine),
        }
    }

    fn inner(&self) -> &dyn Consensus {
        match self {
            Engine::ProofOfWork(engine) => engine,
            Engine::ProofOfAuthority(engine) => engine,
            Engine::Fake(engine) => engine,
        }
    }
}

impl Consensus for Engine {
    fn validate_header_standalone(&self, header: &SealedHeader) -> Result<(), ConsensusError> {
        self.inner().validate_header_standalone(header)
    }

    fn validate_header(
        &self,
        header: &SealedHeader,
        parent: &SealedHeader,
    ) -> Result<(), ConsensusError> {
        self.inner().validate_header(header, parent)
    }

    fn validate_ommers(
        &self,
        header: &SealedHeader,
        ommers: &[Header],
        provider: &dyn HeaderProvider,
    ) -> Result<(), ConsensusError> {
        self.inner().validate_ommers(header, ommers, provider)
    }

    fn finalize(
        &self,
        header: &SealedHeader,
        ommers: &[Header],
    ) -> Result<Vec<(Address, U256)>, ConsensusError> {
        self.inner().finalize(header, ommers)
    }

    fn author(&self, header: &SealedHeader) -> Result<Address, ConsensusError> {
        self.inner().author(header)
    }

    fn seal(&self, header: Header) -> Result<Header, ConsensusError> {
        self.inner().seal(header)
    }
}
