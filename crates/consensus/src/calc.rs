use cairn_primitives::{BlockNumber, U256};

/// The reward for a block including `ommers` ommer references.
///
/// The sealing miner earns the base reward plus 1/32 of it per included
/// ommer.
pub fn block_reward(base_block_reward: U256, ommers: usize) -> U256 {
    base_block_reward + (base_block_reward >> 5) * U256::from(ommers)
}

/// The reward credited to an ommer's own beneficiary.
///
/// Scales down with the ommer's distance from the including block:
/// `(8 - distance) / 8` of the base reward.
pub fn ommer_reward(
    base_block_reward: U256,
    block_number: BlockNumber,
    ommer_block_number: BlockNumber,
) -> U256 {
    let distance = block_number.saturating_sub(ommer_block_number);
    (U256::from(8u64.saturating_sub(distance)) * base_block_reward) >> 3
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: u64 = 5_000_000;

    #[test]
    fn block_reward_scales_with_ommers() {
        let base = U256::from(BASE);
        assert_eq!(block_reward(base, 0), base);
        assert_eq!(block_reward(base, 1), base + (base >> 5));
        assert_eq!(block_reward(base, 2), base + (base >> 5) * U256::from(2u64));
    }

    #[test]
    fn ommer_reward_decays_with_depth() {
        let base = U256::from(BASE);
        let at_depth_1 = ommer_reward(base, 10, 9);
        let at_depth_7 = ommer_reward(base, 10, 3);
        assert_eq!(at_depth_1, (U256::from(7u64) * base) >> 3);
        assert_eq!(at_depth_7, (U256::from(1u64) * base) >> 3);
        assert!(at_depth_1 > at_depth_7);
    }
}
