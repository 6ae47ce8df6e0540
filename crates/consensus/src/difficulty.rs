use cairn_primitives::{Header, U256};

/// Bound divisor of the difficulty, expressed as a right shift (2048).
const DIFF_BOUND_SHIFT: usize = 11;

/// Block count per difficulty-bomb exponentiation period.
const EXP_DIFF_PERIOD: u64 = 100_000;

/// The minimum the difficulty may ever be.
const MINIMUM_DIFFICULTY: u64 = 131_072;

/// Target block spacing divisor in the adjustment term.
const ADJUSTMENT_DURATION: u64 = 9;

/// Deterministic difficulty retarget.
///
/// The difficulty a child block sealed at `timestamp` must declare, given its
/// parent. Follows the EIP-100 shape: the parent difficulty is nudged by
/// `parent_diff >> 11` per step of
/// `max((1|2) - (timestamp - parent.timestamp) / 9, -99)`, where the `2`
/// applies when the parent carried ommers, clamped at the minimum difficulty,
/// plus the exponential bomb term delayed by `bomb_delay` blocks.
pub fn calc_difficulty(timestamp: u64, parent: &Header, bomb_delay: u64) -> U256 {
    let time_delta = timestamp.saturating_sub(parent.timestamp) / ADJUSTMENT_DURATION;
    let ommer_adj: u64 = if parent.ommers_hash_is_empty() { 1 } else { 2 };

    let negative = time_delta >= ommer_adj;
    let mut steps = if negative { time_delta - ommer_adj } else { ommer_adj - time_delta };
    if steps > 99 {
        steps = 99;
    }

    let adjustment = (parent.difficulty >> DIFF_BOUND_SHIFT) * U256::from(steps);
    let mut difficulty = if negative {
        parent.difficulty.saturating_sub(adjustment)
    } else {
        parent.difficulty.saturating_add(adjustment)
    };

    let minimum = U256::from(MINIMUM_DIFFICULTY);
    if difficulty < minimum {
        difficulty = minimum;
    }

    // The bomb counts from a block number shifted back by the delay, so a
    // fork can push the exponential term out without touching history.
    let fake_block_number = parent.number.saturating_sub(bomb_delay.saturating_sub(1));
    if fake_block_number >= 2 * EXP_DIFF_PERIOD {
        let exponent = (fake_block_number / EXP_DIFF_PERIOD - 2) as usize;
        difficulty = difficulty.saturating_add(U256::one() << exponent);
    }

    difficulty
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parent_with(difficulty: u64, timestamp: u64) -> Header {
        Header {
            number: 1000,
            difficulty: U256::from(difficulty),
            timestamp,
            ommers_hash: cairn_primitives::constants::EMPTY_OMMER_ROOT,
            ..Default::default()
        }
    }

    #[test]
    fn fast_block_raises_difficulty() {
        let parent = parent_with(10_000_000, 100);
        let fast = calc_difficulty(101, &parent, u64::MAX);
        assert!(fast > parent.difficulty);
    }

    #[test]
    fn slow_block_lowers_difficulty() {
        let parent = parent_with(10_000_000, 100);
        let slow = calc_difficulty(100 + 60, &parent, u64::MAX);
        assert!(slow < parent.difficulty);
    }

    #[test]
    fn never_below_minimum() {
        let parent = parent_with(MINIMUM_DIFFICULTY, 100);
        let diff = calc_difficulty(100 + 10_000, &parent, u64::MAX);
        assert_eq!(diff, U256::from(MINIMUM_DIFFICULTY));
    }

    #[test]
    fn adjustment_step_is_capped() {
        let parent = parent_with(10_000_000, 100);
        // Hours late and days late adjust by the same capped factor.
        let late = calc_difficulty(100 + 9 * 200, &parent, u64::MAX);
        let very_late = calc_difficulty(100 + 9 * 100_000, &parent, u64::MAX);
        assert_eq!(late, very_late);
    }

    #[test]
    fn bomb_kicks_in_past_the_delay() {
        let mut parent = parent_with(10_000_000, 100);
        parent.number = 300_000;
        let without = calc_difficulty(110, &parent, 10_000_000);
        let with = calc_difficulty(110, &parent, 1);
        assert!(with > without);
    }

    #[test]
    fn parent_ommers_shift_the_target() {
        let clean = parent_with(10_000_000, 100);
        let mut with_ommers = clean.clone();
        with_ommers.ommers_hash = cairn_primitives::H256::repeat_byte(1);

        // At a 10s delta the ommer-free parent sits exactly on target while
        // the ommer-carrying parent still adjusts upward.
        assert_eq!(calc_difficulty(110, &clean, u64::MAX), clean.difficulty);
        assert!(calc_difficulty(110, &with_ommers, u64::MAX) > clean.difficulty);
        // One adjustment period later the ommer-free parent adjusts downward.
        assert!(calc_difficulty(119, &clean, u64::MAX) < clean.difficulty);
    }
}
