//! 2048-bit log bloom filter.

use crate::{keccak256, Log};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const BLOOM_BYTES: usize = 256;

/// The 2048-bit bloom filter summarizing a block's log addresses and topics.
///
/// Each inserted item sets three bits derived from the first three 16-bit
/// words of its keccak256 digest.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Bloom(pub [u8; BLOOM_BYTES]);

impl Bloom {
    /// Insert raw bytes into the filter.
    pub fn accrue_raw(&mut self, input: &[u8]) {
        let digest = keccak256(input);
        let bytes = digest.as_bytes();
        for i in 0..3 {
            let bit = (((bytes[2 * i] as usize) << 8) | bytes[2 * i + 1] as usize) & 0x7ff;
            self.0[BLOOM_BYTES - 1 - bit / 8] |= 1 << (bit % 8);
        }
    }

    /// Insert a log's address and topics.
    pub fn accrue_log(&mut self, log: &Log) {
        self.accrue_raw(log.address.as_bytes());
        for topic in &log.topics {
            self.accrue_raw(topic.as_bytes());
        }
    }

    /// Builds the filter over a sequence of logs.
    pub fn from_logs<'a>(logs: impl Iterator<Item = &'a Log>) -> Self {
        let mut bloom = Bloom::default();
        for log in logs {
            bloom.accrue_log(log);
        }
        bloom
    }

    /// Whether all bits for `input` are set.
    pub fn contains_input(&self, input: &[u8]) -> bool {
        let mut probe = Bloom::default();
        probe.accrue_raw(input);
        self.contains_bloom(&probe)
    }

    /// Whether all bits of `other` are set in `self`.
    pub fn contains_bloom(&self, other: &Bloom) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & b == *b)
    }

    /// True if no bits are set.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|byte| *byte == 0)
    }
}

impl Default for Bloom {
    fn default() -> Self {
        Bloom([0; BLOOM_BYTES])
    }
}

impl fmt::Debug for Bloom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            f.write_str("Bloom(empty)")
        } else {
            write!(f, "Bloom(0x{:02x}{:02x}..)", self.0[0], self.0[1])
        }
    }
}

impl Serialize for Bloom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for Bloom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BloomVisitor;

        impl<'de> de::Visitor<'de> for BloomVisitor {
            type Value = Bloom;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{BLOOM_BYTES} bytes")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                if v.len() != BLOOM_BYTES {
                    return Err(E::invalid_length(v.len(), &self))
                }
                let mut bloom = Bloom::default();
                bloom.0.copy_from_slice(v);
                Ok(bloom)
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let mut bloom = Bloom::default();
                for (i, slot) in bloom.0.iter_mut().enumerate() {
                    *slot = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(bloom)
            }
        }

        deserializer.deserialize_bytes(BloomVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Address;

    #[test]
    fn accrued_input_is_contained() {
        let mut bloom = Bloom::default();
        assert!(bloom.is_empty());

        let addr = Address::repeat_byte(0x42);
        bloom.accrue_raw(addr.as_bytes());
        assert!(bloom.contains_input(addr.as_bytes()));
        assert!(!bloom.contains_input(Address::repeat_byte(0x43).as_bytes()));
    }

    #[test]
    fn log_bloom_covers_address_and_topics() {
        let log = Log {
            address: Address::repeat_byte(1),
            topics: vec![crate::H256::repeat_byte(2)],
            data: Default::default(),
        };
        let bloom = Bloom::from_logs([log.clone()].iter());
        assert!(bloom.contains_input(log.address.as_bytes()));
        assert!(bloom.contains_input(log.topics[0].as_bytes()));
    }
}
