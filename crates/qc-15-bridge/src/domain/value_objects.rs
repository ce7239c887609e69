//! # Domain Value Objects
//!
//! Immutable value types shared across the bridge: addresses, hashes,
//! chain roles and traffic directions.

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use std::str::FromStr;

use super::errors::DecodeError;

/// 32-byte Keccak-256 digest.
pub type Hash = [u8; 32];

/// All-zero hash.
pub const ZERO_HASH: Hash = [0u8; 32];

/// Keccak-256 over a single byte slice.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Keccak-256 over several byte slices, hashed as one concatenated input.
pub fn keccak256_concat(parts: &[&[u8]]) -> Hash {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// 20-byte account or contract address.
///
/// Renders as lowercase `0x`-prefixed hex, which is also the string form
/// carried in gossip votes.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Address derived from arbitrary key material (last 20 bytes of its Keccak hash).
    pub fn from_key_material(bytes: &[u8]) -> Self {
        let digest = keccak256(bytes);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest[12..]);
        Address(out)
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(stripped).map_err(|_| DecodeError::InvalidAddress(s.to_string()))?;
        let raw: [u8; 20] = bytes
            .try_into()
            .map_err(|_| DecodeError::InvalidAddress(s.to_string()))?;
        Ok(Address(raw))
    }
}

impl From<[u8; 20]> for Address {
    fn from(raw: [u8; 20]) -> Self {
        Address(raw)
    }
}

/// Role of a chain relative to this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainType {
    /// Chain this node produces blocks for.
    Internal,
    /// Chain this node only observes.
    External,
}

/// Traffic direction of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Messages emitted on the external chain, executed on the internal chain.
    ExternalToInternal,
    /// Messages emitted on the internal chain, executed on the external chain.
    InternalToExternal,
}

impl Direction {
    /// Both directions, in the order batches are offered for submission.
    pub const ALL: [Direction; 2] = [Direction::ExternalToInternal, Direction::InternalToExternal];

    /// Chain on which the messages of this direction originate.
    pub fn source(&self) -> ChainType {
        match self {
            Direction::ExternalToInternal => ChainType::External,
            Direction::InternalToExternal => ChainType::Internal,
        }
    }

    /// Chain on which the batches of this direction are executed.
    pub fn destination(&self) -> ChainType {
        match self {
            Direction::ExternalToInternal => ChainType::Internal,
            Direction::InternalToExternal => ChainType::External,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ExternalToInternal => write!(f, "external->internal"),
            Direction::InternalToExternal => write!(f, "internal->external"),
        }
    }
}

/// The pair of chain IDs one bridge instance connects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainPair {
    /// ID of the chain this node produces blocks for.
    pub internal: u64,
    /// ID of the observed chain.
    pub external: u64,
}

impl ChainPair {
    /// Chain ID for a role.
    pub fn id(&self, chain: ChainType) -> u64 {
        match chain {
            ChainType::Internal => self.internal,
            ChainType::External => self.external,
        }
    }

    /// `(source, destination)` chain IDs for a direction.
    pub fn route(&self, direction: Direction) -> (u64, u64) {
        (self.id(direction.source()), self.id(direction.destination()))
    }

    /// Direction matching a `(source, destination)` pair, if it belongs to this bridge.
    pub fn direction_of(&self, source: u64, destination: u64) -> Option<Direction> {
        if source == self.external && destination == self.internal {
            Some(Direction::ExternalToInternal)
        } else if source == self.internal && destination == self.external {
            Some(Direction::InternalToExternal)
        } else {
            None
        }
    }

    /// Whether a chain ID is one of the two bridged chains.
    pub fn contains(&self, chain_id: u64) -> bool {
        chain_id == self.internal || chain_id == self.external
    }
}

/// Minimal view of a finalized block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height.
    pub number: u64,
    /// Block hash.
    pub hash: Hash,
}

impl BlockHeader {
    /// Header at `number` with a zero hash.
    pub fn at(number: u64) -> Self {
        Self {
            number,
            hash: ZERO_HASH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_round_trips_through_string() {
        let address = Address([0xab; 20]);
        let text = address.to_string();
        assert!(text.starts_with("0x"));
        assert_eq!(text.parse::<Address>().unwrap(), address);
    }

    #[test]
    fn test_address_rejects_wrong_length() {
        assert!("0x1234".parse::<Address>().is_err());
        assert!("not-hex".parse::<Address>().is_err());
    }

    #[test]
    fn test_keccak_known_vector() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_chain_pair_direction_lookup() {
        let pair = ChainPair {
            internal: 1,
            external: 2,
        };
        assert_eq!(pair.direction_of(2, 1), Some(Direction::ExternalToInternal));
        assert_eq!(pair.direction_of(1, 2), Some(Direction::InternalToExternal));
        assert_eq!(pair.direction_of(1, 3), None);
        assert_eq!(pair.route(Direction::InternalToExternal), (1, 2));
    }
}
