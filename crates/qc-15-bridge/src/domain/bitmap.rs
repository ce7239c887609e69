//! Participation bitmap over validator-set indices.
//!
//! Bit `i` lives in byte `i / 8` at position `i % 8` (least significant
//! bit first), matching the layout the on-chain verifier expects.

use bitvec::prelude::*;
use serde::{Deserialize, Serialize};
use serde_with::{base64::Base64, serde_as};

/// Growable set of validator indices.
#[serde_as]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bitmap {
    #[serde_as(as = "Base64")]
    bytes: Vec<u8>,
}

impl Bitmap {
    /// Empty bitmap.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Mark index `idx`, growing the backing storage as needed.
    pub fn set(&mut self, idx: usize) {
        let needed = idx / 8 + 1;
        if self.bytes.len() < needed {
            self.bytes.resize(needed, 0);
        }
        self.bytes.view_bits_mut::<Lsb0>().set(idx, true);
    }

    /// Whether index `idx` is marked.
    pub fn is_set(&self, idx: usize) -> bool {
        self.bytes
            .view_bits::<Lsb0>()
            .get(idx)
            .map(|bit| *bit)
            .unwrap_or(false)
    }

    /// Number of marked indices.
    pub fn count(&self) -> usize {
        self.bytes.view_bits::<Lsb0>().count_ones()
    }

    /// Marked indices in ascending order.
    pub fn indices(&self) -> Vec<usize> {
        self.bytes.view_bits::<Lsb0>().iter_ones().collect()
    }

    /// Backing bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_uses_lsb_first_layout() {
        let mut bitmap = Bitmap::new();
        bitmap.set(0);
        bitmap.set(9);
        assert_eq!(bitmap.as_bytes(), &[0b0000_0001, 0b0000_0010]);
        assert!(bitmap.is_set(9));
        assert!(!bitmap.is_set(8));
        assert!(!bitmap.is_set(100));
    }

    #[test]
    fn test_indices_and_count() {
        let mut bitmap = Bitmap::new();
        for idx in [4, 1, 17] {
            bitmap.set(idx);
        }
        bitmap.set(4);
        assert_eq!(bitmap.count(), 3);
        assert_eq!(bitmap.indices(), vec![1, 4, 17]);
    }
}
