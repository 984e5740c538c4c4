//! Keypoints and fixed-length binary descriptors.
//!
//! Every descriptor in the system is a 256-bit vector stored as 32 bytes; the
//! length is part of the type, so query and reference sets can never disagree
//! on it.

use serde::{Deserialize, Serialize};
use std::fmt;

pub mod brief;
pub mod extract;
pub mod fast;

pub use extract::{DescriptorExtractor, ExtractorConfig};

/// Number of bytes in a descriptor.
pub const DESCRIPTOR_BYTES: usize = 32;

/// Number of bits in a descriptor.
pub const DESCRIPTOR_BITS: usize = DESCRIPTOR_BYTES * 8;

/// 256-bit binary descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    /// Number of differing bits between two descriptors.
    #[inline]
    pub fn hamming(&self, other: &Descriptor) -> u32 {
        self.0
            .chunks_exact(8)
            .zip(other.0.chunks_exact(8))
            .map(|(a, b)| {
                let mut wa = [0u8; 8];
                let mut wb = [0u8; 8];
                wa.copy_from_slice(a);
                wb.copy_from_slice(b);
                (u64::from_le_bytes(wa) ^ u64::from_le_bytes(wb)).count_ones()
            })
            .sum()
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DESCRIPTOR_BYTES] {
        &self.0
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Descriptor(")?;
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        f.write_str(")")
    }
}

/// Immutable ordered set of descriptors extracted from one image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorSet {
    descriptors: Vec<Descriptor>,
}

impl DescriptorSet {
    /// Wraps extracted descriptors.
    pub fn new(descriptors: Vec<Descriptor>) -> Self {
        Self { descriptors }
    }

    /// Returns the descriptors in extraction order.
    pub fn as_slice(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Number of descriptors.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Returns true when no descriptor was extracted.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Consumes the set and returns the descriptors.
    pub fn into_vec(self) -> Vec<Descriptor> {
        self.descriptors
    }
}

impl From<Vec<Descriptor>> for DescriptorSet {
    fn from(descriptors: Vec<Descriptor>) -> Self {
        Self::new(descriptors)
    }
}

/// Detected keypoint in base-image coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Keypoint {
    /// X coordinate (column) scaled back to level 0.
    pub x: f32,
    /// Y coordinate (row) scaled back to level 0.
    pub y: f32,
    /// Pyramid level the keypoint was detected on.
    pub level: usize,
    /// Orientation in radians.
    pub angle: f32,
    /// FAST corner score.
    pub score: u32,
}

/// Keypoint together with its descriptor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    pub keypoint: Keypoint,
    pub descriptor: Descriptor,
}

#[cfg(test)]
mod tests {
    use super::{Descriptor, DESCRIPTOR_BITS};

    #[test]
    fn hamming_counts_differing_bits() {
        let zero = Descriptor([0u8; 32]);
        let ones = Descriptor([0xFF; 32]);
        assert_eq!(zero.hamming(&zero), 0);
        assert_eq!(zero.hamming(&ones), DESCRIPTOR_BITS as u32);

        let mut bytes = [0u8; 32];
        bytes[0] = 0b1010_0000;
        bytes[31] = 0b0000_0001;
        assert_eq!(zero.hamming(&Descriptor(bytes)), 3);
        assert_eq!(Descriptor(bytes).hamming(&zero), 3);
    }

    #[test]
    fn debug_prints_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let text = format!("{:?}", Descriptor(bytes));
        assert!(text.starts_with("Descriptor(ab00"));
    }
}
