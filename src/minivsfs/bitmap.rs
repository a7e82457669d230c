use super::BITS_PER_BLOCK;
use bitvec::{order::Lsb0, slice::BitSlice, vec::BitVec};

/// One-block allocation bitmap. Bit `i` lives in bit `i % 8` of byte `i / 8`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: BitVec<u8, Lsb0>,
}

impl Default for Bitmap {
    fn default() -> Self {
        Self {
            bits: BitVec::repeat(false, BITS_PER_BLOCK),
        }
    }
}

impl Bitmap {
    pub fn from_block(block: &[u8]) -> Self {
        Self {
            bits: BitVec::from_slice(block),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.bits.as_raw_slice()
    }

    /// First-fit: lowest clear bit strictly below `limit`. Full bytes are
    /// skipped without looking at their bits.
    pub fn find_free(&self, limit: usize) -> Option<usize> {
        let limit = limit.min(self.bits.len());
        let bytes = (limit + 7) / 8;

        for (i, byte) in self.as_bytes().iter().take(bytes).enumerate() {
            if *byte == 0xFF {
                continue;
            }

            let start = i * 8;
            let end = (start + 8).min(limit);
            let window: &BitSlice<u8, Lsb0> = &self.bits[start..end];
            if let Some(offset) = window.first_zero() {
                return Some(start + offset);
            }
        }

        None
    }

    /// Callers only set bits they just found free.
    pub fn set(&mut self, index: usize) {
        self.bits.set(index, true);
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.bits.get(index).map_or(false, |bit| *bit)
    }

    pub fn count_set(&self, limit: usize) -> usize {
        self.bits[..limit.min(self.bits.len())].count_ones()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bitmap_with(set: &[usize]) -> Bitmap {
        let mut bitmap = Bitmap::default();
        for &i in set {
            bitmap.set(i);
        }
        bitmap
    }

    #[test]
    fn first_fit() {
        let bitmap = bitmap_with(&[0, 2, 4]);
        assert_eq!(bitmap.find_free(8), Some(1));
        assert_eq!(bitmap.as_bytes()[0], 0b0001_0101);
    }

    #[test]
    fn full_bitmap() {
        let mut bitmap = Bitmap::from_block(&[0xFF; 4096]);
        assert_eq!(bitmap.find_free(BITS_PER_BLOCK), None);

        bitmap = Bitmap::from_block(&[0xFF, 0xFF, 0x00]);
        assert_eq!(bitmap.find_free(16), None);
        assert_eq!(bitmap.find_free(17), Some(16));
    }

    #[test]
    fn limit_is_exclusive() {
        let bitmap = bitmap_with(&[0, 1, 2, 3, 4]);
        assert_eq!(bitmap.find_free(5), None);
        assert_eq!(bitmap.find_free(6), Some(5));
        assert_eq!(bitmap.find_free(0), None);
    }

    #[test]
    fn skips_full_bytes() {
        let mut block = vec![0u8; 4096];
        block[0] = 0xFF;
        block[1] = 0xFF;
        block[2] = 0b1111_0111;
        let bitmap = Bitmap::from_block(&block);
        assert_eq!(bitmap.find_free(BITS_PER_BLOCK), Some(19));
    }

    #[test]
    fn set_bit_never_found_again() {
        let mut bitmap = Bitmap::default();
        let mut seen = Vec::new();
        for _ in 0..20 {
            let i = bitmap.find_free(20).expect("free bit");
            assert!(!seen.contains(&i));
            bitmap.set(i);
            assert!(bitmap.is_set(i));
            seen.push(i);
        }
        assert_eq!(seen, (0..20).collect::<Vec<_>>());
        assert_eq!(bitmap.find_free(20), None);
        assert_eq!(bitmap.count_set(BITS_PER_BLOCK), 20);
    }

    #[test]
    fn block_round_trip() {
        let bitmap = bitmap_with(&[0, 9, 4095 * 8 + 7]);
        let copy = Bitmap::from_block(bitmap.as_bytes());
        assert_eq!(copy, bitmap);
        assert_eq!(copy.as_bytes().len(), 4096);
        assert_eq!(copy.as_bytes()[1], 0b0000_0010);
        assert_eq!(copy.as_bytes()[4095], 0b1000_0000);
    }
}
