use std::{fmt::Display, hash::Hash};

use cranelift_bitset::ScalarBitSet;

use crate::literal::RustLiteral;

/// Membership set over all 256 byte values.
#[derive(Clone, Copy)]
pub struct ByteSet {
    low: ScalarBitSet<u128>,
    high: ScalarBitSet<u128>,
}

impl ByteSet {
    pub fn new() -> ByteSet {
        ByteSet {
            low: ScalarBitSet::new(),
            high: ScalarBitSet::new(),
        }
    }

    pub fn full() -> ByteSet {
        ByteSet {
            low: ScalarBitSet(u128::MAX),
            high: ScalarBitSet(u128::MAX),
        }
    }

    pub fn from_byte(byte: u8) -> ByteSet {
        let mut set = ByteSet::new();
        set.insert(byte);
        set
    }

    pub fn from_ranges(ranges: &[(u8, u8)]) -> ByteSet {
        let mut set = ByteSet::new();
        for &(start, end) in ranges {
            set.insert_range(start, end);
        }
        set
    }

    pub fn insert(&mut self, byte: u8) {
        match byte {
            0..=127 => self.low.insert(byte),
            128..=255 => self.high.insert(byte - 128),
        };
    }

    /// Inserts the inclusive range `start..=end`, an inverted range is empty.
    pub fn insert_range(&mut self, start: u8, end: u8) {
        if start <= end {
            for byte in start..=end {
                self.insert(byte);
            }
        }
    }

    pub fn contains(&self, byte: u8) -> bool {
        match byte {
            0..=127 => self.low.contains(byte),
            128..=255 => self.high.contains(byte - 128),
        }
    }

    pub fn union(&mut self, other: &ByteSet) {
        self.low = ScalarBitSet(self.low.0 | other.low.0);
        self.high = ScalarBitSet(self.high.0 | other.high.0);
    }

    pub fn is_empty(&self) -> bool {
        self.low.0 == 0 && self.high.0 == 0
    }

    pub fn is_full(&self) -> bool {
        self.low.0 == u128::MAX && self.high.0 == u128::MAX
    }

    pub fn len(&self) -> usize {
        (self.low.0.count_ones() + self.high.0.count_ones()) as usize
    }

    pub fn iter(&self) -> impl Iterator<Item = u8> + '_ {
        (0..=255u8).filter(|&b| self.contains(b))
    }

    /// The only member of a set with exactly one member.
    pub fn single(&self) -> Option<u8> {
        match self.len() {
            1 => self.iter().next(),
            _ => None,
        }
    }

    /// Merges runs of adjacent members into inclusive ranges.
    pub fn ranges(&self) -> ByteRanges {
        let mut ranges: Vec<(u8, u8)> = Vec::new();
        for byte in self.iter() {
            match ranges.last_mut() {
                Some((_, end)) if *end as u16 + 1 == byte as u16 => *end = byte,
                _ => ranges.push((byte, byte)),
            }
        }
        ByteRanges(ranges)
    }
}

impl Default for ByteSet {
    fn default() -> Self {
        ByteSet::new()
    }
}

impl PartialEq for ByteSet {
    fn eq(&self, other: &Self) -> bool {
        self.low.0 == other.low.0 && self.high.0 == other.high.0
    }
}

impl Eq for ByteSet {}

impl Hash for ByteSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.low.0.hash(state);
        self.high.0.hash(state);
    }
}

impl std::fmt::Debug for ByteSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteSet({})", self.ranges())
    }
}

impl FromIterator<u8> for ByteSet {
    fn from_iter<T: IntoIterator<Item = u8>>(iter: T) -> Self {
        let mut set = ByteSet::new();
        for byte in iter {
            set.insert(byte);
        }
        set
    }
}

/// Sorted, non-adjacent inclusive byte ranges.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct ByteRanges(Vec<(u8, u8)>);

impl ByteRanges {
    pub fn as_slice(&self) -> &[(u8, u8)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, byte: u8) -> bool {
        self.0
            .iter()
            .any(|&(start, end)| start <= byte && byte <= end)
    }

    /// Renders the ranges as a Rust pattern, `b'0'..=b'9' | b'_'`.
    pub fn pattern(&self) -> RangesPattern<'_> {
        RangesPattern(self)
    }
}

impl Display for ByteRanges {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[")?;
        for &(start, end) in &self.0 {
            write!(f, "{}", std::ascii::escape_default(start))?;
            if start != end {
                write!(f, "-{}", std::ascii::escape_default(end))?;
            }
        }
        f.write_str("]")
    }
}

pub struct RangesPattern<'a>(&'a ByteRanges);

impl Display for RangesPattern<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, &(start, end)) in self.0 .0.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            match start == end {
                true => write!(f, "{}", RustLiteral::Byte(start))?,
                false => write!(
                    f,
                    "{}..={}",
                    RustLiteral::Byte(start),
                    RustLiteral::Byte(end)
                )?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranges_compaction() {
        let set: ByteSet = b"0123456789_abc".iter().copied().collect();
        assert_eq!(
            set.ranges().as_slice(),
            &[(b'0', b'9'), (b'_', b'_'), (b'a', b'c')]
        );
        assert_eq!(
            set.ranges().pattern().to_string(),
            "b'0'..=b'9' | b'_' | b'a'..=b'c'"
        );
    }

    #[test]
    fn test_edges() {
        let mut set = ByteSet::new();
        set.insert(127);
        set.insert(128);
        set.insert(255);
        assert_eq!(set.ranges().as_slice(), &[(127, 128), (255, 255)]);
        assert_eq!(set.len(), 3);

        assert_eq!(ByteSet::full().ranges().as_slice(), &[(0, 255)]);
        assert!(ByteSet::new().ranges().is_empty());
    }

    #[test]
    fn test_single_and_union() {
        let mut set = ByteSet::from_byte(b'a');
        assert_eq!(set.single(), Some(b'a'));
        set.union(&ByteSet::from_ranges(&[(b'x', b'z')]));
        assert_eq!(set.single(), None);
        assert!(set.contains(b'y'));
        assert!(!set.contains(b'b'));
        assert_eq!(set, ByteSet::from_ranges(&[(b'a', b'a'), (b'x', b'z')]));
    }
}
