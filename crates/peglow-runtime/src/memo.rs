use std::collections::HashMap;

use crate::ast::Link;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MemoEntry {
    pub failed: bool,
    pub consumed: u32,
    /// The single link the production appended to the tree log, if any.
    pub link: Option<Link>,
}

#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct MemoStats {
    pub hits: u32,
    pub misses: u32,
}

/// Results of memoized productions, one position map per memo slot.
#[derive(Default)]
pub struct MemoTable {
    slots: Vec<HashMap<u32, MemoEntry>>,
    stats: MemoStats,
}

impl MemoTable {
    pub fn new(slot_count: usize) -> MemoTable {
        MemoTable {
            slots: (0..slot_count).map(|_| HashMap::new()).collect(),
            stats: MemoStats::default(),
        }
    }

    pub fn get(&mut self, slot: u32, position: u32) -> Option<MemoEntry> {
        let entry = self
            .slots
            .get(slot as usize)
            .and_then(|slot| slot.get(&position))
            .copied();

        match entry {
            Some(_) => self.stats.hits += 1,
            None => self.stats.misses += 1,
        }
        entry
    }

    pub fn insert(&mut self, slot: u32, position: u32, entry: MemoEntry) {
        let index = slot as usize;
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, HashMap::new);
        }

        let previous = self.slots[index].insert(position, entry);
        debug_assert!(
            previous.is_none() || previous == Some(entry),
            "Memo slot {slot} at {position} written twice with different results"
        );
    }

    pub fn stats(&self) -> MemoStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memo_table() {
        let mut memo = MemoTable::new(1);
        assert_eq!(memo.get(0, 4), None);

        let entry = MemoEntry {
            failed: false,
            consumed: 3,
            link: None,
        };
        memo.insert(0, 4, entry);
        memo.insert(3, 0, entry);

        assert_eq!(memo.get(0, 4), Some(entry));
        assert_eq!(memo.get(3, 0), Some(entry));
        assert_eq!(memo.get(0, 5), None);
        assert_eq!(memo.stats(), MemoStats { hits: 2, misses: 2 });
    }
}
