use std::ops::Range;

#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct SymbolSavepoint(u32);

#[derive(Clone, PartialEq, Eq, Debug)]
struct SymbolEntry {
    table: u32,
    span: Range<u32>,
}

/// All symbol tables of a parse, kept as one stack so that a savepoint covers every table.
///
/// Entries only store spans into the input, the text is compared at lookup.
#[derive(Default)]
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    pub fn new() -> SymbolTable {
        SymbolTable::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn savepoint(&self) -> SymbolSavepoint {
        SymbolSavepoint(self.entries.len().try_into().unwrap_or(u32::MAX))
    }

    pub fn rollback(&mut self, savepoint: SymbolSavepoint) {
        debug_assert!(
            savepoint.0 as usize <= self.entries.len(),
            "Missing symbols to roll back to. Mismatched savepoint - rollback pair?"
        );
        self.entries.truncate(savepoint.0 as usize);
    }

    pub fn define(&mut self, table: u32, span: Range<u32>) {
        self.entries.push(SymbolEntry { table, span });
    }

    /// Spans defined in `table`, newest first.
    pub fn spans(&self, table: u32) -> impl Iterator<Item = Range<u32>> + '_ {
        self.entries
            .iter()
            .rev()
            .filter(move |entry| entry.table == table)
            .map(|entry| entry.span.clone())
    }

    /// Length of the newest symbol of `table` which occurs in `input` at `position`.
    ///
    /// With `last_only` only the most recently defined symbol is considered.
    pub fn check(&self, table: u32, last_only: bool, input: &[u8], position: u32) -> Option<u32> {
        let rest = input.get(position as usize..)?;
        let limit = if last_only { 1 } else { usize::MAX };

        self.spans(table).take(limit).find_map(|span| {
            let symbol = input.get(span.start as usize..span.end as usize)?;
            rest.starts_with(symbol).then_some(span.end - span.start)
        })
    }
}
