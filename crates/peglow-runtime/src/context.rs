use crate::{
    ast::{AstLog, AstMark, Link, LogEntry, NodeId, Tree},
    memo::{MemoEntry, MemoStats, MemoTable},
    symbols::{SymbolSavepoint, SymbolTable},
    Symbol,
};

/// Mutable state of one parse.
///
/// Terminal matchers only advance the cursor when they succeed, a failed match leaves
/// it where it was.
pub struct Context<'a> {
    input: &'a [u8],
    position: u32,
    max_position: u32,

    ast: AstLog,
    memo: MemoTable,
    symbols: SymbolTable,
    flags: Vec<bool>,
}

pub struct Outcome {
    pub success: bool,
    /// Cursor position when the entry production returned.
    pub consumed: u32,
    /// Farthest position the cursor was ever at, useful for error messages.
    pub max_position: u32,
    pub tree: Option<Tree>,
    pub memo: MemoStats,
}

impl<'a> Context<'a> {
    pub fn new(input: &'a [u8], flag_count: usize, memo_count: usize) -> Context<'a> {
        assert!(
            input.len() < u32::MAX as usize,
            "Input larger than 4GiB is not supported"
        );

        Context {
            input,
            position: 0,
            max_position: 0,
            ast: AstLog::new(),
            memo: MemoTable::new(memo_count),
            symbols: SymbolTable::new(),
            flags: vec![false; flag_count],
        }
    }

    fn update_max_position(&mut self) {
        self.max_position = std::cmp::max(self.max_position, self.position);
    }

    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn set_position(&mut self, position: u32) {
        debug_assert!(position as usize <= self.input.len());
        self.update_max_position();
        self.position = position;
    }

    pub fn max_position(&self) -> u32 {
        std::cmp::max(self.max_position, self.position)
    }

    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.position as usize..]
    }

    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.position as usize).copied()
    }

    pub fn is_eof(&self) -> bool {
        self.position as usize == self.input.len()
    }

    fn advance(&mut self, count: u32) {
        debug_assert!(self.position as usize + count as usize <= self.input.len());
        self.position += count;
    }

    pub fn byte(&mut self, byte: u8) -> bool {
        self.byte_if(|b| b == byte)
    }

    pub fn byte_if(&mut self, predicate: impl FnOnce(u8) -> bool) -> bool {
        match self.peek() {
            Some(b) if predicate(b) => {
                self.advance(1);
                true
            }
            _ => false,
        }
    }

    pub fn any_byte(&mut self) -> bool {
        self.byte_if(|_| true)
    }

    pub fn bytes(&mut self, literal: &[u8]) -> bool {
        if self.remaining().starts_with(literal) {
            self.advance(literal.len() as u32);
            true
        } else {
            false
        }
    }

    pub fn lookahead_if(&self, predicate: impl FnOnce(u8) -> bool) -> bool {
        self.peek().is_some_and(predicate)
    }

    pub fn lookahead_bytes(&self, literal: &[u8]) -> bool {
        self.remaining().starts_with(literal)
    }

    pub fn ast_mark(&self) -> AstMark {
        self.ast.mark()
    }

    pub fn ast_abort(&mut self, mark: AstMark) {
        self.ast.abort(mark);
    }

    pub fn ast_new(&mut self, left_join: bool) {
        self.ast.push(LogEntry::New {
            position: self.position,
            left_join,
        });
    }

    pub fn ast_capture(&mut self) {
        self.ast.push(LogEntry::Capture {
            position: self.position,
        });
    }

    pub fn ast_tag(&mut self, tag: Symbol) {
        self.ast.push(LogEntry::Tag(tag));
    }

    pub fn ast_replace(&mut self, value: Symbol) {
        self.ast.push(LogEntry::Replace(value));
    }

    pub fn ast_link(&mut self, label: Option<Symbol>, node: NodeId) {
        self.ast.push(LogEntry::Link(Link { label, node }));
    }

    /// Commits everything since `mark` and links the resulting node, if there is one.
    pub fn ast_commit_link(&mut self, mark: AstMark, label: Option<Symbol>) {
        if let Some(node) = self.ast.commit(mark) {
            self.ast_link(label, node);
        }
    }

    pub fn ast_log(&self) -> &AstLog {
        &self.ast
    }

    pub fn memo_get(&mut self, slot: u32) -> Option<MemoEntry> {
        self.memo.get(slot, self.position)
    }

    /// Applies a memoized result as if the production had just run.
    pub fn memo_replay(&mut self, entry: MemoEntry) -> bool {
        if entry.failed {
            return false;
        }
        self.advance(entry.consumed);
        if let Some(link) = entry.link {
            self.ast.push(LogEntry::Link(link));
        }
        true
    }

    /// Records a successful match which started at `start`. When `mark` is given, the
    /// single link appended to the tree log since then is stored along with it.
    pub fn memo_success(&mut self, slot: u32, start: u32, mark: Option<AstMark>) {
        let entry = MemoEntry {
            failed: false,
            consumed: self.position - start,
            link: mark.and_then(|mark| self.ast.single_link(mark)),
        };
        self.memo.insert(slot, start, entry);
    }

    pub fn memo_failure(&mut self, slot: u32, start: u32) {
        let entry = MemoEntry {
            failed: true,
            consumed: 0,
            link: None,
        };
        self.memo.insert(slot, start, entry);
    }

    pub fn symbol_savepoint(&self) -> SymbolSavepoint {
        self.symbols.savepoint()
    }

    pub fn symbol_rollback(&mut self, savepoint: SymbolSavepoint) {
        self.symbols.rollback(savepoint);
    }

    /// Defines the input between `start` and the cursor as a symbol of `table`.
    pub fn symbol_define(&mut self, table: u32, start: u32) {
        self.symbols.define(table, start..self.position);
    }

    pub fn symbol_match(&mut self, table: u32, last_only: bool) -> bool {
        match self
            .symbols
            .check(table, last_only, self.input, self.position)
        {
            Some(len) => {
                self.advance(len);
                true
            }
            None => false,
        }
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn flag(&self, flag: u32) -> bool {
        self.flags.get(flag as usize).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, flag: u32, value: bool) {
        let index = flag as usize;
        if index >= self.flags.len() {
            self.flags.resize(index + 1, false);
        }
        self.flags[index] = value;
    }

    pub fn finish(mut self, success: bool) -> Outcome {
        let tree = match success {
            true => self
                .ast
                .commit(AstMark::default())
                .map(|root| std::mem::take(&mut self.ast).into_tree(root)),
            false => None,
        };

        Outcome {
            success,
            consumed: self.position,
            max_position: self.max_position(),
            tree,
            memo: self.memo.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminals() {
        let mut cx = Context::new(b"abc9", 0, 0);
        assert!(!cx.byte(b'b'));
        assert!(cx.byte(b'a'));
        assert!(!cx.bytes(b"bd"));
        assert_eq!(cx.position(), 1);
        assert!(cx.lookahead_bytes(b"bc"));
        assert!(cx.bytes(b"bc"));
        assert!(cx.byte_if(|b| b.is_ascii_digit()));
        assert!(cx.is_eof());
        assert!(!cx.any_byte());
    }

    #[test]
    fn test_restore_tracks_max_position() {
        let mut cx = Context::new(b"abc", 0, 0);
        assert!(cx.bytes(b"ab"));
        cx.set_position(0);
        assert_eq!(cx.position(), 0);
        assert_eq!(cx.max_position(), 2);
    }

    #[test]
    fn test_memo_replay_relinks() {
        let mut cx = Context::new(b"xx", 0, 1);

        let mark = cx.ast_mark();
        let inner = cx.ast_mark();
        cx.ast_new(false);
        assert!(cx.byte(b'x'));
        cx.ast_capture();
        cx.ast_commit_link(inner, None);
        cx.memo_success(0, 0, Some(mark));

        cx.set_position(0);
        cx.ast_abort(mark);
        assert_eq!(cx.ast_log().len(), 0);

        let entry = cx.memo_get(0).unwrap();
        assert_eq!(entry.consumed, 1);
        assert!(entry.link.is_some());
        assert!(cx.memo_replay(entry));
        assert_eq!(cx.position(), 1);
        assert_eq!(cx.ast_log().len(), 1);
    }

    #[test]
    fn test_symbols() {
        let mut cx = Context::new(b"abab", 0, 0);
        let savepoint = cx.symbol_savepoint();
        assert!(cx.bytes(b"ab"));
        cx.symbol_define(0, 0);
        assert!(cx.symbol_match(0, true));
        assert!(cx.is_eof());

        cx.symbol_rollback(savepoint);
        cx.set_position(2);
        assert!(!cx.symbol_match(0, false));
    }

    #[test]
    fn test_flags() {
        let mut cx = Context::new(b"", 1, 0);
        assert!(!cx.flag(0));
        cx.set_flag(0, true);
        assert!(cx.flag(0));
        assert!(!cx.flag(7));
    }
}
