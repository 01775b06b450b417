//! Support library for parsers emitted by `peglow`.
//!
//! Generated code drives a single [`Context`] per parse: the cursor over the input,
//! the tree-construction log, the memo table, symbol tables and flag slots.

pub mod ast;
pub mod context;
pub mod memo;
pub mod symbols;

pub use ast::{AstMark, Link, Node, NodeId, Tree};
pub use context::{Context, Outcome};
pub use memo::{MemoEntry, MemoStats};
pub use symbols::SymbolSavepoint;

/// Index into the interned string table of a generated parser, used for node tags,
/// link labels and replacement values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct Symbol(pub u32);

impl Symbol {
    pub fn name<'a>(self, symbols: &[&'a str]) -> &'a str {
        symbols.get(self.0 as usize).copied().unwrap_or("<unknown>")
    }
}

/// Everything a generated file exports about itself.
#[derive(Clone)]
pub struct Language {
    pub entry: fn(&mut Context) -> bool,
    pub flag_count: usize,
    pub memo_count: usize,
    pub symbols: &'static [&'static str],
}

impl Language {
    pub fn parse(&self, input: &[u8]) -> Outcome {
        let mut cx = Context::new(input, self.flag_count, self.memo_count);
        let success = (self.entry)(&mut cx);
        cx.finish(success)
    }
}
