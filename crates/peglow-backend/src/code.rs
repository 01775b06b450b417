//! Structured code produced by lowering.
//!
//! Control flow only uses labeled blocks and loops, a failing expression leaves its scope
//! with [`Flow`] and the statements after the scope are the recovery point.

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::{
    byteset::ByteRanges,
    grammar::ProductionHandle,
    ir::RcString,
    options::LowerOptions,
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScopeHandle(u32);
entity_impl!(ScopeHandle, "s");

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableHandle(u32);
entity_impl!(VariableHandle, "v");

/// Where control goes, used both as jump statement and as failure target.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flow {
    Break(ScopeHandle),
    Continue(ScopeHandle),
    Return(bool),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ScopeKind {
    Block,
    Loop,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VariableKind {
    Position,
    AstMark,
    SymbolSavepoint,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Terminal {
    Byte(u8),
    Ranges(ByteRanges),
    Any,
    Bytes(Box<[u8]>),
}

/// A condition, the ones that match input advance the cursor only when they hold.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Test {
    Match(Terminal),
    Peek(Terminal),
    Call(ProductionHandle),
    Flag(u32),
    SymbolMatch { table: u32, last_only: bool },
    /// The cursor moved since the variable was saved.
    Advanced(VariableHandle),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Effect {
    Restore(VariableHandle),
    AstAbort(VariableHandle),
    SymbolRollback(VariableHandle),
    AstNew {
        left_join: bool,
    },
    AstCapture,
    AstTag(u32),
    AstReplace(u32),
    /// Commits the log from `mark` and links the finished node.
    AstCommitLink {
        mark: VariableHandle,
        label: Option<u32>,
    },
    SymbolDefine {
        table: u32,
        start: VariableHandle,
    },
    SetFlag {
        flag: u32,
        value: bool,
    },
    MemoSuccess {
        slot: u32,
        start: VariableHandle,
        mark: Option<VariableHandle>,
    },
    MemoFailure {
        slot: u32,
        start: VariableHandle,
    },
}

pub type Block = Vec<Statement>;

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Statement {
    Let(VariableHandle, VariableKind),
    Effect(Effect),
    If {
        test: Test,
        negate: bool,
        then: Block,
    },
    Block(ScopeHandle, Block),
    Loop(ScopeHandle, Block),
    /// Branches on the byte at the cursor.
    Dispatch {
        arms: Vec<DispatchArm>,
        otherwise: Block,
    },
    /// Returns the cached result of the function if there is one.
    MemoLookup {
        slot: u32,
    },
    Jump(Flow),
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DispatchArm {
    pub bytes: ByteRanges,
    pub at_end: bool,
    pub body: Block,
}

impl Statement {
    pub fn for_each_child_block(&self, mut fun: impl FnMut(&Block)) {
        match self {
            Statement::If { then, .. } => fun(then),
            Statement::Block(_, body) | Statement::Loop(_, body) => fun(body),
            Statement::Dispatch { arms, otherwise } => {
                arms.iter().for_each(|arm| fun(&arm.body));
                fun(otherwise);
            }
            Statement::Let(..)
            | Statement::Effect(_)
            | Statement::MemoLookup { .. }
            | Statement::Jump(_) => {}
        }
    }
}

pub fn visit_statements(block: &Block, fun: &mut dyn FnMut(&Statement)) {
    for statement in block {
        fun(statement);
        statement.for_each_child_block(|child| visit_statements(child, fun));
    }
}

pub fn statement_count(block: &Block) -> usize {
    let mut count = 0;
    visit_statements(block, &mut |_| count += 1);
    count
}

#[derive(Clone, Debug)]
pub struct LoweredFunction {
    pub production: ProductionHandle,
    pub name: RcString,
    pub memo_slot: Option<u32>,
    pub scopes: PrimaryMap<ScopeHandle, ScopeKind>,
    pub variables: PrimaryMap<VariableHandle, VariableKind>,
    pub body: Block,
}

/// Output of lowering, one function per production plus the sizes of runtime tables.
#[derive(Clone, Debug)]
pub struct LoweredGrammar {
    pub functions: PrimaryMap<ProductionHandle, LoweredFunction>,
    pub start: ProductionHandle,
    pub options: LowerOptions,
    pub flag_count: usize,
    pub memo_count: usize,
    pub tables: Vec<RcString>,
    /// Tags, labels and replacement values, indexed by the `u32`s in effects.
    pub symbols: Vec<RcString>,
}

impl LoweredGrammar {
    pub fn function(&self, name: &str) -> Option<&LoweredFunction> {
        self.functions.values().find(|f| f.name.as_ref() == name)
    }
}
