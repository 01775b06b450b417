use std::{
    collections::HashMap,
    fmt::Debug,
    ops::{BitOr, BitOrAssign},
};

use cranelift_entity::SecondaryMap;

use crate::{
    byteset::ByteSet,
    grammar::{Grammar, ProductionHandle},
    ir::{Expr, RcString},
};

/// Kinds of parser state an expression may touch.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Effects(u8);

impl Effects {
    #![allow(non_upper_case_globals)]
    pub const None: Effects = Effects(0);
    pub const WritesTree: Effects = Effects(1);
    pub const ReadsSymbols: Effects = Effects(2);
    pub const WritesSymbols: Effects = Effects(4);
    pub const ReadsFlags: Effects = Effects(8);
    pub const WritesFlags: Effects = Effects(16);
}

impl Effects {
    pub fn contains(self, flag: Effects) -> bool {
        (self.0 & flag.0) == flag.0
    }
    pub fn intersects(self, flags: Effects) -> bool {
        (self.0 & flags.0) != 0
    }
    pub fn insert(&mut self, flag: Effects) {
        self.0 |= flag.0;
    }
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Effects {
    type Output = Effects;
    fn bitor(self, rhs: Self) -> Self::Output {
        Effects(self.0 | rhs.0)
    }
}

impl BitOrAssign for Effects {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Debug for Effects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMES: [(Effects, &str); 5] = [
            (Effects::WritesTree, "WritesTree"),
            (Effects::ReadsSymbols, "ReadsSymbols"),
            (Effects::WritesSymbols, "WritesSymbols"),
            (Effects::ReadsFlags, "ReadsFlags"),
            (Effects::WritesFlags, "WritesFlags"),
        ];
        let mut set = f.debug_set();
        for (flag, name) in NAMES {
            if self.contains(flag) {
                set.entry(&format_args!("{name}"));
            }
        }
        set.finish()
    }
}

/// Bytes an expression can start with when it consumes input.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct First {
    pub set: ByteSet,
    /// May succeed without consuming anything.
    pub nullable: bool,
}

impl First {
    /// Never succeeds.
    pub fn never() -> First {
        First::default()
    }

    /// Succeeds only without consuming.
    pub fn empty() -> First {
        First {
            set: ByteSet::new(),
            nullable: true,
        }
    }

    pub fn bytes(set: ByteSet) -> First {
        First {
            set,
            nullable: false,
        }
    }

    /// Whether the expression may succeed when the cursor is at `byte`.
    pub fn admits(&self, byte: u8) -> bool {
        self.nullable || self.set.contains(byte)
    }

    pub fn union(mut self, other: &First) -> First {
        self.set.union(&other.set);
        self.nullable |= other.nullable;
        self
    }
}

/// Net change of the tree log made by a successful match.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub enum AstShape {
    #[default]
    Empty,
    /// Exactly one link entry.
    SingleLink,
    Many,
}

impl AstShape {
    pub fn then(self, next: AstShape) -> AstShape {
        match (self, next) {
            (AstShape::Empty, other) | (other, AstShape::Empty) => other,
            _ => AstShape::Many,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct ProductionInfo {
    pub effects: Effects,
    pub first: First,
    pub shape: AstShape,
}

/// Names interned into dense indices in order of first appearance.
#[derive(Clone, Default, Debug)]
pub struct Slots {
    names: Vec<RcString>,
    index: HashMap<RcString, u32>,
}

impl Slots {
    pub fn intern(&mut self, name: &str) -> u32 {
        if let Some(&slot) = self.index.get(name) {
            return slot;
        }
        let slot = self.names.len() as u32;
        self.names.push(name.into());
        self.index.insert(name.into(), slot);
        slot
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.index.get(name).copied()
    }

    pub fn names(&self) -> &[RcString] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Facts about the grammar that lowering needs but which depend on other productions.
///
/// Production summaries are computed as a fixpoint, starting from "never matches, touches
/// nothing" and growing monotonically until no summary changes.
#[derive(Clone, Debug)]
pub struct Analysis {
    productions: SecondaryMap<ProductionHandle, ProductionInfo>,
    pub flags: Slots,
    pub tables: Slots,
    /// Tags, link labels and replacement values.
    pub strings: Slots,
}

impl Analysis {
    pub fn new(grammar: &Grammar) -> Analysis {
        let mut analysis = Analysis {
            productions: SecondaryMap::with_capacity(grammar.len()),
            flags: Slots::default(),
            tables: Slots::default(),
            strings: Slots::default(),
        };

        for (_, production) in grammar.iter() {
            production
                .expr
                .visit_nodes_top_down(|expr| analysis.intern_names(expr));
        }

        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for (handle, production) in grammar.iter() {
                let info = ProductionInfo {
                    effects: analysis.effects(grammar, &production.expr),
                    first: analysis.first(grammar, &production.expr),
                    shape: analysis.shape(grammar, &production.expr),
                };
                if analysis.productions[handle] != info {
                    analysis.productions[handle] = info;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        log::debug!(
            "Analysis of {} productions converged after {rounds} rounds",
            grammar.len()
        );
        analysis
    }

    fn intern_names(&mut self, expr: &Expr) {
        match expr {
            Expr::FlagCheck { flag, .. } | Expr::FlagSet { flag, .. } => {
                self.flags.intern(flag);
            }
            Expr::SymbolDefine { table, .. } | Expr::SymbolCheck { table, .. } => {
                self.tables.intern(table);
            }
            Expr::TreeTag(name) | Expr::TreeReplace(name) => {
                self.strings.intern(name);
            }
            Expr::TreeLink {
                label: Some(label), ..
            } => {
                self.strings.intern(label);
            }
            _ => {}
        }
    }

    pub fn production(&self, handle: ProductionHandle) -> &ProductionInfo {
        &self.productions[handle]
    }

    fn rule(&self, grammar: &Grammar, name: &str) -> Option<&ProductionInfo> {
        grammar.resolve(name).map(|handle| &self.productions[handle])
    }

    pub fn effects(&self, grammar: &Grammar, expr: &Expr) -> Effects {
        match expr {
            Expr::Byte(_)
            | Expr::Set(_)
            | Expr::Any
            | Expr::Literal(_)
            | Expr::Empty
            | Expr::Fail => Effects::None,
            Expr::Sequence(children) => self.effects_of(grammar, children),
            Expr::Choice(choice) => self.effects_of(grammar, choice.alternatives()),
            Expr::ZeroOrMore(inner)
            | Expr::OneOrMore(inner)
            | Expr::Optional(inner)
            | Expr::And(inner)
            | Expr::Not(inner)
            | Expr::SymbolScope(inner) => self.effects(grammar, inner),
            Expr::Rule(name) => match self.rule(grammar, name) {
                Some(info) => info.effects,
                None => Effects(u8::MAX),
            },
            Expr::TreeNew { .. } | Expr::TreeCapture | Expr::TreeTag(_) | Expr::TreeReplace(_) => {
                Effects::WritesTree
            }
            Expr::TreeLink { inner, .. } => Effects::WritesTree | self.effects(grammar, inner),
            Expr::SymbolDefine { inner, .. } => {
                Effects::WritesSymbols | self.effects(grammar, inner)
            }
            Expr::SymbolCheck { .. } => Effects::ReadsSymbols,
            Expr::FlagCheck { .. } => Effects::ReadsFlags,
            Expr::FlagSet { inner, .. } => Effects::WritesFlags | self.effects(grammar, inner),
        }
    }

    pub fn effects_of(&self, grammar: &Grammar, exprs: &[Expr]) -> Effects {
        exprs
            .iter()
            .fold(Effects::None, |acc, e| acc | self.effects(grammar, e))
    }

    pub fn first(&self, grammar: &Grammar, expr: &Expr) -> First {
        match expr {
            Expr::Byte(byte) => First::bytes(ByteSet::from_byte(*byte)),
            Expr::Set(set) => First::bytes(*set),
            Expr::Any => First::bytes(ByteSet::full()),
            Expr::Literal(literal) => match literal.bytes().first() {
                Some(&byte) => First::bytes(ByteSet::from_byte(byte)),
                None => First::empty(),
            },
            Expr::Sequence(children) => {
                let mut first = First::empty();
                for child in children {
                    if !first.nullable {
                        break;
                    }
                    let next = self.first(grammar, child);
                    first.set.union(&next.set);
                    first.nullable = next.nullable;
                }
                first
            }
            Expr::Choice(choice) => choice
                .alternatives()
                .iter()
                .fold(First::never(), |acc, e| acc.union(&self.first(grammar, e))),
            Expr::ZeroOrMore(inner) | Expr::Optional(inner) => {
                self.first(grammar, inner).union(&First::empty())
            }
            Expr::OneOrMore(inner)
            | Expr::TreeLink { inner, .. }
            | Expr::SymbolDefine { inner, .. }
            | Expr::SymbolScope(inner)
            | Expr::FlagSet { inner, .. } => self.first(grammar, inner),
            Expr::And(_)
            | Expr::Not(_)
            | Expr::TreeNew { .. }
            | Expr::TreeCapture
            | Expr::TreeTag(_)
            | Expr::TreeReplace(_)
            | Expr::FlagCheck { .. }
            | Expr::Empty => First::empty(),
            // the symbol text is only known at parse time
            Expr::SymbolCheck { .. } => First {
                set: ByteSet::full(),
                nullable: true,
            },
            Expr::Rule(name) => match self.rule(grammar, name) {
                Some(info) => info.first,
                None => First {
                    set: ByteSet::full(),
                    nullable: true,
                },
            },
            Expr::Fail => First::never(),
        }
    }

    pub fn shape(&self, grammar: &Grammar, expr: &Expr) -> AstShape {
        match expr {
            Expr::Byte(_)
            | Expr::Set(_)
            | Expr::Any
            | Expr::Literal(_)
            | Expr::And(_)
            | Expr::Not(_)
            | Expr::SymbolCheck { .. }
            | Expr::FlagCheck { .. }
            | Expr::Empty
            | Expr::Fail => AstShape::Empty,
            Expr::Sequence(children) => children
                .iter()
                .fold(AstShape::Empty, |acc, e| acc.then(self.shape(grammar, e))),
            Expr::Choice(choice) => choice
                .alternatives()
                .iter()
                .map(|e| self.shape(grammar, e))
                .max()
                .unwrap_or_default(),
            Expr::ZeroOrMore(inner) | Expr::OneOrMore(inner) => {
                match self.shape(grammar, inner) {
                    AstShape::Empty => AstShape::Empty,
                    _ => AstShape::Many,
                }
            }
            Expr::Optional(inner)
            | Expr::SymbolDefine { inner, .. }
            | Expr::SymbolScope(inner)
            | Expr::FlagSet { inner, .. } => self.shape(grammar, inner),
            Expr::Rule(name) => match self.rule(grammar, name) {
                Some(info) => info.shape,
                None => AstShape::Many,
            },
            Expr::TreeNew { .. } | Expr::TreeCapture | Expr::TreeTag(_) | Expr::TreeReplace(_) => {
                AstShape::Many
            }
            Expr::TreeLink { .. } => AstShape::SingleLink,
        }
    }
}
