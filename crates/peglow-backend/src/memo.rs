use std::fmt::Display;

use cranelift_entity::SecondaryMap;

use crate::{
    analysis::{Analysis, AstShape, Effects},
    grammar::{Grammar, ProductionHandle},
    options::LowerOptions,
};

/// Why a production is not memoized.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ineligible {
    Disabled,
    /// Its result depends on or changes symbol tables.
    Symbols,
    /// Its result depends on or changes flags.
    Flags,
    /// A cached result can't reproduce its tree log entries.
    TreeShape(AstShape),
    /// Rematching a terminal body costs less than a lookup.
    Terminal,
}

impl Display for Ineligible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Ineligible::Disabled => f.write_str("memoization is disabled"),
            Ineligible::Symbols => f.write_str("uses symbol tables"),
            Ineligible::Flags => f.write_str("uses flags"),
            Ineligible::TreeShape(shape) => write!(f, "leaves {shape:?} in the tree log"),
            Ineligible::Terminal => f.write_str("body is a terminal"),
        }
    }
}

/// Decides whether a production's result is determined by the input position alone.
///
/// A success can only be replayed when the production leaves at most one link entry in
/// the log, the cached entry is appended again on a hit.
pub fn eligibility(
    grammar: &Grammar,
    analysis: &Analysis,
    options: &LowerOptions,
    handle: ProductionHandle,
) -> Result<(), Ineligible> {
    if !options.memoize {
        return Err(Ineligible::Disabled);
    }

    let info = analysis.production(handle);
    if info
        .effects
        .intersects(Effects::ReadsSymbols | Effects::WritesSymbols)
    {
        return Err(Ineligible::Symbols);
    }
    if info
        .effects
        .intersects(Effects::ReadsFlags | Effects::WritesFlags)
    {
        return Err(Ineligible::Flags);
    }
    if options.tree && info.shape > AstShape::SingleLink {
        return Err(Ineligible::TreeShape(info.shape));
    }
    if grammar.get(handle).expr.is_terminal() {
        return Err(Ineligible::Terminal);
    }
    Ok(())
}

/// Memo slots of the memoized productions, numbered densely.
#[derive(Clone, Debug, Default)]
pub struct MemoPlan {
    slots: SecondaryMap<ProductionHandle, Option<u32>>,
    count: u32,
}

impl MemoPlan {
    pub fn new(grammar: &Grammar, analysis: &Analysis, options: &LowerOptions) -> MemoPlan {
        let mut plan = MemoPlan::default();
        for handle in grammar.handles() {
            match eligibility(grammar, analysis, options, handle) {
                Ok(()) => {
                    plan.slots[handle] = Some(plan.count);
                    plan.count += 1;
                }
                Err(reason) => {
                    log::debug!("Not memoizing '{}': {reason}", handle.name(grammar));
                }
            }
        }
        plan
    }

    pub fn slot(&self, handle: ProductionHandle) -> Option<u32> {
        self.slots[handle]
    }

    pub fn count(&self) -> usize {
        self.count as usize
    }
}
