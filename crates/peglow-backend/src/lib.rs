//! Lowers parsing expression grammars into structured backtracking parsers.
//!
//! The pipeline is [`Grammar`] → [`Analysis`] → validation → prediction → [`MemoPlan`] →
//! [`LoweredGrammar`], which can then be rendered as Rust source with [`render`] or run
//! directly with [`exec`].

pub mod analysis;
pub mod byteset;
pub mod check;
pub mod code;
pub mod continuation;
pub mod error;
pub mod exec;
pub mod grammar;
pub mod input;
pub mod ir;
pub mod literal;
pub mod lower;
pub mod memo;
pub mod optimize;
pub mod options;
pub mod render;

pub use analysis::Analysis;
pub use code::LoweredGrammar;
pub use error::{Diagnostic, LowerError, Result};
pub use grammar::Grammar;
pub use input::GrammarDef;
pub use memo::MemoPlan;
pub use options::LowerOptions;

use error::ErrorAccumulator;

/// Runs every phase on a validated grammar.
pub fn compile(grammar: &Grammar, options: &LowerOptions) -> Result<LoweredGrammar> {
    let analysis = Analysis::new(grammar);

    let err = ErrorAccumulator::new();
    check::check_left_recursion(grammar, &analysis, &err);
    err.finish()?;

    let predicted;
    let (grammar, analysis) = match options.predict {
        true => {
            predicted = optimize::predict_choices(grammar, &analysis);
            let analysis = Analysis::new(&predicted);
            (&predicted, analysis)
        }
        false => (grammar, analysis),
    };

    let memo = MemoPlan::new(grammar, &analysis, options);
    let lowered = lower::lower_grammar(grammar, &analysis, options, &memo)?;

    log::info!(
        "Lowered {} productions: {} flags, {} memo slots, {} symbol tables",
        lowered.functions.len(),
        lowered.flag_count,
        lowered.memo_count,
        lowered.tables.len()
    );
    Ok(lowered)
}

/// Decodes a JSON grammar and compiles it with the options it carries.
pub fn compile_json(source: &str) -> Result<LoweredGrammar> {
    let (grammar, options) = GrammarDef::from_json(source)?.into_grammar()?;
    compile(&grammar, &options)
}
