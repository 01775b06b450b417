#![allow(dead_code)]

use peglow_backend::{compile, exec, ir::Production, Grammar, LowerOptions, LoweredGrammar};
use peglow_runtime::Outcome;

pub fn lower(productions: Vec<Production>, options: LowerOptions) -> LoweredGrammar {
    let grammar = Grammar::new(productions, None).unwrap();
    compile(&grammar, &options).unwrap()
}

pub fn parse(lowered: &LoweredGrammar, input: &str) -> Outcome {
    exec::parse(lowered, input.as_bytes())
}

/// Option sets the lowered code must agree across.
pub fn variants() -> Vec<LowerOptions> {
    let full = LowerOptions::default();
    vec![
        LowerOptions::plain(),
        full,
        LowerOptions {
            memoize: false,
            ..full
        },
        LowerOptions {
            optimize: false,
            predict: false,
            ..full
        },
        LowerOptions {
            tree: false,
            ..full
        },
    ]
}

pub fn symbols(lowered: &LoweredGrammar) -> Vec<&str> {
    lowered.symbols.iter().map(|s| &**s).collect()
}

pub fn tree_text(lowered: &LoweredGrammar, outcome: &Outcome, input: &str) -> Option<String> {
    let tree = outcome.tree.as_ref()?;
    let mut buf = String::new();
    tree.display_into(&mut buf, input.as_bytes(), &symbols(lowered))
        .unwrap();
    Some(buf)
}
