//! Generated parsers must agree with evaluating the lowered grammar directly.

use peglow_backend::{compile_json, exec};
use peglow_fixtures::{arith, markup};
use peglow_runtime::{Language, Outcome};

const ARITH: &str = include_str!("../../../grammars/arith.json");
const MARKUP: &str = include_str!("../../../grammars/markup.json");

fn summary(outcome: &Outcome, input: &str, symbols: &[&str]) -> (bool, u32, Option<String>) {
    let tree = outcome.tree.as_ref().map(|tree| {
        let mut buf = String::new();
        tree.display_into(&mut buf, input.as_bytes(), symbols).unwrap();
        buf
    });
    (outcome.success, outcome.consumed, tree)
}

fn assert_agrees(language: &Language, source: &str, inputs: &[&str]) {
    let lowered = compile_json(source).unwrap();
    let symbols: Vec<&str> = lowered.symbols.iter().map(|s| &**s).collect();
    assert_eq!(language.symbols, &symbols[..]);
    assert_eq!(language.flag_count, lowered.flag_count);
    assert_eq!(language.memo_count, lowered.memo_count);

    for input in inputs {
        let generated = language.parse(input.as_bytes());
        let evaluated = exec::parse(&lowered, input.as_bytes());
        assert_eq!(
            summary(&generated, input, language.symbols),
            summary(&evaluated, input, &symbols),
            "{input:?}"
        );
    }
}

#[test]
fn arith_matches_evaluator() {
    assert_agrees(
        &arith::LANGUAGE,
        ARITH,
        &[
            "1 + 2*(x - 3)",
            "",
            "1 + ",
            "(1)",
            "((a))*b_c / 4",
            "1 2",
            "7*(8",
            "  12 -3-4 ",
        ],
    );

    let outcome = arith::LANGUAGE.parse(b"1 + 2*(x - 3)");
    assert!(outcome.success);
    assert_eq!(outcome.consumed, 13);
}

#[test]
fn markup_matches_evaluator() {
    assert_agrees(
        &markup::LANGUAGE,
        MARKUP,
        &[
            "",
            "<AB>xx 12</AB>",
            "<AB>x</A>",
            "<A><B>x</B></A>",
            "<A><B>x</A></B>",
            "let x",
            "lets if",
            "iff 1.5",
            "!1.5",
            "!1 2",
            "<A>!</A>",
            "<A>let  <B>3.25</B> z</A> q",
        ],
    );
}

#[test]
fn markup_semantics() {
    let parse = |input: &str| markup::LANGUAGE.parse(input.as_bytes());

    let outcome = parse("<AB>xx 12</AB>");
    assert!(outcome.success);
    assert_eq!(outcome.consumed, 14);
    assert!(parse("<A><B>x</B></A>").success);
    assert!(!parse("<AB>x</A>").success);
    assert!(!parse("<A><B>x</A></B>").success);

    assert!(parse("1.5").success);
    assert!(!parse("!1.5").success);
    assert!(parse("!1 2").success);

    let input = "let x";
    let outcome = parse(input);
    assert!(outcome.success);
    let (_, _, tree) = summary(&outcome, input, markup::SYMBOLS);
    let tree = tree.unwrap();
    assert!(tree.starts_with("#Document 0..5\n"), "{tree}");
    assert!(tree.contains("#Keyword 0..3"), "{tree}");
    assert!(tree.contains("#Word 4..5"), "{tree}");

    let (_, _, tree) = summary(&parse("lets"), "lets", markup::SYMBOLS);
    assert!(tree.unwrap().contains("#Word 0..4"));
}
