//! Property-based checks that memoization and the optimizer never change what is parsed.

mod common;

use common::{lower, parse, tree_text};
use peglow_backend::{
    ir::{
        build::{
            and, byte, capture, choice, fold_node, link, lit, node, not, opt, plus, rule, seq,
            set, star, tag,
        },
        Production,
    },
    LowerOptions, LoweredGrammar,
};
use proptest::prelude::*;

fn expressions() -> Vec<Production> {
    vec![
        Production::new(
            "Sum",
            seq([
                link(None, rule("Product")),
                star(seq([
                    fold_node(),
                    byte(b'+'),
                    link(None, rule("Product")),
                    tag("Add"),
                    capture(),
                ])),
            ]),
        ),
        Production::new(
            "Product",
            seq([
                rule("Atom"),
                star(seq([
                    fold_node(),
                    byte(b'*'),
                    rule("Atom"),
                    tag("Mul"),
                    capture(),
                ])),
            ]),
        ),
        Production::new(
            "Atom",
            choice([
                link(None, node("Num", plus(rule("Digit")))),
                seq([byte(b'('), link(None, rule("Sum")), byte(b')')]),
                link(None, node("Name", rule("Ident"))),
            ]),
        ),
        Production::new("Digit", set(&[(b'0', b'9')])),
        Production::new("Ident", plus(set(&[(b'a', b'z')]))),
    ]
}

fn tokens() -> Vec<Production> {
    vec![
        Production::new(
            "Tokens",
            star(choice([
                rule("Keyword"),
                rule("Ident"),
                rule("Number"),
                plus(byte(b' ')),
                seq([byte(b'('), rule("Tokens"), byte(b')')]),
            ])),
        ),
        Production::new(
            "Keyword",
            seq([choice([lit("if"), lit("in"), lit("let")]), not(set(&[(b'a', b'z')]))]),
        ),
        Production::new("Ident", seq([not(rule("Keyword")), plus(rule("Letter"))])),
        Production::new("Letter", choice([set(&[(b'a', b'm')]), set(&[(b'n', b'z')])])),
        Production::new(
            "Number",
            seq([
                plus(set(&[(b'0', b'9')])),
                opt(seq([byte(b'.'), plus(set(&[(b'0', b'9')]))])),
                not(and(byte(b'.'))),
            ]),
        ),
    ]
}

/// Where a failed parse leaves the cursor depends on the code shape, only successes are compared.
fn run(lowered: &LoweredGrammar, input: &str) -> (Option<u32>, Option<String>) {
    let outcome = parse(lowered, input);
    let tree = tree_text(lowered, &outcome, input);
    (outcome.success.then_some(outcome.consumed), tree)
}

fn without_memo(options: LowerOptions) -> LowerOptions {
    LowerOptions {
        memoize: false,
        ..options
    }
}

proptest! {
    #[test]
    fn memoization_is_transparent(input in "[0-9a-c+*() ]{0,24}") {
        for grammar in [expressions(), tokens()] {
            let memoized = lower(grammar.clone(), LowerOptions::default());
            let plain = lower(grammar, without_memo(LowerOptions::default()));
            prop_assert_eq!(run(&memoized, &input), run(&plain, &input));
        }
    }

    #[test]
    fn optimizer_preserves_language(input in "[0-9a-z.+*() ]{0,24}") {
        let general = LowerOptions {
            optimize: false,
            predict: false,
            ..LowerOptions::default()
        };
        for grammar in [expressions(), tokens()] {
            let optimized = lower(grammar.clone(), LowerOptions::default());
            let unoptimized = lower(grammar.clone(), general);
            let bare = lower(grammar, LowerOptions::plain());

            let expected = run(&unoptimized, &input);
            prop_assert_eq!(run(&optimized, &input), expected.clone());

            let (consumed, tree) = run(&bare, &input);
            prop_assert_eq!(consumed, expected.0);
            prop_assert!(tree.is_none());
        }
    }
}

#[test]
fn tokens_grammar_is_predicted() {
    let lowered = lower(tokens(), LowerOptions::default());
    let mut dispatches = 0;
    for function in lowered.functions.values() {
        peglow_backend::code::visit_statements(&function.body, &mut |statement| {
            if let peglow_backend::code::Statement::Dispatch { .. } = statement {
                dispatches += 1;
            }
        });
    }
    assert!(dispatches >= 2, "{dispatches}");

    let plain = lower(tokens(), LowerOptions::plain());
    for input in ["if x", "let 12.5 (in)", "iffy", "12.", "int"] {
        assert_eq!(run(&lowered, input).0, run(&plain, input).0, "{input}");
    }
}
