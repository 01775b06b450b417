mod common;

use common::{lower, parse, symbols, tree_text, variants};
use peglow_backend::{
    ir::{build::*, Production},
    LowerOptions,
};
use peglow_runtime::Symbol;

fn arithmetic() -> Vec<Production> {
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
                link(None, node("Num", plus(set(&[(b'0', b'9')])))),
                seq([byte(b'('), link(Some("inner"), rule("Sum")), byte(b')')]),
            ]),
        ),
    ]
}

#[test]
fn left_joined_nodes() {
    let input = "1+2*3+4";
    let mut trees = Vec::new();
    for options in variants().into_iter().filter(|o| o.tree) {
        let lowered = lower(arithmetic(), options);
        let outcome = parse(&lowered, input);
        assert!(outcome.success);
        assert_eq!(outcome.consumed, 7);
        trees.push(tree_text(&lowered, &outcome, input).unwrap());

        let names = symbols(&lowered);
        let symbol = |name: &str| Symbol(names.iter().position(|n| *n == name).unwrap() as u32);
        let tree = outcome.tree.unwrap();
        let root = tree.node(tree.root());
        assert_eq!(root.tag, Some(symbol("Add")));
        assert_eq!(root.children.len(), 2);

        let left = tree.node(root.children[0].node);
        assert_eq!(left.tag, Some(symbol("Add")));
        let product = tree.node(left.children[1].node);
        assert_eq!(product.tag, Some(symbol("Mul")));
        assert_eq!((product.start, product.end), (2, 5));
    }
    assert!(trees.windows(2).all(|w| w[0] == w[1]), "{trees:#?}");
}

#[test]
fn labeled_links() {
    let lowered = lower(arithmetic(), LowerOptions::default());
    let input = "(7)*2";
    let outcome = parse(&lowered, input);
    assert!(outcome.success);
    assert_eq!(outcome.consumed, 5);

    let names = symbols(&lowered);
    let inner = Symbol(names.iter().position(|n| *n == "inner").unwrap() as u32);
    let tree = outcome.tree.unwrap();
    let child = tree.child(tree.root(), inner).unwrap();
    assert_eq!(tree.text(child, input.as_bytes()), b"7");
}

#[test]
fn no_tree_without_tree_option() {
    let options = LowerOptions {
        tree: false,
        ..LowerOptions::default()
    };
    let lowered = lower(arithmetic(), options);
    let outcome = parse(&lowered, "1+2");
    assert!(outcome.success);
    assert!(outcome.tree.is_none());
}

#[test]
fn replaced_values() {
    let lowered = lower(
        vec![Production::new(
            "Bool",
            choice([
                seq([new_node(), lit("yes"), replace("true"), capture()]),
                seq([new_node(), lit("no"), replace("false"), capture()]),
            ]),
        )],
        LowerOptions::default(),
    );
    let outcome = parse(&lowered, "no");
    let text = tree_text(&lowered, &outcome, "no").unwrap();
    assert_eq!(text, "# 0..2 = \"false\"\n");
}

fn element() -> Vec<Production> {
    vec![Production::new(
        "Elem",
        scope(seq([
            byte(b'<'),
            define("Tag", plus(set(&[(b'a', b'z')]))),
            byte(b'>'),
            star(rule("Elem")),
            lit("</"),
            is("Tag"),
            byte(b'>'),
        ])),
    )]
}

#[test]
fn matching_close_tags() {
    for options in variants() {
        let lowered = lower(element(), options);
        assert_eq!(lowered.memo_count, 0);

        for input in ["<a></a>", "<a><b></b><c></c></a>", "<ab><a></a></ab>"] {
            let outcome = parse(&lowered, input);
            assert!(outcome.success, "{input} {options:?}");
            assert_eq!(outcome.consumed as usize, input.len());
        }
        for input in ["<a></b>", "<a><b></a></b>", "<a><b></b></b>"] {
            assert!(!parse(&lowered, input).success, "{input} {options:?}");
        }
    }
}

#[test]
fn any_defined_symbol() {
    let declarations = |check| {
        vec![Production::new(
            "Program",
            seq([
                star(seq([
                    lit("let "),
                    define("Var", plus(set(&[(b'a', b'z')]))),
                    byte(b';'),
                ])),
                lit("use "),
                check,
                not(any()),
            ]),
        )]
    };

    for options in variants() {
        let lowered = lower(declarations(isa("Var")), options);
        assert!(parse(&lowered, "let x;let y;use x").success);
        assert!(parse(&lowered, "let x;let y;use y").success);
        assert!(!parse(&lowered, "let x;use z").success);

        let lowered = lower(declarations(is("Var")), options);
        assert!(!parse(&lowered, "let x;let y;use x").success);
        assert!(parse(&lowered, "let x;let y;use y").success);
    }
}
