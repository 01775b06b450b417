use cranelift_entity::SecondaryMap;

use crate::{
    analysis::Analysis,
    error::{Diagnostic, ErrorAccumulator},
    grammar::{Grammar, ProductionHandle},
    ir::Expr,
};

#[derive(Clone, Copy, PartialEq, Eq, Default)]
enum VisitState {
    #[default]
    Unvisited,
    Active,
    Done,
}

/// Reports every cycle of calls which can be reached without consuming input,
/// the generated parser would recurse on them forever.
pub fn check_left_recursion(grammar: &Grammar, analysis: &Analysis, err: &ErrorAccumulator) {
    let mut edges: SecondaryMap<ProductionHandle, Vec<ProductionHandle>> = SecondaryMap::new();
    for (handle, production) in grammar.iter() {
        let mut calls = Vec::new();
        prefix_calls(grammar, analysis, &production.expr, &mut calls);
        calls.dedup();
        edges[handle] = calls;
    }

    let mut state = SecondaryMap::new();
    let mut stack = Vec::new();
    for handle in grammar.handles() {
        if state[handle] == VisitState::Unvisited {
            visit(handle, grammar, &edges, &mut state, &mut stack, err);
        }
    }
}

fn visit(
    handle: ProductionHandle,
    grammar: &Grammar,
    edges: &SecondaryMap<ProductionHandle, Vec<ProductionHandle>>,
    state: &mut SecondaryMap<ProductionHandle, VisitState>,
    stack: &mut Vec<ProductionHandle>,
    err: &ErrorAccumulator,
) {
    state[handle] = VisitState::Active;
    stack.push(handle);

    for &next in &edges[handle] {
        match state[next] {
            VisitState::Unvisited => visit(next, grammar, edges, state, stack, err),
            VisitState::Active => {
                let start = stack.iter().rposition(|&h| h == next).unwrap_or(0);
                let mut path = String::new();
                for &h in &stack[start..] {
                    path.push_str(h.name(grammar));
                    path.push_str(" -> ");
                }
                path.push_str(next.name(grammar));

                err.diagnostic(
                    Diagnostic::new(format!("Left recursion {path}"))
                        .in_production(next.name(grammar)),
                );
            }
            VisitState::Done => {}
        }
    }

    stack.pop();
    state[handle] = VisitState::Done;
}

/// Productions called before anything is necessarily consumed.
fn prefix_calls(
    grammar: &Grammar,
    analysis: &Analysis,
    expr: &Expr,
    out: &mut Vec<ProductionHandle>,
) {
    match expr {
        Expr::Sequence(children) => {
            for child in children {
                prefix_calls(grammar, analysis, child, out);
                if !analysis.first(grammar, child).nullable {
                    break;
                }
            }
        }
        Expr::Choice(choice) => {
            for alternative in choice.alternatives() {
                prefix_calls(grammar, analysis, alternative, out);
            }
        }
        Expr::ZeroOrMore(inner)
        | Expr::OneOrMore(inner)
        | Expr::Optional(inner)
        | Expr::And(inner)
        | Expr::Not(inner)
        | Expr::SymbolScope(inner)
        | Expr::TreeLink { inner, .. }
        | Expr::SymbolDefine { inner, .. }
        | Expr::FlagSet { inner, .. } => prefix_calls(grammar, analysis, inner, out),
        Expr::Rule(name) => {
            if let Some(handle) = grammar.resolve(name) {
                out.push(handle);
            }
        }
        Expr::Byte(_)
        | Expr::Set(_)
        | Expr::Any
        | Expr::Literal(_)
        | Expr::TreeNew { .. }
        | Expr::TreeCapture
        | Expr::TreeTag(_)
        | Expr::TreeReplace(_)
        | Expr::SymbolCheck { .. }
        | Expr::FlagCheck { .. }
        | Expr::Empty
        | Expr::Fail => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{build::*, Production};

    fn check(productions: Vec<Production>) -> Vec<String> {
        let grammar = Grammar::new(productions, None).unwrap();
        let analysis = Analysis::new(&grammar);
        let err = ErrorAccumulator::new();
        check_left_recursion(&grammar, &analysis, &err);
        let messages = err.get().iter().map(|d| d.to_string()).collect();
        messages
    }

    #[test]
    fn test_direct_left_recursion() {
        let messages = check(vec![
            Production::new(
                "Expr",
                choice([seq([rule("Expr"), byte(b'+'), rule("Num")]), rule("Num")]),
            ),
            Production::new("Num", plus(set(&[(b'0', b'9')]))),
        ]);
        assert_eq!(messages, vec!["production 'Expr': Left recursion Expr -> Expr"]);
    }

    #[test]
    fn test_left_recursion_through_nullable_prefix() {
        let messages = check(vec![
            Production::new("A", seq([star(byte(b' ')), rule("B")])),
            Production::new("B", seq([opt(byte(b'-')), not(byte(b'x')), rule("A")])),
        ]);
        assert_eq!(messages, vec!["production 'A': Left recursion A -> B -> A"]);
    }

    #[test]
    fn test_guarded_recursion() {
        let messages = check(vec![
            Production::new("List", seq([byte(b'('), star(rule("List")), byte(b')')])),
            Production::new("Item", seq([rule("Atom"), opt(seq([byte(b','), rule("Item")]))])),
            Production::new("Atom", byte(b'a')),
        ]);
        assert!(messages.is_empty());
    }
}
