use std::collections::HashMap;

use crate::{
    analysis::{Analysis, Effects, First},
    byteset::ByteSet,
    code::Terminal,
    grammar::Grammar,
    ir::{Choice, Expr, Prediction},
};

/// Bound on following rules whose body is a terminal.
const DEREF_DEPTH: u32 = 8;

/// Choices with fewer alternatives are cheap enough to try in order.
pub const MIN_PREDICTED_ALTERNATIVES: usize = 3;

/// Terminal test for the four byte matching expressions, `None` for the empty set.
pub fn base_terminal(expr: &Expr) -> Option<Terminal> {
    match expr {
        Expr::Byte(byte) => Some(Terminal::Byte(*byte)),
        Expr::Set(set) => set_terminal(set),
        Expr::Any => Some(Terminal::Any),
        Expr::Literal(literal) => Some(bytes_terminal(literal.bytes())),
        _ => None,
    }
}

/// Cheapest test for a set, `None` when it has no members.
pub fn set_terminal(set: &ByteSet) -> Option<Terminal> {
    if set.is_empty() {
        None
    } else if let Some(byte) = set.single() {
        Some(Terminal::Byte(byte))
    } else if set.is_full() {
        Some(Terminal::Any)
    } else {
        Some(Terminal::Ranges(set.ranges()))
    }
}

fn bytes_terminal(bytes: &[u8]) -> Terminal {
    match bytes {
        [byte] => Terminal::Byte(*byte),
        _ => Terminal::Bytes(bytes.into()),
    }
}

/// A single terminal test equivalent to `expr`, rules with terminal bodies are
/// followed when `deref` is set.
pub fn terminal(grammar: &Grammar, expr: &Expr, deref: bool) -> Option<Terminal> {
    let depth = if deref { DEREF_DEPTH } else { 0 };
    if let Some(set) = byte_set(grammar, expr, depth) {
        return set_terminal(&set);
    }
    literal_bytes(grammar, expr, depth).map(|bytes| bytes_terminal(&bytes))
}

/// Set of bytes if `expr` matches exactly one byte from it.
pub fn byte_set(grammar: &Grammar, expr: &Expr, depth: u32) -> Option<ByteSet> {
    match expr {
        Expr::Byte(byte) => Some(ByteSet::from_byte(*byte)),
        Expr::Set(set) => Some(*set),
        Expr::Any => Some(ByteSet::full()),
        Expr::Literal(literal) => match literal.bytes() {
            [byte] => Some(ByteSet::from_byte(*byte)),
            _ => None,
        },
        Expr::Choice(choice) => choice_byte_set(grammar, choice, depth),
        Expr::Sequence(children) => match children.as_slice() {
            [single] => byte_set(grammar, single, depth),
            _ => None,
        },
        Expr::Rule(name) if depth > 0 => {
            let body = &grammar.get(grammar.resolve(name)?).expr;
            byte_set(grammar, body, depth - 1)
        }
        _ => None,
    }
}

/// Merged set of a choice whose every alternative matches a single byte.
pub fn choice_byte_set(grammar: &Grammar, choice: &Choice, depth: u32) -> Option<ByteSet> {
    let mut merged = ByteSet::new();
    for alternative in choice.alternatives() {
        merged.union(&byte_set(grammar, alternative, depth)?);
    }
    Some(merged)
}

fn literal_bytes(grammar: &Grammar, expr: &Expr, depth: u32) -> Option<Vec<u8>> {
    match expr {
        Expr::Byte(byte) => Some(vec![*byte]),
        Expr::Literal(literal) => Some(literal.bytes().to_vec()),
        Expr::Set(set) => set.single().map(|byte| vec![byte]),
        Expr::Sequence(children) if !children.is_empty() => {
            let mut bytes = Vec::new();
            for child in children {
                bytes.extend(literal_bytes(grammar, child, depth)?);
            }
            Some(bytes)
        }
        Expr::Rule(name) if depth > 0 => {
            let body = &grammar.get(grammar.resolve(name)?).expr;
            literal_bytes(grammar, body, depth - 1)
        }
        _ => None,
    }
}

/// Attaches prediction tables to choices which don't have one.
pub fn predict_choices(grammar: &Grammar, analysis: &Analysis) -> Grammar {
    let mut predicted = 0;
    let result = grammar.map_bodies(|_, body| {
        body.map_bottom_up(&mut |expr| match expr {
            Expr::Choice(choice) => match synthesize_prediction(grammar, analysis, &choice) {
                Some(prediction) => {
                    predicted += 1;
                    Expr::Choice(choice.with_prediction(prediction))
                }
                None => Expr::Choice(choice),
            },
            other => other,
        })
    });
    log::info!("Synthesized {predicted} prediction tables");
    result
}

/// Builds a table from the first sets of the alternatives.
///
/// Alternatives which may write flags are kept in every bucket since their
/// effects survive failure.
pub fn synthesize_prediction(
    grammar: &Grammar,
    analysis: &Analysis,
    choice: &Choice,
) -> Option<Prediction> {
    let alternatives = choice.alternatives();
    if choice.prediction().is_some() || alternatives.len() < MIN_PREDICTED_ALTERNATIVES {
        return None;
    }
    if choice_byte_set(grammar, choice, 0).is_some() {
        // merged into a single set test instead
        return None;
    }

    let summaries: Vec<(First, bool)> = alternatives
        .iter()
        .map(|alternative| {
            let first = analysis.first(grammar, alternative);
            let sticky = analysis
                .effects(grammar, alternative)
                .intersects(Effects::WritesFlags);
            (first, sticky)
        })
        .collect();
    let candidates = |admits: &dyn Fn(&First) -> bool| -> Vec<usize> {
        (0..alternatives.len())
            .filter(|&i| summaries[i].1 || admits(&summaries[i].0))
            .collect()
    };

    let mut cases: Vec<Expr> = Vec::new();
    let mut buckets: HashMap<Vec<usize>, Option<u16>> = HashMap::new();
    let mut excludes_any = false;
    let mut case_of = |list: Vec<usize>| -> Option<u16> {
        if list.len() < alternatives.len() {
            excludes_any = true;
        }
        if let Some(&case) = buckets.get(&list) {
            return case;
        }
        let case = match list.as_slice() {
            [] => None,
            [single] => Some(alternatives[*single].clone()),
            _ => Choice::new(list.iter().map(|&i| alternatives[i].clone()).collect())
                .ok()
                .map(Expr::Choice),
        }
        .map(|expr| match cases.iter().position(|c| *c == expr) {
            Some(index) => index as u16,
            None => {
                cases.push(expr);
                (cases.len() - 1) as u16
            }
        });
        buckets.insert(list, case);
        case
    };

    let table: Vec<Option<u16>> = (0..=255u8)
        .map(|byte| case_of(candidates(&|first| first.admits(byte))))
        .collect();
    let at_end = case_of(candidates(&|first| first.nullable));

    if !excludes_any {
        log::trace!("No alternative can be excluded by lookahead in `{}`", Expr::Choice(choice.clone()));
        return None;
    }
    Prediction::new(cases, table, at_end).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{build::*, Production};

    fn grammar(productions: Vec<Production>) -> Grammar {
        Grammar::new(productions, None).unwrap()
    }

    #[test]
    fn test_terminal_forms() {
        let grammar = grammar(vec![
            Production::new("Digit", set(&[(b'0', b'9')])),
            Production::new("Keyword", seq([lit("whi"), byte(b'l'), lit("e")])),
            Production::new("Call", seq([rule("Digit"), any()])),
        ]);

        let merged = choice([byte(b'a'), set(&[(b'b', b'c')]), byte(b'_')]);
        let expected = Terminal::Ranges(ByteSet::from_ranges(&[(b'_', b'_'), (b'a', b'c')]).ranges());
        assert_eq!(terminal(&grammar, &merged, false), Some(expected));

        assert_eq!(
            terminal(&grammar, &rule("Keyword"), true),
            Some(Terminal::Bytes(b"while".as_slice().into()))
        );
        assert_eq!(terminal(&grammar, &rule("Keyword"), false), None);
        assert_eq!(
            terminal(&grammar, &choice([rule("Digit"), byte(b'x')]), true),
            Some(Terminal::Ranges(ByteSet::from_ranges(&[(b'0', b'9'), (b'x', b'x')]).ranges()))
        );
        assert_eq!(terminal(&grammar, &rule("Call"), true), None);

        assert_eq!(terminal(&grammar, &set(&[(0, 255)]), false), Some(Terminal::Any));
        assert_eq!(terminal(&grammar, &lit("x"), false), Some(Terminal::Byte(b'x')));
        assert_eq!(terminal(&grammar, &set(&[]), false), None);
        assert_eq!(base_terminal(&set(&[])), None);
        assert_eq!(
            base_terminal(&set(&[(b'a', b'b')])),
            Some(Terminal::Ranges(ByteSet::from_ranges(&[(b'a', b'b')]).ranges()))
        );
    }

    #[test]
    fn test_synthesize_prediction() {
        let grammar = grammar(vec![Production::new(
            "Stmt",
            choice([
                lit("if"),
                lit("in"),
                seq([opt(byte(b' ')), byte(b';')]),
                lit("let"),
            ]),
        )]);
        let analysis = Analysis::new(&grammar);
        let Expr::Choice(choice) = &grammar.get(grammar.start()).expr else {
            unreachable!()
        };

        let prediction = synthesize_prediction(&grammar, &analysis, choice).unwrap();
        let case = |byte| prediction.case(byte).map(|c| prediction.cases()[c as usize].clone());

        assert_eq!(case(b'i'), Some(choice_of([lit("if"), lit("in")])));
        assert_eq!(case(b'l'), Some(lit("let")));
        assert_eq!(case(b' '), Some(seq([opt(byte(b' ')), byte(b';')])));
        assert_eq!(case(b';'), case(b' '));
        assert_eq!(prediction.case(b'x'), None);
        assert_eq!(prediction.at_end(), None);
        assert_eq!(prediction.cases().len(), 3);
    }

    #[test]
    fn test_prediction_keeps_nullable_and_flag_writers() {
        let grammar = grammar(vec![Production::new(
            "A",
            choice([
                lit("ab"),
                on("F", true, seq([lit("cd"), fail()])),
                lit("ef"),
                star(byte(b'x')),
            ]),
        )]);
        let analysis = Analysis::new(&grammar);
        let Expr::Choice(choice) = &grammar.get(grammar.start()).expr else {
            unreachable!()
        };
        let prediction = synthesize_prediction(&grammar, &analysis, choice).unwrap();
        let alternatives = choice.alternatives();

        let case = |case: Option<u16>| prediction.cases()[case.unwrap() as usize].clone();
        assert_eq!(
            case(prediction.case(b'a')),
            choice_of([alternatives[0].clone(), alternatives[1].clone(), alternatives[3].clone()])
        );
        assert_eq!(
            case(prediction.case(b'z')),
            choice_of([alternatives[1].clone(), alternatives[3].clone()])
        );
        assert_eq!(case(prediction.at_end()), case(prediction.case(b'z')));
    }

    #[test]
    fn test_no_prediction_without_exclusion() {
        let grammar = grammar(vec![Production::new(
            "A",
            choice([star(lit("ab")), opt(lit("cd")), and(any())]),
        )]);
        let analysis = Analysis::new(&grammar);
        let Expr::Choice(choice) = &grammar.get(grammar.start()).expr else {
            unreachable!()
        };
        assert!(synthesize_prediction(&grammar, &analysis, choice).is_none());

        let predicted = predict_choices(&grammar, &analysis);
        assert_eq!(predicted.get(predicted.start()).expr, grammar.get(grammar.start()).expr);
    }

    fn choice_of(alternatives: impl IntoIterator<Item = Expr>) -> Expr {
        choice(alternatives)
    }
}
