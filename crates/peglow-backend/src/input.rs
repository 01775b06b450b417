//! JSON grammar description, converted into a validated [`Grammar`].
//!
//! ```json
//! {
//!     "start": "File",
//!     "options": { "memoize": false },
//!     "productions": [
//!         { "name": "File", "expr": { "sequence": [{ "one_or_more": { "rule": "Digit" } }, { "not": "any" }] } },
//!         { "name": "Digit", "expr": { "set": [[48, 57]] } }
//!     ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::{
    byteset::ByteSet,
    error::{Diagnostic, ErrorAccumulator, Result},
    grammar::Grammar,
    ir::{Choice, Expr, Literal, Prediction, Production},
    options::LowerOptions,
};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GrammarDef {
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub options: LowerOptions,
    pub productions: Vec<ProductionDef>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProductionDef {
    pub name: String,
    pub expr: ExprDef,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprDef {
    Byte(u8),
    /// Inclusive ranges.
    Set(Vec<(u8, u8)>),
    Any,
    Literal(String),
    /// Literal given as raw bytes, for input which is not utf8.
    Bytes(Vec<u8>),
    Sequence(Vec<ExprDef>),
    Choice(Vec<ExprDef>),
    PredictedChoice(PredictedChoiceDef),
    ZeroOrMore(Box<ExprDef>),
    OneOrMore(Box<ExprDef>),
    Optional(Box<ExprDef>),
    And(Box<ExprDef>),
    Not(Box<ExprDef>),
    Rule(String),
    TreeNew {
        #[serde(default)]
        left_join: bool,
    },
    TreeCapture,
    TreeTag(String),
    TreeReplace(String),
    TreeLink {
        #[serde(default)]
        label: Option<String>,
        inner: Box<ExprDef>,
    },
    SymbolDefine {
        table: String,
        inner: Box<ExprDef>,
    },
    SymbolCheck {
        table: String,
        #[serde(default)]
        last_only: bool,
    },
    SymbolScope(Box<ExprDef>),
    FlagCheck {
        flag: String,
        #[serde(default)]
        negated: bool,
    },
    FlagSet {
        flag: String,
        value: bool,
        inner: Box<ExprDef>,
    },
    Empty,
    Fail,
}

/// A choice with a dispatch table, `table` lists `[first, last, case]` byte ranges and
/// bytes outside of every range fail immediately.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PredictedChoiceDef {
    pub alternatives: Vec<ExprDef>,
    pub cases: Vec<ExprDef>,
    pub table: Vec<(u8, u8, u16)>,
    #[serde(default)]
    pub at_end: Option<u16>,
}

impl GrammarDef {
    pub fn from_json(source: &str) -> Result<GrammarDef> {
        Ok(serde_json::from_str(source)?)
    }

    /// Converts every production, reporting all malformed nodes at once.
    pub fn into_grammar(self) -> Result<(Grammar, LowerOptions)> {
        let err = ErrorAccumulator::new();
        let productions = self
            .productions
            .into_iter()
            .map(|def| {
                let expr = def.expr.convert(&def.name, &err);
                Production::new(def.name, expr)
            })
            .collect::<Vec<_>>();
        err.finish()?;

        let grammar = Grammar::new(productions, self.start.as_deref())?;
        Ok((grammar, self.options))
    }
}

impl ExprDef {
    fn convert(&self, production: &str, err: &ErrorAccumulator) -> Expr {
        let convert_box = |inner: &ExprDef| Box::new(inner.convert(production, err));
        match self {
            ExprDef::Byte(byte) => Expr::Byte(*byte),
            ExprDef::Set(ranges) => Expr::Set(ByteSet::from_ranges(ranges)),
            ExprDef::Any => Expr::Any,
            ExprDef::Literal(text) => self.literal(text.as_bytes(), production, err),
            ExprDef::Bytes(bytes) => self.literal(bytes, production, err),
            ExprDef::Sequence(children) => Expr::Sequence(
                children
                    .iter()
                    .map(|c| c.convert(production, err))
                    .collect(),
            ),
            ExprDef::Choice(alternatives) => {
                let alternatives = alternatives
                    .iter()
                    .map(|c| c.convert(production, err))
                    .collect();
                match Choice::new(alternatives) {
                    Ok(choice) => Expr::Choice(choice),
                    Err(diagnostic) => self.reject(diagnostic, production, err),
                }
            }
            ExprDef::PredictedChoice(def) => self.predicted_choice(def, production, err),
            ExprDef::ZeroOrMore(inner) => Expr::ZeroOrMore(convert_box(inner)),
            ExprDef::OneOrMore(inner) => Expr::OneOrMore(convert_box(inner)),
            ExprDef::Optional(inner) => Expr::Optional(convert_box(inner)),
            ExprDef::And(inner) => Expr::And(convert_box(inner)),
            ExprDef::Not(inner) => Expr::Not(convert_box(inner)),
            ExprDef::Rule(name) => Expr::Rule(name.as_str().into()),
            ExprDef::TreeNew { left_join } => Expr::TreeNew {
                left_join: *left_join,
            },
            ExprDef::TreeCapture => Expr::TreeCapture,
            ExprDef::TreeTag(tag) => Expr::TreeTag(tag.as_str().into()),
            ExprDef::TreeReplace(value) => Expr::TreeReplace(value.as_str().into()),
            ExprDef::TreeLink { label, inner } => Expr::TreeLink {
                label: label.as_deref().map(Into::into),
                inner: convert_box(inner),
            },
            ExprDef::SymbolDefine { table, inner } => Expr::SymbolDefine {
                table: table.as_str().into(),
                inner: convert_box(inner),
            },
            ExprDef::SymbolCheck { table, last_only } => Expr::SymbolCheck {
                table: table.as_str().into(),
                last_only: *last_only,
            },
            ExprDef::SymbolScope(inner) => Expr::SymbolScope(convert_box(inner)),
            ExprDef::FlagCheck { flag, negated } => Expr::FlagCheck {
                flag: flag.as_str().into(),
                negated: *negated,
            },
            ExprDef::FlagSet { flag, value, inner } => Expr::FlagSet {
                flag: flag.as_str().into(),
                value: *value,
                inner: convert_box(inner),
            },
            ExprDef::Empty => Expr::Empty,
            ExprDef::Fail => Expr::Fail,
        }
    }

    fn literal(&self, bytes: &[u8], production: &str, err: &ErrorAccumulator) -> Expr {
        match Literal::new(bytes) {
            Ok(literal) => Expr::Literal(literal),
            Err(diagnostic) => self.reject(diagnostic, production, err),
        }
    }

    fn predicted_choice(
        &self,
        def: &PredictedChoiceDef,
        production: &str,
        err: &ErrorAccumulator,
    ) -> Expr {
        let convert_all = |exprs: &[ExprDef]| -> Vec<Expr> {
            exprs.iter().map(|c| c.convert(production, err)).collect()
        };

        let mut table = vec![None; 256];
        for &(first, last, case) in &def.table {
            for byte in first..=last {
                table[byte as usize] = Some(case);
            }
        }

        let choice = Choice::new(convert_all(&def.alternatives)).and_then(|choice| {
            let prediction = Prediction::new(convert_all(&def.cases), table, def.at_end)?;
            Ok(choice.with_prediction(prediction))
        });
        match choice {
            Ok(choice) => Expr::Choice(choice),
            Err(diagnostic) => self.reject(diagnostic, production, err),
        }
    }

    /// Reports the node and stands in `Fail` so conversion can continue.
    fn reject(&self, diagnostic: Diagnostic, production: &str, err: &ErrorAccumulator) -> Expr {
        let mut diagnostic = diagnostic.in_production(production);
        diagnostic.expression = serde_json::to_string(self).ok();
        err.diagnostic(diagnostic);
        Expr::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::build::*;

    #[test]
    fn test_convert() {
        let def = GrammarDef::from_json(
            r#"{
                "productions": [
                    { "name": "File", "expr": { "sequence": [{ "one_or_more": { "rule": "Digit" } }, { "not": "any" }] } },
                    { "name": "Digit", "expr": { "set": [[48, 57]] } },
                    { "name": "Node", "expr": { "tree_link": { "label": "lhs", "inner": { "tree_new": {} } } } },
                    { "name": "Sym", "expr": { "symbol_check": { "table": "T" } } }
                ]
            }"#,
        )
        .unwrap();
        let (grammar, options) = def.into_grammar().unwrap();

        assert_eq!(options, LowerOptions::default());
        assert_eq!(grammar.start().name(&grammar), "File");
        let file = grammar.get(grammar.start());
        assert_eq!(file.expr, seq([plus(rule("Digit")), not(any())]));
        let node = grammar.get(grammar.resolve("Node").unwrap());
        assert_eq!(node.expr, link(Some("lhs"), new_node()));
        let sym = grammar.get(grammar.resolve("Sym").unwrap());
        assert_eq!(sym.expr, isa("T"));
    }

    #[test]
    fn test_predicted_choice() {
        let def = GrammarDef::from_json(
            r#"{
                "productions": [
                    { "name": "A", "expr": { "predicted_choice": {
                        "alternatives": [{ "literal": "ab" }, { "literal": "cd" }],
                        "cases": [{ "literal": "ab" }, { "literal": "cd" }],
                        "table": [[97, 97, 0], [99, 99, 1]]
                    } } }
                ]
            }"#,
        )
        .unwrap();
        let (grammar, _) = def.into_grammar().unwrap();
        let Expr::Choice(choice) = &grammar.get(grammar.start()).expr else {
            panic!("expected a choice");
        };
        let prediction = choice.prediction().unwrap();
        assert_eq!(prediction.case(b'a'), Some(0));
        assert_eq!(prediction.case(b'c'), Some(1));
        assert_eq!(prediction.case(b'b'), None);
        assert_eq!(prediction.at_end(), None);
    }

    #[test]
    fn test_malformed_nodes() {
        let def = GrammarDef::from_json(
            r#"{
                "productions": [
                    { "name": "A", "expr": { "sequence": [{ "choice": [] }, { "literal": "" }] } },
                    { "name": "B", "expr": { "predicted_choice": {
                        "alternatives": ["any"], "cases": ["any"], "table": [[0, 0, 3]]
                    } } }
                ]
            }"#,
        )
        .unwrap();
        let error = def.into_grammar().unwrap_err();
        let messages: Vec<String> = error.diagnostics().iter().map(|d| d.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                r#"production 'A': Choice without alternatives in `{"choice":[]}`"#.to_owned(),
                r#"production 'A': Empty literal in `{"literal":""}`"#.to_owned(),
                r#"production 'B': Prediction table names case 3 but there are only 1 in `{"predicted_choice":{"alternatives":["any"],"cases":["any"],"table":[[0,0,3]],"at_end":null}}`"#.to_owned(),
            ]
        );
    }

    #[test]
    fn test_invalid_json() {
        let error = GrammarDef::from_json(r#"{ "productions": [{ "name": "A", "expr": "bogus" }] }"#)
            .unwrap_err();
        assert!(error.to_string().starts_with("Invalid grammar file:"));
    }
}
