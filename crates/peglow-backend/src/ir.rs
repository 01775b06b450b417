use std::fmt::{Display, Write};

use crate::{
    byteset::ByteSet,
    literal::Quoted,
    error::Diagnostic,
};

pub type RcString = Box<str>;

/// Parsing expression.
///
/// Values are immutable once built, equality and hashing are structural so identical
/// subexpressions compare equal wherever they occur.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Expr {
    Byte(u8),
    Set(ByteSet),
    Any,
    Literal(Literal),
    Sequence(Vec<Expr>),
    Choice(Choice),
    ZeroOrMore(Box<Expr>),
    OneOrMore(Box<Expr>),
    Optional(Box<Expr>),
    And(Box<Expr>),
    Not(Box<Expr>),
    Rule(RcString),
    TreeNew {
        left_join: bool,
    },
    TreeCapture,
    TreeTag(RcString),
    TreeReplace(RcString),
    TreeLink {
        label: Option<RcString>,
        inner: Box<Expr>,
    },
    SymbolDefine {
        table: RcString,
        inner: Box<Expr>,
    },
    SymbolCheck {
        table: RcString,
        last_only: bool,
    },
    SymbolScope(Box<Expr>),
    FlagCheck {
        flag: RcString,
        negated: bool,
    },
    FlagSet {
        flag: RcString,
        value: bool,
        inner: Box<Expr>,
    },
    Empty,
    Fail,
}

/// Non-empty byte string.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Literal(Box<[u8]>);

impl Literal {
    pub fn new(bytes: impl Into<Box<[u8]>>) -> Result<Literal, Diagnostic> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(Diagnostic::new("Empty literal"));
        }
        Ok(Literal(bytes))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Ordered choice with at least one alternative.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Choice {
    alternatives: Vec<Expr>,
    prediction: Option<Box<Prediction>>,
}

impl Choice {
    pub fn new(alternatives: Vec<Expr>) -> Result<Choice, Diagnostic> {
        if alternatives.is_empty() {
            return Err(Diagnostic::new("Choice without alternatives"));
        }
        Ok(Choice {
            alternatives,
            prediction: None,
        })
    }

    pub fn with_prediction(mut self, prediction: Prediction) -> Choice {
        self.prediction = Some(Box::new(prediction));
        self
    }

    pub fn alternatives(&self) -> &[Expr] {
        &self.alternatives
    }

    pub fn prediction(&self) -> Option<&Prediction> {
        self.prediction.as_deref()
    }
}

/// Maps the byte at the cursor to the only alternatives of a [`Choice`] which can match there.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Prediction {
    cases: Vec<Expr>,
    table: Box<[Option<u16>]>,
    at_end: Option<u16>,
}

impl Prediction {
    /// `table` has one bucket per byte value, each naming an index into `cases` or
    /// `None` for immediate failure. `at_end` is used when the input is exhausted.
    pub fn new(
        cases: Vec<Expr>,
        table: Vec<Option<u16>>,
        at_end: Option<u16>,
    ) -> Result<Prediction, Diagnostic> {
        if table.len() != 256 {
            return Err(Diagnostic::new(format!(
                "Prediction table has {} buckets instead of 256",
                table.len()
            )));
        }
        let out_of_range = table
            .iter()
            .chain(std::iter::once(&at_end))
            .flatten()
            .find(|&&case| case as usize >= cases.len());
        if let Some(case) = out_of_range {
            return Err(Diagnostic::new(format!(
                "Prediction table names case {case} but there are only {}",
                cases.len()
            )));
        }

        Ok(Prediction {
            cases,
            table: table.into_boxed_slice(),
            at_end,
        })
    }

    pub fn cases(&self) -> &[Expr] {
        &self.cases
    }

    pub fn case(&self, byte: u8) -> Option<u16> {
        self.table[byte as usize]
    }

    pub fn at_end(&self) -> Option<u16> {
        self.at_end
    }

    /// All bytes dispatched to `case`.
    pub fn bytes_of(&self, case: u16) -> ByteSet {
        (0..=255u8).filter(|&b| self.case(b) == Some(case)).collect()
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Production {
    pub name: RcString,
    pub expr: Expr,
}

impl Production {
    pub fn new(name: impl Into<RcString>, expr: Expr) -> Production {
        Production {
            name: name.into(),
            expr,
        }
    }
}

impl Expr {
    pub fn visit_nodes_top_down(&self, mut fun: impl FnMut(&Expr)) {
        self.visit_nodes_top_down_impl(&mut fun);
    }

    fn visit_nodes_top_down_impl(&self, fun: &mut dyn FnMut(&Expr)) {
        fun(self);
        self.for_each_child(|child| child.visit_nodes_top_down_impl(fun));
    }

    /// Calls `fun` on direct subexpressions, including prediction cases.
    pub fn for_each_child(&self, mut fun: impl FnMut(&Expr)) {
        match self {
            Expr::Sequence(children) => children.iter().for_each(fun),
            Expr::Choice(choice) => {
                choice.alternatives.iter().for_each(&mut fun);
                if let Some(prediction) = &choice.prediction {
                    prediction.cases.iter().for_each(fun);
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
            | Expr::FlagSet { inner, .. } => fun(inner.as_ref()),
            Expr::Byte(_)
            | Expr::Set(_)
            | Expr::Any
            | Expr::Literal(_)
            | Expr::Rule(_)
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

    /// Rebuilds the expression from the leaves up, passing every rebuilt node through `fun`.
    pub fn map_bottom_up(&self, fun: &mut dyn FnMut(Expr) -> Expr) -> Expr {
        fn boxed(inner: &Expr, fun: &mut dyn FnMut(Expr) -> Expr) -> Box<Expr> {
            Box::new(inner.map_bottom_up(fun))
        }

        let rebuilt = match self {
            Expr::Sequence(children) => {
                Expr::Sequence(children.iter().map(|c| c.map_bottom_up(fun)).collect())
            }
            Expr::Choice(choice) => Expr::Choice(Choice {
                alternatives: choice
                    .alternatives
                    .iter()
                    .map(|c| c.map_bottom_up(fun))
                    .collect(),
                prediction: choice.prediction.as_ref().map(|prediction| {
                    Box::new(Prediction {
                        cases: prediction
                            .cases
                            .iter()
                            .map(|c| c.map_bottom_up(fun))
                            .collect(),
                        table: prediction.table.clone(),
                        at_end: prediction.at_end,
                    })
                }),
            }),
            Expr::ZeroOrMore(inner) => Expr::ZeroOrMore(boxed(inner, fun)),
            Expr::OneOrMore(inner) => Expr::OneOrMore(boxed(inner, fun)),
            Expr::Optional(inner) => Expr::Optional(boxed(inner, fun)),
            Expr::And(inner) => Expr::And(boxed(inner, fun)),
            Expr::Not(inner) => Expr::Not(boxed(inner, fun)),
            Expr::SymbolScope(inner) => Expr::SymbolScope(boxed(inner, fun)),
            Expr::TreeLink { label, inner } => Expr::TreeLink {
                label: label.clone(),
                inner: boxed(inner, fun),
            },
            Expr::SymbolDefine { table, inner } => Expr::SymbolDefine {
                table: table.clone(),
                inner: boxed(inner, fun),
            },
            Expr::FlagSet { flag, value, inner } => Expr::FlagSet {
                flag: flag.clone(),
                value: *value,
                inner: boxed(inner, fun),
            },
            leaf => leaf.clone(),
        };
        fun(rebuilt)
    }

    /// Whether the expression only matches bytes, with no calls or side effects.
    pub fn is_terminal(&self) -> bool {
        match self {
            Expr::Byte(_) | Expr::Set(_) | Expr::Any | Expr::Literal(_) => true,
            Expr::Sequence(children) => {
                !children.is_empty() && children.iter().all(Expr::is_terminal)
            }
            Expr::Choice(choice) => choice.alternatives.iter().all(Expr::is_terminal),
            _ => false,
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Choice(choice) if choice.alternatives.len() > 1 => 0,
            Expr::Sequence(children) if children.len() > 1 => 1,
            Expr::And(_) | Expr::Not(_) => 2,
            Expr::ZeroOrMore(_) | Expr::OneOrMore(_) | Expr::Optional(_) => 3,
            _ => 4,
        }
    }

    fn display_with_precedence(&self, buf: &mut dyn Write, min: u8) -> std::fmt::Result {
        let parenthesize = self.precedence() < min;
        if parenthesize {
            buf.write_char('(')?;
        }
        self.display_into(buf)?;
        if parenthesize {
            buf.write_char(')')?;
        }
        Ok(())
    }

    /// Writes the expression in PEG notation.
    pub fn display_into(&self, buf: &mut dyn Write) -> std::fmt::Result {
        match self {
            Expr::Byte(byte) => write!(buf, "{}", Quoted::Byte(*byte)),
            Expr::Set(set) => write!(buf, "{}", set.ranges()),
            Expr::Any => buf.write_char('.'),
            Expr::Literal(literal) => write!(buf, "{}", Quoted::Literal(literal.bytes())),
            Expr::Sequence(children) => {
                if children.is_empty() {
                    return buf.write_str("()");
                }
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        buf.write_char(' ')?;
                    }
                    child.display_with_precedence(buf, 2)?;
                }
                Ok(())
            }
            Expr::Choice(choice) => {
                for (i, child) in choice.alternatives.iter().enumerate() {
                    if i > 0 {
                        buf.write_str(" / ")?;
                    }
                    child.display_with_precedence(buf, 1)?;
                }
                Ok(())
            }
            Expr::ZeroOrMore(inner) => {
                inner.display_with_precedence(buf, 4)?;
                buf.write_char('*')
            }
            Expr::OneOrMore(inner) => {
                inner.display_with_precedence(buf, 4)?;
                buf.write_char('+')
            }
            Expr::Optional(inner) => {
                inner.display_with_precedence(buf, 4)?;
                buf.write_char('?')
            }
            Expr::And(inner) => {
                buf.write_char('&')?;
                inner.display_with_precedence(buf, 3)
            }
            Expr::Not(inner) => {
                buf.write_char('!')?;
                inner.display_with_precedence(buf, 3)
            }
            Expr::Rule(name) => buf.write_str(name),
            Expr::TreeNew { left_join: false } => buf.write_str("<new>"),
            Expr::TreeNew { left_join: true } => buf.write_str("<new left>"),
            Expr::TreeCapture => buf.write_str("<capture>"),
            Expr::TreeTag(tag) => write!(buf, "#{tag}"),
            Expr::TreeReplace(value) => write!(buf, "`{value}`"),
            Expr::TreeLink { label, inner } => {
                buf.write_char('$')?;
                if let Some(label) = label {
                    buf.write_str(label)?;
                }
                buf.write_char('(')?;
                inner.display_into(buf)?;
                buf.write_char(')')
            }
            Expr::SymbolDefine { table, inner } => {
                write!(buf, "<def {table} ")?;
                inner.display_into(buf)?;
                buf.write_char('>')
            }
            Expr::SymbolCheck {
                table,
                last_only: true,
            } => write!(buf, "<is {table}>"),
            Expr::SymbolCheck {
                table,
                last_only: false,
            } => write!(buf, "<isa {table}>"),
            Expr::SymbolScope(inner) => {
                buf.write_str("<scope ")?;
                inner.display_into(buf)?;
                buf.write_char('>')
            }
            Expr::FlagCheck { flag, negated } => {
                let not = if *negated { "!" } else { "" };
                write!(buf, "<if {not}{flag}>")
            }
            Expr::FlagSet { flag, value, inner } => {
                let not = if *value { "" } else { "!" };
                write!(buf, "<on {not}{flag} ")?;
                inner.display_into(buf)?;
                buf.write_char('>')
            }
            Expr::Empty => buf.write_str("''"),
            Expr::Fail => buf.write_str("<fail>"),
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.display_into(f)
    }
}

/// Shorthands for building expressions in code.
///
/// Unlike the validating constructors these never fail, degenerate input is mapped to
/// the expression with the same meaning: an empty choice never matches and an empty
/// literal always does.
pub mod build {
    use super::*;

    pub fn byte(byte: u8) -> Expr {
        Expr::Byte(byte)
    }

    pub fn set(ranges: &[(u8, u8)]) -> Expr {
        Expr::Set(ByteSet::from_ranges(ranges))
    }

    pub fn any() -> Expr {
        Expr::Any
    }

    pub fn lit(text: &str) -> Expr {
        match Literal::new(text.as_bytes()) {
            Ok(literal) => Expr::Literal(literal),
            Err(_) => Expr::Empty,
        }
    }

    pub fn seq(children: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Sequence(children.into_iter().collect())
    }

    pub fn choice(alternatives: impl IntoIterator<Item = Expr>) -> Expr {
        match Choice::new(alternatives.into_iter().collect()) {
            Ok(choice) => Expr::Choice(choice),
            Err(_) => Expr::Fail,
        }
    }

    pub fn star(inner: Expr) -> Expr {
        Expr::ZeroOrMore(Box::new(inner))
    }

    pub fn plus(inner: Expr) -> Expr {
        Expr::OneOrMore(Box::new(inner))
    }

    pub fn opt(inner: Expr) -> Expr {
        Expr::Optional(Box::new(inner))
    }

    pub fn and(inner: Expr) -> Expr {
        Expr::And(Box::new(inner))
    }

    pub fn not(inner: Expr) -> Expr {
        Expr::Not(Box::new(inner))
    }

    pub fn rule(name: &str) -> Expr {
        Expr::Rule(name.into())
    }

    pub fn new_node() -> Expr {
        Expr::TreeNew { left_join: false }
    }

    pub fn fold_node() -> Expr {
        Expr::TreeNew { left_join: true }
    }

    pub fn capture() -> Expr {
        Expr::TreeCapture
    }

    pub fn tag(tag: &str) -> Expr {
        Expr::TreeTag(tag.into())
    }

    pub fn replace(value: &str) -> Expr {
        Expr::TreeReplace(value.into())
    }

    pub fn link(label: Option<&str>, inner: Expr) -> Expr {
        Expr::TreeLink {
            label: label.map(Into::into),
            inner: Box::new(inner),
        }
    }

    /// `<new> inner #tag <capture>`, the usual shape of a node.
    pub fn node(tag_name: &str, inner: Expr) -> Expr {
        seq([new_node(), inner, tag(tag_name), capture()])
    }

    pub fn define(table: &str, inner: Expr) -> Expr {
        Expr::SymbolDefine {
            table: table.into(),
            inner: Box::new(inner),
        }
    }

    pub fn is(table: &str) -> Expr {
        Expr::SymbolCheck {
            table: table.into(),
            last_only: true,
        }
    }

    pub fn isa(table: &str) -> Expr {
        Expr::SymbolCheck {
            table: table.into(),
            last_only: false,
        }
    }

    pub fn scope(inner: Expr) -> Expr {
        Expr::SymbolScope(Box::new(inner))
    }

    pub fn if_flag(flag: &str) -> Expr {
        Expr::FlagCheck {
            flag: flag.into(),
            negated: false,
        }
    }

    pub fn if_not_flag(flag: &str) -> Expr {
        Expr::FlagCheck {
            flag: flag.into(),
            negated: true,
        }
    }

    pub fn empty() -> Expr {
        Expr::Empty
    }

    pub fn fail() -> Expr {
        Expr::Fail
    }

    pub fn on(flag: &str, value: bool, inner: Expr) -> Expr {
        Expr::FlagSet {
            flag: flag.into(),
            value,
            inner: Box::new(inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::build::*;
    use super::*;

    #[test]
    fn test_display() {
        let expr = seq([
            choice([seq([byte(b'a'), byte(b'b')]), lit("ac")]),
            star(set(&[(b'0', b'9')])),
            not(any()),
        ]);
        assert_eq!(expr.to_string(), "('a' 'b' / \"ac\") [0-9]* !.");

        let expr = link(Some("lhs"), node("Num", plus(rule("Digit"))));
        assert_eq!(expr.to_string(), "$lhs(<new> Digit+ #Num <capture>)");

        assert_eq!(on("F", false, is("T")).to_string(), "<on !F <is T>>");
    }

    #[test]
    fn test_structural_identity() {
        let a = choice([byte(b'a'), rule("B")]);
        let b = choice([byte(b'a'), rule("B")]);
        assert_eq!(a, b);
        assert_ne!(a, choice([rule("B"), byte(b'a')]));
    }

    #[test]
    fn test_validating_constructors() {
        assert!(Choice::new(Vec::new()).is_err());
        assert!(Literal::new(Vec::new()).is_err());
        assert_eq!(choice([]), Expr::Fail);
        assert_eq!(lit(""), Expr::Empty);

        let cases = vec![byte(b'a')];
        assert!(Prediction::new(cases.clone(), vec![None; 255], None).is_err());

        let mut table = vec![None; 256];
        table[b'a' as usize] = Some(1);
        assert!(Prediction::new(cases.clone(), table.clone(), None).is_err());

        table[b'a' as usize] = Some(0);
        let prediction = Prediction::new(cases, table, None).unwrap();
        assert_eq!(prediction.case(b'a'), Some(0));
        assert_eq!(prediction.bytes_of(0), ByteSet::from_byte(b'a'));
    }

    #[test]
    fn test_is_terminal() {
        assert!(choice([byte(b'a'), seq([lit("x"), set(&[(b'0', b'1')])])]).is_terminal());
        assert!(!seq([byte(b'a'), rule("B")]).is_terminal());
        assert!(!seq([]).is_terminal());
    }
}
