use std::{borrow::Cow, cell::RefCell, fmt::Display};

use thiserror::Error;

use crate::ir::{Expr, RcString};

pub type Message = Cow<'static, str>;

/// A problem with the grammar, naming the production and expression it was found in.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Diagnostic {
    pub production: Option<RcString>,
    pub expression: Option<String>,
    pub message: Message,
}

impl Diagnostic {
    pub fn new(message: impl Into<Message>) -> Diagnostic {
        Diagnostic {
            production: None,
            expression: None,
            message: message.into(),
        }
    }

    pub fn in_production(mut self, production: &str) -> Diagnostic {
        self.production = Some(production.into());
        self
    }

    pub fn at(mut self, production: &str, expr: &Expr) -> Diagnostic {
        self.production = Some(production.into());
        self.expression = Some(expr.to_string());
        self
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(production) = &self.production {
            write!(f, "production '{production}': ")?;
        }
        f.write_str(&self.message)?;
        if let Some(expression) = &self.expression {
            write!(f, " in `{expression}`")?;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct ErrorAccumulator {
    errors: RefCell<Vec<Diagnostic>>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn error_static(&self, production: &str, err: &'static str) {
        self.diagnostic(Diagnostic::new(err).in_production(production));
    }
    pub fn error(&self, production: &str, expr: &Expr, err: impl ToString) {
        self.diagnostic(Diagnostic::new(err.to_string()).at(production, expr));
    }
    pub fn diagnostic(&self, diagnostic: Diagnostic) {
        self.errors.borrow_mut().push(diagnostic);
    }
    pub fn get(&self) -> std::cell::Ref<'_, Vec<Diagnostic>> {
        self.errors.borrow()
    }
    pub fn into_error(self) -> LowerError {
        LowerError::Malformed(self.errors.into_inner())
    }
    /// Turns the collected errors into a result, `Ok` when nothing was reported.
    pub fn finish(self) -> Result<()> {
        let errors = self.errors.into_inner();
        match errors.is_empty() {
            true => Ok(()),
            false => Err(LowerError::Malformed(errors)),
        }
    }
}

#[derive(Error, Debug)]
pub enum LowerError {
    #[error("{}", DiagnosticList(.0))]
    Malformed(Vec<Diagnostic>),
    #[error("Invalid grammar file: {0}")]
    Input(#[from] serde_json::Error),
}

impl LowerError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            LowerError::Malformed(diagnostics) => diagnostics,
            LowerError::Input(_) => &[],
        }
    }
}

struct DiagnosticList<'a>(&'a [Diagnostic]);

impl Display for DiagnosticList<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, diagnostic) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

pub type Result<T> = std::result::Result<T, LowerError>;
