use std::collections::HashMap;

use cranelift_entity::{entity_impl, PrimaryMap};

use crate::{
    error::{Diagnostic, ErrorAccumulator, Result},
    ir::{Expr, Production, RcString},
};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProductionHandle(u32);
entity_impl!(ProductionHandle, "production");

impl ProductionHandle {
    pub fn name(self, grammar: &Grammar) -> &str {
        &grammar.productions[self].name
    }
}

/// Validated list of productions.
///
/// Every [`Expr::Rule`] names a production of the grammar and production names are
/// unique, so lookups by name only fail for names from outside the grammar.
#[derive(Clone, Debug)]
pub struct Grammar {
    productions: PrimaryMap<ProductionHandle, Production>,
    names: HashMap<RcString, ProductionHandle>,
    start: ProductionHandle,
}

impl Grammar {
    /// Builds a grammar, `start` defaults to the first production.
    pub fn new(productions: Vec<Production>, start: Option<&str>) -> Result<Grammar> {
        let err = ErrorAccumulator::new();

        let mut names = HashMap::new();
        let mut map = PrimaryMap::new();
        for production in productions {
            let name = production.name.clone();
            let handle = map.push(production);
            if names.insert(name.clone(), handle).is_some() {
                err.error_static(&name, "Production is defined more than once");
            }
        }

        for (_, production) in map.iter() {
            check_references(production, &names, &err);
        }

        let resolved = match start {
            Some(name) => names.get(name).copied(),
            None => map.keys().next(),
        };
        let Some(start) = resolved else {
            let message = match start {
                Some(name) => format!("Start production '{name}' is not defined"),
                None => "Grammar has no productions".to_owned(),
            };
            err.diagnostic(Diagnostic::new(message));
            return Err(err.into_error());
        };

        err.finish()?;
        Ok(Grammar {
            productions: map,
            names,
            start,
        })
    }

    pub fn start(&self) -> ProductionHandle {
        self.start
    }

    pub fn get(&self, handle: ProductionHandle) -> &Production {
        &self.productions[handle]
    }

    pub fn resolve(&self, name: &str) -> Option<ProductionHandle> {
        self.names.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.productions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.productions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ProductionHandle, &Production)> + '_ {
        self.productions.iter()
    }

    pub fn handles(&self) -> impl Iterator<Item = ProductionHandle> + '_ {
        self.productions.keys()
    }

    /// Copy of the grammar with every production body replaced by `fun`'s result.
    pub fn map_bodies(&self, mut fun: impl FnMut(ProductionHandle, &Expr) -> Expr) -> Grammar {
        let mut productions = PrimaryMap::with_capacity(self.productions.len());
        for (handle, production) in self.productions.iter() {
            productions.push(Production {
                name: production.name.clone(),
                expr: fun(handle, &production.expr),
            });
        }

        Grammar {
            productions,
            names: self.names.clone(),
            start: self.start,
        }
    }
}

fn check_references(
    production: &Production,
    names: &HashMap<RcString, ProductionHandle>,
    err: &ErrorAccumulator,
) {
    production.expr.visit_nodes_top_down(|expr| {
        if let Expr::Rule(name) = expr {
            if !names.contains_key(name) {
                err.error(
                    &production.name,
                    expr,
                    format!("Reference to undefined production '{name}'"),
                );
            }
        }
    });
}
