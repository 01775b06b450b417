use std::collections::HashSet;

use cranelift_entity::PrimaryMap;

use crate::{
    analysis::{Analysis, AstShape, Effects, Slots},
    code::{
        statement_count, Block, DispatchArm, Effect, Flow, LoweredFunction, LoweredGrammar,
        ScopeHandle, ScopeKind, Statement, Terminal, Test, VariableHandle, VariableKind,
    },
    continuation::ContinuationStack,
    error::{Diagnostic, ErrorAccumulator, Result},
    grammar::{Grammar, ProductionHandle},
    ir::{Choice, Expr, Prediction, RcString},
    memo::MemoPlan,
    optimize,
    options::LowerOptions,
};

/// Saved state a recovery point restores.
struct Snapshot {
    position: VariableHandle,
    mark: Option<VariableHandle>,
    savepoint: Option<VariableHandle>,
}

/// State of lowering one production.
///
/// Every expression is lowered with the convention that it falls through on success
/// and jumps to [`ContinuationStack::peek`] on failure.
pub struct LowerCx<'a> {
    grammar: &'a Grammar,
    analysis: &'a Analysis,
    options: &'a LowerOptions,
    production: ProductionHandle,
    scopes: PrimaryMap<ScopeHandle, ScopeKind>,
    variables: PrimaryMap<VariableHandle, VariableKind>,
    continuations: ContinuationStack,
}

type LowerResult<T = ()> = std::result::Result<T, Diagnostic>;

impl<'a> LowerCx<'a> {
    pub fn new(
        grammar: &'a Grammar,
        analysis: &'a Analysis,
        options: &'a LowerOptions,
        production: ProductionHandle,
    ) -> LowerCx<'a> {
        LowerCx {
            grammar,
            analysis,
            options,
            production,
            scopes: PrimaryMap::new(),
            variables: PrimaryMap::new(),
            continuations: ContinuationStack::new(),
        }
    }

    fn scope(&mut self, kind: ScopeKind) -> ScopeHandle {
        self.scopes.push(kind)
    }

    fn variable(&mut self, kind: VariableKind, out: &mut Block) -> VariableHandle {
        let variable = self.variables.push(kind);
        out.push(Statement::Let(variable, kind));
        variable
    }

    fn fail(&self) -> Flow {
        self.continuations.peek()
    }

    fn error(&self, expr: &Expr, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(message.into()).at(self.production.name(self.grammar), expr)
    }

    /// Jumps to the failure target unless `test` holds.
    fn test(&self, test: Test, out: &mut Block) {
        out.push(Statement::If {
            test,
            negate: true,
            then: vec![Statement::Jump(self.fail())],
        });
    }

    fn effects(&self, expr: &Expr) -> Effects {
        self.analysis.effects(self.grammar, expr)
    }

    fn snapshot(&mut self, effects: Effects, out: &mut Block) -> Snapshot {
        let position = self.variable(VariableKind::Position, out);
        let mark = match self.options.tree && effects.contains(Effects::WritesTree) {
            true => Some(self.variable(VariableKind::AstMark, out)),
            false => None,
        };
        let savepoint = match effects.contains(Effects::WritesSymbols) {
            true => Some(self.variable(VariableKind::SymbolSavepoint, out)),
            false => None,
        };
        Snapshot {
            position,
            mark,
            savepoint,
        }
    }

    fn restore(&self, snapshot: &Snapshot, out: &mut Block) {
        out.push(Statement::Effect(Effect::Restore(snapshot.position)));
        if let Some(mark) = snapshot.mark {
            out.push(Statement::Effect(Effect::AstAbort(mark)));
        }
        if let Some(savepoint) = snapshot.savepoint {
            out.push(Statement::Effect(Effect::SymbolRollback(savepoint)));
        }
    }

    fn slot(&self, slots: &Slots, name: &str, expr: &Expr) -> LowerResult<u32> {
        slots
            .get(name)
            .ok_or_else(|| self.error(expr, format!("No slot assigned to '{name}'")))
    }

    /// Terminal form for the peephole specializations, `None` falls back to the general rule.
    fn specialized(&self, inner: &Expr) -> Option<Terminal> {
        if !self.options.optimize {
            return None;
        }
        let terminal = optimize::terminal(self.grammar, inner, true);
        if terminal.is_none() && inner.is_terminal() {
            log::trace!("No single terminal test for `{inner}`");
        }
        terminal
    }

    pub fn lower(&mut self, expr: &Expr, out: &mut Block) -> LowerResult {
        let depth = self.continuations.depth();
        self.lower_expr(expr, out)?;
        debug_assert_eq!(
            depth,
            self.continuations.depth(),
            "Unbalanced failure targets after `{expr}`"
        );
        Ok(())
    }

    fn lower_expr(&mut self, expr: &Expr, out: &mut Block) -> LowerResult {
        match expr {
            Expr::Byte(_) | Expr::Set(_) | Expr::Any | Expr::Literal(_) => {
                match optimize::base_terminal(expr) {
                    Some(terminal) => self.test(Test::Match(terminal), out),
                    None => out.push(Statement::Jump(self.fail())),
                }
            }
            Expr::Sequence(children) => {
                for child in children {
                    self.lower(child, out)?;
                }
            }
            Expr::Choice(choice) => self.lower_choice(choice, true, out)?,
            Expr::ZeroOrMore(inner) => self.lower_zero_or_more(inner, out)?,
            Expr::OneOrMore(inner) => {
                match self.specialized(inner) {
                    Some(terminal) => self.test(Test::Match(terminal), out),
                    None => self.lower(inner, out)?,
                }
                self.lower_zero_or_more(inner, out)?;
            }
            Expr::Optional(inner) => self.lower_optional(inner, out)?,
            Expr::And(inner) => self.lower_and(inner, out)?,
            Expr::Not(inner) => self.lower_not(inner, out)?,
            Expr::Rule(name) => {
                let Some(handle) = self.grammar.resolve(name) else {
                    return Err(self.error(expr, format!("Undefined production '{name}'")));
                };
                self.test(Test::Call(handle), out);
            }
            Expr::TreeNew { left_join } => {
                if self.options.tree {
                    let left_join = *left_join;
                    out.push(Statement::Effect(Effect::AstNew { left_join }));
                }
            }
            Expr::TreeCapture => {
                if self.options.tree {
                    out.push(Statement::Effect(Effect::AstCapture));
                }
            }
            Expr::TreeTag(tag) => {
                if self.options.tree {
                    let symbol = self.slot(&self.analysis.strings, tag, expr)?;
                    out.push(Statement::Effect(Effect::AstTag(symbol)));
                }
            }
            Expr::TreeReplace(value) => {
                if self.options.tree {
                    let symbol = self.slot(&self.analysis.strings, value, expr)?;
                    out.push(Statement::Effect(Effect::AstReplace(symbol)));
                }
            }
            Expr::TreeLink { label, inner } => match self.options.tree {
                true => self.lower_link(label.as_deref(), inner, expr, out)?,
                false => self.lower(inner, out)?,
            },
            Expr::SymbolDefine { table, inner } => {
                let table = self.slot(&self.analysis.tables, table, expr)?;
                let savepoint = self.variable(VariableKind::SymbolSavepoint, out);
                let start = self.variable(VariableKind::Position, out);
                self.guarded(
                    inner,
                    vec![Statement::Effect(Effect::SymbolDefine { table, start })],
                    vec![Statement::Effect(Effect::SymbolRollback(savepoint))],
                    true,
                    out,
                )?;
            }
            Expr::SymbolCheck { table, last_only } => {
                let table = self.slot(&self.analysis.tables, table, expr)?;
                let last_only = *last_only;
                self.test(Test::SymbolMatch { table, last_only }, out);
            }
            Expr::SymbolScope(inner) => {
                let savepoint = self.variable(VariableKind::SymbolSavepoint, out);
                let rollback = vec![Statement::Effect(Effect::SymbolRollback(savepoint))];
                self.guarded(inner, rollback.clone(), rollback, true, out)?;
            }
            Expr::FlagCheck { flag, negated } => {
                let flag = self.slot(&self.analysis.flags, flag, expr)?;
                out.push(Statement::If {
                    test: Test::Flag(flag),
                    negate: !*negated,
                    then: vec![Statement::Jump(self.fail())],
                });
            }
            Expr::FlagSet { flag, value, inner } => {
                let flag = self.slot(&self.analysis.flags, flag, expr)?;
                self.lower(inner, out)?;
                let value = *value;
                out.push(Statement::Effect(Effect::SetFlag { flag, value }));
            }
            Expr::Empty => {}
            Expr::Fail => out.push(Statement::Jump(self.fail())),
        }
        Ok(())
    }

    /// Emits `'exit: { 'attempt: { inner; on_success; break 'exit } on_failure; fail }`,
    /// the final failure jump is left out when `propagate` is false.
    fn guarded(
        &mut self,
        inner: &Expr,
        on_success: Block,
        on_failure: Block,
        propagate: bool,
        out: &mut Block,
    ) -> LowerResult {
        let exit = self.scope(ScopeKind::Block);
        let attempt = self.scope(ScopeKind::Block);

        let mut attempt_body = Vec::new();
        self.continuations.push(Flow::Break(attempt));
        self.lower(inner, &mut attempt_body)?;
        attempt_body.extend(on_success);
        attempt_body.push(Statement::Jump(Flow::Break(exit)));

        let mut exit_body = vec![Statement::Block(attempt, attempt_body)];
        exit_body.extend(on_failure);
        if propagate {
            exit_body.push(Statement::Jump(self.continuations.peek_parent()));
        }
        self.continuations.pop(Flow::Break(attempt));

        out.push(Statement::Block(exit, exit_body));
        Ok(())
    }

    fn lower_choice(&mut self, choice: &Choice, predict: bool, out: &mut Block) -> LowerResult {
        if self.options.optimize {
            match optimize::choice_byte_set(self.grammar, choice, 0) {
                Some(set) => {
                    match optimize::set_terminal(&set) {
                        Some(terminal) => self.test(Test::Match(terminal), out),
                        None => out.push(Statement::Jump(self.fail())),
                    }
                    return Ok(());
                }
                None => log::trace!("Choice is not a byte set: `{}`", Expr::Choice(choice.clone())),
            }
        }
        if predict && self.options.predict {
            if let Some(prediction) = choice.prediction() {
                return self.lower_dispatch(prediction, out);
            }
        }

        let alternatives = choice.alternatives();
        if let [single] = alternatives {
            return self.lower(single, out);
        }

        let effects = self.analysis.effects_of(self.grammar, alternatives);
        let snapshot = self.snapshot(effects, out);
        let exit = self.scope(ScopeKind::Block);

        let mut exit_body = Vec::new();
        for alternative in alternatives {
            let attempt = self.scope(ScopeKind::Block);
            let mut attempt_body = Vec::new();
            self.continuations.push(Flow::Break(attempt));
            self.lower(alternative, &mut attempt_body)?;
            self.continuations.pop(Flow::Break(attempt));
            attempt_body.push(Statement::Jump(Flow::Break(exit)));

            exit_body.push(Statement::Block(attempt, attempt_body));
            self.restore(&snapshot, &mut exit_body);
        }
        exit_body.push(Statement::Jump(self.fail()));

        out.push(Statement::Block(exit, exit_body));
        Ok(())
    }

    fn lower_dispatch(&mut self, prediction: &Prediction, out: &mut Block) -> LowerResult {
        let mut arms = Vec::new();
        for (index, case) in prediction.cases().iter().enumerate() {
            let index = index as u16;
            let bytes = prediction.bytes_of(index).ranges();
            let at_end = prediction.at_end() == Some(index);
            if bytes.is_empty() && !at_end {
                continue;
            }

            let mut body = Vec::new();
            match case {
                Expr::Choice(choice) => self.lower_choice(choice, false, &mut body)?,
                _ => self.lower(case, &mut body)?,
            }
            arms.push(DispatchArm {
                bytes,
                at_end,
                body,
            });
        }

        out.push(Statement::Dispatch {
            arms,
            otherwise: vec![Statement::Jump(self.fail())],
        });
        Ok(())
    }

    fn lower_zero_or_more(&mut self, inner: &Expr, out: &mut Block) -> LowerResult {
        let repeat = self.scope(ScopeKind::Loop);
        let mut body = Vec::new();

        if let Some(terminal) = self.specialized(inner) {
            body.push(Statement::If {
                test: Test::Match(terminal),
                negate: true,
                then: vec![Statement::Jump(Flow::Break(repeat))],
            });
            out.push(Statement::Loop(repeat, body));
            return Ok(());
        }

        let snapshot = self.snapshot(self.effects(inner), &mut body);
        let attempt = self.scope(ScopeKind::Block);
        let mut attempt_body = Vec::new();
        self.continuations.push(Flow::Break(attempt));
        self.lower(inner, &mut attempt_body)?;
        self.continuations.pop(Flow::Break(attempt));
        if self.analysis.first(self.grammar, inner).nullable {
            // a match which consumed nothing would repeat forever
            attempt_body.push(Statement::If {
                test: Test::Advanced(snapshot.position),
                negate: true,
                then: vec![Statement::Jump(Flow::Break(repeat))],
            });
        }
        attempt_body.push(Statement::Jump(Flow::Continue(repeat)));

        body.push(Statement::Block(attempt, attempt_body));
        self.restore(&snapshot, &mut body);
        body.push(Statement::Jump(Flow::Break(repeat)));

        out.push(Statement::Loop(repeat, body));
        Ok(())
    }

    fn lower_optional(&mut self, inner: &Expr, out: &mut Block) -> LowerResult {
        if let Some(terminal) = self.specialized(inner) {
            out.push(Statement::If {
                test: Test::Match(terminal),
                negate: false,
                then: Vec::new(),
            });
            return Ok(());
        }

        let snapshot = self.snapshot(self.effects(inner), out);
        let mut on_failure = Vec::new();
        self.restore(&snapshot, &mut on_failure);
        self.guarded(inner, Vec::new(), on_failure, false, out)
    }

    fn lower_and(&mut self, inner: &Expr, out: &mut Block) -> LowerResult {
        if let Some(terminal) = self.specialized(inner) {
            self.test(Test::Peek(terminal), out);
            return Ok(());
        }

        let snapshot = self.snapshot(self.effects(inner), out);
        let mut restore = Vec::new();
        self.restore(&snapshot, &mut restore);
        self.guarded(inner, restore.clone(), restore, true, out)
    }

    fn lower_not(&mut self, inner: &Expr, out: &mut Block) -> LowerResult {
        if let Some(terminal) = self.specialized(inner) {
            out.push(Statement::If {
                test: Test::Peek(terminal),
                negate: false,
                then: vec![Statement::Jump(self.fail())],
            });
            return Ok(());
        }

        let snapshot = self.snapshot(self.effects(inner), out);
        let attempt = self.scope(ScopeKind::Block);
        let mut attempt_body = Vec::new();
        self.continuations.push(Flow::Break(attempt));
        self.lower(inner, &mut attempt_body)?;
        self.restore(&snapshot, &mut attempt_body);
        attempt_body.push(Statement::Jump(self.continuations.peek_parent()));
        self.continuations.pop(Flow::Break(attempt));

        out.push(Statement::Block(attempt, attempt_body));
        self.restore(&snapshot, out);
        Ok(())
    }

    fn lower_link(
        &mut self,
        label: Option<&str>,
        inner: &Expr,
        expr: &Expr,
        out: &mut Block,
    ) -> LowerResult {
        let label = match label {
            Some(label) => Some(self.slot(&self.analysis.strings, label, expr)?),
            None => None,
        };
        let mark = self.variable(VariableKind::AstMark, out);
        self.guarded(
            inner,
            vec![Statement::Effect(Effect::AstCommitLink { mark, label })],
            vec![Statement::Effect(Effect::AstAbort(mark))],
            true,
            out,
        )
    }

    /// Lowers the whole production into a function body.
    pub fn lower_production(
        mut self,
        memo_slot: Option<u32>,
        name: RcString,
    ) -> LowerResult<LoweredFunction> {
        let mut body = Vec::new();

        let memo = match memo_slot {
            Some(slot) => {
                body.push(Statement::MemoLookup { slot });
                let start = self.variable(VariableKind::Position, &mut body);
                let shape = self.analysis.production(self.production).shape;
                let mark = match self.options.tree && shape == AstShape::SingleLink {
                    true => Some(self.variable(VariableKind::AstMark, &mut body)),
                    false => None,
                };
                Some((slot, start, mark))
            }
            None => None,
        };

        let fail = self.scope(ScopeKind::Block);
        let mut inner = Vec::new();
        self.continuations.push(Flow::Break(fail));
        let grammar = self.grammar;
        self.lower(&grammar.get(self.production).expr, &mut inner)?;
        self.continuations.pop(Flow::Break(fail));
        debug_assert!(self.continuations.is_empty());

        if let Some((slot, start, mark)) = memo {
            inner.push(Statement::Effect(Effect::MemoSuccess { slot, start, mark }));
        }
        inner.push(Statement::Jump(Flow::Return(true)));
        body.push(Statement::Block(fail, inner));
        if let Some((slot, start, _)) = memo {
            body.push(Statement::Effect(Effect::MemoFailure { slot, start }));
        }
        body.push(Statement::Jump(Flow::Return(false)));

        Ok(LoweredFunction {
            production: self.production,
            name,
            memo_slot,
            scopes: self.scopes,
            variables: self.variables,
            body,
        })
    }
}

/// Name of the generated function, sanitized into an identifier and made unique.
fn function_names(grammar: &Grammar) -> Vec<RcString> {
    let mut taken = HashSet::new();
    grammar
        .iter()
        .map(|(handle, production)| {
            let mut name: String = production
                .name
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
                .collect();
            if !taken.insert(name.clone()) {
                name = format!("{name}_{}", handle.as_u32());
                taken.insert(name.clone());
            }
            name.into_boxed_str()
        })
        .collect()
}

/// Lowers every production, stopping with all diagnostics if any of them fails.
pub fn lower_grammar(
    grammar: &Grammar,
    analysis: &Analysis,
    options: &LowerOptions,
    memo: &MemoPlan,
) -> Result<LoweredGrammar> {
    let err = ErrorAccumulator::new();
    let mut functions = PrimaryMap::with_capacity(grammar.len());

    for ((handle, production), name) in grammar.iter().zip(function_names(grammar)) {
        let cx = LowerCx::new(grammar, analysis, options, handle);
        match cx.lower_production(memo.slot(handle), name) {
            Ok(function) => {
                log::debug!(
                    "Lowered '{}' into {} statements{}",
                    production.name,
                    statement_count(&function.body),
                    if function.memo_slot.is_some() { ", memoized" } else { "" }
                );
                functions.push(function);
            }
            Err(diagnostic) => err.diagnostic(diagnostic),
        }
    }
    err.finish()?;

    Ok(LoweredGrammar {
        functions,
        start: grammar.start(),
        options: *options,
        flag_count: analysis.flags.len(),
        memo_count: memo.count(),
        tables: analysis.tables.names().to_vec(),
        symbols: analysis.strings.names().to_vec(),
    })
}
