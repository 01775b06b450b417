//! Direct interpretation of lowered code against the runtime.
//!
//! Behaves exactly like the rendered Rust would, which makes it possible to test the
//! lowering without compiling the generated parser.

use peglow_runtime::{AstMark, Context, Outcome, Symbol, SymbolSavepoint};

use crate::{
    code::{
        Block, Effect, Flow, LoweredGrammar, ScopeHandle, Statement, Terminal, Test,
        VariableHandle, VariableKind,
    },
    grammar::ProductionHandle,
};

/// How control leaves a statement.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Signal {
    Normal,
    Break(ScopeHandle),
    Continue(ScopeHandle),
    Return(bool),
}

impl From<Flow> for Signal {
    fn from(flow: Flow) -> Signal {
        match flow {
            Flow::Break(scope) => Signal::Break(scope),
            Flow::Continue(scope) => Signal::Continue(scope),
            Flow::Return(value) => Signal::Return(value),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Value {
    Position(u32),
    Mark(AstMark),
    Savepoint(SymbolSavepoint),
}

struct Frame {
    values: Vec<Option<Value>>,
}

impl Frame {
    fn get(&self, variable: VariableHandle) -> Value {
        match self.values[variable.as_u32() as usize] {
            Some(value) => value,
            None => panic!("Variable {variable} used before it was assigned"),
        }
    }

    fn position(&self, variable: VariableHandle) -> u32 {
        match self.get(variable) {
            Value::Position(position) => position,
            other => panic!("Variable {variable} holds {other:?}, not a position"),
        }
    }

    fn mark(&self, variable: VariableHandle) -> AstMark {
        match self.get(variable) {
            Value::Mark(mark) => mark,
            other => panic!("Variable {variable} holds {other:?}, not a tree mark"),
        }
    }

    fn savepoint(&self, variable: VariableHandle) -> SymbolSavepoint {
        match self.get(variable) {
            Value::Savepoint(savepoint) => savepoint,
            other => panic!("Variable {variable} holds {other:?}, not a symbol savepoint"),
        }
    }
}

/// Parses `input` starting from the start production.
pub fn parse(lowered: &LoweredGrammar, input: &[u8]) -> Outcome {
    let mut cx = Context::new(input, lowered.flag_count, lowered.memo_count);
    let success = call(lowered, lowered.start, &mut cx);
    cx.finish(success)
}

/// Runs the function of `production` with the cursor wherever `cx` has it.
pub fn call(lowered: &LoweredGrammar, production: ProductionHandle, cx: &mut Context) -> bool {
    let function = &lowered.functions[production];
    let mut frame = Frame {
        values: vec![None; function.variables.len()],
    };
    match block(lowered, &function.body, &mut frame, cx) {
        Signal::Return(value) => value,
        signal => {
            log::warn!("Function '{}' exited with {signal:?}", function.name);
            false
        }
    }
}

fn block(lowered: &LoweredGrammar, body: &Block, frame: &mut Frame, cx: &mut Context) -> Signal {
    for item in body {
        let signal = statement(lowered, item, frame, cx);
        if signal != Signal::Normal {
            return signal;
        }
    }
    Signal::Normal
}

fn statement(
    lowered: &LoweredGrammar,
    statement: &Statement,
    frame: &mut Frame,
    cx: &mut Context,
) -> Signal {
    match statement {
        Statement::Let(variable, kind) => {
            let value = match kind {
                VariableKind::Position => Value::Position(cx.position()),
                VariableKind::AstMark => Value::Mark(cx.ast_mark()),
                VariableKind::SymbolSavepoint => Value::Savepoint(cx.symbol_savepoint()),
            };
            frame.values[variable.as_u32() as usize] = Some(value);
            Signal::Normal
        }
        Statement::Effect(effect) => {
            apply(effect, frame, cx);
            Signal::Normal
        }
        Statement::If { test, negate, then } => match evaluate(lowered, test, frame, cx) != *negate {
            true => block(lowered, then, frame, cx),
            false => Signal::Normal,
        },
        Statement::Block(scope, body) => match block(lowered, body, frame, cx) {
            Signal::Break(target) if target == *scope => Signal::Normal,
            signal => signal,
        },
        Statement::Loop(scope, body) => loop {
            match block(lowered, body, frame, cx) {
                Signal::Normal => {}
                Signal::Continue(target) if target == *scope => {}
                Signal::Break(target) if target == *scope => return Signal::Normal,
                signal => return signal,
            }
        },
        Statement::Dispatch { arms, otherwise } => {
            let next = cx.peek();
            let arm = arms.iter().find(|arm| match next {
                Some(byte) => arm.bytes.contains(byte),
                None => arm.at_end,
            });
            match arm {
                Some(arm) => block(lowered, &arm.body, frame, cx),
                None => block(lowered, otherwise, frame, cx),
            }
        }
        Statement::MemoLookup { slot } => match cx.memo_get(*slot) {
            Some(entry) => Signal::Return(cx.memo_replay(entry)),
            None => Signal::Normal,
        },
        Statement::Jump(flow) => Signal::from(*flow),
    }
}

fn apply(effect: &Effect, frame: &Frame, cx: &mut Context) {
    match *effect {
        Effect::Restore(position) => cx.set_position(frame.position(position)),
        Effect::AstAbort(mark) => cx.ast_abort(frame.mark(mark)),
        Effect::SymbolRollback(savepoint) => cx.symbol_rollback(frame.savepoint(savepoint)),
        Effect::AstNew { left_join } => cx.ast_new(left_join),
        Effect::AstCapture => cx.ast_capture(),
        Effect::AstTag(tag) => cx.ast_tag(Symbol(tag)),
        Effect::AstReplace(value) => cx.ast_replace(Symbol(value)),
        Effect::AstCommitLink { mark, label } => {
            cx.ast_commit_link(frame.mark(mark), label.map(Symbol))
        }
        Effect::SymbolDefine { table, start } => cx.symbol_define(table, frame.position(start)),
        Effect::SetFlag { flag, value } => cx.set_flag(flag, value),
        Effect::MemoSuccess { slot, start, mark } => {
            let mark = mark.map(|mark| frame.mark(mark));
            cx.memo_success(slot, frame.position(start), mark)
        }
        Effect::MemoFailure { slot, start } => cx.memo_failure(slot, frame.position(start)),
    }
}

fn evaluate(lowered: &LoweredGrammar, test: &Test, frame: &Frame, cx: &mut Context) -> bool {
    match test {
        Test::Match(terminal) => match terminal {
            Terminal::Byte(byte) => cx.byte(*byte),
            Terminal::Ranges(ranges) => cx.byte_if(|b| ranges.contains(b)),
            Terminal::Any => cx.any_byte(),
            Terminal::Bytes(bytes) => cx.bytes(bytes),
        },
        Test::Peek(terminal) => match terminal {
            Terminal::Byte(byte) => cx.lookahead_if(|b| b == *byte),
            Terminal::Ranges(ranges) => cx.lookahead_if(|b| ranges.contains(b)),
            Terminal::Any => !cx.is_eof(),
            Terminal::Bytes(bytes) => cx.lookahead_bytes(bytes),
        },
        Test::Call(production) => call(lowered, *production, cx),
        Test::Flag(flag) => cx.flag(*flag),
        Test::SymbolMatch { table, last_only } => cx.symbol_match(*table, *last_only),
        Test::Advanced(start) => cx.position() != frame.position(*start),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        analysis::Analysis,
        grammar::Grammar,
        ir::{build::*, Production},
        lower::lower_grammar,
        memo::MemoPlan,
        options::LowerOptions,
    };

    fn lowered(productions: Vec<Production>, options: LowerOptions) -> LoweredGrammar {
        let grammar = Grammar::new(productions, None).unwrap();
        let analysis = Analysis::new(&grammar);
        let memo = MemoPlan::new(&grammar, &analysis, &options);
        lower_grammar(&grammar, &analysis, &options, &memo).unwrap()
    }

    #[test]
    fn test_sequence_and_choice() {
        let lowered = lowered(
            vec![Production::new(
                "A",
                seq([choice([lit("ab"), lit("a")]), byte(b'c')]),
            )],
            LowerOptions::plain(),
        );

        let outcome = parse(&lowered, b"abc");
        assert!(outcome.success);
        assert_eq!(outcome.consumed, 3);

        // ordered choice commits to "ab" and never retries "a"
        let outcome = parse(&lowered, b"ac");
        assert!(outcome.success);
        assert_eq!(outcome.consumed, 2);

        let outcome = parse(&lowered, b"abd");
        assert!(!outcome.success);
        assert_eq!(outcome.max_position, 2);
    }

    #[test]
    fn test_dispatch() {
        let mut options = LowerOptions::plain();
        options.predict = true;
        let grammar = Grammar::new(
            vec![Production::new(
                "A",
                choice([lit("if"), lit("in"), lit("let"), empty()]),
            )],
            None,
        )
        .unwrap();
        let analysis = Analysis::new(&grammar);
        let grammar = crate::optimize::predict_choices(&grammar, &analysis);
        let analysis = Analysis::new(&grammar);
        let memo = MemoPlan::new(&grammar, &analysis, &options);
        let lowered = lower_grammar(&grammar, &analysis, &options, &memo).unwrap();

        let mut dispatches = 0;
        crate::code::visit_statements(&lowered.functions[grammar.start()].body, &mut |s| {
            if let Statement::Dispatch { .. } = s {
                dispatches += 1;
            }
        });
        assert_eq!(dispatches, 1);

        for (input, consumed) in [(&b"in"[..], 2), (b"let", 3), (b"x", 0), (b"", 0), (b"il", 0)] {
            let outcome = parse(&lowered, input);
            assert!(outcome.success);
            assert_eq!(outcome.consumed, consumed, "{}", String::from_utf8_lossy(input));
        }
    }
}
