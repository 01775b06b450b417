use std::fmt::{Result, Write};

use cranelift_entity::EntitySet;

use crate::{
    code::{
        visit_statements, Block, DispatchArm, Effect, Flow, LoweredFunction, LoweredGrammar,
        ScopeHandle, Statement, Terminal, Test, VariableKind,
    },
    literal::RustLiteral,
};

/// Writes a complete Rust module with one `parse_<name>` function per production.
pub fn render_grammar(lowered: &LoweredGrammar, source: &str, buf: &mut dyn Write) -> Result {
    write!(
        buf,
        "\
//! This file is generated by peglow-cli from '{source}'.
//! Edit the grammar file instead.

#![allow(unused, unreachable_code, unreachable_patterns, non_snake_case)]

"
    )?;
    render_items(lowered, buf)
}

/// The module contents without inner attributes, for splicing into a module with `include!`.
pub fn render_items(lowered: &LoweredGrammar, buf: &mut dyn Write) -> Result {
    write!(
        buf,
        "\
use peglow_runtime::{{Context, Language, Symbol}};

pub const FLAG_COUNT: usize = {};
pub const MEMO_COUNT: usize = {};
",
        lowered.flag_count, lowered.memo_count
    )?;

    buf.write_str("pub const SYMBOLS: &[&str] = &[")?;
    for (i, symbol) in lowered.symbols.iter().enumerate() {
        if i > 0 {
            buf.write_str(", ")?;
        }
        write!(buf, "{:?}", symbol.as_ref())?;
    }
    buf.write_str("];\n")?;

    if !lowered.tables.is_empty() {
        buf.write_str("\n// symbol tables:")?;
        for (i, table) in lowered.tables.iter().enumerate() {
            write!(buf, " {i} = {:?}", table.as_ref())?;
        }
        buf.write_str("\n")?;
    }

    let start = &lowered.functions[lowered.start].name;
    write!(
        buf,
        "
pub const LANGUAGE: Language = Language {{
    entry: parse_{start},
    flag_count: FLAG_COUNT,
    memo_count: MEMO_COUNT,
    symbols: SYMBOLS,
}};
"
    )?;

    for function in lowered.functions.values() {
        buf.write_str("\n")?;
        render_function(lowered, function, buf)?;
    }
    Ok(())
}

pub fn render_function(
    lowered: &LoweredGrammar,
    function: &LoweredFunction,
    buf: &mut dyn Write,
) -> Result {
    let mut used = EntitySet::new();
    visit_statements(&function.body, &mut |statement| {
        if let Statement::Jump(Flow::Break(scope) | Flow::Continue(scope)) = statement {
            used.insert(*scope);
        }
    });

    writeln!(buf, "pub fn parse_{}(ctx: &mut Context) -> bool {{", function.name)?;
    let mut printer = Printer {
        lowered,
        used,
        buf,
        indent: 1,
    };
    printer.block(&function.body)?;
    printer.buf.write_str("}\n")
}

struct Printer<'a> {
    lowered: &'a LoweredGrammar,
    used: EntitySet<ScopeHandle>,
    buf: &'a mut dyn Write,
    indent: usize,
}

impl Printer<'_> {
    fn line(&mut self, args: std::fmt::Arguments) -> Result {
        for _ in 0..self.indent {
            self.buf.write_str("    ")?;
        }
        self.buf.write_fmt(args)?;
        self.buf.write_char('\n')
    }

    fn nested(&mut self, block: &Block) -> Result {
        self.indent += 1;
        self.block(block)?;
        self.indent -= 1;
        Ok(())
    }

    fn block(&mut self, block: &Block) -> Result {
        for statement in block {
            self.statement(statement)?;
        }
        Ok(())
    }

    fn label(&self, scope: ScopeHandle) -> String {
        match self.used.contains(scope) {
            true => format!("'{scope}: "),
            false => String::new(),
        }
    }

    fn statement(&mut self, statement: &Statement) -> Result {
        match statement {
            Statement::Let(variable, kind) => {
                let method = match kind {
                    VariableKind::Position => "position",
                    VariableKind::AstMark => "ast_mark",
                    VariableKind::SymbolSavepoint => "symbol_savepoint",
                };
                self.line(format_args!("let {variable} = ctx.{method}();"))
            }
            Statement::Effect(effect) => {
                let effect = self.effect(effect);
                self.line(format_args!("{effect};"))
            }
            Statement::If { test, negate, then } => {
                let condition = self.test(test, *negate);
                if then.is_empty() {
                    return self.line(format_args!("{condition};"));
                }
                self.line(format_args!("if {condition} {{"))?;
                self.nested(then)?;
                self.line(format_args!("}}"))
            }
            Statement::Block(scope, body) => match self.used.contains(*scope) {
                true => {
                    self.line(format_args!("'{scope}: {{"))?;
                    self.nested(body)?;
                    self.line(format_args!("}}"))
                }
                // nothing leaves the block early, so it is just a sequence
                false => self.block(body),
            },
            Statement::Loop(scope, body) => {
                if let [Statement::If {
                    test,
                    negate: true,
                    then,
                }] = body.as_slice()
                {
                    if matches!(then.as_slice(), [Statement::Jump(Flow::Break(target))] if target == scope)
                    {
                        let condition = self.test(test, false);
                        return self.line(format_args!("while {condition} {{}}"));
                    }
                }
                let label = self.label(*scope);
                self.line(format_args!("{label}loop {{"))?;
                self.nested(body)?;
                self.line(format_args!("}}"))
            }
            Statement::Dispatch { arms, otherwise } => {
                self.line(format_args!("match ctx.peek() {{"))?;
                self.indent += 1;
                for arm in arms {
                    let pattern = arm_pattern(arm);
                    self.line(format_args!("{pattern} => {{"))?;
                    self.nested(&arm.body)?;
                    self.line(format_args!("}}"))?;
                }
                self.line(format_args!("_ => {{"))?;
                self.nested(otherwise)?;
                self.line(format_args!("}}"))?;
                self.indent -= 1;
                self.line(format_args!("}}"))
            }
            Statement::MemoLookup { slot } => {
                self.line(format_args!("if let Some(entry) = ctx.memo_get({slot}) {{"))?;
                self.line(format_args!("    return ctx.memo_replay(entry);"))?;
                self.line(format_args!("}}"))
            }
            Statement::Jump(Flow::Break(scope)) => self.line(format_args!("break '{scope};")),
            Statement::Jump(Flow::Continue(scope)) => {
                self.line(format_args!("continue '{scope};"))
            }
            Statement::Jump(Flow::Return(value)) => self.line(format_args!("return {value};")),
        }
    }

    fn effect(&self, effect: &Effect) -> String {
        match *effect {
            Effect::Restore(position) => format!("ctx.set_position({position})"),
            Effect::AstAbort(mark) => format!("ctx.ast_abort({mark})"),
            Effect::SymbolRollback(savepoint) => format!("ctx.symbol_rollback({savepoint})"),
            Effect::AstNew { left_join } => format!("ctx.ast_new({left_join})"),
            Effect::AstCapture => "ctx.ast_capture()".to_owned(),
            Effect::AstTag(tag) => format!("ctx.ast_tag({})", symbol(tag)),
            Effect::AstReplace(value) => format!("ctx.ast_replace({})", symbol(value)),
            Effect::AstCommitLink { mark, label } => match label {
                Some(label) => format!("ctx.ast_commit_link({mark}, Some({}))", symbol(label)),
                None => format!("ctx.ast_commit_link({mark}, None)"),
            },
            Effect::SymbolDefine { table, start } => format!("ctx.symbol_define({table}, {start})"),
            Effect::SetFlag { flag, value } => format!("ctx.set_flag({flag}, {value})"),
            Effect::MemoSuccess { slot, start, mark } => match mark {
                Some(mark) => format!("ctx.memo_success({slot}, {start}, Some({mark}))"),
                None => format!("ctx.memo_success({slot}, {start}, None)"),
            },
            Effect::MemoFailure { slot, start } => format!("ctx.memo_failure({slot}, {start})"),
        }
    }

    fn test(&self, test: &Test, negate: bool) -> String {
        let not = if negate { "!" } else { "" };
        match test {
            Test::Match(terminal) => match terminal {
                Terminal::Byte(byte) => format!("{not}ctx.byte({})", RustLiteral::Byte(*byte)),
                Terminal::Ranges(ranges) => {
                    format!("{not}ctx.byte_if(|b| matches!(b, {}))", ranges.pattern())
                }
                Terminal::Any => format!("{not}ctx.any_byte()"),
                Terminal::Bytes(bytes) => {
                    format!("{not}ctx.bytes({})", RustLiteral::Bytes(bytes))
                }
            },
            Test::Peek(terminal) => match terminal {
                Terminal::Byte(byte) => {
                    format!("{not}ctx.lookahead_if(|b| b == {})", RustLiteral::Byte(*byte))
                }
                Terminal::Ranges(ranges) => {
                    format!("{not}ctx.lookahead_if(|b| matches!(b, {}))", ranges.pattern())
                }
                Terminal::Any => match negate {
                    true => "ctx.is_eof()".to_owned(),
                    false => "!ctx.is_eof()".to_owned(),
                },
                Terminal::Bytes(bytes) => {
                    format!("{not}ctx.lookahead_bytes({})", RustLiteral::Bytes(bytes))
                }
            },
            Test::Call(production) => {
                let name = &self.lowered.functions[*production].name;
                format!("{not}parse_{name}(ctx)")
            }
            Test::Flag(flag) => format!("{not}ctx.flag({flag})"),
            Test::SymbolMatch { table, last_only } => {
                format!("{not}ctx.symbol_match({table}, {last_only})")
            }
            Test::Advanced(position) => match negate {
                true => format!("ctx.position() == {position}"),
                false => format!("ctx.position() != {position}"),
            },
        }
    }
}

fn symbol(symbol: u32) -> String {
    format!("Symbol({symbol})")
}

fn arm_pattern(arm: &DispatchArm) -> String {
    let mut pattern = String::new();
    if !arm.bytes.is_empty() {
        pattern = format!("Some({})", arm.bytes.pattern());
    }
    if arm.at_end {
        if !pattern.is_empty() {
            pattern.push_str(" | ");
        }
        pattern.push_str("None");
    }
    pattern
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

    fn render(productions: Vec<Production>, options: LowerOptions) -> String {
        let grammar = Grammar::new(productions, None).unwrap();
        let analysis = Analysis::new(&grammar);
        let memo = MemoPlan::new(&grammar, &analysis, &options);
        let lowered = lower_grammar(&grammar, &analysis, &options, &memo).unwrap();
        let mut buf = String::new();
        for function in lowered.functions.values() {
            render_function(&lowered, function, &mut buf).unwrap();
        }
        buf
    }

    #[test]
    fn test_render_choice() {
        let code = render(
            vec![Production::new(
                "A",
                choice([seq([byte(b'a'), byte(b'b')]), lit("ac")]),
            )],
            LowerOptions::plain(),
        );
        let expected = "\
pub fn parse_A(ctx: &mut Context) -> bool {
    's0: {
        let v0 = ctx.position();
        's1: {
            's2: {
                if !ctx.byte(b'a') {
                    break 's2;
                }
                if !ctx.byte(b'b') {
                    break 's2;
                }
                break 's1;
            }
            ctx.set_position(v0);
            's3: {
                if !ctx.bytes(b\"ac\") {
                    break 's3;
                }
                break 's1;
            }
            ctx.set_position(v0);
            break 's0;
        }
        return true;
    }
    return false;
}
";
        assert_eq!(code, expected);
    }

    #[test]
    fn test_render_specialized() {
        let code = render(
            vec![
                Production::new("File", seq([plus(rule("Digit")), not(any())])),
                Production::new("Digit", set(&[(b'0', b'9')])),
            ],
            LowerOptions::default(),
        );
        let expected = "\
pub fn parse_File(ctx: &mut Context) -> bool {
    if let Some(entry) = ctx.memo_get(0) {
        return ctx.memo_replay(entry);
    }
    let v0 = ctx.position();
    's0: {
        if !ctx.byte_if(|b| matches!(b, b'0'..=b'9')) {
            break 's0;
        }
        while ctx.byte_if(|b| matches!(b, b'0'..=b'9')) {}
        if !ctx.is_eof() {
            break 's0;
        }
        ctx.memo_success(0, v0, None);
        return true;
    }
    ctx.memo_failure(0, v0);
    return false;
}
pub fn parse_Digit(ctx: &mut Context) -> bool {
    's0: {
        if !ctx.byte_if(|b| matches!(b, b'0'..=b'9')) {
            break 's0;
        }
        return true;
    }
    return false;
}
";
        assert_eq!(code, expected);
    }

    #[test]
    fn test_arm_pattern() {
        let arm = DispatchArm {
            bytes: crate::byteset::ByteSet::from_ranges(&[(b'a', b'c'), (b'x', b'x')]).ranges(),
            at_end: true,
            body: Vec::new(),
        };
        assert_eq!(arm_pattern(&arm), "Some(b'a'..=b'c' | b'x') | None");
    }
}
