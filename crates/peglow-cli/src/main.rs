use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use peglow_backend::{
    compile, exec,
    render::{render_function, render_grammar},
    GrammarDef, LowerError, LowerOptions, LoweredGrammar,
};

/// Compiles a JSON grammar into a Rust backtracking parser.
#[derive(Parser, Debug)]
#[command(name = "peglow", version)]
struct Args {
    /// Grammar file
    grammar: PathBuf,
    /// Production to start parsing from, overrides the one in the grammar file
    #[arg(long)]
    start: Option<String>,
    /// Write the generated parser here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
    #[arg(long)]
    no_memo: bool,
    #[arg(long)]
    no_tree: bool,
    #[arg(long)]
    no_optimize: bool,
    #[arg(long)]
    no_predict: bool,
    /// Print every production next to its lowered function
    #[arg(long)]
    dump: bool,
    /// Parse this file with the lowered grammar instead of generating code
    #[arg(long)]
    input: Option<PathBuf>,
    /// More logging, may be repeated
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

struct StdoutSink;

impl std::fmt::Write for StdoutSink {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        use std::io::Write as _;
        std::io::stdout()
            .write_all(s.as_bytes())
            .map_err(|_| std::fmt::Error)
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match (args.quiet, args.verbose) {
        (true, _) => log::LevelFilter::Off,
        (false, 0) => log::LevelFilter::Warn,
        (false, 1) => log::LevelFilter::Info,
        (false, 2) => log::LevelFilter::Debug,
        (false, _) => log::LevelFilter::Trace,
    };
    let logger = simplelog::TermLogger::init(
        level,
        simplelog::ConfigBuilder::new()
            .set_time_format_custom(&[])
            .build(),
        simplelog::TerminalMode::Stderr,
        simplelog::ColorChoice::Auto,
    );
    if let Err(err) = logger {
        eprintln!("Failed to initialize logging: {err}");
    }

    match run(&args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> anyhow::Result<ExitCode> {
    let path = &args.grammar;
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read `{}`", path.display()))?;

    let lowered = match lower(args, &source) {
        Ok(lowered) => lowered,
        Err(LowerError::Malformed(diagnostics)) => {
            let file = path.display();
            for diagnostic in &diagnostics {
                eprintln!("{file}: {diagnostic}");
            }
            return Ok(ExitCode::FAILURE);
        }
        Err(err) => return Err(err).with_context(|| format!("In `{}`", path.display())),
    };

    if args.dump {
        dump(&lowered)?;
    }

    if let Some(input) = &args.input {
        return parse_file(&lowered, input);
    }

    let mut code = String::new();
    render_grammar(&lowered, &display_name(path), &mut code)?;
    match &args.output {
        Some(output) => {
            std::fs::write(output, code)
                .with_context(|| format!("Failed to write `{}`", output.display()))?;
            log::info!("Wrote {}", output.display());
        }
        None if !args.dump => print!("{code}"),
        None => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn lower(args: &Args, source: &str) -> peglow_backend::Result<LoweredGrammar> {
    let mut def = GrammarDef::from_json(source)?;
    if let Some(start) = &args.start {
        def.start = Some(start.clone());
    }

    let (grammar, mut options) = def.into_grammar()?;
    apply_flags(args, &mut options);
    if let Ok(json) = serde_json::to_string(&options) {
        log::debug!("Options {json}");
    }
    log::info!("Loaded {} productions", grammar.len());

    compile(&grammar, &options)
}

fn apply_flags(args: &Args, options: &mut LowerOptions) {
    options.memoize &= !args.no_memo;
    options.tree &= !args.no_tree;
    options.optimize &= !args.no_optimize;
    options.predict &= !args.no_predict;
}

fn dump(lowered: &LoweredGrammar) -> std::fmt::Result {
    for function in lowered.functions.values() {
        println!("\n// {} statements", peglow_backend::code::statement_count(&function.body));
        render_function(lowered, function, &mut StdoutSink)?;
    }
    println!();
    Ok(())
}

fn parse_file(lowered: &LoweredGrammar, path: &Path) -> anyhow::Result<ExitCode> {
    let input =
        std::fs::read(path).with_context(|| format!("Failed to read `{}`", path.display()))?;

    let start = std::time::Instant::now();
    let outcome = exec::parse(lowered, &input);
    log::info!(
        "Parsed in {:.2?}, memo {} hits / {} misses",
        start.elapsed(),
        outcome.memo.hits,
        outcome.memo.misses
    );

    if !outcome.success {
        eprintln!(
            "{}: parse failed, farthest position reached is {}",
            path.display(),
            outcome.max_position
        );
        return Ok(ExitCode::FAILURE);
    }

    println!("Matched {} of {} bytes", outcome.consumed, input.len());
    if let Some(tree) = &outcome.tree {
        let symbols: Vec<&str> = lowered.symbols.iter().map(|s| &**s).collect();
        let mut buf = String::new();
        tree.display_into(&mut buf, &input, &symbols)?;
        print!("{buf}");
    }
    Ok(ExitCode::SUCCESS)
}

/// Path relative to the working directory when possible, for the generated header.
fn display_name(path: &Path) -> String {
    let relative = std::env::current_dir()
        .ok()
        .and_then(|dir| path.canonicalize().ok()?.strip_prefix(dir).ok().map(Path::to_path_buf));
    relative.as_deref().unwrap_or(path).display().to_string()
}
