//! Renders the grammars under `grammars/` into `OUT_DIR`, so the generated parsers are
//! compiled like any other module of this crate.

use std::{env, fs, path::PathBuf};

use anyhow::Context;

const GRAMMARS: &[&str] = &["arith", "markup"];

fn main() -> anyhow::Result<()> {
    let manifest = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let grammars = manifest.join("../../grammars");
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);

    for name in GRAMMARS {
        let path = grammars.join(format!("{name}.json"));
        println!("cargo:rerun-if-changed={}", path.display());

        let source = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read `{}`", path.display()))?;
        let lowered = peglow_backend::compile_json(&source)
            .with_context(|| format!("Failed to lower `{}`", path.display()))?;

        let mut code = String::new();
        peglow_backend::render::render_items(&lowered, &mut code)?;
        fs::write(out_dir.join(format!("{name}.rs")), code)?;
    }
    Ok(())
}
