//! Parsers generated at build time from the grammars in the workspace `grammars/` directory.

#[allow(unused, unreachable_code, unreachable_patterns, non_snake_case)]
pub mod arith {
    include!(concat!(env!("OUT_DIR"), "/arith.rs"));
}

#[allow(unused, unreachable_code, unreachable_patterns, non_snake_case)]
pub mod markup {
    include!(concat!(env!("OUT_DIR"), "/markup.rs"));
}
