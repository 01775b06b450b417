use serde::{Deserialize, Serialize};

/// Switches for the optional parts of lowering, everything is enabled by default.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct LowerOptions {
    /// Cache results of eligible productions by input position.
    pub memoize: bool,
    /// Emit tree construction, otherwise tree operations lower to nothing.
    pub tree: bool,
    /// Specialize terminal-only loops, predicates and optionals, merge byte alternatives.
    pub optimize: bool,
    /// Dispatch choices through prediction tables.
    pub predict: bool,
}

impl Default for LowerOptions {
    fn default() -> Self {
        Self {
            memoize: true,
            tree: true,
            optimize: true,
            predict: true,
        }
    }
}

impl LowerOptions {
    /// Everything off, the plainest backtracking code.
    pub fn plain() -> Self {
        Self {
            memoize: false,
            tree: false,
            optimize: false,
            predict: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_options() {
        let options: LowerOptions = serde_json::from_str(r#"{ "memoize": false }"#).unwrap();
        assert_eq!(
            options,
            LowerOptions {
                memoize: false,
                ..LowerOptions::default()
            }
        );
    }
}
