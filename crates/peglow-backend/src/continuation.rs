use crate::code::Flow;

/// Failure targets enclosing the expression being lowered, innermost last.
///
/// An empty stack means failing out of the whole production.
#[derive(Clone, Default, Debug)]
pub struct ContinuationStack {
    targets: Vec<Flow>,
}

impl ContinuationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, target: Flow) {
        self.targets.push(target);
    }

    /// Pops the innermost target which must be `expected`.
    pub fn pop(&mut self, expected: Flow) {
        let popped = self.targets.pop();
        debug_assert_eq!(popped, Some(expected), "Unbalanced failure targets");
    }

    /// Nearest enclosing recovery point.
    pub fn peek(&self) -> Flow {
        self.nth_from_top(0)
    }

    /// The target outside of the innermost one, where predicates fail to from inside their attempt.
    pub fn peek_parent(&self) -> Flow {
        self.nth_from_top(1)
    }

    fn nth_from_top(&self, n: usize) -> Flow {
        self.targets
            .iter()
            .rev()
            .nth(n)
            .copied()
            .unwrap_or(Flow::Return(false))
    }

    pub fn depth(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
