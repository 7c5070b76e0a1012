//! Step running an in-process closure.

use super::{StepAction, StepScope};
use crate::context::BuildContext;

type StepFn = dyn FnMut(&mut BuildContext, &StepScope<'_>) -> anyhow::Result<bool> + Send;

/// Wraps a closure as a step body; used by engines and formats for work that
/// needs no external tool
pub struct StepFunction {
    kind: &'static str,
    function: Box<StepFn>,
}

impl StepFunction {
    pub fn new<F>(kind: &'static str, function: F) -> Self
    where
        F: FnMut(&mut BuildContext, &StepScope<'_>) -> anyhow::Result<bool> + Send + 'static,
    {
        Self {
            kind,
            function: Box::new(function),
        }
    }
}

impl StepAction for StepFunction {
    fn kind(&self) -> &'static str {
        self.kind
    }

    fn execute(&mut self, ctx: &mut BuildContext, scope: &StepScope<'_>) -> anyhow::Result<bool> {
        (self.function)(ctx, scope)
    }
}
