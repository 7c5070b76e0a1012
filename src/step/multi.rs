//! Composite step running child steps in order.

use super::{BuildStep, StepAction, StepScope};
use crate::context::BuildContext;
use crate::logger::BuildLoggerLevel;

/// Ordered list of steps executed one after the other. Execution stops at
/// the first child that fails; a child with `continue_on_error` never fails.
#[derive(Debug, Default)]
pub struct BuildMultiStep {
    steps: Vec<BuildStep>,
}

impl BuildMultiStep {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_steps(steps: Vec<BuildStep>) -> Self {
        Self { steps }
    }

    pub fn add(&mut self, step: BuildStep) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn steps_mut(&mut self) -> &mut [BuildStep] {
        &mut self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

impl StepAction for BuildMultiStep {
    fn kind(&self) -> &'static str {
        "BuildMultiStep"
    }

    fn initialize(&mut self, ctx: &mut BuildContext, _scope: &StepScope<'_>) -> bool {
        for (i, step) in self.steps.iter_mut().enumerate() {
            if !step.initialize(ctx) {
                ctx.log(
                    &format!("An error occurred when initializing the multi-step = {}", i),
                    BuildLoggerLevel::Error,
                );
                return false;
            }
        }
        true
    }

    fn execute(&mut self, ctx: &mut BuildContext, _scope: &StepScope<'_>) -> anyhow::Result<bool> {
        if self.steps.is_empty() {
            return Ok(false);
        }

        let count = self.steps.len();
        for (i, step) in self.steps.iter_mut().enumerate() {
            if !step.enabled || !ctx.step_starts(step) {
                continue;
            }

            let success = match step.execute(ctx) {
                Ok(success) => success,
                Err(e) => {
                    ctx.log(&e.to_string(), BuildLoggerLevel::Error);
                    false
                }
            };
            if !success {
                ctx.log(
                    &format!("An error occurred in the multi-step = {}", i),
                    BuildLoggerLevel::Error,
                );
                ctx.step_error(step);
                return Ok(false);
            }

            ctx.step_ends(step);
            if i + 1 < count {
                ctx.log_blank();
            }
        }
        Ok(true)
    }

    fn uninitialize(&mut self, ctx: &mut BuildContext) {
        for step in &mut self.steps {
            step.uninitialize(ctx);
        }
    }

    fn as_multi(&self) -> Option<&BuildMultiStep> {
        Some(self)
    }

    fn as_multi_mut(&mut self) -> Option<&mut BuildMultiStep> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BuildState;
    use crate::testing::{recorder, test_context, Recorder};
    use proptest::prelude::*;

    #[test]
    fn test_empty_multi_step_fails() {
        let (mut ctx, _log) = test_context();
        let mut step = BuildStep::multi("Empty", Vec::new());
        assert!(step.initialize(&mut ctx));
        assert!(!step.execute(&mut ctx).unwrap());
    }

    #[test]
    fn test_stops_at_first_failure() {
        let (mut ctx, log) = test_context();
        let (recorder, calls) = recorder();
        let mut step = BuildStep::multi(
            "Steps",
            vec![
                BuildStep::new("one", recorder.step_action("one", true)),
                BuildStep::new("two", recorder.step_action("two", false)),
                BuildStep::new("three", recorder.step_action("three", true)),
            ],
        );

        assert!(step.initialize(&mut ctx));
        assert!(!step.execute(&mut ctx).unwrap());
        assert_eq!(Recorder::names(&calls), vec!["one", "two"]);
        assert!(log.contains("An error occurred in the multi-step = 1"));
        assert!(log.contains("Error: Recorder: An error occurred in this build step."));
    }

    #[test]
    fn test_skips_disabled_and_cancelled() {
        let (mut ctx, _log) = test_context();
        let (recorder, calls) = recorder();
        let mut disabled = BuildStep::new("two", recorder.step_action("two", true));
        disabled.enabled = false;
        let mut step = BuildStep::multi(
            "Steps",
            vec![BuildStep::new("one", recorder.step_action("one", true)), disabled],
        );
        assert!(step.initialize(&mut ctx));
        assert!(step.execute(&mut ctx).unwrap());
        assert_eq!(Recorder::names(&calls), vec!["one"]);

        let (recorder, calls) = crate::testing::recorder();
        let mut step = BuildStep::multi(
            "Steps",
            vec![BuildStep::new("one", recorder.step_action("one", true))],
        );
        assert!(step.initialize(&mut ctx));
        ctx.set_state(BuildState::Cancelled);
        assert!(step.execute(&mut ctx).unwrap());
        assert!(Recorder::names(&calls).is_empty());
    }

    #[test]
    fn test_initialize_failure_is_reported() {
        let (mut ctx, log) = test_context();
        let (recorder, _) = recorder();
        let mut step = BuildStep::multi(
            "Steps",
            vec![
                BuildStep::new("one", recorder.step_action("one", true)),
                BuildStep::new("two", recorder.failing_initialize("two")),
            ],
        );
        assert!(!step.initialize(&mut ctx));
        assert!(!step.is_initialized());
        assert!(log.contains("An error occurred when initializing the multi-step = 1"));
    }

    proptest! {
        #[test]
        fn prop_failure_without_continue_stops(len in 1usize..8, fail_seed in 0usize..8) {
            let fail_at = fail_seed % len;
            let (mut ctx, _log) = test_context();
            let (recorder, calls) = recorder();
            let steps = (0..len)
                .map(|i| BuildStep::new(format!("s{i}"), recorder.step_action(&format!("s{i}"), i != fail_at)))
                .collect();
            let mut step = BuildStep::multi("Steps", steps);

            prop_assert!(step.initialize(&mut ctx));
            prop_assert!(!step.execute(&mut ctx).unwrap());
            let expected: Vec<String> = (0..=fail_at).map(|i| format!("s{i}")).collect();
            prop_assert_eq!(Recorder::names(&calls), expected);
        }

        #[test]
        fn prop_continue_on_error_runs_all(outcomes in proptest::collection::vec(any::<bool>(), 1..8)) {
            let (mut ctx, _log) = test_context();
            let (recorder, calls) = recorder();
            let steps = outcomes
                .iter()
                .enumerate()
                .map(|(i, &ok)| {
                    BuildStep::new(format!("s{i}"), recorder.step_action(&format!("s{i}"), ok))
                        .continue_on_error(true)
                })
                .collect();
            let mut step = BuildStep::multi("Steps", steps);

            prop_assert!(step.initialize(&mut ctx));
            prop_assert!(step.execute(&mut ctx).unwrap());
            prop_assert_eq!(Recorder::names(&calls).len(), outcomes.len());
        }
    }
}
