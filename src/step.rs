//! Build steps: the units of work of a documentation build.
//!
//! A [`BuildStep`] carries the settings every step shares (name, log title,
//! error policy, working directory) and delegates its actual work to a boxed
//! [`StepAction`]. Any step can have lists of steps injected to run before it,
//! after it, or instead of its own work (see [`BuildStep::insert`]).

pub mod directory;
pub mod function;
pub mod multi;
pub mod process;
pub mod toc_merge;

pub use directory::{StepDirectoryCopy, StepDirectoryCreate, StepDirectoryDelete};
pub use function::StepFunction;
pub use multi::BuildMultiStep;
pub use process::StepProcess;
pub use toc_merge::StepTocMerge;

use log::debug;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::logger::{BuildLoggerLevel, BuildLoggerVerbosity};
use crate::paths;
use crate::properties::BuildProperties;

/// Where [`BuildStep::insert`] places a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildInsertType {
    None,
    Before,
    Replace,
    After,
}

/// Lifecycle of a step within one build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Uninitialized,
    Initialized,
    Executing,
    Succeeded,
    Failed,
}

/// Shared step settings visible to a [`StepAction`]
#[derive(Debug, Clone, Copy)]
pub struct StepScope<'a> {
    pub name: &'a str,
    pub working_dir: &'a Path,
    pub verbosity: BuildLoggerVerbosity,
    pub properties: &'a BuildProperties,
}

impl StepScope<'_> {
    /// Expand variables in `path` and resolve it against the working directory
    pub fn expand_path(&self, path: &str) -> PathBuf {
        paths::resolve(self.working_dir, path)
    }
}

/// The work performed by a step
pub trait StepAction: Send {
    /// Type name used in error messages
    fn kind(&self) -> &'static str;

    fn initialize(&mut self, _ctx: &mut BuildContext, _scope: &StepScope<'_>) -> bool {
        true
    }

    /// Run the work. `Ok(false)` and `Err` both mark the step as failed;
    /// errors are written to the build log.
    fn execute(&mut self, ctx: &mut BuildContext, scope: &StepScope<'_>) -> anyhow::Result<bool>;

    fn uninitialize(&mut self, _ctx: &mut BuildContext) {}

    fn as_multi(&self) -> Option<&BuildMultiStep> {
        None
    }

    fn as_multi_mut(&mut self) -> Option<&mut BuildMultiStep> {
        None
    }
}

pub struct BuildStep {
    name: String,
    pub title: String,
    pub message: String,
    pub description: String,
    pub enabled: bool,
    pub continue_on_error: bool,
    pub log_time_span: bool,
    working_dir: PathBuf,
    /// Configured verbosity; `None` inherits from the logging settings
    pub verbosity: BuildLoggerVerbosity,
    effective_verbosity: BuildLoggerVerbosity,
    pub properties: BuildProperties,
    before: Option<Box<BuildStep>>,
    replace: Option<Box<BuildStep>>,
    after: Option<Box<BuildStep>>,
    elapsed: Option<Duration>,
    state: StepState,
    action: Box<dyn StepAction>,
}

impl std::fmt::Debug for BuildStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildStep")
            .field("name", &self.name)
            .field("kind", &self.action.kind())
            .field("enabled", &self.enabled)
            .field("continue_on_error", &self.continue_on_error)
            .field("state", &self.state)
            .finish()
    }
}

impl BuildStep {
    pub fn new(name: impl Into<String>, action: impl StepAction + 'static) -> Self {
        Self::with_action(name, Box::new(action))
    }

    pub fn with_action(name: impl Into<String>, action: Box<dyn StepAction>) -> Self {
        Self {
            name: name.into(),
            title: String::new(),
            message: String::new(),
            description: String::new(),
            enabled: true,
            continue_on_error: false,
            log_time_span: true,
            working_dir: PathBuf::new(),
            verbosity: BuildLoggerVerbosity::None,
            effective_verbosity: BuildLoggerVerbosity::None,
            properties: BuildProperties::new(),
            before: None,
            replace: None,
            after: None,
            elapsed: None,
            state: StepState::Uninitialized,
            action,
        }
    }

    /// A composite step running `steps` in order
    pub fn multi(name: impl Into<String>, steps: Vec<BuildStep>) -> Self {
        Self::new(name, BuildMultiStep::with_steps(steps))
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name can be given once, to a step created without one
    pub fn set_name(&mut self, name: impl Into<String>) -> bool {
        if !self.name.is_empty() {
            return false;
        }
        self.name = name.into();
        true
    }

    pub fn kind(&self) -> &'static str {
        self.action.kind()
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn set_working_dir(&mut self, working_dir: impl Into<PathBuf>) {
        self.working_dir = working_dir.into();
    }

    pub fn is_initialized(&self) -> bool {
        self.state != StepState::Uninitialized
    }

    pub fn state(&self) -> StepState {
        self.state
    }

    pub fn is_multi_step(&self) -> bool {
        self.action.as_multi().is_some()
    }

    pub fn as_multi(&self) -> Option<&BuildMultiStep> {
        self.action.as_multi()
    }

    pub fn as_multi_mut(&mut self) -> Option<&mut BuildMultiStep> {
        self.action.as_multi_mut()
    }

    /// Time spent in the step's own work during the last execution
    pub fn elapsed(&self) -> Option<Duration> {
        self.elapsed
    }

    /// Verbosity in effect after initialization
    pub fn effective_verbosity(&self) -> BuildLoggerVerbosity {
        self.effective_verbosity
    }

    pub fn before_steps(&self) -> Option<&BuildStep> {
        self.before.as_deref()
    }

    pub fn replace_steps(&self) -> Option<&BuildStep> {
        self.replace.as_deref()
    }

    pub fn after_steps(&self) -> Option<&BuildStep> {
        self.after.as_deref()
    }

    pub fn before_steps_mut(&mut self) -> Option<&mut BuildStep> {
        self.before.as_deref_mut()
    }

    pub fn replace_steps_mut(&mut self) -> Option<&mut BuildStep> {
        self.replace.as_deref_mut()
    }

    pub fn after_steps_mut(&mut self) -> Option<&mut BuildStep> {
        self.after.as_deref_mut()
    }

    /// Inject `step` before, instead of, or after this step's own work.
    /// The target list is created on first use.
    pub fn insert(&mut self, step: BuildStep, insert_type: BuildInsertType) {
        let (slot, suffix) = match insert_type {
            BuildInsertType::None => return,
            BuildInsertType::Before => (&mut self.before, "Before"),
            BuildInsertType::Replace => (&mut self.replace, "Replace"),
            BuildInsertType::After => (&mut self.after, "After"),
        };
        let name = format!("{}.{}", self.name, suffix);
        let list = slot.get_or_insert_with(|| Box::new(BuildStep::multi(name, Vec::new())));
        if let Some(multi) = list.as_multi_mut() {
            multi.add(step);
        }
    }

    /// Cancellation is advisory only; a running step is never interrupted
    pub fn cancel(&mut self) -> bool {
        false
    }

    pub fn expand_path(&self, path: &str) -> PathBuf {
        paths::resolve(&self.working_dir, path)
    }

    pub fn initialize(&mut self, ctx: &mut BuildContext) -> bool {
        self.state = StepState::Uninitialized;

        for list in [&mut self.before, &mut self.replace, &mut self.after]
            .into_iter()
            .flatten()
        {
            if list.enabled && !list.initialize(ctx) {
                return false;
            }
        }

        self.effective_verbosity = if self.verbosity == BuildLoggerVerbosity::None {
            ctx.settings().logging.verbosity
        } else {
            self.verbosity
        };

        let scope = StepScope {
            name: &self.name,
            working_dir: &self.working_dir,
            verbosity: self.effective_verbosity,
            properties: &self.properties,
        };
        if !self.action.initialize(ctx, &scope) {
            debug!("Step '{}' ({}) failed to initialize", self.name, self.action.kind());
            return false;
        }

        self.elapsed = None;
        self.state = StepState::Initialized;
        true
    }

    /// Run the before-steps, then the replace-steps or the step's own work,
    /// then the after-steps.
    pub fn execute(&mut self, ctx: &mut BuildContext) -> Result<bool> {
        match self.state {
            StepState::Uninitialized => return Err(BuildError::NotInitialized),
            StepState::Initialized => {}
            StepState::Executing | StepState::Succeeded | StepState::Failed => {
                return Err(BuildError::build(format!(
                    "The build step '{}' has already been executed",
                    self.name
                )));
            }
        }
        self.state = StepState::Executing;

        if let Some(before) = self.before.as_deref_mut().filter(|list| list.enabled) {
            if !before.execute(ctx)? && !before.continue_on_error {
                self.state = StepState::Failed;
                return Ok(false);
            }
        }

        let use_replace = self
            .replace
            .as_deref()
            .is_some_and(|list| list.enabled && list.as_multi().is_some_and(|m| !m.is_empty()));
        let mut result = if use_replace {
            match self.replace.as_deref_mut() {
                Some(replace) => replace.execute(ctx)?,
                None => false,
            }
        } else {
            self.default_execute(ctx)
        };
        self.state = if result {
            StepState::Succeeded
        } else {
            StepState::Failed
        };

        if !result {
            if !self.continue_on_error {
                return Ok(false);
            }
            result = true;
        }

        if let Some(after) = self.after.as_deref_mut().filter(|list| list.enabled) {
            if !after.execute(ctx)? {
                if !after.continue_on_error {
                    return Ok(false);
                }
                result = true;
            }
        }

        Ok(result)
    }

    pub fn uninitialize(&mut self, ctx: &mut BuildContext) {
        for list in [&mut self.before, &mut self.replace, &mut self.after]
            .into_iter()
            .flatten()
        {
            list.uninitialize(ctx);
        }
        self.action.uninitialize(ctx);
        self.effective_verbosity = BuildLoggerVerbosity::None;
        self.state = StepState::Uninitialized;
    }

    fn default_execute(&mut self, ctx: &mut BuildContext) -> bool {
        let is_multi = self.is_multi_step();
        if !self.title.is_empty() {
            ctx.log(&self.title, BuildLoggerLevel::Started);
        }
        if !self.message.is_empty() {
            ctx.log(&self.message, BuildLoggerLevel::Info);
        }

        let timer = Instant::now();
        let scope = StepScope {
            name: &self.name,
            working_dir: &self.working_dir,
            verbosity: self.effective_verbosity,
            properties: &self.properties,
        };
        let success = match self.action.execute(ctx, &scope) {
            Ok(success) => success,
            Err(e) => {
                ctx.log(&format!("{:#}", e), BuildLoggerLevel::Error);
                false
            }
        };
        let elapsed = timer.elapsed();
        self.elapsed = Some(elapsed);

        if success {
            if self.log_time_span {
                if is_multi {
                    ctx.log_blank();
                    ctx.log(
                        &format!("All tasks successfully completed in: {}", format_elapsed(elapsed)),
                        BuildLoggerLevel::Info,
                    );
                } else {
                    ctx.log(
                        &format!("Successfully completed in: {}", format_elapsed(elapsed)),
                        BuildLoggerLevel::Info,
                    );
                }
            }
        } else if !is_multi {
            ctx.log(
                &format!("{}: An error occurred in this build step.", self.action.kind()),
                BuildLoggerLevel::Error,
            );
        }

        if !self.title.is_empty() {
            ctx.log(&self.title, BuildLoggerLevel::Ended);
        }
        success
    }
}

/// `hh:mm:ss.fff`
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        total / 3600,
        (total / 60) % 60,
        total % 60,
        elapsed.subsec_millis()
    )
}
