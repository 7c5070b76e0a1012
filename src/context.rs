//! Per-build state threaded through every step.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::format::BuildFormatType;
use crate::group::{BuildGroup, BuildGroupType};
use crate::keyed::{KeyedList, NamedItem};
use crate::logger::{BuildLogger, BuildLoggerLevel, BuildLoggers, ConsoleLogger, FileLogger};
use crate::paths;
use crate::properties::BuildProperties;
use crate::settings::BuildSettings;
use crate::step::BuildStep;
use crate::toc::BuildTocContext;

/// Intermediate files of a build live in this folder under the base directory
pub const WORKING_FOLDER: &str = "_HelpBuild";

/// Subfolder of the Sandcastle installation holding the tools
pub const TOOLS_FOLDER: &str = "ProductionTools";

/// Environment variable pointing at the Sandcastle installation
pub const SANDCASTLE_ENV: &str = "DXROOT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildState {
    #[default]
    None,
    Started,
    Running,
    Finished,
    Cancelled,
    Error,
}

/// Build state of one documentation group
#[derive(Debug, Clone)]
pub struct BuildGroupContext {
    id: String,
    name: String,
    group_type: BuildGroupType,
    working_dir: PathBuf,
    properties: BuildProperties,
}

impl BuildGroupContext {
    pub fn new(group: &BuildGroup, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: group.id().to_string(),
            name: group.name().to_string(),
            group_type: group.group_type(),
            working_dir: working_dir.into(),
            properties: BuildProperties::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group_type(&self) -> BuildGroupType {
        self.group_type
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Value of a `$` file property such as `$TocFile`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.properties.set(key, value);
    }

    /// A `$` file property resolved against the group working directory
    pub fn path_of(&self, key: &str) -> Option<PathBuf> {
        self.get(key).map(|file| self.working_dir.join(file))
    }

    pub fn properties(&self) -> &BuildProperties {
        &self.properties
    }
}

impl NamedItem for BuildGroupContext {
    fn name(&self) -> &str {
        &self.name
    }
}

pub struct BuildContext {
    settings: BuildSettings,
    loggers: BuildLoggers,
    state: BuildState,
    build_result: bool,
    initialized: bool,

    base_dir: PathBuf,
    working_dir: PathBuf,
    output_dir: PathBuf,
    sandcastle_dir: PathBuf,
    tools_dir: PathBuf,

    group_contexts: KeyedList<BuildGroupContext>,
    toc: BuildTocContext,
    outputs: Vec<(BuildFormatType, PathBuf)>,
    processed_topics: usize,
    properties: BuildProperties,
}

impl std::fmt::Debug for BuildContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildContext")
            .field("state", &self.state)
            .field("initialized", &self.initialized)
            .field("working_dir", &self.working_dir)
            .field("output_dir", &self.output_dir)
            .field("loggers", &self.loggers.len())
            .finish()
    }
}

impl BuildContext {
    pub fn new(settings: BuildSettings) -> Self {
        Self {
            settings,
            loggers: BuildLoggers::new(),
            state: BuildState::None,
            build_result: false,
            initialized: false,
            base_dir: PathBuf::new(),
            working_dir: PathBuf::new(),
            output_dir: PathBuf::new(),
            sandcastle_dir: PathBuf::new(),
            tools_dir: PathBuf::new(),
            group_contexts: KeyedList::new(),
            toc: BuildTocContext::new(),
            outputs: Vec::new(),
            processed_topics: 0,
            properties: BuildProperties::new(),
        }
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut BuildSettings {
        &mut self.settings
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Locate the Sandcastle tools and prepare the build directories.
    /// Failures are written to the build log and leave the context
    /// uninitialized.
    pub fn initialize(&mut self, settings: BuildSettings) -> bool {
        if self.initialized {
            return true;
        }
        self.settings = settings;
        self.build_result = false;

        let Some(sandcastle_dir) = self.locate_sandcastle() else {
            self.log(
                "The sandcastle installed directory could not be found.",
                BuildLoggerLevel::Error,
            );
            return false;
        };
        let tools_dir = sandcastle_dir.join(TOOLS_FOLDER);
        if !tools_dir.is_dir() {
            self.log(
                "The sandcastle installed directory found, but ProductionTools sub-directory is not found.",
                BuildLoggerLevel::Error,
            );
            return false;
        }
        self.log(
            &format!("The sandcastle installed: {}", sandcastle_dir.display()),
            BuildLoggerLevel::Info,
        );

        if let Err(e) = self.prepare_directories() {
            self.log(
                &format!("Failed to prepare the build directories: {}", e),
                BuildLoggerLevel::Error,
            );
            return false;
        }
        self.sandcastle_dir = sandcastle_dir;
        self.tools_dir = tools_dir;
        self.toc.initialize();
        self.initialized = true;
        debug!("Build context initialized in {}", self.working_dir.display());
        true
    }

    fn locate_sandcastle(&self) -> Option<PathBuf> {
        let configured = self
            .settings
            .sandcastle_dir
            .as_ref()
            .map(|dir| PathBuf::from(paths::expand_env(&dir.to_string_lossy())))
            .filter(|dir| dir.is_dir());
        configured
            .or_else(|| std::env::var_os(SANDCASTLE_ENV).map(PathBuf::from))
            .filter(|dir| dir.is_dir())
            .and_then(|dir| paths::absolute(&dir).ok())
    }

    fn prepare_directories(&mut self) -> std::io::Result<()> {
        let base_dir = base_dir_of(&self.settings)?;
        fs::create_dir_all(&base_dir)?;

        let working_dir = base_dir.join(WORKING_FOLDER);
        if working_dir.exists() {
            fs::remove_dir_all(&working_dir)?;
        }
        fs::create_dir_all(&working_dir)?;

        let output_dir = match &self.settings.output_dir {
            Some(dir) => paths::absolute(&PathBuf::from(paths::expand_env(&dir.to_string_lossy())))?,
            None => base_dir.clone(),
        };
        fs::create_dir_all(&output_dir)?;

        self.base_dir = base_dir;
        self.working_dir = working_dir;
        self.output_dir = output_dir;
        Ok(())
    }

    /// Remove the intermediate files of a successful build when requested
    pub fn uninitialize(&mut self) {
        if self.build_result && self.settings.clean_intermediate && self.working_dir.is_dir() {
            if let Err(e) = fs::remove_dir_all(&self.working_dir) {
                self.log(
                    &format!(
                        "Failed to delete the working directory {}: {}",
                        self.working_dir.display(),
                        e
                    ),
                    BuildLoggerLevel::Error,
                );
            } else {
                debug!("Deleted working directory {}", self.working_dir.display());
            }
        }
        self.toc.uninitialize();
        self.initialized = false;
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn set_state(&mut self, state: BuildState) {
        if state == BuildState::Cancelled {
            info!("Build cancelled");
        }
        self.state = state;
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == BuildState::Cancelled
    }

    pub fn build_result(&self) -> bool {
        self.build_result
    }

    pub fn set_build_result(&mut self, success: bool) {
        self.build_result = success;
    }

    fn is_stopped(&self) -> bool {
        matches!(self.state, BuildState::Cancelled | BuildState::Error)
    }

    pub fn step_created(&mut self, step: &BuildStep) -> bool {
        debug!("Step created: {}", step.name());
        !self.is_stopped()
    }

    /// Whether `step` may run
    pub fn step_starts(&mut self, step: &BuildStep) -> bool {
        if self.is_stopped() {
            debug!("Skipping step '{}' in state {:?}", step.name(), self.state);
            return false;
        }
        true
    }

    pub fn step_ends(&mut self, step: &BuildStep) -> bool {
        debug!("Step ended: {}", step.name());
        true
    }

    pub fn step_error(&mut self, step: &BuildStep) -> bool {
        debug!("Step failed: {} ({})", step.name(), step.kind());
        true
    }

    pub fn log(&mut self, text: &str, level: BuildLoggerLevel) {
        self.loggers.write_line(text, level);
    }

    pub fn log_blank(&mut self) {
        self.loggers.write_blank();
    }

    pub fn loggers(&self) -> &BuildLoggers {
        &self.loggers
    }

    pub fn loggers_mut(&mut self) -> &mut BuildLoggers {
        &mut self.loggers
    }

    pub fn add_logger(&mut self, logger: Box<dyn BuildLogger>) {
        self.loggers.add(logger);
    }

    /// The build log sink for `settings`: a log file in the base directory,
    /// or the console when file logging is off
    pub fn create_logger(&self, settings: &BuildSettings) -> Box<dyn BuildLogger> {
        let verbosity = settings.logging.verbosity;
        match log_file_path(settings) {
            Some(path) => Box::new(FileLogger::new(path, verbosity)),
            None => Box::new(ConsoleLogger::new(verbosity)),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn sandcastle_dir(&self) -> &Path {
        &self.sandcastle_dir
    }

    pub fn tools_dir(&self) -> &Path {
        &self.tools_dir
    }

    pub fn toc(&self) -> &BuildTocContext {
        &self.toc
    }

    pub fn toc_mut(&mut self) -> &mut BuildTocContext {
        &mut self.toc
    }

    pub fn add_group_context(&mut self, group: BuildGroupContext) {
        self.group_contexts.add(group);
    }

    pub fn group_context(&self, name: &str) -> Option<&BuildGroupContext> {
        self.group_contexts.get(name)
    }

    pub fn group_context_mut(&mut self, name: &str) -> Option<&mut BuildGroupContext> {
        self.group_contexts.get_mut(name)
    }

    pub fn group_contexts(&self) -> impl Iterator<Item = &BuildGroupContext> {
        self.group_contexts.iter()
    }

    pub fn add_output(&mut self, format_type: BuildFormatType, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("Output {:?}: {}", format_type, path.display());
        self.outputs.push((format_type, path));
    }

    pub fn outputs(&self) -> &[(BuildFormatType, PathBuf)] {
        &self.outputs
    }

    pub fn add_processed_topics(&mut self, count: usize) {
        self.processed_topics += count;
    }

    pub fn processed_topics(&self) -> usize {
        self.processed_topics
    }

    pub fn properties(&self) -> &BuildProperties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut BuildProperties {
        &mut self.properties
    }
}

/// Base directory of a build: the configured working directory, else the
/// current directory
pub fn base_dir_of(settings: &BuildSettings) -> std::io::Result<PathBuf> {
    match &settings.working_dir {
        Some(dir) => paths::absolute(&PathBuf::from(paths::expand_env(&dir.to_string_lossy()))),
        None => std::env::current_dir(),
    }
}

/// Location of the build log file, `None` when file logging is off
pub fn log_file_path(settings: &BuildSettings) -> Option<PathBuf> {
    if !settings.logging.use_file {
        return None;
    }
    let base_dir = base_dir_of(settings).ok()?;
    Some(base_dir.join(&settings.logging.file_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logger::BufferLogger;
    use tempfile::TempDir;

    fn sandcastle_install(root: &Path) -> PathBuf {
        let install = root.join("Sandcastle");
        fs::create_dir_all(install.join(TOOLS_FOLDER)).unwrap();
        install
    }

    fn settings_in(root: &Path) -> BuildSettings {
        BuildSettings {
            sandcastle_dir: Some(sandcastle_install(root)),
            working_dir: Some(root.join("build")),
            ..BuildSettings::default()
        }
    }

    fn context() -> (BuildContext, BufferLogger) {
        let log = BufferLogger::new();
        let mut ctx = BuildContext::new(BuildSettings::default());
        ctx.add_logger(Box::new(log.clone()));
        (ctx, log)
    }

    #[test]
    fn test_initialize_prepares_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        let stale = root.join("build").join(WORKING_FOLDER).join("stale.xml");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        let (mut ctx, log) = context();
        assert!(ctx.initialize(settings_in(root)));
        assert!(ctx.is_initialized());
        assert!(log.contains("The sandcastle installed: "));
        assert!(ctx.tools_dir().ends_with(TOOLS_FOLDER));
        assert!(ctx.working_dir().is_dir());
        assert!(!stale.exists());
        assert_eq!(ctx.output_dir(), ctx.base_dir());
    }

    #[test]
    fn test_initialize_requires_tools_folder() {
        let temp_dir = TempDir::new().unwrap();
        let install = temp_dir.path().join("Empty");
        fs::create_dir_all(&install).unwrap();

        let (mut ctx, log) = context();
        let settings = BuildSettings {
            sandcastle_dir: Some(install),
            working_dir: Some(temp_dir.path().to_path_buf()),
            ..BuildSettings::default()
        };
        assert!(!ctx.initialize(settings));
        assert!(!ctx.is_initialized());
        assert!(log.contains("ProductionTools sub-directory is not found"));
    }

    #[test]
    fn test_uninitialize_cleans_successful_builds() {
        let temp_dir = TempDir::new().unwrap();
        let (mut ctx, _log) = context();
        assert!(ctx.initialize(settings_in(temp_dir.path())));
        let working_dir = ctx.working_dir().to_path_buf();

        ctx.uninitialize();
        assert!(working_dir.is_dir());

        assert!(ctx.initialize(settings_in(temp_dir.path())));
        ctx.set_build_result(true);
        ctx.uninitialize();
        assert!(!working_dir.exists());
    }

    #[test]
    fn test_hooks_follow_state() {
        let (mut ctx, _log) = context();
        let step = BuildStep::multi("Steps", Vec::new());
        assert!(ctx.step_created(&step));
        assert!(ctx.step_starts(&step));

        ctx.set_state(BuildState::Cancelled);
        assert!(ctx.is_cancelled());
        assert!(!ctx.step_created(&step));
        assert!(!ctx.step_starts(&step));

        ctx.set_state(BuildState::Error);
        assert!(!ctx.step_starts(&step));
        assert!(ctx.step_ends(&step));
        assert!(ctx.step_error(&step));
    }

    #[test]
    fn test_group_contexts_and_outputs() {
        let (mut ctx, _log) = context();
        let group = BuildGroup::conceptual("Guide");
        let mut group_ctx = BuildGroupContext::new(&group, "/work/_HelpBuild");
        group_ctx.set("$TocFile", "TopicsToc.xml");
        ctx.add_group_context(group_ctx);

        let found = ctx.group_context("guide").unwrap();
        assert_eq!(found.id(), group.id());
        assert_eq!(
            found.path_of("$tocfile"),
            Some(PathBuf::from("/work/_HelpBuild/TopicsToc.xml"))
        );

        ctx.add_output(BuildFormatType::HtmlHelp1, "/out/Documentation.chm");
        ctx.add_processed_topics(3);
        ctx.add_processed_topics(2);
        assert_eq!(ctx.outputs().len(), 1);
        assert_eq!(ctx.processed_topics(), 5);
    }

    #[test]
    fn test_create_logger() {
        let temp_dir = TempDir::new().unwrap();
        let (ctx, _log) = context();
        let mut settings = settings_in(temp_dir.path());
        assert_eq!(ctx.create_logger(&settings).name(), "file");
        assert_eq!(
            log_file_path(&settings),
            Some(temp_dir.path().join("build").join("HelpBuild.log"))
        );

        settings.logging.use_file = false;
        assert_eq!(ctx.create_logger(&settings).name(), "console");
        assert_eq!(log_file_path(&settings), None);
    }
}
