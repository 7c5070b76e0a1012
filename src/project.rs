//! A documentation project: settings plus groups, built as one list of steps.

use log::{debug, info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::context::{self, BuildContext, BuildGroupContext, BuildState};
use crate::engine::{self, BuildEngine, SandcastleEngine};
use crate::error::{BuildError, Result};
use crate::format::{BuildFormatType, BuildStage};
use crate::group::{BuildGroup, BuildGroupType};
use crate::keyed::{KeyedList, NamedItem};
use crate::logger::{BuildLogger, BuildLoggerLevel};
use crate::settings::BuildSettings;
use crate::step::{self, BuildStep, StepDirectoryCopy, StepDirectoryCreate, StepTocMerge};
use crate::xml::{XmlElement, XmlSerializable};

/// Root element of a project file
pub const PROJECT_TAG: &str = "sandcastleProject";

/// Written to the output directory after every build
pub const SUMMARY_FILE: &str = "build-summary.json";

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub name: String,
    pub kind: String,
    pub elapsed: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutputSummary {
    pub format: BuildFormatType,
    pub path: PathBuf,
}

/// Result of one build, serialized to `build-summary.json`
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub help_name: String,
    pub success: bool,
    pub state: BuildState,
    pub elapsed: String,
    pub groups: Vec<String>,
    pub steps: Vec<StepSummary>,
    pub outputs: Vec<OutputSummary>,
    pub processed_topics: usize,
}

pub struct BuildProject {
    settings: BuildSettings,
    groups: KeyedList<BuildGroup>,
    engines: Vec<Box<dyn BuildEngine>>,
    context: BuildContext,
    steps: Vec<BuildStep>,
    initialized: bool,
}

impl BuildProject {
    pub fn new(settings: BuildSettings) -> Self {
        Self {
            context: BuildContext::new(settings.clone()),
            settings,
            groups: KeyedList::new(),
            engines: Vec::new(),
            steps: Vec::new(),
            initialized: false,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let root = XmlElement::read_file(path)?;
        Self::read_project(&root).map_err(|e| e.with_path(path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.write_project().write_file(path)
    }

    fn read_project(root: &XmlElement) -> Result<Self> {
        if root.name != PROJECT_TAG {
            return Err(BuildError::xml(format!(
                "expected <{}> but found <{}>",
                PROJECT_TAG, root.name
            )));
        }
        let settings = match root.child(BuildSettings::TAG_NAME) {
            Some(settings) => BuildSettings::read_xml(settings)?,
            None => BuildSettings::default(),
        };
        let mut project = BuildProject::new(settings);
        if let Some(groups) = root.child("groups") {
            for group in groups.children_named(BuildGroup::TAG_NAME) {
                project.add_group(BuildGroup::read_xml(group)?);
            }
        }
        debug!("Loaded project with {} groups", project.groups.len());
        Ok(project)
    }

    fn write_project(&self) -> XmlElement {
        let mut groups = XmlElement::new("groups");
        for group in self.groups.iter() {
            groups.push(group.write_xml());
        }
        XmlElement::new(PROJECT_TAG)
            .with_child(self.settings.write_xml())
            .with_child(groups)
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut BuildSettings {
        &mut self.settings
    }

    /// Add a group; a group with the same name is replaced
    pub fn add_group(&mut self, group: BuildGroup) {
        self.groups.add(group);
    }

    pub fn groups(&self) -> impl Iterator<Item = &BuildGroup> {
        self.groups.iter()
    }

    pub fn context(&self) -> &BuildContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut BuildContext {
        &mut self.context
    }

    pub fn steps(&self) -> &[BuildStep] {
        &self.steps
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Prepare the context, engines and steps of the build. Errors are
    /// written to the build log before they are returned.
    pub fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        if self.context.loggers().is_empty() {
            let logger = self.context.create_logger(&self.settings);
            self.context.add_logger(logger);
        }
        self.context.loggers_mut().initialize()?;

        match self.try_initialize() {
            Ok(()) => {
                self.initialized = true;
                Ok(())
            }
            Err(e) => {
                self.context.log(&e.to_string(), BuildLoggerLevel::Error);
                for engine in &mut self.engines {
                    engine.uninitialize(&mut self.context);
                }
                self.steps.clear();
                self.engines.clear();
                self.context.set_build_result(false);
                self.context.uninitialize();
                Err(e)
            }
        }
    }

    fn try_initialize(&mut self) -> Result<()> {
        self.on_begin_documentation()?;
        if !self.context.initialize(self.settings.clone()) {
            return Err(BuildError::build("The build context could not be initialized"));
        }

        if self.settings.enabled_formats().next().is_none() {
            return Err(BuildError::config("There is no enabled output format"));
        }

        let working_dir = self.context.working_dir().to_path_buf();
        for group in self.groups.iter().filter(|group| !group.exclude) {
            self.context
                .add_group_context(BuildGroupContext::new(group, &working_dir));
        }

        for group_type in [BuildGroupType::Reference, BuildGroupType::Conceptual] {
            let wanted = match group_type {
                BuildGroupType::Reference => self.settings.build_references,
                BuildGroupType::Conceptual => self.settings.build_conceptual,
            };
            if !wanted || !self.build_groups().any(|group| group.group_type() == group_type) {
                continue;
            }
            let mut engine = SandcastleEngine::for_group_type(group_type);
            if !engine.initialize(&mut self.context) {
                return Err(BuildError::build(format!(
                    "The {} engine could not be initialized",
                    group_type
                )));
            }
            self.engines.push(Box::new(engine));
        }

        self.create_steps();
        info!("Created {} build steps", self.steps.len());
        Ok(())
    }

    fn on_begin_documentation(&mut self) -> Result<()> {
        if self.groups.is_empty() {
            return Err(BuildError::NoBuildGroups);
        }
        self.context.set_state(BuildState::Started);
        Ok(())
    }

    /// Groups taking part in the build
    fn build_groups(&self) -> impl Iterator<Item = &BuildGroup> {
        self.groups
            .iter()
            .filter(|group| !group.exclude && !group.is_empty())
    }

    fn create_steps(&mut self) {
        let ctx = &self.context;
        let working_dir = ctx.working_dir().to_path_buf();
        let mut steps = Vec::new();

        steps.push(self.pre_build_steps(&working_dir));

        for group in self.build_groups() {
            for engine in &self.engines {
                steps.extend(engine.create_initial_steps(ctx, group));
            }
        }
        for engine in &self.engines {
            steps.extend(engine.create_link_steps(ctx));
        }

        let mut merge = StepTocMerge::new();
        for group in self.build_groups().filter(|group| !group.exclude_toc) {
            if let Some(toc_file) = engine::group_toc_file(ctx, group) {
                merge.add(toc_file.display().to_string(), group.group_type());
            }
        }
        steps.push(
            BuildStep::new("TocMerge", merge)
                .with_working_dir(&working_dir)
                .with_message("Merging Table of Contents"),
        );

        for group in self.build_groups() {
            for engine in &self.engines {
                steps.extend(engine.create_final_steps(ctx, group));
            }
        }

        let mut post_build = Vec::new();
        for format in self.settings.enabled_formats() {
            post_build.extend(format.create_step(ctx, BuildStage::Compilation, &working_dir));
        }
        for format in self.settings.enabled_formats() {
            post_build.extend(format.create_step(ctx, BuildStage::StartViewer, &working_dir));
        }
        if !post_build.is_empty() {
            steps.push(BuildStep::multi("PostBuild", post_build));
        }

        let context = &mut self.context;
        self.steps = steps
            .into_iter()
            .filter(|step| context.step_created(step))
            .collect();
    }

    fn pre_build_steps(&self, working_dir: &Path) -> BuildStep {
        let ctx = &self.context;
        let mut steps: Vec<BuildStep> = self
            .settings
            .enabled_formats()
            .filter_map(|format| format.create_step(ctx, BuildStage::CloseViewer, working_dir))
            .collect();

        let output_folders: Vec<String> = self
            .settings
            .output_folders
            .iter()
            .map(|folder| format!("{}/{}", engine::OUTPUT_FOLDER, folder))
            .collect();
        steps.push(
            BuildStep::new("CreateFolders", StepDirectoryCreate::new(output_folders))
                .with_working_dir(working_dir),
        );

        if let Some(styles_dir) = &self.settings.styles_dir {
            let style_dir = styles_dir.join(&self.settings.presentation_style);
            let mut copy = StepDirectoryCopy::new();
            for folder in &self.settings.output_folders {
                copy.add(
                    style_dir.join(folder).display().to_string(),
                    format!("{}/{}", engine::OUTPUT_FOLDER, folder),
                );
            }
            steps.push(
                BuildStep::new("CopyStyles", copy)
                    .with_working_dir(working_dir)
                    .with_message("Copying the presentation style files"),
            );
        }

        BuildStep::multi("PreBuild", steps).with_title("Preparing the build")
    }

    /// Run every step in order. The build stops at the first failing step.
    pub fn build(&mut self) -> Result<bool> {
        if !self.initialized {
            self.context.log(
                "The project must be initialized before building.",
                BuildLoggerLevel::Error,
            );
            return Err(BuildError::NotInitialized);
        }
        let timer = Instant::now();
        self.context.set_build_result(false);

        let mut success = true;
        for (i, step) in self.steps.iter_mut().enumerate() {
            if !step.initialize(&mut self.context) {
                self.context.log(
                    &format!("An error occurred when initializing the step = {}", i),
                    BuildLoggerLevel::Error,
                );
                success = false;
                break;
            }
        }

        if success {
            self.context.set_state(BuildState::Running);
            success = self.run_steps();
        }

        for step in &mut self.steps {
            step.uninitialize(&mut self.context);
        }

        if self.context.is_cancelled() {
            success = false;
        } else {
            self.context.set_state(if success {
                BuildState::Finished
            } else {
                BuildState::Error
            });
        }
        self.context.set_build_result(success);

        let summary = self.summary(success, timer.elapsed());
        self.write_summary(&summary)?;
        let message = if success {
            format!("Build completed in: {}", summary.elapsed)
        } else {
            "Build failed".to_string()
        };
        self.context.log(&message, BuildLoggerLevel::Info);
        Ok(success)
    }

    fn run_steps(&mut self) -> bool {
        let ctx = &mut self.context;
        for (i, step) in self.steps.iter_mut().enumerate() {
            if !step.enabled || !ctx.step_starts(step) {
                continue;
            }
            let result = match step.execute(ctx) {
                Ok(result) => result,
                Err(e) => {
                    ctx.log(&e.to_string(), BuildLoggerLevel::Error);
                    false
                }
            };
            if !result {
                ctx.log(
                    &format!("An error occurred in the step = {}", i),
                    BuildLoggerLevel::Error,
                );
                ctx.step_error(step);
                return false;
            }
            ctx.step_ends(step);
            ctx.log_blank();
        }
        true
    }

    pub fn summary(&self, success: bool, elapsed: std::time::Duration) -> BuildSummary {
        BuildSummary {
            help_name: self.settings.help_name.clone(),
            success,
            state: self.context.state(),
            elapsed: step::format_elapsed(elapsed),
            groups: self.build_groups().map(|group| group.name().to_string()).collect(),
            steps: self
                .steps
                .iter()
                .map(|step| StepSummary {
                    name: step.name().to_string(),
                    kind: step.kind().to_string(),
                    elapsed: step.elapsed().map(step::format_elapsed),
                })
                .collect(),
            outputs: self
                .context
                .outputs()
                .iter()
                .map(|(format, path)| OutputSummary {
                    format: *format,
                    path: path.clone(),
                })
                .collect(),
            processed_topics: self.context.processed_topics(),
        }
    }

    fn write_summary(&self, summary: &BuildSummary) -> Result<()> {
        let path = self.context.output_dir().join(SUMMARY_FILE);
        fs::write(&path, serde_json::to_string_pretty(summary)?)?;
        debug!("Wrote build summary to {}", path.display());
        Ok(())
    }

    /// Release the engines and context, then keep or delete the log file
    pub fn uninitialize(&mut self) {
        for engine in &mut self.engines {
            engine.uninitialize(&mut self.context);
        }
        self.engines.clear();
        self.steps.clear();

        let output_dir = self.context.output_dir().to_path_buf();
        self.context.uninitialize();
        if let Err(e) = self.context.loggers_mut().uninitialize() {
            warn!("Failed to close the build log: {}", e);
        }
        self.context.loggers_mut().clear();

        if let Some(log_file) = context::log_file_path(&self.settings).filter(|f| f.is_file()) {
            if let Err(e) = self.finish_log_file(&log_file, &output_dir) {
                warn!("Failed to finish the build log {}: {}", log_file.display(), e);
            }
        }
        self.initialized = false;
    }

    fn finish_log_file(&self, log_file: &Path, output_dir: &Path) -> std::io::Result<()> {
        if !self.settings.logging.keep_file {
            return fs::remove_file(log_file);
        }
        if output_dir.as_os_str().is_empty() {
            return Ok(());
        }
        let Some(file_name) = log_file.file_name() else {
            return Ok(());
        };
        let target = output_dir.join(file_name);
        if target != log_file {
            fs::rename(log_file, &target)?;
        }
        Ok(())
    }
}
