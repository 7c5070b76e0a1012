//! Build engines: create the steps that turn a group into help topics.

use anyhow::Context;
use log::debug;
use std::fs;
use std::path::PathBuf;

use crate::context::{BuildContext, BuildGroupContext};
use crate::group::{BuildContentType, BuildGroup, BuildGroupType};
use crate::keyed::NamedItem;
use crate::paths;
use crate::settings::BuildEngineType;
use crate::step::{BuildStep, StepDirectoryCopy, StepFunction, StepProcess, StepScope};
use crate::toc::BuildGroupTocInfo;

/// The Sandcastle assembler run for every group
pub const BUILD_ASSEMBLER: &str = "BuildAssembler.exe";

/// Folder of the assembled output in the working directory
pub const OUTPUT_FOLDER: &str = "Output";

/// Creates the steps for the groups of one kind
pub trait BuildEngine: Send {
    fn engine_type(&self) -> BuildEngineType;

    /// Prepare the group contexts; false stops the build
    fn initialize(&mut self, ctx: &mut BuildContext) -> bool;

    fn create_initial_steps(&self, ctx: &BuildContext, group: &BuildGroup) -> Option<BuildStep>;

    /// Steps resolving links across groups, run after every initial step
    fn create_link_steps(&self, _ctx: &BuildContext) -> Option<BuildStep> {
        None
    }

    fn create_final_steps(&self, ctx: &BuildContext, group: &BuildGroup) -> Option<BuildStep>;

    fn uninitialize(&mut self, _ctx: &mut BuildContext) {}
}

/// Engine running `BuildAssembler.exe` for reference or conceptual groups
#[derive(Debug)]
pub struct SandcastleEngine {
    engine_type: BuildEngineType,
    groups: Vec<String>,
    initialized: bool,
}

impl SandcastleEngine {
    pub fn new(engine_type: BuildEngineType) -> Self {
        Self {
            engine_type,
            groups: Vec::new(),
            initialized: false,
        }
    }

    pub fn for_group_type(group_type: BuildGroupType) -> Self {
        Self::new(group_type.into())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Names of the groups handled by this engine
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    fn handles(&self, group_type: BuildGroupType) -> bool {
        BuildEngineType::from(group_type) == self.engine_type
    }

    fn file_prefix(&self) -> &'static str {
        match self.engine_type {
            BuildEngineType::Reference => "Api",
            BuildEngineType::Conceptual => "Topics",
            BuildEngineType::Custom => "Custom",
        }
    }
}

impl BuildEngine for SandcastleEngine {
    fn engine_type(&self) -> BuildEngineType {
        self.engine_type
    }

    fn initialize(&mut self, ctx: &mut BuildContext) -> bool {
        if self.initialized {
            return true;
        }
        if ctx.settings().engine(self.engine_type).is_none() {
            debug!("No {} engine settings", self.engine_type);
            return false;
        }

        self.groups = ctx
            .group_contexts()
            .filter(|group| self.handles(group.group_type()))
            .map(|group| group.name().to_string())
            .collect();
        if self.groups.is_empty() {
            return false;
        }

        // Numbered file names only when the engine has several groups
        let prefix = self.file_prefix();
        let numbered = self.groups.len() > 1;
        for (i, name) in self.groups.iter().enumerate() {
            let index = if numbered { (i + 1).to_string() } else { String::new() };
            if let Some(group) = ctx.group_context_mut(name) {
                group.set("$TocFile", format!("{prefix}Toc{index}.xml"));
                group.set("$ManifestFile", format!("{prefix}Manifest{index}.xml"));
                group.set("$ConfigurationFile", format!("{prefix}BuildAssembler{index}.config"));
                group.set("$SharedContentFile", format!("{prefix}SharedContent{index}.xml"));
            }
        }
        self.initialized = true;
        true
    }

    fn create_initial_steps(&self, ctx: &BuildContext, group: &BuildGroup) -> Option<BuildStep> {
        if !self.initialized || !self.handles(group.group_type()) {
            return None;
        }
        let group_ctx = ctx.group_context(group.name())?;
        let working_dir = ctx.working_dir();
        let mut steps = Vec::new();

        let mut copy = StepDirectoryCopy::new();
        for content in group.contents_of(BuildContentType::Resources) {
            let source = paths::resolve(ctx.base_dir(), &content.path.to_string_lossy());
            copy.add(source.display().to_string(), OUTPUT_FOLDER);
        }
        for content in group.contents_of(BuildContentType::Media) {
            let source = paths::resolve(ctx.base_dir(), &content.path.to_string_lossy());
            copy.add(source.display().to_string(), format!("{OUTPUT_FOLDER}/media"));
        }
        if !copy.copies.is_empty() {
            steps.push(
                BuildStep::new(format!("{}.Content", group.name()), copy)
                    .with_working_dir(working_dir)
                    .with_message("Copying the group resources"),
            );
        }

        // The merge step consumes the TOC in the working directory
        if let (Some(source), Some(target)) = (&group.toc_file, group_ctx.path_of("$TocFile")) {
            let source = paths::resolve(ctx.base_dir(), &source.to_string_lossy());
            let copy_toc = StepFunction::new("StepCopyToc", move |_ctx: &mut BuildContext, _scope: &StepScope<'_>| {
                fs::copy(&source, &target).with_context(|| {
                    format!("Failed to copy {} to {}", source.display(), target.display())
                })?;
                Ok(true)
            });
            let mut step = BuildStep::new(format!("{}.Toc", group.name()), copy_toc);
            step.log_time_span = false;
            steps.push(step);
        }

        let config = group_ctx.get("$ConfigurationFile").unwrap_or_default();
        let manifest = group_ctx.get("$ManifestFile").unwrap_or_default();
        let mut assembler = StepProcess::new(ctx.tools_dir().join(BUILD_ASSEMBLER))
            .args([format!("/config:{config}"), manifest.to_string()]);
        assembler.copyright_notice = 2;
        steps.push(
            BuildStep::new(format!("{}.Assembler", group.name()), assembler)
                .with_working_dir(working_dir)
                .with_message(format!("For the group: {}", group.name())),
        );

        Some(
            BuildStep::multi(format!("{}.Initial", group.name()), steps)
                .with_title(format!("Building the {} topics", group.group_type())),
        )
    }

    /// Register the group's TOC fragment in the build TOC
    fn create_final_steps(&self, ctx: &BuildContext, group: &BuildGroup) -> Option<BuildStep> {
        if !self.initialized || !self.handles(group.group_type()) || group.exclude_toc {
            return None;
        }
        let toc_file = group_toc_file(ctx, group)?;
        let name = group.name().to_string();
        let group_type = group.group_type();

        let register = StepFunction::new("StepRegisterToc", move |ctx: &mut BuildContext, _scope: &StepScope<'_>| {
            if !toc_file.is_file() {
                debug!("No TOC left to register for group '{}'", name);
                return Ok(true);
            }
            let mut toc = BuildGroupTocInfo::new(name.as_str(), group_type).with_toc_file(&toc_file);
            toc.load()
                .with_context(|| format!("Failed to read the TOC of group '{}'", name))?;
            debug!("Registered {} TOC topics of group '{}'", toc.len(), name);
            ctx.toc_mut().add_group(toc);
            Ok(true)
        });
        let mut step = BuildStep::new(format!("{}.Final", group.name()), register);
        step.log_time_span = false;
        Some(step)
    }

    fn uninitialize(&mut self, _ctx: &mut BuildContext) {
        self.groups.clear();
        self.initialized = false;
    }
}

/// The TOC file of a group in the working directory, else the file
/// configured on the group
pub fn group_toc_file(ctx: &BuildContext, group: &BuildGroup) -> Option<PathBuf> {
    ctx.group_context(group.name())
        .and_then(|group_ctx: &BuildGroupContext| group_ctx.path_of("$TocFile"))
        .or_else(|| {
            let toc_file = group.toc_file.as_ref()?;
            Some(paths::resolve(ctx.base_dir(), &toc_file.to_string_lossy()))
        })
}
