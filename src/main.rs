use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Duration;

use sandcastle_assist::logger::BuildLoggerVerbosity;
use sandcastle_assist::toc::{TopicId, TopicTree};
use sandcastle_assist::{
    BuildContext, BuildGroupTocInfo, BuildGroupType, BuildLogger, BuildProject, BuildSettings,
    BuildStep, ConsoleLogger, StepTocMerge,
};

/// Sandcastle build assistant
#[derive(Parser)]
#[command(name = "sandcastle-assist")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Write detailed build output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the help of a project file
    Build {
        /// Path to the project file
        project: PathBuf,
    },

    /// Initialize a project and print the planned steps as JSON
    Check {
        /// Path to the project file
        project: PathBuf,
    },

    /// Merge TOC files into one
    MergeToc {
        /// The merged TOC file
        output: PathBuf,

        /// Conceptual TOC files, merged in order
        tocs: Vec<PathBuf>,

        /// Reference TOC files, merged after the conceptual ones
        #[arg(short, long)]
        reference: Vec<PathBuf>,

        /// Wrap the reference topics in a root topic with this title
        #[arg(long)]
        root_title: Option<String>,
    },

    /// Print the topics of a TOC file
    Toc {
        /// Path to the TOC file
        toc: PathBuf,

        /// Print the topic tree as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let verbosity = if cli.verbose {
        BuildLoggerVerbosity::Detailed
    } else {
        BuildLoggerVerbosity::Normal
    };

    match cli.command {
        Commands::Build { project } => cmd_build(&project, verbosity),
        Commands::Check { project } => cmd_check(&project),
        Commands::MergeToc {
            output,
            tocs,
            reference,
            root_title,
        } => cmd_merge_toc(&output, &tocs, &reference, root_title, verbosity),
        Commands::Toc { toc, json } => cmd_toc(&toc, json),
    }
}

fn load_project(path: &Path, verbosity: BuildLoggerVerbosity) -> Result<BuildProject> {
    let mut project = BuildProject::load(path)
        .with_context(|| format!("Failed to load project {}", path.display()))?;
    project.settings_mut().logging.verbosity = verbosity;
    Ok(project)
}

fn cmd_build(path: &Path, verbosity: BuildLoggerVerbosity) -> Result<()> {
    let mut project = load_project(path, verbosity)?;
    if let Err(e) = project.initialize() {
        project.uninitialize();
        return Err(e.into());
    }
    let result = project.build();
    project.uninitialize();

    if !result? {
        error!("The build of {} failed", path.display());
        std::process::exit(1);
    }
    Ok(())
}

fn cmd_check(path: &Path) -> Result<()> {
    let mut project = load_project(path, BuildLoggerVerbosity::Quiet)?;
    if let Err(e) = project.initialize() {
        project.uninitialize();
        return Err(e.into());
    }
    let summary = project.summary(true, Duration::ZERO);
    project.uninitialize();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_merge_toc(
    output: &Path,
    tocs: &[PathBuf],
    reference: &[PathBuf],
    root_title: Option<String>,
    verbosity: BuildLoggerVerbosity,
) -> Result<()> {
    let mut settings = BuildSettings::default();
    if let Some(title) = root_title {
        settings.root_namespace_container = true;
        settings.root_namespace_title = title;
    }

    let mut merge = StepTocMerge::new().with_merged_toc(output.display().to_string());
    for toc in tocs {
        merge.add(toc.display().to_string(), BuildGroupType::Conceptual);
    }
    for toc in reference {
        merge.add(toc.display().to_string(), BuildGroupType::Reference);
    }

    let mut ctx = BuildContext::new(settings);
    ctx.add_logger(Box::new(ConsoleLogger::new(verbosity)));
    ctx.loggers_mut().initialize()?;

    let working_dir = std::env::current_dir()?;
    let mut step = BuildStep::new("TocMerge", merge)
        .with_working_dir(working_dir)
        .with_message("Merging Table of Contents");
    let merged = step.initialize(&mut ctx) && step.execute(&mut ctx)?;
    step.uninitialize(&mut ctx);
    ctx.loggers_mut().uninitialize()?;

    if !merged {
        anyhow::bail!("No table of contents was merged into {}", output.display());
    }
    info!("{} topics written to {}", ctx.processed_topics(), output.display());
    Ok(())
}

fn cmd_toc(path: &Path, json: bool) -> Result<()> {
    if !path.is_file() {
        anyhow::bail!("TOC file {} not found", path.display());
    }
    let mut toc = BuildGroupTocInfo::new("Toc", BuildGroupType::Conceptual).with_toc_file(path);
    toc.load()
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let tree = toc.tree();
    if json {
        let snapshots: Vec<_> = tree.roots().iter().map(|&id| tree.snapshot(id)).collect();
        println!("{}", serde_json::to_string_pretty(&snapshots)?);
        return Ok(());
    }

    for &id in tree.roots() {
        print_topic(tree, id, 0);
    }
    println!("{} topics", tree.count(None));
    Ok(())
}

fn print_topic(tree: &TopicTree, id: TopicId, depth: usize) {
    let info = tree.info(id);
    println!("{}{} ({})", "  ".repeat(depth), info.name(), info.source());
    for &child in tree.children(Some(id)) {
        print_topic(tree, child, depth + 1);
    }
}
