//! Sandcastle Assist
//!
//! Drives the Sandcastle help compiler as an ordered list of build steps and
//! merges the table of contents of every documentation group into one tree.

pub mod context;
pub mod engine;
pub mod error;
pub mod format;
pub mod group;
pub mod keyed;
pub mod logger;
pub mod paths;
pub mod project;
pub mod properties;
pub mod settings;
pub mod step;
pub mod toc;
pub mod xml;

pub use context::{BuildContext, BuildGroupContext, BuildState};
pub use engine::{BuildEngine, SandcastleEngine};
pub use error::{BuildError, Result};
pub use format::{BuildFormat, BuildFormatType, BuildStage};
pub use group::{BuildContentType, BuildGroup, BuildGroupType};
pub use logger::{
    BufferLogger, BuildLogger, BuildLoggerLevel, BuildLoggerVerbosity, BuildLoggers, ConsoleLogger,
    FileLogger,
};
pub use project::{BuildProject, BuildSummary};
pub use properties::BuildProperties;
pub use settings::BuildSettings;
pub use step::{
    BuildInsertType, BuildMultiStep, BuildStep, StepAction, StepDirectoryCopy, StepDirectoryCreate,
    StepDirectoryDelete, StepFunction, StepProcess, StepScope, StepTocMerge,
};
pub use toc::{BuildGroupTocInfo, BuildTocContext, BuildTopicTocInfo, TocMatch};
pub use xml::{XmlElement, XmlSerializable};
