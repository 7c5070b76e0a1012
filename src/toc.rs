//! Table of contents model.
//!
//! Each documentation group produces a TOC fragment file (`<topics>` with
//! nested `<topic id project file>` elements). The fragments are loaded into
//! [`BuildGroupTocInfo`] values, collected in a [`BuildTocContext`], and merged
//! into the single TOC consumed by the help compilers.

pub mod context;
pub mod group;
pub mod html;
pub mod topic;

pub use context::{BuildTocContext, TocMatch};
pub use group::{BuildGroupTocInfo, NAMESPACES_CONTAINER, TOPICS_TAG};
pub use html::{render_group, render_toc, TocHtmlOptions};
pub use topic::{BuildTopicTocInfo, TopicId, TopicRef, TopicSnapshot, TopicTree, TOPIC_TAG};

/// Default file name of the merged table of contents
pub const HELP_TOC_FILE: &str = "HelpToc.xml";
