//! Step producing the merged table of contents.

use anyhow::Context;
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};

use super::{StepAction, StepScope};
use crate::context::BuildContext;
use crate::group::BuildGroupType;
use crate::logger::BuildLoggerLevel;
use crate::toc::{HELP_TOC_FILE, TOPICS_TAG, TOPIC_TAG};
use crate::xml::XmlElement;

/// Id of the topic wrapping the reference TOC in rooted builds
pub const ROOT_TOPIC_ID: &str = "R:Project";

/// Merges the TOC of the build into one `<topics>` file.
///
/// When the build context holds group TOCs they are merged from there;
/// otherwise the listed TOC files are combined.
#[derive(Debug, Clone, Default)]
pub struct StepTocMerge {
    /// Merged file; defaults to `HelpToc.xml` in the working directory
    pub merged_toc: Option<String>,
    tocs: Vec<(String, BuildGroupType)>,
    root_title: Option<String>,
}

impl StepTocMerge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_merged_toc(mut self, merged_toc: impl Into<String>) -> Self {
        self.merged_toc = Some(merged_toc.into());
        self
    }

    /// Queue a TOC file; empty paths are ignored
    pub fn add(&mut self, toc_file: impl Into<String>, group_type: BuildGroupType) {
        let toc_file = toc_file.into();
        if !toc_file.is_empty() {
            self.tocs.push((toc_file, group_type));
        }
    }

    pub fn tocs(&self) -> impl Iterator<Item = &str> {
        self.tocs.iter().map(|(file, _)| file.as_str())
    }

    pub fn is_rooted(&self) -> bool {
        self.root_title.is_some()
    }

    fn rename(&self, source: &Path, merged: &Path) -> anyhow::Result<Option<usize>> {
        if !source.is_file() {
            debug!("Single TOC file {} does not exist", source.display());
            return Ok(None);
        }
        let count = count_topics(&XmlElement::read_file(source)?);
        if merged.exists() {
            fs::remove_file(merged)
                .with_context(|| format!("Failed to replace {}", merged.display()))?;
        }
        fs::rename(source, merged).with_context(|| {
            format!("Failed to move {} to {}", source.display(), merged.display())
        })?;
        Ok(Some(count))
    }

    fn merge(&self, files: &[(PathBuf, BuildGroupType)], merged: &Path) -> anyhow::Result<usize> {
        let mut topics = XmlElement::new(TOPICS_TAG);
        let mut root: Option<XmlElement> = None;
        let mut count = 0;

        for (file, group_type) in files {
            if !file.is_file() {
                debug!("Skipping missing TOC file {}", file.display());
                continue;
            }
            let document = XmlElement::read_file(file)?;
            for topic in document.children_named(TOPIC_TAG) {
                count += count_topics(topic) + 1;
                match (&self.root_title, group_type) {
                    (Some(title), BuildGroupType::Reference) => root
                        .get_or_insert_with(|| root_topic(title))
                        .push(topic.clone()),
                    _ => topics.push(topic.clone()),
                }
            }
        }

        if let Some(root) = root {
            count += 1;
            topics.push(root);
        }
        topics.write_file(merged)?;
        Ok(count)
    }
}

fn root_topic(title: &str) -> XmlElement {
    XmlElement::new(TOPIC_TAG)
        .with_attr("id", ROOT_TOPIC_ID)
        .with_attr("file", "R_Project")
        .with_attr("title", title)
}

/// Number of `<topic>` elements below `element`
fn count_topics(element: &XmlElement) -> usize {
    element
        .children_named(TOPIC_TAG)
        .map(|topic| 1 + count_topics(topic))
        .sum()
}

impl StepAction for StepTocMerge {
    fn kind(&self) -> &'static str {
        "StepTocMerge"
    }

    fn initialize(&mut self, ctx: &mut BuildContext, _scope: &StepScope<'_>) -> bool {
        let settings = ctx.settings();
        self.root_title = (settings.root_namespace_container
            && !settings.root_namespace_title.is_empty())
        .then(|| settings.root_namespace_title.clone());
        true
    }

    fn execute(&mut self, ctx: &mut BuildContext, scope: &StepScope<'_>) -> anyhow::Result<bool> {
        let merged = scope.expand_path(self.merged_toc.as_deref().unwrap_or(HELP_TOC_FILE));

        if !ctx.toc().is_empty() {
            ctx.toc_mut().load_all()?;
            let count = ctx.toc().write_merged(&merged)?;
            ctx.add_processed_topics(count);
            return Ok(true);
        }

        let files: Vec<(PathBuf, BuildGroupType)> = self
            .tocs
            .iter()
            .map(|(file, group_type)| (scope.expand_path(file), *group_type))
            .collect();

        let count = match files.as_slice() {
            [] => {
                ctx.log("There is no table of contents to merge.", BuildLoggerLevel::Warn);
                return Ok(false);
            }
            [(single, _)] if !self.is_rooted() => match self.rename(single, &merged)? {
                Some(count) => count,
                None => return Ok(false),
            },
            _ => self.merge(&files, &merged)?,
        };

        info!("Merged {} TOC files into {}", files.len(), merged.display());
        ctx.add_processed_topics(count);
        Ok(true)
    }

    fn uninitialize(&mut self, _ctx: &mut BuildContext) {
        self.root_title = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::BuildStep;
    use crate::testing::test_context;
    use crate::toc::{BuildGroupTocInfo, BuildTopicTocInfo};
    use tempfile::TempDir;

    const CONCEPTUAL: &str = r#"<topics>
  <topic id="intro" file="intro">
    <topic id="setup" file="setup" />
  </topic>
</topics>"#;

    const REFERENCE: &str = r#"<topics>
  <topic id="N:Sandcastle" project="_Namespaces" file="N_Sandcastle">
    <topic id="T:Sandcastle.BuildStep" file="T_BuildStep" />
  </topic>
</topics>"#;

    fn step(merge: StepTocMerge, working_dir: &Path) -> BuildStep {
        BuildStep::new("TocMerge", merge)
            .with_working_dir(working_dir)
            .with_message("Merging Table of Contents")
    }

    #[test]
    fn test_merges_files_in_order() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("TopicsToc.xml"), CONCEPTUAL).unwrap();
        fs::write(temp_dir.path().join("ApiToc.xml"), REFERENCE).unwrap();

        let mut merge = StepTocMerge::new();
        merge.add("TopicsToc.xml", BuildGroupType::Conceptual);
        merge.add("ApiToc.xml", BuildGroupType::Reference);
        merge.add("Missing.xml", BuildGroupType::Conceptual);
        merge.add("", BuildGroupType::Conceptual);
        assert_eq!(merge.tocs().count(), 3);

        let (mut ctx, log) = test_context();
        let mut step = step(merge, temp_dir.path());
        assert!(step.initialize(&mut ctx));
        assert!(step.execute(&mut ctx).unwrap());
        assert!(log.contains("Info: Merging Table of Contents"));

        let merged = XmlElement::read_file(&temp_dir.path().join(HELP_TOC_FILE)).unwrap();
        let ids: Vec<&str> = merged
            .children_named(TOPIC_TAG)
            .filter_map(|t| t.attr("id"))
            .collect();
        assert_eq!(ids, vec!["intro", "N:Sandcastle"]);
        assert_eq!(ctx.processed_topics(), 4);
    }

    #[test]
    fn test_single_file_is_renamed() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("TopicsToc.xml"), CONCEPTUAL).unwrap();

        let mut merge = StepTocMerge::new().with_merged_toc("Merged.xml");
        merge.add("TopicsToc.xml", BuildGroupType::Conceptual);

        let (mut ctx, _log) = test_context();
        let mut step = step(merge, temp_dir.path());
        assert!(step.initialize(&mut ctx));
        assert!(step.execute(&mut ctx).unwrap());
        assert!(!temp_dir.path().join("TopicsToc.xml").exists());
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("Merged.xml")).unwrap(),
            CONCEPTUAL
        );
        assert_eq!(ctx.processed_topics(), 2);
    }

    #[test]
    fn test_nothing_to_merge_fails() {
        let temp_dir = TempDir::new().unwrap();
        let (mut ctx, _log) = test_context();

        let mut empty = step(StepTocMerge::new(), temp_dir.path());
        assert!(empty.initialize(&mut ctx));
        assert!(!empty.execute(&mut ctx).unwrap());

        let mut merge = StepTocMerge::new();
        merge.add("Missing.xml", BuildGroupType::Conceptual);
        let mut missing = step(merge, temp_dir.path());
        assert!(missing.initialize(&mut ctx));
        assert!(!missing.execute(&mut ctx).unwrap());
    }

    #[test]
    fn test_rooted_reference_toc() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("TopicsToc.xml"), CONCEPTUAL).unwrap();
        fs::write(temp_dir.path().join("ApiToc.xml"), REFERENCE).unwrap();

        let (mut ctx, _log) = test_context();
        ctx.settings_mut().root_namespace_container = true;
        ctx.settings_mut().root_namespace_title = "Class Library".to_string();

        let mut merge = StepTocMerge::new();
        merge.add("TopicsToc.xml", BuildGroupType::Conceptual);
        merge.add("ApiToc.xml", BuildGroupType::Reference);
        let mut step = step(merge, temp_dir.path());
        assert!(step.initialize(&mut ctx));
        assert!(step.execute(&mut ctx).unwrap());

        let merged = XmlElement::read_file(&temp_dir.path().join(HELP_TOC_FILE)).unwrap();
        let top: Vec<&XmlElement> = merged.children_named(TOPIC_TAG).collect();
        assert_eq!(top.len(), 2);
        assert_eq!(top[1].attr("id"), Some(ROOT_TOPIC_ID));
        assert_eq!(top[1].attr("title"), Some("Class Library"));
        assert_eq!(
            top[1].child(TOPIC_TAG).and_then(|t| t.attr("id")),
            Some("N:Sandcastle")
        );
    }

    #[test]
    fn test_merges_from_toc_context() {
        let temp_dir = TempDir::new().unwrap();
        let api_toc = temp_dir.path().join("ApiToc.xml");
        fs::write(&api_toc, REFERENCE).unwrap();

        let (mut ctx, _log) = test_context();
        let mut guide = BuildGroupTocInfo::new("Guide", BuildGroupType::Conceptual);
        guide.add(BuildTopicTocInfo::new("welcome", "welcome", None));
        ctx.toc_mut().add_group(guide);
        ctx.toc_mut()
            .add_group(BuildGroupTocInfo::new("Api", BuildGroupType::Reference).with_toc_file(&api_toc));

        let mut step = step(StepTocMerge::new(), temp_dir.path());
        assert!(step.initialize(&mut ctx));
        assert!(step.execute(&mut ctx).unwrap());

        let merged = XmlElement::read_file(&temp_dir.path().join(HELP_TOC_FILE)).unwrap();
        let ids: Vec<&str> = merged
            .children_named(TOPIC_TAG)
            .filter_map(|t| t.attr("id"))
            .collect();
        assert_eq!(ids, vec!["welcome", "N:Sandcastle"]);
        assert_eq!(ctx.processed_topics(), 3);
    }
}
