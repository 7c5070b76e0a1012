//! The table of contents of a whole build.

use log::{debug, info};
use std::path::Path;

use super::group::{BuildGroupTocInfo, TOPICS_TAG};
use super::topic::{BuildTopicTocInfo, TopicRef, TopicTree};
use crate::error::Result;
use crate::keyed::{KeyedList, NamedItem};
use crate::properties::BuildProperties;
use crate::xml::XmlElement;

/// A topic found by [`BuildTocContext::get`], with the group that owns it
#[derive(Debug, Clone, Copy)]
pub struct TocMatch<'a> {
    /// `None` for related topics
    pub group: Option<&'a BuildGroupTocInfo>,
    pub topic: TopicRef<'a>,
}

/// Group TOCs and related topics of a build, keyed by name
#[derive(Debug, Clone, Default)]
pub struct BuildTocContext {
    groups: KeyedList<BuildGroupTocInfo>,
    related: TopicTree,
    properties: BuildProperties,
    loaded: bool,
    initialized: bool,
}

impl BuildTocContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&mut self) {
        self.initialized = true;
    }

    pub fn uninitialize(&mut self) {
        self.initialized = false;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }

    pub fn set_value(&mut self, key: &str, value: impl Into<String>) {
        self.properties.set(key, value);
    }

    pub fn groups(&self) -> impl Iterator<Item = &BuildGroupTocInfo> {
        self.groups.iter()
    }

    pub fn group(&self, name: &str) -> Option<&BuildGroupTocInfo> {
        self.groups.get(name)
    }

    pub fn group_mut(&mut self, name: &str) -> Option<&mut BuildGroupTocInfo> {
        self.groups.get_mut(name)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn related_topics(&self) -> impl Iterator<Item = TopicRef<'_>> + '_ {
        self.related.roots().iter().map(move |&id| self.related.get(id))
    }

    /// Add a group TOC; a group with the same name is replaced at its index
    pub fn add_group(&mut self, group: BuildGroupTocInfo) {
        let name = group.name().to_string();
        if self.groups.add(group).is_some() {
            debug!("Replaced TOC group '{}'", name);
        }
    }

    /// Add a related topic; a topic with the same name is replaced at its index
    pub fn add_related(&mut self, topic: BuildTopicTocInfo) {
        if topic.name().is_empty() {
            return;
        }
        match self.related.child(None, topic.name()) {
            Some(existing) => *self.related.info_mut(existing) = topic,
            None => {
                self.related.add_new(None, topic);
            }
        }
    }

    /// Look a topic up by name: related topics, then the top-level topics
    /// of each group, then a recursive search through every group
    pub fn get(&self, name: &str) -> Option<TocMatch<'_>> {
        if name.is_empty() {
            return None;
        }
        if let Some(id) = self.related.child(None, name) {
            return Some(TocMatch {
                group: None,
                topic: self.related.get(id),
            });
        }
        for group in self.groups.iter() {
            if let Some(id) = group.get(name) {
                return Some(TocMatch {
                    group: Some(group),
                    topic: group.tree().get(id),
                });
            }
        }
        for group in self.groups.iter() {
            if let Some(id) = group.find(name, true) {
                return Some(TocMatch {
                    group: Some(group),
                    topic: group.tree().get(id),
                });
            }
        }
        None
    }

    /// The first group whose topics contain `name` at any depth
    pub fn group_of(&self, name: &str) -> Option<&BuildGroupTocInfo> {
        self.groups
            .iter()
            .find(|group| group.find(name, true).is_some())
    }

    pub fn contains(&self, group_name: &str) -> bool {
        !group_name.is_empty() && self.groups.contains(group_name)
    }

    pub fn index_of(&self, group_name: &str) -> Option<usize> {
        self.groups.index_of(group_name)
    }

    pub fn remove_group(&mut self, group_name: &str) -> bool {
        self.groups.remove(group_name).is_some()
    }

    pub fn remove_related(&mut self, name: &str) -> bool {
        match self.related.child(None, name) {
            Some(id) => self.related.remove(None, id),
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.groups.clear();
        self.related.clear();
        self.loaded = false;
    }

    /// Load every group from its TOC file, once
    pub fn load_all(&mut self) -> Result<()> {
        if self.loaded || self.groups.is_empty() {
            return Ok(());
        }
        for group in self.groups.iter_mut() {
            group.load()?;
        }
        self.loaded = true;
        Ok(())
    }

    /// Write loaded groups back to their TOC files
    pub fn save_all(&self) -> Result<()> {
        if !self.loaded {
            return Ok(());
        }
        for group in self.groups.iter() {
            group.save()?;
        }
        Ok(())
    }

    /// Total number of topics across all groups
    pub fn topic_count(&self) -> usize {
        self.groups.iter().map(|group| group.tree().count(None)).sum()
    }

    /// One `<topics>` document with the topics of every group, in order
    pub fn merged_xml(&self) -> XmlElement {
        let mut merged = XmlElement::new(TOPICS_TAG);
        for group in self.groups.iter() {
            merged.children.extend(group.write_topics().children);
        }
        merged
    }

    /// Write the merged TOC; returns the number of topics written
    pub fn write_merged(&self, path: &Path) -> Result<usize> {
        self.merged_xml().write_file(path)?;
        let count = self.topic_count();
        info!("Merged {} TOC topics into {}", count, path.display());
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::BuildGroupType;
    use crate::keyed::NamedItem;
    use proptest::prelude::*;

    fn topic(name: &str) -> BuildTopicTocInfo {
        BuildTopicTocInfo::new(name, name, None)
    }

    fn group(name: &str, topics: &[&str]) -> BuildGroupTocInfo {
        let mut group = BuildGroupTocInfo::new(name, BuildGroupType::Conceptual);
        for &name in topics {
            group.add(topic(name));
        }
        group
    }

    #[test]
    fn test_add_group_replaces_in_place() {
        let mut context = BuildTocContext::new();
        context.add_group(group("A", &["a1"]));
        context.add_group(group("B", &["b1"]));
        context.add_group(group("C", &["c1"]));

        context.add_group(group("b", &["b2"]));

        assert_eq!(context.group_count(), 3);
        assert_eq!(context.index_of("B"), Some(1));
        let names: Vec<&str> = context.groups().map(|g| g.name()).collect();
        assert_eq!(names, vec!["A", "b", "C"]);
        assert!(context.get("b1").is_none());
        assert!(context.get("b2").is_some());
    }

    #[test]
    fn test_lookup_order() {
        let mut context = BuildTocContext::new();
        let mut api = BuildGroupTocInfo::new("Api", BuildGroupType::Reference);
        let root = api.add(topic("R:Project"));
        api.tree_mut().add_new(Some(root), topic("Shared"));
        context.add_group(api);
        context.add_group(group("Guide", &["Shared"]));

        // A direct top-level hit in a later group wins over a deep hit
        let found = context.get("shared").unwrap();
        assert_eq!(found.group.unwrap().name(), "Guide");

        context.add_related(BuildTopicTocInfo::new("Shared", "related", None));
        let found = context.get("Shared").unwrap();
        assert!(found.group.is_none());
        assert_eq!(found.topic.source(), "related");

        assert!(context.remove_related("shared"));
        assert_eq!(context.get("Shared").unwrap().group.unwrap().name(), "Guide");
        assert!(context.get("").is_none());
    }

    #[test]
    fn test_related_replace_in_place() {
        let mut context = BuildTocContext::new();
        context.add_related(topic("x"));
        context.add_related(topic("y"));
        context.add_related(BuildTopicTocInfo::new("X", "x2", None));

        let related: Vec<(&str, &str)> = context
            .related_topics()
            .map(|t| (t.name(), t.source()))
            .collect();
        assert_eq!(related, vec![("X", "x2"), ("y", "y")]);

        for round in 0..10 {
            context.add_related(BuildTopicTocInfo::new("x", &format!("x{}", round), None));
        }
        assert_eq!(context.related.node_count(), 2);
        assert_eq!(context.get("X").unwrap().topic.source(), "x9");
    }

    #[test]
    fn test_group_of_and_remove() {
        let mut context = BuildTocContext::new();
        let mut api = BuildGroupTocInfo::new("Api", BuildGroupType::Reference);
        let root = api.add(topic("R:Project"));
        api.tree_mut().add_new(Some(root), topic("N:Tools"));
        context.add_group(group("Guide", &["Intro"]));
        context.add_group(api);

        assert_eq!(context.group_of("N:Tools").unwrap().name(), "Api");
        assert!(context.group_of("missing").is_none());
        assert!(context.contains("api"));
        assert!(context.remove_group("API"));
        assert!(!context.contains("Api"));
        assert_eq!(context.topic_count(), 1);

        context.clear();
        assert!(context.is_empty());
    }

    #[test]
    fn test_merged_xml_keeps_group_order() {
        let mut context = BuildTocContext::new();
        context.add_group(group("Guide", &["Intro", "Setup"]));
        context.add_group(group("Api", &["R:Project"]));

        let merged = context.merged_xml();
        let ids: Vec<&str> = merged.children.iter().filter_map(|t| t.attr("id")).collect();
        assert_eq!(ids, vec!["Intro", "Setup", "R:Project"]);
    }

    proptest! {
        #[test]
        fn prop_re_adding_group_keeps_position(count in 1usize..8, seed in 0usize..8) {
            let mut context = BuildTocContext::new();
            for i in 0..count {
                let topic_name = format!("t{i}");
                context.add_group(group(&format!("G{i}"), &[topic_name.as_str()]));
            }
            let target = seed % count;
            context.add_group(group(&format!("g{target}"), &["fresh"]));

            prop_assert_eq!(context.group_count(), count);
            prop_assert_eq!(context.index_of(&format!("G{target}")), Some(target));
            let found = context.get("fresh").unwrap();
            prop_assert_eq!(found.group.map(|g| g.name().to_string()), Some(format!("g{}", target)));
            let replaced = format!("t{}", target);
            prop_assert!(context.get(&replaced).is_none());
        }
    }
}
