//! Table of contents of one documentation group.

use log::debug;
use std::path::{Path, PathBuf};

use super::topic::{BuildTopicTocInfo, TopicId, TopicRef, TopicTree, TOPIC_TAG};
use crate::error::{BuildError, Result};
use crate::group::BuildGroupType;
use crate::keyed::NamedItem;
use crate::xml::XmlElement;

pub const TOPICS_TAG: &str = "topics";

/// Container value marking the namespace topics of a reference TOC
pub const NAMESPACES_CONTAINER: &str = "_Namespaces";

/// The top-level topics of one group, loaded from its TOC fragment
#[derive(Debug, Clone)]
pub struct BuildGroupTocInfo {
    name: String,
    group_type: BuildGroupType,
    toc_file: Option<PathBuf>,
    tree: TopicTree,
    namespaces: Vec<TopicId>,
    loaded: bool,
}

impl BuildGroupTocInfo {
    pub fn new(name: impl Into<String>, group_type: BuildGroupType) -> Self {
        Self {
            name: name.into(),
            group_type,
            toc_file: None,
            tree: TopicTree::new(),
            namespaces: Vec::new(),
            loaded: false,
        }
    }

    pub fn with_toc_file(mut self, toc_file: impl Into<PathBuf>) -> Self {
        self.toc_file = Some(toc_file.into());
        self
    }

    pub fn group_type(&self) -> BuildGroupType {
        self.group_type
    }

    pub fn toc_file(&self) -> Option<&Path> {
        self.toc_file.as_deref()
    }

    pub fn tree(&self) -> &TopicTree {
        &self.tree
    }

    pub fn tree_mut(&mut self) -> &mut TopicTree {
        &mut self.tree
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Number of top-level topics
    pub fn len(&self) -> usize {
        self.tree.roots().len()
    }

    pub fn topics(&self) -> impl Iterator<Item = TopicRef<'_>> + '_ {
        self.tree.roots().iter().map(move |&id| self.tree.get(id))
    }

    /// Namespace topics of a reference TOC
    pub fn namespaces(&self) -> impl Iterator<Item = TopicRef<'_>> + '_ {
        self.namespaces
            .iter()
            .filter(move |&&id| self.tree.is_attached(id))
            .map(move |&id| self.tree.get(id))
    }

    /// The single top-level topic without a container, if any
    pub fn root_topic(&self) -> Option<TopicRef<'_>> {
        match self.tree.roots() {
            [only] if self.tree.info(*only).container().map_or(true, str::is_empty) => {
                Some(self.tree.get(*only))
            }
            _ => None,
        }
    }

    pub fn is_rooted(&self) -> bool {
        self.root_topic().is_some()
    }

    /// Top-level topic by name
    pub fn get(&self, name: &str) -> Option<TopicId> {
        self.tree.child(None, name)
    }

    pub fn find(&self, name: &str, recursive: bool) -> Option<TopicId> {
        self.tree.find(None, name, recursive)
    }

    pub fn add(&mut self, info: BuildTopicTocInfo) -> TopicId {
        self.tree.add_new(None, info)
    }

    pub fn add_range(&mut self, items: Vec<BuildTopicTocInfo>) {
        for item in items {
            self.add(item);
        }
    }

    /// Append copies of every top-level topic of `other`
    pub fn add_group(&mut self, other: &BuildGroupTocInfo) {
        let copies = self.tree.graft_all(&other.tree);
        self.tree.add_range(None, &copies);
    }

    pub fn insert(&mut self, index: usize, info: BuildTopicTocInfo) -> TopicId {
        let id = self.tree.create(info);
        self.tree.insert(None, index, id);
        id
    }

    pub fn insert_group(&mut self, index: usize, other: &BuildGroupTocInfo) {
        let copies = self.tree.graft_all(&other.tree);
        self.tree.insert_range(None, index, &copies);
    }

    pub fn replace(&mut self, item_out: TopicId, items_in: Vec<BuildTopicTocInfo>) -> bool {
        if !self.tree.is_attached(item_out) {
            return false;
        }
        let ids: Vec<TopicId> = items_in.into_iter().map(|info| self.tree.create(info)).collect();
        self.tree.replace(None, item_out, &ids)
    }

    /// Replace `item_out` with copies of every top-level topic of `other`
    pub fn replace_with_group(&mut self, item_out: TopicId, other: &BuildGroupTocInfo) -> bool {
        if !self.tree.is_attached(item_out) {
            return false;
        }
        let copies = self.tree.graft_all(&other.tree);
        self.tree.replace(None, item_out, &copies)
    }

    pub fn remove(&mut self, item: TopicId) -> bool {
        self.tree.remove(None, item)
    }

    pub fn index_of(&self, item: TopicId) -> Option<usize> {
        self.tree.index_of(None, item)
    }

    pub fn clear(&mut self) {
        self.tree.clear();
        self.namespaces.clear();
    }

    /// Read the TOC file once; a missing file leaves the group empty
    pub fn load(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }
        let Some(toc_file) = self.toc_file.clone() else {
            return Ok(());
        };
        if !toc_file.is_file() {
            debug!("TOC file {} not found for group '{}'", toc_file.display(), self.name);
            return Ok(());
        }

        let root = XmlElement::read_file(&toc_file)?;
        self.read_topics(&root).map_err(|e| e.with_path(&toc_file))?;
        self.loaded = true;
        debug!(
            "Loaded {} topics of group '{}' from {}",
            self.tree.count(None),
            self.name,
            toc_file.display()
        );
        Ok(())
    }

    /// Write the topics back to the TOC file when loaded
    pub fn save(&self) -> Result<()> {
        if !self.loaded {
            return Ok(());
        }
        if let Some(toc_file) = &self.toc_file {
            self.write_topics().write_file(toc_file)?;
        }
        Ok(())
    }

    pub fn unload(&mut self) {
        self.clear();
        self.loaded = false;
    }

    /// Replace the topics with the content of a `<topics>` element
    pub fn read_topics(&mut self, element: &XmlElement) -> Result<()> {
        if element.name != TOPICS_TAG {
            return Err(BuildError::xml(format!(
                "expected <{}> but found <{}>",
                TOPICS_TAG, element.name
            )));
        }
        self.clear();
        for child in element.children_named(TOPIC_TAG) {
            if let Some(id) = self.tree.read_topic(child) {
                self.tree.add(None, id);
            }
        }
        if self.group_type == BuildGroupType::Reference {
            self.namespaces = self
                .tree
                .depth_first(None)
                .into_iter()
                .filter(|&id| {
                    self.tree
                        .info(id)
                        .container()
                        .is_some_and(|c| c.eq_ignore_ascii_case(NAMESPACES_CONTAINER))
                })
                .collect();
        }
        Ok(())
    }

    pub fn write_topics(&self) -> XmlElement {
        let mut element = XmlElement::new(TOPICS_TAG);
        for &id in self.tree.roots() {
            element.push(self.tree.write_topic(id));
        }
        element
    }
}

impl NamedItem for BuildGroupTocInfo {
    fn name(&self) -> &str {
        &self.name
    }
}
