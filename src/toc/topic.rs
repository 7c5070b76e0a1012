//! Topic hierarchy stored as an arena.
//!
//! Topics live in a flat vector and refer to each other through [`TopicId`].
//! Parent links are plain ids, so walking up for delegated replace/remove
//! needs no shared ownership. The top level of a tree (the topics owned by
//! the group itself) is addressed with `None`.
//!
//! Removed or replaced topics stay in the vector, detached, until the tree
//! is cleared. A group TOC is loaded once per build and unloaded after it,
//! so the arena never outlives one build.
//!
//! Every id carries the stamp of the tree that created it. Clearing a tree
//! takes a new stamp, so ids from before the clear, or from another tree,
//! are unknown: lookups return `None`, edits return `false`.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

use crate::xml::XmlElement;

pub const TOPIC_TAG: &str = "topic";

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

fn next_stamp() -> u64 {
    NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
}

/// Handle to a topic inside a [`TopicTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TopicId {
    stamp: u64,
    index: usize,
}

/// Name, source file and container of one TOC entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildTopicTocInfo {
    name: String,
    source: String,
    container: Option<String>,
}

impl BuildTopicTocInfo {
    /// Create a topic; an empty source gets a fresh GUID
    pub fn new(name: impl Into<String>, source: &str, container: Option<&str>) -> Self {
        let mut info = Self {
            name: name.into(),
            source: String::new(),
            container: container.map(str::to_string),
        };
        info.set_source(source);
        info
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn set_source(&mut self, source: &str) {
        let source = source.trim();
        self.source = if source.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            source.to_string()
        };
    }

    pub fn container(&self) -> Option<&str> {
        self.container.as_deref()
    }

    pub fn set_container(&mut self, container: Option<&str>) {
        self.container = container.map(str::to_string);
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

#[derive(Debug, Clone, Default)]
struct Children {
    ids: Vec<TopicId>,
    // lowercased name -> first child with that name
    index: HashMap<String, TopicId>,
}

#[derive(Debug, Clone)]
struct TopicNode {
    info: BuildTopicTocInfo,
    parent: Option<TopicId>,
    attached: bool,
    children: Children,
}

/// A forest of topics with ordered, name-indexed children
#[derive(Debug, Clone)]
pub struct TopicTree {
    stamp: u64,
    nodes: Vec<TopicNode>,
    roots: Children,
}

impl Default for TopicTree {
    fn default() -> Self {
        Self {
            stamp: next_stamp(),
            nodes: Vec::new(),
            roots: Children::default(),
        }
    }
}

/// Serializable copy of a topic subtree
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicSnapshot {
    pub id: String,
    pub file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<TopicSnapshot>,
}

impl TopicTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a detached topic; attach it with [`TopicTree::add`]
    pub fn create(&mut self, info: BuildTopicTocInfo) -> TopicId {
        let id = TopicId {
            stamp: self.stamp,
            index: self.nodes.len(),
        };
        self.nodes.push(TopicNode {
            info,
            parent: None,
            attached: false,
            children: Children::default(),
        });
        id
    }

    /// Whether `id` was created by this tree since its last clear
    pub fn contains(&self, id: TopicId) -> bool {
        self.node(id).is_some()
    }

    /// Topics stored in the arena, attached or not
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// # Panics
    ///
    /// Panics when `id` is unknown to this tree; see [`TopicTree::contains`].
    pub fn info(&self, id: TopicId) -> &BuildTopicTocInfo {
        match self.node(id) {
            Some(node) => &node.info,
            None => panic!("unknown topic {:?}", id),
        }
    }

    /// # Panics
    ///
    /// Panics when `id` is unknown to this tree; see [`TopicTree::contains`].
    pub fn info_mut(&mut self, id: TopicId) -> &mut BuildTopicTocInfo {
        match self.node_mut(id) {
            Some(node) => &mut node.info,
            None => panic!("unknown topic {:?}", id),
        }
    }

    pub fn get(&self, id: TopicId) -> TopicRef<'_> {
        TopicRef { tree: self, id }
    }

    pub fn parent(&self, id: TopicId) -> Option<TopicId> {
        self.node(id).and_then(|node| node.parent)
    }

    pub fn is_attached(&self, id: TopicId) -> bool {
        self.node(id).map_or(false, |node| node.attached)
    }

    /// Children of a topic, or the top-level topics for `None`
    pub fn children(&self, at: Option<TopicId>) -> &[TopicId] {
        match self.list(at) {
            Some(list) => &list.ids,
            None => &[],
        }
    }

    pub fn roots(&self) -> &[TopicId] {
        &self.roots.ids
    }

    pub fn is_empty(&self) -> bool {
        self.roots.ids.is_empty()
    }

    /// Direct child by name (case-insensitive)
    pub fn child(&self, at: Option<TopicId>, name: &str) -> Option<TopicId> {
        self.list(at)?.index.get(&name.to_lowercase()).copied()
    }

    pub fn index_of(&self, at: Option<TopicId>, item: TopicId) -> Option<usize> {
        self.list(at)?.ids.iter().position(|&id| id == item)
    }

    /// Append a topic; duplicates are allowed
    pub fn add(&mut self, at: Option<TopicId>, item: TopicId) {
        let index = self.children(at).len();
        self.insert(at, index, item);
    }

    pub fn add_new(&mut self, at: Option<TopicId>, info: BuildTopicTocInfo) -> TopicId {
        let id = self.create(info);
        self.add(at, id);
        id
    }

    pub fn add_range(&mut self, at: Option<TopicId>, items: &[TopicId]) {
        for &item in items {
            self.add(at, item);
        }
    }

    /// Insert at `index` (clamped to the end). Unknown ids are ignored.
    pub fn insert(&mut self, at: Option<TopicId>, index: usize, item: TopicId) {
        if self.list(at).is_none() || at == Some(item) {
            return;
        }
        let Some(node) = self.node(item) else {
            return;
        };
        if node.attached {
            self.detach(item);
        }
        let Some(node) = self.node_mut(item) else {
            return;
        };
        node.parent = at;
        node.attached = true;
        let key = node.info.name.to_lowercase();

        let Some(list) = self.list_mut(at) else {
            return;
        };
        let index = index.min(list.ids.len());
        list.ids.insert(index, item);
        if index + 1 == list.ids.len() {
            list.index.entry(key).or_insert(item);
        } else {
            self.reindex(at);
        }
    }

    pub fn insert_range(&mut self, at: Option<TopicId>, index: usize, items: &[TopicId]) {
        for (offset, &item) in items.iter().enumerate() {
            self.insert(at, index + offset, item);
        }
    }

    /// Find a topic by name: `at` itself, then a direct child, then (when
    /// `recursive`) depth-first through the children. First match wins.
    pub fn find(&self, at: Option<TopicId>, name: &str, recursive: bool) -> Option<TopicId> {
        if let Some(id) = at {
            if self.node(id)?.info.is_named(name) {
                return Some(id);
            }
        }
        if let Some(id) = self.child(at, name) {
            return Some(id);
        }
        if recursive {
            for &child in self.children(at) {
                if let Some(found) = self.find(Some(child), name, true) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// Replace `item_out` with `items_in` at the same position. When
    /// `item_out` is not a child of `at`, the call is forwarded to the topic
    /// that owns `item_out`. Returns false when nothing was replaced.
    pub fn replace(&mut self, at: Option<TopicId>, item_out: TopicId, items_in: &[TopicId]) -> bool {
        match self.index_of(at, item_out) {
            Some(index) => {
                self.detach(item_out);
                self.insert_range(at, index, items_in);
                true
            }
            None => match self.owner(item_out) {
                Some(owner) if owner != at => self.replace(owner, item_out, items_in),
                _ => false,
            },
        }
    }

    /// Remove `item` from `at`, or from its owner when it is not a direct child
    pub fn remove(&mut self, at: Option<TopicId>, item: TopicId) -> bool {
        if self.index_of(at, item).is_some() {
            self.detach(item);
            return true;
        }
        match self.owner(item) {
            Some(owner) if owner != at => self.remove(owner, item),
            _ => false,
        }
    }

    /// Remove every child of `at`
    pub fn clear_children(&mut self, at: Option<TopicId>) {
        for id in self.children(at).to_vec() {
            self.detach(id);
        }
    }

    /// Drop every topic; ids handed out before the clear become unknown
    pub fn clear(&mut self) {
        self.stamp = next_stamp();
        self.nodes.clear();
        self.roots = Children::default();
    }

    /// Copy the subtree at `id` of `other` into this tree as a detached topic
    pub fn graft(&mut self, other: &TopicTree, id: TopicId) -> TopicId {
        let copy = self.create(other.info(id).clone());
        for &child in other.children(Some(id)) {
            let child_copy = self.graft(other, child);
            self.add(Some(copy), child_copy);
        }
        copy
    }

    /// Copy every top-level topic of `other`
    pub fn graft_all(&mut self, other: &TopicTree) -> Vec<TopicId> {
        other
            .roots()
            .iter()
            .map(|&root| self.graft(other, root))
            .collect()
    }

    /// Number of topics reachable from `at`, excluding `at` itself
    pub fn count(&self, at: Option<TopicId>) -> usize {
        self.children(at)
            .iter()
            .map(|&child| 1 + self.count(Some(child)))
            .sum()
    }

    /// Reachable topics in depth-first order
    pub fn depth_first(&self, at: Option<TopicId>) -> Vec<TopicId> {
        let mut order = Vec::new();
        for &child in self.children(at) {
            order.push(child);
            order.extend(self.depth_first(Some(child)));
        }
        order
    }

    /// Read a `<topic>` element and its nested topics as a detached subtree.
    /// Topics without both `id` and `file` are skipped.
    pub fn read_topic(&mut self, element: &XmlElement) -> Option<TopicId> {
        if element.name != TOPIC_TAG {
            return None;
        }
        let name = element.attr_non_empty("id")?;
        let file = element.attr_non_empty("file")?;
        let info = BuildTopicTocInfo::new(name, file, element.attr("project"));
        let id = self.create(info);
        for child in element.children_named(TOPIC_TAG) {
            if let Some(child_id) = self.read_topic(child) {
                self.add(Some(id), child_id);
            }
        }
        Some(id)
    }

    pub fn write_topic(&self, id: TopicId) -> XmlElement {
        let info = self.info(id);
        let mut element = XmlElement::new(TOPIC_TAG).with_attr("id", info.name());
        if let Some(container) = info.container() {
            element.set_attr("project", container);
        }
        element.set_attr("file", info.source());
        for &child in self.children(Some(id)) {
            element.push(self.write_topic(child));
        }
        element
    }

    pub fn snapshot(&self, id: TopicId) -> TopicSnapshot {
        let info = self.info(id);
        TopicSnapshot {
            id: info.name().to_string(),
            file: info.source().to_string(),
            project: info.container().map(str::to_string),
            topics: self
                .children(Some(id))
                .iter()
                .map(|&child| self.snapshot(child))
                .collect(),
        }
    }

    fn node(&self, id: TopicId) -> Option<&TopicNode> {
        if id.stamp != self.stamp {
            return None;
        }
        self.nodes.get(id.index)
    }

    fn node_mut(&mut self, id: TopicId) -> Option<&mut TopicNode> {
        if id.stamp != self.stamp {
            return None;
        }
        self.nodes.get_mut(id.index)
    }

    /// Where an attached topic lives: `Some(None)` for the top level
    fn owner(&self, id: TopicId) -> Option<Option<TopicId>> {
        let node = self.node(id)?;
        if !node.attached {
            return None;
        }
        Some(node.parent)
    }

    fn detach(&mut self, id: TopicId) {
        let Some(owner) = self.owner(id) else {
            return;
        };
        if let Some(list) = self.list_mut(owner) {
            list.ids.retain(|&child| child != id);
        }
        self.reindex(owner);
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
            node.attached = false;
        }
    }

    fn reindex(&mut self, at: Option<TopicId>) {
        let mut index = HashMap::new();
        for &child in self.children(at) {
            if let Some(node) = self.node(child) {
                index.entry(node.info.name.to_lowercase()).or_insert(child);
            }
        }
        if let Some(list) = self.list_mut(at) {
            list.index = index;
        }
    }

    fn list(&self, at: Option<TopicId>) -> Option<&Children> {
        match at {
            Some(id) => self.node(id).map(|node| &node.children),
            None => Some(&self.roots),
        }
    }

    fn list_mut(&mut self, at: Option<TopicId>) -> Option<&mut Children> {
        match at {
            Some(id) => self.node_mut(id).map(|node| &mut node.children),
            None => Some(&mut self.roots),
        }
    }
}

/// Borrowed view of one topic
#[derive(Debug, Clone, Copy)]
pub struct TopicRef<'a> {
    tree: &'a TopicTree,
    id: TopicId,
}

impl<'a> TopicRef<'a> {
    pub fn id(&self) -> TopicId {
        self.id
    }

    pub fn tree(&self) -> &'a TopicTree {
        self.tree
    }

    pub fn info(&self) -> &'a BuildTopicTocInfo {
        self.tree.info(self.id)
    }

    pub fn name(&self) -> &'a str {
        self.info().name()
    }

    pub fn source(&self) -> &'a str {
        self.info().source()
    }

    pub fn container(&self) -> Option<&'a str> {
        self.info().container()
    }

    pub fn parent(&self) -> Option<TopicRef<'a>> {
        self.tree.parent(self.id).map(|id| self.tree.get(id))
    }

    pub fn children(&self) -> impl Iterator<Item = TopicRef<'a>> + 'a {
        let tree = self.tree;
        tree.children(Some(self.id)).iter().map(move |&id| tree.get(id))
    }

    pub fn child_count(&self) -> usize {
        self.tree.children(Some(self.id)).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic(name: &str) -> BuildTopicTocInfo {
        BuildTopicTocInfo::new(name, &format!("{}.xml", name), None)
    }

    /// root -> (a, b -> (b1, b2), c)
    fn sample() -> (TopicTree, TopicId) {
        let mut tree = TopicTree::new();
        let root = tree.add_new(None, topic("root"));
        tree.add_new(Some(root), topic("a"));
        let b = tree.add_new(Some(root), topic("b"));
        tree.add_new(Some(b), topic("b1"));
        tree.add_new(Some(b), topic("b2"));
        tree.add_new(Some(root), topic("c"));
        (tree, root)
    }

    fn names(tree: &TopicTree, at: Option<TopicId>) -> Vec<String> {
        tree.children(at)
            .iter()
            .map(|&id| tree.info(id).name().to_string())
            .collect()
    }

    #[test]
    fn test_empty_source_gets_guid() {
        let info = BuildTopicTocInfo::new("Overview", "  ", None);
        assert!(Uuid::parse_str(info.source()).is_ok());
        let info = BuildTopicTocInfo::new("Overview", " file.xml ", Some("Guide"));
        assert_eq!(info.source(), "file.xml");
        assert_eq!(info.container(), Some("Guide"));
    }

    #[test]
    fn test_find_recursive() {
        let mut tree = TopicTree::new();
        let root = tree.add_new(None, topic("root"));
        let child = tree.add_new(Some(root), topic("child1"));
        let grandchild = tree.add_new(Some(child), topic("grandchild"));

        assert_eq!(tree.find(Some(root), "GrandChild", true), Some(grandchild));
        assert_eq!(tree.find(Some(root), "grandchild", false), None);
        assert_eq!(tree.find(Some(root), "ROOT", false), Some(root));
        assert_eq!(tree.find(None, "child1", true), Some(child));
        assert_eq!(tree.find(Some(root), "missing", true), None);
    }

    #[test]
    fn test_duplicates_index_first_occurrence() {
        let mut tree = TopicTree::new();
        let root = tree.add_new(None, topic("root"));
        let first = tree.add_new(Some(root), topic("dup"));
        tree.add_new(Some(root), topic("dup"));

        assert_eq!(tree.children(Some(root)).len(), 2);
        assert_eq!(tree.child(Some(root), "DUP"), Some(first));
    }

    #[test]
    fn test_replace_direct_child_keeps_position() {
        let (mut tree, root) = sample();
        let b = tree.child(Some(root), "b").unwrap();
        let x = tree.create(topic("x"));
        let y = tree.create(topic("y"));

        assert!(tree.replace(Some(root), b, &[x, y]));
        assert_eq!(names(&tree, Some(root)), vec!["a", "x", "y", "c"]);
        assert_eq!(tree.parent(x), Some(root));
        assert!(!tree.is_attached(b));
        assert_eq!(tree.child(Some(root), "x"), Some(x));
        assert_eq!(tree.child(Some(root), "b"), None);
    }

    #[test]
    fn test_replace_descendant_delegates_to_owner() {
        let (mut tree, root) = sample();
        let b = tree.child(Some(root), "b").unwrap();
        let b1 = tree.find(Some(root), "b1", true).unwrap();
        let z = tree.create(topic("z"));

        assert!(tree.replace(Some(root), b1, &[z]));
        assert_eq!(names(&tree, Some(b)), vec!["z", "b2"]);
        assert_eq!(names(&tree, Some(root)), vec!["a", "b", "c"]);
        assert_eq!(tree.parent(z), Some(b));
    }

    #[test]
    fn test_replace_detached_is_noop() {
        let (mut tree, root) = sample();
        let loose = tree.create(topic("loose"));
        let z = tree.create(topic("z"));
        assert!(!tree.replace(Some(root), loose, &[z]));
        assert_eq!(names(&tree, Some(root)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_delegates() {
        let (mut tree, root) = sample();
        let b2 = tree.find(None, "b2", true).unwrap();
        assert!(tree.remove(Some(root), b2));
        assert_eq!(tree.find(None, "b2", true), None);
        assert!(!tree.remove(Some(root), b2));
        assert_eq!(tree.count(None), 5);
    }

    #[test]
    fn test_ids_before_clear_are_unknown() {
        let (mut tree, root) = sample();
        let b = tree.child(Some(root), "b").unwrap();
        tree.clear();
        let fresh = tree.add_new(None, topic("fresh"));

        assert!(!tree.contains(root));
        assert!(!tree.contains(b));
        assert!(tree.contains(fresh));
        assert!(!tree.remove(None, root));
        assert!(!tree.replace(None, root, &[fresh]));
        assert_eq!(tree.index_of(None, root), None);
        assert_eq!(tree.find(Some(b), "b1", true), None);
        assert!(tree.children(Some(b)).is_empty());
        assert_eq!(tree.parent(b), None);

        tree.insert(Some(b), 0, fresh);
        tree.add(None, root);
        assert_eq!(names(&tree, None), vec!["fresh"]);
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_ids_from_another_tree_are_unknown() {
        let (mut tree, _) = sample();
        let (other, other_root) = sample();
        let other_b = other.find(None, "b", true).unwrap();

        assert!(!tree.contains(other_root));
        assert!(!tree.remove(None, other_root));
        assert!(!tree.replace(None, other_b, &[]));
        assert_eq!(tree.count(None), 6);
    }

    #[test]
    fn test_graft_and_xml() {
        let (source, root) = sample();
        let element = source.write_topic(root);
        assert_eq!(element.children.len(), 3);

        let mut tree = TopicTree::new();
        let read = tree.read_topic(&element).unwrap();
        tree.add(None, read);
        assert_eq!(tree.count(None), 6);

        let mut copy = TopicTree::new();
        let grafted = copy.graft_all(&tree);
        copy.add_range(None, &grafted);
        assert_eq!(copy.snapshot(grafted[0]), source.snapshot(root));
    }

    #[test]
    fn test_read_topic_requires_id_and_file() {
        let element = XmlElement::new(TOPIC_TAG)
            .with_attr("id", "Overview")
            .with_child(XmlElement::new(TOPIC_TAG).with_attr("id", "NoFile"))
            .with_attr("file", "overview");
        let mut tree = TopicTree::new();
        let id = tree.read_topic(&element).unwrap();
        assert_eq!(tree.children(Some(id)).len(), 0);

        let missing = XmlElement::new(TOPIC_TAG).with_attr("file", "x");
        assert!(tree.read_topic(&missing).is_none());
    }
}
