//! Documentation groups: the unit of input for a build.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{BuildError, Result};
use crate::keyed::NamedItem;
use crate::properties::BuildProperties;
use crate::xml::{XmlElement, XmlSerializable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildGroupType {
    /// API reference documentation generated from assemblies
    Reference,
    /// Conceptual topics authored as MAML
    Conceptual,
}

impl fmt::Display for BuildGroupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildGroupType::Reference => f.write_str("Reference"),
            BuildGroupType::Conceptual => f.write_str("Conceptual"),
        }
    }
}

impl FromStr for BuildGroupType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" => Ok(BuildGroupType::Reference),
            "conceptual" => Ok(BuildGroupType::Conceptual),
            other => Err(BuildError::config(format!("unknown group type '{other}'"))),
        }
    }
}

/// Kind of content file associated with a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildContentType {
    Links,
    SharedContent,
    Tokens,
    Media,
    Snippets,
    Resources,
}

impl BuildContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildContentType::Links => "links",
            BuildContentType::SharedContent => "shared",
            BuildContentType::Tokens => "tokens",
            BuildContentType::Media => "media",
            BuildContentType::Snippets => "snippets",
            BuildContentType::Resources => "resources",
        }
    }
}

impl FromStr for BuildContentType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "links" => Ok(BuildContentType::Links),
            "shared" | "sharedcontent" => Ok(BuildContentType::SharedContent),
            "tokens" => Ok(BuildContentType::Tokens),
            "media" => Ok(BuildContentType::Media),
            "snippets" => Ok(BuildContentType::Snippets),
            "resources" => Ok(BuildContentType::Resources),
            other => Err(BuildError::config(format!("unknown content type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildContent {
    pub content_type: BuildContentType,
    pub path: PathBuf,
}

/// A named set of documentation sources built together
#[derive(Debug, Clone, Serialize)]
pub struct BuildGroup {
    id: String,
    name: String,
    pub title: String,
    group_type: BuildGroupType,
    pub exclude: bool,
    pub exclude_toc: bool,
    pub properties: BuildProperties,
    pub sources: Vec<PathBuf>,
    pub contents: Vec<BuildContent>,
    /// TOC fragment produced for this group
    pub toc_file: Option<PathBuf>,
}

impl BuildGroup {
    pub fn new(name: impl Into<String>, group_type: BuildGroupType) -> Self {
        let name = name.into();
        Self {
            id: Uuid::new_v4().to_string(),
            title: name.clone(),
            name,
            group_type,
            exclude: false,
            exclude_toc: false,
            properties: BuildProperties::new(),
            sources: Vec::new(),
            contents: Vec::new(),
            toc_file: None,
        }
    }

    pub fn reference(name: impl Into<String>) -> Self {
        Self::new(name, BuildGroupType::Reference)
    }

    pub fn conceptual(name: impl Into<String>) -> Self {
        Self::new(name, BuildGroupType::Conceptual)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn group_type(&self) -> BuildGroupType {
        self.group_type
    }

    /// A group with nothing to build
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty() && self.toc_file.is_none()
    }

    pub fn add_source(&mut self, path: impl Into<PathBuf>) {
        self.sources.push(path.into());
    }

    pub fn add_content(&mut self, content_type: BuildContentType, path: impl Into<PathBuf>) {
        self.contents.push(BuildContent {
            content_type,
            path: path.into(),
        });
    }

    pub fn contents_of(&self, content_type: BuildContentType) -> impl Iterator<Item = &BuildContent> {
        self.contents
            .iter()
            .filter(move |content| content.content_type == content_type)
    }
}

impl NamedItem for BuildGroup {
    fn name(&self) -> &str {
        &self.name
    }
}

impl XmlSerializable for BuildGroup {
    const TAG_NAME: &'static str = "group";

    fn write_xml(&self) -> XmlElement {
        let mut element = XmlElement::new(Self::TAG_NAME)
            .with_attr("id", self.id.as_str())
            .with_attr("name", self.name.as_str())
            .with_attr("type", self.group_type.to_string())
            .with_attr("title", self.title.as_str())
            .with_attr("exclude", self.exclude.to_string())
            .with_attr("excludeToc", self.exclude_toc.to_string());

        if let Some(toc_file) = &self.toc_file {
            element.set_attr("tocFile", toc_file.display().to_string());
        }

        let mut sources = XmlElement::new("sources");
        for source in &self.sources {
            sources.push(XmlElement::new("source").with_attr("path", source.display().to_string()));
        }
        element.push(sources);

        let mut contents = XmlElement::new("contents");
        for content in &self.contents {
            contents.push(
                XmlElement::new("content")
                    .with_attr("type", content.content_type.as_str())
                    .with_attr("path", content.path.display().to_string()),
            );
        }
        element.push(contents);

        element.push(self.properties.write_xml());
        element
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        let name = element
            .attr_non_empty("name")
            .ok_or_else(|| BuildError::xml("<group> has no name"))?;
        let group_type: BuildGroupType = element
            .attr("type")
            .ok_or_else(|| BuildError::xml(format!("group '{name}' has no type")))?
            .parse()?;

        let mut group = BuildGroup::new(name, group_type);
        if let Some(id) = element.attr_non_empty("id") {
            group.id = id.to_string();
        }
        if let Some(title) = element.attr_non_empty("title") {
            group.title = title.to_string();
        }
        group.exclude = element.attr_bool("exclude").unwrap_or(false);
        group.exclude_toc = element.attr_bool("excludeToc").unwrap_or(false);
        group.toc_file = element.attr_non_empty("tocFile").map(PathBuf::from);

        if let Some(sources) = element.child("sources") {
            for source in sources.children_named("source") {
                if let Some(path) = source.attr_non_empty("path") {
                    group.add_source(path);
                }
            }
        }
        if let Some(contents) = element.child("contents") {
            for content in contents.children_named("content") {
                let (Some(kind), Some(path)) =
                    (content.attr_non_empty("type"), content.attr_non_empty("path"))
                else {
                    continue;
                };
                group.add_content(kind.parse()?, path);
            }
        }
        if let Some(bag) = element.child(BuildProperties::TAG_NAME) {
            group.properties = BuildProperties::read_xml(bag)?;
        }
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_group_has_guid() {
        let first = BuildGroup::reference("Api");
        let second = BuildGroup::reference("Api");
        assert!(Uuid::parse_str(first.id()).is_ok());
        assert_ne!(first.id(), second.id());
        assert!(first.is_empty());
        assert_eq!(first.title, "Api");
    }

    #[test]
    fn test_xml_round_trip() {
        let mut group = BuildGroup::conceptual("Guide");
        group.title = "User Guide".to_string();
        group.exclude_toc = true;
        group.add_source("topics/guide.xml");
        group.add_content(BuildContentType::Media, "media/MediaContent.xml");
        group.add_content(BuildContentType::Tokens, "tokens.xml");
        group.properties.set("ConfigurationFile", "Conceptual.config");

        let read = BuildGroup::read_xml(&group.write_xml()).unwrap();
        assert_eq!(read.id(), group.id());
        assert_eq!(read.group_type(), BuildGroupType::Conceptual);
        assert_eq!(read.title, "User Guide");
        assert!(read.exclude_toc);
        assert!(!read.exclude);
        assert_eq!(read.sources, group.sources);
        assert_eq!(read.contents_of(BuildContentType::Media).count(), 1);
        assert_eq!(read.properties.get("configurationfile"), Some("Conceptual.config"));
    }

    #[test]
    fn test_invalid_group_type() {
        let element = XmlElement::new("group")
            .with_attr("name", "Odd")
            .with_attr("type", "Tutorial");
        assert!(BuildGroup::read_xml(&element).is_err());
        assert!("REFERENCE".parse::<BuildGroupType>().is_ok());
    }
}
