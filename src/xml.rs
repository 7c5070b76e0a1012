//! Minimal XML element tree used by settings, project and TOC files.
//!
//! Files are read with the `quick-xml` pull reader into [`XmlElement`] values
//! and written back through the `quick-xml` writer with two-space indentation.

use log::warn;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::fs;
use std::path::Path;

use crate::error::{BuildError, Result};

/// An XML element with its attributes, child elements and text content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XmlElement {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

/// Capability implemented by every object stored in an XML file
pub trait XmlSerializable: Sized {
    const TAG_NAME: &'static str;

    fn write_xml(&self) -> XmlElement;

    fn read_xml(element: &XmlElement) -> Result<Self>;
}

impl XmlElement {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: XmlElement) -> Self {
        self.children.push(child);
        self
    }

    pub fn push(&mut self, child: XmlElement) {
        self.children.push(child);
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attributes.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Non-empty attribute value
    pub fn attr_non_empty(&self, name: &str) -> Option<&str> {
        self.attr(name).filter(|value| !value.trim().is_empty())
    }

    /// Boolean attribute; unparseable values are reported and ignored
    pub fn attr_bool(&self, name: &str) -> Option<bool> {
        let value = self.attr_non_empty(name)?;
        match parse_bool(value) {
            Some(flag) => Some(flag),
            None => {
                warn!(
                    "Ignoring invalid boolean '{}' for attribute '{}' of <{}>",
                    value, name, self.name
                );
                None
            }
        }
    }

    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|child| child.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }

    /// Text of a child element, trimmed
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name).map(|child| child.text.trim())
    }

    pub fn parse(content: &str) -> Result<XmlElement> {
        let mut reader = Reader::from_str(content);
        let mut buf = Vec::new();
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut root: Option<XmlElement> = None;

        loop {
            match reader.read_event_into(&mut buf).map_err(BuildError::xml)? {
                Event::Start(ref e) => stack.push(element_from_start(e)?),
                Event::Empty(ref e) => {
                    let element = element_from_start(e)?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| BuildError::xml("unbalanced end tag"))?;
                    element.text = element.text.trim().to_string();
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(ref t) => {
                    if let Some(top) = stack.last_mut() {
                        let raw = std::str::from_utf8(t).map_err(BuildError::xml)?;
                        let text = unescape(raw).map_err(BuildError::xml)?;
                        top.text.push_str(&text);
                    }
                }
                Event::CData(ref t) => {
                    if let Some(top) = stack.last_mut() {
                        top.text
                            .push_str(std::str::from_utf8(t).map_err(BuildError::xml)?);
                    }
                }
                Event::GeneralRef(ref r) => {
                    if let Some(top) = stack.last_mut() {
                        let name = std::str::from_utf8(r).map_err(BuildError::xml)?;
                        let entity = format!("&{};", name);
                        let text = unescape(&entity).map_err(BuildError::xml)?;
                        top.text.push_str(&text);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        if let Some(open) = stack.last() {
            return Err(BuildError::xml(format!("element <{}> is not closed", open.name)));
        }
        root.ok_or_else(|| BuildError::xml("document has no root element"))
    }

    pub fn read_file(path: &Path) -> Result<XmlElement> {
        let content = fs::read_to_string(path)?;
        XmlElement::parse(&content).map_err(|e| e.with_path(path))
    }

    pub fn to_xml_string(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(BuildError::xml)?;
        write_element(&mut writer, self)?;
        let mut content = String::from_utf8(writer.into_inner()).map_err(BuildError::xml)?;
        content.push('\n');
        Ok(content)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, self.to_xml_string()?)?;
        Ok(())
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn element_from_start(start: &BytesStart<'_>) -> Result<XmlElement> {
    let name = std::str::from_utf8(start.name().as_ref())
        .map_err(BuildError::xml)?
        .to_string();
    let mut element = XmlElement::new(name);
    for attr in start.attributes() {
        let attr = attr.map_err(BuildError::xml)?;
        let key = std::str::from_utf8(attr.key.as_ref()).map_err(BuildError::xml)?;
        let raw = std::str::from_utf8(&attr.value).map_err(BuildError::xml)?;
        let value = unescape(raw).map_err(BuildError::xml)?;
        element.attributes.push((key.to_string(), value.into_owned()));
    }
    Ok(element)
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => {
            parent.children.push(element);
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(BuildError::xml("document has more than one root element")),
    }
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &XmlElement) -> Result<()> {
    let mut start = BytesStart::new(element.name.as_str());
    for (key, value) in &element.attributes {
        start.push_attribute((key.as_str(), value.as_str()));
    }

    if element.children.is_empty() && element.text.is_empty() {
        writer.write_event(Event::Empty(start)).map_err(BuildError::xml)?;
        return Ok(());
    }

    writer.write_event(Event::Start(start)).map_err(BuildError::xml)?;
    if !element.text.is_empty() {
        writer
            .write_event(Event::Text(BytesText::new(&element.text)))
            .map_err(BuildError::xml)?;
    }
    for child in &element.children {
        write_element(writer, child)?;
    }
    writer
        .write_event(Event::End(BytesEnd::new(element.name.as_str())))
        .map_err(BuildError::xml)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_elements() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<topics>
  <topic id="Overview" file="a1b2">
    <topic id="Install" project="Guide" file="c3d4" />
  </topic>
  <topic id="Api" file="e5f6" />
</topics>"#;

        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.name, "topics");
        assert_eq!(root.children.len(), 2);
        let overview = &root.children[0];
        assert_eq!(overview.attr("id"), Some("Overview"));
        assert_eq!(overview.children[0].attr("project"), Some("Guide"));
        assert_eq!(root.children_named("topic").count(), 2);
    }

    #[test]
    fn test_text_and_entities() {
        let xml = r#"<property name="HelpTitle">Tools &amp; Helpers</property>"#;
        let root = XmlElement::parse(xml).unwrap();
        assert_eq!(root.text, "Tools & Helpers");
        assert_eq!(root.attr_non_empty("name"), Some("HelpTitle"));

        let root = XmlElement::parse("<title>&lt;Tools&gt; &#65;PI</title>").unwrap();
        assert_eq!(root.text, "<Tools> API");
    }

    #[test]
    fn test_malformed_documents() {
        assert!(XmlElement::parse("").is_err());
        assert!(XmlElement::parse("<a><b></a>").is_err());
        assert!(XmlElement::parse("<a/><b/>").is_err());
    }

    #[test]
    fn test_write_and_read_back() {
        let element = XmlElement::new("settings")
            .with_attr("name", "Main")
            .with_child(
                XmlElement::new("property")
                    .with_attr("name", "HelpName")
                    .with_text("Docs <1.0>"),
            );

        let content = element.to_xml_string().unwrap();
        assert!(content.starts_with("<?xml"));
        let parsed = XmlElement::parse(&content).unwrap();
        assert_eq!(parsed, element);
    }

    #[test]
    fn test_bool_attributes() {
        let element = XmlElement::new("group")
            .with_attr("exclude", "True")
            .with_attr("excludeToc", "maybe");
        assert_eq!(element.attr_bool("exclude"), Some(true));
        assert_eq!(element.attr_bool("excludeToc"), None);
        assert_eq!(element.attr_bool("missing"), None);
    }
}
