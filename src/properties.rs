//! Case-insensitive string property bag.

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::error::{BuildError, Result};
use crate::xml::{XmlElement, XmlSerializable};

/// Ordered string properties with case-insensitive names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildProperties {
    // lowercased name -> (name as given, value)
    entries: IndexMap<String, (String, String)>,
}

impl BuildProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_lowercase())
            .map(|(_, value)| value.as_str())
    }

    /// Value of a property, or `default` when missing or empty
    pub fn get_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        match self.get(name) {
            Some(value) if !value.is_empty() => value,
            _ => default,
        }
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(crate::xml::parse_bool)
    }

    /// Set a property; an existing property keeps its position
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if name.is_empty() {
            return;
        }
        let key = name.to_lowercase();
        let value = value.into();
        match self.entries.get_mut(&key) {
            Some(entry) => entry.1 = value,
            None => {
                self.entries.insert(key, (name, value));
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries
            .shift_remove(&name.to_lowercase())
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_lowercase())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// Merge every property of `other`, overwriting existing values
    pub fn extend_from(&mut self, other: &BuildProperties) {
        for (name, value) in other.iter() {
            self.set(name, value);
        }
    }

    /// Append `<property name="..">value</property>` children to `element`
    pub fn write_properties(&self, element: &mut XmlElement) {
        for (name, value) in self.iter() {
            element.push(
                XmlElement::new("property")
                    .with_attr("name", name)
                    .with_text(value),
            );
        }
    }

    /// Read the `<property>` children of `element`
    pub fn read_properties(element: &XmlElement) -> Result<Self> {
        let mut properties = BuildProperties::new();
        for property in element.children_named("property") {
            let name = property.attr_non_empty("name").ok_or_else(|| {
                BuildError::xml(format!("<property> in <{}> has no name", element.name))
            })?;
            let value = match property.attr("value") {
                Some(value) => value.to_string(),
                None => property.text.clone(),
            };
            properties.set(name, value);
        }
        Ok(properties)
    }
}

impl XmlSerializable for BuildProperties {
    const TAG_NAME: &'static str = "propertyBag";

    fn write_xml(&self) -> XmlElement {
        let mut element = XmlElement::new(Self::TAG_NAME);
        self.write_properties(&mut element);
        element
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        BuildProperties::read_properties(element)
    }
}

impl Serialize for BuildProperties {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.iter())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for BuildProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut properties = BuildProperties::new();
        for (name, value) in iter {
            properties.set(name, value);
        }
        properties
    }
}
