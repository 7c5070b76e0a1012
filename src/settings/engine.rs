//! Engine-specific settings: configurations and component configurations
//! handed to the Sandcastle build engines.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BuildError, Result};
use crate::group::BuildGroupType;
use crate::keyed::{KeyedList, NamedItem};
use crate::properties::BuildProperties;
use crate::xml::{XmlElement, XmlSerializable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildEngineType {
    Reference,
    Conceptual,
    Custom,
}

impl From<BuildGroupType> for BuildEngineType {
    fn from(group_type: BuildGroupType) -> Self {
        match group_type {
            BuildGroupType::Reference => BuildEngineType::Reference,
            BuildGroupType::Conceptual => BuildEngineType::Conceptual,
        }
    }
}

impl fmt::Display for BuildEngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildEngineType::Reference => f.write_str("Reference"),
            BuildEngineType::Conceptual => f.write_str("Conceptual"),
            BuildEngineType::Custom => f.write_str("Custom"),
        }
    }
}

impl FromStr for BuildEngineType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reference" => Ok(BuildEngineType::Reference),
            "conceptual" => Ok(BuildEngineType::Conceptual),
            "custom" => Ok(BuildEngineType::Custom),
            other => Err(BuildError::config(format!("unknown engine type '{other}'"))),
        }
    }
}

/// Items that belong to exactly one engine type
pub trait EngineItem: NamedItem + XmlSerializable {
    fn engine_type(&self) -> BuildEngineType;
}

/// A named configuration of one engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfiguration {
    name: String,
    engine_type: BuildEngineType,
    pub enabled: bool,
    pub continue_on_error: bool,
    pub properties: BuildProperties,
}

impl BuildConfiguration {
    pub fn new(name: impl Into<String>, engine_type: BuildEngineType) -> Self {
        Self {
            name: name.into(),
            engine_type,
            enabled: true,
            continue_on_error: true,
            properties: BuildProperties::new(),
        }
    }
}

impl NamedItem for BuildConfiguration {
    fn name(&self) -> &str {
        &self.name
    }
}

impl EngineItem for BuildConfiguration {
    fn engine_type(&self) -> BuildEngineType {
        self.engine_type
    }
}

impl XmlSerializable for BuildConfiguration {
    const TAG_NAME: &'static str = "configuration";

    fn write_xml(&self) -> XmlElement {
        let mut element = XmlElement::new(Self::TAG_NAME)
            .with_attr("name", self.name.as_str())
            .with_attr("type", self.engine_type.to_string())
            .with_attr("enabled", self.enabled.to_string())
            .with_attr("continueOnError", self.continue_on_error.to_string());
        if !self.properties.is_empty() {
            element.push(self.properties.write_xml());
        }
        element
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        let (name, engine_type) = read_identity(element)?;
        let mut configuration = BuildConfiguration::new(name, engine_type);
        configuration.enabled = element.attr_bool("enabled").unwrap_or(true);
        configuration.continue_on_error = element.attr_bool("continueOnError").unwrap_or(true);
        if let Some(bag) = element.child(BuildProperties::TAG_NAME) {
            configuration.properties = BuildProperties::read_xml(bag)?;
        }
        Ok(configuration)
    }
}

/// Configuration of one build component of the assembler pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildComponentConfiguration {
    name: String,
    engine_type: BuildEngineType,
    pub component_name: String,
    pub enabled: bool,
    pub properties: BuildProperties,
}

impl BuildComponentConfiguration {
    pub fn new(
        name: impl Into<String>,
        engine_type: BuildEngineType,
        component_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            engine_type,
            component_name: component_name.into(),
            enabled: true,
            properties: BuildProperties::new(),
        }
    }
}

impl NamedItem for BuildComponentConfiguration {
    fn name(&self) -> &str {
        &self.name
    }
}

impl EngineItem for BuildComponentConfiguration {
    fn engine_type(&self) -> BuildEngineType {
        self.engine_type
    }
}

impl XmlSerializable for BuildComponentConfiguration {
    const TAG_NAME: &'static str = "componentConfiguration";

    fn write_xml(&self) -> XmlElement {
        let mut element = XmlElement::new(Self::TAG_NAME)
            .with_attr("name", self.name.as_str())
            .with_attr("type", self.engine_type.to_string())
            .with_attr("componentName", self.component_name.as_str())
            .with_attr("enabled", self.enabled.to_string());
        if !self.properties.is_empty() {
            element.push(self.properties.write_xml());
        }
        element
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        let (name, engine_type) = read_identity(element)?;
        let component_name = element.attr("componentName").unwrap_or_default();
        let mut configuration = BuildComponentConfiguration::new(name, engine_type, component_name);
        configuration.enabled = element.attr_bool("enabled").unwrap_or(true);
        if let Some(bag) = element.child(BuildProperties::TAG_NAME) {
            configuration.properties = BuildProperties::read_xml(bag)?;
        }
        Ok(configuration)
    }
}

fn read_identity(element: &XmlElement) -> Result<(String, BuildEngineType)> {
    let name = element
        .attr_non_empty("name")
        .ok_or_else(|| BuildError::xml(format!("<{}> has no name", element.name)))?;
    let engine_type = element
        .attr_non_empty("type")
        .ok_or_else(|| BuildError::xml(format!("<{}> '{}' has no engine type", element.name, name)))?
        .parse()?;
    Ok((name.to_string(), engine_type))
}

/// Keyed list accepting only items of one engine type
#[derive(Debug, Clone)]
pub struct EngineItemList<T> {
    engine_type: BuildEngineType,
    items: KeyedList<T>,
}

impl<T: EngineItem> EngineItemList<T> {
    pub fn new(engine_type: BuildEngineType) -> Self {
        Self {
            engine_type,
            items: KeyedList::new(),
        }
    }

    pub fn engine_type(&self) -> BuildEngineType {
        self.engine_type
    }

    /// Add or replace an item; items of another engine type are rejected
    pub fn add(&mut self, item: T) -> Result<()> {
        if item.engine_type() != self.engine_type {
            return Err(BuildError::config(format!(
                "'{}' is a {} item and cannot be added to the {} engine settings",
                item.name(),
                item.engine_type(),
                self.engine_type
            )));
        }
        self.items.add(item);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<T> {
        self.items.remove(name)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    fn write_list(&self, tag: &str) -> XmlElement {
        let mut element = XmlElement::new(tag);
        for item in self.items.iter() {
            element.push(item.write_xml());
        }
        element
    }

    fn read_list(&mut self, element: &XmlElement) -> Result<()> {
        for child in element.children_named(T::TAG_NAME) {
            self.add(T::read_xml(child)?)?;
        }
        Ok(())
    }
}

impl EngineItemList<BuildComponentConfiguration> {
    /// Configurations targeting the given component
    pub fn for_component<'a>(
        &'a self,
        component_name: &'a str,
    ) -> impl Iterator<Item = &'a BuildComponentConfiguration> + 'a {
        self.items
            .iter()
            .filter(move |c| c.component_name.eq_ignore_ascii_case(component_name))
    }
}

/// Settings of one build engine
#[derive(Debug, Clone)]
pub struct BuildEngineSettings {
    name: String,
    engine_type: BuildEngineType,
    pub properties: BuildProperties,
    pub configurations: EngineItemList<BuildConfiguration>,
    pub plugin_configurations: EngineItemList<BuildConfiguration>,
    pub component_configurations: EngineItemList<BuildComponentConfiguration>,
    pub plugin_component_configurations: EngineItemList<BuildComponentConfiguration>,
}

impl BuildEngineSettings {
    pub fn new(name: impl Into<String>, engine_type: BuildEngineType) -> Self {
        Self {
            name: name.into(),
            engine_type,
            properties: BuildProperties::new(),
            configurations: EngineItemList::new(engine_type),
            plugin_configurations: EngineItemList::new(engine_type),
            component_configurations: EngineItemList::new(engine_type),
            plugin_component_configurations: EngineItemList::new(engine_type),
        }
    }

    pub fn engine_type(&self) -> BuildEngineType {
        self.engine_type
    }
}

impl NamedItem for BuildEngineSettings {
    fn name(&self) -> &str {
        &self.name
    }
}

impl XmlSerializable for BuildEngineSettings {
    const TAG_NAME: &'static str = "engineSetting";

    fn write_xml(&self) -> XmlElement {
        XmlElement::new(Self::TAG_NAME)
            .with_attr("name", self.name.as_str())
            .with_attr("type", self.engine_type.to_string())
            .with_child(self.properties.write_xml())
            .with_child(self.configurations.write_list("configurations"))
            .with_child(self.plugin_configurations.write_list("pluginConfigurations"))
            .with_child(self.component_configurations.write_list("componentConfigurations"))
            .with_child(
                self.plugin_component_configurations
                    .write_list("pluginComponentConfigurations"),
            )
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        let (name, engine_type) = read_identity(element)?;
        let mut settings = BuildEngineSettings::new(name, engine_type);
        for child in &element.children {
            match child.name.as_str() {
                "propertyBag" => settings.properties = BuildProperties::read_xml(child)?,
                "configurations" => settings.configurations.read_list(child)?,
                "pluginConfigurations" => settings.plugin_configurations.read_list(child)?,
                "componentConfigurations" => settings.component_configurations.read_list(child)?,
                "pluginComponentConfigurations" => {
                    settings.plugin_component_configurations.read_list(child)?
                }
                other => log::debug!("Ignoring <{}> in engine settings '{}'", other, settings.name),
            }
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BuildEngineSettings {
        let mut settings = BuildEngineSettings::new("Reference", BuildEngineType::Reference);
        settings.properties.set("TocLayout", "Hierarchical");
        settings
            .configurations
            .add(BuildConfiguration::new("Sandcastle.References.Links", BuildEngineType::Reference))
            .unwrap();
        let mut plugin = BuildConfiguration::new("Sandcastle.Plugins.AutoDoc", BuildEngineType::Reference);
        plugin.enabled = false;
        settings.plugin_configurations.add(plugin).unwrap();
        settings
            .component_configurations
            .add(BuildComponentConfiguration::new(
                "Sandcastle.Components.Code",
                BuildEngineType::Reference,
                "Sandcastle.Components.ReferenceCodeComponent",
            ))
            .unwrap();
        settings
    }

    #[test]
    fn test_rejects_other_engine_type() {
        let mut settings = sample();
        let result = settings
            .configurations
            .add(BuildConfiguration::new("Conceptual.Links", BuildEngineType::Conceptual));
        assert!(matches!(result, Err(BuildError::Config { .. })));
        assert_eq!(settings.configurations.len(), 1);
    }

    #[test]
    fn test_xml_round_trip_keeps_names_and_types() {
        let settings = sample();
        let content = settings.write_xml().to_xml_string().unwrap();
        let read = BuildEngineSettings::read_xml(&XmlElement::parse(&content).unwrap()).unwrap();

        assert_eq!(read.name(), "Reference");
        assert_eq!(read.engine_type(), BuildEngineType::Reference);
        assert_eq!(read.properties.get("TocLayout"), Some("Hierarchical"));

        let links = read.configurations.get("Sandcastle.References.Links").unwrap();
        assert_eq!(links.engine_type(), BuildEngineType::Reference);
        assert!(links.continue_on_error);

        let plugin = read.plugin_configurations.get("Sandcastle.Plugins.AutoDoc").unwrap();
        assert!(!plugin.enabled);

        let components: Vec<&str> = read
            .component_configurations
            .for_component("sandcastle.components.referencecodecomponent")
            .map(|c| c.name())
            .collect();
        assert_eq!(components, vec!["Sandcastle.Components.Code"]);
        assert!(read.plugin_component_configurations.is_empty());
    }

    #[test]
    fn test_read_rejects_mismatched_items() {
        let element = XmlElement::new("engineSetting")
            .with_attr("name", "Conceptual")
            .with_attr("type", "Conceptual")
            .with_child(
                XmlElement::new("configurations").with_child(
                    XmlElement::new("configuration")
                        .with_attr("name", "Links")
                        .with_attr("type", "Reference"),
                ),
            );
        assert!(BuildEngineSettings::read_xml(&element).is_err());
    }
}
