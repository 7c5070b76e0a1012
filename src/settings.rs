//! Build settings read from the `<settings>` section of a project file.

pub mod engine;

use log::debug;
use std::path::{Path, PathBuf};

pub use engine::{
    BuildComponentConfiguration, BuildConfiguration, BuildEngineSettings, BuildEngineType,
    EngineItem, EngineItemList,
};

use crate::error::{BuildError, Result};
use crate::format::{BuildFormat, BuildFormatType};
use crate::keyed::{KeyedList, NamedItem};
use crate::logger::BuildLoggerVerbosity;
use crate::properties::BuildProperties;
use crate::xml::{XmlElement, XmlSerializable};

/// Subfolders created under the output directory of every build
pub const DEFAULT_OUTPUT_FOLDERS: [&str; 6] = ["icons", "scripts", "styles", "media", "images", "maths"];

/// Logging options of a build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildLogging {
    pub verbosity: BuildLoggerVerbosity,
    pub use_file: bool,
    pub keep_file: bool,
    pub file_name: String,
    /// Names of additional loggers
    pub loggers: Vec<String>,
}

impl Default for BuildLogging {
    fn default() -> Self {
        Self {
            verbosity: BuildLoggerVerbosity::Minimal,
            use_file: true,
            keep_file: true,
            file_name: "HelpBuild.log".to_string(),
            loggers: Vec::new(),
        }
    }
}

impl XmlSerializable for BuildLogging {
    const TAG_NAME: &'static str = "logging";

    fn write_xml(&self) -> XmlElement {
        let mut loggers = XmlElement::new("loggers");
        for name in &self.loggers {
            loggers.push(XmlElement::new("logger").with_attr("name", name.as_str()));
        }
        XmlElement::new(Self::TAG_NAME)
            .with_attr("verbosity", self.verbosity.to_string())
            .with_attr("useFile", self.use_file.to_string())
            .with_attr("keepFile", self.keep_file.to_string())
            .with_attr("fileName", self.file_name.as_str())
            .with_child(loggers)
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        let mut logging = BuildLogging::default();
        if let Some(verbosity) = element.attr_non_empty("verbosity") {
            logging.verbosity = verbosity.parse()?;
        }
        logging.use_file = element.attr_bool("useFile").unwrap_or(logging.use_file);
        logging.keep_file = element.attr_bool("keepFile").unwrap_or(logging.keep_file);
        if let Some(file_name) = element.attr_non_empty("fileName") {
            logging.file_name = file_name.to_string();
        }
        if let Some(loggers) = element.child("loggers") {
            logging.loggers = loggers
                .children_named("logger")
                .filter_map(|logger| logger.attr_non_empty("name"))
                .map(str::to_string)
                .collect();
        }
        Ok(logging)
    }
}

/// Settings shared by every step of a build
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub help_name: String,
    pub help_title: String,
    pub clean_intermediate: bool,
    pub build_references: bool,
    pub build_conceptual: bool,
    /// Wrap the reference TOC under a root container topic
    pub root_namespace_container: bool,
    pub root_namespace_title: String,
    pub presentation_style: String,

    pub working_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub sandcastle_dir: Option<PathBuf>,
    pub styles_dir: Option<PathBuf>,

    pub output_folders: Vec<String>,
    pub formats: Vec<BuildFormat>,
    pub logging: BuildLogging,
    pub engine_settings: KeyedList<BuildEngineSettings>,
    pub properties: BuildProperties,
}

impl Default for BuildSettings {
    fn default() -> Self {
        let mut engine_settings = KeyedList::new();
        engine_settings.add(BuildEngineSettings::new("Reference", BuildEngineType::Reference));
        engine_settings.add(BuildEngineSettings::new("Conceptual", BuildEngineType::Conceptual));

        Self {
            help_name: "Documentation".to_string(),
            help_title: "Sandcastle Documentation".to_string(),
            clean_intermediate: true,
            build_references: true,
            build_conceptual: true,
            root_namespace_container: false,
            root_namespace_title: String::new(),
            presentation_style: "Vs2005".to_string(),
            working_dir: None,
            output_dir: None,
            sandcastle_dir: None,
            styles_dir: None,
            output_folders: DEFAULT_OUTPUT_FOLDERS.iter().map(|f| f.to_string()).collect(),
            formats: vec![
                BuildFormat::new(BuildFormatType::HtmlHelp1),
                BuildFormat::new(BuildFormatType::HtmlHelp2).disabled(),
                BuildFormat::new(BuildFormatType::HtmlHelp3).disabled(),
                BuildFormat::new(BuildFormatType::WebHelp).disabled(),
            ],
            logging: BuildLogging::default(),
            engine_settings,
            properties: BuildProperties::new(),
        }
    }
}

impl BuildSettings {
    pub fn load(path: &Path) -> Result<Self> {
        let root = XmlElement::read_file(path)?;
        BuildSettings::read_xml(&root).map_err(|e| e.with_path(path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.write_xml().write_file(path)
    }

    pub fn enabled_formats(&self) -> impl Iterator<Item = &BuildFormat> {
        self.formats.iter().filter(|format| format.enabled)
    }

    pub fn format(&self, format_type: BuildFormatType) -> Option<&BuildFormat> {
        self.formats.iter().find(|format| format.format_type == format_type)
    }

    pub fn engine(&self, engine_type: BuildEngineType) -> Option<&BuildEngineSettings> {
        self.engine_settings
            .iter()
            .find(|settings| settings.engine_type() == engine_type)
    }

    /// Add or replace a format of the same type
    pub fn set_format(&mut self, format: BuildFormat) {
        match self
            .formats
            .iter_mut()
            .find(|existing| existing.format_type == format.format_type)
        {
            Some(existing) => *existing = format,
            None => self.formats.push(format),
        }
    }

    fn read_general(&mut self, group: &XmlElement) -> Result<()> {
        let properties = BuildProperties::read_properties(group)?;
        for (name, value) in properties.iter() {
            let flag = || {
                crate::xml::parse_bool(value).ok_or_else(|| {
                    BuildError::config(format!("invalid boolean '{value}' for {name}"))
                })
            };
            match name.to_ascii_lowercase().as_str() {
                "helpname" => self.help_name = value.to_string(),
                "helptitle" => self.help_title = value.to_string(),
                "cleanintermediate" => self.clean_intermediate = flag()?,
                "buildreferences" => self.build_references = flag()?,
                "buildconceptual" => self.build_conceptual = flag()?,
                "rootnamespacecontainer" => self.root_namespace_container = flag()?,
                "rootnamespacetitle" => self.root_namespace_title = value.to_string(),
                "presentationstyle" => self.presentation_style = value.to_string(),
                _ => {
                    debug!("Keeping unrecognized general setting '{}' as a property", name);
                    self.properties.set(name, value);
                }
            }
        }
        Ok(())
    }

    fn write_general(&self) -> XmlElement {
        let general: BuildProperties = [
            ("HelpName", self.help_name.clone()),
            ("HelpTitle", self.help_title.clone()),
            ("CleanIntermediate", self.clean_intermediate.to_string()),
            ("BuildReferences", self.build_references.to_string()),
            ("BuildConceptual", self.build_conceptual.to_string()),
            ("RootNamespaceContainer", self.root_namespace_container.to_string()),
            ("RootNamespaceTitle", self.root_namespace_title.clone()),
            ("PresentationStyle", self.presentation_style.clone()),
        ]
        .into_iter()
        .collect();

        let mut element = XmlElement::new("propertyGroup").with_attr("name", "General");
        general.write_properties(&mut element);
        element
    }
}

fn write_directory(directories: &mut XmlElement, kind: &str, path: &Option<PathBuf>) {
    if let Some(path) = path {
        directories.push(
            XmlElement::new("directory")
                .with_attr("type", kind)
                .with_attr("path", path.display().to_string()),
        );
    }
}

impl XmlSerializable for BuildSettings {
    const TAG_NAME: &'static str = "settings";

    fn write_xml(&self) -> XmlElement {
        let mut element = XmlElement::new(Self::TAG_NAME);
        element.push(self.write_general());
        element.push(self.properties.write_xml());

        let mut directories = XmlElement::new("directories");
        write_directory(&mut directories, "Working", &self.working_dir);
        write_directory(&mut directories, "Output", &self.output_dir);
        write_directory(&mut directories, "Sandcastle", &self.sandcastle_dir);
        write_directory(&mut directories, "Styles", &self.styles_dir);
        element.push(directories);

        let mut output_folders = XmlElement::new("outputFolders");
        for folder in &self.output_folders {
            output_folders.push(XmlElement::new("outputFolder").with_attr("name", folder.as_str()));
        }
        element.push(output_folders);

        let mut formats = XmlElement::new("formats");
        for format in &self.formats {
            formats.push(format.write_xml());
        }
        element.push(formats);

        element.push(XmlElement::new("options").with_child(self.logging.write_xml()));

        let mut engine_settings = XmlElement::new("engineSettings");
        for settings in self.engine_settings.iter() {
            engine_settings.push(settings.write_xml());
        }
        element.push(engine_settings);
        element
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        if element.name != Self::TAG_NAME {
            return Err(BuildError::xml(format!(
                "expected <{}> but found <{}>",
                Self::TAG_NAME,
                element.name
            )));
        }

        let mut settings = BuildSettings::default();
        for child in &element.children {
            match child.name.as_str() {
                "propertyGroup" => {
                    if child.attr("name").is_some_and(|n| n.eq_ignore_ascii_case("General")) {
                        settings.read_general(child)?;
                    }
                }
                "propertyBag" => {
                    let properties = BuildProperties::read_xml(child)?;
                    settings.properties.extend_from(&properties);
                }
                "directories" => {
                    for directory in child.children_named("directory") {
                        let path = directory
                            .attr_non_empty("path")
                            .map(PathBuf::from)
                            .or_else(|| (!directory.text.is_empty()).then(|| PathBuf::from(&directory.text)));
                        let target = match directory.attr("type").map(str::to_ascii_lowercase).as_deref() {
                            Some("working") => &mut settings.working_dir,
                            Some("output") => &mut settings.output_dir,
                            Some("sandcastle") => &mut settings.sandcastle_dir,
                            Some("styles") => &mut settings.styles_dir,
                            other => {
                                debug!("Ignoring directory of type {:?}", other);
                                continue;
                            }
                        };
                        *target = path;
                    }
                }
                "outputFolders" => {
                    settings.output_folders = child
                        .children_named("outputFolder")
                        .filter_map(|folder| folder.attr_non_empty("name"))
                        .map(str::to_string)
                        .collect();
                }
                "formats" => {
                    for format in child.children_named(BuildFormat::TAG_NAME) {
                        settings.set_format(BuildFormat::read_xml(format)?);
                    }
                }
                "options" => {
                    if let Some(logging) = child.child(BuildLogging::TAG_NAME) {
                        settings.logging = BuildLogging::read_xml(logging)?;
                    }
                }
                "engineSettings" => {
                    for engine in child.children_named(BuildEngineSettings::TAG_NAME) {
                        let engine = BuildEngineSettings::read_xml(engine)?;
                        debug!("Read {} engine settings '{}'", engine.engine_type(), engine.name());
                        settings.engine_settings.add(engine);
                    }
                }
                other => debug!("Ignoring <{}> in settings", other),
            }
        }
        Ok(settings)
    }
}
