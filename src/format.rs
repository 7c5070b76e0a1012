//! Output formats of a documentation build and the steps that compile them.

use anyhow::Context;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::context::BuildContext;
use crate::error::{BuildError, Result};
use crate::group::BuildGroupType;
use crate::properties::BuildProperties;
use crate::step::{BuildStep, StepFunction, StepProcess, StepScope};
use crate::toc::{self, BuildGroupTocInfo, TocHtmlOptions, HELP_TOC_FILE};
use crate::xml::{XmlElement, XmlSerializable};

/// Prefix of custom format type names, `CustomFormat12`
const CUSTOM_PREFIX: &str = "CustomFormat";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildFormatType {
    None,
    WebHelp,
    /// Compiled HTML Help, `.chm`
    HtmlHelp1,
    /// Microsoft Help 2, `.HxS`
    HtmlHelp2,
    /// Microsoft Help Viewer, `.mshc`
    HtmlHelp3,
    Custom(u32),
}

impl fmt::Display for BuildFormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildFormatType::None => f.write_str("None"),
            BuildFormatType::WebHelp => f.write_str("WebHelp"),
            BuildFormatType::HtmlHelp1 => f.write_str("HtmlHelp1"),
            BuildFormatType::HtmlHelp2 => f.write_str("HtmlHelp2"),
            BuildFormatType::HtmlHelp3 => f.write_str("HtmlHelp3"),
            BuildFormatType::Custom(n) => write!(f, "{CUSTOM_PREFIX}{n}"),
        }
    }
}

impl FromStr for BuildFormatType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        let value = s.trim();
        match value.to_ascii_lowercase().as_str() {
            "none" => return Ok(BuildFormatType::None),
            "webhelp" => return Ok(BuildFormatType::WebHelp),
            "htmlhelp1" => return Ok(BuildFormatType::HtmlHelp1),
            "htmlhelp2" => return Ok(BuildFormatType::HtmlHelp2),
            "htmlhelp3" => return Ok(BuildFormatType::HtmlHelp3),
            _ => {}
        }
        value
            .strip_prefix(CUSTOM_PREFIX)
            .and_then(|n| n.parse().ok())
            .map(BuildFormatType::Custom)
            .ok_or_else(|| BuildError::config(format!("unknown format type '{value}'")))
    }
}

/// Points in a build where a format contributes steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    CloseViewer,
    StartViewer,
    Compilation,
}

#[derive(Debug, Clone)]
pub struct BuildFormat {
    pub format_type: BuildFormatType,
    pub name: String,
    pub enabled: bool,
    /// Folder of the transformed topics in the working directory
    pub format_folder: String,
    /// Folder of the compiled help under the output directory
    pub output_folder: String,
    pub close_viewer_before_build: bool,
    pub open_viewer_after_build: bool,
    pub indent: bool,
    pub properties: BuildProperties,
}

impl BuildFormat {
    pub fn new(format_type: BuildFormatType) -> Self {
        let (name, format_folder, output_folder) = match format_type {
            BuildFormatType::HtmlHelp1 => ("HtmlHelp 1.x", "html", "HtmlHelp"),
            BuildFormatType::HtmlHelp2 => ("HtmlHelp 2.x", "html2", "MsdnHelp"),
            BuildFormatType::HtmlHelp3 => ("HtmlHelp 3.x", "html3", "HelpViewer"),
            BuildFormatType::WebHelp => ("WebHelp", "html0", "WebHelp"),
            BuildFormatType::None | BuildFormatType::Custom(_) => ("Custom", "html", "Output"),
        };
        Self {
            format_type,
            name: name.to_string(),
            enabled: true,
            format_folder: format_folder.to_string(),
            output_folder: output_folder.to_string(),
            close_viewer_before_build: format_type == BuildFormatType::HtmlHelp3,
            open_viewer_after_build: false,
            indent: false,
            properties: BuildProperties::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Extension of the compiled help file
    pub fn extension(&self) -> &'static str {
        match self.format_type {
            BuildFormatType::HtmlHelp1 => "chm",
            BuildFormatType::HtmlHelp2 => "HxS",
            BuildFormatType::HtmlHelp3 => "mshc",
            _ => "htm",
        }
    }

    /// Main file of the compiled help: `<help name>.<ext>`, or `index.htm`
    /// for web help
    pub fn output_file(&self, help_name: &str) -> String {
        match self.format_type {
            BuildFormatType::WebHelp => "index.htm".to_string(),
            _ => format!("{}.{}", help_name, self.extension()),
        }
    }

    fn viewer(&self) -> Option<String> {
        if let Some(viewer) = self.properties.get("Viewer").filter(|v| !v.is_empty()) {
            return Some(viewer.to_string());
        }
        let viewer = match self.format_type {
            BuildFormatType::HtmlHelp1 => "hh.exe",
            BuildFormatType::HtmlHelp2 => "dexplore.exe",
            BuildFormatType::HtmlHelp3 => "HelpLibAgent.exe",
            _ => return None,
        };
        Some(viewer.to_string())
    }

    /// The step this format runs at `stage`, if any
    pub fn create_step(&self, ctx: &BuildContext, stage: BuildStage, working_dir: &Path) -> Option<BuildStep> {
        let help_name = ctx.settings().help_name.clone();
        let output_root = if ctx.output_dir().as_os_str().is_empty() {
            working_dir
        } else {
            ctx.output_dir()
        };
        let output_dir = output_root.join(&self.output_folder);
        let output_path = output_dir.join(self.output_file(&help_name));

        match stage {
            BuildStage::CloseViewer => self.close_viewer_step(working_dir),
            BuildStage::StartViewer => {
                if !self.open_viewer_after_build {
                    return None;
                }
                let viewer = self.viewer()?;
                let process = StepProcess::new(viewer)
                    .arg(output_path.display().to_string())
                    .ignore_exit_code();
                Some(
                    BuildStep::new(format!("{}.StartViewer", self.name), process)
                        .with_working_dir(working_dir)
                        .with_message(format!("Opening the {} viewer", self.name))
                        .continue_on_error(true),
                )
            }
            BuildStage::Compilation => self.compile_step(ctx, working_dir, &help_name, output_dir, output_path),
        }
    }

    fn close_viewer_step(&self, working_dir: &Path) -> Option<BuildStep> {
        if !cfg!(windows) || !self.close_viewer_before_build {
            return None;
        }
        let viewer = self.viewer()?;
        let process = StepProcess::new("taskkill")
            .args(["/F", "/IM", viewer.as_str()])
            .ignore_exit_code();
        Some(
            BuildStep::new(format!("{}.CloseViewer", self.name), process)
                .with_working_dir(working_dir)
                .continue_on_error(true),
        )
    }

    fn compile_step(
        &self,
        ctx: &BuildContext,
        working_dir: &Path,
        help_name: &str,
        output_dir: PathBuf,
        output_path: PathBuf,
    ) -> Option<BuildStep> {
        let help_dir = working_dir.join(&self.output_folder);
        let compiler = match self.format_type {
            BuildFormatType::HtmlHelp1 => StepProcess::new(self.tool("Compiler", "hhc.exe"))
                .arg(format!("{help_name}.hhp"))
                .expect_exit_code(1),
            BuildFormatType::HtmlHelp2 => StepProcess::new(self.tool("Compiler", "hxcomp.exe"))
                .args(["-p".to_string(), format!("{help_name}.HxC")]),
            BuildFormatType::HtmlHelp3 => StepProcess::new(self.tool("Packager", "MSHCPackager.exe"))
                .args([format!("/out:{help_name}.mshc"), format!("/in:{}", self.format_folder)]),
            BuildFormatType::WebHelp => return Some(self.web_help_step(ctx, working_dir, output_dir)),
            BuildFormatType::None | BuildFormatType::Custom(_) => return None,
        };

        let mut compiler = compiler;
        compiler.copyright_notice = 2;
        let mut compile = BuildStep::new(format!("{}.Compile", self.name), compiler)
            .with_working_dir(&help_dir)
            .with_message(format!("Compiling the {} help file", self.name));
        compile.log_time_span = false;

        let compiled = help_dir.join(self.output_file(help_name));
        let format_type = self.format_type;
        let publish = StepFunction::new("FormatPublish", move |ctx: &mut BuildContext, _scope: &StepScope<'_>| {
            if compiled != output_path {
                if let Some(parent) = output_path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(&compiled, &output_path).with_context(|| {
                    format!("Failed to copy {} to {}", compiled.display(), output_path.display())
                })?;
            }
            ctx.add_output(format_type, &output_path);
            Ok(true)
        });
        let mut publish = BuildStep::new(format!("{}.Publish", self.name), publish);
        publish.log_time_span = false;

        Some(
            BuildStep::multi(format!("{}.Compilation", self.name), vec![compile, publish])
                .with_title(format!("Building document output format - {}", self.name)),
        )
    }

    fn tool(&self, property: &str, default: &str) -> String {
        self.properties.get_or(property, default).to_string()
    }

    fn web_help_step(&self, ctx: &BuildContext, working_dir: &Path, output_dir: PathBuf) -> BuildStep {
        let format_type = self.format_type;
        let help_title = ctx.settings().help_title.clone();
        let merged_toc = working_dir.join(HELP_TOC_FILE);
        let options = TocHtmlOptions {
            html_folder: self.format_folder.clone(),
            ..TocHtmlOptions::default()
        };

        let write_web_help = StepFunction::new("FormatWeb", move |ctx: &mut BuildContext, _scope: &StepScope<'_>| {
            let toc_html = if ctx.toc().is_empty() {
                let mut merged = BuildGroupTocInfo::new("Help", BuildGroupType::Conceptual)
                    .with_toc_file(&merged_toc);
                merged.load()?;
                toc::render_group(&merged, &options)
            } else {
                toc::render_toc(ctx.toc(), &options)
            };

            fs::create_dir_all(&output_dir)
                .with_context(|| format!("Failed to create {}", output_dir.display()))?;
            let title = html_escape::encode_text(&help_title);
            let toc_page = format!(
                "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<body>\n{toc_html}</body>\n</html>\n"
            );
            fs::write(output_dir.join("toc.htm"), toc_page)?;
            let index_page = format!(
                "<!DOCTYPE html>\n<html>\n<head><title>{title}</title></head>\n<frameset cols=\"25%,*\">\n<frame src=\"toc.htm\" name=\"toc\" />\n<frame name=\"content\" />\n</frameset>\n</html>\n"
            );
            let index = output_dir.join("index.htm");
            fs::write(&index, index_page)?;
            debug!("Wrote web help to {}", output_dir.display());
            ctx.add_output(format_type, index);
            Ok(true)
        });

        BuildStep::new(format!("{}.Compilation", self.name), write_web_help)
            .with_working_dir(working_dir)
            .with_title(format!("Building document output format - {}", self.name))
    }
}

impl XmlSerializable for BuildFormat {
    const TAG_NAME: &'static str = "format";

    fn write_xml(&self) -> XmlElement {
        let mut element = XmlElement::new(Self::TAG_NAME)
            .with_attr("type", self.format_type.to_string())
            .with_attr("name", self.name.as_str())
            .with_attr("enabled", self.enabled.to_string())
            .with_attr("formatFolder", self.format_folder.as_str())
            .with_attr("outputFolder", self.output_folder.as_str())
            .with_attr("closeViewerBeforeBuild", self.close_viewer_before_build.to_string())
            .with_attr("openViewerAfterBuild", self.open_viewer_after_build.to_string())
            .with_attr("indent", self.indent.to_string());
        if !self.properties.is_empty() {
            element.push(self.properties.write_xml());
        }
        element
    }

    fn read_xml(element: &XmlElement) -> Result<Self> {
        let format_type: BuildFormatType = element
            .attr_non_empty("type")
            .ok_or_else(|| BuildError::config("a format requires a type"))?
            .parse()?;

        let mut format = BuildFormat::new(format_type);
        if let Some(name) = element.attr_non_empty("name") {
            format.name = name.to_string();
        }
        format.enabled = element.attr_bool("enabled").unwrap_or(format.enabled);
        if let Some(folder) = element.attr_non_empty("formatFolder") {
            format.format_folder = folder.to_string();
        }
        if let Some(folder) = element.attr_non_empty("outputFolder") {
            format.output_folder = folder.to_string();
        }
        format.close_viewer_before_build = element
            .attr_bool("closeViewerBeforeBuild")
            .unwrap_or(format.close_viewer_before_build);
        format.open_viewer_after_build = element
            .attr_bool("openViewerAfterBuild")
            .unwrap_or(format.open_viewer_after_build);
        format.indent = element.attr_bool("indent").unwrap_or(format.indent);
        if let Some(properties) = element.child(BuildProperties::TAG_NAME) {
            format.properties = BuildProperties::read_xml(properties)?;
        }
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use crate::toc::BuildTopicTocInfo;
    use tempfile::TempDir;

    #[test]
    fn test_format_type_names() {
        assert_eq!("htmlhelp1".parse::<BuildFormatType>().unwrap(), BuildFormatType::HtmlHelp1);
        assert_eq!(BuildFormatType::Custom(12).to_string(), "CustomFormat12");
        assert_eq!(
            "CustomFormat12".parse::<BuildFormatType>().unwrap(),
            BuildFormatType::Custom(12)
        );
        assert!("Pdf".parse::<BuildFormatType>().is_err());
    }

    #[test]
    fn test_xml_round_trip() {
        let mut format = BuildFormat::new(BuildFormatType::HtmlHelp3);
        format.open_viewer_after_build = true;
        format.properties.set("Packager", "HelpPack.exe");

        let read = BuildFormat::read_xml(&format.write_xml()).unwrap();
        assert_eq!(read.format_type, BuildFormatType::HtmlHelp3);
        assert_eq!(read.output_folder, "HelpViewer");
        assert!(read.close_viewer_before_build);
        assert!(read.open_viewer_after_build);
        assert_eq!(read.properties.get("Packager"), Some("HelpPack.exe"));

        let minimal = XmlElement::new("format").with_attr("type", "HtmlHelp1");
        let read = BuildFormat::read_xml(&minimal).unwrap();
        assert!(read.enabled);
        assert_eq!(read.format_folder, "html");
        assert!(BuildFormat::read_xml(&XmlElement::new("format")).is_err());
    }

    #[test]
    fn test_compilation_steps() {
        let (ctx, _log) = test_context();
        let working_dir = Path::new("/work/_HelpBuild");

        let chm = BuildFormat::new(BuildFormatType::HtmlHelp1)
            .create_step(&ctx, BuildStage::Compilation, working_dir)
            .unwrap();
        assert!(chm.is_multi_step());
        assert_eq!(chm.title, "Building document output format - HtmlHelp 1.x");
        let children = chm.as_multi().unwrap().steps();
        assert_eq!(children[0].kind(), "StepProcess");
        assert_eq!(children[0].working_dir(), Path::new("/work/_HelpBuild/HtmlHelp"));
        assert_eq!(children[1].kind(), "FormatPublish");

        let custom = BuildFormat::new(BuildFormatType::Custom(10));
        assert!(custom.create_step(&ctx, BuildStage::Compilation, working_dir).is_none());
    }

    #[test]
    fn test_viewer_steps() {
        let (ctx, _log) = test_context();
        let working_dir = Path::new("/work");
        let mut chm = BuildFormat::new(BuildFormatType::HtmlHelp1);
        assert!(chm.create_step(&ctx, BuildStage::StartViewer, working_dir).is_none());

        chm.open_viewer_after_build = true;
        let start = chm.create_step(&ctx, BuildStage::StartViewer, working_dir).unwrap();
        assert_eq!(start.kind(), "StepProcess");
        assert!(start.continue_on_error);

        let web = BuildFormat::new(BuildFormatType::WebHelp);
        assert!(web.create_step(&ctx, BuildStage::CloseViewer, working_dir).is_none());
        let mhv = BuildFormat::new(BuildFormatType::HtmlHelp3);
        assert_eq!(
            mhv.create_step(&ctx, BuildStage::CloseViewer, working_dir).is_some(),
            cfg!(windows)
        );
    }

    #[test]
    fn test_web_help_is_written_from_toc() {
        let temp_dir = TempDir::new().unwrap();
        let (mut ctx, _log) = test_context();
        let mut guide = BuildGroupTocInfo::new("Guide", BuildGroupType::Conceptual);
        guide.add(BuildTopicTocInfo::new("intro", "intro", None));
        ctx.toc_mut().add_group(guide);

        let format = BuildFormat::new(BuildFormatType::WebHelp);
        let mut step = format
            .create_step(&ctx, BuildStage::Compilation, temp_dir.path())
            .unwrap();
        assert!(step.initialize(&mut ctx));
        assert!(step.execute(&mut ctx).unwrap());

        let web_dir = temp_dir.path().join("WebHelp");
        let toc_page = fs::read_to_string(web_dir.join("toc.htm")).unwrap();
        assert!(toc_page.contains("intro"));
        assert!(web_dir.join("index.htm").is_file());
        assert_eq!(ctx.outputs(), &[(BuildFormatType::WebHelp, web_dir.join("index.htm"))]);
    }
}
