//! Build log stream.
//!
//! The build log is a separate channel from the diagnostic `log` output: it is
//! what the user of a documentation build sees (tool output, step titles,
//! timings). [`ConsoleLogger`] forwards the stream to the `log` facade,
//! [`FileLogger`] writes it to `HelpBuild.log`, and [`BuildLoggers`] fans a
//! line out to every registered logger.

use chrono::Local;
use log::{debug, log, warn, Level};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::error::{BuildError, Result};

/// Category of a build log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildLoggerLevel {
    /// Raw tool output, written without a prefix
    None,
    Started,
    Info,
    Warn,
    Error,
    Ended,
    Copyright,
}

impl BuildLoggerLevel {
    pub fn prefix(self) -> &'static str {
        match self {
            BuildLoggerLevel::None => "",
            BuildLoggerLevel::Started => "Started: ",
            BuildLoggerLevel::Info => "Info: ",
            BuildLoggerLevel::Warn => "Warning: ",
            BuildLoggerLevel::Error => "Error: ",
            BuildLoggerLevel::Ended => "Ended: ",
            BuildLoggerLevel::Copyright => "Copyright: ",
        }
    }
}

/// How much tool output a build writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub enum BuildLoggerVerbosity {
    /// Not set; steps inherit the verbosity of the logging settings
    #[default]
    None,
    Quiet,
    Minimal,
    Normal,
    Detailed,
    Diagnostic,
}

impl fmt::Display for BuildLoggerVerbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildLoggerVerbosity::None => "None",
            BuildLoggerVerbosity::Quiet => "Quiet",
            BuildLoggerVerbosity::Minimal => "Minimal",
            BuildLoggerVerbosity::Normal => "Normal",
            BuildLoggerVerbosity::Detailed => "Detailed",
            BuildLoggerVerbosity::Diagnostic => "Diagnostic",
        };
        f.write_str(name)
    }
}

impl FromStr for BuildLoggerVerbosity {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(BuildLoggerVerbosity::None),
            "quiet" => Ok(BuildLoggerVerbosity::Quiet),
            "minimal" => Ok(BuildLoggerVerbosity::Minimal),
            "normal" => Ok(BuildLoggerVerbosity::Normal),
            "detailed" => Ok(BuildLoggerVerbosity::Detailed),
            "diagnostic" => Ok(BuildLoggerVerbosity::Diagnostic),
            other => Err(BuildError::config(format!(
                "unknown logger verbosity '{other}'"
            ))),
        }
    }
}

/// Per-level switches shared by every logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelFilter {
    pub log_started: bool,
    pub log_info: bool,
    pub log_warn: bool,
    pub log_error: bool,
    pub log_ended: bool,
    pub log_copyright: bool,
    pub prefix: bool,
}

impl Default for LevelFilter {
    fn default() -> Self {
        Self {
            log_started: true,
            log_info: true,
            log_warn: true,
            log_error: true,
            log_ended: true,
            log_copyright: false,
            prefix: true,
        }
    }
}

impl LevelFilter {
    pub fn allows(&self, level: BuildLoggerLevel) -> bool {
        match level {
            BuildLoggerLevel::None => true,
            BuildLoggerLevel::Started => self.log_started,
            BuildLoggerLevel::Info => self.log_info,
            BuildLoggerLevel::Warn => self.log_warn,
            BuildLoggerLevel::Error => self.log_error,
            BuildLoggerLevel::Ended => self.log_ended,
            BuildLoggerLevel::Copyright => self.log_copyright,
        }
    }

    /// Format a line for output, or `None` when the level is switched off
    pub fn format(&self, text: &str, level: BuildLoggerLevel) -> Option<String> {
        if !self.allows(level) {
            return None;
        }
        if text.is_empty() || !self.prefix {
            return Some(text.to_string());
        }
        Some(format!("{}{}", level.prefix(), text))
    }
}

/// A sink for the build log stream
pub trait BuildLogger: Send {
    fn name(&self) -> &str;

    fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn uninitialize(&mut self) -> Result<()> {
        Ok(())
    }

    fn verbosity(&self) -> BuildLoggerVerbosity;

    fn set_verbosity(&mut self, verbosity: BuildLoggerVerbosity);

    /// Write one line; an empty `text` writes a blank line
    fn write_line(&mut self, text: &str, level: BuildLoggerLevel);

    fn write_blank(&mut self) {
        self.write_line("", BuildLoggerLevel::None);
    }

    fn write_error(&mut self, err: &dyn fmt::Display) {
        self.write_line(&err.to_string(), BuildLoggerLevel::Error);
    }
}

/// Writes the build log through the `log` facade
#[derive(Debug, Default)]
pub struct ConsoleLogger {
    pub filter: LevelFilter,
    verbosity: BuildLoggerVerbosity,
}

impl ConsoleLogger {
    pub fn new(verbosity: BuildLoggerVerbosity) -> Self {
        Self {
            filter: LevelFilter::default(),
            verbosity,
        }
    }
}

impl BuildLogger for ConsoleLogger {
    fn name(&self) -> &str {
        "console"
    }

    fn verbosity(&self) -> BuildLoggerVerbosity {
        self.verbosity
    }

    fn set_verbosity(&mut self, verbosity: BuildLoggerVerbosity) {
        self.verbosity = verbosity;
    }

    fn write_line(&mut self, text: &str, level: BuildLoggerLevel) {
        let Some(line) = self.filter.format(text, level) else {
            return;
        };
        log!(console_level(level), "{}", line);
    }
}

/// Tool output (`None`) shows at the default `info` filter
fn console_level(level: BuildLoggerLevel) -> Level {
    match level {
        BuildLoggerLevel::Error => Level::Error,
        BuildLoggerLevel::Warn => Level::Warn,
        _ => Level::Info,
    }
}

/// Writes the build log to a file, one timestamped line per entry
pub struct FileLogger {
    pub filter: LevelFilter,
    path: PathBuf,
    verbosity: BuildLoggerVerbosity,
    writer: Option<BufWriter<File>>,
}

impl FileLogger {
    pub fn new(path: impl Into<PathBuf>, verbosity: BuildLoggerVerbosity) -> Self {
        Self {
            filter: LevelFilter::default(),
            path: path.into(),
            verbosity,
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }
}

impl BuildLogger for FileLogger {
    fn name(&self) -> &str {
        "file"
    }

    fn initialize(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        debug!("Build log opened at {}", self.path.display());
        Ok(())
    }

    fn uninitialize(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(())
    }

    fn verbosity(&self) -> BuildLoggerVerbosity {
        self.verbosity
    }

    fn set_verbosity(&mut self, verbosity: BuildLoggerVerbosity) {
        self.verbosity = verbosity;
    }

    fn write_line(&mut self, text: &str, level: BuildLoggerLevel) {
        let Some(line) = self.filter.format(text, level) else {
            return;
        };
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let result = if line.is_empty() {
            writeln!(writer)
        } else {
            writeln!(
                writer,
                "[{}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                line
            )
        };
        if let Err(e) = result {
            warn!("Failed to write to build log {}: {}", self.path.display(), e);
        }
    }
}

impl Drop for FileLogger {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.as_mut() {
            let _ = writer.flush();
        }
    }
}

/// Keeps the build log in memory; clones share the same buffer
#[derive(Debug, Clone, Default)]
pub struct BufferLogger {
    pub filter: LevelFilter,
    verbosity: BuildLoggerVerbosity,
    lines: Arc<Mutex<Vec<(BuildLoggerLevel, String)>>>,
}

impl BufferLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(BuildLoggerLevel, String)> {
        match self.lines.lock() {
            Ok(lines) => lines.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Whether any line contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|(_, line)| line.contains(needle))
    }
}

impl BuildLogger for BufferLogger {
    fn name(&self) -> &str {
        "buffer"
    }

    fn verbosity(&self) -> BuildLoggerVerbosity {
        self.verbosity
    }

    fn set_verbosity(&mut self, verbosity: BuildLoggerVerbosity) {
        self.verbosity = verbosity;
    }

    fn write_line(&mut self, text: &str, level: BuildLoggerLevel) {
        let Some(line) = self.filter.format(text, level) else {
            return;
        };
        match self.lines.lock() {
            Ok(mut lines) => lines.push((level, line)),
            Err(poisoned) => poisoned.into_inner().push((level, line)),
        }
    }
}

/// Fan-out logger used by the build context
#[derive(Default)]
pub struct BuildLoggers {
    loggers: Vec<Box<dyn BuildLogger>>,
    verbosity: BuildLoggerVerbosity,
}

impl BuildLoggers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, logger: Box<dyn BuildLogger>) {
        self.loggers.push(logger);
    }

    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }

    pub fn clear(&mut self) {
        self.loggers.clear();
    }
}

impl BuildLogger for BuildLoggers {
    fn name(&self) -> &str {
        "loggers"
    }

    fn initialize(&mut self) -> Result<()> {
        for logger in &mut self.loggers {
            logger.initialize()?;
        }
        Ok(())
    }

    fn uninitialize(&mut self) -> Result<()> {
        let mut first_error = None;
        for logger in &mut self.loggers {
            if let Err(e) = logger.uninitialize() {
                warn!("Failed to close logger '{}': {}", logger.name(), e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn verbosity(&self) -> BuildLoggerVerbosity {
        self.verbosity
    }

    fn set_verbosity(&mut self, verbosity: BuildLoggerVerbosity) {
        self.verbosity = verbosity;
        for logger in &mut self.loggers {
            logger.set_verbosity(verbosity);
        }
    }

    fn write_line(&mut self, text: &str, level: BuildLoggerLevel) {
        for logger in &mut self.loggers {
            logger.write_line(text, level);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_level_prefixes() {
        let filter = LevelFilter::default();
        assert_eq!(
            filter.format("Building", BuildLoggerLevel::Started),
            Some("Started: Building".to_string())
        );
        assert_eq!(
            filter.format("tool output", BuildLoggerLevel::None),
            Some("tool output".to_string())
        );
        assert_eq!(filter.format("", BuildLoggerLevel::Info), Some(String::new()));
        // Copyright lines are off by default
        assert_eq!(filter.format("(c) 2008", BuildLoggerLevel::Copyright), None);
    }

    #[test]
    fn test_console_shows_tool_output_at_info() {
        assert_eq!(console_level(BuildLoggerLevel::None), Level::Info);
        assert_eq!(console_level(BuildLoggerLevel::Started), Level::Info);
        assert_eq!(console_level(BuildLoggerLevel::Warn), Level::Warn);
        assert_eq!(console_level(BuildLoggerLevel::Error), Level::Error);
    }

    #[test]
    fn test_verbosity_parse() {
        assert_eq!(
            "minimal".parse::<BuildLoggerVerbosity>().unwrap(),
            BuildLoggerVerbosity::Minimal
        );
        assert_eq!(
            "Diagnostic".parse::<BuildLoggerVerbosity>().unwrap(),
            BuildLoggerVerbosity::Diagnostic
        );
        assert!("loud".parse::<BuildLoggerVerbosity>().is_err());
        assert!(BuildLoggerVerbosity::Quiet < BuildLoggerVerbosity::Normal);
    }

    #[test]
    fn test_fan_out_to_buffers() {
        let first = BufferLogger::new();
        let second = BufferLogger::new();
        let mut loggers = BuildLoggers::new();
        loggers.add(Box::new(first.clone()));
        loggers.add(Box::new(second.clone()));

        loggers.write_line("Merging Table of Contents", BuildLoggerLevel::Info);
        loggers.write_blank();

        assert_eq!(first.lines().len(), 2);
        assert!(second.contains("Info: Merging Table of Contents"));
    }

    #[test]
    fn test_file_logger_writes_lines() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("HelpBuild.log");

        let mut logger = FileLogger::new(&path, BuildLoggerVerbosity::Normal);
        logger.initialize().unwrap();
        assert!(logger.is_open());
        logger.write_line("Compiling help", BuildLoggerLevel::Started);
        logger.write_line("hidden", BuildLoggerLevel::Copyright);
        logger.uninitialize().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Started: Compiling help"));
        assert!(!content.contains("hidden"));
    }
}
